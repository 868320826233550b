//! CLI mode and the rule that infers it from a prompt.

use std::fmt;

/// CLI context of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    /// Unprivileged exec mode (`router>`).
    #[default]
    General,

    /// Privileged mode (`router#`, `[switch]`).
    Enabled,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::General => f.write_str("general"),
            Mode::Enabled => f.write_str("enabled"),
        }
    }
}

/// Maps the final sentinel character of a prompt to a [`Mode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeRule {
    /// Sentinels that mean general mode.
    pub general: Vec<char>,

    /// Sentinels that mean enabled mode.
    pub enabled: Vec<char>,

    /// Mode for prompts ending in anything else.
    pub fallback: Mode,
}

impl ModeRule {
    /// Create a rule from explicit sentinel lists.
    pub fn new(general: &[char], enabled: &[char], fallback: Mode) -> Self {
        Self {
            general: general.to_vec(),
            enabled: enabled.to_vec(),
            fallback,
        }
    }

    /// Infer the mode of `prompt`. Trailing whitespace is ignored.
    pub fn detect(&self, prompt: &str) -> Mode {
        match prompt.trim_end().chars().next_back() {
            Some(c) if self.enabled.contains(&c) => Mode::Enabled,
            Some(c) if self.general.contains(&c) => Mode::General,
            _ => self.fallback,
        }
    }
}

impl Default for ModeRule {
    /// `>` is general; `#` and `]` are enabled.
    fn default() -> Self {
        Self::new(&['>'], &['#', ']'], Mode::General)
    }
}
