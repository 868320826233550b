//! Device dialect: the per-vendor knobs a session needs.

use once_cell::sync::Lazy;
use regex::bytes::Regex;

use super::mode::{Mode, ModeRule};
use crate::channel::PatternSet;
use crate::error::DialectError;

/// Any shell prompt: ends in `>`, `#`, `]` or `$`, optionally followed by spaces.
pub const BASE_PROMPT: &str = r"(>|#|\]|\$) *$";

/// Dash-delimited "More" banners and "(Q to quit)" style pagers.
pub const PAGINATION: &str = r"(< *)?(-)+( |\()?[Mm]ore.*(\)| )?(-)+( *>)?|\(Q to quit\)";

/// Output that means the device wants a new password before granting a shell.
pub const PASSWORD_CHANGE: &str = r"(?i)(new +password)|(password.*change)";

static GENERIC_BASE_PROMPT: Lazy<Regex> = Lazy::new(|| Regex::new(BASE_PROMPT).unwrap());
static GENERIC_PAGINATION: Lazy<Regex> = Lazy::new(|| Regex::new(PAGINATION).unwrap());
static GENERIC_PASSWORD_CHANGE: Lazy<Regex> = Lazy::new(|| Regex::new(PASSWORD_CHANGE).unwrap());

/// Outcome label used for base-prompt and discovered-prompt matches.
pub const PROMPT_LABEL: &str = "prompt";

/// Outcome label for the password-change indicator during login.
pub const PASSWORD_EXPIRED_LABEL: &str = "password_expired";

/// Value object describing how a family of devices talks.
///
/// Sessions are parameterised by a dialect instead of being specialised per
/// vendor. Built-ins live in [`vendors`](super::vendors) and are looked up
/// by name through the [`DialectRegistry`](super::DialectRegistry).
///
/// ```rust
/// use netforward::{Dialect, Mode, ModeRule};
///
/// let dialect = Dialect::new("lab_router")
///     .with_base_prompt(r"(>|#) ?$")
///     .unwrap()
///     .with_mode_rule(ModeRule::new(&['>'], &['#'], Mode::General));
/// assert_eq!(dialect.detect_mode("lab1#"), Mode::Enabled);
/// ```
#[derive(Debug, Clone)]
pub struct Dialect {
    /// Dialect name (e.g. "generic", "ruijie").
    pub name: String,

    /// Matches any prompt of this device family on the last line.
    pub base_prompt: Regex,

    /// Matches a pager banner on the last line.
    pub pagination: Regex,

    /// Matches a forced password change during login.
    pub password_change: Regex,

    /// Infers the CLI mode from a discovered prompt.
    pub mode_rule: ModeRule,
}

impl Dialect {
    /// Create a dialect with the generic patterns.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_prompt: GENERIC_BASE_PROMPT.clone(),
            pagination: GENERIC_PAGINATION.clone(),
            password_change: GENERIC_PASSWORD_CHANGE.clone(),
            mode_rule: ModeRule::default(),
        }
    }

    /// Replace the base prompt pattern.
    pub fn with_base_prompt(mut self, pattern: &str) -> Result<Self, DialectError> {
        self.base_prompt = compile(&self.name, "base prompt", pattern)?;
        Ok(self)
    }

    /// Replace the pagination pattern.
    pub fn with_pagination(mut self, pattern: &str) -> Result<Self, DialectError> {
        self.pagination = compile(&self.name, "pagination", pattern)?;
        Ok(self)
    }

    /// Match pagination on a fixed banner instead of a pattern.
    pub fn with_pagination_literal(self, banner: &str) -> Result<Self, DialectError> {
        self.with_pagination(&regex::escape(banner))
    }

    /// Replace the password-change pattern.
    pub fn with_password_change(mut self, pattern: &str) -> Result<Self, DialectError> {
        self.password_change = compile(&self.name, "password change", pattern)?;
        Ok(self)
    }

    /// Replace the mode rule.
    pub fn with_mode_rule(mut self, rule: ModeRule) -> Self {
        self.mode_rule = rule;
        self
    }

    /// Infer the CLI mode from a prompt.
    pub fn detect_mode(&self, prompt: &str) -> Mode {
        self.mode_rule.detect(prompt)
    }

    /// Base prompt only; used for buffer cleaning and prompt discovery.
    pub fn base_prompt_set(&self) -> PatternSet {
        PatternSet::new().with_outcome(PROMPT_LABEL, self.base_prompt.clone())
    }

    /// Login handshake: the password-change indicator wins over a prompt.
    pub fn login_set(&self) -> PatternSet {
        PatternSet::new()
            .with_outcome(PASSWORD_EXPIRED_LABEL, self.password_change.clone())
            .with_outcome(PROMPT_LABEL, self.base_prompt.clone())
    }
}

fn compile(dialect: &str, field: &str, pattern: &str) -> Result<Regex, DialectError> {
    Regex::new(pattern).map_err(|e| DialectError::InvalidDefinition {
        message: format!("{dialect}: {field} pattern {pattern:?}: {e}"),
    })
}
