//! Linux dialect.
//!
//! Standard Linux/Unix shells with `$` (user) and `#` (root) prompts.

use crate::platform::{Dialect, Mode, ModeRule};

/// Create the Linux dialect.
pub fn dialect() -> Dialect {
    Dialect::new("linux").with_mode_rule(ModeRule::new(&['$', '>'], &['#'], Mode::General))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_prompt() {
        let dialect = dialect();
        assert!(dialect.base_prompt.is_match(b"user@host:~$ "));
        assert_eq!(dialect.detect_mode("[ops@bastion ~]$"), Mode::General);
    }

    #[test]
    fn test_root_prompt() {
        let dialect = dialect();
        assert!(dialect.base_prompt.is_match(b"root@host:~# "));
        assert_eq!(dialect.detect_mode("[root@bastion ~]#"), Mode::Enabled);
    }
}
