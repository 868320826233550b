//! Generic dialect.
//!
//! Works for most Cisco-like and Huawei-like CLIs: `>`/`#`/`]`/`$` prompts
//! and dash-delimited "More" pagers.

use crate::platform::Dialect;

/// Create the generic dialect.
pub fn dialect() -> Dialect {
    Dialect::new("generic")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Mode;

    #[test]
    fn test_generic_dialect() {
        let dialect = dialect();
        assert_eq!(dialect.name, "generic");
        assert_eq!(dialect.detect_mode("Switch>"), Mode::General);
        assert_eq!(dialect.detect_mode("Switch#"), Mode::Enabled);
    }
}
