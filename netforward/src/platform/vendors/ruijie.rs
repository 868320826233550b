//! Ruijie dialect.
//!
//! Ruijie prompts may carry a second `#` (`Ruijie#show run#`) or end in `)`
//! inside configuration submodes.

use crate::platform::Dialect;

/// Base prompt for Ruijie switches.
pub const BASE_PROMPT: &str = r"(>|#.*#|\]|\$|\)) *$";

/// Create the Ruijie dialect.
pub fn dialect() -> Dialect {
    Dialect::new("ruijie").with_base_prompt(BASE_PROMPT).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ruijie_prompts() {
        let dialect = dialect();
        assert_eq!(dialect.name, "ruijie");
        assert!(dialect.base_prompt.is_match(b"Ruijie>"));
        assert!(dialect.base_prompt.is_match(b"Ruijie#show#"));
        assert!(dialect.base_prompt.is_match(b"Ruijie(config)"));
        assert!(dialect.base_prompt.is_match(b"[Ruijie]"));
    }

    #[test]
    fn test_single_hash_is_not_a_prompt() {
        // A lone '#' needs a second one before it counts.
        assert!(!dialect().base_prompt.is_match(b"Ruijie#"));
    }
}
