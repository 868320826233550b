//! Maipu dialect.
//!
//! Maipu S3300-series switches page with a fixed dotted banner rather than
//! a "More" prompt.

use crate::platform::Dialect;

/// Pager banner printed by Maipu switches.
pub const PAGER_BANNER: &str = "....press ENTER to next line, Q to quit, other key to next page....";

/// Create the Maipu dialect.
pub fn dialect() -> Dialect {
    Dialect::new("maipu").with_pagination_literal(PAGER_BANNER).unwrap()
}
