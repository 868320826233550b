//! Device dialects for multi-vendor support.
//!
//! A [`Dialect`] carries the base prompt, pagination marker,
//! password-change indicator and mode rule for one family of devices.
//! Sessions are composed with a dialect rather than specialised per vendor.

mod dialect;
mod mode;
mod registry;
pub mod vendors;

pub use dialect::{
    BASE_PROMPT, Dialect, PAGINATION, PASSWORD_CHANGE, PASSWORD_EXPIRED_LABEL, PROMPT_LABEL,
};
pub use mode::{Mode, ModeRule};
pub use registry::DialectRegistry;
