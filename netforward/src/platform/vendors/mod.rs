//! Built-in device dialects.

pub mod generic;
pub mod linux;
pub mod maipu;
pub mod ruijie;
