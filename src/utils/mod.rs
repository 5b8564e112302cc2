//! Utils module - small shared helpers

pub mod jsonrepair;
pub mod logging;
pub mod tokens;
