//! Shared utilities.

pub mod io;
pub mod log;
