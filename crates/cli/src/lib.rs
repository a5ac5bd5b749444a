//! Library side of `tsync`, split out so commands can be tested without
//! spawning the binary.

pub mod commands;
pub mod error;
pub mod exit_codes;
pub mod logging;

pub use error::CliError;
