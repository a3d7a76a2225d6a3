//! Infrastructure shared by the MGCP crates.
//!
//! - [`logging`]: `tracing-subscriber` setup and contextual spans
//! - [`config`]: layered configuration loading (file + environment)
//! - [`errors`]: the common error type

pub mod config;
pub mod errors;
pub mod logging;

pub use errors::types::{Error, Result};
