//! The connection transition table.
//!
//! The table is data: `(state, event)` keys map to guarded candidate
//! transitions, and each timer scope maps to at most one timeout
//! transition. The executor in [`crate::state_machine`] interprets it.

pub mod tables;
pub mod types;

pub use tables::{build_connection_table, DEFAULT_TABLE};
pub use types::*;
