//! Per-connection executor for the transition table.

pub mod actions;
pub mod event;
pub mod executor;

pub use event::{enqueue, EventPayload, ModificationOutcome, Responder, TransitionEvent};
pub use executor::{ConnectionServices, ProcessEventResult, StateMachine};
