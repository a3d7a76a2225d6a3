//! Error types for the connection lifecycle engine.

use crate::state_table::{ConnectionState, EventType};
use std::fmt;
use thiserror::Error;

/// Why an offer/answer exchange failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NegotiationFailure {
    /// The offer shares no media format with the local capabilities
    NoCommonFormat,
    /// The offer could not be parsed or lacks a usable audio stream
    MalformedOffer,
}

impl fmt::Display for NegotiationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NegotiationFailure::NoCommonFormat => write!(f, "no common format"),
            NegotiationFailure::MalformedOffer => write!(f, "malformed offer"),
        }
    }
}

/// Coarse classification of a [`ConnectionError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnknownTransition,
    Allocation,
    Negotiation,
    Timeout,
    Scheduling,
    Cancelled,
    Closed,
}

/// Errors surfaced by connections and the components beneath them
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectionError {
    /// The state machine has no transition for this event in this state
    #[error("No transition for event {event} in state {state}")]
    UnknownTransition {
        state: ConnectionState,
        event: EventType,
    },

    /// An RTP session could not be allocated
    #[error("Session allocation failed: {reason}")]
    Allocation { reason: String },

    /// Offer/answer negotiation failed
    #[error("Negotiation failed ({reason}): {detail}")]
    Negotiation {
        reason: NegotiationFailure,
        detail: String,
    },

    /// The pending operation did not complete in time
    #[error("Operation timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    /// A timer could not be armed
    #[error("Timer scheduling failed: {reason}")]
    Scheduling { reason: String },

    /// The pending operation was superseded, usually by a close
    #[error("Operation cancelled: {reason}")]
    Cancelled { reason: String },

    /// The connection no longer accepts requests
    #[error("Connection is closed")]
    Closed,
}

impl ConnectionError {
    pub fn allocation(reason: impl Into<String>) -> Self {
        ConnectionError::Allocation {
            reason: reason.into(),
        }
    }

    pub fn no_common_format(detail: impl Into<String>) -> Self {
        ConnectionError::Negotiation {
            reason: NegotiationFailure::NoCommonFormat,
            detail: detail.into(),
        }
    }

    pub fn malformed_offer(detail: impl Into<String>) -> Self {
        ConnectionError::Negotiation {
            reason: NegotiationFailure::MalformedOffer,
            detail: detail.into(),
        }
    }

    pub fn scheduling(reason: impl Into<String>) -> Self {
        ConnectionError::Scheduling {
            reason: reason.into(),
        }
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        ConnectionError::Cancelled {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ConnectionError::UnknownTransition { .. } => ErrorKind::UnknownTransition,
            ConnectionError::Allocation { .. } => ErrorKind::Allocation,
            ConnectionError::Negotiation { .. } => ErrorKind::Negotiation,
            ConnectionError::Timeout { .. } => ErrorKind::Timeout,
            ConnectionError::Scheduling { .. } => ErrorKind::Scheduling,
            ConnectionError::Cancelled { .. } => ErrorKind::Cancelled,
            ConnectionError::Closed => ErrorKind::Closed,
        }
    }

    /// The negotiation reason, if this is a negotiation failure
    pub fn negotiation_failure(&self) -> Option<NegotiationFailure> {
        match self {
            ConnectionError::Negotiation { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

pub type ConnectionResult<T> = Result<T, ConnectionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_variants() {
        assert_eq!(ConnectionError::allocation("pool empty").kind(), ErrorKind::Allocation);
        assert_eq!(ConnectionError::Timeout { timeout_ms: 5000 }.kind(), ErrorKind::Timeout);
        assert_eq!(
            ConnectionError::no_common_format("PCMU only").negotiation_failure(),
            Some(NegotiationFailure::NoCommonFormat)
        );
        assert_eq!(ConnectionError::Closed.negotiation_failure(), None);
    }

    #[test]
    fn display_names_state_and_event() {
        let err = ConnectionError::UnknownTransition {
            state: ConnectionState::Idle,
            event: EventType::Modify,
        };
        assert_eq!(err.to_string(), "No transition for event MODIFY in state IDLE");
    }
}
