use crate::endpoint::EndpointError;
use crate::errors::{ConnectionError, ErrorKind};
use std::fmt;
use thiserror::Error;

/// MGCP return codes (RFC 3435 section 2.4) produced by this server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseCode {
    TransactionExecuted,
    ConnectionDeleted,
    TransientError,
    TransactionTimeout,
    TransactionAborted,
    EndpointUnknown,
    EndpointNotAvailable,
    InsufficientResources,
    WildcardTooComplicated,
    UnknownCommand,
    UnsupportedSdp,
    ProtocolError,
    IncorrectConnectionId,
    IncorrectCallId,
    InvalidOrUnsupportedMode,
    UnknownPackage,
    NoSuchEventOrSignal,
    EventOrSignalParameterError,
}

impl ResponseCode {
    pub fn code(&self) -> u16 {
        match self {
            ResponseCode::TransactionExecuted => 200,
            ResponseCode::ConnectionDeleted => 250,
            ResponseCode::TransientError => 400,
            ResponseCode::TransactionTimeout => 406,
            ResponseCode::TransactionAborted => 407,
            ResponseCode::EndpointUnknown => 500,
            ResponseCode::EndpointNotAvailable => 501,
            ResponseCode::InsufficientResources => 502,
            ResponseCode::WildcardTooComplicated => 503,
            ResponseCode::UnknownCommand => 504,
            ResponseCode::UnsupportedSdp => 505,
            ResponseCode::ProtocolError => 510,
            ResponseCode::IncorrectConnectionId => 515,
            ResponseCode::IncorrectCallId => 516,
            ResponseCode::InvalidOrUnsupportedMode => 517,
            ResponseCode::UnknownPackage => 518,
            ResponseCode::NoSuchEventOrSignal => 522,
            ResponseCode::EventOrSignalParameterError => 538,
        }
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            ResponseCode::TransactionExecuted => "Transaction executed",
            ResponseCode::ConnectionDeleted => "Connection was deleted",
            ResponseCode::TransientError => "Transient error",
            ResponseCode::TransactionTimeout => "Transaction timed out",
            ResponseCode::TransactionAborted => "Transaction aborted",
            ResponseCode::EndpointUnknown => "Endpoint unknown",
            ResponseCode::EndpointNotAvailable => "Endpoint not available",
            ResponseCode::InsufficientResources => "Insufficient resources",
            ResponseCode::WildcardTooComplicated => "Wildcard too complicated",
            ResponseCode::UnknownCommand => "Unknown or unsupported command",
            ResponseCode::UnsupportedSdp => "Unsupported remote connection descriptor",
            ResponseCode::ProtocolError => "Protocol error",
            ResponseCode::IncorrectConnectionId => "Incorrect connection id",
            ResponseCode::IncorrectCallId => "Unknown or incorrect call id",
            ResponseCode::InvalidOrUnsupportedMode => "Invalid or unsupported mode",
            ResponseCode::UnknownPackage => "Unknown package",
            ResponseCode::NoSuchEventOrSignal => "No such event or signal",
            ResponseCode::EventOrSignalParameterError => "Event or signal parameter error",
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code())
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A request that ends in an error response
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{code} {message}")]
pub struct CommandError {
    pub code: ResponseCode,
    pub message: String,
}

impl CommandError {
    pub fn new(code: ResponseCode, message: impl Into<String>) -> Self {
        CommandError {
            code,
            message: message.into(),
        }
    }
}

impl From<ResponseCode> for CommandError {
    fn from(code: ResponseCode) -> Self {
        CommandError::new(code, code.default_message())
    }
}

impl From<ConnectionError> for CommandError {
    fn from(error: ConnectionError) -> Self {
        let code = match error.kind() {
            ErrorKind::Allocation => ResponseCode::InsufficientResources,
            ErrorKind::Negotiation => ResponseCode::UnsupportedSdp,
            ErrorKind::Timeout => ResponseCode::TransactionTimeout,
            ErrorKind::Cancelled => ResponseCode::TransactionAborted,
            ErrorKind::UnknownTransition | ErrorKind::Scheduling | ErrorKind::Closed => ResponseCode::TransientError,
        };
        CommandError::new(code, error.to_string())
    }
}

impl From<EndpointError> for CommandError {
    fn from(error: EndpointError) -> Self {
        let code = match error {
            EndpointError::Unknown(_) => ResponseCode::EndpointUnknown,
            EndpointError::NamespaceNotAvailable(_) => ResponseCode::EndpointNotAvailable,
            EndpointError::WildcardTooComplicated(_) => ResponseCode::WildcardTooComplicated,
        };
        CommandError::new(code, error.to_string())
    }
}

pub type CommandResult<T> = Result<T, CommandError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_table::{ConnectionState, EventType};

    #[test]
    fn connection_errors_map_to_codes() {
        let cases = [
            (ConnectionError::allocation("exhausted"), 502),
            (ConnectionError::no_common_format("PCMU only"), 505),
            (ConnectionError::malformed_offer("no m= line"), 505),
            (ConnectionError::Timeout { timeout_ms: 5000 }, 406),
            (ConnectionError::cancelled("closed"), 407),
            (
                ConnectionError::UnknownTransition {
                    state: ConnectionState::Closed,
                    event: EventType::Modify,
                },
                400,
            ),
            (ConnectionError::Closed, 400),
        ];
        for (error, code) in cases {
            assert_eq!(CommandError::from(error).code.code(), code);
        }
    }

    #[test]
    fn endpoint_errors_map_to_codes() {
        assert_eq!(
            CommandError::from(EndpointError::Unknown("x".into())).code,
            ResponseCode::EndpointUnknown
        );
        assert_eq!(
            CommandError::from(EndpointError::NamespaceNotAvailable("x/$".into())).code,
            ResponseCode::EndpointNotAvailable
        );
    }
}
