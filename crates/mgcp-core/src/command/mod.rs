//! MGCP command handlers.
//!
//! Each verb is an [`MgcpCommand`] that validates its parameters, drives
//! connections through their facade and returns one response. Handlers
//! never touch connection state directly.

pub mod aucx;
pub mod crcx;
pub mod dlcx;
pub mod mdcx;
pub mod message;
pub mod packages;
pub mod processor;
pub mod response;
pub mod rqnt;

pub use message::{MgcpRequest, MgcpResponse, Parameter};
pub use processor::CommandProcessor;
pub use response::{CommandError, CommandResult, ResponseCode};

use crate::connection::{Connection, ConnectionFactory};
use crate::endpoint::{split_endpoint_name, Endpoint, EndpointManager, WILDCARD_ALL, WILDCARD_ANY};
use crate::types::{CallId, ConnectionId, ConnectionMode};
use async_trait::async_trait;
use std::sync::Arc;

/// Shared resources every handler works against
#[derive(Clone)]
pub struct CommandContext {
    pub factory: Arc<ConnectionFactory>,
    pub endpoints: Arc<EndpointManager>,
}

#[async_trait]
pub trait MgcpCommand: Send + Sync {
    /// Upper-case verb, e.g. `CRCX`
    fn verb(&self) -> &'static str;

    async fn execute(&self, request: &MgcpRequest, context: &CommandContext) -> CommandResult<MgcpResponse>;
}

pub(crate) fn required_call_id(request: &MgcpRequest) -> CommandResult<CallId> {
    let value = request
        .param(Parameter::CallId)
        .ok_or_else(|| CommandError::new(ResponseCode::IncorrectCallId, "Missing call id"))?;
    parse_call_id(value)
}

pub(crate) fn parse_call_id(value: &str) -> CommandResult<CallId> {
    CallId::from_hex(value)
        .ok_or_else(|| CommandError::new(ResponseCode::IncorrectCallId, format!("Invalid call id {}", value)))
}

pub(crate) fn parse_connection_id(value: &str) -> CommandResult<ConnectionId> {
    ConnectionId::from_hex(value).ok_or_else(|| {
        CommandError::new(
            ResponseCode::IncorrectConnectionId,
            format!("Invalid connection id {}", value),
        )
    })
}

pub(crate) fn parse_mode(value: &str) -> CommandResult<ConnectionMode> {
    value.parse::<ConnectionMode>().map_err(|_| {
        CommandError::new(
            ResponseCode::InvalidOrUnsupportedMode,
            format!("Invalid or unsupported mode {}", value),
        )
    })
}

/// Resolve an endpoint that must already exist and may not use wildcards
pub(crate) fn concrete_endpoint(request: &MgcpRequest, context: &CommandContext) -> CommandResult<Arc<Endpoint>> {
    let name = request.endpoint_id.trim();
    if name.is_empty() {
        return Err(CommandError::new(ResponseCode::EndpointUnknown, "Missing endpoint identifier"));
    }
    if name.contains(WILDCARD_ALL) || name.contains(WILDCARD_ANY) {
        return Err(ResponseCode::WildcardTooComplicated.into());
    }
    context
        .endpoints
        .find(name)
        .ok_or_else(|| CommandError::new(ResponseCode::EndpointUnknown, format!("Endpoint {} not found", name)))
}

/// Look up a connection on `endpoint` by its `I` value
pub(crate) fn find_connection(endpoint: &Endpoint, value: &str) -> CommandResult<Arc<Connection>> {
    let id = parse_connection_id(value)?;
    endpoint.connection(id).ok_or_else(|| {
        CommandError::new(
            ResponseCode::IncorrectConnectionId,
            format!("Connection {} not found on {}", value, endpoint.name()),
        )
    })
}

/// Endpoint name as reported back to the call agent, keeping the requested domain
pub(crate) fn qualified_name(endpoint: &Endpoint, requested: &str) -> String {
    match split_endpoint_name(requested) {
        (_, Some(domain)) => format!("{}@{}", endpoint.name(), domain),
        (_, None) => endpoint.name().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_parsers() {
        assert_eq!(parse_call_id("1A").unwrap(), CallId::new(0x1A));
        assert_eq!(parse_call_id("xyz").unwrap_err().code, ResponseCode::IncorrectCallId);
        assert_eq!(
            parse_connection_id("").unwrap_err().code,
            ResponseCode::IncorrectConnectionId
        );
        assert_eq!(parse_mode("sendrecv").unwrap(), ConnectionMode::SendRecv);
        assert_eq!(
            parse_mode("sideways").unwrap_err().code,
            ResponseCode::InvalidOrUnsupportedMode
        );
    }

    #[test]
    fn qualified_names_keep_domain() {
        let endpoint = Endpoint::new("mobicents/ivr/2", true);
        assert_eq!(
            qualified_name(&endpoint, "mobicents/ivr/$@127.0.0.1:2427"),
            "mobicents/ivr/2@127.0.0.1:2427"
        );
        assert_eq!(qualified_name(&endpoint, "mobicents/ivr/$"), "mobicents/ivr/2");
    }
}
