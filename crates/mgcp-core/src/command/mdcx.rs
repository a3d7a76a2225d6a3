//! ModifyConnection.

use super::{
    concrete_endpoint, find_connection, parse_mode, required_call_id, CommandContext, CommandError, CommandResult,
    MgcpCommand, MgcpRequest, MgcpResponse, Parameter, ResponseCode,
};
use crate::connection::ModifyRequest;
use async_trait::async_trait;
use tracing::info;

pub struct ModifyConnection;

#[async_trait]
impl MgcpCommand for ModifyConnection {
    fn verb(&self) -> &'static str {
        "MDCX"
    }

    async fn execute(&self, request: &MgcpRequest, context: &CommandContext) -> CommandResult<MgcpResponse> {
        let call_id = required_call_id(request)?;
        let endpoint = concrete_endpoint(request, context)?;
        let connection_id = request
            .param(Parameter::ConnectionId)
            .ok_or_else(|| CommandError::new(ResponseCode::IncorrectConnectionId, "Missing connection id"))?;
        let mode = request.param(Parameter::Mode).map(parse_mode).transpose()?;

        let connection = find_connection(&endpoint, connection_id)?;
        if connection.call_id() != call_id {
            return Err(CommandError::new(
                ResponseCode::IncorrectCallId,
                format!("Connection {} does not belong to call {}", connection_id, call_id),
            ));
        }

        let modification = ModifyRequest {
            mode,
            remote_sdp: request.session_description().map(str::to_string),
        };
        let local_sdp = connection.modify(modification).await?;
        info!(
            "Modified connection {} on {}: mode {}, state {}",
            connection.hex_identifier(),
            endpoint.name(),
            connection.mode(),
            connection.current_state()
        );

        let response = MgcpResponse::new(ResponseCode::TransactionExecuted, request.transaction_id);
        // Local connections carry no description
        if local_sdp.is_empty() {
            Ok(response)
        } else {
            Ok(response.with_sdp(local_sdp))
        }
    }
}
