//! DeleteConnection.
//!
//! Deletes a single connection (`I`, which needs `C` as well), every
//! connection of a call (`C`) or every connection on the endpoint. A single
//! delete reports the connection's RTP counters in `P`.

use super::{
    concrete_endpoint, find_connection, parse_call_id, CommandContext, CommandError, CommandResult, MgcpCommand,
    MgcpRequest, MgcpResponse, Parameter, ResponseCode,
};
use crate::connection::Connection;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

pub struct DeleteConnection;

#[async_trait]
impl MgcpCommand for DeleteConnection {
    fn verb(&self) -> &'static str {
        "DLCX"
    }

    async fn execute(&self, request: &MgcpRequest, context: &CommandContext) -> CommandResult<MgcpResponse> {
        let endpoint = concrete_endpoint(request, context)?;
        let call_id = request.param(Parameter::CallId).map(parse_call_id).transpose()?;

        let mut statistics = None;
        let removed: Vec<Arc<Connection>> = match (request.param(Parameter::ConnectionId), call_id) {
            (Some(_), None) => {
                return Err(CommandError::new(
                    ResponseCode::IncorrectCallId,
                    "Call ID is mandatory when a connection ID is given",
                ));
            }
            (Some(connection_id), Some(call_id)) => {
                let connection = find_connection(&endpoint, connection_id)?;
                if call_id != connection.call_id() {
                    return Err(CommandError::new(
                        ResponseCode::IncorrectCallId,
                        format!("Connection {} does not belong to call {}", connection_id, call_id),
                    ));
                }
                statistics = Some(connection.statistics());
                endpoint
                    .remove_connection(connection.identifier())
                    .into_iter()
                    .collect()
            }
            (None, Some(call_id)) => endpoint.remove_call(call_id),
            (None, None) => endpoint.remove_all(),
        };

        for connection in &removed {
            if let Err(e) = connection.close().await {
                warn!("Closing connection {} failed: {}", connection.hex_identifier(), e);
            }
        }
        info!("Deleted {} connection(s) on {}", removed.len(), endpoint.name());
        context.endpoints.release_if_idle(&endpoint);

        let mut response = MgcpResponse::new(ResponseCode::ConnectionDeleted, request.transaction_id);
        if let Some(statistics) = statistics {
            response = response.with_param(Parameter::ConnectionParameters, statistics.to_string());
        }
        Ok(response)
    }
}
