//! AuditConnection.

use super::packages::split_list;
use super::{
    concrete_endpoint, find_connection, CommandContext, CommandError, CommandResult, MgcpCommand, MgcpRequest,
    MgcpResponse, Parameter, ResponseCode,
};
use async_trait::async_trait;

/// Description reported for a connection that has none yet
const EMPTY_DESCRIPTION: &str = "v=0";

pub struct AuditConnection;

#[async_trait]
impl MgcpCommand for AuditConnection {
    fn verb(&self) -> &'static str {
        "AUCX"
    }

    async fn execute(&self, request: &MgcpRequest, context: &CommandContext) -> CommandResult<MgcpResponse> {
        let endpoint = concrete_endpoint(request, context)?;
        let connection_id = request
            .param(Parameter::ConnectionId)
            .ok_or_else(|| CommandError::new(ResponseCode::ProtocolError, "Connection identifier was not specified"))?;
        let connection = find_connection(&endpoint, connection_id)?;

        let requested: Vec<String> = match request.param(Parameter::RequestedInfo) {
            Some(info) => split_list(info).into_iter().map(str::to_ascii_uppercase).collect(),
            None => ["C", "N", "M", "LC", "RC"].iter().map(|s| s.to_string()).collect(),
        };
        let wants = |item: &str| requested.iter().any(|r| r == item);

        let mut response = MgcpResponse::new(ResponseCode::TransactionExecuted, request.transaction_id);
        if wants("C") {
            response = response.with_param(Parameter::CallId, connection.call_id().to_string());
        }
        if wants("N") {
            let entity = endpoint
                .notification_request()
                .and_then(|request| request.notified_entity)
                .unwrap_or_default();
            response = response.with_param(Parameter::NotifiedEntity, entity);
        }
        if wants("M") {
            response = response.with_param(Parameter::Mode, connection.mode().description());
        }
        if wants("L") {
            let options = connection.local_connection_options();
            if !options.is_empty() {
                response = response.with_param(Parameter::LocalConnectionOptions, options.to_string());
            }
        }
        if wants("P") {
            response = response.with_param(Parameter::ConnectionParameters, connection.statistics().to_string());
        }

        // One description per response: the local one wins when both are asked for
        let description = if wants("LC") {
            Some(connection.local_description())
        } else if wants("RC") {
            Some(connection.remote_description())
        } else {
            None
        };
        if let Some(description) = description {
            let description = if description.is_empty() {
                EMPTY_DESCRIPTION.to_string()
            } else {
                description
            };
            response = response.with_sdp(description);
        }

        Ok(response)
    }
}
