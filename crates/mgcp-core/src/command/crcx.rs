//! CreateConnection.
//!
//! With `Z2` the two endpoints are bridged by a pair of joined local
//! connections; no ports are bound and no SDP is exchanged.

use super::{
    qualified_name, required_call_id, parse_mode, CommandContext, CommandError, CommandResult, MgcpCommand,
    MgcpRequest, MgcpResponse, Parameter, ResponseCode,
};
use crate::connection::{Connection, LocalConnectionOptions};
use crate::endpoint::{Endpoint, WILDCARD_ALL};
use crate::types::{CallId, ConnectionMode};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Validated CRCX parameters
#[derive(Debug)]
struct CreateRequest<'a> {
    call_id: CallId,
    endpoint_id: &'a str,
    second_endpoint_id: Option<&'a str>,
    remote_sdp: Option<&'a str>,
    mode: ConnectionMode,
    options: LocalConnectionOptions,
}

impl<'a> CreateRequest<'a> {
    fn validate(request: &'a MgcpRequest) -> CommandResult<Self> {
        let call_id = required_call_id(request)?;

        let endpoint_id = request.endpoint_id.trim();
        if endpoint_id.is_empty() {
            return Err(CommandError::new(ResponseCode::EndpointUnknown, "Missing endpoint identifier"));
        }
        if endpoint_id.contains(WILDCARD_ALL) {
            return Err(ResponseCode::WildcardTooComplicated.into());
        }

        let second_endpoint_id = request.param(Parameter::SecondEndpoint).filter(|id| !id.is_empty());
        if second_endpoint_id.is_some_and(|id| id.contains(WILDCARD_ALL)) {
            return Err(ResponseCode::WildcardTooComplicated.into());
        }

        let remote_sdp = request.session_description();
        if second_endpoint_id.is_some() && remote_sdp.is_some() {
            return Err(CommandError::new(ResponseCode::ProtocolError, "Z2 and SDP present in message"));
        }

        let mode = request
            .param(Parameter::Mode)
            .ok_or_else(|| CommandError::new(ResponseCode::InvalidOrUnsupportedMode, "Missing connection mode"))
            .and_then(parse_mode)?;

        let options = match request.param(Parameter::LocalConnectionOptions) {
            Some(text) => LocalConnectionOptions::parse(text).map_err(|e| {
                debug!("Rejecting L parameter: {}", e);
                CommandError::new(ResponseCode::ProtocolError, "Could not decode Local Connection Options")
            })?,
            None => LocalConnectionOptions::default(),
        };

        Ok(CreateRequest {
            call_id,
            endpoint_id,
            second_endpoint_id,
            remote_sdp,
            mode,
            options,
        })
    }
}

/// Everything registered so far, undone when a later step fails
#[derive(Default)]
struct Created {
    endpoints: Vec<Arc<Endpoint>>,
    connections: Vec<(Arc<Endpoint>, Arc<Connection>)>,
}

impl Created {
    fn endpoint(&mut self, endpoint: Arc<Endpoint>, registered: bool) {
        if registered {
            self.endpoints.push(endpoint);
        }
    }

    fn connection(&mut self, endpoint: &Arc<Endpoint>, connection: Arc<Connection>) -> Arc<Connection> {
        endpoint.add_connection(connection.clone());
        self.connections.push((endpoint.clone(), connection.clone()));
        connection
    }

    async fn rollback(self, context: &CommandContext) {
        for (endpoint, connection) in self.connections {
            endpoint.remove_connection(connection.identifier());
            if let Err(e) = connection.close().await {
                warn!("Rollback: closing connection {} failed: {}", connection.hex_identifier(), e);
            }
        }
        for endpoint in self.endpoints {
            if context.endpoints.release_if_idle(&endpoint) {
                debug!("Rollback: released endpoint {}", endpoint.name());
            }
        }
    }
}

pub struct CreateConnection;

impl CreateConnection {
    async fn create(
        &self,
        request: &MgcpRequest,
        params: &CreateRequest<'_>,
        context: &CommandContext,
        created: &mut Created,
    ) -> CommandResult<MgcpResponse> {
        let (primary, registered) = context.endpoints.resolve(params.endpoint_id)?;
        created.endpoint(primary.clone(), registered);

        match params.second_endpoint_id {
            None => {
                let connection = created.connection(&primary, context.factory.create(params.call_id));
                let local_sdp = connection
                    .open_with_options(params.mode, params.remote_sdp.map(str::to_string), params.options.clone())
                    .await?;
                info!(
                    "Created connection {} on {} in state {}",
                    connection.hex_identifier(),
                    primary.name(),
                    connection.current_state()
                );

                Ok(MgcpResponse::new(ResponseCode::TransactionExecuted, request.transaction_id)
                    .with_param(Parameter::ConnectionId, connection.hex_identifier())
                    .with_param(Parameter::SpecificEndpoint, qualified_name(&primary, params.endpoint_id))
                    .with_sdp(local_sdp))
            }
            Some(second_endpoint_id) => {
                let (secondary, registered) = context.endpoints.resolve(second_endpoint_id)?;
                created.endpoint(secondary.clone(), registered);

                let first = created.connection(&primary, context.factory.create_local(params.call_id));
                first
                    .open_with_options(params.mode, None, params.options.clone())
                    .await?;
                let second = created.connection(&secondary, context.factory.create_local(params.call_id));
                second.open(ConnectionMode::SendRecv, None).await?;
                first.join(&second).await?;
                info!(
                    "Bridged {} on {} with {} on {}",
                    first.hex_identifier(),
                    primary.name(),
                    second.hex_identifier(),
                    secondary.name()
                );

                Ok(MgcpResponse::new(ResponseCode::TransactionExecuted, request.transaction_id)
                    .with_param(Parameter::ConnectionId, first.hex_identifier())
                    .with_param(Parameter::SpecificEndpoint, qualified_name(&primary, params.endpoint_id))
                    .with_param(Parameter::SecondConnectionId, second.hex_identifier())
                    .with_param(Parameter::SecondEndpoint, qualified_name(&secondary, second_endpoint_id)))
            }
        }
    }
}

#[async_trait]
impl MgcpCommand for CreateConnection {
    fn verb(&self) -> &'static str {
        "CRCX"
    }

    async fn execute(&self, request: &MgcpRequest, context: &CommandContext) -> CommandResult<MgcpResponse> {
        let params = CreateRequest::validate(request)?;
        debug!("CRCX validated: {:?}", params);

        let mut created = Created::default();
        let result = self.create(request, &params, context, &mut created).await;
        if let Err(e) = &result {
            warn!("CRCX {} failed, rolling back: {}", request.transaction_id, e);
            created.rollback(context).await;
        }
        result
    }
}
