use super::aucx::AuditConnection;
use super::crcx::CreateConnection;
use super::dlcx::DeleteConnection;
use super::mdcx::ModifyConnection;
use super::rqnt::RequestNotification;
use super::{CommandContext, MgcpCommand, MgcpRequest, MgcpResponse, ResponseCode};
use crate::config::{ConfigError, MgcpConfig};
use crate::connection::ConnectionFactory;
use crate::endpoint::EndpointManager;
use rvoip_infra_common::logging::LogContext;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn, Instrument};

/// Dispatches requests to their verb handler and turns every outcome,
/// success or failure, into exactly one response.
pub struct CommandProcessor {
    context: CommandContext,
    commands: HashMap<&'static str, Arc<dyn MgcpCommand>>,
}

impl CommandProcessor {
    pub fn new(factory: Arc<ConnectionFactory>, endpoints: Arc<EndpointManager>) -> Self {
        let mut processor = CommandProcessor {
            context: CommandContext { factory, endpoints },
            commands: HashMap::new(),
        };
        processor.register(Arc::new(CreateConnection));
        processor.register(Arc::new(ModifyConnection));
        processor.register(Arc::new(DeleteConnection));
        processor.register(Arc::new(AuditConnection));
        processor.register(Arc::new(RequestNotification));
        processor
    }

    /// Build the default stack and register the configured fixed endpoints.
    pub fn from_config(config: &MgcpConfig) -> Result<Self, ConfigError> {
        let factory = Arc::new(ConnectionFactory::from_config(config)?);
        let endpoints = Arc::new(EndpointManager::new(config.endpoint_namespaces.clone()));
        for name in &config.static_endpoints {
            endpoints.register(name);
        }
        Ok(Self::new(factory, endpoints))
    }

    /// Add or replace the handler for a verb
    pub fn register(&mut self, command: Arc<dyn MgcpCommand>) {
        self.commands.insert(command.verb(), command);
    }

    pub fn endpoints(&self) -> &Arc<EndpointManager> {
        &self.context.endpoints
    }

    pub fn factory(&self) -> &Arc<ConnectionFactory> {
        &self.context.factory
    }

    pub async fn process(&self, request: MgcpRequest) -> MgcpResponse {
        let verb = request.verb.trim().to_ascii_uppercase();
        let log = LogContext::with_operation("command", verb.clone())
            .with_field("tx", request.transaction_id.to_string())
            .with_field("endpoint", request.endpoint_id.clone());

        async {
            let Some(command) = self.commands.get(verb.as_str()) else {
                warn!("{} unknown verb", log);
                return MgcpResponse::new(ResponseCode::UnknownCommand, request.transaction_id);
            };

            match command.execute(&request, &self.context).await {
                Ok(response) => {
                    debug!("{} -> {}", log, response.code);
                    response
                }
                Err(error) => {
                    warn!("{} -> {}", log, error);
                    MgcpResponse::new(error.code, request.transaction_id).with_message(error.message)
                }
            }
        }
        .instrument(log.span())
        .await
    }
}
