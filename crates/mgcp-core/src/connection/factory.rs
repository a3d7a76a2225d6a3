use super::{Connection, ConnectionContext, ConnectionKind};
use crate::config::{ConfigError, MgcpConfig};
use crate::media::{BasicSdpCodec, PortPool, RtpSessionNegotiator, StaticCodecCapabilities};
use crate::state_machine::ConnectionServices;
use crate::state_table::{build_connection_table, ConnectionStateTable, TimeoutSettings};
use crate::timer::TokioScheduler;
use crate::types::{CallId, ConnectionIdGenerator};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::debug;

/// Builds connections that share one table, one set of services and one
/// identifier sequence.
pub struct ConnectionFactory {
    ids: ConnectionIdGenerator,
    table: Arc<ConnectionStateTable>,
    services: ConnectionServices,
    bind_address: IpAddr,
    external_address: Option<IpAddr>,
    cname: String,
}

impl ConnectionFactory {
    pub fn new(config: &MgcpConfig, services: ConnectionServices) -> Self {
        let timeouts = TimeoutSettings {
            response: config.response_timeout(),
            half_open: config.half_open_timeout(),
            open: config.open_timeout(),
        };
        let cname = config
            .cname
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());

        ConnectionFactory {
            ids: ConnectionIdGenerator::new(),
            table: Arc::new(build_connection_table(&timeouts)),
            services,
            bind_address: config.bind_address,
            external_address: config.external_address,
            cname,
        }
    }

    /// Wire up the default port pool, codec list, SDP codec and tokio timers.
    pub fn from_config(config: &MgcpConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let ports = Arc::new(PortPool::new(config.port_range));
        let codecs = Arc::new(StaticCodecCapabilities::from_names(&config.default_codec_order));
        let services = ConnectionServices {
            negotiator: Arc::new(RtpSessionNegotiator::new(ports, codecs)),
            sdp: Arc::new(BasicSdpCodec::new()),
            scheduler: Arc::new(TokioScheduler::new()),
        };
        Ok(Self::new(config, services))
    }

    pub fn services(&self) -> &ConnectionServices {
        &self.services
    }

    /// Create an idle connection for `call_id`. Must run inside a tokio runtime.
    pub fn create(&self, call_id: CallId) -> Arc<Connection> {
        self.create_kind(call_id, ConnectionKind::Remote)
    }

    /// Create an idle local connection, to be joined to another one.
    pub fn create_local(&self, call_id: CallId) -> Arc<Connection> {
        self.create_kind(call_id, ConnectionKind::Local)
    }

    fn create_kind(&self, call_id: CallId, kind: ConnectionKind) -> Arc<Connection> {
        let id = self.ids.next_id();
        debug!("Creating {:?} connection {} for call {}", kind, id, call_id);
        let context = ConnectionContext::new(id, call_id, self.cname.clone(), self.bind_address, self.external_address)
            .with_kind(kind);
        Arc::new(Connection::spawn(context, self.table.clone(), self.services.clone()))
    }
}
