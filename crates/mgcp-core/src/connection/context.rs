use super::options::LocalConnectionOptions;
use crate::errors::ConnectionError;
use crate::media::{MediaDescription, RtpSession};
use crate::state_table::ConnectionState;
use crate::types::{CallId, ConnectionId, ConnectionMode, MediaFormat};
use std::net::IpAddr;
use std::sync::Arc;

/// How a connection carries media.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionKind {
    /// RTP towards a remote peer described by SDP
    #[default]
    Remote,
    /// Joined to another connection inside the gateway; no port, no SDP
    Local,
}

/// Everything a connection knows about itself.
///
/// Written only by the connection's state machine while it processes an
/// event; everyone else reads through the facade accessors.
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    pub id: ConnectionId,
    pub call_id: CallId,
    pub kind: ConnectionKind,
    pub cname: String,
    pub bind_address: IpAddr,
    pub external_address: Option<IpAddr>,
    pub state: ConnectionState,
    pub mode: ConnectionMode,
    pub local_sdp: Option<String>,
    pub remote_sdp: Option<String>,
    pub remote_media: Option<MediaDescription>,
    pub session: Option<Arc<RtpSession>>,
    pub formats: Vec<MediaFormat>,
    pub last_error: Option<ConnectionError>,
    pub options: LocalConnectionOptions,
    /// Local connection this one is joined to
    pub peer: Option<ConnectionId>,
    /// `o=` version of the last generated local description
    pub sdp_version: u64,
}

impl ConnectionContext {
    pub fn new(
        id: ConnectionId,
        call_id: CallId,
        cname: impl Into<String>,
        bind_address: IpAddr,
        external_address: Option<IpAddr>,
    ) -> Self {
        ConnectionContext {
            id,
            call_id,
            kind: ConnectionKind::Remote,
            cname: cname.into(),
            bind_address,
            external_address,
            state: ConnectionState::Idle,
            mode: ConnectionMode::Inactive,
            local_sdp: None,
            remote_sdp: None,
            remote_media: None,
            session: None,
            formats: Vec::new(),
            last_error: None,
            options: LocalConnectionOptions::default(),
            peer: None,
            sdp_version: 0,
        }
    }

    pub fn with_kind(mut self, kind: ConnectionKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn is_local(&self) -> bool {
        self.kind == ConnectionKind::Local
    }

    /// Address written into local descriptions
    pub fn advertised_address(&self) -> IpAddr {
        self.external_address.unwrap_or(self.bind_address)
    }

    pub fn next_sdp_version(&mut self) -> u64 {
        self.sdp_version += 1;
        self.sdp_version
    }

    /// Drop everything negotiated; identity and the last error stay.
    pub fn clear_media(&mut self) {
        self.session = None;
        self.local_sdp = None;
        self.remote_sdp = None;
        self.remote_media = None;
        self.formats.clear();
    }
}
