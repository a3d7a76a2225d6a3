//! The public face of a connection.
//!
//! A [`Connection`] owns a queue into its state machine. Every operation
//! enqueues an event and waits for the state machine to settle the request;
//! accessors read the shared [`ConnectionContext`].

pub mod context;
pub mod factory;
pub mod options;

pub use context::{ConnectionContext, ConnectionKind};
pub use factory::ConnectionFactory;
pub use options::{LocalConnectionOptions, OptionsError};

use crate::errors::{ConnectionError, ConnectionResult};
use crate::media::SessionStatistics;
use crate::state_machine::{ConnectionServices, EventPayload, StateMachine, TransitionEvent};
use crate::state_table::{ConnectionState, ConnectionStateTable, EventType};
use crate::types::{CallId, ConnectionId, ConnectionMode, MediaFormat};
use parking_lot::RwLock;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

/// Parameters of a modify request; absent fields keep their current value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModifyRequest {
    pub mode: Option<ConnectionMode>,
    pub remote_sdp: Option<String>,
}

impl ModifyRequest {
    pub fn mode(mode: ConnectionMode) -> Self {
        ModifyRequest {
            mode: Some(mode),
            remote_sdp: None,
        }
    }

    pub fn remote(remote_sdp: impl Into<String>) -> Self {
        ModifyRequest {
            mode: None,
            remote_sdp: Some(remote_sdp.into()),
        }
    }

    pub fn with_mode(mut self, mode: ConnectionMode) -> Self {
        self.mode = Some(mode);
        self
    }
}

/// One MGCP connection on an endpoint
pub struct Connection {
    id: ConnectionId,
    call_id: CallId,
    context: Arc<RwLock<ConnectionContext>>,
    events: mpsc::UnboundedSender<TransitionEvent>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl Connection {
    /// Create the connection and start its worker on the current runtime.
    pub fn spawn(context: ConnectionContext, table: Arc<ConnectionStateTable>, services: ConnectionServices) -> Self {
        let id = context.id;
        let call_id = context.call_id;
        let context = Arc::new(RwLock::new(context));
        let (events, queue) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);

        let machine = StateMachine::new(table, context.clone(), services, &events, state_tx);
        tokio::spawn(machine.run(queue));

        Connection {
            id,
            call_id,
            context,
            events,
            state_rx,
        }
    }

    /// Allocate a session and answer `remote_sdp`, or offer when it is absent.
    ///
    /// Resolves with the local description once the connection is open or
    /// half-open.
    ///
    /// A local connection resolves half-open with an empty description and
    /// waits for [`Connection::join`].
    pub async fn open(&self, mode: ConnectionMode, remote_sdp: Option<String>) -> ConnectionResult<String> {
        self.open_with_options(mode, remote_sdp, LocalConnectionOptions::default())
            .await
    }

    /// [`Connection::open`] shaped by local connection options.
    pub async fn open_with_options(
        &self,
        mode: ConnectionMode,
        remote_sdp: Option<String>,
        options: LocalConnectionOptions,
    ) -> ConnectionResult<String> {
        let (responder, result) = oneshot::channel();
        self.submit(
            EventType::Open,
            EventPayload::Open {
                mode,
                remote_sdp,
                options,
                responder: Some(responder),
            },
        )?;
        result.await.map_err(|_| ConnectionError::Closed)?
    }

    /// Join two half-open local connections; both end up open.
    pub async fn join(&self, peer: &Connection) -> ConnectionResult<()> {
        self.attach(peer.id).await?;
        peer.attach(self.id).await
    }

    async fn attach(&self, peer: ConnectionId) -> ConnectionResult<()> {
        let (responder, result) = oneshot::channel();
        self.submit(
            EventType::Join,
            EventPayload::Join {
                peer,
                responder: Some(responder),
            },
        )?;
        result.await.map_err(|_| ConnectionError::Closed)?
    }

    /// Change the mode and/or renegotiate with a new remote description.
    pub async fn modify(&self, request: ModifyRequest) -> ConnectionResult<String> {
        let (responder, result) = oneshot::channel();
        self.submit(
            EventType::Modify,
            EventPayload::Modify {
                mode: request.mode,
                remote_sdp: request.remote_sdp,
                responder: Some(responder),
            },
        )?;
        result.await.map_err(|_| ConnectionError::Closed)?
    }

    /// Close the connection. Closing an already closed connection succeeds.
    pub async fn close(&self) -> ConnectionResult<()> {
        let (responder, result) = oneshot::channel();
        self.submit(
            EventType::Close,
            EventPayload::Close {
                responder: Some(responder),
            },
        )?;
        result.await.map_err(|_| ConnectionError::Closed)?
    }

    /// Report a media-plane failure (e.g. the RTP socket died).
    pub fn report_failure(&self, error: ConnectionError) -> ConnectionResult<()> {
        self.submit(EventType::Failure, EventPayload::Failure(error))
    }

    fn submit(&self, event_type: EventType, payload: EventPayload) -> ConnectionResult<()> {
        self.events
            .send(TransitionEvent::new(event_type, payload))
            .map_err(|_| ConnectionError::Closed)
    }

    pub fn identifier(&self) -> ConnectionId {
        self.id
    }

    pub fn hex_identifier(&self) -> String {
        self.id.to_string()
    }

    pub fn call_id(&self) -> CallId {
        self.call_id
    }

    pub fn kind(&self) -> ConnectionKind {
        self.context.read().kind
    }

    pub fn is_local(&self) -> bool {
        self.kind() == ConnectionKind::Local
    }

    /// Connection a local connection is joined to
    pub fn peer(&self) -> Option<ConnectionId> {
        self.context.read().peer
    }

    pub fn local_connection_options(&self) -> LocalConnectionOptions {
        self.context.read().options.clone()
    }

    pub fn cname(&self) -> String {
        self.context.read().cname.clone()
    }

    pub fn current_state(&self) -> ConnectionState {
        self.context.read().state
    }

    /// Watch state changes as they are applied
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Wait until `predicate` holds for the current state.
    pub async fn wait_for_state<F>(&self, predicate: F) -> ConnectionResult<ConnectionState>
    where
        F: Fn(ConnectionState) -> bool,
    {
        let mut changes = self.state_rx.clone();
        let state = changes
            .wait_for(|state| predicate(*state))
            .await
            .map_err(|_| ConnectionError::Closed)?;
        Ok(*state)
    }

    pub fn is_open(&self) -> bool {
        self.current_state().is_established()
    }

    pub fn mode(&self) -> ConnectionMode {
        self.context.read().mode
    }

    /// Local description, empty until generated and after close
    pub fn local_description(&self) -> String {
        self.context.read().local_sdp.clone().unwrap_or_default()
    }

    /// Remote description, empty when none was supplied and after close
    pub fn remote_description(&self) -> String {
        self.context.read().remote_sdp.clone().unwrap_or_default()
    }

    pub fn negotiated_formats(&self) -> Vec<MediaFormat> {
        self.context.read().formats.clone()
    }

    /// Local RTP address while a session is bound
    pub fn local_rtp_address(&self) -> Option<SocketAddr> {
        self.context.read().session.as_ref().map(|s| s.local_address())
    }

    /// RTP counters of the bound session; zero when none is bound
    pub fn statistics(&self) -> SessionStatistics {
        self.context
            .read()
            .session
            .as_ref()
            .map(|s| s.statistics())
            .unwrap_or_default()
    }

    pub fn last_error(&self) -> Option<ConnectionError> {
        self.context.read().last_error.clone()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.hex_identifier())
            .field("call_id", &self.call_id.to_string())
            .field("state", &self.current_state())
            .finish()
    }
}
