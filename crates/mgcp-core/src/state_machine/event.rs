use crate::connection::LocalConnectionOptions;
use crate::errors::{ConnectionError, ConnectionResult};
use crate::media::{MediaDescription, RtpSession};
use crate::state_table::{ConnectionState, EventType, TimerScope};
use crate::types::{ConnectionId, ConnectionMode, MediaFormat};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::WeakUnboundedSender;
use tokio::sync::oneshot;

/// Completion channel of a facade call
pub type Responder<T> = oneshot::Sender<ConnectionResult<T>>;

/// Result of a renegotiation, applied when the `Opened` event is taken
#[derive(Debug, Clone, PartialEq)]
pub struct ModificationOutcome {
    pub mode: ConnectionMode,
    /// New remote description, `None` when only the mode changed
    pub remote_sdp: Option<String>,
    pub remote_media: Option<MediaDescription>,
    pub formats: Vec<MediaFormat>,
    pub local_sdp: String,
}

/// Typed data travelling with an event
#[derive(Default)]
pub enum EventPayload {
    #[default]
    None,
    Open {
        mode: ConnectionMode,
        remote_sdp: Option<String>,
        options: LocalConnectionOptions,
        responder: Option<Responder<String>>,
    },
    Modify {
        mode: Option<ConnectionMode>,
        remote_sdp: Option<String>,
        responder: Option<Responder<String>>,
    },
    Close {
        responder: Option<Responder<()>>,
    },
    Join {
        peer: ConnectionId,
        responder: Option<Responder<()>>,
    },
    RemoteParsed(MediaDescription),
    SessionAllocated(Arc<RtpSession>),
    FormatsNegotiated(Vec<MediaFormat>),
    LocalGenerated(String),
    Modified(ModificationOutcome),
    Failure(ConnectionError),
    TimerFired {
        scope: TimerScope,
        epoch: u64,
    },
}

impl EventPayload {
    /// Move the payload out, leaving `None` behind
    pub fn take(&mut self) -> EventPayload {
        std::mem::take(self)
    }

    /// Whether this payload introduces a remote description
    pub fn has_remote_sdp(&self) -> bool {
        match self {
            EventPayload::Open { remote_sdp, .. } | EventPayload::Modify { remote_sdp, .. } => remote_sdp.is_some(),
            EventPayload::Modified(outcome) => outcome.remote_sdp.is_some(),
            _ => false,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            EventPayload::None => "none",
            EventPayload::Open { .. } => "open",
            EventPayload::Modify { .. } => "modify",
            EventPayload::Close { .. } => "close",
            EventPayload::Join { .. } => "join",
            EventPayload::RemoteParsed(_) => "remote-parsed",
            EventPayload::SessionAllocated(_) => "session",
            EventPayload::FormatsNegotiated(_) => "formats",
            EventPayload::LocalGenerated(_) => "local-sdp",
            EventPayload::Modified(_) => "modified",
            EventPayload::Failure(_) => "failure",
            EventPayload::TimerFired { .. } => "timer",
        }
    }
}

impl fmt::Debug for EventPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventPayload::Failure(error) => write!(f, "Failure({})", error),
            EventPayload::TimerFired { scope, epoch } => write!(f, "TimerFired({}, #{})", scope, epoch),
            other => f.write_str(other.label()),
        }
    }
}

/// A queued signal for one connection's state machine
#[derive(Debug)]
pub struct TransitionEvent {
    pub event_type: EventType,
    pub payload: EventPayload,
    /// Set on events produced by entry actions; the event is dropped if the
    /// connection has left this state by the time it is processed.
    pub expected_state: Option<ConnectionState>,
}

impl TransitionEvent {
    pub fn new(event_type: EventType, payload: EventPayload) -> Self {
        TransitionEvent {
            event_type,
            payload,
            expected_state: None,
        }
    }

    pub fn failure(error: ConnectionError) -> Self {
        TransitionEvent::new(EventType::Failure, EventPayload::Failure(error))
    }

    pub fn timeout(scope: TimerScope, epoch: u64) -> Self {
        TransitionEvent::new(EventType::Timeout, EventPayload::TimerFired { scope, epoch })
    }

    pub fn expecting(mut self, state: ConnectionState) -> Self {
        self.expected_state = Some(state);
        self
    }
}

/// Queue an event through a weak sender. The event comes back when the
/// connection's worker is gone so the caller can dispose of its payload.
pub fn enqueue(events: &WeakUnboundedSender<TransitionEvent>, event: TransitionEvent) -> Result<(), TransitionEvent> {
    match events.upgrade() {
        Some(sender) => sender.send(event).map_err(|e| e.0),
        None => Err(event),
    }
}
