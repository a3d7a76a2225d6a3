use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;

/// Lifecycle state of a connection
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum ConnectionState {
    Idle,
    ParsingRemoteSdp,
    AllocatingSession,
    NegotiatingSession,
    GeneratingLocalSdp,
    Open,
    HalfOpen,
    Modifying,
    Failed,
    Closing,
    Closed,
    Corrupted,
}

impl ConnectionState {
    pub const ALL: [ConnectionState; 12] = [
        ConnectionState::Idle,
        ConnectionState::ParsingRemoteSdp,
        ConnectionState::AllocatingSession,
        ConnectionState::NegotiatingSession,
        ConnectionState::GeneratingLocalSdp,
        ConnectionState::Open,
        ConnectionState::HalfOpen,
        ConnectionState::Modifying,
        ConnectionState::Failed,
        ConnectionState::Closing,
        ConnectionState::Closed,
        ConnectionState::Corrupted,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "IDLE",
            ConnectionState::ParsingRemoteSdp => "PARSING_REMOTE_SDP",
            ConnectionState::AllocatingSession => "ALLOCATING_SESSION",
            ConnectionState::NegotiatingSession => "NEGOTIATING_SESSION",
            ConnectionState::GeneratingLocalSdp => "GENERATING_LOCAL_SDP",
            ConnectionState::Open => "OPEN",
            ConnectionState::HalfOpen => "HALF_OPEN",
            ConnectionState::Modifying => "MODIFYING",
            ConnectionState::Failed => "FAILED",
            ConnectionState::Closing => "CLOSING",
            ConnectionState::Closed => "CLOSED",
            ConnectionState::Corrupted => "CORRUPTED",
        }
    }

    /// Sub-states of the opening sequence
    pub fn is_opening(&self) -> bool {
        matches!(
            self,
            ConnectionState::ParsingRemoteSdp
                | ConnectionState::AllocatingSession
                | ConnectionState::NegotiatingSession
                | ConnectionState::GeneratingLocalSdp
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Closed | ConnectionState::Corrupted)
    }

    /// Open or half-open
    pub fn is_established(&self) -> bool {
        matches!(self, ConnectionState::Open | ConnectionState::HalfOpen)
    }

    /// Timer scope this state belongs to, if any
    pub fn timer_scope(&self) -> Option<TimerScope> {
        match self {
            s if s.is_opening() => Some(TimerScope::Opening),
            ConnectionState::Modifying => Some(TimerScope::Modifying),
            ConnectionState::HalfOpen => Some(TimerScope::HalfOpen),
            ConnectionState::Open => Some(TimerScope::Open),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Group of states sharing one armed timeout
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum TimerScope {
    Opening,
    Modifying,
    HalfOpen,
    Open,
}

impl fmt::Display for TimerScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimerScope::Opening => "OPENING",
            TimerScope::Modifying => "MODIFYING",
            TimerScope::HalfOpen => "HALF_OPEN",
            TimerScope::Open => "OPEN",
        };
        f.write_str(name)
    }
}

/// Signals that drive the state machine
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum EventType {
    Open,
    ParsedRemoteSdp,
    AllocatedSession,
    SessionNegotiated,
    GeneratedLocalSdp,
    Modify,
    Opened,
    Join,
    Close,
    SessionClosed,
    Closed,
    Failure,
    Timeout,
}

impl EventType {
    pub fn type_name(&self) -> &'static str {
        match self {
            EventType::Open => "OPEN",
            EventType::ParsedRemoteSdp => "PARSED_REMOTE_SDP",
            EventType::AllocatedSession => "ALLOCATED_SESSION",
            EventType::SessionNegotiated => "SESSION_NEGOTIATED",
            EventType::GeneratedLocalSdp => "GENERATED_LOCAL_SDP",
            EventType::Modify => "MODIFY",
            EventType::Opened => "OPENED",
            EventType::Join => "JOIN",
            EventType::Close => "CLOSE",
            EventType::SessionClosed => "SESSION_CLOSED",
            EventType::Closed => "CLOSED",
            EventType::Failure => "FAILURE",
            EventType::Timeout => "TIMEOUT",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Key for looking up transitions in the state table
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct StateKey {
    pub state: ConnectionState,
    pub event: EventType,
}

impl StateKey {
    pub fn new(state: ConnectionState, event: EventType) -> Self {
        StateKey { state, event }
    }
}

/// Facts a guard can inspect
#[derive(Debug, Clone, Copy, Default)]
pub struct GuardInput {
    /// The event itself carries a remote description
    pub event_has_remote: bool,
    /// The connection already holds a remote description
    pub context_has_remote: bool,
    /// The connection is a local (joined) connection
    pub is_local: bool,
}

/// Conditions that must hold for a transition to be taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Guard {
    HasRemoteSdp,
    NoRemoteSdp,
    Local,
    Remote,
}

impl Guard {
    pub fn evaluate(&self, input: &GuardInput) -> bool {
        let has_remote = input.event_has_remote || input.context_has_remote;
        match self {
            Guard::HasRemoteSdp => has_remote,
            Guard::NoRemoteSdp => !has_remote,
            Guard::Local => input.is_local,
            Guard::Remote => !input.is_local,
        }
    }
}

/// Entry actions run when a transition is taken, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    // Opening
    StoreOpenRequest,
    ParseRemoteDescription,
    StoreRemoteDescription,
    AllocateSession,
    StoreSession,
    NegotiateSession,
    StoreNegotiatedFormats,
    GenerateLocalDescription,
    StoreLocalDescription,
    NotifyOpened,

    // Modifying
    StoreModifyRequest,
    Renegotiate,
    ApplyModification,

    // Local connections
    JoinPeer,
    ApplyLocalMode,

    // Failure handling
    RecordFailure,
    NotifyFailure,
    ReleaseSession,

    // Closing
    CancelPendingOperation,
    QueueCloseResponder,
    CloseSession,
    ReleaseResources,
    NotifyClosed,
    AcknowledgeClose,
}

/// Transition definition: what happens when an event occurs in a state
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// All must hold for this transition to be selected
    pub guards: Vec<Guard>,
    pub actions: Vec<Action>,
    /// `None` keeps the current state
    pub next_state: Option<ConnectionState>,
}

impl Transition {
    pub fn to(next_state: ConnectionState) -> Self {
        Transition {
            guards: Vec::new(),
            actions: Vec::new(),
            next_state: Some(next_state),
        }
    }

    pub fn stay() -> Self {
        Transition {
            guards: Vec::new(),
            actions: Vec::new(),
            next_state: None,
        }
    }

    pub fn when(mut self, guard: Guard) -> Self {
        self.guards.push(guard);
        self
    }

    pub fn run(mut self, actions: &[Action]) -> Self {
        self.actions.extend_from_slice(actions);
        self
    }

    pub fn is_allowed(&self, input: &GuardInput) -> bool {
        self.guards.iter().all(|guard| guard.evaluate(input))
    }
}

/// What happens when a timer scope expires
#[derive(Debug, Clone, PartialEq)]
pub struct TimeoutTransition {
    pub duration: Duration,
    pub next_state: ConnectionState,
    pub actions: Vec<Action>,
}

/// Durations of the per-scope timers; `None` leaves a scope unarmed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutSettings {
    pub response: Duration,
    pub half_open: Option<Duration>,
    pub open: Option<Duration>,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        TimeoutSettings {
            response: Duration::from_millis(5000),
            half_open: Some(Duration::from_millis(30_000)),
            open: None,
        }
    }
}

/// The complete transition table of a connection
#[derive(Debug, Clone, Default)]
pub struct ConnectionStateTable {
    transitions: HashMap<StateKey, Vec<Transition>>,
    timeouts: HashMap<TimerScope, TimeoutTransition>,
}

impl ConnectionStateTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Add a candidate transition; candidates are tried in insertion order.
    pub fn insert(&mut self, key: StateKey, transition: Transition) {
        self.transitions.entry(key).or_default().push(transition);
    }

    pub fn insert_timeout(&mut self, scope: TimerScope, timeout: TimeoutTransition) {
        self.timeouts.insert(scope, timeout);
    }

    /// All candidates for a key
    pub fn get(&self, key: &StateKey) -> Option<&[Transition]> {
        self.transitions.get(key).map(Vec::as_slice)
    }

    /// First candidate whose guards hold
    pub fn select(&self, key: &StateKey, input: &GuardInput) -> Option<&Transition> {
        self.get(key)?.iter().find(|t| t.is_allowed(input))
    }

    pub fn has_transition(&self, key: &StateKey) -> bool {
        self.transitions.contains_key(key)
    }

    pub fn timeout(&self, scope: TimerScope) -> Option<&TimeoutTransition> {
        self.timeouts.get(&scope)
    }

    pub fn transition_count(&self) -> usize {
        self.transitions.values().map(Vec::len).sum()
    }

    /// Every state referenced as a source or target
    pub fn collect_used_states(&self) -> HashSet<ConnectionState> {
        let mut states = HashSet::new();
        for (key, candidates) in &self.transitions {
            states.insert(key.state);
            states.extend(candidates.iter().filter_map(|t| t.next_state));
        }
        states.extend(self.timeouts.values().map(|t| t.next_state));
        states
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        for state in self.collect_used_states() {
            if state.is_terminal() {
                continue;
            }
            let has_exit = self
                .transitions
                .iter()
                .any(|(key, candidates)| {
                    key.state == state && candidates.iter().any(|t| t.next_state.is_some_and(|n| n != state))
                });
            if !has_exit {
                errors.push(format!("State {} has no exit transition", state));
            }
            if !self.has_transition(&StateKey::new(state, EventType::Close)) {
                errors.push(format!("State {} cannot be closed", state));
            }
        }

        for (scope, timeout) in &self.timeouts {
            if timeout.duration.is_zero() {
                errors.push(format!("Timer scope {} has a zero duration", scope));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
