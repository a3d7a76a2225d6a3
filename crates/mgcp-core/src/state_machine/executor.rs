use crate::connection::ConnectionContext;
use crate::errors::{ConnectionError, ConnectionResult};
use crate::media::{SdpCodec, SessionNegotiator};
use crate::state_table::{
    Action, ConnectionState, ConnectionStateTable, EventType, GuardInput, StateKey, TimerScope,
};
use crate::timer::{Scheduler, TimerHandle};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, WeakUnboundedSender};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use super::actions;
use super::event::{enqueue, EventPayload, Responder, TransitionEvent};

/// Collaborators shared by every connection built from the same factory
#[derive(Clone)]
pub struct ConnectionServices {
    pub negotiator: Arc<dyn SessionNegotiator>,
    pub sdp: Arc<dyn SdpCodec>,
    pub scheduler: Arc<dyn Scheduler>,
}

/// Result of processing one event
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessEventResult {
    pub old_state: ConnectionState,
    pub next_state: ConnectionState,
    /// `false` when the event was stale and dropped
    pub transition_applied: bool,
    pub actions_executed: Vec<Action>,
}

impl ProcessEventResult {
    fn ignored(state: ConnectionState) -> Self {
        ProcessEventResult {
            old_state: state,
            next_state: state,
            transition_applied: false,
            actions_executed: Vec::new(),
        }
    }
}

/// Callers waiting on the connection
#[derive(Default)]
pub(crate) struct PendingOperations {
    /// The in-flight open or modify
    pub operation: Option<Responder<String>>,
    pub close_waiters: Vec<Responder<()>>,
}

struct ArmedTimer {
    scope: TimerScope,
    epoch: u64,
    _handle: TimerHandle,
}

/// Single-writer interpreter of the connection table.
///
/// One instance exists per connection and runs on its own task, taking
/// events off the queue one at a time. Entry actions never wait on the
/// negotiator: they spawn the work and the outcome comes back as a new
/// event carrying the state it was started from.
pub struct StateMachine {
    table: Arc<ConnectionStateTable>,
    pub(crate) context: Arc<RwLock<ConnectionContext>>,
    pub(crate) services: ConnectionServices,
    pub(crate) events: WeakUnboundedSender<TransitionEvent>,
    pub(crate) pending: PendingOperations,
    state_tx: watch::Sender<ConnectionState>,
    timer: Option<ArmedTimer>,
    epoch: u64,
}

impl StateMachine {
    pub fn new(
        table: Arc<ConnectionStateTable>,
        context: Arc<RwLock<ConnectionContext>>,
        services: ConnectionServices,
        events: &UnboundedSender<TransitionEvent>,
        state_tx: watch::Sender<ConnectionState>,
    ) -> Self {
        StateMachine {
            table,
            context,
            services,
            events: events.downgrade(),
            pending: PendingOperations::default(),
            state_tx,
            timer: None,
            epoch: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.context.read().state
    }

    pub fn has_transition(&self, key: &StateKey) -> bool {
        self.table.has_transition(key)
    }

    /// Apply one event.
    ///
    /// Returns `UnknownTransition` when the table has nothing for the
    /// current state and event; the state is left untouched and the event's
    /// caller, if any, receives the same error.
    pub fn process_event(&mut self, event: TransitionEvent) -> ConnectionResult<ProcessEventResult> {
        let current = self.state();
        let TransitionEvent {
            event_type,
            mut payload,
            expected_state,
        } = event;
        let id = self.context.read().id;

        if let Some(expected) = expected_state {
            if expected != current {
                debug!(
                    "Connection {}: dropping stale {} (issued in {}, now {})",
                    id, event_type, expected, current
                );
                self.dispose(payload);
                return Ok(ProcessEventResult::ignored(current));
            }
        }

        if event_type == EventType::Timeout {
            return Ok(self.process_timeout(current, payload));
        }

        let input = {
            let ctx = self.context.read();
            GuardInput {
                event_has_remote: payload.has_remote_sdp(),
                context_has_remote: ctx.remote_sdp.is_some(),
                is_local: ctx.is_local(),
            }
        };
        let key = StateKey::new(current, event_type);
        let Some(transition) = self.table.select(&key, &input).cloned() else {
            let error = ConnectionError::UnknownTransition {
                state: current,
                event: event_type,
            };
            warn!("Connection {}: {}", id, error);
            self.reject(payload, error.clone());
            return Err(error);
        };

        let next = transition.next_state.unwrap_or(current);
        Ok(self.apply(current, next, &transition.actions, &mut payload))
    }

    fn process_timeout(&mut self, current: ConnectionState, payload: EventPayload) -> ProcessEventResult {
        let EventPayload::TimerFired { scope, epoch } = payload else {
            return ProcessEventResult::ignored(current);
        };

        let live = matches!(&self.timer, Some(armed) if armed.scope == scope && armed.epoch == epoch)
            && current.timer_scope() == Some(scope);
        if !live {
            debug!("Discarding stale {} timer #{}", scope, epoch);
            return ProcessEventResult::ignored(current);
        }
        self.timer = None;

        let Some(timeout) = self.table.timeout(scope).cloned() else {
            return ProcessEventResult::ignored(current);
        };
        let timeout_ms = u64::try_from(timeout.duration.as_millis()).unwrap_or(u64::MAX);
        warn!(
            "Connection {}: {} timer expired after {} ms",
            self.context.read().id,
            scope,
            timeout_ms
        );

        let mut payload = EventPayload::Failure(ConnectionError::Timeout { timeout_ms });
        self.apply(current, timeout.next_state, &timeout.actions, &mut payload)
    }

    fn apply(
        &mut self,
        current: ConnectionState,
        next: ConnectionState,
        actions: &[Action],
        payload: &mut EventPayload,
    ) -> ProcessEventResult {
        if next != current {
            self.context.write().state = next;
            self.state_tx.send_replace(next);
            info!("Connection {}: {} -> {}", self.context.read().id, current, next);
        }
        self.sync_timer(current, next);

        for action in actions {
            debug!("Executing action {:?}", action);
            actions::execute_action(*action, payload, self, next);
        }
        self.dispose(payload.take());

        ProcessEventResult {
            old_state: current,
            next_state: next,
            transition_applied: true,
            actions_executed: actions.to_vec(),
        }
    }

    /// Re-arm the timer when the state moved to a different timer scope.
    fn sync_timer(&mut self, old: ConnectionState, new: ConnectionState) {
        let new_scope = new.timer_scope();
        if old.timer_scope() == new_scope {
            return;
        }
        self.timer = None;

        let Some(scope) = new_scope else { return };
        let Some(timeout) = self.table.timeout(scope) else { return };

        self.epoch += 1;
        let epoch = self.epoch;
        let events = self.events.clone();
        let task = Box::new(move || {
            let _ = enqueue(&events, TransitionEvent::timeout(scope, epoch));
        });

        match self.services.scheduler.schedule(timeout.duration, task) {
            Ok(handle) => {
                debug!("Armed {} timer #{} for {:?}", scope, epoch, timeout.duration);
                self.timer = Some(ArmedTimer {
                    scope,
                    epoch,
                    _handle: handle,
                });
            }
            Err(error) => {
                warn!("Could not arm {} timer: {}", scope, error);
                let _ = enqueue(&self.events, TransitionEvent::failure(error).expecting(new));
            }
        }
    }

    /// Answer the caller of an event that cannot be applied.
    fn reject(&self, payload: EventPayload, error: ConnectionError) {
        match payload {
            EventPayload::Open { responder, .. } | EventPayload::Modify { responder, .. } => {
                reply(responder, Err(error));
            }
            EventPayload::Close { responder } | EventPayload::Join { responder, .. } => {
                reply(responder, Err(error))
            }
            other => self.dispose(other),
        }
    }

    /// Release anything a dropped payload still owns.
    fn dispose(&self, payload: EventPayload) {
        if let EventPayload::SessionAllocated(session) = payload {
            let negotiator = self.services.negotiator.clone();
            debug!("Releasing orphaned session on {}", session.local_address());
            tokio::spawn(async move {
                if let Err(e) = negotiator.close(&session).await {
                    warn!("Failed to release orphaned session: {}", e);
                }
            });
        }
    }

    /// Drain the queue until every facade handle is gone, then release what is left.
    pub async fn run(mut self, mut events: UnboundedReceiver<TransitionEvent>) {
        while let Some(event) = events.recv().await {
            if let Err(e) = self.process_event(event) {
                debug!("Event rejected: {}", e);
            }
        }
        self.shutdown().await;
    }

    async fn shutdown(&mut self) {
        self.timer = None;
        reply(self.pending.operation.take(), Err(ConnectionError::Closed));
        for waiter in self.pending.close_waiters.drain(..) {
            let _ = waiter.send(Err(ConnectionError::Closed));
        }

        let (id, session) = {
            let mut ctx = self.context.write();
            (ctx.id, ctx.session.take())
        };
        if let Some(session) = session {
            debug!("Connection {} dropped while holding a session, releasing it", id);
            if let Err(e) = self.services.negotiator.close(&session).await {
                warn!("Connection {}: session release failed: {}", id, e);
            }
        }
    }
}

pub(crate) fn reply<T>(responder: Option<oneshot::Sender<ConnectionResult<T>>>, result: ConnectionResult<T>) {
    if let Some(responder) = responder {
        let _ = responder.send(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::LocalConnectionOptions;
    use crate::media::{BasicSdpCodec, PortPool, PortRange, RtpSessionNegotiator, StaticCodecCapabilities};
    use crate::state_table::DEFAULT_TABLE;
    use crate::timer::TokioScheduler;
    use crate::types::{CallId, ConnectionId, ConnectionMode};
    use tokio::sync::mpsc;

    fn machine(events: &UnboundedSender<TransitionEvent>) -> StateMachine {
        let negotiator = RtpSessionNegotiator::new(
            Arc::new(PortPool::new(PortRange::new(41000, 41010))),
            Arc::new(StaticCodecCapabilities::from_names(&["PCMU"])),
        );
        let services = ConnectionServices {
            negotiator: Arc::new(negotiator),
            sdp: Arc::new(BasicSdpCodec::new()),
            scheduler: Arc::new(TokioScheduler::new()),
        };
        let context = ConnectionContext::new(
            ConnectionId::new(1),
            CallId::new(1),
            "executor-test",
            "127.0.0.1".parse().unwrap(),
            None,
        );
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        StateMachine::new(
            DEFAULT_TABLE.clone(),
            Arc::new(RwLock::new(context)),
            services,
            events,
            state_tx,
        )
    }

    fn open_event() -> TransitionEvent {
        TransitionEvent::new(
            EventType::Open,
            EventPayload::Open {
                mode: ConnectionMode::SendRecv,
                remote_sdp: None,
                options: LocalConnectionOptions::default(),
                responder: None,
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_timers_are_ignored() {
        let (events, _queue) = mpsc::unbounded_channel();
        let mut machine = machine(&events);

        let opened = machine.process_event(open_event()).unwrap();
        assert_eq!(opened.next_state, ConnectionState::AllocatingSession);

        // Epoch 1 is the armed opening timer; anything else is stale
        for (scope, epoch) in [(TimerScope::Opening, 0), (TimerScope::HalfOpen, 1), (TimerScope::Opening, 2)] {
            let result = machine.process_event(TransitionEvent::timeout(scope, epoch)).unwrap();
            assert!(!result.transition_applied, "{} #{}", scope, epoch);
            assert_eq!(result.next_state, ConnectionState::AllocatingSession);
            assert!(result.actions_executed.is_empty());
        }
        assert_eq!(machine.state(), ConnectionState::AllocatingSession);

        let expired = machine.process_event(TransitionEvent::timeout(TimerScope::Opening, 1)).unwrap();
        assert!(expired.transition_applied);
        assert_eq!(expired.next_state, ConnectionState::Failed);
        assert_eq!(
            machine.context.read().last_error,
            Some(ConnectionError::Timeout { timeout_ms: 5000 })
        );

        // The same timer cannot fire twice
        let again = machine.process_event(TransitionEvent::timeout(TimerScope::Opening, 1)).unwrap();
        assert!(!again.transition_applied);
        assert_eq!(machine.state(), ConnectionState::Failed);
    }

    #[tokio::test]
    async fn results_from_a_left_state_are_dropped() {
        let (events, _queue) = mpsc::unbounded_channel();
        let mut machine = machine(&events);
        machine.process_event(open_event()).unwrap();

        let late = TransitionEvent::new(EventType::GeneratedLocalSdp, EventPayload::LocalGenerated("v=0".into()))
            .expecting(ConnectionState::GeneratingLocalSdp);
        let result = machine.process_event(late).unwrap();

        assert!(!result.transition_applied);
        assert_eq!(machine.state(), ConnectionState::AllocatingSession);
        assert_eq!(machine.context.read().local_sdp, None);
    }
}
