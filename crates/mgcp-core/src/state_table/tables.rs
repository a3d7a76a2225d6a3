use super::types::{
    Action, ConnectionState, ConnectionStateTable, EventType, Guard, StateKey, TimeoutSettings,
    TimeoutTransition, TimerScope, Transition,
};
use once_cell::sync::Lazy;
use std::sync::Arc;

use Action::*;
use ConnectionState as S;

/// Table built with default timeouts
pub static DEFAULT_TABLE: Lazy<Arc<ConnectionStateTable>> =
    Lazy::new(|| Arc::new(build_connection_table(&TimeoutSettings::default())));

const OPENING_STATES: [ConnectionState; 4] = [
    S::ParsingRemoteSdp,
    S::AllocatingSession,
    S::NegotiatingSession,
    S::GeneratingLocalSdp,
];

const CLOSABLE_STATES: [ConnectionState; 9] = [
    S::Idle,
    S::ParsingRemoteSdp,
    S::AllocatingSession,
    S::NegotiatingSession,
    S::GeneratingLocalSdp,
    S::Open,
    S::HalfOpen,
    S::Modifying,
    S::Failed,
];

/// Build the connection table with the given timer durations
pub fn build_connection_table(timeouts: &TimeoutSettings) -> ConnectionStateTable {
    let mut table = ConnectionStateTable::empty();
    add_opening_transitions(&mut table);
    add_modify_transitions(&mut table);
    add_close_transitions(&mut table);
    add_timeouts(&mut table, timeouts);
    table
}

fn add_opening_transitions(table: &mut ConnectionStateTable) {
    table.insert(
        StateKey::new(S::Idle, EventType::Open),
        Transition::to(S::ParsingRemoteSdp)
            .when(Guard::Remote)
            .when(Guard::HasRemoteSdp)
            .run(&[StoreOpenRequest, ParseRemoteDescription]),
    );
    table.insert(
        StateKey::new(S::Idle, EventType::Open),
        Transition::to(S::AllocatingSession)
            .when(Guard::Remote)
            .when(Guard::NoRemoteSdp)
            .run(&[StoreOpenRequest, AllocateSession]),
    );
    // Local connections hold no media of their own and wait for a peer.
    table.insert(
        StateKey::new(S::Idle, EventType::Open),
        Transition::to(S::HalfOpen)
            .when(Guard::Local)
            .when(Guard::NoRemoteSdp)
            .run(&[StoreOpenRequest, NotifyOpened]),
    );

    table.insert(
        StateKey::new(S::ParsingRemoteSdp, EventType::ParsedRemoteSdp),
        Transition::to(S::AllocatingSession).run(&[StoreRemoteDescription, AllocateSession]),
    );

    table.insert(
        StateKey::new(S::AllocatingSession, EventType::AllocatedSession),
        Transition::to(S::NegotiatingSession)
            .when(Guard::HasRemoteSdp)
            .run(&[StoreSession, NegotiateSession]),
    );
    table.insert(
        StateKey::new(S::AllocatingSession, EventType::AllocatedSession),
        Transition::to(S::GeneratingLocalSdp)
            .when(Guard::NoRemoteSdp)
            .run(&[StoreSession, GenerateLocalDescription]),
    );

    table.insert(
        StateKey::new(S::NegotiatingSession, EventType::SessionNegotiated),
        Transition::to(S::GeneratingLocalSdp).run(&[StoreNegotiatedFormats, GenerateLocalDescription]),
    );

    table.insert(
        StateKey::new(S::GeneratingLocalSdp, EventType::GeneratedLocalSdp),
        Transition::to(S::Open)
            .when(Guard::HasRemoteSdp)
            .run(&[StoreLocalDescription, NotifyOpened]),
    );
    table.insert(
        StateKey::new(S::GeneratingLocalSdp, EventType::GeneratedLocalSdp),
        Transition::to(S::HalfOpen)
            .when(Guard::NoRemoteSdp)
            .run(&[StoreLocalDescription, NotifyOpened]),
    );

    // Any failure while opening leaves the connection unusable.
    for state in OPENING_STATES {
        table.insert(
            StateKey::new(state, EventType::Failure),
            Transition::to(S::Corrupted).run(&[RecordFailure, ReleaseSession, ReleaseResources, NotifyFailure]),
        );
    }
}

fn add_modify_transitions(table: &mut ConnectionStateTable) {
    for state in [S::Open, S::HalfOpen] {
        table.insert(
            StateKey::new(state, EventType::Modify),
            Transition::to(S::Modifying)
                .when(Guard::Remote)
                .run(&[StoreModifyRequest, Renegotiate]),
        );
        table.insert(
            StateKey::new(state, EventType::Modify),
            Transition::stay()
                .when(Guard::Local)
                .when(Guard::NoRemoteSdp)
                .run(&[ApplyLocalMode]),
        );
        table.insert(
            StateKey::new(state, EventType::Join),
            Transition::to(S::Open).when(Guard::Local).run(&[JoinPeer]),
        );
        table.insert(
            StateKey::new(state, EventType::Failure),
            Transition::to(S::Failed).run(&[RecordFailure]),
        );
    }

    table.insert(
        StateKey::new(S::Modifying, EventType::Opened),
        Transition::to(S::Open)
            .when(Guard::HasRemoteSdp)
            .run(&[ApplyModification, NotifyOpened]),
    );
    table.insert(
        StateKey::new(S::Modifying, EventType::Opened),
        Transition::to(S::HalfOpen)
            .when(Guard::NoRemoteSdp)
            .run(&[ApplyModification, NotifyOpened]),
    );
    table.insert(
        StateKey::new(S::Modifying, EventType::Failure),
        Transition::to(S::Failed).run(&[RecordFailure, NotifyFailure]),
    );
}

fn add_close_transitions(table: &mut ConnectionStateTable) {
    for state in CLOSABLE_STATES {
        table.insert(
            StateKey::new(state, EventType::Close),
            Transition::to(S::Closing).run(&[CancelPendingOperation, QueueCloseResponder, CloseSession]),
        );
    }

    // A second close waits for the first one instead of releasing again.
    table.insert(
        StateKey::new(S::Closing, EventType::Close),
        Transition::stay().run(&[QueueCloseResponder]),
    );
    for event in [EventType::SessionClosed, EventType::Closed, EventType::Failure] {
        table.insert(
            StateKey::new(S::Closing, event),
            Transition::to(S::Closed).run(&[ReleaseResources, NotifyClosed]),
        );
    }

    for state in [S::Closed, S::Corrupted] {
        table.insert(
            StateKey::new(state, EventType::Close),
            Transition::stay().run(&[AcknowledgeClose]),
        );
    }
}

fn add_timeouts(table: &mut ConnectionStateTable, timeouts: &TimeoutSettings) {
    for scope in [TimerScope::Opening, TimerScope::Modifying] {
        table.insert_timeout(
            scope,
            TimeoutTransition {
                duration: timeouts.response,
                next_state: S::Failed,
                actions: vec![RecordFailure, NotifyFailure],
            },
        );
    }

    let idle_limits = [
        (TimerScope::HalfOpen, timeouts.half_open),
        (TimerScope::Open, timeouts.open),
    ];
    for (scope, limit) in idle_limits {
        if let Some(duration) = limit {
            table.insert_timeout(
                scope,
                TimeoutTransition {
                    duration,
                    next_state: S::Closing,
                    actions: vec![CloseSession],
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_table::types::GuardInput;
    use std::time::Duration;

    #[test]
    fn default_table_is_valid() {
        DEFAULT_TABLE.validate().unwrap();
    }

    #[test]
    fn open_selects_by_remote_description() {
        let key = StateKey::new(S::Idle, EventType::Open);
        let with_remote = GuardInput {
            event_has_remote: true,
            ..GuardInput::default()
        };
        let without_remote = GuardInput::default();

        assert_eq!(
            DEFAULT_TABLE.select(&key, &with_remote).and_then(|t| t.next_state),
            Some(S::ParsingRemoteSdp)
        );
        assert_eq!(
            DEFAULT_TABLE.select(&key, &without_remote).and_then(|t| t.next_state),
            Some(S::AllocatingSession)
        );
    }

    #[test]
    fn local_connections_skip_media_setup() {
        let local = GuardInput {
            is_local: true,
            ..GuardInput::default()
        };
        let local_with_remote = GuardInput {
            event_has_remote: true,
            is_local: true,
            ..GuardInput::default()
        };

        let open = StateKey::new(S::Idle, EventType::Open);
        assert_eq!(DEFAULT_TABLE.select(&open, &local).and_then(|t| t.next_state), Some(S::HalfOpen));
        assert!(DEFAULT_TABLE.select(&open, &local_with_remote).is_none());

        let join = StateKey::new(S::HalfOpen, EventType::Join);
        assert_eq!(DEFAULT_TABLE.select(&join, &local).and_then(|t| t.next_state), Some(S::Open));
        assert!(DEFAULT_TABLE.select(&join, &GuardInput::default()).is_none());

        let modify = StateKey::new(S::Open, EventType::Modify);
        let transition = DEFAULT_TABLE.select(&modify, &local).unwrap();
        assert_eq!(transition.next_state, None);
        assert_eq!(transition.actions, vec![ApplyLocalMode]);
        assert!(DEFAULT_TABLE.select(&modify, &local_with_remote).is_none());
        assert_eq!(
            DEFAULT_TABLE.select(&modify, &GuardInput::default()).and_then(|t| t.next_state),
            Some(S::Modifying)
        );
    }

    #[test]
    fn idle_timeouts_follow_settings() {
        let table = build_connection_table(&TimeoutSettings {
            response: Duration::from_millis(100),
            half_open: None,
            open: Some(Duration::from_secs(60)),
        });

        assert!(table.timeout(TimerScope::HalfOpen).is_none());
        assert_eq!(table.timeout(TimerScope::Open).map(|t| t.next_state), Some(S::Closing));
        assert_eq!(
            table.timeout(TimerScope::Opening).map(|t| t.duration),
            Some(Duration::from_millis(100))
        );
    }

    #[test]
    fn validation_reports_dead_ends() {
        let mut table = ConnectionStateTable::empty();
        table.insert(
            StateKey::new(S::Idle, EventType::Open),
            Transition::to(S::HalfOpen),
        );
        let errors = table.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("HALF_OPEN has no exit")));
        assert!(errors.iter().any(|e| e.contains("IDLE cannot be closed")));
    }
}
