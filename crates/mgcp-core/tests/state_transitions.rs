use rvoip_mgcp_core::state_table::*;
use std::time::Duration;

fn next(table: &ConnectionStateTable, state: ConnectionState, event: EventType, input: GuardInput) -> Option<ConnectionState> {
    table
        .select(&StateKey::new(state, event), &input)
        .map(|transition| transition.next_state.unwrap_or(state))
}

fn with_remote() -> GuardInput {
    GuardInput {
        context_has_remote: true,
        ..GuardInput::default()
    }
}

#[test]
fn test_answer_flow() {
    let table = &**DEFAULT_TABLE;
    let offer = GuardInput {
        event_has_remote: true,
        ..GuardInput::default()
    };

    assert_eq!(
        next(table, ConnectionState::Idle, EventType::Open, offer),
        Some(ConnectionState::ParsingRemoteSdp)
    );
    assert_eq!(
        next(table, ConnectionState::ParsingRemoteSdp, EventType::ParsedRemoteSdp, with_remote()),
        Some(ConnectionState::AllocatingSession)
    );
    assert_eq!(
        next(table, ConnectionState::AllocatingSession, EventType::AllocatedSession, with_remote()),
        Some(ConnectionState::NegotiatingSession)
    );
    assert_eq!(
        next(table, ConnectionState::NegotiatingSession, EventType::SessionNegotiated, with_remote()),
        Some(ConnectionState::GeneratingLocalSdp)
    );
    assert_eq!(
        next(table, ConnectionState::GeneratingLocalSdp, EventType::GeneratedLocalSdp, with_remote()),
        Some(ConnectionState::Open)
    );
}

#[test]
fn test_offer_flow() {
    let table = &**DEFAULT_TABLE;
    let none = GuardInput::default();

    assert_eq!(
        next(table, ConnectionState::Idle, EventType::Open, none),
        Some(ConnectionState::AllocatingSession)
    );
    assert_eq!(
        next(table, ConnectionState::AllocatingSession, EventType::AllocatedSession, none),
        Some(ConnectionState::GeneratingLocalSdp)
    );
    assert_eq!(
        next(table, ConnectionState::GeneratingLocalSdp, EventType::GeneratedLocalSdp, none),
        Some(ConnectionState::HalfOpen)
    );
}

#[test]
fn test_opening_failures_corrupt_and_release() {
    let table = &**DEFAULT_TABLE;
    for state in [
        ConnectionState::ParsingRemoteSdp,
        ConnectionState::AllocatingSession,
        ConnectionState::NegotiatingSession,
        ConnectionState::GeneratingLocalSdp,
    ] {
        let transition = table
            .select(&StateKey::new(state, EventType::Failure), &GuardInput::default())
            .expect("opening states handle failure");
        assert_eq!(transition.next_state, Some(ConnectionState::Corrupted));
        assert!(transition.actions.contains(&Action::ReleaseSession));
        assert!(transition.actions.contains(&Action::NotifyFailure));
    }
}

#[test]
fn test_modify_flow() {
    let table = &**DEFAULT_TABLE;
    let none = GuardInput::default();

    for state in [ConnectionState::Open, ConnectionState::HalfOpen] {
        let transition = table
            .select(&StateKey::new(state, EventType::Modify), &none)
            .expect("established states accept modify");
        assert_eq!(transition.next_state, Some(ConnectionState::Modifying));
        assert_eq!(transition.actions, vec![Action::StoreModifyRequest, Action::Renegotiate]);
    }

    assert_eq!(
        next(table, ConnectionState::Modifying, EventType::Opened, with_remote()),
        Some(ConnectionState::Open)
    );
    assert_eq!(
        next(table, ConnectionState::Modifying, EventType::Opened, none),
        Some(ConnectionState::HalfOpen)
    );
    assert_eq!(
        next(table, ConnectionState::Modifying, EventType::Failure, none),
        Some(ConnectionState::Failed)
    );
    assert_eq!(
        next(table, ConnectionState::Open, EventType::Failure, none),
        Some(ConnectionState::Failed)
    );
}

#[test]
fn test_every_live_state_can_close() {
    let table = &**DEFAULT_TABLE;
    for state in ConnectionState::ALL {
        let target = next(table, state, EventType::Close, GuardInput::default());
        let expected = match state {
            ConnectionState::Closed | ConnectionState::Corrupted => state,
            _ => ConnectionState::Closing,
        };
        assert_eq!(target, Some(expected), "close from {}", state);
    }
}

#[test]
fn test_repeated_close_does_not_release_again() {
    let table = &**DEFAULT_TABLE;
    let transition = table
        .select(&StateKey::new(ConnectionState::Closing, EventType::Close), &GuardInput::default())
        .unwrap();
    assert_eq!(transition.next_state, None);
    assert!(!transition.actions.contains(&Action::CloseSession));

    for event in [EventType::SessionClosed, EventType::Closed, EventType::Failure] {
        assert_eq!(
            next(table, ConnectionState::Closing, event, GuardInput::default()),
            Some(ConnectionState::Closed)
        );
    }
}

#[test]
fn test_local_connection_flow() {
    let table = &**DEFAULT_TABLE;
    let local = GuardInput {
        is_local: true,
        ..GuardInput::default()
    };

    let open = table
        .select(&StateKey::new(ConnectionState::Idle, EventType::Open), &local)
        .unwrap();
    assert_eq!(open.next_state, Some(ConnectionState::HalfOpen));
    assert!(!open.actions.contains(&Action::AllocateSession));

    assert_eq!(
        next(table, ConnectionState::HalfOpen, EventType::Join, local),
        Some(ConnectionState::Open)
    );
    assert_eq!(next(table, ConnectionState::Open, EventType::Join, local), Some(ConnectionState::Open));
    assert_eq!(next(table, ConnectionState::HalfOpen, EventType::Join, GuardInput::default()), None);
    assert_eq!(next(table, ConnectionState::Open, EventType::Modify, local), Some(ConnectionState::Open));
    assert_eq!(
        next(
            table,
            ConnectionState::Open,
            EventType::Modify,
            GuardInput {
                event_has_remote: true,
                is_local: true,
                ..GuardInput::default()
            }
        ),
        None
    );
    assert_eq!(next(table, ConnectionState::Open, EventType::Close, local), Some(ConnectionState::Closing));
}

#[test]
fn test_undefined_pairs_have_no_transition() {
    let table = &**DEFAULT_TABLE;
    let undefined = [
        (ConnectionState::Idle, EventType::Modify),
        (ConnectionState::Closed, EventType::Open),
        (ConnectionState::Corrupted, EventType::Modify),
        (ConnectionState::Failed, EventType::Modify),
        (ConnectionState::Open, EventType::Open),
        (ConnectionState::Idle, EventType::Join),
        (ConnectionState::Modifying, EventType::Join),
    ];
    for (state, event) in undefined {
        assert!(!table.has_transition(&StateKey::new(state, event)), "{} + {}", state, event);
    }
}

#[test]
fn test_timeouts_follow_settings() {
    let table = build_connection_table(&TimeoutSettings {
        response: Duration::from_millis(250),
        half_open: None,
        open: Some(Duration::from_secs(60)),
    });
    table.validate().unwrap();

    let opening = table.timeout(TimerScope::Opening).unwrap();
    assert_eq!(opening.duration, Duration::from_millis(250));
    assert_eq!(opening.next_state, ConnectionState::Failed);
    assert_eq!(table.timeout(TimerScope::Modifying).unwrap().next_state, ConnectionState::Failed);
    assert!(table.timeout(TimerScope::HalfOpen).is_none());
    assert_eq!(table.timeout(TimerScope::Open).unwrap().next_state, ConnectionState::Closing);
}

#[test]
fn test_table_reaches_every_state() {
    let used = DEFAULT_TABLE.collect_used_states();
    for state in ConnectionState::ALL {
        assert!(used.contains(&state), "{} unreachable", state);
    }
}
