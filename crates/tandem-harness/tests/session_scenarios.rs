//! End-to-end session scenarios between a simulated therapist and patient.

use std::time::Duration;

use bytes::Bytes;
use tandem_core::{
    AppInput, ConnectionStatus, Lifecycle, SessionAction, SessionConfig, SessionError, SessionEvent,
};
use tandem_harness::{
    ActiveAppsAgree, Callback, DRAWS_ON_SHOW, InvariantRegistry, Journal, PeerPair, RecorderState,
    SessionSnapshot, recorder_registry,
};
use tandem_proto::{Message, MessageHeader, ProtocolError, ProtocolKind, Role};

fn connected_pair(journal: &Journal) -> PeerPair {
    let mut pair = PeerPair::new(11, || recorder_registry(3, journal)).unwrap();
    pair.connect().unwrap();
    pair
}

fn app_state(pair: &PeerPair, role: Role) -> RecorderState {
    let bytes = pair.peer(role).restore_state().unwrap().expect("active recorder has state");
    let header = MessageHeader::new(ProtocolKind::Restore, Role::Therapist, 0);
    Message::new(header, bytes).decode_body().unwrap()
}

fn note(text: &str) -> SessionEvent<tandem_harness::SimInstant> {
    SessionEvent::AppInput(AppInput::Text { field: "note".into(), text: text.into() })
}

#[test]
fn login_builds_patient_registry_with_therapist_seed() {
    let journal = Journal::new();
    let pair = connected_pair(&journal);

    assert!(pair.patient().registry().is_built());
    assert_eq!(pair.patient().random_seed(), pair.therapist().random_seed());
    assert!(pair.patient().is_connected());
    InvariantRegistry::converged().assert_all(&SessionSnapshot::of_pair(&pair), "after login");
}

#[test]
fn open_syncs_seed_and_handshakes_once() {
    let journal = Journal::new();
    let mut pair = connected_pair(&journal);

    pair.run(Role::Therapist, SessionEvent::OpenApp { app_id: 2, seed: Some(42) }).unwrap();

    assert_eq!(pair.patient().random_seed(), 42);
    assert_eq!(pair.patient().active_app(), Some(2));
    assert_eq!(pair.patient().lifecycle(2), Some(Lifecycle::Shown));
    assert_eq!(journal.count(Role::Patient, 2, Callback::Show), 1);
    assert_eq!(journal.count(Role::Therapist, 2, Callback::ClientReady), 1);
    assert_eq!(journal.count(Role::Patient, 2, Callback::ClientReady), 0);

    assert_eq!(pair.therapist().draw_count(), DRAWS_ON_SHOW as u64);
    assert_eq!(app_state(&pair, Role::Therapist), app_state(&pair, Role::Patient));
    InvariantRegistry::converged().assert_all(&SessionSnapshot::of_pair(&pair), "after open");
}

#[test]
fn app_messages_reach_both_peers_once() {
    let journal = Journal::new();
    let mut pair = connected_pair(&journal);
    pair.run(Role::Therapist, SessionEvent::OpenApp { app_id: 0, seed: Some(5) }).unwrap();

    pair.run(Role::Therapist, note("from therapist")).unwrap();
    pair.run(Role::Patient, note("from patient")).unwrap();

    let expected = vec!["from therapist".to_owned(), "from patient".to_owned()];
    assert_eq!(app_state(&pair, Role::Therapist).notes, expected);
    assert_eq!(app_state(&pair, Role::Patient).notes, expected);
    InvariantRegistry::converged().assert_all(&SessionSnapshot::of_pair(&pair), "after notes");
}

#[test]
fn patient_disconnect_then_restore_converges() {
    let journal = Journal::new();
    let mut pair = connected_pair(&journal);
    pair.run(Role::Therapist, SessionEvent::OpenApp { app_id: 1, seed: Some(7) }).unwrap();
    pair.run(Role::Therapist, note("before")).unwrap();

    pair.disconnect("network lost").unwrap();
    assert_eq!(pair.therapist().active_app(), Some(1));
    assert_eq!(pair.patient().active_app(), None);
    assert_eq!(pair.patient().lifecycle(1), Some(Lifecycle::Hidden));
    assert_eq!(journal.count(Role::Patient, 1, Callback::Disconnect), 1);
    let seen = pair.take_seen(Role::Patient);
    assert!(seen.contains(&SessionAction::Connect));
    assert!(seen.iter().any(|a| matches!(a, SessionAction::PersistLog { app_id: 1, .. })));

    pair.run(Role::Therapist, note("while away")).unwrap();
    pair.connect().unwrap();

    assert_eq!(pair.patient().active_app(), Some(1));
    assert_eq!(pair.patient().random_seed(), 7);
    assert_eq!(journal.count(Role::Patient, 1, Callback::Restore), 1);
    assert_eq!(journal.count(Role::Therapist, 1, Callback::ClientReady), 2);

    let restored = app_state(&pair, Role::Patient);
    assert_eq!(restored, app_state(&pair, Role::Therapist));
    assert_eq!(restored.notes, vec!["before".to_owned(), "while away".to_owned()]);

    let mut registry = InvariantRegistry::standard();
    registry.add(ActiveAppsAgree);
    registry.assert_all(&SessionSnapshot::of_pair(&pair), "after restore");
}

#[test]
fn late_joining_patient_catches_up() {
    let journal = Journal::new();
    let mut pair = PeerPair::new(3, || recorder_registry(2, &journal)).unwrap();

    pair.run(Role::Therapist, SessionEvent::OpenApp { app_id: 1, seed: Some(99) }).unwrap();
    pair.run(Role::Therapist, note("early")).unwrap();
    assert!(!pair.patient().registry().is_built());

    pair.connect().unwrap();

    assert_eq!(pair.patient().active_app(), Some(1));
    assert_eq!(app_state(&pair, Role::Patient).notes, vec!["early".to_owned()]);
    InvariantRegistry::converged().assert_all(&SessionSnapshot::of_pair(&pair), "after late join");
}

#[test]
fn app_opens_next_app_with_params() {
    let journal = Journal::new();
    let mut pair = connected_pair(&journal);
    pair.run(Role::Therapist, SessionEvent::OpenApp { app_id: 0, seed: Some(1) }).unwrap();

    let open_third = SessionEvent::AppInput(AppInput::Button("recorder-2".into()));
    pair.run(Role::Therapist, open_third).unwrap();

    assert_eq!(pair.therapist().active_app(), Some(2));
    assert_eq!(pair.patient().active_app(), Some(2));
    assert_eq!(journal.count(Role::Patient, 0, Callback::Hide), 1);
    assert_eq!(app_state(&pair, Role::Patient).notes, vec!["param:handoff".to_owned()]);
    InvariantRegistry::converged().assert_all(&SessionSnapshot::of_pair(&pair), "after handoff");
}

#[test]
fn patient_app_open_requests_are_ignored() {
    let journal = Journal::new();
    let mut pair = connected_pair(&journal);
    pair.run(Role::Therapist, SessionEvent::OpenApp { app_id: 0, seed: Some(1) }).unwrap();

    pair.run(Role::Patient, SessionEvent::AppInput(AppInput::Button("recorder-1".into()))).unwrap();

    assert_eq!(pair.therapist().active_app(), Some(0));
    assert_eq!(pair.patient().active_app(), Some(0));
}

#[test]
fn app_timers_do_not_outlive_the_app() {
    let journal = Journal::new();
    let mut pair = connected_pair(&journal);
    pair.run(Role::Therapist, SessionEvent::OpenApp { app_id: 0, seed: Some(1) }).unwrap();

    pair.run(Role::Therapist, SessionEvent::AppInput(AppInput::Pick(200))).unwrap();
    pair.tick(Duration::from_millis(200)).unwrap();
    assert_eq!(journal.count(Role::Therapist, 0, Callback::Timer), 1);

    pair.run(Role::Therapist, SessionEvent::AppInput(AppInput::Pick(200))).unwrap();
    pair.run(Role::Therapist, SessionEvent::CloseApp).unwrap();
    pair.tick(Duration::from_secs(1)).unwrap();

    assert_eq!(journal.count(Role::Therapist, 0, Callback::Timer), 1);
    assert_eq!(pair.therapist().pending_timers(), 0);
    assert_eq!(pair.patient().active_app(), None);
}

#[test]
fn unknown_protocol_is_fatal() {
    let journal = Journal::new();
    let mut pair = connected_pair(&journal);

    let failure = pair
        .patient_event(SessionEvent::MessageReceived(Bytes::from_static(&[99, 0, 0])))
        .unwrap_err();
    assert_eq!(failure.role, Role::Patient);
    assert_eq!(failure.error, SessionError::Protocol(ProtocolError::UnknownProtocol(99)));

    let again = pair.patient_event(SessionEvent::CloseApp).unwrap_err();
    assert!(matches!(again.error, SessionError::Halted { .. }));
    assert!(InvariantRegistry::standard().check_all(&SessionSnapshot::of_pair(&pair)).is_err());
}

#[test]
fn patient_retries_failed_connections() {
    let journal = Journal::new();
    let mut pair = PeerPair::new(5, || recorder_registry(1, &journal)).unwrap();

    pair.patient_event(SessionEvent::ConnectFailed { reason: "timeout".into() }).unwrap();
    let seen = pair.take_seen(Role::Patient);
    assert!(matches!(
        seen.as_slice(),
        [SessionAction::Status(ConnectionStatus::Retrying { .. })]
    ));

    pair.tick(Duration::from_millis(500)).unwrap();
    assert!(pair.take_seen(Role::Patient).is_empty());
    pair.tick(Duration::from_millis(500)).unwrap();
    assert_eq!(pair.take_seen(Role::Patient), vec![SessionAction::Connect]);
}

#[test]
fn delayed_echo_converges_after_tick() {
    let journal = Journal::new();
    let patient =
        SessionConfig { echo_delay: Duration::from_millis(30), ..SessionConfig::patient() };
    let registry = || recorder_registry(2, &journal);
    let mut pair =
        PeerPair::with_configs(8, SessionConfig::therapist(), patient, registry).unwrap();
    pair.connect().unwrap();
    pair.run(Role::Therapist, SessionEvent::OpenApp { app_id: 1, seed: Some(3) }).unwrap();

    pair.run(Role::Patient, note("slow")).unwrap();
    assert_eq!(app_state(&pair, Role::Therapist).notes, vec!["slow".to_owned()]);
    assert!(app_state(&pair, Role::Patient).notes.is_empty());

    pair.tick(Duration::from_millis(30)).unwrap();
    assert_eq!(app_state(&pair, Role::Patient).notes, vec!["slow".to_owned()]);
    InvariantRegistry::converged().assert_all(&SessionSnapshot::of_pair(&pair), "after echo");
}

#[test]
fn click_on_patient_animates_on_both_sides() {
    let journal = Journal::new();
    let mut pair = connected_pair(&journal);
    pair.take_seen(Role::Therapist);
    pair.take_seen(Role::Patient);

    pair.run(Role::Patient, SessionEvent::PointerClicked { x: 0.5, y: 0.5 }).unwrap();
    for _ in 0..25 {
        pair.tick(Duration::from_millis(10)).unwrap();
    }

    for role in [Role::Therapist, Role::Patient] {
        let seen = pair.take_seen(role);
        assert_eq!(seen.iter().filter(|a| **a == SessionAction::PlayClickSound).count(), 1);
        assert_eq!(seen.iter().filter(|a| matches!(a, SessionAction::Indicator(_))).count(), 20);
        assert!(seen.contains(&SessionAction::IndicatorDone { id: 0 }));
    }
}
