use parley_domain::registration::RegistrationState;
use parley_domain::site::Site;
use parley_verification::worker::dispatcher::Dispatcher;

use crate::helpers::{MockMailer, MockRegistrationStore, dispatcher_settings, test_registration};

fn terminal_registration(state: RegistrationState) -> parley_verification::domain::types::Registration {
    let mut registration = test_registration(Site::Github, "AB12CD34");
    registration.state = state;
    registration
}

#[tokio::test]
async fn should_send_exactly_one_mail_per_terminal_outcome() {
    let store = MockRegistrationStore::new();
    let registration = terminal_registration(RegistrationState::Verified);
    let id = registration.id;
    store.insert(registration);

    let mailer = MockMailer::new();
    let dispatcher = Dispatcher::new(store.clone(), mailer.clone(), dispatcher_settings());

    dispatcher.sweep_once().await;
    dispatcher.sweep_once().await;
    dispatcher.sweep_once().await;

    let sent = mailer.sent();
    assert_eq!(sent.len(), 1, "repeated sweeps must not re-send");
    assert_eq!(sent[0].to, "alice@example.com");
    assert!(sent[0].subject.contains("verified"));
    assert!(store.get(id).unwrap().notified);
}

#[tokio::test]
async fn should_not_notify_open_registrations() {
    let store = MockRegistrationStore::new();
    store.insert(test_registration(Site::Github, "AB12CD34"));

    let mailer = MockMailer::new();
    let dispatcher = Dispatcher::new(store.clone(), mailer.clone(), dispatcher_settings());

    dispatcher.sweep_once().await;

    assert!(mailer.sent().is_empty());
}

#[tokio::test]
async fn should_retry_a_failed_send_and_deliver_eventually() {
    let store = MockRegistrationStore::new();
    let registration = terminal_registration(RegistrationState::Failed);
    let id = registration.id;
    store.insert(registration);

    let mailer = MockMailer::failing_times(1);
    let dispatcher = Dispatcher::new(store.clone(), mailer.clone(), dispatcher_settings());

    dispatcher.sweep_once().await;
    let row = store.get(id).unwrap();
    assert!(!row.notified, "flag stays unset until the transport acks");
    assert_eq!(row.notify_attempts, 1);
    assert!(row.notify_last_error.is_some());

    dispatcher.sweep_once().await;
    let row = store.get(id).unwrap();
    assert!(row.notified);
    assert_eq!(mailer.sent().len(), 1);
    assert!(mailer.sent()[0].subject.contains("failed"));
}

#[tokio::test]
async fn should_start_and_stop_cleanly() {
    let store = MockRegistrationStore::new();
    let mailer = MockMailer::new();
    let dispatcher = Dispatcher::new(store, mailer, dispatcher_settings());
    let stats = dispatcher.stats();

    let handle = dispatcher.start();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    handle.stop().await;

    assert!(stats.snapshot().sweeps >= 1, "at least one sweep before stop");
}

#[tokio::test]
async fn should_stop_retrying_after_the_budget_is_exhausted() {
    let store = MockRegistrationStore::new();
    let registration = terminal_registration(RegistrationState::Expired);
    let id = registration.id;
    store.insert(registration);

    let mailer = MockMailer::failing_times(10);
    // notify_max_attempts = 3 in the test settings
    let dispatcher = Dispatcher::new(store.clone(), mailer.clone(), dispatcher_settings());

    for _ in 0..5 {
        dispatcher.sweep_once().await;
    }

    let row = store.get(id).unwrap();
    assert!(!row.notified);
    assert_eq!(row.notify_attempts, 3, "no attempts past the budget");
    assert!(row.notify_failed_at.is_some(), "marked permanently undelivered");
    assert!(mailer.sent().is_empty());
}
