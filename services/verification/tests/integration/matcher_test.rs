use chrono::{Duration, Utc};

use parley_domain::registration::RegistrationState;
use parley_domain::site::Site;
use parley_verification::domain::repository::RegistrationStore;
use parley_verification::error::FetchError;
use parley_verification::worker::matcher::Matcher;

use crate::helpers::{MockFetcher, MockRegistrationStore, matcher_settings, test_registration};

#[tokio::test]
async fn should_verify_once_the_code_appears_in_the_profile() {
    let store = MockRegistrationStore::new();
    let registration = test_registration(Site::Github, "AB12CD34");
    let id = registration.id;
    store.insert(registration);

    let fetcher = MockFetcher::scripted(vec![
        Ok("nothing to see at t1".to_owned()),
        Ok("nothing to see at t2".to_owned()),
        Ok("bio with AB12CD34 inside".to_owned()),
    ]);
    let matcher = Matcher::new(store.clone(), fetcher.clone(), matcher_settings());

    matcher.sweep_once().await;
    matcher.sweep_once().await;
    matcher.sweep_once().await;

    let row = store.get(id).unwrap();
    assert_eq!(row.state, RegistrationState::Verified);
    assert_eq!(row.attempts, 2, "two misses before the hit");
    assert_eq!(fetcher.call_count(), 3);

    // Terminal states are never polled again.
    matcher.sweep_once().await;
    assert_eq!(fetcher.call_count(), 3);
}

#[tokio::test]
async fn should_fail_immediately_when_the_handle_does_not_exist() {
    let store = MockRegistrationStore::new();
    let registration = test_registration(Site::V2ex, "AB12CD34");
    let id = registration.id;
    store.insert(registration);

    let fetcher = MockFetcher::scripted(vec![Err(FetchError::NotFound)]);
    let matcher = Matcher::new(store.clone(), fetcher.clone(), matcher_settings());

    matcher.sweep_once().await;

    let row = store.get(id).unwrap();
    assert_eq!(row.state, RegistrationState::Failed);

    matcher.sweep_once().await;
    assert_eq!(fetcher.call_count(), 1, "no further fetches after failing");
}

#[tokio::test]
async fn should_fail_after_exhausting_the_attempt_budget() {
    let store = MockRegistrationStore::new();
    let registration = test_registration(Site::Github, "AB12CD34");
    let id = registration.id;
    store.insert(registration);

    let fetcher = MockFetcher::scripted(vec![
        Ok("miss".to_owned()),
        Ok("miss".to_owned()),
        Ok("miss".to_owned()),
    ]);
    // max_attempts = 3 in the test settings
    let matcher = Matcher::new(store.clone(), fetcher.clone(), matcher_settings());

    for _ in 0..3 {
        matcher.sweep_once().await;
    }

    let row = store.get(id).unwrap();
    assert_eq!(row.state, RegistrationState::Failed);
    assert_eq!(row.attempts, 3);
}

#[tokio::test]
async fn should_not_consume_attempts_on_transient_failures() {
    let store = MockRegistrationStore::new();
    let registration = test_registration(Site::Github, "AB12CD34");
    let id = registration.id;
    store.insert(registration);

    let fetcher = MockFetcher::scripted(vec![
        Err(FetchError::Unreachable("timeout".to_owned())),
        Err(FetchError::RateLimited { retry_after: None }),
        Ok("fetched but no code".to_owned()),
    ]);
    let matcher = Matcher::new(store.clone(), fetcher.clone(), matcher_settings());

    for _ in 0..3 {
        matcher.sweep_once().await;
    }

    let row = store.get(id).unwrap();
    assert_eq!(row.state, RegistrationState::Verifying);
    assert_eq!(row.attempts, 1, "only the completed fetch consumed an attempt");
    assert_eq!(row.transient_failures, 0, "streak resets on a completed fetch");
}

#[tokio::test]
async fn should_expire_a_predated_registration_without_fetching() {
    let store = MockRegistrationStore::new();
    let mut registration = test_registration(Site::Github, "AB12CD34");
    registration.expires_at = Utc::now() - Duration::hours(1);
    let id = registration.id;
    store.insert(registration);

    let fetcher = MockFetcher::scripted(vec![Ok("irrelevant".to_owned())]);
    let matcher = Matcher::new(store.clone(), fetcher.clone(), matcher_settings());

    matcher.sweep_once().await;

    let row = store.get(id).unwrap();
    assert_eq!(row.state, RegistrationState::Expired);
    assert_eq!(fetcher.call_count(), 0);
}

#[tokio::test]
async fn should_skip_registrations_held_by_another_workers_lease() {
    let store = MockRegistrationStore::new();
    let mut registration = test_registration(Site::Github, "AB12CD34");
    registration.lease_until = Some(Utc::now() + Duration::seconds(60));
    let id = registration.id;
    store.insert(registration);

    let fetcher = MockFetcher::scripted(vec![Ok("irrelevant".to_owned())]);
    let matcher = Matcher::new(store.clone(), fetcher.clone(), matcher_settings());

    matcher.sweep_once().await;

    let row = store.get(id).unwrap();
    assert_eq!(row.state, RegistrationState::Pending, "untouched while leased");
    assert_eq!(fetcher.call_count(), 0);
}

#[tokio::test]
async fn should_lose_a_claim_with_a_stale_version() {
    let store = MockRegistrationStore::new();
    let registration = test_registration(Site::Github, "AB12CD34");
    store.insert(registration.clone());

    let now = Utc::now();
    let first = store
        .claim(&registration, now, Duration::seconds(60))
        .await
        .unwrap();
    assert!(first.is_some());

    // Second claim still holds the pre-claim version: the CAS must lose.
    let second = store
        .claim(&registration, now, Duration::seconds(60))
        .await
        .unwrap();
    assert!(second.is_none());
}

#[tokio::test]
async fn should_start_and_stop_cleanly() {
    let store = MockRegistrationStore::new();
    let fetcher = MockFetcher::scripted(vec![]);
    let matcher = Matcher::new(store, fetcher, matcher_settings());
    let stats = matcher.stats();

    let handle = matcher.start();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    handle.stop().await;

    assert!(stats.snapshot().sweeps >= 1, "at least one sweep before stop");
}

#[tokio::test]
async fn should_release_the_lease_when_the_check_completes() {
    let store = MockRegistrationStore::new();
    let registration = test_registration(Site::Github, "AB12CD34");
    let id = registration.id;
    store.insert(registration);

    let fetcher = MockFetcher::scripted(vec![Ok("no code yet".to_owned())]);
    let matcher = Matcher::new(store.clone(), fetcher, matcher_settings());

    matcher.sweep_once().await;

    let row = store.get(id).unwrap();
    assert!(row.lease_until.is_none(), "lease released after the check");
    assert_eq!(row.state, RegistrationState::Verifying);
}
