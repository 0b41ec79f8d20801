use axum_test::TestServer;

use parley_domain::registration::RegistrationState;
use parley_domain::site::Site;
use parley_verification::router::build_router;
use parley_verification::state::AppState;
use parley_verification::worker::SweepStats;

use crate::helpers::{MockRegistrationStore, test_registration};

fn server(store: MockRegistrationStore) -> TestServer {
    let router = build_router(AppState {
        store,
        matcher_stats: SweepStats::default(),
        dispatcher_stats: SweepStats::default(),
    });
    TestServer::new(router).unwrap()
}

#[tokio::test]
async fn should_answer_health_probes() {
    let server = server(MockRegistrationStore::new());
    server.get("/healthz").await.assert_status_ok();
    server.get("/readyz").await.assert_status_ok();
}

#[tokio::test]
async fn should_report_per_state_counts_in_stats() {
    let store = MockRegistrationStore::new();
    store.insert(test_registration(Site::Github, "AB12CD34"));
    let mut verified = test_registration(Site::V2ex, "EF56GH78");
    verified.state = RegistrationState::Verified;
    store.insert(verified);

    let server = server(store);
    let response = server.get("/stats").await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    assert_eq!(body["registrations"]["pending"], 1);
    assert_eq!(body["registrations"]["verified"], 1);
    assert_eq!(body["registrations"]["failed"], 0);
    assert_eq!(body["matcher"]["sweeps"], 0);
    assert_eq!(body["dispatcher"]["sweeps"], 0);
}
