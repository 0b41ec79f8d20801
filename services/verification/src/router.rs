use axum::{Json, Router, extract::State, routing::get};
use tower_http::trace::TraceLayer;

use parley_core::health::{healthz, readyz};

use crate::domain::repository::RegistrationStore;
use crate::domain::types::StateCounts;
use crate::error::VerificationError;
use crate::state::AppState;
use crate::worker::SweepSnapshot;

/// Read-only health/metrics surface consumed by the observability layer.
pub fn build_router<S>(state: AppState<S>) -> Router
where
    S: RegistrationStore + Clone + 'static,
{
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/stats", get(stats::<S>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, serde::Serialize)]
pub struct StatsResponse {
    pub registrations: StateCounts,
    pub matcher: SweepSnapshot,
    pub dispatcher: SweepSnapshot,
}

async fn stats<S>(
    State(state): State<AppState<S>>,
) -> Result<Json<StatsResponse>, VerificationError>
where
    S: RegistrationStore + Clone + 'static,
{
    let registrations = state.store.count_by_state().await?;
    Ok(Json(StatsResponse {
        registrations,
        matcher: state.matcher_stats.snapshot(),
        dispatcher: state.dispatcher_stats.snapshot(),
    }))
}
