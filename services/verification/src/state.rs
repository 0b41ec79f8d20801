use crate::worker::SweepStats;

/// Shared state for the health/stats surface.
#[derive(Clone)]
pub struct AppState<S> {
    pub store: S,
    pub matcher_stats: SweepStats,
    pub dispatcher_stats: SweepStats,
}
