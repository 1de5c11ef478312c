use fusioncore::engine::TargetSummary;
use fusioncore::telemetry::MetricsSnapshot;
use serde::Serialize;

/// Body of `GET /targets`.
#[derive(Debug, Serialize)]
pub struct TargetsView {
    pub targets: Vec<TargetSummary>,
    pub pending_triggers: usize,
    pub metrics: MetricsSnapshot,
    pub tables: Vec<(&'static str, usize)>,
}
