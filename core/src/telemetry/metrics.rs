use serde::Serialize;
use std::sync::Mutex;

pub struct FusionMetrics {
    inner: Mutex<MetricsSnapshot>,
}

/// Counters since startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub ingested: usize,
    pub dropped: usize,
    pub targets_created: usize,
    pub targets_retired: usize,
    pub classified: usize,
    pub unclassifiable: usize,
    pub commands_sent: usize,
    pub send_failures: usize,
}

impl FusionMetrics {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MetricsSnapshot::default()),
        }
    }

    fn bump(&self, update: impl FnOnce(&mut MetricsSnapshot)) {
        if let Ok(mut metrics) = self.inner.lock() {
            update(&mut metrics);
        }
    }

    pub fn record_ingested(&self) {
        self.bump(|m| m.ingested += 1);
    }

    pub fn record_dropped(&self) {
        self.bump(|m| m.dropped += 1);
    }

    pub fn record_targets_created(&self, count: usize) {
        self.bump(|m| m.targets_created += count);
    }

    pub fn record_retired(&self, count: usize) {
        self.bump(|m| m.targets_retired += count);
    }

    pub fn record_classified(&self) {
        self.bump(|m| m.classified += 1);
    }

    pub fn record_unclassifiable(&self) {
        self.bump(|m| m.unclassifiable += 1);
    }

    pub fn record_command_sent(&self) {
        self.bump(|m| m.commands_sent += 1);
    }

    pub fn record_send_failure(&self) {
        self.bump(|m| m.send_failures += 1);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        if let Ok(metrics) = self.inner.lock() {
            *metrics
        } else {
            MetricsSnapshot::default()
        }
    }
}

impl Default for FusionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_independently() {
        let metrics = FusionMetrics::new();
        metrics.record_ingested();
        metrics.record_ingested();
        metrics.record_dropped();
        metrics.record_retired(3);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.ingested, 2);
        assert_eq!(snapshot.dropped, 1);
        assert_eq!(snapshot.targets_retired, 3);
        assert_eq!(snapshot.commands_sent, 0);
    }
}
