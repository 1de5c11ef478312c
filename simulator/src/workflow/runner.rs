use crate::workflow::config::WorkflowConfig;
use anyhow::{anyhow, Context};
use fusioncore::engine::TargetSummary;
use fusioncore::instrument_interface::RecordingSink;
use fusioncore::telemetry::MetricsSnapshot;
use fusioncore::{
    ClassificationQueue, ClassificationWorker, ClassifierHistory, CommandSink, FusionEngine,
    IngestStatus, StreamRecord, Timestamp,
};
use std::sync::{Arc, Mutex, MutexGuard};

pub struct ReplayResult {
    pub records: usize,
    pub dropped: usize,
    pub classified: usize,
    pub abandoned: usize,
    pub frames: Vec<String>,
    pub metrics: MetricsSnapshot,
    pub targets: Vec<TargetSummary>,
    pub history: ClassifierHistory,
}

pub(crate) fn lock(engine: &Mutex<FusionEngine>) -> anyhow::Result<MutexGuard<'_, FusionEngine>> {
    engine.lock().map_err(|_| anyhow!("fusion engine lock poisoned"))
}

/// Builds the engine every workflow mode runs against.
pub(crate) fn build_engine(
    config: &WorkflowConfig,
    history: ClassifierHistory,
    sink: Box<dyn CommandSink>,
) -> anyhow::Result<FusionEngine> {
    let engine = FusionEngine::new(
        config.fusion.clone(),
        Arc::new(ClassificationQueue::new()),
        sink,
    )
    .context("creating fusion engine")?;
    engine
        .with_history(history)
        .context("installing classifier history")
}

/// Deterministic replay: simulated time advances with the records and the
/// classifier runs inline on every housekeeping tick.
#[derive(Clone)]
pub struct Runner {
    config: WorkflowConfig,
}

impl Runner {
    pub fn new(config: WorkflowConfig) -> Self {
        Self { config }
    }

    pub fn replay(
        &self,
        records: Vec<StreamRecord>,
        history: ClassifierHistory,
    ) -> anyhow::Result<ReplayResult> {
        let sink = RecordingSink::new();
        let engine = Arc::new(Mutex::new(build_engine(
            &self.config,
            history,
            Box::new(sink.clone()),
        )?));
        let mut worker =
            ClassificationWorker::new(Arc::clone(&engine)).context("fitting classifier")?;
        let step = self.config.runtime.sweep_interval().as_secs_f64();

        let total = records.len();
        let mut dropped = 0;
        let mut classified = 0;
        let mut clock: Option<Timestamp> = None;
        let mut last = None;
        for record in records {
            let at = record.timestamp();
            if at.is_finite() {
                let mut next_tick = clock.unwrap_or(at);
                while next_tick < at {
                    classified += tick(&engine, &mut worker, next_tick)?;
                    next_tick += step;
                }
                clock = Some(next_tick);
                last = Some(at);
            }
            let report = lock(&engine)?.ingest(record).context("ingesting record")?;
            if report.status == IngestStatus::Dropped {
                dropped += 1;
            }
        }

        if let (Some(mut next_tick), Some(last)) = (clock, last) {
            let end = last + self.settle_time(step);
            while next_tick <= end {
                classified += tick(&engine, &mut worker, next_tick)?;
                next_tick += step;
            }
        }

        let mut engine = lock(&engine)?;
        let shutdown = engine.shutdown().context("shutting down engine")?;
        Ok(ReplayResult {
            records: total,
            dropped,
            classified,
            abandoned: shutdown.abandoned,
            frames: sink.frames(),
            metrics: engine.metrics().snapshot(),
            targets: engine.snapshot().context("snapshotting targets")?,
            history: engine.history().clone(),
        })
    }

    /// Simulated time needed after the last record for every target to be
    /// classified, dispatched and retired.
    fn settle_time(&self, step: f64) -> f64 {
        let fusion = &self.config.fusion;
        let longest_buffer = fusion
            .instruments
            .iter()
            .map(|i| i.buffer_size)
            .fold(0.0, f64::max);
        fusion.eligibility.track_max_dwell.max(fusion.eligibility.acoustic_max_wait)
            + longest_buffer
            + fusion.retention.drop_target_time
            + step
    }
}

fn tick(
    engine: &Mutex<FusionEngine>,
    worker: &mut ClassificationWorker,
    now: Timestamp,
) -> anyhow::Result<usize> {
    lock(engine)?.sweep(now).context("sweeping targets")?;
    let classified = worker.drain(now).context("classifying queued targets")?;
    lock(engine)?.flush(now).context("flushing triggers")?;
    Ok(classified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::ScenarioGenerator;
    use fusioncore::instrument_interface::{AcousticRecord, CurrentRecord, TrackRecord};

    fn empty_history(config: &WorkflowConfig) -> ClassifierHistory {
        ClassifierHistory::new(config.fusion.classifier.axis_bounds.clone())
    }

    #[test]
    fn replay_is_deterministic_for_a_seed() {
        let mut config = WorkflowConfig::default();
        config.scenario.seed = 3;
        config.scenario.duration = 120.0;
        config.scenario.spawn_probability = 0.1;
        let runner = Runner::new(config.clone());

        let run = || {
            let records = ScenarioGenerator::new(config.scenario.clone())
                .unwrap()
                .generate();
            runner.replay(records, empty_history(&config)).unwrap()
        };
        let first = run();
        let second = run();
        assert_eq!(first.frames, second.frames);
        assert_eq!(first.metrics, second.metrics);
        assert_eq!(first.dropped, 0);
        // Everything settles before shutdown.
        assert!(first.targets.is_empty());
        assert_eq!(first.abandoned, 0);
        assert_eq!(first.metrics.targets_created, first.metrics.targets_retired);
    }

    #[test]
    fn lone_acoustic_event_saves_the_hydrophones() {
        let config = WorkflowConfig::default();
        let runner = Runner::new(config.clone());
        let records = vec![StreamRecord::Acoustic(AcousticRecord {
            timestamp: 500.0,
            detection: "whistle".into(),
        })];
        let result = runner.replay(records, empty_history(&config)).unwrap();
        assert_eq!(result.frames, vec!["AAAA 0 0 1 0 ZZZZ".to_string()]);
        assert_eq!(result.classified, 1);
        // Acoustic-only targets leave no history row.
        assert!(result.history.is_empty());
        assert_eq!(result.metrics.targets_retired, 1);
    }

    #[test]
    fn classified_tracks_feed_the_history() {
        let mut config = WorkflowConfig::default();
        config.fusion.eligibility.max_pings = 3;
        let runner = Runner::new(config.clone());
        let mut records = vec![StreamRecord::Current(CurrentRecord {
            timestamp: 0.0,
            speed: 0.4,
            heading: 0.0,
        })];
        for n in 0..3 {
            records.push(StreamRecord::Track(TrackRecord {
                timestamp: 10.0 + n as f64,
                track_id: 8,
                pings_visible: n + 1,
                target_strength: 95.0,
                size_sq_m: 1.0,
                speed_mps: 0.5,
                min_range_m: 12.0,
                max_range_m: 13.0,
                last_pos_range: 12.5,
                ..Default::default()
            }));
        }
        let result = runner.replay(records, empty_history(&config)).unwrap();
        assert_eq!(result.classified, 1);
        assert_eq!(result.history.len(), 1);
        assert_eq!(result.history.labels()[0].as_str(), "Outliers");
        // Wide-field sonar plus every range-limited instrument (12 > 10 and 12 > 8).
        assert_eq!(result.frames, vec!["AAAA 1 1 0 1 ZZZZ".to_string()]);
    }

    #[test]
    fn malformed_records_are_counted_not_fatal() {
        let config = WorkflowConfig::default();
        let runner = Runner::new(config.clone());
        let records = vec![StreamRecord::Current(CurrentRecord {
            timestamp: 1.0,
            speed: -1.0,
            heading: 0.0,
        })];
        let result = runner.replay(records, empty_history(&config)).unwrap();
        assert_eq!(result.dropped, 1);
        assert!(result.frames.is_empty());
    }
}
