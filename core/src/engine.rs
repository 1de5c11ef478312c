//! The single lock domain of the fusion core.
//!
//! `FusionEngine` owns the registry, correlation stage, trigger state and the
//! producer side of the classification queue. Callers share it as
//! `Arc<Mutex<FusionEngine>>`; ingest, sweeps and flushes all go through the
//! same lock, so no caller ever observes a target mid-merge.

use crate::classification::{history_date, Classification, ClassificationQueue, ClassifierHistory};
use crate::config::FusionConfig;
use crate::correlation::CorrelationStage;
use crate::features::{FeatureExtractor, FeatureVector};
use crate::instrument_interface::{CommandSink, StreamRecord, TriggerCommand};
use crate::prelude::{FusionError, FusionResult, Timestamp};
use crate::storage::TableKind;
use crate::targets::{Target, TargetId, TargetRegistry, TargetState};
use crate::telemetry::{FusionMetrics, LogManager};
use crate::triggers::{TriggerContext, TriggerDecision, TriggerEngine, TriggerRules};
use log::error;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    Accepted,
    /// Malformed record, logged and discarded.
    Dropped,
    /// Arrived after shutdown began.
    Rejected,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    pub status: IngestStatus,
    pub target: Option<TargetId>,
    pub enqueued: Vec<TargetId>,
}

impl IngestReport {
    fn empty(status: IngestStatus) -> Self {
        Self {
            status,
            target: None,
            enqueued: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    pub enqueued: Vec<TargetId>,
    pub retired: Vec<TargetId>,
    /// Retired targets that added a row to the classifier history.
    pub recorded: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    pub abandoned: usize,
    pub discarded_triggers: usize,
    pub discarded_acoustic: usize,
}

/// Live view of one target for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct TargetSummary {
    #[serde(flatten)]
    pub target: Target,
    pub ping_count: usize,
    pub min_range: Option<f64>,
}

pub struct FusionEngine {
    config: FusionConfig,
    registry: TargetRegistry,
    stage: CorrelationStage,
    extractor: FeatureExtractor,
    rules: TriggerRules,
    triggers: TriggerEngine,
    history: ClassifierHistory,
    queue: Arc<ClassificationQueue>,
    sink: Box<dyn CommandSink>,
    metrics: Arc<FusionMetrics>,
    accepting: bool,
    logger: LogManager,
}

impl FusionEngine {
    /// Validates `config` and builds an engine with an empty history.
    pub fn new(
        config: FusionConfig,
        queue: Arc<ClassificationQueue>,
        sink: Box<dyn CommandSink>,
    ) -> FusionResult<Self> {
        config.validate()?;
        let history = ClassifierHistory::new(config.classifier.axis_bounds.clone());
        Ok(Self {
            registry: TargetRegistry::new(&config.site_name),
            stage: CorrelationStage::new(config.eligibility.clone()),
            extractor: FeatureExtractor::new(config.features.clone()),
            rules: TriggerRules::new(&config),
            triggers: TriggerEngine::new(&config),
            history,
            queue,
            sink,
            metrics: Arc::new(FusionMetrics::new()),
            accepting: true,
            logger: LogManager::new("engine"),
            config,
        })
    }

    /// Replaces the (empty) history with one loaded at startup.
    pub fn with_history(mut self, history: ClassifierHistory) -> FusionResult<Self> {
        if history.bounds() != &self.config.classifier.axis_bounds {
            return Err(FusionError::Config(
                "history was scaled with different axis bounds".into(),
            ));
        }
        self.history = history;
        Ok(self)
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }

    pub fn history(&self) -> &ClassifierHistory {
        &self.history
    }

    pub fn metrics(&self) -> Arc<FusionMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn queue(&self) -> Arc<ClassificationQueue> {
        Arc::clone(&self.queue)
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting
    }

    /// Routes one record through correlation. Malformed records are dropped
    /// with a warning; internal-consistency errors are returned.
    pub fn ingest(&mut self, record: StreamRecord) -> FusionResult<IngestReport> {
        if !self.accepting {
            return Ok(IngestReport::empty(IngestStatus::Rejected));
        }
        let kind = record.kind();
        let created = self.registry.created();
        match self.stage.ingest(&mut self.registry, record) {
            Ok(outcome) => {
                self.metrics.record_ingested();
                self.metrics
                    .record_targets_created(self.registry.created() - created);
                let enqueued = self.enqueue(&outcome.eligible)?;
                Ok(IngestReport {
                    status: IngestStatus::Accepted,
                    target: outcome.target,
                    enqueued,
                })
            }
            Err(err @ FusionError::MalformedRecord { .. }) => {
                self.metrics.record_dropped();
                self.logger.warn(&format!("dropping {} record: {}", kind, err));
                Ok(IngestReport::empty(IngestStatus::Dropped))
            }
            Err(err) => {
                if err.is_fatal() {
                    error!("[engine] fatal error while ingesting {} record: {}", kind, err);
                }
                Err(err)
            }
        }
    }

    /// Decodes a JSON record and ingests it; undecodable input is dropped.
    pub fn ingest_json(&mut self, line: &str) -> FusionResult<IngestReport> {
        match StreamRecord::from_json(line) {
            Ok(record) => self.ingest(record),
            Err(err) => {
                self.metrics.record_dropped();
                self.logger.warn(&format!("dropping undecodable record: {}", err));
                Ok(IngestReport::empty(IngestStatus::Dropped))
            }
        }
    }

    fn enqueue(&mut self, eligible: &[TargetId]) -> FusionResult<Vec<TargetId>> {
        let mut enqueued = Vec::with_capacity(eligible.len());
        for &id in eligible {
            if self.queue.push(id) {
                self.registry.get_mut(id)?.transition(TargetState::Classifying)?;
                enqueued.push(id);
            } else {
                self.registry.get_mut(id)?.transition(TargetState::Abandoned)?;
            }
        }
        Ok(enqueued)
    }

    /// Periodic housekeeping: eligibility, acoustic promotion and retirement.
    pub fn sweep(&mut self, now: Timestamp) -> FusionResult<SweepReport> {
        let created = self.registry.created();
        let eligible = self.stage.sweep(&mut self.registry, now)?;
        self.metrics
            .record_targets_created(self.registry.created() - created);
        let enqueued = self.enqueue(&eligible)?;

        let mut report = SweepReport {
            enqueued,
            ..Default::default()
        };
        for id in self
            .registry
            .retirable(now, self.config.retention.drop_target_time)
        {
            if self.record_history(id)? {
                report.recorded += 1;
            }
            let target = self.registry.retire(id)?;
            self.logger.record(&format!(
                "retired target {} ({})",
                id,
                target
                    .classification
                    .as_ref()
                    .map(|l| l.as_str())
                    .unwrap_or("unclassified")
            ));
            report.retired.push(id);
        }
        self.metrics.record_retired(report.retired.len());
        Ok(report)
    }

    /// Appends a retiring target's features and label to the history.
    fn record_history(&mut self, id: TargetId) -> FusionResult<bool> {
        let target = self.registry.get(id)?;
        let Some(label) = target.classification.clone() else {
            return Ok(false);
        };
        if !target.has_track() {
            return Ok(false);
        }
        let features = self.extractor.extract(&self.registry, target)?;
        let source = target.source.clone();
        let date = history_date(target.first_seen);
        self.history.push(&features, label, source, date);
        Ok(true)
    }

    /// Pins the current reading and returns the features to classify, or
    /// `None` when the target is no longer waiting for classification.
    pub fn begin_classification(&mut self, id: TargetId) -> FusionResult<Option<FeatureVector>> {
        match self.registry.get(id) {
            Ok(target) if target.state == TargetState::Classifying => {}
            Ok(_) | Err(FusionError::UnknownTarget(_)) => return Ok(None),
            Err(err) => return Err(err),
        }
        self.registry.pin_current(id)?;
        let target = self.registry.get(id)?;
        self.extractor.extract(&self.registry, target).map(Some)
    }

    /// Features for any live target, recomputed from its stored records.
    pub fn features_of(&self, id: TargetId) -> FusionResult<FeatureVector> {
        let target = self.registry.get(id)?;
        self.extractor.extract(&self.registry, target)
    }

    /// Stores the label, runs the trigger rules and queues any save request.
    /// Returns `None` if the target was abandoned while being classified,
    /// including a classification that finishes after shutdown began.
    pub fn complete_classification(
        &mut self,
        id: TargetId,
        result: &Classification,
    ) -> FusionResult<Option<TriggerDecision>> {
        let target = match self.registry.get_mut(id) {
            Ok(target) if target.state == TargetState::Classifying => target,
            Ok(_) | Err(FusionError::UnknownTarget(_)) => return Ok(None),
            Err(err) => return Err(err),
        };
        if !self.accepting {
            self.abandon(id)?;
            return Ok(None);
        }
        target.transition(TargetState::Classified)?;
        target.classification = Some(result.label.clone());

        let target = self.registry.get(id)?;
        let context = TriggerContext::for_target(&self.registry, target)?;
        let decision = self.rules.decide(&context, Some(&result.label));
        let queued = self.triggers.evaluate(&decision, context.detected_at);
        self.metrics.record_classified();
        self.logger.record(&format!(
            "target {} classified as {} ({} neighbours{}), {:?} queued {} saves",
            id,
            result.label,
            result.neighbors,
            if result.fallback { ", fallback" } else { "" },
            decision.rule,
            queued
        ));
        Ok(Some(decision))
    }

    /// Gives up on a target that cannot be classified.
    pub fn abandon(&mut self, id: TargetId) -> FusionResult<()> {
        let target = self.registry.get_mut(id)?;
        if target.state.is_pending() {
            target.transition(TargetState::Abandoned)?;
            self.logger.record(&format!("target {} abandoned", id));
        }
        Ok(())
    }

    pub fn record_unclassifiable(&mut self, id: TargetId) -> FusionResult<()> {
        self.metrics.record_unclassifiable();
        self.logger
            .warn(&format!("target {} could not be classified", id));
        self.abandon(id)
    }

    /// Sends at most one save command. Send failures are counted and leave
    /// the pending entries for the next cycle. Nothing is sent after shutdown.
    pub fn flush(&mut self, now: Timestamp) -> FusionResult<Option<TriggerCommand>> {
        if !self.accepting {
            return Ok(None);
        }
        match self.triggers.flush(now, self.sink.as_mut()) {
            Ok(Some(command)) => {
                self.metrics.record_command_sent();
                Ok(Some(command))
            }
            Ok(None) => Ok(None),
            Err(err) if err.is_fatal() => Err(err),
            Err(_) => {
                self.metrics.record_send_failure();
                Ok(None)
            }
        }
    }

    pub fn pending_triggers(&self) -> usize {
        self.triggers.pending()
    }

    pub fn snapshot(&self) -> FusionResult<Vec<TargetSummary>> {
        self.registry
            .targets()
            .map(|target| {
                let aggregate = self.registry.aggregate(target)?;
                Ok(TargetSummary {
                    target: target.clone(),
                    ping_count: aggregate.map(|a| a.ping_count()).unwrap_or(0),
                    min_range: aggregate.map(|a| a.merged.min_range_m),
                })
            })
            .collect()
    }

    /// Live slot counts per table, for diagnostics.
    pub fn table_usage(&self) -> Vec<(&'static str, usize)> {
        [
            TableKind::Track,
            TableKind::TrackAggregate,
            TableKind::Current,
            TableKind::Acoustic,
        ]
        .into_iter()
        .map(|kind| (kind.as_str(), self.registry.tables().live(kind)))
        .collect()
    }

    /// Stops intake, abandons queued targets and drops pending saves.
    pub fn shutdown(&mut self) -> FusionResult<ShutdownReport> {
        self.accepting = false;
        let drained = self.queue.close();
        for &id in &drained {
            self.abandon(id)?;
        }
        let report = ShutdownReport {
            abandoned: drained.len(),
            discarded_triggers: self.triggers.discard_pending(),
            discarded_acoustic: self.stage.abandon_pending(&mut self.registry)?,
        };
        self.logger.record(&format!(
            "shutdown: {} abandoned, {} pending saves discarded",
            report.abandoned, report.discarded_triggers
        ));
        Ok(report)
    }
}
