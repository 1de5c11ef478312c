use crate::config::EligibilityConfig;
use crate::instrument_interface::{AcousticRecord, StreamRecord, TrackRecord};
use crate::prelude::{FusionResult, Timestamp};
use crate::targets::{RecordRefs, TargetId, TargetRegistry, TargetState};
use crate::telemetry::LogManager;

/// Acoustic event still waiting for a track to correlate with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingAcoustic {
    pub index: usize,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestOutcome {
    /// Target the record was folded into, if any.
    pub target: Option<TargetId>,
    /// Targets that became eligible during this call.
    pub eligible: Vec<TargetId>,
}

/// Decides which target each arriving record belongs to and when targets
/// have gathered enough evidence to be classified.
pub struct CorrelationStage {
    eligibility: EligibilityConfig,
    pending_acoustic: Vec<PendingAcoustic>,
    /// Newest track timestamp seen. Dwell checked at ingest runs on this
    /// clock so other streams cannot age tracks.
    track_clock: Option<Timestamp>,
    logger: LogManager,
}

impl CorrelationStage {
    pub fn new(eligibility: EligibilityConfig) -> Self {
        Self {
            eligibility,
            pending_acoustic: Vec::new(),
            track_clock: None,
            logger: LogManager::new("correlation"),
        }
    }

    pub fn pending_acoustic(&self) -> &[PendingAcoustic] {
        &self.pending_acoustic
    }

    /// Folds one validated record into the registry. Malformed records are
    /// rejected before anything is stored.
    pub fn ingest(
        &mut self,
        registry: &mut TargetRegistry,
        record: StreamRecord,
    ) -> FusionResult<IngestOutcome> {
        record.validate()?;
        let mut outcome = match record {
            StreamRecord::Track(track) => {
                let seen = track.timestamp;
                self.track_clock = Some(self.track_clock.map_or(seen, |clock| clock.max(seen)));
                self.ingest_track(registry, track)?
            }
            StreamRecord::Current(current) => {
                registry.set_latest_current(current)?;
                IngestOutcome::default()
            }
            StreamRecord::Acoustic(acoustic) => self.ingest_acoustic(registry, acoustic)?,
        };
        if let Some(now) = self.track_clock {
            for id in self.dwell_sweep(registry, now)? {
                if !outcome.eligible.contains(&id) {
                    outcome.eligible.push(id);
                }
            }
        }
        Ok(outcome)
    }

    fn ingest_track(
        &mut self,
        registry: &mut TargetRegistry,
        record: TrackRecord,
    ) -> FusionResult<IngestOutcome> {
        let seen = record.timestamp;
        let existing = registry.find_by_track(record.track_id);
        let open = match existing {
            Some(id) => registry.get(id)?.state == TargetState::Open,
            None => false,
        };

        let (id, count) = match existing {
            Some(id) if open => (id, registry.merge_ping(id, record)?),
            Some(id) => {
                // Past accumulation: keep it alive but stop merging.
                registry.get_mut(id)?.touch(seen);
                return Ok(IngestOutcome {
                    target: Some(id),
                    eligible: Vec::new(),
                });
            }
            None => {
                let id = registry.start_track_target(record)?;
                self.logger.record(&format!("new track target {} at {:.3}", id, seen));
                self.claim_pending_acoustic(registry, id, seen)?;
                (id, 1)
            }
        };

        let mut eligible = Vec::new();
        if count >= self.eligibility.max_pings {
            self.mark_eligible(registry, id, "ping count reached")?;
            eligible.push(id);
        }
        Ok(IngestOutcome {
            target: Some(id),
            eligible,
        })
    }

    fn ingest_acoustic(
        &mut self,
        registry: &mut TargetRegistry,
        record: AcousticRecord,
    ) -> FusionResult<IngestOutcome> {
        let heard = record.timestamp;
        let wait = self.eligibility.acoustic_max_wait;
        let index = registry.set_latest_acoustic(record)?;

        let candidates = registry.ids_where(|t| {
            t.has_track()
                && t.state.is_pending()
                && t.first_seen - wait <= heard
                && heard <= t.last_seen + wait
        });
        for id in &candidates {
            if registry.attach_acoustic(*id, index)? {
                self.logger
                    .record(&format!("acoustic event at {:.3} joined target {}", heard, id));
            }
        }

        if candidates.is_empty() {
            registry.tables_mut().retain::<AcousticRecord>(index)?;
            self.pending_acoustic.push(PendingAcoustic {
                index,
                timestamp: heard,
            });
        }
        Ok(IngestOutcome {
            target: candidates.last().copied(),
            eligible: Vec::new(),
        })
    }

    /// Attaches the newest waiting acoustic event near `seen` to a fresh track
    /// target; every waiting event in the window counts as correlated.
    fn claim_pending_acoustic(
        &mut self,
        registry: &mut TargetRegistry,
        id: TargetId,
        seen: Timestamp,
    ) -> FusionResult<()> {
        let wait = self.eligibility.acoustic_max_wait;
        let (matched, waiting): (Vec<PendingAcoustic>, Vec<PendingAcoustic>) =
            std::mem::take(&mut self.pending_acoustic)
                .into_iter()
                .partition(|p| (p.timestamp - seen).abs() <= wait);
        self.pending_acoustic = waiting;

        if let Some(newest) = matched
            .iter()
            .max_by(|a, b| a.timestamp.total_cmp(&b.timestamp))
        {
            registry.attach_acoustic(id, newest.index)?;
        }
        for pending in matched {
            registry.tables_mut().release::<AcousticRecord>(pending.index)?;
        }
        Ok(())
    }

    fn mark_eligible(
        &self,
        registry: &mut TargetRegistry,
        id: TargetId,
        reason: &str,
    ) -> FusionResult<()> {
        registry.get_mut(id)?.transition(TargetState::Eligible)?;
        self.logger.record(&format!("target {} eligible: {}", id, reason));
        Ok(())
    }

    fn dwell_sweep(&self, registry: &mut TargetRegistry, now: Timestamp) -> FusionResult<Vec<TargetId>> {
        let dwell = self.eligibility.track_max_dwell;
        let stale = registry.ids_where(|t| {
            t.state == TargetState::Open && t.has_track() && now - t.last_seen > dwell
        });
        for id in &stale {
            self.mark_eligible(registry, *id, "track went quiet")?;
        }
        Ok(stale)
    }

    /// Periodic pass: quiet tracks become eligible and acoustic events that
    /// waited out `acoustic_max_wait` stand alone as their own targets.
    pub fn sweep(&mut self, registry: &mut TargetRegistry, now: Timestamp) -> FusionResult<Vec<TargetId>> {
        let mut eligible = self.dwell_sweep(registry, now)?;

        let wait = self.eligibility.acoustic_max_wait;
        let (expired, waiting): (Vec<PendingAcoustic>, Vec<PendingAcoustic>) =
            std::mem::take(&mut self.pending_acoustic)
                .into_iter()
                .partition(|p| now - p.timestamp >= wait);
        self.pending_acoustic = waiting;

        for pending in expired {
            // The pending reference moves to the new target.
            let id = registry.create_target(
                pending.timestamp,
                RecordRefs {
                    acoustic: Some(pending.index),
                    ..Default::default()
                },
            );
            self.mark_eligible(registry, id, "acoustic event without a track")?;
            eligible.push(id);
        }
        Ok(eligible)
    }

    /// Releases every waiting acoustic event. Returns how many were dropped.
    pub fn abandon_pending(&mut self, registry: &mut TargetRegistry) -> FusionResult<usize> {
        let dropped = std::mem::take(&mut self.pending_acoustic);
        for pending in &dropped {
            registry.tables_mut().release::<AcousticRecord>(pending.index)?;
        }
        Ok(dropped.len())
    }
}
