use crate::config::{FusionConfig, InstrumentConfig, SaveConfig};
use crate::instrument_interface::{CommandSink, TriggerCommand};
use crate::prelude::{FusionResult, Timestamp};
use crate::telemetry::LogManager;
use crate::triggers::TriggerDecision;
use serde::Serialize;
use std::collections::VecDeque;

/// Per-instrument debounce state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TriggerStatus {
    /// Detection timestamps waiting to be saved, oldest first.
    pub pending: VecDeque<Timestamp>,
    pub last_sent: Option<Timestamp>,
}

/// Turns save decisions into a spaced-out sequence of combined commands.
///
/// A pending detection is dispatched once the instrument's rolling buffer
/// holds `time_before_target` seconds of lead-in before it, and never sooner
/// than `buffer_size - buffer_overlap` after the previous command for that
/// instrument. Sending one detection also covers every other pending
/// detection within `min_time_between_targets` of it.
pub struct TriggerEngine {
    instruments: Vec<InstrumentConfig>,
    save: SaveConfig,
    status: Vec<TriggerStatus>,
    logger: LogManager,
}

impl TriggerEngine {
    pub fn new(config: &FusionConfig) -> Self {
        Self {
            instruments: config.instruments.clone(),
            save: config.save.clone(),
            status: vec![TriggerStatus::default(); config.instruments.len()],
            logger: LogManager::new("triggers"),
        }
    }

    /// Queues `detected_at` for every instrument the decision selected,
    /// keeping each queue ordered by detection time.
    pub fn evaluate(&mut self, decision: &TriggerDecision, detected_at: Timestamp) -> usize {
        let mut queued = 0;
        for (status, selected) in self.status.iter_mut().zip(&decision.flags) {
            if *selected {
                let at = status.pending.partition_point(|&ts| ts <= detected_at);
                status.pending.insert(at, detected_at);
                queued += 1;
            }
        }
        queued
    }

    fn ready(&self, slot: usize, now: Timestamp) -> bool {
        let buffer = self.instruments[slot].buffer_size;
        let status = &self.status[slot];
        let Some(&oldest) = status.pending.front() else {
            return false;
        };
        let captured = now - oldest >= buffer - self.save.time_before_target;
        let spaced = status
            .last_sent
            .map(|sent| now - sent >= buffer - self.save.buffer_overlap)
            .unwrap_or(true);
        captured && spaced
    }

    /// Instruments that would be flagged if a command went out at `now`.
    pub fn plan(&self, now: Timestamp) -> Vec<bool> {
        (0..self.status.len()).map(|slot| self.ready(slot, now)).collect()
    }

    fn commit(&mut self, flags: &[bool], now: Timestamp) {
        let window = self.save.min_time_between_targets;
        for (status, sent) in self.status.iter_mut().zip(flags) {
            if !*sent {
                continue;
            }
            if let Some(detection) = status.pending.pop_front() {
                status.pending.retain(|other| (other - detection).abs() >= window);
            }
            status.last_sent = Some(now);
        }
    }

    /// Sends at most one combined command. State only advances when the
    /// sink accepts the frame; on failure everything stays pending.
    pub fn flush(
        &mut self,
        now: Timestamp,
        sink: &mut dyn CommandSink,
    ) -> FusionResult<Option<TriggerCommand>> {
        let flags = self.plan(now);
        if !flags.iter().any(|f| *f) {
            return Ok(None);
        }
        let command = TriggerCommand::new(flags);
        if let Err(err) = sink.send(&command) {
            self.logger
                .warn(&format!("sending {} failed, will retry: {}", command, err));
            return Err(err);
        }
        self.commit(&command.flags, now);
        self.logger.record(&format!("dispatched {} at {:.3}", command, now));
        Ok(Some(command))
    }

    /// Drops every pending detection without sending. Returns how many were dropped.
    pub fn discard_pending(&mut self) -> usize {
        self.status
            .iter_mut()
            .map(|status| {
                let dropped = status.pending.len();
                status.pending.clear();
                dropped
            })
            .sum()
    }

    pub fn pending(&self) -> usize {
        self.status.iter().map(|s| s.pending.len()).sum()
    }

    pub fn status(&self) -> &[TriggerStatus] {
        &self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument_interface::RecordingSink;
    use crate::triggers::TriggerRule;

    // Defaults: 15 s buffers, 2 s overlap, 5 s lead-in, 5 s coverage window.
    // Dispatch needs 10 s after detection and 13 s after the previous send.

    fn engine() -> TriggerEngine {
        TriggerEngine::new(&FusionConfig::default())
    }

    fn decision(flags: [bool; 4]) -> TriggerDecision {
        TriggerDecision {
            rule: TriggerRule::CurrentAndInteresting,
            flags: flags.to_vec(),
        }
    }

    #[test]
    fn detection_waits_for_lead_in() {
        let mut engine = engine();
        let mut sink = RecordingSink::new();
        engine.evaluate(&decision([true, false, true, false]), 100.0);

        assert_eq!(engine.flush(109.0, &mut sink).unwrap(), None);
        let sent = engine.flush(110.0, &mut sink).unwrap().unwrap();
        assert_eq!(sent.encode(), "AAAA 1 0 1 0 ZZZZ");
        assert_eq!(engine.pending(), 0);
        assert_eq!(engine.status()[0].last_sent, Some(110.0));
    }

    #[test]
    fn nearby_detections_are_covered_by_one_command() {
        let mut engine = engine();
        let mut sink = RecordingSink::new();
        engine.evaluate(&decision([true, false, false, false]), 100.0);
        engine.evaluate(&decision([true, false, false, false]), 103.0);
        engine.evaluate(&decision([true, false, false, false]), 108.0);

        engine.flush(110.0, &mut sink).unwrap().unwrap();
        assert_eq!(engine.status()[0].pending, VecDeque::from(vec![108.0]));
    }

    #[test]
    fn late_completed_older_detection_is_not_blocked() {
        let mut engine = engine();
        let mut sink = RecordingSink::new();
        engine.evaluate(&decision([true, false, false, false]), 100.0);
        engine.evaluate(&decision([true, false, false, false]), 92.0);
        assert_eq!(engine.status()[0].pending, VecDeque::from(vec![92.0, 100.0]));

        let sent = engine.flush(105.0, &mut sink).unwrap().unwrap();
        assert_eq!(sent.encode(), "AAAA 1 0 0 0 ZZZZ");
        assert_eq!(engine.status()[0].pending, VecDeque::from(vec![100.0]));
    }

    #[test]
    fn commands_per_instrument_are_spaced_by_buffer_minus_overlap() {
        let mut engine = engine();
        let mut sink = RecordingSink::new();
        let mut sent_at = Vec::new();
        for step in 0..400 {
            let now = step as f64 * 0.5;
            if step % 7 == 0 {
                engine.evaluate(&decision([true, false, false, false]), now);
            }
            if engine.flush(now, &mut sink).unwrap().is_some() {
                sent_at.push(now);
            }
        }
        assert!(sent_at.len() > 2);
        for pair in sent_at.windows(2) {
            assert!(pair[1] - pair[0] >= 13.0);
        }
    }

    #[test]
    fn failed_send_keeps_entries_for_the_next_cycle() {
        let mut engine = engine();
        let mut sink = RecordingSink::new();
        sink.fail_next(1);
        engine.evaluate(&decision([false, false, true, false]), 0.0);

        assert!(engine.flush(10.0, &mut sink).is_err());
        assert_eq!(engine.pending(), 1);
        assert_eq!(engine.status()[2].last_sent, None);

        let sent = engine.flush(11.0, &mut sink).unwrap().unwrap();
        assert_eq!(sent.flags, vec![false, false, true, false]);
        assert_eq!(sink.sent().len(), 1);
    }

    #[test]
    fn discard_drops_everything_pending() {
        let mut engine = engine();
        engine.evaluate(&decision([true, true, true, true]), 0.0);
        assert_eq!(engine.discard_pending(), 4);
        assert_eq!(engine.plan(100.0), vec![false; 4]);
    }
}
