use crate::prelude::{FusionError, FusionResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const HEADER: &str = "AAAA";
const FOOTER: &str = "ZZZZ";

/// Save command for the recording subsystem: one flag per configured
/// instrument, in configuration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerCommand {
    pub flags: Vec<bool>,
}

impl TriggerCommand {
    pub fn new(flags: Vec<bool>) -> Self {
        Self { flags }
    }

    pub fn any(&self) -> bool {
        self.flags.iter().any(|f| *f)
    }

    /// ASCII frame `AAAA <f1> ... <fn> ZZZZ`.
    pub fn encode(&self) -> String {
        let mut frame = String::with_capacity(10 + self.flags.len() * 2);
        frame.push_str(HEADER);
        for flag in &self.flags {
            frame.push(' ');
            frame.push(if *flag { '1' } else { '0' });
        }
        frame.push(' ');
        frame.push_str(FOOTER);
        frame
    }

    pub fn parse(frame: &str) -> FusionResult<Self> {
        let tokens: Vec<&str> = frame.split_whitespace().collect();
        if tokens.len() < 2 || tokens[0] != HEADER || tokens[tokens.len() - 1] != FOOTER {
            return Err(FusionError::Dispatch(format!("bad frame markers in {:?}", frame)));
        }
        let flags = tokens[1..tokens.len() - 1]
            .iter()
            .map(|token| match *token {
                "1" => Ok(true),
                "0" => Ok(false),
                other => Err(FusionError::Dispatch(format!("bad flag {:?}", other))),
            })
            .collect::<FusionResult<Vec<_>>>()?;
        Ok(Self { flags })
    }
}

impl fmt::Display for TriggerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Transport that carries command frames to the recording subsystem.
pub trait CommandSink: Send {
    fn send(&mut self, command: &TriggerCommand) -> FusionResult<()>;
}

/// Sink that keeps every command in memory; used by offline replay.
///
/// Clones share the same log, so a caller can keep one handle while the
/// engine owns another.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    sent: Arc<Mutex<Vec<TriggerCommand>>>,
    fail_next: Arc<AtomicUsize>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` sends fail.
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<TriggerCommand> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }

    pub fn frames(&self) -> Vec<String> {
        self.sent().iter().map(TriggerCommand::encode).collect()
    }
}

impl CommandSink for RecordingSink {
    fn send(&mut self, command: &TriggerCommand) -> FusionResult<()> {
        let refused = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(FusionError::Dispatch("recording sink refused frame".into()));
        }
        self.sent
            .lock()
            .map_err(|_| FusionError::Internal("recording sink lock poisoned".into()))?
            .push(command.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_flags_between_markers() {
        let command = TriggerCommand::new(vec![true, false, true, true]);
        assert_eq!(command.encode(), "AAAA 1 0 1 1 ZZZZ");
        assert_eq!(command.encode().len(), 17);
    }

    #[test]
    fn parse_rejects_missing_footer() {
        assert!(TriggerCommand::parse("AAAA 1 0").is_err());
        assert!(TriggerCommand::parse("AAAA 1 2 ZZZZ").is_err());
        assert_eq!(
            TriggerCommand::parse("AAAA 0 1 ZZZZ").unwrap().flags,
            vec![false, true]
        );
    }

    #[test]
    fn recording_sink_can_simulate_failures() {
        let mut sink = RecordingSink::new();
        let observer = sink.clone();
        sink.fail_next(1);
        let command = TriggerCommand::new(vec![true]);
        assert!(sink.send(&command).is_err());
        assert!(sink.send(&command).is_ok());
        assert_eq!(observer.frames(), vec!["AAAA 1 ZZZZ".to_string()]);
    }
}
