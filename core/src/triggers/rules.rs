use crate::classification::Label;
use crate::config::{FusionConfig, InstrumentConfig, InstrumentRole};
use crate::prelude::{FusionResult, Timestamp};
use crate::targets::{Target, TargetRegistry};

/// What the decision rules need to know about one target.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerContext {
    pub has_acoustic: bool,
    pub has_track: bool,
    /// Ambient current speed (m/s) pinned at classification, else the latest reading.
    pub current_magnitude: f64,
    /// Closest range the track was ever observed at.
    pub min_range: Option<f64>,
    pub detected_at: Timestamp,
}

impl TriggerContext {
    pub fn for_target(registry: &TargetRegistry, target: &Target) -> FusionResult<Self> {
        let current = match registry.current_of(target)? {
            Some(pinned) => Some(pinned),
            None => registry.latest_current()?,
        };
        let min_range = registry
            .aggregate(target)?
            .map(|aggregate| aggregate.merged.min_range_m);
        Ok(Self {
            has_acoustic: target.has_acoustic(),
            has_track: target.has_track(),
            current_magnitude: current.map(|c| c.speed).unwrap_or(0.0),
            min_range,
            detected_at: target.first_seen,
        })
    }
}

/// Which branch of the decision hierarchy fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerRule {
    AcousticOnly,
    AcousticWithTrack,
    CurrentAndInteresting,
    NoTrigger,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TriggerDecision {
    pub rule: TriggerRule,
    /// One flag per configured instrument, in configuration order.
    pub flags: Vec<bool>,
}

impl TriggerDecision {
    pub fn any(&self) -> bool {
        self.flags.iter().any(|f| *f)
    }
}

/// Decision hierarchy mapping a target and its label to instruments to save.
pub struct TriggerRules {
    instruments: Vec<InstrumentConfig>,
    current_threshold: f64,
    interesting: Vec<Label>,
}

impl TriggerRules {
    pub fn new(config: &FusionConfig) -> Self {
        Self {
            instruments: config.instruments.clone(),
            current_threshold: config.current_threshold,
            interesting: config.interesting_labels.clone(),
        }
    }

    pub fn decide(&self, context: &TriggerContext, label: Option<&Label>) -> TriggerDecision {
        let (rule, flags) = if context.has_acoustic && !context.has_track {
            (
                TriggerRule::AcousticOnly,
                self.flags(|role| matches!(role, InstrumentRole::Acoustic)),
            )
        } else if context.has_acoustic {
            (
                TriggerRule::AcousticWithTrack,
                self.flags(|role| matches!(role, InstrumentRole::Acoustic | InstrumentRole::WideField)),
            )
        } else if context.current_magnitude >= self.current_threshold
            && label.map(|l| self.interesting.contains(l)).unwrap_or(false)
        {
            // Range-limited instruments fire when the target stayed beyond
            // their maximum range; the comparison direction is intentional.
            let min_range = context.min_range;
            (
                TriggerRule::CurrentAndInteresting,
                self.flags(|role| match role {
                    InstrumentRole::WideField => true,
                    InstrumentRole::RangeLimited { max_range } => {
                        min_range.map(|r| r > *max_range).unwrap_or(false)
                    }
                    InstrumentRole::Acoustic => false,
                }),
            )
        } else {
            (TriggerRule::NoTrigger, vec![false; self.instruments.len()])
        };
        TriggerDecision { rule, flags }
    }

    fn flags(&self, selected: impl Fn(&InstrumentRole) -> bool) -> Vec<bool> {
        self.instruments.iter().map(|i| selected(&i.role)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> TriggerRules {
        TriggerRules::new(&FusionConfig::default())
    }

    fn context(has_acoustic: bool, has_track: bool, current: f64, min_range: Option<f64>) -> TriggerContext {
        TriggerContext {
            has_acoustic,
            has_track,
            current_magnitude: current,
            min_range,
            detected_at: 0.0,
        }
    }

    // Default instrument order: m3, blueview (10 m), hydrophones, camera (8 m).

    #[test]
    fn acoustic_without_track_saves_only_hydrophones() {
        let decision = rules().decide(&context(true, false, 0.0, None), None);
        assert_eq!(decision.rule, TriggerRule::AcousticOnly);
        assert_eq!(decision.flags, vec![false, false, true, false]);
    }

    #[test]
    fn acoustic_with_track_adds_wide_field() {
        let label = Label::from("Small Fish");
        let decision = rules().decide(&context(true, true, 0.0, Some(2.0)), Some(&label));
        assert_eq!(decision.rule, TriggerRule::AcousticWithTrack);
        assert_eq!(decision.flags, vec![true, false, true, false]);
    }

    #[test]
    fn range_limited_instruments_follow_min_range() {
        let label = Label::from("Marine Mammal");
        let far = rules().decide(&context(false, true, 0.3, Some(9.0)), Some(&label));
        assert_eq!(far.rule, TriggerRule::CurrentAndInteresting);
        assert_eq!(far.flags, vec![true, false, false, true]);

        let beyond_both = rules().decide(&context(false, true, 0.3, Some(12.0)), Some(&label));
        assert_eq!(beyond_both.flags, vec![true, true, false, true]);

        let near = rules().decide(&context(false, true, 0.3, Some(5.0)), Some(&label));
        assert_eq!(near.flags, vec![true, false, false, false]);
    }

    #[test]
    fn weak_current_or_dull_label_saves_nothing() {
        let label = Label::from("Marine Mammal");
        let calm = rules().decide(&context(false, true, 0.1, Some(9.0)), Some(&label));
        assert_eq!(calm.rule, TriggerRule::NoTrigger);
        assert!(!calm.any());

        let mut config = FusionConfig::default();
        config.interesting_labels = vec!["Marine Mammal".into()];
        let fish = Label::from("Small Fish");
        let dull = TriggerRules::new(&config).decide(&context(false, true, 0.3, Some(9.0)), Some(&fish));
        assert!(!dull.any());
    }

    #[test]
    fn threshold_is_inclusive() {
        let label = Label::from("Outliers");
        let decision = rules().decide(&context(false, true, 0.25, Some(1.0)), Some(&label));
        assert_eq!(decision.rule, TriggerRule::CurrentAndInteresting);
    }
}
