use crate::classification::Label;
use crate::prelude::{FusionError, FusionResult, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type TargetId = u64;

/// Lifecycle of a target. Retirement removes it from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetState {
    Open,
    Eligible,
    Classifying,
    Classified,
    Abandoned,
    Retired,
}

impl TargetState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetState::Open => "open",
            TargetState::Eligible => "eligible",
            TargetState::Classifying => "classifying",
            TargetState::Classified => "classified",
            TargetState::Abandoned => "abandoned",
            TargetState::Retired => "retired",
        }
    }

    fn can_become(self, next: TargetState) -> bool {
        use TargetState::*;
        matches!(
            (self, next),
            (Open, Eligible)
                | (Eligible, Classifying)
                | (Classifying, Classified)
                | (Open | Eligible | Classifying, Abandoned)
                | (Classified | Abandoned, Retired)
        )
    }

    /// Still waiting for (or undergoing) classification.
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            TargetState::Open | TargetState::Eligible | TargetState::Classifying
        )
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, TargetState::Classified | TargetState::Abandoned)
    }
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Review {
    Auto,
    Manual,
}

/// Where a classification came from: `<site>_auto` or `<site>_manual`.
/// Tags without either suffix are kept whole as an unreviewed external source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Provenance {
    pub site: String,
    pub review: Review,
}

impl Provenance {
    pub fn auto(site: &str) -> Self {
        Self {
            site: site.to_string(),
            review: Review::Auto,
        }
    }

    pub fn manual(site: &str) -> Self {
        Self {
            site: site.to_string(),
            review: Review::Manual,
        }
    }

    pub fn is_home(&self, site: &str) -> bool {
        self.site == site
    }
}

impl From<String> for Provenance {
    fn from(tag: String) -> Self {
        match tag.rsplit_once('_') {
            Some((site, "auto")) => Provenance::auto(site),
            Some((site, "manual")) => Provenance::manual(site),
            _ => Provenance {
                site: tag,
                review: Review::Auto,
            },
        }
    }
}

impl From<Provenance> for String {
    fn from(source: Provenance) -> Self {
        source.to_string()
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let review = match self.review {
            Review::Auto => "auto",
            Review::Manual => "manual",
        };
        write!(f, "{}_{}", self.site, review)
    }
}

/// Table slots a target holds a reference on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRefs {
    /// Merged track entry; its own index list names the constituent pings.
    pub aggregate: Option<usize>,
    /// Ambient current pinned when classification started.
    pub current: Option<usize>,
    pub acoustic: Option<usize>,
}

/// One physical object under observation.
#[derive(Debug, Clone, Serialize)]
pub struct Target {
    pub id: TargetId,
    pub source: Provenance,
    pub first_seen: Timestamp,
    pub last_seen: Timestamp,
    pub track_id: Option<u32>,
    pub state: TargetState,
    pub classification: Option<Label>,
    pub refs: RecordRefs,
}

impl Target {
    pub fn new(id: TargetId, source: Provenance, seen: Timestamp, refs: RecordRefs) -> Self {
        Self {
            id,
            source,
            first_seen: seen,
            last_seen: seen,
            track_id: None,
            state: TargetState::Open,
            classification: None,
            refs,
        }
    }

    pub fn has_track(&self) -> bool {
        self.refs.aggregate.is_some()
    }

    pub fn has_acoustic(&self) -> bool {
        self.refs.acoustic.is_some()
    }

    pub fn touch(&mut self, seen: Timestamp) {
        self.last_seen = self.last_seen.max(seen);
    }

    pub fn transition(&mut self, next: TargetState) -> FusionResult<()> {
        if !self.state.can_become(next) {
            return Err(FusionError::InvalidTransition {
                id: self.id,
                from: self.state.as_str(),
                to: next.as_str(),
            });
        }
        self.state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provenance_round_trips_through_tag() {
        let manual = Provenance::from("MSL_manual".to_string());
        assert_eq!(manual, Provenance::manual("MSL"));
        assert_eq!(manual.to_string(), "MSL_manual");

        let underscored = Provenance::from("north_site_auto".to_string());
        assert_eq!(underscored.site, "north_site");

        let external = Provenance::from("survey2019".to_string());
        assert_eq!(external.site, "survey2019");
        assert_eq!(external.review, Review::Auto);
        assert!(!external.is_home("MSL"));
    }

    #[test]
    fn lifecycle_follows_allowed_transitions() {
        let mut target = Target::new(1, Provenance::auto("MSL"), 10.0, RecordRefs::default());
        assert!(target.transition(TargetState::Classified).is_err());
        target.transition(TargetState::Eligible).unwrap();
        target.transition(TargetState::Classifying).unwrap();
        target.transition(TargetState::Classified).unwrap();
        assert!(target.state.is_finished());
        target.transition(TargetState::Retired).unwrap();
    }

    #[test]
    fn touch_never_moves_last_seen_backwards() {
        let mut target = Target::new(1, Provenance::auto("MSL"), 10.0, RecordRefs::default());
        target.touch(12.0);
        target.touch(11.0);
        assert_eq!(target.last_seen, 12.0);
        assert_eq!(target.first_seen, 10.0);
    }
}
