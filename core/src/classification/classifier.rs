use crate::classification::{
    BruteForceIndex, ClassifierHistory, Label, Neighbor, OutlierRules, RadiusQuery,
};
use crate::config::{ClassifierConfig, ReliabilityWeights};
use crate::features::FeatureVector;
use crate::prelude::{FusionError, FusionResult};
use crate::targets::{Provenance, Review};
use serde::Serialize;

/// Floor applied to neighbour distances so an exact match gets a finite vote.
const MIN_DISTANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub label: Label,
    /// Summed vote weight of the winning label; zero for a fallback result.
    pub strength: f64,
    pub neighbors: usize,
    /// Set when the label came from the hyperspace rules.
    pub fallback: bool,
}

/// Weighted radius-neighbour vote with a hyperspace fallback.
pub struct Classifier {
    config: ClassifierConfig,
    site: String,
    index: Box<dyn RadiusQuery>,
    labels: Vec<Label>,
    sources: Vec<Provenance>,
    outliers: Option<OutlierRules>,
}

impl Classifier {
    pub fn fit(config: ClassifierConfig, site: &str, history: &ClassifierHistory) -> FusionResult<Self> {
        Self::fit_with_index(config, site, history, Box::new(BruteForceIndex::new()))
    }

    /// Builds the classifier around a caller-supplied neighbour index.
    /// Hyperspace rules are validated here and reject the whole fit.
    pub fn fit_with_index(
        config: ClassifierConfig,
        site: &str,
        history: &ClassifierHistory,
        index: Box<dyn RadiusQuery>,
    ) -> FusionResult<Self> {
        let outliers = if config.hyperspaces.is_empty() {
            None
        } else {
            Some(OutlierRules::new(config.hyperspaces.clone(), &config.labels)?)
        };
        let mut classifier = Self {
            config,
            site: site.to_string(),
            index,
            labels: Vec::new(),
            sources: Vec::new(),
            outliers,
        };
        classifier.refit(history)?;
        Ok(classifier)
    }

    /// Rebuilds the neighbour index over the full history.
    pub fn refit(&mut self, history: &ClassifierHistory) -> FusionResult<()> {
        self.index.fit(history.features())?;
        self.labels = history.labels().to_vec();
        self.sources = history.sources().to_vec();
        Ok(())
    }

    pub fn fitted_len(&self) -> usize {
        self.labels.len()
    }

    /// Classifies a raw (unscaled) feature vector.
    pub fn classify(&self, raw: &FeatureVector) -> FusionResult<Classification> {
        let scaled = self.config.axis_bounds.scale(raw);
        let neighbors = self.search(&scaled)?;

        if neighbors.is_empty() {
            return match self.outliers.as_ref().and_then(|rules| rules.classify(raw)) {
                Some(label) => Ok(Classification {
                    label: label.clone(),
                    strength: 0.0,
                    neighbors: 0,
                    fallback: true,
                }),
                None => Err(FusionError::Unclassifiable),
            };
        }

        let mut tallies: Vec<(&Label, f64)> = Vec::new();
        for neighbor in &neighbors {
            let label = self.label_at(neighbor.index)?;
            let source = self.source_at(neighbor.index)?;
            let weight = self.config.reliability.weight(source, &self.site)
                / neighbor.distance.max(MIN_DISTANCE);
            match tallies.iter_mut().find(|(seen, _)| *seen == label) {
                Some(entry) => entry.1 += weight,
                None => tallies.push((label, weight)),
            }
        }

        // Strict comparison keeps the first-seen label on equal totals.
        let mut winner = tallies[0];
        for &candidate in &tallies[1..] {
            if candidate.1 > winner.1 {
                winner = candidate;
            }
        }

        Ok(Classification {
            label: winner.0.clone(),
            strength: winner.1,
            neighbors: neighbors.len(),
            fallback: false,
        })
    }

    fn search(&self, scaled: &FeatureVector) -> FusionResult<Vec<Neighbor>> {
        let found = self
            .index
            .neighbors_within_radius(scaled, self.config.initial_radius);
        if self.needs_wider_search(&found)? {
            let radius = self.config.initial_radius + self.config.radius_increment;
            return Ok(self.index.neighbors_within_radius(scaled, radius));
        }
        Ok(found)
    }

    fn needs_wider_search(&self, found: &[Neighbor]) -> FusionResult<bool> {
        Ok(match found {
            [] | [_] => true,
            [a, b] => {
                self.label_at(a.index)? != self.label_at(b.index)?
                    && (a.distance - b.distance).abs() < self.config.tie_threshold
            }
            _ => false,
        })
    }

    fn label_at(&self, index: usize) -> FusionResult<&Label> {
        self.labels.get(index).ok_or(FusionError::IndexOutOfBounds {
            table: "classifier_labels",
            index,
            len: self.labels.len(),
        })
    }

    fn source_at(&self, index: usize) -> FusionResult<&Provenance> {
        self.sources.get(index).ok_or(FusionError::IndexOutOfBounds {
            table: "classifier_sources",
            index,
            len: self.sources.len(),
        })
    }
}

impl ReliabilityWeights {
    pub fn weight(&self, source: &Provenance, site: &str) -> f64 {
        match (source.is_home(site), source.review) {
            (true, Review::Manual) => self.home_manual,
            (true, Review::Auto) => self.home_auto,
            (false, Review::Manual) => self.foreign_manual,
            (false, Review::Auto) => self.foreign_auto,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClassifierConfig;

    fn config() -> ClassifierConfig {
        ClassifierConfig::default()
    }

    fn empty_history() -> ClassifierHistory {
        ClassifierHistory::new(config().axis_bounds)
    }

    fn raw(size: f64, speed: f64) -> FeatureVector {
        FeatureVector([size, speed, 0.2, 60.0, 300.0, 0.0])
    }

    #[test]
    fn empty_history_falls_back_to_hyperspaces() {
        let classifier = Classifier::fit(config(), "MSL", &empty_history()).unwrap();
        let result = classifier
            .classify(&FeatureVector([1.0, 0.5, 0.2, 95.0, 300.0, 0.1]))
            .unwrap();
        assert_eq!(result.label.as_str(), "Outliers");
        assert!(result.fallback);
    }

    #[test]
    fn no_neighbours_and_no_rules_is_unclassifiable() {
        let mut config = config();
        config.hyperspaces.clear();
        let classifier = Classifier::fit(config, "MSL", &empty_history()).unwrap();
        assert!(matches!(
            classifier.classify(&raw(1.0, 1.0)),
            Err(FusionError::Unclassifiable)
        ));
    }

    #[test]
    fn invalid_hyperspaces_fail_the_fit() {
        let mut config = config();
        config.hyperspaces.pop();
        assert!(matches!(
            Classifier::fit(config, "MSL", &empty_history()),
            Err(FusionError::Hyperspace(_))
        ));
    }

    #[test]
    fn reliability_ordering_follows_site_and_review() {
        let weights = ReliabilityWeights::default();
        assert_eq!(weights.weight(&Provenance::manual("MSL"), "MSL"), 1.0);
        assert_eq!(weights.weight(&Provenance::auto("MSL"), "MSL"), 0.8);
        assert_eq!(weights.weight(&Provenance::manual("PNNL"), "MSL"), 0.7);
        assert_eq!(weights.weight(&Provenance::auto("PNNL"), "MSL"), 0.5);
    }

    #[test]
    fn closer_and_more_reliable_neighbours_win() {
        let mut history = empty_history();
        // Two foreign automatic fish slightly closer than three home manual mammals.
        for offset in [0.03, 0.06] {
            history.push(&raw(1.5 + offset, 1.0), "Small Fish".into(), Provenance::auto("PNNL"), String::new());
        }
        for offset in [0.09, 0.12, 0.15] {
            history.push(&raw(1.5 - offset, 1.0), "Marine Mammal".into(), Provenance::manual("MSL"), String::new());
        }
        let classifier = Classifier::fit(config(), "MSL", &history).unwrap();
        let result = classifier.classify(&raw(1.5, 1.0)).unwrap();
        assert_eq!(result.neighbors, 5);
        assert!(!result.fallback);
        assert_eq!(result.label.as_str(), "Marine Mammal");
    }

    #[test]
    fn single_neighbour_triggers_a_wider_search() {
        let mut history = empty_history();
        // Scaled distances 0.1 and 0.2 along the size axis (3 m² span).
        history.push(&raw(1.8, 1.0), "Small Fish".into(), Provenance::manual("MSL"), String::new());
        for _ in 0..3 {
            history.push(&raw(2.1, 1.0), "Marine Mammal".into(), Provenance::manual("MSL"), String::new());
        }
        let classifier = Classifier::fit(config(), "MSL", &history).unwrap();
        let result = classifier.classify(&raw(1.5, 1.0)).unwrap();
        assert_eq!(result.neighbors, 4);
        assert_eq!(result.label.as_str(), "Marine Mammal");
    }

    #[test]
    fn classification_is_idempotent() {
        let mut history = empty_history();
        // Equidistant on the speed axis, only reachable after widening.
        history.push(&raw(0.3, 1.25), "Small Fish".into(), Provenance::auto("MSL"), String::new());
        history.push(&raw(0.3, 3.75), "Marine Mammal".into(), Provenance::auto("MSL"), String::new());
        let classifier = Classifier::fit(config(), "MSL", &history).unwrap();
        let first = classifier.classify(&raw(0.3, 2.5)).unwrap();
        assert_eq!(first.neighbors, 2);
        for _ in 0..5 {
            assert_eq!(classifier.classify(&raw(0.3, 2.5)).unwrap(), first);
        }
        // Equal totals keep the first neighbour's label.
        assert_eq!(first.label.as_str(), "Small Fish");
    }

    #[test]
    fn refit_picks_up_new_history() {
        let mut history = empty_history();
        let mut classifier = Classifier::fit(config(), "MSL", &history).unwrap();
        assert_eq!(classifier.fitted_len(), 0);
        history.push(&raw(2.0, 2.0), "Marine Mammal".into(), Provenance::manual("MSL"), String::new());
        history.push(&raw(2.0, 2.0), "Marine Mammal".into(), Provenance::manual("MSL"), String::new());
        classifier.refit(&history).unwrap();
        assert_eq!(classifier.fitted_len(), 2);
        let result = classifier.classify(&raw(2.0, 2.1)).unwrap();
        assert_eq!(result.label.as_str(), "Marine Mammal");
        assert!(!result.fallback);
    }
}
