use crate::classification::Label;
use crate::config::HyperspaceRule;
use crate::features::{AxisRange, Feature, FeatureVector};
use crate::prelude::{FusionError, FusionResult};

/// Ordered fallback rules used when the neighbour vote finds nothing.
///
/// Construction guarantees that every axis mentioned by any rule is covered
/// across the whole real line by the union of the rules' ranges, and that at
/// least one axis is constrained that way.
#[derive(Debug, Clone)]
pub struct OutlierRules {
    rules: Vec<HyperspaceRule>,
}

impl OutlierRules {
    pub fn new(rules: Vec<HyperspaceRule>, known_labels: &[Label]) -> FusionResult<Self> {
        if rules.is_empty() {
            return Err(FusionError::Hyperspace("no hyperspace rules supplied".into()));
        }

        for (position, rule) in rules.iter().enumerate() {
            if !known_labels.contains(&rule.label) {
                return Err(FusionError::Hyperspace(format!(
                    "rule {} uses unknown label {:?}",
                    position,
                    rule.label.as_str()
                )));
            }
            for feature in Feature::ALL {
                if let Some(range) = rule.ranges.get(feature) {
                    if !range.is_well_formed() {
                        return Err(FusionError::Hyperspace(format!(
                            "rule {} has an inverted {} range",
                            position,
                            feature.as_str()
                        )));
                    }
                }
            }
        }

        let mut covered_axes = 0;
        for feature in Feature::ALL {
            let mut ranges: Vec<AxisRange> = rules
                .iter()
                .filter_map(|rule| *rule.ranges.get(feature))
                .collect();
            if ranges.is_empty() {
                continue;
            }
            if !covers_real_line(&mut ranges) {
                return Err(FusionError::Hyperspace(format!(
                    "ranges for {} leave part of the real line uncovered",
                    feature.as_str()
                )));
            }
            covered_axes += 1;
        }
        if covered_axes == 0 {
            return Err(FusionError::Hyperspace(
                "no feature is fully covered by the hyperspace rules".into(),
            ));
        }

        Ok(Self { rules })
    }

    /// First rule whose every constrained axis contains the raw feature value.
    pub fn classify(&self, raw: &FeatureVector) -> Option<&Label> {
        self.rules
            .iter()
            .find(|rule| {
                Feature::ALL.iter().all(|feature| match rule.ranges.get(*feature) {
                    Some(range) => range.contains(raw[*feature]),
                    None => true,
                })
            })
            .map(|rule| &rule.label)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Interval-merge sweep over inclusive ranges.
fn covers_real_line(ranges: &mut [AxisRange]) -> bool {
    ranges.sort_by(|a, b| a.lo().total_cmp(&b.lo()));
    let Some(first) = ranges.first() else {
        return false;
    };
    if first.lo() != f64::NEG_INFINITY {
        return false;
    }
    let mut reach = first.hi();
    for range in &ranges[1..] {
        if range.lo() > reach {
            return false;
        }
        reach = reach.max(range.hi());
    }
    reach == f64::INFINITY
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClassifierConfig;
    use crate::features::FeatureMap;

    fn labels() -> Vec<Label> {
        vec!["Marine Mammal".into(), "Small Fish".into(), "Outliers".into()]
    }

    fn rule(label: &str, size: Option<AxisRange>, speed: Option<AxisRange>) -> HyperspaceRule {
        HyperspaceRule {
            label: label.into(),
            ranges: FeatureMap {
                size,
                speed,
                ..Default::default()
            },
        }
    }

    #[test]
    fn default_rules_validate_and_fall_through_to_outliers() {
        let config = ClassifierConfig::default();
        let rules = OutlierRules::new(config.hyperspaces, &config.labels).unwrap();
        assert_eq!(rules.len(), 3);

        let small = FeatureVector([0.1, 0.5, 0.2, 40.0, 300.0, 0.1]);
        assert_eq!(rules.classify(&small).unwrap().as_str(), "Small Fish");

        let odd = FeatureVector([1.0, 0.5, 0.2, 95.0, 300.0, 0.1]);
        assert_eq!(rules.classify(&odd).unwrap().as_str(), "Outliers");
    }

    #[test]
    fn gap_in_coverage_is_rejected() {
        let rules = vec![
            rule("Small Fish", Some(AxisRange(f64::NEG_INFINITY, 0.2)), None),
            rule("Outliers", Some(AxisRange(0.3, f64::INFINITY)), None),
        ];
        assert!(matches!(
            OutlierRules::new(rules, &labels()),
            Err(FusionError::Hyperspace(_))
        ));
    }

    #[test]
    fn touching_inclusive_ranges_cover_the_line() {
        let rules = vec![
            rule("Small Fish", Some(AxisRange(f64::NEG_INFINITY, 0.25)), None),
            rule("Outliers", Some(AxisRange(0.25, f64::INFINITY)), None),
        ];
        let rules = OutlierRules::new(rules, &labels()).unwrap();
        let at_edge = FeatureVector([0.25, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(rules.classify(&at_edge).unwrap().as_str(), "Small Fish");
    }

    #[test]
    fn every_mentioned_axis_must_be_covered() {
        let rules = vec![
            rule("Small Fish", Some(AxisRange(0.0, 1.0)), Some(AxisRange(0.0, 1.0))),
            rule(
                "Outliers",
                Some(AxisRange(f64::NEG_INFINITY, f64::INFINITY)),
                None,
            ),
        ];
        assert!(OutlierRules::new(rules, &labels()).is_err());
    }

    #[test]
    fn unknown_label_is_rejected() {
        let rules = vec![rule(
            "Kelp",
            Some(AxisRange(f64::NEG_INFINITY, f64::INFINITY)),
            None,
        )];
        assert!(OutlierRules::new(rules, &labels()).is_err());
    }

    #[test]
    fn rules_without_any_axis_are_rejected() {
        let rules = vec![rule("Outliers", None, None)];
        assert!(OutlierRules::new(rules, &labels()).is_err());
    }
}
