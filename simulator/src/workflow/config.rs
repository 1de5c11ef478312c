use crate::generator::ScenarioConfig;
use anyhow::Context;
use fusioncore::{ClassifierHistory, FusionConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub fusion: FusionConfig,
    pub runtime: RuntimeConfig,
    pub scenario: ScenarioConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Period of the housekeeping sweep and trigger flush.
    pub sweep_interval_ms: u64,
    /// UDP endpoint of the recording subsystem.
    pub trigger_addr: String,
    /// Listen address of the HTTP bridge.
    pub bind: String,
    pub channel_capacity: usize,
    /// Classifier history loaded at startup.
    pub history_csv: Option<PathBuf>,
    /// Where the history is written on shutdown.
    pub history_out: Option<PathBuf>,
    /// Offline summaries are appended here.
    pub report_path: PathBuf,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: 1000,
            trigger_addr: "127.0.0.1:5005".into(),
            bind: "127.0.0.1:9000".into(),
            channel_capacity: 1024,
            history_csv: None,
            history_out: None,
            report_path: PathBuf::from("tools/data/offline_fusion.log"),
        }
    }
}

impl RuntimeConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        Ok(config)
    }

    /// Applies command-line overrides on top of the file (or defaults).
    pub fn with_overrides(
        mut self,
        seed: Option<u64>,
        duration: Option<f64>,
        history: Option<PathBuf>,
    ) -> Self {
        if let Some(seed) = seed {
            self.scenario.seed = seed;
        }
        if let Some(duration) = duration {
            self.scenario.duration = duration;
        }
        if history.is_some() {
            self.runtime.history_csv = history;
        }
        self
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.fusion
            .validate()
            .context("validating fusion configuration")?;
        anyhow::ensure!(
            self.runtime.channel_capacity > 0,
            "runtime.channel_capacity must be positive"
        );
        Ok(())
    }

    /// Loads the configured history table, or an empty one.
    pub fn load_history(&self) -> anyhow::Result<ClassifierHistory> {
        let mut history = ClassifierHistory::new(self.fusion.classifier.axis_bounds.clone());
        if let Some(path) = &self.runtime.history_csv {
            let rows = history
                .load_csv(path)
                .with_context(|| format!("loading classifier history {}", path.display()))?;
            log::info!("loaded {} historical targets from {}", rows, path.display());
        }
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn config_load_reads_partial_yaml() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(
            b"fusion:\n  site_name: PMEC\n  current_threshold: 0.3\nruntime:\n  sweep_interval_ms: 250\nscenario:\n  seed: 7\n",
        )
        .unwrap();
        let path = temp.into_temp_path();
        let cfg = WorkflowConfig::load(&path).unwrap();
        assert_eq!(cfg.fusion.site_name, "PMEC");
        assert_eq!(cfg.fusion.current_threshold, 0.3);
        assert_eq!(cfg.fusion.instruments.len(), 4);
        assert_eq!(cfg.runtime.sweep_interval(), Duration::from_millis(250));
        assert_eq!(cfg.scenario.seed, 7);
        cfg.validate().unwrap();
    }

    #[test]
    fn infinite_hyperspace_bounds_parse() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(
            b"fusion:\n  classifier:\n    hyperspaces:\n      - classification: Outliers\n        size: [-.inf, .inf]\n",
        )
        .unwrap();
        let path = temp.into_temp_path();
        let cfg = WorkflowConfig::load(&path).unwrap();
        let rule = &cfg.fusion.classifier.hyperspaces[0];
        let size = rule.ranges.size.unwrap();
        assert!(size.0.is_infinite() && size.1.is_infinite());
    }

    #[test]
    fn invalid_fusion_config_is_reported() {
        let mut cfg = WorkflowConfig::default();
        cfg.fusion.site_name.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn overrides_replace_scenario_and_history() {
        let cfg = WorkflowConfig::default().with_overrides(
            Some(99),
            Some(60.0),
            Some(PathBuf::from("history.csv")),
        );
        assert_eq!(cfg.scenario.seed, 99);
        assert_eq!(cfg.scenario.duration, 60.0);
        assert_eq!(cfg.runtime.history_csv, Some(PathBuf::from("history.csv")));
    }

    #[test]
    fn missing_history_file_fails_with_context() {
        let cfg = WorkflowConfig::default()
            .with_overrides(None, None, Some(PathBuf::from("/nonexistent/history.csv")));
        let err = cfg.load_history().unwrap_err();
        assert!(format!("{err:#}").contains("loading classifier history"));
    }
}
