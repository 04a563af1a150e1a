//! Per-run configuration loaded from TOML
//!
//! Every section is optional; missing keys take their defaults.
//!
//! ```toml
//! [correlation]
//! consumer_threads = ["InputDispatcher", "InputReader"]
//! window_ms = 50.0
//! max_latency_ms = 30.0
//!
//! [segmentation]
//! tap_slop_px = 24.0
//! swipe_velocity_px_per_s = 4000.0
//!
//! [aggregation]
//! truncation_tolerance_ms = 100.0
//! [aggregation.filters]
//! polls = "syscall=poll"
//! input_wakeups = "wakeup=InputDispatcher,InputReader"
//!
//! [comparison]
//! significance_level = 0.05
//! min_effect_size = 0.5
//!
//! [[metric]]
//! name = "frames_per_sec"
//! direction = "higher_is_better"
//! label = "Frames per second"
//! ```

use crate::aggregate::AggregationConfig;
use crate::compare::ComparisonConfig;
use crate::correlate::CorrelationConfig;
use crate::gesture::SegmenterConfig;
use crate::metric::{MetricCatalogue, MetricDefinition};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid [{section}] config: {message}")]
    Invalid {
        section: &'static str,
        message: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub correlation: CorrelationConfig,
    pub segmentation: SegmenterConfig,
    pub aggregation: AggregationConfig,
    pub comparison: ComparisonConfig,
    /// Extra or overriding metric definitions
    #[serde(rename = "metric")]
    pub metrics: Vec<MetricDefinition>,
}

fn invalid(section: &'static str) -> impl Fn(String) -> ConfigError {
    move |message| ConfigError::Invalid { section, message }
}

impl RunConfig {
    /// Load and validate a config file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), "loaded run config");
        Ok(config)
    }

    /// Parse and validate TOML content
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.correlation
            .validate()
            .map_err(invalid("correlation"))?;
        self.segmentation
            .validate()
            .map_err(invalid("segmentation"))?;
        self.aggregation
            .validate()
            .map_err(invalid("aggregation"))?;
        self.comparison.validate().map_err(invalid("comparison"))?;

        for metric in &self.metrics {
            if metric.name.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    section: "metric",
                    message: "metric name must not be empty".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Built-in catalogue with `[[metric]]` entries added or overriding
    pub fn catalogue(&self) -> MetricCatalogue {
        let mut catalogue = MetricCatalogue::builtin();
        for metric in &self.metrics {
            catalogue.insert(metric.clone());
        }
        catalogue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::Direction;
    use std::io::Write;

    #[test]
    fn test_empty_config_is_default() {
        let config = RunConfig::from_toml_str("").unwrap();
        assert_eq!(config, RunConfig::default());
        assert_eq!(config.correlation.window_ms, 50.0);
        assert_eq!(
            config.correlation.consumer_threads,
            vec!["InputDispatcher", "InputReader"]
        );
        assert_eq!(config.aggregation.truncation_tolerance_ms, 100.0);
    }

    #[test]
    fn test_full_config() {
        let toml = r#"
[correlation]
consumer_threads = ["InputDispatcher"]
window_ms = 20.0
max_latency_ms = 15.0

[segmentation]
tap_slop_px = 30.0

[aggregation.filters]
polls = "syscall=poll"

[comparison]
significance_level = 0.01

[[metric]]
name = "frames_per_sec"
direction = "higher_is_better"
label = "Frames per second"

[[metric]]
name = "total_cpu"
direction = "lower_is_better"
"#;
        let config = RunConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.correlation.consumer_threads, vec!["InputDispatcher"]);
        assert_eq!(config.correlation.effective_max_latency_ms(), 15.0);
        assert_eq!(config.segmentation.tap_slop_px, 30.0);
        assert_eq!(config.segmentation.swipe_velocity_px_per_s, 4000.0);
        assert_eq!(config.aggregation.filters["polls"], "syscall=poll");
        assert_eq!(config.comparison.significance_level, 0.01);
        assert_eq!(config.comparison.min_effect_size, 0.5);

        let catalogue = config.catalogue();
        assert_eq!(
            catalogue.direction("frames_per_sec"),
            Some(Direction::HigherIsBetter)
        );
        assert_eq!(
            catalogue.get("frames_per_sec").map(|m| m.display_label()),
            Some("Frames per second")
        );
        assert_eq!(catalogue.get("total_cpu").map(|m| m.display_label()), Some("total_cpu"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = RunConfig::from_toml_str("[correlation]\nwindow_ms = -1.0\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                section: "correlation",
                ..
            }
        ));

        let err = RunConfig::from_toml_str("[aggregation.filters]\nx = \"bogus\"\n").unwrap_err();
        assert!(err.to_string().contains("aggregation"));
    }

    #[test]
    fn test_unknown_direction_is_parse_error() {
        let toml = "[[metric]]\nname = \"x\"\ndirection = \"sideways\"\n";
        assert!(matches!(
            RunConfig::from_toml_str(toml),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[correlation]\nwindow_ms = 25.0").unwrap();
        let config = RunConfig::from_file(file.path()).unwrap();
        assert_eq!(config.correlation.window_ms, 25.0);

        assert!(matches!(
            RunConfig::from_file("/nonexistent/esmscope.toml"),
            Err(ConfigError::Io { .. })
        ));
    }
}
