//! Configuration for submitting and polling analysis jobs.
//!
//! All job-lifecycle behaviour is controlled through [`AnalysisConfig`],
//! built via its [`AnalysisConfigBuilder`]. One struct is passed explicitly
//! to the submitter and the poller instead of living in module-level state,
//! so two trackers in the same process can run with different settings.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Configuration for an analysis run.
///
/// # Example
/// ```rust
/// use docoverlay::AnalysisConfig;
/// use std::time::Duration;
///
/// let config = AnalysisConfig::builder()
///     .poll_interval(Duration::from_secs(5))
///     .max_poll_duration(Duration::from_secs(300))
///     .build()
///     .unwrap();
/// assert_eq!(config.max_fetch_retries, 3);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Delay between the end of one poll tick and the start of the next. Default: 3 s.
    ///
    /// The delay is measured from the *end* of a tick, so a slow pagination
    /// loop never overlaps with the following tick.
    pub poll_interval: Duration,

    /// Ceiling on total polling time per job. Default: 10 min.
    ///
    /// A job still in progress past this point ends with
    /// [`crate::error::PollError::Timeout`].
    pub max_poll_duration: Duration,

    /// Consecutive failed ticks tolerated before giving up. Default: 3.
    ///
    /// A successful tick resets the count.
    pub max_fetch_retries: u32,

    /// Timeout applied to each individual fetch call. Default: 30 s.
    pub fetch_timeout: Duration,

    /// Upper bound on pagination steps within one tick. Default: 1000.
    pub max_pages_per_tick: usize,

    /// Analysis features requested when a job is started. Default: tables + forms.
    pub feature_types: Vec<FeatureType>,

    /// Prefix for object keys of stored artifacts. Default: `uploads/`.
    pub key_prefix: String,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            max_poll_duration: Duration::from_secs(600),
            max_fetch_retries: 3,
            fetch_timeout: Duration::from_secs(30),
            max_pages_per_tick: 1000,
            feature_types: vec![FeatureType::Tables, FeatureType::Forms],
            key_prefix: "uploads/".to_string(),
            download_timeout_secs: 120,
        }
    }
}

impl AnalysisConfig {
    /// Create a new builder for `AnalysisConfig`.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`AnalysisConfig`].
#[derive(Debug)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval.max(Duration::from_millis(10));
        self
    }

    pub fn max_poll_duration(mut self, ceiling: Duration) -> Self {
        self.config.max_poll_duration = ceiling;
        self
    }

    pub fn max_fetch_retries(mut self, n: u32) -> Self {
        self.config.max_fetch_retries = n;
        self
    }

    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.config.fetch_timeout = timeout;
        self
    }

    pub fn max_pages_per_tick(mut self, n: usize) -> Self {
        self.config.max_pages_per_tick = n.max(1);
        self
    }

    pub fn feature_types(mut self, features: impl IntoIterator<Item = FeatureType>) -> Self {
        let mut features: Vec<FeatureType> = features.into_iter().collect();
        features.sort_unstable();
        features.dedup();
        self.config.feature_types = features;
        self
    }

    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.key_prefix = prefix.into();
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalysisConfig, ConfigError> {
        let c = &self.config;
        if c.feature_types.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one analysis feature type is required".into(),
            ));
        }
        if c.max_poll_duration < c.poll_interval {
            return Err(ConfigError::Invalid(format!(
                "max poll duration ({:?}) is shorter than the poll interval ({:?})",
                c.max_poll_duration, c.poll_interval
            )));
        }
        if c.fetch_timeout.is_zero() {
            return Err(ConfigError::Invalid("fetch timeout must be > 0".into()));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Analysis features that can be requested from the remote service.
///
/// Text detection (LINE / WORD elements) is always part of the output;
/// these select the additional structure the service extracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeatureType {
    Tables,
    Forms,
    Queries,
    Signatures,
    Layout,
}

impl FeatureType {
    /// Wire name used by the remote service.
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureType::Tables => "TABLES",
            FeatureType::Forms => "FORMS",
            FeatureType::Queries => "QUERIES",
            FeatureType::Signatures => "SIGNATURES",
            FeatureType::Layout => "LAYOUT",
        }
    }

    /// Parse a feature name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TABLES" => Some(FeatureType::Tables),
            "FORMS" => Some(FeatureType::Forms),
            "QUERIES" => Some(FeatureType::Queries),
            "SIGNATURES" => Some(FeatureType::Signatures),
            "LAYOUT" => Some(FeatureType::Layout),
            _ => None,
        }
    }
}

impl fmt::Display for FeatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = AnalysisConfig::default();
        assert_eq!(c.poll_interval, Duration::from_secs(3));
        assert_eq!(c.max_fetch_retries, 3);
        assert_eq!(c.feature_types, vec![FeatureType::Tables, FeatureType::Forms]);
        assert_eq!(c.key_prefix, "uploads/");
    }

    #[test]
    fn empty_feature_set_is_rejected() {
        let err = AnalysisConfig::builder()
            .feature_types(Vec::new())
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("feature"));
    }

    #[test]
    fn ceiling_shorter_than_interval_is_rejected() {
        let result = AnalysisConfig::builder()
            .poll_interval(Duration::from_secs(10))
            .max_poll_duration(Duration::from_secs(5))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn interval_is_clamped() {
        let c = AnalysisConfig::builder()
            .poll_interval(Duration::ZERO)
            .build()
            .unwrap();
        assert_eq!(c.poll_interval, Duration::from_millis(10));
    }

    #[test]
    fn feature_types_are_deduplicated() {
        let c = AnalysisConfig::builder()
            .feature_types([FeatureType::Forms, FeatureType::Tables, FeatureType::Forms])
            .build()
            .unwrap();
        assert_eq!(c.feature_types, vec![FeatureType::Tables, FeatureType::Forms]);
    }

    #[test]
    fn feature_parse_is_case_insensitive() {
        assert_eq!(FeatureType::parse("tables"), Some(FeatureType::Tables));
        assert_eq!(FeatureType::parse(" Layout "), Some(FeatureType::Layout));
        assert_eq!(FeatureType::parse("ocr"), None);
    }
}
