//! Engine configuration: feature weighting, scorer tuning, grading credit and
//! point scale. Every field has a default so partial JSON documents load.
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    ANOMALY_CONTAMINATION, ANOMALY_CONTAMINATION_MAX, ANOMALY_SAMPLE_SIZE, ANOMALY_TREES,
    DEFAULT_HINT_COST, DELAY_REFERENCE_MINUTES, MAX_POINTS, PARTIAL_CREDIT, RISK_FLAG_THRESHOLD,
    RISK_RIDGE, SCORER_DEFAULT_SEED, SCORER_MIN_RECORDS, WAREHOUSE_TRAFFIC_REFERENCE,
    WAREHOUSE_VOLUME_REFERENCE,
};

/// Errors raised when engine configuration invariants are violated.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("configuration is not valid JSON: {0}")]
    Parse(String),
    #[error("{field} must be greater than {min:.3} (got {value:.3})")]
    MinViolation {
        field: &'static str,
        min: f64,
        value: f64,
    },
    #[error("{field} must be between {min:.3} and {max:.3} (got {value:.3})")]
    RangeViolation {
        field: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },
    #[error("{field} must be at least {min} (got {value})")]
    CountTooSmall {
        field: &'static str,
        min: usize,
        value: usize,
    },
}

/// Top-level configuration threaded through mission loading and grading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub scorers: ScorerConfig,
    #[serde(default)]
    pub grading: GradingConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
}

impl EngineConfig {
    /// Parse a configuration document and validate it.
    ///
    /// # Errors
    ///
    /// Returns an error when the JSON is malformed or a value is out of range.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let cfg: Self =
            serde_json::from_str(json).map_err(|err| ConfigError::Parse(err.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check every section's invariants.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.features.validate()?;
        self.scorers.validate()?;
        self.grading.validate()?;
        self.scoring.validate()
    }
}

/// Reference magnitudes used to squash aggregates into [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    #[serde(default = "FeatureConfig::default_delay_reference")]
    pub delay_reference_minutes: f64,
    #[serde(default = "FeatureConfig::default_volume_reference")]
    pub volume_reference: f64,
    #[serde(default = "FeatureConfig::default_traffic_reference")]
    pub traffic_reference: f64,
}

impl FeatureConfig {
    const fn default_delay_reference() -> f64 {
        DELAY_REFERENCE_MINUTES
    }

    const fn default_volume_reference() -> f64 {
        WAREHOUSE_VOLUME_REFERENCE
    }

    const fn default_traffic_reference() -> f64 {
        WAREHOUSE_TRAFFIC_REFERENCE
    }

    fn validate(&self) -> Result<(), ConfigError> {
        positive("features.delay_reference_minutes", self.delay_reference_minutes)?;
        positive("features.volume_reference", self.volume_reference)?;
        positive("features.traffic_reference", self.traffic_reference)
    }
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            delay_reference_minutes: Self::default_delay_reference(),
            volume_reference: Self::default_volume_reference(),
            traffic_reference: Self::default_traffic_reference(),
        }
    }
}

/// Tuning shared by the anomaly and delay-risk scorers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    /// Below this many shipments a scorer reports "no signal".
    pub min_records: usize,
    pub seed: u64,
    /// Fraction of shipments flagged as anomalous.
    pub contamination: f64,
    pub trees: usize,
    pub sample_size: usize,
    pub risk_flag_threshold: f64,
    pub ridge: f64,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            min_records: SCORER_MIN_RECORDS,
            seed: SCORER_DEFAULT_SEED,
            contamination: ANOMALY_CONTAMINATION,
            trees: ANOMALY_TREES,
            sample_size: ANOMALY_SAMPLE_SIZE,
            risk_flag_threshold: RISK_FLAG_THRESHOLD,
            ridge: RISK_RIDGE,
        }
    }
}

impl ScorerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        at_least("scorers.min_records", 2, self.min_records)?;
        at_least("scorers.trees", 1, self.trees)?;
        at_least("scorers.sample_size", 2, self.sample_size)?;
        within(
            "scorers.contamination",
            0.0,
            ANOMALY_CONTAMINATION_MAX,
            self.contamination,
        )?;
        if self.contamination <= 0.0 {
            return Err(ConfigError::MinViolation {
                field: "scorers.contamination",
                min: 0.0,
                value: self.contamination,
            });
        }
        within("scorers.risk_flag_threshold", 0.0, 1.0, self.risk_flag_threshold)?;
        within("scorers.ridge", 0.0, f64::MAX, self.ridge)
    }
}

/// Credit awarded by the grading engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradingConfig {
    /// Accuracy awarded when the category is right but the entity is wrong.
    pub partial_credit: f64,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            partial_credit: PARTIAL_CREDIT,
        }
    }
}

impl GradingConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        within("grading.partial_credit", 0.0, 1.0, self.partial_credit)
    }
}

/// Point scale applied by the scoring engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub max_points: u32,
    /// Cost assigned to hints whose mission spec omits one.
    pub default_hint_cost: u32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            max_points: MAX_POINTS,
            default_hint_cost: DEFAULT_HINT_COST,
        }
    }
}

impl ScoringConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let points = usize::try_from(self.max_points).unwrap_or(usize::MAX);
        at_least("scoring.max_points", 1, points)
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::MinViolation {
            field,
            min: 0.0,
            value,
        })
    }
}

fn within(field: &'static str, min: f64, max: f64, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::RangeViolation {
            field,
            min,
            max,
            value,
        })
    }
}

fn at_least(field: &'static str, min: usize, value: usize) -> Result<(), ConfigError> {
    if value >= min {
        Ok(())
    } else {
        Err(ConfigError::CountTooSmall { field, min, value })
    }
}
