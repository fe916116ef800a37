//! Unified configuration for the reconciliation engine.
//!
//! Configuration is loaded with precedence: overrides > Env vars > Config file > Defaults
//!
//! # Example config file (reconcile.toml)
//! ```toml
//! [matching]
//! precision = 4
//! primary_key = "id"
//!
//! [threshold]
//! low = 0.75
//! high = 0.999999
//! ```

mod defaults;

pub use defaults::*;

use crate::error::{ReconcileError, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Main configuration for the reconciliation engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Ratio rounding and identity field
    pub matching: MatchingConfig,
    /// Update band of the threshold preparer
    pub threshold: ThresholdBand,
}

impl ReconcileConfig {
    /// Load configuration with precedence: overrides > Env > File > Defaults
    ///
    /// # Arguments
    /// * `config_path` - Optional path to TOML config file
    /// * `overrides` - Explicit overrides to apply on top
    pub fn load(config_path: Option<&str>, overrides: ConfigOverrides) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(ReconcileConfig::default()));

        // Layer 1: Config file (if provided)
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Layer 2: Environment variables with RECONCILE_ prefix
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        // Layer 3: explicit overrides
        figment = figment.merge(Serialized::defaults(overrides));

        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment and optional config file only (no overrides)
    pub fn from_env(config_path: Option<&str>) -> Result<Self> {
        Self::load(config_path, ConfigOverrides::default())
    }

    pub fn validate(&self) -> Result<()> {
        let ThresholdBand { low, high } = self.threshold;
        if !(0.0..=1.0).contains(&low) || !(0.0..=1.0).contains(&high) || low > high {
            return Err(ReconcileError::Config(format!(
                "threshold band [{}, {}) must satisfy 0 <= low <= high <= 1",
                low, high
            )));
        }
        if let Some(precision) = self.matching.precision {
            if precision > MAX_RATIO_PRECISION {
                return Err(ReconcileError::Config(format!(
                    "ratio precision {} exceeds the maximum of {} digits",
                    precision, MAX_RATIO_PRECISION
                )));
            }
        }
        if self.matching.primary_key.is_empty() {
            return Err(ReconcileError::Config(
                "primary key field name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Ratio rounding and identity settings shared by matcher and preparers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Decimal digits kept in ratios; `None` keeps full precision
    pub precision: Option<u32>,
    /// Primary-key field name
    pub primary_key: String,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            precision: Some(DEFAULT_RATIO_PRECISION),
            primary_key: DEFAULT_PRIMARY_KEY.to_string(),
        }
    }
}

/// Half-open ratio band `[low, high)` treated as an update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdBand {
    pub low: f64,
    pub high: f64,
}

impl ThresholdBand {
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    pub fn contains(&self, ratio: f64) -> bool {
        self.low <= ratio && ratio < self.high
    }
}

impl Default for ThresholdBand {
    fn default() -> Self {
        Self {
            low: DEFAULT_BAND_LOW,
            high: DEFAULT_BAND_HIGH,
        }
    }
}

/// Overrides that take precedence over file and env config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matching: Option<MatchingOverrides>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<ThresholdOverrides>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high: Option<f64>,
}
