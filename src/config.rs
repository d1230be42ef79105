//! # Engine configuration
//!
//! [`EngineConfig`] gathers the tunable values of the synthesis engine that are not part of an
//! observation: the session-length warning ceiling, the calibrator tie epsilon, the length and
//! geometry of the calibration scans, and whether the rendered script starts with a header.
//!
//! It can be built in code with the validating [`EngineConfigBuilder`] or read from TOML, where
//! every key is optional and missing keys keep their default:
//!
//! ```toml
//! session_ceiling_s = 28800.0
//! tie_epsilon_deg = 1e-9
//! flux_cal_scan_s = 95.0
//! pol_cal_scan_s = 95.0
//! flux_cal_offset_deg = 1.0
//! header_comments = true
//! ```
//!
//! ```rust
//! use pulsar_sb::config::EngineConfig;
//!
//! let config = EngineConfig::builder()
//!     .session_ceiling_s(4.0 * 3600.0)
//!     .flux_cal_scan_s(120.0)
//!     .build()
//!     .unwrap();
//! assert_eq!(config.flux_cal_duration().to_seconds(), 120.0);
//! ```
use std::fmt;
use std::path::Path;

use hifitime::Duration;
use serde::{Deserialize, Serialize};

use crate::calibrators::DEFAULT_TIE_EPSILON;
use crate::constants::Degree;
use crate::sb_errors::ConfigError;

/// Tunable values of the synthesis engine.
///
/// Defaults
/// --------
/// * `session_ceiling_s`: 28800 s (8 h)
/// * `tie_epsilon_deg`: 1e-9°
/// * `flux_cal_scan_s`: 95 s (per on/off phase)
/// * `pol_cal_scan_s`: 95 s
/// * `flux_cal_offset_deg`: 1°
/// * `header_comments`: `true`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Total session time above which the resolver emits a warning, seconds.
    pub session_ceiling_s: f64,
    /// Separation difference below which two calibrators are equidistant, degrees.
    pub tie_epsilon_deg: Degree,
    /// Length of each phase of a flux calibration on/off scan, seconds.
    pub flux_cal_scan_s: f64,
    /// Length of the polarization calibration scan, seconds.
    pub pol_cal_scan_s: f64,
    /// Offset of the off-source position of a flux calibration scan, degrees.
    pub flux_cal_offset_deg: Degree,
    /// Start the script with descriptive comments.
    pub header_comments: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            session_ceiling_s: 8.0 * 3600.0,
            tie_epsilon_deg: DEFAULT_TIE_EPSILON,
            flux_cal_scan_s: 95.0,
            pol_cal_scan_s: 95.0,
            flux_cal_offset_deg: 1.0,
            header_comments: true,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::new()
    }

    /// Parse and validate a TOML configuration.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig =
            toml::from_str(text).map_err(|err| ConfigError::Toml(err.to_string()))?;
        EngineConfigBuilder { config }.build()
    }

    /// Read, parse and validate a TOML configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| ConfigError::Io {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;
        EngineConfig::from_toml_str(&text)
    }

    pub fn session_ceiling(&self) -> Duration {
        Duration::from_seconds(self.session_ceiling_s)
    }

    pub fn flux_cal_duration(&self) -> Duration {
        Duration::from_seconds(self.flux_cal_scan_s)
    }

    pub fn pol_cal_duration(&self) -> Duration {
        Duration::from_seconds(self.pol_cal_scan_s)
    }
}

impl fmt::Display for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "EngineConfig")?;
        writeln!(f, "  session_ceiling_s   = {}", self.session_ceiling_s)?;
        writeln!(f, "  tie_epsilon_deg     = {:e}", self.tie_epsilon_deg)?;
        writeln!(f, "  flux_cal_scan_s     = {}", self.flux_cal_scan_s)?;
        writeln!(f, "  pol_cal_scan_s      = {}", self.pol_cal_scan_s)?;
        writeln!(f, "  flux_cal_offset_deg = {}", self.flux_cal_offset_deg)?;
        write!(f, "  header_comments     = {}", self.header_comments)
    }
}

/// Builder for [`EngineConfig`], with validation.
#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_ceiling_s(mut self, v: f64) -> Self {
        self.config.session_ceiling_s = v;
        self
    }

    pub fn tie_epsilon_deg(mut self, v: Degree) -> Self {
        self.config.tie_epsilon_deg = v;
        self
    }

    pub fn flux_cal_scan_s(mut self, v: f64) -> Self {
        self.config.flux_cal_scan_s = v;
        self
    }

    pub fn pol_cal_scan_s(mut self, v: f64) -> Self {
        self.config.pol_cal_scan_s = v;
        self
    }

    pub fn flux_cal_offset_deg(mut self, v: Degree) -> Self {
        self.config.flux_cal_offset_deg = v;
        self
    }

    pub fn header_comments(mut self, v: bool) -> Self {
        self.config.header_comments = v;
        self
    }

    #[inline]
    fn gt0(x: f64) -> bool {
        x.is_finite() && x > 0.0
    }

    #[inline]
    fn ge0(x: f64) -> bool {
        x.is_finite() && x >= 0.0
    }

    /// Validate and produce the configuration.
    ///
    /// Validation rules
    /// ----------------
    /// * `session_ceiling_s > 0`, `flux_cal_scan_s > 0`, `pol_cal_scan_s > 0`
    /// * `tie_epsilon_deg >= 0`
    /// * `0 < flux_cal_offset_deg <= 10`
    pub fn build(self) -> Result<EngineConfig, ConfigError> {
        let c = &self.config;

        if !Self::gt0(c.session_ceiling_s) {
            return Err(ConfigError::Invalid {
                field: "session_ceiling_s",
                reason: format!("must be > 0, got {}", c.session_ceiling_s),
            });
        }
        if !Self::ge0(c.tie_epsilon_deg) {
            return Err(ConfigError::Invalid {
                field: "tie_epsilon_deg",
                reason: format!("must be >= 0, got {}", c.tie_epsilon_deg),
            });
        }
        if !Self::gt0(c.flux_cal_scan_s) {
            return Err(ConfigError::Invalid {
                field: "flux_cal_scan_s",
                reason: format!("must be > 0, got {}", c.flux_cal_scan_s),
            });
        }
        if !Self::gt0(c.pol_cal_scan_s) {
            return Err(ConfigError::Invalid {
                field: "pol_cal_scan_s",
                reason: format!("must be > 0, got {}", c.pol_cal_scan_s),
            });
        }
        if !(Self::gt0(c.flux_cal_offset_deg) && c.flux_cal_offset_deg <= 10.0) {
            return Err(ConfigError::Invalid {
                field: "flux_cal_offset_deg",
                reason: format!("must be in (0, 10], got {}", c.flux_cal_offset_deg),
            });
        }

        Ok(self.config)
    }
}

#[cfg(test)]
mod config_test {
    use super::*;

    #[test]
    fn test_defaults_build() {
        let config = EngineConfig::builder().build().unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.session_ceiling().to_seconds(), 28800.0);
        assert_eq!(config.pol_cal_duration().to_seconds(), 95.0);
    }

    #[test]
    fn test_from_toml_partial() {
        let config = EngineConfig::from_toml_str(
            "flux_cal_scan_s = 120.0\nheader_comments = false\n",
        )
        .unwrap();
        assert_eq!(config.flux_cal_scan_s, 120.0);
        assert!(!config.header_comments);
        assert_eq!(config.pol_cal_scan_s, 95.0);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            EngineConfig::from_toml_str("session_ceiling_s = -1.0"),
            Err(ConfigError::Invalid {
                field: "session_ceiling_s",
                ..
            })
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("unknown_key = 1"),
            Err(ConfigError::Toml(_))
        ));
        assert!(matches!(
            EngineConfig::builder().flux_cal_offset_deg(45.0).build(),
            Err(ConfigError::Invalid {
                field: "flux_cal_offset_deg",
                ..
            })
        ));
        assert!(matches!(
            EngineConfig::from_path("/nonexistent/pulsar-sb.toml"),
            Err(ConfigError::Io { .. })
        ));
    }
}
