//! # VEGAS pulsar-mode backend parameters
//!
//! One [`BackendParameters`] set exists per distinct `(band, mode)` pair of an observation.
//! [`defaults_for`] computes the recommended set from the band table entry and the observing
//! mode; operators may then override any value by name.
//!
//! ## Default table
//!
//! | Bandwidth per window | coherent `numchan` | incoherent `numchan` |
//! |----------------------|--------------------|----------------------|
//! | ≤ 100 MHz            | 128                | 4096                 |
//! | ≤ 200 MHz            | 128                | 2048                 |
//! | ≤ 800 MHz            | 512                | 2048                 |
//! | > 800 MHz            | 512                | 1024                 |
//!
//! The sampling time is `tint = acclen · numchan / bandwidth`, where the accumulation length
//! `acclen` is a power of two (1…64 coherent, 4…1024 incoherent) chosen so that `tint` is
//! closest to 10.24 µs in Fold mode and 40.96 µs in Search mode; ties go to the shorter
//! accumulation. The remaining defaults are `outbits = 8`, `polnmode = FULL_STOKES`,
//! `fold_bins = 2048`, `fold_dumptime = 10 s`, and `scale = 1` for coherent modes or
//! `max(1, numchan / 256)` for incoherent ones. Centre frequencies come from the band.
use std::fmt;
use std::str::FromStr;

use itertools::Itertools;

use crate::bands::{Band, BandMode, Mode, ObsMode};
use crate::constants::MHz;
use crate::sb_errors::{ConstraintError, ModelError};

/// Target sampling time in Fold mode, seconds.
pub const FOLD_TARGET_TINT: f64 = 10.24e-6;
/// Target sampling time in Search mode, seconds.
pub const SEARCH_TARGET_TINT: f64 = 40.96e-6;

pub const DEFAULT_OUTBITS: u32 = 8;
pub const DEFAULT_FOLD_BINS: u32 = 2048;
/// Seconds between folded sub-integrations.
pub const DEFAULT_FOLD_DUMPTIME: f64 = 10.0;

/// Names accepted by [`BackendParameters::set`].
pub const PARAMETER_NAMES: [&str; 8] = [
    "numchan",
    "outbits",
    "scale",
    "polnmode",
    "tint",
    "fold_bins",
    "fold_dumptime",
    "center_freqs",
];

/// Recorded polarization products.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolnMode {
    FullStokes,
    TotalIntensity,
}

impl PolnMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolnMode::FullStokes => "FULL_STOKES",
            PolnMode::TotalIntensity => "TOTAL_INTENSITY",
        }
    }

    /// Number of recorded polarization products.
    pub fn npol(&self) -> u32 {
        match self {
            PolnMode::FullStokes => 4,
            PolnMode::TotalIntensity => 2,
        }
    }
}

impl fmt::Display for PolnMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolnMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace(' ', "_").as_str() {
            "FULL_STOKES" => Ok(PolnMode::FullStokes),
            "TOTAL_INTENSITY" => Ok(PolnMode::TotalIntensity),
            _ => Err("expected FULL_STOKES or TOTAL_INTENSITY".into()),
        }
    }
}

/// VEGAS pulsar-mode settings of one `(band, mode)` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendParameters {
    /// Channels per spectral window.
    pub numchan: u32,
    pub outbits: u32,
    pub scale: f64,
    pub polnmode: PolnMode,
    /// Sampling time, seconds.
    pub tint: f64,
    pub fold_bins: u32,
    /// Seconds.
    pub fold_dumptime: f64,
    /// One centre frequency per spectral window, MHz.
    pub center_freqs: Vec<MHz>,
}

fn bad_value(parameter: &str, value: &str, reason: impl Into<String>) -> ModelError {
    ModelError::InvalidParameterValue {
        parameter: parameter.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn parse_positive_u32(parameter: &str, value: &str) -> Result<u32, ModelError> {
    match value.trim().parse::<u32>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(bad_value(parameter, value, "expected a positive integer")),
    }
}

fn parse_positive_f64(parameter: &str, value: &str) -> Result<f64, ModelError> {
    match value.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => Ok(v),
        _ => Err(bad_value(parameter, value, "expected a positive number")),
    }
}

impl BackendParameters {
    /// Override one parameter from its textual value.
    ///
    /// The value is fully parsed before anything is assigned, so on error the set is unchanged.
    /// Checks that depend on the band or mode are left to the resolver.
    ///
    /// Arguments
    /// ---------
    /// * `name`: one of [`PARAMETER_NAMES`]
    /// * `value`: the new value; `center_freqs` takes a comma-separated list in MHz and `tint`
    ///   is in seconds
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), ModelError> {
        match name {
            "numchan" => self.numchan = parse_positive_u32(name, value)?,
            "outbits" => self.outbits = parse_positive_u32(name, value)?,
            "scale" => self.scale = parse_positive_f64(name, value)?,
            "polnmode" => {
                self.polnmode = value
                    .parse()
                    .map_err(|reason: String| bad_value(name, value, reason))?
            }
            "tint" => self.tint = parse_positive_f64(name, value)?,
            "fold_bins" => self.fold_bins = parse_positive_u32(name, value)?,
            "fold_dumptime" => self.fold_dumptime = parse_positive_f64(name, value)?,
            "center_freqs" => {
                let freqs = value
                    .split(',')
                    .map(|f| parse_positive_f64(name, f))
                    .collect::<Result<Vec<_>, _>>()?;
                self.center_freqs = freqs;
            }
            _ => return Err(ModelError::UnknownParameter(name.to_string())),
        }
        Ok(())
    }

    /// Textual value of a parameter, in the format [`set`](Self::set) accepts.
    pub fn get(&self, name: &str) -> Option<String> {
        let value = match name {
            "numchan" => self.numchan.to_string(),
            "outbits" => self.outbits.to_string(),
            "scale" => self.scale.to_string(),
            "polnmode" => self.polnmode.to_string(),
            "tint" => self.tint.to_string(),
            "fold_bins" => self.fold_bins.to_string(),
            "fold_dumptime" => self.fold_dumptime.to_string(),
            "center_freqs" => self.center_freqs.iter().join(","),
            _ => return None,
        };
        Some(value)
    }

    /// Output data rate of one bank, MB/s.
    pub fn data_rate_mb_per_s(&self) -> f64 {
        data_rate_mb_per_s(self.numchan, self.tint, self.polnmode)
    }

    /// Check the set against the band and mode of its pair.
    ///
    /// Return
    /// ------
    /// * The first [`ConstraintError::InvalidBackendParameter`] found, if any
    pub fn validate(&self, pair: &BandMode, band: &Band) -> Result<(), ConstraintError> {
        let invalid = |parameter: &'static str, value: String, reason: String| {
            Err(ConstraintError::InvalidBackendParameter {
                pair: pair.to_string(),
                parameter,
                value,
                reason,
            })
        };
        let coherent = pair.mode.coherent;
        let bandwidth = band.bandwidth_mhz();

        let numchans = valid_numchan_values(coherent);
        if !numchans.contains(&self.numchan) {
            return invalid(
                "numchan",
                self.numchan.to_string(),
                format!("expected one of {}", numchans.iter().join(", ")),
            );
        }
        if self.outbits != 4 && self.outbits != 8 {
            return invalid("outbits", self.outbits.to_string(), "expected 4 or 8".into());
        }
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return invalid("scale", self.scale.to_string(), "must be > 0".into());
        }
        if !(self.tint.is_finite() && self.tint > 0.0) {
            return invalid("tint", self.tint.to_string(), "must be > 0 s".into());
        }
        let acclen = self.tint * bandwidth * 1e6 / f64::from(self.numchan);
        let acclens = valid_acclen_values(coherent);
        let matches_acclen = acclens
            .iter()
            .any(|&valid| (acclen - f64::from(valid)).abs() <= 1e-6 * f64::from(valid));
        if !matches_acclen {
            return invalid(
                "tint",
                self.tint.to_string(),
                format!(
                    "accumulation length {acclen:.3} at {} channels is not one of {}",
                    self.numchan,
                    acclens.iter().join(", ")
                ),
            );
        }
        if self.polnmode == PolnMode::TotalIntensity
            && (coherent || pair.mode.obs_mode != ObsMode::Search)
        {
            return invalid(
                "polnmode",
                self.polnmode.to_string(),
                "TOTAL_INTENSITY is only available in incoherent search mode".into(),
            );
        }
        if pair.mode.is_fold() {
            if self.fold_bins == 0 {
                return invalid("fold_bins", "0".into(), "must be > 0".into());
            }
            if !(self.fold_dumptime.is_finite() && self.fold_dumptime > 0.0) {
                return invalid(
                    "fold_dumptime",
                    self.fold_dumptime.to_string(),
                    "must be > 0 s".into(),
                );
            }
        }
        if self.center_freqs.len() != band.window_count() {
            return invalid(
                "center_freqs",
                self.center_freqs.iter().join(","),
                format!("{} has {} spectral window(s)", band.label(), band.window_count()),
            );
        }
        if let Some(bad) = self.center_freqs.iter().find(|f| !(f.is_finite() && **f > 0.0)) {
            return invalid("center_freqs", bad.to_string(), "must be > 0 MHz".into());
        }
        Ok(())
    }
}

/// Channel counts VEGAS accepts in the given dedispersion mode.
pub fn valid_numchan_values(coherent: bool) -> Vec<u32> {
    let (min_exp, max_exp) = if coherent { (5, 12) } else { (6, 13) };
    (min_exp..=max_exp).map(|exp| 1u32 << exp).collect()
}

/// Accumulation lengths VEGAS accepts in the given dedispersion mode.
pub fn valid_acclen_values(coherent: bool) -> Vec<u32> {
    let (min_exp, max_exp) = if coherent { (0, 6) } else { (2, 10) };
    (min_exp..=max_exp).map(|exp| 1u32 << exp).collect()
}

/// Sampling time in seconds for an accumulation length and channel count.
pub fn compute_tint(acclen: u32, numchan: u32, bandwidth_mhz: MHz) -> f64 {
    f64::from(acclen) * f64::from(numchan) / (bandwidth_mhz * 1e6)
}

/// Accumulation length implied by a sampling time, rounded to the nearest integer.
pub fn accumulation_length(tint: f64, numchan: u32, bandwidth_mhz: MHz) -> u32 {
    (tint * bandwidth_mhz * 1e6 / f64::from(numchan)).round() as u32
}

/// Requantization scale keeping 8-bit output in range.
pub fn recommended_scale(numchan: u32, coherent: bool) -> f64 {
    if coherent {
        1.0
    } else {
        f64::from((numchan / 256).max(1))
    }
}

/// Output data rate in MB/s (one byte per sample and polarization product).
pub fn data_rate_mb_per_s(numchan: u32, tint: f64, polnmode: PolnMode) -> f64 {
    f64::from(polnmode.npol()) * f64::from(numchan) / tint / 1e6
}

/// Default channel count per spectral window.
pub fn default_numchan(bandwidth_mhz: MHz, coherent: bool) -> u32 {
    match (bandwidth_mhz, coherent) {
        (bw, true) if bw <= 200.0 => 128,
        (_, true) => 512,
        (bw, false) if bw <= 100.0 => 4096,
        (bw, false) if bw <= 800.0 => 2048,
        (_, false) => 1024,
    }
}

/// Recommended backend parameters for a band and observing mode.
///
/// Total over every band of a band table and every [`Mode`].
pub fn defaults_for(band: &Band, mode: Mode) -> BackendParameters {
    let bandwidth = band.bandwidth_mhz();
    let numchan = default_numchan(bandwidth, mode.coherent);
    let target = match mode.obs_mode {
        ObsMode::Fold => FOLD_TARGET_TINT,
        ObsMode::Search => SEARCH_TARGET_TINT,
    };

    let acclens = valid_acclen_values(mode.coherent);
    let mut best = acclens[0];
    for &acclen in &acclens[1..] {
        let diff = (compute_tint(acclen, numchan, bandwidth) - target).abs();
        let best_diff = (compute_tint(best, numchan, bandwidth) - target).abs();
        if diff < best_diff {
            best = acclen;
        }
    }

    BackendParameters {
        numchan,
        outbits: DEFAULT_OUTBITS,
        scale: recommended_scale(numchan, mode.coherent),
        polnmode: PolnMode::FullStokes,
        tint: compute_tint(best, numchan, bandwidth),
        fold_bins: DEFAULT_FOLD_BINS,
        fold_dumptime: DEFAULT_FOLD_DUMPTIME,
        center_freqs: band.center_freqs_mhz().to_vec(),
    }
}

#[cfg(test)]
mod backend_params_test {
    use super::*;
    use crate::bands::BandTable;
    use approx::assert_relative_eq;

    fn pair(band: &str, obs_mode: ObsMode, coherent: bool) -> BandMode {
        BandMode::new(band, Mode::new(obs_mode, coherent))
    }

    #[test]
    fn test_defaults_l_band() {
        let table = BandTable::gbt().unwrap();
        let lband = table.get("L-band").unwrap();

        let p = defaults_for(lband, Mode::new(ObsMode::Fold, true));
        assert_eq!(p.numchan, 512);
        assert_relative_eq!(p.tint, 10.24e-6, epsilon = 1e-12);
        assert_eq!(p.scale, 1.0);
        assert_eq!(p.center_freqs, vec![1500.0]);
        assert_eq!(accumulation_length(p.tint, p.numchan, 800.0), 16);

        let p = defaults_for(lband, Mode::new(ObsMode::Search, false));
        assert_eq!(p.numchan, 2048);
        assert_eq!(p.scale, 8.0);
        assert_relative_eq!(p.tint, 40.96e-6, epsilon = 1e-12);
        assert_eq!(p.polnmode, PolnMode::FullStokes);
    }

    #[test]
    fn test_defaults_are_total_and_valid() {
        let table = BandTable::gbt().unwrap();
        for pair in table.pairs() {
            let band = table.get(&pair.band).unwrap();
            let params = defaults_for(band, pair.mode);
            assert_eq!(params.validate(&pair, band), Ok(()), "{pair}");
        }
    }

    #[test]
    fn test_default_numchan_table() {
        assert_eq!(default_numchan(100.0, true), 128);
        assert_eq!(default_numchan(100.0, false), 4096);
        assert_eq!(default_numchan(200.0, false), 2048);
        assert_eq!(default_numchan(800.0, true), 512);
        assert_eq!(default_numchan(1500.0, false), 1024);
    }

    #[test]
    fn test_set_by_name() {
        let table = BandTable::gbt().unwrap();
        let mut p = defaults_for(table.get("UWBR").unwrap(), Mode::new(ObsMode::Fold, false));
        p.set("fold_bins", "1024").unwrap();
        assert_eq!(p.fold_bins, 1024);
        p.set("center_freqs", "1200, 2300,3400").unwrap();
        assert_eq!(p.center_freqs, vec![1200.0, 2300.0, 3400.0]);
        p.set("polnmode", "total intensity").unwrap();
        assert_eq!(p.polnmode, PolnMode::TotalIntensity);
        assert_eq!(p.get("polnmode").unwrap(), "TOTAL_INTENSITY");

        let before = p.clone();
        assert!(matches!(
            p.set("numchan", "-3"),
            Err(ModelError::InvalidParameterValue { .. })
        ));
        assert!(matches!(
            p.set("center_freqs", "1200,abc"),
            Err(ModelError::InvalidParameterValue { .. })
        ));
        assert_eq!(
            p.set("nbins", "8"),
            Err(ModelError::UnknownParameter("nbins".into()))
        );
        assert_eq!(p, before);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let table = BandTable::gbt().unwrap();
        let lband = table.get("L-band").unwrap();
        let coherent_fold = pair("L-band", ObsMode::Fold, true);
        let defaults = defaults_for(lband, coherent_fold.mode);

        let mut p = defaults.clone();
        p.numchan = 8192;
        let err = p.validate(&coherent_fold, lband).unwrap_err();
        assert!(matches!(
            err,
            ConstraintError::InvalidBackendParameter { parameter: "numchan", .. }
        ));

        let mut p = defaults.clone();
        p.polnmode = PolnMode::TotalIntensity;
        assert!(matches!(
            p.validate(&coherent_fold, lband),
            Err(ConstraintError::InvalidBackendParameter { parameter: "polnmode", .. })
        ));

        let mut p = defaults.clone();
        p.tint = 11e-6;
        assert!(matches!(
            p.validate(&coherent_fold, lband),
            Err(ConstraintError::InvalidBackendParameter { parameter: "tint", .. })
        ));

        let mut p = defaults;
        p.center_freqs = vec![1400.0, 1600.0];
        assert!(matches!(
            p.validate(&coherent_fold, lband),
            Err(ConstraintError::InvalidBackendParameter { parameter: "center_freqs", .. })
        ));

        let search = pair("L-band", ObsMode::Search, false);
        let mut p = defaults_for(lband, search.mode);
        p.polnmode = PolnMode::TotalIntensity;
        assert_eq!(p.validate(&search, lband), Ok(()));
    }

    #[test]
    fn test_data_rate() {
        assert_relative_eq!(
            data_rate_mb_per_s(512, 10.24e-6, PolnMode::FullStokes),
            200.0,
            epsilon = 1e-9
        );
        assert_relative_eq!(
            data_rate_mb_per_s(512, 10.24e-6, PolnMode::TotalIntensity),
            100.0,
            epsilon = 1e-9
        );
        assert_eq!(valid_acclen_values(true), vec![1, 2, 4, 8, 16, 32, 64]);
        assert_eq!(valid_acclen_values(false).len(), 9);
        assert_relative_eq!(compute_tint(16, 512, 800.0), 10.24e-6, epsilon = 1e-15);
    }
}
