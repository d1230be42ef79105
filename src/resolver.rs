//! # Constraint resolution
//!
//! The [`Resolver`] is the gate between an operator's [`ObservationModel`] and the script
//! synthesizer. [`Resolver::resolve`] runs, in order:
//!
//! 1. **Validation**: every cross-field rule below. The first violated rule is returned as a
//!    [`ConstraintError`] carrying its [`Rule`](crate::sb_errors::Rule) identifier; the model is
//!    not modified.
//! 2. **Calibration planning**: one flux calibration scan per distinct `(band, mode)` pair when
//!    flux calibration is enabled, bound to the pinned calibrator or to the calibrator nearest
//!    the first source of that pair.
//! 3. **Backfill**: pairs without backend parameters receive [`defaults_for`] values. Existing
//!    parameter sets are kept as they are.
//! 4. **Warnings**: non-fatal findings, logged with `log::warn!` and returned.
//!
//! | Rule                        | Check                                                    |
//! |-----------------------------|----------------------------------------------------------|
//! | `at-least-one-source`       | the model has at least one source                        |
//! | `band-mode-compatibility`   | every effective pair is listed in the band table         |
//! | `coherent-dedispersion-dm`  | every source using coherent dedispersion has a DM        |
//! | `fold-ephemeris`            | every overridden Fold-mode source has an ephemeris       |
//! | `positive-scan-length`      | every scan length is > 0                                 |
//! | `backend-parameters`        | stored parameters are valid for their pair               |
//! | `flux-calibrator-known`     | a pinned flux calibrator exists in the catalog           |
//! | `flux-calibration-per-pair` | the plan has one flux scan per distinct pair             |
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use hifitime::Duration;
use log::{debug, info, warn};

use crate::backend_params::{accumulation_length, defaults_for, BackendParameters};
use crate::bands::{BandMode, BandTable};
use crate::calibrators::{Calibrator, CalibratorCatalog};
use crate::config::EngineConfig;
use crate::constants::{Degree, MAX_BANK_DATA_RATE_MB_S, MAX_SAFE_ACCLEN};
use crate::coordinates::angular_separation;
use crate::observation::{EffectiveConfiguration, ObservationModel};
use crate::sb_errors::ConstraintError;

/// One flux calibration scan of the plan.
#[derive(Debug, Clone, PartialEq)]
pub struct FluxCalibrationScan {
    /// The configuration the scan calibrates.
    pub pair: BandMode,
    pub calibrator: Calibrator,
    /// First source of the pair, the calibrator was chosen for its position.
    pub anchor_source: String,
    /// Separation between the anchor source and the calibrator, degrees.
    pub separation: Degree,
    /// `true` if the operator pinned the calibrator.
    pub pinned: bool,
}

/// Calibration scans derived from a resolved observation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CalibrationPlan {
    flux_scans: Vec<FluxCalibrationScan>,
    polarization: bool,
}

impl CalibrationPlan {
    pub fn new(flux_scans: Vec<FluxCalibrationScan>, polarization: bool) -> Self {
        CalibrationPlan {
            flux_scans,
            polarization,
        }
    }

    /// Flux scans in pair first-use order.
    pub fn flux_scans(&self) -> &[FluxCalibrationScan] {
        &self.flux_scans
    }

    pub fn flux_scan_for(&self, pair: &BandMode) -> Option<&FluxCalibrationScan> {
        self.flux_scans.iter().find(|scan| &scan.pair == pair)
    }

    /// Whether a polarization calibration scan precedes each configuration's science scans.
    pub fn polarization(&self) -> bool {
        self.polarization
    }

    /// Distinct calibrators of the plan, in first-use order.
    pub fn calibrators(&self) -> Vec<&Calibrator> {
        let mut calibrators: Vec<&Calibrator> = Vec::new();
        for scan in &self.flux_scans {
            if !calibrators.iter().any(|cal| cal.name() == scan.calibrator.name()) {
                calibrators.push(&scan.calibrator);
            }
        }
        calibrators
    }
}

/// Non-fatal finding of the resolver.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolverWarning {
    /// Science plus calibration time exceeds the configured ceiling.
    SessionTooLong { total_s: f64, ceiling_s: f64 },
    /// A configuration writes more than one VEGAS bank can sustain.
    HighDataRate { pair: BandMode, rate_mb_s: f64 },
    /// Incoherent accumulation long enough to lose 8-bit resolution.
    LargeAccumulation { pair: BandMode, acclen: u32 },
    /// Fold-mode source on the global configuration without an ephemeris; it is folded
    /// with the backend's own timing model.
    MissingEphemeris { source_name: String },
}

impl fmt::Display for ResolverWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolverWarning::SessionTooLong { total_s, ceiling_s } => write!(
                f,
                "total session time {total_s:.0} s exceeds the {ceiling_s:.0} s ceiling"
            ),
            ResolverWarning::HighDataRate { pair, rate_mb_s } => write!(
                f,
                "{pair}: data rate {rate_mb_s:.0} MB/s exceeds the {MAX_BANK_DATA_RATE_MB_S:.0} MB/s per bank limit"
            ),
            ResolverWarning::LargeAccumulation { pair, acclen } => write!(
                f,
                "{pair}: large accumulation length ({acclen}) may cause loss of numerical resolution"
            ),
            ResolverWarning::MissingEphemeris { source_name } => write!(
                f,
                "{source_name}: Fold mode without an ephemeris file, no parfile will be set"
            ),
        }
    }
}

/// Outcome of a successful resolution, the input of the synthesizer.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub effective: EffectiveConfiguration,
    pub plan: CalibrationPlan,
    /// Backend parameters of every pair in use.
    pub params: BTreeMap<BandMode, BackendParameters>,
    pub warnings: Vec<ResolverWarning>,
}

/// Rules that only depend on the flattened observation, the band table and the backend
/// parameters, in table order from `at-least-one-source` to `backend-parameters`.
///
/// Pairs without an entry in `params` are not checked for `backend-parameters`; they receive
/// defaults on backfill.
pub fn check_effective(
    effective: &EffectiveConfiguration,
    bands: &BandTable,
    params: &BTreeMap<BandMode, BackendParameters>,
) -> Result<(), ConstraintError> {
    if effective.is_empty() {
        return Err(ConstraintError::NoSources);
    }

    for pair in effective.pairs() {
        let band = bands.get(&pair.band).ok_or_else(|| ConstraintError::UnknownBand {
            band: pair.band.clone(),
        })?;
        if !band.supports(pair.mode) {
            return Err(ConstraintError::UnsupportedBandMode {
                band: pair.band.clone(),
                mode: pair.mode.to_string(),
                sources: effective.sources_for(pair).map(|s| s.name.clone()).collect(),
            });
        }
    }

    let missing_dm: Vec<String> = effective
        .sources()
        .iter()
        .filter(|s| s.band_mode.mode.coherent && !s.dispersion_measure.is_some_and(|dm| dm > 0.0))
        .map(|s| s.name.clone())
        .collect();
    if !missing_dm.is_empty() {
        return Err(ConstraintError::MissingDispersionMeasure {
            sources: missing_dm,
        });
    }

    let missing_ephemeris: Vec<String> = effective
        .sources()
        .iter()
        .filter(|s| s.overridden && s.band_mode.mode.is_fold() && s.ephemeris.is_none())
        .map(|s| s.name.clone())
        .collect();
    if !missing_ephemeris.is_empty() {
        return Err(ConstraintError::MissingEphemeris {
            sources: missing_ephemeris,
        });
    }

    if let Some(src) = effective
        .sources()
        .iter()
        .find(|s| s.scan_length <= Duration::ZERO)
    {
        return Err(ConstraintError::NonPositiveScanLength {
            source_name: src.name.clone(),
            seconds: src.scan_length.to_seconds(),
        });
    }

    for pair in effective.pairs() {
        if let (Some(p), Some(band)) = (params.get(pair), bands.get(&pair.band)) {
            p.validate(pair, band)?;
        }
    }

    Ok(())
}

/// Validates observations against the band table, the calibrator catalog and the engine
/// configuration.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    catalog: &'a CalibratorCatalog,
    config: &'a EngineConfig,
}

impl<'a> Resolver<'a> {
    pub fn new(catalog: &'a CalibratorCatalog, config: &'a EngineConfig) -> Self {
        Resolver { catalog, config }
    }

    /// Check every rule without modifying the model.
    ///
    /// Return
    /// ------
    /// * The effective configuration of the model, or the first violated rule
    pub fn validate(
        &self,
        model: &ObservationModel,
    ) -> Result<EffectiveConfiguration, ConstraintError> {
        let effective = model.effective_configuration();
        check_effective(&effective, model.bands(), model.backend_parameter_sets())?;

        if model.flux_calibration() {
            if let Some(name) = model.pinned_flux_calibrator() {
                if self.catalog.get(name).is_none() {
                    return Err(ConstraintError::UnknownFluxCalibrator(name.to_string()));
                }
            }
        }

        Ok(effective)
    }

    /// Build the calibration plan of a validated model.
    pub fn plan_calibration(
        &self,
        model: &ObservationModel,
        effective: &EffectiveConfiguration,
    ) -> Result<CalibrationPlan, ConstraintError> {
        let mut flux_scans = Vec::new();

        if model.flux_calibration() {
            let pinned = match model.pinned_flux_calibrator() {
                Some(name) => Some(
                    self.catalog
                        .get(name)
                        .ok_or_else(|| ConstraintError::UnknownFluxCalibrator(name.to_string()))?,
                ),
                None => None,
            };

            for pair in effective.pairs() {
                let Some(anchor) = effective.sources_for(pair).next() else {
                    continue;
                };
                let calibrator = pinned.unwrap_or_else(|| self.catalog.nearest(&anchor.position));
                let separation = angular_separation(&anchor.position, calibrator.position());
                debug!(
                    "{pair}: flux calibrator {} at {separation:.2}° from {}",
                    calibrator.name(),
                    anchor.name
                );
                flux_scans.push(FluxCalibrationScan {
                    pair: pair.clone(),
                    calibrator: calibrator.clone(),
                    anchor_source: anchor.name.clone(),
                    separation,
                    pinned: pinned.is_some(),
                });
            }

            if flux_scans.len() != effective.pairs().len() {
                return Err(ConstraintError::FluxCalibrationMismatch {
                    pairs: effective.pairs().len(),
                    scans: flux_scans.len(),
                });
            }
        }

        Ok(CalibrationPlan::new(flux_scans, model.polarization_calibration()))
    }

    /// Non-fatal findings about a resolved observation. Each one is also logged.
    pub fn warnings(
        &self,
        effective: &EffectiveConfiguration,
        plan: &CalibrationPlan,
        params: &BTreeMap<BandMode, BackendParameters>,
        model: &ObservationModel,
    ) -> Vec<ResolverWarning> {
        let mut warnings = Vec::new();

        let pol_scans = if plan.polarization() {
            effective.pairs().len()
        } else {
            0
        };
        // on and off phases of each flux scan
        let total_s = effective.total_scan_time().to_seconds()
            + plan.flux_scans().len() as f64 * 2.0 * self.config.flux_cal_scan_s
            + pol_scans as f64 * self.config.pol_cal_scan_s;
        if total_s > self.config.session_ceiling_s {
            warnings.push(ResolverWarning::SessionTooLong {
                total_s,
                ceiling_s: self.config.session_ceiling_s,
            });
        }

        warnings.extend(
            effective
                .sources()
                .iter()
                .filter(|s| s.band_mode.mode.is_fold() && s.ephemeris.is_none())
                .map(|s| ResolverWarning::MissingEphemeris {
                    source_name: s.name.clone(),
                }),
        );

        for pair in effective.pairs() {
            let Some(p) = params.get(pair) else {
                continue;
            };
            let rate_mb_s = p.data_rate_mb_per_s();
            if rate_mb_s > MAX_BANK_DATA_RATE_MB_S {
                warnings.push(ResolverWarning::HighDataRate {
                    pair: pair.clone(),
                    rate_mb_s,
                });
            }
            if !pair.mode.coherent {
                if let Some(band) = model.bands().get(&pair.band) {
                    let acclen = accumulation_length(p.tint, p.numchan, band.bandwidth_mhz());
                    if acclen > MAX_SAFE_ACCLEN {
                        warnings.push(ResolverWarning::LargeAccumulation {
                            pair: pair.clone(),
                            acclen,
                        });
                    }
                }
            }
        }

        for warning in &warnings {
            warn!("{warning}");
        }
        warnings
    }

    /// Validate, plan, backfill backend parameters and collect warnings.
    ///
    /// On error the model is unchanged. On success the only modification is the insertion of
    /// default parameters for pairs that had none.
    pub fn resolve(&self, model: &mut ObservationModel) -> Result<Resolution, ConstraintError> {
        let effective = self.validate(model)?;
        let plan = self.plan_calibration(model, &effective)?;

        let bands = Arc::clone(model.bands());
        let mut params = BTreeMap::new();
        for pair in effective.pairs() {
            if model.backend_parameters(pair).is_none() {
                if let Some(band) = bands.get(&pair.band) {
                    debug!("{pair}: using default backend parameters");
                    model.backfill_backend_parameters(pair, defaults_for(band, pair.mode));
                }
            }
            if let Some(p) = model.backend_parameters(pair) {
                params.insert(pair.clone(), p.clone());
            }
        }

        let warnings = self.warnings(&effective, &plan, &params, model);
        info!(
            "resolved {} source(s) in {} configuration(s), {} flux calibration scan(s), {} warning(s)",
            effective.sources().len(),
            effective.pairs().len(),
            plan.flux_scans().len(),
            warnings.len()
        );

        Ok(Resolution {
            effective,
            plan,
            params,
            warnings,
        })
    }
}

#[cfg(test)]
mod resolver_test {
    use super::*;
    use crate::bands::{BandTable, Mode, ObsMode};
    use crate::ref_system::Frame;
    use crate::sb_errors::{ModelError, Rule};

    fn secs(s: f64) -> Duration {
        Duration::from_seconds(s)
    }

    fn search() -> Mode {
        Mode::new(ObsMode::Search, false)
    }

    fn model_with(table: BandTable, mode: Mode) -> ObservationModel {
        let mut obs =
            ObservationModel::new(Arc::new(table), BandMode::new("L-band", mode)).unwrap();
        obs.add_source_raw("J0437-4715", "04:37:15.9", "-47:15:09.1", Frame::J2000, secs(600.0))
            .unwrap();
        obs
    }

    fn fixtures() -> (CalibratorCatalog, EngineConfig) {
        (CalibratorCatalog::gbt().unwrap(), EngineConfig::default())
    }

    #[test]
    fn test_empty_model() {
        let (catalog, config) = fixtures();
        let resolver = Resolver::new(&catalog, &config);
        let mut obs = ObservationModel::new(
            Arc::new(BandTable::gbt().unwrap()),
            BandMode::new("L-band", search()),
        )
        .unwrap();
        let err = resolver.resolve(&mut obs).unwrap_err();
        assert_eq!(err, ConstraintError::NoSources);
        assert_eq!(err.rule(), Rule::AtLeastOneSource);
    }

    #[test]
    fn test_coherent_needs_dm_and_fold_needs_ephemeris() {
        let (catalog, config) = fixtures();
        let resolver = Resolver::new(&catalog, &config);
        let coherent_fold = Mode::new(ObsMode::Fold, true);
        let mut obs = model_with(BandTable::gbt().unwrap(), coherent_fold);

        let err = resolver.resolve(&mut obs).unwrap_err();
        assert_eq!(err.rule(), Rule::CoherentDedispersionDm);

        // global Fold configuration: a missing ephemeris is only a warning
        obs.set_dispersion_measure("J0437-4715", Some(2.64)).unwrap();
        let resolution = resolver.resolve(&mut obs).unwrap();
        assert!(resolution.warnings.contains(&ResolverWarning::MissingEphemeris {
            source_name: "J0437-4715".into()
        }));

        // per-source Fold configuration requires one
        obs.set_source_override("J0437-4715", "S-band", coherent_fold).unwrap();
        let err = resolver.resolve(&mut obs).unwrap_err();
        assert_eq!(
            err,
            ConstraintError::MissingEphemeris {
                sources: vec!["J0437-4715".into()]
            }
        );

        obs.set_ephemeris("J0437-4715", Some("J0437-4715.par")).unwrap();
        let resolution = resolver.resolve(&mut obs).unwrap();
        assert!(!resolution
            .warnings
            .iter()
            .any(|w| matches!(w, ResolverWarning::MissingEphemeris { .. })));
    }

    #[test]
    fn test_incompatible_pair_rejected() {
        let table = BandTable::from_toml_str(
            r#"
            [[band]]
            label = "L-band"
            receiver = "Rcvr1_2"
            bandwidth_mhz = 800.0
            center_freqs_mhz = [1500.0]
            modes = ["fold", "coherent_fold"]
            "#,
        )
        .unwrap();
        let (catalog, config) = fixtures();
        let resolver = Resolver::new(&catalog, &config);
        let mut obs = model_with(table, search());

        match resolver.resolve(&mut obs) {
            Err(ConstraintError::UnsupportedBandMode {
                band,
                mode,
                sources,
            }) => {
                assert_eq!(band, "L-band");
                assert_eq!(mode, "search");
                assert_eq!(sources, vec!["J0437-4715".to_string()]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(obs.backend_parameter_sets().is_empty());
    }

    #[test]
    fn test_backfill_keeps_operator_values() {
        let (catalog, config) = fixtures();
        let resolver = Resolver::new(&catalog, &config);
        let mut obs = model_with(BandTable::gbt().unwrap(), search());
        let pair = BandMode::new("L-band", search());
        obs.set_backend_parameter(&pair, "numchan", "4096").unwrap();
        obs.set_backend_parameter(&pair, "tint", "8.192e-5").unwrap();

        let resolution = resolver.resolve(&mut obs).unwrap();
        assert_eq!(resolution.params[&pair].numchan, 4096);
        assert_eq!(obs.backend_parameters(&pair).unwrap().numchan, 4096);
    }

    #[test]
    fn test_invalid_stored_parameters() {
        let (catalog, config) = fixtures();
        let resolver = Resolver::new(&catalog, &config);
        let mut obs = model_with(BandTable::gbt().unwrap(), search());
        let pair = BandMode::new("L-band", search());
        obs.set_backend_parameter(&pair, "outbits", "2").unwrap();

        let err = resolver.resolve(&mut obs).unwrap_err();
        assert_eq!(err.rule(), Rule::BackendParameters);
    }

    #[test]
    fn test_flux_plan_per_pair() {
        let (catalog, config) = fixtures();
        let resolver = Resolver::new(&catalog, &config);
        let mut obs = model_with(BandTable::gbt().unwrap(), search());
        obs.add_source_raw("B1937+21", "19:39:38.56", "+21:34:59.1", Frame::J2000, secs(600.0))
            .unwrap();
        obs.set_source_override("B1937+21", "S-band", search()).unwrap();
        obs.set_flux_calibration(true);

        let resolution = resolver.resolve(&mut obs).unwrap();
        let scans = resolution.plan.flux_scans();
        assert_eq!(scans.len(), 2);
        assert_eq!(scans[0].anchor_source, "J0437-4715");
        assert_eq!(scans[0].calibrator.name(), "3C161");
        assert_eq!(scans[1].anchor_source, "B1937+21");
        assert_eq!(scans[1].calibrator.name(), "3C353");
        assert!(!resolution.plan.polarization());

        obs.pin_flux_calibrator(Some("3C286")).unwrap();
        let resolution = resolver.resolve(&mut obs).unwrap();
        assert!(resolution
            .plan
            .flux_scans()
            .iter()
            .all(|s| s.calibrator.name() == "3C286" && s.pinned));
        assert_eq!(resolution.plan.calibrators().len(), 1);

        obs.pin_flux_calibrator(Some("VirgoA")).unwrap();
        assert_eq!(
            resolver.resolve(&mut obs),
            Err(ConstraintError::UnknownFluxCalibrator("VirgoA".into()))
        );
    }

    #[test]
    fn test_warnings() {
        let (catalog, _) = fixtures();
        let config = EngineConfig::builder().session_ceiling_s(300.0).build().unwrap();
        let resolver = Resolver::new(&catalog, &config);
        let mut obs = model_with(BandTable::gbt().unwrap(), search());
        let pair = BandMode::new("L-band", search());
        // 2048 channels at 10.24 µs: 800 MB/s
        obs.set_backend_parameter(&pair, "tint", "1.024e-5").unwrap();

        let resolution = resolver.resolve(&mut obs).unwrap();
        assert!(resolution
            .warnings
            .iter()
            .any(|w| matches!(w, ResolverWarning::SessionTooLong { .. })));
        assert!(resolution
            .warnings
            .iter()
            .any(|w| matches!(w, ResolverWarning::HighDataRate { .. })));

        // 2048 channels at 256 acclen: 655 µs
        obs.set_backend_parameter(&pair, "tint", "6.5536e-4").unwrap();
        let resolution = resolver.resolve(&mut obs).unwrap();
        assert!(resolution.warnings.contains(&ResolverWarning::LargeAccumulation {
            pair: pair.clone(),
            acclen: 256
        }));
    }

    #[test]
    fn test_model_rejects_bad_scan_before_resolver() {
        let mut obs = model_with(BandTable::gbt().unwrap(), search());
        assert!(matches!(
            obs.set_scan_length("J0437-4715", secs(0.0)),
            Err(ModelError::NonPositiveScanLength { .. })
        ));
    }
}
