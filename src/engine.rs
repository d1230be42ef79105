//! # Synthesis engine
//!
//! [`SbEngine`] bundles the read-only inputs every observation shares (the flux calibrator
//! catalog, the band table and the [`EngineConfig`]) and exposes the whole pipeline:
//!
//! 1. [`SbEngine::new_observation`] creates an [`ObservationModel`] bound to the band table,
//! 2. the host edits the model,
//! 3. [`SbEngine::resolve`] validates it and plans calibration,
//! 4. [`SbEngine::render`] produces the [`ScheduleDocument`].
//!
//! ```rust
//! use hifitime::Duration;
//! use pulsar_sb::bands::{BandMode, Mode, ObsMode};
//! use pulsar_sb::engine::SbEngine;
//! use pulsar_sb::ref_system::Frame;
//!
//! let engine = SbEngine::gbt().unwrap();
//! let mut obs = engine
//!     .new_observation(BandMode::new("L-band", Mode::new(ObsMode::Fold, false)))
//!     .unwrap();
//! obs.add_source_raw("J0437-4715", "04:37:15.9", "-47:15:09.1", Frame::J2000, Duration::from_seconds(600.0))
//!     .unwrap();
//! obs.set_ephemeris("J0437-4715", Some("J0437-4715.par")).unwrap();
//! obs.set_flux_calibration(true);
//!
//! let script = engine.resolve_and_render(&mut obs).unwrap().text();
//! assert!(script.contains("Track(\"J0437-4715\", None, 600.0)"));
//! ```
use std::path::Path;
use std::sync::Arc;

use hifitime::Duration;
use log::info;

use crate::bands::{BandMode, BandTable};
use crate::calibrators::CalibratorCatalog;
use crate::config::EngineConfig;
use crate::observation::astrid_catalog::parse_catalog;
use crate::observation::ObservationModel;
use crate::resolver::{Resolution, Resolver};
use crate::sb_errors::{CatalogError, SbError, SynthesisError};
use crate::synthesis::{ScheduleDocument, Synthesizer};

/// The engine façade.
#[derive(Debug, Clone)]
pub struct SbEngine {
    catalog: Arc<CalibratorCatalog>,
    bands: Arc<BandTable>,
    config: EngineConfig,
}

impl SbEngine {
    /// Build an engine from explicit inputs. The configured tie epsilon overrides the catalog's.
    pub fn new(catalog: CalibratorCatalog, bands: BandTable, config: EngineConfig) -> Self {
        let catalog = catalog.with_tie_epsilon(config.tie_epsilon_deg);
        SbEngine {
            catalog: Arc::new(catalog),
            bands: Arc::new(bands),
            config,
        }
    }

    /// Engine over the bundled GBT calibrator catalog and band table, with default configuration.
    pub fn gbt() -> Result<Self, CatalogError> {
        Self::gbt_with_config(EngineConfig::default())
    }

    pub fn gbt_with_config(config: EngineConfig) -> Result<Self, CatalogError> {
        Ok(SbEngine::new(
            CalibratorCatalog::gbt()?,
            BandTable::gbt()?,
            config,
        ))
    }

    /// Engine over the bundled artifacts with a configuration file.
    pub fn from_config_path(path: impl AsRef<Path>) -> Result<Self, SbError> {
        let config = EngineConfig::from_path(path)?;
        Ok(Self::gbt_with_config(config)?)
    }

    pub fn catalog(&self) -> &CalibratorCatalog {
        &self.catalog
    }

    pub fn bands(&self) -> &Arc<BandTable> {
        &self.bands
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A new empty observation using `global` for every source without an override.
    pub fn new_observation(&self, global: BandMode) -> Result<ObservationModel, SbError> {
        Ok(ObservationModel::new(Arc::clone(&self.bands), global)?)
    }

    /// Import an Astrid catalog file into `model`, every entry with `scan_length`.
    ///
    /// Nothing is added unless every entry is accepted.
    pub fn import_catalog(
        &self,
        model: &mut ObservationModel,
        text: &str,
        scan_length: Duration,
    ) -> Result<Vec<String>, SbError> {
        let entries = parse_catalog(text)?;
        let added = model.add_catalog_entries(&entries, scan_length)?;
        info!("imported {} source(s) from catalog", added.len());
        Ok(added)
    }

    /// Validate `model`, plan calibration and backfill default backend parameters.
    pub fn resolve(&self, model: &mut ObservationModel) -> Result<Resolution, SbError> {
        Ok(Resolver::new(&self.catalog, &self.config).resolve(model)?)
    }

    /// Render a resolution.
    pub fn render(&self, resolution: &Resolution) -> Result<ScheduleDocument, SynthesisError> {
        Synthesizer::new(Arc::clone(&self.bands), self.config.clone()).render_resolution(resolution)
    }

    pub fn resolve_and_render(&self, model: &mut ObservationModel) -> Result<ScheduleDocument, SbError> {
        let resolution = self.resolve(model)?;
        Ok(self.render(&resolution)?)
    }
}

#[cfg(test)]
mod engine_test {
    use super::*;
    use crate::bands::{Mode, ObsMode};
    use crate::sb_errors::Rule;

    #[test]
    fn test_import_and_render() {
        let engine = SbEngine::gbt().unwrap();
        let mut obs = engine
            .new_observation(BandMode::new("820 MHz", Mode::new(ObsMode::Search, false)))
            .unwrap();
        let added = engine
            .import_catalog(
                &mut obs,
                "HEAD = NAME RA DEC\nJ1012+5307 10:12:33.43 +53:07:02.5\nJ1022+1001 10:22:57.99 +10:01:52.7\n",
                Duration::from_seconds(300.0),
            )
            .unwrap();
        assert_eq!(added, vec!["J1012+5307", "J1022+1001"]);

        let doc = engine.resolve_and_render(&mut obs).unwrap();
        assert_eq!(doc.science_scans().count(), 2);
        assert!(doc.text().contains("config_820_mhz_search = \"\"\""));
        assert!(obs
            .backend_parameters(&BandMode::new("820 MHz", Mode::new(ObsMode::Search, false)))
            .is_some());
    }

    #[test]
    fn test_resolve_error_is_wrapped() {
        let engine = SbEngine::gbt().unwrap();
        let mut obs = engine
            .new_observation(BandMode::new("L-band", Mode::new(ObsMode::Fold, false)))
            .unwrap();
        match engine.resolve_and_render(&mut obs) {
            Err(SbError::Constraint(err)) => assert_eq!(err.rule(), Rule::AtLeastOneSource),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(matches!(
            engine.new_observation(BandMode::new("W-band", Mode::new(ObsMode::Fold, false))),
            Err(SbError::Model(_))
        ));
    }
}
