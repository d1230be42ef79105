//! # Observation model
//!
//! [`ObservationModel`] is the single source of truth an operator session mutates: the ordered
//! source list, the global `(band, mode)` selection and per-source overrides, calibration
//! choices, and one [`BackendParameters`] set per pair.
//!
//! Every mutation is atomic. It either succeeds and leaves the model consistent, or returns a
//! [`ModelError`] and leaves the model exactly as it was. Cross-field rules that involve several
//! sources or the calibrator catalog (mode compatibility, DM and ephemeris requirements, …) are
//! the job of the [resolver](crate::resolver), which runs on the whole model before rendering.
//!
//! [`ObservationModel::effective_configuration`] flattens the model into the read-only view
//! consumed downstream: each source with its effective pair (override if present, global
//! otherwise) and the distinct pairs in first-use order.
pub mod astrid_catalog;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use hifitime::Duration;
use indexmap::IndexMap;
use log::debug;

use crate::backend_params::{defaults_for, BackendParameters};
use crate::bands::{BandMode, BandTable, Mode};
use crate::constants::{DispersionMeasure, INVALID_NAME_CHARS, MAX_SOURCE_NAME_LEN};
use crate::coordinates::{normalize, Position};
use crate::ref_system::Frame;
use crate::sb_errors::ModelError;
use astrid_catalog::CatalogEntry;

/// A science target.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    name: String,
    position: Position,
    entered_frame: Frame,
    scan_length: Duration,
    band_mode: Option<BandMode>,
    ephemeris: Option<String>,
    dispersion_measure: Option<DispersionMeasure>,
}

impl Source {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Canonical J2000 position.
    pub fn position(&self) -> &Position {
        &self.position
    }

    /// Frame the position was entered in.
    pub fn entered_frame(&self) -> Frame {
        self.entered_frame
    }

    pub fn scan_length(&self) -> Duration {
        self.scan_length
    }

    /// Per-source `(band, mode)` override.
    pub fn band_mode_override(&self) -> Option<&BandMode> {
        self.band_mode.as_ref()
    }

    /// Path of the timing ephemeris (parfile) used in Fold mode.
    pub fn ephemeris(&self) -> Option<&str> {
        self.ephemeris.as_deref()
    }

    pub fn dispersion_measure(&self) -> Option<DispersionMeasure> {
        self.dispersion_measure
    }
}

/// Check a source name against the catalog naming rules.
///
/// Names are 1 to 32 characters long and contain none of the characters that break Astrid
/// catalogs (whitespace, quotes, shell metacharacters, NUL).
pub fn validate_source_name(name: &str) -> Result<(), ModelError> {
    let invalid = |reason: String| {
        Err(ModelError::InvalidName {
            name: name.to_string(),
            reason,
        })
    };

    if name.is_empty() {
        return invalid("name is empty".into());
    }
    if name.chars().count() > MAX_SOURCE_NAME_LEN {
        return invalid(format!("longer than {MAX_SOURCE_NAME_LEN} characters"));
    }
    if let Some(c) = name
        .chars()
        .find(|c| INVALID_NAME_CHARS.contains(c) || c.is_whitespace() || c.is_control())
    {
        return invalid(format!("character {c:?} is not allowed"));
    }
    Ok(())
}

fn check_scan_length(source_name: &str, scan_length: Duration) -> Result<(), ModelError> {
    if scan_length <= Duration::ZERO {
        return Err(ModelError::NonPositiveScanLength {
            source_name: source_name.to_string(),
            seconds: scan_length.to_seconds(),
        });
    }
    Ok(())
}

/// A source with its effective `(band, mode)` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveSource {
    pub name: String,
    /// Canonical J2000 position.
    pub position: Position,
    pub scan_length: Duration,
    pub band_mode: BandMode,
    /// `true` when the pair comes from a per-source override.
    pub overridden: bool,
    pub ephemeris: Option<String>,
    pub dispersion_measure: Option<DispersionMeasure>,
}

/// Flat, read-only view of an observation: every source resolved to exactly one pair.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EffectiveConfiguration {
    sources: Vec<EffectiveSource>,
    pairs: Vec<BandMode>,
}

impl EffectiveConfiguration {
    /// Sources in addition order.
    pub fn sources(&self) -> &[EffectiveSource] {
        &self.sources
    }

    /// Distinct pairs in first-use order.
    pub fn pairs(&self) -> &[BandMode] {
        &self.pairs
    }

    /// Sources using `pair`, in addition order.
    pub fn sources_for<'a>(&'a self, pair: &BandMode) -> impl Iterator<Item = &'a EffectiveSource> + 'a {
        let pair = pair.clone();
        self.sources.iter().filter(move |src| src.band_mode == pair)
    }

    /// Sum of the science scan lengths.
    pub fn total_scan_time(&self) -> Duration {
        self.sources
            .iter()
            .fold(Duration::ZERO, |acc, src| acc + src.scan_length)
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// The mutable state of one scheduling-block session.
#[derive(Debug, Clone)]
pub struct ObservationModel {
    bands: Arc<BandTable>,
    sources: IndexMap<String, Source>,
    global: BandMode,
    backend: BTreeMap<BandMode, BackendParameters>,
    flux_calibration: bool,
    polarization_calibration: bool,
    pinned_flux_calibrator: Option<String>,
}

impl ObservationModel {
    /// Create an empty observation.
    ///
    /// Arguments
    /// ---------
    /// * `bands`: the band table, shared with the engine
    /// * `global`: the `(band, mode)` pair used by sources without an override
    ///
    /// Return
    /// ------
    /// * The model, or [`ModelError::UnknownBand`] if `global.band` is not in the table
    pub fn new(bands: Arc<BandTable>, global: BandMode) -> Result<Self, ModelError> {
        if bands.get(&global.band).is_none() {
            return Err(ModelError::UnknownBand(global.band));
        }
        Ok(ObservationModel {
            bands,
            sources: IndexMap::new(),
            global,
            backend: BTreeMap::new(),
            flux_calibration: false,
            polarization_calibration: false,
            pinned_flux_calibrator: None,
        })
    }

    fn check_band(&self, band: &str) -> Result<(), ModelError> {
        match self.bands.get(band) {
            Some(_) => Ok(()),
            None => Err(ModelError::UnknownBand(band.to_string())),
        }
    }

    fn source_mut(&mut self, name: &str) -> Result<&mut Source, ModelError> {
        self.sources
            .get_mut(name)
            .ok_or_else(|| ModelError::UnknownSource(name.to_string()))
    }

    fn check_new_name(&self, name: &str) -> Result<(), ModelError> {
        validate_source_name(name)?;
        if self.sources.contains_key(name) {
            return Err(ModelError::DuplicateSource(name.to_string()));
        }
        Ok(())
    }

    pub fn bands(&self) -> &Arc<BandTable> {
        &self.bands
    }

    // ---------------------------------------------------------------------------------------------
    // Sources
    // ---------------------------------------------------------------------------------------------

    /// Append a source.
    ///
    /// The position is stored in J2000; its frame is remembered as the entered frame.
    pub fn add_source(
        &mut self,
        name: &str,
        position: Position,
        scan_length: Duration,
    ) -> Result<(), ModelError> {
        self.check_new_name(name)?;
        check_scan_length(name, scan_length)?;

        debug!("adding source {name}");
        self.sources.insert(
            name.to_string(),
            Source {
                name: name.to_string(),
                position: position.canonical(),
                entered_frame: position.frame(),
                scan_length,
                band_mode: None,
                ephemeris: None,
                dispersion_measure: None,
            },
        );
        Ok(())
    }

    /// Append a source from raw operator text, normalizing the coordinates.
    ///
    /// See [`normalize`] for the accepted coordinate formats.
    pub fn add_source_raw(
        &mut self,
        name: &str,
        coord1: &str,
        coord2: &str,
        frame: Frame,
        scan_length: Duration,
    ) -> Result<(), ModelError> {
        self.check_new_name(name)?;
        check_scan_length(name, scan_length)?;
        let position = normalize(coord1, coord2, frame)?;
        self.add_source(name, position, scan_length)?;
        if let Some(source) = self.sources.get_mut(name) {
            source.entered_frame = frame;
        }
        Ok(())
    }

    /// Append every entry of an imported catalog with the same scan length.
    ///
    /// All entries are checked before any is added.
    ///
    /// Return
    /// ------
    /// * The names added, in catalog order
    pub fn add_catalog_entries(
        &mut self,
        entries: &[CatalogEntry],
        scan_length: Duration,
    ) -> Result<Vec<String>, ModelError> {
        let mut batch = HashSet::new();
        for entry in entries {
            self.check_new_name(&entry.name)?;
            check_scan_length(&entry.name, scan_length)?;
            if !batch.insert(entry.name.as_str()) {
                return Err(ModelError::DuplicateSource(entry.name.clone()));
            }
        }

        for entry in entries {
            self.sources.insert(
                entry.name.clone(),
                Source {
                    name: entry.name.clone(),
                    position: entry.position.canonical(),
                    entered_frame: entry.frame,
                    scan_length,
                    band_mode: None,
                    ephemeris: None,
                    dispersion_measure: None,
                },
            );
        }
        debug!("imported {} catalog sources", entries.len());
        Ok(entries.iter().map(|entry| entry.name.clone()).collect())
    }

    /// Remove a source, keeping the order of the others.
    pub fn remove_source(&mut self, name: &str) -> Result<Source, ModelError> {
        self.sources
            .shift_remove(name)
            .ok_or_else(|| ModelError::UnknownSource(name.to_string()))
    }

    pub fn set_scan_length(&mut self, name: &str, scan_length: Duration) -> Result<(), ModelError> {
        check_scan_length(name, scan_length)?;
        self.source_mut(name)?.scan_length = scan_length;
        Ok(())
    }

    /// Set or clear the ephemeris (parfile) path of a source. A blank path clears it.
    pub fn set_ephemeris(&mut self, name: &str, path: Option<&str>) -> Result<(), ModelError> {
        let path = path
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string);
        self.source_mut(name)?.ephemeris = path;
        Ok(())
    }

    /// Set or clear the dispersion measure (pc cm⁻³) of a source.
    pub fn set_dispersion_measure(
        &mut self,
        name: &str,
        dm: Option<DispersionMeasure>,
    ) -> Result<(), ModelError> {
        if let Some(value) = dm {
            if !(value.is_finite() && value > 0.0) {
                return Err(ModelError::InvalidDispersionMeasure {
                    source_name: name.to_string(),
                    value,
                });
            }
        }
        self.source_mut(name)?.dispersion_measure = dm;
        Ok(())
    }

    pub fn source(&self, name: &str) -> Option<&Source> {
        self.sources.get(name)
    }

    /// Sources in addition order.
    pub fn sources(&self) -> impl Iterator<Item = &Source> {
        self.sources.values()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    // ---------------------------------------------------------------------------------------------
    // Band and mode selection
    // ---------------------------------------------------------------------------------------------

    /// Change the pair used by sources without an override.
    pub fn set_global_band_mode(&mut self, band: &str, mode: Mode) -> Result<(), ModelError> {
        self.check_band(band)?;
        self.global = BandMode::new(band, mode);
        Ok(())
    }

    pub fn global_band_mode(&self) -> &BandMode {
        &self.global
    }

    /// Give one source its own `(band, mode)` pair.
    pub fn set_source_override(
        &mut self,
        name: &str,
        band: &str,
        mode: Mode,
    ) -> Result<(), ModelError> {
        self.check_band(band)?;
        self.source_mut(name)?.band_mode = Some(BandMode::new(band, mode));
        Ok(())
    }

    /// Return one source to the global pair.
    pub fn clear_source_override(&mut self, name: &str) -> Result<(), ModelError> {
        self.source_mut(name)?.band_mode = None;
        Ok(())
    }

    /// Return every source to the global pair.
    pub fn clear_overrides(&mut self) {
        for source in self.sources.values_mut() {
            source.band_mode = None;
        }
    }

    // ---------------------------------------------------------------------------------------------
    // Calibration
    // ---------------------------------------------------------------------------------------------

    pub fn set_flux_calibration(&mut self, enabled: bool) {
        self.flux_calibration = enabled;
    }

    pub fn flux_calibration(&self) -> bool {
        self.flux_calibration
    }

    pub fn set_polarization_calibration(&mut self, enabled: bool) {
        self.polarization_calibration = enabled;
    }

    pub fn polarization_calibration(&self) -> bool {
        self.polarization_calibration
    }

    /// Use one calibrator for every flux calibration scan instead of the nearest one.
    ///
    /// The name is checked against the calibrator catalog by the resolver.
    pub fn pin_flux_calibrator(&mut self, name: Option<&str>) -> Result<(), ModelError> {
        let name = name.map(str::trim).filter(|n| !n.is_empty());
        if let Some(n) = name {
            validate_source_name(n)?;
        }
        self.pinned_flux_calibrator = name.map(str::to_string);
        Ok(())
    }

    pub fn pinned_flux_calibrator(&self) -> Option<&str> {
        self.pinned_flux_calibrator.as_deref()
    }

    // ---------------------------------------------------------------------------------------------
    // Backend parameters
    // ---------------------------------------------------------------------------------------------

    /// Override one backend parameter of a pair by name.
    ///
    /// A pair without parameters first receives the recommended defaults, so the override
    /// applies on top of them. See [`BackendParameters::set`] for names and formats.
    pub fn set_backend_parameter(
        &mut self,
        pair: &BandMode,
        name: &str,
        value: &str,
    ) -> Result<(), ModelError> {
        let mut params = match self.backend.get(pair) {
            Some(params) => params.clone(),
            None => {
                let band = self
                    .bands
                    .get(&pair.band)
                    .ok_or_else(|| ModelError::UnknownBand(pair.band.clone()))?;
                defaults_for(band, pair.mode)
            }
        };
        params.set(name, value)?;
        self.backend.insert(pair.clone(), params);
        Ok(())
    }

    /// Replace the whole parameter set of a pair.
    pub fn set_backend_parameters(
        &mut self,
        pair: &BandMode,
        params: BackendParameters,
    ) -> Result<(), ModelError> {
        self.check_band(&pair.band)?;
        self.backend.insert(pair.clone(), params);
        Ok(())
    }

    pub fn backend_parameters(&self, pair: &BandMode) -> Option<&BackendParameters> {
        self.backend.get(pair)
    }

    /// Every stored parameter set, including pairs no source currently uses.
    pub fn backend_parameter_sets(&self) -> &BTreeMap<BandMode, BackendParameters> {
        &self.backend
    }

    /// Store `params` for `pair` unless a set already exists. Existing sets are never replaced.
    pub(crate) fn backfill_backend_parameters(&mut self, pair: &BandMode, params: BackendParameters) {
        self.backend.entry(pair.clone()).or_insert(params);
    }

    // ---------------------------------------------------------------------------------------------
    // Views
    // ---------------------------------------------------------------------------------------------

    /// Resolve every source to its effective pair.
    pub fn effective_configuration(&self) -> EffectiveConfiguration {
        let mut pairs: Vec<BandMode> = Vec::new();
        let sources = self
            .sources
            .values()
            .map(|src| {
                let band_mode = src.band_mode.clone().unwrap_or_else(|| self.global.clone());
                if !pairs.contains(&band_mode) {
                    pairs.push(band_mode.clone());
                }
                EffectiveSource {
                    name: src.name.clone(),
                    position: src.position,
                    scan_length: src.scan_length,
                    overridden: src.band_mode.is_some(),
                    band_mode,
                    ephemeris: src.ephemeris.clone(),
                    dispersion_measure: src.dispersion_measure,
                }
            })
            .collect();

        EffectiveConfiguration { sources, pairs }
    }
}
