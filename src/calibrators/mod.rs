//! # Flux calibrator catalog
//!
//! A fixed, read-only list of standard flux-density calibrators with J2000 positions and a
//! power-law flux scale. The catalog is an explicitly constructed value: build it once (from the
//! embedded list with [`CalibratorCatalog::default`], or from an alternate CSV file) and hand it
//! to the engine. A malformed entry fails the whole load; nothing is skipped.
//!
//! ## File format
//!
//! ```text
//! # comment
//! name,ra,dec,flux_jy,ref_freq_mhz,spectral_index
//! 3C48,01:37:41.30,+33:09:35.1,16.0,1400.0,-0.76
//! ```
//!
//! `ra`/`dec` are J2000 sexagesimal strings, `flux_jy` the flux density at `ref_freq_mhz`, and
//! `spectral_index` the exponent α of `S(f) = S₀ (f / f₀)^α`.
//!
//! ## Nearest-calibrator query
//!
//! [`CalibratorCatalog::nearest`] returns the entry with the smallest angular separation from a
//! position. Candidates within the tie epsilon of the minimum are considered equidistant and
//! the lexicographically smallest name wins.
use std::collections::HashSet;
use std::path::Path;

use log::debug;

use crate::constants::{Degree, MHz};
use crate::coordinates::{angular_separation, normalize, Position};
use crate::ref_system::Frame;
use crate::sb_errors::CatalogError;

static GBT_FLUX_CALIBRATORS: &str = include_str!("data/flux_calibrators.csv");

/// Separation difference below which two calibrators count as equidistant, in degrees.
pub const DEFAULT_TIE_EPSILON: Degree = 1e-9;

/// Raw CSV row, before validation.
#[derive(Debug, serde::Deserialize, PartialEq)]
struct CalibratorRecord {
    name: String,
    ra: String,
    dec: String,
    flux_jy: f64,
    ref_freq_mhz: f64,
    spectral_index: f64,
}

/// A standard flux calibrator.
#[derive(Debug, Clone, PartialEq)]
pub struct Calibrator {
    name: String,
    position: Position,
    flux_jy: f64,
    ref_freq_mhz: MHz,
    spectral_index: f64,
}

impl Calibrator {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Canonical J2000 position.
    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn flux_jy(&self) -> f64 {
        self.flux_jy
    }

    pub fn ref_freq_mhz(&self) -> MHz {
        self.ref_freq_mhz
    }

    pub fn spectral_index(&self) -> f64 {
        self.spectral_index
    }

    /// Estimated flux density in Jy at `freq_mhz`, from the power-law flux scale.
    pub fn flux_density_at(&self, freq_mhz: MHz) -> f64 {
        self.flux_jy * (freq_mhz / self.ref_freq_mhz).powf(self.spectral_index)
    }
}

/// Read-only list of flux calibrators.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibratorCatalog {
    entries: Vec<Calibrator>,
    tie_epsilon: Degree,
}

impl Default for CalibratorCatalog {
    /// The embedded GBT calibrator list, see [`CalibratorCatalog::gbt`].
    ///
    /// # Panics
    /// If the embedded list does not parse. It is covered by the unit tests.
    fn default() -> Self {
        match CalibratorCatalog::gbt() {
            Ok(catalog) => catalog,
            Err(err) => panic!("embedded calibrator catalog is invalid: {err}"),
        }
    }
}

impl CalibratorCatalog {
    /// Load the calibrator list shipped with the crate.
    pub fn gbt() -> Result<Self, CatalogError> {
        CalibratorCatalog::from_csv_str(GBT_FLUX_CALIBRATORS)
    }

    /// Parse a catalog from CSV text.
    ///
    /// Arguments
    /// ---------
    /// * `text`: CSV content with the header `name,ra,dec,flux_jy,ref_freq_mhz,spectral_index`;
    ///   lines starting with `#` are ignored
    ///
    /// Return
    /// ------
    /// * The catalog, or the first [`CatalogError`] found, naming its line
    pub fn from_csv_str(text: &str) -> Result<Self, CatalogError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .comment(Some(b'#'))
            .from_reader(text.as_bytes());

        let headers = reader
            .headers()
            .map_err(|err| CatalogError::Record {
                line: err.position().map_or(1, |p| p.line()),
                reason: err.to_string(),
            })?
            .clone();

        let mut entries = Vec::new();
        let mut seen = HashSet::new();

        for result in reader.records() {
            let record = result.map_err(|err| CatalogError::Record {
                line: err.position().map_or(0, |p| p.line()),
                reason: err.to_string(),
            })?;
            let line = record.position().map_or(0, |p| p.line());

            let row: CalibratorRecord =
                record
                    .deserialize(Some(&headers))
                    .map_err(|err| CatalogError::Record {
                        line,
                        reason: err.to_string(),
                    })?;

            let calibrator = Calibrator::from_record(row, line)?;
            if !seen.insert(calibrator.name.clone()) {
                return Err(CatalogError::DuplicateName(calibrator.name));
            }
            entries.push(calibrator);
        }

        if entries.is_empty() {
            return Err(CatalogError::Empty);
        }

        debug!("loaded {} flux calibrators", entries.len());
        Ok(CalibratorCatalog {
            entries,
            tie_epsilon: DEFAULT_TIE_EPSILON,
        })
    }

    /// Read a catalog from a CSV file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| CatalogError::Io {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;
        CalibratorCatalog::from_csv_str(&text)
    }

    /// Replace the separation epsilon used to detect ties in [`nearest`](Self::nearest).
    pub fn with_tie_epsilon(mut self, tie_epsilon: Degree) -> Self {
        self.tie_epsilon = tie_epsilon.abs();
        self
    }

    pub fn tie_epsilon(&self) -> Degree {
        self.tie_epsilon
    }

    /// The calibrator closest to `position` on the sky.
    ///
    /// Calibrators whose separation is within the tie epsilon of the minimum are equidistant;
    /// among those the lexicographically smallest name is returned.
    pub fn nearest(&self, position: &Position) -> &Calibrator {
        let separations: Vec<Degree> = self
            .entries
            .iter()
            .map(|cal| angular_separation(position, &cal.position))
            .collect();
        let min = separations.iter().copied().fold(f64::INFINITY, f64::min);

        let mut best = 0;
        let mut found = false;
        for (idx, sep) in separations.iter().enumerate() {
            if *sep <= min + self.tie_epsilon
                && (!found || self.entries[idx].name < self.entries[best].name)
            {
                best = idx;
                found = true;
            }
        }

        &self.entries[best]
    }

    /// Look up a calibrator by exact name.
    pub fn get(&self, name: &str) -> Option<&Calibrator> {
        self.entries.iter().find(|cal| cal.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Calibrator> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Calibrator {
    fn from_record(row: CalibratorRecord, line: u64) -> Result<Self, CatalogError> {
        let invalid = |reason: String| CatalogError::InvalidEntry {
            line,
            name: row.name.clone(),
            reason,
        };

        if row.name.is_empty() {
            return Err(invalid("empty name".into()));
        }
        if !(row.flux_jy.is_finite() && row.flux_jy > 0.0) {
            return Err(invalid(format!("flux density must be > 0 Jy, got {}", row.flux_jy)));
        }
        if !(row.ref_freq_mhz.is_finite() && row.ref_freq_mhz > 0.0) {
            return Err(invalid(format!(
                "reference frequency must be > 0 MHz, got {}",
                row.ref_freq_mhz
            )));
        }
        if !row.spectral_index.is_finite() {
            return Err(invalid("spectral index must be finite".into()));
        }

        let position =
            normalize(&row.ra, &row.dec, Frame::J2000).map_err(|source| CatalogError::Coordinate {
                line,
                name: row.name.clone(),
                source,
            })?;

        Ok(Calibrator {
            name: row.name,
            position,
            flux_jy: row.flux_jy,
            ref_freq_mhz: row.ref_freq_mhz,
            spectral_index: row.spectral_index,
        })
    }
}

#[cfg(test)]
mod calibrators_test {
    use super::*;
    use approx::assert_relative_eq;

    const HEADER: &str = "name,ra,dec,flux_jy,ref_freq_mhz,spectral_index\n";

    #[test]
    fn test_embedded_catalog() {
        let catalog = CalibratorCatalog::default();
        assert_eq!(catalog.len(), 12);
        let cal = catalog.get("3C48").unwrap();
        assert_relative_eq!(cal.position().lon(), 24.422083333, epsilon = 1e-8);
        assert_relative_eq!(cal.flux_density_at(1400.0), 16.0);
        assert!(cal.flux_density_at(800.0) > 16.0);
        assert!(catalog.get("Cas A").is_none());
    }

    #[test]
    fn test_nearest_embedded() {
        let catalog = CalibratorCatalog::default();
        let near_3c286 = normalize("13:30:00", "+30:00:00", Frame::J2000).unwrap();
        assert_eq!(catalog.nearest(&near_3c286).name(), "3C286");

        let south = normalize("19:00:00", "-60:00:00", Frame::J2000).unwrap();
        assert_eq!(catalog.nearest(&south).name(), "PKS1934-638");
    }

    #[test]
    fn test_nearest_tie_goes_to_smaller_name() {
        let text = format!(
            "{HEADER}ZETA,01:00:00,+10:00:00,1.0,1400,0\nALPHA,03:00:00,+10:00:00,1.0,1400,0\n"
        );
        let catalog = CalibratorCatalog::from_csv_str(&text).unwrap();
        let midway = Position::j2000(30.0, 10.0).unwrap();
        assert_eq!(catalog.nearest(&midway).name(), "ALPHA");

        let closer_to_zeta = Position::j2000(20.0, 10.0).unwrap();
        assert_eq!(catalog.nearest(&closer_to_zeta).name(), "ZETA");
    }

    #[test]
    fn test_malformed_rows_fail_with_line() {
        let bad_dec = format!("{HEADER}3C48,01:37:41.30,+33:09:35.1,16.0,1400,-0.76\nBAD,01:00:00,+95:00:00,1,1400,0\n");
        match CalibratorCatalog::from_csv_str(&bad_dec) {
            Err(CatalogError::Coordinate { line, name, .. }) => {
                assert_eq!(line, 3);
                assert_eq!(name, "BAD");
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let bad_flux = format!("{HEADER}X,01:00:00,+10:00:00,-1,1400,0\n");
        assert!(matches!(
            CalibratorCatalog::from_csv_str(&bad_flux),
            Err(CatalogError::InvalidEntry { line: 2, .. })
        ));

        let missing_field = format!("{HEADER}X,01:00:00,+10:00:00,1\n");
        assert!(matches!(
            CalibratorCatalog::from_csv_str(&missing_field),
            Err(CatalogError::Record { .. })
        ));

        let duplicate = format!("{HEADER}X,01:00:00,+10:00:00,1,1400,0\nX,02:00:00,+10:00:00,1,1400,0\n");
        assert_eq!(
            CalibratorCatalog::from_csv_str(&duplicate),
            Err(CatalogError::DuplicateName("X".into()))
        );

        assert_eq!(CalibratorCatalog::from_csv_str(HEADER), Err(CatalogError::Empty));
    }

    #[test]
    fn test_from_missing_path() {
        assert!(matches!(
            CalibratorCatalog::from_path("/nonexistent/calibrators.csv"),
            Err(CatalogError::Io { .. })
        ));
    }
}
