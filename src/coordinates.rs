//! # Sky positions
//!
//! A [`Position`] is a `(lon, lat)` pair in degrees tagged with the [`Frame`] it is expressed
//! in. Longitude is always wrapped to `[0, 360)` and latitude kept within `[-90, 90]`; the
//! frame tag is never inferred.
//!
//! Operator input reaches the engine through [`normalize`], which accepts sexagesimal RA/Dec for
//! the equatorial frames and decimal degrees for the galactic frame, and always returns the
//! canonical J2000 position used for distance math and catalog rendering.
//!
//! ## Example
//!
//! ```rust
//! use pulsar_sb::coordinates::{angular_separation, normalize};
//! use pulsar_sb::ref_system::Frame;
//!
//! let psr = normalize("04:37:15.9", "-47:15:09.1", Frame::J2000).unwrap();
//! let same = normalize("253.39", "-41.96", Frame::Galactic).unwrap();
//! assert!(angular_separation(&psr, &same) < 0.05);
//! ```
use log::debug;

use crate::constants::{Degree, RADEG};
use crate::conversion::{format_dec_dms, format_ra_hms, parse_dec_to_deg, parse_degrees, parse_ra_to_deg};
use crate::ref_system::{cartesian_to_radec, radec_to_cartesian, rotpn, wrap_longitude, Frame};
use crate::sb_errors::CoordinateError;
use nalgebra::Vector3;

/// A sky coordinate tagged with its reference frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    frame: Frame,
    lon: Degree,
    lat: Degree,
}

impl Position {
    /// Build a position from angles in degrees.
    ///
    /// Arguments
    /// ---------
    /// * `frame`: reference frame of the angles
    /// * `lon`: right ascension or galactic longitude, any finite value (wrapped to `[0, 360)`)
    /// * `lat`: declination or galactic latitude, within `[-90, 90]`
    ///
    /// Return
    /// ------
    /// * The position, or a [`CoordinateError::OutOfRange`] for a non-finite longitude or a
    ///   latitude outside `[-90, 90]`
    pub fn new(frame: Frame, lon: Degree, lat: Degree) -> Result<Self, CoordinateError> {
        if !lon.is_finite() {
            return Err(CoordinateError::OutOfRange {
                field: "longitude",
                value: lon,
                range: "a finite number of degrees",
            });
        }
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(CoordinateError::OutOfRange {
                field: "latitude",
                value: lat,
                range: "-90 to 90 degrees",
            });
        }
        Ok(Position {
            frame,
            lon: wrap_longitude(lon),
            lat,
        })
    }

    /// Canonical J2000 position from decimal degrees.
    pub fn j2000(ra: Degree, dec: Degree) -> Result<Self, CoordinateError> {
        Position::new(Frame::J2000, ra, dec)
    }

    fn from_unit_vector(frame: Frame, v: &Vector3<f64>) -> Self {
        let (lon, lat) = cartesian_to_radec(v);
        Position { frame, lon, lat }
    }

    pub fn frame(&self) -> Frame {
        self.frame
    }

    /// Right ascension or galactic longitude in degrees, in `[0, 360)`.
    pub fn lon(&self) -> Degree {
        self.lon
    }

    /// Declination or galactic latitude in degrees, in `[-90, 90]`.
    pub fn lat(&self) -> Degree {
        self.lat
    }

    /// Unit vector of this position in its own frame.
    pub fn unit_vector(&self) -> Vector3<f64> {
        radec_to_cartesian(self.lon, self.lat)
    }

    /// Express this position in another frame.
    ///
    /// Converting to the frame the position is already in returns it unchanged, so canonical
    /// J2000 inputs keep their exact parsed values.
    pub fn to_frame(&self, frame: Frame) -> Position {
        if frame == self.frame {
            return *self;
        }
        let v = rotpn(self.frame, frame) * self.unit_vector();
        Position::from_unit_vector(frame, &v)
    }

    /// The canonical J2000 form of this position.
    pub fn canonical(&self) -> Position {
        self.to_frame(Frame::J2000)
    }

    /// `(RA, Dec)` of the canonical position as sexagesimal strings, as written in catalogs.
    pub fn to_sexagesimal(&self) -> (String, String) {
        let j2000 = self.canonical();
        (format_ra_hms(j2000.lon, 4), format_dec_dms(j2000.lat, 3))
    }
}

/// Normalize raw operator input to a canonical J2000 [`Position`].
///
/// Arguments
/// ---------
/// * `coord1`: right ascension `HH:MM[:SS.ss]` for J2000/B1950, galactic longitude in decimal
///   degrees (`0..=360`) for Galactic
/// * `coord2`: declination `±DD:MM[:SS.ss]` for J2000/B1950, galactic latitude in decimal
///   degrees (`-90..=90`) for Galactic
/// * `frame`: the frame the operator entered the position in
///
/// Return
/// ------
/// * The position in J2000, or the first [`CoordinateError`] found
pub fn normalize(coord1: &str, coord2: &str, frame: Frame) -> Result<Position, CoordinateError> {
    let entered = match frame {
        Frame::J2000 | Frame::B1950 => {
            Position::new(frame, parse_ra_to_deg(coord1)?, parse_dec_to_deg(coord2)?)?
        }
        Frame::Galactic => Position::new(
            frame,
            parse_degrees(coord1, "galactic longitude", 0.0, 360.0, "0 to 360 degrees")?,
            parse_degrees(coord2, "galactic latitude", -90.0, 90.0, "-90 to 90 degrees")?,
        )?,
    };

    let canonical = entered.canonical();
    debug!(
        "normalized ({coord1}, {coord2}) {frame} -> J2000 ({:.6}, {:.6})",
        canonical.lon, canonical.lat
    );
    Ok(canonical)
}

/// Same as [`normalize`] with the frame given as text (`"J2000"`, `"b1950"`, `"Galactic"`, …).
pub fn normalize_str(coord1: &str, coord2: &str, frame: &str) -> Result<Position, CoordinateError> {
    normalize(coord1, coord2, frame.parse()?)
}

/// Great-circle distance between two positions, in degrees.
///
/// Both positions are brought to J2000 first. The Vincenty form
///
/// ```text
/// Δσ = atan2( √[(cos φ₂ sin Δλ)² + (cos φ₁ sin φ₂ − sin φ₁ cos φ₂ cos Δλ)²],
///             sin φ₁ sin φ₂ + cos φ₁ cos φ₂ cos Δλ )
/// ```
///
/// stays accurate at both small and antipodal separations. The operands are ordered before
/// evaluation so that the result is bit-for-bit symmetric.
///
/// Return
/// ------
/// * The separation in `[0, 180]`, exactly `0` for identical positions
pub fn angular_separation(a: &Position, b: &Position) -> Degree {
    let a = a.canonical();
    let b = b.canonical();
    if a.lon == b.lon && a.lat == b.lat {
        return 0.0;
    }

    let (first, second) = if (a.lon, a.lat) <= (b.lon, b.lat) {
        (a, b)
    } else {
        (b, a)
    };

    let (sin_phi1, cos_phi1) = (first.lat * RADEG).sin_cos();
    let (sin_phi2, cos_phi2) = (second.lat * RADEG).sin_cos();
    let (sin_dlon, cos_dlon) = ((second.lon - first.lon) * RADEG).sin_cos();

    let x = cos_phi2 * sin_dlon;
    let y = cos_phi1 * sin_phi2 - sin_phi1 * cos_phi2 * cos_dlon;
    let num = (x * x + y * y).sqrt();
    let den = sin_phi1 * sin_phi2 + cos_phi1 * cos_phi2 * cos_dlon;

    (num.atan2(den) / RADEG).clamp(0.0, 180.0)
}
