//! # Celestial reference frames
//!
//! Rotation matrices between the three frames a source position may be entered in:
//!
//! - **J2000**: FK5 mean equator and equinox of J2000.0. This is the canonical frame used for
//!   every distance computation and for the rendered catalog.
//! - **B1950**: mean equator and equinox of B1950.0, reached from J2000 with the IAU 1976
//!   precession model. The FK4 E-terms of aberration and the FK4/FK5 equinox offset are not
//!   applied, so a B1950 position agrees with a rigorous FK4→FK5 reduction to about 1″.
//! - **Galactic**: IAU 1958 galactic system, tied to J2000 by the Hipparcos
//!   (ESA 1997, vol. 1, §1.5.3) rotation matrix.
//!
//! Every conversion is a pure rotation, so round trips between any two frames reproduce the
//! input to floating-point precision.
//!
//! ```text
//!   B1950  --prec(B1950)ᵀ-->  J2000  --G-->  Galactic
//! ```
use std::fmt;
use std::str::FromStr;

use nalgebra::{Matrix3, Rotation3, Vector3};

use crate::constants::{Degree, Radian, B1950, RADEG, T2000};
use crate::sb_errors::CoordinateError;

/// Reference frame of a [`Position`](crate::coordinates::Position).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Frame {
    J2000,
    B1950,
    Galactic,
}

impl Frame {
    pub const ALL: [Frame; 3] = [Frame::J2000, Frame::B1950, Frame::Galactic];

    /// Label used in Astrid catalogs (`coordmode = ...`).
    pub fn label(&self) -> &'static str {
        match self {
            Frame::J2000 => "J2000",
            Frame::B1950 => "B1950",
            Frame::Galactic => "Galactic",
        }
    }

    /// `true` for the equatorial frames, whose inputs are sexagesimal RA/Dec.
    pub fn is_equatorial(&self) -> bool {
        !matches!(self, Frame::Galactic)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Frame {
    type Err = CoordinateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "J2000" => Ok(Frame::J2000),
            "B1950" => Ok(Frame::B1950),
            "GALACTIC" => Ok(Frame::Galactic),
            _ => Err(CoordinateError::UnknownFrame(s.to_string())),
        }
    }
}

/// Equatorial J2000 → galactic rotation (Hipparcos definition), `x_gal = G · x_J2000`.
///
/// `Matrix3::new` takes its arguments in row-major order.
fn galactic_from_j2000() -> Matrix3<f64> {
    Matrix3::new(
        -0.0548755604162154, -0.8734370902348850, -0.4838350155487132,
        0.4941094278755837, -0.4448296299600112, 0.7469822444972189,
        -0.8676661490190047, -0.1980763734312015, 0.4559837761750669,
    )
}

/// Construct a right-handed 3×3 rotation matrix around one of the principal axes.
///
/// The matrix performs an **active** rotation of a vector by `alpha` radians,
/// counter-clockwise when looking down the axis toward the origin.
///
/// Arguments
/// ---------
/// * `alpha`: rotation angle in radians
/// * `k`: axis index, `0` → X, `1` → Y, `2` → Z; any other index selects Z
pub fn rotmt(alpha: Radian, k: usize) -> Matrix3<f64> {
    let axis = match k {
        0 => Vector3::x_axis(),
        1 => Vector3::y_axis(),
        _ => Vector3::z_axis(),
    };

    Rotation3::from_axis_angle(&axis, alpha).into()
}

/// Precession matrix from the J2000 mean equator and equinox to the mean equator and
/// equinox of epoch `tjm` (IAU 1976 model), such that `x_date = P · x_J2000`.
///
/// The angles are polynomials in Julian centuries `T = (tjm - T2000) / 36525`:
///
/// ```text
/// ζ(T) = (0.6406161 + 0.0000839·T + 0.0000050·T²) · T  [deg]
/// θ(T) = (0.5567530 - 0.0001185·T - 0.0000116·T²) · T  [deg]
/// z(T) = (0.6406161 + 0.0003041·T + 0.0000051·T²) · T  [deg]
/// ```
///
/// and `P = R₃(−z) · R₂(θ) · R₃(−ζ)` with `Rᵢ` the coordinate (passive) rotations, i.e. active
/// rotations by the opposite angle.
fn prec(tjm: f64) -> Matrix3<f64> {
    let zed = 0.6406161 * RADEG;
    let zd = 0.6406161 * RADEG;
    let thd = 0.5567530 * RADEG;

    let zedd = 0.0000839 * RADEG;
    let zdd = 0.0003041 * RADEG;
    let thdd = -0.0001185 * RADEG;

    let zeddd = 0.0000050 * RADEG;
    let zddd = 0.0000051 * RADEG;
    let thddd = -0.0000116 * RADEG;

    let t = (tjm - T2000) / 36525.0;

    let zeta = ((zeddd * t + zedd) * t + zed) * t;
    let z = ((zddd * t + zdd) * t + zd) * t;
    let theta = ((thddd * t + thdd) * t + thd) * t;

    rotmt(z, 2) * rotmt(-theta, 1) * rotmt(zeta, 2)
}

/// Rotation taking a unit vector expressed in `frame` to the canonical J2000 frame.
pub fn rotation_to_j2000(frame: Frame) -> Matrix3<f64> {
    match frame {
        Frame::J2000 => Matrix3::identity(),
        Frame::B1950 => prec(B1950).transpose(),
        Frame::Galactic => galactic_from_j2000().transpose(),
    }
}

/// Rotation matrix between two frames, such that `x_to = R · x_from`.
pub fn rotpn(from: Frame, to: Frame) -> Matrix3<f64> {
    if from == to {
        return Matrix3::identity();
    }
    rotation_to_j2000(to).transpose() * rotation_to_j2000(from)
}

/// Unit vector pointing at spherical coordinates `(lon, lat)` given in degrees.
pub fn radec_to_cartesian(lon: Degree, lat: Degree) -> Vector3<f64> {
    let (sin_lon, cos_lon) = (lon * RADEG).sin_cos();
    let (sin_lat, cos_lat) = (lat * RADEG).sin_cos();
    Vector3::new(cos_lat * cos_lon, cos_lat * sin_lon, sin_lat)
}

/// Convert a Cartesian direction to spherical coordinates in degrees.
///
/// Return
/// ------
/// * `(lon, lat)` with `lon` in `[0, 360)` and `lat` clamped to `[-90, 90]`;
///   a zero vector maps to `(0, 0)`.
pub fn cartesian_to_radec(v: &Vector3<f64>) -> (Degree, Degree) {
    let norm = v.norm();
    if norm == 0.0 {
        return (0.0, 0.0);
    }

    let lat = (v.z / norm).clamp(-1.0, 1.0).asin() / RADEG;
    let lon = if v.x == 0.0 && v.y == 0.0 {
        0.0
    } else {
        v.y.atan2(v.x) / RADEG
    };
    (wrap_longitude(lon), lat.clamp(-90.0, 90.0))
}

/// Wrap a longitude into `[0, 360)`.
pub fn wrap_longitude(lon: Degree) -> Degree {
    let wrapped = lon.rem_euclid(360.0);
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}
