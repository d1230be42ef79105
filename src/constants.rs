//! # Constants and type definitions for pulsar-sb
//!
//! This module centralizes the **unit conversions**, **reference epochs** and **common type
//! aliases** used throughout the crate.
//!
//! ## Overview
//!
//! - Angular conversions (degrees ↔ radians ↔ arcseconds, hours ↔ degrees)
//! - Reference epochs for the supported celestial frames
//! - Source-name rules inherited from the GBT catalog format
//! - Physical limits of the VEGAS pulsar backend used by the resolver warnings

// -------------------------------------------------------------------------------------------------
// Angular constants and unit conversions
// -------------------------------------------------------------------------------------------------

/// Degrees → radians
pub const RADEG: f64 = std::f64::consts::PI / 180.0;

/// Degrees → arcseconds
pub const DEG2ARC: f64 = 3600.0;

/// Hours of right ascension → degrees
pub const HOUR2DEG: f64 = 15.0;

// -------------------------------------------------------------------------------------------------
// Reference epochs
// -------------------------------------------------------------------------------------------------

/// MJD epoch of J2000.0 (2000-01-01 12:00:00 TT)
pub const T2000: f64 = 51544.5;

/// MJD epoch of the Besselian year B1950.0 (JD 2433282.4235)
pub const B1950: f64 = 33281.9235;

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Angle in degrees
pub type Degree = f64;
/// Angle in radians
pub type Radian = f64;
/// Frequency in MHz
pub type MHz = f64;
/// Dispersion measure in pc cm⁻³
pub type DispersionMeasure = f64;

// -------------------------------------------------------------------------------------------------
// Source names
// -------------------------------------------------------------------------------------------------

/// Longest source name accepted by the GBT catalog format
pub const MAX_SOURCE_NAME_LEN: usize = 32;

/// Characters that break catalog parsing or shell-safe file names
pub const INVALID_NAME_CHARS: &[char] = &[
    ' ', '#', '/', '\\', '\0', '\'', '"', '!', '$', '&', '(', ')', '*', ';', '<', '>', '?', '[',
    ']', '`', '{', '|', '}', '~', '^',
];

// -------------------------------------------------------------------------------------------------
// VEGAS limits
// -------------------------------------------------------------------------------------------------

/// Sustained output rate a single VEGAS bank can write, in MB/s
pub const MAX_BANK_DATA_RATE_MB_S: f64 = 400.0;

/// Above this incoherent accumulation length the 8-bit output loses resolution
pub const MAX_SAFE_ACCLEN: u32 = 64;
