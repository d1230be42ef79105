//! Sexagesimal parsing and formatting.
//!
//! Equatorial positions are entered as `HH:MM:SS.ss` / `±DD:MM:SS.ss` strings (colons or
//! whitespace between fields, seconds optional), galactic positions as decimal degrees.
//! The formatters are the inverse used when writing catalog stanzas; they round on the
//! last printed digit and carry into minutes, hours and degrees.
use once_cell::sync::Lazy;
use regex::Regex;

use crate::constants::{Degree, HOUR2DEG};
use crate::sb_errors::CoordinateError;

static SEXAGESIMAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([+-]?)(\d{1,2})(?:\s*:\s*|\s+)(\d{1,2})(?:(?:\s*:\s*|\s+)(\d{1,2}(?:\.\d*)?))?$")
        .expect("sexagesimal pattern is valid")
});

/// Split a sexagesimal string into its sign and unsigned value in the leading unit.
///
/// Arguments
/// ---------
/// * `text`: the trimmed input, e.g. `"-47:15:09.11"` or `"04 37 15.9"`
/// * `field`: name of the field, used in error messages
///
/// Return
/// ------
/// * `(sign, value)` where `sign` is the explicit `+`/`-` prefix if any and `value` is
///   expressed in the unit of the first field
fn parse_sexagesimal(
    text: &str,
    field: &'static str,
) -> Result<(Option<char>, f64), CoordinateError> {
    let malformed = |reason| CoordinateError::Malformed {
        field,
        value: text.to_string(),
        reason,
    };

    let caps = SEXAGESIMAL
        .captures(text.trim())
        .ok_or_else(|| malformed("expected [±]DD:MM[:SS.ss]"))?;

    let sign = caps[1].chars().next();
    let lead: f64 = caps[2].parse().map_err(|_| malformed("bad leading field"))?;
    let minutes: f64 = caps[3].parse().map_err(|_| malformed("bad minutes"))?;
    let seconds: f64 = match caps.get(4) {
        Some(s) => s.as_str().parse().map_err(|_| malformed("bad seconds"))?,
        None => 0.0,
    };

    if minutes >= 60.0 {
        return Err(malformed("minutes must be below 60"));
    }
    if seconds >= 60.0 {
        return Err(malformed("seconds must be below 60"));
    }

    Ok((sign, lead + minutes / 60.0 + seconds / 3600.0))
}

/// Parse a right ascension string to degrees.
///
/// Arguments
/// ---------
/// * `ra`: right ascension as `HH:MM[:SS.ss]`, hours in `[0, 24)`
///
/// Return
/// ------
/// * The right ascension in degrees, in `[0, 360)`
pub fn parse_ra_to_deg(ra: &str) -> Result<Degree, CoordinateError> {
    let (sign, hours) = parse_sexagesimal(ra, "right ascension")?;
    if sign.is_some() {
        return Err(CoordinateError::Malformed {
            field: "right ascension",
            value: ra.to_string(),
            reason: "right ascension cannot be signed",
        });
    }
    if !(0.0..24.0).contains(&hours) {
        return Err(CoordinateError::OutOfRange {
            field: "right ascension",
            value: hours,
            range: "00:00:00 to 23:59:59.99 hours",
        });
    }
    Ok(hours * HOUR2DEG)
}

/// Parse a declination string to degrees.
///
/// Arguments
/// ---------
/// * `dec`: declination as `±DD:MM[:SS.ss]`
///
/// Return
/// ------
/// * The declination in degrees, in `[-90, 90]`
pub fn parse_dec_to_deg(dec: &str) -> Result<Degree, CoordinateError> {
    let (sign, degrees) = parse_sexagesimal(dec, "declination")?;
    let negative = sign == Some('-');
    if degrees > 90.0 {
        return Err(CoordinateError::OutOfRange {
            field: "declination",
            value: if negative { -degrees } else { degrees },
            range: "-90:00:00 to +90:00:00",
        });
    }
    Ok(if negative { -degrees } else { degrees })
}

/// Parse a decimal-degree value and check it against an inclusive range.
pub fn parse_degrees(
    text: &str,
    field: &'static str,
    min: Degree,
    max: Degree,
    range: &'static str,
) -> Result<Degree, CoordinateError> {
    let value: f64 = text
        .trim()
        .parse()
        .map_err(|_| CoordinateError::Malformed {
            field,
            value: text.to_string(),
            reason: "expected a number in degrees",
        })?;
    if !value.is_finite() || value < min || value > max {
        return Err(CoordinateError::OutOfRange {
            field,
            value,
            range,
        });
    }
    Ok(value)
}

/// Round `value` (in the leading unit) to `precision` decimals of seconds and split it.
///
/// Return
/// ------
/// * `(lead, minutes, seconds, fraction)` with the fraction as an integer of `precision` digits
fn split_sexagesimal(value: f64, precision: usize, wrap: Option<u64>) -> (u64, u64, u64, u64) {
    let scale = 10u64.pow(precision as u32);
    let mut total = (value.abs() * 3600.0 * scale as f64).round() as u64;
    if let Some(lead_modulus) = wrap {
        total %= lead_modulus * 3600 * scale;
    }
    let frac = total % scale;
    let secs = total / scale;
    (secs / 3600, (secs / 60) % 60, secs % 60, frac)
}

fn join_fields(lead: u64, minutes: u64, seconds: u64, frac: u64, precision: usize) -> String {
    if precision == 0 {
        format!("{lead:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{lead:02}:{minutes:02}:{seconds:02}.{frac:0precision$}")
    }
}

/// Format a right ascension in degrees as `HH:MM:SS.s…` with `precision` decimals.
pub fn format_ra_hms(ra: Degree, precision: usize) -> String {
    let hours = ra.rem_euclid(360.0) / HOUR2DEG;
    let (h, m, s, frac) = split_sexagesimal(hours, precision, Some(24));
    join_fields(h, m, s, frac, precision)
}

/// Format a declination in degrees as `±DD:MM:SS.s…` with `precision` decimals.
pub fn format_dec_dms(dec: Degree, precision: usize) -> String {
    let (d, m, s, frac) = split_sexagesimal(dec, precision, None);
    let sign = if dec < 0.0 && (d, m, s, frac) != (0, 0, 0, 0) {
        '-'
    } else {
        '+'
    };
    format!("{sign}{}", join_fields(d, m, s, frac, precision))
}

#[cfg(test)]
mod conversion_test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_ra_to_deg() {
        assert_relative_eq!(parse_ra_to_deg("22:52:23.37").unwrap(), 343.097375, epsilon = 1e-9);
        assert_relative_eq!(parse_ra_to_deg("04 41 04.77").unwrap(), 70.269875, epsilon = 1e-9);
        assert_relative_eq!(parse_ra_to_deg("17:13").unwrap(), 258.25, epsilon = 1e-9);
        assert!(parse_ra_to_deg("1:2:3.4.5").is_err());
        assert!(parse_ra_to_deg("17").is_err());
        assert!(parse_ra_to_deg("+17:13:49").is_err());
        assert!(matches!(
            parse_ra_to_deg("24:00:00"),
            Err(CoordinateError::OutOfRange { .. })
        ));
        assert!(matches!(
            parse_ra_to_deg("12:60:00"),
            Err(CoordinateError::Malformed { .. })
        ));
    }

    #[test]
    fn test_dec_to_deg() {
        assert_relative_eq!(
            parse_dec_to_deg("-00:30:14.2").unwrap(),
            -0.5039444444444444,
            epsilon = 1e-12
        );
        assert_relative_eq!(
            parse_dec_to_deg("+13 55 42.7").unwrap(),
            13.928527777777777,
            epsilon = 1e-12
        );
        assert_relative_eq!(parse_dec_to_deg("-47:15").unwrap(), -47.25, epsilon = 1e-12);
        assert!(parse_dec_to_deg("90:00:00").is_ok());
        assert!(matches!(
            parse_dec_to_deg("-90:00:01"),
            Err(CoordinateError::OutOfRange { .. })
        ));
        assert!(parse_dec_to_deg("north").is_err());
    }

    #[test]
    fn test_parse_degrees() {
        assert_eq!(parse_degrees(" 57.5 ", "l", 0.0, 360.0, "0..360").unwrap(), 57.5);
        assert!(parse_degrees("361", "l", 0.0, 360.0, "0..360").is_err());
        assert!(parse_degrees("NaN", "l", 0.0, 360.0, "0..360").is_err());
        assert!(parse_degrees("abc", "l", 0.0, 360.0, "0..360").is_err());
    }

    #[test]
    fn test_format_with_carry() {
        assert_eq!(format_ra_hms(69.25, 2), "04:37:00.00");
        assert_eq!(format_dec_dms(-47.25, 1), "-47:15:00.0");
        // 23:59:59.9999 rounds to the next day
        assert_eq!(format_ra_hms(359.99999958, 2), "00:00:00.00");
        // 59.99999 arcsec carries into minutes
        assert_eq!(format_dec_dms(10.0 + 59.0 / 60.0 + 59.99999 / 3600.0, 2), "+11:00:00.00");
        assert_eq!(format_dec_dms(-0.0000001, 2), "+00:00:00.00");
        assert_eq!(format_ra_hms(258.25, 0), "17:13:00");
    }

    #[test]
    fn test_parse_format_inverse() {
        let ra = parse_ra_to_deg("17:13:49.5331").unwrap();
        assert_eq!(format_ra_hms(ra, 4), "17:13:49.5331");
        let dec = parse_dec_to_deg("+07:47:37.492").unwrap();
        assert_eq!(format_dec_dms(dec, 3), "+07:47:37.492");
    }
}
