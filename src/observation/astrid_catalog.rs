//! Reader for GBT/Astrid source catalog files.
//!
//! ```text
//! # Timing targets
//! format = spherical
//! coordmode = J2000
//! HEAD = NAME    RA           DEC           VELOCITY
//! J0437-4715     04:37:15.9   -47:15:09.1   0.0
//! B1937+21       19:39:38.56  +21:34:59.1   0.0
//! ```
//!
//! `key = value` lines before `HEAD` are header directives; only `coordmode` is interpreted.
//! `HEAD` names the columns (case-insensitive). `NAME` is required together with either `RA`
//! and `DEC` (in the `coordmode` frame) or `GLON` and `GLAT` (always galactic). Every line
//! after `HEAD` is a data row; rows with fewer fields than columns are skipped.
use log::{debug, warn};

use crate::coordinates::{normalize, Position};
use crate::ref_system::Frame;
use crate::sb_errors::CatalogImportError;

/// A source read from a catalog file. Catalogs carry no scan length.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub name: String,
    /// Canonical J2000 position.
    pub position: Position,
    /// Frame the catalog gives the position in.
    pub frame: Frame,
}

struct Columns {
    count: usize,
    name: usize,
    coord1: usize,
    coord2: usize,
    galactic: bool,
}

fn find_column(names: &[String], wanted: &str) -> Option<usize> {
    names.iter().position(|name| name == wanted)
}

impl Columns {
    fn from_head(value: &str) -> Result<Self, CatalogImportError> {
        let names: Vec<String> = value.split_whitespace().map(str::to_ascii_uppercase).collect();

        let coords = match (
            find_column(&names, "GLON"),
            find_column(&names, "GLAT"),
            find_column(&names, "RA"),
            find_column(&names, "DEC"),
        ) {
            (Some(glon), Some(glat), _, _) => (glon, glat, true),
            (_, _, Some(ra), Some(dec)) => (ra, dec, false),
            _ => return Err(CatalogImportError::MissingCoordinateColumns),
        };
        let name = find_column(&names, "NAME").ok_or(CatalogImportError::MissingNameColumn)?;

        Ok(Columns {
            count: names.len(),
            name,
            coord1: coords.0,
            coord2: coords.1,
            galactic: coords.2,
        })
    }
}

/// Parse the text of an Astrid catalog file.
///
/// Arguments
/// ---------
/// * `text`: the catalog file content
///
/// Return
/// ------
/// * The entries in file order with normalized positions, or the first
///   [`CatalogImportError`]. Line numbers in errors are 1-based.
pub fn parse_catalog(text: &str) -> Result<Vec<CatalogEntry>, CatalogImportError> {
    let mut frame = Frame::J2000;
    let mut columns: Option<Columns> = None;
    let mut entries = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if columns.is_none() {
            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim().to_ascii_lowercase();
                let value = value.trim();
                match key.as_str() {
                    "coordmode" => {
                        frame = value.parse().map_err(|_| CatalogImportError::UnknownCoordMode {
                            line: line_no,
                            value: value.to_string(),
                        })?;
                    }
                    "head" => columns = Some(Columns::from_head(value)?),
                    _ => debug!("catalog line {line_no}: ignoring directive {key}"),
                }
            }
            continue;
        }
        let Some(cols) = columns.as_ref() else {
            continue;
        };

        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < cols.count {
            warn!(
                "catalog line {line_no}: expected {} fields, found {}; row skipped",
                cols.count,
                fields.len()
            );
            continue;
        }

        let row_frame = if cols.galactic { Frame::Galactic } else { frame };
        let name = fields[cols.name].to_string();
        let position = normalize(fields[cols.coord1], fields[cols.coord2], row_frame).map_err(
            |source| CatalogImportError::Coordinate {
                line: line_no,
                name: name.clone(),
                source,
            },
        )?;

        entries.push(CatalogEntry {
            name,
            position,
            frame: row_frame,
        });
    }

    if columns.is_none() {
        return Err(CatalogImportError::MissingHead);
    }
    debug!("imported {} catalog entries", entries.len());
    Ok(entries)
}
