//! # Receiver bands and observing modes
//!
//! The band table lists the receivers the VEGAS pulsar backend can be fed from, with the
//! bandwidth and centre frequency of each spectral window, and which observing modes each band
//! accepts. It is the band/mode compatibility artifact consulted by the resolver: it is loaded
//! from TOML (the GBT table is embedded in the crate) and injected into the engine, never
//! hard-coded in the rules.
//!
//! ```toml
//! [[band]]
//! label = "L-band"
//! receiver = "Rcvr1_2"
//! bandwidth_mhz = 800.0
//! center_freqs_mhz = [1500.0]
//! modes = ["fold", "search", "coherent_fold", "coherent_search"]
//! ```
//!
//! A [`Mode`] is an acquisition strategy ([`ObsMode::Fold`] or [`ObsMode::Search`]) plus the
//! coherent dedispersion flag; its VEGAS name is one of `fold`, `search`, `coherent_fold` and
//! `coherent_search`. A [`BandMode`] is the `(band, mode)` pair every source resolves to.
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use itertools::Itertools;
use log::debug;
use serde::Deserialize;

use crate::constants::MHz;
use crate::sb_errors::CatalogError;

static GBT_BANDS: &str = include_str!("data/gbt_bands.toml");

/// Pulsar acquisition strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObsMode {
    /// Folded profiles, for timing.
    Fold,
    /// Filterbank data, for surveys and single-pulse work.
    Search,
}

impl fmt::Display for ObsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObsMode::Fold => f.write_str("Fold"),
            ObsMode::Search => f.write_str("Search"),
        }
    }
}

/// Observing mode: acquisition strategy and coherent dedispersion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Mode {
    pub obs_mode: ObsMode,
    pub coherent: bool,
}

impl Mode {
    pub const ALL: [Mode; 4] = [
        Mode::new(ObsMode::Fold, false),
        Mode::new(ObsMode::Search, false),
        Mode::new(ObsMode::Fold, true),
        Mode::new(ObsMode::Search, true),
    ];

    pub const fn new(obs_mode: ObsMode, coherent: bool) -> Self {
        Mode { obs_mode, coherent }
    }

    pub fn is_fold(&self) -> bool {
        self.obs_mode == ObsMode::Fold
    }

    /// Name of the mode for `vegas.obsmode`.
    pub fn vegas_obsmode(&self) -> &'static str {
        match (self.obs_mode, self.coherent) {
            (ObsMode::Fold, false) => "fold",
            (ObsMode::Search, false) => "search",
            (ObsMode::Fold, true) => "coherent_fold",
            (ObsMode::Search, true) => "coherent_search",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.vegas_obsmode())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mode::ALL
            .into_iter()
            .find(|mode| mode.vegas_obsmode().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!("unknown observing mode {s:?} (expected fold, search, coherent_fold or coherent_search)")
            })
    }
}

/// The effective `(band, mode)` pair of a source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BandMode {
    pub band: String,
    pub mode: Mode,
}

impl BandMode {
    pub fn new(band: impl Into<String>, mode: Mode) -> Self {
        BandMode {
            band: band.into(),
            mode,
        }
    }

    /// Python identifier of the configuration block for this pair, e.g. `config_l_band_coherent_fold`.
    pub fn config_name(&self) -> String {
        format!("config_{}_{}", slug(&self.band), self.mode.vegas_obsmode())
    }
}

impl fmt::Display for BandMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.band, self.mode)
    }
}

/// Lowercase label with runs of non-alphanumerics collapsed to `_`.
fn slug(label: &str) -> String {
    label
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| part.to_ascii_lowercase())
        .join("_")
}

#[derive(Debug, Deserialize)]
struct BandTableFile {
    #[serde(default)]
    band: Vec<BandRecord>,
}

#[derive(Debug, Deserialize)]
struct BandRecord {
    label: String,
    receiver: String,
    bandwidth_mhz: f64,
    center_freqs_mhz: Vec<f64>,
    modes: Vec<String>,
}

/// A receiver band.
#[derive(Debug, Clone, PartialEq)]
pub struct Band {
    label: String,
    receiver: String,
    bandwidth_mhz: MHz,
    center_freqs_mhz: Vec<MHz>,
    modes: Vec<Mode>,
}

impl Band {
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Astrid receiver name.
    pub fn receiver(&self) -> &str {
        &self.receiver
    }

    /// Bandwidth of one spectral window.
    pub fn bandwidth_mhz(&self) -> MHz {
        self.bandwidth_mhz
    }

    /// One centre frequency per spectral window.
    pub fn center_freqs_mhz(&self) -> &[MHz] {
        &self.center_freqs_mhz
    }

    pub fn window_count(&self) -> usize {
        self.center_freqs_mhz.len()
    }

    pub fn modes(&self) -> &[Mode] {
        &self.modes
    }

    pub fn supports(&self, mode: Mode) -> bool {
        self.modes.contains(&mode)
    }

    /// One-line summary of the band for operator display.
    pub fn description(&self) -> String {
        if self.center_freqs_mhz.len() > 1 {
            format!(
                "{}  |  {} windows @ {}  |  {} MHz BW each",
                self.receiver,
                self.center_freqs_mhz.len(),
                self.center_freqs_mhz.iter().map(|f| format!("{f} MHz")).join(", "),
                self.bandwidth_mhz
            )
        } else {
            format!(
                "{}  |  {} MHz  |  {} MHz BW",
                self.receiver,
                self.center_freqs_mhz.first().copied().unwrap_or_default(),
                self.bandwidth_mhz
            )
        }
    }

    fn from_record(record: BandRecord) -> Result<Self, CatalogError> {
        let invalid = |reason: String| CatalogError::BandTable(format!("{}: {reason}", record.label));

        if record.label.trim().is_empty() {
            return Err(CatalogError::BandTable("band with an empty label".into()));
        }
        if record.receiver.trim().is_empty() {
            return Err(invalid("empty receiver name".into()));
        }
        if !(record.bandwidth_mhz.is_finite() && record.bandwidth_mhz > 0.0) {
            return Err(invalid(format!("bandwidth must be > 0 MHz, got {}", record.bandwidth_mhz)));
        }
        if record.center_freqs_mhz.is_empty() {
            return Err(invalid("at least one centre frequency is required".into()));
        }
        if let Some(bad) = record
            .center_freqs_mhz
            .iter()
            .find(|f| !(f.is_finite() && **f > 0.0))
        {
            return Err(invalid(format!("centre frequency must be > 0 MHz, got {bad}")));
        }

        let modes = record
            .modes
            .iter()
            .map(|m| m.parse::<Mode>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(&invalid)?
            .into_iter()
            .unique()
            .collect::<Vec<_>>();
        if modes.is_empty() {
            return Err(invalid("at least one observing mode is required".into()));
        }

        Ok(Band {
            label: record.label,
            receiver: record.receiver,
            bandwidth_mhz: record.bandwidth_mhz,
            center_freqs_mhz: record.center_freqs_mhz,
            modes,
        })
    }
}

/// The band table, in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct BandTable {
    bands: Vec<Band>,
}

impl Default for BandTable {
    /// The embedded GBT band table, see [`BandTable::gbt`].
    ///
    /// # Panics
    /// If the embedded table does not parse. It is covered by the unit tests.
    fn default() -> Self {
        match BandTable::gbt() {
            Ok(table) => table,
            Err(err) => panic!("embedded band table is invalid: {err}"),
        }
    }
}

impl BandTable {
    /// Load the band table shipped with the crate.
    pub fn gbt() -> Result<Self, CatalogError> {
        BandTable::from_toml_str(GBT_BANDS)
    }

    /// Parse a band table from TOML text (`[[band]]` array of tables).
    pub fn from_toml_str(text: &str) -> Result<Self, CatalogError> {
        let file: BandTableFile =
            toml::from_str(text).map_err(|err| CatalogError::BandTable(err.to_string()))?;

        let bands = file
            .band
            .into_iter()
            .map(Band::from_record)
            .collect::<Result<Vec<_>, _>>()?;

        if bands.is_empty() {
            return Err(CatalogError::BandTable("no [[band]] entries".into()));
        }
        let mut labels = HashSet::new();
        if let Some(dup) = bands.iter().find(|b| !labels.insert(b.label.as_str())) {
            return Err(CatalogError::DuplicateName(dup.label.clone()));
        }

        debug!("loaded {} receiver bands", bands.len());
        Ok(BandTable { bands })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| CatalogError::Io {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;
        BandTable::from_toml_str(&text)
    }

    pub fn get(&self, label: &str) -> Option<&Band> {
        self.bands.iter().find(|band| band.label == label)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Band> {
        self.bands.iter()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.bands.iter().map(|band| band.label.as_str())
    }

    /// `true` if the band exists and accepts the mode.
    pub fn supports(&self, pair: &BandMode) -> bool {
        self.get(&pair.band).is_some_and(|band| band.supports(pair.mode))
    }

    /// Every compatible `(band, mode)` pair, in table order.
    pub fn pairs(&self) -> impl Iterator<Item = BandMode> + '_ {
        self.bands.iter().flat_map(|band| {
            band.modes
                .iter()
                .map(move |mode| BandMode::new(band.label.clone(), *mode))
        })
    }
}
