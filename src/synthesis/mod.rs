//! # Scheduling block synthesis
//!
//! The [`Synthesizer`] turns a resolved observation into an Astrid scheduling block. Rendering
//! is a pure function of the effective configuration, the calibration plan and the backend
//! parameters: identical inputs produce byte-identical text.
//!
//! ## Layout
//!
//! ```text
//! # header comments (optional)
//! Catalog("""…sources in addition order, then planned calibrators…""")
//!
//! config_<band>_<mode> = """…"""          ┐
//! config_<band>_<mode>_cal = """…"""      │ per distinct (band, mode) pair,
//! polarization calibration scan           │ in first-use order
//! flux calibration scan                   │
//! science scans, in addition order        ┘
//! ```
//!
//! The synthesizer never repairs its input. A pair without backend parameters, a band missing
//! from the table, a plan that does not cover each pair in use exactly once, or any model the
//! resolver would reject is a [`SynthesisError`] and no document is produced.
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use itertools::Itertools;
use log::{error, info};

use crate::backend_params::BackendParameters;
use crate::bands::{Band, BandMode, BandTable};
use crate::config::EngineConfig;
use crate::constants::{Degree, DispersionMeasure};
use crate::observation::{EffectiveConfiguration, EffectiveSource};
use crate::resolver::{check_effective, CalibrationPlan, Resolution};
use crate::sb_errors::SynthesisError;

/// One row of the catalog stanza.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRow {
    pub name: String,
    pub ra: String,
    pub dec: String,
}

/// A unit of the rendered script.
#[derive(Debug, Clone, PartialEq)]
pub enum Stanza {
    /// `#` comment lines.
    Comment(Vec<String>),
    /// The `Catalog("""…""")` call defining every position used by the script.
    Catalog(Vec<CatalogRow>),
    /// A configuration string, optionally extending another one.
    ConfigBlock {
        name: String,
        base: Option<String>,
        lines: Vec<String>,
    },
    /// Noise-diode scan on the first source of a configuration.
    PolCalScan {
        pair: BandMode,
        source: String,
        config: String,
        extra: Vec<String>,
        duration_s: f64,
    },
    /// On/off scan of a flux calibrator.
    FluxCalScan {
        pair: BandMode,
        calibrator: String,
        config: String,
        extra: Vec<String>,
        offset_deg: Degree,
        duration_s: f64,
    },
    /// Science scan of one source.
    ScienceScan {
        pair: BandMode,
        source: String,
        config: String,
        extra: Vec<String>,
        duration_s: f64,
    },
}

fn configure_line(config: &str, extra: &[String]) -> Vec<String> {
    if extra.is_empty() {
        return vec![format!("Configure({config})")];
    }
    let mut lines = vec![format!("Configure({config} + \"\"\"")];
    lines.extend(extra.iter().cloned());
    lines.push("\"\"\")".to_string());
    lines
}

impl Stanza {
    /// Script lines of the stanza, without trailing newlines.
    pub fn lines(&self) -> Vec<String> {
        match self {
            Stanza::Comment(lines) => lines
                .iter()
                .map(|line| {
                    if line.is_empty() {
                        "#".to_string()
                    } else {
                        format!("# {line}")
                    }
                })
                .collect(),
            Stanza::Catalog(rows) => {
                let width = rows.iter().map(|row| row.name.len()).max().unwrap_or(0);
                let mut lines = vec![
                    "Catalog(\"\"\"".to_string(),
                    "format = spherical".to_string(),
                    "coordmode = J2000".to_string(),
                    "HEAD = NAME RA DEC".to_string(),
                ];
                lines.extend(
                    rows.iter()
                        .map(|row| format!("{:<width$}  {}  {}", row.name, row.ra, row.dec)),
                );
                lines.push("\"\"\")".to_string());
                lines
            }
            Stanza::ConfigBlock { name, base, lines } => {
                let mut out = match base {
                    Some(base) => vec![format!("{name} = {base} + \"\"\"")],
                    None => vec![format!("{name} = \"\"\"")],
                };
                out.extend(lines.iter().cloned());
                out.push("\"\"\"".to_string());
                out
            }
            Stanza::PolCalScan {
                pair,
                source,
                config,
                extra,
                duration_s,
            } => {
                let mut lines = vec![format!("# Polarization calibration for {pair}")];
                lines.extend(configure_line(config, extra));
                lines.push(format!("Slew(\"{source}\")"));
                lines.push("Balance()".to_string());
                lines.push(format!("Track(\"{source}\", None, {duration_s:.1})"));
                lines
            }
            Stanza::FluxCalScan {
                pair,
                calibrator,
                config,
                extra,
                offset_deg,
                duration_s,
            } => {
                let mut lines = vec![format!("# Flux calibration for {pair}")];
                lines.extend(configure_line(config, extra));
                lines.push(format!("Slew(\"{calibrator}\")"));
                lines.push("Balance()".to_string());
                lines.push(format!(
                    "OnOff(\"{calibrator}\", Offset(\"J2000\", 0.0, {offset_deg:.4}, cosv=True), {duration_s:.1})"
                ));
                lines
            }
            Stanza::ScienceScan {
                pair,
                source,
                config,
                extra,
                duration_s,
            } => {
                let mut lines = vec![format!("# {source}: {pair}")];
                lines.extend(configure_line(config, extra));
                lines.push(format!("Slew(\"{source}\")"));
                lines.push("Balance()".to_string());
                lines.push(format!("Track(\"{source}\", None, {duration_s:.1})"));
                lines
            }
        }
    }
}

/// A rendered scheduling block.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScheduleDocument {
    stanzas: Vec<Stanza>,
}

impl ScheduleDocument {
    pub fn stanzas(&self) -> &[Stanza] {
        &self.stanzas
    }

    /// Script lines; stanzas are separated by one empty line.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for (idx, stanza) in self.stanzas.iter().enumerate() {
            if idx > 0 {
                lines.push(String::new());
            }
            lines.extend(stanza.lines());
        }
        lines
    }

    /// The script text, newline terminated.
    pub fn text(&self) -> String {
        let mut text = self.lines().join("\n");
        text.push('\n');
        text
    }

    pub fn flux_cal_scans(&self) -> impl Iterator<Item = &Stanza> {
        self.stanzas
            .iter()
            .filter(|s| matches!(s, Stanza::FluxCalScan { .. }))
    }

    pub fn science_scans(&self) -> impl Iterator<Item = &Stanza> {
        self.stanzas
            .iter()
            .filter(|s| matches!(s, Stanza::ScienceScan { .. }))
    }
}

fn format_freqs(freqs: &[f64]) -> String {
    match freqs {
        [single] => format!("{single:.1}"),
        many => format!("[{}]", many.iter().map(|f| format!("{f:.1}")).join(", ")),
    }
}

/// Astrid configuration lines of a pair.
fn config_lines(band: &Band, pair: &BandMode, params: &BackendParameters) -> Vec<String> {
    let mut lines = vec![
        format!("receiver = '{}'", band.receiver()),
        "obstype = 'Pulsar'".to_string(),
        "backend = 'VEGAS'".to_string(),
        format!("restfreq = {}", format_freqs(&params.center_freqs)),
        format!("dopplertrackfreq = {:.1}", params.center_freqs.first().copied().unwrap_or_default()),
        format!("bandwidth = {}", band.bandwidth_mhz()),
        "swmode = 'tp_nocal'".to_string(),
        "noisecal = 'off'".to_string(),
        format!("vegas.obsmode = '{}'", pair.mode.vegas_obsmode()),
        format!("vegas.numchan = {}", params.numchan),
        format!("vegas.outbits = {}", params.outbits),
        format!("vegas.scale = {}", params.scale),
        format!("vegas.polnmode = '{}'", params.polnmode.as_str().to_ascii_lowercase()),
        format!("vegas.tint = {:e}", params.tint),
    ];
    if pair.mode.is_fold() {
        lines.push(format!("vegas.fold_bins = {}", params.fold_bins));
        lines.push(format!("vegas.fold_dumptime = {}", params.fold_dumptime));
    }
    lines
}

/// Lines switching a pair's configuration to noise-diode calibration.
///
/// Calibration scans fold the noise diode with the pair's own fold settings.
fn cal_config_lines(pair: &BandMode, params: &BackendParameters) -> Vec<String> {
    let obsmode = if pair.mode.coherent { "coherent_cal" } else { "cal" };
    vec![
        "swmode = 'tp'".to_string(),
        "noisecal = 'lo'".to_string(),
        format!("vegas.obsmode = '{obsmode}'"),
        format!("vegas.fold_bins = {}", params.fold_bins),
        format!("vegas.fold_dumptime = {}", params.fold_dumptime),
    ]
}

fn dm_line(dm: Option<DispersionMeasure>) -> Option<String> {
    dm.map(|dm| format!("vegas.dm = {dm}"))
}

fn science_extra(source: &EffectiveSource) -> Vec<String> {
    let mut extra = Vec::new();
    if source.band_mode.mode.is_fold() {
        if let Some(parfile) = &source.ephemeris {
            extra.push(format!("vegas.fold_parfile = '{parfile}'"));
        }
    }
    extra.extend(dm_line(source.dispersion_measure));
    extra
}

/// Renders resolved observations to Astrid scheduling blocks.
#[derive(Debug, Clone)]
pub struct Synthesizer {
    bands: Arc<BandTable>,
    config: EngineConfig,
}

impl Synthesizer {
    pub fn new(bands: Arc<BandTable>, config: EngineConfig) -> Self {
        Synthesizer { bands, config }
    }

    /// Render the output of [`Resolver::resolve`](crate::resolver::Resolver::resolve).
    pub fn render_resolution(&self, resolution: &Resolution) -> Result<ScheduleDocument, SynthesisError> {
        self.render(&resolution.effective, &resolution.plan, &resolution.params)
    }

    /// Render a scheduling block.
    ///
    /// Arguments
    /// ---------
    /// * `effective`: the sources with their effective pairs
    /// * `plan`: the calibration plan; its flux scans must cover exactly the pairs in use, or be
    ///   empty when flux calibration is off
    /// * `params`: backend parameters, one set per pair in use
    ///
    /// Return
    /// ------
    /// * The document, or the first inconsistency found as a [`SynthesisError`]
    pub fn render(
        &self,
        effective: &EffectiveConfiguration,
        plan: &CalibrationPlan,
        params: &BTreeMap<BandMode, BackendParameters>,
    ) -> Result<ScheduleDocument, SynthesisError> {
        self.check(effective, plan, params).inspect_err(|err| {
            error!("refusing to render an unresolved observation: {err}");
        })?;

        let mut stanzas = Vec::new();
        if self.config.header_comments {
            stanzas.push(self.header(effective, plan));
        }
        stanzas.push(self.catalog(effective, plan));

        for pair in effective.pairs() {
            let band = self
                .bands
                .get(&pair.band)
                .ok_or_else(|| SynthesisError::UnknownBand(pair.band.clone()))?;
            let pair_params = params
                .get(pair)
                .ok_or_else(|| SynthesisError::MissingBackendParameters(pair.to_string()))?;
            let config_name = pair.config_name();
            let cal_name = format!("{config_name}_cal");
            let flux_scan = plan.flux_scan_for(pair);
            let mut sources = effective.sources_for(pair).peekable();

            stanzas.push(Stanza::ConfigBlock {
                name: config_name.clone(),
                base: None,
                lines: config_lines(band, pair, pair_params),
            });

            if plan.polarization() || flux_scan.is_some() {
                stanzas.push(Stanza::ConfigBlock {
                    name: cal_name.clone(),
                    base: Some(config_name.clone()),
                    lines: cal_config_lines(pair, pair_params),
                });
            }

            let anchor = sources.peek().copied();
            let cal_extra: Vec<String> = if pair.mode.coherent {
                anchor.and_then(|src| dm_line(src.dispersion_measure)).into_iter().collect()
            } else {
                Vec::new()
            };

            if plan.polarization() {
                if let Some(anchor) = anchor {
                    stanzas.push(Stanza::PolCalScan {
                        pair: pair.clone(),
                        source: anchor.name.clone(),
                        config: cal_name.clone(),
                        extra: cal_extra.clone(),
                        duration_s: self.config.pol_cal_scan_s,
                    });
                }
            }

            if let Some(scan) = flux_scan {
                stanzas.push(Stanza::FluxCalScan {
                    pair: pair.clone(),
                    calibrator: scan.calibrator.name().to_string(),
                    config: cal_name.clone(),
                    extra: cal_extra.clone(),
                    offset_deg: self.config.flux_cal_offset_deg,
                    duration_s: self.config.flux_cal_scan_s,
                });
            }

            for source in sources {
                stanzas.push(Stanza::ScienceScan {
                    pair: pair.clone(),
                    source: source.name.clone(),
                    config: config_name.clone(),
                    extra: science_extra(source),
                    duration_s: source.scan_length.to_seconds(),
                });
            }
        }

        info!(
            "rendered scheduling block: {} source(s), {} configuration(s), {} stanza(s)",
            effective.sources().len(),
            effective.pairs().len(),
            stanzas.len()
        );
        Ok(ScheduleDocument { stanzas })
    }

    fn check(
        &self,
        effective: &EffectiveConfiguration,
        plan: &CalibrationPlan,
        params: &BTreeMap<BandMode, BackendParameters>,
    ) -> Result<(), SynthesisError> {
        if effective.is_empty() {
            return Err(SynthesisError::NoSources);
        }
        for pair in effective.pairs() {
            if self.bands.get(&pair.band).is_none() {
                return Err(SynthesisError::UnknownBand(pair.band.clone()));
            }
            if !params.contains_key(pair) {
                return Err(SynthesisError::MissingBackendParameters(pair.to_string()));
            }
        }
        check_effective(effective, &self.bands, params)?;

        if let Some(scan) = plan
            .flux_scans()
            .iter()
            .find(|scan| !effective.pairs().contains(&scan.pair))
        {
            return Err(SynthesisError::UnplannedConfiguration(scan.pair.to_string()));
        }
        let scans = plan.flux_scans().len();
        if scans != 0 && scans != effective.pairs().len() {
            return Err(SynthesisError::CalibrationPlanMismatch {
                pairs: effective.pairs().len(),
                scans,
            });
        }
        let mut planned: Vec<&BandMode> = Vec::with_capacity(scans);
        for scan in plan.flux_scans() {
            if planned.contains(&&scan.pair) {
                return Err(SynthesisError::DuplicateFluxCalibration(scan.pair.to_string()));
            }
            planned.push(&scan.pair);
        }
        if let Some(calibrator) = plan
            .calibrators()
            .into_iter()
            .find(|cal| effective.sources().iter().any(|src| src.name == cal.name()))
        {
            return Err(SynthesisError::CalibratorNameClash(calibrator.name().to_string()));
        }
        Ok(())
    }

    fn header(&self, effective: &EffectiveConfiguration, plan: &CalibrationPlan) -> Stanza {
        let on_off = |flag: bool| if flag { "on" } else { "off" };
        let mut lines = vec![
            "Pulsar scheduling block for the GBT VEGAS pulsar backend".to_string(),
            String::new(),
            format!(
                "Sources: {}    Configurations: {}",
                effective.sources().len(),
                effective.pairs().len()
            ),
            format!(
                "Flux calibration: {}    Polarization calibration: {}",
                on_off(!plan.flux_scans().is_empty()),
                on_off(plan.polarization())
            ),
            format!(
                "Science time: {:.1} s",
                effective.total_scan_time().to_seconds()
            ),
        ];

        for pair in effective.pairs() {
            let mut line = String::new();
            if let Some(band) = self.bands.get(&pair.band) {
                let _ = write!(line, "{pair}: {}", band.description());
            }
            lines.push(line);
            if let Some(scan) = plan.flux_scan_for(pair) {
                let freq = self
                    .bands
                    .get(&pair.band)
                    .and_then(|band| band.center_freqs_mhz().first().copied())
                    .unwrap_or_else(|| scan.calibrator.ref_freq_mhz());
                lines.push(format!(
                    "  flux calibrator {} ({:.2} deg from {}, ~{:.1} Jy at {freq:.0} MHz)",
                    scan.calibrator.name(),
                    scan.separation,
                    scan.anchor_source,
                    scan.calibrator.flux_density_at(freq)
                ));
            }
        }
        Stanza::Comment(lines)
    }

    fn catalog(&self, effective: &EffectiveConfiguration, plan: &CalibrationPlan) -> Stanza {
        let mut rows: Vec<CatalogRow> = effective
            .sources()
            .iter()
            .map(|src| {
                let (ra, dec) = src.position.to_sexagesimal();
                CatalogRow {
                    name: src.name.clone(),
                    ra,
                    dec,
                }
            })
            .collect();
        for calibrator in plan.calibrators() {
            if rows.iter().any(|row| row.name == calibrator.name()) {
                continue;
            }
            let (ra, dec) = calibrator.position().to_sexagesimal();
            rows.push(CatalogRow {
                name: calibrator.name().to_string(),
                ra,
                dec,
            });
        }
        Stanza::Catalog(rows)
    }
}
