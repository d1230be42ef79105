use std::fmt;

use thiserror::Error;

/// Malformed or out-of-domain sky position, or an unknown reference frame.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoordinateError {
    #[error("Unknown coordinate frame: {0:?} (expected J2000, B1950 or Galactic)")]
    UnknownFrame(String),

    #[error("Malformed {field}: {value:?} ({reason})")]
    Malformed {
        field: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("{field} out of range: {value} (expected {range})")]
    OutOfRange {
        field: &'static str,
        value: f64,
        range: &'static str,
    },
}

/// Malformed static calibrator catalog or band table. Fatal at startup.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CatalogError {
    #[error("Unable to read catalog file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Catalog line {line}: unreadable record ({reason})")]
    Record { line: u64, reason: String },

    #[error("Catalog line {line}: invalid entry {name:?} ({reason})")]
    InvalidEntry {
        line: u64,
        name: String,
        reason: String,
    },

    #[error("Catalog line {line}: bad position for {name:?}: {source}")]
    Coordinate {
        line: u64,
        name: String,
        source: CoordinateError,
    },

    #[error("Duplicate catalog entry: {0}")]
    DuplicateName(String),

    #[error("Catalog contains no entries")]
    Empty,

    #[error("Invalid band table: {0}")]
    BandTable(String),
}

/// Identifier of the cross-field rule a [`ConstraintError`] violates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Rule {
    AtLeastOneSource,
    BandModeCompatibility,
    CoherentDedispersionDm,
    FoldEphemeris,
    PositiveScanLength,
    BackendParameters,
    FluxCalibratorKnown,
    FluxCalibrationPerPair,
}

impl Rule {
    pub fn id(&self) -> &'static str {
        match self {
            Rule::AtLeastOneSource => "at-least-one-source",
            Rule::BandModeCompatibility => "band-mode-compatibility",
            Rule::CoherentDedispersionDm => "coherent-dedispersion-dm",
            Rule::FoldEphemeris => "fold-ephemeris",
            Rule::PositiveScanLength => "positive-scan-length",
            Rule::BackendParameters => "backend-parameters",
            Rule::FluxCalibratorKnown => "flux-calibrator-known",
            Rule::FluxCalibrationPerPair => "flux-calibration-per-pair",
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Cross-field rule violation found by the resolver.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConstraintError {
    #[error("[{}] at least one source is required", Rule::AtLeastOneSource)]
    NoSources,

    #[error("[{}] band {band:?} is not in the band table", Rule::BandModeCompatibility)]
    UnknownBand { band: String },

    #[error(
        "[{}] {band} does not support {mode} (used by {})",
        Rule::BandModeCompatibility,
        .sources.join(", ")
    )]
    UnsupportedBandMode {
        band: String,
        mode: String,
        sources: Vec<String>,
    },

    #[error(
        "[{}] coherent dedispersion needs a DM (> 0) for: {}",
        Rule::CoherentDedispersionDm,
        .sources.join(", ")
    )]
    MissingDispersionMeasure { sources: Vec<String> },

    #[error(
        "[{}] an ephemeris file is required for per-source Fold configurations: {}",
        Rule::FoldEphemeris,
        .sources.join(", ")
    )]
    MissingEphemeris { sources: Vec<String> },

    #[error("[{}] scan length of {source_name} must be > 0 s (got {seconds})", Rule::PositiveScanLength)]
    NonPositiveScanLength { source_name: String, seconds: f64 },

    #[error("[{}] {pair}: {parameter} = {value} ({reason})", Rule::BackendParameters)]
    InvalidBackendParameter {
        pair: String,
        parameter: &'static str,
        value: String,
        reason: String,
    },

    #[error(
        "[{}] pinned flux calibrator {:?} is not in the catalog",
        Rule::FluxCalibratorKnown,
        .0
    )]
    UnknownFluxCalibrator(String),

    #[error(
        "[{}] {scans} flux calibration scan(s) planned for {pairs} configuration(s)",
        Rule::FluxCalibrationPerPair
    )]
    FluxCalibrationMismatch { pairs: usize, scans: usize },
}

impl ConstraintError {
    /// The rule this error violates.
    pub fn rule(&self) -> Rule {
        match self {
            ConstraintError::NoSources => Rule::AtLeastOneSource,
            ConstraintError::UnknownBand { .. } | ConstraintError::UnsupportedBandMode { .. } => {
                Rule::BandModeCompatibility
            }
            ConstraintError::MissingDispersionMeasure { .. } => Rule::CoherentDedispersionDm,
            ConstraintError::MissingEphemeris { .. } => Rule::FoldEphemeris,
            ConstraintError::NonPositiveScanLength { .. } => Rule::PositiveScanLength,
            ConstraintError::InvalidBackendParameter { .. } => Rule::BackendParameters,
            ConstraintError::UnknownFluxCalibrator(_) => Rule::FluxCalibratorKnown,
            ConstraintError::FluxCalibrationMismatch { .. } => Rule::FluxCalibrationPerPair,
        }
    }
}

/// Rejected mutation of the observation model. The model is left unchanged.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Unknown source: {0}")]
    UnknownSource(String),

    #[error("A source named {0:?} already exists")]
    DuplicateSource(String),

    #[error("Invalid source name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Scan length of {source_name} must be > 0 s (got {seconds})")]
    NonPositiveScanLength { source_name: String, seconds: f64 },

    #[error("Dispersion measure of {source_name} must be > 0 (got {value})")]
    InvalidDispersionMeasure { source_name: String, value: f64 },

    #[error("Unknown frequency band: {0}")]
    UnknownBand(String),

    #[error("Unknown backend parameter: {0}")]
    UnknownParameter(String),

    #[error("Invalid value {value:?} for {parameter}: {reason}")]
    InvalidParameterValue {
        parameter: String,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Coordinate(#[from] CoordinateError),
}

/// Failure while importing an Astrid catalog file.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CatalogImportError {
    #[error("Catalog has no HEAD line")]
    MissingHead,

    #[error("Catalog HEAD line must contain a NAME column")]
    MissingNameColumn,

    #[error("Catalog HEAD line must contain coordinate columns (RA/DEC or GLON/GLAT)")]
    MissingCoordinateColumns,

    #[error("Catalog line {line}: unknown coordmode {value:?}")]
    UnknownCoordMode { line: usize, value: String },

    #[error("Catalog line {line}: bad position for {name:?}: {source}")]
    Coordinate {
        line: usize,
        name: String,
        source: CoordinateError,
    },
}

/// Render attempted on a model that was not resolved. Indicates a caller bug.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SynthesisError {
    #[error("Nothing to render: the observation has no sources")]
    NoSources,

    #[error("No backend parameters for configuration {0}")]
    MissingBackendParameters(String),

    #[error("Band {0:?} is not in the band table")]
    UnknownBand(String),

    #[error("Flux calibration planned for {scans} configuration(s) but {pairs} are in use")]
    CalibrationPlanMismatch { pairs: usize, scans: usize },

    #[error("Calibration scan planned for configuration {0} which no source uses")]
    UnplannedConfiguration(String),

    #[error("Flux calibration planned more than once for configuration {0}")]
    DuplicateFluxCalibration(String),

    #[error("Flux calibrator {0} has the same name as a science source")]
    CalibratorNameClash(String),

    #[error("Observation breaks a resolver rule: {0}")]
    Rule(#[from] ConstraintError),
}

/// Invalid engine configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Unable to read configuration file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Malformed configuration: {0}")]
    Toml(String),

    #[error("Invalid configuration value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Failure reported by the external pulsar catalog lookup collaborator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LookupError {
    #[error("Source {0:?} not found in the pulsar catalog")]
    NotFound(String),

    #[error("Pulsar catalog unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Coordinate(#[from] CoordinateError),
}

/// Umbrella error for the engine façade.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SbError {
    #[error(transparent)]
    Coordinate(#[from] CoordinateError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Constraint(#[from] ConstraintError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    CatalogImport(#[from] CatalogImportError),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Lookup(#[from] LookupError),
}
