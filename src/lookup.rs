//! # Pulsar catalog lookup boundary
//!
//! Resolving a pulsar name to a position needs an external catalog (ATNF, a local psrcat
//! database, ...). The engine does not ship one: hosts implement [`PulsarLookup`] and the
//! engine only defines how a lookup result enters an observation.
//!
//! Observations edited from several tasks are shared as a [`SharedObservation`]. The lock is
//! never held across an `.await`: [`add_source_from_lookup`] resolves the position first and then
//! applies a single mutation.
use std::future::Future;
use std::sync::Arc;

use hifitime::Duration;
use log::debug;
use parking_lot::Mutex;

use crate::coordinates::Position;
use crate::observation::{validate_source_name, ObservationModel};
use crate::sb_errors::{LookupError, ModelError, SbError};

/// An observation shared between tasks, with single-writer mutation.
pub type SharedObservation = Arc<Mutex<ObservationModel>>;

/// Wrap an observation for sharing.
pub fn share(model: ObservationModel) -> SharedObservation {
    Arc::new(Mutex::new(model))
}

/// Name resolution against an external pulsar catalog.
pub trait PulsarLookup {
    /// Resolve `name` to a position.
    ///
    /// Implementations return [`LookupError::NotFound`] when the catalog answered but does not
    /// know the name, and [`LookupError::Unavailable`] when the catalog could not be queried.
    fn lookup(&self, name: &str) -> impl Future<Output = Result<Position, LookupError>> + Send;
}

/// Spellings worth trying for a pulsar name, starting with the name itself.
///
/// A leading `PSR ` (any case) is removed when present and added otherwise. Bare numeric names also get
/// their `J` and `B` forms.
///
/// ```rust
/// use pulsar_sb::lookup::lookup_name_variants;
///
/// assert_eq!(
///     lookup_name_variants("0437-4715"),
///     vec!["0437-4715", "PSR 0437-4715", "J0437-4715", "B0437-4715"]
/// );
/// assert_eq!(lookup_name_variants("PSR J1713+0747"), vec!["PSR J1713+0747", "J1713+0747"]);
/// ```
pub fn lookup_name_variants(name: &str) -> Vec<String> {
    let name = name.trim();
    let mut variants = vec![name.to_string()];

    let prefixed = name
        .get(..4)
        .filter(|prefix| prefix.eq_ignore_ascii_case("PSR "))
        .map(|_| &name[4..]);
    let bare = match prefixed {
        Some(stripped) => {
            let stripped = stripped.trim_start();
            variants.push(stripped.to_string());
            stripped
        }
        None => {
            variants.push(format!("PSR {name}"));
            name
        }
    };

    if bare.starts_with(|c: char| c.is_ascii_digit()) {
        variants.push(format!("J{bare}"));
        variants.push(format!("B{bare}"));
    }

    variants.dedup();
    variants
}

/// Resolve `name` through the name variants, stopping at the first hit.
///
/// An [`LookupError::Unavailable`] ends the search immediately.
pub async fn resolve_name<L: PulsarLookup>(lookup: &L, name: &str) -> Result<Position, LookupError> {
    for variant in lookup_name_variants(name) {
        match lookup.lookup(&variant).await {
            Ok(position) => {
                debug!("lookup of {name} resolved as {variant}");
                return Ok(position);
            }
            Err(LookupError::NotFound(_)) => debug!("lookup of {variant} found nothing"),
            Err(err) => return Err(err),
        }
    }
    Err(LookupError::NotFound(name.to_string()))
}

/// Look a pulsar up and append it to a shared observation.
///
/// The source keeps the name given by the operator, whichever variant the catalog matched.
///
/// Arguments
/// ---------
/// * `shared`: the observation to edit
/// * `lookup`: the catalog collaborator
/// * `name`: the source name
/// * `scan_length`: the science scan length
///
/// Return
/// ------
/// * The position added, or the model/lookup error. The observation is unchanged on error.
pub async fn add_source_from_lookup<L: PulsarLookup>(
    shared: &SharedObservation,
    lookup: &L,
    name: &str,
    scan_length: Duration,
) -> Result<Position, SbError> {
    validate_source_name(name)?;
    if shared.lock().source(name).is_some() {
        return Err(ModelError::DuplicateSource(name.to_string()).into());
    }

    let position = resolve_name(lookup, name).await?;

    shared.lock().add_source(name, position, scan_length)?;
    Ok(position)
}

#[cfg(test)]
mod lookup_test {
    use super::*;
    use crate::bands::{BandMode, BandTable, Mode, ObsMode};
    use std::collections::HashMap;

    struct StaticCatalog {
        known: HashMap<&'static str, Position>,
        available: bool,
    }

    impl PulsarLookup for StaticCatalog {
        fn lookup(&self, name: &str) -> impl Future<Output = Result<Position, LookupError>> + Send {
            let result = if !self.available {
                Err(LookupError::Unavailable("psrcat offline".into()))
            } else {
                self.known
                    .get(name)
                    .copied()
                    .ok_or_else(|| LookupError::NotFound(name.to_string()))
            };
            async move { result }
        }
    }

    fn catalog(available: bool) -> StaticCatalog {
        let mut known = HashMap::new();
        known.insert("J0437-4715", Position::j2000(69.3162, -47.2525).unwrap());
        StaticCatalog { known, available }
    }

    fn shared_model() -> SharedObservation {
        let bands = Arc::new(BandTable::gbt().unwrap());
        share(
            ObservationModel::new(bands, BandMode::new("L-band", Mode::new(ObsMode::Fold, false)))
                .unwrap(),
        )
    }

    #[test]
    fn test_name_variants() {
        assert_eq!(lookup_name_variants("B1937+21"), vec!["B1937+21", "PSR B1937+21"]);
        assert_eq!(
            lookup_name_variants("PSR 1937+21"),
            vec!["PSR 1937+21", "1937+21", "J1937+21", "B1937+21"]
        );
        assert_eq!(lookup_name_variants("psr J0437-4715"), vec!["psr J0437-4715", "J0437-4715"]);
        assert_eq!(lookup_name_variants("Psr  0437-4715")[1], "0437-4715");
    }

    #[tokio::test]
    async fn test_add_from_lookup_uses_variants() {
        let shared = shared_model();
        let position = add_source_from_lookup(
            &shared,
            &catalog(true),
            "0437-4715",
            Duration::from_seconds(600.0),
        )
        .await
        .unwrap();

        let model = shared.lock();
        let source = model.source("0437-4715").unwrap();
        assert_eq!(*source.position(), position);
        assert_eq!(source.scan_length(), Duration::from_seconds(600.0));
    }

    #[tokio::test]
    async fn test_lookup_failures_leave_model_unchanged() {
        let shared = shared_model();
        let scan = Duration::from_seconds(600.0);

        assert_eq!(
            add_source_from_lookup(&shared, &catalog(true), "J9999+99", scan).await,
            Err(SbError::Lookup(LookupError::NotFound("J9999+99".into())))
        );
        assert!(matches!(
            add_source_from_lookup(&shared, &catalog(false), "J0437-4715", scan).await,
            Err(SbError::Lookup(LookupError::Unavailable(_)))
        ));
        assert!(matches!(
            add_source_from_lookup(&shared, &catalog(true), "bad name", scan).await,
            Err(SbError::Model(ModelError::InvalidName { .. }))
        ));
        assert!(shared.lock().is_empty());

        add_source_from_lookup(&shared, &catalog(true), "J0437-4715", scan)
            .await
            .unwrap();
        assert_eq!(
            add_source_from_lookup(&shared, &catalog(true), "J0437-4715", scan).await,
            Err(SbError::Model(ModelError::DuplicateSource("J0437-4715".into())))
        );
    }
}
