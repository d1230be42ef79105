mod common;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use hifitime::Duration;
use pulsar_sb::coordinates::Position;
use pulsar_sb::engine::SbEngine;
use pulsar_sb::lookup::{add_source_from_lookup, share, PulsarLookup};
use pulsar_sb::sb_errors::LookupError;

use crate::common::l_band_fold;

/// In-memory stand-in for a pulsar catalog service.
struct Psrcat {
    known: HashMap<String, Position>,
}

impl Psrcat {
    fn new() -> Self {
        let mut known = HashMap::new();
        known.insert(
            "J0437-4715".to_string(),
            Position::j2000(69.316234, -47.252531).unwrap(),
        );
        known.insert(
            "B1937+21".to_string(),
            Position::j2000(294.910671, 21.583092).unwrap(),
        );
        known.insert(
            "J1713+0747".to_string(),
            Position::j2000(258.456388, 7.793748).unwrap(),
        );
        Psrcat { known }
    }
}

impl PulsarLookup for Psrcat {
    fn lookup(&self, name: &str) -> impl Future<Output = Result<Position, LookupError>> + Send {
        let found = self.known.get(name).copied();
        let name = name.to_string();
        async move {
            tokio::task::yield_now().await;
            found.ok_or(LookupError::NotFound(name))
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_lookups_share_one_observation() {
    let engine = SbEngine::gbt().unwrap();
    let shared = share(engine.new_observation(l_band_fold()).unwrap());
    let psrcat = Arc::new(Psrcat::new());
    let scan = Duration::from_seconds(300.0);

    let (a, b, c) = tokio::join!(
        add_source_from_lookup(&shared, psrcat.as_ref(), "J0437-4715", scan),
        add_source_from_lookup(&shared, psrcat.as_ref(), "B1937+21", scan),
        add_source_from_lookup(&shared, psrcat.as_ref(), "1713+0747", scan),
    );
    a.unwrap();
    b.unwrap();
    c.unwrap();

    let mut model = shared.lock();
    assert_eq!(model.len(), 3);
    for name in ["J0437-4715", "B1937+21", "1713+0747"] {
        model.set_ephemeris(name, Some("timing.par")).unwrap();
    }
    let doc = engine.resolve_and_render(&mut model).unwrap();
    assert_eq!(doc.science_scans().count(), 3);
}

#[tokio::test]
async fn unknown_pulsar_is_reported() {
    let engine = SbEngine::gbt().unwrap();
    let shared = share(engine.new_observation(l_band_fold()).unwrap());

    let err = add_source_from_lookup(
        &shared,
        &Psrcat::new(),
        "J2222-0137",
        Duration::from_seconds(300.0),
    )
    .await
    .unwrap_err();
    assert_eq!(err.to_string(), "Source \"J2222-0137\" not found in the pulsar catalog");
    assert!(shared.lock().is_empty());
}
