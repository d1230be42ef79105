use approx::assert_relative_eq;
use hifitime::Duration;
use proptest::prelude::*;
use pulsar_sb::bands::{BandMode, Mode, ObsMode};
use pulsar_sb::constants::DEG2ARC;
use pulsar_sb::coordinates::{angular_separation, normalize, Position};
use pulsar_sb::engine::SbEngine;
use pulsar_sb::ref_system::Frame;
use pulsar_sb::synthesis::Stanza;

const ONE_ARCSEC: f64 = 1.0 / DEG2ARC;

fn frame() -> impl Strategy<Value = Frame> {
    prop_oneof![Just(Frame::J2000), Just(Frame::B1950), Just(Frame::Galactic)]
}

fn position() -> impl Strategy<Value = Position> {
    (frame(), 0.0..360.0f64, -90.0..=90.0f64)
        .prop_map(|(frame, lon, lat)| Position::new(frame, lon, lat).unwrap())
}

proptest! {
    #[test]
    fn frame_round_trip_within_one_arcsec(p in position(), target in frame()) {
        let back = p.to_frame(target).to_frame(p.frame());
        prop_assert!(angular_separation(&p, &back) < ONE_ARCSEC);
    }

    #[test]
    fn canonical_form_is_j2000(p in position()) {
        let c = p.canonical();
        prop_assert_eq!(c.frame(), Frame::J2000);
        prop_assert!((0.0..360.0).contains(&c.lon()));
        prop_assert!((-90.0..=90.0).contains(&c.lat()));
    }

    #[test]
    fn separation_to_self_is_zero(p in position()) {
        prop_assert_eq!(angular_separation(&p, &p), 0.0);
    }

    #[test]
    fn separation_is_symmetric_and_bounded(a in position(), b in position()) {
        let ab = angular_separation(&a, &b);
        prop_assert_eq!(ab, angular_separation(&b, &a));
        prop_assert!((0.0..=180.0).contains(&ab));
    }
}

#[test]
fn galactic_reference_points() {
    let centre = normalize("0", "0", Frame::Galactic).unwrap();
    assert_relative_eq!(centre.lon(), 266.40499, epsilon = 1e-3);
    assert_relative_eq!(centre.lat(), -28.93617, epsilon = 1e-3);

    let pole = normalize("0", "90", Frame::Galactic).unwrap();
    assert_relative_eq!(pole.lon(), 192.85948, epsilon = 1e-3);
    assert_relative_eq!(pole.lat(), 27.12825, epsilon = 1e-3);

    let j0437 = normalize("04:37:15.8961", "-47:15:09.110", Frame::J2000)
        .unwrap()
        .to_frame(Frame::Galactic);
    assert_eq!(j0437.frame(), Frame::Galactic);
    assert_relative_eq!(j0437.lon(), 253.394, epsilon = 1e-2);
    assert_relative_eq!(j0437.lat(), -41.963, epsilon = 1e-2);
}

#[test]
fn galactic_source_gets_nearest_calibrator_of_its_j2000_position() {
    let engine = SbEngine::gbt().unwrap();
    let mut obs = engine
        .new_observation(BandMode::new("L-band", Mode::new(ObsMode::Search, false)))
        .unwrap();
    obs.add_source_raw(
        "J0437-4715",
        "253.394",
        "-41.963",
        Frame::Galactic,
        Duration::from_seconds(600.0),
    )
    .unwrap();
    obs.set_flux_calibration(true);

    let j2000 = normalize("04:37:15.8961", "-47:15:09.110", Frame::J2000).unwrap();
    let stored = obs.source("J0437-4715").unwrap();
    assert_eq!(stored.entered_frame(), Frame::Galactic);
    assert!(angular_separation(stored.position(), &j2000) < 0.01);

    let doc = engine.resolve_and_render(&mut obs).unwrap();
    let calibrators: Vec<&str> = doc
        .flux_cal_scans()
        .filter_map(|s| match s {
            Stanza::FluxCalScan { calibrator, .. } => Some(calibrator.as_str()),
            _ => None,
        })
        .collect();
    let expected = engine.catalog().nearest(&j2000).name();
    assert_eq!(expected, "3C161");
    assert_eq!(calibrators, vec![expected]);
}
