#![allow(dead_code)]

use std::sync::Arc;

use hifitime::Duration;
use pulsar_sb::bands::{BandMode, BandTable, Mode, ObsMode};
use pulsar_sb::observation::ObservationModel;
use pulsar_sb::ref_system::Frame;

pub fn gbt_bands() -> Arc<BandTable> {
    Arc::new(BandTable::gbt().unwrap())
}

pub fn l_band_fold() -> BandMode {
    BandMode::new("L-band", Mode::new(ObsMode::Fold, false))
}

/// Observation of J0437-4715 at L-band in incoherent Fold mode, with flux calibration.
pub fn j0437_observation() -> ObservationModel {
    let mut obs = ObservationModel::new(gbt_bands(), l_band_fold()).unwrap();
    obs.add_source_raw(
        "J0437-4715",
        "04:37:15.8961",
        "-47:15:09.110",
        Frame::J2000,
        Duration::from_seconds(600.0),
    )
    .unwrap();
    obs.set_ephemeris("J0437-4715", Some("J0437-4715.par"))
        .unwrap();
    obs.set_flux_calibration(true);
    obs
}
