use crate::{AccessFlags, FieldDef, MemStore, NumberType, PointFile, PointId, RecordBuilder};

/// Station records: `(StationID, Longitude, Latitude)`.
pub const STATIONS: [(i32, f64, f64); 3] = [(100, 20.0, 10.0), (200, 175.0, 40.0), (300, -60.0, -30.0)];

/// Observation records: `(StationID, Time, Pressure)`, grouped by station.
pub const OBSERVATIONS: [(i32, f64, i16); 10] = [
    (100, 1000.0, 1000),
    (100, 1010.0, 850),
    (100, 1020.0, 700),
    (200, 1030.0, 1000),
    (200, 1040.0, 850),
    (200, 1050.0, 700),
    (200, 1060.0, 500),
    (300, 1070.0, 1000),
    (300, 1080.0, 925),
    (300, 1090.0, 850),
];

pub fn station_fields() -> Vec<FieldDef> {
    vec![
        FieldDef::scalar("StationID", NumberType::Int32),
        FieldDef::scalar("Longitude", NumberType::Float64),
        FieldDef::scalar("Latitude", NumberType::Float64),
    ]
}

pub fn obs_fields() -> Vec<FieldDef> {
    vec![
        FieldDef::scalar("StationID", NumberType::Int32),
        FieldDef::scalar("Time", NumberType::Float64),
        FieldDef::scalar("Pressure", NumberType::Int16),
    ]
}

pub fn station_bytes(stations: &[(i32, f64, f64)]) -> Vec<u8> {
    let fields = station_fields();
    let mut b = RecordBuilder::new(&fields);
    for (id, lon, lat) in stations {
        b.push(&[*id]).unwrap().push(&[*lon]).unwrap().push(&[*lat]).unwrap();
    }
    b.into_bytes().unwrap()
}

pub fn obs_bytes(obs: &[(i32, f64, i16)]) -> Vec<u8> {
    let fields = obs_fields();
    let mut b = RecordBuilder::new(&fields);
    for (id, time, pressure) in obs {
        b.push(&[*id]).unwrap().push(&[*time]).unwrap().push(&[*pressure]).unwrap();
    }
    b.into_bytes().unwrap()
}

/// A two-level "Station"/"Obs" point linked by "StationID", with
/// [`STATIONS`] and [`OBSERVATIONS`] written.
pub fn station_fixture() -> (PointFile<MemStore>, PointId) {
    let mut file = PointFile::new(MemStore::new(), AccessFlags::RDWR);
    let point = file.create("Stations").unwrap();
    file.define_level(point, "Station", &station_fields()).unwrap();
    file.define_level(point, "Obs", &obs_fields()).unwrap();
    file.define_linkage(point, "Station", "Obs", "StationID").unwrap();
    file.write_level(point, 0, &station_bytes(&STATIONS)).unwrap();
    file.write_level(point, 1, &obs_bytes(&OBSERVATIONS)).unwrap();
    (file, point)
}

/// Assert that two floating point values are within `epsilon` of each other.
///
/// ```rust, no_run
/// use std::f64::consts::{PI, E};
/// assert_near!(PI / E, 1.1557273497909217);
/// assert_near!(PI / E, 1.15572734, epsilon = 1e-8);
/// ```
#[macro_export]
macro_rules! assert_near {
    ($left:expr, $right:expr) => {
        assert_near!($left, $right, epsilon = f64::EPSILON)
    };
    ($left:expr, $right:expr, epsilon = $ep:expr) => {
        assert!(
            ($left - $right).abs() < $ep,
            "|{} - {}| = {} is greater than epsilon {:.4e}",
            $left,
            $right,
            ($left - $right).abs(),
            $ep
        )
    };
}
