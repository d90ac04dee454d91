use eos_point::{
    AccessFlags, FieldDef, ForwardIndex, GeoBox, MemStore, NumberType, PointError, PointFile,
    PointId, RecordBuilder, RecordReader, TableStore, TimePeriod,
};
use geo_types::coord;

fn station_fields() -> Vec<FieldDef> {
    vec![
        FieldDef::scalar("StationID", NumberType::Int32),
        FieldDef::new("Name", NumberType::Char8, 8),
        FieldDef::scalar("Longitude", NumberType::Float64),
        FieldDef::scalar("Latitude", NumberType::Float64),
    ]
}

fn obs_fields() -> Vec<FieldDef> {
    vec![
        FieldDef::scalar("StationID", NumberType::Int32),
        FieldDef::scalar("Time", NumberType::Float64),
        FieldDef::scalar("Temperature", NumberType::Float32),
    ]
}

/// Three stations, and ten observations written in the order they arrived:
/// stations take turns, so no station's observations are contiguous.
fn network() -> (PointFile<MemStore>, PointId) {
    let mut file = PointFile::new(MemStore::new(), AccessFlags::RDWR);
    let point = file.create("Network").unwrap();
    file.define_level(point, "Station", &station_fields()).unwrap();
    file.define_level(point, "Observation", &obs_fields()).unwrap();
    file.define_linkage(point, "Station", "Observation", "StationID")
        .unwrap();

    let fields = station_fields();
    let mut rows = RecordBuilder::new(&fields);
    for (id, name, lon, lat) in [
        (1, "OSLO", 10.7, 59.9),
        (2, "LIMA", -77.0, -12.0),
        (3, "SUVA", 178.4, -18.1),
    ] {
        rows.push(&[id]).unwrap().text(name).unwrap();
        rows.push(&[lon]).unwrap().push(&[lat]).unwrap();
    }
    file.write_level(point, 0, &rows.into_bytes().unwrap()).unwrap();

    let fields = obs_fields();
    let mut rows = RecordBuilder::new(&fields);
    for (i, id) in [1, 2, 3, 1, 2, 3, 1, 2, 3, 2].into_iter().enumerate() {
        let time = 3600.0 * i as f64;
        let temperature = 10.0 * id as f32 + i as f32;
        rows.push(&[id]).unwrap().push(&[time]).unwrap();
        rows.push(&[temperature]).unwrap();
    }
    assert_eq!(rows.records(), 10);
    file.write_level(point, 1, &rows.into_bytes().unwrap()).unwrap();
    (file, point)
}

#[test]
fn test_box_selects_one_station_and_its_observations() {
    let (mut file, point) = network();
    assert_eq!(file.row_count(point, 1).unwrap(), 10);
    assert_eq!(file.forward_index(point, 0).unwrap(), ForwardIndex::Disabled);

    let south_america = GeoBox::new(coord! { x: -90.0, y: -60.0 }, coord! { x: -30.0, y: 15.0 });
    let region = file.define_box_region(point, &south_america).unwrap();
    assert_eq!(file.region_records(point, &region, 0).unwrap(), vec![1]);
    assert_eq!(file.region_records(point, &region, 1).unwrap(), vec![1, 4, 7, 9]);

    let names = file
        .extract_region(point, &region, 0, &["Name"])
        .unwrap();
    let fields = file.level_fields(point, 0, &["Name"]).unwrap();
    assert_eq!(RecordReader::new(&fields, &names).unwrap().text(0, "Name").unwrap(), "LIMA");

    let bytes = file
        .extract_region(point, &region, 1, &["Time", "StationID"])
        .unwrap();
    let fields = file.level_fields(point, 1, &["Time", "StationID"]).unwrap();
    let reader = RecordReader::new(&fields, &bytes).unwrap();
    let times: Vec<f64> = (0..reader.len())
        .map(|r| reader.value::<f64>(r, "Time").unwrap())
        .collect();
    assert_eq!(times, vec![3600.0, 4.0 * 3600.0, 7.0 * 3600.0, 9.0 * 3600.0]);
    assert!((0..reader.len()).all(|r| reader.value::<i32>(r, "StationID").unwrap() == 2));
    file.release_region(region).unwrap();
}

#[test]
fn test_antimeridian_box_and_time_period() {
    let (mut file, point) = network();
    let fiji = GeoBox::new(coord! { x: 175.0, y: -25.0 }, coord! { x: -175.0, y: -10.0 });
    let region = file.define_box_region(point, &fiji).unwrap();
    assert_eq!(file.region_records(point, &region, 1).unwrap(), vec![2, 5, 8]);

    let morning = TimePeriod::new(0.0, 2.0 * 3600.0);
    let region = file.define_time_period(point, &morning).unwrap();
    assert_eq!(file.region_records(point, &region, 0).unwrap(), vec![0, 1, 2]);
    assert_eq!(file.region_records(point, &region, 1).unwrap(), vec![0, 1, 2]);

    file.refine_vertical_region(point, &region, "Temperature", [20.0, 30.0])
        .unwrap();
    assert_eq!(file.region_records(point, &region, 1).unwrap(), vec![1]);
    assert_eq!(file.region_records(point, &region, 0).unwrap(), vec![1]);
}

#[test]
fn test_non_adjacent_linkage_changes_nothing() {
    let mut file = PointFile::new(MemStore::new(), AccessFlags::RDWR);
    let point = file.create("Network").unwrap();
    file.define_level(point, "Station", &station_fields()).unwrap();
    file.define_level(point, "Observation", &obs_fields()).unwrap();
    file.define_level(point, "Sample", &obs_fields()).unwrap();
    let metadata = file.structural_metadata().unwrap();

    assert!(matches!(
        file.define_linkage(point, "Station", "Sample", "StationID"),
        Err(PointError::Linkage(_))
    ));
    assert_eq!(file.structural_metadata().unwrap(), metadata);
    assert!(file.back_link_field(point, 2).is_err());
    assert!(file.back_link_field(point, 1).is_err());

    let store = file.into_store();
    let root = store.find_group(None, "Network").unwrap().unwrap();
    let links = store.find_group(Some(root), "Linkage Vgroup").unwrap().unwrap();
    assert!(store.attribute_names(links).unwrap().is_empty());
}

#[test]
fn test_records_survive_detach_and_attach() {
    let (mut file, point) = network();
    file.write_attribute(point, "Units", &[1u8, 2, 3]).unwrap();
    file.detach(point).unwrap();

    let point = file.attach("Network").unwrap();
    assert_eq!(file.level_count(point).unwrap(), 2);
    assert_eq!(file.back_link_field(point, 1).unwrap(), "StationID");
    assert_eq!(file.read_attribute::<u8>(point, "Units").unwrap(), vec![1, 2, 3]);
    let temperatures: Vec<f32> = file
        .read_field(point, 1, "Temperature", Some(&[0, 9]))
        .unwrap();
    assert_eq!(temperatures, vec![10.0, 29.0]);
    assert_eq!(
        file.get_record_numbers(point, 1, 0, &[9, 3]).unwrap(),
        vec![0, 1]
    );
}
