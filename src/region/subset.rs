//! Subsetting predicates.
//!
//! Each predicate scans one level, selects the matching records and
//! propagates the selection over every level of the point.

use chrono::{DateTime, TimeZone, Utc};
use geo_types::{Coord, Point, Rect};

use crate::buffer;
use crate::errors::{trap, PointError, Result};
use crate::handle::{PointId, RegionId};
use crate::point::PointFile;
use crate::region::{Region, Selection};
use crate::store::{FieldDef, TableStore};
use crate::types::NumberType;

pub const LONGITUDE: &str = "Longitude";
pub const LATITUDE: &str = "Latitude";
pub const COLATITUDE: &str = "Colatitude";
pub const TIME: &str = "Time";

/// Seconds between the Unix epoch and 1993-01-01T00:00:00Z.
const TAI93_UNIX_OFFSET: i64 = 725_846_400;

/// A longitude/latitude box in degrees.
///
/// When `west` is not less than `east` the box crosses the antimeridian and
/// holds every longitude outside `[east, west]`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GeoBox {
    pub west: f64,
    pub east: f64,
    pub south: f64,
    pub north: f64,
}

impl GeoBox {
    /// Box from its western-southern and eastern-northern corners. Latitudes
    /// may be given in either order; longitudes may not.
    ///
    /// ```
    /// use eos_point::GeoBox;
    /// use geo_types::coord;
    ///
    /// let pacific = GeoBox::new(coord! { x: 170.0, y: -10.0 }, coord! { x: -170.0, y: 10.0 });
    /// assert!(pacific.crosses_antimeridian());
    /// assert!(pacific.contains(180.0, 0.0));
    /// assert!(!pacific.contains(0.0, 0.0));
    /// ```
    pub fn new(west_corner: Coord<f64>, east_corner: Coord<f64>) -> Self {
        GeoBox {
            west: west_corner.x,
            east: east_corner.x,
            south: west_corner.y.min(east_corner.y),
            north: west_corner.y.max(east_corner.y),
        }
    }

    /// Whether the box wraps through 180 degrees. Equal west and east
    /// longitudes count as wrapping, so such a box takes every longitude
    /// except that meridian.
    pub fn crosses_antimeridian(&self) -> bool {
        self.west >= self.east
    }

    /// Whether a point is inside the box. Longitudes over 180 are shifted
    /// into `[-180, 180]` first.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        let lon = if lon > 180.0 { lon - 360.0 } else { lon };
        if lat < self.south || lat > self.north {
            return false;
        }
        if self.crosses_antimeridian() {
            !(lon >= self.east && lon <= self.west)
        } else {
            lon >= self.west && lon <= self.east
        }
    }
}

impl From<Rect<f64>> for GeoBox {
    fn from(rect: Rect<f64>) -> Self {
        GeoBox::new(rect.min(), rect.max())
    }
}

/// A closed interval of "Time" values, in seconds since
/// 1993-01-01T00:00:00Z (TAI93).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TimePeriod {
    pub start: f64,
    pub stop: f64,
}

impl TimePeriod {
    pub fn new(start: f64, stop: f64) -> Self {
        TimePeriod { start, stop }
    }

    pub fn from_datetimes(start: DateTime<Utc>, stop: DateTime<Utc>) -> Self {
        TimePeriod::new(datetime_to_tai93(start), datetime_to_tai93(stop))
    }

    pub fn contains(&self, time: f64) -> bool {
        self.start <= time && time <= self.stop
    }
}

/// Seconds since 1993-01-01T00:00:00Z. Leap seconds are not counted.
pub fn datetime_to_tai93(time: DateTime<Utc>) -> f64 {
    (time.timestamp() - TAI93_UNIX_OFFSET) as f64 + f64::from(time.timestamp_subsec_nanos()) * 1e-9
}

/// Inverse of [`datetime_to_tai93`]; `None` when out of range.
pub fn tai93_to_datetime(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9).round().min(999_999_999.0) as u32;
    Utc.timestamp_opt(whole as i64 + TAI93_UNIX_OFFSET, nanos)
        .single()
}

/// Longitude and latitude fields of a point, which must share a level.
struct CoordFields {
    level: usize,
    lon: FieldDef,
    lat: FieldDef,
    colatitude: bool,
}

fn scalar_field(field: &FieldDef, purpose: &'static str, accepted: &[NumberType]) -> Result<()> {
    if field.order > 1 || !accepted.contains(&field.number_type) {
        return Err(PointError::UnsupportedFieldType {
            field: field.name.clone(),
            number_type: field.number_type,
            purpose,
        });
    }
    Ok(())
}

const FLOATS: [NumberType; 2] = [NumberType::Float32, NumberType::Float64];

const VERTICAL_TYPES: [NumberType; 6] = [
    NumberType::Int16,
    NumberType::UInt16,
    NumberType::Int32,
    NumberType::UInt32,
    NumberType::Float32,
    NumberType::Float64,
];

impl<S: TableStore> PointFile<S> {
    fn coord_fields(&self, point: PointId) -> Result<CoordFields> {
        let pt = self.points.get(&point)?;
        let (level, lon) = pt
            .field_level(LONGITUDE)
            .ok_or_else(|| PointError::FieldNotFound {
                field: LONGITUDE.to_string(),
                level: None,
            })?;
        let (lat_level, lat, colatitude) = match pt.field_level(LATITUDE) {
            Some((l, f)) => (l, f, false),
            None => match pt.field_level(COLATITUDE) {
                Some((l, f)) => (l, f, true),
                None => {
                    return Err(PointError::FieldNotFound {
                        field: LATITUDE.to_string(),
                        level: None,
                    })
                }
            },
        };
        if lat_level != level {
            return Err(PointError::LevelMismatch {
                first: LONGITUDE.to_string(),
                second: lat.name.clone(),
            });
        }
        scalar_field(lon, "box subsetting", &FLOATS)?;
        scalar_field(lat, "box subsetting", &FLOATS)?;
        Ok(CoordFields {
            level,
            lon: lon.clone(),
            lat: lat.clone(),
            colatitude,
        })
    }

    /// Reads one scalar field of the listed records (all records for `None`)
    /// as `f64`.
    fn read_scalars(
        &mut self,
        point: PointId,
        level: usize,
        field: &FieldDef,
        records: Option<&[usize]>,
    ) -> Result<Vec<f64>> {
        let raw = self.read_fields(point, level, &[field.name.as_str()], records)?;
        let size = field.number_type.size();
        let mut out = buffer::with_capacity("read_scalars", raw.len() / size)?;
        out.extend(
            raw.chunks_exact(size)
                .map(|b| field.number_type.decode_f64(b)),
        );
        Ok(out)
    }

    fn coordinates(
        &mut self,
        point: PointId,
        fields: &CoordFields,
        records: Option<&[usize]>,
    ) -> Result<(Vec<f64>, Vec<f64>)> {
        let lon = self.read_scalars(point, fields.level, &fields.lon, records)?;
        let mut lat = self.read_scalars(point, fields.level, &fields.lat, records)?;
        if fields.colatitude {
            lat.iter_mut().for_each(|v| *v = 90.0 - *v);
        }
        Ok((lon, lat))
    }

    /// Selects the records whose "Longitude" and "Latitude" (or
    /// "Colatitude") fall inside `bbox`, and every related record.
    pub fn define_box_region(&mut self, point: PointId, bbox: &GeoBox) -> Result<RegionId> {
        trap("define_box_region", self.box_region(point, bbox))
    }

    fn box_region(&mut self, point: PointId, bbox: &GeoBox) -> Result<RegionId> {
        let fields = self.coord_fields(point)?;
        let (lon, lat) = self.coordinates(point, &fields, None)?;
        let inside = lon
            .iter()
            .zip(&lat)
            .filter(|(&x, &y)| bbox.contains(x, y))
            .count();
        let mut seed = buffer::with_capacity("define_box_region", inside)?;
        seed.extend(
            lon.iter()
                .zip(&lat)
                .enumerate()
                .filter(|(_, (&x, &y))| bbox.contains(x, y))
                .map(|(i, _)| i),
        );
        log::debug!(
            "box {bbox:?} selects {} of {} records in level {} of {point}",
            seed.len(),
            lon.len(),
            fields.level
        );
        self.new_region(point, fields.level, seed)
    }

    /// Longitude/latitude of the records a region selects at the level
    /// holding the coordinates. Colatitudes are converted to latitudes.
    pub fn region_coordinates(&mut self, point: PointId, region: &RegionId) -> Result<Vec<Point<f64>>> {
        trap("region_coordinates", self.selected_coordinates(point, region))
    }

    fn selected_coordinates(&mut self, point: PointId, region: &RegionId) -> Result<Vec<Point<f64>>> {
        let fields = self.coord_fields(point)?;
        let records = match self.region(point, region)?.levels.get(fields.level) {
            Some(Some(selected)) => buffer::copied("region_coordinates", selected)?,
            _ => Vec::new(),
        };
        let (lon, lat) = self.coordinates(point, &fields, Some(&records))?;
        Ok(lon
            .into_iter()
            .zip(lat)
            .map(|(x, y)| Point::new(if x > 180.0 { x - 360.0 } else { x }, y))
            .collect())
    }

    /// Selects the records whose "Time" lies within `period`, and every
    /// related record.
    pub fn define_time_period(&mut self, point: PointId, period: &TimePeriod) -> Result<RegionId> {
        trap("define_time_period", self.time_region(point, period))
    }

    fn time_region(&mut self, point: PointId, period: &TimePeriod) -> Result<RegionId> {
        let (level, field) = self
            .points
            .get(&point)?
            .field_level(TIME)
            .map(|(l, f)| (l, f.clone()))
            .ok_or_else(|| PointError::FieldNotFound {
                field: TIME.to_string(),
                level: None,
            })?;
        scalar_field(&field, "time subsetting", &[NumberType::Float64])?;
        let times = self.read_scalars(point, level, &field, None)?;
        let inside = times.iter().filter(|&&t| period.contains(t)).count();
        let mut seed = buffer::with_capacity("define_time_period", inside)?;
        seed.extend(
            times
                .iter()
                .enumerate()
                .filter(|(_, &t)| period.contains(t))
                .map(|(i, _)| i),
        );
        self.new_region(point, level, seed)
    }

    /// Selects the records whose `field` lies within `range` (inclusive),
    /// and every related record.
    pub fn define_vertical_region(
        &mut self,
        point: PointId,
        field: &str,
        range: [f64; 2],
    ) -> Result<RegionId> {
        let region = self
            .vertical_selection(point, None, field, range)
            .and_then(|levels| self.regions.insert(Region { point, levels }));
        trap("define_vertical_region", region)
    }

    /// Restricts an existing region to the records whose `field` lies within
    /// `range`. Only the records the region already selects at the field's
    /// level are tested. On failure the region is left unchanged.
    pub fn refine_vertical_region(
        &mut self,
        point: PointId,
        region: &RegionId,
        field: &str,
        range: [f64; 2],
    ) -> Result<()> {
        let refined = self
            .vertical_selection(point, Some(region), field, range)
            .and_then(|levels| {
                self.regions.get_mut(region)?.levels = levels;
                Ok(())
            });
        trap("refine_vertical_region", refined)
    }

    fn vertical_selection(
        &mut self,
        point: PointId,
        region: Option<&RegionId>,
        field: &str,
        range: [f64; 2],
    ) -> Result<Selection> {
        let (level, def) = self
            .points
            .get(&point)?
            .field_level(field)
            .map(|(l, f)| (l, f.clone()))
            .ok_or_else(|| PointError::FieldNotFound {
                field: field.to_string(),
                level: None,
            })?;
        scalar_field(&def, "vertical subsetting", &VERTICAL_TYPES)?;

        let candidates = match region {
            None => None,
            Some(region) => Some(match self.region(point, region)?.levels.get(level) {
                Some(Some(selected)) => buffer::copied("refine_vertical_region", selected)?,
                _ => Vec::new(),
            }),
        };
        let values = self.read_scalars(point, level, &def, candidates.as_deref())?;

        let [low, high] = range;
        let inside = values.iter().filter(|&&v| low <= v && v <= high).count();
        let mut seed = buffer::with_capacity("vertical_selection", inside)?;
        for (i, &v) in values.iter().enumerate() {
            if low <= v && v <= high {
                seed.push(candidates.as_ref().map_or(i, |c| c[i]));
            }
        }
        log::debug!(
            "\"{field}\" in [{low}, {high}] keeps {} of {} records in level {level} of {point}",
            seed.len(),
            values.len()
        );
        let last = self.points.get(&point)?.levels.len() - 1;
        self.propagate(point, level, seed, Some(0), Some(last))
    }
}
