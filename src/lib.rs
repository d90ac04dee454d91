#![crate_name = "eos_point"]
#![crate_type = "lib"]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Hierarchical point-level record store with index propagation, after the
//! HDF-EOS Point model.
//!
//! A point structure is a chain of record tables ("levels"), each level
//! linked to its parent through a shared link field. Back pointers map every
//! record to its parent record, forward pointers map every parent to the run
//! of its children. A selection made at one level (by a longitude/latitude
//! box, a time period, a value range or explicit record numbers) is carried
//! to every other level and kept as a region.
//!
//! ## Use
//!
//! ```
//! use eos_point::{AccessFlags, FieldDef, GeoBox, MemStore, NumberType, PointFile, RecordBuilder};
//! use geo_types::coord;
//!
//! # fn main() -> eos_point::Result<()> {
//! let mut file = PointFile::new(MemStore::new(), AccessFlags::RDWR);
//! let point = file.create("Stations")?;
//!
//! let stations = [
//!     FieldDef::scalar("StationID", NumberType::Int32),
//!     FieldDef::scalar("Longitude", NumberType::Float64),
//!     FieldDef::scalar("Latitude", NumberType::Float64),
//! ];
//! let obs = [
//!     FieldDef::scalar("StationID", NumberType::Int32),
//!     FieldDef::scalar("Time", NumberType::Float64),
//! ];
//! file.define_level(point, "Station", &stations)?;
//! file.define_level(point, "Obs", &obs)?;
//! file.define_linkage(point, "Station", "Obs", "StationID")?;
//!
//! let mut rows = RecordBuilder::new(&stations);
//! rows.push(&[1i32])?.push(&[10.0f64])?.push(&[45.0f64])?;
//! rows.push(&[2i32])?.push(&[-70.0f64])?.push(&[-20.0f64])?;
//! file.write_level(point, 0, &rows.into_bytes()?)?;
//!
//! let mut rows = RecordBuilder::new(&obs);
//! for (id, t) in [(1i32, 0.0f64), (1, 60.0), (2, 0.0)] {
//!     rows.push(&[id])?.push(&[t])?;
//! }
//! file.write_level(point, 1, &rows.into_bytes()?)?;
//!
//! let europe = GeoBox::new(coord! { x: -10.0, y: 35.0 }, coord! { x: 30.0, y: 60.0 });
//! let region = file.define_box_region(point, &europe)?;
//! assert_eq!(file.region_records(point, &region, 0)?, vec![0]);
//! assert_eq!(file.region_records(point, &region, 1)?, vec![0, 1]);
//! file.release_region(region)?;
//! file.detach(point)?;
//! # Ok(())
//! # }
//! ```
//!
//! Every failed operation also leaves a record on the calling thread's error
//! stack, see [`errors::error_stack`].

pub mod config;
pub mod errors;
pub mod metadata;
pub mod point;
pub mod region;
pub mod store;
pub mod types;

mod buffer;
mod handle;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::{AccessFlags, Config};
pub use errors::{PointError, Result};
pub use handle::{PointId, RegionId};
pub use point::{ForwardIndex, PointFile, RecordBuilder, RecordReader, Run};
pub use region::subset::{GeoBox, TimePeriod};
pub use store::{FieldDef, MemStore, TableStore};
pub use types::{NumberType, PointType};
