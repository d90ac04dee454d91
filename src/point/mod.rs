//! Point structures: hierarchies of record tables ("levels") connected by
//! link fields.
//!
//! A [`PointFile`] wraps a [`TableStore`] and keeps the handles of the point
//! structures opened in it. Each point is laid out in the store as:
//!
//! * a top-level group of class `POINT` holding a `LevelWritten` flag table,
//! * a `Data Vgroup` with one table per level,
//! * a `Linkage Vgroup` with the back and forward pointer tables,
//! * a `Point Attributes` group.

mod level;
mod linkage;
mod record;

pub(crate) use level::resolve_fields;
pub use linkage::{ForwardIndex, Run};
pub use record::{RecordBuilder, RecordReader};

use crate::config::{AccessFlags, Config};
use crate::errors::{trap, PointError, Result};
use crate::handle::{Arena, PointId};
use crate::metadata::{LevelEntry, LinkEntry, PointEntry, StructMetadata};
use crate::region::Region;
use crate::store::{FieldDef, GroupId, MemStore, TableId, TableStore};
use crate::types::{check_type, NumberType, PointType};

pub(crate) const POINT_CLASS: &str = "POINT";
const SUBGROUP_CLASS: &str = "POINT Vgroup";
const DATA_GROUP: &str = "Data Vgroup";
const LINK_GROUP: &str = "Linkage Vgroup";
const ATTR_GROUP: &str = "Point Attributes";
const LEVEL_WRITTEN: &str = "LevelWritten";

pub(crate) fn back_table_name(child: usize) -> String {
    format!("BCKPOINTER:{}->{}", child, child - 1)
}

pub(crate) fn forward_table_name(parent: usize) -> String {
    format!("FWDPOINTER:{}->{}", parent, parent + 1)
}

fn link_attribute_name(child: usize) -> String {
    format!("LINKFIELD:{}->{}", child - 1, child)
}

pub(crate) struct Level {
    pub(crate) name: String,
    pub(crate) table: TableId,
    pub(crate) fields: Vec<FieldDef>,
    /// `BCKPOINTER:j->j-1`, absent on level 0.
    pub(crate) back: Option<TableId>,
    /// `FWDPOINTER:j->j+1`, created once level `j+1` is defined.
    pub(crate) forward: Option<TableId>,
}

impl Level {
    pub(crate) fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub(crate) fn record_size(&self) -> usize {
        crate::store::record_size(&self.fields)
    }
}

pub(crate) struct OpenPoint {
    pub(crate) name: String,
    pub(crate) data_group: GroupId,
    pub(crate) link_group: GroupId,
    pub(crate) attr_group: GroupId,
    pub(crate) written: TableId,
    pub(crate) levels: Vec<Level>,
    /// `links[j]` names the field linking level `j-1` to level `j`.
    pub(crate) links: Vec<Option<String>>,
}

impl OpenPoint {
    pub(crate) fn level(&self, level: usize) -> Result<&Level> {
        self.levels
            .get(level)
            .ok_or_else(|| PointError::LevelNotFound(level.to_string()))
    }

    /// Link field between `child - 1` and `child`.
    pub(crate) fn link(&self, child: usize) -> Result<&str> {
        match self.links.get(child) {
            Some(Some(field)) if child > 0 => Ok(field),
            _ => Err(PointError::LinkageUndefined {
                child,
                parent: child.saturating_sub(1),
            }),
        }
    }

    /// First level holding a field named `name`.
    pub(crate) fn field_level(&self, name: &str) -> Option<(usize, &FieldDef)> {
        self.levels
            .iter()
            .enumerate()
            .find_map(|(i, l)| l.field(name).map(|f| (i, f)))
    }
}

/// A table store holding point structures, and the handles opened on it.
///
/// ```
/// use eos_point::{AccessFlags, FieldDef, MemStore, NumberType, PointFile};
///
/// let mut file = PointFile::new(MemStore::new(), AccessFlags::RDWR);
/// let point = file.create("Buoys").unwrap();
/// file.define_level(point, "Buoy", &[FieldDef::scalar("ID", NumberType::Int32)])
///     .unwrap();
/// assert_eq!(file.level_count(point).unwrap(), 1);
/// assert_eq!(file.inquire_points().unwrap(), vec!["Buoys".to_string()]);
/// ```
pub struct PointFile<S: TableStore = MemStore> {
    pub(crate) store: S,
    pub(crate) config: Config,
    access: AccessFlags,
    pub(crate) points: Arena<OpenPoint>,
    pub(crate) regions: Arena<Region>,
}

impl<S: TableStore> PointFile<S> {
    pub fn new(store: S, access: AccessFlags) -> Self {
        Self::with_config(store, access, Config::default())
    }

    pub fn with_config(store: S, access: AccessFlags, config: Config) -> Self {
        PointFile {
            points: Arena::new(config.max_open_points, "points"),
            regions: Arena::new(config.max_regions, "regions"),
            store,
            config,
            access,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Closes every handle and hands back the underlying store.
    pub fn into_store(self) -> S {
        self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn access(&self) -> AccessFlags {
        self.access
    }

    pub(crate) fn require(&self, needed: AccessFlags) -> Result<()> {
        if !self.access.contains(needed) {
            return Err(PointError::BadArgument(format!(
                "file opened with {:?}, operation needs {:?}",
                self.access, needed
            )));
        }
        Ok(())
    }

    pub(crate) fn check_name(&self, name: &str, max: usize) -> Result<()> {
        if name.is_empty() || name.len() > max {
            return Err(PointError::InvalidName {
                name: name.to_string(),
                max,
            });
        }
        Ok(())
    }

    fn find_point_group(&self, name: &str) -> Result<Option<GroupId>> {
        for group in self.store.groups(None)? {
            if self.store.group_class(group)? == POINT_CLASS && self.store.group_name(group)? == name
            {
                return Ok(Some(group));
            }
        }
        Ok(None)
    }

    /// Creates a new, empty point structure and opens it.
    pub fn create(&mut self, name: &str) -> Result<PointId> {
        trap("create", self.create_point(name))
    }

    fn create_point(&mut self, name: &str) -> Result<PointId> {
        self.require(AccessFlags::CREATE)?;
        self.check_name(name, self.config.max_name_len)?;
        if self.find_point_group(name)?.is_some() {
            return Err(PointError::AlreadyExists(name.to_string()));
        }
        if self.points.len() >= self.config.max_open_points {
            return Err(PointError::CapacityExceeded {
                what: "points",
                limit: self.config.max_open_points,
            });
        }

        let root = self.store.create_group(None, name, POINT_CLASS)?;
        let written = self.store.create_table(
            root,
            LEVEL_WRITTEN,
            &[FieldDef::scalar(LEVEL_WRITTEN, NumberType::UInt8)],
        )?;
        let zeros = vec![0u8; self.config.max_levels.max(1)];
        self.store.write_rows(written, 0, &zeros)?;
        let data_group = self.store.create_group(Some(root), DATA_GROUP, SUBGROUP_CLASS)?;
        let link_group = self.store.create_group(Some(root), LINK_GROUP, SUBGROUP_CLASS)?;
        let attr_group = self.store.create_group(Some(root), ATTR_GROUP, SUBGROUP_CLASS)?;

        let id: PointId = self.points.insert(OpenPoint {
            name: name.to_string(),
            data_group,
            link_group,
            attr_group,
            written,
            levels: Vec::new(),
            links: Vec::new(),
        })?;
        self.refresh_metadata()?;
        log::debug!("created point \"{name}\" as {id}");
        Ok(id)
    }

    /// Opens an existing point structure, restoring its levels and linkages.
    pub fn attach(&mut self, name: &str) -> Result<PointId> {
        trap("attach", self.attach_point(name))
    }

    fn attach_point(&mut self, name: &str) -> Result<PointId> {
        self.require(AccessFlags::READ)?;
        let root = self
            .find_point_group(name)?
            .ok_or_else(|| PointError::PointNotFound(name.to_string()))?;
        let open = self.load_point(root)?;
        let nlevels = open.levels.len();
        let id: PointId = self.points.insert(open)?;
        log::debug!("attached point \"{name}\" as {id} ({nlevels} levels)");
        Ok(id)
    }

    fn subgroup(&self, root: GroupId, name: &str) -> Result<GroupId> {
        self.store
            .find_group(Some(root), name)?
            .ok_or_else(|| PointError::Storage {
                method_name: "attach",
                msg: format!("point group is missing \"{name}\""),
            })
    }

    fn load_point(&self, root: GroupId) -> Result<OpenPoint> {
        let name = self.store.group_name(root)?;
        let data_group = self.subgroup(root, DATA_GROUP)?;
        let link_group = self.subgroup(root, LINK_GROUP)?;
        let attr_group = self.subgroup(root, ATTR_GROUP)?;
        let written = self
            .store
            .find_table(root, LEVEL_WRITTEN)?
            .ok_or_else(|| PointError::Storage {
                method_name: "attach",
                msg: format!("point \"{name}\" has no {LEVEL_WRITTEN} table"),
            })?;

        let mut levels = Vec::new();
        let mut links = Vec::new();
        for (j, table) in self.store.tables(data_group)?.into_iter().enumerate() {
            let (back, link) = if j > 0 {
                let link = match self.store.read_attribute(link_group, &link_attribute_name(j))? {
                    Some((_, bytes)) => Some(String::from_utf8_lossy(&bytes).into_owned()),
                    None => None,
                };
                (self.store.find_table(link_group, &back_table_name(j))?, link)
            } else {
                (None, None)
            };
            levels.push(Level {
                name: self.store.table_name(table)?,
                table,
                fields: self.store.table_fields(table)?,
                back,
                forward: self.store.find_table(link_group, &forward_table_name(j))?,
            });
            links.push(link);
        }

        Ok(OpenPoint {
            name,
            data_group,
            link_group,
            attr_group,
            written,
            levels,
            links,
        })
    }

    /// Closes a point handle and releases every region defined on it.
    pub fn detach(&mut self, point: PointId) -> Result<()> {
        trap("detach", self.detach_point(point))
    }

    fn detach_point(&mut self, point: PointId) -> Result<()> {
        let open = self.points.remove(&point)?;
        let before = self.regions.len();
        self.regions.retain(|r| r.point != point);
        log::debug!(
            "detached point \"{}\" ({point}), released {} regions",
            open.name,
            before - self.regions.len()
        );
        Ok(())
    }

    /// Name of an open point.
    pub fn point_name(&self, point: PointId) -> Result<String> {
        trap("point_name", self.points.get(&point).map(|p| p.name.clone()))
    }

    /// Names of every point structure in the store.
    pub fn inquire_points(&self) -> Result<Vec<String>> {
        trap("inquire_points", self.point_names())
    }

    fn point_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for group in self.store.groups(None)? {
            if self.store.group_class(group)? == POINT_CLASS {
                names.push(self.store.group_name(group)?);
            }
        }
        Ok(names)
    }

    /// The ODL structural metadata block describing every point.
    pub fn structural_metadata(&self) -> Result<String> {
        trap("structural_metadata", self.store.structural_metadata())
    }

    pub(crate) fn refresh_metadata(&mut self) -> Result<()> {
        let mut md = StructMetadata::default();
        for group in self.store.groups(None)? {
            if self.store.group_class(group)? != POINT_CLASS {
                continue;
            }
            let open = self.load_point(group)?;
            let levels: Vec<LevelEntry> = open
                .levels
                .iter()
                .map(|l| LevelEntry {
                    name: l.name.clone(),
                    fields: l.fields.clone(),
                })
                .collect();
            let links = open
                .links
                .iter()
                .enumerate()
                .filter_map(|(j, link)| {
                    link.as_ref().map(|field| LinkEntry {
                        parent: levels[j - 1].name.clone(),
                        child: levels[j].name.clone(),
                        link_field: field.clone(),
                    })
                })
                .collect();
            md.points.push(PointEntry {
                name: open.name,
                levels,
                links,
            });
        }
        self.store.set_structural_metadata(&md.to_string())
    }

    /// Writes (or replaces) a point attribute.
    pub fn write_attribute<T: PointType>(
        &mut self,
        point: PointId,
        name: &str,
        values: &[T],
    ) -> Result<()> {
        trap("write_attribute", self.write_attr(point, name, values))
    }

    fn write_attr<T: PointType>(&mut self, point: PointId, name: &str, values: &[T]) -> Result<()> {
        self.require(AccessFlags::WRITE)?;
        self.check_name(name, self.config.max_name_len)?;
        if values.is_empty() {
            return Err(PointError::BadArgument(format!(
                "attribute \"{name}\" needs at least one value"
            )));
        }
        let group = self.points.get(&point)?.attr_group;
        let mut bytes = Vec::with_capacity(values.len() * T::number_type().size());
        for v in values {
            v.write_le(&mut bytes);
        }
        self.store
            .write_attribute(group, name, T::number_type(), &bytes)
    }

    /// Reads every value of a point attribute.
    pub fn read_attribute<T: PointType>(&self, point: PointId, name: &str) -> Result<Vec<T>> {
        trap("read_attribute", self.read_attr(point, name))
    }

    fn read_attr<T: PointType>(&self, point: PointId, name: &str) -> Result<Vec<T>> {
        let group = self.points.get(&point)?.attr_group;
        let (number_type, bytes) = self
            .store
            .read_attribute(group, name)?
            .ok_or_else(|| PointError::AttributeNotFound(name.to_string()))?;
        check_type::<T>(name, number_type)?;
        Ok(bytes
            .chunks_exact(number_type.size())
            .map(T::read_le)
            .collect())
    }

    /// Number type and value count of a point attribute.
    pub fn attribute_info(&self, point: PointId, name: &str) -> Result<(NumberType, usize)> {
        let info = self.points.get(&point).and_then(|p| {
            self.store
                .read_attribute(p.attr_group, name)?
                .map(|(t, bytes)| (t, bytes.len() / t.size()))
                .ok_or_else(|| PointError::AttributeNotFound(name.to_string()))
        });
        trap("attribute_info", info)
    }

    pub fn attribute_names(&self, point: PointId) -> Result<Vec<String>> {
        let names = self
            .points
            .get(&point)
            .and_then(|p| self.store.attribute_names(p.attr_group));
        trap("attribute_names", names)
    }
}
