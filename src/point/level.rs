use crate::buffer;
use crate::config::AccessFlags;
use crate::errors::{trap, PointError, Result};
use crate::handle::PointId;
use crate::point::{back_table_name, forward_table_name, Level, OpenPoint, PointFile};
use crate::store::{record_size, FieldDef, TableId, TableStore};
use crate::types::{check_type, NumberType, PointType};

#[cfg(feature = "array")]
use ndarray::Array2;

fn encode_i32_pair(a: i32, b: i32) -> [u8; 8] {
    let mut out = [0u8; 8];
    out[..4].copy_from_slice(&a.to_le_bytes());
    out[4..].copy_from_slice(&b.to_le_bytes());
    out
}

/// Resolves `names` against the fields of `level`, keeping the caller's order.
pub(crate) fn resolve_fields(level: &Level, index: usize, names: &[&str]) -> Result<Vec<FieldDef>> {
    if names.is_empty() {
        return Err(PointError::BadArgument("empty field list".to_string()));
    }
    names
        .iter()
        .map(|n| {
            level.field(n).cloned().ok_or_else(|| PointError::FieldNotFound {
                field: n.to_string(),
                level: Some(index),
            })
        })
        .collect()
}

impl<S: TableStore> PointFile<S> {
    /// Appends a level after the last defined one and returns its index.
    ///
    /// Levels must be defined root first. A field order of `0` is stored as
    /// `1`. From the second level on, the back and forward pointer tables
    /// linking it to its parent are created as well.
    pub fn define_level(&mut self, point: PointId, name: &str, fields: &[FieldDef]) -> Result<usize> {
        trap("define_level", self.add_level(point, name, fields))
    }

    fn add_level(&mut self, point: PointId, name: &str, fields: &[FieldDef]) -> Result<usize> {
        self.require(AccessFlags::WRITE)?;
        let pt = self.points.get(&point)?;
        self.check_name(name, self.config.max_name_len)?;
        let fields = self.check_fields(fields)?;
        if pt.levels.iter().any(|l| l.name == name) {
            return Err(PointError::AlreadyExists(name.to_string()));
        }
        let index = pt.levels.len();
        if index >= self.config.max_levels {
            return Err(PointError::CapacityExceeded {
                what: "levels",
                limit: self.config.max_levels,
            });
        }
        let (data_group, link_group, written) = (pt.data_group, pt.link_group, pt.written);

        let table = self.store.create_table(data_group, name, &fields)?;
        // Probe record, reported as empty until the level is written.
        self.store
            .write_rows(table, 0, &vec![0u8; record_size(&fields)])?;
        self.store.write_rows(written, index, &[0u8])?;

        let (back, parent_forward) = if index > 0 {
            let back = self.store.create_table(
                link_group,
                &back_table_name(index),
                &[FieldDef::scalar("BCKPOINTER", NumberType::Int32)],
            )?;
            self.store.write_rows(back, 0, &0i32.to_le_bytes())?;
            let forward = self.store.create_table(
                link_group,
                &forward_table_name(index - 1),
                &[
                    FieldDef::scalar("BEGIN", NumberType::Int32),
                    FieldDef::scalar("EXTENT", NumberType::Int32),
                ],
            )?;
            self.store.write_rows(forward, 0, &encode_i32_pair(-1, 0))?;
            (Some(back), Some(forward))
        } else {
            (None, None)
        };

        let pt = self.points.get_mut(&point)?;
        if let (Some(forward), Some(parent)) = (parent_forward, pt.levels.last_mut()) {
            parent.forward = Some(forward);
        }
        pt.levels.push(Level {
            name: name.to_string(),
            table,
            fields,
            back,
            forward: None,
        });
        pt.links.push(None);
        self.refresh_metadata()?;
        log::debug!("defined level {index} \"{name}\" on {point}");
        Ok(index)
    }

    fn check_fields(&self, fields: &[FieldDef]) -> Result<Vec<FieldDef>> {
        let cfg = &self.config;
        if fields.is_empty() {
            return Err(PointError::FieldDefinition(
                "a level needs at least one field".to_string(),
            ));
        }
        if fields.len() > cfg.max_fields {
            return Err(PointError::FieldDefinition(format!(
                "{} fields exceed the limit of {}",
                fields.len(),
                cfg.max_fields
            )));
        }
        let mut out: Vec<FieldDef> = Vec::with_capacity(fields.len());
        for f in fields {
            if f.name.is_empty() || f.name.len() > cfg.max_field_name_len || f.name.contains(',') {
                return Err(PointError::FieldDefinition(format!(
                    "invalid field name \"{}\" (1 to {} characters, no commas)",
                    f.name, cfg.max_field_name_len
                )));
            }
            if out.iter().any(|o| o.name == f.name) {
                return Err(PointError::FieldDefinition(format!(
                    "field \"{}\" defined twice",
                    f.name
                )));
            }
            let order = f.order.max(1);
            if order > cfg.max_order {
                return Err(PointError::FieldDefinition(format!(
                    "order {order} of \"{}\" exceeds {}",
                    f.name, cfg.max_order
                )));
            }
            out.push(FieldDef::new(f.name.clone(), f.number_type, order));
        }
        let size = record_size(&out);
        if size > cfg.max_record_size {
            return Err(PointError::FieldDefinition(format!(
                "record size {size} exceeds {} bytes",
                cfg.max_record_size
            )));
        }
        Ok(out)
    }

    pub fn level_count(&self, point: PointId) -> Result<usize> {
        trap("level_count", self.points.get(&point).map(|p| p.levels.len()))
    }

    /// Index of the level named `name`.
    pub fn level_index(&self, point: PointId, name: &str) -> Result<usize> {
        let index = self.points.get(&point).and_then(|p| {
            p.levels
                .iter()
                .position(|l| l.name == name)
                .ok_or_else(|| PointError::LevelNotFound(format!("\"{name}\"")))
        });
        trap("level_index", index)
    }

    pub fn level_name(&self, point: PointId, level: usize) -> Result<String> {
        let name = self
            .points
            .get(&point)
            .and_then(|p| p.level(level).map(|l| l.name.clone()));
        trap("level_name", name)
    }

    pub fn field_count(&self, point: PointId, level: usize) -> Result<usize> {
        let n = self
            .points
            .get(&point)
            .and_then(|p| p.level(level).map(|l| l.fields.len()));
        trap("field_count", n)
    }

    /// Name, type and order of every field of a level.
    pub fn level_info(&self, point: PointId, level: usize) -> Result<Vec<FieldDef>> {
        let fields = self
            .points
            .get(&point)
            .and_then(|p| p.level(level).map(|l| l.fields.clone()));
        trap("level_info", fields)
    }

    /// Definitions of the named fields of a level, in the order given.
    pub fn level_fields(&self, point: PointId, level: usize, fields: &[&str]) -> Result<Vec<FieldDef>> {
        let defs = self
            .points
            .get(&point)
            .and_then(|p| resolve_fields(p.level(level)?, level, fields));
        trap("level_fields", defs)
    }

    /// Total bytes of the named fields, and for each one the first level
    /// holding it. Fields found nowhere add nothing and map to `None`.
    pub fn field_size(&self, point: PointId, fields: &[&str]) -> Result<(usize, Vec<Option<usize>>)> {
        let sizes = self.points.get(&point).map(|p| {
            let mut total = 0;
            let levels: Vec<Option<usize>> = fields
                .iter()
                .map(|name| {
                    p.field_level(name).map(|(level, f)| {
                        total += f.size();
                        level
                    })
                })
                .collect();
            (total, levels)
        });
        trap("field_size", sizes)
    }

    /// Number of records in a level, not counting the probe record of a
    /// level that was never written.
    pub fn row_count(&self, point: PointId, level: usize) -> Result<usize> {
        trap("row_count", self.rows(point, level))
    }

    pub(crate) fn rows(&self, point: PointId, level: usize) -> Result<usize> {
        let pt = self.points.get(&point)?;
        let raw = self.store.row_count(pt.level(level)?.table)?;
        if raw == 1 && !self.is_written(pt, level)? {
            return Ok(0);
        }
        Ok(raw)
    }

    fn is_written(&self, pt: &OpenPoint, level: usize) -> Result<bool> {
        let flag = self.store.read_rows(pt.written, level, 1)?;
        Ok(flag.first().is_some_and(|&f| f != 0))
    }

    /// Reads the listed records of `table` under its current projection.
    /// Consecutive record numbers are read in one call.
    pub(crate) fn read_records(&self, table: TableId, records: &[usize], size: usize) -> Result<Vec<u8>> {
        let mut out = buffer::with_capacity("read_records", records.len() * size)?;
        let mut i = 0;
        while i < records.len() {
            let start = records[i];
            let mut n = 1;
            while i + n < records.len() && records[i + n] == start + n {
                n += 1;
            }
            out.extend_from_slice(&self.store.read_rows(table, start, n)?);
            i += n;
        }
        Ok(out)
    }

    fn check_records(&self, point: PointId, level: usize, records: &[usize]) -> Result<usize> {
        let count = self.rows(point, level)?;
        if let Some(&record) = records.iter().find(|&&r| r >= count) {
            return Err(PointError::RecordOutOfRange {
                level,
                record,
                count,
            });
        }
        Ok(count)
    }

    /// Appends whole records to a level and returns how many were written.
    ///
    /// `data` holds records packed in field order, e.g. with a
    /// [`RecordBuilder`](crate::RecordBuilder). Below the root, every new
    /// record is linked to its parent record and the parent's forward
    /// pointers are recomputed.
    pub fn write_level(&mut self, point: PointId, level: usize, data: &[u8]) -> Result<usize> {
        trap("write_level", self.append_level(point, level, data))
    }

    fn append_level(&mut self, point: PointId, level: usize, data: &[u8]) -> Result<usize> {
        self.require(AccessFlags::WRITE)?;
        let pt = self.points.get(&point)?;
        let lv = pt.level(level)?;
        if level > 0 {
            pt.link(level)?;
        }
        let size = lv.record_size();
        if data.is_empty() || data.len() % size != 0 {
            return Err(PointError::BadArgument(format!(
                "{} bytes is not a whole number of {size}-byte records of \"{}\"",
                data.len(),
                lv.name
            )));
        }
        let table = lv.table;
        let names: Vec<&str> = lv.fields.iter().map(|f| f.name.as_str()).collect();
        let raw = self.store.row_count(table)?;
        let start = if raw == 1 && !self.is_written(pt, level)? {
            0
        } else {
            raw
        };
        let written = pt.written;

        self.store.set_active_fields(table, &names)?;
        let count = self.store.write_rows(table, start, data)?;
        self.store.write_rows(written, level, &[1u8])?;
        log::debug!("wrote {count} records to level {level} of {point} at {start}");

        if level > 0 {
            let new_records: Vec<usize> = (start..start + count).collect();
            self.write_back_pointers(point, level, &new_records)?;
            self.write_forward_pointers(point, level - 1)?;
        }
        Ok(count)
    }

    /// Reads the named fields of a level, for all records or only those
    /// listed. Record numbers are checked before anything is read.
    pub fn read_level(
        &mut self,
        point: PointId,
        level: usize,
        fields: &[&str],
        records: Option<&[usize]>,
    ) -> Result<Vec<u8>> {
        trap("read_level", self.read_fields(point, level, fields, records))
    }

    pub(crate) fn read_fields(
        &mut self,
        point: PointId,
        level: usize,
        fields: &[&str],
        records: Option<&[usize]>,
    ) -> Result<Vec<u8>> {
        let pt = self.points.get(&point)?;
        let lv = pt.level(level)?;
        let defs = resolve_fields(lv, level, fields)?;
        let table = lv.table;
        let count = self.check_records(point, level, records.unwrap_or(&[]))?;

        self.store.set_active_fields(table, fields)?;
        match records {
            Some(records) => self.read_records(table, records, record_size(&defs)),
            None => self.store.read_rows(table, 0, count),
        }
    }

    /// Overwrites the named fields of the listed records.
    ///
    /// When a link field is among them, the affected back pointers and the
    /// forward pointers of the level pair are rebuilt.
    pub fn update_level(
        &mut self,
        point: PointId,
        level: usize,
        fields: &[&str],
        records: &[usize],
        data: &[u8],
    ) -> Result<()> {
        trap(
            "update_level",
            self.update_fields(point, level, fields, records, data),
        )
    }

    fn update_fields(
        &mut self,
        point: PointId,
        level: usize,
        fields: &[&str],
        records: &[usize],
        data: &[u8],
    ) -> Result<()> {
        self.require(AccessFlags::WRITE)?;
        let pt = self.points.get(&point)?;
        let lv = pt.level(level)?;
        let size = record_size(&resolve_fields(lv, level, fields)?);
        let table = lv.table;
        let back_link = pt.link(level).ok().map(str::to_string);
        let forward_link = pt.link(level + 1).ok().map(str::to_string);
        if records.is_empty() || data.len() != records.len() * size {
            return Err(PointError::BadArgument(format!(
                "{} bytes do not match {} records of {size} bytes",
                data.len(),
                records.len()
            )));
        }
        self.check_records(point, level, records)?;

        self.store.set_active_fields(table, fields)?;
        for (record, chunk) in records.iter().zip(data.chunks_exact(size)) {
            self.store.write_rows(table, *record, chunk)?;
        }

        if back_link.is_some_and(|f| fields.contains(&f.as_str())) {
            self.write_back_pointers(point, level, records)?;
            self.write_forward_pointers(point, level - 1)?;
        }
        if forward_link.is_some_and(|f| fields.contains(&f.as_str())) {
            let children: Vec<usize> = (0..self.rows(point, level + 1)?).collect();
            if !children.is_empty() {
                self.write_back_pointers(point, level + 1, &children)?;
            }
            self.write_forward_pointers(point, level)?;
        }
        Ok(())
    }

    /// Reads one field as typed values, `order` values per record.
    pub fn read_field<T: PointType>(
        &mut self,
        point: PointId,
        level: usize,
        field: &str,
        records: Option<&[usize]>,
    ) -> Result<Vec<T>> {
        trap("read_field", self.read_typed(point, level, field, records))
    }

    fn read_typed<T: PointType>(
        &mut self,
        point: PointId,
        level: usize,
        field: &str,
        records: Option<&[usize]>,
    ) -> Result<Vec<T>> {
        let def = self.field_def(point, level, field)?;
        check_type::<T>(field, def.number_type)?;
        let bytes = self.read_fields(point, level, &[field], records)?;
        Ok(bytes
            .chunks_exact(def.number_type.size())
            .map(T::read_le)
            .collect())
    }

    pub(crate) fn field_def(&self, point: PointId, level: usize, field: &str) -> Result<FieldDef> {
        let pt = self.points.get(&point)?;
        let lv = pt.level(level)?;
        lv.field(field).cloned().ok_or_else(|| PointError::FieldNotFound {
            field: field.to_string(),
            level: Some(level),
        })
    }

    #[cfg(feature = "array")]
    #[cfg_attr(docsrs, doc(cfg(feature = "array")))]
    /// Reads one field into an array of shape `(records, order)`.
    pub fn read_field_array<T: PointType>(
        &mut self,
        point: PointId,
        level: usize,
        field: &str,
        records: Option<&[usize]>,
    ) -> Result<Array2<T>> {
        let array = self.field_def(point, level, field).and_then(|def| {
            let values = self.read_typed::<T>(point, level, field, records)?;
            let rows = values.len() / def.order.max(1);
            Array2::from_shape_vec((rows, def.order.max(1)), values)
                .map_err(|e| PointError::BadArgument(e.to_string()))
        });
        trap("read_field_array", array)
    }
}
