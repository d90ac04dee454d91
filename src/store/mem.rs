use crate::buffer;
use crate::errors::{PointError, Result};
use crate::store::{FieldDef, GroupId, TableId, TableStore};
use crate::types::NumberType;

struct Group {
    name: String,
    class: String,
    children: Vec<GroupId>,
    tables: Vec<TableId>,
    attributes: Vec<Attribute>,
}

struct Attribute {
    name: String,
    number_type: NumberType,
    data: Vec<u8>,
}

struct Table {
    name: String,
    fields: Vec<FieldDef>,
    offsets: Vec<usize>,
    record_size: usize,
    /// Indices into `fields`.
    active: Vec<usize>,
    rows: Vec<u8>,
}

impl Table {
    fn active_size(&self) -> usize {
        self.active.iter().map(|&i| self.fields[i].size()).sum()
    }

    fn row_count(&self) -> usize {
        self.rows.len() / self.record_size
    }
}

/// In-memory [`TableStore`].
///
/// ```
/// use eos_point::store::{FieldDef, MemStore, TableStore};
/// use eos_point::NumberType;
///
/// let mut store = MemStore::new();
/// let group = store.create_group(None, "Data", "Vgroup").unwrap();
/// let table = store
///     .create_table(group, "Obs", &[FieldDef::scalar("Time", NumberType::Float64)])
///     .unwrap();
/// store.append_rows(table, &1.5f64.to_le_bytes()).unwrap();
/// assert_eq!(store.row_count(table).unwrap(), 1);
/// ```
#[derive(Default)]
pub struct MemStore {
    top: Vec<GroupId>,
    groups: Vec<Group>,
    tables: Vec<Table>,
    metadata: String,
}

fn storage_error(method_name: &'static str, msg: impl Into<String>) -> PointError {
    PointError::Storage {
        method_name,
        msg: msg.into(),
    }
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn group(&self, method_name: &'static str, id: GroupId) -> Result<&Group> {
        self.groups
            .get(id.0 as usize)
            .ok_or_else(|| storage_error(method_name, format!("no group {}", id.0)))
    }

    fn group_mut(&mut self, method_name: &'static str, id: GroupId) -> Result<&mut Group> {
        self.groups
            .get_mut(id.0 as usize)
            .ok_or_else(|| storage_error(method_name, format!("no group {}", id.0)))
    }

    fn table(&self, method_name: &'static str, id: TableId) -> Result<&Table> {
        self.tables
            .get(id.0 as usize)
            .ok_or_else(|| storage_error(method_name, format!("no table {}", id.0)))
    }

    fn table_mut(&mut self, method_name: &'static str, id: TableId) -> Result<&mut Table> {
        self.tables
            .get_mut(id.0 as usize)
            .ok_or_else(|| storage_error(method_name, format!("no table {}", id.0)))
    }
}

impl TableStore for MemStore {
    fn create_group(
        &mut self,
        parent: Option<GroupId>,
        name: &str,
        class: &str,
    ) -> Result<GroupId> {
        let id = GroupId(self.groups.len() as u32);
        match parent {
            Some(p) => self.group_mut("create_group", p)?.children.push(id),
            None => self.top.push(id),
        }
        self.groups.push(Group {
            name: name.to_string(),
            class: class.to_string(),
            children: Vec::new(),
            tables: Vec::new(),
            attributes: Vec::new(),
        });
        Ok(id)
    }

    fn groups(&self, parent: Option<GroupId>) -> Result<Vec<GroupId>> {
        match parent {
            Some(p) => Ok(self.group("groups", p)?.children.clone()),
            None => Ok(self.top.clone()),
        }
    }

    fn group_name(&self, group: GroupId) -> Result<String> {
        Ok(self.group("group_name", group)?.name.clone())
    }

    fn group_class(&self, group: GroupId) -> Result<String> {
        Ok(self.group("group_class", group)?.class.clone())
    }

    fn create_table(&mut self, group: GroupId, name: &str, fields: &[FieldDef]) -> Result<TableId> {
        if fields.is_empty() {
            return Err(storage_error("create_table", "a table needs at least one field"));
        }
        let id = TableId(self.tables.len() as u32);
        self.group_mut("create_table", group)?.tables.push(id);

        let mut offsets = Vec::with_capacity(fields.len());
        let mut record_size = 0;
        for f in fields {
            offsets.push(record_size);
            record_size += f.size();
        }
        self.tables.push(Table {
            name: name.to_string(),
            fields: fields.to_vec(),
            offsets,
            record_size,
            active: (0..fields.len()).collect(),
            rows: Vec::new(),
        });
        Ok(id)
    }

    fn tables(&self, group: GroupId) -> Result<Vec<TableId>> {
        Ok(self.group("tables", group)?.tables.clone())
    }

    fn table_name(&self, table: TableId) -> Result<String> {
        Ok(self.table("table_name", table)?.name.clone())
    }

    fn table_fields(&self, table: TableId) -> Result<Vec<FieldDef>> {
        Ok(self.table("table_fields", table)?.fields.clone())
    }

    fn set_active_fields(&mut self, table: TableId, fields: &[&str]) -> Result<()> {
        let t = self.table_mut("set_active_fields", table)?;
        let mut active = Vec::with_capacity(fields.len());
        for name in fields {
            let idx = t
                .fields
                .iter()
                .position(|f| f.name == *name)
                .ok_or_else(|| {
                    storage_error("set_active_fields", format!("{}: no field {name}", t.name))
                })?;
            active.push(idx);
        }
        if active.is_empty() {
            return Err(storage_error("set_active_fields", "empty field list"));
        }
        t.active = active;
        Ok(())
    }

    fn active_record_size(&self, table: TableId) -> Result<usize> {
        Ok(self.table("active_record_size", table)?.active_size())
    }

    fn row_count(&self, table: TableId) -> Result<usize> {
        Ok(self.table("row_count", table)?.row_count())
    }

    fn read_rows(&self, table: TableId, start: usize, count: usize) -> Result<Vec<u8>> {
        let t = self.table("read_rows", table)?;
        let end = start.checked_add(count).unwrap_or(usize::MAX);
        if end > t.row_count() {
            return Err(storage_error(
                "read_rows",
                format!(
                    "{}: rows {start}..{end} past end ({} rows)",
                    t.name,
                    t.row_count()
                ),
            ));
        }
        let mut out = buffer::with_capacity("read_rows", count * t.active_size())?;
        for row in start..end {
            let base = row * t.record_size;
            for &i in &t.active {
                let at = base + t.offsets[i];
                out.extend_from_slice(&t.rows[at..at + t.fields[i].size()]);
            }
        }
        Ok(out)
    }

    fn write_rows(&mut self, table: TableId, start: usize, data: &[u8]) -> Result<usize> {
        let t = self.table_mut("write_rows", table)?;
        let size = t.active_size();
        if data.is_empty() || data.len() % size != 0 {
            return Err(storage_error(
                "write_rows",
                format!("{}: {} bytes is not a whole number of {size}-byte records", t.name, data.len()),
            ));
        }
        let rows = t.row_count();
        if start > rows {
            return Err(storage_error(
                "write_rows",
                format!("{}: start {start} past end ({rows} rows)", t.name),
            ));
        }
        let count = data.len() / size;
        let needed = (start + count) * t.record_size;
        if needed > t.rows.len() {
            let extra = needed - t.rows.len();
            buffer::reserve("write_rows", &mut t.rows, extra)?;
            t.rows.resize(needed, 0);
        }
        let mut src = data.chunks_exact(size);
        for row in start..start + count {
            let Some(chunk) = src.next() else { break };
            let base = row * t.record_size;
            let mut pos = 0;
            for &i in &t.active {
                let len = t.fields[i].size();
                let at = base + t.offsets[i];
                t.rows[at..at + len].copy_from_slice(&chunk[pos..pos + len]);
                pos += len;
            }
        }
        Ok(count)
    }

    fn write_attribute(
        &mut self,
        group: GroupId,
        name: &str,
        number_type: NumberType,
        data: &[u8],
    ) -> Result<()> {
        let g = self.group_mut("write_attribute", group)?;
        match g.attributes.iter_mut().find(|a| a.name == name) {
            Some(a) => {
                a.number_type = number_type;
                a.data = data.to_vec();
            }
            None => g.attributes.push(Attribute {
                name: name.to_string(),
                number_type,
                data: data.to_vec(),
            }),
        }
        Ok(())
    }

    fn read_attribute(&self, group: GroupId, name: &str) -> Result<Option<(NumberType, Vec<u8>)>> {
        Ok(self
            .group("read_attribute", group)?
            .attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| (a.number_type, a.data.clone())))
    }

    fn attribute_names(&self, group: GroupId) -> Result<Vec<String>> {
        Ok(self
            .group("attribute_names", group)?
            .attributes
            .iter()
            .map(|a| a.name.clone())
            .collect())
    }

    fn structural_metadata(&self) -> Result<String> {
        Ok(self.metadata.clone())
    }

    fn set_structural_metadata(&mut self, text: &str) -> Result<()> {
        self.metadata = text.to_string();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs_table(store: &mut MemStore) -> TableId {
        let group = store.create_group(None, "Data Vgroup", "POINT").unwrap();
        store
            .create_table(
                group,
                "Obs",
                &[
                    FieldDef::scalar("Time", NumberType::Float64),
                    FieldDef::scalar("Code", NumberType::Int16),
                ],
            )
            .unwrap()
    }

    #[test]
    fn test_projection_read_write() {
        let mut store = MemStore::new();
        let table = obs_table(&mut store);

        let mut row = Vec::new();
        row.extend_from_slice(&10.0f64.to_le_bytes());
        row.extend_from_slice(&3i16.to_le_bytes());
        assert_eq!(store.append_rows(table, &row).unwrap(), 0);

        store.set_active_fields(table, &["Code"]).unwrap();
        assert_eq!(store.active_record_size(table).unwrap(), 2);
        store.write_rows(table, 1, &7i16.to_le_bytes()).unwrap();
        assert_eq!(store.row_count(table).unwrap(), 2);

        let codes = store.read_rows(table, 0, 2).unwrap();
        assert_eq!(codes, [3i16.to_le_bytes(), 7i16.to_le_bytes()].concat());

        // Fields outside the projection of an appended record are zeroed.
        store.set_active_fields(table, &["Time"]).unwrap();
        assert_eq!(store.read_rows(table, 1, 1).unwrap(), 0.0f64.to_le_bytes());
    }

    #[test]
    fn test_write_rows_extends_table() {
        let mut store = MemStore::new();
        let table = obs_table(&mut store);
        store.set_active_fields(table, &["Code"]).unwrap();

        let codes = |values: &[i16]| -> Vec<u8> {
            values.iter().flat_map(|v| v.to_le_bytes()).collect()
        };
        assert_eq!(store.write_rows(table, 0, &codes(&[1, 2])).unwrap(), 2);
        // Overwrites row 1 and grows the table past its end.
        assert_eq!(store.write_rows(table, 1, &codes(&[5, 6, 7])).unwrap(), 3);
        assert_eq!(store.row_count(table).unwrap(), 4);
        store.write_rows(table, 4, &codes(&[8])).unwrap();
        assert_eq!(store.row_count(table).unwrap(), 5);

        assert_eq!(store.read_rows(table, 0, 5).unwrap(), codes(&[1, 5, 6, 7, 8]));
        store.set_active_fields(table, &["Time"]).unwrap();
        assert_eq!(store.read_rows(table, 4, 1).unwrap(), 0.0f64.to_le_bytes());
    }

    #[test]
    fn test_out_of_range_access() {
        let mut store = MemStore::new();
        let table = obs_table(&mut store);
        assert!(matches!(
            store.read_rows(table, 0, 1),
            Err(PointError::Storage {
                method_name: "read_rows",
                ..
            })
        ));
        assert!(store.write_rows(table, 2, &[0u8; 10]).is_err());
        assert!(store.write_rows(table, 0, &[0u8; 7]).is_err());
        assert!(store.set_active_fields(table, &["Depth"]).is_err());
    }

    #[test]
    fn test_groups_and_attributes() {
        let mut store = MemStore::new();
        let root = store.create_group(None, "Stations", "POINT").unwrap();
        let attrs = store.create_group(Some(root), "Point Attributes", "POINT Vgroup").unwrap();
        assert_eq!(store.find_group(None, "Stations").unwrap(), Some(root));
        assert_eq!(store.find_group(Some(root), "Point Attributes").unwrap(), Some(attrs));
        assert_eq!(store.group_class(root).unwrap(), "POINT");

        store.write_attribute(attrs, "Units", NumberType::Char8, b"K").unwrap();
        store.write_attribute(attrs, "Units", NumberType::Char8, b"degC").unwrap();
        assert_eq!(
            store.read_attribute(attrs, "Units").unwrap(),
            Some((NumberType::Char8, b"degC".to_vec()))
        );
        assert_eq!(store.attribute_names(attrs).unwrap(), vec!["Units".to_string()]);
        assert_eq!(store.read_attribute(attrs, "Missing").unwrap(), None);
    }
}
