//! Table storage collaborator.
//!
//! A point structure is persisted as groups of fixed-record tables plus
//! group attributes and one free-form structural metadata block. Anything
//! able to provide that can back a [`PointFile`](crate::PointFile); the
//! crate ships [`MemStore`].
//!
//! Reads and writes go through a per-table field projection set with
//! [`TableStore::set_active_fields`]. Row bytes are the concatenation of the
//! active fields, each stored little-endian.

mod mem;

pub use mem::MemStore;

use crate::errors::Result;
use crate::types::NumberType;

/// Identifier of a group inside a [`TableStore`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct GroupId(pub u32);

/// Identifier of a table inside a [`TableStore`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct TableId(pub u32);

/// One typed column of a table: a name, a number type and an order (the
/// number of values stored per record).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub number_type: NumberType,
    pub order: usize,
}

impl FieldDef {
    /// An order of `0` is stored as `1`.
    pub fn new(name: impl Into<String>, number_type: NumberType, order: usize) -> Self {
        FieldDef {
            name: name.into(),
            number_type,
            order: order.max(1),
        }
    }

    pub fn scalar(name: impl Into<String>, number_type: NumberType) -> Self {
        Self::new(name, number_type, 1)
    }

    /// Bytes occupied by this field in one record.
    pub fn size(&self) -> usize {
        self.number_type.size() * self.order.max(1)
    }
}

/// Sum of the field sizes, i.e. the bytes of one record restricted to `fields`.
pub fn record_size(fields: &[FieldDef]) -> usize {
    fields.iter().map(FieldDef::size).sum()
}

/// Storage contract used by the point layer.
pub trait TableStore {
    /// Creates a group under `parent`, or at the top level when `parent` is `None`.
    fn create_group(&mut self, parent: Option<GroupId>, name: &str, class: &str)
        -> Result<GroupId>;

    /// Child groups of `parent` (top-level groups for `None`), in creation order.
    fn groups(&self, parent: Option<GroupId>) -> Result<Vec<GroupId>>;

    fn group_name(&self, group: GroupId) -> Result<String>;

    fn group_class(&self, group: GroupId) -> Result<String>;

    /// Creates an empty table in `group`. All fields start active.
    fn create_table(&mut self, group: GroupId, name: &str, fields: &[FieldDef])
        -> Result<TableId>;

    fn tables(&self, group: GroupId) -> Result<Vec<TableId>>;

    fn table_name(&self, table: TableId) -> Result<String>;

    fn table_fields(&self, table: TableId) -> Result<Vec<FieldDef>>;

    /// Restricts subsequent reads and writes on `table` to `fields`, in the
    /// given order.
    fn set_active_fields(&mut self, table: TableId, fields: &[&str]) -> Result<()>;

    /// Bytes of one record under the current projection.
    fn active_record_size(&self, table: TableId) -> Result<usize>;

    fn row_count(&self, table: TableId) -> Result<usize>;

    /// Reads `count` projected records starting at `start`.
    fn read_rows(&self, table: TableId, start: usize, count: usize) -> Result<Vec<u8>>;

    /// Writes projected records starting at `start`, which may be at most the
    /// current row count. Records past the end are appended with inactive
    /// fields zeroed. Returns the number of records written.
    fn write_rows(&mut self, table: TableId, start: usize, data: &[u8]) -> Result<usize>;

    /// Creates or replaces an attribute of `group`.
    fn write_attribute(
        &mut self,
        group: GroupId,
        name: &str,
        number_type: NumberType,
        data: &[u8],
    ) -> Result<()>;

    fn read_attribute(&self, group: GroupId, name: &str) -> Result<Option<(NumberType, Vec<u8>)>>;

    fn attribute_names(&self, group: GroupId) -> Result<Vec<String>>;

    fn structural_metadata(&self) -> Result<String>;

    fn set_structural_metadata(&mut self, text: &str) -> Result<()>;

    /// First child group of `parent` named `name`.
    fn find_group(&self, parent: Option<GroupId>, name: &str) -> Result<Option<GroupId>> {
        for group in self.groups(parent)? {
            if self.group_name(group)? == name {
                return Ok(Some(group));
            }
        }
        Ok(None)
    }

    /// First table of `group` named `name`.
    fn find_table(&self, group: GroupId, name: &str) -> Result<Option<TableId>> {
        for table in self.tables(group)? {
            if self.table_name(table)? == name {
                return Ok(Some(table));
            }
        }
        Ok(None)
    }

    /// Appends records after the last one and returns the index of the first.
    fn append_rows(&mut self, table: TableId, data: &[u8]) -> Result<usize> {
        let start = self.row_count(table)?;
        self.write_rows(table, start, data)?;
        Ok(start)
    }
}
