use std::ops::Range;

use crate::buffer;
use crate::config::AccessFlags;
use crate::errors::{trap, PointError, Result};
use crate::handle::PointId;
use crate::point::{link_attribute_name, PointFile};
use crate::store::TableStore;
use crate::types::NumberType;

/// The children of one parent record: `extent` consecutive records of the
/// child level starting at `begin`. A parent without children has an empty
/// run.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Run {
    pub begin: usize,
    pub extent: usize,
}

impl Run {
    pub fn range(&self) -> Range<usize> {
        self.begin..self.begin + self.extent
    }

    pub fn is_empty(&self) -> bool {
        self.extent == 0
    }
}

/// Forward pointers of a level pair.
///
/// Runs are only kept while the children of every parent sit next to each
/// other in the child level. Otherwise the index is disabled and callers
/// have to scan the child level's back pointers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ForwardIndex {
    /// One run per parent record.
    Runs(Vec<Run>),
    Disabled,
}

impl ForwardIndex {
    pub fn is_disabled(&self) -> bool {
        matches!(self, ForwardIndex::Disabled)
    }
}

const NO_PARENT: i32 = -1;

fn pair(bytes: &[u8]) -> (i32, i32) {
    (
        i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        i32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
    )
}

impl<S: TableStore> PointFile<S> {
    /// Declares `link_field` as the field joining two adjacent levels.
    ///
    /// The field must exist with the same type and order in both levels.
    /// Nothing is written unless every check passes.
    pub fn define_linkage(
        &mut self,
        point: PointId,
        parent: &str,
        child: &str,
        link_field: &str,
    ) -> Result<()> {
        trap(
            "define_linkage",
            self.add_linkage(point, parent, child, link_field),
        )
    }

    fn add_linkage(&mut self, point: PointId, parent: &str, child: &str, link_field: &str) -> Result<()> {
        self.require(AccessFlags::WRITE)?;
        let pt = self.points.get(&point)?;
        let index_of = |name: &str| {
            pt.levels
                .iter()
                .position(|l| l.name == name)
                .ok_or_else(|| PointError::LevelNotFound(format!("\"{name}\"")))
        };
        let (p, c) = (index_of(parent)?, index_of(child)?);
        if c != p + 1 {
            return Err(PointError::Linkage(format!(
                "\"{parent}\" (level {p}) and \"{child}\" (level {c}) are not adjacent parent and child"
            )));
        }
        let in_level = |level: usize, name: &str| {
            pt.levels[level].field(link_field).cloned().ok_or_else(|| {
                PointError::Linkage(format!("link field \"{link_field}\" not in level \"{name}\""))
            })
        };
        let (pf, cf) = (in_level(p, parent)?, in_level(c, child)?);
        if pf.number_type != cf.number_type || pf.order != cf.order {
            return Err(PointError::Linkage(format!(
                "link field \"{link_field}\" is {}x{} in \"{parent}\" but {}x{} in \"{child}\"",
                pf.number_type, pf.order, cf.number_type, cf.order
            )));
        }
        if pt.links[c].is_some() {
            return Err(PointError::AlreadyExists(format!(
                "linkage \"{parent}\" -> \"{child}\""
            )));
        }
        let link_group = pt.link_group;

        self.store.write_attribute(
            link_group,
            &link_attribute_name(c),
            NumberType::Char8,
            link_field.as_bytes(),
        )?;
        self.points.get_mut(&point)?.links[c] = Some(link_field.to_string());
        self.refresh_metadata()?;
        log::debug!("linked \"{parent}\" -> \"{child}\" by \"{link_field}\" on {point}");
        Ok(())
    }

    /// Field linking `level` to its parent.
    pub fn back_link_field(&self, point: PointId, level: usize) -> Result<String> {
        let field = self
            .points
            .get(&point)
            .and_then(|p| p.level(level).and_then(|_| p.link(level)).map(str::to_string));
        trap("back_link_field", field)
    }

    /// Field linking `level` to its child.
    pub fn forward_link_field(&self, point: PointId, level: usize) -> Result<String> {
        let field = self
            .points
            .get(&point)
            .and_then(|p| p.level(level).and_then(|_| p.link(level + 1)).map(str::to_string));
        trap("forward_link_field", field)
    }

    /// Parent record of every record of `level`; `None` where the link
    /// value matched no parent.
    pub fn back_pointers(&self, point: PointId, level: usize) -> Result<Vec<Option<usize>>> {
        trap("back_pointers", self.load_back_pointers(point, level))
    }

    pub(crate) fn load_back_pointers(&self, point: PointId, level: usize) -> Result<Vec<Option<usize>>> {
        let pt = self.points.get(&point)?;
        pt.level(level)?;
        pt.link(level)?;
        let table = pt.levels[level].back.ok_or_else(|| missing_table(level))?;

        let count = self.rows(point, level)?;
        let stored = count.min(self.store.row_count(table)?);
        let raw = self.store.read_rows(table, 0, stored)?;
        let mut out = buffer::with_capacity("back_pointers", count)?;
        out.extend(raw.chunks_exact(4).map(|b| {
            let v = i32::from_le_bytes([b[0], b[1], b[2], b[3]]);
            usize::try_from(v).ok()
        }));
        out.resize(count, None);
        Ok(out)
    }

    /// Parent records of the listed records of `level`.
    pub fn read_back_pointers(
        &self,
        point: PointId,
        level: usize,
        records: &[usize],
    ) -> Result<Vec<Option<usize>>> {
        let pointers = self.load_back_pointers(point, level).and_then(|all| {
            records
                .iter()
                .map(|&r| {
                    all.get(r).copied().ok_or(PointError::RecordOutOfRange {
                        level,
                        record: r,
                        count: all.len(),
                    })
                })
                .collect()
        });
        trap("read_back_pointers", pointers)
    }

    /// Forward pointers from `level` into `level + 1`.
    pub fn forward_index(&self, point: PointId, level: usize) -> Result<ForwardIndex> {
        trap("forward_index", self.load_forward_index(point, level))
    }

    pub(crate) fn load_forward_index(&self, point: PointId, level: usize) -> Result<ForwardIndex> {
        let pt = self.points.get(&point)?;
        pt.level(level)?;
        pt.link(level + 1)?;
        let table = pt.levels[level]
            .forward
            .ok_or_else(|| missing_table(level + 1))?;

        let stored = self.store.row_count(table)?;
        if stored > 0 && pair(&self.store.read_rows(table, 0, 1)?) == (-1, -1) {
            return Ok(ForwardIndex::Disabled);
        }
        let count = self.rows(point, level)?;
        let raw = self.store.read_rows(table, 0, count.min(stored))?;
        let mut runs = buffer::with_capacity("forward_index", count)?;
        runs.extend(raw.chunks_exact(8).map(|b| match pair(b) {
            (begin, extent) if begin >= 0 && extent > 0 => Run {
                begin: begin as usize,
                extent: extent as usize,
            },
            _ => Run::default(),
        }));
        // Parents appended after the last child write have no children yet.
        runs.resize(count, Run::default());
        Ok(ForwardIndex::Runs(runs))
    }

    /// Runs of the listed records of `level`. Fails when the forward index
    /// of the pair is disabled.
    pub fn read_forward_pointers(&self, point: PointId, level: usize, records: &[usize]) -> Result<Vec<Run>> {
        let runs = self
            .load_forward_index(point, level)
            .and_then(|index| match index {
                ForwardIndex::Runs(runs) => records
                    .iter()
                    .map(|&r| {
                        runs.get(r).copied().ok_or(PointError::RecordOutOfRange {
                            level,
                            record: r,
                            count: runs.len(),
                        })
                    })
                    .collect(),
                ForwardIndex::Disabled => Err(PointError::Linkage(format!(
                    "forward pointers from level {level} are disabled: children are not contiguous"
                ))),
            });
        trap("read_forward_pointers", runs)
    }

    /// Links the listed records of `child` to the first parent record whose
    /// link value is byte-equal to theirs. Records with no match are left
    /// unlinked.
    pub(crate) fn write_back_pointers(&mut self, point: PointId, child: usize, records: &[usize]) -> Result<()> {
        let pt = self.points.get(&point)?;
        let field = pt.link(child)?.to_string();
        let parent = child - 1;
        let parent_table = pt.level(parent)?.table;
        let child_level = pt.level(child)?;
        let child_table = child_level.table;
        let back = child_level.back.ok_or_else(|| missing_table(child))?;
        let size = child_level
            .field(&field)
            .map(|f| f.size())
            .ok_or_else(|| PointError::FieldNotFound {
                field: field.clone(),
                level: Some(child),
            })?;
        let parents = self.rows(point, parent)?;

        self.store.set_active_fields(parent_table, &[field.as_str()])?;
        let parent_values = self.store.read_rows(parent_table, 0, parents)?;
        self.store.set_active_fields(child_table, &[field.as_str()])?;
        let child_values = self.read_records(child_table, records, size)?;

        let mut unmatched = 0;
        for (&record, key) in records.iter().zip(child_values.chunks_exact(size)) {
            let found = parent_values.chunks_exact(size).position(|p| p == key);
            let value = match found {
                Some(p) => p as i32,
                None => {
                    unmatched += 1;
                    NO_PARENT
                }
            };
            self.store.write_rows(back, record, &value.to_le_bytes())?;
        }
        if unmatched > 0 {
            log::debug!("{unmatched} records of level {child} on {point} have no parent");
        }
        Ok(())
    }

    /// Rebuilds the forward pointers from `parent` into the next level.
    ///
    /// Each parent gets the run of its children. If the children of any
    /// parent are not contiguous, only a disabling `(-1, -1)` record is
    /// written at the front of the table.
    pub(crate) fn write_forward_pointers(&mut self, point: PointId, parent: usize) -> Result<()> {
        let pt = self.points.get(&point)?;
        let Some(table) = pt.level(parent)?.forward else {
            return Ok(());
        };
        let parents = self.rows(point, parent)?;
        let children = self.rows(point, parent + 1)?;
        if parents == 0 || children == 0 {
            return Ok(());
        }

        let back = self.load_back_pointers(point, parent + 1)?;
        let mut first = buffer::filled("write_forward_pointers", parents, None::<usize>)?;
        let mut last = buffer::filled("write_forward_pointers", parents, 0usize)?;
        for (i, p) in back.iter().enumerate() {
            let Some(p) = *p else { continue };
            if p >= parents {
                continue;
            }
            let current = first[p];
            match current {
                None => {
                    first[p] = Some(i);
                    last[p] = i;
                }
                Some(_) if i == last[p] + 1 => last[p] = i,
                Some(_) => {
                    log::warn!(
                        "children of record {p} in level {parent} on {point} are not contiguous, \
                         forward pointers disabled"
                    );
                    let mut sentinel = (-1i32).to_le_bytes().to_vec();
                    sentinel.extend_from_slice(&(-1i32).to_le_bytes());
                    self.store.write_rows(table, 0, &sentinel)?;
                    return Ok(());
                }
            }
        }

        let mut bytes = buffer::with_capacity("write_forward_pointers", parents * 8)?;
        for (begin, end) in first.iter().zip(&last) {
            let (b, e) = match begin {
                Some(b) => (*b as i32, (end - b + 1) as i32),
                None => (-1, 0),
            };
            bytes.extend_from_slice(&b.to_le_bytes());
            bytes.extend_from_slice(&e.to_le_bytes());
        }
        self.store.write_rows(table, 0, &bytes)?;
        log::trace!("forward pointers of level {parent} on {point} rebuilt for {parents} records");
        Ok(())
    }
}

fn missing_table(level: usize) -> PointError {
    PointError::Storage {
        method_name: "linkage",
        msg: format!("pointer table of level {level} is missing"),
    }
}
