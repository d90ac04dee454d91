//! Regions: per-level record selections derived from a selection at one
//! level.
//!
//! A selection at the pivot level is carried towards the root through back
//! pointers, where children of the same parent collapse into one parent
//! record, and towards the leaves through forward pointers, where each
//! parent expands to its run of children. A level pair whose forward index
//! is disabled is expanded by scanning the child level's back pointers.

pub mod subset;

use crate::buffer;
use crate::errors::{trap, PointError, Result};
use crate::handle::{PointId, RegionId};
use crate::point::{ForwardIndex, PointFile};
use crate::store::{record_size, TableStore};

pub(crate) type Selection = Vec<Option<Vec<usize>>>;

pub(crate) struct Region {
    pub(crate) point: PointId,
    /// `None` for levels outside the propagation bounds.
    pub(crate) levels: Selection,
}

/// Records whose flag is set, in ascending order.
fn flagged(routine: &'static str, keep: &[bool]) -> Result<Vec<usize>> {
    let count = keep.iter().filter(|&&k| k).count();
    let mut out = buffer::with_capacity(routine, count)?;
    out.extend(keep.iter().enumerate().filter(|(_, &k)| k).map(|(i, _)| i));
    Ok(out)
}

impl<S: TableStore> PointFile<S> {
    /// Carries `seed`, a selection at `pivot`, down to `min_level` and up to
    /// `max_level`. A bound of `None` skips that direction.
    pub(crate) fn propagate(
        &self,
        point: PointId,
        pivot: usize,
        seed: Vec<usize>,
        min_level: Option<usize>,
        max_level: Option<usize>,
    ) -> Result<Selection> {
        let nlevels = self.points.get(&point)?.levels.len();
        let mut levels: Selection = buffer::filled("propagate", nlevels, None)?;
        log::trace!("propagating {} records from level {pivot} on {point}", seed.len());
        levels[pivot] = Some(seed);

        if let Some(min) = min_level {
            for j in (min..pivot).rev() {
                let below: &[usize] = levels[j + 1].as_deref().unwrap_or(&[]);
                let back = self.load_back_pointers(point, j + 1)?;
                let mut keep = buffer::filled("propagate", self.rows(point, j)?, false)?;
                for &k in below {
                    if let Some(Some(p)) = back.get(k) {
                        if let Some(flag) = keep.get_mut(*p) {
                            *flag = true;
                        }
                    }
                }
                let selected = flagged("propagate", &keep)?;
                log::trace!("level {j}: {} records", selected.len());
                levels[j] = Some(selected);
            }
        }

        if let Some(max) = max_level {
            for j in pivot + 1..=max {
                let above: &[usize] = levels[j - 1].as_deref().unwrap_or(&[]);
                let selected = match self.load_forward_index(point, j - 1)? {
                    ForwardIndex::Runs(runs) => {
                        let total = above
                            .iter()
                            .filter_map(|&p| runs.get(p))
                            .map(|r| r.extent)
                            .sum();
                        let mut out = buffer::with_capacity("propagate", total)?;
                        for &p in above {
                            if let Some(run) = runs.get(p) {
                                out.extend(run.range());
                            }
                        }
                        out
                    }
                    ForwardIndex::Disabled => {
                        let back = self.load_back_pointers(point, j)?;
                        let mut keep = buffer::filled("propagate", back.len(), false)?;
                        for (flag, parent) in keep.iter_mut().zip(&back) {
                            *flag = parent.is_some_and(|p| above.contains(&p));
                        }
                        flagged("propagate", &keep)?
                    }
                };
                log::trace!("level {j}: {} records", selected.len());
                levels[j] = Some(selected);
            }
        }
        Ok(levels)
    }

    /// Propagates a selection over every level and keeps it as a region.
    pub(crate) fn new_region(&mut self, point: PointId, pivot: usize, seed: Vec<usize>) -> Result<RegionId> {
        let last = self.points.get(&point)?.levels.len().saturating_sub(1);
        let levels = self.propagate(point, pivot, seed, Some(0), Some(last))?;
        self.regions.insert(Region { point, levels })
    }

    /// Defines a region from explicit record numbers of `level`.
    ///
    /// The selection is carried down to `min_level` and up to `max_level`;
    /// levels outside the bounds stay empty. With both bounds equal to
    /// `level` the region holds exactly `records`.
    pub fn define_record_region(
        &mut self,
        point: PointId,
        level: usize,
        records: &[usize],
        min_level: Option<usize>,
        max_level: Option<usize>,
    ) -> Result<RegionId> {
        trap(
            "define_record_region",
            self.record_region(point, level, records, min_level, max_level),
        )
    }

    fn record_region(
        &mut self,
        point: PointId,
        level: usize,
        records: &[usize],
        min_level: Option<usize>,
        max_level: Option<usize>,
    ) -> Result<RegionId> {
        let levels = self.select(point, level, records, min_level, max_level)?;
        self.regions.insert(Region { point, levels })
    }

    fn select(
        &self,
        point: PointId,
        level: usize,
        records: &[usize],
        min_level: Option<usize>,
        max_level: Option<usize>,
    ) -> Result<Selection> {
        let nlevels = self.points.get(&point)?.levels.len();
        if level >= nlevels {
            return Err(PointError::LevelNotFound(level.to_string()));
        }
        if min_level.is_some_and(|m| m > level) || max_level.is_some_and(|m| m < level || m >= nlevels) {
            return Err(PointError::BadArgument(format!(
                "bounds {min_level:?}..={max_level:?} do not enclose level {level} of {nlevels}"
            )));
        }
        let count = self.rows(point, level)?;
        if let Some(&record) = records.iter().find(|&&r| r >= count) {
            return Err(PointError::RecordOutOfRange {
                level,
                record,
                count,
            });
        }
        let seed = buffer::copied("define_record_region", records)?;
        self.propagate(point, level, seed, min_level, max_level)
    }

    /// Maps records of `in_level` to the related records of `out_level`.
    ///
    /// Uses a transient region that is released before returning. Records
    /// are returned unchanged when both levels are the same.
    pub fn get_record_numbers(
        &mut self,
        point: PointId,
        in_level: usize,
        out_level: usize,
        records: &[usize],
    ) -> Result<Vec<usize>> {
        trap(
            "get_record_numbers",
            self.map_records(point, in_level, out_level, records),
        )
    }

    fn map_records(
        &mut self,
        point: PointId,
        in_level: usize,
        out_level: usize,
        records: &[usize],
    ) -> Result<Vec<usize>> {
        let nlevels = self.points.get(&point)?.levels.len();
        if out_level >= nlevels {
            return Err(PointError::LevelNotFound(out_level.to_string()));
        }
        if in_level == out_level {
            return buffer::copied("get_record_numbers", records);
        }
        let (min, max) = if out_level < in_level {
            (Some(out_level), None)
        } else {
            (None, Some(out_level))
        };
        let region = self.record_region(point, in_level, records, min, max)?;
        let mapped = self.regions.get(&region)?.levels[out_level]
            .clone()
            .unwrap_or_default();
        self.regions.remove(&region)?;
        Ok(mapped)
    }

    pub(crate) fn region(&self, point: PointId, region: &RegionId) -> Result<&Region> {
        self.points.get(&point)?;
        let r = self.regions.get(region)?;
        if r.point != point {
            return Err(PointError::BadArgument(format!(
                "{region} belongs to {}, not {point}",
                r.point
            )));
        }
        Ok(r)
    }

    fn region_level(&self, point: PointId, region: &RegionId, level: usize) -> Result<&[usize]> {
        let r = self.region(point, region)?;
        let selected = r
            .levels
            .get(level)
            .ok_or_else(|| PointError::LevelNotFound(level.to_string()))?;
        Ok(selected.as_deref().unwrap_or(&[]))
    }

    /// Record numbers selected at `level`, in propagation order.
    pub fn region_records(&self, point: PointId, region: &RegionId, level: usize) -> Result<Vec<usize>> {
        trap(
            "region_records",
            self.region_level(point, region, level).map(<[usize]>::to_vec),
        )
    }

    pub fn region_count(&self, point: PointId, region: &RegionId, level: usize) -> Result<usize> {
        trap(
            "region_count",
            self.region_level(point, region, level).map(<[usize]>::len),
        )
    }

    /// Bytes needed to extract the named fields of the selected records.
    pub fn region_info(
        &self,
        point: PointId,
        region: &RegionId,
        level: usize,
        fields: &[&str],
    ) -> Result<usize> {
        let size = self.region_level(point, region, level).and_then(|selected| {
            let defs = self.level_fields_unchecked(point, level, fields)?;
            Ok(selected.len() * record_size(&defs))
        });
        trap("region_info", size)
    }

    fn level_fields_unchecked(
        &self,
        point: PointId,
        level: usize,
        fields: &[&str],
    ) -> Result<Vec<crate::store::FieldDef>> {
        let pt = self.points.get(&point)?;
        crate::point::resolve_fields(pt.level(level)?, level, fields)
    }

    /// Reads the named fields of the selected records.
    pub fn extract_region(
        &mut self,
        point: PointId,
        region: &RegionId,
        level: usize,
        fields: &[&str],
    ) -> Result<Vec<u8>> {
        let records = self
            .region_level(point, region, level)
            .and_then(|selected| buffer::copied("extract_region", selected));
        let data = records.and_then(|records| self.read_fields(point, level, fields, Some(&records)));
        trap("extract_region", data)
    }

    /// Frees a region.
    pub fn release_region(&mut self, region: RegionId) -> Result<()> {
        trap("release_region", self.regions.remove(&region).map(drop))
    }
}
