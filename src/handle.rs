use std::fmt::{Display, Formatter};

use crate::errors::{PointError, Result};

/// Identifier of an open point structure (generational).
///
/// Ids stay cheap to copy; a detached id is detected through its generation
/// even after the slot has been reused.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct PointId(u32, u32);

/// Identifier of a live region (generational).
///
/// A region is owned by whoever holds this id. It is not `Clone`: the id is
/// consumed by [`PointFile::release_region`](crate::PointFile::release_region).
#[derive(Debug, Eq, PartialEq, Hash)]
#[must_use = "a region stays allocated until it is released"]
pub struct RegionId(u32, u32);

pub(crate) trait SlotKey {
    const KIND: &'static str;
    fn new(idx: u32, generation: u32) -> Self;
    fn idx(&self) -> usize;
    fn generation(&self) -> u32;
}

impl SlotKey for PointId {
    const KIND: &'static str = "point";

    fn new(idx: u32, generation: u32) -> Self {
        Self(idx, generation)
    }

    fn idx(&self) -> usize {
        self.0 as usize
    }

    fn generation(&self) -> u32 {
        self.1
    }
}

impl SlotKey for RegionId {
    const KIND: &'static str = "region";

    fn new(idx: u32, generation: u32) -> Self {
        Self(idx, generation)
    }

    fn idx(&self) -> usize {
        self.0 as usize
    }

    fn generation(&self) -> u32 {
        self.1
    }
}

impl Display for PointId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "point#{}.{}", self.0, self.1)
    }
}

impl Display for RegionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "region#{}.{}", self.0, self.1)
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Fixed-capacity pool of generational slots with a free list.
pub(crate) struct Arena<T> {
    slots: Vec<Slot<T>>,
    free_list: Vec<usize>,
    capacity: usize,
    what: &'static str,
}

impl<T> Arena<T> {
    pub(crate) fn new(capacity: usize, what: &'static str) -> Self {
        Arena {
            slots: Vec::new(),
            free_list: Vec::new(),
            capacity,
            what,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len() - self.free_list.len()
    }

    /// Claims a slot for `value`, reusing freed slots first.
    pub(crate) fn insert<K: SlotKey>(&mut self, value: T) -> Result<K> {
        if self.len() >= self.capacity {
            return Err(PointError::CapacityExceeded {
                what: self.what,
                limit: self.capacity,
            });
        }
        let (idx, generation) = if let Some(idx) = self.free_list.pop() {
            let slot = &mut self.slots[idx];
            slot.generation = slot.generation.wrapping_add(1);
            slot.value = Some(value);
            (idx, slot.generation)
        } else {
            self.slots.push(Slot {
                generation: 1,
                value: Some(value),
            });
            (self.slots.len() - 1, 1)
        };
        Ok(K::new(idx as u32, generation))
    }

    fn invalid<K: SlotKey>(key: &K) -> PointError {
        PointError::InvalidHandle {
            kind: K::KIND,
            slot: key.idx() as u32,
            generation: key.generation(),
        }
    }

    pub(crate) fn get<K: SlotKey>(&self, key: &K) -> Result<&T> {
        self.slots
            .get(key.idx())
            .filter(|s| s.generation == key.generation())
            .and_then(|s| s.value.as_ref())
            .ok_or_else(|| Self::invalid(key))
    }

    pub(crate) fn get_mut<K: SlotKey>(&mut self, key: &K) -> Result<&mut T> {
        self.slots
            .get_mut(key.idx())
            .filter(|s| s.generation == key.generation())
            .and_then(|s| s.value.as_mut())
            .ok_or_else(|| Self::invalid(key))
    }

    pub(crate) fn remove<K: SlotKey>(&mut self, key: &K) -> Result<T> {
        let slot = self
            .slots
            .get_mut(key.idx())
            .filter(|s| s.generation == key.generation())
            .ok_or_else(|| Self::invalid(key))?;
        let value = slot.value.take().ok_or_else(|| Self::invalid(key))?;
        self.free_list.push(key.idx());
        Ok(value)
    }

    /// Drops every live value for which `f` returns `false`.
    pub(crate) fn retain(&mut self, mut f: impl FnMut(&T) -> bool) {
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            if let Some(value) = &slot.value {
                if !f(value) {
                    slot.value = None;
                    self.free_list.push(idx);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_id_after_reuse() {
        let mut arena: Arena<&str> = Arena::new(2, "points");
        let a: PointId = arena.insert("a").unwrap();
        assert_eq!(*arena.get(&a).unwrap(), "a");
        arena.remove(&a).unwrap();

        let b: PointId = arena.insert("b").unwrap();
        assert_eq!(a.idx(), b.idx());
        assert!(matches!(
            arena.get(&a),
            Err(PointError::InvalidHandle { kind: "point", .. })
        ));
        assert_eq!(*arena.get(&b).unwrap(), "b");
    }

    #[test]
    fn test_capacity() {
        let mut arena: Arena<u8> = Arena::new(1, "regions");
        let _r: RegionId = arena.insert(1).unwrap();
        let err = arena.insert::<RegionId>(2).unwrap_err();
        assert_eq!(
            err,
            PointError::CapacityExceeded {
                what: "regions",
                limit: 1
            }
        );
    }

    #[test]
    fn test_retain_frees_slots() {
        let mut arena: Arena<u8> = Arena::new(4, "regions");
        let keep: RegionId = arena.insert(1).unwrap();
        let drop: RegionId = arena.insert(2).unwrap();
        arena.retain(|v| *v == 1);
        assert_eq!(arena.len(), 1);
        assert!(arena.get(&keep).is_ok());
        assert!(arena.get(&drop).is_err());
    }
}
