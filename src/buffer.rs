//! Fallible allocation for index and record buffers.
//!
//! Every buffer whose size depends on table contents is allocated through
//! this module so that allocation failure surfaces as
//! [`PointError::OutOfMemory`] instead of aborting the process.

use crate::errors::{PointError, Result};

/// Allocates an empty vector able to hold `capacity` elements.
pub(crate) fn with_capacity<T>(routine: &'static str, capacity: usize) -> Result<Vec<T>> {
    let mut v = Vec::new();
    reserve(routine, &mut v, capacity)?;
    Ok(v)
}

/// Allocates a vector of `len` copies of `value`.
pub(crate) fn filled<T: Clone>(routine: &'static str, len: usize, value: T) -> Result<Vec<T>> {
    let mut v = with_capacity(routine, len)?;
    v.resize(len, value);
    Ok(v)
}

/// Grows `v` so that `additional` more elements fit without reallocation.
pub(crate) fn reserve<T>(routine: &'static str, v: &mut Vec<T>, additional: usize) -> Result<()> {
    let oom = PointError::OutOfMemory {
        routine,
        requested: additional,
    };
    if fault::should_fail() {
        return Err(oom);
    }
    v.try_reserve_exact(additional).map_err(|_| oom)
}

/// Copies `src` into a freshly allocated vector.
pub(crate) fn copied<T: Clone>(routine: &'static str, src: &[T]) -> Result<Vec<T>> {
    let mut v = with_capacity(routine, src.len())?;
    v.extend_from_slice(src);
    Ok(v)
}

#[cfg(not(test))]
mod fault {
    #[inline(always)]
    pub(super) fn should_fail() -> bool {
        false
    }
}


/// Counts live heap bytes per thread, so leak checks are not disturbed by
/// tests running in parallel.
#[cfg(test)]
pub(crate) mod counting {
    use std::alloc::{GlobalAlloc, Layout, System};
    use std::cell::Cell;

    thread_local! {
        static LIVE: Cell<isize> = const { Cell::new(0) };
    }

    fn add(delta: isize) {
        let _ = LIVE.try_with(|l| l.set(l.get() + delta));
    }

    pub(crate) fn live_bytes() -> isize {
        LIVE.with(|l| l.get())
    }

    pub(crate) struct CountingAlloc;

    unsafe impl GlobalAlloc for CountingAlloc {
        unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
            let p = System.alloc(layout);
            if !p.is_null() {
                add(layout.size() as isize);
            }
            p
        }

        unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
            let p = System.alloc_zeroed(layout);
            if !p.is_null() {
                add(layout.size() as isize);
            }
            p
        }

        unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
            System.dealloc(ptr, layout);
            add(-(layout.size() as isize));
        }

        unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
            let p = System.realloc(ptr, layout, new_size);
            if !p.is_null() {
                add(new_size as isize - layout.size() as isize);
            }
            p
        }
    }

    #[global_allocator]
    static GLOBAL: CountingAlloc = CountingAlloc;
}
