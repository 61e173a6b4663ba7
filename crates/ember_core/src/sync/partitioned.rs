//! # Partitioned Slots
//!
//! Fixed-length storage that many threads may write at once, provided no two
//! threads ever touch the same slot in the same phase.
//!
//! ## Safety Note
//!
//! This module requires unsafe code to hand out `&mut T` through `&self`.
//! Every unsafe block is covered by the contract of the unsafe method that
//! contains it.

#![allow(unsafe_code)]

use std::cell::UnsafeCell;
use std::fmt;
use std::slice;

/// Slot storage with lock-free disjoint mutable access.
///
/// Single-threaded code uses the safe `&mut self` methods. The parallel phase
/// uses [`PartitionedSlots::slot_unchecked`] and
/// [`PartitionedSlots::range_unchecked`], whose callers guarantee that slot
/// sets are disjoint across threads.
///
/// ## Usage
///
/// ```rust,ignore
/// let slots = PartitionedSlots::new(8, 0u32);
/// std::thread::scope(|s| {
///     for thread in 0..2 {
///         let slots = &slots;
///         s.spawn(move || {
///             for i in (thread..slots.len()).step_by(2) {
///                 // SAFETY: stride 2 from distinct starts never overlaps.
///                 unsafe { *slots.slot_unchecked(i) += 1 };
///             }
///         });
///     }
/// });
/// ```
pub struct PartitionedSlots<T> {
    slots: Box<[UnsafeCell<T>]>,
}

// SAFETY: sharing across threads only exposes `&T` through safe methods, and
// `&mut T` through unsafe methods whose callers guarantee exclusive slots.
unsafe impl<T: Send + Sync> Sync for PartitionedSlots<T> {}

impl<T> Default for PartitionedSlots<T> {
    fn default() -> Self {
        Self {
            slots: Box::new([]),
        }
    }
}

impl<T> fmt::Debug for PartitionedSlots<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionedSlots")
            .field("len", &self.slots.len())
            .finish()
    }
}

impl<T: Clone> PartitionedSlots<T> {
    /// Creates `len` slots holding `fill`.
    #[must_use]
    pub fn new(len: usize, fill: T) -> Self {
        Self {
            slots: (0..len).map(|_| UnsafeCell::new(fill.clone())).collect(),
        }
    }

    /// Grows to at least `len` slots, keeping existing contents.
    ///
    /// Never shrinks. Returns true if storage was reallocated.
    pub fn grow(&mut self, len: usize, fill: T) -> bool {
        if len <= self.slots.len() {
            return false;
        }
        let mut slots = std::mem::take(&mut self.slots).into_vec();
        slots.resize_with(len, || UnsafeCell::new(fill.clone()));
        self.slots = slots.into_boxed_slice();
        true
    }

    /// Resizes to exactly `len` slots and resets every slot to `fill`.
    pub fn reset(&mut self, len: usize, fill: T) {
        if self.slots.len() == len {
            for slot in self.as_mut_slice() {
                *slot = fill.clone();
            }
        } else {
            *self = Self::new(len, fill);
        }
    }
}

impl<T> PartitionedSlots<T> {
    /// Number of slots.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if there are no slots.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Shared view of every slot.
    ///
    /// Must not overlap a parallel phase; the unsafe accessors' contract
    /// forbids any other reference to a slot they hand out.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: UnsafeCell<T> has the same layout as T. Outstanding `&mut T`
        // from the unsafe accessors are excluded by their contract.
        unsafe { slice::from_raw_parts(self.slots.as_ptr().cast::<T>(), self.slots.len()) }
    }

    /// Exclusive view of every slot.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: `&mut self` proves no other reference exists.
        unsafe { slice::from_raw_parts_mut(self.slots.as_mut_ptr().cast::<T>(), self.slots.len()) }
    }

    /// Shared reference to one slot.
    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.as_slice().get(index)
    }

    /// Exclusive reference to one slot.
    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slots.get_mut(index).map(UnsafeCell::get_mut)
    }

    /// Mutable reference to one slot through a shared borrow.
    ///
    /// # Safety
    ///
    /// - `index < self.len()`
    /// - For the lifetime of the returned reference, no other reference
    ///   (shared or mutable, on any thread) to slot `index` may exist.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn slot_unchecked(&self, index: usize) -> &mut T {
        debug_assert!(index < self.slots.len());
        &mut *self.slots.get_unchecked(index).get()
    }

    /// Mutable slice of `len` slots starting at `start` through a shared borrow.
    ///
    /// # Safety
    ///
    /// - `start + len <= self.len()`
    /// - For the lifetime of the returned slice, no other reference (shared
    ///   or mutable, on any thread) to any slot in the range may exist.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn range_unchecked(&self, start: usize, len: usize) -> &mut [T] {
        debug_assert!(start + len <= self.slots.len());
        let first = UnsafeCell::raw_get(self.slots.as_ptr().add(start));
        slice::from_raw_parts_mut(first, len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grow_keeps_contents() {
        let mut slots = PartitionedSlots::new(2, 1u8);
        slots.as_mut_slice()[1] = 7;

        assert!(slots.grow(4, 0));
        assert_eq!(slots.as_slice(), &[1, 7, 0, 0]);

        // Never shrinks
        assert!(!slots.grow(1, 0));
        assert_eq!(slots.len(), 4);
    }

    #[test]
    fn test_reset() {
        let mut slots = PartitionedSlots::new(3, 5u32);
        slots.as_mut_slice()[0] = 1;
        slots.reset(3, 9);
        assert_eq!(slots.as_slice(), &[9, 9, 9]);
        slots.reset(1, 2);
        assert_eq!(slots.as_slice(), &[2]);
    }

    #[test]
    fn test_strided_writes_from_threads() {
        const THREADS: usize = 4;
        let slots = PartitionedSlots::new(103, 0usize);

        std::thread::scope(|scope| {
            for thread in 0..THREADS {
                let slots = &slots;
                scope.spawn(move || {
                    for i in (thread..slots.len()).step_by(THREADS) {
                        // SAFETY: distinct starts with a shared stride never overlap.
                        unsafe { *slots.slot_unchecked(i) += thread + 1 };
                    }
                });
            }
        });

        // Every slot written exactly once, by the thread owning its residue.
        for (i, value) in slots.as_slice().iter().enumerate() {
            assert_eq!(*value, i % THREADS + 1);
        }
    }

    #[test]
    fn test_range_writes() {
        let slots = PartitionedSlots::new(6, 0u8);
        // SAFETY: single thread, no other references.
        unsafe { slots.range_unchecked(2, 3).copy_from_slice(&[1, 2, 3]) };
        assert_eq!(slots.as_slice(), &[0, 0, 1, 2, 3, 0]);
    }
}
