//! # Generational Arena
//!
//! Slot storage with stable handles and stale-handle detection.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Handle to a value stored in an [`Arena`].
///
/// The handle is split into two parts:
/// - `index`: slot in the arena (stable for the value's lifetime)
/// - `generation`: bumped when the slot is freed, so old handles go stale
pub struct Handle<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    #[inline]
    const fn new(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    /// Slot index. Dense enough to index per-slot side tables.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.index as usize
    }

    /// Generation counter of the slot when this handle was issued.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}v{})", self.index, self.generation)
    }
}

#[derive(Clone, Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot storage addressed by generational [`Handle`]s.
///
/// # Thread Safety
///
/// The arena itself is plain data; share it the way you would share a `Vec`.
///
/// # Example
///
/// ```rust,ignore
/// let mut arena: Arena<&str> = Arena::new();
/// let a = arena.insert("spark");
/// arena.remove(a);
/// assert!(arena.get(a).is_none()); // stale handle
/// ```
#[derive(Clone, Debug)]
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    /// Free list - indices of vacant slots.
    free_list: Vec<u32>,
    len: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    /// Creates an empty arena.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            len: 0,
        }
    }

    /// Number of live values.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no value is stored.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots, live or vacant. Upper bound for [`Handle::index`].
    #[inline]
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Stores a value, reusing a vacant slot when available.
    ///
    /// # Panics
    ///
    /// Panics if more than `u32::MAX` slots would be needed.
    pub fn insert(&mut self, value: T) -> Handle<T> {
        self.len += 1;
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return Handle::new(index, slot.generation);
        }
        let index = u32::try_from(self.slots.len()).expect("arena slot count exceeds u32");
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        Handle::new(index, 0)
    }

    /// Removes a value. Returns `None` if the handle is stale.
    pub fn remove(&mut self, handle: Handle<T>) -> Option<T> {
        let slot = self.slots.get_mut(handle.index())?;
        if slot.generation != handle.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(handle.index);
        self.len -= 1;
        Some(value)
    }

    /// Returns true if the handle refers to a live value.
    #[inline]
    #[must_use]
    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.get(handle).is_some()
    }

    /// Gets a reference to a live value.
    #[inline]
    #[must_use]
    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        let slot = self.slots.get(handle.index())?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_ref()
    }

    /// Gets a mutable reference to a live value.
    #[inline]
    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        let slot = self.slots.get_mut(handle.index())?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_mut()
    }

    /// Current handle of the value in slot `index`, if the slot is live.
    #[must_use]
    pub fn handle_at(&self, index: usize) -> Option<Handle<T>> {
        let slot = self.slots.get(index)?;
        slot.value.as_ref()?;
        let index = u32::try_from(index).ok()?;
        Some(Handle::new(index, slot.generation))
    }

    /// Gets the value in slot `index` without a generation check.
    #[inline]
    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&T> {
        self.slots.get(index)?.value.as_ref()
    }

    /// Removes every value. Outstanding handles go stale.
    #[allow(clippy::cast_possible_truncation)]
    pub fn clear(&mut self) {
        self.free_list.clear();
        for (index, slot) in self.slots.iter_mut().enumerate().rev() {
            if slot.value.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
            }
            // Indices fit: they were issued by insert().
            self.free_list.push(index as u32);
        }
        self.len = 0;
    }

    /// Iterates over live values in slot order.
    #[allow(clippy::cast_possible_truncation)]
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value
                .as_ref()
                .map(|value| (Handle::new(index as u32, slot.generation), value))
        })
    }

    /// Iterates mutably over live values in slot order.
    #[allow(clippy::cast_possible_truncation)]
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle<T>, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let generation = slot.generation;
            slot.value
                .as_mut()
                .map(|value| (Handle::new(index as u32, generation), value))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove() {
        let mut arena: Arena<u32> = Arena::new();

        let h1 = arena.insert(42);
        assert_eq!(arena.get(h1), Some(&42));
        assert_eq!(arena.len(), 1);

        assert_eq!(arena.remove(h1), Some(42));
        assert_eq!(arena.len(), 0);
        assert!(arena.get(h1).is_none());
    }

    #[test]
    fn test_stale_handle_after_reuse() {
        let mut arena: Arena<u32> = Arena::new();

        let h1 = arena.insert(1);
        arena.remove(h1);
        let h2 = arena.insert(2);

        assert_eq!(h1.index(), h2.index()); // Same slot reused
        assert_ne!(h1, h2);
        assert!(arena.get(h1).is_none());
        assert!(arena.remove(h1).is_none());
        assert_eq!(arena.get(h2), Some(&2));
    }

    #[test]
    fn test_iteration_skips_vacant_slots() {
        let mut arena: Arena<&str> = Arena::new();
        let a = arena.insert("a");
        let b = arena.insert("b");
        let c = arena.insert("c");
        arena.remove(b);

        let live: Vec<_> = arena.iter().map(|(h, v)| (h, *v)).collect();
        assert_eq!(live, vec![(a, "a"), (c, "c")]);
        assert_eq!(arena.slot_count(), 3);
        assert_eq!(arena.handle_at(2), Some(c));
        assert!(arena.handle_at(1).is_none());
    }

    #[test]
    fn test_clear_invalidates_handles() {
        let mut arena: Arena<u8> = Arena::new();
        let a = arena.insert(1);
        arena.clear();
        assert!(arena.is_empty());
        assert!(arena.get(a).is_none());

        let b = arena.insert(2);
        assert_eq!(b.index(), 0);
        assert_eq!(arena.get(b), Some(&2));
    }
}
