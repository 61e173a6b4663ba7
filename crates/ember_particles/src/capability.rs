//! # Capability Bits
//!
//! Every emitter hands each attached affector and event one bit of the
//! 32-bit particle mask. Events flip those bits per particle to switch
//! behaviour on and off without touching the shared system.
//!
//! ```text
//!   Emitter "sparks"         particle.affector_mask
//!   ├── gravity  -> bit 0    ┌───┬───┬───┬─────┐
//!   ├── drag     -> bit 1    │ 1 │ 0 │ 1 │ ... │
//!   └── on_die   -> bit 2    └───┴───┴───┴─────┘
//!                             b0  b1  b2
//! ```
//!
//! Allocation is first-fit and keeps the bits of objects that stay
//! attached, so live particles keep their meaning across edits.

use crate::affector::AffectorId;
use crate::error::{SystemError, SystemResult};
use crate::event::EventId;

/// Bits in a particle mask.
pub const MAX_CAPABILITIES: usize = 32;

/// Object that owns a capability bit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CapabilityOwner {
    /// An attached affector.
    Affector(AffectorId),
    /// An attached event.
    Event(EventId),
}

/// Resolved event target, relative to the firing emitter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetRef {
    /// An emitter, addressed by its slot in the instance.
    Emitter(usize),
    /// An affector or event, addressed by its bit in the particle mask.
    Capability(u32),
}

/// Per-emitter bit assignment.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CapabilityTable {
    entries: Vec<(CapabilityOwner, u32)>,
    initial_mask: u32,
}

impl CapabilityTable {
    /// Empty table.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            initial_mask: 0,
        }
    }

    /// Bit assigned to `owner`, if attached.
    #[inline]
    #[must_use]
    pub fn bit(&self, owner: CapabilityOwner) -> Option<u32> {
        self.entries
            .iter()
            .find(|(entry, _)| *entry == owner)
            .map(|&(_, bit)| bit)
    }

    /// Mask given to newly spawned particles.
    #[inline]
    #[must_use]
    pub const fn initial_mask(&self) -> u32 {
        self.initial_mask
    }

    /// Number of assigned bits.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every assignment.
    pub fn iter(&self) -> impl Iterator<Item = (CapabilityOwner, u32)> + '_ {
        self.entries.iter().copied()
    }

    /// Reassigns bits for `requests` (owner, starts enabled).
    ///
    /// Owners already in the table keep their bit; new owners get the lowest
    /// free one. On overflow the table is left unchanged.
    pub(crate) fn allocate(
        &mut self,
        requests: impl IntoIterator<Item = (CapabilityOwner, bool)>,
    ) -> SystemResult<()> {
        let requests: Vec<_> = requests.into_iter().collect();
        if requests.len() > MAX_CAPABILITIES {
            return Err(SystemError::CapabilityOverflow {
                requested: requests.len(),
                available: MAX_CAPABILITIES,
            });
        }

        let mut entries = Vec::with_capacity(requests.len());
        let mut used = 0u32;
        for &(owner, _) in &requests {
            if let Some(bit) = self.bit(owner) {
                entries.push((owner, bit));
                used |= bit;
            }
        }

        let mut initial_mask = 0u32;
        for (owner, start_enabled) in requests {
            let bit = match entries.iter().find(|(entry, _)| *entry == owner) {
                Some(&(_, bit)) => bit,
                None => {
                    // At most 32 requests, so a zero bit always exists here
                    let bit = 1u32 << (!used).trailing_zeros();
                    used |= bit;
                    entries.push((owner, bit));
                    bit
                }
            };
            if start_enabled {
                initial_mask |= bit;
            }
        }

        self.entries = entries;
        self.initial_mask = initial_mask;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::affector::{Affector, AffectorKind};
    use crate::event::{Event, EventEffect, EventKind};
    use ember_core::Arena;

    fn owners(count: usize) -> Vec<CapabilityOwner> {
        let mut affectors = Arena::new();
        let mut events = Arena::new();
        (0..count)
            .map(|i| {
                if i % 2 == 0 {
                    CapabilityOwner::Affector(affectors.insert(Affector::new(AffectorKind::OrientToVelocity)))
                } else {
                    CapabilityOwner::Event(events.insert(Event::new(EventKind::Die, EventEffect::Trigger, None)))
                }
            })
            .collect()
    }

    #[test]
    fn test_first_fit_and_initial_mask() {
        let owners = owners(3);
        let mut table = CapabilityTable::new();
        table
            .allocate([(owners[0], true), (owners[1], false), (owners[2], true)])
            .unwrap();

        assert_eq!(table.bit(owners[0]), Some(0b001));
        assert_eq!(table.bit(owners[1]), Some(0b010));
        assert_eq!(table.bit(owners[2]), Some(0b100));
        assert_eq!(table.initial_mask(), 0b101);
    }

    #[test]
    fn test_reallocation_keeps_existing_bits() {
        let owners = owners(4);
        let mut table = CapabilityTable::new();
        table
            .allocate(owners[..3].iter().map(|&o| (o, true)))
            .unwrap();

        // Detach the first, attach a new one: it reuses bit 0
        table
            .allocate([(owners[1], true), (owners[2], true), (owners[3], true)])
            .unwrap();
        assert_eq!(table.bit(owners[0]), None);
        assert_eq!(table.bit(owners[1]), Some(0b010));
        assert_eq!(table.bit(owners[2]), Some(0b100));
        assert_eq!(table.bit(owners[3]), Some(0b001));
    }

    #[test]
    fn test_bits_are_unique() {
        let owners = owners(MAX_CAPABILITIES);
        let mut table = CapabilityTable::new();
        table.allocate(owners.iter().map(|&o| (o, true))).unwrap();

        let mut seen = 0u32;
        for (_, bit) in table.iter() {
            assert_eq!(bit.count_ones(), 1);
            assert_eq!(seen & bit, 0);
            seen |= bit;
        }
        assert_eq!(seen, u32::MAX);
        assert_eq!(table.initial_mask(), u32::MAX);
    }

    #[test]
    fn test_overflow_leaves_table_unchanged() {
        let owners = owners(MAX_CAPABILITIES + 1);
        let mut table = CapabilityTable::new();
        table.allocate([(owners[0], true)]).unwrap();

        let result = table.allocate(owners.iter().map(|&o| (o, true)));
        assert_eq!(
            result,
            Err(SystemError::CapabilityOverflow { requested: 33, available: 32 })
        );
        assert_eq!(table.len(), 1);
        assert_eq!(table.initial_mask(), 0b1);
    }
}
