//! # Particle Record
//!
//! Plain data, stored by value in the instance pool. A slot is free when
//! both `spawn_time` and `die_time` are zero; live particles never carry a
//! zero spawn time.

use glam::{Quat, Vec3};

/// Index of a particle in its instance's pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParticleSlot(pub(crate) u32);

impl ParticleSlot {
    /// Pool index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// One simulated particle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Particle {
    /// World position.
    pub position: Vec3,
    /// World velocity, units per second.
    pub velocity: Vec3,
    /// Per-axis scale.
    pub scale: Vec3,
    /// Orientation.
    pub orientation: Quat,
    /// Instance time the particle was born. `0.0` marks a free slot.
    pub spawn_time: f32,
    /// Instance time after which the particle is destroyed.
    pub die_time: f32,
    /// Mass, divides applied forces.
    pub mass: f32,
    /// Packed colour, one byte per channel.
    pub colour: u32,
    /// One bit per affector/event the owning emitter allocated.
    pub affector_mask: u32,
}

impl Particle {
    /// A free pool slot.
    pub const FREE: Self = Self {
        position: Vec3::ZERO,
        velocity: Vec3::ZERO,
        scale: Vec3::ONE,
        orientation: Quat::IDENTITY,
        spawn_time: 0.0,
        die_time: 0.0,
        mass: 1.0,
        colour: 0xffff_ffff,
        affector_mask: u32::MAX,
    };

    /// Particle at rest at `position`.
    #[must_use]
    pub fn at(position: Vec3, orientation: Quat, velocity: Vec3) -> Self {
        Self {
            position,
            velocity,
            orientation,
            ..Self::FREE
        }
    }

    /// Returns true for a free pool slot.
    #[inline]
    #[must_use]
    pub fn is_free(&self) -> bool {
        self.spawn_time == 0.0 && self.die_time == 0.0
    }

    /// Seconds since spawn at instance time `now`.
    #[inline]
    #[must_use]
    pub fn age(&self, now: f32) -> f32 {
        now - self.spawn_time
    }

    /// Returns true if every bit of `mask` is set.
    #[inline]
    #[must_use]
    pub const fn has_capability(&self, mask: u32) -> bool {
        self.affector_mask & mask == mask
    }

    /// Mass reciprocal; massless particles react as unit mass.
    #[inline]
    #[must_use]
    pub fn inverse_mass(&self) -> f32 {
        if self.mass > 0.0 {
            1.0 / self.mass
        } else {
            1.0
        }
    }

    /// Marks the slot free.
    #[inline]
    pub(crate) fn release(&mut self) {
        self.spawn_time = 0.0;
        self.die_time = 0.0;
    }
}

impl Default for Particle {
    fn default() -> Self {
        Self::FREE
    }
}

/// Spawn time that can never collide with the free-slot sentinel.
#[inline]
#[must_use]
pub(crate) fn live_spawn_time(time: f32) -> f32 {
    if time == 0.0 {
        f32::MIN_POSITIVE
    } else {
        time
    }
}
