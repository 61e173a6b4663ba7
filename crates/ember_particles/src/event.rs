//! # Events
//!
//! An event couples a trigger condition to an effect on a target:
//!
//! | Kind      | Fires when                                   |
//! |-----------|----------------------------------------------|
//! | `Spawn`   | the emitter spawns a particle                |
//! | `Die`     | a particle expires, before its slot is freed |
//! | `Collide` | a collision collaborator reports a hit       |
//! | `Trigger` | the host calls `Instance::fire`              |
//! | `Time`    | a particle's age crosses a period boundary   |
//!
//! Events only fire for particles whose mask has the event's own bit set.

use ember_core::Handle;

use crate::affector::AffectorId;
use crate::emitter::EmitterId;

/// Handle to an event registered on a [`System`](crate::System).
pub type EventId = Handle<Event>;

/// Trigger condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Particle spawned.
    Spawn,
    /// Particle expired.
    Die,
    /// Particle collided.
    Collide,
    /// Host-raised trigger.
    Trigger,
    /// Periodic, by particle age.
    Time,
}

impl EventKind {
    /// Number of kinds.
    pub const COUNT: usize = 5;

    /// Dense index, for per-kind tables.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Spawn => 0,
            Self::Die => 1,
            Self::Collide => 2,
            Self::Trigger => 3,
            Self::Time => 4,
        }
    }
}

/// What happens to the target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventEffect {
    /// Emitter spawns children; affector applies once; event does nothing.
    Trigger,
    /// Set the target's bit (or emitter flag).
    Enable,
    /// Clear the target's bit (or emitter flag).
    Disable,
    /// Flip the target's bit (or emitter flag).
    Toggle,
}

impl EventEffect {
    /// Applies an enable/disable/toggle effect to a flag.
    #[inline]
    #[must_use]
    pub const fn apply(self, enabled: bool) -> bool {
        match self {
            Self::Enable => true,
            Self::Disable => false,
            Self::Toggle => !enabled,
            Self::Trigger => enabled,
        }
    }

    /// Applies an enable/disable/toggle effect to `bit` of `mask`.
    #[inline]
    #[must_use]
    pub const fn apply_mask(self, mask: u32, bit: u32) -> u32 {
        match self {
            Self::Enable => mask | bit,
            Self::Disable => mask & !bit,
            Self::Toggle => mask ^ bit,
            Self::Trigger => mask,
        }
    }
}

/// Object an event acts on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventTarget {
    /// An emitter of the same system.
    Emitter(EmitterId),
    /// An affector attached to the firing emitter.
    Affector(AffectorId),
    /// An event attached to the firing emitter.
    Event(EventId),
}

/// Trigger condition bound to an effect.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    kind: EventKind,
    /// Effect on the target.
    pub effect: EventEffect,
    /// Target; `None` makes the event a no-op.
    pub target: Option<EventTarget>,
    /// Period in seconds, for [`EventKind::Time`].
    pub time: f32,
    /// Fire only at the first period boundary.
    pub once: bool,
    start_enabled: bool,
}

impl Event {
    /// Event of `kind`.
    #[must_use]
    pub const fn new(kind: EventKind, effect: EventEffect, target: Option<EventTarget>) -> Self {
        Self {
            kind,
            effect,
            target,
            time: 0.0,
            once: false,
            start_enabled: true,
        }
    }

    /// Time event that fires every `period` seconds of particle age, or once.
    #[must_use]
    pub const fn timed(period: f32, once: bool, effect: EventEffect, target: Option<EventTarget>) -> Self {
        Self {
            kind: EventKind::Time,
            effect,
            target,
            time: period,
            once,
            start_enabled: true,
        }
    }

    /// Same event, starting inactive on new particles.
    #[must_use]
    pub const fn disabled(mut self) -> Self {
        self.start_enabled = false;
        self
    }

    /// Trigger condition.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.kind
    }

    /// Whether new particles start with this event's bit set.
    #[must_use]
    pub const fn start_enabled(&self) -> bool {
        self.start_enabled
    }

    pub(crate) fn set_start_enabled(&mut self, enabled: bool) {
        self.start_enabled = enabled;
    }

    /// Returns true if a particle of age `age` reaches a period boundary
    /// within the next `dt` seconds.
    #[inline]
    #[must_use]
    pub fn crosses_period(&self, age: f32, dt: f32) -> bool {
        if self.time <= 0.0 {
            return false;
        }
        let mut t = age;
        if !self.once {
            t -= (t / self.time).floor() * self.time;
        }
        t < self.time && t + dt >= self.time
    }
}
