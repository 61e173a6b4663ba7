//! # Emitters
//!
//! An emitter spawns particles into an instance and owns the id lists of
//! the affectors and events that apply to them.
//!
//! ```text
//!   serial phase                         parallel phase (thread t of N)
//!   ────────────                         ──────────────────────────────
//!   acc += dt * rate(now)                for i in t, t+N, t+2N, ...
//!   for n in 0..floor(acc)                 affectors whose bit is set
//!     spawn_count x spawn(now - n/rate)    position += velocity * dt
//!       shape adjusts the particle         die_time < now -> destroy queue
//!       SPAWN events fire                  TIME boundary  -> trigger queue
//! ```
//!
//! ## Safety Note
//!
//! The parallel phase borrows its partition of the particle pool through
//! `Instance::partition_mut`; the partition it is handed is the only one
//! this worker touches.

#![allow(unsafe_code)]

use std::f32::consts::{PI, TAU};
use std::fmt;
use std::sync::Arc;

use ember_core::{Arena, Gradient, Handle, SimRng, Value};
use glam::{Quat, Vec3};
use rand::{Rng, SeedableRng};
use tracing::trace;

use crate::affector::{Affector, AffectorId};
use crate::capability::{CapabilityOwner, CapabilityTable, TargetRef};
use crate::error::SystemResult;
use crate::event::{Event, EventEffect, EventId, EventKind, EventTarget};
use crate::instance::{DestroyMessage, Instance, Partition, TriggeredEvent};
use crate::particle::{live_spawn_time, Particle, ParticleSlot};
use crate::render::RendererId;
use crate::system::System;

/// Handle to an emitter registered on a [`System`].
pub type EmitterId = Handle<Emitter>;

/// User-defined spawn placement.
pub trait SpawnShape: Send + Sync + fmt::Debug {
    /// Adjusts a particle that starts at the emitter origin.
    ///
    /// `key` is the instance time of the spawn.
    fn spawn(&self, particle: &mut Particle, key: f32, rng: &mut SimRng);
}

/// Built-in spawn shapes. Angles are in degrees.
#[derive(Clone, Debug)]
pub enum EmitterShape {
    /// From the origin, along the emitter's +Y within a cone.
    Point {
        /// Launch speed.
        velocity: Value,
        /// Cone half-angle.
        cone: Value,
    },
    /// Anywhere inside a sphere, launched like `Point`.
    Sphere {
        /// Sphere radius.
        radius: Value,
        /// Launch speed.
        velocity: Value,
        /// Cone half-angle.
        cone: Value,
    },
    /// On a sphere's surface, launched outwards.
    SphereSurface {
        /// Sphere radius.
        radius: Value,
        /// Outward speed.
        velocity: Value,
    },
    /// Anywhere inside an oriented box.
    Box {
        /// Full extents.
        size: Vec3,
        /// Local velocity per axis.
        velocity: [Value; 3],
    },
    /// On a ring in the emitter's XZ plane.
    Ring {
        /// Ring radius.
        radius: Value,
        /// Tilt of the radial launch direction towards +Y.
        angle: Value,
        /// Blend from radial (0) to tangential (1) launch.
        tangent: Value,
        /// Launch speed.
        velocity: Value,
        /// Angle around the ring, in radians.
        sequence: Value,
    },
    /// User-defined shape.
    Custom(Arc<dyn SpawnShape>),
}

impl EmitterShape {
    /// Point emitter with no spread.
    #[must_use]
    pub const fn point(velocity: f32) -> Self {
        Self::Point {
            velocity: Value::constant(velocity),
            cone: Value::constant(0.0),
        }
    }

    /// Ring with radial launch at a random angle.
    #[must_use]
    pub const fn ring(radius: f32, velocity: f32) -> Self {
        Self::Ring {
            radius: Value::constant(radius),
            angle: Value::constant(0.0),
            tangent: Value::constant(0.0),
            velocity: Value::constant(velocity),
            sequence: Value::random(-PI, PI),
        }
    }

    /// Moves and launches `particle` from the emitter origin.
    pub fn spawn(&self, particle: &mut Particle, key: f32, rng: &mut SimRng) {
        match self {
            Self::Point { velocity, cone } => launch_in_cone(particle, velocity, cone, key, rng),
            Self::Sphere {
                radius,
                velocity,
                cone,
            } => {
                launch_in_cone(particle, velocity, cone, key, rng);
                let offset = random_in_unit_sphere(rng) * radius.value(key, rng);
                particle.position += particle.orientation * offset;
            }
            Self::SphereSurface { radius, velocity } => {
                let normal = random_unit_vector(rng);
                let direction = particle.orientation * normal;
                particle.position += direction * radius.value(key, rng);
                particle.velocity += direction * velocity.value(key, rng);
            }
            Self::Box { size, velocity } => {
                let local = Vec3::new(rng.gen(), rng.gen(), rng.gen()) * *size - *size * 0.5;
                particle.position += particle.orientation * local;
                let launch = Vec3::new(
                    velocity[0].value(key, rng),
                    velocity[1].value(key, rng),
                    velocity[2].value(key, rng),
                );
                particle.velocity += particle.orientation * launch;
            }
            Self::Ring {
                radius,
                angle,
                tangent,
                velocity,
                sequence,
            } => {
                let theta = sequence.value(key, rng);
                let radial = Vec3::new(theta.sin(), 0.0, theta.cos());
                particle.position += particle.orientation * (radial * radius.value(key, rng));

                let speed = velocity.value(key, rng);
                if speed != 0.0 {
                    let tangential = Vec3::new(radial.z, 0.0, -radial.x);
                    let blend = tangent.value(key, rng).clamp(0.0, 1.0);
                    let tilt = Quat::from_axis_angle(tangential, angle.value(key, rng).to_radians());
                    let launch = tangential * blend + (tilt * radial) * (1.0 - blend);
                    particle.velocity += particle.orientation * (launch * speed);
                }
            }
            Self::Custom(shape) => shape.spawn(particle, key, rng),
        }
    }
}

fn launch_in_cone(particle: &mut Particle, velocity: &Value, cone: &Value, key: f32, rng: &mut SimRng) {
    let speed = velocity.value(key, rng);
    if speed == 0.0 {
        return;
    }
    let direction = particle.orientation * Vec3::Y;
    let spread = cone.value(key, rng).to_radians();
    if spread == 0.0 {
        particle.velocity += direction * speed;
        return;
    }
    let around = Quat::from_axis_angle(direction, rng.gen::<f32>() * TAU);
    let tilt_axis = around * (particle.orientation * Vec3::X);
    particle.velocity += (Quat::from_axis_angle(tilt_axis, spread) * direction) * speed;
}

fn random_in_unit_sphere(rng: &mut SimRng) -> Vec3 {
    loop {
        let v = Vec3::new(rng.gen(), rng.gen(), rng.gen()) * 2.0 - Vec3::ONE;
        if v.length_squared() <= 1.0 {
            return v;
        }
    }
}

fn random_unit_vector(rng: &mut SimRng) -> Vec3 {
    loop {
        if let Some(v) = random_in_unit_sphere(rng).try_normalize() {
            return v;
        }
    }
}

/// Spawns particles and routes them through affectors and events.
#[derive(Clone, Debug)]
pub struct Emitter {
    /// Where and how particles start.
    pub shape: EmitterShape,
    /// Emitter is enabled when an instance initialises.
    pub start_enabled: bool,
    /// Emitter only spawns through events and `Instance::trigger`.
    pub event_only: bool,
    /// Most live particles this emitter may own per instance.
    pub limit: usize,
    /// Share of the parent's velocity children inherit when triggered.
    pub inherit_velocity: f32,
    /// Particles per spawn event.
    pub spawn_count: u32,
    /// Spawn events per second, keyed by instance time.
    pub rate: Value,
    /// Uniform scale at spawn.
    pub scale: Value,
    /// Lifetime in seconds.
    pub life: Value,
    /// Particle mass.
    pub mass: Value,
    /// Colour at spawn, keyed by instance time.
    pub colour: Gradient,
    renderer: Option<RendererId>,
    affectors: Vec<AffectorId>,
    affector_bits: Vec<u32>,
    events: Vec<EventId>,
    events_by_kind: [Vec<(EventId, u32)>; EventKind::COUNT],
    capabilities: CapabilityTable,
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new(EmitterShape::point(0.0))
    }
}

impl Emitter {
    /// Emitter with default parameters: 10 spawns per second, one particle
    /// each, one second of life, at most 1000 live particles.
    #[must_use]
    pub fn new(shape: EmitterShape) -> Self {
        Self {
            shape,
            start_enabled: true,
            event_only: false,
            limit: 1000,
            inherit_velocity: 1.0,
            spawn_count: 1,
            rate: Value::constant(10.0),
            scale: Value::constant(1.0),
            life: Value::constant(1.0),
            mass: Value::constant(1.0),
            colour: Gradient::new(),
            renderer: None,
            affectors: Vec::new(),
            affector_bits: Vec::new(),
            events: Vec::new(),
            events_by_kind: Default::default(),
            capabilities: CapabilityTable::new(),
        }
    }

    /// Renderer this emitter's particles are drawn with.
    #[must_use]
    pub const fn renderer(&self) -> Option<RendererId> {
        self.renderer
    }

    /// Attached affectors, in application order.
    #[must_use]
    pub fn affectors(&self) -> &[AffectorId] {
        &self.affectors
    }

    /// Attached events.
    #[must_use]
    pub fn events(&self) -> &[EventId] {
        &self.events
    }

    /// Attached events of one kind.
    pub fn events_of(&self, kind: EventKind) -> impl Iterator<Item = EventId> + '_ {
        self.events_by_kind[kind.index()].iter().map(|&(id, _)| id)
    }

    /// Capability bits assigned to attached objects.
    #[must_use]
    pub const fn capabilities(&self) -> &CapabilityTable {
        &self.capabilities
    }

    pub(crate) fn set_renderer(&mut self, renderer: Option<RendererId>) {
        self.renderer = renderer;
    }

    pub(crate) fn affectors_mut(&mut self) -> &mut Vec<AffectorId> {
        &mut self.affectors
    }

    pub(crate) fn events_mut(&mut self) -> &mut Vec<EventId> {
        &mut self.events
    }

    /// Reassigns capability bits after the attached lists or a
    /// `start_enabled` flag changed.
    pub(crate) fn allocate_affector_masks(
        &mut self,
        affectors: &Arena<Affector>,
        events: &Arena<Event>,
    ) -> SystemResult<()> {
        let attached_affectors = self.affectors.iter().filter_map(|&id| {
            affectors
                .get(id)
                .map(|affector| (CapabilityOwner::Affector(id), affector.start_enabled()))
        });
        let attached_events = self.events.iter().filter_map(|&id| {
            events
                .get(id)
                .map(|event| (CapabilityOwner::Event(id), event.start_enabled()))
        });
        self.capabilities.allocate(attached_affectors.chain(attached_events))?;

        self.affector_bits = self
            .affectors
            .iter()
            .map(|&id| self.capabilities.bit(CapabilityOwner::Affector(id)).unwrap_or(0))
            .collect();
        for list in &mut self.events_by_kind {
            list.clear();
        }
        for &id in &self.events {
            if let (Some(event), Some(bit)) = (events.get(id), self.capabilities.bit(CapabilityOwner::Event(id))) {
                self.events_by_kind[event.kind().index()].push((id, bit));
            }
        }
        Ok(())
    }

    /// Serial spawn step.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub(crate) fn update(&self, system: &System, instance: &mut Instance, slot: usize, dt: f32) {
        let now = instance.time;
        let rate = self.rate.value(now, &mut instance.rng);
        if !(rate > 0.0 && rate.is_finite()) {
            return;
        }
        let Some(state) = instance.emitter_state_mut(slot) else {
            return;
        };
        state.accumulator += dt * rate;
        let bursts = state.accumulator.floor();
        state.accumulator -= bursts;

        let template = instance.spawn_origin();
        for n in 0..bursts as u32 {
            let spawn_time = now - n as f32 / rate;
            for _ in 0..self.spawn_count {
                self.spawn(system, instance, slot, &template, spawn_time, Vec3::ZERO);
            }
        }
    }

    /// Spawns `spawn_count` children at `parent`.
    ///
    /// Emitter triggers fired by the children's SPAWN events are queued on
    /// the instance and run after this burst, never nested inside it.
    pub(crate) fn trigger(&self, system: &System, instance: &mut Instance, slot: usize, parent: &Particle) {
        let template = Particle::at(parent.position, parent.orientation, Vec3::ZERO);
        let inherited = parent.velocity * self.inherit_velocity;
        let now = instance.time;
        for _ in 0..self.spawn_count {
            self.spawn(system, instance, slot, &template, now, inherited);
        }
    }

    fn spawn(
        &self,
        system: &System,
        instance: &mut Instance,
        slot: usize,
        template: &Particle,
        spawn_time: f32,
        inherited: Vec3,
    ) -> Option<ParticleSlot> {
        let particle = match instance.allocate(self, slot) {
            Ok(particle) => particle,
            Err(err) => {
                instance.stats.dropped += 1;
                trace!(emitter = slot, %err, "spawn dropped");
                return None;
            }
        };

        let key = instance.time;
        let rng = &mut instance.rng;
        let spawn_time = live_spawn_time(spawn_time);
        let mut spawned = Particle {
            scale: Vec3::splat(self.scale.value(key, rng)),
            spawn_time,
            die_time: spawn_time + self.life.value(key, rng),
            mass: self.mass.value(key, rng),
            colour: self.colour.value(key),
            affector_mask: self.capabilities.initial_mask(),
            ..*template
        };
        self.shape.spawn(&mut spawned, key, rng);
        spawned.velocity += inherited;

        instance.pool.as_mut_slice()[particle.index()] = spawned;
        instance.stats.spawned += 1;
        self.fire_events(system, instance, EventKind::Spawn, particle);
        Some(particle)
    }

    /// Worker step over this thread's share of the live list.
    pub(crate) fn update_parallel(
        &self,
        system: &System,
        instance: &Instance,
        slot: usize,
        partition: Partition,
        dt: f32,
    ) {
        let now = instance.time;
        let transform = *instance.transform();
        let frame_seed = instance.frame_seed();
        let time_events = &self.events_by_kind[EventKind::Time.index()];
        let mut scratch = instance.scratch(partition).lock();

        // SAFETY: `partition` comes from the current parallel phase and no
        // other reference into this partition is live.
        let particles = unsafe { instance.partition_mut(slot, partition) };
        for (index, particle_slot, particle) in particles {
            if !self.affectors.is_empty() {
                let mut rng = particle_rng(frame_seed, particle_slot);
                for (&id, &bit) in self.affectors.iter().zip(&self.affector_bits) {
                    if particle.affector_mask & bit == 0 {
                        continue;
                    }
                    if let Some(affector) = system.affector(id) {
                        affector.update(particle, now, dt, &transform, &mut rng);
                    }
                }
            }

            particle.position += particle.velocity * dt;

            if particle.die_time < now {
                scratch.destroy.push(DestroyMessage {
                    emitter: slot,
                    particle: particle_slot,
                    index,
                });
            }

            for &(event, bit) in time_events {
                if particle.affector_mask & bit == 0 {
                    continue;
                }
                let crosses = system
                    .event(event)
                    .is_some_and(|e| e.crosses_period(particle.age(now), dt));
                if crosses {
                    scratch.triggered.push(TriggeredEvent {
                        emitter: slot,
                        particle: particle_slot,
                        event,
                    });
                }
            }
        }
    }

    /// Fires every attached event of `kind` for one particle.
    ///
    /// Returns how many fired.
    pub(crate) fn fire_events(
        &self,
        system: &System,
        instance: &mut Instance,
        kind: EventKind,
        particle: ParticleSlot,
    ) -> usize {
        let mut fired = 0;
        for &(event, _) in &self.events_by_kind[kind.index()] {
            if self.fire_event(system, instance, event, particle) {
                fired += 1;
            }
        }
        fired
    }

    /// Applies one event to one particle. Returns false if the particle is
    /// free, the event is not attached, or its bit is clear.
    pub(crate) fn fire_event(
        &self,
        system: &System,
        instance: &mut Instance,
        event_id: EventId,
        particle: ParticleSlot,
    ) -> bool {
        let Some(event) = system.event(event_id) else {
            return false;
        };
        let Some(bit) = self.capabilities.bit(CapabilityOwner::Event(event_id)) else {
            return false;
        };
        let parent = match instance.pool.get(particle.index()) {
            Some(p) if !p.is_free() && p.affector_mask & bit != 0 => *p,
            _ => return false,
        };
        let Some(target) = event.target else {
            return true;
        };

        match (event.effect, target) {
            (EventEffect::Trigger, EventTarget::Emitter(id)) => instance.burst(system, id, parent),
            (EventEffect::Trigger, EventTarget::Affector(id)) => {
                let transform = *instance.transform();
                if let (Some(affector), Some(p)) = (system.affector(id), instance.pool.get_mut(particle.index())) {
                    affector.trigger(p, instance.time, &transform, &mut instance.rng);
                }
            }
            (EventEffect::Trigger, EventTarget::Event(_)) => {}
            (effect, target) => match self.resolve(system, target) {
                Some(TargetRef::Emitter(index)) => {
                    if let Some(state) = instance.emitter_state_mut(index) {
                        state.enabled = effect.apply(state.enabled);
                    }
                }
                Some(TargetRef::Capability(bit)) => {
                    if let Some(p) = instance.pool.get_mut(particle.index()) {
                        p.affector_mask = effect.apply_mask(p.affector_mask, bit);
                    }
                }
                None => {}
            },
        }
        true
    }

    /// Resolves a target relative to this emitter. Affectors and events not
    /// attached here resolve to nothing.
    #[must_use]
    pub fn resolve(&self, system: &System, target: EventTarget) -> Option<TargetRef> {
        match target {
            EventTarget::Emitter(id) => system.emitter(id).map(|_| TargetRef::Emitter(id.index())),
            EventTarget::Affector(id) => self
                .capabilities
                .bit(CapabilityOwner::Affector(id))
                .map(TargetRef::Capability),
            EventTarget::Event(id) => self
                .capabilities
                .bit(CapabilityOwner::Event(id))
                .map(TargetRef::Capability),
        }
    }
}

/// Per-particle, per-frame stream, so results do not depend on which
/// worker owns the particle.
#[inline]
fn particle_rng(frame_seed: u64, particle: ParticleSlot) -> SimRng {
    SimRng::seed_from_u64(frame_seed ^ u64::from(particle.0).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}
