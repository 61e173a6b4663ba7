//! # Particle System Instance
//!
//! Per-activation mutable state of a shared [`System`]: the particle pool,
//! one live list per emitter, one vertex buffer per renderer, and one
//! scratch queue pair per worker thread.
//!
//! ## Frame Phases
//!
//! ```text
//!   update(dt)                    caller thread, &mut self
//!     time += dt
//!     emitters spawn              appends to live lists
//!     drain triggered queues      fires TIME events
//!     drain destroy queues        fires DIE events, frees by swap-and-pop
//!     size render buffers         per-emitter base offsets
//!
//!   update_parallel(partition)    every worker, &self
//!     affectors, integration      own strided particles only
//!     vertex writes               own strided render slots only
//!     queue messages              own scratch queue only
//! ```
//!
//! Drained messages are sorted before they are applied, so the outcome of
//! a frame does not depend on how many workers ran it.
//!
//! ## Safety Note
//!
//! Workers mutate the pool through `&self`. The [`Partition`] contract
//! guarantees that every particle and render slot is reached by exactly
//! one worker per phase.

#![allow(unsafe_code)]

use std::collections::VecDeque;
use std::fmt;
use std::iter::{self, StepBy};
use std::ops::Range;
use std::sync::Arc;

use ember_core::{PartitionedSlots, SimRng};
use glam::{Mat4, Vec3};
use parking_lot::Mutex;
use rand::SeedableRng;
use tracing::debug;

use crate::emitter::{Emitter, EmitterId};
use crate::error::CapacityError;
use crate::event::{EventId, EventKind};
use crate::particle::{Particle, ParticleSlot};
use crate::render::{RenderBuffer, RenderState, RendererId};
use crate::system::System;

/// Per-instance state of one emitter.
#[derive(Clone, Debug, Default)]
pub(crate) struct EmitterState {
    pub(crate) accumulator: f32,
    pub(crate) enabled: bool,
    pub(crate) particles: Vec<ParticleSlot>,
}

/// TIME event detected by a worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct TriggeredEvent {
    pub(crate) emitter: usize,
    pub(crate) particle: ParticleSlot,
    pub(crate) event: EventId,
}

/// Expired particle found by a worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct DestroyMessage {
    pub(crate) emitter: usize,
    pub(crate) particle: ParticleSlot,
    /// Position in the emitter's live list.
    pub(crate) index: usize,
}

/// Queues one worker fills during the parallel phase.
#[derive(Debug, Default)]
pub(crate) struct ThreadScratch {
    pub(crate) triggered: Vec<TriggeredEvent>,
    pub(crate) destroy: Vec<DestroyMessage>,
}

/// Running totals since the last initialise.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InstanceStats {
    /// Particles spawned.
    pub spawned: u64,
    /// Spawns skipped for lack of capacity.
    pub dropped: u64,
    /// Particles that expired and were freed.
    pub destroyed: u64,
}

/// One worker's share of a parallel phase: live-list indices
/// `thread, thread + count, thread + 2 * count, ...`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Partition {
    thread: usize,
    count: usize,
}

impl Partition {
    /// The whole list, for a caller holding `&mut Instance`.
    const SERIAL: Self = Self { thread: 0, count: 1 };

    /// Worker `thread` of `count`.
    ///
    /// # Safety
    ///
    /// While anything obtained through the partition is alive:
    /// - every partition used on the same instance has the same `count` and
    ///   a distinct `thread`
    /// - no `&mut Instance` exists
    pub(crate) const unsafe fn new(thread: usize, count: usize) -> Self {
        Self { thread, count }
    }

    #[inline]
    fn indices(self, len: usize) -> StepBy<Range<usize>> {
        (self.thread..len).step_by(self.count.max(1))
    }
}

/// A playing copy of a [`System`].
pub struct Instance {
    system: Arc<System>,
    pub(crate) pool: PartitionedSlots<Particle>,
    emitters: Vec<Option<EmitterState>>,
    renderers: Vec<Option<RenderState>>,
    scratch: Vec<Mutex<ThreadScratch>>,
    pending_triggered: Vec<TriggeredEvent>,
    pending_destroy: Vec<DestroyMessage>,
    /// Emitter bursts waiting behind the one running.
    bursts: VecDeque<(EmitterId, Particle)>,
    bursting: bool,
    count: usize,
    head: usize,
    pub(crate) time: f32,
    pub(crate) rng: SimRng,
    seed: u64,
    frame: u64,
    enabled: bool,
    transform: Mat4,
    velocity: Vec3,
    pub(crate) stats: InstanceStats,
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("enabled", &self.enabled)
            .field("time", &self.time)
            .field("particles", &self.count)
            .field("pool_size", &self.pool.len())
            .field("threads", &self.scratch.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Instance {
    /// Instance of `system`, disabled until enabled or added to a manager.
    #[must_use]
    pub fn new(system: Arc<System>) -> Self {
        Self::with_seed(system, 0)
    }

    /// Instance whose random streams derive from `seed`.
    #[must_use]
    pub fn with_seed(system: Arc<System>, seed: u64) -> Self {
        let mut instance = Self {
            system,
            pool: PartitionedSlots::default(),
            emitters: Vec::new(),
            renderers: Vec::new(),
            scratch: vec![Mutex::default()],
            pending_triggered: Vec::new(),
            pending_destroy: Vec::new(),
            bursts: VecDeque::new(),
            bursting: false,
            count: 0,
            head: 0,
            time: 0.0,
            rng: SimRng::seed_from_u64(seed),
            seed,
            frame: 0,
            enabled: false,
            transform: Mat4::IDENTITY,
            velocity: Vec3::ZERO,
            stats: InstanceStats::default(),
        };
        instance.initialise();
        instance
    }

    /// Reallocates the pool and resets all emitter and render state.
    pub fn initialise(&mut self) {
        let system = Arc::clone(&self.system);
        let pool_size = system.pool_size();
        self.pool.reset(pool_size, Particle::FREE);
        self.count = 0;
        self.head = pool_size.saturating_sub(1);

        let emitter_slots = system.emitter_slots();
        self.emitters = iter::repeat_with(|| None).take(emitter_slots).collect();
        for (id, emitter) in system.emitters() {
            self.emitters[id.index()] = Some(EmitterState {
                accumulator: 0.0,
                enabled: emitter.start_enabled,
                particles: Vec::with_capacity(emitter.limit.min(pool_size)),
            });
        }

        self.renderers = iter::repeat_with(|| None).take(system.renderer_slots()).collect();
        for (id, _) in system.renderers() {
            self.renderers[id.index()] = Some(RenderState {
                bases: vec![0; emitter_slots],
                ..RenderState::default()
            });
        }

        for scratch in &mut self.scratch {
            let scratch = scratch.get_mut();
            scratch.triggered.clear();
            scratch.destroy.clear();
        }
        self.pending_triggered.clear();
        self.pending_destroy.clear();
        self.bursts.clear();
        self.bursting = false;

        self.time = 0.0;
        self.frame = 0;
        self.rng = SimRng::seed_from_u64(self.seed);
        self.stats = InstanceStats::default();
        self.prepare_render(&system);

        debug!(
            pool_size,
            emitters = system.emitters().count(),
            renderers = system.renderers().count(),
            "instance initialised"
        );
    }

    /// Resizes the per-thread queues. Messages already queued are kept.
    pub(crate) fn initialise_thread_data(&mut self, threads: usize) {
        let threads = threads.max(1);
        if self.scratch.len() == threads {
            return;
        }
        let mut merged = ThreadScratch::default();
        for scratch in self.scratch.drain(..) {
            let mut scratch = scratch.into_inner();
            merged.triggered.append(&mut scratch.triggered);
            merged.destroy.append(&mut scratch.destroy);
        }
        self.scratch = iter::once(Mutex::new(merged))
            .chain(iter::repeat_with(Mutex::default).take(threads - 1))
            .collect();
    }

    // =========================================================================
    // Frame
    // =========================================================================

    /// Serial phase. Call before the parallel phase of the same frame.
    ///
    /// A zero `dt` only refreshes the render buffer sizes.
    pub fn update(&mut self, dt: f32) {
        if !self.enabled {
            return;
        }
        let system = Arc::clone(&self.system);
        if dt > 0.0 {
            self.time += dt;
            self.frame += 1;
            for (id, emitter) in system.emitters() {
                let slot = id.index();
                if !emitter.event_only && self.emitter_state(slot).is_some_and(|s| s.enabled) {
                    emitter.update(&system, self, slot, dt);
                }
            }
            self.drain_messages(&system);
        }
        self.prepare_render(&system);
    }

    /// Parallel phase for one worker.
    pub(crate) fn update_parallel(&self, partition: Partition, dt: f32, view: &Mat4) {
        if !self.enabled {
            return;
        }
        let system = &*self.system;
        if dt > 0.0 {
            for (id, emitter) in system.emitters() {
                emitter.update_parallel(system, self, id.index(), partition, dt);
            }
        }
        for (id, emitter) in system.emitters() {
            let Some(renderer) = emitter.renderer() else {
                continue;
            };
            if let Some(render) = system.renderer(renderer) {
                render.update_parallel(self, renderer.index(), id.index(), partition, view);
            }
        }
    }

    /// Parallel phase run entirely on the caller thread.
    pub(crate) fn update_parallel_inline(&mut self, dt: f32, view: &Mat4) {
        self.update_parallel(Partition::SERIAL, dt, view);
    }

    /// Both phases of a frame, on the caller thread.
    pub fn step(&mut self, dt: f32, view: &Mat4) {
        self.update(dt);
        self.update_parallel_inline(dt, view);
    }

    fn drain_messages(&mut self, system: &System) {
        let mut triggered = std::mem::take(&mut self.pending_triggered);
        let mut destroy = std::mem::take(&mut self.pending_destroy);
        for scratch in &mut self.scratch {
            let scratch = scratch.get_mut();
            triggered.append(&mut scratch.triggered);
            destroy.append(&mut scratch.destroy);
        }

        triggered.sort_unstable_by_key(|t| (t.emitter, t.particle, t.event.index()));
        for message in triggered.drain(..) {
            if let Some(emitter) = system.emitter_at(message.emitter) {
                emitter.fire_event(system, self, message.event, message.particle);
            }
        }

        // Highest index first per emitter, so swap-and-pop never moves a
        // particle that is still waiting to be freed.
        destroy.sort_unstable_by(|a, b| a.emitter.cmp(&b.emitter).then(b.index.cmp(&a.index)));
        for message in destroy.drain(..) {
            let Some(emitter) = system.emitter_at(message.emitter) else {
                continue;
            };
            if !self.is_listed(message) {
                continue;
            }
            emitter.fire_events(system, self, EventKind::Die, message.particle);
            if self.is_listed(message) {
                if let Some(state) = self.emitter_state_mut(message.emitter) {
                    state.particles.swap_remove(message.index);
                }
                self.free_particle(message.particle);
            }
        }

        self.pending_triggered = triggered;
        self.pending_destroy = destroy;
    }

    fn is_listed(&self, message: DestroyMessage) -> bool {
        self.emitter_state(message.emitter)
            .is_some_and(|s| s.particles.get(message.index) == Some(&message.particle))
    }

    fn prepare_render(&mut self, system: &System) {
        for state in self.renderers.iter_mut().flatten() {
            state.count = 0;
        }
        for (id, emitter) in system.emitters() {
            let Some(renderer) = emitter.renderer() else {
                continue;
            };
            let live = self.emitter_state(id.index()).map_or(0, |s| s.particles.len());
            if let Some(state) = self.renderers.get_mut(renderer.index()).and_then(Option::as_mut) {
                if let Some(base) = state.bases.get_mut(id.index()) {
                    *base = state.count;
                }
                state.count += live;
            }
        }
        for (id, render) in system.renderers() {
            if let Some(state) = self.renderers.get_mut(id.index()).and_then(Option::as_mut) {
                let count = state.count;
                render.set_count(state, count);
            }
        }
    }

    // =========================================================================
    // Pool
    // =========================================================================

    /// Claims the slot after the ring head for `emitter`.
    pub(crate) fn allocate(&mut self, emitter: &Emitter, slot: usize) -> Result<ParticleSlot, CapacityError> {
        let capacity = self.pool.len();
        if self.count >= capacity {
            return Err(CapacityError::PoolFull { capacity });
        }
        let state = self
            .emitters
            .get_mut(slot)
            .and_then(Option::as_mut)
            .ok_or(CapacityError::UnknownEmitter(slot))?;
        if state.particles.len() >= emitter.limit {
            return Err(CapacityError::EmitterLimit { limit: emitter.limit });
        }

        self.head = (self.head + 1) % capacity;
        if !self.pool.as_slice()[self.head].is_free() {
            return Err(CapacityError::SlotOccupied { slot: self.head });
        }
        let particle = ParticleSlot(u32::try_from(self.head).map_err(|_| CapacityError::PoolFull { capacity })?);
        state.particles.push(particle);
        self.count += 1;
        Ok(particle)
    }

    /// Spawns a burst of `emitter` at `parent`.
    ///
    /// A burst requested while another runs (a SPAWN event triggering an
    /// emitter) waits in a FIFO queue, so self-triggering chains run
    /// iteratively until the pool or the emitter limit stops them.
    pub(crate) fn burst(&mut self, system: &System, emitter: EmitterId, parent: Particle) {
        self.bursts.push_back((emitter, parent));
        if self.bursting {
            return;
        }
        self.bursting = true;
        while let Some((id, parent)) = self.bursts.pop_front() {
            if let Some(e) = system.emitter(id) {
                e.trigger(system, self, id.index(), &parent);
            }
        }
        self.bursting = false;
    }

    /// Marks a particle's slot free.
    pub(crate) fn free_particle(&mut self, particle: ParticleSlot) {
        if let Some(p) = self.pool.get_mut(particle.index()) {
            if !p.is_free() {
                p.release();
                self.count -= 1;
                self.stats.destroyed += 1;
            }
        }
    }

    /// Exclusive access to this partition's particles of one emitter.
    ///
    /// # Safety
    ///
    /// `partition` must satisfy the contract of [`Partition::new`], and no
    /// reference from an earlier call with the same partition may be alive.
    pub(crate) unsafe fn partition_mut(
        &self,
        emitter: usize,
        partition: Partition,
    ) -> impl Iterator<Item = (usize, ParticleSlot, &mut Particle)> + '_ {
        let particles = self.emitter_state(emitter).map_or(&[][..], |s| s.particles.as_slice());
        let pool = &self.pool;
        partition.indices(particles.len()).filter_map(move |index| {
            let slot = particles[index];
            if slot.index() >= pool.len() {
                return None;
            }
            // SAFETY: a pool slot is listed at most once across all live
            // lists, and only this partition visits list index `index`.
            let particle = unsafe { pool.slot_unchecked(slot.index()) };
            Some((index, slot, particle))
        })
    }

    /// This partition's particles of one emitter, each with its render slot.
    ///
    /// # Safety
    ///
    /// As [`Instance::partition_mut`].
    pub(crate) unsafe fn render_partition_mut(
        &self,
        renderer: usize,
        emitter: usize,
        partition: Partition,
    ) -> Option<impl Iterator<Item = (&Particle, &mut [u8])> + '_> {
        let state = self.renderers.get(renderer)?.as_ref()?;
        let particles = self.emitter_state(emitter)?.particles.as_slice();
        let size = state.particle_size;
        let base = *state.bases.get(emitter)?;
        let end = base + particles.len();
        if size == 0 || end > state.count || end * size > state.bytes.len() {
            return None;
        }
        let pool = &self.pool;
        let bytes = &state.bytes;
        Some(partition.indices(particles.len()).filter_map(move |index| {
            let slot = particles[index];
            if slot.index() >= pool.len() {
                return None;
            }
            // SAFETY: as `partition_mut`; render slot `base + index` is
            // likewise reached by this partition only.
            let particle: &Particle = unsafe { pool.slot_unchecked(slot.index()) };
            let dst = unsafe { bytes.range_unchecked((base + index) * size, size) };
            Some((particle, dst))
        }))
    }

    pub(crate) fn scratch(&self, partition: Partition) -> &Mutex<ThreadScratch> {
        &self.scratch[partition.thread % self.scratch.len()]
    }

    pub(crate) fn frame_seed(&self) -> u64 {
        self.seed ^ self.frame.wrapping_mul(0xD1B5_4A32_D192_ED03)
    }

    pub(crate) fn emitter_state(&self, slot: usize) -> Option<&EmitterState> {
        self.emitters.get(slot).and_then(Option::as_ref)
    }

    pub(crate) fn emitter_state_mut(&mut self, slot: usize) -> Option<&mut EmitterState> {
        self.emitters.get_mut(slot).and_then(Option::as_mut)
    }

    /// Particle template at the instance origin.
    pub(crate) fn spawn_origin(&self) -> Particle {
        let (_, rotation, translation) = self.transform.to_scale_rotation_translation();
        Particle::at(translation, rotation, self.velocity)
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Spawns one burst from every emitter at the instance origin.
    /// Does nothing while the instance is disabled.
    pub fn trigger(&mut self) {
        if !self.enabled {
            return;
        }
        let system = Arc::clone(&self.system);
        let parent = self.spawn_origin();
        for (id, _) in system.emitters() {
            self.burst(&system, id, parent);
        }
    }

    /// Clears every particle and restarts time.
    pub fn reset(&mut self) {
        self.initialise();
    }

    /// Translates every live particle.
    pub fn shift(&mut self, offset: Vec3) {
        for particle in self.pool.as_mut_slice() {
            if !particle.is_free() {
                particle.position += offset;
            }
        }
    }

    /// Fires every `kind` event of `emitter` for one of its particles.
    ///
    /// Returns how many events fired; none while the instance is disabled.
    pub fn fire(&mut self, kind: EventKind, emitter: EmitterId, particle: ParticleSlot) -> usize {
        if !self.enabled {
            return 0;
        }
        let system = Arc::clone(&self.system);
        let Some(e) = system.emitter(emitter) else {
            return 0;
        };
        if !self.emitter_particles(emitter).contains(&particle) {
            return 0;
        }
        e.fire_events(&system, self, kind, particle)
    }

    /// Reports a collision found by the host; fires COLLIDE events.
    pub fn notify_collision(&mut self, emitter: EmitterId, particle: ParticleSlot) -> usize {
        self.fire(EventKind::Collide, emitter, particle)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// The shared template.
    #[must_use]
    pub const fn system(&self) -> &Arc<System> {
        &self.system
    }

    /// Returns true if the instance simulates.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Starts or pauses simulation.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// World transform new particles spawn from.
    #[must_use]
    pub const fn transform(&self) -> &Mat4 {
        &self.transform
    }

    /// Moves the spawn origin. Live particles stay where they are.
    pub fn set_transform(&mut self, transform: Mat4) {
        self.transform = transform;
    }

    /// Velocity new particles start with.
    #[must_use]
    pub const fn velocity(&self) -> Vec3 {
        self.velocity
    }

    /// Sets the velocity new particles start with.
    pub fn set_velocity(&mut self, velocity: Vec3) {
        self.velocity = velocity;
    }

    /// Seconds simulated since initialise.
    #[must_use]
    pub const fn time(&self) -> f32 {
        self.time
    }

    /// Seed of the random streams.
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Reseeds the random streams from the current frame on.
    pub fn set_seed(&mut self, seed: u64) {
        self.seed = seed;
        self.rng = SimRng::seed_from_u64(seed);
    }

    /// Live particles.
    #[must_use]
    pub const fn particle_count(&self) -> usize {
        self.count
    }

    /// Pool slots.
    #[must_use]
    pub fn pool_size(&self) -> usize {
        self.pool.len()
    }

    /// Worker queues allocated.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.scratch.len()
    }

    /// Running totals.
    #[must_use]
    pub const fn stats(&self) -> InstanceStats {
        self.stats
    }

    /// A live particle.
    #[must_use]
    pub fn particle(&self, particle: ParticleSlot) -> Option<&Particle> {
        self.pool.get(particle.index()).filter(|p| !p.is_free())
    }

    /// Every live particle, in pool order.
    pub fn particles(&self) -> impl Iterator<Item = (ParticleSlot, &Particle)> {
        self.pool
            .as_slice()
            .iter()
            .zip(0u32..)
            .filter(|(p, _)| !p.is_free())
            .map(|(p, slot)| (ParticleSlot(slot), p))
    }

    /// Live particles of one emitter, in list order.
    #[must_use]
    pub fn emitter_particles(&self, emitter: EmitterId) -> &[ParticleSlot] {
        if self.system.emitter(emitter).is_none() {
            return &[];
        }
        self.emitter_state(emitter.index()).map_or(&[], |s| s.particles.as_slice())
    }

    /// Returns true if `emitter` spawns in this instance.
    #[must_use]
    pub fn is_emitter_enabled(&self, emitter: EmitterId) -> bool {
        self.system.emitter(emitter).is_some() && self.emitter_state(emitter.index()).is_some_and(|s| s.enabled)
    }

    /// Enables or disables spawning for `emitter`. Returns false for an
    /// emitter not in this instance's system.
    pub fn set_emitter_enabled(&mut self, emitter: EmitterId, enabled: bool) -> bool {
        if self.system.emitter(emitter).is_none() {
            return false;
        }
        match self.emitter_state_mut(emitter.index()) {
            Some(state) => {
                state.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Vertex bytes written for `renderer` in the last parallel phase.
    #[must_use]
    pub fn render_buffer(&self, renderer: RendererId) -> Option<RenderBuffer<'_>> {
        let render = self.system.renderer(renderer)?;
        let state = self.renderers.get(renderer.index())?.as_ref()?;
        let bytes = state.bytes.as_slice().get(..state.count * state.particle_size)?;
        Some(RenderBuffer::new(bytes, state.count, render.vertices_per_particle()))
    }
}
