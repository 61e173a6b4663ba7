//! # Particle System Template
//!
//! A `System` is the shared, read-only definition of an effect. It is
//! built by direct method calls, then wrapped in an `Arc` and shared by
//! every [`Instance`](crate::Instance) that plays it.
//!
//! ```text
//!   System ─┬─ emitters   Arena<Emitter>     ─┐ ids only:
//!           ├─ affectors  Arena<Affector>     │ emitters reference
//!           ├─ events     Arena<Event>        │ affectors, events and
//!           └─ renderers  Arena<RenderData>  ─┘ renderers by handle
//! ```
//!
//! Handles are generational, so removing an object turns every stale
//! reference into a detectable miss instead of a dangling pointer.

use ember_core::Arena;
use tracing::debug;

use crate::affector::{Affector, AffectorId};
use crate::emitter::{Emitter, EmitterId};
use crate::error::{SystemError, SystemResult};
use crate::event::{Event, EventId};
use crate::render::{RenderData, RendererId};

/// Default particle pool size per instance.
pub const DEFAULT_POOL_SIZE: usize = 500;

/// Shared definition of a particle effect.
#[derive(Clone, Debug)]
pub struct System {
    emitters: Arena<Emitter>,
    affectors: Arena<Affector>,
    events: Arena<Event>,
    renderers: Arena<RenderData>,
    pool_size: usize,
}

impl Default for System {
    fn default() -> Self {
        Self::new()
    }
}

impl System {
    /// Empty system with the default pool size.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            emitters: Arena::new(),
            affectors: Arena::new(),
            events: Arena::new(),
            renderers: Arena::new(),
            pool_size: DEFAULT_POOL_SIZE,
        }
    }

    /// Particle slots each instance allocates.
    #[must_use]
    pub const fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Sets the pool size. Takes effect when an instance initialises.
    pub fn set_pool_size(&mut self, pool_size: usize) {
        self.pool_size = pool_size;
    }

    // =========================================================================
    // Emitters
    // =========================================================================

    /// Registers an emitter.
    pub fn add_emitter(&mut self, emitter: Emitter) -> EmitterId {
        let id = self.emitters.insert(emitter);
        debug!(emitter = id.index(), "emitter added");
        id
    }

    /// Removes an emitter. Events targeting it become no-ops.
    ///
    /// # Errors
    ///
    /// Returns [`SystemError::EmitterNotFound`] for a stale handle.
    pub fn remove_emitter(&mut self, id: EmitterId) -> SystemResult<Emitter> {
        let emitter = self.emitters.remove(id).ok_or(SystemError::EmitterNotFound)?;
        debug!(emitter = id.index(), "emitter removed");
        Ok(emitter)
    }

    /// Looks up an emitter.
    #[inline]
    #[must_use]
    pub fn emitter(&self, id: EmitterId) -> Option<&Emitter> {
        self.emitters.get(id)
    }

    /// Looks up an emitter by slot.
    #[inline]
    pub(crate) fn emitter_at(&self, slot: usize) -> Option<&Emitter> {
        self.emitters.get_by_index(slot)
    }

    /// Mutable access to an emitter's parameters.
    #[must_use]
    pub fn emitter_mut(&mut self, id: EmitterId) -> Option<&mut Emitter> {
        self.emitters.get_mut(id)
    }

    /// Every emitter, in slot order.
    pub fn emitters(&self) -> impl Iterator<Item = (EmitterId, &Emitter)> {
        self.emitters.iter()
    }

    /// Highest emitter slot plus one.
    #[must_use]
    pub fn emitter_slots(&self) -> usize {
        self.emitters.slot_count()
    }

    /// Draws `emitter` with `renderer`, or with nothing.
    ///
    /// # Errors
    ///
    /// Returns [`SystemError::EmitterNotFound`] or
    /// [`SystemError::RendererNotFound`] for stale handles.
    pub fn set_renderer(&mut self, emitter: EmitterId, renderer: Option<RendererId>) -> SystemResult<()> {
        if let Some(renderer) = renderer {
            if !self.renderers.contains(renderer) {
                return Err(SystemError::RendererNotFound);
            }
        }
        self.emitters
            .get_mut(emitter)
            .ok_or(SystemError::EmitterNotFound)?
            .set_renderer(renderer);
        Ok(())
    }

    // =========================================================================
    // Renderers
    // =========================================================================

    /// Registers a renderer.
    pub fn add_renderer(&mut self, renderer: RenderData) -> RendererId {
        let id = self.renderers.insert(renderer);
        debug!(renderer = id.index(), "renderer added");
        id
    }

    /// Removes a renderer no emitter uses.
    ///
    /// # Errors
    ///
    /// Returns [`SystemError::RendererNotFound`] for a stale handle and
    /// [`SystemError::RendererInUse`] while an emitter references it.
    pub fn remove_renderer(&mut self, id: RendererId) -> SystemResult<RenderData> {
        if !self.renderers.contains(id) {
            return Err(SystemError::RendererNotFound);
        }
        let users = self
            .emitters
            .iter()
            .filter(|(_, emitter)| emitter.renderer() == Some(id))
            .count();
        if users > 0 {
            return Err(SystemError::RendererInUse { emitters: users });
        }
        self.renderers.remove(id).ok_or(SystemError::RendererNotFound)
    }

    /// Looks up a renderer.
    #[inline]
    #[must_use]
    pub fn renderer(&self, id: RendererId) -> Option<&RenderData> {
        self.renderers.get(id)
    }

    /// Every renderer, in slot order.
    pub fn renderers(&self) -> impl Iterator<Item = (RendererId, &RenderData)> {
        self.renderers.iter()
    }

    /// Highest renderer slot plus one.
    #[must_use]
    pub fn renderer_slots(&self) -> usize {
        self.renderers.slot_count()
    }

    // =========================================================================
    // Affectors
    // =========================================================================

    /// Registers an affector. Attach it to emitters to use it.
    pub fn add_affector(&mut self, affector: Affector) -> AffectorId {
        self.affectors.insert(affector)
    }

    /// Removes an affector and detaches it from every emitter.
    ///
    /// # Errors
    ///
    /// Returns [`SystemError::AffectorNotFound`] for a stale handle.
    pub fn remove_affector(&mut self, id: AffectorId) -> SystemResult<Affector> {
        let affector = self.affectors.remove(id).ok_or(SystemError::AffectorNotFound)?;
        let users: Vec<_> = self
            .emitters
            .iter()
            .filter(|(_, emitter)| emitter.affectors().contains(&id))
            .map(|(emitter, _)| emitter)
            .collect();
        for emitter in users {
            if let Some(e) = self.emitters.get_mut(emitter) {
                e.affectors_mut().retain(|&a| a != id);
            }
            // Fewer owners always fit
            self.reallocate(emitter)?;
        }
        Ok(affector)
    }

    /// Looks up an affector.
    #[inline]
    #[must_use]
    pub fn affector(&self, id: AffectorId) -> Option<&Affector> {
        self.affectors.get(id)
    }

    /// Mutable access to an affector's behaviour.
    #[must_use]
    pub fn affector_mut(&mut self, id: AffectorId) -> Option<&mut Affector> {
        self.affectors.get_mut(id)
    }

    /// Every affector.
    pub fn affectors(&self) -> impl Iterator<Item = (AffectorId, &Affector)> {
        self.affectors.iter()
    }

    /// Applies `affector` to `emitter`'s particles, after those already
    /// attached.
    ///
    /// # Errors
    ///
    /// Returns a not-found error for stale handles and
    /// [`SystemError::CapabilityOverflow`] past 32 affectors and events;
    /// the emitter is left unchanged on error.
    pub fn attach_affector(&mut self, emitter: EmitterId, affector: AffectorId) -> SystemResult<()> {
        if !self.affectors.contains(affector) {
            return Err(SystemError::AffectorNotFound);
        }
        let e = self.emitters.get_mut(emitter).ok_or(SystemError::EmitterNotFound)?;
        if e.affectors().contains(&affector) {
            return Ok(());
        }
        e.affectors_mut().push(affector);
        if let Err(err) = self.reallocate(emitter) {
            if let Some(e) = self.emitters.get_mut(emitter) {
                e.affectors_mut().pop();
            }
            return Err(err);
        }
        debug!(emitter = emitter.index(), affector = affector.index(), "affector attached");
        Ok(())
    }

    /// Stops applying `affector` to `emitter`'s particles.
    ///
    /// # Errors
    ///
    /// Returns a not-found error for stale handles.
    pub fn detach_affector(&mut self, emitter: EmitterId, affector: AffectorId) -> SystemResult<()> {
        self.emitters
            .get_mut(emitter)
            .ok_or(SystemError::EmitterNotFound)?
            .affectors_mut()
            .retain(|&a| a != affector);
        self.reallocate(emitter)
    }

    /// Sets whether new particles start with `affector` active.
    ///
    /// # Errors
    ///
    /// Returns [`SystemError::AffectorNotFound`] for a stale handle.
    pub fn set_affector_start_enabled(&mut self, id: AffectorId, enabled: bool) -> SystemResult<()> {
        self.affectors
            .get_mut(id)
            .ok_or(SystemError::AffectorNotFound)?
            .set_start_enabled(enabled);
        self.reallocate_where(|emitter| emitter.affectors().contains(&id))
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Registers an event. Attach it to emitters to use it.
    pub fn add_event(&mut self, event: Event) -> EventId {
        self.events.insert(event)
    }

    /// Removes an event and detaches it from every emitter.
    ///
    /// # Errors
    ///
    /// Returns [`SystemError::EventNotFound`] for a stale handle.
    pub fn remove_event(&mut self, id: EventId) -> SystemResult<Event> {
        let event = self.events.remove(id).ok_or(SystemError::EventNotFound)?;
        let users: Vec<_> = self
            .emitters
            .iter()
            .filter(|(_, emitter)| emitter.events().contains(&id))
            .map(|(emitter, _)| emitter)
            .collect();
        for emitter in users {
            if let Some(e) = self.emitters.get_mut(emitter) {
                e.events_mut().retain(|&ev| ev != id);
            }
            self.reallocate(emitter)?;
        }
        Ok(event)
    }

    /// Looks up an event.
    #[inline]
    #[must_use]
    pub fn event(&self, id: EventId) -> Option<&Event> {
        self.events.get(id)
    }

    /// Mutable access to an event's effect, target and timing.
    #[must_use]
    pub fn event_mut(&mut self, id: EventId) -> Option<&mut Event> {
        self.events.get_mut(id)
    }

    /// Every event.
    pub fn events(&self) -> impl Iterator<Item = (EventId, &Event)> {
        self.events.iter()
    }

    /// Fires `event` for `emitter`'s particles.
    ///
    /// # Errors
    ///
    /// Returns a not-found error for stale handles and
    /// [`SystemError::CapabilityOverflow`] past 32 affectors and events;
    /// the emitter is left unchanged on error.
    pub fn attach_event(&mut self, emitter: EmitterId, event: EventId) -> SystemResult<()> {
        if !self.events.contains(event) {
            return Err(SystemError::EventNotFound);
        }
        let e = self.emitters.get_mut(emitter).ok_or(SystemError::EmitterNotFound)?;
        if e.events().contains(&event) {
            return Ok(());
        }
        e.events_mut().push(event);
        if let Err(err) = self.reallocate(emitter) {
            if let Some(e) = self.emitters.get_mut(emitter) {
                e.events_mut().pop();
            }
            return Err(err);
        }
        debug!(emitter = emitter.index(), event = event.index(), "event attached");
        Ok(())
    }

    /// Stops firing `event` for `emitter`'s particles.
    ///
    /// # Errors
    ///
    /// Returns a not-found error for stale handles.
    pub fn detach_event(&mut self, emitter: EmitterId, event: EventId) -> SystemResult<()> {
        self.emitters
            .get_mut(emitter)
            .ok_or(SystemError::EmitterNotFound)?
            .events_mut()
            .retain(|&ev| ev != event);
        self.reallocate(emitter)
    }

    /// Sets whether new particles start with `event` active.
    ///
    /// # Errors
    ///
    /// Returns [`SystemError::EventNotFound`] for a stale handle.
    pub fn set_event_start_enabled(&mut self, id: EventId, enabled: bool) -> SystemResult<()> {
        self.events
            .get_mut(id)
            .ok_or(SystemError::EventNotFound)?
            .set_start_enabled(enabled);
        self.reallocate_where(|emitter| emitter.events().contains(&id))
    }

    // =========================================================================
    // Capability bits
    // =========================================================================

    fn reallocate(&mut self, id: EmitterId) -> SystemResult<()> {
        let emitter = self.emitters.get_mut(id).ok_or(SystemError::EmitterNotFound)?;
        emitter.allocate_affector_masks(&self.affectors, &self.events)
    }

    fn reallocate_where(&mut self, filter: impl Fn(&Emitter) -> bool) -> SystemResult<()> {
        let affectors = &self.affectors;
        let events = &self.events;
        for (_, emitter) in self.emitters.iter_mut() {
            if filter(emitter) {
                emitter.allocate_affector_masks(affectors, events)?;
            }
        }
        Ok(())
    }
}
