//! # EMBER Particles
//!
//! Real-time particle simulation:
//! - Shared, read-only [`System`] templates of emitters, affectors, events
//!   and renderers
//! - Per-activation [`Instance`] state with a fixed particle pool
//! - A [`Manager`] that runs every instance's parallel phase on a fixed
//!   worker pool, with output identical for any thread count
//!
//! ## Architecture Rules
//!
//! 1. **No allocation in the steady-state frame** - pools, live lists and
//!    queues are sized up front and reused
//! 2. **Lock-free by partitioning** - a worker only touches particles and
//!    render slots at its own strided indices
//! 3. **Structural edits are serial** - spawning, freeing and events run on
//!    the caller thread
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ember_particles::{Emitter, EmitterShape, Instance, Manager, RenderData, RenderKind, System};
//! use glam::Mat4;
//!
//! let mut system = System::new();
//! let sparks = system.add_emitter(Emitter::new(EmitterShape::point(2.0)));
//! let sprites = system.add_renderer(RenderData::new(RenderKind::Sprite));
//! system.set_renderer(sparks, Some(sprites))?;
//!
//! let mut manager = Manager::new();
//! manager.start_threads(4)?;
//! let handle = manager.add(Instance::new(Arc::new(system)));
//!
//! manager.update(1.0 / 60.0, &Mat4::IDENTITY)?;
//! let buffer = manager.get(handle).unwrap().render_buffer(sprites);
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod affector;
pub mod capability;
pub mod config;
pub mod emitter;
pub mod error;
pub mod event;
pub mod instance;
pub mod manager;
pub mod particle;
pub mod render;
pub mod system;

pub use affector::{Affector, AffectorBehaviour, AffectorId, AffectorKind};
pub use capability::{CapabilityOwner, CapabilityTable, TargetRef, MAX_CAPABILITIES};
pub use config::{ManagerConfig, MAX_THREADS};
pub use emitter::{Emitter, EmitterId, EmitterShape, SpawnShape};
pub use error::{
    CapacityError, ConfigError, ConfigResult, ManagerError, ManagerResult, SystemError, SystemResult,
};
pub use event::{Event, EventEffect, EventId, EventKind, EventTarget};
pub use instance::{Instance, InstanceStats};
pub use manager::{InstanceHandle, Manager};
pub use particle::{Particle, ParticleSlot};
pub use render::{
    AttributeFormat, AttributeSemantic, InstanceVertex, PointVertex, Primitive, RenderBuffer, RenderData,
    RenderKind, RendererId, SpriteVertex, VertexAttribute, VertexAttributes, VertexWriter,
};
pub use system::{System, DEFAULT_POOL_SIZE};

pub use ember_core::{Gradient, Graph, SimRng, Value};
