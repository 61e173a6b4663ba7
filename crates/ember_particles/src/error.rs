//! # Particle Engine Error Types
//!
//! All errors that can occur while building systems, simulating instances
//! and driving the worker pool.

use thiserror::Error;

/// Why a particle could not be allocated.
///
/// The spawn is skipped; nothing else is affected.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityError {
    /// Every pool slot is in use.
    #[error("particle pool full: {capacity} slots in use")]
    PoolFull {
        /// Pool size.
        capacity: usize,
    },

    /// The emitter reached its own particle limit.
    #[error("emitter limit reached: {limit} particles")]
    EmitterLimit {
        /// The emitter's limit.
        limit: usize,
    },

    /// The single probed slot after the ring head was still alive.
    #[error("pool slot {slot} is occupied")]
    SlotOccupied {
        /// The probed slot.
        slot: usize,
    },

    /// The emitter has no state in this instance.
    #[error("emitter slot {0} is not part of this instance")]
    UnknownEmitter(usize),
}

/// Errors raised while editing a [`System`](crate::System).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemError {
    /// Emitter handle is stale or foreign.
    #[error("emitter not found in system")]
    EmitterNotFound,

    /// Affector handle is stale or foreign.
    #[error("affector not found in system")]
    AffectorNotFound,

    /// Event handle is stale or foreign.
    #[error("event not found in system")]
    EventNotFound,

    /// Renderer handle is stale or foreign.
    #[error("renderer not found in system")]
    RendererNotFound,

    /// Renderer is still used by at least one emitter.
    #[error("renderer is still referenced by {emitters} emitter(s)")]
    RendererInUse {
        /// Number of emitters using it.
        emitters: usize,
    },

    /// More affectors and events than capability bits on one emitter.
    #[error("emitter needs {requested} capability bits, only {available} exist")]
    CapabilityOverflow {
        /// Affectors plus events attached.
        requested: usize,
        /// Bits in a particle mask.
        available: usize,
    },
}

/// Result type for system editing.
pub type SystemResult<T> = Result<T, SystemError>;

/// Errors raised by the [`Manager`](crate::Manager) worker pool.
#[derive(Error, Debug)]
pub enum ManagerError {
    /// A worker count of zero was requested.
    #[error("worker pool needs at least one thread")]
    NoThreads,

    /// The OS refused to start a worker thread.
    #[error("failed to spawn worker {index}: {source}")]
    Spawn {
        /// Worker index.
        index: usize,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A worker panicked during the parallel phase.
    #[error("worker {0} panicked during the parallel phase")]
    WorkerPanicked(usize),

    /// A worker's channel is closed; the thread is gone.
    #[error("worker {0} is no longer running")]
    WorkerDisconnected(usize),
}

/// Result type for manager operations.
pub type ManagerResult<T> = Result<T, ManagerError>;

/// Errors raised while loading a [`ManagerConfig`](crate::ManagerConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML is malformed or has wrong types.
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// `threads = 0`; omit the key to run without workers.
    #[error("threads must be at least 1; omit it to run without workers")]
    ZeroThreads,

    /// More worker threads than the engine supports.
    #[error("{requested} worker threads requested, at most {max} supported")]
    TooManyThreads {
        /// Requested count.
        requested: usize,
        /// Supported maximum.
        max: usize,
    },
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;
