//! # EMBER Core
//!
//! Shared primitives for the EMBER particle engine:
//! - Curves that drive every animated or randomized particle parameter
//! - Generational arenas, so stale handles are detected instead of dangling
//! - Partitioned slot storage, so worker threads can write disjoint elements
//!   of one buffer without locks
//!
//! ## Example
//!
//! ```rust,ignore
//! use ember_core::{Graph, Value, SimRng};
//! use rand::SeedableRng;
//!
//! let mut rng = SimRng::seed_from_u64(7);
//! let mut fade = Graph::new();
//! fade.add(0.0, 1.0);
//! fade.add(2.0, 0.0);
//! let value = Value::graph(fade);
//! assert_eq!(value.value(1.0, &mut rng), 0.5);
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod curve;
pub mod error;
pub mod memory;
pub mod sync;

pub use curve::{Extrapolation, Gradient, Graph, Interpolation, Key, Lerp, SimRng, Value, ValueGraph};
pub use error::{CurveError, CurveResult};
pub use memory::{Arena, Handle};
pub use sync::PartitionedSlots;
