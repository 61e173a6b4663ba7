//! # Curves
//!
//! Every per-particle parameter (spawn rate, life, scale, colour, forces) is
//! a curve evaluated against a key, usually the particle's age or the
//! instance time.
//!
//! ```text
//!   Value::Constant(v)        → v
//!   Value::Random { min, max } → uniform sample in [min, max)
//!   Value::Mapped { low, high } → key * (high - low) + low
//!   Value::Graph(g)           → piecewise linear over sorted keys
//! ```

mod graph;
mod value;

pub use graph::{Extrapolation, Gradient, Graph, Interpolation, Key, Lerp, ValueGraph};
pub use value::Value;

/// Random source used for every curve sample.
///
/// ChaCha8 is seedable and portable, so a fixed seed replays a simulation
/// exactly on every platform.
pub type SimRng = rand_chacha::ChaCha8Rng;
