//! Randomized and animated scalar parameters.

use rand::Rng;

use super::graph::Graph;

/// A scalar parameter evaluated against a key.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Always the same value.
    Constant(f32),
    /// Uniform sample in `[min, max)`, independent of the key.
    Random {
        /// Lower bound.
        min: f32,
        /// Upper bound.
        max: f32,
    },
    /// The key mapped linearly onto `[low, high]`.
    Mapped {
        /// Value at key 0.
        low: f32,
        /// Value at key 1.
        high: f32,
    },
    /// Keyframed curve.
    Graph(Box<Graph>),
}

impl Default for Value {
    fn default() -> Self {
        Self::Constant(0.0)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Self::Constant(value)
    }
}

impl Value {
    /// Constant value.
    #[must_use]
    pub const fn constant(value: f32) -> Self {
        Self::Constant(value)
    }

    /// Uniform random value in `[min, max)`.
    #[must_use]
    pub const fn random(min: f32, max: f32) -> Self {
        Self::Random { min, max }
    }

    /// Linear mapping of the key.
    #[must_use]
    pub const fn mapped(low: f32, high: f32) -> Self {
        Self::Mapped { low, high }
    }

    /// Keyframed curve.
    #[must_use]
    pub fn graph(graph: Graph) -> Self {
        Self::Graph(Box::new(graph))
    }

    /// Evaluates the parameter.
    ///
    /// `rng` is only consumed by [`Value::Random`].
    #[inline]
    pub fn value<R: Rng + ?Sized>(&self, key: f32, rng: &mut R) -> f32 {
        match self {
            Self::Constant(value) => *value,
            Self::Random { min, max } => rng.gen::<f32>() * (max - min) + min,
            Self::Mapped { low, high } => key * (high - low) + low,
            Self::Graph(graph) => graph.value(key),
        }
    }

    /// Returns true if evaluating this value never depends on the key or rng.
    #[must_use]
    pub fn is_constant(&self) -> bool {
        matches!(self, Self::Constant(_))
    }
}
