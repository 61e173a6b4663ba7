//! Keyframed curves with linear interpolation.

use crate::error::{CurveError, CurveResult};

/// How values between two keys are blended.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Interpolation {
    /// Straight line between neighbouring keys.
    #[default]
    Linear,
    /// Hold the previous key's value. Not implemented.
    Stepped,
    /// Smooth curve through the keys. Not implemented.
    Spline,
}

/// How values outside the keyed range are produced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Extrapolation {
    /// Clamp to the first/last key.
    #[default]
    Constant,
    /// Extend the end slope. Not implemented.
    Continue,
    /// Wrap the key range. Not implemented.
    Repeat,
    /// Ping-pong the key range. Not implemented.
    Reflect,
}

/// A type that can be keyed in a [`ValueGraph`].
pub trait Lerp: Copy {
    /// Value of an empty graph.
    const DEFAULT: Self;

    /// Blends `a` towards `b` by `t` in `[0, 1]`.
    fn lerp(a: Self, b: Self, t: f32) -> Self;
}

impl Lerp for f32 {
    const DEFAULT: Self = 0.0;

    #[inline]
    fn lerp(a: Self, b: Self, t: f32) -> Self {
        a * (1.0 - t) + b * t
    }
}

/// Packed colour: each of the four byte channels blends independently.
impl Lerp for u32 {
    const DEFAULT: Self = 0xffff_ffff;

    #[inline]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn lerp(a: Self, b: Self, t: f32) -> Self {
        let s = 1.0 - t;
        let ca = a.to_le_bytes();
        let cb = b.to_le_bytes();
        let mut out = [0u8; 4];
        for (channel, (x, y)) in out.iter_mut().zip(ca.iter().zip(cb.iter())) {
            *channel = (s * f32::from(*x) + t * f32::from(*y)) as u8;
        }
        u32::from_le_bytes(out)
    }
}

/// One key of a graph.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Key<T> {
    /// Position on the key axis.
    pub key: f32,
    /// Value at that position.
    pub value: T,
}

/// A sorted sequence of keys evaluated by binary search and linear blend.
#[derive(Clone, Debug, PartialEq)]
pub struct ValueGraph<T> {
    keys: Vec<Key<T>>,
    interpolation: Interpolation,
    before: Extrapolation,
    after: Extrapolation,
}

/// Scalar curve.
pub type Graph = ValueGraph<f32>;

/// Packed colour curve.
pub type Gradient = ValueGraph<u32>;

impl<T> Default for ValueGraph<T> {
    fn default() -> Self {
        Self {
            keys: Vec::new(),
            interpolation: Interpolation::Linear,
            before: Extrapolation::Constant,
            after: Extrapolation::Constant,
        }
    }
}

impl<T: Lerp> ValueGraph<T> {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a graph from `(key, value)` pairs in any order.
    #[must_use]
    pub fn from_keys(pairs: &[(f32, T)]) -> Self {
        let mut graph = Self::new();
        for &(key, value) in pairs {
            graph.add(key, value);
        }
        graph
    }

    /// Inserts a key, keeping keys sorted. An equal key has its value replaced.
    ///
    /// Returns the index the key occupies.
    pub fn add(&mut self, key: f32, value: T) -> usize {
        match self.keys.binary_search_by(|k| k.key.total_cmp(&key)) {
            Ok(index) => {
                self.keys[index].value = value;
                index
            }
            Err(index) => {
                self.keys.insert(index, Key { key, value });
                index
            }
        }
    }

    /// Removes every key.
    pub fn clear(&mut self) {
        self.keys.clear();
    }

    /// The sorted keys.
    #[must_use]
    pub fn keys(&self) -> &[Key<T>] {
        &self.keys
    }

    /// Returns true if the graph has no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Evaluates the graph at `key`.
    ///
    /// Empty graphs return [`Lerp::DEFAULT`]; keys outside the range clamp.
    #[must_use]
    pub fn value(&self, key: f32) -> T {
        let (first, last) = match (self.keys.first(), self.keys.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return T::DEFAULT,
        };
        if self.keys.len() == 1 || key <= first.key {
            return first.value;
        }
        if key >= last.key {
            return last.value;
        }

        let (mut a, mut b) = (0, self.keys.len() - 1);
        while b > a + 1 {
            let c = (a + b) / 2;
            if self.keys[c].key > key {
                b = c;
            } else {
                a = c;
            }
        }
        let (lo, hi) = (&self.keys[a], &self.keys[b]);
        let t = (key - lo.key) / (hi.key - lo.key);
        T::lerp(lo.value, hi.value, t)
    }

    /// Current interpolation mode.
    #[must_use]
    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    /// Sets the interpolation mode. Only [`Interpolation::Linear`] is accepted.
    ///
    /// # Errors
    ///
    /// Returns [`CurveError::UnsupportedInterpolation`] for other modes.
    pub fn set_interpolation(&mut self, mode: Interpolation) -> CurveResult<()> {
        if mode != Interpolation::Linear {
            return Err(CurveError::UnsupportedInterpolation(mode));
        }
        self.interpolation = mode;
        Ok(())
    }

    /// Extrapolation modes before the first and after the last key.
    #[must_use]
    pub fn extrapolation(&self) -> (Extrapolation, Extrapolation) {
        (self.before, self.after)
    }

    /// Sets extrapolation modes. Only [`Extrapolation::Constant`] is accepted.
    ///
    /// # Errors
    ///
    /// Returns [`CurveError::UnsupportedExtrapolation`] naming the first
    /// rejected mode.
    pub fn set_extrapolation(&mut self, before: Extrapolation, after: Extrapolation) -> CurveResult<()> {
        for mode in [before, after] {
            if mode != Extrapolation::Constant {
                return Err(CurveError::UnsupportedExtrapolation(mode));
            }
        }
        self.before = before;
        self.after = after;
        Ok(())
    }
}
