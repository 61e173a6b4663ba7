//! # Core Error Types

use thiserror::Error;

use crate::curve::{Extrapolation, Interpolation};

/// Errors raised while configuring curves.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurveError {
    /// The evaluator only interpolates linearly.
    #[error("interpolation mode {0:?} is not implemented")]
    UnsupportedInterpolation(Interpolation),

    /// The evaluator only clamps outside the keyed range.
    #[error("extrapolation mode {0:?} is not implemented")]
    UnsupportedExtrapolation(Extrapolation),
}

/// Result type for curve operations.
pub type CurveResult<T> = Result<T, CurveError>;
