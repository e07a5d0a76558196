//! Integer basis-point arithmetic.
//!
//! All rates and fees in the engine are carried as whole basis points
//! (1 bps = 0.01% = 0.0001 as a fraction). Venue responses arrive as decimal
//! fractions and are converted exactly once at the adapter boundary; every
//! threshold comparison downstream is integer math, so float rounding can
//! never flip an emit/skip decision.

use std::fmt;
use std::ops::Neg;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One basis point expressed as a fraction.
const FRACTION_PER_BPS: f64 = 0.0001;

/// Largest fraction a venue may legally report (100%). Anything beyond this
/// is treated as a malformed response, not a market condition.
const MAX_ABS_FRACTION: f64 = 1.0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BpsError {
    #[error("rate is not a finite number")]
    NotFinite,

    #[error("rate magnitude {0} exceeds 1.0; response considered malformed")]
    OutOfRange(String),
}

/// Signed basis points.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Bps(pub i64);

impl Bps {
    pub const ZERO: Bps = Bps(0);

    pub const fn new(v: i64) -> Self {
        Bps(v)
    }

    /// Convert a decimal fraction (e.g. `0.0005`) into whole basis points,
    /// rounding half away from zero.
    ///
    /// Rejects non-finite input and magnitudes above 1.0 (see module docs).
    pub fn from_fraction(fraction: f64) -> Result<Self, BpsError> {
        if !fraction.is_finite() {
            return Err(BpsError::NotFinite);
        }
        if fraction.abs() > MAX_ABS_FRACTION {
            return Err(BpsError::OutOfRange(format!("{fraction}")));
        }

        Ok(Bps((fraction / FRACTION_PER_BPS).round() as i64))
    }

    pub fn as_fraction(self) -> f64 {
        self.0 as f64 * FRACTION_PER_BPS
    }

    pub fn raw(self) -> i64 {
        self.0
    }

    pub fn abs(self) -> Bps {
        Bps(self.0.saturating_abs())
    }

    pub fn saturating_add(self, other: Bps) -> Bps {
        Bps(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: Bps) -> Bps {
        Bps(self.0.saturating_sub(other.0))
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Ratio of `self` over `denom` as f64, used only for priority scoring
    /// where fractional precision is cosmetic rather than decision-bearing.
    pub fn ratio(self, denom: Bps) -> f64 {
        if denom.0 == 0 {
            return 0.0;
        }
        self.0 as f64 / denom.0 as f64
    }
}

impl Neg for Bps {
    type Output = Bps;

    fn neg(self) -> Bps {
        Bps(self.0.saturating_neg())
    }
}

impl fmt::Display for Bps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}bps", self.0)
    }
}
