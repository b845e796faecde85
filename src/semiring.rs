//! Combine operators for chart entries.
//!
//! The inside and outside passes are written once against `Semiring`; the
//! choice of instance decides whether a chart computes marginals or
//! max-marginals, and whether weights are stored as probabilities or as their
//! logarithms:
//! - `SumProduct`: (+, *) over probabilities
//! - `MaxProduct`: (max, *) over probabilities, the Viterbi semiring
//! - `LogSumProduct`: (log-sum-exp, +) over log probabilities
//! - `LogMaxProduct`: (max, +) over log probabilities
//!
//! The linear-space instances underflow once a product of rule weights drops
//! below `f64::MIN_POSITIVE` (roughly 1e-308), which happens on long inputs
//! or grammars with many low-probability rules. The log-space instances
//! should be used there.

use std::fmt::Debug;
use std::ops::{Add, Mul};

pub trait Semiring: Copy + Debug + PartialEq + PartialOrd + Add<Output = Self> + Mul<Output = Self> {
  /// True when `+` returns one of its operands. Only selective semirings
  /// record backpointers, so only their charts support tree extraction.
  const SELECTIVE: bool;

  /// True when values are stored as log weights, so products of small rule
  /// weights do not underflow
  const LOG_SPACE: bool = false;

  /// The additive identity, representing probability 0
  fn zero() -> Self;

  /// The multiplicative identity, representing probability 1
  fn one() -> Self;

  fn is_zero(&self) -> bool {
    *self == Self::zero()
  }

  /// Lift a nonnegative rule weight into the semiring
  fn from_weight(weight: f64) -> Self;

  /// The (unnormalized) probability this value represents
  fn to_weight(self) -> f64;

  /// Natural log of the represented probability
  fn log_weight(self) -> f64 {
    self.to_weight().ln()
  }

  /// Inverse of `*`. Used to normalize by a partition function without
  /// leaving the semiring's representation.
  fn divide(self, other: Self) -> Self;
}

/// Real weights with + and *. Charts over this semiring compute marginals.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd)]
pub struct SumProduct(pub f64);

impl Semiring for SumProduct {
  const SELECTIVE: bool = false;

  fn zero() -> Self {
    SumProduct(0.0)
  }

  fn one() -> Self {
    SumProduct(1.0)
  }

  fn from_weight(weight: f64) -> Self {
    SumProduct(weight)
  }

  fn to_weight(self) -> f64 {
    self.0
  }

  fn divide(self, other: Self) -> Self {
    SumProduct(self.0 / other.0)
  }
}

impl Add for SumProduct {
  type Output = Self;

  fn add(self, other: Self) -> Self {
    SumProduct(self.0 + other.0)
  }
}

impl Mul for SumProduct {
  type Output = Self;

  fn mul(self, other: Self) -> Self {
    SumProduct(self.0 * other.0)
  }
}

/// Real weights with max and *. Charts over this semiring compute
/// max-marginals and keep backpointers.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd)]
pub struct MaxProduct(pub f64);

impl Semiring for MaxProduct {
  const SELECTIVE: bool = true;

  fn zero() -> Self {
    MaxProduct(0.0)
  }

  fn one() -> Self {
    MaxProduct(1.0)
  }

  fn from_weight(weight: f64) -> Self {
    MaxProduct(weight)
  }

  fn to_weight(self) -> f64 {
    self.0
  }

  fn divide(self, other: Self) -> Self {
    MaxProduct(self.0 / other.0)
  }
}

impl Add for MaxProduct {
  type Output = Self;

  fn add(self, other: Self) -> Self {
    MaxProduct(self.0.max(other.0))
  }
}

impl Mul for MaxProduct {
  type Output = Self;

  fn mul(self, other: Self) -> Self {
    MaxProduct(self.0 * other.0)
  }
}

/// Log weights with log-sum-exp and +.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct LogSumProduct(pub f64);

impl Semiring for LogSumProduct {
  const SELECTIVE: bool = false;
  const LOG_SPACE: bool = true;

  fn zero() -> Self {
    LogSumProduct(f64::NEG_INFINITY)
  }

  fn one() -> Self {
    LogSumProduct(0.0)
  }

  fn from_weight(weight: f64) -> Self {
    LogSumProduct(weight.ln())
  }

  fn to_weight(self) -> f64 {
    self.0.exp()
  }

  fn log_weight(self) -> f64 {
    self.0
  }

  fn divide(self, other: Self) -> Self {
    LogSumProduct(self.0 - other.0)
  }
}

impl Add for LogSumProduct {
  type Output = Self;

  fn add(self, other: Self) -> Self {
    LogSumProduct(log_add(self.0, other.0))
  }
}

impl Mul for LogSumProduct {
  type Output = Self;

  fn mul(self, other: Self) -> Self {
    LogSumProduct(self.0 + other.0)
  }
}

/// Log weights with max and +, the log-space Viterbi semiring.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct LogMaxProduct(pub f64);

impl Semiring for LogMaxProduct {
  const SELECTIVE: bool = true;
  const LOG_SPACE: bool = true;

  fn zero() -> Self {
    LogMaxProduct(f64::NEG_INFINITY)
  }

  fn one() -> Self {
    LogMaxProduct(0.0)
  }

  fn from_weight(weight: f64) -> Self {
    LogMaxProduct(weight.ln())
  }

  fn to_weight(self) -> f64 {
    self.0.exp()
  }

  fn log_weight(self) -> f64 {
    self.0
  }

  fn divide(self, other: Self) -> Self {
    LogMaxProduct(self.0 - other.0)
  }
}

impl Add for LogMaxProduct {
  type Output = Self;

  fn add(self, other: Self) -> Self {
    LogMaxProduct(self.0.max(other.0))
  }
}

impl Mul for LogMaxProduct {
  type Output = Self;

  fn mul(self, other: Self) -> Self {
    LogMaxProduct(self.0 + other.0)
  }
}

/// ln(exp(a) + exp(b)) without leaving log space
fn log_add(a: f64, b: f64) -> f64 {
  let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
  if lo == f64::NEG_INFINITY {
    hi
  } else {
    hi + (lo - hi).exp().ln_1p()
  }
}
