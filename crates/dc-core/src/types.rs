//! Counting arithmetic with uncorrelated error propagation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Div, Mul, Sub};

/// An event count (or any derived scalar) with a one-sigma uncertainty.
///
/// All propagation formulas assume uncorrelated operands. The uncertainty
/// is kept non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Count {
    value: f64,
    uncertainty: f64,
}

impl Count {
    /// Result of a ratio whose denominator (or a relative error term) is zero.
    pub const SENTINEL: Count = Count { value: -1.0, uncertainty: 0.0 };

    /// Zero with zero uncertainty.
    pub const ZERO: Count = Count { value: 0.0, uncertainty: 0.0 };

    /// Create a count. A negative uncertainty is stored by magnitude.
    pub fn new(value: f64, uncertainty: f64) -> Self {
        Self { value, uncertainty: uncertainty.abs() }
    }

    /// Central value.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// One-sigma uncertainty (always >= 0).
    pub fn uncertainty(&self) -> f64 {
        self.uncertainty
    }

    /// True if this count is the division sentinel.
    pub fn is_sentinel(&self) -> bool {
        *self == Self::SENTINEL
    }

    /// Multiply value and uncertainty by a constant.
    pub fn scale(self, factor: f64) -> Count {
        Count::new(self.value * factor, self.uncertainty * factor.abs())
    }
}

impl fmt::Display for Count {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} +- {}", self.value, self.uncertainty)
    }
}

/// Square root of the sum of squares.
pub fn quadrature_sum<I>(terms: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    terms.into_iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// `num / den` with relative errors added in quadrature.
///
/// Returns [`Count::SENTINEL`] when `den.value <= 0`, or when either relative
/// error term would divide by zero (a zero numerator).
pub fn combine_ratio(num: Count, den: Count) -> Count {
    if !(den.value > 0.0) || num.value == 0.0 || !num.value.is_finite() {
        return Count::SENTINEL;
    }
    let value = num.value / den.value;
    let rel = quadrature_sum([num.uncertainty / num.value, den.uncertainty / den.value]);
    Count::new(value, value * rel)
}

/// `a * b` with absolute error terms added in quadrature.
pub fn combine_product(a: Count, b: Count) -> Count {
    Count::new(
        a.value * b.value,
        quadrature_sum([a.uncertainty * b.value, b.uncertainty * a.value]),
    )
}

impl Add for Count {
    type Output = Count;

    fn add(self, rhs: Count) -> Count {
        Count::new(self.value + rhs.value, quadrature_sum([self.uncertainty, rhs.uncertainty]))
    }
}

impl Sub for Count {
    type Output = Count;

    fn sub(self, rhs: Count) -> Count {
        Count::new(self.value - rhs.value, quadrature_sum([self.uncertainty, rhs.uncertainty]))
    }
}

impl Mul for Count {
    type Output = Count;

    fn mul(self, rhs: Count) -> Count {
        combine_product(self, rhs)
    }
}

impl Div for Count {
    type Output = Count;

    fn div(self, rhs: Count) -> Count {
        combine_ratio(self, rhs)
    }
}
