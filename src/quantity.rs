//! Fixed-point quantities and unit normalization.
//!
//! Every quantity handled by the engine is a [`Quantity`]: a decimal that is
//! always rescaled to [`SCALE`] fractional digits. Arithmetic re-rounds on every
//! step so no unrounded intermediate is ever stored or compared.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

use crate::errors::ServiceError;

/// Number of fractional digits kept for all quantities.
pub const SCALE: u32 = 4;

/// Decimal quantity pinned to four fractional digits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(Decimal);

fn round4(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(SCALE);
    rounded
}

impl Quantity {
    pub const ZERO: Quantity = Quantity(Decimal::ZERO);

    pub fn new(value: Decimal) -> Self {
        Self(round4(value))
    }

    pub fn from_units(units: i64) -> Self {
        Self::new(Decimal::from(units))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }

    pub fn min(self, other: Self) -> Self {
        if self <= other {
            self
        } else {
            other
        }
    }

    /// Clamps negative values to zero.
    pub fn non_negative(self) -> Self {
        if self.is_negative() {
            Self::ZERO
        } else {
            self
        }
    }

    pub fn mul_rate(self, rate: Decimal) -> Self {
        Self::new(self.0 * rate)
    }

    /// Divides by `rate`; a zero rate yields `None`.
    pub fn div_rate(self, rate: Decimal) -> Option<Self> {
        self.0.checked_div(rate).map(Self::new)
    }
}

impl From<Decimal> for Quantity {
    fn from(value: Decimal) -> Self {
        Self::new(value)
    }
}

impl From<i64> for Quantity {
    fn from(value: i64) -> Self {
        Self::from_units(value)
    }
}

impl FromStr for Quantity {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s.trim())
            .map(Self::new)
            .map_err(|e| ServiceError::ValidationError(format!("Invalid quantity '{}': {}", s, e)))
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialOrd for Quantity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Quantity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl Add for Quantity {
    type Output = Quantity;

    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.0 + rhs.0)
    }
}

impl Sub for Quantity {
    type Output = Quantity;

    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.0 - rhs.0)
    }
}

impl AddAssign for Quantity {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for Quantity {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl Neg for Quantity {
    type Output = Quantity;

    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl Sum for Quantity {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Quantity::ZERO, |acc, q| acc + q)
    }
}

impl<'a> Sum<&'a Quantity> for Quantity {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.fold(Quantity::ZERO, |acc, q| acc + *q)
    }
}

fn check_rate(rate: Decimal) -> Result<(), ServiceError> {
    if rate <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(format!(
            "Unit conversion rate must be positive, got {}",
            rate
        )));
    }
    Ok(())
}

/// Converts a quantity expressed in the production order's unit into the
/// material product's stocking unit.
pub fn to_standard_unit(quantity: Quantity, rate: Decimal) -> Result<Quantity, ServiceError> {
    check_rate(rate)?;
    quantity
        .div_rate(rate)
        .ok_or_else(|| ServiceError::InternalError("Unit conversion overflowed".to_string()))
}

/// Inverse of [`to_standard_unit`].
pub fn from_standard_unit(quantity: Quantity, rate: Decimal) -> Result<Quantity, ServiceError> {
    check_rate(rate)?;
    Ok(quantity.mul_rate(rate))
}
