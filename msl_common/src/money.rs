use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const CURRENCY_CODE: &str = "NGN";
pub const CURRENCY_CODE_LOWER: &str = "ngn";
pub const MINOR_UNITS_PER_MAJOR: i64 = 100;
/// One basis point is 0.01%.
pub const BPS_DENOMINATOR: i64 = 10_000;

//--------------------------------------       Money        ----------------------------------------------------------

/// A monetary amount in minor units (kobo). All ledger arithmetic happens on this type; floats
/// never touch persisted values.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Money(i64);

op!(binary Money, Add, add);
op!(binary Money, Sub, sub);
op!(inplace Money, AddAssign, add_assign);
op!(inplace Money, SubAssign, sub_assign);
op!(unary Money, Neg, neg);

impl Mul<i64> for Money {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in minor units: {0}")]
pub struct MoneyConversionError(String);

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Money {}

impl TryFrom<u64> for Money {
    type Error = MoneyConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(MoneyConversionError(format!("Value {} is too large to convert to Money", value)))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}₦{}.{:02}", abs / 100, abs % 100)
    }
}

impl Money {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_major(major: i64) -> Self {
        Self(major * MINOR_UNITS_PER_MAJOR)
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// The amount as a decimal string in major units, always with two decimals and no currency
    /// symbol. Suitable for exports and API payloads.
    pub fn to_major_units(&self) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        format!("{sign}{}.{:02}", abs / 100, abs % 100)
    }

    /// Applies a basis-point fee to this amount, rounding half away from zero.
    ///
    /// `Money::from(5000).apply_bps(750)` is 375 (7.5% of 5000). A half-minor-unit remainder
    /// rounds up, so fees are never silently truncated.
    pub fn apply_bps(&self, bps: i64) -> Self {
        let numerator = self.0 * bps;
        let half = if numerator < 0 { -BPS_DENOMINATOR / 2 } else { BPS_DENOMINATOR / 2 };
        Self((numerator + half) / BPS_DENOMINATOR)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn arithmetic_on_minor_units() {
        let a = Money::from(5_000);
        let b = Money::from(500);
        assert_eq!(a + b, Money::from(5_500));
        assert_eq!(a - b, Money::from(4_500));
        assert_eq!(-b, Money::from(-500));
        assert_eq!(b * 3, Money::from(1_500));
        let total: Money = [a, b, b].into_iter().sum();
        assert_eq!(total, Money::from(6_000));
        let mut c = a;
        c -= b;
        assert_eq!(c, Money::from(4_500));
        c += b;
        assert_eq!(c, a);
    }

    #[test]
    fn display_in_major_units() {
        assert_eq!(Money::from(5_500).to_string(), "₦55.00");
        assert_eq!(Money::from(-1_234).to_string(), "-₦12.34");
        assert_eq!(Money::from(7).to_string(), "₦0.07");
        assert_eq!(Money::from_major(250).to_major_units(), "250.00");
    }

    #[test]
    fn bps_rounds_half_up() {
        // 2.5% of 30 kobo is 0.75 -> 1
        assert_eq!(Money::from(30).apply_bps(250), Money::from(1));
        // exactly half rounds up: 5% of 10 is 0.5 -> 1
        assert_eq!(Money::from(10).apply_bps(500), Money::from(1));
        // just under half rounds down: 4.9% of 10 is 0.49 -> 0
        assert_eq!(Money::from(10).apply_bps(490), Money::from(0));
        assert_eq!(Money::from(5_000).apply_bps(750), Money::from(375));
        // negative amounts round away from zero
        assert_eq!(Money::from(-10).apply_bps(500), Money::from(-1));
    }

    #[test]
    fn u64_conversion_guards_overflow() {
        assert!(Money::try_from(u64::MAX).is_err());
        assert_eq!(Money::try_from(5_000u64).unwrap(), Money::from(5_000));
    }
}
