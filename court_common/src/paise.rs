use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const INR_CURRENCY_CODE: &str = "INR";
/// One whole unit expressed in basis points.
pub const BASIS_POINTS: i64 = 10_000;

//--------------------------------------        Paise        ---------------------------------------------------------
/// A monetary amount in the smallest currency unit (1 rupee = 100 paise).
///
/// All money arithmetic in the engine happens on integer paise. There are no floating point amounts anywhere.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct Paise(i64);

op!(binary Paise, Add, add);
op!(binary Paise, Sub, sub);
op!(inplace Paise, AddAssign, add_assign);
op!(inplace Paise, SubAssign, sub_assign);
op!(unary Paise, Neg, neg);

impl Sum for Paise {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl<'a> Sum<&'a Paise> for Paise {
    fn sum<I: Iterator<Item = &'a Paise>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in paise: {0}")]
pub struct PaiseConversionError(String);

impl From<i64> for Paise {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl TryFrom<u64> for Paise {
    type Error = PaiseConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(PaiseConversionError(format!("Value {value} is too large to convert to Paise")))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for Paise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}₹{}.{:02}", abs / 100, abs % 100)
    }
}

impl Paise {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_rupees(rupees: i64) -> Self {
        Self(rupees * 100)
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// `rhs` times this amount, or `None` if the product does not fit in an `i64`.
    pub fn checked_mul(&self, rhs: i64) -> Option<Self> {
        self.0.checked_mul(rhs).map(Self)
    }

    /// The share of this amount given by `bps` basis points, rounded half-up to the nearest paisa.
    pub fn basis_points(&self, bps: i64) -> Self {
        let scaled = i128::from(self.0) * i128::from(bps);
        let half = i128::from(BASIS_POINTS / 2);
        let rounded = if scaled >= 0 {
            (scaled + half) / i128::from(BASIS_POINTS)
        } else {
            (scaled - half) / i128::from(BASIS_POINTS)
        };
        #[allow(clippy::cast_possible_truncation)]
        Self(rounded as i64)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(Paise::from(12_345).to_string(), "₹123.45");
        assert_eq!(Paise::from(5).to_string(), "₹0.05");
        assert_eq!(Paise::from(-250).to_string(), "-₹2.50");
        assert_eq!(Paise::from_rupees(40).to_string(), "₹40.00");
    }

    #[test]
    fn arithmetic() {
        let mut total = Paise::from(1000) + Paise::from(250) - Paise::from(50);
        assert_eq!(total, Paise::from(1200));
        total += Paise::from(100);
        total -= Paise::from(300);
        assert_eq!(total.value(), 1000);
        assert_eq!(Paise::from(150).checked_mul(3), Some(Paise::from(450)));
        let sum: Paise = [Paise::from(1), Paise::from(2), Paise::from(3)].iter().sum();
        assert_eq!(sum, Paise::from(6));
    }

    #[test]
    fn checked_mul_refuses_overflow() {
        assert_eq!(Paise::from(i64::MAX / 2).checked_mul(3), None);
        assert_eq!(Paise::from(i64::MIN).checked_mul(-1), None);
        assert_eq!(Paise::from(-25).checked_mul(4), Some(Paise::from(-100)));
    }

    #[test]
    fn basis_points_round_half_up() {
        // 2.5% of ₹100.00
        assert_eq!(Paise::from(10_000).basis_points(250), Paise::from(250));
        // 2.5% of 20 paise is exactly half a paisa
        assert_eq!(Paise::from(20).basis_points(250), Paise::from(1));
        // 2.5% of 19 paise is 0.475 paise
        assert_eq!(Paise::from(19).basis_points(250), Paise::from(0));
        assert_eq!(Paise::from(12_345).basis_points(0), Paise::from(0));
        assert_eq!(Paise::from(12_345).basis_points(BASIS_POINTS), Paise::from(12_345));
    }

    #[test]
    fn conversion() {
        assert!(Paise::try_from(u64::MAX).is_err());
        assert_eq!(Paise::try_from(42u64).unwrap(), Paise::from(42));
        let json = serde_json::to_string(&Paise::from(99)).unwrap();
        assert_eq!(json, "99");
    }
}
