use std::cmp::Ordering;
use std::fmt;

use crate::error::{DecodeError, ValueError, ValueResult};

/// A finite IEEE-754 double.
///
/// NaN and the infinities are rejected at construction, and `-0.0` is
/// normalised to `0.0`, so bitwise equality and total ordering agree.
#[derive(Clone, Copy)]
pub struct Number(f64);

impl Number {
    pub const ZERO: Number = Number(0.0);

    /// Wrap a float, rejecting non-finite values.
    pub fn new(value: f64) -> ValueResult<Self> {
        if !value.is_finite() {
            return Err(ValueError::InvalidNumber(value));
        }
        Ok(Self(if value == 0.0 { 0.0 } else { value }))
    }

    pub fn get(self) -> f64 {
        self.0
    }

    /// Exact `(mantissa, exponent)` with `value == mantissa * 2^exponent`.
    ///
    /// The mantissa is odd unless the value is zero, which is `(0, 0)`.
    pub(crate) fn to_mantissa_exp(self) -> (i64, i32) {
        let bits = self.0.to_bits();
        let negative = bits >> 63 == 1;
        let exp_bits = ((bits >> 52) & 0x7ff) as i32;
        let fraction = bits & ((1u64 << 52) - 1);
        let (mut mantissa, mut exp) = if exp_bits == 0 {
            (fraction, -1074)
        } else {
            (fraction | (1u64 << 52), exp_bits - 1075)
        };
        if mantissa == 0 {
            return (0, 0);
        }
        let shift = mantissa.trailing_zeros();
        mantissa >>= shift;
        exp += shift as i32;
        let m = mantissa as i64;
        (if negative { -m } else { m }, exp)
    }

    /// Inverse of [`to_mantissa_exp`](Self::to_mantissa_exp).
    pub(crate) fn from_mantissa_exp(mantissa: i64, exp: i64) -> Result<Self, DecodeError> {
        if mantissa == 0 {
            if exp != 0 {
                return Err(DecodeError::Malformed(format!("zero with exponent {exp}")));
            }
            return Ok(Self::ZERO);
        }
        if mantissa.unsigned_abs() >= 1u64 << 53 || mantissa % 2 == 0 {
            return Err(DecodeError::Malformed(format!(
                "non-canonical number mantissa {mantissa}"
            )));
        }
        if !(-1074..=971).contains(&exp) {
            return Err(DecodeError::Malformed(format!("number exponent {exp} out of range")));
        }
        let value = scale_by_power_of_two(mantissa as f64, exp as i32);
        if !value.is_finite() {
            return Err(DecodeError::Malformed(format!("number overflows: {mantissa}p{exp}")));
        }
        Ok(Self(value))
    }
}

/// `x * 2^exp`, exact whenever the result is representable.
fn scale_by_power_of_two(mut x: f64, mut exp: i32) -> f64 {
    // 2^k is a normal double for k in [-1022, 1023].
    let pow2 = |k: i32| f64::from_bits(((k + 1023) as u64) << 52);
    while exp > 1023 {
        x *= pow2(1023);
        exp -= 1023;
    }
    while exp < -1022 {
        x *= pow2(-1022);
        exp += 1022;
    }
    x * pow2(exp)
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for Number {}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Number {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl std::hash::Hash for Number {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl fmt::Debug for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<f64> for Number {
    type Error = ValueError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Number> for f64 {
    fn from(n: Number) -> Self {
        n.0
    }
}

macro_rules! number_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Number {
                fn from(v: $t) -> Self {
                    Number(if v == 0 { 0.0 } else { v as f64 })
                }
            }
        )*
    };
}

number_from_int!(i8, i16, i32, i64, u8, u16, u32, u64, usize);
