//! Scalar field contract shared by every storage type and provider.
//!
//! All numeric algorithms are generic over [`Field`]. The real-number hooks
//! (`magnitude`, `sqrt`, `to_real`, ...) are optional: a field that does not
//! answer them still gets exact add/multiply/elimination, it just never
//! reaches the device path.

use num_traits::{Float, ToPrimitive};
use std::fmt::Debug;

pub trait Field: Clone + Debug + PartialEq + Send + Sync + 'static {
    /// The additive identity. Must be unique.
    fn zero() -> Self;

    /// The multiplicative identity.
    fn one() -> Self;

    fn add(&self, rhs: &Self) -> Self;

    fn negate(&self) -> Self;

    fn multiply(&self, rhs: &Self) -> Self;

    /// Multiplicative inverse, `None` for zero.
    fn reciprocal(&self) -> Option<Self>;

    fn is_zero(&self) -> bool {
        *self == Self::zero()
    }

    fn subtract(&self, rhs: &Self) -> Self {
        self.add(&rhs.negate())
    }

    fn divide(&self, rhs: &Self) -> Option<Self> {
        rhs.reciprocal().map(|inv| self.multiply(&inv))
    }

    /// Absolute value for ordered fields. Used for partial pivoting.
    fn magnitude(&self) -> Option<f64> {
        None
    }

    fn sqrt(&self) -> Option<Self> {
        None
    }

    /// Machine epsilon of the representation, `None` for exact fields.
    /// Scales the singularity tolerance of elimination.
    fn epsilon() -> Option<f64> {
        None
    }

    /// Value in the native device format.
    fn to_real(&self) -> Option<f64> {
        None
    }

    fn from_real(_value: f64) -> Option<Self> {
        None
    }

    /// Zero-copy view of a contiguous slice as device-format floats.
    ///
    /// Only answers `Some` when the element layout is bit-identical to `f64`.
    fn as_real_slice(_data: &[Self]) -> Option<&[f64]> {
        None
    }

    /// Converts device output back into field elements.
    fn from_real_vec(data: Vec<f64>) -> Option<Vec<Self>> {
        data.into_iter().map(Self::from_real).collect()
    }

    /// Whether elements of this field may be shipped to the device.
    fn is_real() -> bool {
        Self::from_real(0.0).is_some()
    }
}

// Shared method bodies for the native float types.
macro_rules! real_field_ops {
    ($t:ty) => {
        fn zero() -> Self {
            0.0
        }

        fn one() -> Self {
            1.0
        }

        fn add(&self, rhs: &Self) -> Self {
            *self + *rhs
        }

        fn negate(&self) -> Self {
            -*self
        }

        fn multiply(&self, rhs: &Self) -> Self {
            *self * *rhs
        }

        fn reciprocal(&self) -> Option<Self> {
            if *self == 0.0 {
                None
            } else {
                Some(Float::recip(*self))
            }
        }

        fn magnitude(&self) -> Option<f64> {
            Float::abs(*self).to_f64()
        }

        fn sqrt(&self) -> Option<Self> {
            if *self < 0.0 {
                None
            } else {
                Some(Float::sqrt(*self))
            }
        }

        fn epsilon() -> Option<f64> {
            Some(<$t>::EPSILON as f64)
        }

        fn to_real(&self) -> Option<f64> {
            self.to_f64()
        }

        fn from_real(value: f64) -> Option<Self> {
            Some(value as $t)
        }
    };
}

impl Field for f64 {
    real_field_ops!(f64);

    fn as_real_slice(data: &[Self]) -> Option<&[f64]> {
        Some(data)
    }

    fn from_real_vec(data: Vec<f64>) -> Option<Vec<Self>> {
        Some(data)
    }
}

impl Field for f32 {
    real_field_ops!(f32);
}

/// Integers modulo a prime `P`.
///
/// An exact, non-real field: every operation is served by the CPU providers.
/// `P` must be prime for `reciprocal` to be a true inverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ModP<const P: u64>(u64);

impl<const P: u64> ModP<P> {
    pub fn new(value: u64) -> Self {
        Self(value % P)
    }

    /// Reduces a signed integer into `0..P`.
    pub fn from_i64(value: i64) -> Self {
        Self(value.rem_euclid(P as i64) as u64)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    fn pow(self, mut exp: u64) -> Self {
        let mut base = self.0 as u128;
        let mut acc: u128 = 1;
        let modulus = P as u128;
        while exp > 0 {
            if exp & 1 == 1 {
                acc = acc * base % modulus;
            }
            base = base * base % modulus;
            exp >>= 1;
        }
        Self(acc as u64)
    }
}

impl<const P: u64> Field for ModP<P> {
    fn zero() -> Self {
        Self(0)
    }

    fn one() -> Self {
        Self(1 % P)
    }

    fn add(&self, rhs: &Self) -> Self {
        Self(((self.0 as u128 + rhs.0 as u128) % P as u128) as u64)
    }

    fn negate(&self) -> Self {
        if self.0 == 0 {
            *self
        } else {
            Self(P - self.0)
        }
    }

    fn multiply(&self, rhs: &Self) -> Self {
        Self(((self.0 as u128 * rhs.0 as u128) % P as u128) as u64)
    }

    fn reciprocal(&self) -> Option<Self> {
        if self.0 == 0 {
            None
        } else {
            // Fermat: a^(P-2) == a^-1 for prime P.
            Some(self.pow(P - 2))
        }
    }
}
