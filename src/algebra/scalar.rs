use super::*;

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Mul, Neg, Sub};

use num_traits::Zero;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

macro_rules! ring_scalar {
    ($name:ident, $word:ty, $signed:ty) => {
        #[derive(Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub $word);

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_fmt(format_args!("{}", self.0))
            }
        }

        impl Add for $name {
            type Output = Self;

            fn add(self, other: Self) -> Self::Output {
                Self(<$word>::wrapping_add(self.0, other.0))
            }
        }

        impl Sub for $name {
            type Output = Self;

            fn sub(self, other: Self) -> Self::Output {
                Self(<$word>::wrapping_sub(self.0, other.0))
            }
        }

        impl Mul for $name {
            type Output = Self;

            fn mul(self, other: Self) -> Self::Output {
                Self(<$word>::wrapping_mul(self.0, other.0))
            }
        }

        impl Neg for $name {
            type Output = Self;

            fn neg(self) -> Self::Output {
                Self(<$word>::wrapping_neg(self.0))
            }
        }

        impl Sum for $name {
            fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
                iter.fold(Self(0), |acc, x| acc + x)
            }
        }

        impl Zero for $name {
            fn zero() -> Self {
                Self(0)
            }

            fn is_zero(&self) -> bool {
                self.0 == 0
            }
        }

        impl Samplable for $name {
            fn gen<R: RngCore>(rng: &mut R) -> Self {
                Self(rng.gen::<$word>())
            }
        }

        impl RingElement for $name {
            const ONE: Self = Self(1);
            const ZERO: Self = Self(0);
            const BITS: u32 = <$word>::BITS;

            fn from_u64(v: u64) -> Self {
                Self(v as $word)
            }

            fn as_u64(self) -> u64 {
                self.0 as u64
            }

            fn from_u128(v: u128) -> Self {
                Self(v as $word)
            }

            fn as_u128(self) -> u128 {
                self.0 as u128
            }

            fn from_i128(v: i128) -> Self {
                Self(v as $word)
            }

            fn as_i128(self) -> i128 {
                self.0 as $signed as i128
            }

            fn shift_right(self, shift: u32) -> Self {
                if shift >= Self::BITS {
                    Self(0)
                } else {
                    Self(self.0 >> shift)
                }
            }

            fn low_bits(self, n: u32) -> Self {
                if n >= Self::BITS {
                    self
                } else {
                    Self(self.0 & (((1 as $word) << n) - 1))
                }
            }
        }
    };
}

ring_scalar!(Z128, u128, i128);
ring_scalar!(Z64, u64, i64);
ring_scalar!(Z32, u32, i32);

impl ShareRing for Z64 {
    type Storage = Z128;
}

// exported deltas keep 32 bits of MAC headroom
impl ShareRing for Z32 {
    type Storage = Z64;
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::thread_rng;

    #[test]
    fn test_wraparound() {
        assert_eq!(Z64(u64::MAX) + Z64::ONE, Z64::ZERO);
        assert_eq!(Z32::ZERO - Z32::ONE, Z32(u32::MAX));
        assert_eq!(-Z64::ONE, Z64(u64::MAX));
        assert_eq!(Z32(1 << 31) * Z32(2), Z32::ZERO);
    }

    #[test]
    fn test_signed_interpretation() {
        assert_eq!(Z64::from_i128(-5).as_i128(), -5);
        assert_eq!(Z32::from_i128(-5).as_i128(), -5);
        assert_eq!(Z32::from_i128(1 << 32), Z32::ZERO);
        assert_eq!(Z32(u32::MAX).as_i128(), -1);
        assert_eq!(Z64(1 << 63).as_i128(), -(1i128 << 63));
    }

    #[test]
    fn test_bits() {
        let x = Z64(0b1011_0110);
        assert_eq!(x.shift_right(4), Z64(0b1011));
        assert_eq!(x.shift_right(64), Z64::ZERO);
        assert_eq!(x.low_bits(4), Z64(0b0110));
        assert_eq!(x.low_bits(64), x);
        assert!(x.bit(1));
        assert!(!x.bit(0));
        assert_eq!(Z32::pow2(31), Z32(1 << 31));
        assert_eq!(Z32::pow2(32), Z32::ZERO);
    }

    #[test]
    fn test_storage_ring() {
        assert_eq!(Z128::pow2(64), Z128(1 << 64));
        assert_eq!(Z128::pow2(128), Z128::ZERO);
        assert_eq!(Z128::from_i128(-1).as_i128(), -1);

        let x = Z64::from_i128(-3);
        assert_eq!(x.lift(), Z128(u64::MAX as u128 - 2));
        assert_eq!(Z64::project(x.lift() + Z128(7 << 64)), x);
        assert_eq!(Z32::project(Z64((1 << 40) | 9)), Z32(9));
    }

    #[test]
    fn test_sample_bits() {
        let mut rng = thread_rng();
        for _ in 0..1000 {
            assert!(Z64::sample_bits(&mut rng, 20).0 < 1 << 20);
        }
    }
}
