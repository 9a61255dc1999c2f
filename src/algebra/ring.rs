use std::fmt::Debug;
use std::ops::{Add, Mul, Neg, Sub};

use num_traits::Zero;
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Represents the ring Z / 2^BITS Z.
///
/// All arithmetic wraps: overflow is the ring reduction, not an error.
/// Elements double as fixed-point numbers through their two's complement
/// (signed) interpretation.
pub trait RingElement:
    Copy
    + Send
    + Sync
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Neg<Output = Self>
    + Eq
    + Debug
    + Zero
    + Samplable
    + Serialize
    + DeserializeOwned
    + 'static
{
    // multiplicative identity
    const ONE: Self;

    // additive identity
    const ZERO: Self;

    // width W of the ring
    const BITS: u32;

    /// Reduce a 64-bit word into the ring.
    fn from_u64(v: u64) -> Self;

    fn as_u64(self) -> u64;

    /// Reduce a 128-bit word into the ring.
    fn from_u128(v: u128) -> Self;

    fn as_u128(self) -> u128;

    /// Reduce a signed integer into the ring (two's complement).
    fn from_i128(v: i128) -> Self;

    /// Signed interpretation of the element, in [-2^(W-1), 2^(W-1)).
    fn as_i128(self) -> i128;

    /// Logical right shift; shifting by W or more yields zero.
    fn shift_right(self, shift: u32) -> Self;

    /// The `n` least significant bits of the element.
    fn low_bits(self, n: u32) -> Self;

    fn bit(self, i: u32) -> bool {
        self.shift_right(i).as_u64() & 1 == 1
    }

    /// 2^exp reduced into the ring.
    fn pow2(exp: u32) -> Self {
        if exp >= Self::BITS {
            Self::ZERO
        } else {
            Self::from_u128(1u128 << exp)
        }
    }

    /// Uniform element of [0, 2^bits).
    fn sample_bits<R: RngCore>(rng: &mut R, bits: u32) -> Self {
        Self::gen(rng).low_bits(bits)
    }
}

/// A ring Z / 2^W Z whose shares are held and authenticated in the wider
/// storage ring Z / 2^(W+S) Z.
///
/// Value shares, MAC shares and the MAC key all live in the storage ring;
/// only the W low bits of a shared value are meaningful. A MAC check over the
/// storage ring catches an error in those bits unless the cheater guesses
/// about S bits of the key.
pub trait ShareRing: RingElement {
    type Storage: RingElement;

    /// The representative of `self` in [0, 2^W), as a storage element.
    fn lift(self) -> Self::Storage {
        Self::Storage::from_u128(self.as_u128())
    }

    /// Reduce a storage element modulo 2^W.
    fn project(x: Self::Storage) -> Self {
        Self::from_u128(x.as_u128())
    }
}

pub trait Samplable {
    fn gen<R: RngCore>(rng: &mut R) -> Self;
}
