//! Additive secret sharing over Z / 2^W Z.
//!
//! A value x is split into N shares x_0, ..., x_{N-1} with x = sum x_i (mod 2^W):
//! N - 1 shares are uniformly random and the last one is the residual.
//! Any N - 1 shares are uniformly distributed and independent of x.
//!
//! Authenticated shares ([`Auth`], [`PartyTensor`]) of a value in Z / 2^W Z
//! are held in the wider storage ring of [`ShareRing`]; their low W bits are
//! plain additive shares of the value.

mod tensor;

pub use tensor::{reconstruct_tensor, PartyTensor, SharedTensor};

use std::ops::{Add, Neg, Sub};

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::algebra::{RingElement, ShareRing};
use crate::{Error, Result};

/// Logical identifier of a (shared) tensor.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TensorId(pub u64);

/// Logical identifier of a single shared value: an element of a tensor.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueId {
    pub tensor: TensorId,
    pub element: usize,
}

/// One party's share of a logical value.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share<R> {
    pub id: ValueId,
    pub party: usize,
    pub value: R,
}

/// A party's share of a value together with its share of the MAC.
///
/// Both components live in the storage ring of `R`. Linear operations act on
/// both of them; the MAC relation sum(mac) = alpha * sum(value) is preserved
/// by all of them.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Auth<R: ShareRing> {
    pub value: R::Storage,
    pub mac: R::Storage,
}

impl<R: ShareRing> Auth<R> {
    pub const ZERO: Self = Auth {
        value: <R::Storage as RingElement>::ZERO,
        mac: <R::Storage as RingElement>::ZERO,
    };

    /// Share of the public storage element c: party 0 holds c, every party
    /// authenticates it with its key share.
    pub fn public(c: R::Storage, party: usize, key_share: R::Storage) -> Self {
        Auth {
            value: if party == 0 {
                c
            } else {
                <R::Storage as RingElement>::ZERO
            },
            mac: key_share * c,
        }
    }

    /// Share of the public constant c.
    pub fn constant(c: R, party: usize, key_share: R::Storage) -> Self {
        Self::public(c.lift(), party, key_share)
    }

    pub fn scale(self, c: R::Storage) -> Self {
        Auth {
            value: self.value * c,
            mac: self.mac * c,
        }
    }
}

impl<R: ShareRing> Add for Auth<R> {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Auth {
            value: self.value + other.value,
            mac: self.mac + other.mac,
        }
    }
}

impl<R: ShareRing> Sub for Auth<R> {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Auth {
            value: self.value - other.value,
            mac: self.mac - other.mac,
        }
    }
}

impl<R: ShareRing> Neg for Auth<R> {
    type Output = Self;

    fn neg(self) -> Self {
        Auth {
            value: -self.value,
            mac: -self.mac,
        }
    }
}

/// Split a ring element into `parties` additive shares.
pub fn split<R: RingElement, G: RngCore>(value: R, parties: usize, rng: &mut G) -> Vec<R> {
    debug_assert!(parties > 0);
    let mut shares: Vec<R> = Vec::with_capacity(parties);
    let mut residual = value;
    for _ in 1..parties {
        let s = R::gen(rng);
        residual = residual - s;
        shares.push(s);
    }
    shares.push(residual);
    shares
}

/// Split `value` into one tagged share per party.
pub fn share<R: RingElement, G: RngCore>(
    id: ValueId,
    value: R,
    parties: usize,
    rng: &mut G,
) -> Result<Vec<Share<R>>> {
    if parties < 2 {
        return Err(Error::Configuration(format!(
            "secret sharing needs at least 2 parties, got {}",
            parties
        )));
    }
    Ok(split(value, parties, rng)
        .into_iter()
        .enumerate()
        .map(|(party, value)| Share { id, party, value })
        .collect())
}

/// Recombine the shares of a single value.
///
/// Requires exactly one share of the same value from each of the `parties` parties.
pub fn reconstruct<R: RingElement>(shares: &[Share<R>], parties: usize) -> Result<R> {
    if shares.len() < parties {
        return Err(Error::IncompleteShareSet {
            expected: parties,
            got: shares.len(),
        });
    }

    let mut seen = vec![false; parties];
    let mut value = R::ZERO;
    for share in shares {
        if share.party >= parties || seen[share.party] || share.id != shares[0].id {
            continue;
        }
        seen[share.party] = true;
        value = value + share.value;
    }

    let got = seen.iter().filter(|s| **s).count();
    if got < parties || shares.len() != parties {
        return Err(Error::IncompleteShareSet {
            expected: parties,
            got,
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::{Z32, Z64};

    use rand::{thread_rng, Rng};

    fn id(element: usize) -> ValueId {
        ValueId {
            tensor: TensorId(1),
            element,
        }
    }

    #[test]
    fn test_share_reconstruct() {
        let mut rng = thread_rng();
        for parties in 2..8 {
            for i in 0..100 {
                let x = Z64(rng.gen());
                let shares = share(id(i), x, parties, &mut rng).unwrap();
                assert_eq!(shares.len(), parties);
                assert_eq!(reconstruct(&shares, parties).unwrap(), x);
            }
        }
    }

    #[test]
    fn test_share_wraps() {
        let mut rng = thread_rng();
        let x = Z32(u32::MAX);
        let shares = share(id(0), x, 3, &mut rng).unwrap();
        assert_eq!(reconstruct(&shares, 3).unwrap(), x);
    }

    #[test]
    fn test_missing_share() {
        let mut rng = thread_rng();
        let shares = share(id(0), Z64(42), 3, &mut rng).unwrap();
        match reconstruct(&shares[..2], 3) {
            Err(Error::IncompleteShareSet { expected, got }) => {
                assert_eq!(expected, 3);
                assert_eq!(got, 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_party_is_incomplete() {
        let mut rng = thread_rng();
        let shares = share(id(0), Z64(42), 3, &mut rng).unwrap();
        let forged = vec![shares[0], shares[1], shares[1]];
        assert!(matches!(
            reconstruct(&forged, 3),
            Err(Error::IncompleteShareSet { got: 2, .. })
        ));
    }

    #[test]
    fn test_mixed_values_are_incomplete() {
        let mut rng = thread_rng();
        let a = share(id(0), Z64(1), 2, &mut rng).unwrap();
        let b = share(id(1), Z64(2), 2, &mut rng).unwrap();
        assert!(reconstruct(&[a[0], b[1]], 2).is_err());
    }

    #[test]
    fn test_proper_subset_looks_random() {
        // the first share of a fixed value is uniform: its two low bits
        // should hit every residue class with roughly equal frequency
        let mut rng = thread_rng();
        let mut counts = [0usize; 4];
        for i in 0..4000 {
            let shares = share(id(i), Z64(7), 3, &mut rng).unwrap();
            counts[(shares[0].value.0 & 3) as usize] += 1;
            let partial: Z64 = shares[..2].iter().map(|s| s.value).sum();
            assert_ne!(partial, Z64(7));
        }
        for count in counts.iter() {
            assert!(*count > 800 && *count < 1200, "{:?}", counts);
        }
    }

    #[test]
    fn test_single_party_rejected() {
        let mut rng = thread_rng();
        assert!(matches!(
            share(id(0), Z64(1), 1, &mut rng),
            Err(Error::Configuration(_))
        ));
    }
}
