//! Correlated randomness: the offline phase.
//!
//! The [`Dealer`] samples every correlated item (Beaver triples, truncation
//! pairs, comparison masks, input masks, reveal masks) and splits it into
//! authenticated per-party shares. Parties consume their shares through the
//! [`RandomnessSource`] trait, which hides whether the items are generated on
//! demand or drawn from a pool filled before the online phase.
//!
//! Items are handed out by value and none of the share types implement
//! `Clone`: once consumed, an item is gone.

mod dealer;
mod demand;
mod ondemand;
mod pool;

pub use dealer::Dealer;
pub use demand::Demand;
pub use ondemand::OnDemandSource;
pub use pool::{Pool, PreloadedSource};

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::algebra::ShareRing;
pub use crate::sharing::Auth;
use crate::{Error, Result};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RandomnessKind {
    /// Beaver triple (a, b, a * b)
    Triple,
    /// r = r0 + 2^W t with r0 < 2^(W-2), together with r0 >> shift
    Truncation { shift: u32 },
    /// r = r0 + 2^W t with r0 < 2^(W-1), r0 >> m and the m low bits of r0
    /// (m = PC_BITS - 1)
    Comparison,
    /// random r, revealed to the owner
    InputMask { owner: usize },
    /// random r; 2^W r hides the storage bits of a revealed value
    RevealMask,
}

impl fmt::Display for RandomnessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RandomnessKind::Triple => f.write_str("beaver triple"),
            RandomnessKind::Truncation { shift } => write!(f, "truncation pair (shift {})", shift),
            RandomnessKind::Comparison => f.write_str("comparison mask"),
            RandomnessKind::InputMask { owner } => write!(f, "input mask (owner {})", owner),
            RandomnessKind::RevealMask => f.write_str("reveal mask"),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct TripleShare<R: ShareRing> {
    pub serial: u64,
    pub a: Auth<R>,
    pub b: Auth<R>,
    pub c: Auth<R>,
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct TruncationShare<R: ShareRing> {
    pub serial: u64,
    pub shift: u32,
    pub r: Auth<R>,
    pub r_hi: Auth<R>,
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct ComparisonShare<R: ShareRing> {
    pub serial: u64,
    pub r: Auth<R>,
    pub r_hi: Auth<R>,
    // least significant bit first
    pub bits: Vec<Auth<R>>,
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct InputMaskShare<R: ShareRing> {
    pub serial: u64,
    pub owner: usize,
    pub r: Auth<R>,
    // the mask in the clear (owner only)
    pub clear: Option<R::Storage>,
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct RevealMaskShare<R: ShareRing> {
    pub serial: u64,
    pub r: Auth<R>,
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub enum Randomness<R: ShareRing> {
    Triple(TripleShare<R>),
    Truncation(TruncationShare<R>),
    Comparison(ComparisonShare<R>),
    InputMask(InputMaskShare<R>),
    RevealMask(RevealMaskShare<R>),
}

impl<R: ShareRing> Randomness<R> {
    pub fn kind(&self) -> RandomnessKind {
        match self {
            Randomness::Triple(_) => RandomnessKind::Triple,
            Randomness::Truncation(t) => RandomnessKind::Truncation { shift: t.shift },
            Randomness::Comparison(_) => RandomnessKind::Comparison,
            Randomness::InputMask(m) => RandomnessKind::InputMask { owner: m.owner },
            Randomness::RevealMask(_) => RandomnessKind::RevealMask,
        }
    }

    pub fn serial(&self) -> u64 {
        match self {
            Randomness::Triple(t) => t.serial,
            Randomness::Truncation(t) => t.serial,
            Randomness::Comparison(c) => c.serial,
            Randomness::InputMask(m) => m.serial,
            Randomness::RevealMask(m) => m.serial,
        }
    }
}

/// Per-party supply of correlated randomness.
///
/// Implementations must serve items of each kind in the same order to every
/// party and must never serve an item twice.
pub trait RandomnessSource<R: ShareRing> {
    fn party(&self) -> usize;

    /// This party's share of the global MAC key.
    fn key_share(&self) -> R::Storage;

    fn next(&mut self, kind: RandomnessKind) -> Result<Randomness<R>>;

    fn next_triple(&mut self) -> Result<TripleShare<R>> {
        let kind = RandomnessKind::Triple;
        match self.next(kind)? {
            Randomness::Triple(t) => Ok(t),
            _ => Err(Error::UnexpectedRandomness { expected: kind }),
        }
    }

    fn next_truncation(&mut self, shift: u32) -> Result<TruncationShare<R>> {
        let kind = RandomnessKind::Truncation { shift };
        match self.next(kind)? {
            Randomness::Truncation(t) if t.shift == shift => Ok(t),
            _ => Err(Error::UnexpectedRandomness { expected: kind }),
        }
    }

    fn next_comparison(&mut self) -> Result<ComparisonShare<R>> {
        let kind = RandomnessKind::Comparison;
        match self.next(kind)? {
            Randomness::Comparison(c) => Ok(c),
            _ => Err(Error::UnexpectedRandomness { expected: kind }),
        }
    }

    fn next_input_mask(&mut self, owner: usize) -> Result<InputMaskShare<R>> {
        let kind = RandomnessKind::InputMask { owner };
        match self.next(kind)? {
            Randomness::InputMask(m) if m.owner == owner => Ok(m),
            _ => Err(Error::UnexpectedRandomness { expected: kind }),
        }
    }

    fn next_reveal_mask(&mut self) -> Result<RevealMaskShare<R>> {
        let kind = RandomnessKind::RevealMask;
        match self.next(kind)? {
            Randomness::RevealMask(m) => Ok(m),
            _ => Err(Error::UnexpectedRandomness { expected: kind }),
        }
    }
}

/// The configured randomness mode of a party.
pub enum Source<R: ShareRing> {
    OnDemand(OnDemandSource<R>),
    Preloaded(PreloadedSource<R>),
}

impl<R: ShareRing> RandomnessSource<R> for Source<R> {
    fn party(&self) -> usize {
        match self {
            Source::OnDemand(s) => s.party(),
            Source::Preloaded(s) => s.party(),
        }
    }

    fn key_share(&self) -> R::Storage {
        match self {
            Source::OnDemand(s) => s.key_share(),
            Source::Preloaded(s) => s.key_share(),
        }
    }

    fn next(&mut self, kind: RandomnessKind) -> Result<Randomness<R>> {
        match self {
            Source::OnDemand(s) => s.next(kind),
            Source::Preloaded(s) => s.next(kind),
        }
    }
}
