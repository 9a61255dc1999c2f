use super::*;

use tracing::debug;

use crate::algebra::{RingElement, Samplable};
use crate::codec::FixedPoint;
use crate::config::BoundConfig;
use crate::consts::{CONTEXT_RNG_DEALER, CONTEXT_RNG_MAC_KEY};
use crate::crypto::{kdf, Prg};
use crate::sharing::{split, PartyTensor, SharedTensor, TensorId};

/// Trusted dealer for the offline phase.
///
/// Holds the global MAC key alpha, uniform over the storage ring, and samples
/// every correlated item from a single PRG keyed by the dealer seed: two
/// dealers with the same seed, party count and configuration produce
/// identical items in the same order.
///
/// Every mask that is opened with a value on top (truncation, comparison)
/// is uniform above bit W, so openings leak nothing about the storage bits
/// of the value.
pub struct Dealer<R: ShareRing> {
    parties: usize,
    comparison_bits: u32,
    prg: Prg,
    key: R::Storage,
    key_shares: Vec<R::Storage>,
    serial: u64,
}

impl<R: ShareRing> Dealer<R> {
    pub fn new(config: &BoundConfig, parties: usize, seed: &[u8]) -> Result<Self> {
        config.validate_for::<R>()?;
        if parties < 2 {
            return Err(Error::Configuration(format!(
                "secret sharing needs at least 2 parties, got {}",
                parties
            )));
        }

        let mut key_prg = Prg::new(&kdf(CONTEXT_RNG_MAC_KEY, seed));
        let key = R::Storage::gen(&mut key_prg);

        let mut prg = Prg::new(&kdf(CONTEXT_RNG_DEALER, seed));
        let key_shares = split(key, parties, &mut prg);

        Ok(Dealer {
            parties,
            comparison_bits: config.comparison_bits(),
            prg,
            key,
            key_shares,
            serial: 0,
        })
    }

    pub fn parties(&self) -> usize {
        self.parties
    }

    /// The global MAC key: only for harnesses that inspect shared tensors.
    pub fn mac_key(&self) -> R::Storage {
        self.key
    }

    pub fn key_share(&self, party: usize) -> R::Storage {
        self.key_shares[party]
    }

    /// Number of items generated so far.
    pub fn served(&self) -> u64 {
        self.serial
    }

    // authenticated sharing of a storage element
    fn deal(&mut self, value: R::Storage) -> Vec<Auth<R>> {
        let values = split(value, self.parties, &mut self.prg);
        let macs = split(self.key * value, self.parties, &mut self.prg);
        values
            .into_iter()
            .zip(macs)
            .map(|(value, mac)| Auth { value, mac })
            .collect()
    }

    // low + 2^W t for a uniform t
    fn mask(&mut self, low: R) -> R::Storage {
        let top = R::Storage::gen(&mut self.prg);
        top - top.low_bits(R::BITS) + low.lift()
    }

    fn next_serial(&mut self) -> u64 {
        let serial = self.serial;
        self.serial += 1;
        serial
    }

    /// Generate one item of the given kind, returned as one share per party.
    pub fn generate(&mut self, kind: RandomnessKind) -> Result<Vec<Randomness<R>>> {
        let serial = self.next_serial();
        let parties = self.parties;
        let items = match kind {
            RandomnessKind::Triple => {
                let a = R::Storage::gen(&mut self.prg);
                let b = R::Storage::gen(&mut self.prg);
                let c = self.deal(a * b);
                let a = self.deal(a);
                let b = self.deal(b);
                (0..parties)
                    .map(|p| {
                        Randomness::Triple(TripleShare {
                            serial,
                            a: a[p],
                            b: b[p],
                            c: c[p],
                        })
                    })
                    .collect()
            }
            RandomnessKind::Truncation { shift } => {
                if shift == 0 || shift >= R::BITS - 2 {
                    return Err(Error::Configuration(format!(
                        "truncation by {} bits out of range",
                        shift
                    )));
                }
                let low = R::sample_bits(&mut self.prg, R::BITS - 2);
                let r = self.mask(low);
                let r_shares = self.deal(r);
                let hi = self.deal(low.shift_right(shift).lift());
                (0..parties)
                    .map(|p| {
                        Randomness::Truncation(TruncationShare {
                            serial,
                            shift,
                            r: r_shares[p],
                            r_hi: hi[p],
                        })
                    })
                    .collect()
            }
            RandomnessKind::Comparison => {
                let m = self.comparison_bits;
                let low = R::sample_bits(&mut self.prg, R::BITS - 1);
                let r = self.mask(low);
                let r_shares = self.deal(r);
                let hi = self.deal(low.shift_right(m).lift());
                let bits: Vec<Vec<Auth<R>>> = (0..m)
                    .map(|i| {
                        let bit = if low.bit(i) { R::ONE } else { R::ZERO };
                        self.deal(bit.lift())
                    })
                    .collect();
                (0..parties)
                    .map(|p| {
                        Randomness::Comparison(ComparisonShare {
                            serial,
                            r: r_shares[p],
                            r_hi: hi[p],
                            bits: bits.iter().map(|b| b[p]).collect(),
                        })
                    })
                    .collect()
            }
            RandomnessKind::InputMask { owner } => {
                if owner >= parties {
                    return Err(Error::Configuration(format!(
                        "input owner {} is not one of {} parties",
                        owner, parties
                    )));
                }
                let r = R::Storage::gen(&mut self.prg);
                let r_shares = self.deal(r);
                (0..parties)
                    .map(|p| {
                        Randomness::InputMask(InputMaskShare {
                            serial,
                            owner,
                            r: r_shares[p],
                            clear: if p == owner { Some(r) } else { None },
                        })
                    })
                    .collect()
            }
            RandomnessKind::RevealMask => {
                let r = R::Storage::gen(&mut self.prg);
                self.deal(r)
                    .into_iter()
                    .map(|r| Randomness::RevealMask(RevealMaskShare { serial, r }))
                    .collect()
            }
        };
        Ok(items)
    }

    /// Authenticated sharing of a plaintext tensor (the inputs of a computation).
    pub fn share_tensor(
        &mut self,
        id: TensorId,
        shape: Vec<usize>,
        values: &[R],
    ) -> Result<SharedTensor<R>> {
        let mut vs = vec![Vec::with_capacity(values.len()); self.parties];
        let mut ms = vec![Vec::with_capacity(values.len()); self.parties];
        for v in values {
            for (p, share) in self.deal(v.lift()).into_iter().enumerate() {
                vs[p].push(share.value);
                ms[p].push(share.mac);
            }
        }
        let parts = vs
            .into_iter()
            .zip(ms)
            .enumerate()
            .map(|(p, (v, m))| PartyTensor::new(id, p, shape.clone(), v, m))
            .collect::<Result<Vec<_>>>()?;
        SharedTensor::new(parts)
    }

    /// Encode real values and share them.
    pub fn share_reals(
        &mut self,
        codec: &FixedPoint,
        id: TensorId,
        shape: Vec<usize>,
        reals: &[f64],
    ) -> Result<SharedTensor<R>> {
        let values: Vec<R> = codec.encode_slice(reals);
        self.share_tensor(id, shape, &values[..])
    }

    /// Generate everything in `demand` ahead of time: one pool per party.
    pub fn preload(&mut self, demand: &Demand) -> Result<Vec<Pool<R>>> {
        let mut pools: Vec<Pool<R>> = (0..self.parties)
            .map(|p| Pool::new(p, self.key_shares[p]))
            .collect();
        for (kind, count) in demand.iter() {
            debug!("preloading {} x {}", count, kind);
            for _ in 0..count {
                for (pool, item) in pools.iter_mut().zip(self.generate(kind)?) {
                    pool.push(item);
                }
            }
        }
        Ok(pools)
    }

    /// Turn the dealer into one on-demand source per party.
    pub fn into_online(self) -> Vec<OnDemandSource<R>> {
        OnDemandSource::from_dealer(self)
    }

    /// One source per party in the mode selected by the configuration.
    pub fn into_sources(mut self, config: &BoundConfig, demand: &Demand) -> Result<Vec<Source<R>>> {
        if config.enable_offline_randomness {
            Ok(self
                .preload(demand)?
                .into_iter()
                .map(|pool| Source::Preloaded(PreloadedSource::new(pool)))
                .collect())
        } else {
            Ok(self.into_online().into_iter().map(Source::OnDemand).collect())
        }
    }
}
