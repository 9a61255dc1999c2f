use rand::RngCore;
use tracing::{debug, warn};

use crate::algebra::{RingElement, Samplable, ShareRing};
use crate::config::BoundConfig;
use crate::consts::CONTEXT_ORACLE_MAC_CHECK;
use crate::crypto::{self, Prg, HASH_SIZE};
use crate::error::Check;
use crate::oracle::RandomOracle;
use crate::transport::Transport;
use crate::{Error, Result};

/// MAC check over the values opened by a party.
///
/// Every opened value v (a storage element) is recorded with the party's MAC
/// share m_j of it. A check draws random coefficients rho from a random
/// oracle over the opened transcript and lets every party commit to and then
/// open
///
///   sigma_j = sum_k rho_k * (m_{j,k} - alpha_j * v_k)
///
/// in the storage ring Z / 2^(W+S) Z. The sum of the sigma_j is zero if every
/// opened value is correct; an error of 2^i in an opened value (i < W) moves
/// it by a multiple of alpha * 2^i, which is unpredictable in its top W+S-i
/// bits. The signed magnitude of the sum, saturated to 64 bits, is the
/// discrepancy of the check: it is held against the per-operation bound right
/// away and accumulated for the batch bound.
pub struct IntegrityChecker<R: ShareRing> {
    rogue_bound: u64,
    gforce_bound: u64,
    opened: Vec<R::Storage>,
    macs: Vec<R::Storage>,
    accumulated: u64,
    checks: u64,
    salts: Prg,
}

impl<R: ShareRing> IntegrityChecker<R> {
    pub fn new(config: &BoundConfig) -> Self {
        IntegrityChecker {
            rogue_bound: config.rogue_bound,
            gforce_bound: config.gforce_bound,
            opened: Vec::new(),
            macs: Vec::new(),
            accumulated: 0,
            checks: 0,
            salts: Prg::from_entropy(),
        }
    }

    pub fn record<I>(&mut self, opened: &[R::Storage], macs: I)
    where
        I: IntoIterator<Item = R::Storage>,
    {
        self.opened.extend_from_slice(opened);
        self.macs.extend(macs);
        debug_assert_eq!(self.opened.len(), self.macs.len());
    }

    /// Opened values not yet covered by a check.
    pub fn pending(&self) -> usize {
        self.opened.len()
    }

    /// Discrepancy accumulated since the last batch boundary.
    pub fn accumulated(&self) -> u64 {
        self.accumulated
    }

    /// Number of checks run so far.
    pub fn checks(&self) -> u64 {
        self.checks
    }

    // sigma_j over the pending records, which are consumed
    fn local_check_value(&mut self, key_share: R::Storage) -> Result<R::Storage> {
        let mut oracle = RandomOracle::new(
            CONTEXT_ORACLE_MAC_CHECK,
            Some(&self.checks.to_le_bytes()[..]),
        );
        oracle.feed(&bincode::serialize(&self.opened)?);
        let mut rho = oracle.query();

        let sigma = self
            .opened
            .iter()
            .zip(self.macs.iter())
            .fold(R::Storage::ZERO, |sigma, (v, m)| {
                sigma + R::Storage::gen(&mut rho) * (*m - key_share * *v)
            });

        self.opened.clear();
        self.macs.clear();
        self.checks += 1;
        Ok(sigma)
    }

    /// Run a check over every value opened since the previous one.
    ///
    /// Takes two broadcast rounds (commit, then open) unless nothing is pending.
    pub fn verify<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        key_share: R::Storage,
    ) -> Result<()> {
        if self.opened.is_empty() {
            return Ok(());
        }
        let pending = self.opened.len();
        let sigma = self.local_check_value(key_share)?;

        let mut salt = [0u8; HASH_SIZE];
        self.salts.fill_bytes(&mut salt);
        let commitment = crypto::commit(&bincode::serialize(&sigma)?, &salt);

        let commitments = transport.broadcast(commitment.as_bytes().to_vec())?;
        let openings = transport.broadcast(bincode::serialize(&(sigma, salt))?)?;

        let mut total = R::Storage::ZERO;
        for (party, (commitment, opening)) in commitments.iter().zip(openings).enumerate() {
            let (sigma, salt): (R::Storage, [u8; HASH_SIZE]) =
                bincode::deserialize(&opening).map_err(|e| {
                    Error::Transport(format!("malformed opening from party {}: {}", party, e))
                })?;
            let expected = crypto::commit(&bincode::serialize(&sigma)?, &salt);
            if expected.as_bytes()[..] != commitment[..] {
                warn!("party {} did not open its commitment", party);
                return Err(Error::MaliciousDeviationDetected {
                    check: Check::Commitment,
                    discrepancy: 0,
                    bound: 0,
                });
            }
            total = total + sigma;
        }

        let discrepancy = u64::try_from(total.as_i128().unsigned_abs()).unwrap_or(u64::MAX);
        debug!(
            "check {} over {} values: discrepancy {}",
            self.checks, pending, discrepancy
        );
        if discrepancy > self.rogue_bound {
            warn!(
                "discrepancy {} exceeds per-operation bound {}",
                discrepancy, self.rogue_bound
            );
            return Err(Error::MaliciousDeviationDetected {
                check: Check::PerOperation,
                discrepancy,
                bound: self.rogue_bound,
            });
        }
        self.accumulated = self.accumulated.saturating_add(discrepancy);
        Ok(())
    }

    /// Close a mini-batch: hold the accumulated discrepancy against the batch bound.
    pub fn end_batch(&mut self) -> Result<()> {
        let accumulated = std::mem::take(&mut self.accumulated);
        if accumulated > self.gforce_bound {
            warn!(
                "accumulated discrepancy {} exceeds batch bound {}",
                accumulated, self.gforce_bound
            );
            return Err(Error::MaliciousDeviationDetected {
                check: Check::Accumulated,
                discrepancy: accumulated,
                bound: self.gforce_bound,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::{RingElement, Z128, Z64};
    use crate::preprocessing::Dealer;
    use crate::sharing::TensorId;
    use crate::transport::LocalNetwork;

    use std::thread;

    // every party opens the shared tensor, with the first element off by
    // `error`, and runs one check; party 0 adds `mac_error` to its first MAC share
    fn run_with(
        config: BoundConfig,
        error: Z128,
        mac_error: Z128,
    ) -> Vec<(Result<()>, Result<()>)> {
        let mut dealer: Dealer<Z64> = Dealer::new(&config, 3, b"integrity").unwrap();
        let values = [Z64(3), Z64(1 << 40), Z64::from_i128(-9)];
        let tensor = dealer
            .share_tensor(TensorId(0), vec![3], &values[..])
            .unwrap();
        let handles: Vec<_> = LocalNetwork::new(3)
            .into_iter()
            .map(|mut transport| {
                let part = tensor.part(transport.party()).clone();
                let key = dealer.key_share(transport.party());
                let config = config.clone();
                thread::spawn(move || {
                    let mut checker: IntegrityChecker<Z64> = IntegrityChecker::new(&config);
                    let mut opened: Vec<Z128> = values.iter().map(|v| v.lift()).collect();
                    opened[0] = opened[0] + error;
                    let mut macs = part.macs().to_vec();
                    if transport.party() == 0 {
                        macs[0] = macs[0] + mac_error;
                    }
                    checker.record(&opened, macs);
                    let checked = checker.verify(&mut transport, key);
                    (checked, checker.end_batch())
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    }

    fn run(config: BoundConfig, error: u64) -> Vec<(Result<()>, Result<()>)> {
        run_with(config, Z128(error as u128), Z128::ZERO)
    }

    #[test]
    fn test_honest_opening_passes() {
        let config = BoundConfig {
            rogue_bound: 0,
            gforce_bound: 0,
            ..Default::default()
        };
        for (checked, batch) in run(config, 0) {
            checked.unwrap();
            batch.unwrap();
        }
    }

    #[test]
    fn test_wrong_opening_fails_everywhere() {
        for (checked, _) in run(BoundConfig::default(), 1) {
            assert!(matches!(
                checked,
                Err(Error::MaliciousDeviationDetected {
                    check: Check::PerOperation,
                    ..
                })
            ));
        }
    }

    #[test]
    fn test_wrong_opening_accumulates() {
        let config = BoundConfig {
            rogue_bound: u64::MAX,
            gforce_bound: 1,
            ..Default::default()
        };
        for (checked, batch) in run(config, 1) {
            checked.unwrap();
            assert!(matches!(
                batch,
                Err(Error::MaliciousDeviationDetected {
                    check: Check::Accumulated,
                    ..
                })
            ));
        }
    }

    #[test]
    fn test_top_bit_shift_with_matching_mac_fails() {
        // 2^63 added to the opened value and to one MAC share
        let config = BoundConfig {
            rogue_bound: 0,
            gforce_bound: 0,
            ..Default::default()
        };
        let shift = Z128(1 << 63);
        for (checked, _) in run_with(config, shift, shift) {
            assert!(matches!(
                checked,
                Err(Error::MaliciousDeviationDetected {
                    check: Check::PerOperation,
                    bound: 0,
                    ..
                })
            ));
        }
    }

    #[test]
    fn test_shift_above_value_bits_is_caught() {
        let shift = Z128(1 << 64);
        for (checked, _) in run_with(BoundConfig::default(), shift, Z128::ZERO) {
            assert!(checked.is_err());
        }
    }

    #[test]
    fn test_nothing_pending_is_free() {
        let mut network = LocalNetwork::new(2);
        let mut checker: IntegrityChecker<Z64> =
            IntegrityChecker::new(&BoundConfig::default());
        checker.verify(&mut network[0], Z128(1)).unwrap();
        assert_eq!(network[0].rounds(), 0);
        assert_eq!(checker.checks(), 0);
    }
}
