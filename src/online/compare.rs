use super::*;

impl<R, S, T> ProtocolEngine<R, S, T>
where
    R: ShareRing,
    S: RandomnessSource<R>,
    T: Transport,
{
    /// Shared bits [x >= 0] for |x| < 2^m with m = PC_BITS - 1, unverified.
    ///
    /// With y = x + 2^m in [0, 2^(m+1)) and a comparison mask whose low part
    /// r is below 2^(W-1), the low W bits c of the opening are y + r without
    /// wrapping and
    ///
    ///   [x >= 0] = floor(y / 2^m) = floor(c / 2^m) - floor(r / 2^m) - [r_low > c_low]
    ///
    /// where the low parts are modulo 2^m. The borrow [r_low > c_low] compares
    /// the shared bits of r against the public bits of c: a prefix-OR of
    /// r_i xor c_i from the most significant bit finds the first differing
    /// bit, and the borrow is r at that position.
    pub(super) fn compare_lanes(&mut self, x: &[Auth<R>]) -> Result<Vec<Auth<R>>> {
        let m = self.config.comparison_bits() as usize;
        let n = x.len();
        let masks = (0..n)
            .map(|_| self.source.next_comparison())
            .collect::<Result<Vec<_>>>()?;
        if masks.iter().any(|mask| mask.bits.len() != m) {
            return Err(Error::UnexpectedRandomness {
                expected: RandomnessKind::Comparison,
            });
        }

        let offset = self.constant(R::pow2(m as u32));
        let masked: Vec<Auth<R>> = x
            .iter()
            .zip(masks.iter())
            .map(|(x, mask)| *x + offset + mask.r)
            .collect();
        let opened: Vec<R> = self.open(&masked)?.into_iter().map(R::project).collect();

        // lanes indexed [bit][element]
        let one = self.constant(R::ONE);
        let r_bits: Vec<Vec<Auth<R>>> = (0..m)
            .map(|i| masks.iter().map(|mask| mask.bits[i]).collect())
            .collect();
        let differs: Vec<Vec<Auth<R>>> = (0..m)
            .map(|i| {
                opened
                    .iter()
                    .zip(r_bits[i].iter())
                    .map(|(c, r)| if c.bit(i as u32) { one - *r } else { *r })
                    .collect()
            })
            .collect();

        // prefix[i] = OR of differs[i..m]: one round per bit
        let top = m - 1;
        let mut prefix: Vec<Vec<Auth<R>>> = vec![Vec::new(); m];
        prefix[top] = differs[top].clone();
        for i in (0..top).rev() {
            let both = self.beaver(&prefix[i + 1], &differs[i])?;
            prefix[i] = prefix[i + 1]
                .iter()
                .zip(differs[i].iter())
                .zip(both)
                .map(|((p, d), both)| *p + *d - both)
                .collect();
        }

        // one-hot first difference times r, all bits in a single round
        let mut first = Vec::with_capacity(m * n);
        let mut bits = Vec::with_capacity(m * n);
        for i in 0..m {
            for element in 0..n {
                let above = if i == top {
                    Auth::ZERO
                } else {
                    prefix[i + 1][element]
                };
                first.push(prefix[i][element] - above);
                bits.push(r_bits[i][element]);
            }
        }
        let terms = self.beaver(&first, &bits)?;
        let mut borrow = vec![Auth::ZERO; n];
        for (k, term) in terms.into_iter().enumerate() {
            borrow[k % n] = borrow[k % n] + term;
        }

        Ok(opened
            .iter()
            .zip(masks.iter())
            .zip(borrow)
            .map(|((c, mask), borrow)| {
                self.constant(c.shift_right(m as u32)) - mask.r_hi - borrow
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{engines, parallel, share};
    use super::*;
    use crate::algebra::{RingElement, Z64};

    #[test]
    fn test_compare() {
        let (mut dealer, engines) = engines(3);
        let a_values = [0.0, 1.0, -1.0, 0.001, -0.001, 100.0, -2047.0, 5.5, -3.25];
        let b_values = [0.0, 0.0, 0.0, 0.0, 0.0, 99.999, 0.0, 5.5, -3.0];
        let a = share(&mut dealer, 0, &a_values);
        let b = share(&mut dealer, 1, &b_values);
        let results = parallel(engines, move |engine| {
            let p = engine.party();
            let bits = engine.compare(a.part(p), b.part(p)).unwrap();
            engine.reveal(&bits).unwrap()
        });
        let codec = FixedPoint::new(12);
        let expected: Vec<Z64> = a_values
            .iter()
            .zip(b_values.iter())
            .map(|(a, b)| {
                // compare the encoded values, as the engine does
                let (a, b): (Z64, Z64) = (codec.encode(*a), codec.encode(*b));
                if a.as_i128() >= b.as_i128() {
                    Z64::ONE
                } else {
                    Z64::ZERO
                }
            })
            .collect();
        for revealed in results {
            assert_eq!(revealed, expected);
        }
    }

    #[test]
    fn test_compare_random() {
        use rand::{thread_rng, Rng};

        let mut rng = thread_rng();
        let (mut dealer, engines) = engines(2);
        let raw: Vec<i128> = (0..64)
            .map(|_| rng.gen_range(-(1i128 << 22)..(1i128 << 22)))
            .collect();
        let values: Vec<Z64> = raw.iter().map(|v| Z64::from_i128(*v)).collect();
        let zeros = vec![Z64::ZERO; values.len()];
        let a = dealer
            .share_tensor(TensorId(0), vec![values.len()], &values)
            .unwrap();
        let b = dealer
            .share_tensor(TensorId(1), vec![values.len()], &zeros)
            .unwrap();
        let results = parallel(engines, move |engine| {
            let p = engine.party();
            let bits = engine.compare(a.part(p), b.part(p)).unwrap();
            engine.reveal(&bits).unwrap()
        });
        for revealed in results {
            for (v, bit) in raw.iter().zip(revealed) {
                assert_eq!(bit, if *v >= 0 { Z64::ONE } else { Z64::ZERO }, "{}", v);
            }
        }
    }

    #[test]
    fn test_select_and_relu() {
        let (mut dealer, engines) = engines(3);
        let x = share(&mut dealer, 0, &[-2.5, 0.0, 3.75, -0.125]);
        let y = share(&mut dealer, 1, &[1.0, 1.0, 1.0, 1.0]);
        let results = parallel(engines, move |engine| {
            let p = engine.party();
            let (x, y) = (x.part(p), y.part(p));
            let relu = engine.relu(x).unwrap();
            let larger = engine.compare(x, y).unwrap();
            let max = engine.select(&larger, x, y).unwrap();
            (
                engine.reveal_reals(&relu).unwrap(),
                engine.reveal_reals(&max).unwrap(),
            )
        });
        for (relu, max) in results {
            assert_eq!(relu, vec![0.0, 0.0, 3.75, 0.0]);
            assert_eq!(max, vec![1.0, 1.0, 3.75, 1.0]);
        }
    }
}
