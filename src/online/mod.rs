//! The online phase: protocols over authenticated additive shares.
//!
//! Every party runs its own [`ProtocolEngine`] and issues the same sequence
//! of operations. Local operations (`add`, `scalar_multiply`, ...) never
//! communicate. Every other operation exchanges one or more broadcast rounds
//! through the transport, consumes correlated randomness, and ends with a MAC
//! check over everything it opened.
//!
//! Shares live in the storage ring of `R` and are opened in full. Every
//! opening is masked above bit W (by a uniform Beaver mask, the top of a
//! truncation or comparison mask, or a reveal mask), and public values are
//! reduced to their W low bits before any shift or bit test.

mod compare;
mod kernel;

pub use kernel::BlockDispatch;

use std::ops::Range;

use tracing::debug;

use crate::algebra::{RingElement, ShareRing};
use crate::codec::FixedPoint;
use crate::config::BoundConfig;
use crate::integrity::IntegrityChecker;
use crate::preprocessing::{RandomnessKind, RandomnessSource, TripleShare};
use crate::sharing::{Auth, PartyTensor, TensorId};
use crate::transport::{open_values, Transport};
use crate::{Error, Result};

// ids of tensors created by the engine, disjoint from dealer-assigned ids
const FIRST_ENGINE_TENSOR: u64 = 1 << 32;

pub struct ProtocolEngine<R: ShareRing, S, T> {
    config: BoundConfig,
    codec: FixedPoint,
    party: usize,
    parties: usize,
    key_share: R::Storage,
    source: S,
    transport: T,
    checker: IntegrityChecker<R>,
    kernel: BlockDispatch,
    next_id: u64,
    aborted: bool,
}

impl<R, S, T> ProtocolEngine<R, S, T>
where
    R: ShareRing,
    S: RandomnessSource<R>,
    T: Transport,
{
    pub fn new(config: BoundConfig, source: S, transport: T) -> Result<Self> {
        config.validate_for::<R>()?;
        if source.party() != transport.party() {
            return Err(Error::Configuration(format!(
                "randomness of party {} given to party {}",
                source.party(),
                transport.party()
            )));
        }
        if transport.parties() < 2 {
            return Err(Error::Configuration(format!(
                "secret sharing needs at least 2 parties, got {}",
                transport.parties()
            )));
        }
        Ok(ProtocolEngine {
            codec: FixedPoint::from_config(&config),
            party: transport.party(),
            parties: transport.parties(),
            key_share: source.key_share(),
            checker: IntegrityChecker::new(&config),
            kernel: BlockDispatch::new(config.threads_per_block),
            config,
            source,
            transport,
            next_id: FIRST_ENGINE_TENSOR,
            aborted: false,
        })
    }

    pub fn party(&self) -> usize {
        self.party
    }

    pub fn parties(&self) -> usize {
        self.parties
    }

    pub fn config(&self) -> &BoundConfig {
        &self.config
    }

    pub fn codec(&self) -> &FixedPoint {
        &self.codec
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.aborted {
            Err(Error::Aborted)
        } else {
            Ok(())
        }
    }

    // poison the engine on any failure no party may continue from
    fn settle<X>(&mut self, result: Result<X>) -> Result<X> {
        if let Err(err) = &result {
            if err.is_fatal() && !self.aborted {
                debug!("party {} aborts: {}", self.party, err);
                self.aborted = true;
            }
        }
        result
    }

    fn fresh_id(&mut self) -> TensorId {
        let id = TensorId(self.next_id);
        self.next_id += 1;
        id
    }

    fn tensor(&mut self, shape: Vec<usize>, lanes: Vec<Auth<R>>) -> Result<PartyTensor<R>> {
        let id = self.fresh_id();
        PartyTensor::from_auths(id, self.party, shape, lanes)
    }

    fn constant(&self, c: R) -> Auth<R> {
        Auth::constant(c, self.party, self.key_share)
    }

    fn public(&self, c: R::Storage) -> Auth<R> {
        Auth::public(c, self.party, self.key_share)
    }

    fn check_party(&self, a: &PartyTensor<R>) -> Result<()> {
        if a.party() != self.party {
            return Err(Error::Configuration(format!(
                "tensor of party {} used by party {}",
                a.party(),
                self.party
            )));
        }
        Ok(())
    }

    fn binary_lanes(
        &self,
        a: &PartyTensor<R>,
        b: &PartyTensor<R>,
    ) -> Result<(Vec<Auth<R>>, Vec<Auth<R>>)> {
        self.ensure_alive()?;
        self.check_party(a)?;
        self.check_party(b)?;
        a.check_shape(b)?;
        Ok((a.auths(), b.auths()))
    }

    fn unary_lanes(&self, a: &PartyTensor<R>) -> Result<Vec<Auth<R>>> {
        self.ensure_alive()?;
        self.check_party(a)?;
        Ok(a.auths())
    }

    /* Local operations */

    pub fn add(&mut self, a: &PartyTensor<R>, b: &PartyTensor<R>) -> Result<PartyTensor<R>> {
        let (x, y) = self.binary_lanes(a, b)?;
        let lanes = x.into_iter().zip(y).map(|(x, y)| x + y).collect();
        self.tensor(a.shape().to_vec(), lanes)
    }

    pub fn sub(&mut self, a: &PartyTensor<R>, b: &PartyTensor<R>) -> Result<PartyTensor<R>> {
        let (x, y) = self.binary_lanes(a, b)?;
        let lanes = x.into_iter().zip(y).map(|(x, y)| x - y).collect();
        self.tensor(a.shape().to_vec(), lanes)
    }

    pub fn neg(&mut self, a: &PartyTensor<R>) -> Result<PartyTensor<R>> {
        let lanes = self.unary_lanes(a)?.into_iter().map(|x| -x).collect();
        self.tensor(a.shape().to_vec(), lanes)
    }

    /// Add the public ring constant `c` to every element.
    pub fn add_public(&mut self, a: &PartyTensor<R>, c: R) -> Result<PartyTensor<R>> {
        let c = self.constant(c);
        let lanes = self.unary_lanes(a)?.into_iter().map(|x| x + c).collect();
        self.tensor(a.shape().to_vec(), lanes)
    }

    /// Multiply every element by the public ring constant `c` (no rescaling).
    pub fn scalar_multiply(&mut self, a: &PartyTensor<R>, c: R) -> Result<PartyTensor<R>> {
        let c = c.lift();
        let lanes = self.unary_lanes(a)?.into_iter().map(|x| x.scale(c)).collect();
        self.tensor(a.shape().to_vec(), lanes)
    }

    /// Sum of all elements, as a tensor of shape [1].
    pub fn sum(&mut self, a: &PartyTensor<R>) -> Result<PartyTensor<R>> {
        let total = self
            .unary_lanes(a)?
            .into_iter()
            .fold(Auth::ZERO, |s, x| s + x);
        self.tensor(vec![1], vec![total])
    }

    /// Repeat `a` `times` times along a new leading axis.
    pub fn tile(&mut self, a: &PartyTensor<R>, times: usize) -> Result<PartyTensor<R>> {
        let x = self.unary_lanes(a)?;
        let mut shape = vec![times];
        shape.extend_from_slice(a.shape());
        let lanes = (0..times).flat_map(|_| x.iter().copied()).collect();
        self.tensor(shape, lanes)
    }

    /// Rows `rows` of `a` along its leading axis.
    pub fn slice_rows(
        &mut self,
        a: &PartyTensor<R>,
        rows: Range<usize>,
    ) -> Result<PartyTensor<R>> {
        let x = self.unary_lanes(a)?;
        let leading = a.shape().first().copied().unwrap_or(0);
        if a.shape().is_empty() || rows.start > rows.end || rows.end > leading {
            return Err(Error::ShapeMismatch {
                expected: a.shape().to_vec(),
                got: vec![rows.start, rows.end],
            });
        }
        let width: usize = a.shape()[1..].iter().product();
        let mut shape = a.shape().to_vec();
        shape[0] = rows.len();
        let lanes = x[rows.start * width..rows.end * width].to_vec();
        self.tensor(shape, lanes)
    }

    /* Communicating operations */

    // open shares and record them for the next check
    fn open(&mut self, lanes: &[Auth<R>]) -> Result<Vec<R::Storage>> {
        let shares: Vec<R::Storage> = lanes.iter().map(|x| x.value).collect();
        let opened = open_values(&mut self.transport, &shares)?;
        self.checker.record(&opened, lanes.iter().map(|x| x.mac));
        Ok(opened)
    }

    fn verify_pending(&mut self) -> Result<()> {
        self.checker.verify(&mut self.transport, self.key_share)
    }

    /// Run the MAC check over everything opened since the last check.
    pub fn verify(&mut self) -> Result<()> {
        self.ensure_alive()?;
        let result = self.verify_pending();
        self.settle(result)
    }

    /// Close a mini-batch: verify and hold the accumulated discrepancy
    /// against GFORCE_BOUND.
    pub fn end_batch(&mut self) -> Result<()> {
        self.ensure_alive()?;
        let result = self
            .verify_pending()
            .and_then(|_| self.checker.end_batch());
        self.settle(result)
    }

    /// Secret-share the private values of `owner`.
    ///
    /// Only the owner passes `Some(values)`; every party must call this with
    /// the same owner and shape.
    pub fn input(
        &mut self,
        owner: usize,
        values: Option<&[f64]>,
        shape: Vec<usize>,
    ) -> Result<PartyTensor<R>> {
        let encoded: Option<Vec<R>> = values.map(|v| self.codec.encode_slice(v));
        self.input_ring(owner, encoded.as_deref(), shape)
    }

    /// Like `input`, for values that are already ring elements.
    pub fn input_ring(
        &mut self,
        owner: usize,
        values: Option<&[R]>,
        shape: Vec<usize>,
    ) -> Result<PartyTensor<R>> {
        self.ensure_alive()?;
        if owner >= self.parties {
            return Err(Error::Configuration(format!(
                "input owner {} is not one of {} parties",
                owner, self.parties
            )));
        }
        let n: usize = shape.iter().product();
        if self.party == owner {
            match values {
                Some(v) if v.len() != n => {
                    return Err(Error::ShapeMismatch {
                        expected: shape,
                        got: vec![v.len()],
                    })
                }
                None => {
                    return Err(Error::Configuration(format!(
                        "party {} owns the input but has no values",
                        owner
                    )))
                }
                Some(_) => (),
            }
        }

        let result = self.input_inner(owner, values, n);
        let lanes = self.settle(result)?;
        self.tensor(shape, lanes)
    }

    fn input_inner(
        &mut self,
        owner: usize,
        values: Option<&[R]>,
        n: usize,
    ) -> Result<Vec<Auth<R>>> {
        let masks = (0..n)
            .map(|_| self.source.next_input_mask(owner))
            .collect::<Result<Vec<_>>>()?;

        // the owner announces x - r, everybody else an empty vector
        let announced: Vec<R::Storage> = match values {
            Some(values) if self.party == owner => values
                .iter()
                .zip(masks.iter())
                .map(|(x, mask)| match mask.clear {
                    Some(r) => Ok(x.lift() - r),
                    None => Err(Error::UnexpectedRandomness {
                        expected: RandomnessKind::InputMask { owner },
                    }),
                })
                .collect::<Result<_>>()?,
            _ => Vec::new(),
        };
        let payloads = self.transport.broadcast(bincode::serialize(&announced)?)?;
        let masked: Vec<R::Storage> = bincode::deserialize(&payloads[owner]).map_err(|e| {
            Error::Transport(format!("malformed input from party {}: {}", owner, e))
        })?;
        if masked.len() != n {
            return Err(Error::Transport(format!(
                "party {} announced {} inputs, expected {}",
                owner,
                masked.len(),
                n
            )));
        }
        Ok(masks
            .iter()
            .zip(masked)
            .map(|(mask, d)| mask.r + self.public(d))
            .collect())
    }

    // Beaver multiplication without truncation or verification
    fn beaver(&mut self, x: &[Auth<R>], y: &[Auth<R>]) -> Result<Vec<Auth<R>>> {
        debug_assert_eq!(x.len(), y.len());
        let n = x.len();
        let triples = (0..n)
            .map(|_| self.source.next_triple())
            .collect::<Result<Vec<TripleShare<R>>>>()?;

        // d = x - a and e = y - b, opened in one round
        let mut masked: Vec<Auth<R>> = Vec::with_capacity(2 * n);
        masked.extend(x.iter().zip(triples.iter()).map(|(x, t)| *x - t.a));
        masked.extend(y.iter().zip(triples.iter()).map(|(y, t)| *y - t.b));
        let opened = self.open(&masked)?;

        let jobs: Vec<(TripleShare<R>, R::Storage, R::Storage)> = triples
            .into_iter()
            .zip(opened[..n].iter().zip(opened[n..].iter()))
            .map(|(t, (d, e))| (t, *d, *e))
            .collect();
        let party = self.party;
        let key_share = self.key_share;
        Ok(self.kernel.map(&jobs, |(t, d, e)| {
            t.c + t.b.scale(*d) + t.a.scale(*e) + Auth::public(*d * *e, party, key_share)
        }))
    }

    // bounded-mask truncation without verification
    fn truncate_lanes(&mut self, x: &[Auth<R>], shift: u32) -> Result<Vec<Auth<R>>> {
        if shift == 0 {
            return Ok(x.to_vec());
        }
        if shift >= R::BITS - 2 {
            return Err(Error::Configuration(format!(
                "truncation by {} bits out of range",
                shift
            )));
        }
        let pairs = x
            .iter()
            .map(|_| self.source.next_truncation(shift))
            .collect::<Result<Vec<_>>>()?;

        // the low W bits of c = x + 2^(W-2) + r never wrap for |x| < 2^(W-2)
        let offset = self.constant(R::pow2(R::BITS - 2));
        let masked: Vec<Auth<R>> = x
            .iter()
            .zip(pairs.iter())
            .map(|(x, pair)| *x + offset + pair.r)
            .collect();
        let opened = self.open(&masked)?;

        let correction = R::pow2(R::BITS - 2 - shift);
        Ok(opened
            .into_iter()
            .zip(pairs.iter())
            .map(|(c, pair)| {
                let c = R::project(c);
                self.constant(c.shift_right(shift) - correction) - pair.r_hi
            })
            .collect())
    }

    /// Fixed-point product: Beaver multiplication, then truncation by
    /// FLOAT_PRECISION.
    ///
    /// The result is floor(a * b / 2^FLOAT_PRECISION) plus at most one unit
    /// in the last place.
    pub fn multiply(
        &mut self,
        a: &PartyTensor<R>,
        b: &PartyTensor<R>,
    ) -> Result<PartyTensor<R>> {
        let (x, y) = self.binary_lanes(a, b)?;
        let shift = self.config.float_precision;
        let result = self
            .beaver(&x, &y)
            .and_then(|z| self.truncate_lanes(&z, shift))
            .and_then(|z| self.verify_pending().map(|_| z));
        let lanes = self.settle(result)?;
        self.tensor(a.shape().to_vec(), lanes)
    }

    /// Exact ring product, for integer and boolean operands.
    pub fn multiply_integer(
        &mut self,
        a: &PartyTensor<R>,
        b: &PartyTensor<R>,
    ) -> Result<PartyTensor<R>> {
        let (x, y) = self.binary_lanes(a, b)?;
        let result = self
            .beaver(&x, &y)
            .and_then(|z| self.verify_pending().map(|_| z));
        let lanes = self.settle(result)?;
        self.tensor(a.shape().to_vec(), lanes)
    }

    /// floor(a / 2^shift), plus at most one.
    ///
    /// Exact when a is a multiple of 2^shift; requires |a| < 2^(W-2).
    pub fn truncate(&mut self, a: &PartyTensor<R>, shift: u32) -> Result<PartyTensor<R>> {
        let x = self.unary_lanes(a)?;
        let result = self
            .truncate_lanes(&x, shift)
            .and_then(|z| self.verify_pending().map(|_| z));
        let lanes = self.settle(result)?;
        self.tensor(a.shape().to_vec(), lanes)
    }

    /// Multiply by a public real: encode, scale and rescale.
    pub fn mul_public(&mut self, a: &PartyTensor<R>, c: f64) -> Result<PartyTensor<R>> {
        let c: R = self.codec.encode(c);
        let scaled = self.scalar_multiply(a, c)?;
        self.truncate(&scaled, self.config.float_precision)
    }

    /// Shared bit [a >= b] (as the integer 0 or 1).
    ///
    /// Requires |a - b| < 2^(PC_BITS - 1).
    pub fn compare(
        &mut self,
        a: &PartyTensor<R>,
        b: &PartyTensor<R>,
    ) -> Result<PartyTensor<R>> {
        let (x, y) = self.binary_lanes(a, b)?;
        let diff: Vec<Auth<R>> = x.into_iter().zip(y).map(|(x, y)| x - y).collect();
        let result = self
            .compare_lanes(&diff)
            .and_then(|z| self.verify_pending().map(|_| z));
        let lanes = self.settle(result)?;
        self.tensor(a.shape().to_vec(), lanes)
    }

    /// Oblivious selection: a where cond is 1, b where it is 0.
    pub fn select(
        &mut self,
        cond: &PartyTensor<R>,
        a: &PartyTensor<R>,
        b: &PartyTensor<R>,
    ) -> Result<PartyTensor<R>> {
        let (c, x) = self.binary_lanes(cond, a)?;
        let (_, y) = self.binary_lanes(cond, b)?;
        let diff: Vec<Auth<R>> = x.iter().zip(y.iter()).map(|(x, y)| *x - *y).collect();
        let result = self
            .beaver(&c, &diff)
            .and_then(|z| self.verify_pending().map(|_| z));
        let lanes = self.settle(result)?;
        let lanes = lanes.into_iter().zip(y).map(|(z, y)| y + z).collect();
        self.tensor(a.shape().to_vec(), lanes)
    }

    /// max(x, 0)
    pub fn relu(&mut self, a: &PartyTensor<R>) -> Result<PartyTensor<R>> {
        let x = self.unary_lanes(a)?;
        let result = self
            .compare_lanes(&x)
            .and_then(|bits| self.beaver(&bits, &x))
            .and_then(|z| self.verify_pending().map(|_| z));
        let lanes = self.settle(result)?;
        self.tensor(a.shape().to_vec(), lanes)
    }

    // open x + 2^W r: the W low bits are x, the rest is uniform
    fn reveal_lanes(&mut self, x: &[Auth<R>]) -> Result<Vec<R>> {
        let masks = x
            .iter()
            .map(|_| self.source.next_reveal_mask())
            .collect::<Result<Vec<_>>>()?;
        let top = R::Storage::pow2(R::BITS);
        let masked: Vec<Auth<R>> = x
            .iter()
            .zip(masks.iter())
            .map(|(x, mask)| *x + mask.r.scale(top))
            .collect();
        let opened = self.open(&masked)?;
        Ok(opened.into_iter().map(R::project).collect())
    }

    /// Open a tensor to every party, after a successful check.
    pub fn reveal(&mut self, a: &PartyTensor<R>) -> Result<Vec<R>> {
        let x = self.unary_lanes(a)?;
        let result = self
            .reveal_lanes(&x)
            .and_then(|opened| self.verify_pending().map(|_| opened));
        self.settle(result)
    }

    /// `reveal`, decoded as fixed-point reals.
    pub fn reveal_reals(&mut self, a: &PartyTensor<R>) -> Result<Vec<f64>> {
        let opened = self.reveal(a)?;
        Ok(self.codec.decode_slice(&opened))
    }
}
