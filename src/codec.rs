use crate::algebra::RingElement;
use crate::config::BoundConfig;

/// Converts between real numbers and fixed-point ring elements.
///
/// A real v is represented by trunc(v * 2^precision) reduced modulo 2^W.
/// Values outside the signed range of the ring wrap silently; reconstruction
/// of shared values relies on the same wraparound, so it is never reported.
/// The reduction is exact for rings of up to 127 bits.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FixedPoint {
    precision: u32,
}

impl FixedPoint {
    pub fn new(precision: u32) -> Self {
        FixedPoint { precision }
    }

    pub fn from_config(config: &BoundConfig) -> Self {
        Self::new(config.float_precision)
    }

    pub fn precision(&self) -> u32 {
        self.precision
    }

    pub fn scale(&self) -> f64 {
        (self.precision as f64).exp2()
    }

    /// Fixed-point representation of 1.0
    pub fn one<R: RingElement>(&self) -> R {
        R::pow2(self.precision)
    }

    pub fn encode<R: RingElement>(&self, v: f64) -> R {
        // fmod by a power of two is exact and keeps the sign
        let x = (v * self.scale()).trunc() % (R::BITS as f64).exp2();
        R::from_i128(x as i128)
    }

    pub fn decode<R: RingElement>(&self, x: R) -> f64 {
        x.as_i128() as f64 / self.scale()
    }

    pub fn encode_slice<R: RingElement>(&self, vs: &[f64]) -> Vec<R> {
        vs.iter().map(|v| self.encode(*v)).collect()
    }

    pub fn decode_slice<R: RingElement>(&self, xs: &[R]) -> Vec<f64> {
        xs.iter().map(|x| self.decode(*x)).collect()
    }
}
