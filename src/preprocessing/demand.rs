use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::RandomnessKind;
use crate::config::BoundConfig;

/// Number of correlated items of every kind a computation will consume.
///
/// Used to size preloaded pools; the per-primitive helpers mirror what the
/// protocols in `online` draw for a tensor of `n` elements.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Demand(BTreeMap<RandomnessKind, usize>);

impl Demand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, kind: RandomnessKind, count: usize) -> &mut Self {
        if count > 0 {
            *self.0.entry(kind).or_insert(0) += count;
        }
        self
    }

    pub fn get(&self, kind: RandomnessKind) -> usize {
        self.0.get(&kind).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (RandomnessKind, usize)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }

    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    pub fn merge(&mut self, other: &Demand) -> &mut Self {
        for (kind, count) in other.iter() {
            self.add(kind, count);
        }
        self
    }

    /// The demand repeated `times` times.
    pub fn repeat(&self, times: usize) -> Demand {
        Demand(self.0.iter().map(|(k, v)| (*k, v * times)).collect())
    }

    pub fn input(&mut self, owner: usize, n: usize) -> &mut Self {
        self.add(RandomnessKind::InputMask { owner }, n)
    }

    pub fn multiply_integer(&mut self, n: usize) -> &mut Self {
        self.add(RandomnessKind::Triple, n)
    }

    pub fn truncate(&mut self, shift: u32, n: usize) -> &mut Self {
        if shift == 0 {
            return self;
        }
        self.add(RandomnessKind::Truncation { shift }, n)
    }

    pub fn multiply(&mut self, config: &BoundConfig, n: usize) -> &mut Self {
        self.multiply_integer(n).truncate(config.float_precision, n)
    }

    pub fn compare(&mut self, config: &BoundConfig, n: usize) -> &mut Self {
        // prefix-OR over m bits then one inner product of m terms
        let m = config.comparison_bits() as usize;
        self.add(RandomnessKind::Comparison, n)
            .multiply_integer((2 * m - 1) * n)
    }

    pub fn select(&mut self, n: usize) -> &mut Self {
        self.multiply_integer(n)
    }

    pub fn relu(&mut self, config: &BoundConfig, n: usize) -> &mut Self {
        self.compare(config, n).select(n)
    }

    pub fn reveal(&mut self, n: usize) -> &mut Self {
        self.add(RandomnessKind::RevealMask, n)
    }
}
