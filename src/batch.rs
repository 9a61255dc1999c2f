use std::ops::Range;

use tracing::{debug, info};

use crate::algebra::ShareRing;
use crate::config::BoundConfig;
use crate::online::ProtocolEngine;
use crate::preprocessing::RandomnessSource;
use crate::sharing::PartyTensor;
use crate::transport::Transport;
use crate::{Error, Result};

/// Mini-batch bookkeeping for secure gradient descent.
///
/// The batch size and the learning rate are powers of two, so averaging a
/// gradient over a batch and scaling it by the learning rate are truncations
/// of the shared sum.
#[derive(Clone, Debug)]
pub struct BatchCoordinator {
    config: BoundConfig,
}

impl BatchCoordinator {
    pub fn new(config: BoundConfig) -> Self {
        BatchCoordinator { config }
    }

    pub fn batch_size(&self) -> usize {
        self.config.mini_batch_size
    }

    /// Number of full mini-batches in `samples`; a partial batch at the end
    /// is dropped.
    pub fn batch_count(&self, samples: usize) -> usize {
        samples >> self.config.log_mini_batch
    }

    /// Sample indices of the i'th batch.
    pub fn batch_range(&self, batch: usize) -> Range<usize> {
        let log = self.config.log_mini_batch;
        (batch << log)..((batch + 1) << log)
    }

    pub fn batches(&self, samples: usize) -> impl Iterator<Item = Range<usize>> + '_ {
        (0..self.batch_count(samples)).map(move |i| self.batch_range(i))
    }

    /// Scale an update by the learning rate 2^(-LOG_LEARNING_RATE).
    pub fn scale_update<R, S, T>(
        &self,
        engine: &mut ProtocolEngine<R, S, T>,
        update: &PartyTensor<R>,
    ) -> Result<PartyTensor<R>>
    where
        R: ShareRing,
        S: RandomnessSource<R>,
        T: Transport,
    {
        engine.truncate(update, self.config.log_learning_rate)
    }

    /// Average a gradient summed over a mini-batch.
    pub fn average<R, S, T>(
        &self,
        engine: &mut ProtocolEngine<R, S, T>,
        gradient_sum: &PartyTensor<R>,
    ) -> Result<PartyTensor<R>>
    where
        R: ShareRing,
        S: RandomnessSource<R>,
        T: Transport,
    {
        engine.truncate(gradient_sum, self.config.log_mini_batch)
    }

    /// w - lr * (sum / batch), with a single truncation.
    pub fn apply_update<R, S, T>(
        &self,
        engine: &mut ProtocolEngine<R, S, T>,
        weights: &PartyTensor<R>,
        gradient_sum: &PartyTensor<R>,
    ) -> Result<PartyTensor<R>>
    where
        R: ShareRing,
        S: RandomnessSource<R>,
        T: Transport,
    {
        let shift = self.config.log_mini_batch + self.config.log_learning_rate;
        let step = engine.truncate(gradient_sum, shift)?;
        engine.sub(weights, &step)
    }

    /// Drive one epoch: `step` runs once per full mini-batch, and every batch
    /// closes with the accumulated integrity check.
    ///
    /// Returns the number of batches processed.
    pub fn run_epoch<R, S, T, F>(
        &self,
        engine: &mut ProtocolEngine<R, S, T>,
        samples: usize,
        mut step: F,
    ) -> Result<usize>
    where
        R: ShareRing,
        S: RandomnessSource<R>,
        T: Transport,
        F: FnMut(&mut ProtocolEngine<R, S, T>, Range<usize>) -> Result<()>,
    {
        let batches = self.batch_count(samples);
        if batches * self.batch_size() < samples {
            debug!(
                "dropping {} trailing samples",
                samples - batches * self.batch_size()
            );
        }
        for (i, range) in self.batches(samples).enumerate() {
            step(engine, range)?;
            engine.end_batch()?;
            debug!("party {} finished batch {}", engine.party(), i);
        }
        info!("party {} finished epoch of {} batches", engine.party(), batches);
        Ok(batches)
    }

    /// Narrow an update to the configured delta ring for export.
    pub fn export_delta<R: ShareRing, D: ShareRing>(
        &self,
        update: &PartyTensor<R>,
    ) -> Result<PartyTensor<D>> {
        if D::BITS != self.config.delta_bits {
            return Err(Error::Configuration(format!(
                "delta ring has {} bits, configured for {}",
                D::BITS,
                self.config.delta_bits
            )));
        }
        update.narrow::<D>()
    }
}
