use std::path::{Path, PathBuf};
use std::thread;

use tracing::{info, warn};

use crate::algebra::ShareRing;
use crate::codec::FixedPoint;
use crate::config::BoundConfig;
use crate::online::ProtocolEngine;
use crate::preprocessing::{Dealer, Demand, Pool, PreloadedSource, Source};
use crate::sharing::{SharedTensor, TensorId};
use crate::transport::{LocalNetwork, LocalTransport, Transport};
use crate::{Error, Result};

pub type LocalEngine<R, T = LocalTransport> = ProtocolEngine<R, Source<R>, T>;

/// N parties in one process: one thread and one engine per party.
///
/// The simulation owns the dealer until the parties start, so that inputs can
/// be shared under the same MAC key as the correlated randomness.
pub struct Simulation<R: ShareRing> {
    config: BoundConfig,
    parties: usize,
    dealer: Dealer<R>,
    next_input: u64,
}

impl<R: ShareRing> Simulation<R> {
    pub fn new(config: BoundConfig, parties: usize, seed: &[u8]) -> Result<Self> {
        let dealer = Dealer::new(&config, parties, seed)?;
        Ok(Simulation {
            config,
            parties,
            dealer,
            next_input: 0,
        })
    }

    pub fn config(&self) -> &BoundConfig {
        &self.config
    }

    pub fn parties(&self) -> usize {
        self.parties
    }

    pub fn dealer(&mut self) -> &mut Dealer<R> {
        &mut self.dealer
    }

    /// Share plaintext ring values among the parties.
    pub fn share(&mut self, shape: Vec<usize>, values: &[R]) -> Result<SharedTensor<R>> {
        let id = TensorId(self.next_input);
        self.next_input += 1;
        self.dealer.share_tensor(id, shape, values)
    }

    /// Encode and share real values among the parties.
    pub fn share_reals(&mut self, shape: Vec<usize>, reals: &[f64]) -> Result<SharedTensor<R>> {
        let values: Vec<R> = FixedPoint::from_config(&self.config).encode_slice(reals);
        self.share(shape, &values)
    }

    /// Generate the pools for `demand` and write them to the preload directory.
    pub fn preload(mut self, demand: &Demand) -> Result<Vec<PathBuf>> {
        let pools = self.dealer.preload(demand)?;
        Pool::save_all(&self.config.preload_path, &pools)
    }

    /// Run `job` on every party, with randomness in the configured mode.
    pub fn run<O, F>(self, demand: &Demand, job: F) -> Result<Vec<Result<O>>>
    where
        O: Send,
        F: Fn(&mut LocalEngine<R>) -> Result<O> + Sync,
    {
        let transports = LocalNetwork::new(self.parties);
        self.run_with(demand, transports, job)
    }

    /// Run `job` on every party over the given transports.
    pub fn run_with<T, O, F>(
        self,
        demand: &Demand,
        transports: Vec<T>,
        job: F,
    ) -> Result<Vec<Result<O>>>
    where
        T: Transport,
        O: Send,
        F: Fn(&mut LocalEngine<R, T>) -> Result<O> + Sync,
    {
        let config = self.config.clone();
        let sources = self.dealer.into_sources(&config, demand)?;
        Self::execute(&config, sources, transports, job)
    }

    /// Run `job` on every party with pools previously written by `preload`.
    pub fn run_preloaded<O, F, P>(self, dir: P, job: F) -> Result<Vec<Result<O>>>
    where
        O: Send,
        F: Fn(&mut LocalEngine<R>) -> Result<O> + Sync,
        P: AsRef<Path>,
    {
        let sources = (0..self.parties)
            .map(|party| {
                let pool = Pool::load_party(dir.as_ref(), party)?;
                if pool.key_share() != self.dealer.key_share(party) {
                    return Err(Error::Configuration(format!(
                        "pool of party {} was generated under a different MAC key",
                        party
                    )));
                }
                Ok(Source::Preloaded(PreloadedSource::new(pool)))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::execute(&self.config, sources, LocalNetwork::new(self.parties), job)
    }

    fn execute<T, O, F>(
        config: &BoundConfig,
        sources: Vec<Source<R>>,
        transports: Vec<T>,
        job: F,
    ) -> Result<Vec<Result<O>>>
    where
        T: Transport,
        O: Send,
        F: Fn(&mut LocalEngine<R, T>) -> Result<O> + Sync,
    {
        if sources.len() != transports.len() {
            return Err(Error::Configuration(format!(
                "{} randomness sources for {} transports",
                sources.len(),
                transports.len()
            )));
        }
        info!("running {} parties", sources.len());

        let job = &job;
        Ok(thread::scope(|scope| {
            let handles: Vec<_> = sources
                .into_iter()
                .zip(transports)
                .map(|(source, transport)| {
                    let config = config.clone();
                    scope.spawn(move || {
                        let mut engine = ProtocolEngine::new(config, source, transport)?;
                        job(&mut engine)
                    })
                })
                .collect();
            handles
                .into_iter()
                .enumerate()
                .map(|(party, handle)| {
                    handle.join().unwrap_or_else(|_| {
                        warn!("party {} panicked", party);
                        Err(Error::Aborted)
                    })
                })
                .collect()
        }))
    }
}
