use super::*;

use std::collections::{BTreeMap, VecDeque};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use bincode::Options;
use tracing::info;

use crate::consts::MAX_PRELOAD_BUFFER;

/// One party's preloaded randomness, grouped by kind in generation order.
#[derive(Debug, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Pool<R: ShareRing> {
    party: usize,
    key_share: R::Storage,
    items: BTreeMap<RandomnessKind, VecDeque<Randomness<R>>>,
}

fn options() -> impl Options {
    bincode::DefaultOptions::new().with_limit(MAX_PRELOAD_BUFFER)
}

impl<R: ShareRing> Pool<R> {
    pub fn new(party: usize, key_share: R::Storage) -> Self {
        Pool {
            party,
            key_share,
            items: BTreeMap::new(),
        }
    }

    pub fn party(&self) -> usize {
        self.party
    }

    pub fn key_share(&self) -> R::Storage {
        self.key_share
    }

    pub fn push(&mut self, item: Randomness<R>) {
        self.items.entry(item.kind()).or_default().push_back(item);
    }

    fn pop(&mut self, kind: RandomnessKind) -> Option<Randomness<R>> {
        self.items.get_mut(&kind).and_then(|queue| queue.pop_front())
    }

    pub fn remaining(&self, kind: RandomnessKind) -> usize {
        self.items.get(&kind).map_or(0, |queue| queue.len())
    }

    pub fn len(&self) -> usize {
        self.items.values().map(|queue| queue.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// File name of the pool of `party` within a preload directory.
    pub fn file_name(party: usize) -> String {
        format!("party_{}.bin", party)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        options().serialize_into(writer, self)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(options().deserialize_from(reader)?)
    }

    /// Write the pools of all parties into `dir`, creating it if needed.
    pub fn save_all<P: AsRef<Path>>(dir: P, pools: &[Pool<R>]) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir.as_ref())?;
        let mut paths = Vec::with_capacity(pools.len());
        for pool in pools {
            let path = dir.as_ref().join(Self::file_name(pool.party));
            pool.save(&path)?;
            info!(
                "saved {} items for party {} to {}",
                pool.len(),
                pool.party,
                path.display()
            );
            paths.push(path);
        }
        Ok(paths)
    }

    /// Load the pool of `party` from a preload directory.
    pub fn load_party<P: AsRef<Path>>(dir: P, party: usize) -> Result<Self> {
        let pool = Self::load(dir.as_ref().join(Self::file_name(party)))?;
        if pool.party != party {
            return Err(Error::Configuration(format!(
                "pool file of party {} holds the randomness of party {}",
                party, pool.party
            )));
        }
        Ok(pool)
    }
}

/// Source serving items from a pool filled before the online phase.
///
/// Running out of any kind is an error; nothing is generated on the fly.
pub struct PreloadedSource<R: ShareRing> {
    pool: Pool<R>,
    served: BTreeMap<RandomnessKind, u64>,
}

impl<R: ShareRing> PreloadedSource<R> {
    pub fn new(pool: Pool<R>) -> Self {
        PreloadedSource {
            pool,
            served: BTreeMap::new(),
        }
    }

    pub fn remaining(&self, kind: RandomnessKind) -> usize {
        self.pool.remaining(kind)
    }
}

impl<R: ShareRing> RandomnessSource<R> for PreloadedSource<R> {
    fn party(&self) -> usize {
        self.pool.party
    }

    fn key_share(&self) -> R::Storage {
        self.pool.key_share
    }

    fn next(&mut self, kind: RandomnessKind) -> Result<Randomness<R>> {
        let served = self.served.entry(kind).or_insert(0);
        match self.pool.pop(kind) {
            Some(item) => {
                *served += 1;
                Ok(item)
            }
            None => Err(Error::RandomnessExhausted {
                kind,
                served: *served,
            }),
        }
    }
}
