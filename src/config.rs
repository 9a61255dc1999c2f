use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::algebra::RingElement;
use crate::consts::*;
use crate::{Error, Result};

/// Process-wide bounds and tunables.
///
/// Built (or loaded) once at startup, validated with [`BoundConfig::validate_for`]
/// and then passed by reference to every component; nothing mutates it afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BoundConfig {
    pub float_precision: u32,
    pub gforce_bound: u64,
    pub rogue_bound: u64,
    pub pc_bits: u32,
    pub enable_offline_randomness: bool,
    pub delta_bits: u32,
    pub mini_batch_size: usize,
    pub log_mini_batch: u32,
    pub log_learning_rate: u32,
    pub threads_per_block: usize,
    pub preload_path: PathBuf,
    pub test_path: PathBuf,
}

impl Default for BoundConfig {
    fn default() -> Self {
        BoundConfig {
            float_precision: FLOAT_PRECISION,
            gforce_bound: GFORCE_BOUND,
            rogue_bound: ROGUE_BOUND,
            pc_bits: PC_BITS,
            enable_offline_randomness: ENABLE_OFFLINE_RANDOMNESS,
            delta_bits: DELTA_BITS,
            mini_batch_size: MINI_BATCH_SIZE,
            log_mini_batch: LOG_MINI_BATCH,
            log_learning_rate: LOG_LEARNING_RATE,
            threads_per_block: MAX_THREADS_PER_BLOCK,
            preload_path: PathBuf::from(PRELOAD_PATH),
            test_path: PathBuf::from(TEST_PATH),
        }
    }
}

macro_rules! ensure {
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            return Err(Error::Configuration(format!($($arg)*)));
        }
    };
}

impl BoundConfig {
    /// Parse a JSON configuration; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON configuration file of at most MAX_JSON_DESERIALIZATION_BUFFER bytes.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let mut json = String::new();
        file.take(MAX_JSON_DESERIALIZATION_BUFFER + 1)
            .read_to_string(&mut json)?;
        ensure!(
            json.len() as u64 <= MAX_JSON_DESERIALIZATION_BUFFER,
            "{} exceeds {} bytes",
            path.as_ref().display(),
            MAX_JSON_DESERIALIZATION_BUFFER
        );
        Self::from_json(&json)
    }

    /// Check that the configuration is consistent for an engine over the ring `R`.
    pub fn validate_for<R: RingElement>(&self) -> Result<()> {
        let w = R::BITS;
        ensure!(self.float_precision > 0, "float_precision must be positive");
        ensure!(
            2 * self.float_precision < w,
            "float_precision {} leaves no headroom for products in a {}-bit ring",
            self.float_precision,
            w
        );
        ensure!(self.pc_bits >= 2, "pc_bits must be at least 2");
        ensure!(
            2 * self.pc_bits + 2 <= w,
            "pc_bits {} too wide for a {}-bit ring",
            self.pc_bits,
            w
        );
        ensure!(
            self.log_mini_batch < usize::BITS,
            "log_mini_batch {} out of range",
            self.log_mini_batch
        );
        ensure!(
            self.mini_batch_size == 1usize << self.log_mini_batch,
            "mini_batch_size {} is not 2^{}",
            self.mini_batch_size,
            self.log_mini_batch
        );
        ensure!(
            self.log_learning_rate < w,
            "log_learning_rate {} out of range",
            self.log_learning_rate
        );
        ensure!(
            self.log_mini_batch + self.log_learning_rate < w - 2,
            "combined update shift {} out of range",
            self.log_mini_batch + self.log_learning_rate
        );
        ensure!(
            matches!(self.delta_bits, 32 | 64) && self.delta_bits <= w,
            "delta_bits {} unsupported for a {}-bit ring",
            self.delta_bits,
            w
        );
        ensure!(self.threads_per_block > 0, "threads_per_block must be positive");
        Ok(())
    }

    /// Width m of the masked value split in the comparison protocol.
    pub(crate) fn comparison_bits(&self) -> u32 {
        self.pc_bits - 1
    }
}
