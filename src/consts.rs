/// Labels used for key derivation and the random oracle, for domain-separation.

// PRG label for the MAC key
pub const CONTEXT_RNG_MAC_KEY: &str = "fathom mac key";

// PRG label for correlated randomness handed out by the dealer
pub const CONTEXT_RNG_DEALER: &str = "fathom dealer";

// PRG label for commitment salts
pub const CONTEXT_RNG_SALT: &str = "fathom commitment salt";

// random oracle context for the MAC check challenge
pub const CONTEXT_ORACLE_MAC_CHECK: &str = "fathom mac check";

// commitment context for the MAC check values
pub const CONTEXT_COMMITMENT: &str = "fathom commitment";

/// Process-wide defaults (overridable through `BoundConfig`).

// fractional bits of every fixed-point value
pub const FLOAT_PRECISION: u32 = 12;

// bound on the discrepancy accumulated over a mini-batch
pub const GFORCE_BOUND: u64 = 1 << 24;

// bound on the discrepancy of a single operation
pub const ROGUE_BOUND: u64 = 1 << 24;

// width of the values handled by the comparison protocol
pub const PC_BITS: u32 = 24;

pub const ENABLE_OFFLINE_RANDOMNESS: bool = false;

// width of the ring used to export parameter deltas
pub const DELTA_BITS: u32 = 32;

pub const LOG_MINI_BATCH: u32 = 7;

pub const MINI_BATCH_SIZE: usize = 1 << LOG_MINI_BATCH;

// learning rate = 2^(-LOG_LEARNING_RATE)
pub const LOG_LEARNING_RATE: u32 = 5;

// elements per dispatched block in data-parallel kernels
pub const MAX_THREADS_PER_BLOCK: usize = 32;

pub const PRELOAD_PATH: &str = "files/preload/";

pub const TEST_PATH: &str = "files/test/";

// largest configuration file accepted
pub const MAX_JSON_DESERIALIZATION_BUFFER: u64 = 1 << 20;

// largest preloaded randomness pool accepted (per party)
pub const MAX_PRELOAD_BUFFER: u64 = 1 << 32;
