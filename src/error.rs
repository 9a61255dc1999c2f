use std::fmt;
use std::io;

use thiserror::Error;

use crate::preprocessing::RandomnessKind;

pub type Result<T> = std::result::Result<T, Error>;

/// The integrity check that rejected a round.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Check {
    /// discrepancy of a single communicating primitive (ROGUE_BOUND)
    PerOperation,
    /// discrepancy accumulated over a mini-batch (GFORCE_BOUND)
    Accumulated,
    /// a check value did not open its commitment
    Commitment,
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Check::PerOperation => f.write_str("per-operation"),
            Check::Accumulated => f.write_str("accumulated"),
            Check::Commitment => f.write_str("commitment"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("incomplete share set: expected {expected} shares, got {got}")]
    IncompleteShareSet { expected: usize, got: usize },

    #[error("randomness exhausted: no {kind} left after serving {served}")]
    RandomnessExhausted { kind: RandomnessKind, served: u64 },

    #[error("malicious deviation detected by {check} check: discrepancy {discrepancy} exceeds bound {bound}")]
    MaliciousDeviationDetected {
        check: Check,
        discrepancy: u64,
        bound: u64,
    },

    #[error("computation aborted after an integrity failure")]
    Aborted,

    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("randomness source served the wrong kind: expected {expected}")]
    UnexpectedRandomness { expected: RandomnessKind },

    #[error("transport: {0}")]
    Transport(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Serialization(#[from] bincode::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Errors after which no party may continue the computation.
    ///
    /// Running out of randomness mid-protocol leaves opened values unchecked
    /// and the parties out of step, so it is fatal as well.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::MaliciousDeviationDetected { .. }
                | Error::RandomnessExhausted { .. }
                | Error::Aborted
                | Error::Transport(_)
        )
    }
}
