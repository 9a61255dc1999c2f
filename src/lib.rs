// secret-shared fixed-point arithmetic between N parties,
// with MAC-authenticated shares and a trusted offline dealer.

#[cfg(test)]
mod tests;

// the rings Z / 2^W Z the shares live in
pub mod algebra;

// real <-> fixed-point conversion
pub mod codec;

// bounds and tunables
pub mod config;

// additive sharing and shared tensors
pub mod sharing;

// offline phase: dealer, randomness sources and pools
pub mod preprocessing;

// online phase: the protocol engine
pub mod online;

// MAC checks over opened values
pub mod integrity;

// mini-batch coordination for secure training
pub mod batch;

// message passing between parties
pub mod transport;

// all parties in one process
pub mod simulation;

// hash-based challenges
mod oracle;

// PRG, key derivation and commitments
mod crypto;

// internal constants
mod consts;

mod error;

pub use batch::BatchCoordinator;
pub use codec::FixedPoint;
pub use config::BoundConfig;
pub use error::{Check, Error, Result};
pub use online::ProtocolEngine;
pub use simulation::Simulation;
