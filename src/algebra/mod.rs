// traits and implementations of the underlying rings
mod ring;
mod scalar;

pub use ring::{RingElement, Samplable, ShareRing};
pub use scalar::{Z128, Z32, Z64};
