mod prg;

pub use blake3::{Hash, Hasher};

pub use prg::{Key, Prg, KEY_SIZE};

use crate::consts::CONTEXT_COMMITMENT;

pub const HASH_SIZE: usize = 32;

/// Derive a PRG key from a context label and keying material.
pub fn kdf(context: &str, material: &[u8]) -> Key {
    let derived = blake3::derive_key(context, material);
    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&derived[..KEY_SIZE]);
    key
}

/// Salted hash commitment to a serialized value.
pub fn commit(value: &[u8], salt: &[u8; HASH_SIZE]) -> Hash {
    let mut hasher = Hasher::new_derive_key(CONTEXT_COMMITMENT);
    hasher.update(salt);
    hasher.update(value);
    hasher.finalize()
}
