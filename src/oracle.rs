use crate::crypto::{Hasher, Prg, KEY_SIZE};

/// Random oracle over a transcript: a keyed hash whose output seeds a PRG.
pub struct RandomOracle(Hasher);

impl RandomOracle {
    pub fn new(context: &'static str, bind: Option<&[u8]>) -> Self {
        let key = blake3::derive_key(context, bind.unwrap_or(&[]));
        RandomOracle(Hasher::new_keyed(&key))
    }

    pub fn feed(&mut self, input: &[u8]) {
        self.0.update(input);
    }

    pub fn query(self) -> Prg {
        let hash = self.0.finalize();
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&hash.as_bytes()[..KEY_SIZE]);
        Prg::new(&key)
    }
}
