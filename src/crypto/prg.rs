use aes::cipher::generic_array::GenericArray;
use aes::cipher::{KeyIvInit, StreamCipher};
use aes::Aes128;
use rand::rngs::OsRng;
use rand::{CryptoRng, Error, RngCore};

type Aes128Ctr = ctr::Ctr64LE<Aes128>;

pub const KEY_SIZE: usize = 16;

pub type Key = [u8; KEY_SIZE];

/// AES-128 in counter mode, used as a stream of pseudorandom bytes.
pub struct Prg(Aes128Ctr);

impl Prg {
    pub fn new(key: &Key) -> Self {
        let key = GenericArray::from_slice(key);
        let nonce = GenericArray::from_slice(&[0u8; 16]);
        Prg(Aes128Ctr::new(key, nonce))
    }

    /// Fresh PRG keyed from the operating system.
    pub fn from_entropy() -> Self {
        let mut key = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        Self::new(&key)
    }

    pub fn xor_bytes(&mut self, dst: &mut [u8]) {
        self.0.apply_keystream(dst);
    }

    pub fn gen(&mut self, dst: &mut [u8]) {
        dst.iter_mut().for_each(|b| *b = 0);
        self.xor_bytes(dst);
    }
}

impl RngCore for Prg {
    fn next_u32(&mut self) -> u32 {
        let mut buf = [0u8; 4];
        self.gen(&mut buf);
        u32::from_le_bytes(buf)
    }

    fn next_u64(&mut self) -> u64 {
        let mut buf = [0u8; 8];
        self.gen(&mut buf);
        u64::from_le_bytes(buf)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.gen(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Error> {
        self.gen(dest);
        Ok(())
    }
}

impl CryptoRng for Prg {}
