//! Nullable random: deterministic random number generation.

use rand::{Error, RngCore};

/// A deterministic RNG for testing.
///
/// Returns pre-configured 64-bit values in order, cycling when exhausted.
/// With `rand`'s samplers a draw of `0` selects the lowest index of any
/// range and makes `gen_bool(p)` true for every `p > 0`; `u64::MAX` makes
/// `gen_bool(p)` false for every `p < 1`.
#[derive(Clone, Debug)]
pub struct NullRandom {
    outputs: Vec<u64>,
    index: usize,
}

impl NullRandom {
    /// Create with a sequence of deterministic values.
    ///
    /// # Panics
    ///
    /// Panics if `outputs` is empty.
    pub fn new(outputs: Vec<u64>) -> Self {
        assert!(!outputs.is_empty(), "NullRandom needs at least one output");
        Self { outputs, index: 0 }
    }

    /// Create with a single value that will be returned for every call.
    pub fn constant(value: u64) -> Self {
        Self::new(vec![value])
    }

    /// Always draws zero.
    pub fn zeros() -> Self {
        Self::constant(0)
    }

    /// Always draws `u64::MAX`.
    pub fn ones() -> Self {
        Self::constant(u64::MAX)
    }
}

impl RngCore for NullRandom {
    fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    fn next_u64(&mut self) -> u64 {
        let value = self.outputs[self.index % self.outputs.len()];
        self.index += 1;
        value
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let bytes = self.next_u64().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}
