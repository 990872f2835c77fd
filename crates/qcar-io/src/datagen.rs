//! Synthetic RAM images
//!
//! Deterministic tensors for tests and driver demos. The modular ramps
//! match the classic hand-checkable patterns (activations cycle 0..127,
//! weights cycle the byte encodings of -32..31); the random generator is
//! seeded ChaCha8 so a failing run can always be reproduced from its seed.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Activation ramp: `i % 128`.
pub fn ramp_activations(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 128) as u8).collect()
}

/// Weight ramp: the byte encoding of `(i % 64) - 32`.
pub fn ramp_weights(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i % 64) as i64 - 32) as i8 as u8).collect()
}

/// Uniform random bytes from a seeded ChaCha8 stream.
pub fn seeded_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activation_ramp_wraps_at_128() {
        let data = ramp_activations(260);
        assert_eq!(data[0], 0);
        assert_eq!(data[127], 127);
        assert_eq!(data[128], 0);
        assert_eq!(data[259], 3);
    }

    #[test]
    fn weight_ramp_encodes_signed_bytes() {
        let data = ramp_weights(70);
        assert_eq!(data[0], (-32i8) as u8);
        assert_eq!(data[32], 0);
        assert_eq!(data[63], 31);
        assert_eq!(data[64], (-32i8) as u8);
    }

    #[test]
    fn seeded_bytes_are_reproducible() {
        let a = seeded_bytes(1024, 42);
        let b = seeded_bytes(1024, 42);
        assert_eq!(a, b);
        let c = seeded_bytes(1024, 43);
        assert_ne!(a, c);
    }
}
