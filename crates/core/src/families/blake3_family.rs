//! BLAKE3 keyed hash-sum family.
//!
//! Each input word is hashed independently with the dispatcher's 32-byte
//! key, widened from BLAKE3's 256-bit digest to 320 bits, and reduced by
//! 320-bit modular addition — first within a workgroup (by the kernel),
//! then across workgroups (by the host, see [`crate::uint::Uint320::sum`]).
//! Runs the worker-driven pipeline: see [`super::ExecutionMode::WorkerDriven`].

use deluge_platform::{KernelEntry, PartialSum};

use crate::families::{ExecutionMode, HashFamily};
use crate::uint::Uint320;

/// BLAKE3 keyed-hash family, parameterized by a 32-byte key.
pub struct Blake3Family {
    key: [u8; 32],
}

impl Blake3Family {
    /// Creates the family descriptor for a given key. Matches
    /// `hashsum64_blake3_create(key[32])` from the public API table.
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }
}

impl HashFamily for Blake3Family {
    type Output = [u8; 40];

    const NAME: &'static str = "blake3_sum64";
    const EXECUTION_MODE: ExecutionMode = ExecutionMode::WorkerDriven;

    fn kernel_entry(&self) -> KernelEntry {
        blake3_entry
    }

    fn constants(&self) -> Vec<u8> {
        self.key.to_vec()
    }

    fn encode(sum: Uint320) -> [u8; 40] {
        sum.to_be_bytes()
    }
}

fn blake3_entry(n: u64, input: &[u64], output: &mut [PartialSum], constants: &[u8], local_size: u64) {
    let key: [u8; 32] = constants[..32].try_into().expect("blake3 constants are a 32-byte key");
    for (g, slot) in output.iter_mut().enumerate() {
        let start = g as u64 * local_size;
        let end = (start + local_size).min(n);
        let mut acc = Uint320::ZERO;
        for &word in &input[start as usize..end as usize] {
            let digest = blake3::keyed_hash(&key, &word.to_le_bytes());
            acc.add_assign(&Uint320::from(*digest.as_bytes()));
        }
        *slot = acc.to_limbs();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_zero_input_matches_reference_keyed_hash() {
        let key = [0u8; 32];
        let digest = blake3::keyed_hash(&key, &0u64.to_le_bytes());
        let expected = Uint320::from(*digest.as_bytes());

        let mut output = [[0u64; 5]; 1];
        blake3_entry(1, &[0u64], &mut output, &key, 64);
        assert_eq!(Uint320::from_limbs(output[0]), expected);
    }

    #[test]
    fn group_reduction_is_commutative() {
        let key = [7u8; 32];
        let forward = {
            let mut out = [[0u64; 5]; 1];
            blake3_entry(3, &[1, 2, 3], &mut out, &key, 64);
            out[0]
        };
        let reversed = {
            let mut out = [[0u64; 5]; 1];
            blake3_entry(3, &[3, 2, 1], &mut out, &key, 64);
            out[0]
        };
        assert_eq!(forward, reversed);
    }
}
