//! HighwayHash keyed hash-sum family.
//!
//! Each input word is hashed independently with the dispatcher's 4×u64 key
//! into a 256-bit digest, widened to 320 bits (top limb zero) and reduced
//! exactly as BLAKE3's family does. Runs the event-driven pipeline: see
//! [`super::ExecutionMode::EventDriven`].

use deluge_platform::{KernelEntry, PartialSum};
use highway::{HighwayHash, HighwayHasher, Key};

use crate::families::{ExecutionMode, HashFamily};
use crate::uint::Uint320;

/// HighwayHash keyed family, parameterized by a 4×u64 key.
pub struct HighwayFamily {
    key: [u64; 4],
}

impl HighwayFamily {
    /// Creates the family descriptor for a given key. Matches
    /// `highway_create(key[4×u64])` from the public API table.
    pub fn new(key: [u64; 4]) -> Self {
        Self { key }
    }
}

impl HashFamily for HighwayFamily {
    type Output = [u64; 5];

    const NAME: &'static str = "highway_sum64";
    const EXECUTION_MODE: ExecutionMode = ExecutionMode::EventDriven;

    fn kernel_entry(&self) -> KernelEntry {
        highway_entry
    }

    fn constants(&self) -> Vec<u8> {
        self.key.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    fn encode(sum: Uint320) -> [u64; 5] {
        sum.to_limbs()
    }
}

fn highway_entry(n: u64, input: &[u64], output: &mut [PartialSum], constants: &[u8], local_size: u64) {
    let mut key = [0u64; 4];
    for (i, k) in key.iter_mut().enumerate() {
        *k = u64::from_le_bytes(constants[i * 8..i * 8 + 8].try_into().unwrap());
    }
    for (g, slot) in output.iter_mut().enumerate() {
        let start = g as u64 * local_size;
        let end = (start + local_size).min(n);
        let mut acc = Uint320::ZERO;
        for &word in &input[start as usize..end as usize] {
            let digest: [u64; 4] = HighwayHasher::new(Key(key)).hash256(&word.to_le_bytes());
            acc.add_assign(&Uint320::from_limbs([digest[0], digest[1], digest[2], digest[3], 0]));
        }
        *slot = acc.to_limbs();
    }
}
