//! 320-bit unsigned integer: five 64-bit limbs, little-endian (limb 0 is
//! least significant). This is the reduction target every per-workgroup
//! partial sum and the final digest are expressed in.

/// A 320-bit value as five native-order 64-bit limbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Uint320(pub [u64; 5]);

impl Uint320 {
    /// The additive identity.
    pub const ZERO: Uint320 = Uint320([0; 5]);

    /// Builds a value from raw limbs (limb 0 least significant).
    pub const fn from_limbs(limbs: [u64; 5]) -> Self {
        Uint320(limbs)
    }

    /// Adds `other` into `self` in place, propagating carry across all five
    /// limbs. Overflow past the top limb is silently dropped (320-bit modular
    /// addition).
    pub fn add_assign(&mut self, other: &Uint320) {
        let mut carry = false;
        for i in 0..5 {
            let (sum1, c1) = self.0[i].overflowing_add(carry as u64);
            let (sum2, c2) = sum1.overflowing_add(other.0[i]);
            self.0[i] = sum2;
            carry = c1 || c2;
        }
    }

    /// Reduces a slice of partial sums by repeated 320-bit addition into the
    /// first element. Returns `Uint320::ZERO` for an empty slice.
    pub fn sum(parts: &[Uint320]) -> Uint320 {
        let mut acc = match parts.first() {
            Some(first) => *first,
            None => return Uint320::ZERO,
        };
        for part in &parts[1..] {
            acc.add_assign(part);
        }
        acc
    }

    /// Encodes as 40 big-endian bytes (BLAKE3 variant's callback encoding):
    /// limb 4 (most significant) first, each limb big-endian within itself.
    pub fn to_be_bytes(self) -> [u8; 40] {
        let mut out = [0u8; 40];
        for (i, limb) in self.0.iter().rev().enumerate() {
            out[i * 8..i * 8 + 8].copy_from_slice(&limb.to_be_bytes());
        }
        out
    }

    /// Returns the raw native-order limbs (HighwayHash variant's callback
    /// encoding: limb 0 least significant, little-endian within each limb on
    /// the wire but native order on the host per §9 Endian handling).
    pub fn to_limbs(self) -> [u64; 5] {
        self.0
    }
}

impl From<[u8; 32]> for Uint320 {
    /// Widens a 256-bit keyed-hash digest (little-endian bytes) into a
    /// 320-bit value with the top limb zero.
    fn from(bytes: [u8; 32]) -> Self {
        let mut limbs = [0u64; 5];
        for i in 0..4 {
            limbs[i] = u64::from_le_bytes(bytes[i * 8..i * 8 + 8].try_into().unwrap());
        }
        Uint320(limbs)
    }
}
