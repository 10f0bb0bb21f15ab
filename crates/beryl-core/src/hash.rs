//! Content-stable fingerprints.
//!
//! Fingerprints feed fast-path selection: they must be stable for equal
//! inputs across processes, so the slow SipHash-1-3 is used for anything
//! persisted or compared across runs, while fx hashing serves in-memory
//! tables.

use core::fmt;
use std::hash::{Hash, Hasher};

use siphasher::sip128::{Hasher128, SipHasher13};

pub use rustc_hash::{FxHashMap, FxHashSet, FxHasher};

/// A 128-bit content hash.
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
pub struct Fingerprint {
    lo: u64,
    hi: u64,
}

impl Fingerprint {
    /// Creates a fingerprint from the given pair of 64-bit integers.
    pub const fn from_pair(lo: u64, hi: u64) -> Self {
        Self { lo, hi }
    }

    /// Creates a fingerprint from the given 128-bit integer.
    pub const fn from_u128(hash: u128) -> Self {
        Self {
            lo: hash as u64,
            hi: (hash >> 64) as u64,
        }
    }

    /// Returns the fingerprint as a 128-bit integer.
    pub const fn to_u128(self) -> u128 {
        ((self.hi as u128) << 64) | self.lo as u128
    }

    /// Truncates the fingerprint to its low 64 bits.
    pub const fn lower64(self) -> u64 {
        self.lo
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fp{:016x}{:016x}", self.hi, self.lo)
    }
}

/// Calculates a 128-bit siphash of a value.
#[inline]
pub fn hash128<T: Hash + ?Sized>(value: &T) -> Fingerprint {
    let mut state = SipHasher13::new();
    value.hash(&mut state);
    Fingerprint::from_u128(state.finish128().as_u128())
}

/// A quick 64-bit hash for in-memory tables.
#[inline]
pub fn hash64<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut state = FxHasher::default();
    value.hash(&mut state);
    state.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_round_trips_u128() {
        let fp = hash128("def foo; end");
        assert_eq!(Fingerprint::from_u128(fp.to_u128()), fp);
    }

    #[test]
    fn hash128_is_stable_for_equal_inputs() {
        assert_eq!(hash128(&("foo", 3)), hash128(&("foo", 3)));
        assert_ne!(hash128(&("foo", 3)), hash128(&("foo", 4)));
    }
}
