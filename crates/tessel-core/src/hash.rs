//! Hashing used for sibling keys and the runtime's internal maps.
//!
//! `ahash` and `hashbrown` by default; the `std-hash` feature switches both
//! to the standard library so keys stay reproducible across toolchains.

use std::hash::{Hash, Hasher};

use crate::Key;

#[cfg(not(feature = "std-hash"))]
pub use hashbrown::{HashMap, HashSet};
#[cfg(feature = "std-hash")]
pub use std::collections::{HashMap, HashSet};

#[cfg(not(feature = "std-hash"))]
type KeyHasher = ahash::AHasher;
#[cfg(feature = "std-hash")]
type KeyHasher = std::collections::hash_map::DefaultHasher;

/// Derives a sibling [`Key`] from any hashable value.
///
/// Equal values give equal keys within one build, so `&"a"` and
/// `&String::from("a")` identify the same child.
#[inline]
pub fn key_of<T: Hash + ?Sized>(value: &T) -> Key {
    let mut hasher = KeyHasher::default();
    value.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_values_share_a_key() {
        assert_eq!(key_of("row-1"), key_of(&String::from("row-1")));
        assert_eq!(key_of(&7u32), key_of(&7u32));
        assert_ne!(key_of("row-1"), key_of("row-2"));
    }
}
