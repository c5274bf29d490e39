/*!

Deterministic hashing. The standard library's `RandomState` reseeds per process, which would make
seed derivation and any hash-ordered iteration vary between runs; `rustc-hash`'s Fx hasher does not.

*/

use std::hash::{Hash, Hasher};

pub use rustc_hash::FxHasher;

pub type HashMap<K, V> = rustc_hash::FxHashMap<K, V>;
pub type HashSet<T> = rustc_hash::FxHashSet<T>;

/// Hashes a string with the Fx hasher. Stable across processes for a given build.
pub fn hash_str(data: &str) -> u64 {
    let mut hasher = FxHasher::default();
    data.hash(&mut hasher);
    hasher.finish()
}
