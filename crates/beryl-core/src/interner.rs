//! Global `Arc`-based object interning for structurally shared types.
//!
//! Interned values are deduplicated process-wide, so equality and hashing
//! degrade to pointer identity. The table is append-only; interned objects
//! are never freed.

use std::fmt::{self, Debug};
use std::hash::{BuildHasherDefault, Hash, Hasher};
use std::ops::Deref;
use std::sync::OnceLock;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use fxhash::FxHasher;
use triomphe::Arc;

type InternMap<T> = DashMap<Arc<T>, (), BuildHasherDefault<FxHasher>>;

/// Storage cell for one internable type, held in a `static` per type.
pub struct InternStorage<T: Hash + Eq + 'static> {
    map: OnceLock<InternMap<T>>,
}

impl<T: Hash + Eq + 'static> InternStorage<T> {
    /// Creates an empty storage cell. Meant to be assigned to a `static`.
    pub const fn new() -> Self {
        Self {
            map: OnceLock::new(),
        }
    }

    fn get(&self) -> &InternMap<T> {
        self.map.get_or_init(InternMap::default)
    }
}

impl<T: Hash + Eq + 'static> Default for InternStorage<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A type whose values can be interned with [`Interned::new`].
pub trait Internable: Hash + Eq + Sized + 'static {
    /// The process-wide table holding interned values of this type.
    fn storage() -> &'static InternStorage<Self>;
}

/// Declares the intern table for one or more types.
#[macro_export]
macro_rules! impl_internable {
    ($($t:ty),+ $(,)?) => {$(
        impl $crate::interner::Internable for $t {
            fn storage() -> &'static $crate::interner::InternStorage<Self> {
                static STORAGE: $crate::interner::InternStorage<$t> =
                    $crate::interner::InternStorage::new();
                &STORAGE
            }
        }
    )+};
}

/// A deduplicated shared handle to a `T`.
pub struct Interned<T: Internable> {
    arc: Arc<T>,
}

impl<T: Internable> Interned<T> {
    /// Interns `obj`, returning the canonical handle for its value.
    pub fn new(obj: T) -> Self {
        let map = T::storage().get();
        // Fast path: the value is already interned.
        if let Some(entry) = map.get(&obj) {
            return Self {
                arc: entry.key().clone(),
            };
        }
        // The entry API locks the shard, so a racing insert of an equal value
        // settles on one canonical Arc.
        let arc = Arc::new(obj);
        match map.entry(arc.clone()) {
            Entry::Occupied(entry) => Self {
                arc: entry.key().clone(),
            },
            Entry::Vacant(entry) => {
                entry.insert(());
                Self { arc }
            }
        }
    }
}

impl<T: Internable> Clone for Interned<T> {
    fn clone(&self) -> Self {
        Self {
            arc: self.arc.clone(),
        }
    }
}

impl<T: Internable> Deref for Interned<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.arc
    }
}

impl<T: Internable> PartialEq for Interned<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.arc, &other.arc)
    }
}

impl<T: Internable> Eq for Interned<T> {}

impl<T: Internable> Hash for Interned<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (&*self.arc as *const T as usize).hash(state);
    }
}

impl<T: Internable> From<T> for Interned<T> {
    fn from(value: T) -> Self {
        Interned::new(value)
    }
}

impl<T: Internable + Debug> Debug for Interned<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (**self).fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Hash, PartialEq, Eq)]
    struct Probe(u64, &'static str);

    impl_internable!(Probe);

    #[test]
    fn interning_is_canonical() {
        let a = Interned::new(Probe(1, "x"));
        let b = Interned::new(Probe(1, "x"));
        let c = Interned::new(Probe(2, "x"));
        assert_eq!(a, b);
        assert!(Arc::ptr_eq(&a.arc, &b.arc));
        assert_ne!(a, c);
    }
}
