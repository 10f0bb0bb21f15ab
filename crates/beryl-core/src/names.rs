//! Interned identifiers.
//!
//! Names are owned by a [`GlobalState`](crate::GlobalState) and never freed.
//! Two names are the same identifier iff their [`NameRef`]s are equal; all
//! lookups go through the owning table.

use core::fmt;

use ecow::{EcoString, eco_format};
use rustc_hash::FxHashMap;

/// A dense handle into a [`NameTable`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct NameRef(u32);

impl NameRef {
    /// Creates a reference from a dense index.
    pub const fn from_index(idx: u32) -> Self {
        Self(idx)
    }

    /// The dense index of this name.
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for NameRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name#{}", self.0)
    }
}

/// Why a compiler-generated name was minted.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, serde::Serialize)]
pub enum UniqueNameKind {
    /// Renamed to avoid a collision with a user identifier.
    RenameCollision,
    /// A temporary introduced by desugaring.
    DesugarTemp,
    /// A temporary introduced by CFG lowering.
    CfgTemp,
    /// A fresh version of a local produced by local-variable numbering.
    LocalRestore,
}

/// The payload of one interned name.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum NameData {
    /// Raw identifier text from source.
    Utf8(EcoString),
    /// A name appearing in constant position, wrapping its textual name.
    Constant(NameRef),
    /// A compiler-generated derivative of another name.
    Unique {
        /// What minted this name.
        kind: UniqueNameKind,
        /// The name this one derives from.
        original: NameRef,
        /// Disambiguating version, unique per (kind, original).
        num: u32,
    },
}

/// The append-only name table.
#[derive(Clone, Default)]
pub struct NameTable {
    names: Vec<NameData>,
    utf8_lookup: FxHashMap<EcoString, NameRef>,
    constant_lookup: FxHashMap<NameRef, NameRef>,
    unique_lookup: FxHashMap<(UniqueNameKind, NameRef, u32), NameRef>,
}

impl NameTable {
    /// Interns raw identifier text.
    pub fn enter_utf8(&mut self, text: &str) -> NameRef {
        if let Some(&existing) = self.utf8_lookup.get(text) {
            return existing;
        }
        let name = self.push(NameData::Utf8(text.into()));
        self.utf8_lookup.insert(text.into(), name);
        name
    }

    /// Interns the constant-position wrapper of `original`.
    pub fn enter_constant(&mut self, original: NameRef) -> NameRef {
        if let Some(&existing) = self.constant_lookup.get(&original) {
            return existing;
        }
        let name = self.push(NameData::Constant(original));
        self.constant_lookup.insert(original, name);
        name
    }

    /// Interns a compiler-generated derivative of `original`.
    pub fn enter_unique(&mut self, kind: UniqueNameKind, original: NameRef, num: u32) -> NameRef {
        if let Some(&existing) = self.unique_lookup.get(&(kind, original, num)) {
            return existing;
        }
        let name = self.push(NameData::Unique {
            kind,
            original,
            num,
        });
        self.unique_lookup.insert((kind, original, num), name);
        name
    }

    /// Looks up raw identifier text without interning it.
    pub fn lookup_utf8(&self, text: &str) -> Option<NameRef> {
        self.utf8_lookup.get(text).copied()
    }

    /// Returns the payload of `name`.
    pub fn data(&self, name: NameRef) -> &NameData {
        &self.names[name.0 as usize]
    }

    /// Renders `name` the way a user would write it.
    pub fn show(&self, name: NameRef) -> EcoString {
        match self.data(name) {
            NameData::Utf8(text) => text.clone(),
            NameData::Constant(original) => self.show(*original),
            NameData::Unique { original, num, .. } => {
                eco_format!("{}${num}", self.show(*original))
            }
        }
    }

    /// The number of interned names.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether no names have been interned.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    fn push(&mut self, data: NameData) -> NameRef {
        assert!(self.names.len() < u32::MAX as usize, "name table overflow");
        let name = NameRef(self.names.len() as u32);
        self.names.push(data);
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_names_are_deduplicated() {
        let mut table = NameTable::default();
        let a = table.enter_utf8("foo");
        let b = table.enter_utf8("foo");
        let c = table.enter_utf8("bar");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(table.show(a), "foo");
    }

    #[test]
    fn constant_wraps_its_utf8_name() {
        let mut table = NameTable::default();
        let utf8 = table.enter_utf8("Foo");
        let konst = table.enter_constant(utf8);
        assert_ne!(utf8, konst);
        assert_eq!(konst, table.enter_constant(utf8));
        assert_eq!(table.show(konst), "Foo");
    }

    #[test]
    fn unique_names_render_with_version() {
        let mut table = NameTable::default();
        let base = table.enter_utf8("tmp");
        let one = table.enter_unique(UniqueNameKind::DesugarTemp, base, 1);
        let two = table.enter_unique(UniqueNameKind::DesugarTemp, base, 2);
        assert_ne!(one, two);
        assert_eq!(table.show(two), "tmp$2");
    }
}
