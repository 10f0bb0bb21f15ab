//! Per-block type environments.

use beryl_cfg::{Cfg, LocalRef};
use beryl_core::GlobalState;
use beryl_core::symbols::SymbolRef;
use beryl_core::types::Ty;
use rustc_hash::FxHashMap;

/// What inference knows about one local at one program point.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Entry {
    /// The inferred type.
    pub ty: Ty,
    /// The symbol the local aliases, when it holds a constant reference.
    pub alias: Option<SymbolRef>,
}

impl Entry {
    pub(crate) fn typed(ty: Ty) -> Entry {
        Entry { ty, alias: None }
    }

    fn nil() -> Entry {
        Entry::typed(Ty::nil())
    }
}

/// A mapping from locals to entries.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct Env {
    map: FxHashMap<LocalRef, Entry>,
}

impl Env {
    pub(crate) fn get(&self, local: LocalRef) -> Option<Entry> {
        self.map.get(&local).cloned()
    }

    /// Reads a local; unwritten locals are `nil`, matching the language's
    /// uninitialized-variable semantics.
    pub(crate) fn entry_or_nil(&self, local: LocalRef) -> Entry {
        self.get(local).unwrap_or_else(Entry::nil)
    }

    pub(crate) fn ty_or_nil(&self, local: LocalRef) -> Ty {
        self.entry_or_nil(local).ty
    }

    pub(crate) fn set(&mut self, local: LocalRef, entry: Entry) {
        self.map.insert(local, entry);
    }

    /// Joins another environment into this one: types take least upper
    /// bounds, loop-carried locals widen their literals first, and
    /// disagreeing aliases drop.
    pub(crate) fn merge_with(&mut self, other: &Env, gs: &GlobalState, cfg: &Cfg) {
        for (&local, theirs) in &other.map {
            let in_loop = cfg.local(local).min_loops > 0;
            match self.map.get_mut(&local) {
                Some(ours) => {
                    let mut lhs = ours.ty.clone();
                    let mut rhs = theirs.ty.clone();
                    if in_loop {
                        lhs = lhs.widened(gs.symbols());
                        rhs = rhs.widened(gs.symbols());
                    }
                    ours.ty = lhs.lub(&rhs, gs.symbols());
                    if ours.alias != theirs.alias {
                        ours.alias = None;
                    }
                }
                None => {
                    // Bound on one path only: the other path left it nil.
                    let mut ty = theirs.ty.clone();
                    if in_loop {
                        ty = ty.widened(gs.symbols());
                    }
                    self.map.insert(
                        local,
                        Entry {
                            ty: ty.lub(&Ty::nil(), gs.symbols()),
                            alias: None,
                        },
                    );
                }
            }
        }
        // Locals known only on our side merged against an implicit nil.
        for (&local, ours) in self.map.iter_mut() {
            if !other.map.contains_key(&local) {
                ours.ty = ours.ty.lub(&Ty::nil(), gs.symbols());
                ours.alias = None;
            }
        }
    }

    /// Forces every entry that differs from `old` to untyped; the
    /// iteration-cap escape hatch.
    pub(crate) fn widen_changed_against(&mut self, old: &Env) {
        for (local, entry) in self.map.iter_mut() {
            let unchanged = old.map.get(local).is_some_and(|prev| prev == &*entry);
            if !unchanged {
                entry.ty = Ty::Untyped;
                entry.alias = None;
            }
        }
    }
}
