//! Per-file hashes driving fast-path selection.
//!
//! A [`FileHash`] splits into a *structure* hash (classes, signatures,
//! argument shapes, constants — anything whose change invalidates the
//! symbol table), per-method *body* hashes keyed by method-name hash, and
//! the sorted set of sent method names. Method keys deliberately cover the
//! name only, not the receiver: unrelated same-named methods pull extra
//! files onto the fast path, trading work for correctness.

use std::hash::{Hash, Hasher};

use beryl_ast::{Expr, ExprKind, visit_children};
use beryl_core::GlobalState;
use beryl_core::hash::{hash64, hash128};
use rustc_hash::{FxHashMap, FxHashSet};

/// Definition-shape hashes: anything that forces the slow path when it
/// changes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DefinitionsHash {
    /// Classes, superclasses, mixins, fields, signatures, and argument
    /// shapes, order-sensitively.
    pub structure: u64,
    /// Method-name hash → combined body-shape hash.
    pub method_hashes: FxHashMap<u64, u64>,
}

/// Hashes of the method names a file sends, sorted and deduplicated.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UsagesHash {
    /// Sorted method-name hashes.
    pub sends: Vec<u64>,
}

/// The full per-file hash.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FileHash {
    /// Definition hashes.
    pub definitions: DefinitionsHash,
    /// Usage hashes.
    pub usages: UsagesHash,
}

impl FileHash {
    /// Decides the path for an edit of this file into `new`.
    ///
    /// `None` means slow path: the definition structure changed or the set
    /// of defined methods differs. Otherwise the changed-method name
    /// hashes come back (empty when only call sites moved around).
    pub fn fast_path_changes(&self, new: &FileHash) -> Option<Vec<u64>> {
        if self.definitions.structure != new.definitions.structure {
            return None;
        }
        let old_keys: FxHashSet<u64> = self.definitions.method_hashes.keys().copied().collect();
        let new_keys: FxHashSet<u64> = new.definitions.method_hashes.keys().copied().collect();
        if old_keys != new_keys {
            return None;
        }
        let mut changed: Vec<u64> = self
            .definitions
            .method_hashes
            .iter()
            .filter(|(name, body)| new.definitions.method_hashes.get(*name) != Some(body))
            .map(|(name, _)| *name)
            .collect();
        changed.sort_unstable();
        Some(changed)
    }

    /// Whether any of `changed` is a method name this file sends.
    pub fn uses_any(&self, changed: &[u64]) -> bool {
        changed
            .iter()
            .any(|hash| self.usages.sends.binary_search(hash).is_ok())
    }
}

/// Hashes one desugared tree.
pub fn hash_file(gs: &GlobalState, tree: &Expr) -> FileHash {
    let mut hasher = FileHasher {
        gs,
        structure: StructureHasher::default(),
        method_hashes: FxHashMap::default(),
        sends: FxHashSet::default(),
    };
    hasher.walk(tree);
    let mut sends: Vec<u64> = hasher.sends.into_iter().collect();
    sends.sort_unstable();
    FileHash {
        definitions: DefinitionsHash {
            structure: hasher.structure.finish(),
            method_hashes: hasher.method_hashes,
        },
        usages: UsagesHash { sends },
    }
}

/// Accumulates the order-sensitive structure hash.
#[derive(Default)]
struct StructureHasher {
    state: rustc_hash::FxHasher,
}

impl StructureHasher {
    fn write(&mut self, value: impl Hash) {
        value.hash(&mut self.state);
    }

    fn finish(&self) -> u64 {
        self.state.finish()
    }
}

struct FileHasher<'gs> {
    gs: &'gs GlobalState,
    structure: StructureHasher,
    method_hashes: FxHashMap<u64, u64>,
    sends: FxHashSet<u64>,
}

impl FileHasher<'_> {
    fn name_hash(&self, name: beryl_core::names::NameRef) -> u64 {
        hash64(self.gs.show_name(name).as_str())
    }

    fn walk(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::ClassDef {
                declared_kind,
                name,
                superclass,
                body,
            } => {
                self.structure.write(0x01u8);
                self.structure.write(matches!(
                    declared_kind,
                    beryl_ast::ClassDefKind::Class
                ));
                self.structure.write(shape_hash(self.gs, name));
                self.structure.write(shape_hash(self.gs, superclass));
                self.walk(body);
                self.structure.write(0x02u8);
            }
            ExprKind::MethodDef {
                name,
                args,
                body,
                sig,
                flags,
            } => {
                // The signature-level shape feeds the structure hash; the
                // body only feeds the per-method hash.
                self.structure.write(0x03u8);
                self.structure.write(self.name_hash(*name));
                self.structure.write(flags.is_self_method);
                for arg in args {
                    self.structure.write(shape_hash(self.gs, arg));
                }
                self.structure.write(shape_hash(self.gs, sig));

                let key = self.name_hash(*name);
                let body_hash = shape_hash(self.gs, body);
                // Same-named definitions fold together; order-independent
                // so reopening order does not flip the fast path.
                *self.method_hashes.entry(key).or_insert(0) ^= body_hash;

                self.walk_sends_only(body);
                for arg in args {
                    self.walk_sends_only(arg);
                }
            }
            ExprKind::Assign { lhs, rhs }
                if matches!(lhs.kind, ExprKind::UnresolvedConstant { .. }) =>
            {
                // Constant values feed field types, so their whole shape is
                // structural.
                self.structure.write(0x04u8);
                self.structure.write(shape_hash(self.gs, lhs));
                self.structure.write(shape_hash(self.gs, rhs));
                self.walk_sends_only(rhs);
            }
            ExprKind::Send { method, .. } => {
                self.sends.insert(self.name_hash(*method));
                // Class-body sends like `include` are structural.
                self.structure.write(0x05u8);
                self.structure.write(shape_hash(self.gs, expr));
                visit_children(expr, &mut |child| self.walk(child));
            }
            _ => visit_children(expr, &mut |child| self.walk(child)),
        }
    }

    /// Records send usages inside a method body. Bodies stay out of the
    /// structure hash, with one exception: a def nested in a body still
    /// declares a method, so its signature shape is structural.
    fn walk_sends_only(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Send { method, .. } => {
                self.sends.insert(self.name_hash(*method));
            }
            ExprKind::MethodDef {
                name, args, sig, flags, ..
            } => {
                self.structure.write(0x06u8);
                self.structure.write(self.name_hash(*name));
                self.structure.write(flags.is_self_method);
                for arg in args {
                    self.structure.write(shape_hash(self.gs, arg));
                }
                self.structure.write(shape_hash(self.gs, sig));
            }
            _ => {}
        }
        visit_children(expr, &mut |child| self.walk_sends_only(child));
    }
}

/// A stable structural hash of a subtree, ignoring source locations.
fn shape_hash(gs: &GlobalState, expr: &Expr) -> u64 {
    struct Shape<'a> {
        gs: &'a GlobalState,
        expr: &'a Expr,
    }
    impl Hash for Shape<'_> {
        fn hash<H: Hasher>(&self, state: &mut H) {
            shape_into(self.gs, self.expr, state);
        }
    }
    hash128(&Shape { gs, expr }).lower64()
}

fn shape_into<H: Hasher>(gs: &GlobalState, expr: &Expr, state: &mut H) {
    std::mem::discriminant(&expr.kind).hash(state);
    match &expr.kind {
        ExprKind::MethodDef { name, flags, .. } => {
            hash64(gs.show_name(*name).as_str()).hash(state);
            flags.is_self_method.hash(state);
            flags.is_rewriter_synthesized.hash(state);
        }
        ExprKind::Send {
            method,
            num_pos_args,
            flags,
            ..
        } => {
            hash64(gs.show_name(*method).as_str()).hash(state);
            num_pos_args.hash(state);
            flags.is_private_ok.hash(state);
        }
        ExprKind::OpAssign { op, .. } => {
            hash64(gs.show_name(*op).as_str()).hash(state);
        }
        ExprKind::Literal { value } => hash_lit(gs, *value, state),
        ExprKind::Local { name, unique } => {
            hash64(gs.show_name(*name).as_str()).hash(state);
            unique.hash(state);
        }
        ExprKind::UnresolvedIdent { name, kind } => {
            hash64(gs.show_name(*name).as_str()).hash(state);
            (*kind as u8).hash(state);
        }
        ExprKind::UnresolvedConstant { name, .. } => {
            hash64(gs.show_name(*name).as_str()).hash(state);
        }
        ExprKind::ConstantLit { symbol } => symbol.hash(state),
        ExprKind::ClassDef { declared_kind, .. } => {
            matches!(declared_kind, beryl_ast::ClassDefKind::Class).hash(state);
        }
        ExprKind::Cast { cast_kind, .. } => (*cast_kind as u8).hash(state),
        ExprKind::RuntimeMethodDefinition { name, is_self } => {
            hash64(gs.show_name(*name).as_str()).hash(state);
            is_self.hash(state);
        }
        _ => {}
    }
    visit_children(expr, &mut |child| {
        state.write_u8(0xfe);
        shape_into(gs, child, state);
    });
    state.write_u8(0xff);
}

fn hash_lit<H: Hasher>(gs: &GlobalState, value: beryl_core::types::LitKind, state: &mut H) {
    use beryl_core::types::LitKind;
    match value {
        LitKind::Int(n) => (0u8, n).hash(state),
        LitKind::Float(bits) => (1u8, bits).hash(state),
        LitKind::True => 2u8.hash(state),
        LitKind::False => 3u8.hash(state),
        LitKind::Nil => 4u8.hash(state),
        LitKind::Str(name) => (5u8, hash64(gs.show_name(name).as_str())).hash(state),
        LitKind::Sym(name) => (6u8, hash64(gs.show_name(name).as_str())).hash(state),
    }
}
