//! The symbol table: interned declarations.
//!
//! Symbols are stored in one dense arena per kind; the cross-kind
//! [`SymbolRef`] is the universal handle. Owner pointers and ancestor chains
//! form cycles, so symbols refer to each other exclusively through these
//! indices.

use core::fmt;
use std::hash::BuildHasherDefault;

use fxhash::FxHasher;
use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::loc::Loc;
use crate::names::NameRef;
use crate::types::Ty;

type FxIndexMap<K, V> = IndexMap<K, V, BuildHasherDefault<FxHasher>>;

macro_rules! symbol_ref {
    ($(#[$doc:meta])* $name:ident, $label:literal) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
        pub struct $name(u32);

        impl $name {
            /// Creates a reference from a dense index.
            pub const fn from_index(idx: u32) -> Self {
                Self(idx)
            }

            /// The dense index of this symbol.
            pub const fn index(self) -> u32 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "#{}"), self.0)
            }
        }
    };
}

symbol_ref!(
    /// A class or module symbol.
    ClassOrModuleRef,
    "ClassOrModule"
);
symbol_ref!(
    /// A method symbol.
    MethodRef,
    "Method"
);
symbol_ref!(
    /// An instance field or static field symbol.
    FieldRef,
    "Field"
);
symbol_ref!(
    /// A type member or type parameter symbol.
    TypeMemberRef,
    "TypeMember"
);

impl ClassOrModuleRef {
    /// The global root scope.
    pub const ROOT: ClassOrModuleRef = ClassOrModuleRef(0);
    /// The stub class substituted for unresolved constants.
    pub const STUB: ClassOrModuleRef = ClassOrModuleRef(1);

    /// Whether this is the root scope.
    pub fn is_root(self) -> bool {
        self == Self::ROOT
    }

    /// Whether this is the unresolved-constant stub.
    pub fn is_stub(self) -> bool {
        self == Self::STUB
    }
}

/// The universal symbol handle: kind plus dense index.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, serde::Serialize)]
pub enum SymbolRef {
    /// A class or module.
    ClassOrModule(ClassOrModuleRef),
    /// A method.
    Method(MethodRef),
    /// A field or static field.
    Field(FieldRef),
    /// A type member or type parameter.
    TypeMember(TypeMemberRef),
}

impl SymbolRef {
    /// The class-or-module payload, if that is this symbol's kind.
    pub fn as_class_or_module(self) -> Option<ClassOrModuleRef> {
        match self {
            SymbolRef::ClassOrModule(sym) => Some(sym),
            _ => None,
        }
    }

    /// The method payload, if that is this symbol's kind.
    pub fn as_method(self) -> Option<MethodRef> {
        match self {
            SymbolRef::Method(sym) => Some(sym),
            _ => None,
        }
    }

    /// The field payload, if that is this symbol's kind.
    pub fn as_field(self) -> Option<FieldRef> {
        match self {
            SymbolRef::Field(sym) => Some(sym),
            _ => None,
        }
    }
}

impl From<ClassOrModuleRef> for SymbolRef {
    fn from(sym: ClassOrModuleRef) -> Self {
        SymbolRef::ClassOrModule(sym)
    }
}

impl From<MethodRef> for SymbolRef {
    fn from(sym: MethodRef) -> Self {
        SymbolRef::Method(sym)
    }
}

impl From<FieldRef> for SymbolRef {
    fn from(sym: FieldRef) -> Self {
        SymbolRef::Field(sym)
    }
}

impl From<TypeMemberRef> for SymbolRef {
    fn from(sym: TypeMemberRef) -> Self {
        SymbolRef::TypeMember(sym)
    }
}

/// Whether a class-like symbol is a class or a module.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, serde::Serialize)]
pub enum ClassKind {
    /// Declared with `class`.
    Class,
    /// Declared with `module`.
    Module,
    /// Created by a forward reference; settled when the definition is seen.
    Unknown,
}

/// A class or module declaration.
#[derive(Clone)]
pub struct ClassOrModuleData {
    /// The enclosing scope. The root owns itself.
    pub owner: ClassOrModuleRef,
    /// The constant name this symbol was declared under.
    pub name: NameRef,
    /// Class vs module.
    pub kind: ClassKind,
    /// The resolved superclass, classes only.
    pub superclass: Option<ClassOrModuleRef>,
    /// Resolved mixins, in inclusion order.
    pub mixins: Vec<ClassOrModuleRef>,
    /// Declared type parameters.
    pub type_params: Vec<TypeMemberRef>,
    /// Instance-level members, in declaration order.
    pub members: FxIndexMap<NameRef, SymbolRef>,
    /// Members on the singleton (self-methods), in declaration order.
    pub self_members: FxIndexMap<NameRef, SymbolRef>,
    /// Every definition site; the last-read file is primary.
    pub locs: SmallVec<[Loc; 1]>,
}

impl ClassOrModuleData {
    /// The primary definition site, or `Loc::NONE` for synthesized symbols.
    pub fn decl_loc(&self) -> Loc {
        self.locs.last().copied().unwrap_or(Loc::NONE)
    }
}

/// The kind of one declared method argument.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, serde::Serialize)]
pub enum ArgKind {
    /// A required positional argument.
    Positional,
    /// A positional argument with a default.
    Optional,
    /// A `*rest` argument.
    Rest,
    /// A keyword argument.
    Keyword,
    /// An `&block` argument.
    Block,
}

/// One declared method argument.
#[derive(Clone)]
pub struct ArgInfo {
    /// The argument name.
    pub name: NameRef,
    /// What kind of argument this is.
    pub kind: ArgKind,
    /// The declared type, `Ty::Untyped` without a signature.
    pub ty: Ty,
    /// Where the argument is declared.
    pub loc: Loc,
}

/// Method behavior flags.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct MethodFlags {
    /// Declared with `def self.name`.
    pub is_self_method: bool,
    /// Declared abstract in its signature.
    pub is_abstract: bool,
    /// Declared overridable in its signature.
    pub is_overridable: bool,
    /// Synthesized by a rewriter pass rather than written by the user.
    pub is_rewriter_synthesized: bool,
    /// Declared final in its signature.
    pub is_final: bool,
}

/// A method declaration.
#[derive(Clone)]
pub struct MethodData {
    /// The class or module the method is defined on.
    pub owner: ClassOrModuleRef,
    /// The method name.
    pub name: NameRef,
    /// Declared arguments, block argument last if present.
    pub arguments: Vec<ArgInfo>,
    /// The declared result type, `Ty::Untyped` without a signature.
    pub result_type: Ty,
    /// Behavior flags.
    pub flags: MethodFlags,
    /// Whether a signature was attached.
    pub has_sig: bool,
    /// Every definition site; methods reopened across files keep all of them.
    pub locs: SmallVec<[Loc; 1]>,
}

impl MethodData {
    /// The primary definition site.
    pub fn decl_loc(&self) -> Loc {
        self.locs.last().copied().unwrap_or(Loc::NONE)
    }

    /// The number of required positional arguments.
    pub fn required_arg_count(&self) -> usize {
        self.arguments
            .iter()
            .filter(|arg| arg.kind == ArgKind::Positional)
            .count()
    }

    /// Positional arguments (required and optional), in order.
    pub fn positional_args(&self) -> impl Iterator<Item = &ArgInfo> {
        self.arguments
            .iter()
            .filter(|arg| matches!(arg.kind, ArgKind::Positional | ArgKind::Optional))
    }

    /// Whether the method accepts a `*rest` argument.
    pub fn has_rest_arg(&self) -> bool {
        self.arguments.iter().any(|arg| arg.kind == ArgKind::Rest)
    }
}

/// A field or static-field declaration.
#[derive(Clone)]
pub struct FieldData {
    /// The owning class or module.
    pub owner: ClassOrModuleRef,
    /// The field name (`@x` for instance fields, the constant name for
    /// static fields).
    pub name: NameRef,
    /// The declared type, `Ty::Untyped` if undeclared.
    pub declared_type: Ty,
    /// Whether this is a static field (constant assignment).
    pub is_static: bool,
    /// Whether the field is visible outside its package.
    pub is_exported: bool,
    /// Definition sites.
    pub locs: SmallVec<[Loc; 1]>,
}

/// Variance of a type member.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, serde::Serialize)]
pub enum Variance {
    /// Invariant.
    Invariant,
    /// Covariant (`:out`).
    Covariant,
    /// Contravariant (`:in`).
    Contravariant,
}

/// A type member or type parameter declaration.
#[derive(Clone)]
pub struct TypeMemberData {
    /// The owning class or module.
    pub owner: ClassOrModuleRef,
    /// The member name.
    pub name: NameRef,
    /// Declared variance.
    pub variance: Variance,
    /// Upper bound, defaults to the top type.
    pub upper_bound: Ty,
    /// Lower bound, defaults to the bottom type.
    pub lower_bound: Ty,
    /// Definition sites.
    pub locs: SmallVec<[Loc; 1]>,
}

/// The symbol arenas. Append-only; the resolver may rewrite fields of
/// existing entries but entries are never removed.
#[derive(Clone, Default)]
pub struct SymbolTable {
    pub(crate) classes: Vec<ClassOrModuleData>,
    pub(crate) methods: Vec<MethodData>,
    pub(crate) fields: Vec<FieldData>,
    pub(crate) type_members: Vec<TypeMemberData>,
}

impl SymbolTable {
    /// The class data behind `sym`.
    pub fn class_data(&self, sym: ClassOrModuleRef) -> &ClassOrModuleData {
        &self.classes[sym.index() as usize]
    }

    pub(crate) fn class_data_mut(&mut self, sym: ClassOrModuleRef) -> &mut ClassOrModuleData {
        &mut self.classes[sym.index() as usize]
    }

    /// The method data behind `sym`.
    pub fn method_data(&self, sym: MethodRef) -> &MethodData {
        &self.methods[sym.index() as usize]
    }

    pub(crate) fn method_data_mut(&mut self, sym: MethodRef) -> &mut MethodData {
        &mut self.methods[sym.index() as usize]
    }

    /// The field data behind `sym`.
    pub fn field_data(&self, sym: FieldRef) -> &FieldData {
        &self.fields[sym.index() as usize]
    }

    pub(crate) fn field_data_mut(&mut self, sym: FieldRef) -> &mut FieldData {
        &mut self.fields[sym.index() as usize]
    }

    /// The type-member data behind `sym`.
    pub fn type_member_data(&self, sym: TypeMemberRef) -> &TypeMemberData {
        &self.type_members[sym.index() as usize]
    }

    /// The number of classes, methods, fields, and type members.
    pub fn counts(&self) -> (usize, usize, usize, usize) {
        (
            self.classes.len(),
            self.methods.len(),
            self.fields.len(),
            self.type_members.len(),
        )
    }

    /// All class refs, in creation order.
    pub fn class_refs(&self) -> impl Iterator<Item = ClassOrModuleRef> + use<> {
        (0..self.classes.len() as u32).map(ClassOrModuleRef::from_index)
    }

    /// All method refs, in creation order.
    pub fn method_refs(&self) -> impl Iterator<Item = MethodRef> + use<> {
        (0..self.methods.len() as u32).map(MethodRef::from_index)
    }

    /// Looks up `name` directly on `owner`, not consulting ancestors.
    pub fn find_member(&self, owner: ClassOrModuleRef, name: NameRef) -> Option<SymbolRef> {
        self.class_data(owner).members.get(&name).copied()
    }

    /// Looks up `name` on `owner`'s singleton, not consulting ancestors.
    pub fn find_self_member(&self, owner: ClassOrModuleRef, name: NameRef) -> Option<SymbolRef> {
        self.class_data(owner).self_members.get(&name).copied()
    }

    /// Looks up `name` on `owner` and its ancestors, nearest first.
    pub fn find_member_transitive(
        &self,
        owner: ClassOrModuleRef,
        name: NameRef,
    ) -> Option<SymbolRef> {
        let mut seen = FxHashSet::default();
        let mut worklist = vec![owner];
        while let Some(current) = worklist.pop() {
            if !seen.insert(current) {
                continue;
            }
            if let Some(found) = self.find_member(current, name) {
                return Some(found);
            }
            let data = self.class_data(current);
            // Mixins take precedence over the superclass, latest included
            // first, so push the superclass before the mixins.
            if let Some(superclass) = data.superclass {
                worklist.push(superclass);
            }
            worklist.extend(data.mixins.iter().rev().copied());
        }
        None
    }

    /// Looks up `name` on the singletons of `owner` and its ancestors,
    /// nearest first.
    pub fn find_self_member_transitive(
        &self,
        owner: ClassOrModuleRef,
        name: NameRef,
    ) -> Option<SymbolRef> {
        let mut seen = FxHashSet::default();
        let mut worklist = vec![owner];
        while let Some(current) = worklist.pop() {
            if !seen.insert(current) {
                continue;
            }
            if let Some(found) = self.find_self_member(current, name) {
                return Some(found);
            }
            let data = self.class_data(current);
            if let Some(superclass) = data.superclass {
                worklist.push(superclass);
            }
            worklist.extend(data.mixins.iter().rev().copied());
        }
        None
    }

    /// Whether `sub` is `ancestor` or derives from it through superclasses
    /// and mixins.
    pub fn derives_from(&self, sub: ClassOrModuleRef, ancestor: ClassOrModuleRef) -> bool {
        let mut seen = FxHashSet::default();
        let mut worklist = vec![sub];
        while let Some(current) = worklist.pop() {
            if current == ancestor {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            let data = self.class_data(current);
            if let Some(superclass) = data.superclass {
                worklist.push(superclass);
            }
            worklist.extend(data.mixins.iter().copied());
        }
        false
    }
}
