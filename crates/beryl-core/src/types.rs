//! The type representation.
//!
//! Types are immutable and structurally shared through the global interner;
//! composite types always intern a canonically sorted part list, so
//! structural equality degrades to pointer equality. Subtyping is nominal on
//! class types with union/intersection normalization on top.

use ecow::{EcoString, eco_format};

use crate::global_state::{GlobalState, well_known};
use crate::hash::hash64;
use crate::impl_internable;
use crate::interner::Interned;
use crate::names::NameRef;
use crate::symbols::{ClassOrModuleRef, SymbolTable, TypeMemberRef};

/// A Beryl type.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Ty {
    /// The dynamic type: both a top and a bottom for subtyping.
    Untyped,
    /// The top type (`BasicObject` in spirit, but above every type).
    Top,
    /// The uninhabited bottom type.
    Bottom,
    /// The type of `self`, resolved at use sites.
    SelfType,
    /// A nominal class or module type.
    Class(ClassOrModuleRef),
    /// A generic class applied to type arguments.
    Applied(Interned<AppliedTy>),
    /// A union `A | B`.
    Union(Interned<UnionTy>),
    /// An intersection `A & B`.
    Intersection(Interned<IntersectionTy>),
    /// A literal singleton type.
    Literal(Interned<LitTy>),
    /// A reference to a type member or type parameter.
    TypeVar(TypeMemberRef),
}

/// A generic class applied to arguments.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct AppliedTy {
    /// The generic class.
    pub class: ClassOrModuleRef,
    /// The type arguments, in declaration order.
    pub args: Vec<Ty>,
}

/// The parts of a union, canonically sorted.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct UnionTy {
    /// At least two parts, none of them unions.
    pub parts: Vec<Ty>,
}

/// The parts of an intersection, canonically sorted.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct IntersectionTy {
    /// At least two parts, none of them intersections.
    pub parts: Vec<Ty>,
}

/// The value of a literal singleton type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum LitKind {
    /// An integer literal.
    Int(i64),
    /// A float literal, stored as its bit pattern.
    Float(u64),
    /// The `true` literal.
    True,
    /// The `false` literal.
    False,
    /// A string literal, by interned name.
    Str(NameRef),
    /// A symbol literal, by interned name.
    Sym(NameRef),
    /// The `nil` literal.
    Nil,
}

/// A literal singleton type.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct LitTy {
    /// The literal value.
    pub kind: LitKind,
}

impl LitTy {
    /// The class this literal belongs to.
    pub fn underlying(&self) -> ClassOrModuleRef {
        match self.kind {
            LitKind::Int(_) => well_known::INTEGER,
            LitKind::Float(_) => well_known::FLOAT,
            LitKind::True => well_known::TRUE_CLASS,
            LitKind::False => well_known::FALSE_CLASS,
            LitKind::Str(_) => well_known::STRING,
            LitKind::Sym(_) => well_known::SYMBOL,
            LitKind::Nil => well_known::NIL_CLASS,
        }
    }
}

impl_internable!(AppliedTy, UnionTy, IntersectionTy, LitTy);

impl Ty {
    /// The `NilClass` type.
    pub fn nil() -> Ty {
        Ty::Class(well_known::NIL_CLASS)
    }

    /// The `TrueClass | FalseClass` union.
    pub fn boolean() -> Ty {
        Ty::Union(Interned::new(UnionTy {
            parts: canonical_sort(vec![
                Ty::Class(well_known::TRUE_CLASS),
                Ty::Class(well_known::FALSE_CLASS),
            ]),
        }))
    }

    /// A literal singleton type.
    pub fn literal(kind: LitKind) -> Ty {
        Ty::Literal(Interned::new(LitTy { kind }))
    }

    /// A generic class applied to arguments.
    pub fn applied(class: ClassOrModuleRef, args: Vec<Ty>) -> Ty {
        if args.is_empty() {
            return Ty::Class(class);
        }
        Ty::Applied(Interned::new(AppliedTy { class, args }))
    }

    /// Builds the normalized union of `parts`.
    ///
    /// Nested unions are flattened; `untyped` absorbs everything; parts
    /// subsumed by another part are dropped; the result is canonically
    /// sorted so equal unions intern to the same object.
    pub fn union_of(parts: impl IntoIterator<Item = Ty>, table: &SymbolTable) -> Ty {
        let mut flat = Vec::new();
        for part in parts {
            match part {
                Ty::Union(inner) => flat.extend(inner.parts.iter().cloned()),
                Ty::Untyped => return Ty::Untyped,
                Ty::Top => return Ty::Top,
                Ty::Bottom => {}
                other => flat.push(other),
            }
        }
        flat = drop_subsumed(flat, table, /* keep_supertypes */ true);
        match flat.len() {
            0 => Ty::Bottom,
            1 => flat.pop().unwrap(),
            _ => Ty::Union(Interned::new(UnionTy {
                parts: canonical_sort(flat),
            })),
        }
    }

    /// Builds the normalized intersection of `parts`.
    pub fn intersection_of(parts: impl IntoIterator<Item = Ty>, table: &SymbolTable) -> Ty {
        let mut flat = Vec::new();
        for part in parts {
            match part {
                Ty::Intersection(inner) => flat.extend(inner.parts.iter().cloned()),
                Ty::Untyped => return Ty::Untyped,
                Ty::Bottom => return Ty::Bottom,
                Ty::Top => {}
                other => flat.push(other),
            }
        }
        flat = drop_subsumed(flat, table, /* keep_supertypes */ false);
        match flat.len() {
            0 => Ty::Top,
            1 => flat.pop().unwrap(),
            _ => Ty::Intersection(Interned::new(IntersectionTy {
                parts: canonical_sort(flat),
            })),
        }
    }

    /// Whether `self` is a subtype of `other`.
    pub fn is_subtype_of(&self, other: &Ty, table: &SymbolTable) -> bool {
        match (self, other) {
            // Gradual typing: untyped is compatible in both directions.
            (Ty::Untyped, _) | (_, Ty::Untyped) => true,
            (_, Ty::Top) => true,
            (Ty::Bottom, _) => true,
            (Ty::Union(parts), _) => parts
                .parts
                .iter()
                .all(|part| part.is_subtype_of(other, table)),
            (_, Ty::Union(parts)) => parts
                .parts
                .iter()
                .any(|part| self.is_subtype_of(part, table)),
            (Ty::Intersection(parts), _) => parts
                .parts
                .iter()
                .any(|part| part.is_subtype_of(other, table)),
            (_, Ty::Intersection(parts)) => parts
                .parts
                .iter()
                .all(|part| self.is_subtype_of(part, table)),
            (Ty::Literal(lhs), Ty::Literal(rhs)) => lhs == rhs,
            (Ty::Literal(lit), _) => Ty::Class(lit.underlying()).is_subtype_of(other, table),
            (Ty::Class(sub), Ty::Class(sup)) => table.derives_from(*sub, *sup),
            (Ty::Applied(lhs), Ty::Applied(rhs)) => {
                // Type arguments are compared invariantly.
                lhs.class == rhs.class && lhs.args == rhs.args
            }
            (Ty::Applied(lhs), Ty::Class(sup)) => table.derives_from(lhs.class, *sup),
            (Ty::SelfType, Ty::SelfType) => true,
            (Ty::TypeVar(lhs), Ty::TypeVar(rhs)) => lhs == rhs,
            (Ty::TypeVar(var), _) => table
                .type_member_data(*var)
                .upper_bound
                .is_subtype_of(other, table),
            _ => false,
        }
    }

    /// The least upper bound of `self` and `other`.
    pub fn lub(&self, other: &Ty, table: &SymbolTable) -> Ty {
        if self.is_subtype_of(other, table) {
            return other.clone();
        }
        if other.is_subtype_of(self, table) {
            return self.clone();
        }
        Ty::union_of([self.clone(), other.clone()], table)
    }

    /// The greatest lower bound of `self` and `other`.
    pub fn glb(&self, other: &Ty, table: &SymbolTable) -> Ty {
        if self.is_subtype_of(other, table) {
            return self.clone();
        }
        if other.is_subtype_of(self, table) {
            return other.clone();
        }
        Ty::intersection_of([self.clone(), other.clone()], table)
    }

    /// Drops literal singletons in favor of their underlying classes.
    pub fn widened(&self, table: &SymbolTable) -> Ty {
        match self {
            Ty::Literal(lit) => Ty::Class(lit.underlying()),
            Ty::Union(parts) => {
                Ty::union_of(parts.parts.iter().map(|part| part.widened(table)), table)
            }
            other => other.clone(),
        }
    }

    /// Whether the type is `NilClass` or a union containing it.
    pub fn is_nilable(&self, table: &SymbolTable) -> bool {
        Ty::nil().is_subtype_of(self, table)
    }

    /// The type with `NilClass` components removed, for narrowing.
    pub fn without_nil(&self, table: &SymbolTable) -> Ty {
        match self {
            Ty::Class(sym) if *sym == well_known::NIL_CLASS => Ty::Bottom,
            Ty::Union(parts) => Ty::union_of(
                parts
                    .parts
                    .iter()
                    .filter(|part| !matches!(part, Ty::Class(sym) if *sym == well_known::NIL_CLASS))
                    .cloned(),
                table,
            ),
            other => other.clone(),
        }
    }

    /// Renders the type for diagnostics.
    pub fn show(&self, gs: &GlobalState) -> EcoString {
        match self {
            Ty::Untyped => "T.untyped".into(),
            Ty::Top => "T.anything".into(),
            Ty::Bottom => "T.noreturn".into(),
            Ty::SelfType => "T.self_type".into(),
            Ty::Class(sym) => gs.show_class(*sym),
            Ty::Applied(applied) => {
                let args = applied
                    .args
                    .iter()
                    .map(|arg| arg.show(gs))
                    .collect::<Vec<_>>()
                    .join(", ");
                eco_format!("{}[{args}]", gs.show_class(applied.class))
            }
            Ty::Union(parts) => {
                // Nilable unions render in their sugared form.
                let nil = Ty::nil();
                if parts.parts.contains(&nil) && parts.parts.len() > 1 {
                    let rest = Ty::union_of(
                        parts.parts.iter().filter(|p| **p != nil).cloned(),
                        gs.symbols(),
                    );
                    return eco_format!("T.nilable({})", rest.show(gs));
                }
                let shown = parts
                    .parts
                    .iter()
                    .map(|part| part.show(gs))
                    .collect::<Vec<_>>()
                    .join(", ");
                eco_format!("T.any({shown})")
            }
            Ty::Intersection(parts) => {
                let shown = parts
                    .parts
                    .iter()
                    .map(|part| part.show(gs))
                    .collect::<Vec<_>>()
                    .join(", ");
                eco_format!("T.all({shown})")
            }
            Ty::Literal(lit) => match lit.kind {
                LitKind::Int(value) => eco_format!("Integer({value})"),
                LitKind::Float(bits) => eco_format!("Float({})", f64::from_bits(bits)),
                LitKind::True => "TrueClass".into(),
                LitKind::False => "FalseClass".into(),
                LitKind::Str(name) => eco_format!("String(\"{}\")", gs.show_name(name)),
                LitKind::Sym(name) => eco_format!("Symbol(:{})", gs.show_name(name)),
                LitKind::Nil => "NilClass".into(),
            },
            Ty::TypeVar(var) => gs.show_name(gs.symbols().type_member_data(*var).name),
        }
    }
}

/// Removes parts subsumed by another part. With `keep_supertypes` the wider
/// part wins (union normalization); otherwise the narrower part wins.
fn drop_subsumed(parts: Vec<Ty>, table: &SymbolTable, keep_supertypes: bool) -> Vec<Ty> {
    let mut kept: Vec<Ty> = Vec::with_capacity(parts.len());
    'next: for part in parts {
        let mut idx = 0;
        while idx < kept.len() {
            let existing = kept[idx].clone();
            let part_redundant = if keep_supertypes {
                part.is_subtype_of(&existing, table)
            } else {
                existing.is_subtype_of(&part, table)
            };
            if part_redundant {
                continue 'next;
            }
            let existing_redundant = if keep_supertypes {
                existing.is_subtype_of(&part, table)
            } else {
                part.is_subtype_of(&existing, table)
            };
            if existing_redundant {
                kept.remove(idx);
                continue;
            }
            idx += 1;
        }
        kept.push(part);
    }
    kept
}

/// Sorts parts into the canonical order used for interning.
fn canonical_sort(mut parts: Vec<Ty>) -> Vec<Ty> {
    parts.sort_by_key(sort_key);
    parts.dedup();
    parts
}

fn sort_key(ty: &Ty) -> (u8, u64) {
    match ty {
        Ty::Untyped => (0, 0),
        Ty::Top => (1, 0),
        Ty::Bottom => (2, 0),
        Ty::SelfType => (3, 0),
        Ty::Class(sym) => (4, sym.index() as u64),
        Ty::Applied(applied) => (5, hash64(&**applied)),
        Ty::Literal(lit) => (6, hash64(&**lit)),
        Ty::TypeVar(var) => (7, var.index() as u64),
        Ty::Union(parts) => (8, hash64(&**parts)),
        Ty::Intersection(parts) => (9, hash64(&**parts)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::global_state::GlobalState;

    #[test]
    fn union_order_is_canonical() {
        let gs = GlobalState::new();
        let a = Ty::Class(well_known::INTEGER);
        let b = Ty::Class(well_known::STRING);
        let left = Ty::union_of([a.clone(), b.clone()], gs.symbols());
        let right = Ty::union_of([b, a], gs.symbols());
        assert_eq!(left, right);
    }

    #[test]
    fn union_collapses_subsumed_parts() {
        let gs = GlobalState::new();
        let int = Ty::Class(well_known::INTEGER);
        let lit = Ty::literal(LitKind::Int(3));
        assert_eq!(Ty::union_of([int.clone(), lit], gs.symbols()), int);
    }

    #[test]
    fn untyped_absorbs_unions() {
        let gs = GlobalState::new();
        let int = Ty::Class(well_known::INTEGER);
        assert_eq!(Ty::union_of([int, Ty::Untyped], gs.symbols()), Ty::Untyped);
    }

    #[test]
    fn literal_is_subtype_of_its_class() {
        let gs = GlobalState::new();
        let lit = Ty::literal(LitKind::Int(3));
        let int = Ty::Class(well_known::INTEGER);
        let num = Ty::Class(well_known::NUMERIC);
        assert!(lit.is_subtype_of(&int, gs.symbols()));
        assert!(lit.is_subtype_of(&num, gs.symbols()));
        assert!(!int.is_subtype_of(&lit, gs.symbols()));
    }

    #[test]
    fn nilable_narrows_back_out() {
        let gs = GlobalState::new();
        let int = Ty::Class(well_known::INTEGER);
        let nilable = Ty::union_of([int.clone(), Ty::nil()], gs.symbols());
        assert!(nilable.is_nilable(gs.symbols()));
        assert_eq!(nilable.without_nil(gs.symbols()), int);
    }

    #[test]
    fn rendering_uses_the_type_syntax_surface() {
        let gs = GlobalState::new();
        let nilable_int = Ty::union_of([Ty::Class(well_known::INTEGER), Ty::nil()], gs.symbols());
        insta::assert_snapshot!(nilable_int.show(&gs), @"T.nilable(Integer)");
        let int_or_str = Ty::union_of(
            [Ty::Class(well_known::INTEGER), Ty::Class(well_known::STRING)],
            gs.symbols(),
        );
        insta::assert_snapshot!(int_or_str.show(&gs), @"T.any(Integer, String)");
        insta::assert_snapshot!(Ty::Untyped.show(&gs), @"T.untyped");
    }

    #[test]
    fn boolean_is_the_two_singleton_union() {
        let gs = GlobalState::new();
        let boolean = Ty::boolean();
        assert!(Ty::Class(well_known::TRUE_CLASS).is_subtype_of(&boolean, gs.symbols()));
        assert!(Ty::Class(well_known::FALSE_CLASS).is_subtype_of(&boolean, gs.symbols()));
        assert!(!Ty::nil().is_subtype_of(&boolean, gs.symbols()));
    }
}
