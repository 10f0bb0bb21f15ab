//! Node definitions.

use beryl_core::files::FileRef;
use beryl_core::loc::LocOffsets;
use beryl_core::names::NameRef;
use beryl_core::symbols::SymbolRef;
use beryl_core::types::LitKind;

/// One syntax tree node: a byte range plus a tagged payload.
#[derive(Debug)]
pub struct Expr {
    /// The source range the node covers.
    pub loc: LocOffsets,
    /// The payload.
    pub kind: ExprKind,
}

/// A tree paired with the file it was parsed from.
#[derive(Debug)]
pub struct ParsedFile {
    /// The tree.
    pub tree: Expr,
    /// The file the tree came from.
    pub file: FileRef,
    /// Whether the file had syntax errors; inference reads this to silence
    /// cascading diagnostics from recovered trees.
    pub silenced: bool,
}

/// Whether a definition introduces a class or a module.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ClassDefKind {
    /// `class A … end`
    Class,
    /// `module A … end`
    Module,
}

/// Flags on a method definition node.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct MethodDefFlags {
    /// Defined with `def self.name`.
    pub is_self_method: bool,
    /// Synthesized by a rewriter pass.
    pub is_rewriter_synthesized: bool,
}

/// Flags on a send node, compared by structural equality.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct SendFlags {
    /// The receiver was implicit, so private methods are callable.
    pub is_private_ok: bool,
}

/// What table an unresolved identifier will resolve against.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum IdentKind {
    /// A lexical local.
    Local,
    /// An instance field `@x`.
    Instance,
    /// A class field `@@x`.
    Class,
    /// A global `$x`.
    Global,
}

/// Which `T.` assertion a cast node came from.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CastKind {
    /// `T.let`: checked against the declared type.
    Let,
    /// `T.cast`: unchecked, narrows downstream.
    Cast,
    /// `T.unsafe`: the result is untyped.
    Unsafe,
    /// `T.absurd`: asserts the scrutinee is uninhabited.
    Absurd,
}

/// The node payload. Variants marked *sugar* are produced by the parser and
/// removed by desugaring.
#[derive(Debug, strum::EnumDiscriminants)]
#[strum_discriminants(name(Tag), derive(Hash, strum::IntoStaticStr))]
pub enum ExprKind {
    /// The absent subtree.
    EmptyTree,
    /// A class or module definition.
    ClassDef {
        /// Class vs module.
        declared_kind: ClassDefKind,
        /// The constant path being defined.
        name: Box<Expr>,
        /// The superclass expression, `EmptyTree` if none.
        superclass: Box<Expr>,
        /// The body, an `InsSeq` or `EmptyTree`.
        body: Box<Expr>,
    },
    /// A method definition.
    MethodDef {
        /// The method name.
        name: NameRef,
        /// Argument nodes, block argument last if present.
        args: Vec<Expr>,
        /// The body.
        body: Box<Expr>,
        /// The `sig` block body attached to this definition, `EmptyTree` if
        /// none.
        sig: Box<Expr>,
        /// Definition flags.
        flags: MethodDefFlags,
    },
    /// A conditional. Desugared conditionals always carry both branches.
    If {
        /// The condition.
        cond: Box<Expr>,
        /// The then branch.
        then_branch: Box<Expr>,
        /// The else branch, `EmptyTree` after desugaring a missing else.
        else_branch: Box<Expr>,
    },
    /// A `while` or `until` loop (the latter desugars to a negated
    /// condition).
    While {
        /// The condition.
        cond: Box<Expr>,
        /// The body.
        body: Box<Expr>,
    },
    /// *sugar* — `for x in e … end`; desugars to `e.each { |x| … }`.
    For {
        /// The loop variable.
        var: Box<Expr>,
        /// The iterated expression.
        iterable: Box<Expr>,
        /// The body.
        body: Box<Expr>,
    },
    /// `break`, with its value.
    Break {
        /// The value, `EmptyTree` for a bare break.
        expr: Box<Expr>,
    },
    /// `next`, with its value.
    Next {
        /// The value, `EmptyTree` for a bare next.
        expr: Box<Expr>,
    },
    /// `return`, with its value.
    Return {
        /// The value, `EmptyTree` for a bare return.
        expr: Box<Expr>,
    },
    /// A `begin … rescue … end` region.
    Rescue {
        /// The protected body.
        body: Box<Expr>,
        /// The rescue clauses, each a [`ExprKind::RescueCase`].
        cases: Vec<Expr>,
        /// The else branch run on normal exit, `EmptyTree` if none.
        else_branch: Box<Expr>,
        /// The ensure block, `EmptyTree` if none.
        ensure: Box<Expr>,
    },
    /// One `rescue` clause.
    RescueCase {
        /// The matched exception class expressions.
        exceptions: Vec<Expr>,
        /// The binding variable, `EmptyTree` if none. Scoped to the clause.
        var: Box<Expr>,
        /// The handler body.
        body: Box<Expr>,
    },
    /// An assignment to a local, field, or constant.
    Assign {
        /// The target.
        lhs: Box<Expr>,
        /// The value.
        rhs: Box<Expr>,
    },
    /// *sugar* — `a op= b`.
    OpAssign {
        /// The target.
        lhs: Box<Expr>,
        /// The operator method name.
        op: NameRef,
        /// The value.
        rhs: Box<Expr>,
    },
    /// *sugar* — `a, b = e`.
    MultiAssign {
        /// The targets.
        lhs: Vec<Expr>,
        /// The value.
        rhs: Box<Expr>,
    },
    /// A method call.
    Send {
        /// The receiver; `EmptyTree` means an implicit `self`.
        recv: Box<Expr>,
        /// The callee name.
        method: NameRef,
        /// Call flags.
        flags: SendFlags,
        /// How many leading entries of `args` are positional.
        num_pos_args: u16,
        /// Positional arguments, then keyword pairs, then an optional
        /// [`ExprKind::Block`] last.
        args: Vec<Expr>,
    },
    /// A block literal, always the last argument of its send.
    Block {
        /// The block parameters.
        args: Vec<Expr>,
        /// The block body.
        body: Box<Expr>,
    },
    /// A hash literal.
    Hash {
        /// Keys, parallel to `values`.
        keys: Vec<Expr>,
        /// Values, parallel to `keys`.
        values: Vec<Expr>,
    },
    /// An array literal.
    Array {
        /// The elements.
        elems: Vec<Expr>,
    },
    /// A literal value.
    Literal {
        /// The literal kind and value.
        value: LitKind,
    },
    /// *sugar* — a string literal with `#{…}` interpolation.
    DString {
        /// Alternating literal and interpolated parts.
        parts: Vec<Expr>,
    },
    /// A constant reference not yet resolved to a symbol.
    UnresolvedConstant {
        /// The scope expression: `EmptyTree` for a relative reference,
        /// a constant for `A::B`, or [`ExprKind::ConstantRoot`] for `::A`.
        scope: Box<Expr>,
        /// The constant name.
        name: NameRef,
    },
    /// The `::` root anchor of an absolute constant path.
    ConstantRoot,
    /// A constant reference resolved to a symbol.
    ConstantLit {
        /// The referenced symbol; the stub class when resolution failed.
        symbol: SymbolRef,
    },
    /// A statement sequence whose value is the final expression.
    InsSeq {
        /// The leading statements.
        stats: Vec<Expr>,
        /// The value expression.
        expr: Box<Expr>,
    },
    /// A lexical local with its disambiguating version.
    Local {
        /// The base name.
        name: NameRef,
        /// The version assigned by local-variable numbering.
        unique: u32,
    },
    /// An identifier not yet bound by local-variable numbering.
    UnresolvedIdent {
        /// The identifier name.
        name: NameRef,
        /// The identifier's table.
        kind: IdentKind,
    },
    /// `self`.
    SelfExpr,
    /// A `*rest` parameter.
    RestArg {
        /// The wrapped parameter name node.
        name: Box<Expr>,
    },
    /// A `key:` or `key: default` parameter.
    KeywordArg {
        /// The wrapped parameter name node.
        name: Box<Expr>,
        /// The default value, `EmptyTree` if required.
        default: Box<Expr>,
    },
    /// A `arg = default` parameter.
    OptionalArg {
        /// The wrapped parameter name node.
        name: Box<Expr>,
        /// The default value.
        default: Box<Expr>,
    },
    /// An `&block` parameter.
    BlockArg {
        /// The wrapped parameter name node.
        name: Box<Expr>,
    },
    /// A `;x` block-local shadowing parameter.
    ShadowArg {
        /// The wrapped parameter name node.
        name: Box<Expr>,
    },
    /// A `T.let`/`T.cast`/`T.unsafe`/`T.absurd` assertion.
    Cast {
        /// Which assertion.
        cast_kind: CastKind,
        /// The checked expression.
        arg: Box<Expr>,
        /// The asserted type, as a type expression; `EmptyTree` for
        /// `T.unsafe`/`T.absurd`.
        type_expr: Box<Expr>,
    },
    /// `super` forwarding the enclosing method's arguments.
    ZSuperArgs,
    /// The runtime residue of a nested method definition: evaluates to the
    /// method-name symbol.
    RuntimeMethodDefinition {
        /// The defined method's name.
        name: NameRef,
        /// Whether it was a self-method definition.
        is_self: bool,
    },
}

impl Expr {
    /// Creates a node.
    pub fn new(loc: LocOffsets, kind: ExprKind) -> Expr {
        Expr { loc, kind }
    }

    /// Creates the absent subtree at `loc`.
    pub fn empty(loc: LocOffsets) -> Expr {
        Expr::new(loc, ExprKind::EmptyTree)
    }

    /// The node's tag.
    pub fn tag(&self) -> Tag {
        Tag::from(&self.kind)
    }

    /// Whether this is the absent subtree.
    pub fn is_empty_tree(&self) -> bool {
        matches!(self.kind, ExprKind::EmptyTree)
    }

    /// Replaces this node with `EmptyTree`, returning the old node.
    pub fn take(&mut self) -> Expr {
        std::mem::replace(self, Expr::empty(self.loc))
    }
}
