//! The Beryl syntax tree.
//!
//! One tagged-variant node type covers both the freshly parsed (sugared)
//! and the desugared shape of a program; desugaring removes the sugar-only
//! variants. Nodes own their children exclusively, so every duplication is
//! an explicit [`Expr::deep_copy`].

mod copy;
mod equality;
mod nodes;
mod printer;
mod treemap;

pub use copy::DeepCopyError;
pub use nodes::{
    CastKind, ClassDefKind, Expr, ExprKind, IdentKind, MethodDefFlags, ParsedFile, SendFlags, Tag,
};
pub use printer::to_source;
pub use treemap::{TreeMapper, TreeWalker, map_tree, visit_children, walk_tree};
