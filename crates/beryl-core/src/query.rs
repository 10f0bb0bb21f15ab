//! The read-only query model.
//!
//! An editor query (hover, definition, …) attaches a [`Query`] to the
//! `GlobalState`, reruns inference over the relevant files, and collects the
//! [`QueryResponse`]s that matched. Queries must not mutate persistent state.

use crate::files::FileRef;
use crate::loc::Loc;
use crate::names::NameRef;
use crate::symbols::{FieldRef, MethodRef, SymbolRef};
use crate::types::Ty;

/// What an in-flight typecheck run should report responses for.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Query {
    /// No query attached; responses are suppressed.
    #[default]
    None,
    /// Matches nodes whose location covers `offset` in `file`.
    AtOffset {
        /// The queried file.
        file: FileRef,
        /// The queried byte offset.
        offset: u32,
    },
    /// Matches every use of the given symbol.
    ForSymbol(SymbolRef),
}

impl Query {
    /// Whether no query is attached.
    pub fn is_none(&self) -> bool {
        matches!(self, Query::None)
    }

    /// Whether a node spanning `loc` should respond to this query.
    pub fn matches_loc(&self, loc: Loc) -> bool {
        match self {
            Query::None | Query::ForSymbol(_) => false,
            Query::AtOffset { file, offset } => {
                loc.exists()
                    && loc.file == *file
                    && loc.offsets.begin <= *offset
                    && *offset <= loc.offsets.end
            }
        }
    }

    /// Whether a use of `sym` should respond to this query.
    pub fn matches_symbol(&self, sym: SymbolRef) -> bool {
        matches!(self, Query::ForSymbol(wanted) if *wanted == sym)
    }
}

/// One match produced by inference while a query was attached.
#[derive(Clone, Debug)]
pub enum QueryResponse {
    /// A method call.
    Send {
        /// The call's range.
        loc: Loc,
        /// The resolved method.
        method: MethodRef,
        /// The receiver's inferred type.
        receiver_ty: Ty,
        /// The call's inferred result type.
        return_ty: Ty,
    },
    /// A read or write of a local.
    Ident {
        /// The identifier's range.
        loc: Loc,
        /// The local's name.
        name: NameRef,
        /// The local's inferred type at this point.
        ty: Ty,
    },
    /// A resolved constant reference.
    Constant {
        /// The reference's range.
        loc: Loc,
        /// The symbol the constant resolved to.
        symbol: SymbolRef,
        /// The constant's type.
        ty: Ty,
    },
    /// A method definition site.
    MethodDef {
        /// The definition's range.
        loc: Loc,
        /// The defined method.
        method: MethodRef,
    },
    /// A field read or write.
    Field {
        /// The reference's range.
        loc: Loc,
        /// The field symbol.
        field: FieldRef,
        /// The field's type.
        ty: Ty,
    },
    /// A literal expression.
    Literal {
        /// The literal's range.
        loc: Loc,
        /// The literal's type.
        ty: Ty,
    },
}

impl QueryResponse {
    /// The range the response anchors to.
    pub fn loc(&self) -> Loc {
        match self {
            QueryResponse::Send { loc, .. }
            | QueryResponse::Ident { loc, .. }
            | QueryResponse::Constant { loc, .. }
            | QueryResponse::MethodDef { loc, .. }
            | QueryResponse::Field { loc, .. }
            | QueryResponse::Literal { loc, .. } => *loc,
        }
    }

    /// The inferred type carried by the response, if any.
    pub fn ty(&self) -> Option<&Ty> {
        match self {
            QueryResponse::Send { return_ty, .. } => Some(return_ty),
            QueryResponse::Ident { ty, .. }
            | QueryResponse::Constant { ty, .. }
            | QueryResponse::Field { ty, .. }
            | QueryResponse::Literal { ty, .. } => Some(ty),
            QueryResponse::MethodDef { .. } => None,
        }
    }
}
