//! Core data model for the Beryl type checker.
//!
//! Everything in this crate is owned, directly or transitively, by a
//! [`GlobalState`]: interned names, the symbol table, the file table, the
//! diagnostic queue, and the epoch bookkeeping that drives incremental
//! typechecking. Passes receive a `GlobalState` (or a context wrapping one)
//! as an explicit value; there is no ambient global.

pub mod diag;
pub mod epochs;
pub mod files;
pub mod global_state;
pub mod hash;
pub mod interner;
pub mod loc;
pub mod names;
pub mod query;
pub mod symbols;
pub mod types;

pub use diag::{Autocorrect, AutocorrectEdit, Diagnostic, DiagnosticCode, ErrorQueue, Severity};
pub use epochs::EpochManager;
pub use files::{File, FileRef, FileType, StrictLevel};
pub use global_state::{GlobalState, Unfreeze, WellKnownNames, well_known};
pub use interner::Interned;
pub use loc::{Loc, LocOffsets};
pub use names::{NameData, NameRef, UniqueNameKind};
pub use query::{Query, QueryResponse};
pub use symbols::{
    ArgInfo, ArgKind, ClassKind, ClassOrModuleData, ClassOrModuleRef, FieldData, FieldRef,
    MethodData, MethodFlags, MethodRef, SymbolRef, TypeMemberData, TypeMemberRef, Variance,
};
pub use types::Ty;
