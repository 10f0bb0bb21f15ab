//! Pass orchestration.
//!
//! Lowers files through the pipeline — parse → desugar → rewriter → local
//! vars (*indexing*), then namer → resolver (*slow path only*), then
//! per-method CFG lowering and inference (*typechecking*) — with
//! cooperative cancellation checkpoints between phases and between
//! per-file units.

pub mod desugar;
pub mod hashing;
pub mod local_vars;
mod typecheck;

use beryl_ast::{Expr, ParsedFile};
use beryl_core::files::{FileRef, StrictLevel};
use beryl_core::loc::{Loc, LocOffsets};
use beryl_core::{Diagnostic, DiagnosticCode, GlobalState};

pub use hashing::{FileHash, hash_file};
pub use typecheck::{run_typecheck, typecheck_one};

/// A slow path observed a cancellation request at a checkpoint and gave
/// up. Not an error: the caller discards its state copy and the prior
/// committed state stays visible.
#[derive(Debug, PartialEq, Eq)]
pub struct Cancelled;

pub(crate) fn checkpoint(gs: &GlobalState, cancellable: bool) -> Result<(), Cancelled> {
    if cancellable && gs.epochs.cancellation_requested() {
        log::debug!("pipeline observed cancellation at a checkpoint");
        return Err(Cancelled);
    }
    Ok(())
}

/// Indexes one file: parse, desugar, rewrite, number locals. Requires an
/// unfrozen name table.
pub fn index_one(gs: &mut GlobalState, fref: FileRef) -> ParsedFile {
    let file = gs.file(fref).clone();
    index_source(gs, fref, &file)
}

/// Indexes `source` as if it were the content of `fref`, without touching
/// the stored file. The typechecker uses this to hash an edit before
/// deciding whether to commit it to the current state or a copy.
pub fn index_source(gs: &mut GlobalState, fref: FileRef, file: &beryl_core::File) -> ParsedFile {
    if file.strict_level == StrictLevel::Ignore {
        return ParsedFile {
            tree: Expr::empty(LocOffsets::NONE),
            file: fref,
            silenced: true,
        };
    }
    let result = beryl_parser::parse(gs, &file.source);
    let silenced = !result.errors.is_empty();
    for error in result.errors {
        gs.errors.push_diagnostic(Diagnostic::new(
            DiagnosticCode::ParseSyntax,
            Loc::new(fref, error.loc),
            error.message,
        ));
    }
    let tree = desugar::run(gs, result.tree);
    let tree = beryl_resolve::run_rewriter(gs, tree);
    let tree = local_vars::run(tree);
    ParsedFile {
        tree,
        file: fref,
        silenced,
    }
}

/// Indexes a set of files, yielding at a checkpoint between each.
pub fn index(
    gs: &mut GlobalState,
    frefs: &[FileRef],
    cancellable: bool,
) -> Result<Vec<ParsedFile>, Cancelled> {
    let mut indexed = Vec::with_capacity(frefs.len());
    for &fref in frefs {
        checkpoint(gs, cancellable)?;
        indexed.push(index_one(gs, fref));
    }
    Ok(indexed)
}

/// Runs the namer and resolver over freshly indexed trees. Slow path only:
/// this is the sole producer of new symbols.
pub fn name_and_resolve(
    gs: &mut GlobalState,
    files: Vec<ParsedFile>,
    cancellable: bool,
) -> Result<Vec<ParsedFile>, Cancelled> {
    checkpoint(gs, cancellable)?;
    {
        let mut unfrozen = gs.unfreeze_for_namer();
        beryl_resolve::run_namer(&mut unfrozen, &files);
    }
    checkpoint(gs, cancellable)?;
    let files = {
        let mut unfrozen = gs.unfreeze_symbol_table();
        beryl_resolve::run_resolver(&mut unfrozen, files)
    };
    checkpoint(gs, cancellable)?;
    Ok(files)
}

/// Re-resolves constants within changed files against an unchanged symbol
/// table; the fast path's stand-in for the resolver.
pub fn incremental_resolve(
    gs: &mut GlobalState,
    files: Vec<ParsedFile>,
    cancellable: bool,
) -> Result<Vec<ParsedFile>, Cancelled> {
    checkpoint(gs, cancellable)?;
    Ok(beryl_resolve::run_incremental_resolver(gs, files))
}
