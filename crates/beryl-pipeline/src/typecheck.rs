//! The typechecking phase: per-method CFG lowering and inference, data-
//! parallel over files.

use std::sync::atomic::{AtomicBool, Ordering};

use beryl_ast::{Expr, ExprKind, ParsedFile, TreeMapper, map_tree};
use beryl_cfg::MethodSource;
use beryl_core::files::{FileRef, StrictLevel};
use beryl_core::loc::Loc;
use beryl_core::symbols::{ClassOrModuleRef, MethodRef, SymbolRef};
use beryl_core::{GlobalState, QueryResponse};
use beryl_infer::InferContext;
use rayon::prelude::*;

use crate::{Cancelled, checkpoint};

/// Typechecks `files` in parallel, returning the refs actually checked.
/// Workers observe cancellation between per-file units.
pub fn run_typecheck(
    gs: &GlobalState,
    files: &[&ParsedFile],
    cancellable: bool,
) -> Result<Vec<FileRef>, Cancelled> {
    checkpoint(gs, cancellable)?;
    let cancelled = AtomicBool::new(false);
    files.par_iter().for_each(|file| {
        if cancelled.load(Ordering::Relaxed) {
            return;
        }
        if checkpoint(gs, cancellable).is_err() {
            cancelled.store(true, Ordering::Relaxed);
            return;
        }
        typecheck_one(gs, file);
    });
    if cancelled.load(Ordering::Relaxed) {
        return Err(Cancelled);
    }
    Ok(files.iter().map(|file| file.file).collect())
}

/// Typechecks one resolved file: every method body gets a CFG and an
/// inference run. Files below `# typed: true` (and files with syntax
/// errors) only get the resolution diagnostics already queued.
pub fn typecheck_one(gs: &GlobalState, parsed: &ParsedFile) {
    if !gs.lsp_query.is_none() {
        // Constant references live in class bodies as much as method
        // bodies, so query matches on them come from the tree rather than
        // the CFG, and regardless of strictness.
        respond_constants(gs, parsed);
    }
    let strict_level = gs.file(parsed.file).strict_level;
    if strict_level < StrictLevel::True || parsed.silenced {
        return;
    }
    let mut collector = MethodCollector {
        gs,
        file: parsed.file,
        owners: vec![ClassOrModuleRef::ROOT],
        methods: Vec::new(),
    };
    collector.walk(&parsed.tree);
    for collected in collector.methods {
        let body = flatten_nested_defs(collected.body);
        let src = MethodSource {
            file: parsed.file,
            owner: collected.owner,
            method: collected.method,
            args: collected.args,
            body: &body,
        };
        let cfg = beryl_cfg::build(gs, &src);
        let ctx = InferContext {
            file: parsed.file,
            owner: collected.owner,
            method: collected.method,
        };
        beryl_infer::run(gs, &ctx, &cfg);
    }
}

struct CollectedMethod<'tree> {
    owner: ClassOrModuleRef,
    method: Option<MethodRef>,
    args: &'tree [Expr],
    body: &'tree Expr,
}

struct MethodCollector<'tree, 'gs> {
    gs: &'gs GlobalState,
    file: FileRef,
    owners: Vec<ClassOrModuleRef>,
    methods: Vec<CollectedMethod<'tree>>,
}

impl<'tree> MethodCollector<'tree, '_> {
    fn owner(&self) -> ClassOrModuleRef {
        *self.owners.last().unwrap()
    }

    fn walk(&mut self, expr: &'tree Expr) {
        match &expr.kind {
            ExprKind::ClassDef { name, body, .. } => {
                let sym = match &name.kind {
                    ExprKind::ConstantLit { symbol } => symbol.as_class_or_module(),
                    _ => None,
                };
                self.owners.push(sym.unwrap_or(ClassOrModuleRef::ROOT));
                self.walk(body);
                self.owners.pop();
            }
            ExprKind::MethodDef {
                name,
                args,
                body,
                flags,
                ..
            } => {
                let owner = self.owner();
                let found = if flags.is_self_method {
                    self.gs.symbols().find_self_member(owner, *name)
                } else {
                    self.gs.symbols().find_member(owner, *name)
                };
                let method = match found {
                    Some(SymbolRef::Method(method)) => Some(method),
                    _ => None,
                };
                if let Some(method) = method {
                    let def_loc = Loc::new(self.file, expr.loc);
                    let query = &self.gs.lsp_query;
                    if query.matches_loc(def_loc)
                        || query.matches_symbol(SymbolRef::Method(method))
                    {
                        self.gs.errors.push_query_response(QueryResponse::MethodDef {
                            loc: def_loc,
                            method,
                        });
                    }
                }
                self.methods.push(CollectedMethod {
                    owner,
                    method,
                    args,
                    body,
                });
                // Nested definitions become their own units.
                self.walk(body);
            }
            _ => beryl_ast::visit_children(expr, &mut |child| self.walk(child)),
        }
    }
}

/// Pushes query responses for resolved constant references anywhere in the
/// tree.
fn respond_constants(gs: &GlobalState, parsed: &ParsedFile) {
    fn walk(gs: &GlobalState, file: FileRef, expr: &Expr) {
        if let ExprKind::ConstantLit { symbol } = &expr.kind {
            let loc = Loc::new(file, expr.loc);
            if gs.lsp_query.matches_loc(loc) || gs.lsp_query.matches_symbol(*symbol) {
                let ty = match symbol {
                    SymbolRef::Field(field) => {
                        gs.symbols().field_data(*field).declared_type.clone()
                    }
                    _ => beryl_core::types::Ty::Untyped,
                };
                gs.errors.push_query_response(QueryResponse::Constant {
                    loc,
                    symbol: *symbol,
                    ty,
                });
            }
        }
        beryl_ast::visit_children(expr, &mut |child| walk(gs, file, child));
    }
    walk(gs, parsed.file, &parsed.tree);
}

/// Replaces method definitions nested inside a body with their runtime
/// residue, so the enclosing CFG sees a plain value while the nested body
/// is checked as its own unit.
fn flatten_nested_defs(body: &Expr) -> Expr {
    struct Flattener;
    impl TreeMapper for Flattener {
        fn post_method_def(&mut self, expr: Expr) -> Expr {
            let loc = expr.loc;
            let ExprKind::MethodDef { name, flags, .. } = expr.kind else {
                return expr;
            };
            Expr::new(
                loc,
                ExprKind::RuntimeMethodDefinition {
                    name,
                    is_self: flags.is_self_method,
                },
            )
        }
    }
    map_tree(body.deep_copy(), &mut Flattener)
}
