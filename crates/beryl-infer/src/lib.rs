//! Flow-sensitive type inference.
//!
//! A forward dataflow over the CFG: each block's environment maps locals to
//! types, merges take least upper bounds, conditional edges narrow, and
//! loops iterate to a fixed point with widening bounded by an iteration
//! cap. Diagnostics and query responses are emitted in a single reporting
//! pass once the environments are stable.

mod dispatch;
mod env;

use beryl_cfg::{BlockId, Cfg, LocalRef, Rvalue, Terminator};
use beryl_core::loc::Loc;
use beryl_core::symbols::{ClassOrModuleRef, MethodRef, SymbolRef};
use beryl_core::types::{LitKind, Ty};
use beryl_core::{Diagnostic, DiagnosticCode, FileRef, GlobalState, QueryResponse};
use ecow::eco_format;
use rustc_hash::{FxHashMap, FxHashSet};

use env::{Entry, Env};

/// Dataflow iteration cap; past it, still-changing locals widen to untyped
/// so pathological scripts terminate.
const MAX_DATAFLOW_PASSES: usize = 20;

/// The method context a CFG is inferred under.
pub struct InferContext {
    /// The file the method lives in.
    pub file: FileRef,
    /// The class the method is defined on.
    pub owner: ClassOrModuleRef,
    /// The method symbol, when one exists.
    pub method: Option<MethodRef>,
}

/// Infers one method body, pushing diagnostics and query responses onto
/// the `GlobalState` error queue.
pub fn run(gs: &GlobalState, ctx: &InferContext, cfg: &Cfg) {
    let mut infer = Infer {
        gs,
        ctx,
        cfg,
        envs_in: vec![None; cfg.blocks.len()],
        narrows: FxHashMap::default(),
        skipped_branches: FxHashSet::default(),
        reporting: false,
    };
    infer.fixed_point();
    infer.report();
}

/// How a conditional on one local narrows another.
#[derive(Clone, Debug)]
struct Narrow {
    /// The local whose type the condition refines.
    target: LocalRef,
    /// The target's type on the truthy edge.
    then_ty: Ty,
    /// The target's type on the falsy edge.
    else_ty: Ty,
}

struct Infer<'a> {
    gs: &'a GlobalState,
    ctx: &'a InferContext,
    cfg: &'a Cfg,
    envs_in: Vec<Option<Env>>,
    /// Narrowing facts keyed by the condition local that proves them.
    narrows: FxHashMap<LocalRef, Narrow>,
    /// Successors proven unreachable by a literal condition; reported as
    /// unreachable branches rather than dead code.
    skipped_branches: FxHashSet<BlockId>,
    reporting: bool,
}

impl Infer<'_> {
    fn fixed_point(&mut self) {
        self.envs_in[BlockId::ENTRY.0 as usize] = Some(Env::default());
        for pass in 0..MAX_DATAFLOW_PASSES {
            let widen_hard = pass + 1 == MAX_DATAFLOW_PASSES;
            let mut changed = false;
            for &block in &self.cfg.topo.clone() {
                let Some(in_env) = self.merge_preds(block) else {
                    continue;
                };
                let stale = self.envs_in[block.0 as usize].as_ref() != Some(&in_env);
                if stale {
                    let in_env = if widen_hard {
                        // Iteration cap reached: whatever is still moving
                        // goes straight to untyped.
                        let mut widened = in_env;
                        if let Some(old) = &self.envs_in[block.0 as usize] {
                            widened.widen_changed_against(old);
                        }
                        widened
                    } else {
                        in_env
                    };
                    self.envs_in[block.0 as usize] = Some(in_env);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
    }

    /// Merges predecessor out-environments, applying edge narrowing.
    fn merge_preds(&mut self, block: BlockId) -> Option<Env> {
        if block == BlockId::ENTRY {
            return self.envs_in[0].clone();
        }
        let mut merged: Option<Env> = None;
        let cfg = self.cfg;
        for &pred in &cfg.preds[block.0 as usize] {
            let Some(pred_in) = self.envs_in[pred.0 as usize].clone() else {
                continue;
            };
            let mut out = self.flow_block(pred, pred_in);
            self.narrow_edge(pred, block, &mut out);
            merged = Some(match merged {
                None => out,
                Some(mut acc) => {
                    acc.merge_with(&out, self.gs, self.cfg);
                    acc
                }
            });
        }
        merged
    }

    /// Applies the narrowing a `pred → block` edge proves.
    fn narrow_edge(&mut self, pred: BlockId, block: BlockId, env: &mut Env) {
        let Terminator::Cond {
            cond,
            then_block,
            else_block,
        } = &self.cfg.block(pred).terminator
        else {
            return;
        };
        let on_then = *then_block == block;
        let on_else = *else_block == block;
        if let Some(narrow) = self.narrows.get(cond) {
            let ty = if on_then {
                narrow.then_ty.clone()
            } else if on_else {
                narrow.else_ty.clone()
            } else {
                return;
            };
            env.set(narrow.target, Entry::typed(ty));
            return;
        }
        // A condition on a plain value narrows the value itself: the truthy
        // edge drops nil and false.
        if on_then {
            if let Some(entry) = env.get(*cond) {
                let narrowed = without_falsy(&entry.ty, self.gs);
                env.set(*cond, Entry { ty: narrowed, ..entry });
            }
        }
    }

    /// Runs a block's bindings over `env`, producing its out-environment.
    fn flow_block(&mut self, block: BlockId, mut env: Env) -> Env {
        let cfg = self.cfg;
        for binding in &cfg.block(block).bindings {
            let entry = self.flow_binding(binding.target, &binding.rvalue, binding.loc, &env);
            if self.reporting && self.gs.lsp_query.matches_loc(binding.loc) {
                if let Some(name) = cfg.local(binding.target).name {
                    self.gs.errors.push_query_response(QueryResponse::Ident {
                        loc: binding.loc,
                        name,
                        ty: entry.ty.clone(),
                    });
                } else if matches!(binding.rvalue, Rvalue::Literal(_)) {
                    self.gs.errors.push_query_response(QueryResponse::Literal {
                        loc: binding.loc,
                        ty: entry.ty.clone(),
                    });
                }
            }
            env.set(binding.target, entry);
        }
        env
    }

    fn flow_binding(&mut self, target: LocalRef, rvalue: &Rvalue, loc: Loc, env: &Env) -> Entry {
        match rvalue {
            Rvalue::Ident(source) => {
                // Copies carry narrowing facts along.
                if let Some(narrow) = self.narrows.get(source).cloned() {
                    self.narrows.insert(target, narrow);
                }
                env.entry_or_nil(*source)
            }
            Rvalue::Alias(symbol) => self.flow_alias(*symbol, loc),
            Rvalue::Literal(value) => Entry::typed(literal_ty(*value)),
            Rvalue::LoadSelf => self.flow_self(),
            Rvalue::LoadArg(index) => self.flow_arg(*index),
            Rvalue::LoadYieldParams => Entry::typed(Ty::Untyped),
            Rvalue::Unanalyzable => Entry::typed(Ty::Untyped),
            Rvalue::BlockReturn(_) => Entry::typed(Ty::Untyped),
            Rvalue::Send {
                recv,
                method,
                num_pos_args,
                args,
                is_private_ok,
                has_block,
            } => self.flow_send(
                target,
                env,
                loc,
                *recv,
                *method,
                *num_pos_args,
                args,
                *is_private_ok,
                *has_block,
            ),
            Rvalue::Cast { value, kind, ty } => {
                let value_entry = env.entry_or_nil(*value);
                match kind {
                    beryl_ast::CastKind::Let => {
                        if self.reporting
                            && !value_entry.ty.is_subtype_of(ty, self.gs.symbols())
                        {
                            self.diag(
                                Diagnostic::new(
                                    DiagnosticCode::CastFailure,
                                    loc,
                                    eco_format!(
                                        "Argument does not have asserted type `{}`",
                                        ty.show(self.gs)
                                    ),
                                )
                                .with_section(
                                    eco_format!("Got `{}`", value_entry.ty.show(self.gs)),
                                    vec![],
                                ),
                            );
                        }
                        Entry::typed(ty.clone())
                    }
                    beryl_ast::CastKind::Cast => Entry::typed(ty.clone()),
                    beryl_ast::CastKind::Unsafe | beryl_ast::CastKind::Absurd => {
                        Entry::typed(Ty::Untyped)
                    }
                }
            }
            Rvalue::TAbsurd(value) => {
                let value_ty = env.ty_or_nil(*value);
                if self.reporting && value_ty != Ty::Bottom && value_ty != Ty::Untyped {
                    self.diag(Diagnostic::new(
                        DiagnosticCode::CastFailure,
                        loc,
                        eco_format!(
                            "Control flow could reach `T.absurd` because the type `{}` wasn't handled",
                            value_ty.show(self.gs)
                        ),
                    ));
                }
                Entry::typed(Ty::Bottom)
            }
            Rvalue::Return(value) | Rvalue::SolveConstraint(value) => {
                let value_ty = env.ty_or_nil(*value);
                self.check_return(&value_ty, loc);
                match rvalue {
                    Rvalue::Return(_) => Entry::typed(Ty::Bottom),
                    _ => Entry::typed(value_ty),
                }
            }
        }
    }

    fn flow_alias(&mut self, symbol: SymbolRef, loc: Loc) -> Entry {
        let ty = match symbol {
            SymbolRef::ClassOrModule(sym) if sym.is_stub() => Ty::Untyped,
            SymbolRef::ClassOrModule(_) => Ty::Class(beryl_core::well_known::CLASS),
            SymbolRef::Field(field) => {
                let declared = &self.gs.symbols().field_data(field).declared_type;
                declared.clone()
            }
            SymbolRef::Method(_) | SymbolRef::TypeMember(_) => Ty::Untyped,
        };
        if self.reporting {
            if self.gs.lsp_query.matches_loc(loc) || self.gs.lsp_query.matches_symbol(symbol) {
                self.gs
                    .errors
                    .push_query_response(QueryResponse::Constant {
                        loc,
                        symbol,
                        ty: ty.clone(),
                    });
            }
        }
        Entry {
            ty,
            alias: Some(symbol),
        }
    }

    fn flow_self(&self) -> Entry {
        let is_self_method = self
            .ctx
            .method
            .map(|m| self.gs.symbols().method_data(m).flags.is_self_method)
            .unwrap_or(false);
        if is_self_method {
            Entry {
                ty: Ty::Class(beryl_core::well_known::CLASS),
                alias: Some(SymbolRef::ClassOrModule(self.ctx.owner)),
            }
        } else {
            Entry::typed(Ty::Class(self.ctx.owner))
        }
    }

    fn flow_arg(&self, index: u16) -> Entry {
        let Some(method) = self.ctx.method else {
            return Entry::typed(Ty::Untyped);
        };
        let data = self.gs.symbols().method_data(method);
        let ty = data
            .arguments
            .get(index as usize)
            .map(|arg| arg.ty.clone())
            .unwrap_or(Ty::Untyped);
        let ty = match ty {
            Ty::SelfType => Ty::Class(self.ctx.owner),
            other => other,
        };
        Entry::typed(ty)
    }

    fn check_return(&mut self, value_ty: &Ty, loc: Loc) {
        if !self.reporting {
            return;
        }
        let Some(method) = self.ctx.method else {
            return;
        };
        let data = self.gs.symbols().method_data(method);
        if !data.has_sig {
            return;
        }
        let declared = &data.result_type;
        if !value_ty.is_subtype_of(declared, self.gs.symbols()) {
            self.diag(
                Diagnostic::new(
                    DiagnosticCode::ReturnTypeMismatch,
                    loc,
                    eco_format!(
                        "Expected `{}` but found `{}` for method result type",
                        declared.show(self.gs),
                        value_ty.show(self.gs)
                    ),
                )
                .with_section(
                    "Method declared here",
                    vec![(data.decl_loc(), "in this signature".into())],
                ),
            );
        }
    }

    fn diag(&self, diag: Diagnostic) {
        self.gs.errors.push_diagnostic(diag);
    }

    /// The final pass: environments are stable, so run every reachable
    /// block once more with reporting on, then flag unreachable code.
    fn report(&mut self) {
        self.reporting = true;
        for &block in &self.cfg.topo.clone() {
            let Some(env) = self.envs_in[block.0 as usize].clone() else {
                continue;
            };
            let out = self.flow_block(block, env);
            self.check_terminator(block, &out);
        }
        self.reporting = false;
        self.report_dead_blocks();
    }

    fn check_terminator(&mut self, block: BlockId, out: &Env) {
        let cfg = self.cfg;
        let Terminator::Cond {
            cond,
            then_block,
            else_block,
        } = &cfg.block(block).terminator
        else {
            return;
        };
        let cond_ty = out.ty_or_nil(*cond);
        let skipped = match &cond_ty {
            Ty::Literal(lit) => match lit.kind {
                LitKind::True => Some(*else_block),
                LitKind::False | LitKind::Nil => Some(*then_block),
                _ => Some(*else_block),
            },
            Ty::Class(sym) if *sym == beryl_core::well_known::NIL_CLASS => Some(*then_block),
            _ => None,
        };
        let Some(skipped) = skipped else {
            return;
        };
        let target = cfg.block(skipped);
        if let Some(binding) = target.bindings.iter().find(|b| b.loc.exists()) {
            self.skipped_branches.insert(skipped);
            self.diag(Diagnostic::new(
                DiagnosticCode::UnreachableBranch,
                binding.loc,
                "This branch can never be taken",
            ));
        }
    }

    fn report_dead_blocks(&mut self) {
        for (index, env) in self.envs_in.iter().enumerate() {
            if env.is_some() {
                continue;
            }
            let block = BlockId(index as u32);
            if self.skipped_branches.contains(&block) {
                continue;
            }
            // Only user-visible work is worth flagging; synthetic
            // continuations have no sends.
            let first_send = self.cfg.block(block).bindings.iter().find(|binding| {
                matches!(binding.rvalue, Rvalue::Send { .. }) && binding.loc.exists()
            });
            if let Some(binding) = first_send {
                self.diag(Diagnostic::new(
                    DiagnosticCode::DeadCode,
                    binding.loc,
                    "This code is unreachable",
                ));
            }
        }
    }
}

/// The type of a literal value.
fn literal_ty(value: LitKind) -> Ty {
    match value {
        LitKind::Nil => Ty::nil(),
        other => Ty::literal(other),
    }
}

/// Drops the parts of a union that are falsy (`nil` and `FalseClass`).
fn without_falsy(ty: &Ty, gs: &GlobalState) -> Ty {
    match ty {
        Ty::Union(parts) => Ty::union_of(
            parts
                .parts
                .iter()
                .filter(|part| {
                    !matches!(
                        part,
                        Ty::Class(sym) if *sym == beryl_core::well_known::NIL_CLASS
                            || *sym == beryl_core::well_known::FALSE_CLASS
                    ) && !matches!(part, Ty::Literal(lit) if matches!(lit.kind, LitKind::False | LitKind::Nil))
                })
                .cloned(),
            gs.symbols(),
        ),
        other => other.clone(),
    }
}
