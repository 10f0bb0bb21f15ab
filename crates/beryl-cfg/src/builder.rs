//! Lowering from resolved trees to basic blocks.

use beryl_ast::{CastKind, Expr, ExprKind, IdentKind};
use beryl_core::files::FileRef;
use beryl_core::loc::Loc;
use beryl_core::names::NameRef;
use beryl_core::symbols::{ClassOrModuleRef, MethodRef, SymbolRef};
use beryl_core::types::{LitKind, Ty};
use beryl_core::{GlobalState, well_known};
use rustc_hash::FxHashMap;

use crate::{BasicBlock, Binding, BlockId, Cfg, LocalInfo, LocalRef, Rvalue, Terminator};

/// One method body to lower, with the context inference needs.
pub struct MethodSource<'a> {
    /// The file the method lives in.
    pub file: FileRef,
    /// The class the method is defined on.
    pub owner: ClassOrModuleRef,
    /// The method symbol, when the namer entered one.
    pub method: Option<MethodRef>,
    /// The argument nodes, in declaration order.
    pub args: &'a [Expr],
    /// The body.
    pub body: &'a Expr,
}

/// Lowers one method body.
pub fn build(gs: &GlobalState, src: &MethodSource) -> Cfg {
    let mut builder = Builder {
        gs,
        file: src.file,
        owner: src.owner,
        blocks: Vec::new(),
        current: BlockId::ENTRY,
        locals: Vec::new(),
        named: FxHashMap::default(),
        loop_depth: 0,
        loops: Vec::new(),
    };
    builder.new_block();

    let self_local = builder.temp();
    builder.emit(self_local, Rvalue::LoadSelf, Loc::new(src.file, src.body.loc));
    for (index, arg) in src.args.iter().enumerate() {
        let Some((name, unique)) = param_binding(arg) else {
            continue;
        };
        let local = builder.named_local(name, unique);
        builder.emit(
            local,
            Rvalue::LoadArg(index as u16),
            Loc::new(src.file, arg.loc),
        );
    }

    let value = builder.lower(src.body);
    let solved = builder.temp();
    builder.emit(
        solved,
        Rvalue::SolveConstraint(value),
        Loc::new(src.file, src.body.loc),
    );
    builder.seal(Terminator::Ret(solved));

    // Any block left open is a dead continuation; end it cleanly.
    for block in &mut builder.blocks {
        if block.terminator.is_none() {
            block.terminator = Some(Terminator::Ret(solved));
        }
    }

    let mut cfg = Cfg {
        blocks: builder
            .blocks
            .into_iter()
            .map(|block| BasicBlock {
                bindings: block.bindings,
                terminator: block.terminator.unwrap(),
                loop_depth: block.loop_depth,
            })
            .collect(),
        locals: builder.locals,
        topo: Vec::new(),
        preds: Vec::new(),
    };
    cfg.compute_edges();
    cfg
}

/// The (name, version) pair a parameter node binds.
fn param_binding(arg: &Expr) -> Option<(NameRef, u32)> {
    match &arg.kind {
        ExprKind::Local { name, unique } => Some((*name, *unique)),
        ExprKind::UnresolvedIdent { name, .. } => Some((*name, 0)),
        ExprKind::OptionalArg { name, .. }
        | ExprKind::RestArg { name }
        | ExprKind::KeywordArg { name, .. }
        | ExprKind::BlockArg { name }
        | ExprKind::ShadowArg { name } => param_binding(name),
        _ => None,
    }
}

struct BuildBlock {
    bindings: Vec<Binding>,
    terminator: Option<Terminator>,
    loop_depth: u32,
}

struct LoopCtx {
    break_to: BlockId,
    next_to: BlockId,
    result: LocalRef,
}

struct Builder<'gs> {
    gs: &'gs GlobalState,
    file: FileRef,
    owner: ClassOrModuleRef,
    blocks: Vec<BuildBlock>,
    current: BlockId,
    locals: Vec<LocalInfo>,
    named: FxHashMap<(NameRef, u32), LocalRef>,
    loop_depth: u32,
    loops: Vec<LoopCtx>,
}

impl Builder<'_> {
    fn new_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BuildBlock {
            bindings: Vec::new(),
            terminator: None,
            loop_depth: self.loop_depth,
        });
        self.current = if self.blocks.len() == 1 {
            id
        } else {
            self.current
        };
        id
    }

    fn switch_to(&mut self, block: BlockId) {
        self.current = block;
    }

    fn seal(&mut self, terminator: Terminator) {
        let block = &mut self.blocks[self.current.0 as usize];
        if block.terminator.is_none() {
            block.terminator = Some(terminator);
        }
    }

    fn temp(&mut self) -> LocalRef {
        let local = LocalRef(self.locals.len() as u32);
        self.locals.push(LocalInfo {
            name: None,
            unique: 0,
            min_loops: self.loop_depth,
        });
        local
    }

    fn named_local(&mut self, name: NameRef, unique: u32) -> LocalRef {
        if let Some(&local) = self.named.get(&(name, unique)) {
            return local;
        }
        let local = LocalRef(self.locals.len() as u32);
        self.locals.push(LocalInfo {
            name: Some(name),
            unique,
            min_loops: self.loop_depth,
        });
        self.named.insert((name, unique), local);
        local
    }

    fn emit(&mut self, target: LocalRef, rvalue: Rvalue, loc: Loc) {
        let info = &mut self.locals[target.0 as usize];
        info.min_loops = info.min_loops.min(self.loop_depth);
        self.blocks[self.current.0 as usize]
            .bindings
            .push(Binding {
                target,
                loc,
                rvalue,
            });
    }

    fn loc(&self, expr: &Expr) -> Loc {
        Loc::new(self.file, expr.loc)
    }

    fn lower_literal(&mut self, expr: &Expr, value: LitKind) -> LocalRef {
        let target = self.temp();
        self.emit(target, Rvalue::Literal(value), self.loc(expr));
        target
    }

    fn unanalyzable(&mut self, expr: &Expr) -> LocalRef {
        let target = self.temp();
        self.emit(target, Rvalue::Unanalyzable, self.loc(expr));
        target
    }

    fn lower(&mut self, expr: &Expr) -> LocalRef {
        let loc = self.loc(expr);
        match &expr.kind {
            ExprKind::EmptyTree => self.lower_literal(expr, LitKind::Nil),
            ExprKind::Literal { value } => self.lower_literal(expr, *value),
            ExprKind::SelfExpr => {
                let target = self.temp();
                self.emit(target, Rvalue::LoadSelf, loc);
                target
            }
            ExprKind::Local { name, unique } => self.named_local(*name, *unique),
            ExprKind::UnresolvedIdent { name, kind } => match kind {
                IdentKind::Instance => {
                    match self.gs.symbols().find_member_transitive(self.owner, *name) {
                        Some(SymbolRef::Field(field)) => {
                            let target = self.temp();
                            self.emit(target, Rvalue::Alias(SymbolRef::Field(field)), loc);
                            target
                        }
                        _ => self.unanalyzable(expr),
                    }
                }
                _ => self.unanalyzable(expr),
            },
            ExprKind::ConstantLit { symbol } => {
                let target = self.temp();
                self.emit(target, Rvalue::Alias(*symbol), loc);
                target
            }
            ExprKind::UnresolvedConstant { .. } | ExprKind::ConstantRoot => {
                self.unanalyzable(expr)
            }
            ExprKind::InsSeq { stats, expr: last } => {
                for stat in stats {
                    self.lower(stat);
                }
                self.lower(last)
            }
            ExprKind::Assign { lhs, rhs } => self.lower_assign(lhs, rhs),
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let cond_local = self.lower(cond);
                let then_block = self.new_block();
                let else_block = self.new_block();
                let join = self.new_block();
                self.seal(Terminator::Cond {
                    cond: cond_local,
                    then_block,
                    else_block,
                });
                let result = self.temp();

                self.switch_to(then_block);
                let then_value = self.lower(then_branch);
                self.emit(result, Rvalue::Ident(then_value), self.loc(then_branch));
                self.seal(Terminator::Jump(join));

                self.switch_to(else_block);
                let else_value = self.lower(else_branch);
                self.emit(result, Rvalue::Ident(else_value), self.loc(else_branch));
                self.seal(Terminator::Jump(join));

                self.switch_to(join);
                result
            }
            ExprKind::While { cond, body } => {
                let result = self.temp();
                self.emit(result, Rvalue::Literal(LitKind::Nil), loc);
                let header = self.new_block();
                self.seal(Terminator::Jump(header));
                self.switch_to(header);
                let cond_local = self.lower(cond);
                let after = self.new_block();
                self.loop_depth += 1;
                let body_block = self.new_block();
                self.seal(Terminator::Cond {
                    cond: cond_local,
                    then_block: body_block,
                    else_block: after,
                });
                self.loops.push(LoopCtx {
                    break_to: after,
                    next_to: header,
                    result,
                });
                self.switch_to(body_block);
                self.lower(body);
                self.seal(Terminator::Jump(header));
                self.loops.pop();
                self.loop_depth -= 1;
                self.switch_to(after);
                result
            }
            ExprKind::Break { expr: value } => {
                let value_local = self.lower(value);
                let target = self.loops.last().map(|ctx| (ctx.result, ctx.break_to));
                match target {
                    Some((result, break_to)) => {
                        self.emit(result, Rvalue::Ident(value_local), loc);
                        self.seal(Terminator::Jump(break_to));
                    }
                    None => self.seal(Terminator::Ret(value_local)),
                }
                let dead = self.new_block();
                self.switch_to(dead);
                self.lower_literal(expr, LitKind::Nil)
            }
            ExprKind::Next { expr: value } => {
                let value_local = self.lower(value);
                let target = self.loops.last().map(|ctx| ctx.next_to);
                match target {
                    Some(next_to) => self.seal(Terminator::Jump(next_to)),
                    None => self.seal(Terminator::Ret(value_local)),
                }
                let dead = self.new_block();
                self.switch_to(dead);
                self.lower_literal(expr, LitKind::Nil)
            }
            ExprKind::Return { expr: value } => {
                let value_local = self.lower(value);
                let returned = self.temp();
                self.emit(returned, Rvalue::Return(value_local), loc);
                self.seal(Terminator::Ret(value_local));
                let dead = self.new_block();
                self.switch_to(dead);
                self.lower_literal(expr, LitKind::Nil)
            }
            ExprKind::Rescue {
                body,
                cases,
                else_branch,
                ensure,
            } => self.lower_rescue(expr, body, cases, else_branch, ensure),
            ExprKind::Send { .. } => self.lower_send(expr),
            ExprKind::Cast {
                cast_kind,
                arg,
                type_expr,
            } => {
                let value = self.lower(arg);
                let target = self.temp();
                match cast_kind {
                    CastKind::Absurd => {
                        self.emit(target, Rvalue::TAbsurd(value), loc);
                    }
                    CastKind::Unsafe => {
                        self.emit(
                            target,
                            Rvalue::Cast {
                                value,
                                kind: CastKind::Unsafe,
                                ty: Ty::Untyped,
                            },
                            loc,
                        );
                    }
                    kind => {
                        let ty = beryl_resolve::type_syntax(self.gs, self.file, type_expr);
                        self.emit(
                            target,
                            Rvalue::Cast {
                                value,
                                kind: *kind,
                                ty,
                            },
                            loc,
                        );
                    }
                }
                target
            }
            ExprKind::Array { elems } => {
                for elem in elems {
                    self.lower(elem);
                }
                let seed = self.lower_literal(expr, LitKind::Nil);
                let target = self.temp();
                self.emit(
                    target,
                    Rvalue::Cast {
                        value: seed,
                        kind: CastKind::Cast,
                        ty: Ty::Class(well_known::ARRAY),
                    },
                    loc,
                );
                target
            }
            ExprKind::Hash { keys, values } => {
                for (key, value) in keys.iter().zip(values) {
                    self.lower(key);
                    self.lower(value);
                }
                let seed = self.lower_literal(expr, LitKind::Nil);
                let target = self.temp();
                self.emit(
                    target,
                    Rvalue::Cast {
                        value: seed,
                        kind: CastKind::Cast,
                        ty: Ty::Class(well_known::HASH),
                    },
                    loc,
                );
                target
            }
            ExprKind::RuntimeMethodDefinition { name, .. } => {
                self.lower_literal(expr, LitKind::Sym(*name))
            }
            // Anything structural that survives to this point is outside
            // the analyzable fragment.
            _ => self.unanalyzable(expr),
        }
    }

    fn lower_assign(&mut self, lhs: &Expr, rhs: &Expr) -> LocalRef {
        let value = self.lower(rhs);
        match &lhs.kind {
            ExprKind::Local { name, unique } => {
                let target = self.named_local(*name, *unique);
                self.emit(target, Rvalue::Ident(value), self.loc(lhs));
                target
            }
            ExprKind::UnresolvedIdent {
                name,
                kind: IdentKind::Instance,
            } => {
                if let Some(SymbolRef::Field(field)) =
                    self.gs.symbols().find_member_transitive(self.owner, *name)
                {
                    let declared = self.gs.symbols().field_data(field).declared_type.clone();
                    if declared != Ty::Untyped {
                        // A declared field checks its writes like a `T.let`.
                        let checked = self.temp();
                        self.emit(
                            checked,
                            Rvalue::Cast {
                                value,
                                kind: CastKind::Let,
                                ty: declared,
                            },
                            self.loc(lhs),
                        );
                    }
                }
                value
            }
            ExprKind::ConstantLit {
                symbol: SymbolRef::Field(field),
            } => {
                let declared = self.gs.symbols().field_data(*field).declared_type.clone();
                if declared != Ty::Untyped {
                    let checked = self.temp();
                    self.emit(
                        checked,
                        Rvalue::Cast {
                            value,
                            kind: CastKind::Let,
                            ty: declared,
                        },
                        self.loc(lhs),
                    );
                }
                value
            }
            _ => value,
        }
    }

    fn lower_send(&mut self, expr: &Expr) -> LocalRef {
        let loc = self.loc(expr);
        let ExprKind::Send {
            recv,
            method,
            flags,
            num_pos_args,
            args,
        } = &expr.kind
        else {
            unreachable!()
        };

        let recv_local = if recv.is_empty_tree() {
            let target = self.temp();
            self.emit(target, Rvalue::LoadSelf, self.loc(recv));
            target
        } else {
            self.lower(recv)
        };

        let block = match args.last() {
            Some(last) if matches!(last.kind, ExprKind::Block { .. }) => Some(last),
            _ => None,
        };
        let plain_args = if block.is_some() {
            &args[..args.len() - 1]
        } else {
            &args[..]
        };
        let arg_locals: Vec<LocalRef> = plain_args.iter().map(|arg| self.lower(arg)).collect();

        let result = self.temp();
        if let Some(block) = block {
            let ExprKind::Block {
                args: block_args,
                body,
            } = &block.kind
            else {
                unreachable!()
            };
            // A block may run zero or more times: model it as a loop guarded
            // by an unanalyzable condition so loop-carried state widens.
            let header = self.new_block();
            self.seal(Terminator::Jump(header));
            self.switch_to(header);
            let cond = self.temp();
            self.emit(cond, Rvalue::Unanalyzable, self.loc(block));
            let after = self.new_block();
            self.loop_depth += 1;
            let body_block = self.new_block();
            self.seal(Terminator::Cond {
                cond,
                then_block: body_block,
                else_block: after,
            });
            self.loops.push(LoopCtx {
                break_to: after,
                next_to: header,
                result,
            });
            self.switch_to(body_block);
            for arg in block_args {
                if let Some((name, unique)) = param_binding(arg) {
                    let local = self.named_local(name, unique);
                    self.emit(local, Rvalue::LoadYieldParams, self.loc(arg));
                }
            }
            let body_value = self.lower(body);
            let block_result = self.temp();
            self.emit(block_result, Rvalue::BlockReturn(body_value), self.loc(body));
            self.seal(Terminator::Jump(header));
            self.loops.pop();
            self.loop_depth -= 1;
            self.switch_to(after);
        }

        self.emit(
            result,
            Rvalue::Send {
                recv: recv_local,
                method: *method,
                num_pos_args: *num_pos_args,
                args: arg_locals,
                is_private_ok: flags.is_private_ok,
                has_block: block.is_some(),
            },
            loc,
        );
        result
    }

    fn lower_rescue(
        &mut self,
        expr: &Expr,
        body: &Expr,
        cases: &[Expr],
        else_branch: &Expr,
        ensure: &Expr,
    ) -> LocalRef {
        let loc = self.loc(expr);
        let result = self.temp();
        let after = self.new_block();
        let body_block = self.new_block();

        if cases.is_empty() {
            self.seal(Terminator::Jump(body_block));
        } else {
            // Whether the body raises is not statically analyzable.
            let cond = self.temp();
            self.emit(cond, Rvalue::Unanalyzable, loc);
            let first_dispatch = self.new_block();
            self.seal(Terminator::Cond {
                cond,
                then_block: body_block,
                else_block: first_dispatch,
            });
            let mut dispatch = first_dispatch;
            for (index, case) in cases.iter().enumerate() {
                self.switch_to(dispatch);
                let case_block = if index + 1 < cases.len() {
                    let next_dispatch = self.new_block();
                    let case_block = self.new_block();
                    let cond = self.temp();
                    self.emit(cond, Rvalue::Unanalyzable, self.loc(case));
                    self.seal(Terminator::Cond {
                        cond,
                        then_block: case_block,
                        else_block: next_dispatch,
                    });
                    dispatch = next_dispatch;
                    case_block
                } else {
                    dispatch
                };
                self.switch_to(case_block);
                self.lower_rescue_case(case, result);
                self.seal(Terminator::Jump(after));
            }
        }

        self.switch_to(body_block);
        let body_value = self.lower(body);
        let normal_value = if else_branch.is_empty_tree() {
            body_value
        } else {
            self.lower(else_branch)
        };
        self.emit(result, Rvalue::Ident(normal_value), loc);
        self.seal(Terminator::Jump(after));

        self.switch_to(after);
        if !ensure.is_empty_tree() {
            self.lower(ensure);
        }
        result
    }

    fn lower_rescue_case(&mut self, case: &Expr, result: LocalRef) {
        let ExprKind::RescueCase {
            exceptions,
            var,
            body,
        } = &case.kind
        else {
            let value = self.lower(case);
            self.emit(result, Rvalue::Ident(value), self.loc(case));
            return;
        };
        let exception_ty = if exceptions.is_empty() {
            Ty::Class(well_known::STANDARD_ERROR)
        } else {
            let parts: Vec<Ty> = exceptions
                .iter()
                .map(|exc| beryl_resolve::type_syntax(self.gs, self.file, exc))
                .collect();
            Ty::union_of(parts, self.gs.symbols())
        };
        if let Some((name, unique)) = param_binding(var) {
            let raised = self.temp();
            self.emit(raised, Rvalue::Unanalyzable, self.loc(var));
            let bound = self.named_local(name, unique);
            self.emit(
                bound,
                Rvalue::Cast {
                    value: raised,
                    kind: CastKind::Cast,
                    ty: exception_ty,
                },
                self.loc(var),
            );
        }
        let value = self.lower(body);
        self.emit(result, Rvalue::Ident(value), self.loc(body));
    }
}

#[cfg(test)]
mod tests {
    use beryl_ast::ExprKind;
    use beryl_core::files::FileRef;
    use beryl_core::{GlobalState, well_known};

    use super::*;
    use crate::Terminator;

    fn lower_method(gs: &mut GlobalState, source: &str, check: impl FnOnce(&crate::Cfg)) {
        let tree = {
            let mut unfrozen = gs.unfreeze_name_table();
            let result = beryl_parser::parse(&mut unfrozen, source);
            assert!(result.errors.is_empty(), "{:?}", result.errors);
            result.tree
        };
        let ExprKind::MethodDef { args, body, .. } = &tree.kind else {
            panic!("expected a method definition");
        };
        let src = MethodSource {
            file: FileRef::from_index(0),
            owner: well_known::OBJECT,
            method: None,
            args,
            body,
        };
        check(&build(gs, &src));
    }

    #[test]
    fn conditionals_fork_and_join() {
        let mut gs = GlobalState::new();
        lower_method(
            &mut gs,
            "def f(x)\n  if x\n    1\n  else\n    2\n  end\nend\n",
            |cfg| {
                assert!(cfg.blocks.len() >= 4);
                assert!(matches!(
                    cfg.block(crate::BlockId::ENTRY).terminator,
                    Terminator::Cond { .. }
                ));
                assert_eq!(cfg.topo.first(), Some(&crate::BlockId::ENTRY));
                // Every block is either reachable or a dead continuation;
                // the topo order never repeats a block.
                let mut seen = rustc_hash::FxHashSet::default();
                assert!(cfg.topo.iter().all(|block| seen.insert(*block)));
            },
        );
    }

    #[test]
    fn loops_record_their_depth() {
        let mut gs = GlobalState::new();
        lower_method(
            &mut gs,
            "def f\n  i = 0\n  while i < 3\n    i = i + 1\n  end\n  i\nend\n",
            |cfg| {
                assert!(cfg.blocks.iter().any(|block| block.loop_depth == 1));
                assert!(cfg.locals.iter().any(|local| local.min_loops == 1));
                assert!(cfg.locals.iter().any(|local| local.min_loops == 0));
            },
        );
    }

    #[test]
    fn returns_terminate_and_leave_a_dead_continuation() {
        let mut gs = GlobalState::new();
        lower_method(
            &mut gs,
            "def f\n  return 1\n  2\nend\n",
            |cfg| {
                let rets = cfg
                    .blocks
                    .iter()
                    .filter(|block| matches!(block.terminator, Terminator::Ret(_)))
                    .count();
                assert!(rets >= 2);
                // The dead continuation is not reachable from the entry.
                assert!(cfg.topo.len() < cfg.blocks.len());
            },
        );
    }
}
