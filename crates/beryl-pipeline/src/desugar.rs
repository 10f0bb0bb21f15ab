//! Desugaring: parse tree in, canonical tree out.
//!
//! Purely structural; the symbol table is never consulted. Idempotent: a
//! second run over its own output changes nothing, because every hook only
//! matches sugar the first run removed. All produced nodes reuse source
//! ranges so later diagnostics point at user-written text.

use beryl_ast::{CastKind, Expr, ExprKind, IdentKind, SendFlags, TreeMapper, map_tree, walk_tree};
use beryl_core::GlobalState;
use beryl_core::loc::LocOffsets;
use beryl_core::names::{NameRef, UniqueNameKind};
use beryl_core::types::LitKind;

/// Desugars one tree. Requires an unfrozen name table (temporaries and
/// method names are interned here).
pub fn run(gs: &mut GlobalState, tree: Expr) -> Expr {
    let mut desugarer = Desugarer { gs };
    map_tree(tree, &mut desugarer)
}

struct Desugarer<'gs> {
    gs: &'gs mut GlobalState,
}

impl Desugarer<'_> {
    fn fresh_temp(&mut self) -> NameRef {
        let base = self.gs.enter_name_utf8("<tmp>");
        self.gs.fresh_unique_name(UniqueNameKind::DesugarTemp, base)
    }

    fn local(&self, name: NameRef, loc: LocOffsets) -> Expr {
        Expr::new(loc, ExprKind::Local { name, unique: 0 })
    }

    fn assign(&self, loc: LocOffsets, lhs: Expr, rhs: Expr) -> Expr {
        Expr::new(
            loc,
            ExprKind::Assign {
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
        )
    }

    fn send(&self, loc: LocOffsets, recv: Expr, method: NameRef, args: Vec<Expr>) -> Expr {
        Expr::new(
            loc,
            ExprKind::Send {
                recv: Box::new(recv),
                method,
                flags: SendFlags::default(),
                num_pos_args: args.len() as u16,
                args,
            },
        )
    }
}

impl TreeMapper for Desugarer<'_> {
    /// `a op= b` becomes `a = a op b`, with the receiver and indices of an
    /// index or attribute target evaluated once into temporaries.
    fn post_op_assign(&mut self, expr: Expr) -> Expr {
        let loc = expr.loc;
        let ExprKind::OpAssign { lhs, op, rhs } = expr.kind else {
            return expr;
        };
        match lhs.kind {
            ExprKind::UnresolvedIdent { .. } | ExprKind::Local { .. } => {
                let read = lhs.deep_copy();
                let combined = self.send(loc, read, op, vec![*rhs]);
                self.assign(loc, *lhs, combined)
            }
            ExprKind::Send {
                recv,
                method,
                args,
                num_pos_args,
                ..
            } => {
                let mut stats = Vec::new();
                let recv_temp = self.fresh_temp();
                stats.push(self.assign(loc, self.local(recv_temp, recv.loc), *recv));
                let mut index_temps = Vec::new();
                for arg in args.into_iter().take(num_pos_args as usize) {
                    let temp = self.fresh_temp();
                    let arg_loc = arg.loc;
                    stats.push(self.assign(loc, self.local(temp, arg_loc), arg));
                    index_temps.push((temp, arg_loc));
                }
                let reader_args: Vec<Expr> = index_temps
                    .iter()
                    .map(|(temp, arg_loc)| self.local(*temp, *arg_loc))
                    .collect();
                let read = self.send(loc, self.local(recv_temp, loc), method, reader_args);
                let combined = self.send(loc, read, op, vec![*rhs]);
                let writer_text = {
                    let shown = self.gs.show_name(method);
                    if shown == "[]" {
                        "[]=".into()
                    } else {
                        ecow::eco_format!("{shown}=")
                    }
                };
                let writer = self.gs.enter_name_utf8(&writer_text);
                let mut writer_args: Vec<Expr> = index_temps
                    .iter()
                    .map(|(temp, arg_loc)| self.local(*temp, *arg_loc))
                    .collect();
                writer_args.push(combined);
                let write = self.send(loc, self.local(recv_temp, loc), writer, writer_args);
                Expr::new(
                    loc,
                    ExprKind::InsSeq {
                        stats,
                        expr: Box::new(write),
                    },
                )
            }
            _ => {
                // Recovered garbage on the left; degrade to the bare rhs.
                *rhs
            }
        }
    }

    /// `a, b = e` evaluates `e` once and projects elements.
    fn post_multi_assign(&mut self, expr: Expr) -> Expr {
        let loc = expr.loc;
        let ExprKind::MultiAssign { lhs, rhs } = expr.kind else {
            return expr;
        };
        let temp = self.fresh_temp();
        let mut stats = vec![self.assign(loc, self.local(temp, rhs.loc), *rhs)];
        let index_method = self.gs.enter_name_utf8("[]");
        for (index, target) in lhs.into_iter().enumerate() {
            let target_loc = target.loc;
            let project = self.send(
                target_loc,
                self.local(temp, target_loc),
                index_method,
                vec![Expr::new(
                    target_loc,
                    ExprKind::Literal {
                        value: LitKind::Int(index as i64),
                    },
                )],
            );
            stats.push(self.assign(target_loc, target, project));
        }
        Expr::new(
            loc,
            ExprKind::InsSeq {
                stats,
                expr: Box::new(self.local(temp, loc)),
            },
        )
    }

    /// String interpolation becomes a left-to-right fold of `+` over
    /// stringified parts.
    fn post_dstring(&mut self, expr: Expr) -> Expr {
        let loc = expr.loc;
        let ExprKind::DString { parts } = expr.kind else {
            return expr;
        };
        let to_s = self.gs.wk_names.to_s;
        let plus = self.gs.enter_name_utf8("+");
        let mut acc: Option<Expr> = None;
        for part in parts {
            let part_loc = part.loc;
            let stringified = if matches!(
                part.kind,
                ExprKind::Literal {
                    value: LitKind::Str(_)
                }
            ) {
                part
            } else {
                self.send(part_loc, part, to_s, vec![])
            };
            acc = Some(match acc {
                None => stringified,
                Some(prefix) => self.send(loc, prefix, plus, vec![stringified]),
            });
        }
        acc.unwrap_or_else(|| {
            let empty = self.gs.enter_name_utf8("");
            Expr::new(
                loc,
                ExprKind::Literal {
                    value: LitKind::Str(empty),
                },
            )
        })
    }

    /// `for x in e … end` becomes `e.each { |x| … }`.
    fn post_for(&mut self, expr: Expr) -> Expr {
        let loc = expr.loc;
        let ExprKind::For {
            var,
            iterable,
            body,
        } = expr.kind
        else {
            return expr;
        };
        let each = self.gs.wk_names.each;
        let block = Expr::new(
            body.loc,
            ExprKind::Block {
                args: vec![*var],
                body,
            },
        );
        Expr::new(
            loc,
            ExprKind::Send {
                recv: iterable,
                method: each,
                flags: SendFlags::default(),
                num_pos_args: 0,
                args: vec![block],
            },
        )
    }

    /// `T.let`/`T.cast`/`T.unsafe`/`T.absurd` become cast nodes.
    /// `T.nilable` and friends stay sends; the resolver interprets them as
    /// type syntax in signature position.
    fn post_send(&mut self, expr: Expr) -> Expr {
        let loc = expr.loc;
        let cast_kind = match &expr.kind {
            ExprKind::Send {
                recv,
                method,
                num_pos_args,
                ..
            } => {
                let is_t_recv = matches!(
                    &recv.kind,
                    ExprKind::UnresolvedConstant { scope, name }
                        if scope.is_empty_tree() && *name == self.gs.wk_names.t_const
                );
                if !is_t_recv {
                    None
                } else {
                    let wk = &self.gs.wk_names;
                    if *method == wk.let_name && *num_pos_args == 2 {
                        Some((CastKind::Let, true))
                    } else if *method == wk.cast_name && *num_pos_args == 2 {
                        Some((CastKind::Cast, true))
                    } else if *method == wk.unsafe_name && *num_pos_args == 1 {
                        Some((CastKind::Unsafe, false))
                    } else if *method == wk.absurd && *num_pos_args == 1 {
                        Some((CastKind::Absurd, false))
                    } else {
                        None
                    }
                }
            }
            _ => None,
        };
        let Some((cast_kind, has_type)) = cast_kind else {
            return expr;
        };
        let ExprKind::Send { mut args, .. } = expr.kind else {
            unreachable!()
        };
        let type_expr = if has_type {
            args.pop().unwrap_or_else(|| Expr::empty(loc))
        } else {
            Expr::empty(loc)
        };
        let arg = args.drain(..).next().unwrap_or_else(|| Expr::empty(loc));
        Expr::new(
            loc,
            ExprKind::Cast {
                cast_kind,
                arg: Box::new(arg),
                type_expr: Box::new(type_expr),
            },
        )
    }

    /// Pairs each `sig { … }` with the method definition that follows it.
    fn post_ins_seq(&mut self, expr: Expr) -> Expr {
        let loc = expr.loc;
        let ExprKind::InsSeq { stats, expr: last } = expr.kind else {
            return expr;
        };
        let mut all: Vec<Expr> = stats;
        all.push(*last);
        let mut paired: Vec<Expr> = Vec::with_capacity(all.len());
        let mut pending_sig: Option<Expr> = None;
        for stat in all {
            if let Some(sig_body) = self.extract_sig(&stat) {
                if pending_sig.is_some() {
                    // Two sigs in a row; the first one dangles and is kept
                    // as a plain statement.
                    paired.extend(pending_sig.take());
                }
                pending_sig = Some(sig_body);
                continue;
            }
            match (pending_sig.take(), stat) {
                (
                    Some(sig_body),
                    Expr {
                        loc: def_loc,
                        kind:
                            ExprKind::MethodDef {
                                name,
                                args,
                                body,
                                sig: _,
                                flags,
                            },
                    },
                ) => {
                    paired.push(Expr::new(
                        def_loc,
                        ExprKind::MethodDef {
                            name,
                            args,
                            body,
                            sig: Box::new(sig_body),
                            flags,
                        },
                    ));
                }
                (dangling, stat) => {
                    paired.extend(dangling);
                    paired.push(stat);
                }
            }
        }
        paired.extend(pending_sig.take());
        match paired.len() {
            0 => Expr::empty(loc),
            1 => paired.pop().unwrap(),
            _ => {
                let last = paired.pop().unwrap();
                Expr::new(
                    loc,
                    ExprKind::InsSeq {
                        stats: paired,
                        expr: Box::new(last),
                    },
                )
            }
        }
    }

    /// Blocks whose body uses the implicit `_1` parameter get an explicit
    /// parameter list.
    fn post_block(&mut self, expr: Expr) -> Expr {
        let loc = expr.loc;
        let ExprKind::Block { args, body } = expr.kind else {
            return expr;
        };
        if !args.is_empty() {
            return Expr::new(loc, ExprKind::Block { args, body });
        }
        let Some(implicit) = self.gs.names().lookup_utf8("_1") else {
            return Expr::new(loc, ExprKind::Block { args, body });
        };
        let mut uses_implicit = UsesName {
            name: implicit,
            found: false,
        };
        walk_tree(&body, &mut uses_implicit);
        if !uses_implicit.found {
            return Expr::new(loc, ExprKind::Block { args, body });
        }
        let param = Expr::new(
            loc.collapse_to_begin(),
            ExprKind::UnresolvedIdent {
                name: implicit,
                kind: IdentKind::Local,
            },
        );
        Expr::new(
            loc,
            ExprKind::Block {
                args: vec![param],
                body,
            },
        )
    }
}

impl Desugarer<'_> {
    /// The block body of a `sig { … }` statement, if that is what `stat`
    /// is.
    fn extract_sig(&self, stat: &Expr) -> Option<Expr> {
        let ExprKind::Send {
            recv,
            method,
            args,
            ..
        } = &stat.kind
        else {
            return None;
        };
        if !recv.is_empty_tree() || *method != self.gs.wk_names.sig {
            return None;
        }
        let ExprKind::Block { body, .. } = &args.last()?.kind else {
            return None;
        };
        Some(body.deep_copy())
    }
}

struct UsesName {
    name: beryl_core::names::NameRef,
    found: bool,
}

impl beryl_ast::TreeWalker for UsesName {
    fn enter_expr(&mut self, expr: &Expr) -> bool {
        if let ExprKind::UnresolvedIdent { name, .. } = &expr.kind {
            if *name == self.name {
                self.found = true;
            }
        }
        !self.found
    }
}
