//! The rewriter: expands declarative class-body calls into the method
//! definitions they imply at runtime.
//!
//! Currently covers `attr_reader`, `attr_writer`, and `attr_accessor`.
//! Synthesized methods are flagged so diagnostics can tell them apart from
//! user-written ones.

use beryl_ast::{Expr, ExprKind, IdentKind, MethodDefFlags, SendFlags, TreeMapper, map_tree};
use beryl_core::GlobalState;
use beryl_core::loc::LocOffsets;
use beryl_core::names::NameRef;
use beryl_core::types::LitKind;
use ecow::eco_format;

/// Expands rewriter-handled calls in `tree`. Requires an unfrozen name
/// table for the synthesized writer names.
pub fn run(gs: &mut GlobalState, tree: Expr) -> Expr {
    let mut rewriter = Rewriter { gs };
    map_tree(tree, &mut rewriter)
}

struct Rewriter<'gs> {
    gs: &'gs mut GlobalState,
}

enum AttrKind {
    Reader,
    Writer,
    Accessor,
}

impl TreeMapper for Rewriter<'_> {
    fn post_class_def(&mut self, mut expr: Expr) -> Expr {
        let ExprKind::ClassDef { body, .. } = &mut expr.kind else {
            return expr;
        };
        let body_loc = body.loc;
        match &mut body.as_mut().kind {
            ExprKind::InsSeq { stats, expr: last } => {
                let mut rewritten = Vec::with_capacity(stats.len());
                for stat in stats.drain(..) {
                    self.expand_stat(stat, &mut rewritten);
                }
                let last_taken = last.as_mut().take();
                let mut tail = Vec::new();
                self.expand_stat(last_taken, &mut tail);
                match tail.len() {
                    0 => {}
                    1 => **last = tail.pop().unwrap(),
                    _ => {
                        **last = tail.pop().unwrap();
                        rewritten.extend(tail);
                    }
                }
                *stats = rewritten;
            }
            _ => {
                let single = body.as_mut().take();
                let mut rewritten = Vec::new();
                self.expand_stat(single, &mut rewritten);
                if rewritten.len() == 1 {
                    **body = rewritten.pop().unwrap();
                } else if !rewritten.is_empty() {
                    let last = rewritten.pop().unwrap();
                    **body = Expr::new(
                        body_loc,
                        ExprKind::InsSeq {
                            stats: rewritten,
                            expr: Box::new(last),
                        },
                    );
                }
            }
        }
        expr
    }
}

impl Rewriter<'_> {
    /// Pushes `stat` or its expansion onto `out`.
    fn expand_stat(&mut self, stat: Expr, out: &mut Vec<Expr>) {
        let attr = match &stat.kind {
            ExprKind::Send {
                recv,
                method,
                args,
                num_pos_args,
                ..
            } if recv.is_empty_tree() && *num_pos_args as usize == args.len() => {
                let wk = &self.gs.wk_names;
                if *method == wk.attr_reader {
                    Some(AttrKind::Reader)
                } else if *method == wk.attr_writer {
                    Some(AttrKind::Writer)
                } else if *method == wk.attr_accessor {
                    Some(AttrKind::Accessor)
                } else {
                    None
                }
            }
            _ => None,
        };
        let Some(attr) = attr else {
            out.push(stat);
            return;
        };
        let names: Option<Vec<(NameRef, LocOffsets)>> = match &stat.kind {
            ExprKind::Send { args, .. } => args
                .iter()
                .map(|arg| match arg.kind {
                    ExprKind::Literal {
                        value: LitKind::Sym(name),
                    } => Some((name, arg.loc)),
                    _ => None,
                })
                .collect(),
            _ => unreachable!(),
        };
        let Some(names) = names else {
            // Dynamic attribute names cannot be expanded statically; keep
            // the call so inference sees it.
            out.push(stat);
            return;
        };
        for (attr_name, loc) in names {
            match attr {
                AttrKind::Reader => out.push(self.reader(attr_name, loc)),
                AttrKind::Writer => out.push(self.writer(attr_name, loc)),
                AttrKind::Accessor => {
                    out.push(self.reader(attr_name, loc));
                    out.push(self.writer(attr_name, loc));
                }
            }
        }
    }

    fn ivar(&mut self, attr_name: NameRef, loc: LocOffsets) -> Expr {
        let text = eco_format!("@{}", self.gs.show_name(attr_name));
        let name = self.gs.enter_name_utf8(&text);
        Expr::new(
            loc,
            ExprKind::UnresolvedIdent {
                name,
                kind: IdentKind::Instance,
            },
        )
    }

    /// `def name; @name; end`
    fn reader(&mut self, attr_name: NameRef, loc: LocOffsets) -> Expr {
        let body = self.ivar(attr_name, loc);
        Expr::new(
            loc,
            ExprKind::MethodDef {
                name: attr_name,
                args: vec![],
                body: Box::new(body),
                sig: Box::new(Expr::empty(loc)),
                flags: MethodDefFlags {
                    is_self_method: false,
                    is_rewriter_synthesized: true,
                },
            },
        )
    }

    /// `def name=(value); @name = value; end`
    fn writer(&mut self, attr_name: NameRef, loc: LocOffsets) -> Expr {
        let writer_text = eco_format!("{}=", self.gs.show_name(attr_name));
        let writer_name = self.gs.enter_name_utf8(&writer_text);
        let value_name = self.gs.enter_name_utf8("value");
        let param = Expr::new(
            loc,
            ExprKind::UnresolvedIdent {
                name: value_name,
                kind: IdentKind::Local,
            },
        );
        let assign = Expr::new(
            loc,
            ExprKind::Assign {
                lhs: Box::new(self.ivar(attr_name, loc)),
                rhs: Box::new(Expr::new(
                    loc,
                    ExprKind::UnresolvedIdent {
                        name: value_name,
                        kind: IdentKind::Local,
                    },
                )),
            },
        );
        Expr::new(
            loc,
            ExprKind::MethodDef {
                name: writer_name,
                args: vec![param],
                body: Box::new(assign),
                sig: Box::new(Expr::empty(loc)),
                flags: MethodDefFlags {
                    is_self_method: false,
                    is_rewriter_synthesized: true,
                },
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use beryl_ast::{ExprKind, Tag};
    use beryl_core::GlobalState;

    use super::*;

    #[test]
    fn attr_accessor_expands_to_reader_and_writer() {
        let mut gs = GlobalState::new();
        let tree = {
            let mut gs = gs.unfreeze_name_table();
            let parsed =
                beryl_parser::parse(&mut *gs, "class Foo\n  attr_accessor :bar\nend\n");
            assert!(parsed.errors.is_empty());
            run(&mut *gs, parsed.tree)
        };
        let ExprKind::ClassDef { body, .. } = &tree.kind else {
            panic!("expected a class");
        };
        let ExprKind::InsSeq { stats, expr } = &body.kind else {
            panic!("expected two synthesized defs, got {body:?}");
        };
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].tag(), Tag::MethodDef);
        assert_eq!(expr.tag(), Tag::MethodDef);
        let ExprKind::MethodDef { name, flags, .. } = &expr.kind else {
            unreachable!()
        };
        assert_eq!(gs.show_name(*name), "bar=");
        assert!(flags.is_rewriter_synthesized);
    }
}
