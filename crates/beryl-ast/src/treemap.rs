//! Tree traversal and transformation.
//!
//! [`map_tree`] rebuilds a tree bottom-up, visiting children in source
//! order and letting a [`TreeMapper`] substitute nodes through pre- and
//! post-hooks; hooks that are not overridden are the identity. [`walk_tree`]
//! is the read-only companion.

use crate::nodes::{Expr, ExprKind, Tag};

/// Transformation hooks. `pre_*` hooks run before a node's children are
/// visited and may replace the node wholesale (children of the replacement
/// are then visited); `post_*` hooks run after.
#[allow(unused_variables, missing_docs)]
pub trait TreeMapper {
    fn pre_class_def(&mut self, expr: Expr) -> Expr {
        expr
    }
    fn post_class_def(&mut self, expr: Expr) -> Expr {
        expr
    }
    fn pre_method_def(&mut self, expr: Expr) -> Expr {
        expr
    }
    fn post_method_def(&mut self, expr: Expr) -> Expr {
        expr
    }
    fn pre_send(&mut self, expr: Expr) -> Expr {
        expr
    }
    fn post_send(&mut self, expr: Expr) -> Expr {
        expr
    }
    fn pre_block(&mut self, expr: Expr) -> Expr {
        expr
    }
    fn post_block(&mut self, expr: Expr) -> Expr {
        expr
    }
    fn pre_ins_seq(&mut self, expr: Expr) -> Expr {
        expr
    }
    fn post_ins_seq(&mut self, expr: Expr) -> Expr {
        expr
    }
    fn post_if(&mut self, expr: Expr) -> Expr {
        expr
    }
    fn post_while(&mut self, expr: Expr) -> Expr {
        expr
    }
    fn post_for(&mut self, expr: Expr) -> Expr {
        expr
    }
    fn post_break(&mut self, expr: Expr) -> Expr {
        expr
    }
    fn post_next(&mut self, expr: Expr) -> Expr {
        expr
    }
    fn post_return(&mut self, expr: Expr) -> Expr {
        expr
    }
    fn post_rescue(&mut self, expr: Expr) -> Expr {
        expr
    }
    fn post_rescue_case(&mut self, expr: Expr) -> Expr {
        expr
    }
    fn post_assign(&mut self, expr: Expr) -> Expr {
        expr
    }
    fn post_op_assign(&mut self, expr: Expr) -> Expr {
        expr
    }
    fn post_multi_assign(&mut self, expr: Expr) -> Expr {
        expr
    }
    fn post_hash(&mut self, expr: Expr) -> Expr {
        expr
    }
    fn post_array(&mut self, expr: Expr) -> Expr {
        expr
    }
    fn post_literal(&mut self, expr: Expr) -> Expr {
        expr
    }
    fn post_dstring(&mut self, expr: Expr) -> Expr {
        expr
    }
    fn post_unresolved_constant(&mut self, expr: Expr) -> Expr {
        expr
    }
    fn post_constant_lit(&mut self, expr: Expr) -> Expr {
        expr
    }
    fn post_local(&mut self, expr: Expr) -> Expr {
        expr
    }
    fn post_unresolved_ident(&mut self, expr: Expr) -> Expr {
        expr
    }
    fn post_cast(&mut self, expr: Expr) -> Expr {
        expr
    }
}

/// Rebuilds `expr` through `mapper`. Children are visited in source order.
pub fn map_tree<M: TreeMapper>(expr: Expr, mapper: &mut M) -> Expr {
    let expr = match expr.tag() {
        Tag::ClassDef => mapper.pre_class_def(expr),
        Tag::MethodDef => mapper.pre_method_def(expr),
        Tag::Send => mapper.pre_send(expr),
        Tag::Block => mapper.pre_block(expr),
        Tag::InsSeq => mapper.pre_ins_seq(expr),
        _ => expr,
    };

    let loc = expr.loc;
    let kind = match expr.kind {
        kind @ (ExprKind::EmptyTree
        | ExprKind::Literal { .. }
        | ExprKind::ConstantRoot
        | ExprKind::ConstantLit { .. }
        | ExprKind::Local { .. }
        | ExprKind::UnresolvedIdent { .. }
        | ExprKind::SelfExpr
        | ExprKind::ZSuperArgs
        | ExprKind::RuntimeMethodDefinition { .. }) => kind,
        ExprKind::ClassDef {
            declared_kind,
            name,
            superclass,
            body,
        } => ExprKind::ClassDef {
            declared_kind,
            name: map_box(name, mapper),
            superclass: map_box(superclass, mapper),
            body: map_box(body, mapper),
        },
        ExprKind::MethodDef {
            name,
            args,
            body,
            sig,
            flags,
        } => ExprKind::MethodDef {
            name,
            args: map_vec(args, mapper),
            body: map_box(body, mapper),
            sig: map_box(sig, mapper),
            flags,
        },
        ExprKind::If {
            cond,
            then_branch,
            else_branch,
        } => ExprKind::If {
            cond: map_box(cond, mapper),
            then_branch: map_box(then_branch, mapper),
            else_branch: map_box(else_branch, mapper),
        },
        ExprKind::While { cond, body } => ExprKind::While {
            cond: map_box(cond, mapper),
            body: map_box(body, mapper),
        },
        ExprKind::For {
            var,
            iterable,
            body,
        } => ExprKind::For {
            var: map_box(var, mapper),
            iterable: map_box(iterable, mapper),
            body: map_box(body, mapper),
        },
        ExprKind::Break { expr } => ExprKind::Break {
            expr: map_box(expr, mapper),
        },
        ExprKind::Next { expr } => ExprKind::Next {
            expr: map_box(expr, mapper),
        },
        ExprKind::Return { expr } => ExprKind::Return {
            expr: map_box(expr, mapper),
        },
        ExprKind::Rescue {
            body,
            cases,
            else_branch,
            ensure,
        } => ExprKind::Rescue {
            body: map_box(body, mapper),
            cases: map_vec(cases, mapper),
            else_branch: map_box(else_branch, mapper),
            ensure: map_box(ensure, mapper),
        },
        ExprKind::RescueCase {
            exceptions,
            var,
            body,
        } => ExprKind::RescueCase {
            exceptions: map_vec(exceptions, mapper),
            var: map_box(var, mapper),
            body: map_box(body, mapper),
        },
        ExprKind::Assign { lhs, rhs } => ExprKind::Assign {
            lhs: map_box(lhs, mapper),
            rhs: map_box(rhs, mapper),
        },
        ExprKind::OpAssign { lhs, op, rhs } => ExprKind::OpAssign {
            lhs: map_box(lhs, mapper),
            op,
            rhs: map_box(rhs, mapper),
        },
        ExprKind::MultiAssign { lhs, rhs } => ExprKind::MultiAssign {
            lhs: map_vec(lhs, mapper),
            rhs: map_box(rhs, mapper),
        },
        ExprKind::Send {
            recv,
            method,
            flags,
            num_pos_args,
            args,
        } => ExprKind::Send {
            recv: map_box(recv, mapper),
            method,
            flags,
            num_pos_args,
            args: map_vec(args, mapper),
        },
        ExprKind::Block { args, body } => ExprKind::Block {
            args: map_vec(args, mapper),
            body: map_box(body, mapper),
        },
        ExprKind::Hash { keys, values } => {
            // Keys and values are visited interleaved, matching source
            // order.
            let (keys, values) = keys
                .into_iter()
                .zip(values)
                .map(|(key, value)| (map_tree(key, mapper), map_tree(value, mapper)))
                .unzip();
            ExprKind::Hash { keys, values }
        }
        ExprKind::Array { elems } => ExprKind::Array {
            elems: map_vec(elems, mapper),
        },
        ExprKind::DString { parts } => ExprKind::DString {
            parts: map_vec(parts, mapper),
        },
        ExprKind::UnresolvedConstant { scope, name } => ExprKind::UnresolvedConstant {
            scope: map_box(scope, mapper),
            name,
        },
        ExprKind::InsSeq { stats, expr } => ExprKind::InsSeq {
            stats: map_vec(stats, mapper),
            expr: map_box(expr, mapper),
        },
        ExprKind::RestArg { name } => ExprKind::RestArg {
            name: map_box(name, mapper),
        },
        ExprKind::KeywordArg { name, default } => ExprKind::KeywordArg {
            name: map_box(name, mapper),
            default: map_box(default, mapper),
        },
        ExprKind::OptionalArg { name, default } => ExprKind::OptionalArg {
            name: map_box(name, mapper),
            default: map_box(default, mapper),
        },
        ExprKind::BlockArg { name } => ExprKind::BlockArg {
            name: map_box(name, mapper),
        },
        ExprKind::ShadowArg { name } => ExprKind::ShadowArg {
            name: map_box(name, mapper),
        },
        ExprKind::Cast {
            cast_kind,
            arg,
            type_expr,
        } => ExprKind::Cast {
            cast_kind,
            arg: map_box(arg, mapper),
            type_expr: map_box(type_expr, mapper),
        },
    };

    let expr = Expr::new(loc, kind);
    match expr.tag() {
        Tag::ClassDef => mapper.post_class_def(expr),
        Tag::MethodDef => mapper.post_method_def(expr),
        Tag::Send => mapper.post_send(expr),
        Tag::Block => mapper.post_block(expr),
        Tag::InsSeq => mapper.post_ins_seq(expr),
        Tag::If => mapper.post_if(expr),
        Tag::While => mapper.post_while(expr),
        Tag::For => mapper.post_for(expr),
        Tag::Break => mapper.post_break(expr),
        Tag::Next => mapper.post_next(expr),
        Tag::Return => mapper.post_return(expr),
        Tag::Rescue => mapper.post_rescue(expr),
        Tag::RescueCase => mapper.post_rescue_case(expr),
        Tag::Assign => mapper.post_assign(expr),
        Tag::OpAssign => mapper.post_op_assign(expr),
        Tag::MultiAssign => mapper.post_multi_assign(expr),
        Tag::Hash => mapper.post_hash(expr),
        Tag::Array => mapper.post_array(expr),
        Tag::Literal => mapper.post_literal(expr),
        Tag::DString => mapper.post_dstring(expr),
        Tag::UnresolvedConstant => mapper.post_unresolved_constant(expr),
        Tag::ConstantLit => mapper.post_constant_lit(expr),
        Tag::Local => mapper.post_local(expr),
        Tag::UnresolvedIdent => mapper.post_unresolved_ident(expr),
        Tag::Cast => mapper.post_cast(expr),
        _ => expr,
    }
}

fn map_box<M: TreeMapper>(expr: Box<Expr>, mapper: &mut M) -> Box<Expr> {
    Box::new(map_tree(*expr, mapper))
}

fn map_vec<M: TreeMapper>(exprs: Vec<Expr>, mapper: &mut M) -> Vec<Expr> {
    exprs
        .into_iter()
        .map(|expr| map_tree(expr, mapper))
        .collect()
}

/// Read-only traversal hooks.
#[allow(unused_variables)]
pub trait TreeWalker {
    /// Called before a node's children; return `false` to skip them.
    fn enter_expr(&mut self, expr: &Expr) -> bool {
        true
    }

    /// Called after a node's children.
    fn leave_expr(&mut self, expr: &Expr) {}
}

/// Visits `expr` preorder through `walker`, children in source order.
pub fn walk_tree<W: TreeWalker>(expr: &Expr, walker: &mut W) {
    if !walker.enter_expr(expr) {
        return;
    }
    visit_children(expr, &mut |child| walk_tree(child, walker));
    walker.leave_expr(expr);
}

/// Applies `f` to each direct child, in source order.
pub fn visit_children<'e>(expr: &'e Expr, f: &mut impl FnMut(&'e Expr)) {
    match &expr.kind {
        ExprKind::EmptyTree
        | ExprKind::Literal { .. }
        | ExprKind::ConstantRoot
        | ExprKind::ConstantLit { .. }
        | ExprKind::Local { .. }
        | ExprKind::UnresolvedIdent { .. }
        | ExprKind::SelfExpr
        | ExprKind::ZSuperArgs
        | ExprKind::RuntimeMethodDefinition { .. } => {}
        ExprKind::ClassDef {
            name,
            superclass,
            body,
            ..
        } => {
            f(name);
            f(superclass);
            f(body);
        }
        ExprKind::MethodDef {
            args, body, sig, ..
        } => {
            f(sig);
            for arg in args {
                f(arg);
            }
            f(body);
        }
        ExprKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            f(cond);
            f(then_branch);
            f(else_branch);
        }
        ExprKind::While { cond, body } => {
            f(cond);
            f(body);
        }
        ExprKind::For {
            var,
            iterable,
            body,
        } => {
            f(var);
            f(iterable);
            f(body);
        }
        ExprKind::Break { expr } | ExprKind::Next { expr } | ExprKind::Return { expr } => f(expr),
        ExprKind::Rescue {
            body,
            cases,
            else_branch,
            ensure,
        } => {
            f(body);
            for case in cases {
                f(case);
            }
            f(else_branch);
            f(ensure);
        }
        ExprKind::RescueCase {
            exceptions,
            var,
            body,
        } => {
            for exception in exceptions {
                f(exception);
            }
            f(var);
            f(body);
        }
        ExprKind::Assign { lhs, rhs } => {
            f(lhs);
            f(rhs);
        }
        ExprKind::OpAssign { lhs, rhs, .. } => {
            f(lhs);
            f(rhs);
        }
        ExprKind::MultiAssign { lhs, rhs } => {
            for target in lhs {
                f(target);
            }
            f(rhs);
        }
        ExprKind::Send { recv, args, .. } => {
            f(recv);
            for arg in args {
                f(arg);
            }
        }
        ExprKind::Block { args, body } => {
            for arg in args {
                f(arg);
            }
            f(body);
        }
        ExprKind::Hash { keys, values } => {
            for (key, value) in keys.iter().zip(values) {
                f(key);
                f(value);
            }
        }
        ExprKind::Array { elems } => {
            for elem in elems {
                f(elem);
            }
        }
        ExprKind::DString { parts } => {
            for part in parts {
                f(part);
            }
        }
        ExprKind::UnresolvedConstant { scope, .. } => f(scope),
        ExprKind::InsSeq { stats, expr } => {
            for stat in stats {
                f(stat);
            }
            f(expr);
        }
        ExprKind::RestArg { name }
        | ExprKind::BlockArg { name }
        | ExprKind::ShadowArg { name } => f(name),
        ExprKind::KeywordArg { name, default } | ExprKind::OptionalArg { name, default } => {
            f(name);
            f(default);
        }
        ExprKind::Cast {
            arg, type_expr, ..
        } => {
            f(arg);
            f(type_expr);
        }
    }
}

#[cfg(test)]
mod tests {
    use beryl_core::loc::LocOffsets;
    use beryl_core::types::LitKind;

    use super::*;

    struct IncrementInts;

    impl TreeMapper for IncrementInts {
        fn post_literal(&mut self, mut expr: Expr) -> Expr {
            if let ExprKind::Literal {
                value: LitKind::Int(n),
            } = &mut expr.kind
            {
                *n += 1;
            }
            expr
        }
    }

    #[test]
    fn post_hooks_substitute_in_place() {
        let tree = Expr::new(
            LocOffsets::new(0, 5),
            ExprKind::Array {
                elems: vec![
                    Expr::new(
                        LocOffsets::new(1, 2),
                        ExprKind::Literal {
                            value: LitKind::Int(1),
                        },
                    ),
                    Expr::new(
                        LocOffsets::new(3, 4),
                        ExprKind::Literal {
                            value: LitKind::Int(2),
                        },
                    ),
                ],
            },
        );
        let mapped = map_tree(tree, &mut IncrementInts);
        let ExprKind::Array { elems } = &mapped.kind else {
            unreachable!()
        };
        assert!(matches!(
            elems[0].kind,
            ExprKind::Literal {
                value: LitKind::Int(2)
            }
        ));
        assert!(matches!(
            elems[1].kind,
            ExprKind::Literal {
                value: LitKind::Int(3)
            }
        ));
    }

    #[test]
    fn walk_visits_every_node() {
        struct Counter(usize);
        impl TreeWalker for Counter {
            fn enter_expr(&mut self, _expr: &Expr) -> bool {
                self.0 += 1;
                true
            }
        }
        let tree = Expr::new(
            LocOffsets::new(0, 5),
            ExprKind::Array {
                elems: vec![
                    Expr::empty(LocOffsets::NONE),
                    Expr::empty(LocOffsets::NONE),
                ],
            },
        );
        let mut counter = Counter(0);
        walk_tree(&tree, &mut counter);
        assert_eq!(counter.0, 3);
    }
}
