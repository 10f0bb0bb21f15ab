//! Deep copying.
//!
//! `deep_copy_avoiding` fails if the traversal reaches a node whose address
//! equals the `avoid` node. Transformations use this to detect a subtree
//! that was illegally moved under itself before committing to a clone.

use crate::nodes::{Expr, ExprKind};

/// The traversal reached the avoided node.
#[derive(Debug, PartialEq, Eq)]
pub struct DeepCopyError;

impl Expr {
    /// Clones the entire subtree.
    pub fn deep_copy(&self) -> Expr {
        match self.copy_avoiding(std::ptr::null()) {
            Ok(copy) => copy,
            // No avoid node, so the traversal cannot fail.
            Err(DeepCopyError) => unreachable!("deep copy without an avoid node cannot fail"),
        }
    }

    /// Clones the subtree, returning `None` if `avoid` occurs anywhere
    /// within it (including at the root).
    pub fn deep_copy_avoiding(&self, avoid: &Expr) -> Option<Expr> {
        self.copy_avoiding(avoid as *const Expr).ok()
    }

    fn copy_avoiding(&self, avoid: *const Expr) -> Result<Expr, DeepCopyError> {
        if std::ptr::eq(self as *const Expr, avoid) {
            return Err(DeepCopyError);
        }
        let kind = match &self.kind {
            ExprKind::EmptyTree => ExprKind::EmptyTree,
            ExprKind::ClassDef {
                declared_kind,
                name,
                superclass,
                body,
            } => ExprKind::ClassDef {
                declared_kind: *declared_kind,
                name: copy_box(name, avoid)?,
                superclass: copy_box(superclass, avoid)?,
                body: copy_box(body, avoid)?,
            },
            ExprKind::MethodDef {
                name,
                args,
                body,
                sig,
                flags,
            } => ExprKind::MethodDef {
                name: *name,
                args: copy_vec(args, avoid)?,
                body: copy_box(body, avoid)?,
                sig: copy_box(sig, avoid)?,
                flags: *flags,
            },
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => ExprKind::If {
                cond: copy_box(cond, avoid)?,
                then_branch: copy_box(then_branch, avoid)?,
                else_branch: copy_box(else_branch, avoid)?,
            },
            ExprKind::While { cond, body } => ExprKind::While {
                cond: copy_box(cond, avoid)?,
                body: copy_box(body, avoid)?,
            },
            ExprKind::For {
                var,
                iterable,
                body,
            } => ExprKind::For {
                var: copy_box(var, avoid)?,
                iterable: copy_box(iterable, avoid)?,
                body: copy_box(body, avoid)?,
            },
            ExprKind::Break { expr } => ExprKind::Break {
                expr: copy_box(expr, avoid)?,
            },
            ExprKind::Next { expr } => ExprKind::Next {
                expr: copy_box(expr, avoid)?,
            },
            ExprKind::Return { expr } => ExprKind::Return {
                expr: copy_box(expr, avoid)?,
            },
            ExprKind::Rescue {
                body,
                cases,
                else_branch,
                ensure,
            } => ExprKind::Rescue {
                body: copy_box(body, avoid)?,
                cases: copy_vec(cases, avoid)?,
                else_branch: copy_box(else_branch, avoid)?,
                ensure: copy_box(ensure, avoid)?,
            },
            ExprKind::RescueCase {
                exceptions,
                var,
                body,
            } => ExprKind::RescueCase {
                exceptions: copy_vec(exceptions, avoid)?,
                var: copy_box(var, avoid)?,
                body: copy_box(body, avoid)?,
            },
            ExprKind::Assign { lhs, rhs } => ExprKind::Assign {
                lhs: copy_box(lhs, avoid)?,
                rhs: copy_box(rhs, avoid)?,
            },
            ExprKind::OpAssign { lhs, op, rhs } => ExprKind::OpAssign {
                lhs: copy_box(lhs, avoid)?,
                op: *op,
                rhs: copy_box(rhs, avoid)?,
            },
            ExprKind::MultiAssign { lhs, rhs } => ExprKind::MultiAssign {
                lhs: copy_vec(lhs, avoid)?,
                rhs: copy_box(rhs, avoid)?,
            },
            ExprKind::Send {
                recv,
                method,
                flags,
                num_pos_args,
                args,
            } => ExprKind::Send {
                recv: copy_box(recv, avoid)?,
                method: *method,
                flags: *flags,
                num_pos_args: *num_pos_args,
                args: copy_vec(args, avoid)?,
            },
            ExprKind::Block { args, body } => ExprKind::Block {
                args: copy_vec(args, avoid)?,
                body: copy_box(body, avoid)?,
            },
            ExprKind::Hash { keys, values } => ExprKind::Hash {
                keys: copy_vec(keys, avoid)?,
                values: copy_vec(values, avoid)?,
            },
            ExprKind::Array { elems } => ExprKind::Array {
                elems: copy_vec(elems, avoid)?,
            },
            ExprKind::Literal { value } => ExprKind::Literal { value: *value },
            ExprKind::DString { parts } => ExprKind::DString {
                parts: copy_vec(parts, avoid)?,
            },
            ExprKind::UnresolvedConstant { scope, name } => ExprKind::UnresolvedConstant {
                scope: copy_box(scope, avoid)?,
                name: *name,
            },
            ExprKind::ConstantRoot => ExprKind::ConstantRoot,
            ExprKind::ConstantLit { symbol } => ExprKind::ConstantLit { symbol: *symbol },
            ExprKind::InsSeq { stats, expr } => ExprKind::InsSeq {
                stats: copy_vec(stats, avoid)?,
                expr: copy_box(expr, avoid)?,
            },
            ExprKind::Local { name, unique } => ExprKind::Local {
                name: *name,
                unique: *unique,
            },
            ExprKind::UnresolvedIdent { name, kind } => ExprKind::UnresolvedIdent {
                name: *name,
                kind: *kind,
            },
            ExprKind::SelfExpr => ExprKind::SelfExpr,
            ExprKind::RestArg { name } => ExprKind::RestArg {
                name: copy_box(name, avoid)?,
            },
            ExprKind::KeywordArg { name, default } => ExprKind::KeywordArg {
                name: copy_box(name, avoid)?,
                default: copy_box(default, avoid)?,
            },
            ExprKind::OptionalArg { name, default } => ExprKind::OptionalArg {
                name: copy_box(name, avoid)?,
                default: copy_box(default, avoid)?,
            },
            ExprKind::BlockArg { name } => ExprKind::BlockArg {
                name: copy_box(name, avoid)?,
            },
            ExprKind::ShadowArg { name } => ExprKind::ShadowArg {
                name: copy_box(name, avoid)?,
            },
            ExprKind::Cast {
                cast_kind,
                arg,
                type_expr,
            } => ExprKind::Cast {
                cast_kind: *cast_kind,
                arg: copy_box(arg, avoid)?,
                type_expr: copy_box(type_expr, avoid)?,
            },
            ExprKind::ZSuperArgs => ExprKind::ZSuperArgs,
            ExprKind::RuntimeMethodDefinition { name, is_self } => {
                ExprKind::RuntimeMethodDefinition {
                    name: *name,
                    is_self: *is_self,
                }
            }
        };
        Ok(Expr::new(self.loc, kind))
    }
}

fn copy_box(expr: &Expr, avoid: *const Expr) -> Result<Box<Expr>, DeepCopyError> {
    Ok(Box::new(expr.copy_avoiding(avoid)?))
}

fn copy_vec(exprs: &[Expr], avoid: *const Expr) -> Result<Vec<Expr>, DeepCopyError> {
    exprs.iter().map(|expr| expr.copy_avoiding(avoid)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use beryl_core::loc::LocOffsets;
    use beryl_core::types::LitKind;

    fn lit(value: i64) -> Expr {
        Expr::new(
            LocOffsets::new(0, 1),
            ExprKind::Literal {
                value: LitKind::Int(value),
            },
        )
    }

    fn seq(stats: Vec<Expr>, expr: Expr) -> Expr {
        Expr::new(
            LocOffsets::new(0, 10),
            ExprKind::InsSeq {
                stats,
                expr: Box::new(expr),
            },
        )
    }

    #[test]
    fn deep_copy_is_structurally_equal() {
        let tree = seq(vec![lit(1), lit(2)], lit(3));
        let copy = tree.deep_copy();
        assert!(tree.structurally_equal(&copy));
    }

    #[test]
    fn avoid_inside_the_subtree_fails_the_copy() {
        let tree = seq(vec![lit(1)], lit(2));
        let ExprKind::InsSeq { stats, .. } = &tree.kind else {
            unreachable!()
        };
        assert!(tree.deep_copy_avoiding(&stats[0]).is_none());
        // Avoiding an unrelated node succeeds.
        let unrelated = lit(9);
        assert!(tree.deep_copy_avoiding(&unrelated).is_some());
    }

    #[test]
    fn avoid_at_the_root_fails_the_copy() {
        let tree = lit(1);
        assert!(tree.deep_copy_avoiding(&tree).is_none());
    }
}
