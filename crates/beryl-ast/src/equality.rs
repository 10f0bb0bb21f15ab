//! Structural equality, ignoring source locations.
//!
//! The comparator takes an optional `avoid` node: reaching it on either
//! side aborts the comparison, which the public entry points report as
//! "not equal". Callers use this to treat one node as different from
//! everything below it.

use beryl_core::types::LitKind;

use crate::nodes::{Expr, ExprKind};

/// The comparison reached the avoided node.
struct MatchedAvoid;

type EqResult = Result<bool, MatchedAvoid>;

impl Expr {
    /// Whether two trees have the same shape, ignoring locations.
    pub fn structurally_equal(&self, other: &Expr) -> bool {
        self.eq_avoiding(other, std::ptr::null()).unwrap_or(false)
    }

    /// Like [`Expr::structurally_equal`], but `avoid` compares unequal to
    /// everything, aborting any comparison that reaches it.
    pub fn structurally_equal_avoiding(&self, other: &Expr, avoid: &Expr) -> bool {
        self.eq_avoiding(other, avoid as *const Expr)
            .unwrap_or(false)
    }

    fn eq_avoiding(&self, other: &Expr, avoid: *const Expr) -> EqResult {
        if std::ptr::eq(self as *const Expr, avoid) || std::ptr::eq(other as *const Expr, avoid) {
            return Err(MatchedAvoid);
        }
        match (&self.kind, &other.kind) {
            (ExprKind::EmptyTree, ExprKind::EmptyTree)
            | (ExprKind::SelfExpr, ExprKind::SelfExpr)
            | (ExprKind::ConstantRoot, ExprKind::ConstantRoot)
            | (ExprKind::ZSuperArgs, ExprKind::ZSuperArgs) => Ok(true),
            (
                ExprKind::ClassDef {
                    declared_kind: lk,
                    name: ln,
                    superclass: ls,
                    body: lb,
                },
                ExprKind::ClassDef {
                    declared_kind: rk,
                    name: rn,
                    superclass: rs,
                    body: rb,
                },
            ) => Ok(lk == rk
                && ln.eq_avoiding(rn, avoid)?
                && ls.eq_avoiding(rs, avoid)?
                && lb.eq_avoiding(rb, avoid)?),
            (
                ExprKind::MethodDef {
                    name: ln,
                    args: la,
                    body: lb,
                    sig: lsig,
                    flags: lf,
                },
                ExprKind::MethodDef {
                    name: rn,
                    args: ra,
                    body: rb,
                    sig: rsig,
                    flags: rf,
                },
            ) => Ok(ln == rn
                && lf == rf
                && eq_vec(la, ra, avoid)?
                && lb.eq_avoiding(rb, avoid)?
                && lsig.eq_avoiding(rsig, avoid)?),
            (
                ExprKind::If {
                    cond: lc,
                    then_branch: lt,
                    else_branch: le,
                },
                ExprKind::If {
                    cond: rc,
                    then_branch: rt,
                    else_branch: re,
                },
            ) => Ok(lc.eq_avoiding(rc, avoid)?
                && lt.eq_avoiding(rt, avoid)?
                && le.eq_avoiding(re, avoid)?),
            (
                ExprKind::While { cond: lc, body: lb },
                ExprKind::While { cond: rc, body: rb },
            ) => Ok(lc.eq_avoiding(rc, avoid)? && lb.eq_avoiding(rb, avoid)?),
            (
                ExprKind::For {
                    var: lv,
                    iterable: li,
                    body: lb,
                },
                ExprKind::For {
                    var: rv,
                    iterable: ri,
                    body: rb,
                },
            ) => Ok(lv.eq_avoiding(rv, avoid)?
                && li.eq_avoiding(ri, avoid)?
                && lb.eq_avoiding(rb, avoid)?),
            (ExprKind::Break { expr: l }, ExprKind::Break { expr: r })
            | (ExprKind::Next { expr: l }, ExprKind::Next { expr: r })
            | (ExprKind::Return { expr: l }, ExprKind::Return { expr: r }) => {
                l.eq_avoiding(r, avoid)
            }
            (
                ExprKind::Rescue {
                    body: lb,
                    cases: lc,
                    else_branch: le,
                    ensure: lens,
                },
                ExprKind::Rescue {
                    body: rb,
                    cases: rc,
                    else_branch: re,
                    ensure: rens,
                },
            ) => Ok(lb.eq_avoiding(rb, avoid)?
                && eq_vec(lc, rc, avoid)?
                && le.eq_avoiding(re, avoid)?
                && lens.eq_avoiding(rens, avoid)?),
            (
                ExprKind::RescueCase {
                    exceptions: le,
                    var: lv,
                    body: lb,
                },
                ExprKind::RescueCase {
                    exceptions: re,
                    var: rv,
                    body: rb,
                },
            ) => Ok(eq_vec(le, re, avoid)?
                && lv.eq_avoiding(rv, avoid)?
                && lb.eq_avoiding(rb, avoid)?),
            (
                ExprKind::Assign { lhs: ll, rhs: lr },
                ExprKind::Assign { lhs: rl, rhs: rr },
            ) => Ok(ll.eq_avoiding(rl, avoid)? && lr.eq_avoiding(rr, avoid)?),
            (
                ExprKind::OpAssign {
                    lhs: ll,
                    op: lo,
                    rhs: lr,
                },
                ExprKind::OpAssign {
                    lhs: rl,
                    op: ro,
                    rhs: rr,
                },
            ) => Ok(lo == ro && ll.eq_avoiding(rl, avoid)? && lr.eq_avoiding(rr, avoid)?),
            (
                ExprKind::MultiAssign { lhs: ll, rhs: lr },
                ExprKind::MultiAssign { lhs: rl, rhs: rr },
            ) => Ok(eq_vec(ll, rl, avoid)? && lr.eq_avoiding(rr, avoid)?),
            (
                ExprKind::Send {
                    recv: lrecv,
                    method: lm,
                    flags: lf,
                    num_pos_args: lnum,
                    args: largs,
                },
                ExprKind::Send {
                    recv: rrecv,
                    method: rm,
                    flags: rf,
                    num_pos_args: rnum,
                    args: rargs,
                },
            ) => {
                // Callee, flags, and positional-arg count first; the raw
                // argument list is compared in order (keyword ordering is
                // significant).
                Ok(lm == rm
                    && lf == rf
                    && lnum == rnum
                    && lrecv.eq_avoiding(rrecv, avoid)?
                    && eq_vec(largs, rargs, avoid)?)
            }
            (
                ExprKind::Block { args: la, body: lb },
                ExprKind::Block { args: ra, body: rb },
            ) => Ok(eq_vec(la, ra, avoid)? && lb.eq_avoiding(rb, avoid)?),
            (
                ExprKind::Hash {
                    keys: lk,
                    values: lv,
                },
                ExprKind::Hash {
                    keys: rk,
                    values: rv,
                },
            ) => Ok(eq_vec(lk, rk, avoid)? && eq_vec(lv, rv, avoid)?),
            (ExprKind::Array { elems: l }, ExprKind::Array { elems: r }) => eq_vec(l, r, avoid),
            (ExprKind::Literal { value: l }, ExprKind::Literal { value: r }) => {
                Ok(lit_eq(*l, *r))
            }
            (ExprKind::DString { parts: l }, ExprKind::DString { parts: r }) => {
                eq_vec(l, r, avoid)
            }
            (
                ExprKind::UnresolvedConstant {
                    scope: ls,
                    name: ln,
                },
                ExprKind::UnresolvedConstant {
                    scope: rs,
                    name: rn,
                },
            ) => Ok(ln == rn && ls.eq_avoiding(rs, avoid)?),
            (ExprKind::ConstantLit { symbol: l }, ExprKind::ConstantLit { symbol: r }) => {
                Ok(l == r)
            }
            (
                ExprKind::InsSeq { stats: ls, expr: le },
                ExprKind::InsSeq { stats: rs, expr: re },
            ) => Ok(eq_vec(ls, rs, avoid)? && le.eq_avoiding(re, avoid)?),
            (
                ExprKind::Local {
                    name: ln,
                    unique: lu,
                },
                ExprKind::Local {
                    name: rn,
                    unique: ru,
                },
            ) => Ok(ln == rn && lu == ru),
            (
                ExprKind::UnresolvedIdent { name: ln, kind: lk },
                ExprKind::UnresolvedIdent { name: rn, kind: rk },
            ) => Ok(ln == rn && lk == rk),
            (ExprKind::RestArg { name: l }, ExprKind::RestArg { name: r })
            | (ExprKind::BlockArg { name: l }, ExprKind::BlockArg { name: r })
            | (ExprKind::ShadowArg { name: l }, ExprKind::ShadowArg { name: r }) => {
                l.eq_avoiding(r, avoid)
            }
            (
                ExprKind::KeywordArg {
                    name: ln,
                    default: ld,
                },
                ExprKind::KeywordArg {
                    name: rn,
                    default: rd,
                },
            )
            | (
                ExprKind::OptionalArg {
                    name: ln,
                    default: ld,
                },
                ExprKind::OptionalArg {
                    name: rn,
                    default: rd,
                },
            ) => Ok(ln.eq_avoiding(rn, avoid)? && ld.eq_avoiding(rd, avoid)?),
            (
                ExprKind::Cast {
                    cast_kind: lk,
                    arg: la,
                    type_expr: lt,
                },
                ExprKind::Cast {
                    cast_kind: rk,
                    arg: ra,
                    type_expr: rt,
                },
            ) => Ok(lk == rk && la.eq_avoiding(ra, avoid)? && lt.eq_avoiding(rt, avoid)?),
            (
                ExprKind::RuntimeMethodDefinition {
                    name: ln,
                    is_self: ls,
                },
                ExprKind::RuntimeMethodDefinition {
                    name: rn,
                    is_self: rs,
                },
            ) => Ok(ln == rn && ls == rs),
            _ => Ok(false),
        }
    }
}

/// Literal comparison: numeric kinds compare by value, named kinds by kind
/// plus interned name.
fn lit_eq(lhs: LitKind, rhs: LitKind) -> bool {
    match (lhs, rhs) {
        (LitKind::Int(l), LitKind::Int(r)) => l == r,
        (LitKind::Float(l), LitKind::Float(r)) => f64::from_bits(l) == f64::from_bits(r),
        _ => lhs == rhs,
    }
}

fn eq_vec(lhs: &[Expr], rhs: &[Expr], avoid: *const Expr) -> EqResult {
    if lhs.len() != rhs.len() {
        return Ok(false);
    }
    for (l, r) in lhs.iter().zip(rhs) {
        if !l.eq_avoiding(r, avoid)? {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use beryl_core::loc::LocOffsets;
    use beryl_core::types::LitKind;

    use crate::nodes::{Expr, ExprKind, SendFlags};

    fn lit_at(offset: u32, value: i64) -> Expr {
        Expr::new(
            LocOffsets::new(offset, offset + 1),
            ExprKind::Literal {
                value: LitKind::Int(value),
            },
        )
    }

    #[test]
    fn equality_ignores_locations() {
        assert!(lit_at(0, 7).structurally_equal(&lit_at(90, 7)));
        assert!(!lit_at(0, 7).structurally_equal(&lit_at(0, 8)));
    }

    #[test]
    fn float_literals_compare_numerically() {
        let l = Expr::new(
            LocOffsets::NONE,
            ExprKind::Literal {
                value: LitKind::Float(1.5f64.to_bits()),
            },
        );
        let r = Expr::new(
            LocOffsets::NONE,
            ExprKind::Literal {
                value: LitKind::Float(1.5f64.to_bits()),
            },
        );
        assert!(l.structurally_equal(&r));
        let nan = Expr::new(
            LocOffsets::NONE,
            ExprKind::Literal {
                value: LitKind::Float(f64::NAN.to_bits()),
            },
        );
        assert!(!nan.structurally_equal(&nan.deep_copy()));
    }

    #[test]
    fn send_compares_positional_count() {
        let send = |num_pos_args| {
            Expr::new(
                LocOffsets::NONE,
                ExprKind::Send {
                    recv: Box::new(Expr::empty(LocOffsets::NONE)),
                    method: beryl_core::names::NameRef::from_index(0),
                    flags: SendFlags::default(),
                    num_pos_args,
                    args: vec![],
                },
            )
        };
        assert!(send(0).structurally_equal(&send(0)));
        assert!(!send(0).structurally_equal(&send(1)));
    }

    #[test]
    fn avoid_makes_a_node_unequal_to_itself() {
        let tree = lit_at(0, 1);
        assert!(tree.structurally_equal(&tree));
        assert!(!tree.structurally_equal_avoiding(&tree, &tree));
        let copy = tree.deep_copy();
        // An avoid node outside both trees changes nothing.
        let unrelated = lit_at(0, 2);
        assert!(tree.structurally_equal_avoiding(&copy, &unrelated));
    }
}
