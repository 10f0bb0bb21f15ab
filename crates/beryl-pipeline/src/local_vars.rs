//! Local-variable numbering.
//!
//! Replaces every lexically bound `UnresolvedIdent` with a `Local` carrying
//! a unique (name, version) pair, and turns unbound bare identifiers into
//! the implicit-self sends they actually are. This pass never fails:
//! ill-scoped programs get a best-effort numbering so later passes can
//! proceed.

use beryl_ast::{Expr, ExprKind, IdentKind, SendFlags};
use beryl_core::names::NameRef;
use rustc_hash::FxHashMap;

/// Numbers the locals of one tree.
pub fn run(tree: Expr) -> Expr {
    let mut ctx = LocalVars {
        scopes: vec![Scope::opaque()],
        versions: FxHashMap::default(),
    };
    ctx.transform(tree, false)
}

/// One lexical scope. Blocks are transparent for lookup (they read their
/// enclosing scope); methods and class bodies are opaque.
struct Scope {
    bindings: FxHashMap<NameRef, u32>,
    transparent: bool,
}

impl Scope {
    fn opaque() -> Scope {
        Scope {
            bindings: FxHashMap::default(),
            transparent: false,
        }
    }

    fn transparent() -> Scope {
        Scope {
            bindings: FxHashMap::default(),
            transparent: true,
        }
    }
}

struct LocalVars {
    scopes: Vec<Scope>,
    /// Per-method version counters, so shadowing block-locals get fresh
    /// versions of the same base name.
    versions: FxHashMap<NameRef, u32>,
}

impl LocalVars {
    fn lookup(&self, name: NameRef) -> Option<u32> {
        for scope in self.scopes.iter().rev() {
            if let Some(&version) = scope.bindings.get(&name) {
                return Some(version);
            }
            if !scope.transparent {
                break;
            }
        }
        None
    }

    fn declare(&mut self, name: NameRef) -> u32 {
        let counter = self.versions.entry(name).or_insert(0);
        *counter += 1;
        let version = *counter;
        self.scopes
            .last_mut()
            .unwrap()
            .bindings
            .insert(name, version);
        version
    }

    /// Declares `name` for an assignment: writes to an enclosing binding
    /// reuse its version, first writes bind in the current scope.
    fn declare_for_write(&mut self, name: NameRef) -> u32 {
        match self.lookup(name) {
            Some(version) => version,
            None => self.declare(name),
        }
    }

    fn with_scope<R>(&mut self, scope: Scope, f: impl FnOnce(&mut Self) -> R) -> R {
        self.scopes.push(scope);
        let result = f(self);
        self.scopes.pop();
        result
    }

    fn transform_box(&mut self, expr: Box<Expr>, assign_lhs: bool) -> Box<Expr> {
        Box::new(self.transform(*expr, assign_lhs))
    }

    fn transform_vec(&mut self, exprs: Vec<Expr>, assign_lhs: bool) -> Vec<Expr> {
        exprs
            .into_iter()
            .map(|expr| self.transform(expr, assign_lhs))
            .collect()
    }

    /// Declares a parameter node's name, rewriting it to a `Local`.
    fn declare_param(&mut self, param: Expr) -> Expr {
        let loc = param.loc;
        match param.kind {
            ExprKind::UnresolvedIdent {
                name,
                kind: IdentKind::Local,
            } => {
                let unique = self.declare(name);
                Expr::new(loc, ExprKind::Local { name, unique })
            }
            ExprKind::OptionalArg { name, default } => {
                let name = self.declare_param(*name);
                // Defaults are evaluated in the method scope, after the
                // parameters to their left are bound.
                let default = self.transform_box(default, false);
                Expr::new(
                    loc,
                    ExprKind::OptionalArg {
                        name: Box::new(name),
                        default,
                    },
                )
            }
            ExprKind::KeywordArg { name, default } => {
                let name = self.declare_param(*name);
                let default = self.transform_box(default, false);
                Expr::new(
                    loc,
                    ExprKind::KeywordArg {
                        name: Box::new(name),
                        default,
                    },
                )
            }
            ExprKind::RestArg { name } => {
                let name = self.declare_param(*name);
                Expr::new(
                    loc,
                    ExprKind::RestArg {
                        name: Box::new(name),
                    },
                )
            }
            ExprKind::BlockArg { name } => {
                let name = self.declare_param(*name);
                Expr::new(
                    loc,
                    ExprKind::BlockArg {
                        name: Box::new(name),
                    },
                )
            }
            ExprKind::ShadowArg { name } => {
                // Shadow parameters always bind fresh in the block scope.
                let name = self.declare_param(*name);
                Expr::new(
                    loc,
                    ExprKind::ShadowArg {
                        name: Box::new(name),
                    },
                )
            }
            other => Expr::new(loc, other),
        }
    }

    fn transform(&mut self, expr: Expr, assign_lhs: bool) -> Expr {
        let loc = expr.loc;
        let kind = match expr.kind {
            ExprKind::UnresolvedIdent {
                name,
                kind: IdentKind::Local,
            } => {
                if assign_lhs {
                    let unique = self.declare_for_write(name);
                    ExprKind::Local { name, unique }
                } else {
                    match self.lookup(name) {
                        Some(unique) => ExprKind::Local { name, unique },
                        // Not a local: a bare name is a call on `self`.
                        None => ExprKind::Send {
                            recv: Box::new(Expr::empty(loc.collapse_to_begin())),
                            method: name,
                            flags: SendFlags {
                                is_private_ok: true,
                            },
                            num_pos_args: 0,
                            args: vec![],
                        },
                    }
                }
            }
            ExprKind::MethodDef {
                name,
                args,
                body,
                sig,
                flags,
            } => {
                let saved_versions = std::mem::take(&mut self.versions);
                let (args, body) = self.with_scope(Scope::opaque(), |ctx| {
                    let args = args
                        .into_iter()
                        .map(|param| ctx.declare_param(param))
                        .collect();
                    let body = ctx.transform_box(body, false);
                    (args, body)
                });
                self.versions = saved_versions;
                ExprKind::MethodDef {
                    name,
                    args,
                    body,
                    sig,
                    flags,
                }
            }
            ExprKind::ClassDef {
                declared_kind,
                name,
                superclass,
                body,
            } => {
                let name = self.transform_box(name, false);
                let superclass = self.transform_box(superclass, false);
                let saved_versions = std::mem::take(&mut self.versions);
                let body = self.with_scope(Scope::opaque(), |ctx| ctx.transform_box(body, false));
                self.versions = saved_versions;
                ExprKind::ClassDef {
                    declared_kind,
                    name,
                    superclass,
                    body,
                }
            }
            ExprKind::Block { args, body } => {
                self.with_scope(Scope::transparent(), |ctx| {
                    let args = args
                        .into_iter()
                        .map(|param| ctx.declare_param(param))
                        .collect();
                    let body = ctx.transform_box(body, false);
                    ExprKind::Block { args, body }
                })
            }
            ExprKind::RescueCase {
                exceptions,
                var,
                body,
            } => {
                let exceptions = self.transform_vec(exceptions, false);
                // The rescue binding is scoped to its clause.
                self.with_scope(Scope::transparent(), |ctx| {
                    let var = match var.kind {
                        ExprKind::UnresolvedIdent {
                            name,
                            kind: IdentKind::Local,
                        } => {
                            let unique = ctx.declare(name);
                            Box::new(Expr::new(var.loc, ExprKind::Local { name, unique }))
                        }
                        other => Box::new(Expr::new(var.loc, other)),
                    };
                    let body = ctx.transform_box(body, false);
                    ExprKind::RescueCase {
                        exceptions,
                        var,
                        body,
                    }
                })
            }
            ExprKind::Assign { lhs, rhs } => {
                // The target binds before the value is evaluated, so
                // `x = x` reads the new (nil) local rather than calling a
                // method.
                let lhs = self.transform_box(lhs, true);
                let rhs = self.transform_box(rhs, false);
                ExprKind::Assign { lhs, rhs }
            }
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => ExprKind::If {
                cond: self.transform_box(cond, false),
                then_branch: self.transform_box(then_branch, false),
                else_branch: self.transform_box(else_branch, false),
            },
            ExprKind::While { cond, body } => ExprKind::While {
                cond: self.transform_box(cond, false),
                body: self.transform_box(body, false),
            },
            ExprKind::For {
                var,
                iterable,
                body,
            } => ExprKind::For {
                var: self.transform_box(var, true),
                iterable: self.transform_box(iterable, false),
                body: self.transform_box(body, false),
            },
            ExprKind::Break { expr } => ExprKind::Break {
                expr: self.transform_box(expr, false),
            },
            ExprKind::Next { expr } => ExprKind::Next {
                expr: self.transform_box(expr, false),
            },
            ExprKind::Return { expr } => ExprKind::Return {
                expr: self.transform_box(expr, false),
            },
            ExprKind::Rescue {
                body,
                cases,
                else_branch,
                ensure,
            } => ExprKind::Rescue {
                body: self.transform_box(body, false),
                cases: self.transform_vec(cases, false),
                else_branch: self.transform_box(else_branch, false),
                ensure: self.transform_box(ensure, false),
            },
            ExprKind::OpAssign { lhs, op, rhs } => ExprKind::OpAssign {
                lhs: self.transform_box(lhs, true),
                op,
                rhs: self.transform_box(rhs, false),
            },
            ExprKind::MultiAssign { lhs, rhs } => ExprKind::MultiAssign {
                lhs: self.transform_vec(lhs, true),
                rhs: self.transform_box(rhs, false),
            },
            ExprKind::Send {
                recv,
                method,
                flags,
                num_pos_args,
                args,
            } => ExprKind::Send {
                recv: self.transform_box(recv, false),
                method,
                flags,
                num_pos_args,
                args: self.transform_vec(args, false),
            },
            ExprKind::Hash { keys, values } => ExprKind::Hash {
                keys: self.transform_vec(keys, false),
                values: self.transform_vec(values, false),
            },
            ExprKind::Array { elems } => ExprKind::Array {
                elems: self.transform_vec(elems, false),
            },
            ExprKind::DString { parts } => ExprKind::DString {
                parts: self.transform_vec(parts, false),
            },
            ExprKind::UnresolvedConstant { scope, name } => ExprKind::UnresolvedConstant {
                scope: self.transform_box(scope, false),
                name,
            },
            ExprKind::InsSeq { stats, expr } => ExprKind::InsSeq {
                stats: self.transform_vec(stats, false),
                expr: self.transform_box(expr, false),
            },
            ExprKind::Cast {
                cast_kind,
                arg,
                type_expr,
            } => ExprKind::Cast {
                cast_kind,
                arg: self.transform_box(arg, false),
                type_expr,
            },
            other => other,
        };
        Expr::new(loc, kind)
    }
}
