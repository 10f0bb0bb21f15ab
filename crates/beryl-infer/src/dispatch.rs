//! Send dispatch: method resolution on the receiver's static type,
//! argument checking, and condition narrowing.

use beryl_cfg::LocalRef;
use beryl_core::loc::Loc;
use beryl_core::names::NameRef;
use beryl_core::symbols::{ArgKind, ClassOrModuleRef, MethodRef, SymbolRef};
use beryl_core::types::Ty;
use beryl_core::{Diagnostic, DiagnosticCode, QueryResponse};
use ecow::eco_format;

use crate::env::{Entry, Env};
use crate::{Infer, Narrow, without_falsy};

impl Infer<'_> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn flow_send(
        &mut self,
        target: LocalRef,
        env: &Env,
        loc: Loc,
        recv: LocalRef,
        method: NameRef,
        num_pos_args: u16,
        args: &[LocalRef],
        is_private_ok: bool,
        _has_block: bool,
    ) -> Entry {
        let recv_entry = env.entry_or_nil(recv);

        // `yield` calls into the passed block; its result is untyped.
        if is_private_ok && self.gs.show_name(method) == "yield" {
            return Entry::typed(Ty::Untyped);
        }

        self.register_narrow(target, env, recv, &recv_entry, method, args);

        // A receiver holding a class object dispatches at the class level.
        if let Some(SymbolRef::ClassOrModule(class_sym)) = recv_entry.alias {
            if !class_sym.is_stub() {
                let ty =
                    self.class_level_send(class_sym, method, loc, env, num_pos_args, args);
                return Entry::typed(ty);
            }
            return Entry::typed(Ty::Untyped);
        }

        let ty = self.dispatch_ty(&recv_entry.ty, method, loc, env, num_pos_args, args);
        Entry::typed(ty)
    }

    fn dispatch_ty(
        &mut self,
        recv_ty: &Ty,
        method: NameRef,
        loc: Loc,
        env: &Env,
        num_pos_args: u16,
        args: &[LocalRef],
    ) -> Ty {
        match recv_ty {
            Ty::Untyped | Ty::Top | Ty::Bottom => Ty::Untyped,
            Ty::Class(sym) => {
                self.call_on_class(*sym, recv_ty, method, loc, env, num_pos_args, args)
            }
            Ty::Applied(applied) => {
                self.call_on_class(applied.class, recv_ty, method, loc, env, num_pos_args, args)
            }
            Ty::Literal(lit) => {
                self.call_on_class(lit.underlying(), recv_ty, method, loc, env, num_pos_args, args)
            }
            Ty::SelfType => {
                let owner = self.ctx.owner;
                self.call_on_class(owner, recv_ty, method, loc, env, num_pos_args, args)
            }
            Ty::TypeVar(var) => {
                let bound = self.gs.symbols().type_member_data(*var).upper_bound.clone();
                self.dispatch_ty(&bound, method, loc, env, num_pos_args, args)
            }
            Ty::Union(parts) => {
                // Componentwise dispatch, joining the results.
                let parts = parts.parts.clone();
                let mut results = Vec::with_capacity(parts.len());
                for part in &parts {
                    results.push(self.dispatch_ty(part, method, loc, env, num_pos_args, args));
                }
                Ty::union_of(results, self.gs.symbols())
            }
            Ty::Intersection(parts) => {
                // The first part that knows the method wins.
                let parts = parts.parts.clone();
                for part in &parts {
                    if let Some(class) = class_of(part) {
                        if self
                            .gs
                            .symbols()
                            .find_member_transitive(class, method)
                            .is_some()
                        {
                            return self
                                .dispatch_ty(part, method, loc, env, num_pos_args, args);
                        }
                    }
                }
                parts
                    .first()
                    .map(|part| self.dispatch_ty(part, method, loc, env, num_pos_args, args))
                    .unwrap_or(Ty::Untyped)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn call_on_class(
        &mut self,
        class: ClassOrModuleRef,
        recv_ty: &Ty,
        method: NameRef,
        loc: Loc,
        env: &Env,
        num_pos_args: u16,
        args: &[LocalRef],
    ) -> Ty {
        if class.is_stub() {
            return Ty::Untyped;
        }
        match self.gs.symbols().find_member_transitive(class, method) {
            Some(SymbolRef::Method(found)) => {
                self.check_call(found, loc, env, num_pos_args, args);
                self.respond_send(found, recv_ty, loc);
                let result = self.gs.symbols().method_data(found).result_type.clone();
                match result {
                    Ty::SelfType => recv_ty.clone(),
                    other => other,
                }
            }
            _ => {
                if self.reporting {
                    self.gs.errors.push_diagnostic(
                        Diagnostic::new(
                            DiagnosticCode::MethodDoesNotExist,
                            loc,
                            eco_format!(
                                "Method `{}` does not exist on `{}`",
                                self.gs.show_name(method),
                                recv_ty.show(self.gs)
                            ),
                        ),
                    );
                }
                Ty::Untyped
            }
        }
    }

    fn class_level_send(
        &mut self,
        class: ClassOrModuleRef,
        method: NameRef,
        loc: Loc,
        env: &Env,
        num_pos_args: u16,
        args: &[LocalRef],
    ) -> Ty {
        let method_name = self.gs.show_name(method);
        if method_name == "new" {
            let init = self.gs.names().lookup_utf8("initialize").and_then(|init| {
                self.gs.symbols().find_member_transitive(class, init)
            });
            if let Some(SymbolRef::Method(init)) = init {
                self.check_call(init, loc, env, num_pos_args, args);
            }
            return Ty::Class(class);
        }
        match self.gs.symbols().find_self_member_transitive(class, method) {
            Some(SymbolRef::Method(found)) => {
                self.check_call(found, loc, env, num_pos_args, args);
                let class_ty = Ty::Class(class);
                self.respond_send(found, &class_ty, loc);
                let result = self.gs.symbols().method_data(found).result_type.clone();
                match result {
                    Ty::SelfType => class_ty,
                    other => other,
                }
            }
            _ => {
                if self.reporting {
                    self.gs.errors.push_diagnostic(Diagnostic::new(
                        DiagnosticCode::MethodDoesNotExist,
                        loc,
                        eco_format!(
                            "Method `{method_name}` does not exist on `{}`",
                            self.gs.show_class(class)
                        ),
                    ));
                }
                Ty::Untyped
            }
        }
    }

    /// Checks argument counts and types against a resolved method.
    fn check_call(
        &mut self,
        method: MethodRef,
        loc: Loc,
        env: &Env,
        num_pos_args: u16,
        args: &[LocalRef],
    ) {
        if !self.reporting {
            return;
        }
        let data = self.gs.symbols().method_data(method);
        let positional: Vec<_> = data
            .positional_args()
            .map(|arg| (arg.name, arg.ty.clone()))
            .collect();
        let required = data.required_arg_count();
        let has_rest = data.has_rest_arg();
        let rest = data
            .arguments
            .iter()
            .find(|arg| arg.kind == ArgKind::Rest)
            .map(|arg| (arg.name, arg.ty.clone()));
        let def_loc = data.decl_loc();
        let method_label = self.gs.show_symbol(SymbolRef::Method(method));

        let given = &args[..(num_pos_args as usize).min(args.len())];
        if given.len() < required || (!has_rest && given.len() > positional.len()) {
            let expected = if has_rest {
                eco_format!("at least {required}")
            } else if required == positional.len() {
                eco_format!("{required}")
            } else {
                eco_format!("{required}..{}", positional.len())
            };
            self.gs.errors.push_diagnostic(
                Diagnostic::new(
                    DiagnosticCode::ArgCountMismatch,
                    loc,
                    eco_format!(
                        "Wrong number of arguments for `{method_label}`: expected {expected}, got {}",
                        given.len()
                    ),
                )
                .with_section(
                    "Method defined here",
                    vec![(def_loc, "definition".into())],
                ),
            );
        }

        for (index, arg_local) in given.iter().enumerate() {
            let (param_name, param_ty) = match positional.get(index) {
                Some(param) => param.clone(),
                None => match &rest {
                    Some((name, ty)) => (*name, ty.clone()),
                    None => break,
                },
            };
            let arg_ty = env.ty_or_nil(*arg_local);
            if !arg_ty.is_subtype_of(&param_ty, self.gs.symbols()) {
                self.gs.errors.push_diagnostic(
                    Diagnostic::new(
                        DiagnosticCode::ArgTypeMismatch,
                        loc,
                        eco_format!(
                            "Expected `{}` but found `{}` for argument `{}`",
                            param_ty.show(self.gs),
                            arg_ty.show(self.gs),
                            self.gs.show_name(param_name)
                        ),
                    )
                    .with_section(
                        eco_format!("`{method_label}` defined here"),
                        vec![(def_loc, "definition".into())],
                    ),
                );
            }
        }

        // Keyword arguments travel as key/value pairs after the
        // positionals; match them by name.
        let mut pairs = args[(num_pos_args as usize).min(args.len())..].chunks_exact(2);
        for pair in &mut pairs {
            let key_ty = env.ty_or_nil(pair[0]);
            let Ty::Literal(lit) = &key_ty else {
                continue;
            };
            let beryl_core::types::LitKind::Sym(key) = lit.kind else {
                continue;
            };
            let param = data
                .arguments
                .iter()
                .find(|arg| arg.kind == ArgKind::Keyword && arg.name == key);
            match param {
                Some(param) => {
                    let value_ty = env.ty_or_nil(pair[1]);
                    if !value_ty.is_subtype_of(&param.ty, self.gs.symbols()) {
                        self.gs.errors.push_diagnostic(Diagnostic::new(
                            DiagnosticCode::ArgTypeMismatch,
                            loc,
                            eco_format!(
                                "Expected `{}` but found `{}` for keyword argument `{}`",
                                param.ty.show(self.gs),
                                value_ty.show(self.gs),
                                self.gs.show_name(key)
                            ),
                        ));
                    }
                }
                None => {
                    self.gs.errors.push_diagnostic(Diagnostic::new(
                        DiagnosticCode::ArgCountMismatch,
                        loc,
                        eco_format!(
                            "Unknown keyword argument `{}` for `{method_label}`",
                            self.gs.show_name(key)
                        ),
                    ));
                }
            }
        }
    }

    fn respond_send(&mut self, method: MethodRef, recv_ty: &Ty, loc: Loc) {
        if !self.reporting {
            return;
        }
        let query = &self.gs.lsp_query;
        if query.matches_loc(loc) || query.matches_symbol(SymbolRef::Method(method)) {
            let return_ty = self.gs.symbols().method_data(method).result_type.clone();
            let return_ty = match return_ty {
                Ty::SelfType => recv_ty.clone(),
                other => other,
            };
            self.gs.errors.push_query_response(QueryResponse::Send {
                loc,
                method,
                receiver_ty: recv_ty.clone(),
                return_ty,
            });
        }
    }

    /// Records how a condition computed by this binding narrows other
    /// locals on its edges.
    fn register_narrow(
        &mut self,
        target: LocalRef,
        env: &Env,
        recv: LocalRef,
        recv_entry: &Entry,
        method: NameRef,
        args: &[LocalRef],
    ) {
        let wk = &self.gs.wk_names;
        if method == wk.is_a_q || method == wk.kind_of_q {
            if let Some(first) = args.first() {
                if let Some(Entry {
                    alias: Some(SymbolRef::ClassOrModule(class)),
                    ..
                }) = env.get(*first)
                {
                    if !class.is_stub() {
                        self.narrows.insert(
                            target,
                            Narrow {
                                target: recv,
                                then_ty: Ty::Class(class),
                                else_ty: recv_entry.ty.clone(),
                            },
                        );
                    }
                }
            }
        } else if method == wk.nil_q {
            self.narrows.insert(
                target,
                Narrow {
                    target: recv,
                    then_ty: Ty::nil(),
                    else_ty: recv_entry.ty.without_nil(self.gs.symbols()),
                },
            );
        } else if method == wk.bang {
            // `!x` inverts whatever `x` proves.
            match self.narrows.get(&recv).cloned() {
                Some(narrow) => {
                    self.narrows.insert(
                        target,
                        Narrow {
                            target: narrow.target,
                            then_ty: narrow.else_ty,
                            else_ty: narrow.then_ty,
                        },
                    );
                }
                None => {
                    self.narrows.insert(
                        target,
                        Narrow {
                            target: recv,
                            then_ty: recv_entry.ty.clone(),
                            else_ty: without_falsy(&recv_entry.ty, self.gs),
                        },
                    );
                }
            }
        } else if method == wk.eq_eq {
            if let Some(first) = args.first() {
                if env.ty_or_nil(*first) == Ty::nil() {
                    self.narrows.insert(
                        target,
                        Narrow {
                            target: recv,
                            then_ty: Ty::nil(),
                            else_ty: recv_entry.ty.without_nil(self.gs.symbols()),
                        },
                    );
                }
            }
        }
    }
}

/// The nominal class behind a type, when there is one.
fn class_of(ty: &Ty) -> Option<ClassOrModuleRef> {
    match ty {
        Ty::Class(sym) => Some(*sym),
        Ty::Applied(applied) => Some(applied.class),
        Ty::Literal(lit) => Some(lit.underlying()),
        _ => None,
    }
}
