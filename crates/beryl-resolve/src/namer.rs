//! The namer: one traversal per file that enters every class, module,
//! method, field, and static field into the symbol table.
//!
//! Must run inside name- and symbol-table unfreeze scopes. The namer never
//! resolves anything: superclasses, mixins, and signature types wait for
//! the resolver.

use beryl_ast::{Expr, ExprKind, ParsedFile, visit_children};
use beryl_core::loc::Loc;
use beryl_core::names::NameRef;
use beryl_core::symbols::{
    ArgInfo, ArgKind, ClassKind, ClassOrModuleRef, MethodFlags, SymbolRef, TypeMemberData,
    Variance,
};
use beryl_core::types::{LitKind, Ty};
use beryl_core::{Diagnostic, DiagnosticCode, FileRef, GlobalState};
use ecow::eco_format;
use smallvec::smallvec;

/// Names every file in order. `gs` must have its name and symbol tables
/// unfrozen.
pub fn run(gs: &mut GlobalState, files: &[ParsedFile]) {
    assert!(
        gs.name_table_unfrozen() && gs.symbol_table_unfrozen(),
        "namer requires unfrozen name and symbol tables"
    );
    for file in files {
        name_one(gs, file);
    }
}

/// Names a single file.
pub fn name_one(gs: &mut GlobalState, file: &ParsedFile) {
    log::debug!("naming {:?}", file.file);
    let mut namer = Namer {
        gs,
        file: file.file,
        owners: vec![ClassOrModuleRef::ROOT],
    };
    namer.walk(&file.tree, false);
}

struct Namer<'gs> {
    gs: &'gs mut GlobalState,
    file: FileRef,
    owners: Vec<ClassOrModuleRef>,
}

impl Namer<'_> {
    fn owner(&self) -> ClassOrModuleRef {
        *self.owners.last().unwrap()
    }

    fn loc(&self, expr: &Expr) -> Loc {
        Loc::new(self.file, expr.loc)
    }

    fn walk(&mut self, expr: &Expr, in_method: bool) {
        match &expr.kind {
            ExprKind::ClassDef {
                declared_kind,
                name,
                body,
                superclass: _,
            } => {
                let kind = match declared_kind {
                    beryl_ast::ClassDefKind::Class => ClassKind::Class,
                    beryl_ast::ClassDefKind::Module => ClassKind::Module,
                };
                let Some(sym) = self.enter_path(name, kind, self.loc(expr)) else {
                    return;
                };
                self.owners.push(sym);
                self.walk(body, false);
                self.owners.pop();
            }
            ExprKind::MethodDef {
                name,
                args,
                body,
                sig,
                flags,
            } => {
                self.enter_method_def(expr, *name, args, sig, flags);
                for arg in args {
                    self.walk(arg, true);
                }
                self.walk(body, true);
            }
            ExprKind::Assign { lhs, rhs } => {
                match &lhs.kind {
                    ExprKind::UnresolvedConstant { scope, name } if scope.is_empty_tree() => {
                        self.enter_constant_assign(*name, rhs, self.loc(lhs));
                    }
                    ExprKind::UnresolvedIdent {
                        name,
                        kind: beryl_ast::IdentKind::Instance,
                    } if in_method => {
                        self.gs.enter_field(self.owner(), *name, false, self.loc(lhs));
                    }
                    _ => {}
                }
                self.walk(rhs, in_method);
            }
            _ => visit_children(expr, &mut |child| self.walk(child, in_method)),
        }
    }

    /// Finds or creates the scope a definition path names, creating
    /// placeholder scopes for intermediate segments.
    fn enter_path(&mut self, expr: &Expr, kind: ClassKind, loc: Loc) -> Option<ClassOrModuleRef> {
        match &expr.kind {
            ExprKind::UnresolvedConstant { scope, name } => {
                let parent = match &scope.kind {
                    ExprKind::EmptyTree => self.owner(),
                    ExprKind::ConstantRoot => ClassOrModuleRef::ROOT,
                    _ => self.enter_path(scope, ClassKind::Unknown, Loc::NONE)?,
                };
                Some(self.gs.enter_class(parent, *name, kind, loc))
            }
            ExprKind::ConstantLit { symbol } => symbol.as_class_or_module(),
            _ => None,
        }
    }

    fn enter_method_def(
        &mut self,
        expr: &Expr,
        name: NameRef,
        args: &[Expr],
        sig: &Expr,
        flags: &beryl_ast::MethodDefFlags,
    ) {
        let owner = self.owner();
        let arguments: Vec<ArgInfo> = args.iter().filter_map(|arg| self.arg_info(arg)).collect();
        let loc = self.loc(expr);
        let method_flags = MethodFlags {
            is_self_method: flags.is_self_method,
            is_rewriter_synthesized: flags.is_rewriter_synthesized,
            ..MethodFlags::default()
        };

        // Reopening with an identical argument shape adds a definition site
        // to the existing symbol rather than minting a new one.
        let existing = if flags.is_self_method {
            self.gs.symbols().find_self_member(owner, name)
        } else {
            self.gs.symbols().find_member(owner, name)
        };
        if let Some(SymbolRef::Method(prev)) = existing {
            let prev_data = self.gs.symbols().method_data(prev);
            let same_shape = prev_data.arguments.len() == arguments.len()
                && prev_data
                    .arguments
                    .iter()
                    .zip(&arguments)
                    .all(|(a, b)| a.kind == b.kind);
            if same_shape {
                self.gs.method_data_mut(prev).locs.push(loc);
                return;
            }
            let prev_loc = prev_data.decl_loc();
            let header = eco_format!(
                "Method `{}` redefined with a different argument shape",
                self.gs.show_name(name)
            );
            self.gs.errors.push_diagnostic(
                Diagnostic::new(DiagnosticCode::MethodRedefined, loc, header).with_section(
                    "Previous definition",
                    vec![(prev_loc, "defined here".into())],
                ),
            );
        }

        let (sym, _) = self
            .gs
            .enter_method(owner, name, arguments, method_flags, loc);
        if !sig.is_empty_tree() {
            self.gs.method_data_mut(sym).has_sig = true;
        }
    }

    fn enter_constant_assign(&mut self, name: NameRef, rhs: &Expr, loc: Loc) {
        // `X = type_member` declares a type member, anything else a static
        // field.
        if let ExprKind::Send {
            recv,
            method,
            args,
            ..
        } = &rhs.kind
        {
            if recv.is_empty_tree() && self.gs.show_name(*method) == "type_member" {
                let variance = match args.first().map(|arg| &arg.kind) {
                    Some(ExprKind::Literal {
                        value: LitKind::Sym(sym),
                    }) => match self.gs.show_name(*sym).as_str() {
                        "out" => Variance::Covariant,
                        "in" => Variance::Contravariant,
                        _ => Variance::Invariant,
                    },
                    _ => Variance::Invariant,
                };
                let owner = self.owner();
                let member = self.gs.enter_type_member(TypeMemberData {
                    owner,
                    name,
                    variance,
                    upper_bound: Ty::Top,
                    lower_bound: Ty::Bottom,
                    locs: smallvec![loc],
                });
                self.gs
                    .class_data_mut(owner)
                    .members
                    .insert(name, member.into());
                return;
            }
        }
        self.gs.enter_field(self.owner(), name, true, loc);
    }

    fn arg_info(&mut self, expr: &Expr) -> Option<ArgInfo> {
        let (kind, name_node) = match &expr.kind {
            ExprKind::UnresolvedIdent { .. } | ExprKind::Local { .. } => {
                (ArgKind::Positional, expr)
            }
            ExprKind::OptionalArg { name, .. } => (ArgKind::Optional, name.as_ref()),
            ExprKind::RestArg { name } => (ArgKind::Rest, name.as_ref()),
            ExprKind::KeywordArg { name, .. } => (ArgKind::Keyword, name.as_ref()),
            ExprKind::BlockArg { name } => (ArgKind::Block, name.as_ref()),
            _ => return None,
        };
        let name = match &name_node.kind {
            ExprKind::UnresolvedIdent { name, .. } | ExprKind::Local { name, .. } => *name,
            _ => return None,
        };
        Some(ArgInfo {
            name,
            kind,
            ty: Ty::Untyped,
            loc: self.loc(expr),
        })
    }
}

#[cfg(test)]
mod tests {
    use beryl_ast::ParsedFile;
    use beryl_core::files::FileType;
    use beryl_core::well_known;

    use super::*;

    fn name_source(gs: &mut GlobalState, source: &str) {
        let fref = {
            let mut gs = gs.unfreeze_file_table();
            gs.enter_file("test.brl", source, FileType::Normal)
        };
        let mut unfrozen = gs.unfreeze_for_namer();
        let parsed = beryl_parser::parse(&mut unfrozen, source);
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        let file = ParsedFile {
            tree: parsed.tree,
            file: fref,
            silenced: false,
        };
        name_one(&mut unfrozen, &file);
    }

    fn find_class(gs: &GlobalState, name: &str) -> ClassOrModuleRef {
        let root = gs.symbols().class_data(ClassOrModuleRef::ROOT);
        root.members
            .iter()
            .find(|(member, _)| gs.show_name(**member) == name)
            .and_then(|(_, sym)| sym.as_class_or_module())
            .unwrap_or_else(|| panic!("class {name} not entered"))
    }

    #[test]
    fn classes_and_methods_are_entered() {
        let mut gs = GlobalState::new();
        name_source(
            &mut gs,
            "class Foo\n  def bar(x)\n  end\n  def self.baz\n  end\nend\n",
        );
        let foo = find_class(&gs, "Foo");
        let bar = gs.names().lookup_utf8("bar").unwrap();
        let baz = gs.names().lookup_utf8("baz").unwrap();
        assert!(gs.symbols().find_member(foo, bar).is_some());
        assert!(gs.symbols().find_self_member(foo, baz).is_some());
        assert!(gs.symbols().find_member(foo, baz).is_none());
    }

    #[test]
    fn reopening_a_method_with_same_shape_adds_a_loc() {
        let mut gs = GlobalState::new();
        name_source(
            &mut gs,
            "class Foo\n  def bar(x)\n  end\nend\nclass Foo\n  def bar(y)\n  end\nend\n",
        );
        let foo = find_class(&gs, "Foo");
        let bar = gs.names().lookup_utf8("bar").unwrap();
        let SymbolRef::Method(bar) = gs.symbols().find_member(foo, bar).unwrap() else {
            panic!("expected a method");
        };
        assert_eq!(gs.symbols().method_data(bar).locs.len(), 2);
        assert!(gs.errors.drain().0.is_empty());
    }

    #[test]
    fn redefinition_with_new_shape_diagnoses() {
        let mut gs = GlobalState::new();
        name_source(
            &mut gs,
            "class Foo\n  def bar(x)\n  end\n  def bar(x, y)\n  end\nend\n",
        );
        let (diags, _) = gs.errors.drain();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, DiagnosticCode::MethodRedefined);
    }

    #[test]
    fn constant_assignment_enters_a_static_field() {
        let mut gs = GlobalState::new();
        name_source(&mut gs, "class Foo\n  LIMIT = 10\nend\n");
        let foo = find_class(&gs, "Foo");
        let limit = gs
            .symbols()
            .class_data(foo)
            .members
            .iter()
            .find(|(name, _)| gs.show_name(**name) == "LIMIT")
            .map(|(_, sym)| *sym)
            .unwrap();
        let SymbolRef::Field(limit) = limit else {
            panic!("expected a field");
        };
        assert!(gs.symbols().field_data(limit).is_static);
        // Builtins stay where they were.
        assert_eq!(gs.show_class(well_known::INTEGER), "Integer");
    }
}
