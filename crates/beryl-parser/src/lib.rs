//! The reference Beryl parser.
//!
//! Produces the sugared tree consumed by the desugarer, with
//! statement-level error recovery: a file with syntax errors still yields a
//! tree, so downstream passes can run and report what they can.

mod lexer;
mod parser;

pub use lexer::{Keyword, LexError, Op, StrPart, Token, TokenKind, lex};
pub use parser::{ParseDiagnostic, ParseResult, parse};

#[cfg(test)]
mod tests {
    use beryl_ast::{ExprKind, to_source};
    use beryl_core::GlobalState;

    use super::*;

    fn parse_ok(gs: &mut GlobalState, source: &str) -> beryl_ast::Expr {
        let mut gs = gs.unfreeze_name_table();
        let result = parse(&mut *gs, source);
        assert!(result.errors.is_empty(), "errors: {:?}", result.errors);
        result.tree
    }

    #[test]
    fn parses_a_class_with_a_method() {
        let mut gs = GlobalState::new();
        let tree = parse_ok(
            &mut gs,
            "class Foo < Bar\n  def baz(x, y = 1)\n    x + y\n  end\nend\n",
        );
        let ExprKind::ClassDef {
            name, superclass, ..
        } = &tree.kind
        else {
            panic!("expected a class definition, got {tree:?}");
        };
        assert!(matches!(name.kind, ExprKind::UnresolvedConstant { .. }));
        assert!(matches!(
            superclass.kind,
            ExprKind::UnresolvedConstant { .. }
        ));
    }

    #[test]
    fn operators_parse_as_sends() {
        let mut gs = GlobalState::new();
        let tree = parse_ok(&mut gs, "a = 1 + 2 * 3\n");
        let ExprKind::Assign { rhs, .. } = &tree.kind else {
            panic!("expected an assignment");
        };
        // Multiplication binds tighter than addition.
        let ExprKind::Send { method, args, .. } = &rhs.kind else {
            panic!("expected a send");
        };
        assert_eq!(gs.show_name(*method), "+");
        assert!(matches!(args[0].kind, ExprKind::Send { .. }));
    }

    #[test]
    fn interpolated_strings_become_dstrings() {
        let mut gs = GlobalState::new();
        let tree = parse_ok(&mut gs, "\"a#{b}c\"\n");
        let ExprKind::DString { parts } = &tree.kind else {
            panic!("expected a dstring, got {tree:?}");
        };
        assert_eq!(parts.len(), 3);
        assert!(matches!(parts[1].kind, ExprKind::UnresolvedIdent { .. }));
    }

    #[test]
    fn syntax_errors_are_recovered() {
        let mut gs = GlobalState::new();
        let mut gs = gs.unfreeze_name_table();
        let result = parse(&mut *gs, "class Foo\n  def : broken\nend\nx = 1\n");
        assert!(!result.errors.is_empty());
        // The file still produces a tree.
        assert!(!result.tree.is_empty_tree());
    }

    #[test]
    fn print_then_parse_is_structurally_equal() {
        let mut gs = GlobalState::new();
        let source = "\
class Calc
  def add(x, y = 0)
    total = x + y
    if total > 10
      puts(\"big\")
    else
      puts(\"small\")
    end
    total
  end
end
";
        let tree = parse_ok(&mut gs, source);
        let printed = to_source(&gs, &tree);
        let reparsed = parse_ok(&mut gs, &printed);
        assert!(
            tree.structurally_equal(&reparsed),
            "print/parse round trip changed the tree:\n{printed}"
        );
    }

    #[test]
    fn multi_assign_and_op_assign_parse_as_sugar() {
        let mut gs = GlobalState::new();
        let tree = parse_ok(&mut gs, "a, b = pair()\n");
        assert!(matches!(tree.kind, ExprKind::MultiAssign { .. }));
        let tree = parse_ok(&mut gs, "a += 1\n");
        assert!(matches!(tree.kind, ExprKind::OpAssign { .. }));
    }

    #[test]
    fn blocks_attach_to_their_send() {
        let mut gs = GlobalState::new();
        let tree = parse_ok(&mut gs, "xs.each do |x|\n  puts(x)\nend\n");
        let ExprKind::Send { method, args, .. } = &tree.kind else {
            panic!("expected a send");
        };
        assert_eq!(gs.show_name(*method), "each");
        assert!(matches!(
            args.last().map(|a| &a.kind),
            Some(ExprKind::Block { .. })
        ));
    }
}
