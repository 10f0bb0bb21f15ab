//! End-to-end pipeline scenarios: source text in, diagnostics out.

use beryl_ast::ParsedFile;
use beryl_core::files::FileType;
use beryl_core::{Diagnostic, DiagnosticCode, GlobalState, Query};
use beryl_pipeline::{hash_file, index, name_and_resolve, run_typecheck};

fn slow_path(gs: &mut GlobalState, sources: &[(&str, &str)]) -> Vec<ParsedFile> {
    let frefs: Vec<_> = {
        let mut unfrozen = gs.unfreeze_file_table();
        sources
            .iter()
            .map(|(path, text)| unfrozen.enter_file(*path, *text, FileType::Normal))
            .collect()
    };
    let indexed = {
        let mut unfrozen = gs.unfreeze_for_indexing();
        index(&mut unfrozen, &frefs, false).unwrap()
    };
    let resolved = name_and_resolve(gs, indexed, false).unwrap();
    let refs: Vec<&ParsedFile> = resolved.iter().collect();
    run_typecheck(gs, &refs, false).unwrap();
    resolved
}

fn diagnostics(gs: &mut GlobalState, sources: &[(&str, &str)]) -> Vec<Diagnostic> {
    slow_path(gs, sources);
    gs.errors.drain().0
}

#[test]
fn integer_plus_string_is_an_argument_mismatch() {
    let mut gs = GlobalState::new();
    let diags = diagnostics(
        &mut gs,
        &[(
            "foo.brl",
            "# typed: true\nclass Foo\n  def bar\n    1 + \"x\"\n  end\nend\n",
        )],
    );
    assert_eq!(diags.len(), 1, "{diags:?}");
    assert_eq!(diags[0].code, DiagnosticCode::ArgTypeMismatch);
    assert!(
        diags[0].header.contains("Expected `Integer`"),
        "{}",
        diags[0].header
    );
    assert!(
        diags[0].header.contains("String(\"x\")"),
        "{}",
        diags[0].header
    );
}

#[test]
fn untyped_files_keep_inference_quiet() {
    let mut gs = GlobalState::new();
    let diags = diagnostics(
        &mut gs,
        &[(
            "foo.brl",
            "# typed: false\nclass Foo\n  def bar\n    1 + \"x\"\n  end\nend\n",
        )],
    );
    assert!(diags.is_empty(), "{diags:?}");
}

#[test]
fn signatures_check_returns_and_calls() {
    let mut gs = GlobalState::new();
    let diags = diagnostics(
        &mut gs,
        &[(
            "sig.brl",
            "# typed: true\n\
             class Calc\n\
             \x20\x20sig { params(x: Integer).returns(String) }\n\
             \x20\x20def stringify(x)\n\
             \x20\x20\x20\x20x\n\
             \x20\x20end\n\
             end\n",
        )],
    );
    assert_eq!(diags.len(), 1, "{diags:?}");
    assert_eq!(diags[0].code, DiagnosticCode::ReturnTypeMismatch);
}

#[test]
fn method_calls_check_against_signatures() {
    let mut gs = GlobalState::new();
    let diags = diagnostics(
        &mut gs,
        &[(
            "call.brl",
            "# typed: true\n\
             class Calc\n\
             \x20\x20sig { params(x: Integer).returns(Integer) }\n\
             \x20\x20def double(x)\n\
             \x20\x20\x20\x20x + x\n\
             \x20\x20end\n\
             \x20\x20sig { returns(Integer) }\n\
             \x20\x20def go\n\
             \x20\x20\x20\x20double(\"nope\")\n\
             \x20\x20end\n\
             end\n",
        )],
    );
    assert_eq!(diags.len(), 1, "{diags:?}");
    assert_eq!(diags[0].code, DiagnosticCode::ArgTypeMismatch);
    // The related section points at the definition.
    assert!(!diags[0].sections.is_empty());
}

#[test]
fn method_does_not_exist_diagnoses() {
    let mut gs = GlobalState::new();
    let diags = diagnostics(
        &mut gs,
        &[(
            "missing.brl",
            "# typed: true\nclass Foo\n  def bar\n    1.frobnicate\n  end\nend\n",
        )],
    );
    assert_eq!(diags.len(), 1, "{diags:?}");
    assert_eq!(diags[0].code, DiagnosticCode::MethodDoesNotExist);
}

#[test]
fn is_a_narrows_on_the_true_branch() {
    let mut gs = GlobalState::new();
    let diags = diagnostics(
        &mut gs,
        &[(
            "narrow.brl",
            "# typed: true\n\
             class Foo\n\
             \x20\x20sig { params(x: T.any(Integer, String)).returns(Integer) }\n\
             \x20\x20def pick(x)\n\
             \x20\x20\x20\x20if x.is_a?(Integer)\n\
             \x20\x20\x20\x20\x20\x20x + 1\n\
             \x20\x20\x20\x20else\n\
             \x20\x20\x20\x20\x20\x200\n\
             \x20\x20\x20\x20end\n\
             \x20\x20end\n\
             end\n",
        )],
    );
    // Without narrowing, `x + 1` on Integer|String would report a missing
    // or mismatched `+`.
    assert!(diags.is_empty(), "{diags:?}");
}

#[test]
fn t_let_checks_its_value() {
    let mut gs = GlobalState::new();
    let diags = diagnostics(
        &mut gs,
        &[(
            "let.brl",
            "# typed: true\nclass Foo\n  def bar\n    x = T.let(\"s\", Integer)\n    x\n  end\nend\n",
        )],
    );
    assert_eq!(diags.len(), 1, "{diags:?}");
    assert_eq!(diags[0].code, DiagnosticCode::CastFailure);
}

#[test]
fn accessor_rewrites_typecheck_end_to_end() {
    let mut gs = GlobalState::new();
    let diags = diagnostics(
        &mut gs,
        &[(
            "attrs.brl",
            "# typed: true\n\
             class Person\n\
             \x20\x20attr_accessor :name\n\
             \x20\x20def greet\n\
             \x20\x20\x20\x20self.name\n\
             \x20\x20end\n\
             end\n",
        )],
    );
    assert!(diags.is_empty(), "{diags:?}");
}

#[test]
fn constants_resolve_across_files() {
    let mut gs = GlobalState::new();
    let diags = diagnostics(
        &mut gs,
        &[
            ("a.brl", "# typed: true\nclass A\n  def go\n    0\n  end\nend\n"),
            (
                "b.brl",
                "# typed: true\nclass B < A\n  def run\n    A.new.go\n  end\nend\n",
            ),
        ],
    );
    assert!(diags.is_empty(), "{diags:?}");
}

#[test]
fn syntax_errors_silence_inference_but_not_parsing() {
    let mut gs = GlobalState::new();
    let diags = diagnostics(
        &mut gs,
        &[(
            "broken.brl",
            "# typed: true\nclass Foo\n  def bar(\n    1 + \"x\"\n  end\nend\n",
        )],
    );
    assert!(!diags.is_empty());
    assert!(
        diags
            .iter()
            .all(|d| d.code == DiagnosticCode::ParseSyntax),
        "{diags:?}"
    );
}

#[test]
fn queries_surface_hover_information() {
    let mut gs = GlobalState::new();
    let source = "# typed: true\nclass Foo\n  def bar\n    1 + 2\n  end\nend\n";
    let files = slow_path(&mut gs, &[("hover.brl", source)]);
    gs.errors.drain();

    // Hover over the `+` send.
    let offset = source.find("1 + 2").unwrap() as u32 + 2;
    gs.lsp_query = Query::AtOffset {
        file: files[0].file,
        offset,
    };
    let refs: Vec<&ParsedFile> = files.iter().collect();
    run_typecheck(&gs, &refs, false).unwrap();
    gs.lsp_query = Query::None;
    let (_, responses) = gs.errors.drain();
    assert!(
        responses.iter().any(|resp| matches!(
            resp,
            beryl_core::QueryResponse::Send { .. }
        )),
        "{responses:?}"
    );
}

#[test]
fn desugaring_is_idempotent() {
    let mut gs = GlobalState::new();
    let source = "\
def greet(names)
  for n in names
    puts(\"hi #{n}\")
  end
  a, b = pair()
  a += 1
end
";
    let mut unfrozen = gs.unfreeze_name_table();
    let parsed = beryl_parser::parse(&mut unfrozen, source);
    assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
    let once = beryl_pipeline::desugar::run(&mut unfrozen, parsed.tree);
    let twice = beryl_pipeline::desugar::run(&mut unfrozen, once.deep_copy());
    assert!(once.structurally_equal(&twice));
}

#[test]
fn printing_a_desugared_tree_round_trips_through_the_parser() {
    let mut gs = GlobalState::new();
    let source = "\
def greet(names)
  for n in names
    puts(\"hi #{n}\")
  end
end
";
    let mut unfrozen = gs.unfreeze_name_table();
    let parsed = beryl_parser::parse(&mut unfrozen, source);
    assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
    let desugared = beryl_pipeline::desugar::run(&mut unfrozen, parsed.tree);

    let printed = beryl_ast::to_source(&unfrozen, &desugared);
    let reparsed = beryl_parser::parse(&mut unfrozen, &printed);
    assert!(reparsed.errors.is_empty(), "{printed}\n{:?}", reparsed.errors);
    let redesugared = beryl_pipeline::desugar::run(&mut unfrozen, reparsed.tree);
    assert!(
        desugared.structurally_equal(&redesugared),
        "printing changed the tree:\n{printed}"
    );
}

#[test]
fn file_hashes_pick_the_right_path() {
    let mut gs = GlobalState::new();
    let base = "# typed: true\nclass Foo\n  def bar\n    1 + 1\n  end\nend\n";
    let files = slow_path(&mut gs, &[("hash.brl", base)]);
    let old_hash = hash_file(&gs, &files[0].tree);

    let index_edit = |gs: &mut GlobalState, text: &str| {
        let fref = files[0].file;
        gs.replace_file(
            fref,
            beryl_core::File::new("hash.brl", text, FileType::Normal),
        );
        let mut unfrozen = gs.unfreeze_for_indexing();
        beryl_pipeline::index_one(&mut unfrozen, fref)
    };

    // A body-only edit fast-paths with the method marked changed.
    let edited = index_edit(
        &mut gs,
        "# typed: true\nclass Foo\n  def bar\n    2 + 2\n  end\nend\n",
    );
    let new_hash = hash_file(&gs, &edited.tree);
    let changed = old_hash.fast_path_changes(&new_hash).expect("fast path");
    assert_eq!(changed.len(), 1);

    // An identical reindex fast-paths with nothing changed.
    let same = index_edit(&mut gs, base);
    let same_hash = hash_file(&gs, &same.tree);
    assert_eq!(old_hash.fast_path_changes(&same_hash), Some(vec![]));

    // A signature-shape edit forces the slow path.
    let reshaped = index_edit(
        &mut gs,
        "# typed: true\nclass Foo\n  def bar(x)\n    1 + 1\n  end\nend\n",
    );
    let reshaped_hash = hash_file(&gs, &reshaped.tree);
    assert_eq!(old_hash.fast_path_changes(&reshaped_hash), None);

    gs.errors.drain();
}
