//! Editor-service scenarios: fast/slow path selection, cancellation,
//! preemption, and diagnostics lifecycle.

use std::sync::Arc;
use std::time::Duration;

use beryl_core::Query;
use beryl_lsp::Client;
use beryl_lsp::msg::Message;
use beryl_lsp::typechecker::{Typechecker, TypecheckerCoordinator};
use beryl_lsp::updates::{FileEdit, FileUpdates};
use crossbeam_channel::Receiver;
use lsp_types::PublishDiagnosticsParams;

fn edit(path: &str, contents: &str) -> FileEdit {
    FileEdit {
        path: path.into(),
        contents: Arc::from(contents),
    }
}

/// Collects publishDiagnostics notifications currently in the channel.
fn drain_publishes(rx: &Receiver<Message>) -> Vec<PublishDiagnosticsParams> {
    let mut publishes = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        if let Message::Notification(not) = msg {
            if not.method == "textDocument/publishDiagnostics" {
                if let Ok(params) = serde_json::from_value(not.params) {
                    publishes.push(params);
                }
            }
        }
    }
    publishes
}

fn harness() -> (Typechecker, Receiver<Message>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    let (typechecker, _preemption) = Typechecker::single_threaded(Client::new(tx));
    (typechecker, rx)
}

const URI: &str = "file:///demo.brl";

#[test]
fn an_error_appears_then_clears_after_a_fixing_edit() {
    let (mut tc, rx) = harness();
    tc.initialize(FileUpdates::new(1, vec![]));

    let bad = "# typed: true\nclass Foo\n  def bar\n    1 + \"x\"\n  end\nend\n";
    assert!(tc.typecheck(FileUpdates::new(2, vec![edit(URI, bad)])));
    let publishes = drain_publishes(&rx);
    let for_demo: Vec<_> = publishes
        .iter()
        .filter(|p| p.uri.as_str() == URI)
        .collect();
    assert!(!for_demo.is_empty());
    assert_eq!(for_demo.last().unwrap().diagnostics.len(), 1);

    // The fixing edit changes only the method body: fast path, and the
    // diagnostics for the file supersede to empty.
    let good = "# typed: true\nclass Foo\n  def bar\n    1 + 2\n  end\nend\n";
    assert!(tc.typecheck(FileUpdates::new(3, vec![edit(URI, good)])));
    let publishes = drain_publishes(&rx);
    let for_demo: Vec<_> = publishes
        .iter()
        .filter(|p| p.uri.as_str() == URI)
        .collect();
    assert!(!for_demo.is_empty());
    assert!(for_demo.last().unwrap().diagnostics.is_empty());
}

#[test]
fn fast_path_keeps_the_symbol_table_identical() {
    let (mut tc, _rx) = harness();
    tc.initialize(FileUpdates::new(1, vec![]));
    let base = "# typed: true\nclass Foo\n  def bar\n    1\n  end\nend\n";
    assert!(tc.typecheck(FileUpdates::new(2, vec![edit(URI, base)])));
    let counts_before = tc.state().symbols().counts();

    let body_edit = "# typed: true\nclass Foo\n  def bar\n    2\n  end\nend\n";
    assert!(tc.typecheck(FileUpdates::new(3, vec![edit(URI, body_edit)])));
    assert_eq!(tc.state().symbols().counts(), counts_before);
    assert_eq!(tc.state().epochs.current(), 3);
}

#[test]
fn cancelled_slow_path_leaves_the_previous_state_visible() {
    let (mut tc, rx) = harness();
    tc.initialize(FileUpdates::new(1, vec![]));
    let base = "# typed: true\nclass Foo\n  def bar\n    1\n  end\nend\n";
    assert!(tc.typecheck(FileUpdates::new(2, vec![edit(URI, base)])));
    let counts_before = tc.state().symbols().counts();
    drain_publishes(&rx);

    // A pending cancellation is observed at the slow path's first
    // checkpoint: the run reports not-committed and the state is the
    // pre-edit state.
    tc.state().epochs.request_cancellation();
    let reshaped =
        "# typed: true\nclass Foo\n  def bar(x)\n    x\n  end\n  def baz\n    2\n  end\nend\n";
    assert!(!tc.typecheck(FileUpdates::new(3, vec![edit(URI, reshaped)])));
    assert_eq!(tc.state().epochs.current(), 2);
    assert_eq!(tc.state().symbols().counts(), counts_before);
    assert!(drain_publishes(&rx).is_empty());

    // Retrying without a pending cancellation commits.
    assert!(tc.typecheck(FileUpdates::new(4, vec![edit(URI, reshaped)])));
    assert_eq!(tc.state().epochs.current(), 4);
    assert_ne!(tc.state().symbols().counts(), counts_before);
}

#[test]
fn queries_answer_without_mutating_state() {
    let (mut tc, rx) = harness();
    tc.initialize(FileUpdates::new(1, vec![]));
    let source = "# typed: true\nclass Foo\n  def bar\n    1 + 2\n  end\nend\n";
    assert!(tc.typecheck(FileUpdates::new(2, vec![edit(URI, source)])));
    drain_publishes(&rx);

    let fref = tc.state().find_file_by_path(URI).unwrap();
    let offset = source.find('+').unwrap() as u32;
    let responses = tc.query(Query::AtOffset { file: fref, offset }, &[fref]);
    assert!(
        responses
            .iter()
            .any(|r| matches!(r, beryl_core::QueryResponse::Send { .. })),
        "{responses:?}"
    );
    // The attached query was restored and no diagnostics were re-published.
    assert!(tc.state().lsp_query.is_none());
    assert!(drain_publishes(&rx).is_empty());
    assert_eq!(tc.state().epochs.current(), 2);
}

#[test]
fn definition_query_finds_the_superclass() {
    let (mut tc, _rx) = harness();
    tc.initialize(FileUpdates::new(1, vec![]));
    let source = "# typed: true\nclass A\nend\nclass B < A\nend\n";
    assert!(tc.typecheck(FileUpdates::new(2, vec![edit(URI, source)])));

    let fref = tc.state().find_file_by_path(URI).unwrap();
    // The `A` in `class B < A`.
    let offset = source.rfind('A').unwrap() as u32;
    let responses = tc.query(
        Query::AtOffset {
            file: fref,
            offset,
        },
        &[fref],
    );
    let gs = tc.state();
    let target = responses
        .iter()
        .find_map(|resp| match resp {
            beryl_core::QueryResponse::Constant { symbol, .. } => Some(*symbol),
            _ => None,
        })
        .expect("the superclass reference answers the query");
    let decl = gs.symbol_decl_loc(target);
    assert!(decl.exists());
    // The declaration is `class A`, on the second line of the file.
    let (line, _) = gs.file(decl.file).line_col(decl.offsets.begin);
    assert_eq!(line, 1);
}

#[test]
fn coordinator_serves_queries_while_typechecking() {
    let (tx, rx) = crossbeam_channel::unbounded();
    let mut coordinator = TypecheckerCoordinator::spawn(Client::new(tx));
    coordinator.submit(|tc: &mut Typechecker| {
        tc.initialize(FileUpdates::new(1, vec![]));
    });

    // A batch big enough that the slow path spends real time indexing.
    let mut edits = Vec::new();
    for i in 0..80 {
        edits.push(edit(
            &format!("file:///gen{i}.brl"),
            &format!("# typed: true\nclass Gen{i}\n  def value\n    {i}\n  end\nend\n"),
        ));
    }
    coordinator.submit(move |tc: &mut Typechecker| {
        tc.typecheck(FileUpdates::new(2, edits));
    });

    // Whether this lands as a preemption or a queued task, a response must
    // come back after the in-flight work.
    let (probe_tx, probe_rx) = crossbeam_channel::bounded(1);
    coordinator.submit_preemptible(move |tc: &mut Typechecker| {
        let _ = probe_tx.send(tc.state().files_len());
    });
    let files_seen = probe_rx
        .recv_timeout(Duration::from_secs(30))
        .expect("the probe task must run");
    // The probe ran against a committed state: either the pre-batch state
    // (preempted) or the post-batch one (queued).
    assert!(files_seen == 0 || files_seen == 80, "saw {files_seen}");

    // The batch itself completes and commits.
    let (done_tx, done_rx) = crossbeam_channel::bounded(1);
    coordinator.submit(move |tc: &mut Typechecker| {
        let _ = done_tx.send((tc.state().epochs.current(), tc.state().files_len()));
    });
    let (epoch, files) = done_rx
        .recv_timeout(Duration::from_secs(30))
        .expect("the typechecker thread must drain its queue");
    assert_eq!(epoch, 2);
    assert_eq!(files, 80);
    drop(rx);
    coordinator.shutdown();
}
