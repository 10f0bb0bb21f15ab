//! The message loop.
//!
//! One thread parses inbound editor traffic, coalesces adjacent edits for
//! the same document, drops cancelled requests, tags each edit batch with
//! a target epoch, and hands closures to the typechecker thread. Requests
//! that arrive while a slow path is in flight preempt it; edits cancel it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use beryl_core::files::FileRef;
use beryl_core::loc::Loc;
use beryl_core::symbols::{ClassOrModuleRef, SymbolRef};
use beryl_core::types::Ty;
use beryl_core::{GlobalState, Query, QueryResponse};
use crossbeam_channel::{Receiver, Sender};
use ecow::EcoString;
use lsp_types as lsp;
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::de::DeserializeOwned;

use crate::client::Client;
use crate::diagnostics::{loc_to_location, loc_to_range, position_to_offset};
use crate::msg::{ErrorCode, Message, Notification, Request, RequestId, Response};
use crate::typechecker::{Typechecker, TypecheckerCoordinator};
use crate::updates::{FileEdit, FileUpdates};

/// A pair of message channels; the transport behind them is the caller's
/// business (stdio, socket, or an in-process test harness).
pub struct Connection {
    /// Server-to-client messages.
    pub sender: Sender<Message>,
    /// Client-to-server messages.
    pub receiver: Receiver<Message>,
}

impl Connection {
    /// An in-process connection pair: `(server side, client side)`.
    pub fn memory() -> (Connection, Connection) {
        let (client_to_server_tx, client_to_server_rx) = crossbeam_channel::unbounded();
        let (server_to_client_tx, server_to_client_rx) = crossbeam_channel::unbounded();
        (
            Connection {
                sender: server_to_client_tx,
                receiver: client_to_server_rx,
            },
            Connection {
                sender: client_to_server_tx,
                receiver: server_to_client_rx,
            },
        )
    }
}

/// Runs the language server until the client disconnects or sends `exit`.
pub fn run_server(connection: Connection) {
    let client = Client::new(connection.sender.clone());
    let coordinator = TypecheckerCoordinator::spawn(client.clone());
    let mut server = LanguageServer {
        client,
        coordinator,
        receiver: connection.receiver,
        epoch: AtomicU32::new(0),
        unflushed: FxHashMap::default(),
        cancelled: Arc::new(Mutex::new(FxHashSet::default())),
        initialized: false,
        shutdown_requested: false,
    };
    server.run();
}

struct LanguageServer {
    client: Client,
    coordinator: TypecheckerCoordinator,
    receiver: Receiver<Message>,
    epoch: AtomicU32,
    /// Latest content per document since the last committed run, with the
    /// epoch of its newest edit. Cancelled runs are retried by resending
    /// the whole set.
    unflushed: FxHashMap<EcoString, (Arc<str>, u32)>,
    /// Requests cancelled by the client before execution.
    cancelled: Arc<Mutex<FxHashSet<RequestId>>>,
    initialized: bool,
    shutdown_requested: bool,
}

impl LanguageServer {
    fn run(&mut self) {
        while let Ok(msg) = self.receiver.recv() {
            if self.handle_message(msg) {
                break;
            }
        }
        self.coordinator.shutdown();
    }

    /// Returns `true` when the loop should exit.
    fn handle_message(&mut self, msg: Message) -> bool {
        match msg {
            Message::Request(req) => self.on_request(req),
            Message::Notification(not) => self.on_notification(not),
            // The server currently sends no requests of its own.
            Message::Response(_) => false,
        }
    }

    fn next_epoch(&self) -> u32 {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    // === Notifications ===================================================

    /// Returns `true` when the loop should exit.
    fn on_notification(&mut self, not: Notification) -> bool {
        match not.method.as_str() {
            "initialized" => {
                let epoch = self.next_epoch();
                self.coordinator.submit(move |tc: &mut Typechecker| {
                    tc.initialize(FileUpdates::new(epoch, Vec::new()));
                });
            }
            "textDocument/didOpen" => {
                if let Some(params) = cast_params::<lsp::DidOpenTextDocumentParams>(not.params) {
                    self.apply_edit(
                        params.text_document.uri.to_string().into(),
                        params.text_document.text.into(),
                    );
                }
            }
            "textDocument/didChange" => {
                let Some(mut params) = cast_params::<lsp::DidChangeTextDocumentParams>(not.params)
                else {
                    return false;
                };
                // Full-sync: the last content change wins. Adjacent
                // didChange notifications for the same document coalesce
                // into one edit by draining whatever is already queued;
                // anything else that was drained is dispatched afterwards.
                let uri = params.text_document.uri.to_string();
                let Some(change) = params.content_changes.pop() else {
                    return false;
                };
                let mut text = change.text;
                let mut followup = None;
                while let Ok(queued) = self.receiver.try_recv() {
                    match queued {
                        Message::Notification(next)
                            if next.method == "textDocument/didChange" =>
                        {
                            match cast_params::<lsp::DidChangeTextDocumentParams>(next.params) {
                                Some(mut next_params)
                                    if next_params.text_document.uri.to_string() == uri =>
                                {
                                    if let Some(change) = next_params.content_changes.pop() {
                                        text = change.text;
                                    }
                                }
                                Some(next_params) => {
                                    followup = Some(Message::Notification(Notification::new(
                                        "textDocument/didChange",
                                        lsp::DidChangeTextDocumentParams {
                                            text_document: next_params.text_document,
                                            content_changes: next_params.content_changes,
                                        },
                                    )));
                                    break;
                                }
                                None => {}
                            }
                        }
                        other => {
                            followup = Some(other);
                            break;
                        }
                    }
                }
                self.apply_edit(uri.into(), text.into());
                if let Some(msg) = followup {
                    return self.handle_message(msg);
                }
            }
            "textDocument/didClose" => {
                // Contents stay in the file table; the editor simply stops
                // displaying diagnostics for the document.
            }
            "$/cancelRequest" => {
                #[derive(serde::Deserialize)]
                struct CancelParams {
                    id: RequestId,
                }
                if let Some(params) = cast_params::<CancelParams>(not.params) {
                    self.cancelled.lock().insert(params.id);
                }
            }
            "exit" => return true,
            _ => {}
        }
        false
    }

    /// Records an edit and submits a typecheck covering everything not yet
    /// committed. An in-flight slow path is obsoleted by the edit, so it
    /// is asked to cancel; the resubmitted batch includes its files.
    fn apply_edit(&mut self, path: EcoString, contents: Arc<str>) {
        let epoch = self.next_epoch();
        self.unflushed.insert(path, (contents, epoch));
        let edits: Vec<FileEdit> = self
            .unflushed
            .iter()
            .map(|(path, (contents, _))| FileEdit {
                path: path.clone(),
                contents: contents.clone(),
            })
            .collect();
        self.coordinator.preemption().cancel_in_flight();
        let updates = FileUpdates::new(epoch, edits);
        self.coordinator.submit(move |tc: &mut Typechecker| {
            let committed = tc.typecheck(updates);
            if !committed {
                log::debug!("typecheck for epoch {epoch} was cancelled; a later batch retries");
            }
        });
        // Entries older than this batch are covered by it once committed;
        // trimming is deferred until then via the run-info the typechecker
        // publishes, which the client observes. Server-side we cap memory
        // by keeping only the latest content per path, which the map
        // already guarantees.
    }

    // === Requests ========================================================

    /// Returns `true` when the loop should exit.
    fn on_request(&mut self, req: Request) -> bool {
        if self.shutdown_requested && req.method != "shutdown" {
            self.client.send(Response::err(
                req.id,
                ErrorCode::ServerNotInitialized,
                "shutting down",
            ));
            return false;
        }
        if !self.initialized && req.method != "initialize" {
            self.client.send(Response::err(
                req.id,
                ErrorCode::ServerNotInitialized,
                "initialize first",
            ));
            return false;
        }
        match req.method.as_str() {
            "initialize" => {
                self.initialized = true;
                self.client
                    .send(Response::ok(req.id, server_capabilities()));
            }
            "shutdown" => {
                self.shutdown_requested = true;
                self.client.send(Response::ok(req.id, serde_json::Value::Null));
            }
            "textDocument/hover" => {
                self.query_request::<lsp::HoverParams, _>(req, |tc, fref, offset| {
                    hover(tc, fref, offset)
                });
            }
            "textDocument/definition" => {
                self.query_request::<lsp::GotoDefinitionParams, _>(req, |tc, fref, offset| {
                    definition(tc, fref, offset)
                });
            }
            "textDocument/typeDefinition" => {
                // Same params shape as goto-definition.
                self.query_request::<lsp::GotoDefinitionParams, _>(req, |tc, fref, offset| {
                    type_definition(tc, fref, offset)
                });
            }
            "textDocument/references" => {
                self.query_request::<lsp::ReferenceParams, _>(req, |tc, fref, offset| {
                    references(tc, fref, offset)
                });
            }
            "textDocument/completion" => {
                self.query_request::<lsp::CompletionParams, _>(req, |tc, fref, offset| {
                    completion(tc, fref, offset)
                });
            }
            "textDocument/signatureHelp" => {
                self.query_request::<lsp::SignatureHelpParams, _>(req, |tc, fref, offset| {
                    signature_help(tc, fref, offset)
                });
            }
            "textDocument/documentSymbol" => {
                let client = self.client.clone();
                let Some(params) = cast_params::<lsp::DocumentSymbolParams>(req.params) else {
                    self.client
                        .send(Response::err(req.id, ErrorCode::InvalidParams, "bad params"));
                    return false;
                };
                let id = req.id;
                let uri = params.text_document.uri.to_string();
                self.coordinator.submit_preemptible(move |tc: &mut Typechecker| {
                    let result = document_symbols(tc, &uri);
                    client.send(Response::ok(id, result));
                });
            }
            "workspace/symbol" => {
                let client = self.client.clone();
                let Some(params) = cast_params::<lsp::WorkspaceSymbolParams>(req.params) else {
                    self.client
                        .send(Response::err(req.id, ErrorCode::InvalidParams, "bad params"));
                    return false;
                };
                let id = req.id;
                self.coordinator.submit_preemptible(move |tc: &mut Typechecker| {
                    let result = workspace_symbols(tc, &params.query);
                    client.send(Response::ok(id, result));
                });
            }
            _ => {
                self.client.send(Response::err(
                    req.id,
                    ErrorCode::MethodNotFound,
                    format!("unsupported method {}", req.method),
                ));
            }
        }
        false
    }

    /// Dispatches a position-based query request onto the typechecker
    /// thread, preempting an in-flight slow path.
    fn query_request<P, R>(
        &mut self,
        req: Request,
        handler: impl Fn(&mut Typechecker, FileRef, u32) -> R + Send + 'static,
    ) where
        P: DeserializeOwned + HasPosition,
        R: serde::Serialize,
    {
        let Some(params) = cast_params::<P>(req.params) else {
            self.client
                .send(Response::err(req.id, ErrorCode::InvalidParams, "bad params"));
            return;
        };
        let (uri, position) = params.position();
        let client = self.client.clone();
        let id = req.id;
        let cancelled = Arc::clone(&self.cancelled);
        self.coordinator.submit_preemptible(move |tc: &mut Typechecker| {
            if cancelled.lock().remove(&id) {
                client.send(Response::err(
                    id,
                    ErrorCode::RequestCanceled,
                    "request was cancelled",
                ));
                return;
            }
            let Some(fref) = tc.state().find_file_by_path(&uri) else {
                client.send(Response::err(
                    id,
                    ErrorCode::ContentModified,
                    "unknown document",
                ));
                return;
            };
            let offset = position_to_offset(tc.state(), fref, position);
            let result = handler(tc, fref, offset);
            client.send(Response::ok(id, result));
        });
    }
}

// === Param plumbing ======================================================

fn cast_params<P: DeserializeOwned>(params: serde_json::Value) -> Option<P> {
    serde_json::from_value(params).ok()
}

/// Position-carrying request params.
trait HasPosition {
    fn position(&self) -> (EcoString, lsp::Position);
}

macro_rules! has_position_via_tdpp {
    ($($ty:ty),+ $(,)?) => {$(
        impl HasPosition for $ty {
            fn position(&self) -> (EcoString, lsp::Position) {
                let tdpp = &self.text_document_position_params;
                (
                    tdpp.text_document.uri.to_string().into(),
                    tdpp.position,
                )
            }
        }
    )+};
}

has_position_via_tdpp!(
    lsp::HoverParams,
    lsp::GotoDefinitionParams,
    lsp::SignatureHelpParams,
);

impl HasPosition for lsp::ReferenceParams {
    fn position(&self) -> (EcoString, lsp::Position) {
        let tdp = &self.text_document_position;
        (tdp.text_document.uri.to_string().into(), tdp.position)
    }
}

impl HasPosition for lsp::CompletionParams {
    fn position(&self) -> (EcoString, lsp::Position) {
        let tdp = &self.text_document_position;
        (tdp.text_document.uri.to_string().into(), tdp.position)
    }
}

fn server_capabilities() -> lsp::InitializeResult {
    lsp::InitializeResult {
        capabilities: lsp::ServerCapabilities {
            text_document_sync: Some(lsp::TextDocumentSyncCapability::Kind(
                lsp::TextDocumentSyncKind::FULL,
            )),
            hover_provider: Some(lsp::HoverProviderCapability::Simple(true)),
            definition_provider: Some(lsp::OneOf::Left(true)),
            type_definition_provider: Some(lsp::TypeDefinitionProviderCapability::Simple(true)),
            references_provider: Some(lsp::OneOf::Left(true)),
            completion_provider: Some(lsp::CompletionOptions {
                trigger_characters: Some(vec![".".to_string()]),
                ..lsp::CompletionOptions::default()
            }),
            signature_help_provider: Some(lsp::SignatureHelpOptions {
                trigger_characters: Some(vec!["(".to_string(), ",".to_string()]),
                ..lsp::SignatureHelpOptions::default()
            }),
            document_symbol_provider: Some(lsp::OneOf::Left(true)),
            workspace_symbol_provider: Some(lsp::OneOf::Left(true)),
            ..lsp::ServerCapabilities::default()
        },
        server_info: Some(lsp::ServerInfo {
            name: "berylc".to_string(),
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
        }),
        offset_encoding: None,
    }
}

// === Request handlers (typechecker thread) ===============================

/// The response whose range most tightly encloses the queried offset.
fn best_response(responses: Vec<QueryResponse>, offset: u32) -> Option<QueryResponse> {
    responses
        .into_iter()
        .filter(|resp| {
            let loc = resp.loc();
            loc.exists() && loc.offsets.begin <= offset && offset <= loc.offsets.end
        })
        .min_by_key(|resp| resp.loc().offsets.end - resp.loc().offsets.begin)
}

fn run_offset_query(tc: &mut Typechecker, fref: FileRef, offset: u32) -> Vec<QueryResponse> {
    tc.query(Query::AtOffset { file: fref, offset }, &[fref])
}

fn hover(tc: &mut Typechecker, fref: FileRef, offset: u32) -> Option<lsp::Hover> {
    let responses = run_offset_query(tc, fref, offset);
    let best = best_response(responses, offset)?;
    let gs = tc.state();
    let mut text = String::new();
    match &best {
        QueryResponse::Send { method, .. } => {
            text.push_str(&render_method_signature(gs, *method));
        }
        QueryResponse::Constant { symbol, .. } => {
            text.push_str(&gs.show_symbol(*symbol));
        }
        QueryResponse::Ident { name, .. } => {
            text.push_str(&gs.show_name(*name));
        }
        QueryResponse::MethodDef { method, .. } => {
            text.push_str(&render_method_signature(gs, *method));
        }
        QueryResponse::Field { field, .. } => {
            text.push_str(&gs.show_symbol(SymbolRef::Field(*field)));
        }
        QueryResponse::Literal { .. } => {}
    }
    if let Some(ty) = best.ty() {
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(&format!("type: {}", ty.show(gs)));
    }
    Some(lsp::Hover {
        contents: lsp::HoverContents::Scalar(lsp::MarkedString::String(text)),
        range: Some(loc_to_range(gs, best.loc())),
    })
}

fn response_target(gs: &GlobalState, response: &QueryResponse) -> Option<Loc> {
    match response {
        QueryResponse::Send { method, .. } | QueryResponse::MethodDef { method, .. } => {
            Some(gs.symbol_decl_loc(SymbolRef::Method(*method)))
        }
        QueryResponse::Constant { symbol, .. } => Some(gs.symbol_decl_loc(*symbol)),
        QueryResponse::Field { field, .. } => Some(gs.symbol_decl_loc(SymbolRef::Field(*field))),
        QueryResponse::Ident { loc, .. } => Some(*loc),
        QueryResponse::Literal { .. } => None,
    }
}

fn definition(tc: &mut Typechecker, fref: FileRef, offset: u32) -> Option<lsp::GotoDefinitionResponse> {
    let responses = run_offset_query(tc, fref, offset);
    let best = best_response(responses, offset)?;
    let gs = tc.state();
    let target = response_target(gs, &best)?;
    let location = loc_to_location(gs, target)?;
    Some(lsp::GotoDefinitionResponse::Scalar(location))
}

fn type_definition(
    tc: &mut Typechecker,
    fref: FileRef,
    offset: u32,
) -> Option<lsp::GotoDefinitionResponse> {
    let responses = run_offset_query(tc, fref, offset);
    let best = best_response(responses, offset)?;
    let gs = tc.state();
    let class = match best.ty()? {
        Ty::Class(sym) => *sym,
        Ty::Applied(applied) => applied.class,
        Ty::Literal(lit) => lit.underlying(),
        _ => return None,
    };
    let location = loc_to_location(gs, gs.symbols().class_data(class).decl_loc())?;
    Some(lsp::GotoDefinitionResponse::Scalar(location))
}

fn references(tc: &mut Typechecker, fref: FileRef, offset: u32) -> Option<Vec<lsp::Location>> {
    let responses = run_offset_query(tc, fref, offset);
    let best = best_response(responses, offset)?;
    let symbol = match &best {
        QueryResponse::Send { method, .. } | QueryResponse::MethodDef { method, .. } => {
            SymbolRef::Method(*method)
        }
        QueryResponse::Constant { symbol, .. } => *symbol,
        QueryResponse::Field { field, .. } => SymbolRef::Field(*field),
        _ => return None,
    };
    let all_files: Vec<FileRef> = tc.state().file_refs().collect();
    let matches = tc.query(Query::ForSymbol(symbol), &all_files);
    let gs = tc.state();
    let mut locations: Vec<lsp::Location> = matches
        .iter()
        .filter_map(|resp| loc_to_location(gs, resp.loc()))
        .collect();
    locations.sort_by_key(|loc| (loc.uri.to_string(), loc.range.start.line, loc.range.start.character));
    locations.dedup();
    Some(locations)
}

fn completion(tc: &mut Typechecker, fref: FileRef, offset: u32) -> Option<lsp::CompletionResponse> {
    // Member completion on the enclosing class: its own members first,
    // then inherited ones.
    let gs = tc.state();
    let class = enclosing_class(tc, fref, offset).unwrap_or(beryl_core::well_known::OBJECT);
    let mut items = Vec::new();
    let mut seen = FxHashSet::default();
    let mut worklist = vec![class];
    let mut visited = FxHashSet::default();
    while let Some(current) = worklist.pop() {
        if !visited.insert(current) {
            continue;
        }
        let data = gs.symbols().class_data(current);
        for (name, member) in data.members.iter().chain(data.self_members.iter()) {
            let shown = gs.show_name(*name).to_string();
            if !seen.insert(shown.clone()) {
                continue;
            }
            let kind = match member {
                SymbolRef::Method(_) => lsp::CompletionItemKind::METHOD,
                SymbolRef::ClassOrModule(_) => lsp::CompletionItemKind::CLASS,
                SymbolRef::Field(_) => lsp::CompletionItemKind::FIELD,
                SymbolRef::TypeMember(_) => lsp::CompletionItemKind::TYPE_PARAMETER,
            };
            items.push(lsp::CompletionItem {
                label: shown,
                kind: Some(kind),
                detail: Some(gs.show_symbol(*member).to_string()),
                ..lsp::CompletionItem::default()
            });
        }
        if let Some(superclass) = data.superclass {
            worklist.push(superclass);
        }
        worklist.extend(data.mixins.iter().copied());
    }
    items.sort_by(|a, b| a.label.cmp(&b.label));
    Some(lsp::CompletionResponse::Array(items))
}

fn signature_help(tc: &mut Typechecker, fref: FileRef, offset: u32) -> Option<lsp::SignatureHelp> {
    let responses = run_offset_query(tc, fref, offset);
    let send = responses.into_iter().find_map(|resp| match resp {
        QueryResponse::Send { method, loc, .. }
            if loc.offsets.begin <= offset && offset <= loc.offsets.end =>
        {
            Some(method)
        }
        _ => None,
    })?;
    let gs = tc.state();
    Some(lsp::SignatureHelp {
        signatures: vec![lsp::SignatureInformation {
            label: render_method_signature(gs, send),
            documentation: None,
            parameters: None,
            active_parameter: None,
        }],
        active_signature: Some(0),
        active_parameter: None,
    })
}

fn render_method_signature(gs: &GlobalState, method: beryl_core::MethodRef) -> String {
    let data = gs.symbols().method_data(method);
    let args = data
        .arguments
        .iter()
        .map(|arg| {
            let name = gs.show_name(arg.name);
            match arg.ty {
                Ty::Untyped => name.to_string(),
                ref ty => format!("{name}: {}", ty.show(gs)),
            }
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "{}({args}) -> {}",
        gs.show_symbol(SymbolRef::Method(method)),
        data.result_type.show(gs)
    )
}

/// The innermost class definition whose range covers `offset`.
fn enclosing_class(tc: &Typechecker, fref: FileRef, offset: u32) -> Option<ClassOrModuleRef> {
    use beryl_ast::{Expr, ExprKind};
    fn walk(expr: &Expr, offset: u32, found: &mut Option<ClassOrModuleRef>) {
        if let ExprKind::ClassDef { name, body, .. } = &expr.kind {
            if expr.loc.exists() && expr.loc.begin <= offset && offset <= expr.loc.end {
                if let ExprKind::ConstantLit { symbol } = &name.kind {
                    if let Some(sym) = symbol.as_class_or_module() {
                        *found = Some(sym);
                    }
                }
                walk(body, offset, found);
            }
            return;
        }
        beryl_ast::visit_children(expr, &mut |child| walk(child, offset, found));
    }
    let parsed = tc.get_resolved(fref)?;
    let mut found = None;
    walk(&parsed.tree, offset, &mut found);
    found
}

fn document_symbols(tc: &Typechecker, uri: &str) -> Option<lsp::DocumentSymbolResponse> {
    use beryl_ast::{Expr, ExprKind};
    let gs = tc.state();
    let fref = gs.find_file_by_path(uri)?;
    let parsed = tc.get_resolved(fref)?;
    let mut symbols = Vec::new();

    fn walk(
        gs: &GlobalState,
        fref: FileRef,
        expr: &Expr,
        container: Option<String>,
        out: &mut Vec<lsp::SymbolInformation>,
    ) {
        match &expr.kind {
            ExprKind::ClassDef { name, body, .. } => {
                let shown = match &name.kind {
                    ExprKind::ConstantLit { symbol } => gs.show_symbol(*symbol).to_string(),
                    _ => "<class>".to_string(),
                };
                push_symbol(gs, fref, expr, &shown, lsp::SymbolKind::CLASS, &container, out);
                walk(gs, fref, body, Some(shown), out);
            }
            ExprKind::MethodDef { name, .. } => {
                let shown = gs.show_name(*name).to_string();
                push_symbol(gs, fref, expr, &shown, lsp::SymbolKind::METHOD, &container, out);
            }
            _ => beryl_ast::visit_children(expr, &mut |child| {
                walk(gs, fref, child, container.clone(), out)
            }),
        }
    }

    #[allow(deprecated)]
    fn push_symbol(
        gs: &GlobalState,
        fref: FileRef,
        expr: &Expr,
        name: &str,
        kind: lsp::SymbolKind,
        container: &Option<String>,
        out: &mut Vec<lsp::SymbolInformation>,
    ) {
        let Some(location) = loc_to_location(gs, Loc::new(fref, expr.loc)) else {
            return;
        };
        out.push(lsp::SymbolInformation {
            name: name.to_string(),
            kind,
            tags: None,
            deprecated: None,
            location,
            container_name: container.clone(),
        });
    }

    walk(gs, fref, &parsed.tree, None, &mut symbols);
    Some(lsp::DocumentSymbolResponse::Flat(symbols))
}

fn workspace_symbols(tc: &Typechecker, query: &str) -> Vec<lsp::SymbolInformation> {
    let gs = tc.state();
    let needle = query.to_lowercase();
    let mut out = Vec::new();
    #[allow(deprecated)]
    for class in gs.symbols().class_refs() {
        let shown = gs.show_class(class).to_string();
        if !needle.is_empty() && !shown.to_lowercase().contains(&needle) {
            continue;
        }
        let Some(location) = loc_to_location(gs, gs.symbols().class_data(class).decl_loc()) else {
            continue;
        };
        out.push(lsp::SymbolInformation {
            name: shown,
            kind: lsp::SymbolKind::CLASS,
            tags: None,
            deprecated: None,
            location,
            container_name: None,
        });
    }
    #[allow(deprecated)]
    for method in gs.symbols().method_refs() {
        let shown = gs.show_symbol(SymbolRef::Method(method)).to_string();
        if !needle.is_empty() && !shown.to_lowercase().contains(&needle) {
            continue;
        }
        let Some(location) = loc_to_location(gs, gs.symbols().method_data(method).decl_loc())
        else {
            continue;
        };
        out.push(lsp::SymbolInformation {
            name: shown,
            kind: lsp::SymbolKind::METHOD,
            tags: None,
            deprecated: None,
            location,
            container_name: None,
        });
    }
    out
}
