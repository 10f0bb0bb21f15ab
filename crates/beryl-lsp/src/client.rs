//! The handle the typechecker uses to talk back to the editor.

use beryl_core::GlobalState;
use beryl_core::diag::Diagnostic;
use beryl_core::files::FileRef;
use crossbeam_channel::Sender;
use lsp_types::Url;
use serde::Serialize;

use crate::diagnostics::{file_uri, to_lsp_diagnostic};
use crate::msg::{Message, Notification};

/// Status values of the typecheck-run-info notification.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RunStatus {
    /// The run began.
    Started,
    /// The run committed.
    Ended,
    /// The run observed a cancellation and discarded its work.
    Cancelled,
}

/// Payload of the bespoke `beryl/typecheckRunInfo` notification.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypecheckRunInfo {
    /// Run status.
    pub status: RunStatus,
    /// The epoch the run targets.
    pub epoch: u32,
    /// Whether the run took the fast path.
    pub fast_path: bool,
    /// The files the run covers.
    pub files: Vec<String>,
}

/// Sends server-to-client traffic. Cheap to clone; every thread that needs
/// to notify the editor holds one.
#[derive(Clone)]
pub struct Client {
    tx: Sender<Message>,
}

impl Client {
    /// Wraps an outgoing message channel.
    pub fn new(tx: Sender<Message>) -> Client {
        Client { tx }
    }

    /// Sends any message.
    pub fn send(&self, msg: impl Into<Message>) {
        let _ = self.tx.send(msg.into());
    }

    /// Sends a notification.
    pub fn notify(&self, method: &str, params: impl Serialize) {
        self.send(Notification::new(method, params));
    }

    /// Publishes the full diagnostic list for one file, superseding every
    /// earlier publish for it.
    pub fn publish_diagnostics(&self, gs: &GlobalState, fref: FileRef, diags: &[Diagnostic]) {
        let Some(uri) = file_uri(gs, fref) else {
            return;
        };
        let diagnostics = diags
            .iter()
            .map(|diag| to_lsp_diagnostic(gs, diag))
            .collect();
        self.notify(
            "textDocument/publishDiagnostics",
            lsp_types::PublishDiagnosticsParams {
                uri,
                diagnostics,
                version: None,
            },
        );
    }

    /// Clears diagnostics for a file by URI.
    pub fn clear_diagnostics(&self, uri: Url) {
        self.notify(
            "textDocument/publishDiagnostics",
            lsp_types::PublishDiagnosticsParams {
                uri,
                diagnostics: Vec::new(),
                version: None,
            },
        );
    }

    /// Reports slow-path progress through the bespoke run-info
    /// notification.
    pub fn notify_run_info(&self, info: TypecheckRunInfo) {
        self.notify("beryl/typecheckRunInfo", info);
    }

    /// The operation-in-progress ping shown in editor status bars.
    pub fn show_operation(&self, name: &str, ended: bool) {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct ShowOperationParams<'a> {
            operation_name: &'a str,
            status: &'a str,
        }
        self.notify(
            "beryl/showOperation",
            ShowOperationParams {
                operation_name: name,
                status: if ended { "end" } else { "begin" },
            },
        );
    }
}
