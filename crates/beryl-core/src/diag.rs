//! Diagnostics and the error queue.
//!
//! Passes never abort on user errors; they push diagnostics onto the queue
//! owned by the current [`GlobalState`](crate::GlobalState) and keep going.
//! The queue is multi-producer (workers) single-consumer (the typechecker
//! thread).

use core::fmt;

use crossbeam_channel::{Receiver, Sender};
use ecow::EcoString;

use crate::loc::Loc;
use crate::query::QueryResponse;

/// Diagnostic severity, ordered from most to least severe.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, serde::Serialize)]
pub enum Severity {
    /// An error.
    Error,
    /// A warning.
    Warning,
    /// An informational message.
    Information,
    /// A hint.
    Hint,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Information => write!(f, "information"),
            Severity::Hint => write!(f, "hint"),
        }
    }
}

/// Stable numeric diagnostic codes.
///
/// Codes are part of the user-facing contract (editors key quick-fix and
/// suppression logic off them), so variants are never renumbered.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, serde::Serialize)]
#[repr(u16)]
pub enum DiagnosticCode {
    /// A syntax error recovered by the parser.
    ParseSyntax = 1001,
    /// A method redefinition changed the argument shape.
    MethodRedefined = 4010,
    /// A constant reference did not resolve.
    UnresolvedConstant = 5002,
    /// A generic applied to the wrong number of type arguments.
    GenericArgCountMismatch = 5014,
    /// An argument's type does not fit the declared parameter type.
    ArgTypeMismatch = 7002,
    /// No method with this name exists on the receiver type.
    MethodDoesNotExist = 7003,
    /// A call passed the wrong number of arguments.
    ArgCountMismatch = 7004,
    /// A returned value does not fit the declared result type.
    ReturnTypeMismatch = 7005,
    /// A conditional branch can never be taken.
    UnreachableBranch = 7006,
    /// A `T.let` assertion failed statically.
    CastFailure = 7007,
    /// Code after a jump can never execute.
    DeadCode = 7011,
}

impl DiagnosticCode {
    /// The stable numeric code.
    pub fn code(self) -> u16 {
        self as u16
    }

    /// The default severity for this code.
    pub fn default_severity(self) -> Severity {
        match self {
            DiagnosticCode::DeadCode | DiagnosticCode::UnreachableBranch => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

/// One related-location block under a diagnostic.
#[derive(Clone, Debug, serde::Serialize)]
pub struct DiagnosticSection {
    /// The section header, e.g. "Expected `Integer`".
    pub header: EcoString,
    /// Related locations with per-location messages.
    pub locs: Vec<(Loc, EcoString)>,
}

/// One suggested edit of an autocorrect.
#[derive(Clone, Debug, serde::Serialize)]
pub struct AutocorrectEdit {
    /// The range to replace.
    pub loc: Loc,
    /// The replacement text.
    pub replacement: EcoString,
}

/// A machine-applicable fix attached to a diagnostic. Edits never overlap.
#[derive(Clone, Debug, serde::Serialize)]
pub struct Autocorrect {
    /// A short description of the fix.
    pub title: EcoString,
    /// The edits to apply.
    pub edits: Vec<AutocorrectEdit>,
}

/// A single reported problem.
#[derive(Clone, Debug, serde::Serialize)]
pub struct Diagnostic {
    /// The stable code.
    pub code: DiagnosticCode,
    /// Severity, defaulting per code.
    pub severity: Severity,
    /// The primary range. Always within the file set of the run that
    /// produced the diagnostic.
    pub loc: Loc,
    /// The headline message.
    pub header: EcoString,
    /// Structured related-location sections.
    pub sections: Vec<DiagnosticSection>,
    /// An optional machine-applicable fix.
    pub autocorrect: Option<Autocorrect>,
}

impl Diagnostic {
    /// Creates a diagnostic with the code's default severity.
    pub fn new(code: DiagnosticCode, loc: Loc, header: impl Into<EcoString>) -> Self {
        Self {
            code,
            severity: code.default_severity(),
            loc,
            header: header.into(),
            sections: Vec::new(),
            autocorrect: None,
        }
    }

    /// Appends a related-location section.
    pub fn with_section(
        mut self,
        header: impl Into<EcoString>,
        locs: Vec<(Loc, EcoString)>,
    ) -> Self {
        self.sections.push(DiagnosticSection {
            header: header.into(),
            locs,
        });
        self
    }

    /// Attaches an autocorrect.
    pub fn with_autocorrect(mut self, autocorrect: Autocorrect) -> Self {
        self.autocorrect = Some(autocorrect);
        self
    }
}

enum QueueItem {
    Diag(Box<Diagnostic>),
    Response(Box<QueryResponse>),
}

/// The multi-producer single-consumer queue that collects diagnostics and
/// query responses during a run.
pub struct ErrorQueue {
    tx: Sender<QueueItem>,
    rx: Receiver<QueueItem>,
}

impl Default for ErrorQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self { tx, rx }
    }

    /// Pushes a diagnostic. Never blocks.
    pub fn push_diagnostic(&self, diag: Diagnostic) {
        log::debug!(
            "diagnostic {:?} at {:?}: {}",
            diag.code,
            diag.loc,
            diag.header
        );
        // The receiver lives as long as the queue, so send cannot fail.
        let _ = self.tx.send(QueueItem::Diag(Box::new(diag)));
    }

    /// Pushes a query response. Never blocks.
    pub fn push_query_response(&self, response: QueryResponse) {
        let _ = self.tx.send(QueueItem::Response(Box::new(response)));
    }

    /// Drains everything pushed so far.
    pub fn drain(&self) -> (Vec<Diagnostic>, Vec<QueryResponse>) {
        let mut diags = Vec::new();
        let mut responses = Vec::new();
        for item in self.rx.try_iter() {
            match item {
                QueueItem::Diag(diag) => diags.push(*diag),
                QueueItem::Response(response) => responses.push(*response),
            }
        }
        (diags, responses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_drains_in_push_order() {
        let queue = ErrorQueue::new();
        queue.push_diagnostic(Diagnostic::new(
            DiagnosticCode::ParseSyntax,
            Loc::NONE,
            "first",
        ));
        queue.push_diagnostic(Diagnostic::new(
            DiagnosticCode::DeadCode,
            Loc::NONE,
            "second",
        ));
        let (diags, responses) = queue.drain();
        assert_eq!(diags.len(), 2);
        assert!(responses.is_empty());
        assert_eq!(diags[0].header, "first");
        assert_eq!(diags[1].severity, Severity::Warning);
        assert!(queue.drain().0.is_empty());
    }
}
