//! Conversions between core diagnostics and LSP wire types.

use beryl_core::diag::{Diagnostic, Severity};
use beryl_core::files::FileRef;
use beryl_core::loc::Loc;
use beryl_core::GlobalState;
use lsp_types::{
    DiagnosticRelatedInformation, DiagnosticSeverity, Location, NumberOrString, Position, Range,
    Url,
};

/// Converts a byte-offset location to an LSP range.
pub fn loc_to_range(gs: &GlobalState, loc: Loc) -> Range {
    if !loc.exists() {
        return Range::default();
    }
    let file = gs.file(loc.file);
    let (start_line, start_col) = file.line_col(loc.offsets.begin);
    let (end_line, end_col) = file.line_col(loc.offsets.end);
    Range {
        start: Position::new(start_line, start_col),
        end: Position::new(end_line, end_col),
    }
}

/// Converts an LSP position to a byte offset in `fref`.
pub fn position_to_offset(gs: &GlobalState, fref: FileRef, position: Position) -> u32 {
    gs.file(fref).offset_of(position.line, position.character)
}

/// The URI a file was opened under. File paths double as URI strings in
/// editor mode.
pub fn file_uri(gs: &GlobalState, fref: FileRef) -> Option<Url> {
    Url::parse(&gs.file(fref).path).ok()
}

/// Converts a location to an LSP location, when its file has a parseable
/// URI.
pub fn loc_to_location(gs: &GlobalState, loc: Loc) -> Option<Location> {
    if !loc.exists() {
        return None;
    }
    Some(Location {
        uri: file_uri(gs, loc.file)?,
        range: loc_to_range(gs, loc),
    })
}

/// Converts one core diagnostic to the wire form.
pub fn to_lsp_diagnostic(gs: &GlobalState, diag: &Diagnostic) -> lsp_types::Diagnostic {
    let severity = match diag.severity {
        Severity::Error => DiagnosticSeverity::ERROR,
        Severity::Warning => DiagnosticSeverity::WARNING,
        Severity::Information => DiagnosticSeverity::INFORMATION,
        Severity::Hint => DiagnosticSeverity::HINT,
    };
    let mut related = Vec::new();
    for section in &diag.sections {
        for (loc, message) in &section.locs {
            let Some(location) = loc_to_location(gs, *loc) else {
                continue;
            };
            related.push(DiagnosticRelatedInformation {
                location,
                message: format!("{}: {}", section.header, message),
            });
        }
    }
    lsp_types::Diagnostic {
        range: loc_to_range(gs, diag.loc),
        severity: Some(severity),
        code: Some(NumberOrString::Number(diag.code.code() as i32)),
        source: Some("beryl".to_string()),
        message: diag.header.to_string(),
        related_information: (!related.is_empty()).then_some(related),
        ..lsp_types::Diagnostic::default()
    }
}
