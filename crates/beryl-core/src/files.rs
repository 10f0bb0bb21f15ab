//! The file table.

use core::fmt;
use std::sync::Arc;

use ecow::EcoString;

use crate::loc::LocOffsets;

/// A dense handle into the file table.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct FileRef(u32);

impl FileRef {
    /// The sentinel for "no file".
    pub const NONE: FileRef = FileRef(u32::MAX);

    /// Creates a reference from a dense index.
    pub const fn from_index(idx: u32) -> Self {
        Self(idx)
    }

    /// The dense index of this file.
    pub const fn index(self) -> u32 {
        self.0
    }

    /// Whether this is a real file reference.
    pub fn exists(self) -> bool {
        self != Self::NONE
    }
}

impl fmt::Debug for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.exists() {
            return write!(f, "File#???");
        }
        write!(f, "File#{}", self.0)
    }
}

/// How strictly a file is typechecked, from its `# typed:` sigil.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, serde::Serialize)]
pub enum StrictLevel {
    /// The file is skipped entirely.
    Ignore,
    /// Only syntax and resolution errors are reported.
    False,
    /// Inference errors are reported.
    True,
    /// Additionally requires every method to carry a signature.
    Strict,
    /// Additionally forbids `T.untyped` in signatures.
    Strong,
}

impl StrictLevel {
    fn from_sigil(text: &str) -> Option<StrictLevel> {
        match text {
            "ignore" => Some(StrictLevel::Ignore),
            "false" => Some(StrictLevel::False),
            "true" => Some(StrictLevel::True),
            "strict" => Some(StrictLevel::Strict),
            "strong" => Some(StrictLevel::Strong),
            _ => None,
        }
    }
}

/// What kind of input a file is.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, serde::Serialize)]
pub enum FileType {
    /// An ordinary source file.
    Normal,
    /// A file shipped with the checker that defines the core library.
    Payload,
    /// An interface-only file: declarations without runtime behavior.
    Interface,
    /// A package description file.
    Package,
}

/// One source file: path, text, sigil-derived strictness, and a precomputed
/// line-break index for rendering positions.
#[derive(Clone)]
pub struct File {
    /// Workspace-relative path.
    pub path: EcoString,
    /// The full source text.
    pub source: Arc<str>,
    /// Strictness from the `# typed:` sigil, default [`StrictLevel::False`].
    pub strict_level: StrictLevel,
    /// What kind of input this is.
    pub file_type: FileType,
    /// Byte offsets of every `\n`.
    line_breaks: Vec<u32>,
}

impl File {
    /// Creates a file, scanning the sigil and the line-break index.
    pub fn new(path: impl Into<EcoString>, source: impl Into<Arc<str>>, file_type: FileType) -> Self {
        let source: Arc<str> = source.into();
        let strict_level = scan_sigil(&source).unwrap_or(StrictLevel::False);
        let line_breaks = source
            .bytes()
            .enumerate()
            .filter(|(_, b)| *b == b'\n')
            .map(|(i, _)| i as u32)
            .collect();
        Self {
            path: path.into(),
            source,
            strict_level,
            file_type,
            line_breaks,
        }
    }

    /// Converts a byte offset to a zero-based (line, column) pair.
    pub fn line_col(&self, offset: u32) -> (u32, u32) {
        let line = self.line_breaks.partition_point(|&brk| brk < offset);
        let line_start = if line == 0 {
            0
        } else {
            self.line_breaks[line - 1] + 1
        };
        (line as u32, offset.saturating_sub(line_start))
    }

    /// Converts a zero-based (line, column) pair to a byte offset.
    pub fn offset_of(&self, line: u32, col: u32) -> u32 {
        let line_start = if line == 0 {
            0
        } else {
            match self.line_breaks.get(line as usize - 1) {
                Some(&brk) => brk + 1,
                None => return self.source.len() as u32,
            }
        };
        (line_start + col).min(self.source.len() as u32)
    }

    /// The source text under `offsets`.
    pub fn slice(&self, offsets: LocOffsets) -> &str {
        &self.source[offsets.begin as usize..offsets.end as usize]
    }
}

/// Scans the leading comment lines for a `# typed: <level>` sigil.
fn scan_sigil(source: &str) -> Option<StrictLevel> {
    for line in source.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !trimmed.starts_with('#') {
            // The sigil must precede any code.
            return None;
        }
        let comment = trimmed.trim_start_matches('#').trim();
        if let Some(level) = comment.strip_prefix("typed:") {
            return StrictLevel::from_sigil(level.trim());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigil_sets_strictness() {
        let file = File::new("a.brl", "# typed: strict\nclass A; end\n", FileType::Normal);
        assert_eq!(file.strict_level, StrictLevel::Strict);
    }

    #[test]
    fn missing_or_malformed_sigil_defaults_to_false() {
        let file = File::new("a.brl", "class A; end\n", FileType::Normal);
        assert_eq!(file.strict_level, StrictLevel::False);
        let file = File::new("a.brl", "# typed: sometimes\n", FileType::Normal);
        assert_eq!(file.strict_level, StrictLevel::False);
    }

    #[test]
    fn sigil_after_code_is_ignored() {
        let file = File::new("a.brl", "class A; end\n# typed: true\n", FileType::Normal);
        assert_eq!(file.strict_level, StrictLevel::False);
    }

    #[test]
    fn line_col_round_trips() {
        let file = File::new("a.brl", "ab\ncd\nef", FileType::Normal);
        assert_eq!(file.line_col(0), (0, 0));
        assert_eq!(file.line_col(4), (1, 1));
        assert_eq!(file.offset_of(1, 1), 4);
        assert_eq!(file.line_col(7), (2, 1));
    }
}
