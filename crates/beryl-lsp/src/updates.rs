//! Edit descriptors flowing from the preprocessor to the typechecker.
//!
//! Deliberately opaque: the preprocessor never reads the `GlobalState`, it
//! only forwards paths and full contents; the typechecker thread decides
//! the fast/slow path by hashing.

use std::sync::Arc;

use ecow::EcoString;

/// One file's new full contents.
#[derive(Clone, Debug)]
pub struct FileEdit {
    /// The file's path (the document URI in editor mode).
    pub path: EcoString,
    /// The complete new text.
    pub contents: Arc<str>,
}

/// A batch of edits targeting one epoch.
#[derive(Clone, Debug, Default)]
pub struct FileUpdates {
    /// The epoch this batch commits as.
    pub epoch: u32,
    /// The edited files, latest content per path.
    pub edits: Vec<FileEdit>,
}

impl FileUpdates {
    /// Creates a batch.
    pub fn new(epoch: u32, edits: Vec<FileEdit>) -> FileUpdates {
        FileUpdates { epoch, edits }
    }
}
