//! The editor service core.
//!
//! Wires the incremental pipeline to an editor: a message loop that
//! preprocesses and coalesces requests, a dedicated typechecker thread
//! owning the committed [`GlobalState`](beryl_core::GlobalState), fast and
//! slow typecheck paths selected by file hashes, and a preemption manager
//! that lets queries interrupt (and edits cancel) an in-flight slow path.

pub mod client;
pub mod diagnostics;
pub mod msg;
pub mod preemption;
pub mod server;
pub mod typechecker;
pub mod updates;

pub use client::{Client, RunStatus, TypecheckRunInfo};
pub use msg::{ErrorCode, Message, Notification, Request, RequestId, Response};
pub use preemption::PreemptionManager;
pub use server::{Connection, run_server};
pub use typechecker::{Typechecker, TypecheckerCoordinator};
pub use updates::{FileEdit, FileUpdates};
