//! Sandboxed runtime of the Compose mini IDE.
//!
//! Screen sources written in a small JavaScript-flavoured DSL are evaluated
//! into node trees, rendered onto surfaces, and wired to an action language
//! that edits a JSON state document. Every edit is a step in an undo/redo
//! history that survives restarts.

pub mod action;
pub mod error;
pub mod evaluator;
pub mod export;
pub mod history;
pub mod parser;
pub mod platform;
pub mod project;
pub mod render;
pub mod storage;
pub mod value;
pub mod vnode;
pub mod workspace;

pub use error::{ActionError, EvalError, InteractionError, PersistenceError, RenderError};
pub use evaluator::{BuilderApi, Host, RecordingHost, evaluate};
pub use render::{ExternalRenderer, Preview, RenderMode, Surface};
pub use storage::{MemoryStorage, Storage};
pub use workspace::{HistoryStep, Status, StatusKind, Workspace};
