use std::time::Duration;
use thiserror::Error;

/// Evaluation of a screen source failed as a whole.
#[derive(Debug, Clone, Error)]
pub enum EvalError {
    #[error("SyntaxError: {message}")]
    Syntax { message: String, report: String },
    #[error("{message}")]
    Runtime { message: String, stack: Vec<String> },
    #[error("render() was never called with a node")]
    NoRoot,
}

impl EvalError {
    /// Diagnostic text shown under the message: the rendered syntax report or the call trace.
    pub fn stack(&self) -> String {
        match self {
            Self::Syntax { report, .. } => report.clone(),
            Self::Runtime { stack, .. } => stack.join("\n"),
            Self::NoRoot => String::new(),
        }
    }
}

/// A single list item failed to build. Never propagated past `LazyColumn`.
#[derive(Debug, Clone, Error)]
#[error("LazyColumn item render error: {message}")]
pub struct ItemRenderError {
    pub index: usize,
    pub message: String,
}

#[derive(Debug, Clone, Error)]
pub enum ActionError {
    #[error("malformed action statement `{statement}`, expected `path = expression`")]
    Malformed { statement: String },
    #[error("invalid assignment target `{path}`")]
    InvalidPath { path: String },
    #[error("cannot store a {kind} in `{path}`")]
    NotData { path: String, kind: &'static str },
    #[error("`{statement}`: {source}")]
    Eval {
        statement: String,
        #[source]
        source: EvalError,
    },
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to read `{key}`: {source}")]
    Read {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write `{key}`: {source}")]
    Write {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("stored project `{key}` is malformed: {reason}")]
    Malformed { key: String, reason: String },
    #[error("failed to serialize project: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Error)]
pub enum RenderError {
    #[error("external renderer is not loaded")]
    RendererUnavailable,
    #[error("external renderer failed: {0}")]
    RendererFailed(String),
    #[error("external renderer timed out after {} ms", .0.as_millis())]
    RendererTimedOut(Duration),
    #[error(transparent)]
    Eval(#[from] EvalError),
}

#[derive(Debug, Clone, Error)]
pub enum InteractionError {
    #[error("no interactive element at index {0}")]
    NoSuchElement(usize),
    #[error("element {index} has no `{event}` listener")]
    NoListener { index: usize, event: String },
    #[error(transparent)]
    Handler(#[from] EvalError),
}
