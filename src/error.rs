//! Error taxonomy for the buffer engine.
//!
//! Nothing in the reducer or host adapter panics; this module covers the
//! two kinds of failure the core actually surfaces: a typed error from the
//! external-editor round trip, and a best-effort feedback event for
//! non-fatal, user-visible notices.

use thiserror::Error;

/// Failures specific to resolving and invoking an external editor.
#[derive(Debug, Error)]
pub enum EditorError {
    #[error("neither VISUAL nor EDITOR is set and no platform default is available")]
    MissingEditor,
    #[cfg(not(windows))]
    #[error("failed to parse editor command")]
    ParseFailed,
    #[error("editor command is empty")]
    EmptyCommand,
    #[error("failed to create temporary file: {0}")]
    TempFile(#[source] std::io::Error),
    #[error("failed to spawn editor: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("editor exited with non-zero status: {0}")]
    NonZeroExit(std::process::ExitStatus),
    #[error("failed to read edited content: {0}")]
    ReadBack(#[source] std::io::Error),
}

/// Severity of a [`Feedback`] event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackKind {
    Info,
    Error,
}

/// A non-fatal, user-visible notice raised by the engine (e.g. "external
/// editor failed"). The core never panics; this is the escape hatch for
/// surfacing a problem to whatever is hosting it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feedback {
    pub kind: FeedbackKind,
    pub message: String,
}

impl Feedback {
    pub fn error(message: impl Into<String>) -> Self {
        Self { kind: FeedbackKind::Error, message: message.into() }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self { kind: FeedbackKind::Info, message: message.into() }
    }
}
