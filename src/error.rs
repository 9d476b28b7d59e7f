//! Error types for the crate.

use std::io;
use std::process::ExitStatus;

use thiserror::Error;

use crate::board::MoveError;
use crate::position::PlayedMove;

/// Main error type for game and analysis operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ShapeError {
    #[error("illegal move {played}: {source}")]
    IllegalMove {
        played: PlayedMove,
        #[source]
        source: MoveError,
    },

    #[error("unsupported board size {size} (must be 1-{max})")]
    InvalidBoardSize { size: usize, max: usize },

    #[error("policy of length {len} is not a square board plus a pass entry")]
    InvalidPolicy { len: usize },

    #[error("analysis response has no policy")]
    MissingPolicy,

    #[error("analysis for profile '{profile}' has no humanPolicy")]
    MissingHumanPolicy { profile: String },

    #[error(transparent)]
    Sgf(#[from] SgfImportError),

    #[error(transparent)]
    EngineStartup(#[from] EngineStartupError),
}

/// Result alias for [`ShapeError`].
pub type Result<T> = std::result::Result<T, ShapeError>;

/// Why an SGF record could not be imported. Nothing is committed on failure.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SgfImportError {
    #[error("no game tree found (expected '(;')")]
    NotSgf,

    #[error("unterminated value for property {property}")]
    Unterminated { property: String },

    #[error("invalid board size '{value}'")]
    InvalidBoardSize { value: String },

    #[error("move {index}: cannot read coordinate '{value}'")]
    InvalidCoordinate { index: usize, value: String },

    #[error("move {index}: {source}")]
    IllegalMove {
        index: usize,
        #[source]
        source: MoveError,
    },
}

/// The analysis engine could not be brought up.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum EngineStartupError {
    #[error("failed to start engine '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("engine exited during startup ({status}): {stderr}")]
    ExitedEarly { status: ExitStatus, stderr: String },

    #[error("engine process has no {stream} pipe")]
    MissingPipe { stream: &'static str },

    #[error("failed to start {thread} thread: {source}")]
    Thread {
        thread: &'static str,
        #[source]
        source: io::Error,
    },
}

/// Where a failed query went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisErrorKind {
    /// The engine answered with an `error` field.
    Rejected,
    /// The query could not be written because the engine is gone.
    Transport,
    /// The query was refused before reaching the engine, for a full queue or
    /// a node that no longer exists. Asking again later may succeed.
    Unavailable,
}

/// A query failed. Delivered through the query's callback.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("analysis query {id} failed: {message}")]
pub struct AnalysisError {
    pub kind: AnalysisErrorKind,
    pub id: String,
    pub message: String,
}

impl AnalysisError {
    /// An error reply from the engine.
    pub fn new(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_kind(AnalysisErrorKind::Rejected, id, message)
    }

    pub fn transport(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_kind(AnalysisErrorKind::Transport, id, message)
    }

    pub fn unavailable(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_kind(AnalysisErrorKind::Unavailable, id, message)
    }

    pub fn with_kind(
        kind: AnalysisErrorKind,
        id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            id: id.into(),
            message: message.into(),
        }
    }

    /// True when the query was never seen by the engine and can be retried.
    pub fn is_retryable(&self) -> bool {
        self.kind == AnalysisErrorKind::Unavailable
    }
}
