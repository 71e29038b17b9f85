//! Error types and exit code constants for pyndex.
//!
//! This module provides a unified error type (`IndexError`) that bridges
//! failures from the subsystems (CLI argument handling, the parser
//! subprocess, the fact store) into a common format with stable exit codes.
//!
//! ## Exit Code Mapping
//!
//! - `2`: Invalid arguments (bad input from caller)
//! - `3`: Parser errors (subprocess failed, malformed AST output)
//! - `4`: Invariant errors (duplicate edge, unreachable path, FQN mismatch)
//! - `10`: Internal errors (bugs, unexpected state)
//!
//! Semantic ambiguity is never an error: unresolved symbols stay in the
//! symbol table with empty unions and the fixpoint decides. Only
//! structural and I/O failures reach this type.

use std::fmt;

use thiserror::Error;

// ============================================================================
// Exit Codes
// ============================================================================

/// Process exit codes for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitStatus {
    /// Invalid arguments from caller.
    InvalidArguments = 2,
    /// Parser subprocess failed or produced malformed output.
    ParserError = 3,
    /// An internal invariant was violated.
    InvariantError = 4,
    /// Internal errors (bugs, unexpected state).
    InternalError = 10,
}

impl ExitStatus {
    /// Get the numeric code value.
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ============================================================================
// Unified Error Type
// ============================================================================

/// Unified error type for the indexing pipeline.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Invalid arguments from caller.
    #[error("invalid arguments: {message}")]
    InvalidArguments { message: String },

    /// The parser subprocess exited nonzero.
    #[error("parser command {command:?} exited with status {status}")]
    ParserFailed { command: String, status: i32 },

    /// The parser output did not contain exactly two JSON values.
    #[error("malformed parser output: {reason}")]
    MalformedAst { reason: String },

    /// An edge was emitted twice with the same (source, kind, target).
    #[error("duplicate edge {edge_kind} from {source_node} to {target}")]
    DuplicateEdge {
        source_node: String,
        edge_kind: String,
        target: String,
    },

    /// A path could not be canonicalized under any root path.
    #[error("path {path} is not reachable under any root path")]
    PathNotUnderRoot { path: String },

    /// The module FQN derived from the path disagrees with the requested one.
    #[error("module mismatch: derived {derived} but requested {requested}")]
    ModuleMismatch { derived: String, requested: String },

    /// Internal error (bug or unexpected state).
    #[error("internal error: {message}")]
    InternalError { message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for indexing operations.
pub type IndexResult<T> = Result<T, IndexError>;

// ============================================================================
// Exit Code Mapping
// ============================================================================

impl From<&IndexError> for ExitStatus {
    fn from(err: &IndexError) -> Self {
        match err {
            IndexError::InvalidArguments { .. } => ExitStatus::InvalidArguments,
            IndexError::ParserFailed { .. } => ExitStatus::ParserError,
            IndexError::MalformedAst { .. } => ExitStatus::ParserError,
            IndexError::DuplicateEdge { .. } => ExitStatus::InvariantError,
            IndexError::PathNotUnderRoot { .. } => ExitStatus::InvariantError,
            IndexError::ModuleMismatch { .. } => ExitStatus::InvariantError,
            IndexError::InternalError { .. } => ExitStatus::InternalError,
            IndexError::Io(_) => ExitStatus::InternalError,
            IndexError::Json(_) => ExitStatus::ParserError,
        }
    }
}

// ============================================================================
// Convenience Constructors
// ============================================================================

impl IndexError {
    /// Create an invalid arguments error.
    pub fn invalid_args(message: impl Into<String>) -> Self {
        IndexError::InvalidArguments {
            message: message.into(),
        }
    }

    /// Create a malformed AST error.
    pub fn malformed_ast(reason: impl Into<String>) -> Self {
        IndexError::MalformedAst {
            reason: reason.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        IndexError::InternalError {
            message: message.into(),
        }
    }

    /// Get the exit status for this error.
    pub fn exit_status(&self) -> ExitStatus {
        ExitStatus::from(self)
    }
}

// ============================================================================
// Tests
// ============================================================================
