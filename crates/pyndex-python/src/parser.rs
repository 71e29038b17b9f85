//! The upstream parser subprocess protocol.
//!
//! The indexer does not parse Python itself: it invokes the parser command
//! with the source path and a temporary output path, then reads back two
//! concatenated JSON values: a `Meta` record followed by the cooked AST
//! root. The temporary file has scoped lifetime and is released on every
//! exit path.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::process::Command;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

use pyndex_core::error::IndexError;

// ============================================================================
// Error Types
// ============================================================================

/// Errors from invoking the parser or decoding its output.
#[derive(Debug, Error)]
pub enum ParserError {
    /// The parser command string was empty.
    #[error("empty parser command")]
    EmptyCommand,

    /// The parser process could not be spawned.
    #[error("failed to spawn parser {command:?}: {source}")]
    SpawnFailed {
        command: String,
        source: std::io::Error,
    },

    /// The parser exited nonzero.
    #[error("parser {command:?} exited with status {status}")]
    Failed { command: String, status: i32 },

    /// The output did not contain exactly two JSON values.
    #[error("parser output malformed: {reason}")]
    Malformed { reason: String },

    /// IO error reading the output file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ParserError> for IndexError {
    fn from(err: ParserError) -> Self {
        match err {
            ParserError::EmptyCommand => IndexError::invalid_args("empty --parsecmd"),
            ParserError::SpawnFailed { command, source } => IndexError::ParserFailed {
                command: format!("{} ({})", command, source),
                status: -1,
            },
            ParserError::Failed { command, status } => {
                IndexError::ParserFailed { command, status }
            }
            ParserError::Malformed { reason } => IndexError::malformed_ast(reason),
            ParserError::Io(err) => IndexError::Io(err),
            ParserError::Json(err) => IndexError::malformed_ast(err.to_string()),
        }
    }
}

/// Result type for parser operations.
pub type ParserResult<T> = Result<T, ParserError>;

// ============================================================================
// Protocol Types
// ============================================================================

/// The first JSON value of the parser output: process-scoped metadata
/// stamped onto every emitted VName.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meta {
    /// Corpus field for emitted VNames.
    #[serde(default)]
    pub kythe_corpus: String,
    /// Root field for emitted VNames.
    #[serde(default)]
    pub kythe_root: String,
    /// Path of the parsed source file, as seen by the parser.
    pub path: String,
    /// Language field for semantic VNames (always `python` today).
    pub language: String,
    /// The file's raw contents, base64-encoded.
    pub contents_b64: String,
}

/// The two values the parser writes.
#[derive(Debug)]
pub struct ParserOutput {
    pub meta: Meta,
    pub ast: Value,
}

// ============================================================================
// Invocation
// ============================================================================

/// How to invoke the upstream parser.
#[derive(Debug, Clone)]
pub struct ParserInvocation {
    /// The parser command, split on whitespace into program and arguments.
    pub parsecmd: String,
    pub kythe_corpus: String,
    pub kythe_root: String,
    pub python_version: u8,
}

impl ParserInvocation {
    /// Run the parser over `src` for module `module` and decode its output.
    pub fn run(&self, src: &Path, module: &str) -> ParserResult<ParserOutput> {
        let mut words = self.parsecmd.split_whitespace();
        let program = words.next().ok_or(ParserError::EmptyCommand)?;

        // The output file lives exactly as long as this call.
        let out_file = NamedTempFile::new()?;

        let mut command = Command::new(program);
        command
            .args(words)
            .arg(format!("--kythe-corpus={}", self.kythe_corpus))
            .arg(format!("--kythe-root={}", self.kythe_root))
            .arg(format!("--python_version={}", self.python_version))
            .arg(format!("--src={}", src.display()))
            .arg(format!("--module={}", module))
            .arg(format!("--out_fqn_expr={}", out_file.path().display()));
        debug!(?command, "invoking parser");

        let status = command.status().map_err(|source| ParserError::SpawnFailed {
            command: self.parsecmd.clone(),
            source,
        })?;
        if !status.success() {
            return Err(ParserError::Failed {
                command: self.parsecmd.clone(),
                status: status.code().unwrap_or(-1),
            });
        }

        let reader = BufReader::new(File::open(out_file.path())?);
        read_output(reader)
    }
}

/// Decode the parser output: exactly two concatenated JSON values.
pub fn read_output(reader: impl Read) -> ParserResult<ParserOutput> {
    let mut stream = serde_json::Deserializer::from_reader(reader).into_iter::<Value>();

    let meta_value = stream
        .next()
        .ok_or_else(|| ParserError::Malformed {
            reason: "expected two JSON values, got none".to_string(),
        })??;
    let meta: Meta = serde_json::from_value(meta_value)?;

    let ast = stream
        .next()
        .ok_or_else(|| ParserError::Malformed {
            reason: "expected two JSON values, got one".to_string(),
        })??;

    if stream.next().is_some() {
        return Err(ParserError::Malformed {
            reason: "trailing data after the AST value".to_string(),
        });
    }

    Ok(ParserOutput { meta, ast })
}

// ============================================================================
// Tests
// ============================================================================
