//! Error handling for guidegen.
//!
//! This module provides the strongly-typed error enum used across the crate.
//! The error system is designed around two principles:
//! 1. **Strongly-typed errors** for precise error handling in code
//! 2. **Structured context** (file, line, column) so callers can surface
//!    actionable messages without string parsing
//!
//! Orchestration seams (the generator, the rollback manager) propagate
//! errors through [`anyhow`] with `with_context`, while leaf modules return
//! [`GuidegenError`] directly. Raw failures are mapped onto the
//! category/severity taxonomy in [`crate::core::report`] by the recovery
//! module.

use thiserror::Error;
use uuid::Uuid;

/// The main error type for guidegen operations.
///
/// Each variant represents a specific failure mode and carries enough
/// context to report the failure without inspecting the filesystem or
/// re-parsing the template.
#[derive(Error, Debug)]
pub enum GuidegenError {
    /// Template source failed to tokenize or its blocks do not balance.
    ///
    /// Line and column are 1-based positions into the original template
    /// source, pointing at the offending delimiter or tag.
    #[error("template syntax error at line {line}, column {column}: {message}")]
    TemplateSyntax {
        /// Description of what went wrong
        message: String,
        /// 1-based line of the offending token
        line: usize,
        /// 1-based column of the offending token
        column: usize,
    },

    /// An expression inside `{{ }}` or `{% %}` failed to parse.
    #[error("invalid expression '{expression}': {message}")]
    ExpressionSyntax {
        /// The raw expression text
        expression: String,
        /// Description of the parse failure
        message: String,
    },

    /// Block nesting exceeded [`crate::constants::MAX_BLOCK_DEPTH`].
    #[error("block nesting exceeds maximum depth of {max} at line {line}")]
    DepthExceeded {
        /// The configured maximum depth
        max: usize,
        /// Line of the block that crossed the limit
        line: usize,
    },

    /// Static validation failed in a fatal category; no files were touched.
    #[error("template '{name}' failed validation: {summary}")]
    TemplateInvalid {
        /// Template name
        name: String,
        /// First fatal problem, plus a count of the rest
        summary: String,
    },

    /// A resolved output path escapes the configured output root.
    #[error("resolved path '{path}' escapes the output root")]
    PathEscapesRoot {
        /// The offending resolved path
        path: String,
    },

    /// A rendered file path did not resolve to a usable relative path.
    #[error("file path template '{template}' resolved to an invalid path: {reason}")]
    InvalidOutputPath {
        /// The path template as written in the template definition
        template: String,
        /// Why the resolved value was rejected
        reason: String,
    },

    /// The requested rollback point does not exist.
    #[error("rollback point {id} not found")]
    RollbackPointNotFound {
        /// Identifier passed by the caller
        id: Uuid,
    },

    /// A reversal step was recorded against a point that is no longer active.
    #[error("rollback point {id} is not active (status: {status})")]
    RollbackPointNotActive {
        /// Identifier of the point
        id: Uuid,
        /// Current status, rendered for display
        status: String,
    },

    /// Rollback was requested for a point that has already been committed.
    #[error("cannot roll back committed point {id}")]
    RollbackPointCommitted {
        /// Identifier of the point
        id: Uuid,
    },

    /// A file generation task exceeded its execution timeout.
    #[error("file task for '{path}' timed out after {seconds}s")]
    TaskTimeout {
        /// Destination path of the timed-out task
        path: String,
        /// The configured timeout in seconds
        seconds: u64,
    },

    /// Standard I/O error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
