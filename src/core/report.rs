//! Crate-wide error taxonomy.
//!
//! Every failure that crosses a module boundary is eventually described by
//! an [`ErrorRecord`]: a category, a severity, and whether automatic
//! recovery is worth attempting. The renderer and validator reuse the same
//! categories for their warnings so reports aggregate cleanly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Broad classification of a failure, used to select a recovery strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    /// Malformed template source or expression; never auto-recovered
    Syntax,
    /// Schema/configuration inconsistencies; warnings unless marked required
    Validation,
    /// Disk, path, or I/O failures; retried when transient
    FileSystem,
    /// Access denied by the operating system
    Permission,
    /// Destination already exists and no policy resolved it
    Conflict,
    /// A reversal step failed during rollback execution
    Rollback,
    /// Anything that did not match a known pattern
    Unknown,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Syntax => "syntax",
            Self::Validation => "validation",
            Self::FileSystem => "file-system",
            Self::Permission => "permission",
            Self::Conflict => "conflict",
            Self::Rollback => "rollback",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// How serious a categorized failure is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// A single categorized failure observed during a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRecord {
    /// Failure classification
    pub category: ErrorCategory,
    /// How serious the failure is
    pub severity: ErrorSeverity,
    /// Human-readable description, including the path where applicable
    pub message: String,
    /// Whether a bounded automatic recovery attempt is worthwhile
    pub recoverable: bool,
    /// When the failure was observed
    pub at: DateTime<Utc>,
}

impl ErrorRecord {
    /// Create a record timestamped now.
    pub fn new(
        category: ErrorCategory,
        severity: ErrorSeverity,
        message: impl Into<String>,
        recoverable: bool,
    ) -> Self {
        Self {
            category,
            severity,
            message: message.into(),
            recoverable,
            at: Utc::now(),
        }
    }
}
