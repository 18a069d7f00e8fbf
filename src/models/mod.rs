//! Shared data models: template definitions handed to the core by
//! collaborators, and the per-file results handed back.
//!
//! A [`Template`] is loaded (from a guide package, a config file, or a
//! test fixture) by out-of-scope collaborators and given to the core
//! read-only; the core never mutates it. Results flow the other way as
//! [`GeneratedFile`] records, one per planned output file.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::ErrorRecord;
use crate::template::value::Value;

/// A named collection of output-file definitions with embedded control
/// syntax. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    /// Template name; also the default cache id prefix
    pub name: String,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
    /// Semantic version of the template package
    pub version: String,
    /// Optional variable schema; unknown references are warnings when a
    /// schema is present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Vec<VariableSpec>>,
    /// Output file definitions
    pub files: Vec<TemplateFile>,
}

/// One declared variable in a template's schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// When true, generation must not proceed without a binding
    #[serde(default)]
    pub required: bool,
    /// Default value; a string default may itself be a template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// One output file definition inside a template.
///
/// `path` is itself a template string, resolved against the variable
/// context before any filesystem use. `content` is the file's template
/// body. An optional `condition` expression gates the file entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateFile {
    pub path: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Unix permission bits to apply after writing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<u32>,
    /// Per-file conflict override: `Some(true)` forces overwrite,
    /// `Some(false)` forces skip, `None` defers to the run policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overwrite: Option<bool>,
}

/// The per-file outcome of a generation run.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedFile {
    /// Final destination path (the renamed path for `Rename` outcomes)
    pub path: PathBuf,
    /// Rendered, formatted content (empty for condition-skipped files)
    pub content: String,
    /// The pre-existing file's path when the destination was occupied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_path: Option<PathBuf>,
    /// User-visible backup location, populated for the `Backup` strategy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<PathBuf>,
    /// Whether an existing file's bytes were replaced
    pub overwritten: bool,
    /// Whether the file was skipped (falsy condition or `Skip` strategy)
    pub skipped: bool,
    /// Whether the file's task completed without error
    pub success: bool,
    /// Categorized failure, when `success` is false
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,
}

impl GeneratedFile {
    /// A file skipped before any write (falsy condition or skip strategy).
    pub(crate) fn skipped(path: PathBuf, content: String, existed: bool) -> Self {
        Self {
            original_path: existed.then(|| path.clone()),
            path,
            content,
            backup_path: None,
            overwritten: false,
            skipped: true,
            success: true,
            error: None,
        }
    }

    /// A file whose task failed; nothing was written to the destination.
    pub(crate) fn failed(path: PathBuf, error: ErrorRecord) -> Self {
        Self {
            path,
            content: String::new(),
            original_path: None,
            backup_path: None,
            overwritten: false,
            skipped: false,
            success: false,
            error: Some(error),
        }
    }
}
