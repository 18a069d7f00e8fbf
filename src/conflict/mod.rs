//! Destination-conflict resolution.
//!
//! When a planned output path is already occupied, the run's policy picks
//! one of four strategies. Decisions are recorded in a per-run ledger so
//! concurrent tasks targeting the same destination see one consistent
//! answer, and so a run report can list every resolution taken.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::constants::MAX_RENAME_ATTEMPTS;
use crate::core::GuidegenError;

/// What to do when the destination file already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictStrategy {
    /// Replace the existing file (its pre-image is still snapshotted for
    /// rollback)
    Overwrite,
    /// Copy the existing file to a backup location, then replace it
    Backup,
    /// Leave the existing file alone and write under a derived name
    Rename,
    /// Leave the existing file untouched and skip the write
    Skip,
}

/// Run-wide conflict policy: one fixed strategy, or a per-path selector.
#[derive(Clone)]
pub enum ConflictPolicy {
    Fixed(ConflictStrategy),
    Selector(Arc<dyn Fn(&Path) -> ConflictStrategy + Send + Sync>),
}

impl ConflictPolicy {
    fn choose(&self, destination: &Path) -> ConflictStrategy {
        match self {
            Self::Fixed(strategy) => *strategy,
            Self::Selector(select) => select(destination),
        }
    }
}

impl Default for ConflictPolicy {
    /// Skipping is the only default that can never destroy user data.
    fn default() -> Self {
        Self::Fixed(ConflictStrategy::Skip)
    }
}

impl fmt::Debug for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(strategy) => f.debug_tuple("Fixed").field(strategy).finish(),
            Self::Selector(_) => f.write_str("Selector(..)"),
        }
    }
}

/// One recorded resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictDecision {
    pub destination: PathBuf,
    pub strategy: ConflictStrategy,
    /// The derived destination, populated for `Rename`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_path: Option<PathBuf>,
}

/// Per-run decision ledger. Decisions are made at most once per
/// destination; later callers get the recorded decision back.
#[derive(Debug, Default)]
pub struct ConflictLedger {
    decisions: DashMap<PathBuf, ConflictDecision>,
}

impl ConflictLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the strategy for `destination`.
    ///
    /// `exists` is whether the destination is currently occupied; when it
    /// is not, the answer is always `Overwrite` (a plain write) and no
    /// decision is recorded. `forced` is the template file's per-file
    /// override and wins over the policy. For `Rename` the returned
    /// decision carries the first free derived path.
    pub fn resolve(
        &self,
        destination: &Path,
        exists: bool,
        forced: Option<ConflictStrategy>,
        policy: &ConflictPolicy,
    ) -> Result<ConflictDecision, GuidegenError> {
        if !exists {
            return Ok(ConflictDecision {
                destination: destination.to_path_buf(),
                strategy: ConflictStrategy::Overwrite,
                resolved_path: None,
            });
        }

        if let Some(existing) = self.decisions.get(destination) {
            return Ok(existing.clone());
        }

        let strategy = forced.unwrap_or_else(|| policy.choose(destination));
        let resolved_path = match strategy {
            ConflictStrategy::Rename => Some(derive_rename(destination)?),
            _ => None,
        };
        let decision = ConflictDecision {
            destination: destination.to_path_buf(),
            strategy,
            resolved_path,
        };
        tracing::debug!(
            destination = %destination.display(),
            ?strategy,
            "conflict resolved"
        );
        self.decisions
            .insert(destination.to_path_buf(), decision.clone());
        Ok(decision)
    }

    /// All decisions taken this run, in no particular order.
    pub fn decisions(&self) -> Vec<ConflictDecision> {
        self.decisions.iter().map(|e| e.value().clone()).collect()
    }
}

/// First free `name-N.ext` sibling of an occupied destination.
fn derive_rename(destination: &Path) -> Result<PathBuf, GuidegenError> {
    let dir = destination.parent().unwrap_or_else(|| Path::new("."));
    let stem = destination
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("file");
    let ext = destination.extension().and_then(|e| e.to_str());

    for n in 1..=MAX_RENAME_ATTEMPTS {
        let name = match ext {
            Some(ext) => format!("{stem}-{n}.{ext}"),
            None => format!("{stem}-{n}"),
        };
        let candidate = dir.join(name);
        if !candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(GuidegenError::InvalidOutputPath {
        template: destination.display().to_string(),
        reason: format!("no free rename candidate within {MAX_RENAME_ATTEMPTS} attempts"),
    })
}
