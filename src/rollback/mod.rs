//! Transactional rollback for generation runs.
//!
//! A run opens a rollback point, records an undo step before every
//! mutation, and either commits the point on success or replays the steps
//! in reverse on failure. Pre-images of updated files are snapshotted to
//! uniquely named siblings before the first byte changes, so rollback can
//! always restore the exact original content.
//!
//! Points live in memory for the process lifetime; snapshot files on disk
//! outlive the process and are a recovery resource, not state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::core::{ErrorCategory, ErrorRecord, ErrorSeverity, GuidegenError};
use crate::utils::fs;

/// Lifecycle of a rollback point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RollbackStatus {
    /// Open; steps may still be recorded and rollback is possible
    Active,
    /// The run succeeded; the point can no longer be rolled back
    Committed,
    /// The point's steps were replayed; further rollback is a no-op
    RolledBack,
}

/// A pre-image snapshot of an updated file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackupRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// The file that was about to be overwritten
    pub target: PathBuf,
    /// Where its original bytes were copied
    pub backup_path: PathBuf,
    pub original_size: u64,
    pub backup_size: u64,
    /// SHA-256 of the original bytes, for restore verification
    pub checksum: String,
}

/// The undo action for one recorded mutation.
#[derive(Debug, Clone, Serialize)]
pub enum RollbackOp {
    /// Copy the snapshot back over the target
    RestoreFile { backup: BackupRecord },
    /// Remove a file this run created
    DeleteCreatedFile,
    /// Move a file back to where it was
    ReverseMove { from: PathBuf, to: PathBuf },
}

#[derive(Debug, Clone, Serialize)]
pub struct RollbackStep {
    pub op: RollbackOp,
    /// The path the step acts on when replayed
    pub target: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct RollbackPoint {
    pub id: Uuid,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub status: RollbackStatus,
    /// In recording order; replayed back-to-front
    pub steps: Vec<RollbackStep>,
}

/// Outcome of replaying one step.
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub target: PathBuf,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,
}

/// Outcome of a whole rollback: best-effort, so individual steps may fail
/// while the rest still replay.
#[derive(Debug, Clone, Serialize)]
pub struct RollbackReport {
    pub point_id: Uuid,
    pub success: bool,
    pub step_results: Vec<StepResult>,
}

/// Tracks rollback points for the process.
///
/// The interior mutex is never held across filesystem awaits; rollback
/// snapshots the step list, replays it, then writes the status back.
#[derive(Debug, Default)]
pub struct RollbackManager {
    points: Mutex<HashMap<Uuid, RollbackPoint>>,
}

impl RollbackManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new rollback point.
    pub fn create_rollback_point(&self, description: &str) -> Uuid {
        let id = Uuid::new_v4();
        let point = RollbackPoint {
            id,
            description: description.to_string(),
            created_at: Utc::now(),
            status: RollbackStatus::Active,
            steps: Vec::new(),
        };
        tracing::debug!(%id, description, "rollback point created");
        self.points
            .lock()
            .expect("rollback point map lock poisoned")
            .insert(id, point);
        id
    }

    /// Snapshot `target` before it is overwritten and record the restore
    /// step. Must be called while `target` still holds its original bytes.
    pub async fn record_update(&self, point_id: Uuid, target: &Path) -> Result<BackupRecord> {
        self.ensure_active(point_id)?;

        let backup_path = backup_sibling(target);
        let original_size = fs::file_size(target).await?;
        let checksum = fs::calculate_checksum(target).await?;
        fs::copy_file(target, &backup_path).await?;
        let backup_size = fs::file_size(&backup_path).await?;
        if backup_size != original_size {
            anyhow::bail!(
                "backup of {} is truncated ({backup_size} of {original_size} bytes)",
                target.display()
            );
        }

        let backup = BackupRecord {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            target: target.to_path_buf(),
            backup_path,
            original_size,
            backup_size,
            checksum,
        };
        self.push_step(
            point_id,
            RollbackStep {
                op: RollbackOp::RestoreFile {
                    backup: backup.clone(),
                },
                target: target.to_path_buf(),
            },
        )?;
        Ok(backup)
    }

    /// Record that this run created `target` where nothing existed.
    pub fn record_create(&self, point_id: Uuid, target: &Path) -> Result<()> {
        self.ensure_active(point_id)?;
        self.push_step(
            point_id,
            RollbackStep {
                op: RollbackOp::DeleteCreatedFile,
                target: target.to_path_buf(),
            },
        )?;
        Ok(())
    }

    /// Record that this run moved a file from `from` to `to`.
    pub fn record_move(&self, point_id: Uuid, from: &Path, to: &Path) -> Result<()> {
        self.ensure_active(point_id)?;
        self.push_step(
            point_id,
            RollbackStep {
                op: RollbackOp::ReverseMove {
                    from: from.to_path_buf(),
                    to: to.to_path_buf(),
                },
                target: from.to_path_buf(),
            },
        )?;
        Ok(())
    }

    /// Replay a point's steps in reverse, best-effort.
    ///
    /// Rolling back an already rolled-back point is a no-op success.
    ///
    /// # Errors
    ///
    /// [`GuidegenError::RollbackPointCommitted`] when the point was
    /// committed, [`GuidegenError::RollbackPointNotFound`] when the id is
    /// unknown. Step failures do not error; they appear in the report.
    pub async fn rollback_to_point(&self, point_id: Uuid) -> Result<RollbackReport, GuidegenError> {
        let steps = {
            let points = self
                .points
                .lock()
                .expect("rollback point map lock poisoned");
            let point = points
                .get(&point_id)
                .ok_or(GuidegenError::RollbackPointNotFound { id: point_id })?;
            match point.status {
                RollbackStatus::Committed => {
                    return Err(GuidegenError::RollbackPointCommitted { id: point_id });
                }
                RollbackStatus::RolledBack => {
                    return Ok(RollbackReport {
                        point_id,
                        success: true,
                        step_results: Vec::new(),
                    });
                }
                RollbackStatus::Active => point.steps.clone(),
            }
        };

        let mut step_results = Vec::with_capacity(steps.len());
        for step in steps.iter().rev() {
            let outcome = replay_step(step).await;
            let result = match outcome {
                Ok(()) => StepResult {
                    target: step.target.clone(),
                    ok: true,
                    error: None,
                },
                Err(err) => {
                    tracing::warn!(
                        target = %step.target.display(),
                        error = %err,
                        "rollback step failed"
                    );
                    StepResult {
                        target: step.target.clone(),
                        ok: false,
                        error: Some(ErrorRecord::new(
                            ErrorCategory::Rollback,
                            ErrorSeverity::High,
                            format!("{err:#}"),
                            false,
                        )),
                    }
                }
            };
            step_results.push(result);
        }

        let success = step_results.iter().all(|r| r.ok);
        if let Some(point) = self
            .points
            .lock()
            .expect("rollback point map lock poisoned")
            .get_mut(&point_id)
        {
            point.status = RollbackStatus::RolledBack;
        }
        tracing::info!(%point_id, success, steps = step_results.len(), "rollback complete");
        Ok(RollbackReport {
            point_id,
            success,
            step_results,
        })
    }

    /// Seal a point after a successful run. Committing twice is fine;
    /// committing a rolled-back point is an error.
    pub fn commit(&self, point_id: Uuid) -> Result<(), GuidegenError> {
        let mut points = self
            .points
            .lock()
            .expect("rollback point map lock poisoned");
        let point = points
            .get_mut(&point_id)
            .ok_or(GuidegenError::RollbackPointNotFound { id: point_id })?;
        match point.status {
            RollbackStatus::Active | RollbackStatus::Committed => {
                point.status = RollbackStatus::Committed;
                Ok(())
            }
            RollbackStatus::RolledBack => Err(GuidegenError::RollbackPointNotActive {
                id: point_id,
                status: "rolled-back".to_string(),
            }),
        }
    }

    /// Snapshot of a point's current state.
    pub fn point(&self, point_id: Uuid) -> Option<RollbackPoint> {
        self.points
            .lock()
            .expect("rollback point map lock poisoned")
            .get(&point_id)
            .cloned()
    }

    fn ensure_active(&self, point_id: Uuid) -> Result<(), GuidegenError> {
        let points = self
            .points
            .lock()
            .expect("rollback point map lock poisoned");
        let point = points
            .get(&point_id)
            .ok_or(GuidegenError::RollbackPointNotFound { id: point_id })?;
        match point.status {
            RollbackStatus::Active => Ok(()),
            RollbackStatus::Committed => Err(GuidegenError::RollbackPointNotActive {
                id: point_id,
                status: "committed".to_string(),
            }),
            RollbackStatus::RolledBack => Err(GuidegenError::RollbackPointNotActive {
                id: point_id,
                status: "rolled-back".to_string(),
            }),
        }
    }

    fn push_step(&self, point_id: Uuid, step: RollbackStep) -> Result<(), GuidegenError> {
        let mut points = self
            .points
            .lock()
            .expect("rollback point map lock poisoned");
        let point = points
            .get_mut(&point_id)
            .ok_or(GuidegenError::RollbackPointNotFound { id: point_id })?;
        point.steps.push(step);
        Ok(())
    }
}

/// Snapshot path beside the original: `<name>.bak-<short id>`.
fn backup_sibling(target: &Path) -> PathBuf {
    let short = Uuid::new_v4().simple().to_string();
    let name = target
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file");
    target.with_file_name(format!("{name}.bak-{}", &short[..8]))
}

async fn replay_step(step: &RollbackStep) -> Result<()> {
    match &step.op {
        RollbackOp::RestoreFile { backup } => {
            fs::copy_file(&backup.backup_path, &backup.target).await?;
            let restored = fs::calculate_checksum(&backup.target).await?;
            if restored != backup.checksum {
                anyhow::bail!(
                    "restored {} does not match its recorded checksum",
                    backup.target.display()
                );
            }
            Ok(())
        }
        RollbackOp::DeleteCreatedFile => match tokio::fs::remove_file(&step.target).await {
            Ok(()) => Ok(()),
            // Already gone is the desired end state
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err)
                .with_context(|| format!("failed to remove {}", step.target.display())),
        },
        RollbackOp::ReverseMove { from, to } => tokio::fs::rename(to, from)
            .await
            .with_context(|| format!("failed to move {} back to {}", to.display(), from.display())),
    }
}
