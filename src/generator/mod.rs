//! Parallel file generation orchestration.
//!
//! A generation run has three phases. Validation runs first and is the
//! only fatal gate: a template that fails a fatal check produces an error
//! before any filesystem mutation. Planning then resolves every file's
//! destination path and condition sequentially, so path errors surface
//! deterministically. Finally the surviving files render and write
//! concurrently through a bounded worker pool, each task isolated,
//! locked per destination, and bounded by a timeout.
//!
//! Every mutation records its undo step against one rollback point for
//! the run. The point commits only when every file succeeded; otherwise
//! it stays active so the caller can decide whether to roll back.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::conflict::{ConflictDecision, ConflictLedger, ConflictPolicy, ConflictStrategy};
use crate::constants::{default_parallelism, file_task_timeout};
use crate::core::GuidegenError;
use crate::format::format_output;
use crate::models::{GeneratedFile, Template, TemplateFile};
use crate::recovery::ErrorHandler;
use crate::rollback::RollbackManager;
use crate::template::expr;
use crate::template::value::{Value, VariableContext};
use crate::template::{TemplateEngine, render_template};
use crate::utils::{fs, paths};
use crate::validator;

/// Knobs for one generator instance.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Worker pool width for the concurrent write phase
    pub max_parallel: usize,
    /// Per-file task timeout
    pub task_timeout: Duration,
    /// Conflict policy applied when a destination is occupied
    pub policy: ConflictPolicy,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_parallelism(),
            task_timeout: file_task_timeout(),
            policy: ConflictPolicy::default(),
        }
    }
}

/// Result of one generation run.
#[derive(Debug, Serialize)]
pub struct GenerationOutcome {
    /// Per-file results in template declaration order
    pub files: Vec<GeneratedFile>,
    /// The run's rollback point; committed when `success` is true,
    /// still active (rollback-able) otherwise
    pub rollback_point: Uuid,
    /// Conflict decisions taken during the run
    pub conflicts: Vec<ConflictDecision>,
    /// True when every file succeeded (skips count as success)
    pub success: bool,
}

/// Template-driven file generator.
pub struct Generator {
    config: GeneratorConfig,
    engine: Arc<TemplateEngine>,
    rollback: Arc<RollbackManager>,
    errors: Arc<ErrorHandler>,
}

impl Generator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self {
            config,
            engine: Arc::new(TemplateEngine::new()),
            rollback: Arc::new(RollbackManager::new()),
            errors: Arc::new(ErrorHandler::new()),
        }
    }

    /// The run's rollback manager, for caller-driven rollback after a
    /// partial failure.
    pub fn rollback_manager(&self) -> &Arc<RollbackManager> {
        &self.rollback
    }

    /// The run's error handler, for reports and health checks.
    pub fn error_handler(&self) -> &Arc<ErrorHandler> {
        &self.errors
    }

    /// The shared template engine, for cache statistics.
    pub fn engine(&self) -> &Arc<TemplateEngine> {
        &self.engine
    }

    /// Generate all of a template's files under `output_root`.
    ///
    /// # Errors
    ///
    /// [`GuidegenError::TemplateInvalid`] when static validation fails in
    /// a fatal category or a required variable is unbound; nothing is
    /// written in that case. Per-file failures after validation do not
    /// error; they appear as unsuccessful entries in the outcome.
    pub async fn process_file_generation(
        &self,
        template: &Template,
        variables: &VariableContext,
        output_root: &Path,
    ) -> Result<GenerationOutcome, GuidegenError> {
        let report = validator::validate_template(template, &template.name);
        if !report.is_valid {
            return Err(GuidegenError::TemplateInvalid {
                name: template.name.clone(),
                summary: report.summary(),
            });
        }
        let missing = validator::check_required_variables(template, variables);
        if !missing.is_empty() {
            return Err(GuidegenError::TemplateInvalid {
                name: template.name.clone(),
                summary: missing
                    .iter()
                    .map(|i| i.message.clone())
                    .collect::<Vec<_>>()
                    .join("; "),
            });
        }

        let context = apply_defaults(template, variables);
        let point = self
            .rollback
            .create_rollback_point(&format!("generate '{}'", template.name));
        let ledger = ConflictLedger::new();
        // Like the ledger, destination locks are scoped to one run
        let path_locks: DashMap<PathBuf, Arc<Mutex<()>>> = DashMap::new();

        tracing::info!(
            template = %template.name,
            files = template.files.len(),
            root = %output_root.display(),
            "generation run started"
        );

        // Plan phase: resolve destinations and conditions sequentially
        let mut slots: Vec<Option<GeneratedFile>> = Vec::new();
        slots.resize_with(template.files.len(), || None);
        let mut tasks: Vec<(usize, &TemplateFile, PathBuf)> = Vec::new();

        for (index, file) in template.files.iter().enumerate() {
            match self.plan_file(file, &context, output_root).await {
                Ok(Some(dest)) => tasks.push((index, file, dest)),
                Ok(None) => {
                    let dest = paths::resolve_within_root(
                        output_root,
                        &render_template(&file.path, &context)
                            .map(|r| r.content)
                            .unwrap_or_default(),
                    )
                    .unwrap_or_else(|_| output_root.join(&file.path));
                    slots[index] =
                        Some(GeneratedFile::skipped(dest.clone(), String::new(), dest.exists()));
                }
                Err(err) => {
                    let (record, _) = self.errors.handle_error(&err);
                    slots[index] =
                        Some(GeneratedFile::failed(output_root.join(&file.path), record));
                }
            }
        }

        // Write phase: bounded concurrency, per-task timeout
        let results: Vec<(usize, GeneratedFile)> = stream::iter(tasks)
            .map(|(index, file, dest)| {
                let ledger = &ledger;
                let context = &context;
                let path_locks = &path_locks;
                async move {
                    let outcome = tokio::time::timeout(
                        self.config.task_timeout,
                        self.run_task(template, file, dest.clone(), point, ledger, context, path_locks),
                    )
                    .await;
                    let generated = match outcome {
                        Ok(Ok(generated)) => generated,
                        Ok(Err(err)) => {
                            let (record, _) = self.errors.handle_error(&err);
                            GeneratedFile::failed(dest, record)
                        }
                        Err(_elapsed) => {
                            let err = anyhow::Error::from(GuidegenError::TaskTimeout {
                                path: dest.display().to_string(),
                                seconds: self.config.task_timeout.as_secs(),
                            });
                            let (record, _) = self.errors.handle_error(&err);
                            GeneratedFile::failed(dest, record)
                        }
                    };
                    (index, generated)
                }
            })
            .buffer_unordered(self.config.max_parallel.max(1))
            .collect()
            .await;

        for (index, generated) in results {
            slots[index] = Some(generated);
        }
        let files: Vec<GeneratedFile> = slots.into_iter().flatten().collect();

        let success = files.iter().all(|f| f.success);
        if success {
            self.rollback.commit(point)?;
        }
        tracing::info!(
            template = %template.name,
            success,
            written = files.iter().filter(|f| f.success && !f.skipped).count(),
            skipped = files.iter().filter(|f| f.skipped).count(),
            failed = files.iter().filter(|f| !f.success).count(),
            "generation run finished"
        );

        Ok(GenerationOutcome {
            files,
            rollback_point: point,
            conflicts: ledger.decisions(),
            success,
        })
    }

    /// Resolve one file's destination and condition.
    ///
    /// `Ok(None)` means the condition gated the file off; `Ok(Some)` is
    /// the contained destination path with parent directories created.
    async fn plan_file(
        &self,
        file: &TemplateFile,
        context: &VariableContext,
        output_root: &Path,
    ) -> Result<Option<PathBuf>> {
        let rendered_path = render_template(&file.path, context)
            .with_context(|| format!("failed to render path template '{}'", file.path))?;
        // An unresolved variable in a path is never acceptable; the
        // result would silently land at the wrong location
        if let Some(warning) = rendered_path.warnings.first() {
            return Err(GuidegenError::InvalidOutputPath {
                template: file.path.clone(),
                reason: warning.message.clone(),
            }
            .into());
        }
        let dest = paths::resolve_within_root(output_root, &rendered_path.content)?;

        if let Some(condition) = &file.condition {
            let parsed = expr::parse_expression(condition)?;
            let mut warnings = Vec::new();
            let truthy = expr::evaluate(&parsed, context, &mut warnings).is_truthy();
            for warning in &warnings {
                tracing::warn!(
                    path = %dest.display(),
                    condition,
                    category = %warning.category,
                    "condition warning: {}",
                    warning.message
                );
            }
            if !truthy {
                tracing::debug!(path = %dest.display(), condition, "condition gated file off");
                return Ok(None);
            }
        }

        if let Some(parent) = dest.parent() {
            fs::ensure_dir(parent).await?;
        }
        Ok(Some(dest))
    }

    /// Render, resolve conflicts, and write one file.
    #[allow(clippy::too_many_arguments)]
    async fn run_task(
        &self,
        template: &Template,
        file: &TemplateFile,
        dest: PathBuf,
        point: Uuid,
        ledger: &ConflictLedger,
        context: &VariableContext,
        path_locks: &DashMap<PathBuf, Arc<Mutex<()>>>,
    ) -> Result<GeneratedFile> {
        let lock = path_locks
            .entry(dest.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let cache_id = format!("{}:{}", template.name, file.path);
        let rendered = self.engine.render(&cache_id, &file.content, context)?;
        for warning in &rendered.warnings {
            tracing::warn!(
                path = %dest.display(),
                category = %warning.category,
                "render warning: {}",
                warning.message
            );
        }
        let content = format_output(&rendered.content, &dest);

        let exists = dest.exists();
        let forced = file.overwrite.map(|ow| {
            if ow {
                ConflictStrategy::Overwrite
            } else {
                ConflictStrategy::Skip
            }
        });
        let decision = ledger.resolve(&dest, exists, forced, &self.config.policy)?;

        let mut backup_path = None;
        let mut final_dest = dest.clone();
        match decision.strategy {
            ConflictStrategy::Skip if exists => {
                return Ok(GeneratedFile::skipped(dest, content, true));
            }
            ConflictStrategy::Overwrite if exists => {
                // Pre-image snapshot is internal; only Backup reports it
                self.rollback.record_update(point, &dest).await?;
            }
            ConflictStrategy::Backup if exists => {
                let backup = self.rollback.record_update(point, &dest).await?;
                backup_path = Some(backup.backup_path);
            }
            ConflictStrategy::Rename if exists => {
                final_dest = decision
                    .resolved_path
                    .clone()
                    .context("rename decision carried no derived path")?;
                self.rollback.record_create(point, &final_dest)?;
            }
            _ => {
                self.rollback.record_create(point, &dest)?;
            }
        }

        self.errors
            .with_retry("write output file", || {
                let final_dest = final_dest.clone();
                let content = content.clone();
                async move { fs::atomic_write(&final_dest, content.as_bytes()).await }
            })
            .await?;

        #[cfg(unix)]
        if let Some(mode) = file.permissions {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&final_dest, std::fs::Permissions::from_mode(mode))
                .await
                .with_context(|| format!("failed to set permissions on {}", final_dest.display()))?;
        }

        let renamed = final_dest != dest;
        Ok(GeneratedFile {
            path: final_dest,
            content,
            original_path: (exists || renamed).then(|| dest.clone()),
            backup_path,
            overwritten: exists && !renamed,
            skipped: false,
            success: true,
            error: None,
        })
    }
}

/// Overlay schema defaults for unbound variables on top of the caller's
/// bindings. String defaults may themselves be templates and render
/// against the bindings accumulated so far, in declaration order.
fn apply_defaults(template: &Template, variables: &VariableContext) -> VariableContext {
    let Some(specs) = &template.variables else {
        return variables.clone();
    };
    let mut context = variables.clone();
    for spec in specs {
        if context.contains(&spec.name) {
            continue;
        }
        match &spec.default {
            Some(Value::String(text)) => {
                let value = match render_template(text, &context) {
                    Ok(result) => Value::String(result.content),
                    Err(_) => Value::String(text.clone()),
                };
                context.insert(spec.name.clone(), value);
            }
            Some(other) => context.insert(spec.name.clone(), other.clone()),
            None => {}
        }
    }
    context
}
