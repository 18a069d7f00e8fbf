//! Error categorization, bounded retry, and run-level health reporting.
//!
//! Every failure that crosses a task boundary is turned into an
//! [`ErrorRecord`] with a category, a severity, and a recoverability
//! flag. The handler keeps the run's record log and answers three
//! questions: what to do next for a given failure, what went wrong over
//! the whole run, and whether the run is still healthy.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;

use crate::constants::{HEALTH_WARNING_THRESHOLD, HEALTH_WINDOW_SECS, MAX_RETRY_ATTEMPTS, RETRY_DELAY_MS};
use crate::core::{ErrorCategory, ErrorRecord, ErrorSeverity, GuidegenError};

/// What the pipeline should do after a categorized failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Transient; retry the operation with backoff
    Retry,
    /// Deterministic; record it and move on without retrying
    ReportOnly,
    /// Leave this file out of the run and continue with the rest
    SkipFile,
}

/// Aggregated view of a run's recorded errors.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub total_errors: usize,
    pub by_category: BTreeMap<String, usize>,
    pub recommendations: Vec<String>,
    pub recovery_strategies: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HealthStatus {
    Good,
    Warning,
    Critical,
}

/// Health over the recent error window.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub health: HealthStatus,
    /// Errors recorded inside the sampling window
    pub recent_errors: usize,
    pub recent_critical: usize,
    pub window_secs: i64,
}

/// Central error handler shared across a run's tasks.
#[derive(Debug, Default)]
pub struct ErrorHandler {
    records: Mutex<Vec<ErrorRecord>>,
}

impl ErrorHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Categorize a failure without recording it.
    pub fn categorize_error(error: &anyhow::Error) -> ErrorRecord {
        if let Some(domain) = error.downcast_ref::<GuidegenError>() {
            return categorize_domain(domain);
        }
        if let Some(io) = error.downcast_ref::<std::io::Error>() {
            return categorize_io(io);
        }
        categorize_message(&format!("{error:#}"))
    }

    /// Categorize, record, and pick the next action for a failure.
    pub fn handle_error(&self, error: &anyhow::Error) -> (ErrorRecord, RecoveryAction) {
        let record = Self::categorize_error(error);
        let action = action_for(&record);
        tracing::warn!(
            category = %record.category,
            severity = ?record.severity,
            recoverable = record.recoverable,
            ?action,
            "error handled: {}",
            record.message
        );
        self.record(record.clone());
        (record, action)
    }

    /// Append a pre-built record to the run log.
    pub fn record(&self, record: ErrorRecord) {
        self.records
            .lock()
            .expect("error record log lock poisoned")
            .push(record);
    }

    /// Run `op`, retrying with linear backoff when the failure is a
    /// recoverable filesystem error. Non-recoverable failures and the
    /// final exhausted attempt return the error as-is.
    pub async fn with_retry<T, F, Fut>(&self, description: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let record = Self::categorize_error(&err);
                    let transient =
                        record.recoverable && record.category == ErrorCategory::FileSystem;
                    // The caller owns recording; exhausted retries surface
                    // the original error unchanged
                    if !transient || attempt >= MAX_RETRY_ATTEMPTS {
                        return Err(err);
                    }
                    let delay = Duration::from_millis(RETRY_DELAY_MS * u64::from(attempt));
                    tracing::debug!(
                        description,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// All records so far, oldest first.
    pub fn records(&self) -> Vec<ErrorRecord> {
        self.records
            .lock()
            .expect("error record log lock poisoned")
            .clone()
    }

    /// Aggregate the run's records into a report with per-category
    /// guidance.
    pub fn generate_error_report(&self) -> ErrorReport {
        let records = self.records();
        let mut by_category: BTreeMap<String, usize> = BTreeMap::new();
        for record in &records {
            *by_category.entry(record.category.to_string()).or_default() += 1;
        }

        let mut recommendations = Vec::new();
        let mut recovery_strategies = BTreeMap::new();
        for category in by_category.keys() {
            let (strategy, recommendation) = guidance(category);
            recovery_strategies.insert(category.clone(), strategy.to_string());
            recommendations.push(recommendation.to_string());
        }

        ErrorReport {
            total_errors: records.len(),
            by_category,
            recommendations,
            recovery_strategies,
        }
    }

    /// Health over the last [`HEALTH_WINDOW_SECS`]: any recent critical
    /// error is `Critical`; a burst of recent errors is `Warning`.
    pub fn monitor_system_health(&self) -> HealthReport {
        let cutoff = Utc::now() - chrono::Duration::seconds(HEALTH_WINDOW_SECS);
        let records = self.records();
        let recent: Vec<_> = records.iter().filter(|r| r.at >= cutoff).collect();
        let recent_critical = recent
            .iter()
            .filter(|r| r.severity == ErrorSeverity::Critical)
            .count();

        let health = if recent_critical > 0 {
            HealthStatus::Critical
        } else if recent.len() >= HEALTH_WARNING_THRESHOLD {
            HealthStatus::Warning
        } else {
            HealthStatus::Good
        };

        HealthReport {
            health,
            recent_errors: recent.len(),
            recent_critical,
            window_secs: HEALTH_WINDOW_SECS,
        }
    }
}

fn categorize_domain(error: &GuidegenError) -> ErrorRecord {
    use GuidegenError::*;
    let (category, severity, recoverable) = match error {
        TemplateSyntax { .. } | ExpressionSyntax { .. } | DepthExceeded { .. } => {
            (ErrorCategory::Syntax, ErrorSeverity::High, false)
        }
        TemplateInvalid { .. } | InvalidOutputPath { .. } => {
            (ErrorCategory::Validation, ErrorSeverity::High, false)
        }
        PathEscapesRoot { .. } => (ErrorCategory::FileSystem, ErrorSeverity::High, false),
        TaskTimeout { .. } => (ErrorCategory::FileSystem, ErrorSeverity::Critical, false),
        RollbackPointNotFound { .. } | RollbackPointNotActive { .. }
        | RollbackPointCommitted { .. } => (ErrorCategory::Rollback, ErrorSeverity::High, false),
        Io(io) => return categorize_io(io),
    };
    ErrorRecord::new(category, severity, error.to_string(), recoverable)
}

fn categorize_io(error: &std::io::Error) -> ErrorRecord {
    let (category, severity, recoverable) = match error.kind() {
        ErrorKind::PermissionDenied => (ErrorCategory::Permission, ErrorSeverity::High, false),
        ErrorKind::NotFound => (ErrorCategory::FileSystem, ErrorSeverity::Medium, true),
        ErrorKind::TimedOut | ErrorKind::Interrupted | ErrorKind::WouldBlock => {
            (ErrorCategory::FileSystem, ErrorSeverity::Medium, true)
        }
        ErrorKind::AlreadyExists => (ErrorCategory::Conflict, ErrorSeverity::Medium, true),
        _ => (ErrorCategory::FileSystem, ErrorSeverity::Medium, false),
    };
    ErrorRecord::new(category, severity, error.to_string(), recoverable)
}

/// Last-resort classification from the message text, for errors that lost
/// their type crossing an `anyhow` boundary.
fn categorize_message(message: &str) -> ErrorRecord {
    let lower = message.to_ascii_lowercase();
    let (category, severity, recoverable) = if lower.contains("permission denied") {
        (ErrorCategory::Permission, ErrorSeverity::High, false)
    } else if lower.contains("no such file") || lower.contains("not found") {
        (ErrorCategory::FileSystem, ErrorSeverity::Medium, true)
    } else if lower.contains("timed out") || lower.contains("timeout") {
        (ErrorCategory::FileSystem, ErrorSeverity::Medium, true)
    } else if lower.contains("syntax") || lower.contains("unexpected token") {
        (ErrorCategory::Syntax, ErrorSeverity::High, false)
    } else if lower.contains("already exists") {
        (ErrorCategory::Conflict, ErrorSeverity::Medium, true)
    } else {
        (ErrorCategory::Unknown, ErrorSeverity::Medium, false)
    };
    ErrorRecord::new(category, severity, message.to_string(), recoverable)
}

fn action_for(record: &ErrorRecord) -> RecoveryAction {
    match record.category {
        ErrorCategory::Syntax | ErrorCategory::Validation => RecoveryAction::ReportOnly,
        ErrorCategory::Conflict => RecoveryAction::SkipFile,
        ErrorCategory::FileSystem if record.recoverable => RecoveryAction::Retry,
        ErrorCategory::Permission => RecoveryAction::SkipFile,
        _ => RecoveryAction::ReportOnly,
    }
}

fn guidance(category: &str) -> (&'static str, &'static str) {
    match category {
        "syntax" => (
            "fix the template source; syntax errors are never retried",
            "fix template syntax errors before re-running",
        ),
        "validation" => (
            "correct the template configuration or variable bindings",
            "resolve validation errors reported against the template",
        ),
        "file-system" => (
            "transient failures are retried with backoff",
            "check disk space and that the output directory is writable",
        ),
        "permission" => (
            "the file is skipped; grant access and re-run",
            "check file and directory permissions in the output root",
        ),
        "conflict" => (
            "choose an explicit conflict strategy for occupied paths",
            "re-run with an overwrite, backup, or rename policy",
        ),
        "rollback" => (
            "inspect snapshot files beside the originals",
            "restore affected files from their .bak-* snapshots manually",
        ),
        _ => (
            "no automatic recovery",
            "inspect the error log for details",
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_not_found_is_recoverable_filesystem() {
        let err = anyhow::Error::from(std::io::Error::new(ErrorKind::NotFound, "gone"));
        let record = ErrorHandler::categorize_error(&err);
        assert_eq!(record.category, ErrorCategory::FileSystem);
        assert!(record.recoverable);
    }

    #[test]
    fn io_permission_denied_is_not_recoverable() {
        let err = anyhow::Error::from(std::io::Error::new(ErrorKind::PermissionDenied, "nope"));
        let record = ErrorHandler::categorize_error(&err);
        assert_eq!(record.category, ErrorCategory::Permission);
        assert!(!record.recoverable);
        assert_eq!(record.severity, ErrorSeverity::High);
    }

    #[test]
    fn syntax_errors_are_report_only() {
        let err = anyhow::Error::from(GuidegenError::TemplateSyntax {
            message: "unterminated tag".to_string(),
            line: 3,
            column: 7,
        });
        let handler = ErrorHandler::new();
        let (record, action) = handler.handle_error(&err);
        assert_eq!(record.category, ErrorCategory::Syntax);
        assert_eq!(action, RecoveryAction::ReportOnly);
    }

    #[test]
    fn timeout_is_critical_filesystem() {
        let err = anyhow::Error::from(GuidegenError::TaskTimeout {
            path: "a.txt".to_string(),
            seconds: 30,
        });
        let record = ErrorHandler::categorize_error(&err);
        assert_eq!(record.category, ErrorCategory::FileSystem);
        assert_eq!(record.severity, ErrorSeverity::Critical);
    }

    #[test]
    fn message_fallback_categorizes_permission() {
        let err = anyhow::anyhow!("open failed: Permission denied (os error 13)");
        let record = ErrorHandler::categorize_error(&err);
        assert_eq!(record.category, ErrorCategory::Permission);
    }

    #[test]
    fn unknown_message_falls_through() {
        let err = anyhow::anyhow!("something inexplicable");
        let record = ErrorHandler::categorize_error(&err);
        assert_eq!(record.category, ErrorCategory::Unknown);
    }

    #[tokio::test]
    async fn with_retry_recovers_from_transient_failures() {
        let handler = ErrorHandler::new();
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result = handler
            .with_retry("flaky op", || {
                let n = attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(anyhow::Error::from(std::io::Error::new(
                            ErrorKind::Interrupted,
                            "try again",
                        )))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(result, 42);
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn with_retry_does_not_retry_permanent_failures() {
        let handler = ErrorHandler::new();
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result: Result<()> = handler
            .with_retry("doomed op", || {
                attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async {
                    Err(anyhow::Error::from(std::io::Error::new(
                        ErrorKind::PermissionDenied,
                        "nope",
                    )))
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn with_retry_gives_up_after_max_attempts() {
        let handler = ErrorHandler::new();
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result: Result<()> = handler
            .with_retry("always flaky", || {
                attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async {
                    Err(anyhow::Error::from(std::io::Error::new(
                        ErrorKind::Interrupted,
                        "try again",
                    )))
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(
            attempts.load(std::sync::atomic::Ordering::SeqCst),
            MAX_RETRY_ATTEMPTS
        );
    }

    #[test]
    fn report_aggregates_by_category() {
        let handler = ErrorHandler::new();
        handler.record(ErrorRecord::new(
            ErrorCategory::Syntax,
            ErrorSeverity::High,
            "bad tag",
            false,
        ));
        handler.record(ErrorRecord::new(
            ErrorCategory::Syntax,
            ErrorSeverity::High,
            "another bad tag",
            false,
        ));
        handler.record(ErrorRecord::new(
            ErrorCategory::Permission,
            ErrorSeverity::High,
            "denied",
            false,
        ));

        let report = handler.generate_error_report();
        assert_eq!(report.total_errors, 3);
        assert_eq!(report.by_category.get("syntax"), Some(&2));
        assert_eq!(report.by_category.get("permission"), Some(&1));
        assert!(report.recovery_strategies.contains_key("syntax"));
        assert_eq!(report.recommendations.len(), 2);
    }

    #[test]
    fn health_is_good_when_quiet() {
        let handler = ErrorHandler::new();
        let report = handler.monitor_system_health();
        assert_eq!(report.health, HealthStatus::Good);
        assert_eq!(report.recent_errors, 0);
    }

    #[test]
    fn health_goes_critical_on_recent_critical_error() {
        let handler = ErrorHandler::new();
        handler.record(ErrorRecord::new(
            ErrorCategory::FileSystem,
            ErrorSeverity::Critical,
            "task timed out",
            false,
        ));
        assert_eq!(handler.monitor_system_health().health, HealthStatus::Critical);
    }

    #[test]
    fn health_warns_on_error_burst() {
        let handler = ErrorHandler::new();
        for _ in 0..HEALTH_WARNING_THRESHOLD {
            handler.record(ErrorRecord::new(
                ErrorCategory::FileSystem,
                ErrorSeverity::Medium,
                "flaky write",
                true,
            ));
        }
        assert_eq!(handler.monitor_system_health().health, HealthStatus::Warning);
    }
}
