//! Global constants used throughout the guidegen codebase.
//!
//! This module contains depth limits, retry parameters, timeouts, and other
//! numeric constants that are used across multiple modules. Defining them
//! centrally improves maintainability and makes magic numbers more
//! discoverable.

use std::time::Duration;

/// Maximum nesting depth for conditional and loop blocks in a template.
///
/// The renderer is an explicit stack machine, so this bound is enforced
/// structurally rather than by native stack exhaustion. Exceeding it is a
/// fatal syntax error, never a crash.
pub const MAX_BLOCK_DEPTH: usize = 32;

/// Maximum number of attempts for retryable file system operations.
///
/// Transient errors (interrupted syscalls, timed-out I/O) are retried up to
/// this many times before being surfaced.
pub const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between retry attempts (linear backoff).
///
/// Attempt N sleeps `N * RETRY_DELAY_MS` milliseconds, so the total wait
/// stays bounded and predictable.
pub const RETRY_DELAY_MS: u64 = 50;

/// Timeout for a single file generation task.
///
/// A task that renders, formats, and writes one output file must complete
/// within this window; on expiry it is recorded as a critical file system
/// error instead of hanging the run.
pub fn file_task_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Default CPU core count when detection fails.
///
/// Used as a fallback when `std::thread::available_parallelism()` returns
/// an error.
pub const FALLBACK_CORE_COUNT: usize = 4;

/// Default worker pool size for parallel file generation.
///
/// One worker per available core; generation tasks are I/O bound but each
/// holds rendered content in memory, so matching core count keeps memory
/// use proportional.
pub fn default_parallelism() -> usize {
    std::thread::available_parallelism().map_or(FALLBACK_CORE_COUNT, std::num::NonZero::get)
}

/// Width of the sampling window for system health monitoring.
pub const HEALTH_WINDOW_SECS: i64 = 60;

/// Number of recent errors within the health window that downgrades
/// system health from `Good` to `Warning`.
pub const HEALTH_WARNING_THRESHOLD: usize = 5;

/// Upper bound on the suffix counter used to derive non-colliding paths
/// for the `Rename` conflict strategy.
pub const MAX_RENAME_ATTEMPTS: u32 = 1000;
