//! Core types shared across the crate: the error enum and the
//! category/severity taxonomy every subsystem reports against.

pub mod error;
pub mod report;

pub use error::GuidegenError;
pub use report::{ErrorCategory, ErrorRecord, ErrorSeverity};
