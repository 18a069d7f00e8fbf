//! Filesystem-backed integration tests.
//!
//! Every test works inside its own temp directory; nothing touches the
//! real filesystem outside of it.

mod common;

mod concurrency;
mod generation;
mod recovery;
mod rollback;
