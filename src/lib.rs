//! # guidegen
//!
//! A templating and scaffolding engine that renders file templates with
//! variable substitution and control flow, then materializes them on disk
//! with conflict resolution, transactional rollback, and bounded
//! parallelism.
//!
//! ## Architecture
//!
//! The crate is organized in layers:
//!
//! - **Template engine** ([`template`]): hand-written tokenizer for
//!   `{{ }}` / `{% %}` / `{# #}` syntax, an expression evaluator with
//!   boolean and comparison operators, and an explicit stack-machine
//!   renderer with a hard nesting-depth bound. A content-addressed cache
//!   keyed on `(id, content hash, context fingerprint)` memoizes both
//!   parsed token streams and rendered output.
//! - **Validation** ([`validator`]): static checks over a template's
//!   syntax, configuration, and file definitions before anything runs.
//! - **Generation** ([`generator`]): validates first, plans destinations
//!   sequentially, then renders and writes files through a bounded
//!   concurrent worker pool with per-destination locks and per-task
//!   timeouts.
//! - **Safety** ([`conflict`], [`rollback`], [`recovery`]): occupied
//!   destinations resolve through a per-run policy ledger, every mutation
//!   records an undo step against a rollback point, and failures are
//!   categorized with bounded retry for transient ones.
//!
//! ## Example
//!
//! ```no_run
//! use guidegen::generator::{Generator, GeneratorConfig};
//! use guidegen::models::Template;
//! use guidegen::template::value::VariableContext;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let template: Template = serde_json::from_str(r#"{
//!     "name": "readme",
//!     "version": "1.0.0",
//!     "files": [{"path": "README.md", "content": "# {{project}}"}]
//! }"#)?;
//! let variables = VariableContext::from_json(serde_json::json!({"project": "demo"}));
//!
//! let generator = Generator::new(GeneratorConfig::default());
//! let outcome = generator
//!     .process_file_generation(&template, &variables, "out".as_ref())
//!     .await?;
//! assert!(outcome.success);
//! # Ok(())
//! # }
//! ```

pub mod conflict;
pub mod constants;
pub mod core;
pub mod format;
pub mod generator;
pub mod models;
pub mod recovery;
pub mod rollback;
pub mod template;
pub mod utils;
pub mod validator;

pub use crate::core::GuidegenError;
