//! Template engine: tokenizer, expression evaluator, renderer, and cache.
//!
//! The pipeline is `source -> tokenize -> render`, with the tokenizer
//! producing a flat token stream and the renderer walking it as an
//! explicit stack machine. [`TemplateEngine`] wraps the pipeline with a
//! content-addressed cache so repeated renders of identical
//! `(id, content, variables)` are served without re-parsing.
//!
//! For one-shot rendering without cache bookkeeping, use
//! [`render_template`].

pub mod cache;
pub mod expr;
pub mod renderer;
pub mod token;
pub mod value;

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;

use crate::core::GuidegenError;
use cache::{CachedRender, TemplateCache, content_hash};
use renderer::RenderResult;
pub use expr::RenderWarning;
use value::VariableContext;

/// Render a template string against a variable context, uncached.
///
/// # Errors
///
/// Fails only on structural problems: tokenization errors, unbalanced
/// blocks, malformed expressions, or depth overflow. Missing variables
/// degrade to warnings in the returned [`RenderResult`].
pub fn render_template(
    content: &str,
    variables: &VariableContext,
) -> Result<RenderResult, GuidegenError> {
    let tokens = token::tokenize(content)?;
    renderer::render(&tokens, variables)
}

/// Caching template engine.
///
/// Holds the token and render caches; cheap to share via `Arc` across the
/// generator's worker pool. There is deliberately no process-wide
/// singleton; callers construct an engine and pass it where needed.
#[derive(Debug, Default)]
pub struct TemplateEngine {
    cache: Arc<TemplateCache>,
}

impl TemplateEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// The engine's cache, for stats inspection.
    pub fn cache(&self) -> &TemplateCache {
        &self.cache
    }

    /// Render `content` under cache key `id`.
    ///
    /// Token streams are cached by `(id, content hash)`; rendered output
    /// additionally keys on the variable context fingerprint. A cached
    /// render returns the memoized content and warnings with a fresh
    /// timing measurement.
    pub fn render(
        &self,
        id: &str,
        content: &str,
        variables: &VariableContext,
    ) -> Result<RenderResult, GuidegenError> {
        let started = Instant::now();
        let hash = content_hash(content);
        let fingerprint = variables.fingerprint();

        if let Some(cached) = self.cache.get_rendered(id, &hash, fingerprint) {
            return Ok(RenderResult {
                content: cached.content.clone(),
                render_time_micros: started.elapsed().as_micros() as u64,
                warnings: cached.warnings.clone(),
            });
        }

        let tokens = match self.cache.get_tokens(id, &hash) {
            Some(tokens) => tokens,
            None => {
                let tokens = Arc::new(token::tokenize(content)?);
                self.cache.insert_tokens(id, &hash, Arc::clone(&tokens));
                tokens
            }
        };

        let result = renderer::render(&tokens, variables)?;
        self.cache.insert_rendered(
            id,
            &hash,
            fingerprint,
            Arc::new(CachedRender {
                content: result.content.clone(),
                warnings: result.warnings.clone(),
            }),
        );
        Ok(result)
    }
}
