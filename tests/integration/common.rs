//! Shared helpers for the integration suite.

use std::sync::Once;

use guidegen::models::{Template, TemplateFile};

static INIT: Once = Once::new();

/// Install a test subscriber once; `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn file(path: &str, content: &str) -> TemplateFile {
    TemplateFile {
        path: path.to_string(),
        content: content.to_string(),
        condition: None,
        permissions: None,
        overwrite: None,
    }
}

pub fn template(name: &str, files: Vec<TemplateFile>) -> Template {
    Template {
        name: name.to_string(),
        description: String::new(),
        version: "1.0.0".to_string(),
        variables: None,
        files,
    }
}
