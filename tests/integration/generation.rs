//! End-to-end generation scenarios: a realistic project scaffold with
//! loops, conditionals, nested paths, formatting, and conflict policies.

use guidegen::conflict::{ConflictPolicy, ConflictStrategy};
use guidegen::generator::{Generator, GeneratorConfig};
use guidegen::template::value::VariableContext;
use tempfile::TempDir;

use crate::common::{file, init_tracing, template};

#[tokio::test]
async fn scaffolds_a_small_project() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let generator = Generator::new(GeneratorConfig::default());

    let mut main_rs = file(
        "src/main.rs",
        "fn main() {\n\tprintln!(\"{{project}}\");\n}\n",
    );
    main_rs.permissions = None;
    let mut ci = file(".github/workflows/ci.yml", "name: {{project}}\njobs: {}\n");
    ci.condition = Some("with_ci".to_string());
    let readme = file(
        "README.md",
        "# {{project}}\n\n{% for feature in features %}- {{feature}}\n{% endfor %}",
    );

    let template = template("starter", vec![main_rs, readme, ci]);
    let ctx = VariableContext::from_json(serde_json::json!({
        "project": "widget",
        "with_ci": true,
        "features": ["fast", "safe"],
    }));

    let outcome = generator
        .process_file_generation(&template, &ctx, dir.path())
        .await
        .unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.files.len(), 3);

    // Tabs expanded for Rust, trailing newline enforced
    assert_eq!(
        std::fs::read_to_string(dir.path().join("src/main.rs")).unwrap(),
        "fn main() {\n    println!(\"widget\");\n}\n"
    );
    assert_eq!(
        std::fs::read_to_string(dir.path().join("README.md")).unwrap(),
        "# widget\n\n- fast\n- safe\n"
    );
    assert!(dir.path().join(".github/workflows/ci.yml").exists());
}

#[tokio::test]
async fn condition_gates_file_without_touching_disk() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let generator = Generator::new(GeneratorConfig::default());

    let mut optional = file("docs/EXTRA.md", "extra");
    optional.condition = Some("with_docs and project != ''".to_string());
    let template = template("conditional", vec![optional]);

    let ctx = VariableContext::from_json(serde_json::json!({
        "with_docs": false,
        "project": "x",
    }));
    let outcome = generator
        .process_file_generation(&template, &ctx, dir.path())
        .await
        .unwrap();
    assert!(outcome.success);
    assert!(outcome.files[0].skipped);
    assert!(!dir.path().join("docs").join("EXTRA.md").exists());
}

#[tokio::test]
async fn condition_evaluation_warnings_are_logged() {
    #[derive(Clone, Default)]
    struct LogSink(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);
    impl std::io::Write for LogSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    let sink = LogSink::default();
    let make_sink = sink.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_ansi(false)
        .with_writer(move || make_sink.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let dir = TempDir::new().unwrap();
    let generator = Generator::new(GeneratorConfig::default());

    // Typo'd variable: the condition is falsy, but the evaluation
    // warning must reach the log rather than vanish with the file
    let mut optional = file("docs/EXTRA.md", "extra");
    optional.condition = Some("with_dcos".to_string());
    let template = template("typo", vec![optional]);

    let ctx = VariableContext::from_json(serde_json::json!({"with_docs": true}));
    let outcome = generator
        .process_file_generation(&template, &ctx, dir.path())
        .await
        .unwrap();
    assert!(outcome.success);
    assert!(outcome.files[0].skipped);
    assert!(!dir.path().join("docs").join("EXTRA.md").exists());

    let logs = String::from_utf8(sink.0.lock().unwrap().clone()).unwrap();
    assert!(logs.contains("condition warning"));
    assert!(logs.contains("with_dcos"));
}

#[tokio::test]
async fn variable_driven_paths_resolve_inside_root() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let generator = Generator::new(GeneratorConfig::default());
    let template = template(
        "pathy",
        vec![file("src/{{module}}/mod.rs", "pub fn {{module}}() {}")],
    );
    let ctx = VariableContext::from_json(serde_json::json!({"module": "parser"}));

    let outcome = generator
        .process_file_generation(&template, &ctx, dir.path())
        .await
        .unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.files[0].path, dir.path().join("src/parser/mod.rs"));
}

#[tokio::test]
async fn skip_policy_records_decision_and_preserves_bytes() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let existing = dir.path().join("config.json");
    std::fs::write(&existing, "{\"user\": true}").unwrap();

    let generator = Generator::new(GeneratorConfig::default());
    let template = template("skipper", vec![file("config.json", "{\"generated\": 1}")]);
    let outcome = generator
        .process_file_generation(&template, &VariableContext::new(), dir.path())
        .await
        .unwrap();

    assert!(outcome.success);
    assert!(outcome.files[0].skipped);
    assert_eq!(outcome.conflicts.len(), 1);
    assert_eq!(outcome.conflicts[0].strategy, ConflictStrategy::Skip);
    assert_eq!(std::fs::read_to_string(&existing).unwrap(), "{\"user\": true}");
}

#[tokio::test]
async fn overwrite_policy_replaces_existing_files() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("gen.txt"), "stale").unwrap();

    let generator = Generator::new(GeneratorConfig {
        policy: ConflictPolicy::Fixed(ConflictStrategy::Overwrite),
        ..GeneratorConfig::default()
    });
    let template = template("fresh", vec![file("gen.txt", "fresh")]);
    let outcome = generator
        .process_file_generation(&template, &VariableContext::new(), dir.path())
        .await
        .unwrap();

    assert!(outcome.success);
    assert!(outcome.files[0].overwritten);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("gen.txt")).unwrap(),
        "fresh\n"
    );
}

#[tokio::test]
async fn rename_policy_leaves_original_and_derives_sibling() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("notes.md"), "mine").unwrap();

    let generator = Generator::new(GeneratorConfig {
        policy: ConflictPolicy::Fixed(ConflictStrategy::Rename),
        ..GeneratorConfig::default()
    });
    let template = template("renamer", vec![file("notes.md", "generated")]);
    let outcome = generator
        .process_file_generation(&template, &VariableContext::new(), dir.path())
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.files[0].path, dir.path().join("notes-1.md"));
    assert_eq!(
        outcome.files[0].original_path.as_deref(),
        Some(dir.path().join("notes.md").as_path())
    );
    assert_eq!(std::fs::read_to_string(dir.path().join("notes.md")).unwrap(), "mine");
}

#[tokio::test]
async fn selector_policy_applies_per_path() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("README.md"), "user readme").unwrap();
    std::fs::write(dir.path().join("gen.rs"), "old code").unwrap();

    let generator = Generator::new(GeneratorConfig {
        policy: ConflictPolicy::Selector(std::sync::Arc::new(|path: &std::path::Path| {
            if path.extension().is_some_and(|e| e == "md") {
                ConflictStrategy::Skip
            } else {
                ConflictStrategy::Overwrite
            }
        })),
        ..GeneratorConfig::default()
    });
    let template = template(
        "selective",
        vec![file("README.md", "generated readme"), file("gen.rs", "new code")],
    );
    let outcome = generator
        .process_file_generation(&template, &VariableContext::new(), dir.path())
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("README.md")).unwrap(),
        "user readme"
    );
    assert_eq!(
        std::fs::read_to_string(dir.path().join("gen.rs")).unwrap(),
        "new code\n"
    );
}

#[tokio::test]
async fn nested_loops_render_objects() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let generator = Generator::new(GeneratorConfig::default());
    let template = template(
        "modules",
        vec![file(
            "SUMMARY.md",
            "{% for m in modules %}## {{m.name}}\n{% for f in m.fns %}- {{f}}\n{% endfor %}{% endfor %}",
        )],
    );
    let ctx = VariableContext::from_json(serde_json::json!({
        "modules": [
            {"name": "lexer", "fns": ["scan", "peek"]},
            {"name": "parser", "fns": ["parse"]},
        ]
    }));

    let outcome = generator
        .process_file_generation(&template, &ctx, dir.path())
        .await
        .unwrap();
    assert!(outcome.success);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("SUMMARY.md")).unwrap(),
        "## lexer\n- scan\n- peek\n## parser\n- parse\n"
    );
}
