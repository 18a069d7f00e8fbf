//! Transactional guarantees: a rolled-back run leaves the output root
//! byte-identical to its pre-run state.

use guidegen::conflict::{ConflictPolicy, ConflictStrategy};
use guidegen::generator::{Generator, GeneratorConfig};
use guidegen::template::value::VariableContext;
use sha2::{Digest, Sha256};
use tempfile::TempDir;

use crate::common::{file, init_tracing, template};

fn checksum(path: &std::path::Path) -> String {
    let bytes = std::fs::read(path).unwrap();
    hex::encode(Sha256::digest(&bytes))
}

#[tokio::test]
async fn rollback_restores_overwritten_files_exactly() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("app.toml");
    std::fs::write(&target, "[app]\nname = \"user-config\"\n").unwrap();
    let before = checksum(&target);

    let generator = Generator::new(GeneratorConfig {
        policy: ConflictPolicy::Fixed(ConflictStrategy::Overwrite),
        ..GeneratorConfig::default()
    });
    let template = template("config", vec![file("app.toml", "[app]\nname = \"generated\"\n")]);
    let outcome = generator
        .process_file_generation(&template, &VariableContext::new(), dir.path())
        .await
        .unwrap();
    assert!(outcome.success);
    assert_ne!(checksum(&target), before);

    // A committed point refuses rollback; undo requires an active one
    let err = generator
        .rollback_manager()
        .rollback_to_point(outcome.rollback_point)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("committed"));
}

#[tokio::test]
async fn partial_failure_rolls_back_to_pre_run_state() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let existing = dir.path().join("kept.txt");
    std::fs::write(&existing, "original bytes").unwrap();
    let before = checksum(&existing);

    let generator = Generator::new(GeneratorConfig {
        policy: ConflictPolicy::Fixed(ConflictStrategy::Overwrite),
        ..GeneratorConfig::default()
    });
    let template = template(
        "partial",
        vec![
            file("kept.txt", "generated replacement"),
            file("created.txt", "brand new"),
            // Fails containment; forces a partial outcome
            file("../outside.txt", "escape"),
        ],
    );
    let outcome = generator
        .process_file_generation(&template, &VariableContext::new(), dir.path())
        .await
        .unwrap();
    assert!(!outcome.success);
    assert!(dir.path().join("created.txt").exists());

    let report = generator
        .rollback_manager()
        .rollback_to_point(outcome.rollback_point)
        .await
        .unwrap();
    assert!(report.success);

    assert_eq!(checksum(&existing), before);
    assert!(!dir.path().join("created.txt").exists());
}

#[tokio::test]
async fn rollback_is_idempotent() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let generator = Generator::new(GeneratorConfig::default());
    let template = template(
        "twice",
        vec![file("a.txt", "x"), file("../bad.txt", "y")],
    );
    let outcome = generator
        .process_file_generation(&template, &VariableContext::new(), dir.path())
        .await
        .unwrap();
    assert!(!outcome.success);

    let first = generator
        .rollback_manager()
        .rollback_to_point(outcome.rollback_point)
        .await
        .unwrap();
    assert!(first.success);

    let second = generator
        .rollback_manager()
        .rollback_to_point(outcome.rollback_point)
        .await
        .unwrap();
    assert!(second.success);
    assert!(second.step_results.is_empty());
    assert!(!dir.path().join("a.txt").exists());
}

#[tokio::test]
async fn backup_files_survive_a_committed_run() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("data.json");
    std::fs::write(&target, "{\"old\": true}").unwrap();

    let generator = Generator::new(GeneratorConfig {
        policy: ConflictPolicy::Fixed(ConflictStrategy::Backup),
        ..GeneratorConfig::default()
    });
    let template = template("backed", vec![file("data.json", "{\"new\": true}")]);
    let outcome = generator
        .process_file_generation(&template, &VariableContext::new(), dir.path())
        .await
        .unwrap();
    assert!(outcome.success);

    // The snapshot remains on disk for manual recovery after commit
    let backup = outcome.files[0].backup_path.as_ref().unwrap();
    assert_eq!(std::fs::read_to_string(backup).unwrap(), "{\"old\": true}");
    assert_eq!(
        std::fs::read_to_string(&target).unwrap(),
        "{\"new\": true}\n"
    );
}
