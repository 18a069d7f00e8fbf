//! Error reporting and health monitoring over real failed runs.

use guidegen::generator::{Generator, GeneratorConfig};
use guidegen::recovery::{ErrorHandler, HealthStatus, RecoveryAction};
use guidegen::template::value::VariableContext;
use serial_test::serial;
use tempfile::TempDir;

use crate::common::{file, init_tracing, template};

#[tokio::test]
async fn failed_run_produces_a_categorized_report() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let generator = Generator::new(GeneratorConfig::default());
    let t = template(
        "broken",
        vec![
            file("ok.txt", "fine"),
            file("../one.txt", "escape"),
            file("../two.txt", "escape"),
        ],
    );
    let outcome = generator
        .process_file_generation(&t, &VariableContext::new(), dir.path())
        .await
        .unwrap();
    assert!(!outcome.success);

    let report = generator.error_handler().generate_error_report();
    assert_eq!(report.total_errors, 2);
    assert_eq!(report.by_category.get("file-system"), Some(&2));
    assert!(report.recovery_strategies.contains_key("file-system"));
    assert!(!report.recommendations.is_empty());
}

#[tokio::test]
async fn validation_failure_leaves_no_error_records() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let generator = Generator::new(GeneratorConfig::default());
    let t = template("syntactically-broken", vec![file("a.txt", "{{ unclosed")]);

    // Rejected at the validation gate, before per-file error handling
    assert!(generator
        .process_file_generation(&t, &VariableContext::new(), dir.path())
        .await
        .is_err());
    assert_eq!(generator.error_handler().generate_error_report().total_errors, 0);
}

#[tokio::test]
#[serial]
async fn health_degrades_with_failure_volume() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let generator = Generator::new(GeneratorConfig::default());

    assert_eq!(
        generator.error_handler().monitor_system_health().health,
        HealthStatus::Good
    );

    // Six escaping paths: enough recent errors to cross the warning bar
    let files = (0..6).map(|n| file(&format!("../f{n}.txt"), "x")).collect();
    let outcome = generator
        .process_file_generation(&template("noisy", files), &VariableContext::new(), dir.path())
        .await
        .unwrap();
    assert!(!outcome.success);

    let health = generator.error_handler().monitor_system_health();
    assert_eq!(health.health, HealthStatus::Warning);
    assert_eq!(health.recent_errors, 6);
    assert_eq!(health.recent_critical, 0);
}

// Paused time lets the zero deadline fire deterministically before the
// write can complete.
#[tokio::test(start_paused = true)]
#[serial]
async fn timeout_drives_health_critical() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let generator = Generator::new(GeneratorConfig {
        task_timeout: std::time::Duration::ZERO,
        ..GeneratorConfig::default()
    });
    let outcome = generator
        .process_file_generation(
            &template("stuck", vec![file("a.txt", "x")]),
            &VariableContext::new(),
            dir.path(),
        )
        .await
        .unwrap();
    assert!(!outcome.success);
    assert_eq!(
        generator.error_handler().monitor_system_health().health,
        HealthStatus::Critical
    );
}

#[test]
fn handler_actions_match_category_semantics() {
    let handler = ErrorHandler::new();

    let transient = anyhow::Error::from(std::io::Error::new(
        std::io::ErrorKind::Interrupted,
        "flaky disk",
    ));
    assert_eq!(handler.handle_error(&transient).1, RecoveryAction::Retry);

    let denied = anyhow::Error::from(std::io::Error::new(
        std::io::ErrorKind::PermissionDenied,
        "read-only mount",
    ));
    assert_eq!(handler.handle_error(&denied).1, RecoveryAction::SkipFile);

    let syntax = anyhow::Error::from(guidegen::GuidegenError::ExpressionSyntax {
        expression: "a ==".to_string(),
        message: "missing right operand".to_string(),
    });
    assert_eq!(handler.handle_error(&syntax).1, RecoveryAction::ReportOnly);
}
