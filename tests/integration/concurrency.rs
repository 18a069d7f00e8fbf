//! Parallel generation: the worker pool must produce the same result set
//! as a sequential run, and shared caches must hold up under concurrency.

use guidegen::generator::{Generator, GeneratorConfig};
use guidegen::models::TemplateFile;
use guidegen::template::value::VariableContext;
use tempfile::TempDir;

use crate::common::{file, init_tracing, template};

fn many_files(count: usize) -> Vec<TemplateFile> {
    (0..count)
        .map(|n| {
            file(
                &format!("out/file-{n:03}.txt"),
                &format!("file {n} for {{{{project}}}}"),
            )
        })
        .collect()
}

#[tokio::test]
async fn parallel_run_matches_sequential_run() {
    init_tracing();
    let ctx = VariableContext::from_json(serde_json::json!({"project": "bench"}));

    let seq_dir = TempDir::new().unwrap();
    let sequential = Generator::new(GeneratorConfig {
        max_parallel: 1,
        ..GeneratorConfig::default()
    });
    let seq_outcome = sequential
        .process_file_generation(&template("many", many_files(40)), &ctx, seq_dir.path())
        .await
        .unwrap();

    let par_dir = TempDir::new().unwrap();
    let parallel = Generator::new(GeneratorConfig {
        max_parallel: 8,
        ..GeneratorConfig::default()
    });
    let par_outcome = parallel
        .process_file_generation(&template("many", many_files(40)), &ctx, par_dir.path())
        .await
        .unwrap();

    assert!(seq_outcome.success);
    assert!(par_outcome.success);
    assert_eq!(seq_outcome.files.len(), par_outcome.files.len());

    // Results come back in declaration order regardless of pool width
    for (seq, par) in seq_outcome.files.iter().zip(par_outcome.files.iter()) {
        assert_eq!(
            seq.path.strip_prefix(seq_dir.path()).unwrap(),
            par.path.strip_prefix(par_dir.path()).unwrap()
        );
        assert_eq!(seq.content, par.content);
    }

    for n in 0..40 {
        let name = format!("out/file-{n:03}.txt");
        assert_eq!(
            std::fs::read_to_string(seq_dir.path().join(&name)).unwrap(),
            std::fs::read_to_string(par_dir.path().join(&name)).unwrap()
        );
    }
}

#[tokio::test]
async fn identical_content_is_rendered_once_per_context() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let generator = Generator::new(GeneratorConfig::default());
    let ctx = VariableContext::from_json(serde_json::json!({"v": 1}));

    let template_a = template("cached", vec![file("a.txt", "value {{v}}")]);
    generator
        .process_file_generation(&template_a, &ctx, dir.path())
        .await
        .unwrap();

    let dir_b = TempDir::new().unwrap();
    let template_b = template("cached", vec![file("a.txt", "value {{v}}")]);
    generator
        .process_file_generation(&template_b, &ctx, dir_b.path())
        .await
        .unwrap();

    let stats = generator.engine().cache().stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
}

#[tokio::test]
async fn per_file_failures_do_not_poison_the_pool() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let generator = Generator::new(GeneratorConfig {
        max_parallel: 4,
        ..GeneratorConfig::default()
    });

    let mut files = many_files(10);
    files.insert(5, file("../escape.txt", "bad"));
    let outcome = generator
        .process_file_generation(
            &template("mixed", files),
            &VariableContext::from_json(serde_json::json!({"project": "x"})),
            dir.path(),
        )
        .await
        .unwrap();

    assert!(!outcome.success);
    let failed: Vec<_> = outcome.files.iter().filter(|f| !f.success).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(outcome.files.iter().filter(|f| f.success).count(), 10);
    for n in 0..10 {
        assert!(dir.path().join(format!("out/file-{n:03}.txt")).exists());
    }
}

#[tokio::test]
async fn duplicate_destinations_serialize_through_path_locks() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let generator = Generator::new(GeneratorConfig {
        max_parallel: 8,
        ..GeneratorConfig::default()
    });

    // Several declarations collapse onto one destination; the per-path
    // lock and the decision ledger keep the writes coherent
    let files = vec![
        file("shared/{{name}}.txt", "from first"),
        file("shared/{{name}}.txt", "from second"),
        file("shared/{{name}}.txt", "from third"),
    ];
    let ctx = VariableContext::from_json(serde_json::json!({"name": "dup"}));
    let outcome = generator
        .process_file_generation(&template("dups", files), &ctx, dir.path())
        .await
        .unwrap();

    assert!(outcome.success);
    let written = std::fs::read_to_string(dir.path().join("shared/dup.txt")).unwrap();
    assert!(written.starts_with("from "));
    // Exactly one declaration created the file; the rest resolved
    // through the conflict policy (default Skip)
    let creators = outcome
        .files
        .iter()
        .filter(|f| f.success && !f.skipped)
        .count();
    assert_eq!(creators, 1);
}

// Paused time makes the zero deadline elapse on the task's first
// pending poll instead of racing the filesystem write.
#[tokio::test(start_paused = true)]
async fn task_timeout_is_reported_not_hung() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let generator = Generator::new(GeneratorConfig {
        task_timeout: std::time::Duration::ZERO,
        ..GeneratorConfig::default()
    });
    let outcome = generator
        .process_file_generation(
            &template("timed", vec![file("slow.txt", "content")]),
            &VariableContext::new(),
            dir.path(),
        )
        .await
        .unwrap();

    assert!(!outcome.success);
    let error = outcome.files[0].error.as_ref().unwrap();
    assert!(error.message.contains("timed out"));
}
