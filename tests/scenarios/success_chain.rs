//! Test: full build-then-deploy pipelines that succeed end to end

use crate::helpers::*;
use conveyor::core::{JobStatus, OverallStatus};
use conveyor::execution::ExecutionEvent;

/// Build job (checkout, cache-restore, compile, test) feeding a gated
/// deploy job (image build, push, remote deploy): both succeed.
#[tokio::test]
async fn test_build_and_deploy_succeed() {
    let harness = Harness::new();
    let run = harness
        .run(
            r#"
name: "Build and Deploy"
jobs:
  - name: build
    steps:
      - name: checkout
        uses: checkout
      - name: restore deps
        uses: cache-restore
        cache:
          key: "deps-{{ hashFiles('Cargo.lock') }}"
          restore_keys: ["deps-"]
          path: target
      - name: compile
        run: "exit 0"
      - name: test
        run: "exit 0"

  - name: deploy
    needs: [build]
    deploy:
      registry: registry.example.com
      image:
        context: .
        tag: app:latest
      remote:
        host: deploy@prod.example.com
        command: docker compose up -d
"#,
        )
        .await;

    assert_overall(&run, OverallStatus::Success);
    assert_job(&run, "build", JobStatus::Succeeded);
    assert_job(&run, "deploy", JobStatus::Succeeded);

    // The image was built before it was pushed
    let operations = harness.container.operations.lock().unwrap().clone();
    assert_eq!(
        operations,
        vec![
            "build app:latest".to_string(),
            "push app:latest -> registry.example.com".to_string()
        ]
    );

    // The remote command ran through the gate
    let remote_calls = harness.gate.remote_calls.lock().unwrap().clone();
    assert_eq!(
        remote_calls,
        vec![(
            "deploy@prod.example.com".to_string(),
            "docker compose up -d".to_string()
        )]
    );
}

/// The deploy job's collaborators only fire after build is Succeeded.
#[tokio::test]
async fn test_deploy_starts_after_build_succeeds() {
    let run = run_pipeline(
        r#"
name: "Ordering"
jobs:
  - name: build
    steps:
      - name: compile
        run: echo built
  - name: deploy
    needs: [build]
    deploy:
      registry: registry.example.com
"#,
    )
    .await;

    let build_done = run
        .event_index(|e| matches!(e, ExecutionEvent::JobSucceeded { job, .. } if job == "build"))
        .expect("build should succeed");
    let deploy_started = run
        .event_index(|e| matches!(e, ExecutionEvent::JobStarted { job } if job == "deploy"))
        .expect("deploy should start");

    assert!(
        build_done < deploy_started,
        "deploy started (event {}) before build succeeded (event {})",
        deploy_started,
        build_done
    );
}

/// A linear chain completes in declaration order.
#[tokio::test]
async fn test_linear_chain_runs_in_order() {
    let run = run_pipeline(
        r#"
name: "Chain"
jobs:
  - name: first
    steps:
      - name: run
        run: echo one
  - name: second
    needs: [first]
    steps:
      - name: run
        run: echo two
  - name: third
    needs: [second]
    steps:
      - name: run
        run: echo three
"#,
    )
    .await;

    assert_overall(&run, OverallStatus::Success);

    let order: Vec<&str> = run.report.results.iter().map(|r| r.job.as_str()).collect();
    assert_eq!(order, vec!["first", "second", "third"]);
}

/// Step output is concatenated into the job log in step order.
#[tokio::test]
async fn test_job_log_concatenates_steps() {
    let run = run_pipeline(
        r#"
name: "Log"
jobs:
  - name: build
    steps:
      - name: alpha
        run: echo from-alpha
      - name: beta
        run: echo from-beta
"#,
    )
    .await;

    let log = run.job_log("build");
    let alpha = log.find("from-alpha").expect("alpha output captured");
    let beta = log.find("from-beta").expect("beta output captured");
    assert!(alpha < beta);
}
