//! Test: step failures fail the job and skip dependents, nothing more

use crate::helpers::*;
use conveyor::core::{FailureKind, JobStatus, OverallStatus};

/// A failing `test` step fails the build, skips the deploy job, and the
/// run reports Failure.
#[tokio::test]
async fn test_failing_test_step_skips_deploy() {
    let run = run_pipeline(
        r#"
name: "Broken Build"
jobs:
  - name: build
    steps:
      - name: compile
        run: "exit 0"
      - name: test
        run: "exit 1"
  - name: deploy
    needs: [build]
    deploy:
      registry: registry.example.com
"#,
    )
    .await;

    assert_overall(&run, OverallStatus::Failure);
    assert_job(&run, "build", JobStatus::Failed);
    assert_job(&run, "deploy", JobStatus::Skipped);

    let build = run
        .report
        .results
        .iter()
        .find(|r| r.job == "build")
        .unwrap();
    assert_eq!(
        build.failure,
        Some(FailureKind::Step {
            step: "test".to_string(),
            exit_code: 1
        })
    );

    // The skipped deploy job produced no result: it never executed
    assert!(run.report.results.iter().all(|r| r.job != "deploy"));
}

/// Failure propagates through the whole dependent chain.
#[tokio::test]
async fn test_transitive_dependents_skipped() {
    let run = run_pipeline(
        r#"
name: "Chain"
jobs:
  - name: build
    steps:
      - name: breaks
        run: "exit 1"
  - name: package
    needs: [build]
    steps:
      - name: run
        run: echo never
  - name: publish
    needs: [package]
    steps:
      - name: run
        run: echo never
"#,
    )
    .await;

    assert_job(&run, "build", JobStatus::Failed);
    assert_job(&run, "package", JobStatus::Skipped);
    assert_job(&run, "publish", JobStatus::Skipped);
}

/// A sibling with no dependency on the failure still runs.
#[tokio::test]
async fn test_independent_sibling_unaffected() {
    let run = run_pipeline(
        r#"
name: "Siblings"
jobs:
  - name: flaky
    steps:
      - name: breaks
        run: "exit 1"
  - name: lint
    steps:
      - name: run
        run: echo lint-ok
"#,
    )
    .await;

    assert_overall(&run, OverallStatus::Failure);
    assert_job(&run, "flaky", JobStatus::Failed);
    assert_job(&run, "lint", JobStatus::Succeeded);
    assert!(run.job_log("lint").contains("lint-ok"));
}

/// Remaining steps of a failed job never execute.
#[tokio::test]
async fn test_fail_fast_within_job() {
    let run = run_pipeline(
        r#"
name: "FailFast"
jobs:
  - name: build
    steps:
      - name: breaks
        run: "exit 5"
      - name: after
        run: echo unreachable
"#,
    )
    .await;

    assert!(!run.job_log("build").contains("unreachable"));
    let build = run
        .report
        .results
        .iter()
        .find(|r| r.job == "build")
        .unwrap();
    assert_eq!(
        build.failure,
        Some(FailureKind::Step {
            step: "breaks".to_string(),
            exit_code: 5
        })
    );
}
