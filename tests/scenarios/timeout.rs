//! Test: timeouts kill the process and fail with a distinct kind

use crate::helpers::*;
use conveyor::core::{FailureKind, JobStatus, OverallStatus};
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_step_timeout_fails_job() {
    let start = Instant::now();
    let run = run_pipeline(
        r#"
name: "Hang"
jobs:
  - name: build
    steps:
      - name: hangs
        run: sleep 60
        timeout_secs: 1
"#,
    )
    .await;

    assert!(
        start.elapsed() < Duration::from_secs(10),
        "the hanging process must be killed promptly"
    );
    assert_overall(&run, OverallStatus::Failure);
    assert_job(&run, "build", JobStatus::Failed);

    let build = run
        .report
        .results
        .iter()
        .find(|r| r.job == "build")
        .unwrap();
    assert_eq!(
        build.failure,
        Some(FailureKind::Timeout {
            step: "hangs".to_string()
        })
    );
}

/// A timeout behaves like any step failure for dependents.
#[tokio::test]
async fn test_timeout_skips_dependents() {
    let run = run_pipeline(
        r#"
name: "HangChain"
jobs:
  - name: build
    steps:
      - name: hangs
        run: sleep 60
        timeout_secs: 1
  - name: deploy
    needs: [build]
    deploy:
      registry: registry.example.com
"#,
    )
    .await;

    assert_job(&run, "build", JobStatus::Failed);
    assert_job(&run, "deploy", JobStatus::Skipped);
}

/// The pipeline default timeout applies to steps without their own.
#[tokio::test]
async fn test_pipeline_default_timeout() {
    let run = run_pipeline(
        r#"
name: "DefaultTimeout"
default_timeout_secs: 1
jobs:
  - name: build
    steps:
      - name: hangs
        run: sleep 60
"#,
    )
    .await;

    let build = run
        .report
        .results
        .iter()
        .find(|r| r.job == "build")
        .unwrap();
    assert!(matches!(
        build.failure,
        Some(FailureKind::Timeout { .. })
    ));
}
