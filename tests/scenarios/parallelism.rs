//! Test: independent jobs run concurrently, bounded by max_parallel

use crate::helpers::*;
use conveyor::core::OverallStatus;
use std::time::{Duration, Instant};

/// Two unrelated jobs overlap: total wall clock stays near one job's time.
#[tokio::test]
async fn test_independent_jobs_run_concurrently() {
    let start = Instant::now();
    let run = run_pipeline(
        r#"
name: "Parallel"
jobs:
  - name: left
    steps:
      - name: nap
        run: sleep 1
  - name: right
    steps:
      - name: nap
        run: sleep 1
"#,
    )
    .await;
    let elapsed = start.elapsed();

    assert_overall(&run, OverallStatus::Success);
    assert!(
        elapsed < Duration::from_millis(1900),
        "independent jobs were serialized: {:?}",
        elapsed
    );
}

/// max_parallel: 1 forces the same two jobs to run back to back.
#[tokio::test]
async fn test_parallelism_bound_is_enforced() {
    let start = Instant::now();
    let run = run_pipeline(
        r#"
name: "Serial"
max_parallel: 1
jobs:
  - name: left
    steps:
      - name: nap
        run: sleep 1
  - name: right
    steps:
      - name: nap
        run: sleep 1
"#,
    )
    .await;
    let elapsed = start.elapsed();

    assert_overall(&run, OverallStatus::Success);
    assert!(
        elapsed >= Duration::from_secs(2),
        "bound of 1 should serialize the jobs: {:?}",
        elapsed
    );
}

/// Results surface in completion order, not declaration order.
#[tokio::test]
async fn test_completion_order_delivery() {
    let run = run_pipeline(
        r#"
name: "Order"
jobs:
  - name: a-slow
    steps:
      - name: nap
        run: sleep 1
  - name: b-fast
    steps:
      - name: run
        run: echo quick
"#,
    )
    .await;

    let order: Vec<&str> = run.report.results.iter().map(|r| r.job.as_str()).collect();
    assert_eq!(order, vec!["b-fast", "a-slow"]);
}

/// A shared dependency gates both branches, which then overlap.
#[tokio::test]
async fn test_fan_out_after_shared_dependency() {
    let start = Instant::now();
    let run = run_pipeline(
        r#"
name: "FanOut"
jobs:
  - name: build
    steps:
      - name: run
        run: echo built
  - name: test-unit
    needs: [build]
    steps:
      - name: nap
        run: sleep 1
  - name: test-integ
    needs: [build]
    steps:
      - name: nap
        run: sleep 1
"#,
    )
    .await;
    let elapsed = start.elapsed();

    assert_overall(&run, OverallStatus::Success);
    assert_eq!(run.report.results[0].job, "build");
    assert!(
        elapsed < Duration::from_millis(2500),
        "fan-out jobs were serialized: {:?}",
        elapsed
    );
}
