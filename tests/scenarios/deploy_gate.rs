//! Test: the deploy trust gate and secret handling

use crate::helpers::*;
use conveyor::core::{FailureKind, JobStatus, OverallStatus};
use conveyor::execution::ExecutionEvent;

/// Gate denial fails only the deploy job; the build's success stands.
#[tokio::test]
async fn test_gate_denied_fails_only_deploy() {
    let harness = Harness::new().with_gate(MockGate::denying());
    let run = harness
        .run(
            r#"
name: "Denied"
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

    assert_overall(&run, OverallStatus::Failure);
    assert_job(&run, "build", JobStatus::Succeeded);
    assert_job(&run, "deploy", JobStatus::Failed);

    let deploy = run
        .report
        .results
        .iter()
        .find(|r| r.job == "deploy")
        .unwrap();
    assert_eq!(deploy.failure, Some(FailureKind::GateDenied));

    assert!(run
        .event_index(|e| matches!(e, ExecutionEvent::GateDenied { job, .. } if job == "deploy"))
        .is_some());
}

/// No push and no remote execution happen once the gate denies.
#[tokio::test]
async fn test_denied_gate_blocks_collaborators() {
    let harness = Harness::new().with_gate(MockGate::denying());
    harness
        .run(
            r#"
name: "Denied"
jobs:
  - name: deploy
    deploy:
      registry: registry.example.com
      image:
        context: .
        tag: app:latest
      remote:
        host: deploy@prod
        command: docker compose up -d
"#,
        )
        .await;

    assert!(harness.container.operations.lock().unwrap().is_empty());
    assert!(harness.gate.remote_calls.lock().unwrap().is_empty());
}

/// Declared deploy steps see the opaque session environment.
#[tokio::test]
async fn test_session_env_injected_into_deploy_steps() {
    let run = run_pipeline(
        r#"
name: "SessionEnv"
jobs:
  - name: deploy
    deploy:
      registry: registry.example.com
    steps:
      - name: use-session
        run: echo "token=$DEPLOY_SESSION"
"#,
    )
    .await;

    assert_job(&run, "deploy", JobStatus::Succeeded);
    assert!(run.job_log("deploy").contains("token=session-token-123"));
}

/// Secret values never survive into captured logs.
#[tokio::test]
async fn test_secret_values_masked_in_logs() {
    let harness =
        Harness::new().with_masked_values(vec!["session-token-123".to_string()]);
    let run = harness
        .run(
            r#"
name: "Masked"
jobs:
  - name: deploy
    deploy:
      registry: registry.example.com
    steps:
      - name: leak-attempt
        run: echo "token=$DEPLOY_SESSION"
"#,
        )
        .await;

    assert_job(&run, "deploy", JobStatus::Succeeded);
    let log = run.job_log("deploy");
    assert!(!log.contains("session-token-123"), "secret leaked: {}", log);
    assert!(log.contains("token=***"));
}

/// A failing push fails the deploy job with the push step named.
#[tokio::test]
async fn test_failed_push_fails_deploy() {
    let harness = Harness::new().with_container(MockContainer {
        fail_push: true,
        ..Default::default()
    });
    let run = harness
        .run(
            r#"
name: "PushFails"
jobs:
  - name: deploy
    deploy:
      registry: registry.example.com
      image:
        context: .
        tag: app:latest
"#,
        )
        .await;

    assert_overall(&run, OverallStatus::Failure);
    let deploy = run
        .report
        .results
        .iter()
        .find(|r| r.job == "deploy")
        .unwrap();
    assert_eq!(
        deploy.failure,
        Some(FailureKind::Step {
            step: "push".to_string(),
            exit_code: 1
        })
    );
}

/// A non-zero remote exit fails the deploy job.
#[tokio::test]
async fn test_remote_failure_fails_deploy() {
    let harness = Harness::new().with_gate(MockGate {
        remote_exit: 17,
        ..MockGate::allowing()
    });
    let run = harness
        .run(
            r#"
name: "RemoteFails"
jobs:
  - name: deploy
    deploy:
      registry: registry.example.com
      remote:
        host: deploy@prod
        command: docker compose up -d
"#,
        )
        .await;

    let deploy = run
        .report
        .results
        .iter()
        .find(|r| r.job == "deploy")
        .unwrap();
    assert_eq!(
        deploy.failure,
        Some(FailureKind::Step {
            step: "remote-deploy".to_string(),
            exit_code: 17
        })
    );
}

/// Jobs depending on the deploy job run after it passes the gate.
#[tokio::test]
async fn test_post_deploy_job_runs_after_gate() {
    let run = run_pipeline(
        r#"
name: "PostDeploy"
jobs:
  - name: deploy
    deploy:
      registry: registry.example.com
  - name: smoke-check
    needs: [deploy]
    steps:
      - name: probe
        run: echo smoke-ok
"#,
    )
    .await;

    assert_overall(&run, OverallStatus::Success);
    assert_job(&run, "deploy", JobStatus::Succeeded);
    assert_job(&run, "smoke-check", JobStatus::Succeeded);
    assert!(run.job_log("smoke-check").contains("smoke-ok"));
}
