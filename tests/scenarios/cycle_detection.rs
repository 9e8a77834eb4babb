//! Test: configuration errors are rejected before anything executes

use conveyor::core::config::{ConfigError, PipelineConfig};

#[test]
fn test_two_job_cycle_rejected() {
    let yaml = r#"
name: "Cycle"
jobs:
  - name: a
    needs: [b]
    steps:
      - name: run
        run: echo a
  - name: b
    needs: [a]
    steps:
      - name: run
        run: echo b
"#;

    assert!(matches!(
        PipelineConfig::from_yaml(yaml),
        Err(ConfigError::Cycle(_))
    ));
}

#[test]
fn test_longer_cycle_rejected() {
    let yaml = r#"
name: "Cycle"
jobs:
  - name: a
    needs: [c]
    steps:
      - name: run
        run: echo a
  - name: b
    needs: [a]
    steps:
      - name: run
        run: echo b
  - name: c
    needs: [b]
    steps:
      - name: run
        run: echo c
"#;

    assert!(matches!(
        PipelineConfig::from_yaml(yaml),
        Err(ConfigError::Cycle(_))
    ));
}

/// A cycle is detected before any step could have executed: detection
/// happens at parse time, with no engine in sight.
#[test]
fn test_cycle_detected_without_execution() {
    let marker = std::env::temp_dir().join(format!("conveyor-cycle-{}", uuid::Uuid::new_v4()));
    let yaml = format!(
        r#"
name: "Cycle"
jobs:
  - name: a
    needs: [b]
    steps:
      - name: leave-marker
        run: touch {marker}
  - name: b
    needs: [a]
    steps:
      - name: run
        run: echo b
"#,
        marker = marker.display()
    );

    assert!(PipelineConfig::from_yaml(&yaml).is_err());
    assert!(!marker.exists(), "no step may run for a cyclic definition");
}

#[test]
fn test_self_dependency_rejected() {
    let yaml = r#"
name: "SelfLoop"
jobs:
  - name: a
    needs: [a]
    steps:
      - name: run
        run: echo a
"#;

    assert!(matches!(
        PipelineConfig::from_yaml(yaml),
        Err(ConfigError::Cycle(_))
    ));
}

#[test]
fn test_unknown_need_rejected() {
    let yaml = r#"
name: "Dangling"
jobs:
  - name: a
    needs: [ghost]
    steps:
      - name: run
        run: echo a
"#;

    match PipelineConfig::from_yaml(yaml) {
        Err(ConfigError::UnknownDependency { job, needs }) => {
            assert_eq!(job, "a");
            assert_eq!(needs, "ghost");
        }
        other => panic!("expected UnknownDependency, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_diamond_is_not_a_cycle() {
    let yaml = r#"
name: "Diamond"
jobs:
  - name: root
    steps:
      - name: run
        run: echo root
  - name: left
    needs: [root]
    steps:
      - name: run
        run: echo left
  - name: right
    needs: [root]
    steps:
      - name: run
        run: echo right
  - name: merge
    needs: [left, right]
    steps:
      - name: run
        run: echo merge
"#;

    assert!(PipelineConfig::from_yaml(yaml).is_ok());
}
