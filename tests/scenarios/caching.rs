//! Test: cache save/restore across runs, restore keys, miss semantics

use crate::helpers::*;
use conveyor::core::{JobStatus, OverallStatus};

/// A warm run saves the cache; a later run on the same store restores it.
#[tokio::test]
async fn test_cache_survives_across_runs() {
    let harness = Harness::new();

    let warm = harness
        .run(
            r#"
name: "Warm"
jobs:
  - name: build
    steps:
      - name: produce
        run: mkdir -p target && echo cached-artifact > target/out.txt
      - name: save
        uses: cache-save
        cache:
          key: deps-v1
          path: target
"#,
        )
        .await;
    assert_overall(&warm, OverallStatus::Success);
    assert!(warm.job_log("build").contains("Saved cache key 'deps-v1'"));

    // Second run: a fresh checkout directory, same cache store
    let reuse = harness
        .run(
            r#"
name: "Reuse"
jobs:
  - name: build
    steps:
      - name: checkout
        uses: checkout
      - name: restore
        uses: cache-restore
        cache:
          key: deps-v1
          path: target
      - name: verify
        run: cat target/out.txt
"#,
        )
        .await;

    assert_overall(&reuse, OverallStatus::Success);
    assert!(reuse.job_log("build").contains("Cache hit for key 'deps-v1'"));
    assert!(reuse.job_log("build").contains("cached-artifact"));
}

/// An exact miss falls back to the newest restore-key prefix match.
#[tokio::test]
async fn test_restore_key_prefix_fallback() {
    let harness = Harness::new();

    let warm = harness
        .run(
            r#"
name: "Warm"
jobs:
  - name: build
    steps:
      - name: produce
        run: mkdir -p target && echo older-artifact > target/out.txt
      - name: save
        uses: cache-save
        cache:
          key: deps-old-hash
          path: target
"#,
        )
        .await;
    assert_overall(&warm, OverallStatus::Success);

    let reuse = harness
        .run(
            r#"
name: "Reuse"
jobs:
  - name: build
    steps:
      - name: checkout
        uses: checkout
      - name: restore
        uses: cache-restore
        cache:
          key: deps-new-hash
          restore_keys: ["deps-"]
          path: target
      - name: verify
        run: cat target/out.txt
"#,
        )
        .await;

    assert_overall(&reuse, OverallStatus::Success);
    assert!(reuse
        .job_log("build")
        .contains("Cache restored from prefix for key 'deps-old-hash'"));
    assert!(reuse.job_log("build").contains("older-artifact"));
}

/// A miss never fails the job: the build proceeds from scratch.
#[tokio::test]
async fn test_cache_miss_degrades_to_build() {
    let run = run_pipeline(
        r#"
name: "Cold"
jobs:
  - name: build
    steps:
      - name: restore
        uses: cache-restore
        cache:
          key: never-saved
          restore_keys: ["also-never-"]
          path: target
      - name: compile
        run: echo built-from-scratch
"#,
    )
    .await;

    assert_overall(&run, OverallStatus::Success);
    assert_job(&run, "build", JobStatus::Succeeded);
    assert!(run.job_log("build").contains("Cache miss"));
    assert!(run.job_log("build").contains("built-from-scratch"));
}

/// hashFiles keys: same lock file, same key; changed lock file, new key.
#[tokio::test]
async fn test_hash_files_key_tracks_lock_file() {
    let harness = Harness::new();
    std::fs::write(harness.workdir.join("deps.lock"), "version-1").unwrap();

    let first = harness
        .run(
            r#"
name: "Hashed"
jobs:
  - name: build
    steps:
      - name: produce
        run: mkdir -p target && echo v1 > target/out.txt
      - name: save
        uses: cache-save
        cache:
          key: "deps-{{ hashFiles('deps.lock') }}"
          path: target
"#,
        )
        .await;
    assert_overall(&first, OverallStatus::Success);

    // Unchanged lock file: exact hit
    let second = harness
        .run(
            r#"
name: "Hashed"
jobs:
  - name: build
    steps:
      - name: restore
        uses: cache-restore
        cache:
          key: "deps-{{ hashFiles('deps.lock') }}"
          path: target
      - name: verify
        run: cat target/out.txt
"#,
        )
        .await;
    assert!(second.job_log("build").contains("Cache hit"));

    // Changed lock file: the key no longer matches
    std::fs::write(harness.workdir.join("deps.lock"), "version-2").unwrap();
    let third = harness
        .run(
            r#"
name: "Hashed"
jobs:
  - name: build
    steps:
      - name: restore
        uses: cache-restore
        cache:
          key: "deps-{{ hashFiles('deps.lock') }}"
          path: target
"#,
        )
        .await;
    assert!(third.job_log("build").contains("Cache miss"));
}
