#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

fn storyforest(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("storyforest").unwrap();
    cmd.current_dir(dir.path())
        .env("STORYFOREST_ROOT", dir.path())
        .env_remove("STORY_DEPTH_LIMIT");
    cmd
}

fn init_project(dir: &TempDir) {
    storyforest(dir).arg("init").assert().success();
}

/// Run with `--json` and parse stdout.
fn json(dir: &TempDir, args: &[&str]) -> Value {
    let output = storyforest(dir)
        .arg("--json")
        .args(args)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    serde_json::from_slice(&output).unwrap()
}

fn id_of(value: &Value) -> String {
    value["id"].as_str().unwrap().to_string()
}

fn create_mr(dir: &TempDir) -> String {
    id_of(&json(
        dir,
        &["mr", "create", "Checkout", "--branch", "feature/checkout"],
    ))
}

fn create_story(dir: &TempDir, mr: &str, parent: Option<&str>, title: &str) -> String {
    let mut args = vec!["story", "create", title, "--mr", mr];
    if let Some(parent) = parent {
        args.extend(["--parent", parent]);
    }
    id_of(&json(dir, &args))
}

fn add_test(dir: &TempDir, story: &str) -> String {
    id_of(&json(
        dir,
        &[
            "test",
            "add",
            story,
            "--given",
            "a cart with two items",
            "--when",
            "I pay",
            "--then",
            "a receipt is displayed",
        ],
    ))
}

// ---------------------------------------------------------------------------
// storyforest init
// ---------------------------------------------------------------------------

#[test]
fn init_creates_storyforest_dir() {
    let dir = TempDir::new().unwrap();
    storyforest(&dir)
        .args(["init", "--name", "shop"])
        .assert()
        .success()
        .stdout(predicate::str::contains("created: .storyforest/config.yaml"));

    assert!(dir.path().join(".storyforest").is_dir());
    assert!(dir.path().join(".storyforest/forest.yaml").exists());
    let config = std::fs::read_to_string(dir.path().join(".storyforest/config.yaml")).unwrap();
    assert!(config.contains("shop"));
}

#[test]
fn init_is_idempotent() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    storyforest(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("exists:  .storyforest/config.yaml"));
}

#[test]
fn commands_before_init_fail_with_hint() {
    let dir = TempDir::new().unwrap();
    storyforest(&dir)
        .args(["mr", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("storyforest init"));
}

// ---------------------------------------------------------------------------
// merge requests
// ---------------------------------------------------------------------------

#[test]
fn mr_create_and_list() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let mr = create_mr(&dir);
    assert!(mr.starts_with("mr-"));

    storyforest(&dir)
        .args(["mr", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Checkout"))
        .stdout(predicate::str::contains("feature/checkout"));

    let listed = json(&dir, &["mr", "list"]);
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[test]
fn mr_status_rejects_unknown_value() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let mr = create_mr(&dir);
    storyforest(&dir)
        .args(["mr", "status", &mr, "shipped"])
        .assert()
        .failure();
    let updated = json(&dir, &["mr", "status", &mr, "ready-for-review"]);
    assert_eq!(updated["status"], "ready-for-review");
}

#[test]
fn mr_delete_cascades() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let mr = create_mr(&dir);
    let a = create_story(&dir, &mr, None, "A");
    create_story(&dir, &mr, Some(&a), "B");
    add_test(&dir, &a);

    let deleted = json(&dir, &["mr", "delete", &mr]);
    assert_eq!(deleted["deleted"]["stories"].as_array().unwrap().len(), 2);
    assert_eq!(deleted["deleted"]["tests"].as_array().unwrap().len(), 1);
    storyforest(&dir)
        .args(["story", "show", &a])
        .assert()
        .failure()
        .stderr(predicate::str::contains("story not found"));
}

// ---------------------------------------------------------------------------
// stories
// ---------------------------------------------------------------------------

#[test]
fn story_depths_follow_parents() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let mr = create_mr(&dir);
    let a = create_story(&dir, &mr, None, "A");
    let b = create_story(&dir, &mr, Some(&a), "B");

    assert_eq!(json(&dir, &["story", "show", &a])["depth"], 0);
    assert_eq!(json(&dir, &["story", "show", &b])["depth"], 1);

    let path = json(&dir, &["story", "path", &b]);
    let ids: Vec<&str> = path
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![a.as_str(), b.as_str()]);
}

#[test]
fn move_parent_under_child_reports_cycle() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let mr = create_mr(&dir);
    let a = create_story(&dir, &mr, None, "A");
    let b = create_story(&dir, &mr, Some(&a), "B");

    storyforest(&dir)
        .args(["story", "move", &a, "--parent", &b])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Cycle"));
}

#[test]
fn depth_limit_flag_overrides_config() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let mr = create_mr(&dir);
    let a = create_story(&dir, &mr, None, "A");
    let b = create_story(&dir, &mr, Some(&a), "B");

    storyforest(&dir)
        .args(["--depth-limit", "1", "story", "create", "C", "--mr", &mr, "--parent", &b])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Depth limit exceeded"));

    storyforest(&dir)
        .env("STORY_DEPTH_LIMIT", "1")
        .args(["story", "create", "C", "--mr", &mr, "--parent", &b])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Depth limit exceeded"));
}

#[test]
fn story_move_and_tree() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let mr = create_mr(&dir);
    let a = create_story(&dir, &mr, None, "A");
    let b = create_story(&dir, &mr, None, "B");

    let moved = json(&dir, &["story", "move", &b, "--parent", &a]);
    assert_eq!(moved["depth"], 1);

    let tree = json(&dir, &["mr", "tree", &mr]);
    assert_eq!(tree["stories"][0]["id"], a.as_str());
    assert_eq!(tree["stories"][0]["children"][0]["id"], b.as_str());

    storyforest(&dir)
        .args(["mr", "tree", &mr])
        .assert()
        .success()
        .stdout(predicate::str::contains("Checkout"));
}

#[test]
fn story_delete_removes_subtree_and_tests() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let mr = create_mr(&dir);
    let a = create_story(&dir, &mr, None, "A");
    let b = create_story(&dir, &mr, Some(&a), "B");
    let t = add_test(&dir, &b);

    let deleted = json(&dir, &["story", "delete", &a]);
    assert_eq!(deleted["deleted"]["stories"].as_array().unwrap().len(), 2);
    storyforest(&dir).args(["test", "show", &t]).assert().failure();
    assert!(json(&dir, &["story", "list", &mr]).as_array().unwrap().is_empty());
}

#[test]
fn story_update_changes_content() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let mr = create_mr(&dir);
    let a = create_story(&dir, &mr, None, "A");
    let updated = json(
        &dir,
        &["story", "update", &a, "--so-that", "checkout is faster", "--estimate", "3"],
    );
    assert_eq!(updated["so_that"], "checkout is faster");
    assert_eq!(updated["estimate"], 3.0);

    let cleared = json(&dir, &["story", "update", &a, "--clear-estimate"]);
    assert!(cleared.get("estimate").is_none());
}

// ---------------------------------------------------------------------------
// acceptance tests
// ---------------------------------------------------------------------------

#[test]
fn test_add_rejects_blank_step() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let mr = create_mr(&dir);
    let a = create_story(&dir, &mr, None, "A");
    storyforest(&dir)
        .args(["test", "add", &a, "--given", "g", "--when", "w", "--then", " "])
        .assert()
        .failure()
        .stderr(predicate::str::contains("then"));
}

#[test]
fn test_run_updates_status() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let mr = create_mr(&dir);
    let a = create_story(&dir, &mr, None, "A");
    let t = add_test(&dir, &a);

    let run = json(&dir, &["test", "run", &t, "pass", "--notes", "manual"]);
    assert_eq!(run["status"], "passed");
    assert_eq!(run["last_run"]["passed"], true);

    let listed = json(&dir, &["test", "list", &a]);
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// quality gate and analysis
// ---------------------------------------------------------------------------

#[test]
fn done_without_tests_is_blocked_until_warnings_accepted() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let mr = create_mr(&dir);
    let a = create_story(&dir, &mr, None, "A");

    storyforest(&dir)
        .args(["story", "status", &a, "done"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Testable"))
        .stderr(predicate::str::contains("quality gate blocked"));

    let done = json(&dir, &["story", "status", &a, "done", "--accept-warnings"]);
    assert_eq!(done["status"], "done");
    assert!(done["warnings_accepted"]["issues"].as_array().unwrap().len() >= 1);
    assert_eq!(done["status_history"][0]["warnings_accepted"], true);
}

#[test]
fn analyze_flags_zero_estimate_and_missing_tests() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let mr = create_mr(&dir);
    let a = id_of(&json(
        &dir,
        &["story", "create", "Unsized", "--mr", &mr, "--estimate", "0"],
    ));

    let report = json(&dir, &["analyze", &a]);
    assert_eq!(report["finding"]["satisfied"], false);
    assert_eq!(report["finding"]["source"], "heuristic");
    let criteria: Vec<&str> = report["finding"]["issues"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["criterion"].as_str().unwrap())
        .collect();
    assert!(criteria.contains(&"estimable"));
    assert!(criteria.contains(&"testable"));
}

// ---------------------------------------------------------------------------
// config and persistence
// ---------------------------------------------------------------------------

#[test]
fn config_validate_passes_on_defaults() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    storyforest(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"));
}

#[test]
fn config_validate_fails_on_negative_threshold() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    std::fs::write(
        dir.path().join(".storyforest/config.yaml"),
        "project:\n  name: shop\nquality:\n  max_estimate: -1\n",
    )
    .unwrap();
    storyforest(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("quality.max_estimate"));
}

#[test]
fn mutations_are_journaled() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let mr = create_mr(&dir);
    create_story(&dir, &mr, None, "A");

    let journal = std::fs::read_to_string(dir.path().join(".storyforest/journal.log")).unwrap();
    assert!(journal.contains(&format!("create-merge-request {mr}")));
    assert!(journal.contains("create-story"));
}

#[test]
fn corrupt_forest_is_refused() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let mr = create_mr(&dir);
    let a = create_story(&dir, &mr, None, "A");

    let path = dir.path().join(".storyforest/forest.yaml");
    let data = std::fs::read_to_string(&path).unwrap();
    std::fs::write(&path, data.replace("depth: 0", "depth: 3")).unwrap();

    storyforest(&dir)
        .args(["story", "show", &a])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invariants"));
}

#[test]
fn forest_deeper_than_limit_names_the_override() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let mr = create_mr(&dir);
    let mut parent: Option<String> = None;
    for depth in 0..=6 {
        let mut args = vec![
            "--json".to_string(),
            "--depth-limit".to_string(),
            "7".to_string(),
            "story".to_string(),
            "create".to_string(),
            format!("level {depth}"),
            "--mr".to_string(),
            mr.clone(),
        ];
        if let Some(p) = &parent {
            args.extend(["--parent".to_string(), p.clone()]);
        }
        let output = storyforest(&dir).args(&args).assert().success().get_output().stdout.clone();
        let created: Value = serde_json::from_slice(&output).unwrap();
        parent = Some(id_of(&created));
    }
    let deepest = parent.unwrap();

    storyforest(&dir)
        .args(["story", "show", &deepest])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--depth-limit 6"))
        .stderr(predicate::str::contains("invariants").not());

    storyforest(&dir)
        .args(["--depth-limit", "6", "story", "show", &deepest])
        .assert()
        .success();
}

#[test]
fn enforced_writes_need_accepted_warnings() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    std::fs::write(
        dir.path().join(".storyforest/config.yaml"),
        "project:\n  name: shop\nquality:\n  enforce_on_write: true\n",
    )
    .unwrap();
    let mr = create_mr(&dir);

    storyforest(&dir)
        .args(["story", "create", "Vague", "--mr", &mr])
        .assert()
        .failure()
        .stdout(predicate::str::contains("--accept-warnings"))
        .stderr(predicate::str::contains("quality warning"));
    assert!(json(&dir, &["story", "list", &mr]).as_array().unwrap().is_empty());

    let story = id_of(&json(
        &dir,
        &["story", "create", "Vague", "--mr", &mr, "--accept-warnings"],
    ));

    let unmeasurable = [
        "test",
        "add",
        story.as_str(),
        "--given",
        "a signed-in user",
        "--when",
        "they open the dashboard",
        "--then",
        "the dashboard looks great",
    ];
    storyforest(&dir)
        .args(unmeasurable)
        .assert()
        .failure()
        .stderr(predicate::str::contains("not measurable"));

    let mut accepted = unmeasurable.to_vec();
    accepted.push("--accept-warnings");
    let test = json(&dir, &accepted);
    assert!(!test["measurability_warnings"].as_array().unwrap().is_empty());
}
