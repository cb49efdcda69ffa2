use std::process::Output;

use rstest::rstest;

use crate::common::{TestRepo, repo, setup_snapshot_settings};

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[rstest]
fn test_list(repo: TestRepo) {
    repo.add_worktree("feature");
    let output = repo.arbor_command().arg("list").output().unwrap();
    assert!(output.status.success(), "{}", stderr(&output));

    setup_snapshot_settings(&repo).bind(|| {
        insta::assert_snapshot!(stdout(&output), @r"
        @ main     _REPO_/main
          feature  _REPO_/feature
        ");
    });
}

#[rstest]
fn test_status_reports_misplaced(repo: TestRepo) {
    repo.add_worktree_at("feature", "wrong");
    let output = repo.arbor_command().arg("status").output().unwrap();
    assert!(output.status.success(), "{}", stderr(&output));

    setup_snapshot_settings(&repo).bind(|| {
        insta::assert_snapshot!(stdout(&output), @r"
        ✓ main     _REPO_/main
        ▲ feature  _REPO_/wrong (mismatched, expected _REPO_/feature)
        ");
    });
    assert!(stderr(&output).contains("arbor repair"));
}

#[rstest]
fn test_status_json(repo: TestRepo) {
    repo.add_external_worktree("ext", "elsewhere");
    let output = repo
        .arbor_command()
        .args(["status", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", stderr(&output));

    let statuses: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let placements: Vec<_> = statuses
        .as_array()
        .unwrap()
        .iter()
        .map(|s| (s["branch"].as_str().unwrap(), s["placement"].as_str().unwrap()))
        .collect();
    assert_eq!(placements, vec![("main", "managed"), ("ext", "external")]);
}

#[rstest]
fn test_resolve_from_inside_worktree(repo: TestRepo) {
    let feature = repo.add_worktree("feature");
    let subdir = feature.join("src");
    std::fs::create_dir(&subdir).unwrap();

    let output = repo.arbor_command_in(&subdir).arg("resolve").output().unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(stdout(&output).trim(), feature.to_str().unwrap());

    let output = repo.arbor_command_in(&subdir).args(["resolve", "@"]).output().unwrap();
    assert_eq!(stdout(&output).trim(), repo.main_path().to_str().unwrap());
}

#[rstest]
fn test_resolve_unknown_fails(repo: TestRepo) {
    let output = repo
        .arbor_command()
        .args(["resolve", "nope"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).is_empty());
    assert!(stderr(&output).contains("nope"), "{}", stderr(&output));
}

#[rstest]
fn test_create_share_and_remove(repo: TestRepo) {
    std::fs::write(repo.main_path().join(".env"), "TOKEN=1").unwrap();

    let output = repo
        .arbor_command()
        .args(["share", "add", ".env", "--managed"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(repo.root().join(".shared/.env").is_file());

    let output = repo
        .arbor_command()
        .args(["create", "--create", "feature"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
    let feature = repo.root().join("feature");
    assert_eq!(stdout(&output).trim(), feature.to_str().unwrap());
    assert_eq!(
        std::fs::read_to_string(feature.join(".env")).unwrap(),
        "TOKEN=1"
    );

    let output = repo.arbor_command().args(["share", "list"]).output().unwrap();
    insta::assert_snapshot!(stdout(&output), @"symlink  .env (managed)");

    let output = repo
        .arbor_command()
        .args(["remove", "feature"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(!feature.exists());
}

#[rstest]
fn test_rename_then_repair_is_noop(repo: TestRepo) {
    repo.add_worktree("feature");
    let output = repo
        .arbor_command()
        .args(["rename", "feature", "feature-2"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(repo.root().join("feature-2").exists());

    let output = repo.arbor_command().arg("repair").output().unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stderr(&output).contains("All worktrees are where they belong"));
}

#[rstest]
fn test_repair_with_broken_worktree_exits_nonzero(repo: TestRepo) {
    let registered = repo.add_worktree_at("feature", "old-spot");
    std::fs::rename(&registered, repo.root().join("feature")).unwrap();

    let output = repo.arbor_command().arg("repair").output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains("arbor fix-paths feature"), "{err}");
}
