use std::fs;
use std::path::Path;

use arbor::GitError;
use arbor::config::SharedKind;
use arbor::repair::{self, RepairAction, RepairStatus, RepairTarget, Strategy};
use arbor::shared;
use rstest::rstest;

use crate::common::{TestRepo, repo, repo_view};

#[rstest]
fn test_repair_moves_directory_to_branch(repo: TestRepo) {
    let wrong = repo.add_worktree_at("feature", "wrong");
    let backend = repo.backend();
    let view = repo_view(&backend);
    let config = repo.config();

    let targets = repair::detect(&view, &config).unwrap();
    assert_eq!(
        targets,
        vec![RepairTarget::Mismatch {
            path: wrong.clone(),
            branch: "feature".into(),
            expected: repo.root().join("feature"),
            nested: false,
        }]
    );

    let outcome = repair::repair(&view, &config, &targets[0], Strategy::BranchIsTruth).unwrap();
    assert_eq!(
        outcome.action,
        RepairAction::Moved {
            from: wrong.clone(),
            to: repo.root().join("feature"),
        }
    );
    assert!(!wrong.exists());
    assert_eq!(
        repo.registered_path_of("feature"),
        Some(repo.root().join("feature"))
    );
    assert!(repair::detect(&view, &config).unwrap().is_empty());
}

#[rstest]
fn test_repair_renames_branch_to_directory(repo: TestRepo) {
    let wrong = repo.add_worktree_at("feature", "team/login");
    let backend = repo.backend();
    let view = repo_view(&backend);
    let config = repo.config();

    let outcome = repair::repair_one(&view, &config, "feature", None, Strategy::DirIsTruth)
        .unwrap()
        .unwrap();
    assert_eq!(
        outcome.action,
        RepairAction::BranchRenamed {
            from: "feature".into(),
            to: "team/login".into(),
        }
    );
    assert!(!repo.branch_exists("feature"));
    assert_eq!(repo.registered_path_of("team/login"), Some(wrong));
}

#[rstest]
fn test_repair_external_worktree_relinks_shared(repo: TestRepo) {
    fs::write(repo.main_path().join(".env"), "TOKEN=1").unwrap();
    let external = repo.add_external_worktree("ext", "elsewhere");
    let backend = repo.backend();
    let view = repo_view(&backend);
    let (config, _) = shared::add(
        &view,
        &repo.config(),
        &repo.store(),
        ".env",
        SharedKind::Symlink,
        false,
    )
    .unwrap();

    let results = repair::repair_all(&view, &config, Strategy::DirIsTruth).unwrap();
    assert_eq!(results.len(), 1);
    assert!(matches!(results[0].status, RepairStatus::Repaired(_)));

    let moved = repo.root().join("ext");
    assert!(!external.exists());
    assert_eq!(repo.registered_path_of("ext"), Some(moved.clone()));
    assert_eq!(
        fs::read_link(moved.join(".env")).unwrap(),
        Path::new("../main/.env")
    );
    assert_eq!(fs::read_to_string(moved.join(".env")).unwrap(), "TOKEN=1");
}

#[rstest]
fn test_broken_worktree_suggests_fix_paths(repo: TestRepo) {
    let registered = repo.add_worktree_at("feature", "old-spot");
    let actual = repo.root().join("feature");
    fs::rename(&registered, &actual).unwrap();
    let backend = repo.backend();
    let view = repo_view(&backend);
    let config = repo.config();

    let targets = repair::detect(&view, &config).unwrap();
    assert_eq!(
        targets,
        vec![RepairTarget::Broken {
            path: registered.clone(),
            branch: Some("feature".into()),
            suggested: Some(actual.clone()),
        }]
    );
    let results = repair::repair_all(&view, &config, Strategy::BranchIsTruth).unwrap();
    assert_eq!(results[0].status, RepairStatus::NeedsManualPath);

    let fixed = repair::fix_paths(&view, &config, "feature", &actual).unwrap();
    assert_eq!(fixed.from, registered);
    assert_eq!(fixed.to, actual);
    assert_eq!(repo.registered_path_of("feature"), Some(actual));
    assert!(repair::detect(&view, &config).unwrap().is_empty());
}

#[rstest]
fn test_rename_moves_and_relinks(repo: TestRepo) {
    fs::write(repo.main_path().join(".env"), "TOKEN=1").unwrap();
    let feature = repo.add_worktree("feature");
    let backend = repo.backend();
    let view = repo_view(&backend);
    let (config, _) = shared::add(
        &view,
        &repo.config(),
        &repo.store(),
        ".env",
        SharedKind::Symlink,
        false,
    )
    .unwrap();

    let outcome = repair::rename(&view, &config, "feature", None, "team/feature").unwrap();

    let renamed = repo.root().join("team").join("feature");
    assert_eq!(outcome.new_path, renamed);
    assert!(outcome.warnings.is_empty(), "{:?}", outcome.warnings);
    assert!(!feature.exists());
    assert!(!repo.branch_exists("feature"));
    assert_eq!(repo.registered_path_of("team/feature"), Some(renamed.clone()));
    assert_eq!(
        fs::read_link(renamed.join(".env")).unwrap(),
        Path::new("../../main/.env")
    );
    assert_eq!(fs::read_to_string(renamed.join(".env")).unwrap(), "TOKEN=1");
}

#[rstest]
fn test_rename_ref_conflict_changes_nothing(repo: TestRepo) {
    let feature = repo.add_worktree("feature");
    repo.create_branch("team");
    let backend = repo.backend();
    let view = repo_view(&backend);

    let err = repair::rename(&view, &repo.config(), "feature", None, "team/feature").unwrap_err();
    assert!(
        matches!(err.downcast_ref::<GitError>(), Some(GitError::RefConflict { .. })),
        "{err:#}"
    );
    assert!(feature.exists());
    assert!(repo.branch_exists("feature"));
    assert!(!repo.root().join("team").exists());
    assert_eq!(repo.registered_path_of("feature"), Some(feature));
}

#[rstest]
fn test_fix_paths_to_another_checkout_leaves_registrations(repo: TestRepo) {
    let registered = repo.add_worktree_at("feature", "old-spot");
    fs::rename(&registered, repo.root().join("feature")).unwrap();
    let backend = repo.backend();
    let view = repo_view(&backend);

    let err = repair::fix_paths(&view, &repo.config(), "feature", &repo.main_path()).unwrap_err();

    assert!(
        matches!(err.downcast_ref::<GitError>(), Some(GitError::Other { .. })),
        "{err:#}"
    );
    assert_eq!(repo.registered_path_of("main"), Some(repo.main_path()));
    assert_eq!(repo.registered_path_of("feature"), Some(registered));
}

#[rstest]
fn test_rename_refuses_worktree_with_nested_worktree(repo: TestRepo) {
    let feature = repo.add_worktree("feature");
    let inner = repo.add_worktree_at("inner", "feature/inner");
    let backend = repo.backend();
    let view = repo_view(&backend);

    let err = repair::rename(&view, &repo.config(), "feature", None, "feat").unwrap_err();

    assert!(
        matches!(err.downcast_ref::<GitError>(), Some(GitError::NestedWorktrees { .. })),
        "{err:#}"
    );
    assert!(repo.branch_exists("feature"));
    assert_eq!(repo.registered_path_of("feature"), Some(feature));
    assert_eq!(repo.registered_path_of("inner"), Some(inner));
    assert!(!repo.root().join("feat").exists());
}
