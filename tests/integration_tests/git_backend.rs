use arbor::GitError;
use arbor::config::Config;
use arbor::git::{GitBackend, VcsBackend};
use arbor::worktree::Layout;
use rstest::rstest;

use crate::common::{TestRepo, classic_repo, repo, repo_view};

#[rstest]
fn test_discover_bare_layout(repo: TestRepo) {
    let backend = GitBackend::discover(&repo.main_path()).unwrap();
    assert_eq!(backend.root(), repo.root());
    assert_eq!(backend.command_dir(), repo.root().join(".bare"));

    // Discovery from inside a linked worktree finds the same repository
    let feature = repo.add_worktree("feature");
    let nested = feature.join("src");
    std::fs::create_dir(&nested).unwrap();
    let backend = GitBackend::discover(&nested).unwrap();
    assert_eq!(backend.root(), repo.root());
}

#[rstest]
fn test_discover_classic_layout(classic_repo: TestRepo) {
    let backend = GitBackend::discover(classic_repo.root()).unwrap();
    assert_eq!(backend.root(), classic_repo.root());
    assert_eq!(backend.command_dir(), classic_repo.root());
    assert_eq!(
        Layout::for_git(&backend).backing_store(),
        classic_repo.root().join(".git")
    );
}

#[rstest]
fn test_discover_outside_repository(repo: TestRepo) {
    let err = GitBackend::discover(repo.outside()).unwrap_err();
    assert!(
        err.to_string().contains("Not inside a git repository"),
        "{err}"
    );
}

#[rstest]
fn test_catalog_skips_backing_store(repo: TestRepo) {
    repo.add_worktree("feature");
    let backend = repo.backend();
    let raw = backend.list_worktrees().unwrap();
    assert!(raw.iter().any(|wt| wt.bare));

    let worktrees = repo_view(&backend).worktrees(&Config::default()).unwrap();
    assert_eq!(worktrees.len(), 2);
    let main = worktrees.iter().find(|wt| wt.is_main).unwrap();
    assert_eq!(main.branch.as_deref(), Some("main"));
    assert_eq!(main.path, repo.main_path());
    let feature = worktrees.iter().find(|wt| !wt.is_main).unwrap();
    assert_eq!(feature.branch.as_deref(), Some("feature"));
    assert_eq!(feature.path, repo.root().join("feature"));
}

#[rstest]
fn test_catalog_reports_detached_and_missing(repo: TestRepo) {
    let detached = repo.root().join("scratch");
    repo.run_git(&["worktree", "add", "-q", "--detach", detached.to_str().unwrap(), "main"]);
    let gone = repo.add_worktree("gone");
    std::fs::remove_dir_all(&gone).unwrap();

    let backend = repo.backend();
    let worktrees = repo_view(&backend).worktrees(&Config::default()).unwrap();

    let scratch = worktrees.iter().find(|wt| wt.path == detached).unwrap();
    assert!(scratch.detached);
    assert_eq!(scratch.branch, None);

    let missing = worktrees.iter().find(|wt| wt.path == gone).unwrap();
    assert!(missing.is_missing());
}

#[rstest]
fn test_add_worktree_with_new_branch(repo: TestRepo) {
    let backend = repo.backend();
    let path = repo.root().join("fix").join("login");
    backend.add_worktree(&path, "fix/login", true, Some("main")).unwrap();

    assert!(path.join("file.txt").exists());
    assert!(backend.ref_exists("fix/login").unwrap());
    assert_eq!(repo.registered_path_of("fix/login"), Some(path));
}

#[rstest]
fn test_add_worktree_ref_conflict(repo: TestRepo) {
    repo.create_branch("feature");
    let backend = repo.backend();
    let path = repo.root().join("feature-sub");

    let err = backend
        .add_worktree(&path, "feature/sub", true, None)
        .unwrap_err();
    assert!(
        matches!(
            err.downcast_ref::<GitError>(),
            Some(GitError::RefConflict { attempted, .. }) if attempted == "feature/sub"
        ),
        "{err:#}"
    );
}

#[rstest]
fn test_rename_branch_ref_conflict(repo: TestRepo) {
    repo.create_branch("feature");
    repo.create_branch("topic");
    let backend = repo.backend();

    let err = backend.rename_branch("topic", "feature/topic").unwrap_err();
    assert!(
        matches!(
            err.downcast_ref::<GitError>(),
            Some(GitError::RefConflict { attempted, conflicting })
                if attempted == "feature/topic" && conflicting == "feature"
        ),
        "{err:#}"
    );
    assert!(repo.branch_exists("topic"));
}

#[rstest]
fn test_rename_checked_out_branch(repo: TestRepo) {
    let path = repo.add_worktree("feature");
    let backend = repo.backend();
    backend.rename_branch("feature", "feature-2").unwrap();

    assert!(!backend.ref_exists("feature").unwrap());
    assert_eq!(repo.registered_path_of("feature-2"), Some(path));
}

#[rstest]
fn test_reregister_after_move(repo: TestRepo) {
    let old = repo.add_worktree("feature");
    let new = repo.root().join("moved");
    std::fs::rename(&old, &new).unwrap();

    let backend = repo.backend();
    backend.reregister_worktree(&new).unwrap();
    assert_eq!(repo.registered_path_of("feature"), Some(new));
}

#[rstest]
fn test_remove_worktree(repo: TestRepo) {
    let path = repo.add_worktree("feature");
    let backend = repo.backend();

    std::fs::write(path.join("dirty.txt"), "x").unwrap();
    let err = backend.remove_worktree(&path, false).unwrap_err();
    assert!(
        matches!(err.downcast_ref::<GitError>(), Some(GitError::BackendFailure { .. })),
        "{err:#}"
    );
    assert!(path.exists());

    backend.remove_worktree(&path, true).unwrap();
    assert!(!path.exists());
    assert_eq!(repo.registered_path_of("feature"), None);
}

#[rstest]
fn test_ref_exists_matches_whole_branch_names(repo: TestRepo) {
    repo.create_branch("feature/x");
    let backend = repo.backend();

    assert!(backend.ref_exists("feature/x").unwrap());
    assert!(!backend.ref_exists("feature").unwrap());
    assert!(!backend.ref_exists("feature/x/y").unwrap());
}

#[rstest]
fn test_ref_exists_reports_git_failure(repo: TestRepo) {
    let gone = repo.outside().join("gone");
    let backend = GitBackend::at(&gone, &gone);

    let err = backend.ref_exists("main").unwrap_err();
    assert!(format!("{err:#}").contains("Failed to look up branch main"), "{err:#}");
}
