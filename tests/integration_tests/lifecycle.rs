use arbor::GitError;
use arbor::worktree::lifecycle;
use rstest::rstest;

use crate::common::{TestRepo, repo, repo_view};

#[rstest]
fn test_create_propagates_shared_entries(repo: TestRepo) {
    std::fs::write(repo.main_path().join(".env"), "TOKEN=1").unwrap();
    repo.write_config(
        r#"
[[shared]]
source = ".env"
type = "symlink"

[[shared]]
source = "touch setup-ran"
type = "command"
"#,
    );
    let backend = repo.backend();
    let view = repo_view(&backend);

    let report = lifecycle::create(&view, &repo.config(), "feature", true, None).unwrap();

    let path = repo.root().join("feature");
    assert_eq!(report.path, path);
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    assert_eq!(report.shared.applied, vec![path.join(".env")]);
    assert_eq!(
        std::fs::read_link(path.join(".env")).unwrap(),
        std::path::Path::new("../main/.env")
    );
    assert_eq!(std::fs::read_to_string(path.join(".env")).unwrap(), "TOKEN=1");
    assert!(path.join("setup-ran").exists());
}

#[rstest]
fn test_create_failed_command_is_a_warning(repo: TestRepo) {
    repo.write_config(
        r#"
[[shared]]
source = "exit 3"
type = "command"
"#,
    );
    let backend = repo.backend();
    let view = repo_view(&backend);

    let report = lifecycle::create(&view, &repo.config(), "feature", true, None).unwrap();
    assert_eq!(report.warnings, vec!["Command failed: exit 3".to_string()]);
    assert!(repo.root().join("feature").exists());
}

#[rstest]
fn test_create_existing_branch_requires_flag(repo: TestRepo) {
    let backend = repo.backend();
    let view = repo_view(&backend);

    let err = lifecycle::create(&view, &repo.config(), "nope", false, None).unwrap_err();
    assert!(err.to_string().contains("does not exist"), "{err}");

    repo.create_branch("topic");
    let err = lifecycle::create(&view, &repo.config(), "topic", true, None).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<GitError>(),
        Some(GitError::BranchAlreadyExists { .. })
    ));

    lifecycle::create(&view, &repo.config(), "topic", false, None).unwrap();
    assert_eq!(
        repo.registered_path_of("topic"),
        Some(repo.root().join("topic"))
    );
}

#[rstest]
fn test_remove_cleans_empty_parents(repo: TestRepo) {
    let path = repo.add_worktree("fix/login");
    let backend = repo.backend();
    let view = repo_view(&backend);

    let removed = lifecycle::remove(&view, &repo.config(), "fix/login", None, false).unwrap();
    assert_eq!(removed, path);
    assert!(!repo.root().join("fix").exists());
    assert!(repo.root().exists());
}

#[rstest]
fn test_remove_refuses_default_worktree(repo: TestRepo) {
    let backend = repo.backend();
    let view = repo_view(&backend);

    let err = lifecycle::remove(&view, &repo.config(), "@", None, true).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<GitError>(),
        Some(GitError::CannotModifyDefault { .. })
    ));
    assert!(repo.main_path().exists());
}
