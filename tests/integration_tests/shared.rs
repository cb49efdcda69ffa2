use std::fs;
use std::path::Path;

use arbor::GitError;
use arbor::config::SharedKind;
use arbor::shared;
use rstest::rstest;

use crate::common::{TestRepo, repo, repo_view};

#[rstest]
fn test_add_managed_source_persists_config(repo: TestRepo) {
    fs::write(repo.main_path().join(".env"), "TOKEN=1").unwrap();
    let feature = repo.add_worktree("feature");
    let backend = repo.backend();
    let view = repo_view(&backend);

    let (config, report) = shared::add(
        &view,
        &repo.config(),
        &repo.store(),
        ".env",
        SharedKind::Symlink,
        true,
    )
    .unwrap();

    let canonical = repo.root().join(".shared").join(".env");
    assert_eq!(
        report.relocated,
        Some((repo.main_path().join(".env"), canonical.clone()))
    );
    assert_eq!(fs::read_to_string(&canonical).unwrap(), "TOKEN=1");
    assert_eq!(
        fs::read_link(feature.join(".env")).unwrap(),
        Path::new("../.shared/.env")
    );
    assert_eq!(
        fs::read_link(repo.main_path().join(".env")).unwrap(),
        Path::new("../.shared/.env")
    );

    // Persisted, and loads back to the same entries
    assert_eq!(repo.config(), config);
    let on_disk = fs::read_to_string(repo.root().join(".arbor.toml")).unwrap();
    insta::assert_snapshot!(on_disk, @r#"
    [[shared]]
    source = ".env"
    type = "symlink"
    managed = true
    "#);
}

#[rstest]
fn test_add_conflict_mutates_nothing(repo: TestRepo) {
    fs::write(repo.main_path().join(".env"), "TOKEN=1").unwrap();
    let feature = repo.add_worktree("feature");
    fs::write(feature.join(".env"), "LOCAL=1").unwrap();
    let backend = repo.backend();
    let view = repo_view(&backend);

    let err = shared::add(
        &view,
        &repo.config(),
        &repo.store(),
        ".env",
        SharedKind::Symlink,
        true,
    )
    .unwrap_err();

    let Some(GitError::ConflictDetected { conflicts }) = err.downcast_ref::<GitError>() else {
        panic!("expected conflict, got {err:#}");
    };
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].target, feature.join(".env"));

    assert_eq!(fs::read_to_string(repo.main_path().join(".env")).unwrap(), "TOKEN=1");
    assert!(!repo.root().join(".shared").exists());
    assert!(!repo.root().join(".arbor.toml").exists());
}

#[rstest]
fn test_copy_entries_survive_reapply(repo: TestRepo) {
    fs::write(repo.main_path().join("local.toml"), "a = 1").unwrap();
    let feature = repo.add_worktree("feature");
    let backend = repo.backend();
    let view = repo_view(&backend);

    let (config, _) = shared::add(
        &view,
        &repo.config(),
        &repo.store(),
        "local.toml",
        SharedKind::Copy,
        false,
    )
    .unwrap();
    let copy = feature.join("local.toml");
    assert!(!copy.symlink_metadata().unwrap().file_type().is_symlink());

    // A diverged copy is the worktree's own business
    fs::write(&copy, "a = 2").unwrap();
    let report = shared::apply_all(&view, &config).unwrap();
    assert!(report.is_noop());
    assert_eq!(fs::read_to_string(&copy).unwrap(), "a = 2");
}

#[rstest]
fn test_remove_restores_managed_source(repo: TestRepo) {
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
        true,
    )
    .unwrap();

    let (config, report) = shared::remove(&view, &config, &repo.store(), ".env", false).unwrap();

    assert!(config.shared.is_empty());
    assert_eq!(report.restored, Some(repo.main_path().join(".env")));
    assert!(feature.join(".env").symlink_metadata().is_err());
    let restored = repo.main_path().join(".env");
    assert!(!restored.symlink_metadata().unwrap().file_type().is_symlink());
    assert_eq!(fs::read_to_string(restored).unwrap(), "TOKEN=1");
    assert!(!repo.root().join(".shared").join(".env").exists());
}
