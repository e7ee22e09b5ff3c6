//! Hook discovery against local repos and a fake hosting service.

use std::fs;

use workset::core::hooks::{REPO_HOOKS_PATH, SourceKind};
use workset::core::types::{Registry, RepoAlias};
use workset::hooks::discover;
use workset::test_support::FakeHost;

const HOOKS: &str = "hooks:\n  - id: bootstrap\n    on: [worktree.created]\n    run: [npm, ci]\n";

#[test]
fn remote_repo_without_manifest_reports_absent() {
    let host = FakeHost::new();

    let discovery =
        discover(&Registry::default(), &host, "https://github.com/acme/api.git", "v2")
            .expect("discover");

    assert_eq!(discovery.kind, SourceKind::RemoteUrl);
    assert!(!discovery.exists);
    assert!(discovery.hooks.is_empty());
    assert_eq!(discovery.git_ref, "v2");
    assert_eq!(host.requests(), vec![format!("github.com acme/api/{REPO_HOOKS_PATH}@v2")]);
}

#[test]
fn host_failure_is_an_error_not_absence() {
    let host = FakeHost::new().failing("503 Service Unavailable");

    let err = discover(&Registry::default(), &host, "git@github.com:acme/api.git", "")
        .expect_err("host down");

    assert!(format!("{err:#}").contains("503 Service Unavailable"));
}

#[test]
fn alias_with_local_path_never_hits_the_host() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::create_dir_all(temp.path().join(".workset")).expect("mkdir");
    fs::write(temp.path().join(REPO_HOOKS_PATH), HOOKS).expect("write hooks");
    let mut registry = Registry::default();
    registry.repos.insert(
        "api".to_string(),
        RepoAlias {
            path: temp.path().display().to_string(),
            url: "git@github.com:acme/api.git".to_string(),
            ..RepoAlias::default()
        },
    );
    let host = FakeHost::new();

    let discovery = discover(&registry, &host, "api", "").expect("discover");

    assert_eq!(discovery.kind, SourceKind::Alias);
    assert!(discovery.exists);
    assert_eq!(discovery.hooks[0].id, "bootstrap");
    assert!(host.requests().is_empty());
}

#[test]
fn invalid_manifest_is_rejected() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::create_dir_all(temp.path().join(".workset")).expect("mkdir");
    fs::write(
        temp.path().join(REPO_HOOKS_PATH),
        "hooks:\n  - on: [worktree.created]\n    run: [make]\n",
    )
    .expect("write hooks");

    let err = discover(
        &Registry::default(),
        &FakeHost::new(),
        &temp.path().display().to_string(),
        "",
    )
    .expect_err("invalid");

    assert!(format!("{err:#}").contains("hook id required"));
}
