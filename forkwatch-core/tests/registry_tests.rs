//! Registry load and reload behaviour against local files and a fake HTTP host.

use assert_fs::prelude::*;
use forkwatch_core::{registry, ConfigLoadError, ProjectRegistry, SourceLocator};
use predicates::prelude::predicate;

const ONE_PROJECT: &str = "\
projects:
  - upstream: org/lib
    downstream: me/lib
    branch: main
";

const TWO_PROJECTS: &str = "\
projects:
  - upstream: org/lib
    downstream: me/lib
    branch: main
  - upstream: org/tool
    downstream: me/tool
    branch: trunk
";

fn path_locator(file: &assert_fs::fixture::ChildPath) -> SourceLocator {
    SourceLocator::Path(file.path().to_path_buf())
}

// ---------------------------------------------------------------------------
// 1. Initial load
// ---------------------------------------------------------------------------

#[test]
fn open_loads_local_file() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("repos.yaml");
    file.write_str(TWO_PROJECTS).expect("write");

    let registry = ProjectRegistry::open(path_locator(&file)).expect("open");
    assert_eq!(registry.snapshot().len(), 2);
    assert_eq!(registry.locator(), path_locator(&file));
}

#[test]
fn open_with_corrupt_file_is_a_startup_failure() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("repos.yaml");
    file.write_str("projects: [unclosed").expect("write");

    let err = ProjectRegistry::open(path_locator(&file)).unwrap_err();
    assert!(matches!(err, ConfigLoadError::Parse { .. }), "got: {err}");
}

// ---------------------------------------------------------------------------
// 2. Reload
// ---------------------------------------------------------------------------

#[test]
fn failed_reload_keeps_previous_set_and_locator() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let good = dir.child("repos.yaml");
    good.write_str(ONE_PROJECT).expect("write good");
    let bad = dir.child("broken.yaml");
    bad.write_str(": : not yaml [").expect("write bad");

    let registry = ProjectRegistry::open(path_locator(&good)).expect("open");
    let err = registry
        .reload(Some(bad.path().to_str().unwrap()))
        .unwrap_err();

    assert!(matches!(err, ConfigLoadError::Parse { .. }), "got: {err}");
    assert_eq!(registry.snapshot().len(), 1, "previous set must survive");
    assert_eq!(registry.locator(), path_locator(&good), "locator must not change");
}

#[test]
fn reload_without_locator_rereads_last_used_source() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let first = dir.child("first.yaml");
    first.write_str(ONE_PROJECT).expect("write first");
    let second = dir.child("second.yaml");
    second.write_str(ONE_PROJECT).expect("write second");

    let registry = ProjectRegistry::open(path_locator(&first)).expect("open");
    registry
        .reload(Some(second.path().to_str().unwrap()))
        .expect("switch source");

    // Only the second file changes; a bare reload must pick it up.
    second.write_str(TWO_PROJECTS).expect("rewrite second");
    let reloaded = registry.reload(None).expect("reload");

    assert_eq!(reloaded.len(), 2);
    assert_eq!(registry.locator(), path_locator(&second));
    first.assert(predicate::str::contains("org/lib"));
}

#[test]
fn reload_with_missing_file_is_io_error() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let good = dir.child("repos.yaml");
    good.write_str(ONE_PROJECT).expect("write");

    let registry = ProjectRegistry::open(path_locator(&good)).expect("open");
    let missing = dir.child("gone.yaml");
    let err = registry
        .reload(Some(missing.path().to_str().unwrap()))
        .unwrap_err();
    assert!(matches!(err, ConfigLoadError::Io { .. }), "got: {err}");
    assert!(err.to_string().contains("gone.yaml"));
}

// ---------------------------------------------------------------------------
// 3. Remote sources
// ---------------------------------------------------------------------------

#[test]
fn loads_project_list_over_http() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/repos.yaml")
        .with_status(200)
        .with_body(TWO_PROJECTS)
        .create();

    let url = format!("{}/repos.yaml", server.url());
    let set = registry::load(&SourceLocator::parse(&url).unwrap()).expect("load");

    mock.assert();
    assert_eq!(set.len(), 2);
}

#[test]
fn http_error_status_is_fetch_error() {
    let mut server = mockito::Server::new();
    server.mock("GET", "/repos.yaml").with_status(404).create();

    let url = format!("{}/repos.yaml", server.url());
    let err = registry::load(&SourceLocator::parse(&url).unwrap()).unwrap_err();
    match err {
        ConfigLoadError::Fetch { message, .. } => assert!(message.contains("404")),
        other => panic!("expected fetch error, got {other:?}"),
    }
}

#[test]
fn slow_reread_does_not_overwrite_a_newer_locator() {
    use std::io::Write;
    use std::sync::Arc;
    use std::time::Duration;

    let mut server = mockito::Server::new();
    server
        .mock("GET", "/repos.yaml")
        .with_status(200)
        .with_chunked_body(|w| {
            std::thread::sleep(Duration::from_millis(400));
            w.write_all(ONE_PROJECT.as_bytes())
        })
        .create();
    let remote = SourceLocator::parse(&format!("{}/repos.yaml", server.url())).unwrap();

    let dir = assert_fs::TempDir::new().expect("tempdir");
    let local = dir.child("repos.yaml");
    local.write_str(TWO_PROJECTS).expect("write");

    let registry = Arc::new(ProjectRegistry::with_projects(
        remote,
        forkwatch_core::ProjectSet::new(Vec::new()),
    ));

    let rereading = {
        let registry = registry.clone();
        std::thread::spawn(move || registry.reload(None))
    };
    std::thread::sleep(Duration::from_millis(100));
    let local_raw = local.path().display().to_string();
    registry.reload(Some(&local_raw)).expect("switch to local file");
    rereading.join().expect("join").expect("re-read remote");

    assert_eq!(registry.locator(), path_locator(&local));
    assert_eq!(registry.snapshot().len(), 2);
}
