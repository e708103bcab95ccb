//! Integration tests for the filesystem registry: metadata visibility,
//! stale-session reaping, and externally coordinated cleanup.

#![cfg(unix)]

use std::path::Path;
use std::time::Duration;

use holdpty::config::Config;
use holdpty::holder::{Holder, StartOptions};
use holdpty::registry;

fn test_config(dir: &Path, linger: Duration) -> Config {
    Config {
        session_dir: Some(dir.to_path_buf()),
        linger,
        ..Config::default()
    }
}

fn sh(script: &str) -> Vec<String> {
    vec!["/bin/sh".to_string(), "-c".to_string(), script.to_string()]
}

#[tokio::test]
async fn started_session_is_visible_and_reachable() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), Duration::from_millis(50));
    let holder = Holder::start(
        StartOptions {
            name: Some("visible".to_string()),
            ..StartOptions::new(sh("sleep 10"))
        },
        &config,
    )
    .await
    .unwrap();

    // Start returned, so enumeration must already see a live, connectable
    // session.
    let entries = registry::list_sessions(dir.path()).await.unwrap();
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.name, "visible");
    assert!(entry.endpoint_reachable, "endpoint should accept the probe");
    assert_eq!(entry.meta.pid, std::process::id());
    assert_eq!(entry.meta.command, sh("sleep 10"));

    registry::stop(&entry.meta).unwrap();
    holder.shutdown_complete().await;
}

#[tokio::test]
async fn stopped_session_disappears_from_enumeration() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), Duration::from_millis(200));
    let holder = Holder::start(
        StartOptions {
            name: Some("doomed".to_string()),
            ..StartOptions::new(sh("sleep 30"))
        },
        &config,
    )
    .await
    .unwrap();

    let entries = registry::list_sessions(dir.path()).await.unwrap();
    assert_eq!(entries.len(), 1);

    // Terminate the child externally; the holder's drain + 200 ms linger
    // should clear the registry well within a second.
    registry::stop(&entries[0].meta).unwrap();

    let mut empty = false;
    for _ in 0..20 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if registry::list_sessions(dir.path()).await.unwrap().is_empty() {
            empty = true;
            break;
        }
    }
    assert!(empty, "registry should empty out after the child is stopped");
    holder.shutdown_complete().await;
}

#[tokio::test]
async fn remove_session_deletes_both_files() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), Duration::from_millis(50));
    let holder = Holder::start(
        StartOptions {
            name: Some("swept".to_string()),
            ..StartOptions::new(sh("sleep 10"))
        },
        &config,
    )
    .await
    .unwrap();
    let meta = registry::read_meta(dir.path(), "swept").unwrap();

    registry::remove_session(dir.path(), "swept");
    assert!(!registry::meta_path(dir.path(), "swept").exists());
    assert!(!registry::endpoint_path(dir.path(), "swept").exists());

    registry::stop(&meta).unwrap();
    holder.shutdown_complete().await;
}

#[tokio::test]
async fn enumeration_ignores_foreign_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"not a session").unwrap();
    std::fs::write(dir.path().join("broken.json"), b"{\"name\":").unwrap();

    let entries = registry::list_sessions(dir.path()).await.unwrap();
    assert!(entries.is_empty());
    // The unparsable record is skipped, never reaped.
    assert!(dir.path().join("broken.json").exists());
    assert!(dir.path().join("notes.txt").exists());
}

#[tokio::test]
async fn two_sessions_enumerate_independently() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), Duration::from_millis(50));
    let first = Holder::start(
        StartOptions {
            name: Some("alpha".to_string()),
            ..StartOptions::new(sh("sleep 10"))
        },
        &config,
    )
    .await
    .unwrap();
    let second = Holder::start(
        StartOptions {
            name: Some("beta".to_string()),
            ..StartOptions::new(sh("sleep 10"))
        },
        &config,
    )
    .await
    .unwrap();

    let mut names: Vec<String> = registry::list_sessions(dir.path())
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["alpha", "beta"]);

    for holder in [&first, &second] {
        let meta = registry::read_meta(dir.path(), holder.name()).unwrap();
        registry::stop(&meta).unwrap();
    }
    first.shutdown_complete().await;
    second.shutdown_complete().await;
}
