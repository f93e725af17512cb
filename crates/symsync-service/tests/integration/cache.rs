use std::collections::BTreeSet;
use std::fs;

use symsync_service::caching::MARKER_FILE;
use symsync_service::config::Config;
use symsync_service::facade::SyncOutcome;
use symsync_service::types::SyncRequest;
use symsync_test::{self as test, days};

use crate::{WIN64_BUILD, add_label, config, setup_facade};

#[test]
fn test_entries_survive_restart() {
    let tempdir = test::tempdir();
    add_label(tempdir.path(), "UE4_CL-1", WIN64_BUILD);
    let config = config(tempdir.path());
    let request = SyncRequest::for_label("UE4_CL-1", "Win64");

    let fresh = {
        let facade = setup_facade(&config);
        facade.sync(&request).unwrap()
    };
    assert!(matches!(fresh, SyncOutcome::Fresh(_)));
    assert_eq!(fresh.files().len(), 4);

    let facade = setup_facade(&config);
    let cached = facade.sync(&request).unwrap();

    assert!(cached.is_cached());
    let fresh_files: BTreeSet<_> = fresh.files().iter().collect();
    let cached_files: BTreeSet<_> = cached.files().iter().collect();
    assert_eq!(fresh_files, cached_files);
}

#[test]
fn test_expired_entry_synced_again() {
    let tempdir = test::tempdir();
    add_label(tempdir.path(), "UE4_CL-1", WIN64_BUILD);
    let config = config(tempdir.path());
    let request = SyncRequest::for_label("UE4_CL-1", "Win64");

    let fresh = setup_facade(&config).sync(&request).unwrap();
    let SyncOutcome::Fresh(entry) = &fresh else {
        panic!("expected a fresh entry, got {fresh:?}");
    };
    test::set_age(entry.marker_path(), days(20));

    let facade = setup_facade(&config);
    assert!(facade.cache().is_empty());
    let outcome = facade.sync(&request).unwrap();

    assert!(matches!(outcome, SyncOutcome::Fresh(_)));
}

#[test]
fn test_recreated_entry_is_identical() {
    let tempdir = test::tempdir();
    add_label(tempdir.path(), "UE4_CL-1", WIN64_BUILD);
    let config = config(tempdir.path());
    let facade = setup_facade(&config);

    let first = facade.sync(&SyncRequest::for_label("UE4_CL-1", "Win64")).unwrap();
    let removed = facade.cache().remove("UE4_CL-1").unwrap();
    assert!(!removed.directory().exists());
    let second = facade.sync(&SyncRequest::for_label("UE4_CL-1", "Win64")).unwrap();

    let SyncOutcome::Fresh(second_entry) = &second else {
        panic!("expected a fresh entry, got {second:?}");
    };
    assert_eq!(first.files(), second.files());
    assert_eq!(removed.size_gb(), second_entry.size_gb());
}

#[test]
fn test_cleanup_on_startup() {
    let tempdir = test::tempdir();
    let cache = tempdir.path().join("cache");
    for (label, age) in [("stale", days(30)), ("recent", days(1))] {
        test::write_file(cache.join(label).join("Engine/Game.pdb"), b"pdb");
        let marker = test::write_file(cache.join(label).join(MARKER_FILE), b"");
        test::set_age(marker, age);
    }

    let facade = setup_facade(&config(tempdir.path()));

    let cache_store = facade.cache();
    let labels: Vec<_> = cache_store.entries().map(|entry| entry.label()).collect();
    assert_eq!(labels, ["recent"]);
    assert!(!cache.join("stale").exists());
}

#[test]
fn test_config_file() {
    let tempdir = test::tempdir();
    add_label(tempdir.path(), "Rocket-CL-2082666", WIN64_BUILD);

    let yaml = format!(
        r#"
pdb_cache:
  enabled: true
  path: {root}/cache
  min_free_space_gb: 0
source_control:
  backend:
    type: filesystem
    path: {root}/server
    client_root: {root}/client
  depot_root: '//depot/%BRANCH%/'
  label_pattern: Rocket-CL-%CHANGELISTNUMBER%
  local_symbol_store: {root}/store
"#,
        root = tempdir.path().display()
    );
    let config_path = test::write_file(tempdir.path().join("config.yml"), yaml.as_bytes());
    let config = Config::get(Some(config_path.as_path())).unwrap();

    let facade = setup_facade(&config);
    let outcome = facade.sync_from_changelist(2082666, "Win64").unwrap();

    let directory = tempdir.path().join("cache/Rocket-CL-2082666");
    assert_eq!(outcome.root(), directory);
    assert_eq!(
        fs::read(directory.join("Engine/Binaries/Win64/UE4Editor-Core.pdb")).unwrap(),
        b"Rocket-CL-2082666"
    );
}
