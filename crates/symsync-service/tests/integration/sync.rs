use std::fs;

use symsync_service::facade::SyncOutcome;
use symsync_service::sync::SyncError;
use symsync_service::types::{CrashInfo, SyncRequest};
use symsync_test::{self as test};

use crate::{WIN64_BUILD, add_label, config, setup_facade};

#[test]
fn test_sync_crash_report() {
    let tempdir = test::tempdir();
    add_label(tempdir.path(), "UE4_CL-2082666", WIN64_BUILD);
    let facade = setup_facade(&config(tempdir.path()));

    let crash: CrashInfo = serde_json::from_str(
        r#"{
            "engine_version": -1,
            "changelist": 2082666,
            "platform": "Win64",
            "module_names": ["ShooterGame\\Binaries\\Win64\\ShooterGame.exe"]
        }"#,
    )
    .unwrap();
    let outcome = facade.sync_crash(&crash).unwrap();

    let directory = tempdir.path().join("cache/UE4_CL-2082666");
    assert_eq!(
        outcome.files(),
        [
            directory.join("ShooterGame/Binaries/Win64/ShooterGame.exe"),
            directory.join("ShooterGame/Binaries/Win64/ShooterGame.pdb"),
        ]
    );
}

#[test]
fn test_first_label_wins() {
    let tempdir = test::tempdir();
    add_label(tempdir.path(), "UE4_CL-1-Release", WIN64_BUILD);
    add_label(tempdir.path(), "UE4_CL-1-Debug", WIN64_BUILD);
    let mut config = config(tempdir.path());
    config.source_control.label_pattern = Some("UE4_CL-%CHANGELISTNUMBER%-*".into());
    let facade = setup_facade(&config);

    let outcome = facade.sync_from_changelist(1, "Win64").unwrap();

    let SyncOutcome::Fresh(entry) = &outcome else {
        panic!("expected a fresh entry, got {outcome:?}");
    };
    assert_eq!(entry.label(), "UE4_CL-1-Debug");
    assert_eq!(fs::read(&entry.files()[0]).unwrap(), b"UE4_CL-1-Debug");
}

#[test]
fn test_missing_label_creates_no_entry() {
    let tempdir = test::tempdir();
    add_label(tempdir.path(), "UE4_CL-1", WIN64_BUILD);
    let facade = setup_facade(&config(tempdir.path()));

    let result = facade.sync(&SyncRequest::for_label("UE4_CL-2", "Win64"));

    assert!(matches!(result, Err(SyncError::LabelNotFound(_))));
    assert!(facade.cache().is_empty());
}

#[test]
fn test_sync_without_source_control() {
    let tempdir = test::tempdir();
    let facade = setup_facade(&config(tempdir.path()));

    let result = facade.sync_from_changelist(1, "Win64");

    assert!(matches!(result, Err(SyncError::Unavailable)));
}

#[test]
fn test_sync_source_file() {
    let tempdir = test::tempdir();
    add_label(tempdir.path(), "UE4_CL-1", WIN64_BUILD);
    let facade = setup_facade(&config(tempdir.path()));

    let local = facade
        .sync_source_file("UE4_CL-1", r"Engine\Source\Runtime\Core\Private\Core.cpp")
        .unwrap();

    assert_eq!(fs::read(local).unwrap(), b"UE4_CL-1");
}
