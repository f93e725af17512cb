use std::path::Path;

use symsync_service::config::{
    Config, PdbCacheConfig, SourceControlBackendConfig, SourceControlConfig,
};
use symsync_service::facade::CrashSyncFacade;
use symsync_service::vcs::{FilesystemSourceControlConfig, create_source_control};
use symsync_test::{self as test};

/// Depot paths of a typical Windows build.
pub const WIN64_BUILD: &[&str] = &[
    "//depot/UE4/Engine/Binaries/Win64/UE4Editor-Core.dll",
    "//depot/UE4/Engine/Binaries/Win64/UE4Editor-Core.pdb",
    "//depot/UE4/ShooterGame/Binaries/Win64/ShooterGame.exe",
    "//depot/UE4/ShooterGame/Binaries/Win64/ShooterGame.pdb",
    "//depot/UE4/Engine/Binaries/Linux/libUE4Editor-Core.so",
    "//depot/UE4/Engine/Source/Runtime/Core/Private/Core.cpp",
];

/// Adds `files` as the contents of `label` to the source control server below `dir`.
pub fn add_label(dir: &Path, label: &str, files: &[&str]) {
    for depot_path in files {
        test::depot_file(&dir.join("server"), label, depot_path, label.as_bytes());
    }
}

/// The configuration of a cache and filesystem source control below `dir`.
pub fn config(dir: &Path) -> Config {
    Config {
        pdb_cache: PdbCacheConfig {
            enabled: true,
            path: Some(dir.join("cache")),
            min_free_space_gb: 0,
            ..Default::default()
        },
        source_control: SourceControlConfig {
            backend: Some(SourceControlBackendConfig::Filesystem(
                FilesystemSourceControlConfig {
                    path: dir.join("server"),
                    client_root: dir.join("client"),
                },
            )),
            label_pattern: Some("UE4_CL-%CHANGELISTNUMBER%".into()),
            local_symbol_store: Some(dir.join("store")),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Creates a facade the way the command line does.
///
/// Every call initializes the cache anew, which simulates a restart.
pub fn setup_facade(config: &Config) -> CrashSyncFacade {
    test::setup();

    let backend = config
        .source_control
        .backend
        .as_ref()
        .expect("test config has a source control backend");
    CrashSyncFacade::new(config, create_source_control(backend))
}
