use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize, de};
use tracing::level_filters::LevelFilter;

use crate::vcs::FilesystemSourceControlConfig;

/// Placeholder in [`SourceControlConfig::label_pattern`] replaced by the changelist number.
pub const CHANGELIST_PLACEHOLDER: &str = "%CHANGELISTNUMBER%";

/// Placeholder in [`SourceControlConfig::depot_root`] replaced by the branch name.
pub const BRANCH_PLACEHOLDER: &str = "%BRANCH%";

/// Controls the log format
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect (pretty for tty, simplified for other)
    Auto,
    /// With colors
    Pretty,
    /// Simplified log output
    Simplified,
    /// Dump out JSON lines
    Json,
}

/// Controls the logging system.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Logging {
    /// The log level.
    #[serde(deserialize_with = "deserialize_level_filter")]
    pub level: LevelFilter,
    /// Controls the log format.
    pub format: LogFormat,
    /// When set to true, backtraces are forced on.
    pub enable_backtraces: bool,
}

impl Default for Logging {
    fn default() -> Self {
        Logging {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
            enable_backtraces: true,
        }
    }
}

/// Control the metrics.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Metrics {
    /// host/port of statsd instance
    pub statsd: Option<String>,
    /// The prefix that should be added to all metrics.
    pub prefix: String,
    /// A map containing custom tags and their values.
    ///
    /// These tags will be appended to every metric.
    pub custom_tags: BTreeMap<String, String>,
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics {
            statsd: env::var("STATSD_SERVER").ok(),
            prefix: "symsync".into(),
            custom_tags: BTreeMap::new(),
        }
    }
}

/// Configuration of the on-disk PDB cache.
#[derive(Clone, Debug, Deserialize, Serialize, Eq, PartialEq)]
#[serde(default)]
pub struct PdbCacheConfig {
    /// Whether the cache is used at all.
    pub enabled: bool,

    /// Root directory holding one subdirectory per cached label.
    ///
    /// The cache is disabled when this is missing.
    pub path: Option<PathBuf>,

    /// The maximum size of all entries combined, in gigabytes.
    pub max_size_gb: u64,

    /// The amount of disk space that must remain free on the cache volume, in gigabytes.
    pub min_free_space_gb: u64,

    /// Entries unused for longer than this are removed on startup.
    pub max_age_days: u64,
}

impl Default for PdbCacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: None,
            max_size_gb: 128,
            min_free_space_gb: 64,
            max_age_days: 14,
        }
    }
}

/// The backend used to talk to source control.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceControlBackendConfig {
    Filesystem(FilesystemSourceControlConfig),
}

/// A label known ahead of time, consulted before querying source control.
#[derive(Clone, Debug, Deserialize, Serialize, Eq, PartialEq)]
pub struct KnownLabel {
    #[serde(default)]
    pub changelist: Option<u32>,
    #[serde(default)]
    pub engine_version: Option<u32>,
    pub label: String,
}

/// A distribution layout in which module binaries and symbols may be found.
///
/// Both directories are relative to the depot root. An empty string is the depot root itself.
#[derive(Clone, Debug, Deserialize, Serialize, Eq, PartialEq)]
pub struct ModuleLayout {
    pub binaries: String,
    pub symbols: String,
}

impl ModuleLayout {
    fn new(binaries: &str, symbols: &str) -> Self {
        Self {
            binaries: binaries.into(),
            symbols: symbols.into(),
        }
    }
}

/// Everything needed to resolve labels and sync artifacts from source control.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct SourceControlConfig {
    /// The source control backend. Syncing is unavailable without one.
    pub backend: Option<SourceControlBackendConfig>,

    /// Depot path of the branch, may contain `%BRANCH%`.
    pub depot_root: String,

    /// Substituted for `%BRANCH%` in the depot root.
    pub branch: String,

    /// Name of the build label for a changelist, containing `%CHANGELISTNUMBER%`.
    pub label_pattern: Option<String>,

    /// Local directory that artifacts synced by label are staged in.
    ///
    /// Syncing is disabled when this is missing.
    pub local_symbol_store: Option<PathBuf>,

    /// Labels looked up before querying source control.
    pub known_labels: Vec<KnownLabel>,

    /// Install roots below the depot root that carry a `Binaries/<platform>` directory.
    pub install_roots: Vec<String>,

    /// Layouts probed for every module of a crash.
    pub module_layouts: Vec<ModuleLayout>,

    /// Labels containing this marker are skipped when syncing modules.
    pub excluded_label_marker: Option<String>,
}

impl Default for SourceControlConfig {
    fn default() -> Self {
        Self {
            backend: None,
            depot_root: format!("//depot/{BRANCH_PLACEHOLDER}"),
            branch: "UE4".into(),
            label_pattern: None,
            local_symbol_store: None,
            known_labels: Vec::new(),
            install_roots: vec!["Engine".into(), "...Game".into()],
            module_layouts: vec![
                ModuleLayout::new("", ""),
                ModuleLayout::new("Rocket/Installed/Windows", "Rocket/Symbols"),
                ModuleLayout::new(
                    "Rocket/LauncherInstalled/Windows/Launcher",
                    "Rocket/LauncherSymbols/Windows/Launcher",
                ),
            ],
            excluded_label_marker: Some("Mac".into()),
        }
    }
}

impl SourceControlConfig {
    /// Returns the depot root with the branch substituted, without a trailing slash.
    ///
    /// Backslashes are accepted in place of forward slashes.
    pub fn depot_root(&self) -> String {
        self.depot_root
            .replace(BRANCH_PLACEHOLDER, &self.branch)
            .replace('\\', "/")
            .trim_end_matches('/')
            .to_owned()
    }
}

/// The configuration of all components.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration for internal logging.
    pub logging: Logging,

    /// Configuration for reporting metrics to a statsd instance.
    pub metrics: Metrics,

    /// DSN to report internal errors to
    pub sentry_dsn: Option<String>,

    /// The PDB cache.
    pub pdb_cache: PdbCacheConfig,

    /// Label resolution and artifact syncing.
    pub source_control: SourceControlConfig,
}

impl Config {
    pub fn get(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_reader(
                fs::File::open(path).context("failed to open configuration file")?,
            ),
            None => Ok(Config::default()),
        }
    }

    fn from_reader(mut reader: impl std::io::Read) -> Result<Self> {
        let mut config = String::new();
        reader
            .read_to_string(&mut config)
            .context("failed reading config file")?;
        // check for empty files explicitly
        if config.trim().is_empty() {
            anyhow::bail!("config file empty");
        }
        serde_yaml::from_str(&config).context("failed to parse config YAML")
    }
}

#[derive(Debug)]
struct LevelFilterVisitor;

impl de::Visitor<'_> for LevelFilterVisitor {
    type Value = LevelFilter;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> std::fmt::Result {
        write!(
            formatter,
            r#"one of the strings "off", "error", "warn", "info", "debug", or "trace""#
        )
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        match v {
            "off" => Ok(LevelFilter::OFF),
            "error" => Ok(LevelFilter::ERROR),
            "warn" => Ok(LevelFilter::WARN),
            "info" => Ok(LevelFilter::INFO),
            "debug" => Ok(LevelFilter::DEBUG),
            "trace" => Ok(LevelFilter::TRACE),
            _ => Err(de::Error::unknown_variant(
                v,
                &["off", "error", "warn", "info", "debug", "trace"],
            )),
        }
    }
}

fn deserialize_level_filter<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<LevelFilter, D::Error> {
    deserializer.deserialize_str(LevelFilterVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdb_cache_config() {
        let cfg = Config::get(None).unwrap();
        assert!(!cfg.pdb_cache.enabled);
        assert_eq!(cfg.pdb_cache, PdbCacheConfig::default());

        let yaml = r#"
            pdb_cache:
              enabled: true
              path: /var/cache/pdb
              max_age_days: 3
        "#;
        let cfg = Config::from_reader(yaml.as_bytes()).unwrap();
        assert!(cfg.pdb_cache.enabled);
        assert_eq!(cfg.pdb_cache.path, Some(PathBuf::from("/var/cache/pdb")));
        assert_eq!(cfg.pdb_cache.max_age_days, 3);
        // unspecified values keep their defaults
        assert_eq!(cfg.pdb_cache.max_size_gb, 128);
        assert_eq!(cfg.pdb_cache.min_free_space_gb, 64);
    }

    #[test]
    fn test_source_control_config() {
        let yaml = r#"
            source_control:
              backend:
                type: filesystem
                path: /srv/depot
                client_root: /tmp/client
              depot_root: '\\depot\%BRANCH%\'
              branch: UE4-Releases/4.2
              label_pattern: UE4_CL-%CHANGELISTNUMBER%
              known_labels:
                - changelist: 42
                  label: UE4_Special
        "#;
        let cfg = Config::from_reader(yaml.as_bytes()).unwrap();
        let sc = &cfg.source_control;
        assert_eq!(sc.depot_root(), "//depot/UE4-Releases/4.2");
        assert_eq!(sc.label_pattern.as_deref(), Some("UE4_CL-%CHANGELISTNUMBER%"));
        assert_eq!(sc.known_labels[0].changelist, Some(42));
        assert_eq!(sc.known_labels[0].engine_version, None);
        assert!(matches!(
            sc.backend,
            Some(SourceControlBackendConfig::Filesystem(ref fs)) if fs.path == Path::new("/srv/depot")
        ));
        // defaults survive partial configuration
        assert_eq!(sc.install_roots, vec!["Engine", "...Game"]);
        assert_eq!(sc.module_layouts.len(), 3);
        assert_eq!(sc.excluded_label_marker.as_deref(), Some("Mac"));
    }

    #[test]
    fn test_default_depot_root() {
        let sc = SourceControlConfig::default();
        assert_eq!(sc.depot_root(), "//depot/UE4");
    }

    #[test]
    fn test_log_level() {
        let yaml = r#"
            logging:
              level: debug
              format: json
        "#;
        let cfg = Config::from_reader(yaml.as_bytes()).unwrap();
        assert_eq!(cfg.logging.level, LevelFilter::DEBUG);
        assert_eq!(cfg.logging.format, LogFormat::Json);

        let yaml = r#"
            logging:
              level: loud
        "#;
        assert!(Config::from_reader(yaml.as_bytes()).is_err());
    }

    #[test]
    fn test_unknown_fields() {
        // Unknown fields should not cause failure
        let yaml = r#"
            pdb_cache:
              not_an_option: 1
        "#;
        let cfg = Config::from_reader(yaml.as_bytes());
        assert!(cfg.is_ok());
    }

    #[test]
    fn test_empty_file() {
        // Empty files aren't supported
        let yaml = r#""#;
        let result = Config::from_reader(yaml.as_bytes());
        assert!(result.is_err());
    }
}
