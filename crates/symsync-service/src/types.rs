//! Types describing what to sync for a crash.

use serde::{Deserialize, Deserializer, Serialize};

/// The build information of a crash, as reported by the crash collector.
///
/// Identifiers reported as negative numbers are treated as missing.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct CrashInfo {
    /// The build label, if known already.
    pub label_name: Option<String>,
    #[serde(deserialize_with = "deserialize_id")]
    pub engine_version: Option<u32>,
    #[serde(deserialize_with = "deserialize_id")]
    pub changelist: Option<u32>,
    /// The platform directory below `Binaries`, e.g. `Win64`.
    pub platform: String,
    /// Modules loaded at the time of the crash, relative to the depot root.
    pub module_names: Vec<String>,
    pub source_file: Option<String>,
    pub source_line: Option<u32>,
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let id = Option::<i64>::deserialize(deserializer)?;
    Ok(id.and_then(|id| u32::try_from(id).ok()))
}

/// A request to make the artifacts of one build available locally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncRequest {
    /// The label to sync. Resolved from the identifiers below if missing.
    pub label: Option<String>,
    pub engine_version: Option<u32>,
    pub changelist: Option<u32>,
    pub platform: String,
    /// Sync only these modules instead of all binaries of the platform.
    pub modules: Vec<String>,
}

impl SyncRequest {
    pub fn for_label(label: impl Into<String>, platform: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            platform: platform.into(),
            ..Default::default()
        }
    }

    pub fn for_changelist(changelist: u32, platform: impl Into<String>) -> Self {
        Self {
            changelist: Some(changelist),
            platform: platform.into(),
            ..Default::default()
        }
    }
}

impl From<&CrashInfo> for SyncRequest {
    fn from(crash: &CrashInfo) -> Self {
        Self {
            label: crash.label_name.clone().filter(|label| !label.is_empty()),
            engine_version: crash.engine_version,
            changelist: crash.changelist,
            platform: crash.platform.clone(),
            modules: crash.module_names.clone(),
        }
    }
}
