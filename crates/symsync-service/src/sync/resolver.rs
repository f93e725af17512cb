use std::sync::Arc;

use crate::config::{CHANGELIST_PLACEHOLDER, KnownLabel, SourceControlConfig};
use crate::vcs::SourceControl;

/// Maps changelists and engine versions to build labels.
#[derive(Debug, Clone)]
pub struct LabelResolver {
    config: Arc<SourceControlConfig>,
    source_control: Arc<dyn SourceControl>,
}

impl LabelResolver {
    pub fn new(config: Arc<SourceControlConfig>, source_control: Arc<dyn SourceControl>) -> Self {
        Self {
            config,
            source_control,
        }
    }

    /// Resolves the label of the build with the given engine version or changelist.
    ///
    /// The configured known labels are consulted first. Otherwise the changelist is substituted
    /// into the label pattern and source control is queried for that name. When several labels
    /// match, the first one wins.
    ///
    /// Returns `None` and logs the reason if no label can be found. Without either identifier,
    /// source control is not queried at all.
    pub fn resolve(&self, engine_version: Option<u32>, changelist: Option<u32>) -> Option<String> {
        if engine_version.is_none() && changelist.is_none() {
            tracing::warn!("Cannot resolve a build label without engine version or changelist");
            return None;
        }

        if let Some(known) = self.known_label(engine_version, changelist) {
            tracing::debug!("Using known label `{}`", known.label);
            return Some(known.label.clone());
        }

        let Some(changelist) = changelist else {
            tracing::warn!(
                "No label known for engine version {}",
                engine_version.unwrap_or_default()
            );
            return None;
        };

        let Some(pattern) = &self.config.label_pattern else {
            tracing::warn!("No label pattern configured, cannot resolve changelist {changelist}");
            return None;
        };
        if !pattern.contains(CHANGELIST_PLACEHOLDER) {
            tracing::warn!("Label pattern `{pattern}` lacks {CHANGELIST_PLACEHOLDER}");
            return None;
        }

        let name = pattern.replace(CHANGELIST_PLACEHOLDER, &changelist.to_string());
        let labels = match self.source_control.labels(&name) {
            Ok(labels) => labels,
            Err(err) => {
                tracing::error!(
                    error = &err as &dyn std::error::Error,
                    "Failed to query labels named `{}`",
                    name
                );
                return None;
            }
        };

        match labels.as_slice() {
            [] => {
                tracing::warn!("No label matches `{}`", name);
                None
            }
            [label] => Some(label.name().to_owned()),
            [first, ..] => {
                tracing::warn!(
                    "{} labels match `{}`, using `{}`",
                    labels.len(),
                    name,
                    first.name()
                );
                Some(first.name().to_owned())
            }
        }
    }

    /// Finds a known label, preferring a match on the changelist.
    fn known_label(
        &self,
        engine_version: Option<u32>,
        changelist: Option<u32>,
    ) -> Option<&KnownLabel> {
        let known = &self.config.known_labels;
        changelist
            .and_then(|cl| known.iter().find(|k| k.changelist == Some(cl)))
            .or_else(|| {
                engine_version.and_then(|ev| known.iter().find(|k| k.engine_version == Some(ev)))
            })
    }
}
