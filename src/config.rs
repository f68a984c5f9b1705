// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use serde::Serialize;

use crate::capacity::CapacityManager;
use crate::capacity::DEFAULT_PAGE_SIZE;
use crate::mutator::DisablePolicy;
use crate::Result;

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

/// Tunables of the composer, usually read from a JSON file.
///
/// ```json
/// { "page-size": 4096, "disable-policy": "rewrite" }
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ComposerConfig {
    /// Granularity `enlarge` grows blobs by. Must be a power of two.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// How nodes that already carry a `status` are disabled.
    #[serde(default)]
    pub disable_policy: DisablePolicy,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        ComposerConfig {
            page_size: DEFAULT_PAGE_SIZE,
            disable_policy: DisablePolicy::default(),
        }
    }
}

impl ComposerConfig {
    pub fn from_json_str(json: &str) -> anyhow::Result<ComposerConfig> {
        let config: ComposerConfig =
            serde_json::from_str(json).context("failed to parse composer config")?;
        config.validate().context("invalid composer config")?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<ComposerConfig> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("failed to read composer config {}", path.display()))?;
        ComposerConfig::from_json_str(&json)
            .with_context(|| format!("failed to load composer config {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        self.capacity_manager().map(|_| ())
    }

    pub fn capacity_manager(&self) -> Result<CapacityManager> {
        CapacityManager::new(self.page_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn defaults() {
        let config = ComposerConfig::from_json_str("{}").unwrap();
        assert_eq!(config, ComposerConfig::default());
        assert_eq!(config.page_size, 4096);
        assert_eq!(config.disable_policy, DisablePolicy::InPlaceSentinel);
    }

    #[test]
    fn parse() {
        let config = ComposerConfig::from_json_str(
            r#"{ "page-size": 65536, "disable-policy": "rewrite" }"#,
        )
        .unwrap();
        assert_eq!(config.page_size, 0x10000);
        assert_eq!(config.disable_policy, DisablePolicy::Rewrite);
        assert_eq!(config.capacity_manager().unwrap().page_size(), 0x10000);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(ComposerConfig::from_json_str(r#"{ "page_size": 4096 }"#).is_err());
        assert!(ComposerConfig::from_json_str(r#"{ "disable-policy": "delete" }"#).is_err());
        assert!(ComposerConfig::from_json_str(r#"{ "page-size": 1000 }"#).is_err());
        assert!(ComposerConfig::from_json_str("[").is_err());

        let config = ComposerConfig {
            page_size: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(Error::InvalidPageSize(0)));
    }

    #[test]
    fn serialize_round_trip() {
        let config = ComposerConfig {
            page_size: 0x2000,
            disable_policy: DisablePolicy::Rewrite,
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"page-size\":8192"));
        assert_eq!(ComposerConfig::from_json_str(&json).unwrap(), config);
    }
}
