//! `iovirt.toml` platform configuration.
//!
//! ```toml
//! [source]
//! prefer = "auto"
//!
//! [override]
//! smmu-base = 0x2b400000
//! smmu-arch-major-rev = 3
//! ```

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use iovirt_core::SmmuRevision;

use crate::error::ConfigError;

/// The whole configuration file. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PlatformConfig {
    #[serde(default)]
    pub source: SourceConfig,
    /// Static single-SMMU description used instead of any firmware source.
    #[serde(default, rename = "override")]
    pub smmu_override: OverrideConfig,
}

/// `[source]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SourceConfig {
    #[serde(default)]
    pub prefer: SourcePreference,
}

/// Which firmware source to decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourcePreference {
    /// The IORT image when present, otherwise the device tree.
    #[default]
    Auto,
    Iort,
    DeviceTree,
}

impl fmt::Display for SourcePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourcePreference::Auto => write!(f, "auto"),
            SourcePreference::Iort => write!(f, "iort"),
            SourcePreference::DeviceTree => write!(f, "device-tree"),
        }
    }
}

/// `[override]` section. A zero base disables the override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct OverrideConfig {
    #[serde(default)]
    pub smmu_base: u64,
    #[serde(default = "default_arch_major_rev")]
    pub smmu_arch_major_rev: u8,
}

fn default_arch_major_rev() -> u8 {
    3
}

impl Default for OverrideConfig {
    fn default() -> Self {
        Self {
            smmu_base: 0,
            smmu_arch_major_rev: default_arch_major_rev(),
        }
    }
}

impl OverrideConfig {
    pub fn is_enabled(&self) -> bool {
        self.smmu_base != 0
    }

    /// The override SMMU, if the override is enabled.
    pub fn smmu(&self) -> Result<Option<(u64, SmmuRevision)>, ConfigError> {
        if !self.is_enabled() {
            return Ok(None);
        }
        let revision = SmmuRevision::from_major(self.smmu_arch_major_rev).ok_or_else(|| {
            ConfigError::Validation {
                detail: format!(
                    "override smmu-arch-major-rev must be 2 or 3, got {}",
                    self.smmu_arch_major_rev
                ),
            }
        })?;
        Ok(Some((self.smmu_base, revision)))
    }
}

impl PlatformConfig {
    /// Parse and validate a configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: PlatformConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.smmu_override.smmu().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = PlatformConfig::from_toml_str("").unwrap();
        assert_eq!(config, PlatformConfig::default());
        assert_eq!(config.source.prefer, SourcePreference::Auto);
        assert!(!config.smmu_override.is_enabled());
        assert_eq!(config.smmu_override.smmu().unwrap(), None);
    }

    #[test]
    fn parses_kebab_case_keys() {
        let config = PlatformConfig::from_toml_str(
            r#"
[source]
prefer = "device-tree"

[override]
smmu-base = 0x2b400000
smmu-arch-major-rev = 2
"#,
        )
        .unwrap();
        assert_eq!(config.source.prefer, SourcePreference::DeviceTree);
        assert_eq!(
            config.smmu_override.smmu().unwrap(),
            Some((0x2b40_0000, SmmuRevision::V2))
        );
    }

    #[test]
    fn override_revision_must_be_known() {
        let err = PlatformConfig::from_toml_str(
            r#"
[override]
smmu-base = 0x1000
smmu-arch-major-rev = 4
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
        assert!(err.to_string().contains("got 4"));
    }

    #[test]
    fn disabled_override_ignores_revision() {
        let config = PlatformConfig::from_toml_str(
            r#"
[override]
smmu-arch-major-rev = 7
"#,
        )
        .unwrap();
        assert_eq!(config.smmu_override.smmu().unwrap(), None);
    }

    #[test]
    fn unknown_preference_is_rejected() {
        let err = PlatformConfig::from_toml_str("[source]\nprefer = \"acpi\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = PlatformConfig::from_toml_str("[source]\nprefered = \"iort\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("iovirt.toml");
        let err = PlatformConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));

        std::fs::write(&path, "[source]\nprefer = \"iort\"\n").unwrap();
        let config = PlatformConfig::load(&path).unwrap();
        assert_eq!(config.source.prefer, SourcePreference::Iort);
    }

    #[test]
    fn preference_display_matches_file_spelling() {
        assert_eq!(SourcePreference::DeviceTree.to_string(), "device-tree");
        assert_eq!(SourcePreference::Auto.to_string(), "auto");
    }
}
