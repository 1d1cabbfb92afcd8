//! Configuration file support for coachgrid.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/coachgrid/config.toml`.

use crate::auth::Role;
use crate::types::{Locale, OrganizationContext};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub identity: IdentityConfig,

    #[serde(default)]
    pub programs: ProgramsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Who the command line acts as
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default = "default_organization_id")]
    pub organization_id: String,

    #[serde(default = "default_user_id")]
    pub user_id: String,

    #[serde(default = "default_role")]
    pub role: Role,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            organization_id: default_organization_id(),
            user_id: default_user_id(),
            role: default_role(),
        }
    }
}

/// Program defaults
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct ProgramsConfig {
    /// Language of generated week/session names
    #[serde(default)]
    pub locale: Locale,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".local/share")
    });
    base.join("coachgrid")
}

fn default_organization_id() -> String {
    "local".into()
}

fn default_user_id() -> String {
    "coach".into()
}

fn default_role() -> Role {
    Role::Owner
}

fn default_log_level() -> String {
    "warn".into()
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config")
        });
        base.join("coachgrid").join("config.toml")
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.identity.organization_id.trim().is_empty() {
            return Err(Error::Config("identity.organization_id is empty".into()));
        }
        if self.identity.user_id.trim().is_empty() {
            return Err(Error::Config("identity.user_id is empty".into()));
        }
        Ok(())
    }

    /// Context every command runs under
    pub fn context(&self) -> OrganizationContext {
        OrganizationContext::new(
            self.identity.organization_id.trim(),
            self.identity.user_id.trim(),
            self.identity.role,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.data.data_dir.ends_with("coachgrid"));
        assert_eq!(config.identity.role, Role::Owner);
        assert_eq!(config.programs.locale, Locale::En);
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.data.data_dir, parsed.data.data_dir);
        assert_eq!(
            config.identity.organization_id,
            parsed.identity.organization_id
        );
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
[identity]
organization_id = "gym-42"
role = "member"

[programs]
locale = "es"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.identity.organization_id, "gym-42");
        assert_eq!(config.identity.user_id, "coach"); // default
        assert_eq!(config.identity.role, Role::Member);
        assert_eq!(config.programs.locale, Locale::Es);

        let ctx = config.context();
        assert_eq!(ctx.organization_id.as_str(), "gym-42");
    }

    #[test]
    fn test_load_from_rejects_blank_identity() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[identity]\norganization_id = \" \"\n").unwrap();

        assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.identity.user_id = "head-coach".into();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.identity.user_id, "head-coach");
    }
}
