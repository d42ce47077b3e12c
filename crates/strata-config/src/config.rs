use std::{
    fs,
    path::PathBuf,
    sync::{LazyLock, RwLock},
};

use documented::{Documented, DocumentedFields};
use serde::{Deserialize, Serialize};
use strata_utils::path::{resolve_path, xdg_config_home, xdg_data_home};
use toml_edit::DocumentMut;
use tracing::{debug, info};

use crate::{
    annotations::annotate_toml_table,
    error::{ConfigError, Result},
};

pub const DEFAULT_MINIMUM_OBSERVATION_COUNT: u32 = 3;

/// Query specialization engine configuration
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, Documented, DocumentedFields)]
pub struct Config {
    /// Degrade every specialization failure to the unspecialized procedure.
    /// When false, failures are returned to the caller as typed errors.
    /// Default: true
    pub ignore_errors: Option<bool>,

    /// Consistent calls required before a procedure is compiled. Must be at least 2.
    /// Default: 3
    pub minimum_observation_count: Option<u32>,

    /// Tie persisted state to a checksum of the owner's source, so editing the
    /// source discards observations and compiled artifacts.
    /// Default: true
    pub checksum_guard: Option<bool>,

    /// SQLite database holding observation snapshots.
    /// Default: $XDG_DATA_HOME/strata/state.db
    pub state_path: Option<String>,

    /// Directory holding generated specialization artifacts.
    /// Default: $XDG_DATA_HOME/strata/artifacts
    pub artifact_path: Option<String>,
}

pub static CONFIG_PATH: LazyLock<RwLock<PathBuf>> = LazyLock::new(|| {
    RwLock::new(match std::env::var("STRATA_CONFIG") {
        Ok(path_str) => PathBuf::from(path_str),
        Err(_) => xdg_config_home().join("strata").join("config.toml"),
    })
});

fn config_path() -> PathBuf {
    CONFIG_PATH
        .read()
        .map(|path| path.to_path_buf())
        .unwrap_or_else(|poisoned| poisoned.into_inner().to_path_buf())
}

/// Points subsequent [`Config::new`] calls at a different file.
pub fn set_config_path(path: PathBuf) {
    let mut guard = CONFIG_PATH
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = path;
}

fn parse_flag(var: &'static str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => {
            Err(ConfigError::InvalidEnvOverride {
                var,
                value: value.to_string(),
            })
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

impl Config {
    pub fn default_config() -> Self {
        Self {
            ignore_errors: Some(true),
            minimum_observation_count: Some(DEFAULT_MINIMUM_OBSERVATION_COUNT),
            checksum_guard: Some(true),
            state_path: None,
            artifact_path: None,
        }
    }

    /// Loads the configuration file, falling back to defaults when it does
    /// not exist, then applies environment overrides and validates.
    pub fn new() -> Result<Self> {
        let config_path = config_path();

        let mut config = match fs::read_to_string(&config_path) {
            Ok(content) => toml::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(
                    "No config at {}, using defaults",
                    config_path.display()
                );
                Self::default_config()
            }
            Err(err) => return Err(ConfigError::IoError(err)),
        };

        config.apply_env_overrides()?;
        config.resolve()?;

        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(value) = std::env::var("STRATA_IGNORE_ERRORS") {
            self.ignore_errors = Some(parse_flag("STRATA_IGNORE_ERRORS", &value)?);
        }
        if let Ok(value) = std::env::var("STRATA_CHECKSUM_GUARD") {
            self.checksum_guard = Some(parse_flag("STRATA_CHECKSUM_GUARD", &value)?);
        }
        if let Ok(value) = std::env::var("STRATA_MIN_OBSERVATIONS") {
            let count = value.trim().parse::<u32>().map_err(|_| {
                ConfigError::InvalidEnvOverride {
                    var: "STRATA_MIN_OBSERVATIONS",
                    value: value.clone(),
                }
            })?;
            self.minimum_observation_count = Some(count);
        }
        Ok(())
    }

    /// Fills unset fields with defaults and rejects invalid values.
    pub fn resolve(&mut self) -> Result<()> {
        let count = *self
            .minimum_observation_count
            .get_or_insert(DEFAULT_MINIMUM_OBSERVATION_COUNT);
        if count < 2 {
            return Err(ConfigError::InvalidObservationCount(count));
        }

        self.ignore_errors.get_or_insert(true);
        self.checksum_guard.get_or_insert(true);

        Ok(())
    }

    pub fn ignore_errors(&self) -> bool {
        self.ignore_errors.unwrap_or(true)
    }

    pub fn minimum_observation_count(&self) -> u32 {
        self.minimum_observation_count
            .unwrap_or(DEFAULT_MINIMUM_OBSERVATION_COUNT)
    }

    pub fn checksum_guard(&self) -> bool {
        self.checksum_guard.unwrap_or(true)
    }

    pub fn get_state_path(&self) -> Result<PathBuf> {
        if let Ok(env_path) = std::env::var("STRATA_STATE") {
            return Ok(resolve_path(&env_path)?);
        }
        match &self.state_path {
            Some(path) => Ok(resolve_path(path)?),
            None => Ok(xdg_data_home().join("strata").join("state.db")),
        }
    }

    pub fn get_artifact_path(&self) -> Result<PathBuf> {
        if let Ok(env_path) = std::env::var("STRATA_ARTIFACTS") {
            return Ok(resolve_path(&env_path)?);
        }
        match &self.artifact_path {
            Some(path) => Ok(resolve_path(path)?),
            None => Ok(xdg_data_home().join("strata").join("artifacts")),
        }
    }

    pub fn to_annotated_document(&self) -> Result<DocumentMut> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut doc = toml_string.parse::<DocumentMut>()?;
        annotate_toml_table::<Config>(doc.as_table_mut(), true)?;
        Ok(doc)
    }
}

/// Writes the annotated default configuration to the config path.
pub fn generate_default_config() -> Result<PathBuf> {
    let config_path = config_path();

    if config_path.exists() {
        return Err(ConfigError::ConfigAlreadyExists);
    }

    let annotated_doc = Config::default_config().to_annotated_document()?;

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(&config_path, annotated_doc.to_string())?;
    info!(
        "Default configuration file generated with documentation at: {}",
        config_path.display()
    );
    Ok(config_path)
}

#[cfg(test)]
mod tests {
    use serial_test::serial;
    use tempfile::tempdir;

    use super::*;
    use crate::test_utils::with_env;

    #[test]
    fn test_default_config_values() {
        let config = Config::default_config();
        assert!(config.ignore_errors());
        assert!(config.checksum_guard());
        assert_eq!(config.minimum_observation_count(), 3);
    }

    #[test]
    fn test_resolve_rejects_single_observation() {
        let mut config = Config::default_config();
        config.minimum_observation_count = Some(1);
        assert!(matches!(
            config.resolve(),
            Err(ConfigError::InvalidObservationCount(1))
        ));
    }

    #[test]
    fn test_resolve_fills_missing_fields() {
        let mut config: Config = toml::from_str("minimum_observation_count = 5").unwrap();
        config.resolve().unwrap();
        assert_eq!(config.ignore_errors, Some(true));
        assert_eq!(config.checksum_guard, Some(true));
        assert_eq!(config.minimum_observation_count(), 5);
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        with_env(
            vec![
                ("STRATA_IGNORE_ERRORS", "false"),
                ("STRATA_MIN_OBSERVATIONS", "4"),
            ],
            || {
                let mut config = Config::default_config();
                config.apply_env_overrides().unwrap();
                assert!(!config.ignore_errors());
                assert_eq!(config.minimum_observation_count(), 4);
            },
        );
    }

    #[test]
    #[serial]
    fn test_invalid_env_override() {
        with_env(vec![("STRATA_CHECKSUM_GUARD", "maybe")], || {
            let mut config = Config::default_config();
            assert!(matches!(
                config.apply_env_overrides(),
                Err(ConfigError::InvalidEnvOverride { .. })
            ));
        });
    }

    #[test]
    #[serial]
    fn test_load_from_file_and_generate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        set_config_path(path.clone());

        assert_eq!(Config::new().unwrap(), {
            let mut expected = Config::default_config();
            expected.resolve().unwrap();
            expected
        });

        generate_default_config().unwrap();
        assert!(matches!(
            generate_default_config(),
            Err(ConfigError::ConfigAlreadyExists)
        ));

        fs::write(
            &path,
            "ignore_errors = false\nstate_path = \"/tmp/strata/state.db\"\n",
        )
        .unwrap();
        let config = Config::new().unwrap();
        assert!(!config.ignore_errors());
        assert_eq!(
            config.get_state_path().unwrap(),
            PathBuf::from("/tmp/strata/state.db")
        );
    }
}
