//! Shared configuration helpers for PATA services.
//!
//! A service describes its settings as a `serde` struct implementing
//! [`ServiceConfig`]. [`load`] starts from `Default`, layers an optional YAML
//! file named by `<PREFIX>CONFIG`, then applies `<PREFIX>*` environment
//! overrides.

use std::env;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

pub trait ServiceConfig: DeserializeOwned + Default {
    /// Environment prefix, including the trailing underscore.
    const PREFIX: &'static str;

    fn apply_environment_overrides(&mut self, prefix: &str);
}

/// Load `T` from defaults, the optional YAML file, and the environment.
pub fn load<T: ServiceConfig>() -> Result<T, ConfigError> {
    let file_var = format!("{}CONFIG", T::PREFIX);
    let mut config = match env::var(&file_var) {
        Ok(path) if !path.is_empty() => from_file::<T>(Path::new(&path))?,
        _ => T::default(),
    };
    config.apply_environment_overrides(T::PREFIX);
    Ok(config)
}

pub fn from_file<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Read `<prefix><key>` and parse it.
///
/// Unset variables yield `None`; unparsable ones are logged and ignored.
pub fn env_override<T>(prefix: &str, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: Display,
{
    let var = format!("{prefix}{key}");
    let value = env::var(&var).ok()?;
    match value.parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(error) => {
            tracing::warn!(%var, %value, %error, "invalid configuration override, ignoring");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(default)]
    struct Sample {
        port: u16,
        name: String,
    }

    impl Default for Sample {
        fn default() -> Self {
            Self {
                port: 8080,
                name: "sample".to_string(),
            }
        }
    }

    impl ServiceConfig for Sample {
        const PREFIX: &'static str = "PATA_CONFIG_TEST_";

        fn apply_environment_overrides(&mut self, prefix: &str) {
            if let Some(port) = env_override(prefix, "PORT") {
                self.port = port;
            }
        }
    }

    #[test]
    fn file_then_environment_layering() {
        let dir = env::temp_dir().join(format!("pata-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("sample.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "port: 9000\nname: from-file").unwrap();

        env::set_var("PATA_CONFIG_TEST_CONFIG", &path);
        let loaded: Sample = load().unwrap();
        assert_eq!(
            loaded,
            Sample {
                port: 9000,
                name: "from-file".into()
            }
        );

        env::set_var("PATA_CONFIG_TEST_PORT", "9100");
        let loaded: Sample = load().unwrap();
        assert_eq!(loaded.port, 9100);
        assert_eq!(loaded.name, "from-file");

        env::set_var("PATA_CONFIG_TEST_PORT", "not-a-port");
        let loaded: Sample = load().unwrap();
        assert_eq!(loaded.port, 9000);

        env::remove_var("PATA_CONFIG_TEST_PORT");
        env::remove_var("PATA_CONFIG_TEST_CONFIG");
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn missing_file_is_reported() {
        let err = from_file::<Sample>(Path::new("/nonexistent/pata.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
