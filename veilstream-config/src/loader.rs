use std::{env, fs, path::PathBuf};

use crate::model::ModerationConfig;
use crate::validation::{self, ConfigLoadError};

const ENV_PATH_VAR: &str = "VEILSTREAM_CONFIG_PATH";
const ENV_JSON_VAR: &str = "VEILSTREAM_CONFIG_JSON";
const DEFAULT_FILE_NAMES: [&str; 2] = ["veilstream.toml", "veilstream.config.toml"];

/// Where a loaded [`ModerationConfig`] came from, surfaced for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Default,
    EnvPath(PathBuf),
    EnvInline,
    File(PathBuf),
}

impl ModerationConfig {
    /// Loads configuration with a fixed precedence:
    ///
    /// 1. `$VEILSTREAM_CONFIG_PATH` (TOML or JSON file, by extension),
    /// 2. `$VEILSTREAM_CONFIG_JSON` (inline JSON),
    /// 3. a conventional default file name in the current directory,
    /// 4. built-in defaults.
    ///
    /// The result is always validated before being returned.
    pub fn load_from_env() -> Result<(Self, ConfigSource), ConfigLoadError> {
        load_dotenv()?;

        if let Ok(path_str) = env::var(ENV_PATH_VAR) {
            if !path_str.trim().is_empty() {
                let path = PathBuf::from(path_str);
                let config = Self::load_from_file(&path)?;
                validation::validate(&config)?;
                return Ok((config, ConfigSource::EnvPath(path)));
            }
        }

        if let Ok(raw) = env::var(ENV_JSON_VAR) {
            if !raw.trim().is_empty() {
                let config: ModerationConfig = serde_json::from_str(&raw)?;
                validation::validate(&config)?;
                return Ok((config, ConfigSource::EnvInline));
            }
        }

        if let Some(path) = Self::find_default_file() {
            let config = Self::load_from_file(&path)?;
            validation::validate(&config)?;
            return Ok((config, ConfigSource::File(path)));
        }

        let config = Self::default();
        validation::validate(&config)?;
        Ok((config, ConfigSource::Default))
    }

    fn load_from_file(path: &PathBuf) -> Result<Self, ConfigLoadError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
            path: path.display().to_string(),
            source,
        })?;

        if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
            Ok(serde_json::from_str(&raw)?)
        } else {
            Ok(toml::from_str(&raw)?)
        }
    }

    fn find_default_file() -> Option<PathBuf> {
        DEFAULT_FILE_NAMES
            .iter()
            .map(PathBuf::from)
            .find(|path| path.is_file())
    }
}

/// Loads a `.env` file into the process environment, if one is present.
/// A missing file is not an error; a malformed one is.
fn load_dotenv() -> Result<(), ConfigLoadError> {
    match dotenvy::dotenv() {
        Ok(_) => Ok(()),
        Err(dotenvy::Error::Io(_)) => Ok(()),
        Err(err) => Err(ConfigLoadError::EnvFile(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_toml_file() {
        let mut file = tempfile::NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(file, "[batch]\nmax_batch_size = 16\n").unwrap();
        let config = ModerationConfig::load_from_file(&file.path().to_path_buf()).unwrap();
        assert_eq!(config.batch.max_batch_size, 16);
        // untouched fields still carry their defaults
        assert_eq!(config.batch.max_wait_ms, 30);
    }

    #[test]
    fn loads_json_file() {
        let mut file = tempfile::NamedTempFile::with_suffix(".json").unwrap();
        writeln!(file, r#"{{"confidence": {{"decay_rate": 0.5}}}}"#).unwrap();
        let config = ModerationConfig::load_from_file(&file.path().to_path_buf()).unwrap();
        assert_eq!(config.confidence.decay_rate, 0.5);
    }

    #[test]
    fn defaults_when_nothing_configured() {
        // SAFETY: test-only, single-threaded within this test function.
        unsafe {
            env::remove_var(ENV_PATH_VAR);
            env::remove_var(ENV_JSON_VAR);
        }
        let (config, source) = ModerationConfig::load_from_env().unwrap();
        assert_eq!(source, ConfigSource::Default);
        assert_eq!(config.batch.max_pending_batches, 2);
    }
}
