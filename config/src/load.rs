use std::io;
use std::path::{Path, PathBuf};

use rust_cli_config::builder::{ConfigBuilder, DefaultState};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::environment::Environment;

/// Directory holding the layered configuration files, relative to the working directory.
const CONFIGURATION_DIR: &str = "configuration";

/// Extensions tried, in order, for every configuration layer.
const CONFIG_FILE_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Prefix of environment variables overriding file values.
const ENV_PREFIX: &str = "APP";

/// Separator of nested keys in environment variables, e.g. `APP_DRAIN__ENABLED`.
const ENV_SEPARATOR: &str = "__";

/// Marker for top-level configuration structures that can be loaded with [`load_config`].
pub trait Config: DeserializeOwned {}

/// Errors that can occur while loading configuration files and overrides.
#[derive(Debug, Error)]
pub enum LoadConfigError {
    /// Failed to determine the current working directory.
    #[error("failed to determine the current directory: {0}")]
    CurrentDir(#[source] io::Error),

    /// The `configuration` directory does not exist.
    #[error("configuration directory `{0}` does not exist")]
    MissingConfigurationDirectory(PathBuf),

    /// None of the candidate files of a layer exists.
    #[error("could not locate the {layer} configuration in `{directory}`; attempted: {attempted}")]
    ConfigurationFileMissing {
        layer: String,
        directory: PathBuf,
        attempted: String,
    },

    /// A layer's file exists but could not be parsed.
    #[error("failed to load the {layer} configuration from `{path}`: {source}")]
    ConfigurationFileLoad {
        layer: String,
        path: PathBuf,
        source: rust_cli_config::ConfigError,
    },

    /// The merged sources do not deserialize into the requested type.
    #[error("failed to deserialize configuration: {0}")]
    Deserialization(#[source] rust_cli_config::ConfigError),

    /// `APP_ENVIRONMENT` names an unsupported environment.
    #[error("failed to determine runtime environment: {0}")]
    Environment(#[source] io::Error),

    /// Merging the sources failed.
    #[error("failed to merge configuration sources: {0}")]
    Builder(#[source] rust_cli_config::ConfigError),
}

/// Loads configuration from the `configuration` directory under the working directory, using
/// the environment named by `APP_ENVIRONMENT`.
pub fn load_config<T: Config>() -> Result<T, LoadConfigError> {
    let base_path = std::env::current_dir().map_err(LoadConfigError::CurrentDir)?;
    let environment = Environment::load().map_err(LoadConfigError::Environment)?;

    load_config_from(&base_path, environment)
}

/// Loads configuration rooted at `base_path`.
///
/// Layers, later ones winning: `configuration/base.*`, `configuration/{environment}.*`, then
/// `APP_`-prefixed environment variables with `__` between nested keys
/// (`APP_COORDINATION__ADMISSION_TIMEOUT_MS=500`).
pub fn load_config_from<T: Config>(
    base_path: &Path,
    environment: Environment,
) -> Result<T, LoadConfigError> {
    let directory = base_path.join(CONFIGURATION_DIR);
    if !directory.is_dir() {
        return Err(LoadConfigError::MissingConfigurationDirectory(directory));
    }

    let mut builder = rust_cli_config::Config::builder();
    for layer in ["base", environment.as_str()] {
        let path = find_layer_file(&directory, layer)?;
        builder = builder.add_source(rust_cli_config::File::from(path.clone()));
        ensure_parses(&builder, layer, path)?;
    }

    let overrides = rust_cli_config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator(ENV_SEPARATOR);

    builder
        .add_source(overrides)
        .build()
        .map_err(LoadConfigError::Builder)?
        .try_deserialize()
        .map_err(LoadConfigError::Deserialization)
}

/// Returns the first existing `{layer}.{extension}` file in `directory`.
fn find_layer_file(directory: &Path, layer: &str) -> Result<PathBuf, LoadConfigError> {
    let candidates: Vec<PathBuf> = CONFIG_FILE_EXTENSIONS
        .iter()
        .map(|extension| directory.join(format!("{layer}.{extension}")))
        .collect();

    if let Some(path) = candidates.iter().find(|path| path.is_file()) {
        return Ok(path.clone());
    }

    let attempted = candidates
        .iter()
        .map(|path| format!("`{}`", path.display()))
        .collect::<Vec<_>>()
        .join(", ");

    Err(LoadConfigError::ConfigurationFileMissing {
        layer: layer.to_string(),
        directory: directory.to_path_buf(),
        attempted,
    })
}

/// Builds the sources added so far so a broken file is reported against its own layer.
fn ensure_parses(
    builder: &ConfigBuilder<DefaultState>,
    layer: &str,
    path: PathBuf,
) -> Result<(), LoadConfigError> {
    match builder.build_cloned() {
        Ok(_) => Ok(()),
        Err(source) => Err(LoadConfigError::ConfigurationFileLoad {
            layer: layer.to_string(),
            path,
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::shared::SummarizerConfig;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("summarizer-config-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(dir.join(CONFIGURATION_DIR)).unwrap();
        dir
    }

    #[test]
    fn missing_configuration_directory_is_reported() {
        let dir = std::env::temp_dir().join("summarizer-config-does-not-exist");
        let err = load_config_from::<SummarizerConfig>(&dir, Environment::Dev).unwrap_err();
        assert!(matches!(err, LoadConfigError::MissingConfigurationDirectory(_)));
    }

    #[test]
    fn environment_file_overrides_base_file() {
        let dir = scratch_dir("override");
        fs::write(
            dir.join(CONFIGURATION_DIR).join("base.yaml"),
            "coordination:\n  admission_timeout_ms: 1300\ndrain:\n  iteration_delay_ms: 10\n",
        )
        .unwrap();
        fs::write(
            dir.join(CONFIGURATION_DIR).join("dev.yaml"),
            "coordination:\n  admission_timeout_ms: 500\n",
        )
        .unwrap();

        let config = load_config_from::<SummarizerConfig>(&dir, Environment::Dev).unwrap();
        assert_eq!(config.coordination.admission_timeout_ms, 500);
        assert_eq!(config.drain.iteration_delay_ms, 10);

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn missing_environment_file_lists_attempted_paths() {
        let dir = scratch_dir("missing-env");
        fs::write(dir.join(CONFIGURATION_DIR).join("base.json"), "{}").unwrap();

        let err = load_config_from::<SummarizerConfig>(&dir, Environment::Prod).unwrap_err();
        match err {
            LoadConfigError::ConfigurationFileMissing { layer, attempted, .. } => {
                assert_eq!(layer, "prod");
                assert!(attempted.contains("prod.yaml"));
                assert!(attempted.contains("prod.json"));
            }
            other => panic!("unexpected error: {other}"),
        }

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn broken_layer_is_reported_with_its_path() {
        let dir = scratch_dir("broken");
        fs::write(dir.join(CONFIGURATION_DIR).join("base.yaml"), "drain: {}\n").unwrap();
        fs::write(
            dir.join(CONFIGURATION_DIR).join("dev.json"),
            "{ not json",
        )
        .unwrap();

        let err = load_config_from::<SummarizerConfig>(&dir, Environment::Dev).unwrap_err();
        match err {
            LoadConfigError::ConfigurationFileLoad { layer, path, .. } => {
                assert_eq!(layer, "dev");
                assert!(path.ends_with("dev.json"));
            }
            other => panic!("unexpected error: {other}"),
        }

        fs::remove_dir_all(dir).unwrap();
    }
}
