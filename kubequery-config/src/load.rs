use serde::de::DeserializeOwned;
use std::path::Path;

use crate::environment::Environment;

/// Directory containing configuration files relative to the working directory.
const CONFIGURATION_DIR: &str = "configuration";

/// Base configuration file loaded for all environments.
const BASE_CONFIG_FILE: &str = "base.yaml";

/// Prefix for environment variable configuration overrides.
const ENV_PREFIX: &str = "APP";

/// Separator between environment variable prefix and key segments.
const ENV_PREFIX_SEPARATOR: &str = "_";

/// Separator for nested configuration keys in environment variables.
///
/// Example: `APP_EXECUTION__DEFAULT_TIMEOUT_SECS` sets the
/// `execution.default_timeout_secs` field.
const ENV_SEPARATOR: &str = "__";

/// Loads hierarchical configuration from the `configuration` directory of the
/// current working directory.
///
/// Loads configuration in this order:
/// 1. Base configuration from `configuration/base.yaml`
/// 2. Environment-specific file from `configuration/{environment}.yaml`
/// 3. Environment variable overrides prefixed with `APP`
///
/// Fails if `APP_ENVIRONMENT` names an unknown environment.
///
/// # Panics
/// Panics if the current directory cannot be determined.
pub fn load_config<T>() -> Result<T, config::ConfigError>
where
    T: DeserializeOwned,
{
    let base_path = std::env::current_dir().expect("Failed to determine the current directory");
    let configuration_directory = base_path.join(CONFIGURATION_DIR);

    // Detect the running environment.
    let environment = Environment::load()
        .map_err(|err| config::ConfigError::Message(err.to_string()))?;

    load_config_from(&configuration_directory, environment)
}

/// Loads hierarchical configuration from an explicit directory and environment.
///
/// The environment-specific file is optional, the base file is required.
pub fn load_config_from<T>(
    configuration_directory: &Path,
    environment: Environment,
) -> Result<T, config::ConfigError>
where
    T: DeserializeOwned,
{
    let environment_filename = format!("{environment}.yaml");

    let environment_source = config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_PREFIX_SEPARATOR)
        .separator(ENV_SEPARATOR);

    let settings = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join(BASE_CONFIG_FILE),
        ))
        .add_source(
            config::File::from(configuration_directory.join(environment_filename))
                .required(false),
        )
        // E.g. `APP_RETRY__MAX_ATTEMPTS=3` sets `OperatorConfig { retry: { max_attempts } }`.
        .add_source(environment_source)
        .build()?;

    settings.try_deserialize::<T>()
}
