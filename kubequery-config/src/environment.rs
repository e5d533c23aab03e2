use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Variable selecting the environment of the operator process.
const ENVIRONMENT_VAR: &str = "APP_ENVIRONMENT";

/// Errors raised while reading the environment.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvironmentError {
    #[error("`{0}` is not a supported environment, expected one of prod, staging, dev")]
    Unsupported(String),
}

/// Where the operator runs.
///
/// Picks `configuration/{environment}.yaml` on top of the base file and decides
/// between JSON file logging (prod, staging) and pretty console logging (dev).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Prod,
    Staging,
    Dev,
}

impl Environment {
    /// Reads [`ENVIRONMENT_VAR`], falling back to [`Environment::Prod`] when it is
    /// unset so an operator deployed without it never logs to the console.
    pub fn load() -> Result<Environment, EnvironmentError> {
        match std::env::var(ENVIRONMENT_VAR) {
            Ok(value) => value.parse(),
            Err(_) => Ok(Environment::Prod),
        }
    }

    /// Exports this environment to the current process.
    pub fn set(&self) {
        unsafe { std::env::set_var(ENVIRONMENT_VAR, self.as_str()) }
    }

    /// Whether logs go to JSON files rather than the console.
    pub fn is_prod(&self) -> bool {
        !matches!(self, Environment::Dev)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Prod => "prod",
            Environment::Staging => "staging",
            Environment::Dev => "dev",
        }
    }
}

impl FromStr for Environment {
    type Err = EnvironmentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Ok(Environment::Prod),
            "staging" => Ok(Environment::Staging),
            "dev" | "development" => Ok(Environment::Dev),
            _ => Err(EnvironmentError::Unsupported(value.to_string())),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_environment_names_and_aliases() {
        assert_eq!("PROD".parse(), Ok(Environment::Prod));
        assert_eq!(" Staging ".parse(), Ok(Environment::Staging));
        assert_eq!("development".parse(), Ok(Environment::Dev));
        assert_eq!(
            "qa".parse::<Environment>(),
            Err(EnvironmentError::Unsupported("qa".to_string()))
        );
    }

    #[test]
    fn display_matches_the_configuration_file_name() {
        for environment in [Environment::Prod, Environment::Staging, Environment::Dev] {
            assert_eq!(environment.to_string().parse(), Ok(environment));
        }
    }

    #[test]
    fn only_dev_logs_to_the_console() {
        assert!(Environment::Staging.is_prod());
        assert!(Environment::Prod.is_prod());
        assert!(!Environment::Dev.is_prod());
    }
}
