use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;
use validator::{Validate, ValidationError};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Parse error for {field}: {value} - {source}")]
    Parse {
        field: String,
        value: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Per-compilation settings with validation
#[derive(Clone, Debug, Validate, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Team every generated query is scoped to
    #[validate(range(min = 1, message = "Team id must be positive"))]
    pub team_id: i64,

    /// Read person fields from the flattened columns on events instead of joining
    pub person_on_events: bool,

    /// Fraction of events to sample, in (0, 1]
    #[validate(custom(function = "validate_sampling_factor"))]
    pub sampling_factor: Option<f64>,

    /// Timezone for date filters and interval truncation
    #[validate(length(min = 1, message = "Timezone cannot be empty"))]
    pub timezone: String,

    /// Default and maximum LIMIT of resolved select queries
    #[validate(range(
        min = 1,
        max = 65535,
        message = "Max limit must be between 1 and 65535"
    ))]
    pub max_limit: u64,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            team_id: 1,
            person_on_events: false,
            sampling_factor: None,
            timezone: "UTC".to_string(),
            max_limit: 65535,
        }
    }
}

fn validate_sampling_factor(factor: f64) -> Result<(), ValidationError> {
    if factor > 0.0 && factor <= 1.0 {
        Ok(())
    } else {
        let mut error = ValidationError::new("sampling_factor_range");
        error.message = Some("Sampling factor must be in (0, 1]".into());
        Err(error)
    }
}

impl CompilerConfig {
    /// Create configuration from environment variables with validation
    pub fn from_env() -> Result<Self, ConfigError> {
        let sampling_factor = match env::var("CLICKQUERY_SAMPLING_FACTOR") {
            Ok(value) if !value.is_empty() => {
                Some(parse_value("CLICKQUERY_SAMPLING_FACTOR", value)?)
            }
            _ => None,
        };

        let config = Self {
            team_id: parse_env_var("CLICKQUERY_TEAM_ID", "1")?,
            person_on_events: parse_env_var("CLICKQUERY_PERSON_ON_EVENTS", "false")?,
            sampling_factor,
            timezone: env::var("CLICKQUERY_TIMEZONE").unwrap_or_else(|_| "UTC".to_string()),
            max_limit: parse_env_var("CLICKQUERY_MAX_LIMIT", "65535")?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Create configuration from YAML file
    pub fn from_yaml_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
            field: "yaml_file".to_string(),
            value: "file read failed".to_string(),
            source: Box::new(e),
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            field: "yaml_content".to_string(),
            value: content,
            source: Box::new(e),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Override fields that were given on the command line
    pub fn merge_cli(&mut self, overrides: CliOverrides) -> Result<(), ConfigError> {
        if let Some(team_id) = overrides.team_id {
            self.team_id = team_id;
        }
        if overrides.person_on_events {
            self.person_on_events = true;
        }
        if overrides.sampling_factor.is_some() {
            self.sampling_factor = overrides.sampling_factor;
        }
        if let Some(timezone) = overrides.timezone {
            self.timezone = timezone;
        }
        if let Some(max_limit) = overrides.max_limit {
            self.max_limit = max_limit;
        }
        self.validate()?;
        Ok(())
    }
}

/// Command line values layered over a file or environment configuration
#[derive(Clone, Debug, Default)]
pub struct CliOverrides {
    pub team_id: Option<i64>,
    pub person_on_events: bool,
    pub sampling_factor: Option<f64>,
    pub timezone: Option<String>,
    pub max_limit: Option<u64>,
}

/// Parse an environment variable with a default value
fn parse_env_var<T: std::str::FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    parse_value(key, value)
}

fn parse_value<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value.parse().map_err(|e| ConfigError::Parse {
        field: key.to_string(),
        value,
        source: Box::new(e),
    })
}
