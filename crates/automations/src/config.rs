//!
//! # Integration settings
//!
//! Per-integration knobs for the automations, loaded once at startup
//! from environment variables (with an optional `.env` file) and
//! validated immediately. No silent fallbacks: a malformed value is an
//! error, not a default.
//!

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load env file {path}: {message}")]
    EnvFileLoad { path: String, message: String },

    #[error("invalid value for {variable}: {message}")]
    InvalidValue { variable: String, message: String },
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitHubSettings {
    /// Organization to create repositories in. Overrides the
    /// namespace's source-control group when set.
    pub organization: Option<String>,
    /// Team granted access to each new repository.
    pub team_slug: Option<String>,
    /// Link type used to attach the repository URL to the project.
    pub project_link_type_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SentrySettings {
    pub project_link_type_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PagerDutySettings {
    pub project_link_type_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SonarQubeSettings {
    pub url: Option<String>,
    pub project_link_type_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AutomationSettings {
    #[serde(default)]
    pub github: GitHubSettings,
    #[serde(default)]
    pub sentry: SentrySettings,
    #[serde(default)]
    pub pagerduty: PagerDutySettings,
    #[serde(default)]
    pub sonarqube: SonarQubeSettings,
}

impl AutomationSettings {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load `env_file` first, then read the process environment.
    pub fn from_env_file(env_file: &Path) -> Result<Self, ConfigError> {
        dotenv::from_path(env_file).map_err(|error| ConfigError::EnvFileLoad {
            path: env_file.display().to_string(),
            message: error.to_string(),
        })?;
        Self::from_env()
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let settings = Self {
            github: GitHubSettings {
                organization: optional_string(&lookup, "SLIPWAY_GITHUB_ORGANIZATION"),
                team_slug: optional_string(&lookup, "SLIPWAY_GITHUB_TEAM_SLUG"),
                project_link_type_id: optional_i64(&lookup, "SLIPWAY_GITHUB_LINK_TYPE_ID")?,
            },
            sentry: SentrySettings {
                project_link_type_id: optional_i64(&lookup, "SLIPWAY_SENTRY_LINK_TYPE_ID")?,
            },
            pagerduty: PagerDutySettings {
                project_link_type_id: optional_i64(&lookup, "SLIPWAY_PAGERDUTY_LINK_TYPE_ID")?,
            },
            sonarqube: SonarQubeSettings {
                url: optional_string(&lookup, "SLIPWAY_SONARQUBE_URL"),
                project_link_type_id: optional_i64(&lookup, "SLIPWAY_SONARQUBE_LINK_TYPE_ID")?,
            },
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_link_type_id(
            "SLIPWAY_GITHUB_LINK_TYPE_ID",
            self.github.project_link_type_id,
        )?;
        validate_link_type_id(
            "SLIPWAY_SENTRY_LINK_TYPE_ID",
            self.sentry.project_link_type_id,
        )?;
        validate_link_type_id(
            "SLIPWAY_PAGERDUTY_LINK_TYPE_ID",
            self.pagerduty.project_link_type_id,
        )?;
        validate_link_type_id(
            "SLIPWAY_SONARQUBE_LINK_TYPE_ID",
            self.sonarqube.project_link_type_id,
        )?;
        Ok(())
    }
}

fn optional_string<F>(lookup: &F, variable: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(variable).filter(|value| !value.is_empty())
}

fn optional_i64<F>(lookup: &F, variable: &str) -> Result<Option<i64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(variable).filter(|value| !value.is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<i64>()
            .map(Some)
            .map_err(|error| ConfigError::InvalidValue {
                variable: variable.to_string(),
                message: error.to_string(),
            }),
    }
}

fn validate_link_type_id(variable: &str, value: Option<i64>) -> Result<(), ConfigError> {
    match value {
        Some(id) if id <= 0 => Err(ConfigError::InvalidValue {
            variable: variable.to_string(),
            message: format!("link type id must be positive, got {id}"),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn absent_variables_leave_settings_unset() {
        let settings = AutomationSettings::from_lookup(lookup_from(&[])).unwrap();
        assert!(settings.github.project_link_type_id.is_none());
        assert!(settings.sonarqube.url.is_none());
    }

    #[test]
    fn values_are_parsed_per_integration() {
        let settings = AutomationSettings::from_lookup(lookup_from(&[
            ("SLIPWAY_GITHUB_ORGANIZATION", "acme"),
            ("SLIPWAY_GITHUB_LINK_TYPE_ID", "3"),
            ("SLIPWAY_SONARQUBE_URL", "https://sonar.acme.example"),
        ]))
        .unwrap();
        assert_eq!(settings.github.organization.as_deref(), Some("acme"));
        assert_eq!(settings.github.project_link_type_id, Some(3));
        assert_eq!(
            settings.sonarqube.url.as_deref(),
            Some("https://sonar.acme.example")
        );
    }

    #[test]
    fn malformed_numbers_fail_fast() {
        let result = AutomationSettings::from_lookup(lookup_from(&[(
            "SLIPWAY_SENTRY_LINK_TYPE_ID",
            "three",
        )]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref variable, .. })
                if variable == "SLIPWAY_SENTRY_LINK_TYPE_ID"
        ));
    }

    #[test]
    fn non_positive_link_type_ids_are_rejected() {
        let result = AutomationSettings::from_lookup(lookup_from(&[(
            "SLIPWAY_PAGERDUTY_LINK_TYPE_ID",
            "0",
        )]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn empty_strings_count_as_absent() {
        let settings = AutomationSettings::from_lookup(lookup_from(&[(
            "SLIPWAY_GITHUB_ORGANIZATION",
            "",
        )]))
        .unwrap();
        assert!(settings.github.organization.is_none());
    }
}
