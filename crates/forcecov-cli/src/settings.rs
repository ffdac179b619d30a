//! Environment configuration
//!
//! Every setting comes from the process environment, the way CI jobs hand
//! secrets to a build.

use forcecov_core::{
    Credentials, CoverallsSettings, PipelineConfig, PollPolicy, DEFAULT_DEPLOY_TIMEOUT,
    DEFAULT_LOGIN_URL, DEFAULT_POLL_INTERVAL, DEFAULT_TEST_TIMEOUT,
};
use forcecov_remote::{ClientConfig, DEFAULT_API_VERSION, DEFAULT_COVERALLS_ENDPOINT};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration problems
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub(crate) enum ConfigError {
    /// A required variable is unset or empty
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    /// A variable could not be parsed
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        /// Variable name
        key: &'static str,
        /// Raw value
        value: String,
        /// Parse failure
        reason: String,
    },
}

/// Settings read from the environment
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(crate) credentials: Credentials,
    pub(crate) coveralls: CoverallsSettings,
    pub(crate) coveralls_endpoint: String,
    pub(crate) api_version: String,
    pub(crate) poll_interval: Duration,
    pub(crate) deploy_timeout: Duration,
    /// `None` waits for the test run however long it takes
    pub(crate) test_timeout: Option<Duration>,
}

impl Settings {
    /// Read settings from the process environment
    pub(crate) fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`; empty values count as unset
    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));
        let millis = |key: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            get(key).map_or(Ok(default), |raw| parse_u64(key, &raw).map(Duration::from_millis))
        };
        let secs = |key: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            get(key).map_or(Ok(default), |raw| parse_u64(key, &raw).map(Duration::from_secs))
        };

        let credentials = Credentials::new(
            required("SFDC_USERNAME")?,
            required("SFDC_PASSWORD")?,
            get("SFDC_TOKEN").unwrap_or_default(),
        )
        .with_login_url(get("SFDC_LOGINURL").unwrap_or_else(|| DEFAULT_LOGIN_URL.to_string()));

        let coveralls = CoverallsSettings::new(
            required("COVERALLS_REPO_TOKEN")?,
            required("TRAVIS_JOB_ID")?,
        );

        let poll_interval = millis("FORCECOV_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL)?;
        if poll_interval.is_zero() {
            return Err(ConfigError::Invalid {
                key: "FORCECOV_POLL_INTERVAL_MS",
                value: "0".to_string(),
                reason: "interval must be positive".to_string(),
            });
        }
        let deploy_timeout = secs("FORCECOV_DEPLOY_TIMEOUT_SECS", DEFAULT_DEPLOY_TIMEOUT)?;
        let test_timeout = secs("FORCECOV_TEST_TIMEOUT_SECS", DEFAULT_TEST_TIMEOUT)?;

        Ok(Self {
            credentials,
            coveralls,
            coveralls_endpoint: get("COVERALLS_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_COVERALLS_ENDPOINT.to_string()),
            api_version: get("SFDC_API_VERSION").unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            poll_interval,
            deploy_timeout,
            test_timeout: (!test_timeout.is_zero()).then_some(test_timeout),
        })
    }

    /// Pipeline configuration for a project
    pub(crate) fn pipeline_config(&self, project_dir: impl Into<PathBuf>) -> PipelineConfig {
        PipelineConfig::new(self.credentials.clone(), project_dir, self.coveralls.clone())
            .with_test_poll(PollPolicy::new(self.poll_interval, self.test_timeout))
    }

    /// Org client configuration
    pub(crate) fn client_config(&self) -> ClientConfig {
        ClientConfig::default()
            .with_api_version(self.api_version.clone())
            .with_deploy_poll(PollPolicy::new(self.poll_interval, Some(self.deploy_timeout)))
    }
}

fn parse_u64(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
        key,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}
