//! Pipeline configuration
//!
//! Credentials, deploy flags, poll policy and Coveralls job settings.
//! Secrets never appear in `Debug` output.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default login endpoint
pub const DEFAULT_LOGIN_URL: &str = "https://login.salesforce.com";

/// Default interval between status checks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5000);

/// Default bound on waiting for a deploy
pub const DEFAULT_DEPLOY_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Default bound on waiting for a test run
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Service name reported to Coveralls
pub const SERVICE_NAME: &str = "travis-ci";

/// Org login credentials
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// Login endpoint
    pub login_url: String,
    /// Username
    pub username: String,
    /// Password
    pub password: String,
    /// Security token appended to the password
    pub security_token: String,
}

impl Credentials {
    /// Create credentials against the default login endpoint
    #[must_use]
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        security_token: impl Into<String>,
    ) -> Self {
        Self {
            login_url: DEFAULT_LOGIN_URL.to_string(),
            username: username.into(),
            password: password.into(),
            security_token: security_token.into(),
        }
    }

    /// With login endpoint
    #[inline]
    #[must_use]
    pub fn with_login_url(mut self, login_url: impl Into<String>) -> Self {
        self.login_url = login_url.into();
        self
    }

    /// Password with the security token appended, as the login endpoint expects
    #[inline]
    #[must_use]
    pub fn password_with_token(&self) -> String {
        format!("{}{}", self.password, self.security_token)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login_url", &self.login_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("security_token", &"<redacted>")
            .finish()
    }
}

/// Metadata deploy flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployOptions {
    /// Roll the whole deploy back if any component fails
    pub rollback_on_error: bool,
    /// Deploy even when warnings are raised
    pub ignore_warnings: bool,
    /// Tolerate files referenced by the manifest but missing from the archive
    pub allow_missing_files: bool,
    /// Create the manifest when missing
    pub auto_update_package: bool,
    /// Archive holds a single package
    pub single_package: bool,
    /// Validate without saving
    pub check_only: bool,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            rollback_on_error: true,
            ignore_warnings: false,
            allow_missing_files: false,
            auto_update_package: false,
            single_package: false,
            check_only: false,
        }
    }
}

/// Fixed-interval polling with an optional deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between checks
    pub interval: Duration,
    /// Give up after this long; `None` polls until the work finishes
    pub timeout: Option<Duration>,
}

impl PollPolicy {
    /// Create a poll policy
    #[inline]
    #[must_use]
    pub fn new(interval: Duration, timeout: Option<Duration>) -> Self {
        Self { interval, timeout }
    }

    /// Poll until the work finishes, however long it takes
    #[inline]
    #[must_use]
    pub fn unbounded(interval: Duration) -> Self {
        Self {
            interval,
            timeout: None,
        }
    }

    /// Whether `elapsed` is past the deadline
    #[inline]
    #[must_use]
    pub fn is_expired(&self, elapsed: Duration) -> bool {
        self.timeout.is_some_and(|limit| elapsed >= limit)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, Some(DEFAULT_TEST_TIMEOUT))
    }
}

/// Coveralls job settings
#[derive(Clone, Serialize, Deserialize)]
pub struct CoverallsSettings {
    /// Repository token
    pub repo_token: String,
    /// CI service name
    pub service_name: String,
    /// CI job id
    pub service_job_id: String,
}

impl CoverallsSettings {
    /// Create settings for a Travis job
    #[must_use]
    pub fn new(repo_token: impl Into<String>, service_job_id: impl Into<String>) -> Self {
        Self {
            repo_token: repo_token.into(),
            service_name: SERVICE_NAME.to_string(),
            service_job_id: service_job_id.into(),
        }
    }
}

impl fmt::Debug for CoverallsSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoverallsSettings")
            .field("repo_token", &"<redacted>")
            .field("service_name", &self.service_name)
            .field("service_job_id", &self.service_job_id)
            .finish()
    }
}

/// Everything a pipeline run needs
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Org credentials
    pub credentials: Credentials,
    /// Project root holding `src/`
    pub project_dir: PathBuf,
    /// Deploy flags
    pub deploy: DeployOptions,
    /// Test-run polling
    pub test_poll: PollPolicy,
    /// Coveralls job
    pub coveralls: CoverallsSettings,
    /// Skip the deploy stage
    pub skip_deploy: bool,
    /// Write the coverage payload here instead of uploading it
    pub dry_run: Option<PathBuf>,
}

impl PipelineConfig {
    /// Create a configuration with default deploy flags and polling
    #[must_use]
    pub fn new(
        credentials: Credentials,
        project_dir: impl Into<PathBuf>,
        coveralls: CoverallsSettings,
    ) -> Self {
        Self {
            credentials,
            project_dir: project_dir.into(),
            deploy: DeployOptions::default(),
            test_poll: PollPolicy::default(),
            coveralls,
            skip_deploy: false,
            dry_run: None,
        }
    }

    /// With deploy flags
    #[inline]
    #[must_use]
    pub fn with_deploy_options(mut self, deploy: DeployOptions) -> Self {
        self.deploy = deploy;
        self
    }

    /// With test-run polling
    #[inline]
    #[must_use]
    pub fn with_test_poll(mut self, poll: PollPolicy) -> Self {
        self.test_poll = poll;
        self
    }

    /// Skip the deploy stage
    #[inline]
    #[must_use]
    pub fn skip_deploy(mut self, skip: bool) -> Self {
        self.skip_deploy = skip;
        self
    }

    /// Write the payload to `path` instead of uploading
    #[inline]
    #[must_use]
    pub fn with_dry_run(mut self, path: impl Into<PathBuf>) -> Self {
        self.dry_run = Some(path.into());
        self
    }

    /// Directory deployed to the org
    #[inline]
    #[must_use]
    pub fn source_dir(&self) -> PathBuf {
        self.project_dir.join("src")
    }

    /// Directory holding the project's class files
    #[inline]
    #[must_use]
    pub fn classes_dir(&self) -> PathBuf {
        self.project_dir.join("src").join("classes")
    }
}
