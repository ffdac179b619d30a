//! Error types for forcecov
//!
//! Provides the error taxonomy of a pipeline run:
//! - Remote platform failures (transport, faults, API errors)
//! - Coverage upload failures
//! - Stage-level failures, including the aggregate test failure
//! - The pipeline error that names the stage which aborted the run

use crate::pipeline::Stage;
use std::path::PathBuf;

/// Failure talking to the remote org
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// Request never produced a usable HTTP response
    #[error("transport error: {0}")]
    Transport(String),

    /// SOAP fault returned verbatim
    #[error("{code}: {message}")]
    Fault {
        /// Fault code, e.g. `INVALID_LOGIN`
        code: String,
        /// Fault string
        message: String,
    },

    /// REST error response
    #[error("API error (HTTP {status}): {message}")]
    Api {
        /// HTTP status
        status: u16,
        /// Error messages joined
        message: String,
    },

    /// Call made before login
    #[error("not logged in")]
    NotAuthenticated,

    /// Response did not have the expected shape
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Remote work did not finish in time
    #[error("timed out after {waited_secs}s")]
    Timeout {
        /// Seconds waited
        waited_secs: u64,
    },

    /// Deploy archive could not be built
    #[error("archive error: {0}")]
    Archive(String),

    /// Local I/O
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure publishing coverage
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// Request never produced a usable HTTP response
    #[error("transport error: {0}")]
    Transport(String),

    /// Service rejected the job
    #[error("coverage service rejected the job{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Rejected {
        /// HTTP status, when the rejection came with one
        status: Option<u16>,
        /// Service message
        message: String,
    },

    /// Payload could not be written
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Payload could not be serialised
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failure of one pipeline stage
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Login rejected or unreachable
    #[error("authentication failed: {0}")]
    Authentication(#[source] PlatformError),

    /// Deploy request could not be made or polled
    #[error("deploy request failed: {0}")]
    DeployRequest(#[source] PlatformError),

    /// Deploy finished without success
    #[error("deployment failed: {status}")]
    DeploymentFailed {
        /// Final deploy status
        status: String,
    },

    /// Class list query failed
    #[error("class query failed: {0}")]
    CatalogQuery(#[source] PlatformError),

    /// Local class directory unreadable
    #[error("cannot list local classes in {}: {source}", .path.display())]
    LocalClasses {
        /// Directory that was listed
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Test run could not be submitted
    #[error("test submission failed: {0}")]
    TestSubmission(#[source] PlatformError),

    /// Queue or result query failed
    #[error("test status query failed: {0}")]
    PollQuery(#[source] PlatformError),

    /// Tests still running when the poll deadline passed
    #[error("tests still running after {waited_secs}s")]
    PollTimeout {
        /// Seconds waited
        waited_secs: u64,
    },

    /// At least one test method failed
    #[error("There were {failed} failing tests")]
    TestsFailed {
        /// Failed methods
        failed: usize,
        /// Passed methods
        passed: usize,
    },

    /// Coverage query failed
    #[error("coverage query failed: {0}")]
    CoverageQuery(#[source] PlatformError),

    /// Coverage could not be published
    #[error("coverage upload failed: {0}")]
    Upload(#[from] UploadError),
}

impl CoreError {
    /// Whether the run failed because tests failed rather than because of a system error
    #[inline]
    #[must_use]
    pub fn is_test_failure(&self) -> bool {
        matches!(self, Self::TestsFailed { .. })
    }

    /// Whether the org rejected our credentials or session
    #[inline]
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Self::Authentication(_)
                | Self::CatalogQuery(PlatformError::NotAuthenticated)
                | Self::TestSubmission(PlatformError::NotAuthenticated)
                | Self::PollQuery(PlatformError::NotAuthenticated)
                | Self::CoverageQuery(PlatformError::NotAuthenticated)
        )
    }
}

/// Pipeline aborted at a stage
#[derive(Debug, thiserror::Error)]
#[error("{stage} failed: {source}")]
pub struct PipelineError {
    /// Stage that failed
    pub stage: Stage,
    /// Why it failed
    #[source]
    pub source: CoreError,
}

impl PipelineError {
    /// Create a pipeline error
    #[inline]
    #[must_use]
    pub fn new(stage: Stage, source: CoreError) -> Self {
        Self { stage, source }
    }

    /// Process exit status for this failure
    #[inline]
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.source.is_test_failure() {
            2
        } else {
            1
        }
    }
}
