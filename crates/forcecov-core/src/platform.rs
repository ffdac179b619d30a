//! Seams to the remote systems
//!
//! Implement [`PlatformClient`] to talk to an org and [`CoverageUploader`]
//! to publish coverage. The pipeline only ever sees these traits.

use crate::config::{Credentials, DeployOptions};
use crate::error::{PlatformError, UploadError};
use crate::report::{CoverallsJob, UploadReceipt};
use crate::types::{
    ApexClassRow, ClassId, CoverageRecord, DeployResult, SessionInfo, TestQueueItem,
    TestResultRecord, TestRunId,
};
use std::path::Path;

/// Remote org operations
///
/// A successful [`login`](PlatformClient::login) establishes the session
/// every other call runs under.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait PlatformClient: Send + Sync {
    /// Exchange credentials for a session
    async fn login(&self, credentials: &Credentials) -> Result<SessionInfo, PlatformError>;

    /// Deploy the metadata under `source_dir` and wait for the org to finish
    async fn deploy(
        &self,
        source_dir: &Path,
        options: &DeployOptions,
    ) -> Result<DeployResult, PlatformError>;

    /// List every class in the org
    async fn list_classes(&self) -> Result<Vec<ApexClassRow>, PlatformError>;

    /// Submit one asynchronous run covering `class_ids`
    async fn run_tests_async(&self, class_ids: &[ClassId]) -> Result<TestRunId, PlatformError>;

    /// Queue items of a run
    async fn queue_items(&self, run_id: &TestRunId) -> Result<Vec<TestQueueItem>, PlatformError>;

    /// Per-method results of a run
    async fn test_results(&self, run_id: &TestRunId)
        -> Result<Vec<TestResultRecord>, PlatformError>;

    /// Line coverage records for every class and trigger
    async fn code_coverage(&self) -> Result<Vec<CoverageRecord>, PlatformError>;
}

/// Coverage publishing
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CoverageUploader: Send + Sync {
    /// Publish one job
    async fn upload(&self, job: &CoverallsJob) -> Result<UploadReceipt, UploadError>;
}
