//! forcecov Core - org CI pipeline
//!
//! Drives an Apex org through one CI run:
//! - Logs in and deploys the project's sources
//! - Partitions project classes into production and test classes
//! - Runs every test class asynchronously and polls until the run finishes
//! - Merges per-line coverage into one hit-count array per class
//! - Publishes the coverage as a Coveralls job
//!
//! The remote systems sit behind [`PlatformClient`] and [`CoverageUploader`];
//! `forcecov-remote` provides the HTTP implementations.
//!
//! # Example
//!
//! ```rust,ignore
//! use forcecov_core::{Credentials, CoverallsSettings, Pipeline, PipelineConfig};
//! use std::sync::Arc;
//!
//! # async fn example(client: Arc<dyn forcecov_core::PlatformClient>,
//! #                  uploader: Arc<dyn forcecov_core::CoverageUploader>)
//! #     -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::new(
//!     Credentials::new("ci@example.com", "password", "token"),
//!     ".",
//!     CoverallsSettings::new("repo-token", "job-id"),
//! );
//! let report = Pipeline::new(config, client, uploader).run().await?;
//!
//! println!("{} tests passed", report.summary.passed);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod catalog;
pub mod config;
pub mod coverage;
pub mod deploy;
pub mod error;
pub mod pipeline;
pub mod platform;
pub mod poller;
pub mod report;
pub mod reporter;
pub mod types;

// Re-exports for convenience
pub use catalog::{build_catalog, is_test_class, local_class_names, ClassCatalog};
pub use config::{
    Credentials, CoverallsSettings, DeployOptions, PipelineConfig, PollPolicy,
    DEFAULT_DEPLOY_TIMEOUT, DEFAULT_LOGIN_URL, DEFAULT_POLL_INTERVAL, DEFAULT_TEST_TIMEOUT,
    SERVICE_NAME,
};
pub use coverage::{aggregate, merge_record, CoverageTotals};
pub use deploy::{deploy_sources, render_deploy_result};
pub use error::{CoreError, PipelineError, PlatformError, UploadError};
pub use pipeline::{Pipeline, PipelineReport, RunContext, Stage, StageTiming};
pub use platform::{CoverageUploader, PlatformClient};
pub use poller::{collect_results, wait_for_completion, ClassOutcome, MethodOutcome, TestRunSummary};
pub use report::{CoverallsJob, SourceFile, UploadReceipt, PAYLOAD_FILE_NAME};
pub use reporter::{CapturedOutput, Reporter};
pub use types::{
    class_path, ApexClassRow, ClassId, ClassRecord, ClassRole, ComponentFailure, CoverageRecord,
    DeployResult, QueueStatus, SessionInfo, TestOutcome, TestQueueItem, TestResultRecord,
    TestRunId,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with forcecov
    pub use crate::{
        ClassCatalog, CoreError, CoverageUploader, CoverallsJob, CoverallsSettings, Credentials,
        Pipeline, PipelineConfig, PipelineError, PlatformClient, PlatformError, PollPolicy,
        Reporter, Stage,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
