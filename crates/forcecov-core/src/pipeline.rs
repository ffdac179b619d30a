//! Sequential stage runner
//!
//! A run is an ordered list of stages sharing one [`RunContext`]. Each stage
//! either fills in its part of the context or fails, and the first failure
//! stops the run.
//!
//! # Stages
//! 1. Authenticate
//! 2. Deploy (skippable)
//! 3. Build the class catalog
//! 4. Submit the test run
//! 5. Poll for and summarise results
//! 6. Aggregate coverage
//! 7. Publish coverage (or write it locally on a dry run)

use crate::catalog::{build_catalog, ClassCatalog};
use crate::config::PipelineConfig;
use crate::coverage::{aggregate, CoverageTotals};
use crate::deploy::deploy_sources;
use crate::error::{CoreError, PipelineError};
use crate::platform::{CoverageUploader, PlatformClient};
use crate::poller::{collect_results, TestRunSummary};
use crate::report::{CoverallsJob, UploadReceipt};
use crate::reporter::Reporter;
use crate::types::{DeployResult, SessionInfo, TestRunId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

/// Pipeline stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    /// Log in to the org
    Authenticate,
    /// Deploy project sources
    Deploy,
    /// Partition project classes
    BuildCatalog,
    /// Submit the asynchronous test run
    RunTests,
    /// Wait for and summarise test results
    PollResults,
    /// Merge line coverage
    AggregateCoverage,
    /// Send coverage to Coveralls
    PublishCoverage,
}

impl Stage {
    /// Every stage, in order
    pub const ALL: [Stage; 7] = [
        Stage::Authenticate,
        Stage::Deploy,
        Stage::BuildCatalog,
        Stage::RunTests,
        Stage::PollResults,
        Stage::AggregateCoverage,
        Stage::PublishCoverage,
    ];

    /// Stable stage name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Authenticate => "authenticate",
            Stage::Deploy => "deploy",
            Stage::BuildCatalog => "build-catalog",
            Stage::RunTests => "run-tests",
            Stage::PollResults => "poll-results",
            Stage::AggregateCoverage => "aggregate-coverage",
            Stage::PublishCoverage => "publish-coverage",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// State accumulated by one run
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    /// Session from login
    pub session: Option<SessionInfo>,
    /// Deploy outcome
    pub deploy: Option<DeployResult>,
    /// Project classes
    pub catalog: ClassCatalog,
    /// Submitted test run, `None` when there was nothing to run
    pub run_id: Option<TestRunId>,
    /// Test outcomes
    pub summary: Option<TestRunSummary>,
    /// Coverage line totals
    pub totals: Option<CoverageTotals>,
    /// Coveralls answer
    pub receipt: Option<UploadReceipt>,
    /// Where a dry run wrote its payload
    pub payload_path: Option<PathBuf>,
}

/// Timing of one executed stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTiming {
    /// Stage
    pub stage: Stage,
    /// Wall time in milliseconds
    pub elapsed_ms: u64,
}

/// Outcome of a successful run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// Stages executed, in order
    pub stages: Vec<StageTiming>,
    /// Stages skipped by configuration
    pub skipped: Vec<Stage>,
    /// Test outcomes
    pub summary: TestRunSummary,
    /// Coverage line totals
    pub totals: CoverageTotals,
    /// Coveralls answer, absent on a dry run
    pub receipt: Option<UploadReceipt>,
    /// Dry-run payload location
    pub payload_path: Option<PathBuf>,
}

/// The CI pipeline
pub struct Pipeline {
    config: PipelineConfig,
    client: Arc<dyn PlatformClient>,
    uploader: Arc<dyn CoverageUploader>,
    reporter: Reporter,
}

impl Pipeline {
    /// Create a pipeline reporting to stdout
    pub fn new(
        config: PipelineConfig,
        client: Arc<dyn PlatformClient>,
        uploader: Arc<dyn CoverageUploader>,
    ) -> Self {
        Self {
            config,
            client,
            uploader,
            reporter: Reporter::stdout(),
        }
    }

    /// With report sink
    #[must_use]
    pub fn with_reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Get configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Whether configuration skips `stage`
    #[must_use]
    pub fn skips(&self, stage: Stage) -> bool {
        stage == Stage::Deploy && self.config.skip_deploy
    }

    /// Run every stage in order, stopping at the first failure
    ///
    /// # Errors
    /// `PipelineError` naming the stage that failed
    pub async fn run(&self) -> Result<PipelineReport, PipelineError> {
        let started_at = Utc::now();
        let mut ctx = RunContext::default();
        let mut stages = Vec::with_capacity(Stage::ALL.len());
        let mut skipped = Vec::new();

        for stage in Stage::ALL {
            if self.skips(stage) {
                tracing::info!(stage = %stage, "Skipping stage");
                skipped.push(stage);
                continue;
            }

            let start = Instant::now();
            tracing::debug!(stage = %stage, "Stage started");

            let outcome = self
                .run_stage(stage, &mut ctx)
                .instrument(tracing::info_span!("stage", stage = %stage))
                .await;
            if let Err(source) = outcome {
                tracing::error!(stage = %stage, "Stage failed: {}", source);
                self.reporter.flush();
                return Err(PipelineError::new(stage, source));
            }

            let elapsed_ms = start.elapsed().as_millis() as u64;
            tracing::debug!(stage = %stage, elapsed_ms, "Stage finished");
            stages.push(StageTiming { stage, elapsed_ms });
        }

        self.reporter.flush();
        Ok(PipelineReport {
            started_at,
            stages,
            skipped,
            summary: ctx.summary.unwrap_or_default(),
            totals: ctx.totals.unwrap_or_default(),
            receipt: ctx.receipt,
            payload_path: ctx.payload_path,
        })
    }

    /// Execute one stage against the context
    ///
    /// # Errors
    /// The stage's `CoreError`
    pub async fn run_stage(&self, stage: Stage, ctx: &mut RunContext) -> Result<(), CoreError> {
        match stage {
            Stage::Authenticate => self.authenticate(ctx).await,
            Stage::Deploy => self.deploy(ctx).await,
            Stage::BuildCatalog => self.build_catalog(ctx).await,
            Stage::RunTests => self.run_tests(ctx).await,
            Stage::PollResults => self.poll_results(ctx).await,
            Stage::AggregateCoverage => self.aggregate_coverage(ctx).await,
            Stage::PublishCoverage => self.publish_coverage(ctx).await,
        }
    }

    async fn authenticate(&self, ctx: &mut RunContext) -> Result<(), CoreError> {
        let credentials = &self.config.credentials;
        tracing::info!("Logging in as {}", credentials.username);

        let session = self
            .client
            .login(credentials)
            .await
            .map_err(CoreError::Authentication)?;

        tracing::info!(instance = %session.instance_url, "Logged in");
        ctx.session = Some(session);
        Ok(())
    }

    async fn deploy(&self, ctx: &mut RunContext) -> Result<(), CoreError> {
        let result = deploy_sources(
            self.client.as_ref(),
            &self.config.source_dir(),
            &self.config.deploy,
            &self.reporter,
        )
        .await?;
        ctx.deploy = Some(result);
        Ok(())
    }

    async fn build_catalog(&self, ctx: &mut RunContext) -> Result<(), CoreError> {
        ctx.catalog = build_catalog(self.client.as_ref(), &self.config.classes_dir()).await?;
        Ok(())
    }

    async fn run_tests(&self, ctx: &mut RunContext) -> Result<(), CoreError> {
        let class_ids = ctx.catalog.test_class_ids();
        if class_ids.is_empty() {
            tracing::warn!("No test classes in the project; not submitting a test run");
            ctx.run_id = None;
            return Ok(());
        }

        tracing::info!(classes = class_ids.len(), "Running all tests");
        let run_id = self
            .client
            .run_tests_async(&class_ids)
            .await
            .map_err(CoreError::TestSubmission)?;

        tracing::info!(run_id = %run_id, "Test run submitted");
        ctx.run_id = Some(run_id);
        Ok(())
    }

    async fn poll_results(&self, ctx: &mut RunContext) -> Result<(), CoreError> {
        let Some(run_id) = ctx.run_id.as_ref() else {
            self.reporter.line("No test classes to run");
            ctx.summary = Some(TestRunSummary::default());
            return Ok(());
        };

        let summary = collect_results(
            self.client.as_ref(),
            &ctx.catalog,
            run_id,
            &self.config.test_poll,
        )
        .await?;

        self.reporter.block(&summary.render());
        let verdict = summary.check();
        ctx.summary = Some(summary);
        verdict
    }

    async fn aggregate_coverage(&self, ctx: &mut RunContext) -> Result<(), CoreError> {
        tracing::info!("Fetching code coverage information");

        let records = self
            .client
            .code_coverage()
            .await
            .map_err(CoreError::CoverageQuery)?;
        let applied = aggregate(&mut ctx.catalog, &records);
        let totals = CoverageTotals::from_catalog(&ctx.catalog);

        tracing::info!(
            records = records.len(),
            applied,
            relevant = totals.relevant_lines,
            covered = totals.covered_lines,
            "Coverage {:.2}%",
            totals.percent()
        );
        ctx.totals = Some(totals);
        Ok(())
    }

    async fn publish_coverage(&self, ctx: &mut RunContext) -> Result<(), CoreError> {
        let job = CoverallsJob::from_catalog(&ctx.catalog, &self.config.coveralls);

        if let Some(path) = &self.config.dry_run {
            job.write_to(path).await?;
            tracing::info!(files = job.source_files.len(), "Coverage written to {}", path.display());
            self.reporter
                .line(format!("Coverage payload written to {}", path.display()));
            ctx.payload_path = Some(path.clone());
            return Ok(());
        }

        tracing::info!(files = job.source_files.len(), "Posting data to coveralls");
        let receipt = self.uploader.upload(&job).await?;
        tracing::info!(url = receipt.url.as_deref().unwrap_or(""), "Coverage posted.");
        self.reporter.line("Coverage posted.");
        ctx.receipt = Some(receipt);
        Ok(())
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
