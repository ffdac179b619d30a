//! Testing utilities for forcecov workspace
//!
//! An in-memory org, a recording uploader, and project fixtures.

#![allow(missing_docs)]

use forcecov_core::{
    ApexClassRow, ClassId, CoverageRecord, CoverageUploader, CoverallsJob, Credentials,
    DeployOptions, DeployResult, PlatformClient, PlatformError, QueueStatus, SessionInfo,
    TestOutcome, TestQueueItem, TestResultRecord, TestRunId, UploadError, UploadReceipt,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

pub const RUN_ID: &str = "7070000000000AA";

/// Calls seen by a [`FakeOrg`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrgCalls {
    pub logins: usize,
    pub deploys: Vec<PathBuf>,
    pub list_classes: usize,
    pub submitted: Vec<Vec<ClassId>>,
    pub queue_polls: usize,
    pub result_fetches: usize,
    pub coverage_fetches: usize,
}

/// In-memory org
///
/// Queue polls pop scripted snapshots; once one snapshot remains it is
/// returned on every further poll.
#[derive(Debug, Default)]
pub struct FakeOrg {
    pub password: String,
    pub deploy_result: Option<DeployResult>,
    pub classes: Vec<ApexClassRow>,
    pub queue_snapshots: Mutex<VecDeque<Vec<TestQueueItem>>>,
    pub results: Vec<TestResultRecord>,
    pub coverage: Vec<CoverageRecord>,
    pub calls: Mutex<OrgCalls>,
}

impl FakeOrg {
    pub fn new() -> Self {
        Self {
            password: "passwordTOKEN".to_string(),
            deploy_result: Some(deploy_succeeded()),
            ..Self::default()
        }
    }

    pub fn with_class(mut self, id: &str, name: &str, body: &str) -> Self {
        self.classes.push(ApexClassRow::new(id, name, body));
        self
    }

    pub fn with_deploy_result(mut self, result: DeployResult) -> Self {
        self.deploy_result = Some(result);
        self
    }

    pub fn with_queue_snapshot(self, items: Vec<TestQueueItem>) -> Self {
        self.queue_snapshots.lock().push_back(items);
        self
    }

    pub fn with_result(mut self, class_id: &str, method: &str, outcome: TestOutcome) -> Self {
        self.results.push(TestResultRecord {
            class_id: ClassId::from(class_id),
            method_name: method.to_string(),
            outcome,
            message: None,
            stack_trace: None,
        });
        self
    }

    pub fn with_coverage(mut self, id: &str, covered: &[u32], uncovered: &[u32]) -> Self {
        self.coverage
            .push(CoverageRecord::new(id, covered.to_vec(), uncovered.to_vec()));
        self
    }

    pub fn calls(&self) -> OrgCalls {
        self.calls.lock().clone()
    }
}

#[async_trait::async_trait]
impl PlatformClient for FakeOrg {
    async fn login(&self, credentials: &Credentials) -> Result<SessionInfo, PlatformError> {
        self.calls.lock().logins += 1;
        if credentials.password_with_token() != self.password {
            return Err(PlatformError::Fault {
                code: "INVALID_LOGIN".to_string(),
                message: "Invalid username, password, security token; or user locked out."
                    .to_string(),
            });
        }
        Ok(SessionInfo {
            instance_url: "https://fake.my.salesforce.com".to_string(),
            user_id: Some("005000000000001".to_string()),
            organization_id: Some("00D000000000001".to_string()),
        })
    }

    async fn deploy(
        &self,
        source_dir: &Path,
        _options: &DeployOptions,
    ) -> Result<DeployResult, PlatformError> {
        self.calls.lock().deploys.push(source_dir.to_path_buf());
        self.deploy_result
            .clone()
            .ok_or_else(|| PlatformError::InvalidResponse("no deploy result scripted".to_string()))
    }

    async fn list_classes(&self) -> Result<Vec<ApexClassRow>, PlatformError> {
        self.calls.lock().list_classes += 1;
        Ok(self.classes.clone())
    }

    async fn run_tests_async(&self, class_ids: &[ClassId]) -> Result<TestRunId, PlatformError> {
        self.calls.lock().submitted.push(class_ids.to_vec());
        Ok(TestRunId::new(RUN_ID))
    }

    async fn queue_items(&self, run_id: &TestRunId) -> Result<Vec<TestQueueItem>, PlatformError> {
        assert_eq!(run_id.as_str(), RUN_ID, "queue polled for an unknown run");
        self.calls.lock().queue_polls += 1;
        let mut snapshots = self.queue_snapshots.lock();
        let items = if snapshots.len() > 1 {
            snapshots.pop_front().unwrap_or_default()
        } else {
            snapshots.front().cloned().unwrap_or_default()
        };
        Ok(items)
    }

    async fn test_results(
        &self,
        _run_id: &TestRunId,
    ) -> Result<Vec<TestResultRecord>, PlatformError> {
        self.calls.lock().result_fetches += 1;
        Ok(self.results.clone())
    }

    async fn code_coverage(&self) -> Result<Vec<CoverageRecord>, PlatformError> {
        self.calls.lock().coverage_fetches += 1;
        Ok(self.coverage.clone())
    }
}

/// Uploader that keeps every job
#[derive(Debug, Default)]
pub struct RecordingUploader {
    pub jobs: Mutex<Vec<CoverallsJob>>,
    pub reject_with: Option<String>,
}

impl RecordingUploader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting(message: &str) -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
            reject_with: Some(message.to_string()),
        }
    }

    pub fn jobs(&self) -> Vec<CoverallsJob> {
        self.jobs.lock().clone()
    }
}

#[async_trait::async_trait]
impl CoverageUploader for RecordingUploader {
    async fn upload(&self, job: &CoverallsJob) -> Result<UploadReceipt, UploadError> {
        self.jobs.lock().push(job.clone());
        match &self.reject_with {
            Some(message) => Err(UploadError::Rejected {
                status: Some(422),
                message: message.clone(),
            }),
            None => Ok(UploadReceipt {
                message: Some(format!("Job #{}", job.service_job_id)),
                url: Some("https://coveralls.io/jobs/1".to_string()),
            }),
        }
    }
}

pub fn deploy_succeeded() -> DeployResult {
    DeployResult {
        id: "0Af000000000001".to_string(),
        success: true,
        done: true,
        status: "Succeeded".to_string(),
        number_components_deployed: 4,
        number_components_total: 4,
        ..DeployResult::default()
    }
}

pub fn queue_item(class_id: &str, status: QueueStatus) -> TestQueueItem {
    TestQueueItem {
        id: format!("709{class_id}"),
        status,
        class_id: ClassId::from(class_id),
        extended_status: Some("(1/1)".to_string()),
    }
}

pub fn production_body(name: &str) -> String {
    format!("public class {name} {{\n    public Integer run() {{\n        return 1;\n    }}\n}}\n")
}

pub fn test_body(name: &str) -> String {
    format!("@isTest\nprivate class {name} {{\n    @isTest static void runs() {{}}\n}}\n")
}

/// Project directory with `src/classes/<name>.cls` for every name
pub fn project_with_classes(names: &[&str]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("create temp project");
    let classes = dir.path().join("src").join("classes");
    std::fs::create_dir_all(&classes).expect("create classes dir");
    for name in names {
        std::fs::write(classes.join(format!("{name}.cls")), production_body(name))
            .expect("write class file");
    }
    std::fs::write(
        dir.path().join("src").join("package.xml"),
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Package xmlns=\"http://soap.sforce.com/2006/04/metadata\"><version>59.0</version></Package>\n",
    )
    .expect("write package.xml");
    dir
}
