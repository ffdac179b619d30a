//! Core types for forcecov
//!
//! Defines the records that flow through the pipeline:
//! - Class identifiers and test run identifiers
//! - Class records with their coverage arrays
//! - Test queue items and per-method test results
//! - Coverage records and deploy results reported by the org

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque class identifier assigned by the org
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassId(pub String);

impl ClassId {
    /// Create a class id
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClassId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Identifier of one asynchronous test run (the parent job id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestRunId(pub String);

impl TestRunId {
    /// Create a run id
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TestRunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Session established by a successful login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Base URL of the org instance serving API calls
    pub instance_url: String,
    /// Logged-in user id
    pub user_id: Option<String>,
    /// Org id
    pub organization_id: Option<String>,
}

/// Class row as listed by the org
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApexClassRow {
    /// Class id
    pub id: ClassId,
    /// Class name (file stem)
    pub name: String,
    /// Source body
    pub body: String,
}

impl ApexClassRow {
    /// Create a class row
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: ClassId::new(id),
            name: name.into(),
            body: body.into(),
        }
    }
}

/// Role of a class inside the project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassRole {
    /// Code whose coverage is reported
    Production,
    /// Code that holds unit tests
    Test,
}

/// A project class known to the org
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassRecord {
    /// Class id
    pub id: ClassId,
    /// Bare class name
    pub class_name: String,
    /// Repository-relative path (`src/classes/<Name>.cls`)
    pub path: String,
    /// Source body
    pub source: String,
    /// Production or test
    pub role: ClassRole,
    /// Per-line hit counts, `None` where the org reported nothing
    pub coverage: Vec<Option<u32>>,
}

impl ClassRecord {
    /// Build a record from an org row
    #[must_use]
    pub fn from_row(row: ApexClassRow, role: ClassRole) -> Self {
        Self {
            path: class_path(&row.name),
            id: row.id,
            class_name: row.name,
            source: row.body,
            role,
            coverage: Vec::new(),
        }
    }

    /// Whether this is a test class
    #[inline]
    #[must_use]
    pub fn is_test(&self) -> bool {
        self.role == ClassRole::Test
    }
}

/// Repository path of a class file
#[inline]
#[must_use]
pub fn class_path(class_name: &str) -> String {
    format!("src/classes/{class_name}.cls")
}

/// Status of a test queue item
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueueStatus {
    /// Waiting on an earlier job
    Holding,
    /// Waiting to start
    Queued,
    /// Being prepared
    Preparing,
    /// Running
    Processing,
    /// Cancelled
    Aborted,
    /// Finished
    Completed,
    /// Finished with a system failure
    Failed,
    /// Status string this client does not know
    #[serde(other)]
    Unknown,
}

impl QueueStatus {
    /// Whether the item still has work outstanding
    #[inline]
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            Self::Holding | Self::Queued | Self::Preparing | Self::Processing
        )
    }
}

/// One class's progress within a test run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestQueueItem {
    /// Queue item id
    pub id: String,
    /// Progress status
    pub status: QueueStatus,
    /// Test class being executed
    pub class_id: ClassId,
    /// Free-text status such as `(4/4)`
    pub extended_status: Option<String>,
}

/// Outcome of one test method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TestOutcome {
    /// Passed
    Pass,
    /// Failed an assertion or threw
    Fail,
    /// Failed to compile
    CompileFail,
    /// Skipped
    Skip,
}

impl TestOutcome {
    /// Collapse `CompileFail` into `Fail`
    #[inline]
    #[must_use]
    pub fn normalized(self) -> Self {
        match self {
            Self::CompileFail => Self::Fail,
            other => other,
        }
    }

    /// Terminal icon
    #[inline]
    #[must_use]
    pub fn icon(self) -> &'static str {
        match self.normalized() {
            Self::Pass => "✓",
            Self::Skip => "⤼",
            Self::Fail | Self::CompileFail => "✗",
        }
    }
}

/// Per-method test result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResultRecord {
    /// Owning test class
    pub class_id: ClassId,
    /// Method name
    pub method_name: String,
    /// Outcome as reported
    pub outcome: TestOutcome,
    /// Failure message
    pub message: Option<String>,
    /// Failure stack trace
    pub stack_trace: Option<String>,
}

/// Line coverage of one class or trigger from one test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageRecord {
    /// Owning class or trigger
    pub class_or_trigger_id: ClassId,
    /// 1-based line numbers that executed
    pub covered_lines: Vec<u32>,
    /// 1-based line numbers that are executable but did not execute
    pub uncovered_lines: Vec<u32>,
}

impl CoverageRecord {
    /// Create a coverage record
    #[must_use]
    pub fn new(id: impl Into<String>, covered_lines: Vec<u32>, uncovered_lines: Vec<u32>) -> Self {
        Self {
            class_or_trigger_id: ClassId::new(id),
            covered_lines,
            uncovered_lines,
        }
    }

    /// Highest line number mentioned by the record
    #[inline]
    #[must_use]
    pub fn max_line(&self) -> Option<u32> {
        self.covered_lines
            .iter()
            .chain(self.uncovered_lines.iter())
            .copied()
            .max()
    }
}

/// A component the deploy could not save
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentFailure {
    /// Metadata type, e.g. `ApexClass`
    pub component_type: Option<String>,
    /// File inside the deploy archive
    pub file_name: String,
    /// Component name
    pub full_name: String,
    /// Source line
    pub line_number: Option<u32>,
    /// Source column
    pub column_number: Option<u32>,
    /// Problem description
    pub problem: String,
    /// `Error` or `Warning`
    pub problem_type: String,
}

/// Final state of a metadata deploy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployResult {
    /// Deploy request id
    pub id: String,
    /// Whether the deploy succeeded
    pub success: bool,
    /// Whether the org finished processing the request
    pub done: bool,
    /// Status such as `Succeeded`, `Failed`, `Canceled`
    pub status: String,
    /// Components saved
    pub number_components_deployed: u32,
    /// Components with errors
    pub number_component_errors: u32,
    /// Components in the archive
    pub number_components_total: u32,
    /// Tests run by the deploy
    pub number_tests_completed: u32,
    /// Tests that failed during the deploy
    pub number_test_errors: u32,
    /// Org-level failure message
    pub error_message: Option<String>,
    /// Per-component failures
    pub component_failures: Vec<ComponentFailure>,
}
