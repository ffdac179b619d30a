//! REST and Tooling API payloads
//!
//! Rows come back in the platform's PascalCase and are converted into core
//! types at this boundary.

use forcecov_core::{
    ApexClassRow, ClassId, ComponentFailure, CoverageRecord, DeployResult, QueueStatus,
    TestOutcome, TestQueueItem, TestResultRecord,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

/// One page of a SOQL query
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QueryPage<T> {
    #[serde(default)]
    pub(crate) total_size: usize,
    pub(crate) done: bool,
    #[serde(default)]
    pub(crate) next_records_url: Option<String>,
    #[serde(default = "Vec::new")]
    pub(crate) records: Vec<T>,
}

/// REST error entry
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiErrorEntry {
    pub(crate) message: String,
    #[serde(default)]
    pub(crate) error_code: Option<String>,
}

/// Render an error response body as one message
pub(crate) fn error_message(body: &str) -> String {
    match serde_json::from_str::<Vec<ApiErrorEntry>>(body) {
        Ok(entries) if !entries.is_empty() => entries
            .into_iter()
            .map(|e| match e.error_code {
                Some(code) => format!("{code}: {}", e.message),
                None => e.message,
            })
            .collect::<Vec<_>>()
            .join("; "),
        _ if body.trim().is_empty() => "empty response".to_string(),
        _ => body.trim().to_string(),
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ApexClassWire {
    pub(crate) id: String,
    pub(crate) name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub(crate) body: String,
}

impl From<ApexClassWire> for ApexClassRow {
    fn from(row: ApexClassWire) -> Self {
        ApexClassRow::new(row.id, row.name, row.body)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct QueueItemWire {
    pub(crate) id: String,
    pub(crate) status: QueueStatus,
    pub(crate) apex_class_id: String,
    #[serde(default)]
    pub(crate) extended_status: Option<String>,
}

impl From<QueueItemWire> for TestQueueItem {
    fn from(row: QueueItemWire) -> Self {
        TestQueueItem {
            id: row.id,
            status: row.status,
            class_id: ClassId::new(row.apex_class_id),
            extended_status: row.extended_status,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct TestResultWire {
    pub(crate) apex_class_id: String,
    pub(crate) method_name: String,
    pub(crate) outcome: TestOutcome,
    #[serde(default)]
    pub(crate) message: Option<String>,
    #[serde(default)]
    pub(crate) stack_trace: Option<String>,
}

impl From<TestResultWire> for TestResultRecord {
    fn from(row: TestResultWire) -> Self {
        TestResultRecord {
            class_id: ClassId::new(row.apex_class_id),
            method_name: row.method_name,
            outcome: row.outcome,
            message: row.message,
            stack_trace: row.stack_trace,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CoverageLines {
    #[serde(default, deserialize_with = "null_as_default")]
    pub(crate) covered_lines: Vec<u32>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub(crate) uncovered_lines: Vec<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct CodeCoverageWire {
    pub(crate) apex_class_or_trigger_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub(crate) coverage: CoverageLines,
}

impl From<CodeCoverageWire> for CoverageRecord {
    fn from(row: CodeCoverageWire) -> Self {
        CoverageRecord::new(
            row.apex_class_or_trigger_id,
            row.coverage.covered_lines,
            row.coverage.uncovered_lines,
        )
    }
}

/// `runTestsAsynchronous` request body
#[derive(Debug, Clone, Serialize)]
pub(crate) struct RunTestsRequest {
    pub(crate) classids: String,
}

impl RunTestsRequest {
    pub(crate) fn new(ids: &[ClassId]) -> Self {
        Self {
            classids: ids.iter().map(ClassId::as_str).collect::<Vec<_>>().join(","),
        }
    }
}

/// `deployRequest` response envelope
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DeployResponse {
    #[serde(default)]
    pub(crate) id: Option<String>,
    pub(crate) deploy_result: DeployResultWire,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct DeployResultWire {
    pub(crate) id: String,
    pub(crate) success: bool,
    pub(crate) done: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub(crate) status: String,
    pub(crate) number_components_deployed: u32,
    pub(crate) number_component_errors: u32,
    pub(crate) number_components_total: u32,
    pub(crate) number_tests_completed: u32,
    pub(crate) number_test_errors: u32,
    pub(crate) error_message: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub(crate) details: DeployDetailsWire,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct DeployDetailsWire {
    #[serde(deserialize_with = "null_as_default")]
    pub(crate) component_failures: Vec<ComponentFailureWire>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct ComponentFailureWire {
    pub(crate) component_type: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub(crate) file_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub(crate) full_name: String,
    pub(crate) line_number: Option<u32>,
    pub(crate) column_number: Option<u32>,
    #[serde(deserialize_with = "null_as_default")]
    pub(crate) problem: String,
    #[serde(deserialize_with = "null_as_default")]
    pub(crate) problem_type: String,
}

impl From<DeployResultWire> for DeployResult {
    fn from(wire: DeployResultWire) -> Self {
        DeployResult {
            id: wire.id,
            success: wire.success,
            done: wire.done,
            status: wire.status,
            number_components_deployed: wire.number_components_deployed,
            number_component_errors: wire.number_component_errors,
            number_components_total: wire.number_components_total,
            number_tests_completed: wire.number_tests_completed,
            number_test_errors: wire.number_test_errors,
            error_message: wire.error_message,
            component_failures: wire
                .details
                .component_failures
                .into_iter()
                .map(|f| ComponentFailure {
                    component_type: f.component_type,
                    file_name: f.file_name,
                    full_name: f.full_name,
                    line_number: f.line_number,
                    column_number: f.column_number,
                    problem: f.problem,
                    problem_type: f.problem_type,
                })
                .collect(),
        }
    }
}

/// Decode one JSON body, naming the target on failure
pub(crate) fn decode<T: DeserializeOwned>(body: &[u8], what: &str) -> Result<T, forcecov_core::PlatformError> {
    serde_json::from_slice(body).map_err(|e| {
        forcecov_core::PlatformError::InvalidResponse(format!("cannot decode {what}: {e}"))
    })
}
