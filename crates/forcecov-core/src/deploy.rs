//! Deploy stage
//!
//! Pushes the project's `src/` directory to the org and prints the deploy
//! report. A result without `success` aborts the run with its status.

use crate::config::DeployOptions;
use crate::error::CoreError;
use crate::platform::PlatformClient;
use crate::reporter::Reporter;
use crate::types::DeployResult;
use std::path::Path;

/// Human-readable deploy report
#[must_use]
pub fn render_deploy_result(result: &DeployResult) -> String {
    let mut out = String::new();
    out.push_str(&format!("Deploy {} : {}\n", result.id, result.status));
    out.push_str(&format!(
        "  Components: {} deployed, {} errors, {} total\n",
        result.number_components_deployed,
        result.number_component_errors,
        result.number_components_total
    ));
    if result.number_tests_completed > 0 || result.number_test_errors > 0 {
        out.push_str(&format!(
            "  Tests: {} completed, {} errors\n",
            result.number_tests_completed, result.number_test_errors
        ));
    }
    if let Some(message) = &result.error_message {
        out.push_str(&format!("  Error: {message}\n"));
    }
    if !result.component_failures.is_empty() {
        out.push_str("  Failures:\n");
        for failure in &result.component_failures {
            let position = match (failure.line_number, failure.column_number) {
                (Some(line), Some(column)) => format!("({line},{column})"),
                (Some(line), None) => format!("({line})"),
                _ => String::new(),
            };
            out.push_str(&format!(
                "   - {}: {}{} {}\n",
                failure.problem_type, failure.file_name, position, failure.problem
            ));
        }
    }
    out
}

/// Deploy `source_dir` and report the result
///
/// # Errors
/// - `CoreError::DeployRequest` if the deploy could not be submitted or polled
/// - `CoreError::DeploymentFailed` carrying the final status when the deploy did not succeed
pub async fn deploy_sources(
    client: &dyn PlatformClient,
    source_dir: &Path,
    options: &DeployOptions,
    reporter: &Reporter,
) -> Result<DeployResult, CoreError> {
    tracing::info!("Deploying package at {}...", source_dir.display());

    let result = client
        .deploy(source_dir, options)
        .await
        .map_err(CoreError::DeployRequest)?;

    reporter.block(&render_deploy_result(&result));

    if !result.success {
        tracing::error!(status = %result.status, errors = result.number_component_errors, "Deploy failed");
        return Err(CoreError::DeploymentFailed {
            status: result.status,
        });
    }

    tracing::info!(
        components = result.number_components_deployed,
        "Deploy {} succeeded",
        result.id
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlatformError;
    use crate::platform::MockPlatformClient;
    use crate::types::ComponentFailure;

    fn failed_result() -> DeployResult {
        DeployResult {
            id: "0Af000000000001".to_string(),
            success: false,
            done: true,
            status: "Failed".to_string(),
            number_components_deployed: 1,
            number_component_errors: 1,
            number_components_total: 2,
            component_failures: vec![ComponentFailure {
                component_type: Some("ApexClass".to_string()),
                file_name: "src/classes/Invoice.cls".to_string(),
                full_name: "Invoice".to_string(),
                line_number: Some(12),
                column_number: Some(5),
                problem: "Variable does not exist: total".to_string(),
                problem_type: "Error".to_string(),
            }],
            ..DeployResult::default()
        }
    }

    #[test]
    fn report_lists_component_failures() {
        let report = render_deploy_result(&failed_result());
        assert!(report.starts_with("Deploy 0Af000000000001 : Failed\n"));
        assert!(report.contains("1 deployed, 1 errors, 2 total"));
        assert!(report.contains(
            "   - Error: src/classes/Invoice.cls(12,5) Variable does not exist: total"
        ));
        assert!(!report.contains("Tests:"));
    }

    #[tokio::test]
    async fn unsuccessful_deploy_aborts_with_status() {
        let mut client = MockPlatformClient::new();
        client
            .expect_deploy()
            .times(1)
            .returning(|_, _| Ok(failed_result()));
        let (reporter, out) = Reporter::capture();

        let err = deploy_sources(&client, Path::new("src"), &DeployOptions::default(), &reporter)
            .await
            .unwrap_err();

        match err {
            CoreError::DeploymentFailed { status } => assert_eq!(status, "Failed"),
            other => panic!("expected DeploymentFailed, got {other:?}"),
        }
        assert!(out.contents().contains("Invoice.cls(12,5)"));
    }

    #[tokio::test]
    async fn successful_deploy_passes_result_through() {
        let mut client = MockPlatformClient::new();
        client.expect_deploy().returning(|_, options| {
            assert!(options.rollback_on_error);
            Ok(DeployResult {
                id: "0Af1".to_string(),
                success: true,
                done: true,
                status: "Succeeded".to_string(),
                number_components_deployed: 3,
                number_components_total: 3,
                ..DeployResult::default()
            })
        });
        let (reporter, _out) = Reporter::capture();

        let result = deploy_sources(&client, Path::new("src"), &DeployOptions::default(), &reporter)
            .await
            .unwrap();
        assert_eq!(result.number_components_deployed, 3);
    }

    #[tokio::test]
    async fn request_errors_are_wrapped() {
        let mut client = MockPlatformClient::new();
        client
            .expect_deploy()
            .returning(|_, _| Err(PlatformError::Timeout { waited_secs: 300 }));
        let (reporter, _out) = Reporter::capture();

        let err = deploy_sources(&client, Path::new("src"), &DeployOptions::default(), &reporter)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::DeployRequest(PlatformError::Timeout { .. })));
    }
}
