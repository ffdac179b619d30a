//! Pipeline Tests
//!
//! Full runs against an in-memory org.

use forcecov_core::prelude::*;
use forcecov_core::{QueueStatus, TestOutcome};
use forcecov_test_utils::{
    deploy_succeeded, production_body, project_with_classes, queue_item, test_body, FakeOrg,
    RecordingUploader,
};
use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn config(project: &Path) -> PipelineConfig {
    PipelineConfig::new(
        Credentials::new("ci@example.com", "password", "TOKEN"),
        project,
        CoverallsSettings::new("repo-token", "1234"),
    )
    .with_test_poll(PollPolicy::new(Duration::from_millis(10), Some(Duration::from_secs(5))))
}

fn sample_org() -> FakeOrg {
    FakeOrg::new()
        .with_class("01pA", "A", &production_body("A"))
        .with_class("01pB", "B", &production_body("B"))
        .with_class("01pT", "ATest", &test_body("ATest"))
        .with_class("01pX", "NotInProject", &production_body("NotInProject"))
        .with_queue_snapshot(vec![queue_item("01pT", QueueStatus::Queued)])
        .with_queue_snapshot(vec![queue_item("01pT", QueueStatus::Processing)])
        .with_queue_snapshot(vec![queue_item("01pT", QueueStatus::Completed)])
        .with_result("01pT", "testTotals", TestOutcome::Pass)
        .with_result("01pT", "testEmpty", TestOutcome::Pass)
        .with_coverage("01pA", &[1, 3], &[2])
        .with_coverage("01pB", &[1], &[2])
        .with_coverage("01pB", &[2], &[1])
        .with_coverage("01pT", &[1], &[])
}

#[tokio::test]
async fn test_full_run_uploads_merged_coverage() {
    let project = project_with_classes(&["A", "B", "ATest"]);
    let org = Arc::new(sample_org());
    let uploader = Arc::new(RecordingUploader::new());
    let (reporter, out) = Reporter::capture();

    let report = Pipeline::new(config(project.path()), org.clone(), uploader.clone())
        .with_reporter(reporter)
        .run()
        .await
        .unwrap();

    assert_eq!(report.summary.passed, 2);
    assert_eq!(report.stages.len(), Stage::ALL.len());
    assert!(report.skipped.is_empty());
    assert!(report.receipt.is_some());

    let calls = org.calls();
    assert_eq!(calls.logins, 1);
    assert_eq!(calls.deploys, vec![project.path().join("src")]);
    assert_eq!(calls.submitted, vec![vec![forcecov_core::ClassId::from("01pT")]]);
    assert_eq!(calls.queue_polls, 3);

    let jobs = uploader.jobs();
    assert_eq!(jobs.len(), 1);
    let job = &jobs[0];
    assert_eq!(job.repo_token, "repo-token");
    assert_eq!(job.service_name, "travis-ci");
    assert_eq!(job.service_job_id, "1234");

    let files: Vec<_> = job
        .source_files
        .iter()
        .map(|f| (f.name.as_str(), f.coverage.clone()))
        .collect();
    assert_eq!(
        files,
        vec![
            ("src/classes/A.cls", vec![Some(1), Some(0), Some(1)]),
            ("src/classes/B.cls", vec![Some(1), Some(1)]),
        ]
    );

    assert_eq!(report.totals.relevant_lines, 5);
    assert_eq!(report.totals.covered_lines, 4);

    let printed = out.contents();
    assert!(printed.contains("Deploy 0Af000000000001 : Succeeded"));
    assert!(printed.contains("\tATest (1/1)\n\t\t✓ testEmpty\n\t\t✓ testTotals\n"));
    assert!(printed.contains("All 2 tests passed!"));
    assert!(printed.contains("Coverage posted."));
}

#[tokio::test]
async fn test_failing_tests_stop_before_coverage() {
    let project = project_with_classes(&["A", "ATest"]);
    let org = Arc::new(
        FakeOrg::new()
            .with_class("01pA", "A", &production_body("A"))
            .with_class("01pT", "ATest", &test_body("ATest"))
            .with_queue_snapshot(vec![queue_item("01pT", QueueStatus::Completed)])
            .with_result("01pT", "testOk", TestOutcome::Pass)
            .with_result("01pT", "testBroken", TestOutcome::CompileFail),
    );
    let uploader = Arc::new(RecordingUploader::new());
    let (reporter, out) = Reporter::capture();

    let err = Pipeline::new(config(project.path()), org.clone(), uploader.clone())
        .with_reporter(reporter)
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::PollResults);
    assert_eq!(err.exit_code(), 2);
    assert_eq!(org.calls().coverage_fetches, 0);
    assert!(uploader.jobs().is_empty());
    assert!(out.contents().contains("\t\t✗ testBroken\n"));
    assert!(out.contents().contains("There were 1 failing tests"));
}

#[tokio::test]
async fn test_failed_deploy_aborts_the_run() {
    let project = project_with_classes(&["A"]);
    let mut failed = deploy_succeeded();
    failed.success = false;
    failed.status = "Failed".to_string();
    failed.number_component_errors = 1;
    let org = Arc::new(FakeOrg::new().with_deploy_result(failed));
    let uploader = Arc::new(RecordingUploader::new());

    let err = Pipeline::new(config(project.path()), org.clone(), uploader.clone())
        .with_reporter(Reporter::capture().0)
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::Deploy);
    assert_eq!(err.exit_code(), 1);
    assert!(err.to_string().contains("Failed"));
    assert_eq!(org.calls().list_classes, 0);
}

#[tokio::test]
async fn test_bad_credentials_fail_authentication() {
    let project = project_with_classes(&["A"]);
    let mut org = FakeOrg::new();
    org.password = "something-else".to_string();
    let org = Arc::new(org);

    let err = Pipeline::new(
        config(project.path()),
        org.clone(),
        Arc::new(RecordingUploader::new()),
    )
    .with_reporter(Reporter::capture().0)
    .run()
    .await
    .unwrap_err();

    assert_eq!(err.stage, Stage::Authenticate);
    assert!(err.source.is_auth_failure());
    assert!(org.calls().deploys.is_empty());
}

#[tokio::test]
async fn test_dry_run_writes_payload_instead_of_uploading() {
    let project = project_with_classes(&["A", "B", "ATest"]);
    let payload = project.path().join("coverallsData.json");
    let uploader = Arc::new(RecordingUploader::new());

    let report = Pipeline::new(
        config(project.path()).with_dry_run(&payload).skip_deploy(true),
        Arc::new(sample_org()),
        uploader.clone(),
    )
    .with_reporter(Reporter::capture().0)
    .run()
    .await
    .unwrap();

    assert_eq!(report.skipped, vec![Stage::Deploy]);
    assert_eq!(report.payload_path.as_deref(), Some(payload.as_path()));
    assert!(report.receipt.is_none());
    assert!(uploader.jobs().is_empty());

    let written: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&payload).unwrap()).unwrap();
    assert_eq!(written["source_files"][0]["coverage"], serde_json::json!([1, 0, 1]));
    assert_eq!(written["source_files"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_project_without_tests_still_publishes() {
    let project = project_with_classes(&["A"]);
    let org = Arc::new(
        FakeOrg::new()
            .with_class("01pA", "A", &production_body("A"))
            .with_coverage("01pA", &[], &[1, 2]),
    );
    let uploader = Arc::new(RecordingUploader::new());
    let (reporter, out) = Reporter::capture();

    let report = Pipeline::new(config(project.path()), org.clone(), uploader.clone())
        .with_reporter(reporter)
        .run()
        .await
        .unwrap();

    assert!(org.calls().submitted.is_empty());
    assert_eq!(report.summary.total(), 0);
    assert!(out.contents().contains("No test classes to run"));
    assert_eq!(
        uploader.jobs()[0].source_files[0].coverage,
        vec![Some(0), Some(0)]
    );
}

#[tokio::test]
async fn test_rejected_upload_is_reported_at_publish_stage() {
    let project = project_with_classes(&["A", "B", "ATest"]);
    let uploader = Arc::new(RecordingUploader::rejecting("Couldn't find a repository matching this job."));

    let err = Pipeline::new(config(project.path()), Arc::new(sample_org()), uploader)
        .with_reporter(Reporter::capture().0)
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::PublishCoverage);
    assert!(err.to_string().contains("Couldn't find a repository"));
}

#[tokio::test]
async fn test_stalled_run_times_out() {
    let project = project_with_classes(&["ATest"]);
    let org = Arc::new(
        FakeOrg::new()
            .with_class("01pT", "ATest", &test_body("ATest"))
            .with_queue_snapshot(vec![queue_item("01pT", QueueStatus::Processing)]),
    );
    let cfg = config(project.path())
        .with_test_poll(PollPolicy::new(Duration::from_millis(5), Some(Duration::from_millis(40))));

    let err = Pipeline::new(cfg, org.clone(), Arc::new(RecordingUploader::new()))
        .with_reporter(Reporter::capture().0)
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::PollResults);
    assert!(matches!(err.source, CoreError::PollTimeout { .. }));
    assert!(org.calls().queue_polls >= 2);
    assert_eq!(org.calls().result_fetches, 0);
}
