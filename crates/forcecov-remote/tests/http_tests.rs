//! HTTP Client Tests
//!
//! Runs the clients against local warp servers that mimic the org and
//! Coveralls endpoints.

use forcecov_core::{
    ClassId, CoverageUploader, CoverallsJob, Credentials, DeployOptions, PlatformClient,
    PlatformError, PollPolicy, QueueStatus, SourceFile, TestOutcome, TestRunId, UploadError,
};
use forcecov_remote::{ClientConfig, CoverallsClient, ForceClient};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::Filter;

const SESSION: &str = "00D!SESSION-1";

fn login_ok(host: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/" xmlns="urn:partner.soap.sforce.com">
<soapenv:Body><loginResponse><result>
<serverUrl>http://{host}/services/Soap/u/59.0/00D000000000001</serverUrl>
<sessionId>{SESSION}</sessionId>
<userId>005000000000001AAA</userId>
<userInfo><organizationId>00D000000000001EAA</organizationId></userInfo>
</result></loginResponse></soapenv:Body></soapenv:Envelope>"#
    )
}

fn login_route(
    seen: Arc<Mutex<Vec<String>>>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::post()
        .and(warp::path!("services" / "Soap" / "u" / String))
        .and(warp::header::<String>("host"))
        .and(warp::header::exact("soapaction", "login"))
        .and(warp::body::bytes())
        .map(move |version: String, host: String, body: Bytes| {
            assert_eq!(version, "59.0");
            seen.lock().push(String::from_utf8_lossy(&body).into_owned());
            warp::reply::with_header(login_ok(&host), "content-type", "text/xml")
        })
}

fn bearer() -> impl Filter<Extract = (), Error = warp::Rejection> + Clone {
    warp::header::exact("authorization", "Bearer 00D!SESSION-1")
}

fn credentials(base: &str) -> Credentials {
    Credentials::new("ci@example.com", "secret&pw", "TOKEN").with_login_url(base)
}

fn fast_client() -> ForceClient {
    ForceClient::new(ClientConfig::default().with_deploy_poll(PollPolicy::new(
        Duration::from_millis(10),
        Some(Duration::from_secs(5)),
    )))
    .unwrap()
}

#[tokio::test]
async fn test_login_stores_session_and_reports_instance() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (addr, server) =
        warp::serve(login_route(seen.clone())).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);
    let base = format!("http://{addr}");

    let client = fast_client();
    let session = client.login(&credentials(&format!("{base}/"))).await.unwrap();

    assert_eq!(session.instance_url, base);
    assert_eq!(session.user_id.as_deref(), Some("005000000000001AAA"));
    assert_eq!(session.organization_id.as_deref(), Some("00D000000000001EAA"));
    assert!(client.is_logged_in());

    let envelope = seen.lock()[0].clone();
    assert!(envelope.contains("<n1:username>ci@example.com</n1:username>"));
    assert!(envelope.contains("<n1:password>secret&amp;pwTOKEN</n1:password>"));
}

#[tokio::test]
async fn test_login_fault_is_surfaced() {
    let route = warp::post().and(warp::path!("services" / "Soap" / "u" / String)).map(|_v: String| {
        let fault = r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/"><soapenv:Body><soapenv:Fault><faultcode>sf:INVALID_LOGIN</faultcode><faultstring>INVALID_LOGIN: Invalid username, password, security token; or user locked out.</faultstring></soapenv:Fault></soapenv:Body></soapenv:Envelope>"#;
        warp::reply::with_status(
            warp::reply::with_header(fault, "content-type", "text/xml"),
            StatusCode::INTERNAL_SERVER_ERROR,
        )
    });
    let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);

    let client = fast_client();
    let err = client
        .login(&credentials(&format!("http://{addr}")))
        .await
        .unwrap_err();

    match err {
        PlatformError::Fault { code, .. } => assert_eq!(code, "INVALID_LOGIN"),
        other => panic!("expected fault, got {other:?}"),
    }
    assert!(!client.is_logged_in());
}

#[tokio::test]
async fn test_class_query_follows_next_records_url() {
    let queries = Arc::new(Mutex::new(Vec::new()));
    let recorded = queries.clone();
    let first = warp::get()
        .and(warp::path!("services" / "data" / "v59.0" / "query"))
        .and(bearer())
        .and(warp::query::<HashMap<String, String>>())
        .map(move |q: HashMap<String, String>| {
            recorded.lock().push(q.get("q").cloned().unwrap_or_default());
            warp::reply::json(&serde_json::json!({
                "totalSize": 3,
                "done": false,
                "nextRecordsUrl": "/services/data/v59.0/query/01gNEXT-2000",
                "records": [
                    {"attributes": {"type": "ApexClass"}, "Id": "01pA", "Name": "A", "Body": "public class A {}"},
                    {"attributes": {"type": "ApexClass"}, "Id": "01pT", "Name": "ATest", "Body": "@isTest class ATest {}"}
                ]
            }))
        });
    let second = warp::get()
        .and(warp::path!("services" / "data" / "v59.0" / "query" / String))
        .and(bearer())
        .map(|cursor: String| {
            assert_eq!(cursor, "01gNEXT-2000");
            warp::reply::json(&serde_json::json!({
                "totalSize": 3,
                "done": true,
                "records": [
                    {"Id": "01pM", "Name": "Managed", "Body": null}
                ]
            }))
        });
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (addr, server) = warp::serve(login_route(seen).or(first).or(second))
        .bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);

    let client = fast_client();
    client.login(&credentials(&format!("http://{addr}"))).await.unwrap();
    let rows = client.list_classes().await.unwrap();

    let names: Vec<_> = rows.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["A", "ATest", "Managed"]);
    assert_eq!(rows[2].body, "");
    assert_eq!(
        queries.lock().clone(),
        vec!["SELECT Id, Name, Body FROM ApexClass".to_string()]
    );
}

#[tokio::test]
async fn test_run_tests_and_poll_queue() {
    let posted = Arc::new(Mutex::new(None));
    let posted_in = posted.clone();
    let run = warp::post()
        .and(warp::path!("services" / "data" / "v59.0" / "tooling" / "runTestsAsynchronous"))
        .and(bearer())
        .and(warp::body::json())
        .map(move |body: serde_json::Value| {
            *posted_in.lock() = Some(body);
            warp::reply::json(&"7070000000000AA")
        });
    let queue = warp::get()
        .and(warp::path!("services" / "data" / "v59.0" / "query"))
        .and(bearer())
        .and(warp::query::<HashMap<String, String>>())
        .map(|q: HashMap<String, String>| {
            let soql = q.get("q").cloned().unwrap_or_default();
            if soql.contains("FROM ApexTestQueueItem") {
                assert!(soql.ends_with("WHERE ParentJobId = '7070000000000AA'"));
                warp::reply::json(&serde_json::json!({
                    "done": true,
                    "records": [
                        {"Id": "709a", "Status": "Processing", "ApexClassId": "01pT", "ExtendedStatus": "(1/3)"}
                    ]
                }))
            } else {
                assert!(soql.contains("FROM ApexTestResult WHERE AsyncApexJobId = '7070000000000AA'"));
                warp::reply::json(&serde_json::json!({
                    "done": true,
                    "records": [
                        {"Id": "07Ma", "ApexClassId": "01pT", "MethodName": "testTotals", "Outcome": "CompileFail",
                         "Message": "Compile error", "StackTrace": null}
                    ]
                }))
            }
        });
    let (addr, server) = warp::serve(login_route(Arc::default()).or(run).or(queue))
        .bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);

    let client = fast_client();
    client.login(&credentials(&format!("http://{addr}"))).await.unwrap();

    let run_id = client
        .run_tests_async(&[ClassId::from("01pT"), ClassId::from("01pU")])
        .await
        .unwrap();
    assert_eq!(run_id, TestRunId::new("7070000000000AA"));
    assert_eq!(
        posted.lock().clone(),
        Some(serde_json::json!({"classids": "01pT,01pU"}))
    );

    let items = client.queue_items(&run_id).await.unwrap();
    assert_eq!(items[0].status, QueueStatus::Processing);
    assert!(items[0].status.is_pending());

    let results = client.test_results(&run_id).await.unwrap();
    assert_eq!(results[0].outcome, TestOutcome::CompileFail);
    assert_eq!(results[0].message.as_deref(), Some("Compile error"));
}

#[tokio::test]
async fn test_coverage_uses_tooling_query() {
    let coverage = warp::get()
        .and(warp::path!("services" / "data" / "v59.0" / "tooling" / "query"))
        .and(bearer())
        .and(warp::query::<HashMap<String, String>>())
        .map(|q: HashMap<String, String>| {
            assert_eq!(
                q.get("q").map(String::as_str),
                Some("SELECT ApexClassOrTriggerId, Coverage FROM ApexCodeCoverage")
            );
            warp::reply::json(&serde_json::json!({
                "done": true,
                "records": [
                    {"ApexClassOrTriggerId": "01pA", "Coverage": {"coveredLines": [1, 3], "uncoveredLines": [2]}}
                ]
            }))
        });
    let (addr, server) = warp::serve(login_route(Arc::default()).or(coverage))
        .bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);

    let client = fast_client();
    client.login(&credentials(&format!("http://{addr}"))).await.unwrap();
    let records = client.code_coverage().await.unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].covered_lines, vec![1, 3]);
    assert_eq!(records[0].uncovered_lines, vec![2]);
}

#[tokio::test]
async fn test_rest_errors_carry_status_and_code() {
    let expired = warp::get()
        .and(warp::path!("services" / "data" / "v59.0" / "query"))
        .map(|| {
            warp::reply::with_status(
                warp::reply::json(&serde_json::json!([
                    {"message": "Session expired or invalid", "errorCode": "INVALID_SESSION_ID"}
                ])),
                StatusCode::UNAUTHORIZED,
            )
        });
    let (addr, server) = warp::serve(login_route(Arc::default()).or(expired))
        .bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);

    let client = fast_client();
    client.login(&credentials(&format!("http://{addr}"))).await.unwrap();
    let err = client.list_classes().await.unwrap_err();

    match err {
        PlatformError::Api { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "INVALID_SESSION_ID: Session expired or invalid");
        }
        other => panic!("expected API error, got {other:?}"),
    }
}

fn project_src() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let classes = dir.path().join("src").join("classes");
    std::fs::create_dir_all(&classes).unwrap();
    std::fs::write(classes.join("A.cls"), "public class A {}").unwrap();
    std::fs::write(dir.path().join("src").join("package.xml"), "<Package/>").unwrap();
    dir
}

#[tokio::test]
async fn test_deploy_uploads_archive_and_polls_until_done() {
    let uploads = Arc::new(Mutex::new(Vec::new()));
    let uploads_in = uploads.clone();
    let submit = warp::post()
        .and(warp::path!("services" / "data" / "v59.0" / "metadata" / "deployRequest"))
        .and(bearer())
        .and(warp::body::bytes())
        .map(move |body: Bytes| {
            uploads_in.lock().push(String::from_utf8_lossy(&body).into_owned());
            warp::reply::with_status(
                warp::reply::json(&serde_json::json!({
                    "id": "0Af000000000001",
                    "deployResult": {"id": "0Af000000000001", "done": false, "status": "Pending"}
                })),
                StatusCode::CREATED,
            )
        });
    let polls = Arc::new(AtomicUsize::new(0));
    let polls_in = polls.clone();
    let status = warp::get()
        .and(warp::path!("services" / "data" / "v59.0" / "metadata" / "deployRequest" / String))
        .and(bearer())
        .map(move |id: String| {
            assert_eq!(id, "0Af000000000001");
            let n = polls_in.fetch_add(1, Ordering::SeqCst);
            let done = n >= 2;
            let state = if done { "Succeeded" } else { "InProgress" };
            let deployed = if done { 2 } else { 1 };
            warp::reply::json(&serde_json::json!({
                "id": id,
                "deployResult": {
                    "id": id,
                    "done": done,
                    "success": done,
                    "status": state,
                    "numberComponentsDeployed": deployed,
                    "numberComponentsTotal": 2,
                    "numberComponentErrors": 0,
                    "details": {"componentFailures": []}
                }
            }))
        });
    let (addr, server) = warp::serve(login_route(Arc::default()).or(submit).or(status))
        .bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);

    let project = project_src();
    let client = fast_client();
    client.login(&credentials(&format!("http://{addr}"))).await.unwrap();
    let result = client
        .deploy(&project.path().join("src"), &DeployOptions::default())
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.status, "Succeeded");
    assert_eq!(result.number_components_deployed, 2);
    assert_eq!(polls.load(Ordering::SeqCst), 3);

    let body = uploads.lock()[0].clone();
    assert!(body.contains("name=\"json\""));
    assert!(body.contains("\"rollbackOnError\":true"));
    assert!(body.contains("\"allowMissingFiles\":false"));
    assert!(body.contains("name=\"file\""));
    assert!(body.contains("application/zip"));
    assert!(body.contains("src/classes/A.cls"));
}

#[tokio::test]
async fn test_deploy_gives_up_after_deadline() {
    let submit = warp::post()
        .and(warp::path!("services" / "data" / "v59.0" / "metadata" / "deployRequest"))
        .map(|| {
            warp::reply::json(&serde_json::json!({
                "id": "0Af2",
                "deployResult": {"id": "0Af2", "done": false, "status": "Pending"}
            }))
        });
    let status = warp::get()
        .and(warp::path!("services" / "data" / "v59.0" / "metadata" / "deployRequest" / String))
        .map(|id: String| {
            warp::reply::json(&serde_json::json!({
                "deployResult": {"id": id, "done": false, "status": "InProgress"}
            }))
        });
    let (addr, server) = warp::serve(login_route(Arc::default()).or(submit).or(status))
        .bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);

    let project = project_src();
    let client = ForceClient::new(ClientConfig::default().with_deploy_poll(PollPolicy::new(
        Duration::from_millis(5),
        Some(Duration::from_millis(50)),
    )))
    .unwrap();
    client.login(&credentials(&format!("http://{addr}"))).await.unwrap();

    let err = client
        .deploy(&project.path().join("src"), &DeployOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PlatformError::Timeout { .. }));
}

fn job() -> CoverallsJob {
    CoverallsJob {
        repo_token: "repo-token".to_string(),
        service_name: "travis-ci".to_string(),
        service_job_id: "1234".to_string(),
        source_files: vec![SourceFile {
            name: "src/classes/A.cls".to_string(),
            source: "public class A {}".to_string(),
            coverage: vec![Some(1), Some(0), Some(1)],
        }],
    }
}

#[tokio::test]
async fn test_coveralls_upload_sends_json_file_part() {
    let bodies = Arc::new(Mutex::new(Vec::new()));
    let bodies_in = bodies.clone();
    let route = warp::post()
        .and(warp::path!("api" / "v1" / "jobs"))
        .and(warp::body::bytes())
        .map(move |body: Bytes| {
            bodies_in.lock().push(String::from_utf8_lossy(&body).into_owned());
            warp::reply::json(&serde_json::json!({
                "message": "Job #1234",
                "url": "https://coveralls.io/jobs/99"
            }))
        });
    let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);

    let client = CoverallsClient::new(format!("http://{addr}/api/v1/jobs"));
    let receipt = client.upload(&job()).await.unwrap();

    assert_eq!(receipt.message.as_deref(), Some("Job #1234"));
    assert_eq!(receipt.url.as_deref(), Some("https://coveralls.io/jobs/99"));

    let body = bodies.lock()[0].clone();
    assert!(body.contains("name=\"json_file\""));
    assert!(body.contains("filename=\"coverallsData.json\""));
    assert!(body.contains("\"coverage\":[1,0,1]"));
    assert!(body.contains("\"service_job_id\":\"1234\""));
}

#[tokio::test]
async fn test_coveralls_error_flag_is_a_rejection() {
    let route = warp::post().and(warp::path!("api" / "v1" / "jobs")).map(|| {
        warp::reply::json(&serde_json::json!({
            "message": "Couldn't find a repository matching this job.",
            "error": true
        }))
    });
    let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);

    let err = CoverallsClient::new(format!("http://{addr}/api/v1/jobs"))
        .upload(&job())
        .await
        .unwrap_err();

    match err {
        UploadError::Rejected { status, message } => {
            assert_eq!(status, Some(200));
            assert_eq!(message, "Couldn't find a repository matching this job.");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_coveralls_server_error_uses_body_text() {
    let route = warp::post().and(warp::path!("api" / "v1" / "jobs")).map(|| {
        warp::reply::with_status("upstream unavailable", StatusCode::SERVICE_UNAVAILABLE)
    });
    let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);

    let err = CoverallsClient::new(format!("http://{addr}/api/v1/jobs"))
        .upload(&job())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        UploadError::Rejected { status: Some(503), ref message } if message == "upstream unavailable"
    ));
}
