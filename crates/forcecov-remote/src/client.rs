//! Org client over SOAP login and the REST/Tooling APIs
//!
//! Login stores a session; every later call uses it as a bearer token against
//! the instance URL the login returned.

use crate::archive::package_directory;
use crate::soap::{login_envelope, login_path, parse_login_response, LoginResult};
use crate::wire::{
    decode, error_message, ApexClassWire, CodeCoverageWire, DeployResponse, QueryPage,
    QueueItemWire, RunTestsRequest, TestResultWire,
};
use forcecov_core::{
    ApexClassRow, ClassId, CoverageRecord, Credentials, DeployOptions, DeployResult,
    PlatformClient, PlatformError, PollPolicy, SessionInfo, TestQueueItem, TestResultRecord,
    TestRunId, DEFAULT_DEPLOY_TIMEOUT, DEFAULT_POLL_INTERVAL,
};
use parking_lot::RwLock;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Url};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::{Duration, Instant};

/// API version used when none is configured
pub const DEFAULT_API_VERSION: &str = "59.0";

const CLASS_QUERY: &str = "SELECT Id, Name, Body FROM ApexClass";
const COVERAGE_QUERY: &str = "SELECT ApexClassOrTriggerId, Coverage FROM ApexCodeCoverage";

fn transport(err: reqwest::Error) -> PlatformError {
    PlatformError::Transport(err.to_string())
}

fn soql_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// API version, e.g. `59.0`
    pub api_version: String,
    /// Deploy status polling
    pub deploy_poll: PollPolicy,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_version: DEFAULT_API_VERSION.to_string(),
            deploy_poll: PollPolicy::new(DEFAULT_POLL_INTERVAL, Some(DEFAULT_DEPLOY_TIMEOUT)),
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl ClientConfig {
    /// With API version
    #[inline]
    #[must_use]
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    /// With deploy polling
    #[inline]
    #[must_use]
    pub fn with_deploy_poll(mut self, poll: PollPolicy) -> Self {
        self.deploy_poll = poll;
        self
    }
}

#[derive(Debug, Clone)]
struct Session {
    access_token: String,
    instance_url: String,
}

/// HTTP implementation of [`PlatformClient`]
#[derive(Debug)]
pub struct ForceClient {
    http: reqwest::Client,
    config: ClientConfig,
    session: RwLock<Option<Session>>,
}

impl ForceClient {
    /// Create a client
    ///
    /// # Errors
    /// `PlatformError::Transport` if the HTTP client cannot be built
    pub fn new(config: ClientConfig) -> Result<Self, PlatformError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("forcecov/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(transport)?;
        Ok(Self {
            http,
            config,
            session: RwLock::new(None),
        })
    }

    /// Get configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Whether a session is held
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.session.read().is_some()
    }

    fn session(&self) -> Result<Session, PlatformError> {
        self.session.read().clone().ok_or(PlatformError::NotAuthenticated)
    }

    fn data_url(&self, session: &Session, path: &str) -> String {
        format!(
            "{}/services/data/v{}{}",
            session.instance_url, self.config.api_version, path
        )
    }

    async fn send(&self, request: RequestBuilder) -> Result<Vec<u8>, PlatformError> {
        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        let body = response.bytes().await.map_err(transport)?;

        if status == reqwest::StatusCode::UNAUTHORIZED {
            tracing::warn!("Session rejected by the org");
        }
        if !status.is_success() {
            return Err(PlatformError::Api {
                status: status.as_u16(),
                message: error_message(&String::from_utf8_lossy(&body)),
            });
        }
        Ok(body.to_vec())
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T, PlatformError> {
        let session = self.session()?;
        let body = self
            .send(self.http.get(url).bearer_auth(&session.access_token))
            .await?;
        decode(&body, what)
    }

    /// Run a SOQL query, following `nextRecordsUrl` until done
    async fn query<T: DeserializeOwned>(&self, soql: &str, tooling: bool) -> Result<Vec<T>, PlatformError> {
        let session = self.session()?;
        let path = if tooling { "/tooling/query" } else { "/query" };
        let mut url = Url::parse(&self.data_url(&session, path))
            .map_err(|e| PlatformError::InvalidResponse(format!("bad instance url: {e}")))?;
        url.query_pairs_mut().append_pair("q", soql);

        let mut records = Vec::new();
        let mut next = Some(url.to_string());
        while let Some(page_url) = next.take() {
            let page: QueryPage<T> = self.get_json(&page_url, "query page").await?;
            tracing::trace!(total = page.total_size, fetched = page.records.len(), "Query page");
            records.extend(page.records);
            if !page.done {
                next = page
                    .next_records_url
                    .map(|rel| format!("{}{}", session.instance_url, rel));
            }
        }
        Ok(records)
    }

    async fn submit_deploy(
        &self,
        session: &Session,
        archive: Vec<u8>,
        options: &DeployOptions,
    ) -> Result<DeployResponse, PlatformError> {
        let json = serde_json::json!({ "deployOptions": options }).to_string();
        let form = Form::new()
            .part(
                "json",
                Part::text(json)
                    .mime_str("application/json")
                    .map_err(transport)?,
            )
            .part(
                "file",
                Part::bytes(archive)
                    .file_name("deploy.zip")
                    .mime_str("application/zip")
                    .map_err(transport)?,
            );

        let body = self
            .send(
                self.http
                    .post(self.data_url(session, "/metadata/deployRequest"))
                    .bearer_auth(&session.access_token)
                    .multipart(form),
            )
            .await?;
        decode(&body, "deploy request")
    }

    async fn wait_for_deploy(&self, session: &Session, deploy_id: &str) -> Result<DeployResult, PlatformError> {
        let policy = self.config.deploy_poll;
        let url = self.data_url(
            session,
            &format!("/metadata/deployRequest/{deploy_id}?includeDetails=true"),
        );
        let started = Instant::now();

        loop {
            let response: DeployResponse = self.get_json(&url, "deploy status").await?;
            let result = response.deploy_result;
            if result.done {
                return Ok(result.into());
            }

            let elapsed = started.elapsed();
            if policy.is_expired(elapsed) {
                return Err(PlatformError::Timeout {
                    waited_secs: elapsed.as_secs(),
                });
            }
            tracing::info!(
                deploy_id,
                status = %result.status,
                deployed = result.number_components_deployed,
                total = result.number_components_total,
                "Deploy in progress"
            );
            tokio::time::sleep(policy.interval).await;
        }
    }
}

#[async_trait::async_trait]
impl PlatformClient for ForceClient {
    async fn login(&self, credentials: &Credentials) -> Result<SessionInfo, PlatformError> {
        let login_url = credentials.login_url.trim_end_matches('/');
        let url = format!("{login_url}{}", login_path(&self.config.api_version));

        let response = self
            .http
            .post(&url)
            .header("Content-Type", "text/xml; charset=UTF-8")
            .header("SOAPAction", "login")
            .body(login_envelope(credentials))
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        let body = response.text().await.map_err(transport)?;

        // faults arrive as HTTP 500 with a parseable body
        let LoginResult {
            session_id,
            server_url,
            user_id,
            organization_id,
        } = match parse_login_response(&body) {
            Err(PlatformError::InvalidResponse(_)) if !status.is_success() => {
                return Err(PlatformError::Api {
                    status: status.as_u16(),
                    message: error_message(&body),
                })
            }
            other => other?,
        };

        let instance_url = Url::parse(&server_url)
            .map_err(|e| PlatformError::InvalidResponse(format!("bad serverUrl {server_url}: {e}")))?
            .origin()
            .ascii_serialization();

        *self.session.write() = Some(Session {
            access_token: session_id,
            instance_url: instance_url.clone(),
        });

        Ok(SessionInfo {
            instance_url,
            user_id,
            organization_id,
        })
    }

    async fn deploy(&self, source_dir: &Path, options: &DeployOptions) -> Result<DeployResult, PlatformError> {
        let session = self.session()?;
        let dir = source_dir.to_path_buf();
        let archive = tokio::task::spawn_blocking(move || package_directory(&dir))
            .await
            .map_err(|e| PlatformError::Archive(e.to_string()))??;

        let submitted = self.submit_deploy(&session, archive, options).await?;
        let deploy_id = submitted
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or(submitted.deploy_result.id);
        if deploy_id.is_empty() {
            return Err(PlatformError::InvalidResponse(
                "deploy request returned no id".to_string(),
            ));
        }
        tracing::info!(deploy_id = %deploy_id, "Deploy submitted");

        self.wait_for_deploy(&session, &deploy_id).await
    }

    async fn list_classes(&self) -> Result<Vec<ApexClassRow>, PlatformError> {
        let rows: Vec<ApexClassWire> = self.query(CLASS_QUERY, false).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn run_tests_async(&self, class_ids: &[ClassId]) -> Result<TestRunId, PlatformError> {
        let session = self.session()?;
        let body = self
            .send(
                self.http
                    .post(self.data_url(&session, "/tooling/runTestsAsynchronous"))
                    .bearer_auth(&session.access_token)
                    .json(&RunTestsRequest::new(class_ids)),
            )
            .await?;
        let id: String = decode(&body, "test run id")?;
        Ok(TestRunId::new(id))
    }

    async fn queue_items(&self, run_id: &TestRunId) -> Result<Vec<TestQueueItem>, PlatformError> {
        let soql = format!(
            "SELECT Id, Status, ApexClassId, ExtendedStatus FROM ApexTestQueueItem WHERE ParentJobId = '{}'",
            soql_literal(run_id.as_str())
        );
        let rows: Vec<QueueItemWire> = self.query(&soql, false).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn test_results(&self, run_id: &TestRunId) -> Result<Vec<TestResultRecord>, PlatformError> {
        let soql = format!(
            "SELECT Id, ApexClassId, MethodName, Outcome, Message, StackTrace FROM ApexTestResult WHERE AsyncApexJobId = '{}'",
            soql_literal(run_id.as_str())
        );
        let rows: Vec<TestResultWire> = self.query(&soql, false).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn code_coverage(&self) -> Result<Vec<CoverageRecord>, PlatformError> {
        let rows: Vec<CodeCoverageWire> = self.query(COVERAGE_QUERY, true).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
