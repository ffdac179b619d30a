//! Test run polling and result aggregation
//!
//! The org offers no completion notification, so the queue is re-queried at a
//! fixed interval until no item is pending. Results are then grouped by test
//! class, methods sorted by name, and summarised.

use crate::catalog::ClassCatalog;
use crate::config::PollPolicy;
use crate::error::CoreError;
use crate::platform::PlatformClient;
use crate::types::{TestOutcome, TestQueueItem, TestResultRecord, TestRunId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;

/// One method's outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodOutcome {
    /// Method name
    pub method_name: String,
    /// Outcome with `CompileFail` collapsed into `Fail`
    pub outcome: TestOutcome,
    /// Failure message
    pub message: Option<String>,
    /// Failure stack trace
    pub stack_trace: Option<String>,
}

/// Outcomes of one test class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassOutcome {
    /// Test class name
    pub class_name: String,
    /// Queue item status text, e.g. `(3/3)`
    pub extended_status: Option<String>,
    /// Methods sorted by name
    pub methods: Vec<MethodOutcome>,
}

/// Aggregated result of a test run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRunSummary {
    /// Classes sorted by name
    pub classes: Vec<ClassOutcome>,
    /// Passed methods
    pub passed: usize,
    /// Failed methods, compile failures included
    pub failed: usize,
    /// Skipped methods
    pub skipped: usize,
}

impl TestRunSummary {
    /// Group results by class and count outcomes
    ///
    /// Results for classes outside the catalog are reported under their raw id.
    #[must_use]
    pub fn from_results(
        catalog: &ClassCatalog,
        queue_items: &[TestQueueItem],
        results: Vec<TestResultRecord>,
    ) -> Self {
        let class_label = |id: &crate::types::ClassId| {
            catalog
                .test_class_name(id)
                .map_or_else(|| id.to_string(), str::to_string)
        };

        let status_by_class: BTreeMap<String, Option<String>> = queue_items
            .iter()
            .map(|item| (class_label(&item.class_id), item.extended_status.clone()))
            .collect();

        let mut grouped: BTreeMap<String, Vec<MethodOutcome>> = BTreeMap::new();
        let mut summary = Self::default();

        for row in results {
            let outcome = row.outcome.normalized();
            match outcome {
                TestOutcome::Pass => summary.passed += 1,
                TestOutcome::Skip => summary.skipped += 1,
                TestOutcome::Fail | TestOutcome::CompileFail => summary.failed += 1,
            }
            grouped
                .entry(class_label(&row.class_id))
                .or_default()
                .push(MethodOutcome {
                    method_name: row.method_name,
                    outcome,
                    message: row.message,
                    stack_trace: row.stack_trace,
                });
        }

        summary.classes = grouped
            .into_iter()
            .map(|(class_name, mut methods)| {
                methods.sort_by(|a, b| a.method_name.cmp(&b.method_name));
                ClassOutcome {
                    extended_status: status_by_class.get(&class_name).cloned().flatten(),
                    class_name,
                    methods,
                }
            })
            .collect();

        summary
    }

    /// Total methods
    #[inline]
    #[must_use]
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.skipped
    }

    /// Whether any method failed
    #[inline]
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// Fail with the aggregate count when any method failed
    ///
    /// # Errors
    /// `CoreError::TestsFailed` when at least one method failed
    pub fn check(&self) -> Result<(), CoreError> {
        if self.has_failures() {
            Err(CoreError::TestsFailed {
                failed: self.failed,
                passed: self.passed,
            })
        } else {
            Ok(())
        }
    }

    /// Console rendering: one block per class, then the verdict line
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for class in &self.classes {
            out.push('\n');
            out.push('\t');
            out.push_str(&class.class_name);
            out.push(' ');
            out.push_str(class.extended_status.as_deref().unwrap_or(""));
            out.push('\n');
            for method in &class.methods {
                out.push_str(&format!(
                    "\t\t{} {}\n",
                    method.outcome.icon(),
                    method.method_name
                ));
                for detail in [&method.message, &method.stack_trace].into_iter().flatten() {
                    for line in detail.split('\n') {
                        out.push_str("\t\t\t");
                        out.push_str(line);
                        out.push('\n');
                    }
                }
            }
        }
        out.push('\n');
        if self.has_failures() {
            out.push_str(&format!("There were {} failing tests\n", self.failed));
        } else {
            out.push_str(&format!("All {} tests passed!\n", self.passed));
        }
        out
    }
}

/// Query the queue until no item is pending
///
/// Returns the final queue items. Sleeps `policy.interval` between queries and
/// never sleeps when the first query already shows the run finished.
///
/// # Errors
/// - `CoreError::PollQuery` if a queue query fails
/// - `CoreError::PollTimeout` if the policy deadline passes first
pub async fn wait_for_completion(
    client: &dyn PlatformClient,
    run_id: &TestRunId,
    policy: &PollPolicy,
) -> Result<Vec<TestQueueItem>, CoreError> {
    let started = Instant::now();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        tracing::info!(run_id = %run_id, attempt, "Waiting for tests");

        let items = client
            .queue_items(run_id)
            .await
            .map_err(CoreError::PollQuery)?;

        let pending = items.iter().filter(|item| item.status.is_pending()).count();
        if pending == 0 {
            tracing::debug!(run_id = %run_id, attempt, items = items.len(), "Test run finished");
            return Ok(items);
        }

        let elapsed = started.elapsed();
        if policy.is_expired(elapsed) {
            tracing::warn!(run_id = %run_id, pending, "Gave up waiting for tests");
            return Err(CoreError::PollTimeout {
                waited_secs: elapsed.as_secs(),
            });
        }

        tracing::debug!(run_id = %run_id, pending, "Tests still running");
        tokio::time::sleep(policy.interval).await;
    }
}

/// Wait for a run, then fetch and summarise its results
///
/// # Errors
/// Propagates [`wait_for_completion`] errors; `CoreError::PollQuery` if the
/// result query fails
pub async fn collect_results(
    client: &dyn PlatformClient,
    catalog: &ClassCatalog,
    run_id: &TestRunId,
    policy: &PollPolicy,
) -> Result<TestRunSummary, CoreError> {
    let queue_items = wait_for_completion(client, run_id, policy).await?;
    let results = client
        .test_results(run_id)
        .await
        .map_err(CoreError::PollQuery)?;

    let summary = TestRunSummary::from_results(catalog, &queue_items, results);
    tracing::info!(
        passed = summary.passed,
        failed = summary.failed,
        skipped = summary.skipped,
        "Collected results for {} test classes",
        summary.classes.len()
    );
    Ok(summary)
}
