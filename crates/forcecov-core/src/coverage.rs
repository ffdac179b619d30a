//! Coverage aggregation
//!
//! Merges per-test line coverage into one hit-count array per production
//! class. Slot `i` describes line `i + 1`; `None` means the org said nothing
//! about the line, `Some(0)` means executable but never hit.

use crate::catalog::ClassCatalog;
use crate::types::CoverageRecord;
use serde::{Deserialize, Serialize};

/// Merge one record into a coverage array
///
/// The array grows with `None` until it holds `max_line` slots. A covered
/// line sets an empty slot to 1 and otherwise increments it; an uncovered
/// line only fills an empty slot with 0. Line number 0 is ignored.
pub fn merge_record(coverage: &mut Vec<Option<u32>>, record: &CoverageRecord) {
    let Some(max_line) = record.max_line() else {
        return;
    };
    let wanted = max_line as usize;
    if coverage.len() < wanted {
        coverage.resize(wanted, None);
    }

    for &line in &record.covered_lines {
        let Some(slot) = slot_mut(coverage, line) else {
            continue;
        };
        *slot = Some(slot.map_or(1, |hits| hits.saturating_add(1)));
    }

    for &line in &record.uncovered_lines {
        let Some(slot) = slot_mut(coverage, line) else {
            continue;
        };
        if slot.is_none() {
            *slot = Some(0);
        }
    }
}

fn slot_mut(coverage: &mut [Option<u32>], line: u32) -> Option<&mut Option<u32>> {
    let index = (line as usize).checked_sub(1)?;
    coverage.get_mut(index)
}

/// Merge every record that belongs to a production class
///
/// Records for test classes, triggers and classes outside the project are
/// skipped. Returns the number of records applied.
pub fn aggregate(catalog: &mut ClassCatalog, records: &[CoverageRecord]) -> usize {
    let mut applied = 0;
    for record in records {
        match catalog.production_mut().get_mut(&record.class_or_trigger_id) {
            Some(class) => {
                merge_record(&mut class.coverage, record);
                applied += 1;
            }
            None => {
                tracing::trace!(id = %record.class_or_trigger_id, "Skipping coverage for non-project class");
            }
        }
    }
    applied
}

/// Line totals over all production classes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageTotals {
    /// Lines with any data
    pub relevant_lines: usize,
    /// Lines hit at least once
    pub covered_lines: usize,
}

impl CoverageTotals {
    /// Count lines across the catalog's production classes
    #[must_use]
    pub fn from_catalog(catalog: &ClassCatalog) -> Self {
        catalog
            .production()
            .values()
            .flat_map(|class| class.coverage.iter())
            .fold(Self::default(), |mut totals, slot| {
                if let Some(hits) = slot {
                    totals.relevant_lines += 1;
                    if *hits > 0 {
                        totals.covered_lines += 1;
                    }
                }
                totals
            })
    }

    /// Covered share of relevant lines, 0–100
    #[must_use]
    pub fn percent(&self) -> f64 {
        if self.relevant_lines == 0 {
            return 0.0;
        }
        self.covered_lines as f64 * 100.0 / self.relevant_lines as f64
    }
}
