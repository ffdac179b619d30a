//! Class catalog
//!
//! Intersects the org's classes with the class files present in the project
//! and partitions them into production and test classes. Every retained
//! class lands in exactly one of the two maps.

use crate::error::CoreError;
use crate::platform::PlatformClient;
use crate::types::{ApexClassRow, ClassId, ClassRecord, ClassRole};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

static TEST_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(@isTest|testMethod)").expect("test marker pattern is valid"));

/// Extension of class source files
pub const CLASS_EXTENSION: &str = "cls";

/// Whether a class body marks the class as test code
#[inline]
#[must_use]
pub fn is_test_class(body: &str) -> bool {
    TEST_MARKER.is_match(body)
}

/// Project classes partitioned by role
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassCatalog {
    production: BTreeMap<ClassId, ClassRecord>,
    tests: BTreeMap<ClassId, ClassRecord>,
}

impl ClassCatalog {
    /// Create an empty catalog
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Partition org rows, keeping only classes whose names are in `local_names`
    #[must_use]
    pub fn partition<I>(rows: I, local_names: &BTreeSet<String>) -> Self
    where
        I: IntoIterator<Item = ApexClassRow>,
    {
        let mut catalog = Self::new();
        for row in rows {
            if !local_names.contains(&row.name) {
                continue;
            }
            catalog.insert(row);
        }
        catalog
    }

    /// Classify and insert one row, replacing any earlier record with the same id
    pub fn insert(&mut self, row: ApexClassRow) {
        let id = row.id.clone();
        self.production.remove(&id);
        self.tests.remove(&id);

        if is_test_class(&row.body) {
            self.tests
                .insert(id, ClassRecord::from_row(row, ClassRole::Test));
        } else {
            self.production
                .insert(id, ClassRecord::from_row(row, ClassRole::Production));
        }
    }

    /// Production classes by id
    #[inline]
    #[must_use]
    pub fn production(&self) -> &BTreeMap<ClassId, ClassRecord> {
        &self.production
    }

    /// Mutable production classes, for coverage aggregation
    #[inline]
    pub fn production_mut(&mut self) -> &mut BTreeMap<ClassId, ClassRecord> {
        &mut self.production
    }

    /// Test classes by id
    #[inline]
    #[must_use]
    pub fn tests(&self) -> &BTreeMap<ClassId, ClassRecord> {
        &self.tests
    }

    /// Ids of all test classes
    #[must_use]
    pub fn test_class_ids(&self) -> Vec<ClassId> {
        self.tests.keys().cloned().collect()
    }

    /// Name of a test class, if known
    #[inline]
    #[must_use]
    pub fn test_class_name(&self, id: &ClassId) -> Option<&str> {
        self.tests.get(id).map(|record| record.class_name.as_str())
    }

    /// Look a class up in either map
    #[must_use]
    pub fn get(&self, id: &ClassId) -> Option<&ClassRecord> {
        self.production.get(id).or_else(|| self.tests.get(id))
    }

    /// Total classes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.production.len() + self.tests.len()
    }

    /// Whether the catalog holds no classes
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.production.is_empty() && self.tests.is_empty()
    }
}

/// Names of the class files in `classes_dir` (file stems of `*.cls`)
///
/// # Errors
/// `CoreError::LocalClasses` if the directory cannot be read
pub async fn local_class_names(classes_dir: &Path) -> Result<BTreeSet<String>, CoreError> {
    let io_err = |source: std::io::Error| CoreError::LocalClasses {
        path: classes_dir.to_path_buf(),
        source,
    };

    let mut names = BTreeSet::new();
    let mut entries = tokio::fs::read_dir(classes_dir).await.map_err(io_err)?;
    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(CLASS_EXTENSION) {
            continue;
        }
        if !entry.file_type().await.map_err(io_err)?.is_file() {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
            names.insert(stem.to_string());
        }
    }

    Ok(names)
}

/// Fetch the org's classes and partition those present under `classes_dir`
///
/// # Errors
/// - `CoreError::CatalogQuery` if the org query fails
/// - `CoreError::LocalClasses` if the local directory cannot be read
pub async fn build_catalog(
    client: &dyn PlatformClient,
    classes_dir: &Path,
) -> Result<ClassCatalog, CoreError> {
    tracing::info!("Fetching class information");

    let rows = client.list_classes().await.map_err(CoreError::CatalogQuery)?;
    let local = local_class_names(classes_dir).await?;
    tracing::debug!(
        org_classes = rows.len(),
        local_classes = local.len(),
        "Intersecting org classes with project classes"
    );

    let catalog = ClassCatalog::partition(rows, &local);
    tracing::info!(
        production = catalog.production().len(),
        tests = catalog.tests().len(),
        "Got information about {} classes",
        catalog.len()
    );

    Ok(catalog)
}
