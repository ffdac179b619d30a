//! Coveralls job payload
//!
//! Shapes production class coverage into the JSON the Coveralls jobs endpoint
//! accepts: `{repo_token, service_name, service_job_id, source_files}`.

use crate::catalog::ClassCatalog;
use crate::config::CoverallsSettings;
use crate::error::UploadError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// File name used for the uploaded payload
pub const PAYLOAD_FILE_NAME: &str = "coverallsData.json";

/// One source file with its line coverage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Repository-relative path
    pub name: String,
    /// File contents
    pub source: String,
    /// Per-line hit counts, `null` for lines without data
    pub coverage: Vec<Option<u32>>,
}

/// A Coveralls job submission
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverallsJob {
    /// Repository token
    pub repo_token: String,
    /// CI service name
    pub service_name: String,
    /// CI job id
    pub service_job_id: String,
    /// Covered sources
    pub source_files: Vec<SourceFile>,
}

impl CoverallsJob {
    /// Build a job from the catalog's production classes, in class-id order
    #[must_use]
    pub fn from_catalog(catalog: &ClassCatalog, settings: &CoverallsSettings) -> Self {
        let source_files = catalog
            .production()
            .values()
            .map(|class| SourceFile {
                name: class.path.clone(),
                source: class.source.clone(),
                coverage: class.coverage.clone(),
            })
            .collect();

        Self {
            repo_token: settings.repo_token.clone(),
            service_name: settings.service_name.clone(),
            service_job_id: settings.service_job_id.clone(),
            source_files,
        }
    }

    /// Serialise to compact JSON
    ///
    /// # Errors
    /// `UploadError::Serialize` if serialisation fails
    pub fn to_json(&self) -> Result<Vec<u8>, UploadError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Write the payload to `path`
    ///
    /// # Errors
    /// `UploadError::Io` or `UploadError::Serialize`
    pub async fn write_to(&self, path: &Path) -> Result<(), UploadError> {
        let bytes = self.to_json()?;
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }
}

impl fmt::Debug for CoverallsJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoverallsJob")
            .field("repo_token", &"<redacted>")
            .field("service_name", &self.service_name)
            .field("service_job_id", &self.service_job_id)
            .field("source_files", &self.source_files.len())
            .finish()
    }
}

/// Coveralls' answer to a job submission
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    /// Service message
    #[serde(default)]
    pub message: Option<String>,
    /// Job URL
    #[serde(default)]
    pub url: Option<String>,
}
