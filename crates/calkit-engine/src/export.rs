//! Exporting books and whole libraries to a directory.

use std::path::{Path, PathBuf};

use calkit::CalibreClient;
use calkit::actions::ExportOptions;
use serde::Serialize;

use crate::{Error, Result};

/// Report from an export operation.
#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    /// Number of books requested for export.
    pub requested: usize,
    pub to_dir: PathBuf,
    /// Format restriction, empty when all formats were exported.
    pub formats: Vec<String>,
}

/// Export workflow engine.
#[derive(Debug)]
pub struct ExportEngine<'a> {
    client: &'a CalibreClient,
}

impl<'a> ExportEngine<'a> {
    pub(crate) fn new(client: &'a CalibreClient) -> Self {
        Self { client }
    }

    /// Export selected books to `to_dir`, creating it when needed.
    pub async fn books(
        &self,
        ids: &[i64],
        to_dir: &Path,
        formats: Vec<String>,
        single_dir: bool,
    ) -> Result<ExportReport> {
        if ids.is_empty() {
            return Err(Error::Validation("no book ids to export".to_string()));
        }
        std::fs::create_dir_all(to_dir)?;

        let options = ExportOptions {
            formats: formats.clone(),
            single_dir,
            ..Default::default()
        };
        self.client.export().books(ids, to_dir, &options).await?;

        Ok(ExportReport {
            requested: ids.len(),
            to_dir: to_dir.to_path_buf(),
            formats,
        })
    }

    /// Export the entire library to `to_dir`.
    pub async fn library(&self, to_dir: &Path, formats: Vec<String>) -> Result<ExportReport> {
        std::fs::create_dir_all(to_dir)?;

        let total = self.client.database()?.books().count().await?;
        let options = ExportOptions {
            formats: formats.clone(),
            ..Default::default()
        };
        self.client.export().all(to_dir, &options).await?;

        Ok(ExportReport {
            requested: total as usize,
            to_dir: to_dir.to_path_buf(),
            formats,
        })
    }
}
