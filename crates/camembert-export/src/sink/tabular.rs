//! CSV file sink

use super::Sink;
use crate::error::SinkError;
use crate::model::Issue;
use std::path::{Path, PathBuf};
use tracing::info;

/// Header row of the exported file
pub const CSV_HEADER: [&str; 3] = ["ID", "Key", "Fields"];

/// Writes `ID,Key,Fields` rows, replacing any existing file
#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn csv_err(&self, source: csv::Error) -> SinkError {
        SinkError::Csv {
            path: self.path.clone(),
            source,
        }
    }
}

impl Sink for CsvSink {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn write(&self, issues: &[Issue]) -> Result<usize, SinkError> {
        info!(path = %self.path.display(), issues = issues.len(), "Saving issues to CSV file");

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| SinkError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_path(&self.path)
            .map_err(|e| self.csv_err(e))?;
        writer
            .write_record(CSV_HEADER)
            .map_err(|e| self.csv_err(e))?;

        for issue in issues {
            let fields = issue.fields_json().map_err(|source| SinkError::Encode {
                id: issue.id.clone(),
                source,
            })?;
            writer
                .write_record([issue.id.as_str(), issue.key.as_str(), fields.as_str()])
                .map_err(|e| self.csv_err(e))?;
        }

        writer.flush().map_err(|source| SinkError::Io {
            path: self.path.clone(),
            source,
        })?;

        Ok(issues.len())
    }
}
