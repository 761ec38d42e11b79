//! Local NDJSON file sink for inspection runs.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{info, instrument};

use super::error::LoadError;
use super::{Sink, StoreReport};
use crate::fetch::Record;

/// Default output directory, relative to the working directory.
pub const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";

/// Output file name inside the artifacts directory.
pub const NDJSON_FILE_NAME: &str = "raw_ctgov_studies.ndjson";

/// Writes one JSON document per line, replacing any previous output.
///
/// Not chunked and not transactional.
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    /// Creates a sink writing to `<dir>/raw_ctgov_studies.ndjson`.
    #[must_use]
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(NDJSON_FILE_NAME),
        }
    }

    /// Returns the output path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_all(&self, records: &[Record]) -> Result<(), LoadError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| LoadError::io(parent, e))?;
        }

        let file = File::create(&self.path)
            .await
            .map_err(|e| LoadError::io(&self.path, e))?;
        let mut writer = BufWriter::new(file);
        for (index, record) in records.iter().enumerate() {
            let mut line = record
                .to_json()
                .map_err(|source| LoadError::Serialize { index, source })?;
            line.push('\n');
            writer
                .write_all(line.as_bytes())
                .await
                .map_err(|e| LoadError::io(&self.path, e))?;
        }
        writer
            .flush()
            .await
            .map_err(|e| LoadError::io(&self.path, e))?;
        Ok(())
    }
}

#[async_trait]
impl Sink for FileSink {
    #[instrument(skip(self, records), fields(path = %self.path.display(), rows = records.len()))]
    async fn store(&self, records: Vec<Record>) -> Result<StoreReport, LoadError> {
        self.write_all(&records).await?;
        info!(rows = records.len(), path = %self.path.display(), "wrote rows");
        Ok(StoreReport {
            rows: records.len(),
            batch_id: None,
            destination: self.describe(),
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::{Value, json};
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn test_file_sink_writes_one_document_per_line() {
        let dir = TempDir::new().unwrap();
        let sink = FileSink::new(dir.path().join("nested"));
        let input = vec![
            Record::new(json!({"NCTId": "NCT1", "text": "multi\nline"})),
            Record::new(json!({"NCTId": "NCT2"})),
        ];

        let report = sink.store(input.clone()).await.unwrap();
        assert_eq!(report.rows, 2);
        assert!(report.batch_id.is_none());

        let content = std::fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        for (line, original) in lines.iter().zip(&input) {
            let parsed: Value = serde_json::from_str(line).unwrap();
            assert_eq!(&parsed, original.as_value());
        }
    }

    #[tokio::test]
    async fn test_file_sink_overwrites_previous_output() {
        let dir = TempDir::new().unwrap();
        let sink = FileSink::new(dir.path());
        sink.store(vec![Record::new(json!({"n": 1})), Record::new(json!({"n": 2}))])
            .await
            .unwrap();
        sink.store(vec![Record::new(json!({"n": 3}))]).await.unwrap();

        let content = std::fs::read_to_string(sink.path()).unwrap();
        assert_eq!(content, "{\"n\":3}\n");
    }

    #[test]
    fn test_file_sink_path() {
        let sink = FileSink::new(DEFAULT_ARTIFACTS_DIR);
        assert_eq!(sink.path(), Path::new("artifacts/raw_ctgov_studies.ndjson"));
    }
}
