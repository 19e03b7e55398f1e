//! Rendering and persisting run output.

use crate::config::{OutputConfig, ScrapeConfig};
use crate::crawlers::{PageObserver, RunOutcome};
use crate::error::ScrapeError;
use crate::results::{
    ConfigEcho, MergedRecord, OutputDocument, OutputMetadata, RunStatistics, RunStatus,
};
use std::fs;
use std::path::{Path, PathBuf};

/// Destination for serialized output. Every write replaces the whole file.
pub trait Persistence: Send + Sync {
    fn write_json(&self, path: &Path, payload: &serde_json::Value) -> Result<(), ScrapeError>;
}

/// Writes pretty-printed JSON to the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFilePersistence;

impl Persistence for JsonFilePersistence {
    fn write_json(&self, path: &Path, payload: &serde_json::Value) -> Result<(), ScrapeError> {
        let fail = |message: String| ScrapeError::Persistence {
            path: path.to_path_buf(),
            message,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| fail(e.to_string()))?;
        }
        let body = serde_json::to_string_pretty(payload).map_err(|e| fail(e.to_string()))?;
        fs::write(path, body).map_err(|e| fail(e.to_string()))?;

        ::log::debug!("Wrote {}", path.display());
        Ok(())
    }
}

/// Turns records and statistics into [`OutputDocument`]s and persists them.
///
/// As a [`PageObserver`] it rewrites the partial file after every listing
/// page, so an interrupted run still leaves its progress on disk.
#[derive(Debug, Clone)]
pub struct ResultSink<P> {
    persistence: P,
    path: PathBuf,
    partial_path: PathBuf,
    save_partial: bool,
    echo: ConfigEcho,
}

impl<P: Persistence> ResultSink<P> {
    pub fn new(persistence: P, output: &OutputConfig, echo: ConfigEcho) -> Self {
        Self {
            persistence,
            path: PathBuf::from(&output.path),
            partial_path: PathBuf::from(&output.partial_path),
            save_partial: output.save_partial_results,
            echo,
        }
    }

    pub fn from_config(persistence: P, config: &ScrapeConfig) -> Self {
        Self::new(persistence, &config.output, echo_config(config))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn partial_path(&self) -> &Path {
        &self.partial_path
    }

    pub fn document(
        &self,
        records: &[MergedRecord],
        statistics: &RunStatistics,
        status: RunStatus,
        error: Option<String>,
        warnings: &[String],
    ) -> OutputDocument {
        OutputDocument {
            metadata: OutputMetadata {
                total_items: records.len(),
                status,
                error,
                warnings: warnings.to_vec(),
                statistics: statistics.clone(),
                config: self.echo.clone(),
            },
            data: records.to_vec(),
        }
    }

    /// Rewrites the partial file with everything emitted so far
    pub fn flush_partial(
        &self,
        records: &[MergedRecord],
        statistics: &RunStatistics,
    ) -> Result<(), ScrapeError> {
        let document = self.document(records, statistics, RunStatus::InProgress, None, &[]);
        self.write(&self.partial_path, &document)?;
        ::log::info!(
            "Saved {} partial records to {}",
            records.len(),
            self.partial_path.display()
        );
        Ok(())
    }

    /// Writes the final document for `outcome`, aborted runs included
    pub fn finish(&self, outcome: &RunOutcome) -> Result<OutputDocument, ScrapeError> {
        let document = self.document(
            &outcome.records,
            &outcome.statistics,
            outcome.status,
            outcome.error.as_ref().map(|e| e.to_string()),
            &outcome.warnings,
        );
        self.write(&self.path, &document)?;
        ::log::info!(
            "Saved {} records to {}",
            document.data.len(),
            self.path.display()
        );
        Ok(document)
    }

    fn write(&self, path: &Path, document: &OutputDocument) -> Result<(), ScrapeError> {
        let payload = serde_json::to_value(document).map_err(|e| ScrapeError::Persistence {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        self.persistence.write_json(path, &payload)
    }
}

impl<P: Persistence> PageObserver for ResultSink<P> {
    fn on_page_complete(&mut self, page: u32, records: &[MergedRecord], stats: &RunStatistics) {
        if !self.save_partial {
            return;
        }
        if let Err(e) = self.flush_partial(records, stats) {
            ::log::warn!("Partial save after page {} failed: {}", page, e);
        }
    }
}

/// The subset of the configuration recorded in output metadata
pub fn echo_config(config: &ScrapeConfig) -> ConfigEcho {
    ConfigEcho {
        list_url: config.list_config.url.clone(),
        list_fields: config
            .list_config
            .field_selectors
            .iter()
            .map(|f| f.name.clone())
            .collect(),
        detail_fields: config
            .detail_config
            .field_selectors
            .iter()
            .map(|f| f.name.clone())
            .collect(),
        detail_url_field: config.detail_config.detail_url_field.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::{DetailResult, FieldMap, FieldValue, ListItem, PositionKey};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn record(index: usize) -> MergedRecord {
        let mut fields = FieldMap::new();
        fields.insert("title".to_string(), FieldValue::Text(format!("T{index}")));
        let item = ListItem {
            fields,
            detail_url_raw: Some(format!("/{index}")),
        };
        MergedRecord::merge(
            PositionKey::new(1, index),
            &item,
            Some(format!("https://example.com/{index}")),
            DetailResult::failed("boom", 1),
        )
    }

    fn output(dir: &TempDir) -> OutputConfig {
        OutputConfig {
            path: dir.path().join("out/merged.json").display().to_string(),
            partial_path: dir.path().join("partial.json").display().to_string(),
            save_partial_results: true,
        }
    }

    #[derive(Clone, Default)]
    struct Recorder {
        writes: Arc<Mutex<Vec<PathBuf>>>,
    }

    impl Persistence for Recorder {
        fn write_json(&self, path: &Path, _payload: &serde_json::Value) -> Result<(), ScrapeError> {
            self.writes.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }
    }

    struct Broken;

    impl Persistence for Broken {
        fn write_json(&self, path: &Path, _payload: &serde_json::Value) -> Result<(), ScrapeError> {
            Err(ScrapeError::Persistence {
                path: path.to_path_buf(),
                message: "disk full".to_string(),
            })
        }
    }

    #[test]
    fn test_finish_writes_aborted_run() {
        let dir = TempDir::new().unwrap();
        let sink = ResultSink::new(JsonFilePersistence, &output(&dir), ConfigEcho::default());
        let mut statistics = RunStatistics::default();
        statistics.record(crate::results::DetailStatus::Failed);

        let outcome = RunOutcome {
            records: vec![record(0)],
            statistics,
            status: RunStatus::Aborted,
            error: Some(ScrapeError::Configuration("stop".to_string())),
            warnings: vec!["page 2 empty".to_string()],
        };
        let document = sink.finish(&outcome).unwrap();
        assert_eq!(document.metadata.total_items, 1);

        let written = fs::read_to_string(sink.path()).unwrap();
        let parsed: OutputDocument = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed.metadata.status, RunStatus::Aborted);
        assert!(parsed.metadata.error.unwrap().contains("stop"));
        assert_eq!(parsed.metadata.warnings, vec!["page 2 empty".to_string()]);
        assert_eq!(parsed.data, document.data);
    }

    #[test]
    fn test_partial_flush_replaces_file() {
        let dir = TempDir::new().unwrap();
        let mut sink = ResultSink::new(JsonFilePersistence, &output(&dir), ConfigEcho::default());
        let stats = RunStatistics::default();

        sink.on_page_complete(1, &[record(0), record(1)], &stats);
        sink.on_page_complete(2, &[record(0)], &stats);

        let written = fs::read_to_string(sink.partial_path()).unwrap();
        let parsed: OutputDocument = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed.data.len(), 1);
        assert_eq!(parsed.metadata.status, RunStatus::InProgress);
    }

    #[test]
    fn test_partial_flush_disabled() {
        let recorder = Recorder::default();
        let dir = TempDir::new().unwrap();
        let mut config = output(&dir);
        config.save_partial_results = false;
        let mut sink = ResultSink::new(recorder.clone(), &config, ConfigEcho::default());

        sink.on_page_complete(1, &[record(0)], &RunStatistics::default());
        assert!(recorder.writes.lock().unwrap().is_empty());
    }

    #[test]
    fn test_partial_failure_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        let mut sink = ResultSink::new(Broken, &output(&dir), ConfigEcho::default());
        sink.on_page_complete(1, &[record(0)], &RunStatistics::default());

        let outcome = RunOutcome {
            records: Vec::new(),
            statistics: RunStatistics::default(),
            status: RunStatus::Completed,
            error: None,
            warnings: Vec::new(),
        };
        assert!(matches!(
            sink.finish(&outcome),
            Err(ScrapeError::Persistence { .. })
        ));
    }
}
