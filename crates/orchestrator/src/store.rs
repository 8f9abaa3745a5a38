//! Report store: persists finalized suite reports as write-once artifacts.

use std::path::PathBuf;

use async_trait::async_trait;
use chatprobe_core::types::TestReport;
use chatprobe_core::{ProbeError, ProbeResult};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::info;
use uuid::Uuid;

#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Persist a report. Returns the key or path it was written under.
    /// Saving the same test twice is an error.
    async fn save(&self, report: &TestReport) -> ProbeResult<String>;
}

/// Writes pretty JSON files named `{testId}-{digest}.json`, where the digest
/// is a SHA-256 prefix of the file body.
pub struct JsonFileReportStore {
    dir: PathBuf,
}

impl JsonFileReportStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    async fn existing_for(&self, test_id: Uuid) -> ProbeResult<Option<PathBuf>> {
        let prefix = format!("{test_id}-");
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name().to_string_lossy().starts_with(&prefix) {
                return Ok(Some(entry.path()));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl ReportStore for JsonFileReportStore {
    async fn save(&self, report: &TestReport) -> ProbeResult<String> {
        if let Some(path) = self.existing_for(report.test_id).await? {
            return Err(ProbeError::Store(format!(
                "report for test {} already persisted at {}",
                report.test_id,
                path.display()
            )));
        }

        let body = serde_json::to_vec_pretty(report)?;
        let digest = hex::encode(Sha256::digest(&body));
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self
            .dir
            .join(format!("{}-{}.json", report.test_id, &digest[..12]));
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| ProbeError::Store(format!("cannot create {}: {e}", path.display())))?;
        file.write_all(&body).await?;
        file.flush().await?;

        info!(
            test_id = %report.test_id,
            path = %path.display(),
            bytes = body.len(),
            "Report persisted"
        );
        Ok(path.display().to_string())
    }
}

/// Keeps reports in memory, keyed by test id.
#[derive(Default)]
pub struct InMemoryReportStore {
    reports: DashMap<Uuid, TestReport>,
}

impl InMemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, test_id: &Uuid) -> Option<TestReport> {
        self.reports.get(test_id).map(|r| r.clone())
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }
}

#[async_trait]
impl ReportStore for InMemoryReportStore {
    async fn save(&self, report: &TestReport) -> ProbeResult<String> {
        match self.reports.entry(report.test_id) {
            Entry::Occupied(_) => Err(ProbeError::Store(format!(
                "report for test {} already persisted",
                report.test_id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(report.clone());
                Ok(report.test_id.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatprobe_core::types::TestSuiteConfig;

    fn report() -> TestReport {
        TestReport::new(Uuid::new_v4(), TestSuiteConfig::new(1, 3))
    }

    #[tokio::test]
    async fn test_file_store_writes_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileReportStore::new(dir.path().join("reports"));
        let report = report();

        let path = store.save(&report).await.unwrap();
        assert!(path.contains(&report.test_id.to_string()));
        assert!(path.ends_with(".json"));

        let written: TestReport =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(written.test_id, report.test_id);

        let again = store.save(&report).await;
        assert!(matches!(again, Err(ProbeError::Store(_))));
    }

    #[tokio::test]
    async fn test_file_names_are_content_addressed() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileReportStore::new(dir.path());
        let report = report();
        let path = store.save(&report).await.unwrap();

        let body = std::fs::read(&path).unwrap();
        let digest = hex::encode(Sha256::digest(&body));
        assert!(path.ends_with(&format!("{}.json", &digest[..12])));
    }

    #[tokio::test]
    async fn test_memory_store_writes_once() {
        let store = InMemoryReportStore::new();
        let report = report();
        store.save(&report).await.unwrap();
        assert!(store.save(&report).await.is_err());
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&report.test_id).unwrap().test_id, report.test_id);
    }
}
