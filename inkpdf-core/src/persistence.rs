//! Saved document records: document bytes plus the annotation overlay and view state.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};
use tracing::warn;
use uuid::Uuid;

use crate::store::AnnotationStore;

static RECORD_NAMESPACE: Lazy<Uuid> = Lazy::new(|| {
    Uuid::parse_str("3f6d0b52-8e1c-5d7a-9b43-c1a2e5f07d19").expect("valid namespace UUID")
});

fn default_page() -> u32 {
    1
}

fn default_zoom() -> f32 {
    1.0
}

/// One saved document. The file name is the record key.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedRecord {
    pub file_name: String,
    #[serde_as(as = "Base64")]
    pub pdf_data: Vec<u8>,
    #[serde(default)]
    pub annotations: AnnotationStore,
    #[serde(default = "default_page")]
    pub current_page: u32,
    #[serde(default = "default_zoom")]
    pub zoom: f32,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Key-value storage of records, one per file name.
pub trait RecordStore: Send + Sync {
    /// Inserts or overwrites the record keyed by `record.file_name`.
    fn put(&self, record: &PersistedRecord) -> Result<()>;
    fn get(&self, file_name: &str) -> Result<Option<PersistedRecord>>;
    fn get_all(&self) -> Result<Vec<PersistedRecord>>;
}

/// Newest record by timestamp, if any exist.
pub fn load_most_recent(store: &dyn RecordStore) -> Result<Option<PersistedRecord>> {
    Ok(store.get_all()?.into_iter().max_by_key(|r| r.timestamp))
}

pub struct FileRecordStore {
    root: PathBuf,
}

impl FileRecordStore {
    pub fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create record directory at {:?}", root))?;
        Ok(Self { root })
    }

    fn record_path(&self, file_name: &str) -> PathBuf {
        let key = Uuid::new_v5(&RECORD_NAMESPACE, file_name.as_bytes());
        self.root.join(format!("{}.json", key))
    }

    fn read_record(path: &PathBuf) -> Result<PersistedRecord> {
        let mut file =
            File::open(path).with_context(|| format!("failed to open record file {:?}", path))?;
        let mut buf = String::new();
        file.read_to_string(&mut buf)?;
        let record = serde_json::from_str(&buf)
            .with_context(|| format!("failed to decode record file {:?}", path))?;
        Ok(record)
    }
}

impl RecordStore for FileRecordStore {
    fn put(&self, record: &PersistedRecord) -> Result<()> {
        let path = self.record_path(&record.file_name);
        let tmp = path.with_extension("json.tmp");
        let payload = serde_json::to_string(record)?;
        let mut file = File::create(&tmp)
            .with_context(|| format!("failed to open temp record file {:?}", tmp))?;
        file.write_all(payload.as_bytes())?;
        file.flush()?;
        fs::rename(tmp, path)?;
        Ok(())
    }

    fn get(&self, file_name: &str) -> Result<Option<PersistedRecord>> {
        let path = self.record_path(file_name);
        if !path.exists() {
            return Ok(None);
        }
        Self::read_record(&path).map(Some)
    }

    fn get_all(&self) -> Result<Vec<PersistedRecord>> {
        let mut records = Vec::new();
        let entries = fs::read_dir(&self.root)
            .with_context(|| format!("failed to list record directory {:?}", self.root))?;
        for entry in entries {
            let path = entry?.path();
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }
            match Self::read_record(&path) {
                Ok(record) => records.push(record),
                Err(err) => warn!(?err, path = %path.display(), "skipping unreadable record"),
            }
        }
        Ok(records)
    }
}

#[derive(Default)]
pub struct MemoryRecordStore {
    inner: Mutex<HashMap<String, PersistedRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryRecordStore {
    fn put(&self, record: &PersistedRecord) -> Result<()> {
        self.inner
            .lock()
            .insert(record.file_name.clone(), record.clone());
        Ok(())
    }

    fn get(&self, file_name: &str) -> Result<Option<PersistedRecord>> {
        Ok(self.inner.lock().get(file_name).cloned())
    }

    fn get_all(&self) -> Result<Vec<PersistedRecord>> {
        Ok(self.inner.lock().values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{Annotation, AnnotationData, TextData, Tool};
    use tempfile::tempdir;

    fn record(name: &str, timestamp: u64) -> PersistedRecord {
        let mut annotations = AnnotationStore::new();
        annotations.append(Annotation::new(
            Tool::Text,
            2,
            AnnotationData::Text(TextData {
                text: "margin note".into(),
                x: 12.0,
                y: 40.0,
                color: "#0000ff".into(),
                size: 4.0,
                width: Some(90.5),
                height: Some(20.0),
            }),
        ));
        PersistedRecord {
            file_name: name.into(),
            pdf_data: b"%PDF-1.7 fake".to_vec(),
            annotations,
            current_page: 2,
            zoom: 1.5,
            timestamp,
        }
    }

    #[test]
    fn file_store_restores_record_by_name() {
        let dir = tempdir().unwrap();
        let store = FileRecordStore::new(dir.path().join("records")).unwrap();
        let saved = record("report.pdf", 10);
        store.put(&saved).unwrap();

        let restored = store.get("report.pdf").unwrap().unwrap();
        assert_eq!(restored, saved);
        assert!(store.get("other.pdf").unwrap().is_none());
    }

    #[test]
    fn put_overwrites_same_name() {
        let dir = tempdir().unwrap();
        let store = FileRecordStore::new(dir.path().to_path_buf()).unwrap();
        store.put(&record("a.pdf", 1)).unwrap();
        let mut newer = record("a.pdf", 2);
        newer.current_page = 5;
        store.put(&newer).unwrap();

        let all = store.get_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].current_page, 5);
    }

    #[test]
    fn most_recent_picks_max_timestamp() {
        let store = MemoryRecordStore::new();
        assert!(load_most_recent(&store).unwrap().is_none());

        store.put(&record("old.pdf", 100)).unwrap();
        store.put(&record("new.pdf", 300)).unwrap();
        store.put(&record("mid.pdf", 200)).unwrap();
        let latest = load_most_recent(&store).unwrap().unwrap();
        assert_eq!(latest.file_name, "new.pdf");
    }

    #[test]
    fn document_bytes_are_base64_in_json() {
        let value = serde_json::to_value(record("x.pdf", 1)).unwrap();
        assert!(value["pdfData"].is_string());
        assert_eq!(value["currentPage"], 2);
        assert_eq!(value["annotations"][0]["data"]["type"], "text");
    }

    #[test]
    fn get_all_skips_corrupt_files() {
        let dir = tempdir().unwrap();
        let store = FileRecordStore::new(dir.path().to_path_buf()).unwrap();
        store.put(&record("good.pdf", 1)).unwrap();
        fs::write(dir.path().join("broken.json"), "{not json").unwrap();

        let all = store.get_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].file_name, "good.pdf");
    }
}
