//! Record file I/O
//!
//! One file per key, named by [`crate::codec::encode_key`]. Writes are
//! atomic (temp file, fsync, rename) so a crash never leaves a record
//! half written. Every operation has a blocking and a tokio variant.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::error::{IoOp, StoreError, StoreResult};
use super::stats::IoCounters;
use crate::codec;

/// The directory holding all record files of a store
#[derive(Debug)]
pub(crate) struct RecordDir {
    root: PathBuf,
    pretty: bool,
    counters: IoCounters,
}

impl RecordDir {
    /// Create the directory tree (idempotent) and wrap it
    pub fn create(root: PathBuf, pretty: bool) -> StoreResult<Self> {
        fs::create_dir_all(&root).map_err(|source| StoreError::CreateDirectory {
            path: root.clone(),
            source,
        })?;

        Ok(Self {
            root,
            pretty,
            counters: IoCounters::default(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn counters(&self) -> &IoCounters {
        &self.counters
    }

    /// Path of the file storing `key`
    pub fn record_path(&self, key: &str) -> PathBuf {
        self.root.join(codec::encode_key(key))
    }

    /// Keys of every managed record in the directory
    ///
    /// Files whose names the codec does not recognize are skipped.
    pub fn scan_keys(&self) -> StoreResult<Vec<String>> {
        let entries = fs::read_dir(&self.root)
            .map_err(|e| StoreError::from_io(e, self.root.clone(), IoOp::Read))?;

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::from_io(e, self.root.clone(), IoOp::Read))?;
            let name = entry.file_name();
            match name.to_str().and_then(codec::decode_filename) {
                Some(key) => keys.push(key),
                None => debug!("Skipping unmanaged file {:?}", name),
            }
        }
        keys.sort();
        Ok(keys)
    }

    pub fn read_sync(&self, key: &str) -> StoreResult<Value> {
        let path = self.record_path(key);
        debug!("disk read sync {:?}", path);
        self.counters.record_read();
        let bytes = fs::read(&path).map_err(|e| StoreError::from_io(e, path.clone(), IoOp::Read))?;
        deserialize(&path, &bytes)
    }

    pub async fn read(&self, key: &str) -> StoreResult<Value> {
        let path = self.record_path(key);
        debug!("disk read {:?}", path);
        self.counters.record_read();
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| StoreError::from_io(e, path.clone(), IoOp::Read))?;
        deserialize(&path, &bytes)
    }

    pub fn write_sync(&self, key: &str, value: &Value) -> StoreResult<()> {
        let path = self.record_path(key);
        debug!("disk write sync {:?}", path);
        let data = self.serialize(&path, value)?;
        atomic_write(&path, &data)?;
        self.counters.record_write();
        Ok(())
    }

    pub async fn write(&self, key: &str, value: &Value) -> StoreResult<()> {
        let path = self.record_path(key);
        debug!("disk write {:?}", path);
        let data = self.serialize(&path, value)?;
        atomic_write_async(&path, &data).await?;
        self.counters.record_write();
        Ok(())
    }

    /// Remove the record for `key`; a missing file is not an error
    pub fn remove_sync(&self, key: &str) -> StoreResult<()> {
        let path = self.record_path(key);
        debug!("disk erase sync {:?}", path);
        self.counters.record_remove();
        ignore_missing(fs::remove_file(&path).map_err(|e| StoreError::from_io(e, path, IoOp::Remove)))
    }

    /// Remove the record for `key`; a missing file is not an error
    pub async fn remove(&self, key: &str) -> StoreResult<()> {
        let path = self.record_path(key);
        debug!("disk erase {:?}", path);
        self.counters.record_remove();
        ignore_missing(
            tokio::fs::remove_file(&path)
                .await
                .map_err(|e| StoreError::from_io(e, path, IoOp::Remove)),
        )
    }

    fn serialize(&self, path: &Path, value: &Value) -> StoreResult<Vec<u8>> {
        let result = if self.pretty {
            let mut out = Vec::new();
            let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
            let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
            serde::Serialize::serialize(value, &mut ser).map(|_| out)
        } else {
            serde_json::to_vec(value)
        };

        result.map_err(|source| StoreError::Serialization {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn deserialize(path: &Path, bytes: &[u8]) -> StoreResult<Value> {
    serde_json::from_slice(bytes).map_err(|source| StoreError::Serialization {
        path: path.to_path_buf(),
        source,
    })
}

fn ignore_missing(result: StoreResult<()>) -> StoreResult<()> {
    match result {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}

/// Temp file next to the record; never matches the managed filename shape
fn temp_path(path: &Path) -> PathBuf {
    path.with_extension("json.tmp")
}

/// Write data to a file atomically
///
/// 1. Write to a temporary file in the same directory
/// 2. Sync the file to disk
/// 3. Rename the temp file to the target path
fn atomic_write(path: &Path, data: &[u8]) -> StoreResult<()> {
    let temp = temp_path(path);

    let mut file =
        File::create(&temp).map_err(|e| StoreError::from_io(e, temp.clone(), IoOp::Write))?;
    file.write_all(data)
        .and_then(|_| file.sync_all())
        .map_err(|e| StoreError::from_io(e, temp.clone(), IoOp::Write))?;

    fs::rename(&temp, path).map_err(|source| StoreError::AtomicWriteFailed {
        from: temp,
        to: path.to_path_buf(),
        source,
    })
}

async fn atomic_write_async(path: &Path, data: &[u8]) -> StoreResult<()> {
    let temp = temp_path(path);

    let mut file = tokio::fs::File::create(&temp)
        .await
        .map_err(|e| StoreError::from_io(e, temp.clone(), IoOp::Write))?;
    file.write_all(data)
        .await
        .map_err(|e| StoreError::from_io(e, temp.clone(), IoOp::Write))?;
    file.sync_all()
        .await
        .map_err(|e| StoreError::from_io(e, temp.clone(), IoOp::Write))?;
    drop(file);

    tokio::fs::rename(&temp, path)
        .await
        .map_err(|source| StoreError::AtomicWriteFailed {
            from: temp,
            to: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn record_dir(temp_dir: &TempDir, pretty: bool) -> RecordDir {
        RecordDir::create(temp_dir.path().to_path_buf(), pretty).unwrap()
    }

    #[test]
    fn test_create_is_idempotent_and_recursive() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("a").join("b").join("c");

        RecordDir::create(nested.clone(), false).unwrap();
        RecordDir::create(nested.clone(), false).unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn test_write_then_read() {
        let temp_dir = TempDir::new().unwrap();
        let dir = record_dir(&temp_dir, false);

        dir.write_sync("user/1", &json!({"name": "Ann"})).unwrap();
        assert!(temp_dir.path().join("_user%2F1.json").exists());
        assert_eq!(dir.read_sync("user/1").unwrap(), json!({"name": "Ann"}));
        assert!(!temp_dir.path().join("_user%2F1.json.tmp").exists());
    }

    #[test]
    fn test_pretty_output_uses_tabs() {
        let temp_dir = TempDir::new().unwrap();
        let dir = record_dir(&temp_dir, true);

        dir.write_sync("k", &json!({"a": 1})).unwrap();
        let content = fs::read_to_string(dir.record_path("k")).unwrap();
        assert_eq!(content, "{\n\t\"a\": 1\n}");
    }

    #[test]
    fn test_read_missing_and_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let dir = record_dir(&temp_dir, false);

        assert!(dir.read_sync("missing").unwrap_err().is_not_found());

        fs::write(dir.record_path("bad"), "{not json").unwrap();
        let err = dir.read_sync("bad").unwrap_err();
        assert!(matches!(err, StoreError::Serialization { .. }));
        // Left untouched
        assert_eq!(fs::read_to_string(dir.record_path("bad")).unwrap(), "{not json");
    }

    #[test]
    fn test_remove_missing_is_ok() {
        let temp_dir = TempDir::new().unwrap();
        let dir = record_dir(&temp_dir, false);

        dir.remove_sync("never-written").unwrap();
        dir.write_sync("k", &json!(1)).unwrap();
        dir.remove_sync("k").unwrap();
        assert!(!dir.record_path("k").exists());
    }

    #[test]
    fn test_scan_skips_foreign_files() {
        let temp_dir = TempDir::new().unwrap();
        let dir = record_dir(&temp_dir, false);

        dir.write_sync("b key", &json!(2)).unwrap();
        dir.write_sync("a.key", &json!(1)).unwrap();
        fs::write(temp_dir.path().join("README.md"), "hi").unwrap();
        fs::write(temp_dir.path().join("_x.json.tmp"), "{}").unwrap();

        assert_eq!(dir.scan_keys().unwrap(), vec!["a.key".to_string(), "b key".to_string()]);
    }

    #[tokio::test]
    async fn test_async_round_trip_and_counters() {
        let temp_dir = TempDir::new().unwrap();
        let dir = record_dir(&temp_dir, false);

        dir.write("k", &json!([1, 2, 3])).await.unwrap();
        assert_eq!(dir.read("k").await.unwrap(), json!([1, 2, 3]));
        dir.remove("k").await.unwrap();
        dir.remove("k").await.unwrap();
        assert!(dir.read("k").await.unwrap_err().is_not_found());

        let stats = dir.counters().snapshot();
        assert_eq!(stats.disk_writes, 1);
        assert_eq!(stats.disk_reads, 2);
        assert_eq!(stats.disk_removes, 2);
    }
}
