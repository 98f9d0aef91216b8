//! CSV record store service
//!
//! Owns the backing file and serializes all access to it. Every operation
//! takes the store lock for its full read-transform-write cycle, so two
//! concurrent requests can never interleave their rewrites and lose updates.
//! Full-file rewrites go through a temp file and a rename so a crash
//! mid-write cannot truncate the store.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// Fixed header line of the backing file.
const HEADER: &str = "ID,DATA";

/// Prefix of every generated record id.
const ID_PREFIX: &str = "ABC";

/// Maximum id draws per add before giving up. The id space only holds 9000
/// values, so a nearly-full store can exhaust this.
const MAX_ID_ATTEMPTS: usize = 64;

/// Error types for store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// File I/O error while reading or writing the backing file
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record line could not be parsed (no comma separator)
    #[error("Malformed record line: {0}")]
    Parse(String),

    /// Could not draw an unused record id within the attempt budget
    #[error("Could not generate an unused record ID after {MAX_ID_ATTEMPTS} attempts")]
    IdsExhausted,
}

/// One stored record. Serialized field names match the backing file header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Record identifier (`ABC` followed by four digits)
    #[serde(rename = "ID")]
    pub id: String,
    /// Caller-supplied payload, stored verbatim
    #[serde(rename = "DATA")]
    pub data: String,
}

/// Record store backed by a single flat CSV file.
///
/// The path comes from configuration at construction time. The file is
/// created lazily on the first successful add.
pub struct RecordStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl RecordStore {
    /// Create a store over the given backing file path.
    ///
    /// Does not touch the filesystem; the file may not exist yet.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Draw a candidate record id: `ABC` plus a random number in 1000..=9999.
    fn draw_id() -> String {
        let n = rand::thread_rng().gen_range(1000..=9999);
        format!("{}{}", ID_PREFIX, n)
    }

    /// Append a new record, creating the file and header if absent.
    ///
    /// The id is re-drawn while it collides with an id already in the file,
    /// up to [`MAX_ID_ATTEMPTS`] times.
    ///
    /// # Returns
    /// * `Ok(String)` - The generated record id
    /// * `Err(StoreError)` - On I/O failure or id exhaustion
    pub async fn add(&self, data: &str) -> Result<String, StoreError> {
        let _guard = self.lock.lock().await;

        let lines = self.read_lines().await?;
        let existing: HashSet<String> = lines
            .as_deref()
            .unwrap_or_default()
            .iter()
            .skip(1)
            .filter_map(|line| id_field(line).map(str::to_string))
            .collect();

        let mut id = Self::draw_id();
        let mut attempts = 1;
        while existing.contains(id.as_str()) {
            if attempts >= MAX_ID_ATTEMPTS {
                return Err(StoreError::IdsExhausted);
            }
            id = Self::draw_id();
            attempts += 1;
        }

        let record_line = format!("{},{}", id, data);
        match lines {
            Some(_) => {
                let mut file = fs::OpenOptions::new()
                    .append(true)
                    .open(&self.path)
                    .await?;
                file.write_all(record_line.as_bytes()).await?;
                file.write_all(b"\n").await?;
                file.sync_all().await?;
            }
            None => {
                // First record: create the file with its header line.
                self.write_lines(&[HEADER.to_string(), record_line]).await?;
            }
        }

        debug!(id = %id, "Record appended");
        Ok(id)
    }

    /// Replace the data of every record whose id equals `id`.
    ///
    /// # Returns
    /// * `Ok(true)` - At least one line was rewritten
    /// * `Ok(false)` - No record matched (including a missing file)
    /// * `Err(StoreError)` - On I/O failure
    pub async fn modify(&self, id: &str, new_data: &str) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().await;

        let Some(mut lines) = self.read_lines().await? else {
            return Ok(false);
        };

        let mut updated = false;
        for line in lines.iter_mut().skip(1) {
            if id_field(line) == Some(id) {
                *line = format!("{},{}", id, new_data);
                updated = true;
            }
        }

        if updated {
            self.write_lines(&lines).await?;
            debug!(id = %id, "Record modified");
        }
        Ok(updated)
    }

    /// Remove every record whose id equals `id`, preserving the order of the
    /// remaining lines.
    ///
    /// # Returns
    /// * `Ok(usize)` - Number of lines removed (0 when nothing matched or the
    ///   file does not exist)
    /// * `Err(StoreError)` - On I/O failure
    pub async fn delete(&self, id: &str) -> Result<usize, StoreError> {
        let _guard = self.lock.lock().await;

        let Some(lines) = self.read_lines().await? else {
            return Ok(0);
        };

        let before = lines.len();
        let mut kept = Vec::with_capacity(before);
        let mut iter = lines.into_iter();
        if let Some(header) = iter.next() {
            kept.push(header);
        }
        for line in iter {
            if id_field(&line) != Some(id) {
                kept.push(line);
            }
        }

        let removed = before - kept.len();
        if removed > 0 {
            self.write_lines(&kept).await?;
            debug!(id = %id, removed, "Records deleted");
        }
        Ok(removed)
    }

    /// Parse all records in file order.
    ///
    /// # Returns
    /// * `Ok(Some(records))` - Parsed records, header skipped
    /// * `Ok(None)` - The backing file does not exist yet
    /// * `Err(StoreError)` - On I/O failure or a record line with no comma
    pub async fn list(&self) -> Result<Option<Vec<Record>>, StoreError> {
        let _guard = self.lock.lock().await;

        let Some(lines) = self.read_lines().await? else {
            return Ok(None);
        };

        let mut records = Vec::new();
        for line in lines.iter().skip(1) {
            if line.is_empty() {
                continue;
            }
            let (id, data) = line
                .split_once(',')
                .ok_or_else(|| StoreError::Parse(line.clone()))?;
            records.push(Record {
                id: id.to_string(),
                data: data.to_string(),
            });
        }
        Ok(Some(records))
    }

    /// Read the backing file into lines, `None` when it does not exist.
    async fn read_lines(&self) -> Result<Option<Vec<String>>, StoreError> {
        match fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(Some(contents.lines().map(String::from).collect())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    /// Rewrite the backing file atomically: write a temp file in the same
    /// directory, fsync it, then rename it over the original.
    async fn write_lines(&self, lines: &[String]) -> Result<(), StoreError> {
        let file_name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("data.csv");
        let tmp_path = self.path.with_file_name(format!("{}.tmp", file_name));

        let mut contents = lines.join("\n");
        contents.push('\n');

        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(contents.as_bytes()).await?;
        file.sync_all().await?;
        fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

/// First comma-separated field of a line, if any.
fn id_field(line: &str) -> Option<&str> {
    let field = line.split(',').next().unwrap_or(line);
    if field.is_empty() {
        None
    } else {
        Some(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store_in(dir: &tempfile::TempDir) -> RecordStore {
        RecordStore::new(dir.path().join("data.csv"))
    }

    #[test]
    fn test_draw_id_format() {
        for _ in 0..100 {
            let id = RecordStore::draw_id();
            assert_eq!(id.len(), 7);
            assert!(id.starts_with("ABC"));
            let n: u32 = id[3..].parse().expect("numeric suffix");
            assert!((1000..=9999).contains(&n));
        }
    }

    #[tokio::test]
    async fn test_add_creates_file_with_header() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(&dir);

        let id = store.add("hello").await.expect("add should succeed");

        let contents = std::fs::read_to_string(store.path()).expect("file exists");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "ID,DATA");
        assert_eq!(lines[1], format!("{},hello", id));
    }

    #[tokio::test]
    async fn test_add_appends_without_duplicating_header() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(&dir);

        store.add("first").await.expect("add first");
        store.add("second").await.expect("add second");

        let contents = std::fs::read_to_string(store.path()).expect("file exists");
        let headers = contents.lines().filter(|l| *l == "ID,DATA").count();
        assert_eq!(headers, 1);
        assert_eq!(contents.lines().count(), 3);
    }

    #[tokio::test]
    async fn test_add_avoids_existing_ids() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(&dir);

        // Occupy half the id space; a fresh add must land outside it.
        let mut lines = vec!["ID,DATA".to_string()];
        for n in 1000..5500 {
            lines.push(format!("ABC{},seed", n));
        }
        let mut contents = lines.join("\n");
        contents.push('\n');
        std::fs::write(store.path(), contents).expect("seed file");

        let id = store.add("fresh").await.expect("plenty of ids left");
        let n: u32 = id[3..].parse().expect("numeric suffix");
        assert!((5500..=9999).contains(&n), "collided with a seeded id: {}", id);
    }

    #[tokio::test]
    async fn test_add_fails_when_id_space_full() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(&dir);

        let mut lines = vec!["ID,DATA".to_string()];
        for n in 1000..=9999 {
            lines.push(format!("ABC{},seed", n));
        }
        let mut contents = lines.join("\n");
        contents.push('\n');
        std::fs::write(store.path(), contents).expect("seed file");

        let result = store.add("fresh").await;
        match result {
            Err(StoreError::IdsExhausted) => {}
            other => panic!("Expected IdsExhausted, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_modify_exact_id_only() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(&dir);
        std::fs::write(
            store.path(),
            "ID,DATA\nABC1000,alpha\nABC10001,beta\n",
        )
        .expect("seed file");

        // ABC1000 is a textual prefix of ABC10001; only the exact id moves.
        let updated = store.modify("ABC1000", "gamma").await.expect("modify");
        assert!(updated);

        let contents = std::fs::read_to_string(store.path()).expect("file exists");
        assert_eq!(contents, "ID,DATA\nABC1000,gamma\nABC10001,beta\n");
    }

    #[tokio::test]
    async fn test_modify_updates_all_duplicates() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(&dir);
        std::fs::write(
            store.path(),
            "ID,DATA\nABC1234,one\nABC5678,two\nABC1234,three\n",
        )
        .expect("seed file");

        let updated = store.modify("ABC1234", "new").await.expect("modify");
        assert!(updated);

        let records = store.list().await.expect("list").expect("file exists");
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].data, "new");
        assert_eq!(records[1].data, "two");
        assert_eq!(records[2].data, "new");
    }

    #[tokio::test]
    async fn test_modify_missing_id_leaves_file_untouched() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(&dir);
        std::fs::write(store.path(), "ID,DATA\nABC1234,one\n").expect("seed file");

        let updated = store.modify("ABC9999", "new").await.expect("modify");
        assert!(!updated);

        let contents = std::fs::read_to_string(store.path()).expect("file exists");
        assert_eq!(contents, "ID,DATA\nABC1234,one\n");
    }

    #[tokio::test]
    async fn test_modify_missing_file_reports_no_match() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(&dir);

        let updated = store.modify("ABC1234", "new").await.expect("modify");
        assert!(!updated);
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_delete_removes_matching_lines() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(&dir);
        std::fs::write(
            store.path(),
            "ID,DATA\nABC1111,a\nABC2222,b\nABC1111,c\n",
        )
        .expect("seed file");

        let removed = store.delete("ABC1111").await.expect("delete");
        assert_eq!(removed, 2);

        let contents = std::fs::read_to_string(store.path()).expect("file exists");
        assert_eq!(contents, "ID,DATA\nABC2222,b\n");
    }

    #[tokio::test]
    async fn test_delete_never_removes_header() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(&dir);
        std::fs::write(store.path(), "ID,DATA\nABC3333,x\n").expect("seed file");

        let removed = store.delete("ABC3333").await.expect("delete");
        assert_eq!(removed, 1);

        let contents = std::fs::read_to_string(store.path()).expect("file exists");
        assert_eq!(contents, "ID,DATA\n");
    }

    #[tokio::test]
    async fn test_delete_missing_id_returns_zero() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(&dir);
        std::fs::write(store.path(), "ID,DATA\nABC1234,one\n").expect("seed file");

        let removed = store.delete("ABC9999").await.expect("delete");
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn test_list_missing_file_is_none() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(&dir);

        let result = store.list().await.expect("list");
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_list_preserves_file_order() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(&dir);
        std::fs::write(
            store.path(),
            "ID,DATA\nABC3333,c\nABC1111,a\nABC2222,b\n",
        )
        .expect("seed file");

        let records = store.list().await.expect("list").expect("file exists");
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["ABC3333", "ABC1111", "ABC2222"]);
    }

    #[tokio::test]
    async fn test_list_malformed_line_is_parse_error() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(&dir);
        std::fs::write(store.path(), "ID,DATA\nno-comma-here\n").expect("seed file");

        let result = store.list().await;
        match result {
            Err(StoreError::Parse(line)) => assert_eq!(line, "no-comma-here"),
            other => panic!("Expected Parse error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_list_keeps_commas_in_data() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(&dir);
        std::fs::write(store.path(), "ID,DATA\nABC1234,a,b,c\n").expect("seed file");

        let records = store.list().await.expect("list").expect("file exists");
        // Only the first comma separates id from data; the rest is payload.
        assert_eq!(records[0].data, "a,b,c");
    }

    #[tokio::test]
    async fn test_rewrite_leaves_no_temp_file() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(&dir);
        std::fs::write(store.path(), "ID,DATA\nABC1234,one\n").expect("seed file");

        store.modify("ABC1234", "two").await.expect("modify");

        let tmp = dir.path().join("data.csv.tmp");
        assert!(!tmp.exists());
    }

    #[tokio::test]
    async fn test_concurrent_adds_lose_nothing() {
        let dir = tempdir().expect("tempdir");
        let store = std::sync::Arc::new(store_in(&dir));

        let mut handles = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.add(&format!("payload-{}", i)).await
            }));
        }
        for handle in handles {
            handle.await.expect("join").expect("add");
        }

        let records = store.list().await.expect("list").expect("file exists");
        assert_eq!(records.len(), 20);
    }
}
