//! Shared append-only log backed by a single file.
//!
//! Every connection handler and the timestamp task append through one
//! `SharedLog`. A single lock serializes each append (open, write, close)
//! against every other append and read, so the file content is always a
//! clean interleaving of whole appends.

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, trace};

/// File-backed byte log shared by all writer tasks.
///
/// The backing file is created lazily on the first append and removed by
/// the shutdown sequence once every writer has stopped.
pub struct SharedLog {
    path: PathBuf,
    /// Serializes every append and whole-file read.
    lock: Mutex<()>,
}

impl SharedLog {
    /// Create a handle for the log at `path`. No file is created yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `data` to the log.
    ///
    /// The file is opened, written, and closed under the log lock, so the
    /// append is atomic with respect to every other append and read.
    pub async fn append(&self, data: &[u8]) -> io::Result<()> {
        let _guard = self.lock.lock().await;
        self.write_locked(data).await
    }

    /// Append `data` and read back the entire log content under a single
    /// lock acquisition, so no other writer lands between the append and
    /// the returned snapshot.
    pub async fn append_and_read_all(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        let _guard = self.lock.lock().await;
        self.write_locked(data).await?;
        self.read_locked().await
    }

    /// Read the full current content of the log.
    ///
    /// A log that has never been appended to reads as empty.
    pub async fn read_all(&self) -> io::Result<Vec<u8>> {
        let _guard = self.lock.lock().await;
        self.read_locked().await
    }

    /// Remove the backing file. A missing file is not an error.
    pub async fn remove(&self) -> io::Result<()> {
        let _guard = self.lock.lock().await;
        match fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "Removed log file");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn write_locked(&self, data: &[u8]) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(data).await?;
        file.flush().await?;
        trace!(bytes = data.len(), "Appended to log");
        Ok(())
    }

    async fn read_locked(&self) -> io::Result<Vec<u8>> {
        match fs::read(&self.path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn temp_log(dir: &tempfile::TempDir) -> SharedLog {
        SharedLog::new(dir.path().join("echolog.data"))
    }

    #[tokio::test]
    async fn test_file_created_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let log = temp_log(&dir);

        assert!(!log.path().exists());
        log.append(b"hello\n").await.unwrap();
        assert!(log.path().exists());
        assert_eq!(log.read_all().await.unwrap(), b"hello\n");
    }

    #[tokio::test]
    async fn test_appends_accumulate_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = temp_log(&dir);

        log.append(b"hello\n").await.unwrap();
        log.append(b"world\n").await.unwrap();
        assert_eq!(log.read_all().await.unwrap(), b"hello\nworld\n");
    }

    #[tokio::test]
    async fn test_read_all_on_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = temp_log(&dir);
        assert!(log.read_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_and_read_all_returns_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let log = temp_log(&dir);

        log.append(b"first\n").await.unwrap();
        let snapshot = log.append_and_read_all(b"second\n").await.unwrap();
        assert_eq!(snapshot, b"first\nsecond\n");
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let log = temp_log(&dir);

        log.append(b"data\n").await.unwrap();
        log.remove().await.unwrap();
        assert!(!log.path().exists());

        // Second removal finds nothing and still succeeds
        log.remove().await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_appends_lose_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(temp_log(&dir));

        let mut handles = Vec::new();
        for writer in 0..8 {
            let log = Arc::clone(&log);
            handles.push(tokio::spawn(async move {
                for seq in 0..20 {
                    let line = format!("writer-{writer} seq-{seq}\n");
                    log.append(line.as_bytes()).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let content = log.read_all().await.unwrap();
        let text = String::from_utf8(content).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 8 * 20);
        for writer in 0..8 {
            for seq in 0..20 {
                let expected = format!("writer-{writer} seq-{seq}");
                assert_eq!(
                    lines.iter().filter(|line| **line == expected).count(),
                    1,
                    "missing or duplicated line: {expected}"
                );
            }
        }
    }
}
