//! File-backed status store for hosts sharing a container directory.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::error::{StorageError, StorageResult};
use super::lock::{self, StatusLock};
use super::store::StatusStore;

const STATUS_DIRNAME: &str = "walletbridge";
const STATUS_FILENAME: &str = "wallet_status.json";
const LOCK_FILENAME: &str = "wallet_status.lock";

type Document = BTreeMap<String, String>;

/// Status store persisted as a single JSON document under `<root>/walletbridge`.
///
/// Every mutation is a read-modify-write cycle performed under an exclusive
/// file lock and published with write-to-temp-then-rename, so concurrent
/// writers in the app and an extension never lose each other's keys and a
/// crash never leaves a torn document behind.
#[derive(Debug, uniffi::Object)]
pub struct FileStatusStore {
    document_path: PathBuf,
    lock: StatusLock,
}

impl FileStatusStore {
    /// Opens (creating if needed) the store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or lock file cannot be created.
    pub fn open(root: impl AsRef<Path>) -> StorageResult<Self> {
        let dir = root.as_ref().join(STATUS_DIRNAME);
        fs::create_dir_all(&dir).map_err(|e| StorageError::Store(e.to_string()))?;
        let lock = lock::open(&dir.join(LOCK_FILENAME))?;
        Ok(Self {
            document_path: dir.join(STATUS_FILENAME),
            lock,
        })
    }

    fn load(&self) -> StorageResult<Document> {
        match fs::read(&self.document_path) {
            Ok(bytes) if bytes.is_empty() => Ok(Document::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Document::new()),
            Err(e) => Err(StorageError::Store(e.to_string())),
        }
    }

    fn publish(&self, document: &Document) -> StorageResult<()> {
        let bytes = serde_json::to_vec(document)?;
        let tmp_path = self.document_path.with_extension("json.tmp");
        let io_err = |e: std::io::Error| StorageError::Store(e.to_string());

        let mut file = File::create(&tmp_path).map_err(io_err)?;
        file.write_all(&bytes).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        drop(file);
        fs::rename(&tmp_path, &self.document_path).map_err(io_err)
    }

    fn mutate(&self, f: impl FnOnce(&mut Document)) -> StorageResult<()> {
        let _guard = self.lock.lock()?;
        let mut document = self.load()?;
        f(&mut document);
        self.publish(&document)
    }
}

#[uniffi::export]
impl FileStatusStore {
    /// Opens the store rooted at `root` (e.g. the app group container path).
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or lock file cannot be created.
    #[uniffi::constructor]
    pub fn from_root(root: String) -> StorageResult<Self> {
        Self::open(PathBuf::from(root))
    }
}

impl StatusStore for FileStatusStore {
    fn read(&self, key: String) -> StorageResult<Option<String>> {
        let _guard = self.lock.lock()?;
        Ok(self.load()?.remove(&key))
    }

    fn write(&self, key: String, value: String) -> StorageResult<()> {
        self.mutate(|document| {
            document.insert(key, value);
        })
    }

    fn remove(&self, key: String) -> StorageResult<()> {
        self.mutate(|document| {
            document.remove(&key);
        })
    }

    fn remove_all(&self) -> StorageResult<()> {
        let _guard = self.lock.lock()?;
        match fs::remove_file(&self.document_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Store(e.to_string())),
        }
    }
}
