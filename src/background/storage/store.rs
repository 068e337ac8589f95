use std::{future::Future, io, ops::Deref, path::PathBuf};

use anyhow::{Context, Result};
use fs4::tokio::AsyncFileExt;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use tokio::{fs::File, sync::RwLock};
use tracing::debug;

use crate::fs::operations::{read_if_exists, write_atomically};

/// The whole persisted state: storage key -> JSON value.
pub type Document = Map<String, Value>;

/// Interface for abstracting the key-value store shared by the host and the command line.
pub trait KeyValueStore {
    /// Returns the requested keys. Keys that were never written are absent from the result.
    fn get(&self, keys: &[&str]) -> impl Future<Output = Result<Document>>;

    /// Applies `f` to the whole document as a single read-modify-write. Nothing is persisted if
    /// `f` fails, and no other modification can interleave with this one.
    fn modify<R, F>(&self, f: F) -> impl Future<Output = Result<R>>
    where
        F: FnOnce(&mut Document) -> Result<R>;
}

impl<T: Deref> KeyValueStore for T
where
    T::Target: KeyValueStore,
{
    fn get(&self, keys: &[&str]) -> impl Future<Output = Result<Document>> {
        self.deref().get(keys)
    }

    fn modify<R, F>(&self, f: F) -> impl Future<Output = Result<R>>
    where
        F: FnOnce(&mut Document) -> Result<R>,
    {
        self.deref().modify(f)
    }
}

/// Deserializes the value stored under `key`.
pub fn read_key<T: DeserializeOwned>(document: &Document, key: &str) -> Result<Option<T>> {
    document
        .get(key)
        .map(|v| serde_json::from_value(v.clone()).with_context(|| format!("Malformed value under {key}")))
        .transpose()
}

pub fn write_key<T: Serialize>(document: &mut Document, key: &str, value: &T) -> Result<()> {
    document.insert(key.to_owned(), serde_json::to_value(value)?);
    Ok(())
}

fn select(document: Document, keys: &[&str]) -> Document {
    document
        .into_iter()
        .filter(|(key, _)| keys.contains(&key.as_str()))
        .collect()
}

const DOCUMENT_NAME: &str = "storage.json";
const LOCK_NAME: &str = "storage.lock";

/// The main realization of [KeyValueStore]. All keys live in one JSON document, so a single
/// modification can change several keys at once and still be applied atomically.
///
/// Other processes are kept out with a lock on a sidecar file, since the document itself is
/// replaced on every write.
pub struct FileStore {
    document_path: PathBuf,
    lock_path: PathBuf,
    in_process: RwLock<()>,
}

impl FileStore {
    pub fn new(storage_dir: PathBuf) -> Result<Self, io::Error> {
        std::fs::create_dir_all(&storage_dir)?;

        Ok(Self {
            document_path: storage_dir.join(DOCUMENT_NAME),
            lock_path: storage_dir.join(LOCK_NAME),
            in_process: RwLock::new(()),
        })
    }

    async fn open_lock(&self) -> Result<File> {
        Ok(File::options()
            .write(true)
            .create(true)
            .read(true)
            .truncate(false)
            .open(&self.lock_path)
            .await?)
    }

    async fn read_document(&self) -> Result<Document> {
        match read_if_exists(&self.document_path).await? {
            Some(bytes) if !bytes.iter().all(u8::is_ascii_whitespace) => {
                serde_json::from_slice(&bytes)
                    .with_context(|| format!("Storage document {:?} is corrupted", self.document_path))
            }
            _ => Ok(Document::new()),
        }
    }

    async fn modify_locked<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Document) -> Result<R>,
    {
        let mut document = self.read_document().await?;
        let before = document.clone();
        let result = f(&mut document)?;
        if document != before {
            debug!("Writing storage document {:?}", self.document_path);
            write_atomically(&self.document_path, &serde_json::to_vec_pretty(&document)?).await?;
        }
        Ok(result)
    }
}

impl KeyValueStore for FileStore {
    async fn get(&self, keys: &[&str]) -> Result<Document> {
        let _guard = self.in_process.read().await;
        let lock = self.open_lock().await?;
        lock.lock_shared()?;
        let document = self.read_document().await;
        lock.unlock_async().await?;
        Ok(select(document?, keys))
    }

    async fn modify<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Document) -> Result<R>,
    {
        let _guard = self.in_process.write().await;
        let lock = self.open_lock().await?;
        // Semi-safe acquire-release for the document
        lock.lock_exclusive()?;
        let result = self.modify_locked(f).await;
        lock.unlock_async().await?;
        result
    }
}

#[cfg(test)]
pub use memory::MemoryStore;

#[cfg(test)]
mod memory {
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    };

    use anyhow::{bail, Result};

    use super::{select, Document, KeyValueStore};

    /// In-process store. Can be switched into a failing mode to exercise error paths.
    #[derive(Default)]
    pub struct MemoryStore {
        document: Mutex<Document>,
        failing: AtomicBool,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        pub fn snapshot(&self) -> Document {
            self.document.lock().unwrap().clone()
        }
    }

    impl KeyValueStore for MemoryStore {
        async fn get(&self, keys: &[&str]) -> Result<Document> {
            if self.failing.load(Ordering::SeqCst) {
                bail!("Storage is unavailable");
            }
            Ok(select(self.snapshot(), keys))
        }

        async fn modify<R, F>(&self, f: F) -> Result<R>
        where
            F: FnOnce(&mut Document) -> Result<R>,
        {
            if self.failing.load(Ordering::SeqCst) {
                bail!("Storage is unavailable");
            }
            let mut document = self.document.lock().unwrap();
            let mut working = document.clone();
            let result = f(&mut working)?;
            *document = working;
            Ok(result)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::{bail, Result};
    use serde_json::json;
    use tempfile::tempdir;

    use super::{read_key, write_key, FileStore, KeyValueStore};

    #[tokio::test]
    async fn test_file_store_starts_empty() -> Result<()> {
        let dir = tempdir()?;
        let store = FileStore::new(dir.path().join("storage"))?;
        assert!(store.get(&["config"]).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_file_store_writes_several_keys_together() -> Result<()> {
        let dir = tempdir()?;
        let store = FileStore::new(dir.path().to_owned())?;

        store
            .modify(|document| {
                write_key(document, "archives", &json!({ "2025-01": {} }))?;
                write_key(document, "trackingData", &json!({}))?;
                Ok(())
            })
            .await?;

        // A fresh handle reads what the first one wrote.
        let reopened = FileStore::new(dir.path().to_owned())?;
        let document = reopened.get(&["archives", "trackingData", "config"]).await?;
        assert_eq!(document.len(), 2);
        assert_eq!(document["archives"], json!({ "2025-01": {} }));
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_modification_is_not_persisted() -> Result<()> {
        let dir = tempdir()?;
        let store = FileStore::new(dir.path().to_owned())?;
        store
            .modify(|document| write_key(document, "config", &json!({ "rate": 0.01 })))
            .await?;

        let result = store
            .modify(|document| -> Result<()> {
                write_key(document, "config", &json!({ "rate": 5 }))?;
                bail!("changed my mind")
            })
            .await;
        assert!(result.is_err());

        let document = store.get(&["config"]).await?;
        let rate: Option<serde_json::Value> = read_key(&document, "config")?;
        assert_eq!(rate, Some(json!({ "rate": 0.01 })));
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupted_document_is_reported() -> Result<()> {
        let dir = tempdir()?;
        std::fs::write(dir.path().join("storage.json"), "{ not json")?;
        let store = FileStore::new(dir.path().to_owned())?;
        assert!(store.get(&["trackingData"]).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_modifications_do_not_lose_updates() -> Result<()> {
        let dir = tempdir()?;
        let store = Arc::new(FileStore::new(dir.path().to_owned())?);

        let increment = |store: Arc<FileStore>| async move {
            store
                .modify(|document| {
                    let current: u64 = read_key(document, "counter")?.unwrap_or(0);
                    write_key(document, "counter", &(current + 1))
                })
                .await
        };

        let (a, b, c) = tokio::join!(
            increment(store.clone()),
            increment(store.clone()),
            increment(store.clone())
        );
        a?;
        b?;
        c?;

        let counter: Option<u64> = read_key(&store.get(&["counter"]).await?, "counter")?;
        assert_eq!(counter, Some(3));
        Ok(())
    }
}
