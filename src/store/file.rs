use super::memory::Collections;
use super::{DocumentStore, InMemoryDocumentStore};
use crate::core::{FixError, Result};
use crate::document::{Document, DocumentId};
use crate::filter::Filter;
use crate::update::{BatchRequest, BatchResult};
use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Store backed by a single JSON file.
///
/// The file holds one object mapping collection names to arrays of
/// documents. It is read once on [`open`](Self::open) and rewritten
/// atomically after every write that changed something.
pub struct JsonFileStore {
    path: PathBuf,
    memory: InMemoryDocumentStore,
}

impl JsonFileStore {
    /// Opens the store file, starting empty if it does not exist yet.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let collections = match tokio::fs::read(&path).await {
            Ok(bytes) => parse_collections(&bytes, &path)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Collections::new(),
            Err(err) => {
                return Err(FixError::StoreUnavailable(format!(
                    "Failed to read store file '{}': {}",
                    path.display(),
                    err
                )));
            }
        };

        debug!(path = %path.display(), collections = collections.len(), "opened file store");
        Ok(Self {
            path,
            memory: InMemoryDocumentStore::from_collections(collections)?,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Releases the store. Later operations fail with `StoreUnavailable`.
    pub async fn close(&self) {
        self.memory.close().await;
    }

    async fn persist(&self) -> Result<()> {
        let collections = self.memory.snapshot().await?;
        let mut root = Map::new();
        for (name, documents) in collections {
            root.insert(
                name,
                JsonValue::Array(documents.into_iter().map(Document::into_value).collect()),
            );
        }
        let bytes = serde_json::to_vec_pretty(&JsonValue::Object(root))?;

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || atomic_write(&path, &bytes))
            .await
            .map_err(|e| FixError::StoreUnavailable(format!("Store write task failed: {}", e)))?
    }
}

fn parse_collections(bytes: &[u8], path: &Path) -> Result<Collections> {
    let root: JsonValue = serde_json::from_slice(bytes).map_err(|e| {
        FixError::Serialization(format!("Invalid store file '{}': {}", path.display(), e))
    })?;
    let JsonValue::Object(root) = root else {
        return Err(FixError::Serialization(format!(
            "Store file '{}' must hold a JSON object of collections",
            path.display()
        )));
    };

    let mut collections = Collections::new();
    for (name, documents) in root {
        let JsonValue::Array(documents) = documents else {
            return Err(FixError::Serialization(format!(
                "Collection '{}' in '{}' must be an array of documents",
                name,
                path.display()
            )));
        };
        let documents = documents
            .into_iter()
            .map(Document::from_value)
            .collect::<Result<Vec<_>>>()?;
        collections.insert(name, documents);
    }
    Ok(collections)
}

/// Writes to a temp file in the target directory, then renames it over
/// the target.
fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|err| {
        FixError::StoreUnavailable(format!(
            "Failed to create store directory '{}': {}",
            dir.display(),
            err
        ))
    })?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|err| {
        FixError::StoreUnavailable(format!(
            "Failed to create temp file in '{}': {}",
            dir.display(),
            err
        ))
    })?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|err| {
        FixError::StoreUnavailable(format!(
            "Failed to replace store file '{}': {}",
            path.display(),
            err
        ))
    })?;
    Ok(())
}

#[async_trait]
impl DocumentStore for JsonFileStore {
    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>> {
        self.memory.find(collection, filter).await
    }

    async fn insert_one(&self, collection: &str, document: Document) -> Result<DocumentId> {
        let id = self.memory.insert_one(collection, document).await?;
        self.persist().await?;
        Ok(id)
    }

    async fn delete_one(&self, collection: &str, id: &DocumentId) -> Result<bool> {
        let deleted = self.memory.delete_one(collection, id).await?;
        if deleted {
            self.persist().await?;
        }
        Ok(deleted)
    }

    async fn bulk_write(&self, collection: &str, batch: &BatchRequest) -> Result<BatchResult> {
        let result = self.memory.bulk_write(collection, batch).await?;
        if result.modified > 0 {
            self.persist().await?;
        }
        Ok(result)
    }
}
