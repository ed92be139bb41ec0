//! Document stores
//!
//! [`DocumentStore`] is the seam between the fix pipeline and the database:
//! a conjunctive query interface and a batch-write interface keyed by
//! document identifier.
//!
//! - `memory.rs` - `InMemoryDocumentStore`, collections behind a tokio lock
//! - `file.rs` - `JsonFileStore`, an in-memory store snapshotted to disk

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::{Collections, InMemoryDocumentStore};

use crate::core::{FixError, Result};
use crate::document::{Document, DocumentId};
use crate::filter::Filter;
use crate::update::{BatchRequest, BatchResult};
use async_trait::async_trait;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Documents in `collection` matching `filter`, in store order.
    /// A collection that does not exist yields no documents.
    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>>;

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64> {
        Ok(self.find(collection, filter).await?.len() as u64)
    }

    /// Inserts a document, assigning an `_id` if it has none.
    async fn insert_one(&self, collection: &str, document: Document) -> Result<DocumentId>;

    /// Deletes a document by identifier. Returns whether it existed.
    async fn delete_one(&self, collection: &str, id: &DocumentId) -> Result<bool>;

    /// Applies every instruction independently, in order. Rejected
    /// instructions are reported in the result, not as an error.
    async fn bulk_write(&self, collection: &str, batch: &BatchRequest) -> Result<BatchResult>;
}

pub fn validate_collection_name(name: &str) -> Result<()> {
    let Some(first) = name.chars().next() else {
        return Err(FixError::InvalidCollectionName(
            "Collection name cannot be empty".to_string(),
        ));
    };

    // Must start with letter or underscore
    if !first.is_alphabetic() && first != '_' {
        return Err(FixError::InvalidCollectionName(format!(
            "Collection name '{}' must start with a letter or underscore",
            name
        )));
    }

    if !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(FixError::InvalidCollectionName(format!(
            "Collection name '{}' can only contain letters, numbers, and underscores",
            name
        )));
    }

    if name.len() > 64 {
        return Err(FixError::InvalidCollectionName(
            "Collection name too long (max 64 characters)".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_collection_names() {
        assert!(validate_collection_name("declarations").is_ok());
        assert!(validate_collection_name("dbchangelog").is_ok());
        assert!(validate_collection_name("_internal").is_ok());
        assert!(validate_collection_name("data123").is_ok());
    }

    #[test]
    fn test_invalid_collection_names() {
        assert!(validate_collection_name("").is_err());
        assert!(validate_collection_name("123declarations").is_err());
        assert!(validate_collection_name("export-declarations").is_err());
        assert!(validate_collection_name("export declarations").is_err());
        assert!(validate_collection_name(&"d".repeat(65)).is_err());
    }
}
