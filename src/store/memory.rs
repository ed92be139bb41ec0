use super::{DocumentStore, validate_collection_name};
use crate::core::{FixError, Result};
use crate::document::{Document, DocumentId, ID_FIELD};
use crate::filter::Filter;
use crate::update::{BatchRequest, BatchResult, RejectedInstruction};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

pub type Collections = BTreeMap<String, Vec<Document>>;

struct StoreState {
    /// Documents per collection, in insertion order
    collections: Collections,
    open: bool,
}

/// Store keeping every collection in memory.
///
/// Cloning shares the underlying collections. After [`close`](Self::close)
/// every operation fails with `StoreUnavailable`.
#[derive(Clone)]
pub struct InMemoryDocumentStore {
    state: Arc<RwLock<StoreState>>,
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(StoreState {
                collections: Collections::new(),
                open: true,
            })),
        }
    }

    /// Builds a store from existing collections, as loaded.
    ///
    /// Documents without a usable `_id` are kept; they can be found but no
    /// instruction can address them. Duplicate identifiers are rejected.
    pub fn from_collections(collections: Collections) -> Result<Self> {
        for (name, documents) in &collections {
            validate_collection_name(name)?;
            let mut seen = HashSet::new();
            for id in documents.iter().filter_map(|d| d.id().ok()) {
                if !seen.insert(id.clone()) {
                    return Err(FixError::DuplicateId(id.to_string(), name.clone()));
                }
            }
        }

        Ok(Self {
            state: Arc::new(RwLock::new(StoreState {
                collections,
                open: true,
            })),
        })
    }

    pub async fn insert_many(
        &self,
        collection: &str,
        documents: impl IntoIterator<Item = Document>,
    ) -> Result<Vec<DocumentId>> {
        let mut ids = Vec::new();
        for document in documents {
            ids.push(self.insert_one(collection, document).await?);
        }
        Ok(ids)
    }

    /// Copy of every collection.
    pub async fn snapshot(&self) -> Result<Collections> {
        let state = self.state.read().await;
        ensure_open(&state)?;
        Ok(state.collections.clone())
    }

    pub async fn close(&self) {
        self.state.write().await.open = false;
    }

    pub async fn is_open(&self) -> bool {
        self.state.read().await.open
    }
}

fn ensure_open(state: &StoreState) -> Result<()> {
    if state.open {
        Ok(())
    } else {
        Err(FixError::StoreUnavailable("store is closed".to_string()))
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>> {
        validate_collection_name(collection)?;
        let state = self.state.read().await;
        ensure_open(&state)?;

        Ok(state
            .collections
            .get(collection)
            .map(|documents| {
                documents
                    .iter()
                    .filter(|document| filter.matches(document))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert_one(&self, collection: &str, mut document: Document) -> Result<DocumentId> {
        validate_collection_name(collection)?;

        let id = if document.as_map().contains_key(ID_FIELD) {
            document.id()?
        } else {
            let id = DocumentId::generate();
            document.set_id(&id);
            id
        };

        let mut state = self.state.write().await;
        ensure_open(&state)?;

        let documents = state.collections.entry(collection.to_string()).or_default();
        if documents.iter().any(|d| d.id().ok().as_ref() == Some(&id)) {
            return Err(FixError::DuplicateId(id.to_string(), collection.to_string()));
        }
        documents.push(document);
        Ok(id)
    }

    async fn delete_one(&self, collection: &str, id: &DocumentId) -> Result<bool> {
        validate_collection_name(collection)?;
        let mut state = self.state.write().await;
        ensure_open(&state)?;

        let Some(documents) = state.collections.get_mut(collection) else {
            return Ok(false);
        };
        match documents.iter().position(|d| d.id().ok().as_ref() == Some(id)) {
            Some(position) => {
                documents.remove(position);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn bulk_write(&self, collection: &str, batch: &BatchRequest) -> Result<BatchResult> {
        validate_collection_name(collection)?;
        let mut state = self.state.write().await;
        ensure_open(&state)?;

        let mut result = BatchResult::default();
        let mut empty = Vec::new();
        let documents = state
            .collections
            .get_mut(collection)
            .unwrap_or(&mut empty);

        let positions: HashMap<DocumentId, usize> = documents
            .iter()
            .enumerate()
            .filter_map(|(position, d)| d.id().ok().map(|id| (id, position)))
            .collect();

        for (index, instruction) in batch.iter().enumerate() {
            if instruction.assignment.path().is_identifier() {
                result.rejected.push(RejectedInstruction {
                    index,
                    target: instruction.target.clone(),
                    reason: format!("'{}' cannot be modified", ID_FIELD),
                });
                continue;
            }
            let Some(&position) = positions.get(&instruction.target) else {
                result.rejected.push(RejectedInstruction {
                    index,
                    target: instruction.target.clone(),
                    reason: "document not found".to_string(),
                });
                continue;
            };

            match instruction.assignment.apply(&mut documents[position]) {
                Ok(changed) => {
                    result.matched += 1;
                    if changed {
                        result.modified += 1;
                    }
                }
                Err(err) => result.rejected.push(RejectedInstruction {
                    index,
                    target: instruction.target.clone(),
                    reason: err.to_string(),
                }),
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::FieldPath;
    use crate::update::{FieldAssignment, UpdateInstruction};
    use serde_json::{Value as JsonValue, json};

    fn doc(value: JsonValue) -> Document {
        Document::from_value(value).unwrap()
    }

    fn id(raw: &str) -> DocumentId {
        DocumentId::new(raw).unwrap()
    }

    #[tokio::test]
    async fn test_insert_assigns_missing_ids() {
        let store = InMemoryDocumentStore::new();
        let assigned = store.insert_one("declarations", doc(json!({"eori": "GB1"}))).await.unwrap();
        let explicit = store
            .insert_one("declarations", doc(json!({"_id": "A", "eori": "GB1"})))
            .await
            .unwrap();

        assert_eq!(explicit.as_str(), "A");
        let all = store.find("declarations", &Filter::new()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id().unwrap(), assigned);
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicates_and_bad_ids() {
        let store = InMemoryDocumentStore::new();
        store.insert_one("declarations", doc(json!({"_id": "A"}))).await.unwrap();

        let err = store.insert_one("declarations", doc(json!({"_id": "A"}))).await.unwrap_err();
        assert!(matches!(err, FixError::DuplicateId(_, _)));

        let err = store.insert_one("declarations", doc(json!({"_id": ""}))).await.unwrap_err();
        assert!(matches!(err, FixError::MissingIdentifier(_)));
    }

    #[tokio::test]
    async fn test_find_unknown_collection_is_empty() {
        let store = InMemoryDocumentStore::new();
        assert!(store.find("declarations", &Filter::new()).await.unwrap().is_empty());
        assert_eq!(store.count("declarations", &Filter::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_bulk_write_counts() {
        let store = InMemoryDocumentStore::new();
        store
            .insert_many(
                "declarations",
                vec![
                    doc(json!({"_id": "A", "ref": {"code": "X1"}})),
                    doc(json!({"_id": "B", "ref": {"code": "NEW"}})),
                    doc(json!({"_id": "C", "ref": "flat"})),
                ],
            )
            .await
            .unwrap();

        let assignment = FieldAssignment::set(FieldPath::parse("ref.code").unwrap(), "NEW");
        let batch: BatchRequest = ["A", "B", "C", "Z"]
            .into_iter()
            .map(|target| UpdateInstruction::new(id(target), assignment.clone()))
            .collect();

        let result = store.bulk_write("declarations", &batch).await.unwrap();
        assert_eq!(result.matched, 2);
        assert_eq!(result.modified, 1);
        assert_eq!(result.rejected.len(), 2);
        assert_eq!(result.rejected[0].index, 2);
        assert_eq!(result.rejected[1].target, id("Z"));
        assert_eq!(result.rejected[1].reason, "document not found");
    }

    #[tokio::test]
    async fn test_bulk_write_never_touches_identifiers() {
        let store = InMemoryDocumentStore::new();
        store
            .insert_many("declarations", vec![doc(json!({"_id": "A"})), doc(json!({"_id": "B"}))])
            .await
            .unwrap();

        let batch: BatchRequest = [
            UpdateInstruction::new(
                id("A"),
                FieldAssignment::set(FieldPath::parse("_id").unwrap(), "SAME"),
            ),
            UpdateInstruction::new(
                id("B"),
                FieldAssignment::unset(FieldPath::parse("_id").unwrap()),
            ),
        ]
        .into_iter()
        .collect();

        let result = store.bulk_write("declarations", &batch).await.unwrap();
        assert_eq!(result.matched, 0);
        assert_eq!(result.rejected.len(), 2);
        assert_eq!(result.rejected[0].reason, "'_id' cannot be modified");

        let ids: Vec<DocumentId> = store
            .find("declarations", &Filter::new())
            .await
            .unwrap()
            .iter()
            .map(|d| d.id().unwrap())
            .collect();
        assert_eq!(ids, [id("A"), id("B")]);
    }

    #[tokio::test]
    async fn test_identifiers_of_different_shapes_are_distinct() {
        let mut collections = Collections::new();
        collections.insert(
            "records".to_string(),
            vec![
                doc(json!({"_id": 1, "v": "int"})),
                doc(json!({"_id": "1", "v": "string"})),
                doc(json!({"_id": {"$oid": "1"}, "v": "oid"})),
            ],
        );
        let store = InMemoryDocumentStore::from_collections(collections).unwrap();

        let batch: BatchRequest = std::iter::once(UpdateInstruction::new(
            DocumentId::integer(1),
            FieldAssignment::set(FieldPath::parse("v").unwrap(), "fixed"),
        ))
        .collect();
        let result = store.bulk_write("records", &batch).await.unwrap();
        assert_eq!(result.modified, 1);

        let values: Vec<JsonValue> = store.snapshot().await.unwrap()["records"]
            .iter()
            .map(|d| d.as_map()["v"].clone())
            .collect();
        assert_eq!(values, [json!("fixed"), json!("string"), json!("oid")]);

        assert!(store.delete_one("records", &id("1")).await.unwrap());
        assert_eq!(store.count("records", &Filter::new()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_delete_one() {
        let store = InMemoryDocumentStore::new();
        store.insert_one("declarations", doc(json!({"_id": "A"}))).await.unwrap();
        assert!(store.delete_one("declarations", &id("A")).await.unwrap());
        assert!(!store.delete_one("declarations", &id("A")).await.unwrap());
        assert!(!store.delete_one("other", &id("A")).await.unwrap());
    }

    #[tokio::test]
    async fn test_closed_store_is_unavailable() {
        let store = InMemoryDocumentStore::new();
        let handle = store.clone();
        store.close().await;

        assert!(!handle.is_open().await);
        let err = handle.find("declarations", &Filter::new()).await.unwrap_err();
        assert!(matches!(err, FixError::StoreUnavailable(_)));
        let err = handle
            .bulk_write("declarations", &BatchRequest::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FixError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_from_collections() {
        let mut collections = Collections::new();
        collections.insert(
            "declarations".to_string(),
            vec![doc(json!({"_id": "A"})), doc(json!({"_id": "A"}))],
        );
        assert!(matches!(
            InMemoryDocumentStore::from_collections(collections),
            Err(FixError::DuplicateId(_, _))
        ));

        let mut collections = Collections::new();
        collections.insert(
            "declarations".to_string(),
            vec![doc(json!({"_id": "A"})), doc(json!({"eori": "GB1"}))],
        );
        let store = InMemoryDocumentStore::from_collections(collections).unwrap();
        assert_eq!(store.count("declarations", &Filter::new()).await.unwrap(), 2);
    }
}
