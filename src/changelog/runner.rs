use super::{ChangeLog, ChangeSet, ChangeSetOutcome};
use crate::core::{FixError, Result};
use crate::document::Document;
use crate::filter::Filter;
use crate::mutator::RunMode;
use crate::store::{DocumentStore, validate_collection_name};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{Instrument, debug, info, info_span, warn};

/// Default name of the collection recording applied change sets.
pub const DEFAULT_CHANGELOG_COLLECTION: &str = "dbchangelog";

/// Record of one applied change set, as stored in the change-log collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangeLogEntry {
    #[serde(rename = "_id")]
    id: String,
    author: String,
    order: u32,
    applied_at: DateTime<Utc>,
    #[serde(default)]
    selected: usize,
    #[serde(default)]
    matched: u64,
    #[serde(default)]
    modified: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppliedChangeSet {
    pub order: u32,
    pub id: String,
    pub outcome: ChangeSetOutcome,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub applied: Vec<AppliedChangeSet>,
    /// Change sets already recorded before this run.
    pub already_applied: usize,
    pub mode: RunMode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSetStatus {
    pub order: u32,
    pub id: String,
    pub author: String,
    pub description: String,
    /// `None` while pending.
    pub applied_at: Option<DateTime<Utc>>,
}

/// Applies pending change sets in order and records each success.
///
/// The first failure ends the run: the failing change set is not recorded
/// and later ones do not run.
pub struct ChangeLogRunner<'a> {
    store: &'a dyn DocumentStore,
    collection: String,
}

impl<'a> ChangeLogRunner<'a> {
    pub fn new(store: &'a dyn DocumentStore) -> Self {
        Self {
            store,
            collection: DEFAULT_CHANGELOG_COLLECTION.to_string(),
        }
    }

    pub fn with_collection(store: &'a dyn DocumentStore, collection: &str) -> Result<Self> {
        validate_collection_name(collection)?;
        Ok(Self {
            store,
            collection: collection.to_string(),
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    async fn applied_entries(&self) -> Result<HashMap<String, ChangeLogEntry>> {
        let documents = self.store.find(&self.collection, &Filter::new()).await?;
        let mut entries = HashMap::with_capacity(documents.len());
        for document in documents {
            let entry: ChangeLogEntry =
                serde_json::from_value(document.into_value()).map_err(|e| {
                    FixError::ChangeLog(format!(
                        "Unreadable entry in '{}': {}",
                        self.collection, e
                    ))
                })?;
            entries.insert(entry.id.clone(), entry);
        }
        Ok(entries)
    }

    pub async fn status(&self, changelog: &ChangeLog) -> Result<Vec<ChangeSetStatus>> {
        let entries = self.applied_entries().await?;
        Ok(changelog
            .changesets()
            .iter()
            .map(|changeset| ChangeSetStatus {
                order: changeset.order,
                id: changeset.id.clone(),
                author: changeset.author.clone(),
                description: changeset.action().describe(),
                applied_at: entries.get(&changeset.id).map(|e| e.applied_at),
            })
            .collect())
    }

    pub async fn run(&self, changelog: &ChangeLog, mode: RunMode) -> Result<RunSummary> {
        let entries = self.applied_entries().await?;
        let applied_ids: HashSet<String> = entries.keys().cloned().collect();
        let pending = changelog.pending(&applied_ids);

        info!(
            changelog = %self.collection,
            total = changelog.len(),
            pending = pending.len(),
            ?mode,
            "running change log"
        );

        let mut summary = RunSummary {
            applied: Vec::new(),
            already_applied: changelog.len() - pending.len(),
            mode,
        };

        for changeset in pending {
            let span = info_span!("changeset", order = changeset.order, id = %changeset.id);
            let outcome = self.apply_one(changeset, mode).instrument(span).await?;
            summary.applied.push(AppliedChangeSet {
                order: changeset.order,
                id: changeset.id.clone(),
                outcome,
            });
        }

        Ok(summary)
    }

    async fn apply_one(&self, changeset: &ChangeSet, mode: RunMode) -> Result<ChangeSetOutcome> {
        info!(author = %changeset.author, action = %changeset.action().describe(), "applying");

        let outcome = match changeset.action().apply(self.store, mode).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(error = %err, "change set failed; not recorded");
                return Err(err);
            }
        };

        if mode == RunMode::DryRun {
            debug!("dry run; not recorded");
            return Ok(outcome);
        }

        let entry = ChangeLogEntry {
            id: changeset.id.clone(),
            author: changeset.author.clone(),
            order: changeset.order,
            applied_at: Utc::now(),
            selected: outcome.selected,
            matched: outcome.matched,
            modified: outcome.modified,
        };
        let document = Document::from_value(serde_json::to_value(&entry)?)?;
        self.store.insert_one(&self.collection, document).await?;

        info!(
            selected = outcome.selected,
            matched = outcome.matched,
            modified = outcome.modified,
            "applied"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changelog::Baseline;
    use crate::store::InMemoryDocumentStore;

    #[tokio::test]
    async fn test_entries_are_recorded() {
        let store = InMemoryDocumentStore::new();
        let changelog = ChangeLog::new()
            .with(ChangeSet::new(1, "Baseline", "exports-team", Baseline))
            .unwrap();

        let runner = ChangeLogRunner::new(&store);
        let summary = runner.run(&changelog, RunMode::Apply).await.unwrap();
        assert_eq!(summary.applied.len(), 1);

        let recorded = store.find(DEFAULT_CHANGELOG_COLLECTION, &Filter::new()).await.unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].id().unwrap().as_str(), "Baseline");
        assert!(recorded[0].as_map().contains_key("appliedAt"));
        assert_eq!(recorded[0].as_map()["author"], "exports-team");
    }

    #[tokio::test]
    async fn test_unreadable_entry_is_an_error() {
        let store = InMemoryDocumentStore::new();
        store
            .insert_one(
                DEFAULT_CHANGELOG_COLLECTION,
                Document::from_value(serde_json::json!({"_id": "x", "order": "first"})).unwrap(),
            )
            .await
            .unwrap();

        let err = ChangeLogRunner::new(&store)
            .run(&ChangeLog::new(), RunMode::Apply)
            .await
            .unwrap_err();
        assert!(matches!(err, FixError::ChangeLog(_)));
    }

    #[test]
    fn test_custom_collection_is_validated() {
        let store = InMemoryDocumentStore::new();
        assert!(ChangeLogRunner::with_collection(&store, "bad-name").is_err());
        assert_eq!(
            ChangeLogRunner::with_collection(&store, "migrations").unwrap().collection(),
            "migrations"
        );
    }
}
