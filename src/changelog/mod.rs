//! Change sets: named one-shot data fixes, applied at most once per store.
//!
//! A [`ChangeLog`] orders [`ChangeSet`]s; the [`ChangeLogRunner`] applies the
//! pending ones and records each success in a change-log collection.

mod countries;
mod declarations;
mod runner;

pub use countries::country_code;
pub use declarations::{
    DECLARATIONS_COLLECTION, INCIDENT_EORI, INCIDENT_LRN, INCIDENT_REPLACEMENT_LRN,
    ShippedChangeLog, declarations_changelog, legacy_declarations_changelog,
};
pub use runner::{
    AppliedChangeSet, ChangeLogRunner, ChangeSetStatus, DEFAULT_CHANGELOG_COLLECTION, RunSummary,
};

use crate::core::{FixError, Result};
use crate::mutator::{BatchFieldMutator, RunMode};
use crate::store::DocumentStore;
use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Counts reported by one applied change set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeSetOutcome {
    pub selected: usize,
    pub matched: u64,
    pub modified: u64,
    pub warnings: usize,
}

#[async_trait]
pub trait ChangeSetAction: Send + Sync {
    async fn apply(&self, store: &dyn DocumentStore, mode: RunMode) -> Result<ChangeSetOutcome>;

    fn describe(&self) -> String;
}

#[async_trait]
impl ChangeSetAction for BatchFieldMutator {
    async fn apply(&self, store: &dyn DocumentStore, mode: RunMode) -> Result<ChangeSetOutcome> {
        let report = self.run(store, mode).await?;
        Ok(ChangeSetOutcome {
            selected: report.selected,
            matched: report.matched(),
            modified: report.modified(),
            warnings: report.warnings.len(),
        })
    }

    fn describe(&self) -> String {
        BatchFieldMutator::describe(self)
    }
}

/// Mutators run one after another as a single change set, e.g. copying a
/// field and then removing the original. The first failing step ends it.
#[derive(Debug, Clone)]
pub struct MutationSequence {
    steps: Vec<BatchFieldMutator>,
}

impl MutationSequence {
    pub fn new(steps: Vec<BatchFieldMutator>) -> Result<Self> {
        if steps.is_empty() {
            return Err(FixError::ChangeLog(
                "A mutation sequence needs at least one step".to_string(),
            ));
        }
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[BatchFieldMutator] {
        &self.steps
    }
}

#[async_trait]
impl ChangeSetAction for MutationSequence {
    async fn apply(&self, store: &dyn DocumentStore, mode: RunMode) -> Result<ChangeSetOutcome> {
        let mut total = ChangeSetOutcome::default();
        for step in &self.steps {
            let outcome = ChangeSetAction::apply(step, store, mode).await?;
            total.selected += outcome.selected;
            total.matched += outcome.matched;
            total.modified += outcome.modified;
            total.warnings += outcome.warnings;
        }
        Ok(total)
    }

    fn describe(&self) -> String {
        let steps: Vec<String> = self.steps.iter().map(BatchFieldMutator::describe).collect();
        steps.join("; then ")
    }
}

/// Marks the starting point of a store's history. Changes nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Baseline;

#[async_trait]
impl ChangeSetAction for Baseline {
    async fn apply(&self, _store: &dyn DocumentStore, _mode: RunMode) -> Result<ChangeSetOutcome> {
        Ok(ChangeSetOutcome::default())
    }

    fn describe(&self) -> String {
        "baseline".to_string()
    }
}

#[derive(Clone)]
pub struct ChangeSet {
    pub order: u32,
    pub id: String,
    pub author: String,
    action: Arc<dyn ChangeSetAction>,
}

impl ChangeSet {
    pub fn new(
        order: u32,
        id: impl Into<String>,
        author: impl Into<String>,
        action: impl ChangeSetAction + 'static,
    ) -> Self {
        Self {
            order,
            id: id.into(),
            author: author.into(),
            action: Arc::new(action),
        }
    }

    pub fn action(&self) -> &dyn ChangeSetAction {
        self.action.as_ref()
    }
}

impl fmt::Debug for ChangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeSet")
            .field("order", &self.order)
            .field("id", &self.id)
            .field("author", &self.author)
            .field("action", &self.action.describe())
            .finish()
    }
}

/// Change sets kept in ascending `order`.
#[derive(Debug, Clone, Default)]
pub struct ChangeLog {
    changesets: Vec<ChangeSet>,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a change set, validating it against the ones already present.
    pub fn add(&mut self, changeset: ChangeSet) -> Result<()> {
        if changeset.order == 0 {
            return Err(FixError::ChangeLog(format!(
                "Change set '{}' must have order >= 1",
                changeset.id
            )));
        }
        if changeset.id.trim().is_empty() {
            return Err(FixError::ChangeLog(format!(
                "Change set at order {} has an empty id",
                changeset.order
            )));
        }
        if changeset.author.trim().is_empty() {
            return Err(FixError::ChangeLog(format!(
                "Change set '{}' has no author",
                changeset.id
            )));
        }
        if self.changesets.iter().any(|c| c.id == changeset.id) {
            return Err(FixError::ChangeLog(format!(
                "Duplicate change set id '{}'",
                changeset.id
            )));
        }
        if let Some(existing) = self.changesets.iter().find(|c| c.order == changeset.order) {
            return Err(FixError::ChangeLog(format!(
                "Change sets '{}' and '{}' share order {}",
                existing.id, changeset.id, changeset.order
            )));
        }

        let position = self
            .changesets
            .partition_point(|c| c.order < changeset.order);
        self.changesets.insert(position, changeset);
        Ok(())
    }

    /// Fluent form of [`add`](Self::add).
    pub fn with(mut self, changeset: ChangeSet) -> Result<Self> {
        self.add(changeset)?;
        Ok(self)
    }

    pub fn changesets(&self) -> &[ChangeSet] {
        &self.changesets
    }

    pub fn len(&self) -> usize {
        self.changesets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changesets.is_empty()
    }

    /// Change sets whose id is not in `applied`, in order.
    pub fn pending<'a>(&'a self, applied: &HashSet<String>) -> Vec<&'a ChangeSet> {
        self.changesets
            .iter()
            .filter(|c| !applied.contains(&c.id))
            .collect()
    }
}
