//! Filter-driven batch field mutation
//!
//! [`BatchFieldMutator`] runs one linear pipeline against a store:
//!
//! 1. `select_matching` - query the collection with the filter
//! 2. `build_batch` - map each record to one `UpdateInstruction`
//! 3. `submit_batch` - send every instruction as a single bulk write
//!
//! Each phase finishes before the next starts, so a query failure, a
//! malformed record and a rejected write are reported separately. Nothing
//! is retried; any error ends the run.

use crate::core::{FixError, Result};
use crate::document::{Document, DocumentId, FieldPath, ID_FIELD};
use crate::filter::Filter;
use crate::store::{DocumentStore, validate_collection_name};
use crate::update::{BatchRequest, BatchResult, FieldAssignment, UpdateInstruction};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    #[default]
    Apply,
    /// Select and build the batch, but do not submit it.
    DryRun,
}

/// What to do with a selected record that has no usable `_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MalformedRecordPolicy {
    /// Leave the record out of the batch and warn.
    #[default]
    Skip,
    /// Fail the run with `MissingIdentifier`.
    Abort,
}

impl FromStr for MalformedRecordPolicy {
    type Err = FixError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "abort" => Ok(Self::Abort),
            other => Err(FixError::Config(format!(
                "malformed record policy must be 'skip' or 'abort', got '{}'",
                other
            ))),
        }
    }
}

pub type DeriveFn = Arc<dyn Fn(&Document) -> Option<JsonValue> + Send + Sync>;

/// Where the new field value comes from.
#[derive(Clone)]
pub enum ValueSource {
    Literal(JsonValue),
    /// Computed from the record being fixed; `None` leaves it out.
    Derived(DeriveFn),
}

impl fmt::Debug for ValueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Self::Derived(_) => f.write_str("Derived(..)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MutationWarning {
    /// The filter selected nothing; most likely a wrong filter value.
    NoMatches { filter: String },
    MissingIdentifier { position: usize, reason: String },
    Underivable { id: DocumentId },
}

impl fmt::Display for MutationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoMatches { filter } => write!(f, "no documents matched {}", filter),
            Self::MissingIdentifier { position, reason } => {
                write!(f, "record #{} skipped: {}", position, reason)
            }
            Self::Underivable { id } => write!(f, "record '{}' skipped: no value to set", id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MutationReport {
    pub collection: String,
    pub filter: String,
    /// Records returned by the query.
    pub selected: usize,
    /// Selected records left out of the batch.
    pub skipped: usize,
    pub batch: BatchRequest,
    /// `None` when the batch was not submitted (dry run).
    pub result: Option<BatchResult>,
    pub warnings: Vec<MutationWarning>,
}

impl MutationReport {
    pub fn matched(&self) -> u64 {
        self.result.as_ref().map_or(0, |r| r.matched)
    }

    pub fn modified(&self) -> u64 {
        self.result.as_ref().map_or(0, |r| r.modified)
    }

    pub fn was_submitted(&self) -> bool {
        self.result.is_some()
    }
}

/// Sets one field, on every document matching a filter, to the same value.
#[derive(Debug, Clone)]
pub struct BatchFieldMutator {
    collection: String,
    filter: Filter,
    path: FieldPath,
    /// `None` removes the field.
    source: Option<ValueSource>,
    policy: MalformedRecordPolicy,
}

impl BatchFieldMutator {
    pub fn new(
        collection: &str,
        filter: Filter,
        path: &str,
        value: impl Into<JsonValue>,
    ) -> Result<Self> {
        Self::with_source(collection, filter, path, Some(ValueSource::Literal(value.into())))
    }

    pub fn derived<F>(collection: &str, filter: Filter, path: &str, derive: F) -> Result<Self>
    where
        F: Fn(&Document) -> Option<JsonValue> + Send + Sync + 'static,
    {
        Self::with_source(collection, filter, path, Some(ValueSource::Derived(Arc::new(derive))))
    }

    /// Removes the field from every matching document.
    pub fn unset(collection: &str, filter: Filter, path: &str) -> Result<Self> {
        Self::with_source(collection, filter, path, None)
    }

    fn with_source(
        collection: &str,
        filter: Filter,
        path: &str,
        source: Option<ValueSource>,
    ) -> Result<Self> {
        validate_collection_name(collection)?;
        let path = FieldPath::parse(path)?;
        if path.is_identifier() {
            return Err(FixError::InvalidPath(
                path.to_string(),
                format!("'{}' is assigned by the store and cannot be rewritten", ID_FIELD),
            ));
        }
        Ok(Self {
            collection: collection.to_string(),
            filter,
            path,
            source,
            policy: MalformedRecordPolicy::default(),
        })
    }

    pub fn with_policy(mut self, policy: MalformedRecordPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn path(&self) -> &FieldPath {
        &self.path
    }

    pub fn policy(&self) -> MalformedRecordPolicy {
        self.policy
    }

    /// One-line summary, e.g. `records: set a.b where x == 1`.
    pub fn describe(&self) -> String {
        let operation = if self.source.is_some() { "set" } else { "unset" };
        format!("{}: {} {} where {}", self.collection, operation, self.path, self.filter)
    }

    /// Queries the store. Never mutates anything.
    pub async fn select_matching(&self, store: &dyn DocumentStore) -> Result<Vec<Document>> {
        store.find(&self.collection, &self.filter).await
    }

    /// Maps one record to its instruction. Depends only on the record.
    pub fn to_instruction(&self, record: &Document) -> Result<UpdateInstruction> {
        let target = record.id()?;
        let assignment = match &self.source {
            None => FieldAssignment::unset(self.path.clone()),
            Some(ValueSource::Literal(value)) => FieldAssignment::set(self.path.clone(), value.clone()),
            Some(ValueSource::Derived(derive)) => {
                let value = derive(record).ok_or_else(|| {
                    FixError::Underivable(format!("'{}' for document '{}'", self.path, target))
                })?;
                FieldAssignment::set(self.path.clone(), value)
            }
        };
        Ok(UpdateInstruction::new(target, assignment))
    }

    /// Maps every record, applying the malformed-record policy.
    pub fn build_batch(&self, records: &[Document]) -> Result<(BatchRequest, Vec<MutationWarning>)> {
        let mut batch = BatchRequest::new();
        let mut warnings = Vec::new();

        for (position, record) in records.iter().enumerate() {
            match self.to_instruction(record) {
                Ok(instruction) => batch.push(instruction),
                Err(FixError::MissingIdentifier(reason)) => {
                    if self.policy == MalformedRecordPolicy::Abort {
                        return Err(FixError::MissingIdentifier(format!(
                            "record #{} in '{}': {}",
                            position, self.collection, reason
                        )));
                    }
                    warn!(
                        collection = %self.collection,
                        position,
                        reason = %reason,
                        "skipping record without usable identifier"
                    );
                    warnings.push(MutationWarning::MissingIdentifier { position, reason });
                }
                Err(FixError::Underivable(reason)) => {
                    let id = record.id()?;
                    warn!(collection = %self.collection, id = %id, reason = %reason, "skipping record");
                    warnings.push(MutationWarning::Underivable { id });
                }
                Err(err) => return Err(err),
            }
        }

        Ok((batch, warnings))
    }

    /// Submits the batch as one bulk write.
    ///
    /// An empty batch is a no-op and does not reach the store. Any rejected
    /// instruction turns the store's result into `PartialBatchFailure`;
    /// instructions already applied stay applied.
    pub async fn submit_batch(
        &self,
        store: &dyn DocumentStore,
        batch: &BatchRequest,
    ) -> Result<BatchResult> {
        if batch.is_empty() {
            return Ok(BatchResult::default());
        }

        let result = store.bulk_write(&self.collection, batch).await?;
        if !result.is_complete() {
            return Err(FixError::PartialBatchFailure(result));
        }
        Ok(result)
    }

    pub async fn run(&self, store: &dyn DocumentStore, mode: RunMode) -> Result<MutationReport> {
        let filter = self.filter.to_string();

        let records = self.select_matching(store).await?;
        info!(
            collection = %self.collection,
            filter = %filter,
            selected = records.len(),
            "selected documents"
        );

        let (batch, mut warnings) = self.build_batch(&records)?;
        if records.is_empty() {
            warn!(collection = %self.collection, filter = %filter, "no documents matched; check the filter values");
            warnings.push(MutationWarning::NoMatches {
                filter: filter.clone(),
            });
        }
        for instruction in batch.iter() {
            debug!(collection = %self.collection, instruction = %instruction, "planned update");
        }

        let result = match mode {
            RunMode::DryRun => {
                info!(
                    collection = %self.collection,
                    planned = batch.len(),
                    "dry run; batch not submitted"
                );
                None
            }
            RunMode::Apply => {
                let result = self.submit_batch(store, &batch).await?;
                info!(
                    collection = %self.collection,
                    matched = result.matched,
                    modified = result.modified,
                    "batch applied"
                );
                Some(result)
            }
        };

        Ok(MutationReport {
            collection: self.collection.clone(),
            filter,
            selected: records.len(),
            skipped: records.len() - batch.len(),
            batch,
            result,
            warnings,
        })
    }
}
