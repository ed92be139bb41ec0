// ============================================================================
// docfix Library
// ============================================================================

pub mod core;
pub mod document;
pub mod filter;
pub mod update;
pub mod store;
pub mod mutator;
pub mod changelog;
pub mod config;

// Re-export main types for convenience
pub use crate::core::{FixError, Result};
pub use document::{Document, DocumentId, FieldPath, IdKind, JsonType};
pub use filter::{Filter, Predicate};
pub use update::{BatchRequest, BatchResult, FieldAssignment, RejectedInstruction, UpdateInstruction};

// Re-export the store API
pub use store::{DocumentStore, InMemoryDocumentStore, JsonFileStore};

pub use mutator::{
    BatchFieldMutator, MalformedRecordPolicy, MutationReport, MutationWarning, RunMode,
    ValueSource,
};

pub use changelog::{
    Baseline, ChangeLog, ChangeLogRunner, ChangeSet, ChangeSetAction, ChangeSetOutcome,
    ChangeSetStatus, MutationSequence, RunSummary, ShippedChangeLog, declarations_changelog,
    legacy_declarations_changelog,
};

pub use config::FixConfig;
