//! Update instructions and batch results.

use crate::core::Result;
use crate::document::{Document, DocumentId, FieldPath};
use serde_json::Value as JsonValue;
use std::fmt;

/// A single-field mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldAssignment {
    Set { path: FieldPath, value: JsonValue },
    Unset { path: FieldPath },
}

impl FieldAssignment {
    pub fn set(path: FieldPath, value: impl Into<JsonValue>) -> Self {
        Self::Set {
            path,
            value: value.into(),
        }
    }

    pub fn unset(path: FieldPath) -> Self {
        Self::Unset { path }
    }

    pub fn path(&self) -> &FieldPath {
        match self {
            Self::Set { path, .. } | Self::Unset { path } => path,
        }
    }

    /// Applies the assignment. Returns whether the document changed.
    pub fn apply(&self, document: &mut Document) -> Result<bool> {
        match self {
            Self::Set { path, value } => document.set(path, value.clone()),
            Self::Unset { path } => Ok(document.unset(path)),
        }
    }
}

impl fmt::Display for FieldAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Set { path, value } => write!(f, "set {} := {}", path, value),
            Self::Unset { path } => write!(f, "unset {}", path),
        }
    }
}

/// One assignment aimed at one document, addressed by identifier only.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateInstruction {
    pub target: DocumentId,
    pub assignment: FieldAssignment,
}

impl UpdateInstruction {
    pub fn new(target: DocumentId, assignment: FieldAssignment) -> Self {
        Self { target, assignment }
    }
}

impl fmt::Display for UpdateInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}: {})", self.target, self.assignment)
    }
}

/// Ordered instructions submitted as one unit. Each instruction is applied
/// independently; there is no cross-document atomicity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchRequest {
    instructions: Vec<UpdateInstruction>,
}

impl BatchRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, instruction: UpdateInstruction) {
        self.instructions.push(instruction);
    }

    pub fn instructions(&self) -> &[UpdateInstruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &UpdateInstruction> {
        self.instructions.iter()
    }
}

impl FromIterator<UpdateInstruction> for BatchRequest {
    fn from_iter<I: IntoIterator<Item = UpdateInstruction>>(iter: I) -> Self {
        Self {
            instructions: iter.into_iter().collect(),
        }
    }
}

/// An instruction the store refused to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedInstruction {
    /// Position in the submitted batch.
    pub index: usize,
    pub target: DocumentId,
    pub reason: String,
}

/// Store-reported outcome of a batch write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    /// Instructions applied to an existing document.
    pub matched: u64,
    /// Targets whose content actually changed.
    pub modified: u64,
    pub rejected: Vec<RejectedInstruction>,
}

impl BatchResult {
    pub fn is_complete(&self) -> bool {
        self.rejected.is_empty()
    }
}

impl fmt::Display for BatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "matched={} modified={} rejected={}",
            self.matched,
            self.modified,
            self.rejected.len()
        )?;
        for rejection in &self.rejected {
            write!(
                f,
                "; #{} '{}': {}",
                rejection.index, rejection.target, rejection.reason
            )?;
        }
        Ok(())
    }
}
