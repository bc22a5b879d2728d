use async_trait::async_trait;
use thiserror::Error;

use crate::model::{ActiveRuleSet, RuleDocument};

/// Common result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("rule file error: {0}")]
    File(String),
    #[error("failed to encode rules document: {0}")]
    Encode(String),
}

impl StorageError {
    pub fn from_source(err: impl std::fmt::Display) -> Self {
        Self::File(err.to_string())
    }
}

#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Reads the raw document. Never fails: a missing, unreadable or
    /// malformed document degrades to an empty one.
    async fn load_document(&self) -> RuleDocument;

    /// Replaces the stored document atomically.
    async fn save_document(&self, document: &RuleDocument) -> StorageResult<()>;

    /// Fresh, normalized snapshot for one monitoring iteration.
    async fn load_active(&self) -> ActiveRuleSet {
        ActiveRuleSet::from_document(&self.load_document().await)
    }
}
