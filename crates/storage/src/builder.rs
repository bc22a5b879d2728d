use std::path::PathBuf;

use txwatch_domain::model::RuleDocument;
use txwatch_domain::storage::{RuleStore, StorageError, StorageResult};

use crate::JsonRuleFile;

#[derive(Default)]
pub struct RuleFileBuilder {
    path: Option<PathBuf>,
    create_if_missing: bool,
}

impl RuleFileBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Seeds an empty document so operators can find and edit the file.
    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    pub async fn build(self) -> StorageResult<JsonRuleFile> {
        let path = self
            .path
            .ok_or_else(|| StorageError::File("missing rules file path".into()))?;
        let store = JsonRuleFile::new(path);
        if self.create_if_missing && !tokio::fs::try_exists(store.path()).await.unwrap_or(false) {
            store.save_document(&RuleDocument::default()).await?;
        }
        Ok(store)
    }
}
