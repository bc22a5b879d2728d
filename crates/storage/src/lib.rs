//! File-backed storage adapters that satisfy the domain storage traits. The
//! monitor only ever reads the rule file; the operator bot is the single
//! writer and replaces the file by rename so readers never observe a partial
//! document.

mod builder;
mod rule_file;

use std::path::{Path, PathBuf};

pub use builder::RuleFileBuilder;

/// JSON rule document on local disk.
#[derive(Debug, Clone)]
pub struct JsonRuleFile {
    path: PathBuf,
}

impl JsonRuleFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn builder() -> RuleFileBuilder {
        RuleFileBuilder::new()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling path used for the write-then-rename save.
    pub(crate) fn temp_path(&self) -> PathBuf {
        self.path.with_extension("tmp")
    }
}
