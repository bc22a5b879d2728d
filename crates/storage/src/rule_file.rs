use std::io::ErrorKind;

use serde_json::Value;
use tracing::{debug, warn};
use txwatch_domain::model::RuleDocument;
use txwatch_domain::storage::{RuleStore, StorageError, StorageResult};

use crate::JsonRuleFile;

#[async_trait::async_trait]
impl RuleStore for JsonRuleFile {
    async fn load_document(&self) -> RuleDocument {
        let path = self.path().display();
        let bytes = match tokio::fs::read(self.path()).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                warn!(%path, "rules file not found; using empty rule set");
                return RuleDocument::default();
            }
            Err(err) => {
                warn!(%path, error = %err, "failed to read rules file");
                return RuleDocument::default();
            }
        };

        let value: Value = match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(err) => {
                warn!(%path, error = %err, "rules file is not valid JSON");
                return RuleDocument::default();
            }
        };

        match RuleDocument::from_value(value) {
            Ok(document) => document,
            Err(err) => {
                warn!(%path, error = %err, "ignoring rules file");
                RuleDocument::default()
            }
        }
    }

    async fn save_document(&self, document: &RuleDocument) -> StorageResult<()> {
        if let Some(parent) = self.path().parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(StorageError::from_source)?;
        }

        let mut encoded =
            serde_json::to_vec_pretty(document).map_err(|err| StorageError::Encode(err.to_string()))?;
        encoded.push(b'\n');

        let temp_path = self.temp_path();
        tokio::fs::write(&temp_path, &encoded)
            .await
            .map_err(StorageError::from_source)?;
        tokio::fs::rename(&temp_path, self.path())
            .await
            .map_err(StorageError::from_source)?;

        debug!(
            path = %self.path().display(),
            to_rules = document.to_rules.len(),
            from_rules = document.from_rules.len(),
            "rules file saved"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    fn temp_rules_path(tag: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!(
                "txwatch-test-{}-{}-{}",
                tag,
                std::process::id(),
                std::time::SystemTime::now()
                    .duration_since(std::time::SystemTime::UNIX_EPOCH)
                    .unwrap()
                    .as_nanos()
            ))
            .join("monitor_rules.json")
    }

    #[tokio::test]
    async fn missing_file_yields_empty_document() {
        let store = JsonRuleFile::new(temp_rules_path("missing"));
        assert_eq!(store.load_document().await, RuleDocument::default());
        assert!(store.load_active().await.is_empty());
    }

    #[tokio::test]
    async fn corrupt_or_non_object_file_yields_empty_document() {
        let path = temp_rules_path("corrupt");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let store = JsonRuleFile::new(&path);

        std::fs::write(&path, b"{\"to_rules\": [").unwrap();
        assert_eq!(store.load_document().await, RuleDocument::default());

        std::fs::write(&path, b"[\"to_rules\"]").unwrap();
        assert_eq!(store.load_document().await, RuleDocument::default());
    }

    #[tokio::test]
    async fn loads_and_normalizes_scenario_document() {
        let path = temp_rules_path("scenario");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            br#"{"to_rules":[{"to":"56A3BF66DB83E59D13DFED48205BB84C33B08D1B","method_id":"FD5C9779"}],"from_rules":[]}"#,
        )
        .unwrap();

        let active = JsonRuleFile::new(&path).load_active().await;
        assert_eq!(
            active.to_document().to_rules,
            vec![json!({
                "to": "0x56a3bf66db83e59d13dfed48205bb84c33b08d1b",
                "method_id": "0xfd5c9779"
            })]
        );
    }

    #[tokio::test]
    async fn save_replaces_file_and_leaves_no_temp_file() {
        let path = temp_rules_path("save");
        let store = JsonRuleFile::new(&path);
        let document = RuleDocument {
            to_rules: vec![json!({"to": "0x1111111111111111111111111111111111111111", "method_id": "0x12345678", "label": "swap"})],
            from_rules: vec![],
        };

        store.save_document(&document).await.expect("save succeeds");

        assert_eq!(store.load_document().await, document);
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn builder_seeds_empty_document() {
        let path = temp_rules_path("builder");
        let store = JsonRuleFile::builder()
            .path(&path)
            .create_if_missing(true)
            .build()
            .await
            .expect("builder succeeds");

        assert!(path.exists());
        assert_eq!(store.load_document().await, RuleDocument::default());
    }
}
