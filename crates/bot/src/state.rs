use txwatch_domain::services::telemetry::AbuseTracker;
use txwatch_storage::JsonRuleFile;

#[derive(Clone)]
pub struct BotState {
    store: JsonRuleFile,
    authorized_chat_id: String,
    abuse_tracker: AbuseTracker,
}

impl BotState {
    pub fn new(
        store: JsonRuleFile,
        authorized_chat_id: impl Into<String>,
        abuse_tracker: AbuseTracker,
    ) -> Self {
        Self {
            store,
            authorized_chat_id: authorized_chat_id.into(),
            abuse_tracker,
        }
    }

    pub fn store(&self) -> &JsonRuleFile {
        &self.store
    }

    pub fn is_authorized(&self, chat_id: &str) -> bool {
        self.authorized_chat_id == chat_id
    }

    pub fn abuse_tracker(&self) -> &AbuseTracker {
        &self.abuse_tracker
    }
}
