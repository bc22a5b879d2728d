use metrics::{counter, gauge};
use strum_macros::AsRefStr;
use thiserror::Error;
use tracing::{info, warn};

use txwatch_domain::{
    config::{ConfigError, MonitorConfig},
    model::ActiveRuleSet,
    services::telemetry::TelemetryError,
    storage::{RuleStore, StorageError},
};
use txwatch_storage::JsonRuleFile;

use crate::{
    clock::{Clock, TokioClock},
    notifier::{Alert, Notifier, NotifyError, TelegramNotifier},
    pipeline::{scan_block, ScanOutcome, ScannedBlock},
    progress::{ProgressReporter, ProgressSnapshot},
    rpc::{ChainSource, RpcChainSource},
};

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("notifier error: {0}")]
    Notify(#[from] NotifyError),
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("start block {start} is ahead of the chain head {head}")]
    StartAheadOfHead { start: u64, head: u64 },
}

impl MonitorError {
    /// Transient chain-source failures; the loop retries them without
    /// advancing the cursor.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Rpc(_) | Self::Decode(_))
    }
}

impl From<reqwest::Error> for MonitorError {
    fn from(value: reqwest::Error) -> Self {
        Self::Rpc(value.to_string())
    }
}

/// Resolves the starting cursor: the explicit start block when given (it must
/// not exceed the head), otherwise the current head so only new blocks are
/// scanned.
pub async fn initialize_cursor<S>(source: &S, start_block: Option<u64>) -> Result<u64, MonitorError>
where
    S: ChainSource + ?Sized,
{
    let head = source.head_block_number().await?;
    match start_block {
        Some(start) if start > head => Err(MonitorError::StartAheadOfHead { start, head }),
        Some(start) => Ok(start),
        None => Ok(head),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum IterationOutcome {
    /// Every block up to the observed head was processed.
    CaughtUp,
    /// The pass stopped early at a block that was missing or failed to fetch.
    Stalled,
    /// Scanned up to a newer head with exit-after-catch-up enabled.
    Terminated,
}

/// The catch-up loop. Owns the cursor; everything else is a collaborator.
pub struct Monitor<C, N, R, K> {
    config: MonitorConfig,
    source: C,
    notifier: N,
    rules: R,
    clock: K,
    cursor: u64,
    progress: ProgressReporter,
}

impl<C, N, R, K> Monitor<C, N, R, K>
where
    C: ChainSource,
    N: Notifier,
    R: RuleStore,
    K: Clock,
{
    pub async fn start(
        config: MonitorConfig,
        source: C,
        notifier: N,
        rules: R,
        clock: K,
    ) -> Result<Self, MonitorError> {
        let cursor = initialize_cursor(&source, config.start_block()).await?;
        info!(
            cursor,
            explicit_start = config.start_block().is_some(),
            "monitor cursor initialized"
        );
        gauge!("monitor_cursor_height").set(cursor as f64);
        let progress = ProgressReporter::new(config.progress_interval(), clock.now());

        Ok(Self {
            config,
            source,
            notifier,
            rules,
            clock,
            cursor,
            progress,
        })
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    #[cfg(test)]
    pub(crate) fn progress(&self) -> &ProgressReporter {
        &self.progress
    }

    /// Runs one iteration: reload rules, read the head, then scan
    /// `cursor + 1 ..= head` strictly in order.
    pub async fn run_iteration(&mut self) -> Result<IterationOutcome, MonitorError> {
        let active = self.rules.load_active().await;
        let head = self.source.head_block_number().await?;
        gauge!("monitor_chain_head").set(head as f64);

        let mut stalled = false;
        let mut processed = 0u64;
        while self.cursor < head {
            let number = self.cursor + 1;
            match scan_block(&self.source, number, &active).await {
                Ok(ScanOutcome::NotYetAvailable) => {
                    stalled = true;
                    break;
                }
                Ok(ScanOutcome::Skipped) => {}
                Ok(ScanOutcome::Scanned(block)) => self.dispatch(&block).await,
                Err(err) if err.is_retryable() => {
                    warn!(block_number = number, error = %err, "block fetch failed; will retry");
                    stalled = true;
                    break;
                }
                Err(err) => return Err(err),
            }

            self.cursor = number;
            processed += 1;
            counter!("monitor_blocks_processed_total").increment(1);
            gauge!("monitor_cursor_height").set(number as f64);
            self.progress.record_blocks(1);
            self.report_progress(head, &active);
        }
        self.report_progress(head, &active);

        if stalled {
            return Ok(IterationOutcome::Stalled);
        }
        // Only a pass that scanned up to a newer head counts as catching up.
        if self.config.exit_after_catchup() && processed > 0 {
            info!(cursor = self.cursor, "caught up with chain head; exiting");
            return Ok(IterationOutcome::Terminated);
        }
        Ok(IterationOutcome::CaughtUp)
    }

    fn report_progress(&mut self, head: u64, active: &ActiveRuleSet) {
        self.progress.maybe_report(
            self.clock.now(),
            ProgressSnapshot {
                cursor: self.cursor,
                head,
                to_rules: active.to_rules().len(),
                from_rules: active.from_rules().len(),
                rules_file: self.config.rules_file(),
            },
        );
    }

    /// Loops until terminated. Iteration errors are logged and followed by
    /// the error backoff instead of the poll interval.
    pub async fn run(&mut self) -> Result<(), MonitorError> {
        loop {
            match self.run_iteration().await {
                Ok(IterationOutcome::Terminated) => return Ok(()),
                Ok(_) => self.clock.sleep(self.config.poll_interval()).await,
                Err(err) => {
                    counter!("monitor_iteration_errors_total").increment(1);
                    warn!(error = %err, cursor = self.cursor, "monitor iteration failed");
                    self.clock.sleep(self.config.error_backoff()).await;
                }
            }
        }
    }

    async fn dispatch(&self, block: &ScannedBlock) {
        for tx_match in &block.matches {
            for reason in &tx_match.reasons {
                counter!("monitor_matches_total", "kind" => reason.kind.as_ref().to_string())
                    .increment(1);
            }
            info!(
                block_number = block.number,
                tx_hash = %tx_match.tx.hash,
                reasons = %tx_match.describe_reasons(),
                "transaction matched"
            );

            let alert = Alert {
                block_number: block.number,
                block_time: block.timestamp,
                tx_match,
            };
            match self.notifier.notify(&alert).await {
                Ok(delivery) => {
                    counter!("monitor_notifications_total", "result" => delivery.as_ref().to_string())
                        .increment(1);
                }
                Err(err) => {
                    counter!("monitor_notifications_total", "result" => "error").increment(1);
                    warn!(tx_hash = %tx_match.tx.hash, error = %err, "failed to deliver alert");
                }
            }
        }
    }
}

pub fn build_rpc_source(config: &MonitorConfig) -> Result<RpcChainSource, MonitorError> {
    RpcChainSource::new(config.rpc_url(), config.rpc_timeout())
}

/// Wires the production collaborators and runs until terminated.
pub async fn run_monitor(config: MonitorConfig) -> Result<(), MonitorError> {
    let source = build_rpc_source(&config)?;
    let notifier = TelegramNotifier::from_config(&config)?;
    let rules = JsonRuleFile::new(config.rules_file());
    info!(
        rpc_url = source.url(),
        rules_file = %config.rules_file().display(),
        telegram = notifier.is_configured(),
        poll_interval_secs = config.poll_interval().as_secs_f64(),
        "starting transaction monitor"
    );

    let mut monitor = Monitor::start(config, source, notifier, rules, TokioClock).await?;
    monitor.run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        block, tx, MemoryRuleStore, MockChain, MockClock, MockNotifier, ROUTER, SENDER, SWAP,
    };
    use serde_json::json;
    use std::time::Duration;
    use txwatch_domain::model::MatchKind;

    type TestMonitor = Monitor<MockChain, MockNotifier, MemoryRuleStore, MockClock>;

    fn config() -> MonitorConfig {
        MonitorConfig::new("http://localhost:8545")
            .with_poll_interval(Duration::from_secs(3))
            .with_error_backoff(Duration::from_secs(5))
            .with_progress_interval(None)
    }

    fn router_rules() -> MemoryRuleStore {
        MemoryRuleStore::new(json!({
            "to_rules": [{"to": ROUTER, "method_id": SWAP, "label": "router"}],
            "from_rules": []
        }))
    }

    fn swap_block(number: u64) -> txwatch_domain::model::BlockView {
        block(number, vec![tx(SENDER, Some(ROUTER), "0xfd5c9779")])
    }

    async fn start(
        config: MonitorConfig,
        chain: &MockChain,
        notifier: &MockNotifier,
        rules: &MemoryRuleStore,
        clock: &MockClock,
    ) -> TestMonitor {
        Monitor::start(
            config,
            chain.clone(),
            notifier.clone(),
            rules.clone(),
            clock.clone(),
        )
        .await
        .unwrap_or_else(|err| panic!("monitor starts: {err}"))
    }

    #[tokio::test]
    async fn start_ahead_of_head_is_fatal() {
        let chain = MockChain::new(10);
        let result = Monitor::start(
            config().with_start_block(Some(11)),
            chain,
            MockNotifier::default(),
            MemoryRuleStore::default(),
            MockClock::default(),
        )
        .await;

        match result {
            Err(MonitorError::StartAheadOfHead { start, head }) => {
                assert_eq!((start, head), (11, 10));
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("start beyond head must fail"),
        }
    }

    #[tokio::test]
    async fn initializes_at_head_and_skips_history() {
        let chain = MockChain::new(100);
        chain.insert_block(swap_block(100));
        let notifier = MockNotifier::default();
        let mut monitor = start(
            config(),
            &chain,
            &notifier,
            &router_rules(),
            &MockClock::default(),
        )
        .await;

        assert_eq!(monitor.cursor(), 100);
        assert_eq!(
            monitor.run_iteration().await.unwrap(),
            IterationOutcome::CaughtUp
        );
        assert!(chain.fetch_log().is_empty());
        assert!(notifier.attempts().is_empty());
    }

    #[tokio::test]
    async fn catches_up_in_order_and_notifies_each_match() {
        let chain = MockChain::new(13);
        for number in 11..=13 {
            chain.insert_block(swap_block(number));
        }
        let notifier = MockNotifier::default();
        let mut monitor = start(
            config().with_start_block(Some(10)),
            &chain,
            &notifier,
            &router_rules(),
            &MockClock::default(),
        )
        .await;

        assert_eq!(
            monitor.run_iteration().await.unwrap(),
            IterationOutcome::CaughtUp
        );
        assert_eq!(monitor.cursor(), 13);
        assert_eq!(chain.fetch_log(), vec![11, 12, 13]);
        assert_eq!(notifier.delivered_blocks(), vec![11, 12, 13]);
        let attempts = notifier.attempts();
        assert_eq!(attempts[0].tx_hash, "0x11000");
        assert_eq!(attempts[0].kinds, vec![MatchKind::ToMethod]);

        // Nothing new: no refetch, no duplicate alerts.
        monitor.run_iteration().await.unwrap();
        assert_eq!(chain.fetch_log(), vec![11, 12, 13]);
        assert_eq!(notifier.delivered_blocks(), vec![11, 12, 13]);
    }

    #[tokio::test]
    async fn missing_block_holds_cursor_until_available() {
        let chain = MockChain::new(13);
        chain.insert_block(swap_block(11));
        chain.insert_block(swap_block(13));
        let notifier = MockNotifier::default();
        let mut monitor = start(
            config().with_start_block(Some(10)),
            &chain,
            &notifier,
            &router_rules(),
            &MockClock::default(),
        )
        .await;

        assert_eq!(
            monitor.run_iteration().await.unwrap(),
            IterationOutcome::Stalled
        );
        assert_eq!(monitor.cursor(), 11);
        assert_eq!(notifier.delivered_blocks(), vec![11]);

        chain.insert_block(block(12, Vec::new()));
        assert_eq!(
            monitor.run_iteration().await.unwrap(),
            IterationOutcome::CaughtUp
        );
        assert_eq!(monitor.cursor(), 13);
        assert_eq!(chain.fetch_log(), vec![11, 12, 12, 13]);
        assert_eq!(notifier.delivered_blocks(), vec![11, 13]);
    }

    #[tokio::test]
    async fn transient_fetch_error_retries_same_block_after_poll_sleep() {
        let chain = MockChain::new(3);
        for number in 1..=3 {
            chain.insert_block(swap_block(number));
        }
        chain.fail_next_fetch(2);
        let notifier = MockNotifier::default();
        let clock = MockClock::default();
        let mut monitor = start(
            config()
                .with_start_block(Some(0))
                .with_exit_after_catchup(true),
            &chain,
            &notifier,
            &router_rules(),
            &clock,
        )
        .await;

        monitor.run().await.expect("terminates after catch-up");

        assert_eq!(monitor.cursor(), 3);
        assert_eq!(chain.fetch_log(), vec![1, 2, 2, 3]);
        assert_eq!(notifier.delivered_blocks(), vec![1, 2, 3]);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(3)]);
    }

    #[tokio::test]
    async fn empty_rules_advance_without_fetching() {
        let chain = MockChain::new(5);
        let mut monitor = start(
            config().with_start_block(Some(2)),
            &chain,
            &MockNotifier::default(),
            &MemoryRuleStore::default(),
            &MockClock::default(),
        )
        .await;

        monitor.run_iteration().await.unwrap();
        assert_eq!(monitor.cursor(), 5);
        assert!(chain.fetch_log().is_empty());
    }

    #[tokio::test]
    async fn delivery_failure_does_not_stall_the_loop() {
        let chain = MockChain::new(2);
        chain.insert_block(swap_block(1));
        chain.insert_block(swap_block(2));
        let notifier = MockNotifier::failing();
        let mut monitor = start(
            config().with_start_block(Some(0)),
            &chain,
            &notifier,
            &router_rules(),
            &MockClock::default(),
        )
        .await;

        assert_eq!(
            monitor.run_iteration().await.unwrap(),
            IterationOutcome::CaughtUp
        );
        assert_eq!(monitor.cursor(), 2);
        assert_eq!(notifier.delivered_blocks(), vec![1, 2]);
    }

    #[tokio::test]
    async fn head_query_failure_backs_off_and_recovers() {
        let chain = MockChain::new(1);
        chain.insert_block(swap_block(1));
        let notifier = MockNotifier::default();
        let clock = MockClock::default();
        let mut monitor = start(
            config()
                .with_start_block(Some(0))
                .with_exit_after_catchup(true),
            &chain,
            &notifier,
            &router_rules(),
            &clock,
        )
        .await;
        chain.fail_next_head_queries(2);

        monitor.run().await.expect("terminates after catch-up");

        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(5), Duration::from_secs(5)]
        );
        assert_eq!(monitor.cursor(), 1);
        assert_eq!(notifier.delivered_blocks(), vec![1]);
    }

    #[tokio::test]
    async fn exit_waits_for_a_pass_that_scans_new_blocks() {
        let chain = MockChain::new(100);
        chain.insert_block(swap_block(101));
        let notifier = MockNotifier::default();
        let mut monitor = start(
            config().with_exit_after_catchup(true),
            &chain,
            &notifier,
            &router_rules(),
            &MockClock::default(),
        )
        .await;

        assert_eq!(
            monitor.run_iteration().await.unwrap(),
            IterationOutcome::CaughtUp
        );
        assert_eq!(monitor.cursor(), 100);

        chain.set_head(101);
        assert_eq!(
            monitor.run_iteration().await.unwrap(),
            IterationOutcome::Terminated
        );
        assert_eq!(monitor.cursor(), 101);
        assert_eq!(notifier.delivered_blocks(), vec![101]);
    }

    #[tokio::test]
    async fn progress_reports_on_the_injected_clock() {
        let chain = MockChain::new(3);
        let clock = MockClock::default();
        let mut monitor = start(
            config()
                .with_start_block(Some(0))
                .with_progress_interval(Some(Duration::from_secs(60))),
            &chain,
            &MockNotifier::default(),
            &MemoryRuleStore::default(),
            &clock,
        )
        .await;

        clock.advance(Duration::from_secs(61));
        monitor.run_iteration().await.unwrap();
        // Fires after block 1; blocks 2 and 3 wait for the next window.
        assert_eq!(monitor.progress().reports(), 1);
        assert_eq!(monitor.progress().blocks_since(), 2);

        clock.advance(Duration::from_secs(30));
        chain.set_head(4);
        monitor.run_iteration().await.unwrap();
        assert_eq!(monitor.progress().reports(), 1);
        assert_eq!(monitor.progress().blocks_since(), 3);

        clock.advance(Duration::from_secs(30));
        monitor.run_iteration().await.unwrap();
        assert_eq!(monitor.progress().reports(), 2);
        assert_eq!(monitor.progress().blocks_since(), 0);
    }

    #[tokio::test]
    async fn rule_edits_apply_from_next_iteration() {
        let chain = MockChain::new(1);
        chain.insert_block(swap_block(1));
        chain.insert_block(swap_block(2));
        let rules = MemoryRuleStore::default();
        let notifier = MockNotifier::default();
        let mut monitor = start(
            config().with_start_block(Some(0)),
            &chain,
            &notifier,
            &rules,
            &MockClock::default(),
        )
        .await;

        monitor.run_iteration().await.unwrap();
        assert_eq!(monitor.cursor(), 1);
        assert!(notifier.attempts().is_empty());

        rules.replace(json!({"from_rules": [{"from": SENDER, "method_id": SWAP}]}));
        chain.set_head(2);
        monitor.run_iteration().await.unwrap();

        assert_eq!(monitor.cursor(), 2);
        let attempts = notifier.attempts();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].block_number, 2);
        assert_eq!(attempts[0].kinds, vec![MatchKind::FromMethod]);
    }
}
