//! In-memory collaborators for driving the pipeline and catch-up loop in
//! tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use txwatch_domain::model::{
    ActiveRuleSet, Address, BlockView, MatchKind, RuleDocument, TransactionView,
};
use txwatch_domain::storage::{RuleStore, StorageResult};

use crate::clock::Clock;
use crate::notifier::{Alert, Delivery, Notifier, NotifyError};
use crate::rpc::ChainSource;
use crate::telegram::TelegramError;
use crate::worker::MonitorError;

pub const ROUTER: &str = "0x56a3bf66db83e59d13dfed48205bb84c33b08d1b";
pub const SENDER: &str = "0x1111111111111111111111111111111111111111";
pub const SWAP: &str = "0xfd5c9779";

pub fn address(value: &str) -> Address {
    Address::parse(value).expect("valid test address")
}

pub fn rules(document: Value) -> ActiveRuleSet {
    ActiveRuleSet::from_document(&RuleDocument::from_value(document).expect("valid document"))
}

pub fn tx(from: &str, to: Option<&str>, input: &str) -> TransactionView {
    TransactionView {
        hash: "0x00".to_string(),
        from: address(from),
        to: to.map(address),
        input: hex::decode(input.trim_start_matches("0x")).expect("valid test input"),
        value: 0,
    }
}

/// Builds a block and assigns each transaction a hash derived from the block
/// number and its position, e.g. block 7 index 2 -> `0x7002`.
pub fn block(number: u64, transactions: Vec<TransactionView>) -> BlockView {
    let transactions = transactions
        .into_iter()
        .enumerate()
        .map(|(index, mut tx)| {
            tx.hash = format!("0x{number}{index:03}");
            tx
        })
        .collect();
    BlockView {
        number,
        timestamp: None,
        transactions,
    }
}

#[derive(Default)]
struct ChainState {
    head: u64,
    blocks: HashMap<u64, BlockView>,
    failing_fetches: HashSet<u64>,
    failing_heads: usize,
    fetch_log: Vec<u64>,
}

#[derive(Clone, Default)]
pub struct MockChain {
    state: Arc<Mutex<ChainState>>,
}

impl MockChain {
    pub fn new(head: u64) -> Self {
        let chain = Self::default();
        chain.set_head(head);
        chain
    }

    pub fn set_head(&self, head: u64) {
        self.state.lock().unwrap().head = head;
    }

    pub fn insert_block(&self, block: BlockView) {
        self.state.lock().unwrap().blocks.insert(block.number, block);
    }

    /// The next fetch of `number` fails with a transport error.
    pub fn fail_next_fetch(&self, number: u64) {
        self.state.lock().unwrap().failing_fetches.insert(number);
    }

    pub fn fail_next_head_queries(&self, count: usize) {
        self.state.lock().unwrap().failing_heads = count;
    }

    pub fn fetch_log(&self) -> Vec<u64> {
        self.state.lock().unwrap().fetch_log.clone()
    }
}

#[async_trait]
impl ChainSource for MockChain {
    async fn head_block_number(&self) -> Result<u64, MonitorError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_heads > 0 {
            state.failing_heads -= 1;
            return Err(MonitorError::Rpc("head unavailable".into()));
        }
        Ok(state.head)
    }

    async fn fetch_block(&self, number: u64) -> Result<Option<BlockView>, MonitorError> {
        let mut state = self.state.lock().unwrap();
        state.fetch_log.push(number);
        if state.failing_fetches.remove(&number) {
            return Err(MonitorError::Rpc(format!("timeout fetching {number}")));
        }
        Ok(state.blocks.get(&number).cloned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    pub block_number: u64,
    pub tx_hash: String,
    pub kinds: Vec<MatchKind>,
}

#[derive(Clone, Default)]
pub struct MockNotifier {
    attempts: Arc<Mutex<Vec<Delivered>>>,
    failing: Arc<AtomicBool>,
}

impl MockNotifier {
    pub fn failing() -> Self {
        let notifier = Self::default();
        notifier.failing.store(true, Ordering::SeqCst);
        notifier
    }

    pub fn attempts(&self) -> Vec<Delivered> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn delivered_blocks(&self) -> Vec<u64> {
        self.attempts().iter().map(|d| d.block_number).collect()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn notify(&self, alert: &Alert<'_>) -> Result<Delivery, NotifyError> {
        self.attempts.lock().unwrap().push(Delivered {
            block_number: alert.block_number,
            tx_hash: alert.tx_match.tx.hash.clone(),
            kinds: alert.tx_match.reasons.iter().map(|r| r.kind).collect(),
        });
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::Telegram(TelegramError::Api {
                method: "sendMessage",
                status: 500,
                description: "upstream unavailable".into(),
            }));
        }
        Ok(Delivery::Sent)
    }
}

#[derive(Clone, Default)]
pub struct MemoryRuleStore {
    document: Arc<Mutex<RuleDocument>>,
}

impl MemoryRuleStore {
    pub fn new(document: Value) -> Self {
        let store = Self::default();
        store.replace(document);
        store
    }

    pub fn replace(&self, document: Value) {
        *self.document.lock().unwrap() =
            RuleDocument::from_value(document).expect("valid document");
    }
}

#[async_trait]
impl RuleStore for MemoryRuleStore {
    async fn load_document(&self) -> RuleDocument {
        self.document.lock().unwrap().clone()
    }

    async fn save_document(&self, document: &RuleDocument) -> StorageResult<()> {
        *self.document.lock().unwrap() = document.clone();
        Ok(())
    }
}

struct ClockState {
    base: Instant,
    elapsed: Duration,
    sleeps: Vec<Duration>,
}

/// Virtual clock: sleeping advances time instantly and is recorded.
#[derive(Clone)]
pub struct MockClock {
    state: Arc<Mutex<ClockState>>,
}

impl Default for MockClock {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(ClockState {
                base: Instant::now(),
                elapsed: Duration::ZERO,
                sleeps: Vec::new(),
            })),
        }
    }
}

impl MockClock {
    pub fn advance(&self, duration: Duration) {
        self.state.lock().unwrap().elapsed += duration;
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.state.lock().unwrap().sleeps.clone()
    }
}

#[async_trait]
impl Clock for MockClock {
    fn now(&self) -> Instant {
        let state = self.state.lock().unwrap();
        state.base + state.elapsed
    }

    async fn sleep(&self, duration: Duration) {
        let mut state = self.state.lock().unwrap();
        state.elapsed += duration;
        state.sleeps.push(duration);
    }
}
