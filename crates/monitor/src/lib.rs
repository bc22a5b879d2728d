//! Block-by-block transaction monitor: tails an EVM JSON-RPC endpoint, scans
//! every new block against the operator's rule file and forwards matches to a
//! Telegram chat. `run_monitor` wires the production collaborators; the loop
//! itself is generic over its chain source, notifier, rule store and
//! clock so the catch-up loop can be driven by mocks.

pub mod clock;
pub mod notifier;
pub mod pipeline;
pub mod progress;
pub mod rpc;
pub mod telegram;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use clock::{Clock, TokioClock};
pub use notifier::{Alert, AlertFormatter, Delivery, Notifier, NotifyError, TelegramNotifier};
pub use pipeline::{match_transaction, scan_block, ScanOutcome, ScannedBlock};
pub use rpc::{ChainSource, RpcChainSource};
pub use telegram::{TelegramClient, TelegramError};
pub use worker::{
    build_rpc_source, initialize_cursor, run_monitor, IterationOutcome, Monitor, MonitorError,
};
