use chrono::{DateTime, Utc};
use metrics::counter;
use tracing::{debug, warn};
use txwatch_domain::model::{ActiveRuleSet, MatchReason, RuleSide, TransactionView, TxMatch};

use crate::rpc::ChainSource;
use crate::worker::MonitorError;

/// Result of scanning one block number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// The source has not indexed this block yet; the same number must be
    /// retried on the next iteration.
    NotYetAvailable,
    /// No rules are active, so the block was not fetched at all.
    Skipped,
    Scanned(ScannedBlock),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedBlock {
    pub number: u64,
    pub timestamp: Option<DateTime<Utc>>,
    /// Matches in the block's transaction order.
    pub matches: Vec<TxMatch>,
}

/// Decides whether a transaction satisfies any active rule. Every rule is
/// checked independently, so one transaction can collect several reasons;
/// to-rule reasons always precede from-rule reasons.
pub fn match_transaction(tx: &TransactionView, rules: &ActiveRuleSet) -> Option<TxMatch> {
    // Plain value transfers are never monitored.
    if !tx.is_contract_call() {
        return None;
    }
    let selector = tx.selector()?;

    let mut reasons = Vec::new();
    let sides = [(RuleSide::To, tx.to), (RuleSide::From, Some(tx.from))];
    for (side, address) in sides {
        let Some(address) = address else {
            continue;
        };
        reasons.extend(
            rules
                .rules(side)
                .iter()
                .filter(|rule| rule.address == address && rule.method_id == selector)
                .map(|rule| MatchReason {
                    kind: side.match_kind(),
                    label: rule.label.clone(),
                }),
        );
    }

    if reasons.is_empty() {
        return None;
    }
    Some(TxMatch {
        tx: tx.clone(),
        selector,
        reasons,
    })
}

/// Fetches one block and applies the matcher to each transaction in order.
/// Fetch failures other than "not indexed yet" propagate as retryable errors.
pub async fn scan_block<S>(
    source: &S,
    number: u64,
    rules: &ActiveRuleSet,
) -> Result<ScanOutcome, MonitorError>
where
    S: ChainSource + ?Sized,
{
    if rules.is_empty() {
        debug!(block_number = number, "no active rules; skipping block fetch");
        return Ok(ScanOutcome::Skipped);
    }

    let Some(block) = source.fetch_block(number).await? else {
        warn!(block_number = number, "block not found yet; will retry");
        counter!("monitor_blocks_pending_total").increment(1);
        return Ok(ScanOutcome::NotYetAvailable);
    };

    let matches: Vec<TxMatch> = block
        .transactions
        .iter()
        .filter_map(|tx| match_transaction(tx, rules))
        .collect();
    debug!(
        block_number = number,
        transactions = block.transactions.len(),
        matches = matches.len(),
        "block scanned"
    );

    Ok(ScanOutcome::Scanned(ScannedBlock {
        number: block.number,
        timestamp: block.timestamp,
        matches,
    }))
}
