//! Data structures and helpers shared across the monitor, storage and bot
//! binaries.

pub mod rules;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use strum_macros::AsRefStr;
use thiserror::Error;

pub use rules::*;

/// Length in bytes of an account address.
pub const ADDRESS_LENGTH: usize = 20;

/// Length in bytes of a method selector.
pub const SELECTOR_LENGTH: usize = 4;

/// Decimals of the chain's native currency (wei -> display unit).
pub const NATIVE_DECIMALS: u32 = 18;

/// Errors emitted when user-supplied hex values fail canonicalization.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HexFormatError {
    #[error("value is empty")]
    Empty,
    #[error("expected {expected} hex characters, found {actual}")]
    WrongLength { expected: usize, actual: usize },
    #[error("value contains non-hex characters")]
    NonHex,
}

/// Trims, lowercases and strips an optional `0x` prefix, then decodes exactly
/// `N` bytes.
fn parse_fixed_hex<const N: usize>(value: &str) -> Result<[u8; N], HexFormatError> {
    let cleaned = value.trim().to_ascii_lowercase();
    if cleaned.is_empty() {
        return Err(HexFormatError::Empty);
    }
    let digits = cleaned.strip_prefix("0x").unwrap_or(&cleaned);
    if digits.len() != N * 2 {
        return Err(HexFormatError::WrongLength {
            expected: N * 2,
            actual: digits.len(),
        });
    }

    let mut bytes = [0u8; N];
    hex::decode_to_slice(digits, &mut bytes).map_err(|_| HexFormatError::NonHex)?;
    Ok(bytes)
}

/// 20-byte account address, rendered as `0x` + 40 lowercase hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_LENGTH]);

impl Address {
    pub const fn new(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Accepts mixed case input with or without the `0x` prefix.
    pub fn parse(value: &str) -> Result<Self, HexFormatError> {
        parse_fixed_hex(value).map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = HexFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// First four bytes of a contract call's input, identifying the invoked
/// function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Selector([u8; SELECTOR_LENGTH]);

impl Selector {
    pub const fn new(bytes: [u8; SELECTOR_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn parse(value: &str) -> Result<Self, HexFormatError> {
        parse_fixed_hex(value).map(Self)
    }

    /// Extracts the selector from call input. Inputs shorter than four bytes
    /// carry no selector.
    pub fn from_input(input: &[u8]) -> Option<Self> {
        let head = input.get(..SELECTOR_LENGTH)?;
        let mut bytes = [0u8; SELECTOR_LENGTH];
        bytes.copy_from_slice(head);
        Some(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; SELECTOR_LENGTH] {
        &self.0
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Selector {
    type Err = HexFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Read-only projection of a transaction inside a fetched block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionView {
    /// Lowercase `0x`-prefixed transaction hash.
    pub hash: String,
    pub from: Address,
    /// Absent for contract-creation transactions.
    pub to: Option<Address>,
    pub input: Vec<u8>,
    /// Value in the chain's smallest unit (wei).
    pub value: u128,
}

impl TransactionView {
    pub fn selector(&self) -> Option<Selector> {
        Selector::from_input(&self.input)
    }

    /// Plain value transfers carry no call input.
    pub fn is_contract_call(&self) -> bool {
        !self.input.is_empty()
    }
}

/// A block with full transaction bodies, in the block's native order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockView {
    pub number: u64,
    pub timestamp: Option<DateTime<Utc>>,
    pub transactions: Vec<TransactionView>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr)]
pub enum MatchKind {
    #[strum(serialize = "to+method")]
    ToMethod,
    #[strum(serialize = "from+method")]
    FromMethod,
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchReason {
    pub kind: MatchKind,
    pub label: Option<String>,
}

impl fmt::Display for MatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "{} ({})", self.kind, label),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// A transaction together with every rule it satisfied, to-rules first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxMatch {
    pub tx: TransactionView,
    pub selector: Selector,
    pub reasons: Vec<MatchReason>,
}

impl TxMatch {
    /// Renders reasons as `kind (label)` joined by commas, or `n/a`.
    pub fn describe_reasons(&self) -> String {
        describe_reasons(&self.reasons)
    }
}

pub fn describe_reasons(reasons: &[MatchReason]) -> String {
    if reasons.is_empty() {
        return "n/a".to_string();
    }
    reasons
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Converts an integer amount of the smallest unit into its display unit,
/// trimming trailing fractional zeros.
pub fn format_units(value: u128, decimals: u32) -> String {
    let scale = 10u128.pow(decimals);
    let whole = value / scale;
    let fraction = value % scale;
    if fraction == 0 {
        return whole.to_string();
    }
    let padded = format!("{:0width$}", fraction, width = decimals as usize);
    format!("{whole}.{}", padded.trim_end_matches('0'))
}
