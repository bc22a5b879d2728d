//! Rule model: the raw document as stored on disk, validated rules, and the
//! deduplicated active set consumed by one monitoring iteration.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum_macros::AsRefStr;
use thiserror::Error;
use tracing::warn;

use super::{Address, HexFormatError, MatchKind, Selector};

/// Which side of a transaction a rule inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum RuleSide {
    To,
    From,
}

impl RuleSide {
    pub const ALL: [RuleSide; 2] = [RuleSide::To, RuleSide::From];

    /// Name of the address field inside a rule entry.
    pub fn address_key(self) -> &'static str {
        match self {
            RuleSide::To => "to",
            RuleSide::From => "from",
        }
    }

    /// Name of the list holding this side's rules in the document.
    pub fn list_key(self) -> &'static str {
        match self {
            RuleSide::To => "to_rules",
            RuleSide::From => "from_rules",
        }
    }

    pub fn match_kind(self) -> MatchKind {
        match self {
            RuleSide::To => MatchKind::ToMethod,
            RuleSide::From => MatchKind::FromMethod,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "to" => Some(RuleSide::To),
            "from" => Some(RuleSide::From),
            _ => None,
        }
    }
}

/// Validated `(address, method_id)` filter with an optional operator label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleTarget {
    pub address: Address,
    pub method_id: Selector,
    pub label: Option<String>,
}

impl RuleTarget {
    pub fn new(address: Address, method_id: Selector, label: Option<String>) -> Self {
        Self {
            address,
            method_id,
            label: clean_label(label.as_deref()),
        }
    }

    /// Deduplication key within one rule list.
    pub fn key(&self) -> (Address, Selector) {
        (self.address, self.method_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    To(RuleTarget),
    From(RuleTarget),
}

impl Rule {
    pub fn new(side: RuleSide, target: RuleTarget) -> Self {
        match side {
            RuleSide::To => Rule::To(target),
            RuleSide::From => Rule::From(target),
        }
    }

    pub fn side(&self) -> RuleSide {
        match self {
            Rule::To(_) => RuleSide::To,
            Rule::From(_) => RuleSide::From,
        }
    }

    pub fn target(&self) -> &RuleTarget {
        match self {
            Rule::To(target) | Rule::From(target) => target,
        }
    }

    pub fn into_target(self) -> RuleTarget {
        match self {
            Rule::To(target) | Rule::From(target) => target,
        }
    }

    /// Validating parser for one raw rule entry. This is the only way a rule
    /// enters the active set.
    pub fn parse(side: RuleSide, raw: &Value) -> Result<Self, RuleError> {
        let Some(entry) = raw.as_object() else {
            return Err(RuleError::NotAnObject);
        };

        let address_key = side.address_key();
        let address = Address::parse(field_str(entry, address_key)).map_err(|source| {
            RuleError::InvalidAddress {
                field: address_key,
                value: field_repr(entry, address_key),
                source,
            }
        })?;
        let method_id = Selector::parse(field_str(entry, "method_id")).map_err(|source| {
            RuleError::InvalidMethodId {
                value: field_repr(entry, "method_id"),
                source,
            }
        })?;
        let label = entry.get("label").and_then(Value::as_str);

        Ok(Rule::new(
            side,
            RuleTarget {
                address,
                method_id,
                label: clean_label(label),
            },
        ))
    }

    /// Canonical JSON form, as written back to the rule file.
    pub fn to_value(&self) -> Value {
        let target = self.target();
        let mut entry = Map::new();
        entry.insert(
            self.side().address_key().to_string(),
            Value::String(target.address.to_string()),
        );
        entry.insert(
            "method_id".to_string(),
            Value::String(target.method_id.to_string()),
        );
        if let Some(label) = &target.label {
            entry.insert("label".to_string(), Value::String(label.clone()));
        }
        Value::Object(entry)
    }
}

fn field_str<'a>(entry: &'a Map<String, Value>, key: &str) -> &'a str {
    entry.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn field_repr(entry: &Map<String, Value>, key: &str) -> String {
    match entry.get(key) {
        Some(Value::String(value)) => value.clone(),
        Some(other) => other.to_string(),
        None => "<missing>".to_string(),
    }
}

fn clean_label(label: Option<&str>) -> Option<String> {
    label
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .map(str::to_owned)
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("rules document root is not a JSON object")]
    RootNotAnObject,
    #[error("rule entry is not a JSON object")]
    NotAnObject,
    #[error("invalid `{field}` value `{value}`: {source}")]
    InvalidAddress {
        field: &'static str,
        value: String,
        #[source]
        source: HexFormatError,
    },
    #[error("invalid `method_id` value `{value}`: {source}")]
    InvalidMethodId {
        value: String,
        #[source]
        source: HexFormatError,
    },
}

/// Raw rule document as stored on disk. Entries are kept untyped so a single
/// malformed entry never prevents the rest of the file from loading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleDocument {
    #[serde(default)]
    pub to_rules: Vec<Value>,
    #[serde(default)]
    pub from_rules: Vec<Value>,
}

impl RuleDocument {
    /// Accepts any JSON object; unknown fields are ignored and a rule field
    /// that is not an array is treated as empty.
    pub fn from_value(value: Value) -> Result<Self, RuleError> {
        let Value::Object(mut root) = value else {
            return Err(RuleError::RootNotAnObject);
        };

        let mut document = RuleDocument::default();
        for side in RuleSide::ALL {
            let entries = match root.remove(side.list_key()) {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(entries)) => entries,
                Some(_) => {
                    warn!(
                        field = side.list_key(),
                        "rules field is not an array; treating as empty"
                    );
                    Vec::new()
                }
            };
            *document.entries_mut(side) = entries;
        }
        Ok(document)
    }

    pub fn entries(&self, side: RuleSide) -> &[Value] {
        match side {
            RuleSide::To => &self.to_rules,
            RuleSide::From => &self.from_rules,
        }
    }

    pub fn entries_mut(&mut self, side: RuleSide) -> &mut Vec<Value> {
        match side {
            RuleSide::To => &mut self.to_rules,
            RuleSide::From => &mut self.from_rules,
        }
    }
}

/// Immutable snapshot of well-formed, deduplicated rules for one iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveRuleSet {
    to_rules: Vec<RuleTarget>,
    from_rules: Vec<RuleTarget>,
}

impl ActiveRuleSet {
    /// Validates every entry, drops malformed ones with a warning, and keeps
    /// the first occurrence of each `(address, method_id)` pair per list.
    pub fn from_document(document: &RuleDocument) -> Self {
        Self {
            to_rules: normalize_side(document, RuleSide::To),
            from_rules: normalize_side(document, RuleSide::From),
        }
    }

    pub fn rules(&self, side: RuleSide) -> &[RuleTarget] {
        match side {
            RuleSide::To => &self.to_rules,
            RuleSide::From => &self.from_rules,
        }
    }

    pub fn to_rules(&self) -> &[RuleTarget] {
        &self.to_rules
    }

    pub fn from_rules(&self) -> &[RuleTarget] {
        &self.from_rules
    }

    pub fn is_empty(&self) -> bool {
        self.to_rules.is_empty() && self.from_rules.is_empty()
    }

    pub fn to_document(&self) -> RuleDocument {
        let mut document = RuleDocument::default();
        for side in RuleSide::ALL {
            *document.entries_mut(side) = self
                .rules(side)
                .iter()
                .map(|target| Rule::new(side, target.clone()).to_value())
                .collect();
        }
        document
    }
}

/// Shorthand for [`ActiveRuleSet::from_document`].
pub fn normalize(document: &RuleDocument) -> ActiveRuleSet {
    ActiveRuleSet::from_document(document)
}

fn normalize_side(document: &RuleDocument, side: RuleSide) -> Vec<RuleTarget> {
    let mut seen = HashSet::new();
    let mut rules = Vec::new();

    for (offset, raw) in document.entries(side).iter().enumerate() {
        let index = offset + 1;
        match Rule::parse(side, raw) {
            Ok(rule) => {
                let target = rule.into_target();
                if seen.insert(target.key()) {
                    rules.push(target);
                }
            }
            Err(err) => {
                warn!(
                    list = side.list_key(),
                    index,
                    error = %err,
                    "dropping malformed rule"
                );
            }
        }
    }

    rules
}
