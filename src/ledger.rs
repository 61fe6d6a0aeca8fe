use chrono::{DateTime, Local, Utc};
use nanoid::nanoid;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

pub const MAX_RETAINED: usize = 50;
pub const MAX_VISIBLE: usize = 10;

const ID_ALPHABET: &[char] = &[
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'J',
    'K', 'L', 'M', 'N', 'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z',
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxKind {
    Bonus,
    Info,
    Reward,
    Guaranteed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub description: String,
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: TxKind,
}

impl Transaction {
    /// Builds a record stamped with the current instant. Non-finite amounts
    /// are refused so they never reach the balance or the stored ledger.
    pub fn new(description: impl Into<String>, amount: f64, kind: TxKind) -> Result<Self> {
        if !amount.is_finite() {
            return Err(SimError::InvalidTransactionAmount(amount));
        }
        Ok(Self {
            id: format!("TX-{}", nanoid!(10, ID_ALPHABET)),
            description: description.into(),
            amount,
            timestamp: Utc::now(),
            kind,
        })
    }

    pub fn timestamp_local(&self) -> DateTime<Local> {
        self.timestamp.with_timezone(&Local)
    }
}

/// Newest-first transaction history, bounded to the most recent entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ledger {
    entries: Vec<Transaction>,
}

impl Ledger {
    pub fn from_entries(mut entries: Vec<Transaction>) -> Self {
        entries.truncate(MAX_RETAINED);
        Self { entries }
    }

    pub fn push(&mut self, tx: Transaction) {
        self.entries.insert(0, tx);
        self.entries.truncate(MAX_RETAINED);
    }

    pub fn entries(&self) -> &[Transaction] {
        &self.entries
    }

    pub fn visible(&self) -> &[Transaction] {
        &self.entries[..self.entries.len().min(MAX_VISIBLE)]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub fn latest(&self) -> Option<&Transaction> {
        self.entries.first()
    }
}

pub fn format_amount(amount: f64) -> String {
    if amount > 0.0 {
        format!("+{:.8} BTC", amount)
    } else {
        format!("{:.8} BTC", amount)
    }
}
