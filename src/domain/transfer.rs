use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, Cents};

pub type TransferId = Uuid;

/// A committed movement of coins from one account to another.
/// Transfer records are append-only and never updated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub id: TransferId,
    /// Account debited
    pub sender: AccountId,
    /// Account credited
    pub receiver: AccountId,
    /// Amount in cents (always positive)
    pub amount: Cents,
    pub created_at: DateTime<Utc>,
}

impl TransferRecord {
    pub fn new(sender: AccountId, receiver: AccountId, amount: Cents) -> Self {
        debug_assert!(amount > 0, "transfer amount must be positive");
        Self {
            id: Uuid::new_v4(),
            sender,
            receiver,
            amount,
            created_at: Utc::now(),
        }
    }

    pub fn involves(&self, account: AccountId) -> bool {
        self.sender == account || self.receiver == account
    }

    pub fn is_self_transfer(&self) -> bool {
        self.sender == self.receiver
    }
}
