use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Cents;

pub type AccountId = Uuid;

/// A user's identity plus coin balance.
///
/// Accounts are addressed by `username` everywhere outside storage; `id` is
/// the stable key that purchase and transfer records point at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub username: String,
    /// Balance in cents, never negative once committed
    pub balance: Cents,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(username: impl Into<String>, balance: Cents) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            balance,
            created_at: Utc::now(),
        }
    }

    pub fn can_afford(&self, amount: Cents) -> bool {
        self.balance >= amount
    }

    /// Take `amount` out of the balance. Leaves the account untouched on error.
    pub fn debit(&mut self, amount: Cents) -> Result<(), BalanceError> {
        if amount < 0 {
            return Err(BalanceError::NegativeAmount(amount));
        }
        if !self.can_afford(amount) {
            return Err(BalanceError::Insufficient {
                balance: self.balance,
                required: amount,
            });
        }
        self.balance -= amount;
        Ok(())
    }

    /// Add `amount` to the balance. Leaves the account untouched on error.
    pub fn credit(&mut self, amount: Cents) -> Result<(), BalanceError> {
        if amount < 0 {
            return Err(BalanceError::NegativeAmount(amount));
        }
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or(BalanceError::Overflow)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BalanceError {
    Insufficient { balance: Cents, required: Cents },
    NegativeAmount(Cents),
    Overflow,
}

impl std::fmt::Display for BalanceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BalanceError::Insufficient { balance, required } => write!(
                f,
                "balance of {} cents cannot cover {} cents",
                balance, required
            ),
            BalanceError::NegativeAmount(amount) => {
                write!(f, "amount must not be negative, got {} cents", amount)
            }
            BalanceError::Overflow => write!(f, "balance would overflow"),
        }
    }
}

impl std::error::Error for BalanceError {}
