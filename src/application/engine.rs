use std::fmt;

use tracing::{debug, info, instrument, warn};

use crate::domain::{Account, BalanceError, Cents, PurchaseRecord, TransferRecord};
use crate::storage::{LedgerScope, LedgerStore};

use super::LedgerError;

/// Where a ledger operation is in its lifecycle.
///
/// `Started -> Validating -> Mutating -> Committed`, or `Aborted` from any
/// phase before `Committed`. Nothing becomes visible before `Committed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Started,
    Validating,
    Mutating,
    Committed,
    Aborted,
}

impl Phase {
    fn advance(&mut self, next: Phase) {
        debug!(from = %self, to = %next, "phase");
        *self = next;
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Started => "started",
            Phase::Validating => "validating",
            Phase::Mutating => "mutating",
            Phase::Committed => "committed",
            Phase::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// The balance-mutation core.
///
/// Each purchase or transfer runs inside one [`LedgerScope`]: every balance it
/// reads to make a decision is locked through that scope, and every write goes
/// through it, so either all of an operation is committed or none of it is.
/// Accounts are locked in ascending username order to keep concurrent
/// operations deadlock-free. The engine never retries.
pub struct LedgerEngine<S> {
    store: S,
}

impl<S: LedgerStore> LedgerEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Buy one `item_name` for `buyer`, debiting its price.
    #[instrument(skip(self))]
    pub async fn purchase(
        &self,
        buyer: &str,
        item_name: &str,
    ) -> Result<PurchaseRecord, LedgerError> {
        if buyer.is_empty() {
            return Err(LedgerError::AccountNotFound(buyer.to_string()));
        }
        if item_name.is_empty() {
            return Err(LedgerError::ItemNotFound(item_name.to_string()));
        }

        let mut phase = Phase::Started;
        let mut scope = self.store.begin().await?;
        let outcome = purchase_in_scope(&mut scope, &mut phase, buyer, item_name).await;
        finish(scope, phase, outcome).await
    }

    /// Move `amount` from `sender` to `receiver`.
    ///
    /// Note the argument order: receiver first, then sender.
    #[instrument(skip(self))]
    pub async fn transfer(
        &self,
        receiver: &str,
        sender: &str,
        amount: Cents,
    ) -> Result<TransferRecord, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount {
                amount,
                reason: "transfer amount must be positive",
            });
        }
        if receiver.is_empty() {
            return Err(LedgerError::AccountNotFound(receiver.to_string()));
        }
        if sender.is_empty() {
            return Err(LedgerError::AccountNotFound(sender.to_string()));
        }

        let mut phase = Phase::Started;
        let mut scope = self.store.begin().await?;
        let outcome = transfer_in_scope(&mut scope, &mut phase, receiver, sender, amount).await;
        finish(scope, phase, outcome).await
    }

    /// Purchases made by `username`, oldest first.
    #[instrument(skip(self))]
    pub async fn list_purchases(&self, username: &str) -> Result<Vec<PurchaseRecord>, LedgerError> {
        let account = self.require_account(username).await?;
        Ok(self.store.list_purchases(account.id).await?)
    }

    /// Transfers sent or received by `username`, oldest first.
    #[instrument(skip(self))]
    pub async fn list_transfers(&self, username: &str) -> Result<Vec<TransferRecord>, LedgerError> {
        let account = self.require_account(username).await?;
        Ok(self.store.list_transfers(account.id).await?)
    }

    /// Current committed state of an account. Not locked.
    pub async fn require_account(&self, username: &str) -> Result<Account, LedgerError> {
        self.store
            .get_account(username)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(username.to_string()))
    }
}

async fn purchase_in_scope<Sc: LedgerScope>(
    scope: &mut Sc,
    phase: &mut Phase,
    buyer: &str,
    item_name: &str,
) -> Result<PurchaseRecord, LedgerError> {
    phase.advance(Phase::Validating);
    let mut account = scope
        .lock_account(buyer)
        .await?
        .ok_or_else(|| LedgerError::AccountNotFound(buyer.to_string()))?;
    let item = scope
        .get_item(item_name)
        .await?
        .ok_or_else(|| LedgerError::ItemNotFound(item_name.to_string()))?;

    account
        .debit(item.price)
        .map_err(|e| balance_error(&account.username, e))?;

    phase.advance(Phase::Mutating);
    scope.save_account(&account).await?;
    let record = scope
        .append_purchase(PurchaseRecord::new(account.id, &item))
        .await?;
    Ok(record)
}

async fn transfer_in_scope<Sc: LedgerScope>(
    scope: &mut Sc,
    phase: &mut Phase,
    receiver: &str,
    sender: &str,
    amount: Cents,
) -> Result<TransferRecord, LedgerError> {
    phase.advance(Phase::Validating);
    let (receiver_account, sender_account) = lock_pair(scope, receiver, sender).await?;
    let receiver_account =
        receiver_account.ok_or_else(|| LedgerError::AccountNotFound(receiver.to_string()))?;
    let sender_account =
        sender_account.ok_or_else(|| LedgerError::AccountNotFound(sender.to_string()))?;

    if receiver_account.id == sender_account.id {
        // Self-transfer: sufficiency is still enforced, the balance ends unchanged.
        let mut account = sender_account;
        account
            .debit(amount)
            .and_then(|()| account.credit(amount))
            .map_err(|e| balance_error(&account.username, e))?;

        phase.advance(Phase::Mutating);
        scope.save_account(&account).await?;
        let record = scope
            .append_transfer(TransferRecord::new(account.id, account.id, amount))
            .await?;
        return Ok(record);
    }

    let mut from = sender_account;
    let mut to = receiver_account;
    from.debit(amount)
        .map_err(|e| balance_error(&from.username, e))?;
    to.credit(amount).map_err(|e| balance_error(&to.username, e))?;

    phase.advance(Phase::Mutating);
    // Save in the same order the rows were locked.
    let (first, second) = if from.username < to.username {
        (&from, &to)
    } else {
        (&to, &from)
    };
    scope.save_account(first).await?;
    scope.save_account(second).await?;

    let record = scope
        .append_transfer(TransferRecord::new(from.id, to.id, amount))
        .await?;
    Ok(record)
}

/// Lock both parties in ascending username order. Returns `(receiver, sender)`.
async fn lock_pair<Sc: LedgerScope>(
    scope: &mut Sc,
    receiver: &str,
    sender: &str,
) -> anyhow::Result<(Option<Account>, Option<Account>)> {
    if receiver == sender {
        let account = scope.lock_account(receiver).await?;
        return Ok((account.clone(), account));
    }

    if receiver < sender {
        let r = scope.lock_account(receiver).await?;
        let s = scope.lock_account(sender).await?;
        Ok((r, s))
    } else {
        let s = scope.lock_account(sender).await?;
        let r = scope.lock_account(receiver).await?;
        Ok((r, s))
    }
}

/// Commit on success; otherwise abort and hand back the original error.
async fn finish<Sc: LedgerScope, T>(
    scope: Sc,
    phase: Phase,
    outcome: Result<T, LedgerError>,
) -> Result<T, LedgerError> {
    match outcome {
        Ok(value) => match scope.commit().await {
            Ok(()) => {
                info!(phase = %Phase::Committed, "operation committed");
                Ok(value)
            }
            Err(err) => {
                warn!(phase = %Phase::Aborted, failed_in = %phase, error = %format!("{:#}", err), "commit failed");
                Err(LedgerError::Storage(err))
            }
        },
        Err(err) => {
            warn!(phase = %Phase::Aborted, failed_in = %phase, error = %err, "operation aborted");
            if let Err(abort_err) = scope.abort().await {
                warn!(error = %format!("{:#}", abort_err), "abort failed");
            }
            Err(err)
        }
    }
}

fn balance_error(username: &str, err: BalanceError) -> LedgerError {
    match err {
        BalanceError::Insufficient { balance, required } => LedgerError::InsufficientFunds {
            username: username.to_string(),
            balance,
            required,
        },
        BalanceError::NegativeAmount(amount) => LedgerError::InvalidAmount {
            amount,
            reason: "amount must not be negative",
        },
        BalanceError::Overflow => LedgerError::InvalidAmount {
            amount: 0,
            reason: "balance would overflow",
        },
    }
}
