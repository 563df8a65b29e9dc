//! Storage capabilities consumed by the ledger engine.
//!
//! Reads that don't feed a balance decision go through the plain store
//! traits. Everything an operation reads-to-decide or writes goes through a
//! [`LedgerScope`] obtained from [`LedgerStore::begin`]; nothing written through
//! a scope is visible until [`LedgerScope::commit`].

mod memory;
mod sqlite;

pub use memory::*;
pub use sqlite::*;

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::{Account, AccountId, CatalogItem, PurchaseRecord, TransferRecord};

/// SQL schema for a fresh database
pub const SCHEMA: &str = include_str!("schema.sql");

/// Returned by [`AccountStore::create_account`] when the username is taken,
/// including when a concurrent registration won the race.
#[derive(Debug, thiserror::Error)]
#[error("Account {0} already exists")]
pub struct DuplicateAccount(pub String);

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Look up an account by username.
    async fn get_account(&self, username: &str) -> Result<Option<Account>>;

    async fn get_account_by_id(&self, id: AccountId) -> Result<Option<Account>>;

    /// Insert a new account. Fails with [`DuplicateAccount`] if the username
    /// is taken.
    async fn create_account(&self, account: &Account) -> Result<()>;

    /// All accounts, ordered by username.
    async fn list_accounts(&self) -> Result<Vec<Account>>;
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn get_item(&self, name: &str) -> Result<Option<CatalogItem>>;

    /// Insert an item, or replace the price of an existing one.
    async fn put_item(&self, item: &CatalogItem) -> Result<()>;

    /// All items, ordered by name.
    async fn list_items(&self) -> Result<Vec<CatalogItem>>;
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Purchases made by `buyer`, oldest first.
    async fn list_purchases(&self, buyer: AccountId) -> Result<Vec<PurchaseRecord>>;

    /// Transfers where `account` is sender or receiver, oldest first.
    async fn list_transfers(&self, account: AccountId) -> Result<Vec<TransferRecord>>;
}

/// One atomic unit of work.
///
/// Accounts fetched with [`lock_account`](LedgerScope::lock_account) stay
/// locked against other scopes until this scope commits or aborts. Dropping a
/// scope without committing discards its writes.
#[async_trait]
pub trait LedgerScope: Send {
    /// Fetch an account by username and lock its row for the rest of the scope.
    async fn lock_account(&mut self, username: &str) -> Result<Option<Account>>;

    async fn get_item(&mut self, name: &str) -> Result<Option<CatalogItem>>;

    /// Persist the balance of an account previously locked in this scope.
    async fn save_account(&mut self, account: &Account) -> Result<()>;

    async fn append_purchase(&mut self, record: PurchaseRecord) -> Result<PurchaseRecord>;

    async fn append_transfer(&mut self, record: TransferRecord) -> Result<TransferRecord>;

    async fn commit(self) -> Result<()>;

    async fn abort(self) -> Result<()>;
}

/// Everything the ledger engine needs from storage.
#[async_trait]
pub trait LedgerStore: AccountStore + CatalogStore + RecordStore {
    type Scope: LedgerScope;

    /// Open a new atomic scope.
    async fn begin(&self) -> Result<Self::Scope>;
}
