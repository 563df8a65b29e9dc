use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use anyhow::{Result, bail, ensure};
use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::domain::{Account, AccountId, CatalogItem, PurchaseRecord, TransferRecord};

use super::{
    AccountStore, CatalogStore, DuplicateAccount, LedgerScope, LedgerStore, RecordStore,
};

/// Storage steps that can be made to fail on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    Begin,
    SaveAccount,
    AppendPurchase,
    AppendTransfer,
    Commit,
}

#[derive(Default)]
struct Tables {
    accounts: BTreeMap<String, Account>,
    items: BTreeMap<String, CatalogItem>,
    purchases: Vec<PurchaseRecord>,
    transfers: Vec<TransferRecord>,
}

#[derive(Default)]
struct Inner {
    tables: RwLock<Tables>,
    /// One lock per username, created on first use
    row_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    fail_points: Mutex<HashSet<FailPoint>>,
}

/// A thread-safe in-memory ledger store.
///
/// Scopes lock individual accounts, so operations on disjoint accounts run
/// side by side while operations sharing an account queue up. Writes are
/// staged inside the scope and applied in one step on commit.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    inner: Arc<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future call to `point` fail until cleared.
    pub async fn fail_on(&self, point: FailPoint) {
        self.inner.fail_points.lock().await.insert(point);
    }

    pub async fn clear_failures(&self) {
        self.inner.fail_points.lock().await.clear();
    }

    async fn trip(&self, point: FailPoint) -> Result<()> {
        if self.inner.fail_points.lock().await.contains(&point) {
            bail!("Injected storage failure at {:?}", point);
        }
        Ok(())
    }

    async fn row_lock(&self, username: &str) -> Arc<Mutex<()>> {
        let mut locks = self.inner.row_locks.lock().await;
        locks
            .entry(username.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[async_trait]
impl AccountStore for InMemoryStore {
    async fn get_account(&self, username: &str) -> Result<Option<Account>> {
        let tables = self.inner.tables.read().await;
        Ok(tables.accounts.get(username).cloned())
    }

    async fn get_account_by_id(&self, id: AccountId) -> Result<Option<Account>> {
        let tables = self.inner.tables.read().await;
        Ok(tables.accounts.values().find(|a| a.id == id).cloned())
    }

    async fn create_account(&self, account: &Account) -> Result<()> {
        ensure!(
            account.balance >= 0,
            "Refusing to create {} with a negative balance",
            account.username
        );
        let mut tables = self.inner.tables.write().await;
        if tables.accounts.contains_key(&account.username) {
            return Err(DuplicateAccount(account.username.clone()).into());
        }
        tables
            .accounts
            .insert(account.username.clone(), account.clone());
        Ok(())
    }

    async fn list_accounts(&self) -> Result<Vec<Account>> {
        let tables = self.inner.tables.read().await;
        Ok(tables.accounts.values().cloned().collect())
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn get_item(&self, name: &str) -> Result<Option<CatalogItem>> {
        let tables = self.inner.tables.read().await;
        Ok(tables.items.get(name).cloned())
    }

    async fn put_item(&self, item: &CatalogItem) -> Result<()> {
        let mut tables = self.inner.tables.write().await;
        tables.items.insert(item.name.clone(), item.clone());
        Ok(())
    }

    async fn list_items(&self) -> Result<Vec<CatalogItem>> {
        let tables = self.inner.tables.read().await;
        Ok(tables.items.values().cloned().collect())
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn list_purchases(&self, buyer: AccountId) -> Result<Vec<PurchaseRecord>> {
        let tables = self.inner.tables.read().await;
        Ok(tables
            .purchases
            .iter()
            .filter(|p| p.buyer == buyer)
            .cloned()
            .collect())
    }

    async fn list_transfers(&self, account: AccountId) -> Result<Vec<TransferRecord>> {
        let tables = self.inner.tables.read().await;
        Ok(tables
            .transfers
            .iter()
            .filter(|t| t.involves(account))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    type Scope = InMemoryScope;

    async fn begin(&self) -> Result<InMemoryScope> {
        self.trip(FailPoint::Begin).await?;
        Ok(InMemoryScope {
            store: self.clone(),
            held: HashMap::new(),
            accounts: HashMap::new(),
            purchases: Vec::new(),
            transfers: Vec::new(),
        })
    }
}

/// Staged writes plus the row locks that protect them.
pub struct InMemoryScope {
    store: InMemoryStore,
    held: HashMap<String, OwnedMutexGuard<()>>,
    accounts: HashMap<String, Account>,
    purchases: Vec<PurchaseRecord>,
    transfers: Vec<TransferRecord>,
}

#[async_trait]
impl LedgerScope for InMemoryScope {
    async fn lock_account(&mut self, username: &str) -> Result<Option<Account>> {
        if !self.held.contains_key(username) {
            // accounts are never deleted, so a missing one needs no lock
            if self.store.get_account(username).await?.is_none() {
                return Ok(None);
            }
            let lock = self.store.row_lock(username).await;
            let guard = lock.lock_owned().await;
            self.held.insert(username.to_string(), guard);
        }

        if let Some(staged) = self.accounts.get(username) {
            return Ok(Some(staged.clone()));
        }
        self.store.get_account(username).await
    }

    async fn get_item(&mut self, name: &str) -> Result<Option<CatalogItem>> {
        self.store.get_item(name).await
    }

    async fn save_account(&mut self, account: &Account) -> Result<()> {
        self.store.trip(FailPoint::SaveAccount).await?;
        ensure!(
            self.held.contains_key(&account.username),
            "Account {} was not locked in this scope",
            account.username
        );
        ensure!(
            account.balance >= 0,
            "Refusing to save negative balance for {}",
            account.username
        );
        if self.store.get_account(&account.username).await?.is_none() {
            bail!("Account {} does not exist", account.username);
        }

        self.accounts
            .insert(account.username.clone(), account.clone());
        Ok(())
    }

    async fn append_purchase(&mut self, record: PurchaseRecord) -> Result<PurchaseRecord> {
        self.store.trip(FailPoint::AppendPurchase).await?;
        self.purchases.push(record.clone());
        Ok(record)
    }

    async fn append_transfer(&mut self, record: TransferRecord) -> Result<TransferRecord> {
        self.store.trip(FailPoint::AppendTransfer).await?;
        self.transfers.push(record.clone());
        Ok(record)
    }

    async fn commit(mut self) -> Result<()> {
        self.store.trip(FailPoint::Commit).await?;

        let mut tables = self.store.inner.tables.write().await;
        for (username, account) in self.accounts.drain() {
            tables.accounts.insert(username, account);
        }
        tables.purchases.append(&mut self.purchases);
        tables.transfers.append(&mut self.transfers);
        // row locks in `self.held` are released when `self` drops, after the tables
        Ok(())
    }

    async fn abort(self) -> Result<()> {
        Ok(())
    }
}
