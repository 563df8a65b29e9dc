use std::collections::HashMap;

use serde::Serialize;
use tracing::info;

use crate::domain::{
    coin_history, inventory, net_transfer_flow, total_spent, Account, AccountId, CatalogItem,
    Cents, CoinFlow, InventoryEntry, PurchaseRecord, TransferRecord, DEFAULT_STARTING_BALANCE,
};
use crate::storage::{DuplicateAccount, LedgerStore, SqliteStore};

use super::{LedgerEngine, LedgerError};

/// Application service providing the operations any client (CLI, HTTP layer)
/// calls with an already-authenticated username.
pub struct ShopService<S = SqliteStore> {
    engine: LedgerEngine<S>,
}

/// Coins moved to or from one named counterparty
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamedFlow {
    pub username: String,
    pub amount: Cents,
}

/// Everything a user sees about their own account
#[derive(Debug, Clone, Serialize)]
pub struct AccountInfo {
    pub account: Account,
    pub inventory: Vec<InventoryEntry>,
    pub received: Vec<NamedFlow>,
    pub sent: Vec<NamedFlow>,
    /// Coins paid for everything in `inventory`
    pub total_spent: Cents,
    /// Coins received minus coins sent
    pub net_transfers: Cents,
}

impl ShopService<SqliteStore> {
    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str) -> Result<Self, LedgerError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let store = SqliteStore::init(&db_url).await?;
        Ok(Self::new(store))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str) -> Result<Self, LedgerError> {
        let db_url = format!("sqlite:{}", database_path);
        let store = SqliteStore::connect(&db_url).await?;
        Ok(Self::new(store))
    }
}

impl<S: LedgerStore> ShopService<S> {
    pub fn new(store: S) -> Self {
        Self {
            engine: LedgerEngine::new(store),
        }
    }

    pub fn engine(&self) -> &LedgerEngine<S> {
        &self.engine
    }

    fn store(&self) -> &S {
        self.engine.store()
    }

    // ========================
    // Account operations
    // ========================

    /// Register a new account. `starting_balance` defaults to
    /// [`DEFAULT_STARTING_BALANCE`].
    pub async fn open_account(
        &self,
        username: &str,
        starting_balance: Option<Cents>,
    ) -> Result<Account, LedgerError> {
        if username.is_empty() {
            return Err(LedgerError::InvalidName("username must not be empty"));
        }
        let balance = starting_balance.unwrap_or(DEFAULT_STARTING_BALANCE);
        if balance < 0 {
            return Err(LedgerError::InvalidAmount {
                amount: balance,
                reason: "starting balance must not be negative",
            });
        }
        if self.store().get_account(username).await?.is_some() {
            return Err(LedgerError::AccountAlreadyExists(username.to_string()));
        }

        let account = Account::new(username, balance);
        match self.store().create_account(&account).await {
            Ok(()) => {}
            // lost a race with a concurrent registration of the same name
            Err(err) if err.is::<DuplicateAccount>() => {
                return Err(LedgerError::AccountAlreadyExists(username.to_string()));
            }
            Err(err) => return Err(err.into()),
        }
        info!(username, balance, "account opened");
        Ok(account)
    }

    pub async fn get_account(&self, username: &str) -> Result<Account, LedgerError> {
        self.engine.require_account(username).await
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>, LedgerError> {
        Ok(self.store().list_accounts().await?)
    }

    // ========================
    // Catalog operations
    // ========================

    /// Add an item to the catalog, or change its price.
    pub async fn add_item(&self, name: &str, price: Cents) -> Result<CatalogItem, LedgerError> {
        if name.is_empty() {
            return Err(LedgerError::InvalidName("item name must not be empty"));
        }
        if price < 0 {
            return Err(LedgerError::InvalidAmount {
                amount: price,
                reason: "price must not be negative",
            });
        }

        let item = CatalogItem::new(name, price);
        self.store().put_item(&item).await?;
        Ok(item)
    }

    pub async fn catalog(&self) -> Result<Vec<CatalogItem>, LedgerError> {
        Ok(self.store().list_items().await?)
    }

    // ========================
    // Ledger operations
    // ========================

    pub async fn buy(&self, username: &str, item_name: &str) -> Result<PurchaseRecord, LedgerError> {
        self.engine.purchase(username, item_name).await
    }

    /// Send coins from `sender` to `receiver`.
    pub async fn send_coins(
        &self,
        sender: &str,
        receiver: &str,
        amount: Cents,
    ) -> Result<TransferRecord, LedgerError> {
        self.engine.transfer(receiver, sender, amount).await
    }

    pub async fn purchases(&self, username: &str) -> Result<Vec<PurchaseRecord>, LedgerError> {
        self.engine.list_purchases(username).await
    }

    pub async fn transfers(&self, username: &str) -> Result<Vec<TransferRecord>, LedgerError> {
        self.engine.list_transfers(username).await
    }

    /// Balance, inventory and coin history of one account.
    pub async fn account_info(&self, username: &str) -> Result<AccountInfo, LedgerError> {
        let account = self.engine.require_account(username).await?;
        let purchases = self.store().list_purchases(account.id).await?;
        let transfers = self.store().list_transfers(account.id).await?;
        let history = coin_history(account.id, &transfers);

        let names = self.get_account_names(&transfers).await?;
        let name_flows = |flows: Vec<CoinFlow>| {
            flows
                .into_iter()
                .map(|flow| NamedFlow {
                    username: names
                        .get(&flow.counterparty)
                        .cloned()
                        .unwrap_or_else(|| flow.counterparty.to_string()),
                    amount: flow.amount,
                })
                .collect::<Vec<_>>()
        };

        Ok(AccountInfo {
            inventory: inventory(&purchases),
            total_spent: total_spent(&purchases),
            net_transfers: net_transfer_flow(account.id, &transfers),
            received: name_flows(history.received),
            sent: name_flows(history.sent),
            account,
        })
    }

    /// Usernames of every account referenced by `transfers`.
    pub async fn get_account_names(
        &self,
        transfers: &[TransferRecord],
    ) -> Result<HashMap<AccountId, String>, LedgerError> {
        let mut names = HashMap::new();
        for transfer in transfers {
            for id in [transfer.sender, transfer.receiver] {
                if names.contains_key(&id) {
                    continue;
                }
                if let Some(account) = self.store().get_account_by_id(id).await? {
                    names.insert(id, account.username);
                }
            }
        }
        Ok(names)
    }
}
