// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use coinshop::application::ShopService;
use coinshop::domain::Cents;
use coinshop::storage::{InMemoryStore, LedgerStore, SqliteStore};
use tempfile::TempDir;

/// Helper to create a test service with a temporary SQLite database
pub async fn sqlite_service() -> Result<(ShopService<SqliteStore>, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = ShopService::init(db_path.to_str().unwrap()).await?;
    Ok((service, temp_dir))
}

/// Helper to create a test service over the in-memory store
pub fn memory_service() -> ShopService<InMemoryStore> {
    ShopService::new(InMemoryStore::new())
}

/// Coins to cents: `coins(20)` is 20.00
pub fn coins(amount: i64) -> Cents {
    amount * 100
}

/// Test fixture: a small catalog and two accounts
pub struct Shop;

impl Shop {
    /// Catalog with cup (20), pen (10) and hoody (300)
    pub async fn create_catalog<S: LedgerStore>(service: &ShopService<S>) -> Result<()> {
        service.add_item("cup", coins(20)).await?;
        service.add_item("pen", coins(10)).await?;
        service.add_item("hoody", coins(300)).await?;
        Ok(())
    }

    /// Open accounts with the given balances in coins
    pub async fn open_accounts<S: LedgerStore>(
        service: &ShopService<S>,
        accounts: &[(&str, i64)],
    ) -> Result<()> {
        for (username, balance) in accounts {
            service.open_account(username, Some(coins(*balance))).await?;
        }
        Ok(())
    }

    pub async fn balance<S: LedgerStore>(service: &ShopService<S>, username: &str) -> Result<Cents> {
        Ok(service.get_account(username).await?.balance)
    }

    /// Sum of every account balance
    pub async fn total<S: LedgerStore>(service: &ShopService<S>) -> Result<Cents> {
        let accounts = service.list_accounts().await?;
        Ok(accounts.iter().map(|a| a.balance).sum())
    }
}
