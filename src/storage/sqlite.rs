use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail, ensure};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::domain::{Account, AccountId, CatalogItem, PurchaseRecord, TransferRecord};

use super::{
    AccountStore, CatalogStore, DuplicateAccount, LedgerScope, LedgerStore, RecordStore, SCHEMA,
};

/// How long a scope waits for another scope's write lock before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const ACCOUNT_COLUMNS: &str = "id, username, balance_cents, created_at";

/// SQLite-backed ledger storage.
///
/// Each [`SqliteScope`] is one SQL transaction. SQLite locks the whole
/// database for writing, so the first `lock_account` in a scope serializes it
/// against every other writing scope.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new store with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database URL such as `sqlite:coinshop.db?mode=rwc`.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database URL: {}", database_url))?
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes that don't exist yet.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .context("Failed to apply schema")?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let store = Self::connect(database_url).await?;
        store.migrate().await?;
        Ok(store)
    }

    fn row_to_account(row: &SqliteRow) -> Result<Account> {
        let id_str: String = row.get("id");
        let created_at_str: String = row.get("created_at");

        Ok(Account {
            id: Uuid::parse_str(&id_str).context("Invalid account ID")?,
            username: row.get("username"),
            balance: row.get("balance_cents"),
            created_at: parse_timestamp(&created_at_str)?,
        })
    }

    fn row_to_item(row: &SqliteRow) -> CatalogItem {
        CatalogItem {
            name: row.get("name"),
            price: row.get("price_cents"),
        }
    }

    fn row_to_purchase(row: &SqliteRow) -> Result<PurchaseRecord> {
        let id_str: String = row.get("id");
        let buyer_str: String = row.get("buyer_id");
        let created_at_str: String = row.get("created_at");

        Ok(PurchaseRecord {
            id: Uuid::parse_str(&id_str).context("Invalid purchase ID")?,
            buyer: Uuid::parse_str(&buyer_str).context("Invalid buyer ID")?,
            item: row.get("item_name"),
            price: row.get("price_cents"),
            created_at: parse_timestamp(&created_at_str)?,
        })
    }

    fn row_to_transfer(row: &SqliteRow) -> Result<TransferRecord> {
        let id_str: String = row.get("id");
        let sender_str: String = row.get("sender_id");
        let receiver_str: String = row.get("receiver_id");
        let created_at_str: String = row.get("created_at");

        Ok(TransferRecord {
            id: Uuid::parse_str(&id_str).context("Invalid transfer ID")?,
            sender: Uuid::parse_str(&sender_str).context("Invalid sender ID")?,
            receiver: Uuid::parse_str(&receiver_str).context("Invalid receiver ID")?,
            amount: row.get("amount_cents"),
            created_at: parse_timestamp(&created_at_str)?,
        })
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .context("Invalid timestamp")?
        .with_timezone(&Utc))
}

#[async_trait]
impl AccountStore for SqliteStore {
    async fn get_account(&self, username: &str) -> Result<Option<Account>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM accounts WHERE username = ?",
            ACCOUNT_COLUMNS
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch account")?;

        row.as_ref().map(Self::row_to_account).transpose()
    }

    async fn get_account_by_id(&self, id: AccountId) -> Result<Option<Account>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM accounts WHERE id = ?",
            ACCOUNT_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch account by ID")?;

        row.as_ref().map(Self::row_to_account).transpose()
    }

    async fn create_account(&self, account: &Account) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO accounts (id, username, balance_cents, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(account.id.to_string())
        .bind(&account.username)
        .bind(account.balance)
        .bind(account.created_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(DuplicateAccount(account.username.clone()).into())
            }
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("Failed to create account {}", account.username))),
        }
    }

    async fn list_accounts(&self) -> Result<Vec<Account>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM accounts ORDER BY username",
            ACCOUNT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list accounts")?;

        rows.iter().map(Self::row_to_account).collect()
    }
}

#[async_trait]
impl CatalogStore for SqliteStore {
    async fn get_item(&self, name: &str) -> Result<Option<CatalogItem>> {
        let row = sqlx::query("SELECT name, price_cents FROM catalog_items WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch catalog item")?;

        Ok(row.as_ref().map(Self::row_to_item))
    }

    async fn put_item(&self, item: &CatalogItem) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO catalog_items (name, price_cents)
            VALUES (?, ?)
            ON CONFLICT (name) DO UPDATE SET price_cents = excluded.price_cents
            "#,
        )
        .bind(&item.name)
        .bind(item.price)
        .execute(&self.pool)
        .await
        .context("Failed to save catalog item")?;
        Ok(())
    }

    async fn list_items(&self) -> Result<Vec<CatalogItem>> {
        let rows = sqlx::query("SELECT name, price_cents FROM catalog_items ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list catalog items")?;

        Ok(rows.iter().map(Self::row_to_item).collect())
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn list_purchases(&self, buyer: AccountId) -> Result<Vec<PurchaseRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, buyer_id, item_name, price_cents, created_at
            FROM purchases
            WHERE buyer_id = ?
            ORDER BY rowid
            "#,
        )
        .bind(buyer.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list purchases")?;

        rows.iter().map(Self::row_to_purchase).collect()
    }

    async fn list_transfers(&self, account: AccountId) -> Result<Vec<TransferRecord>> {
        let account_str = account.to_string();
        let rows = sqlx::query(
            r#"
            SELECT id, sender_id, receiver_id, amount_cents, created_at
            FROM transfers
            WHERE sender_id = ? OR receiver_id = ?
            ORDER BY rowid
            "#,
        )
        .bind(&account_str)
        .bind(&account_str)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list transfers")?;

        rows.iter().map(Self::row_to_transfer).collect()
    }
}

#[async_trait]
impl LedgerStore for SqliteStore {
    type Scope = SqliteScope;

    async fn begin(&self) -> Result<SqliteScope> {
        let tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;
        Ok(SqliteScope { tx })
    }
}

/// A SQL transaction. Rolled back by sqlx if dropped before `commit`.
pub struct SqliteScope {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl LedgerScope for SqliteScope {
    async fn lock_account(&mut self, username: &str) -> Result<Option<Account>> {
        // A no-op write takes SQLite's write lock before anything is read, so
        // two scopes can never both read a balance and then race to write it.
        let row = sqlx::query(&format!(
            "UPDATE accounts SET balance_cents = balance_cents WHERE username = ? RETURNING {}",
            ACCOUNT_COLUMNS
        ))
        .bind(username)
        .fetch_optional(&mut *self.tx)
        .await
        .context("Failed to lock account")?;

        debug!(username, found = row.is_some(), "account locked");
        row.as_ref().map(SqliteStore::row_to_account).transpose()
    }

    async fn get_item(&mut self, name: &str) -> Result<Option<CatalogItem>> {
        let row = sqlx::query("SELECT name, price_cents FROM catalog_items WHERE name = ?")
            .bind(name)
            .fetch_optional(&mut *self.tx)
            .await
            .context("Failed to fetch catalog item")?;

        Ok(row.as_ref().map(SqliteStore::row_to_item))
    }

    async fn save_account(&mut self, account: &Account) -> Result<()> {
        ensure!(
            account.balance >= 0,
            "Refusing to save negative balance for {}",
            account.username
        );

        let result = sqlx::query("UPDATE accounts SET balance_cents = ? WHERE id = ?")
            .bind(account.balance)
            .bind(account.id.to_string())
            .execute(&mut *self.tx)
            .await
            .context("Failed to save account")?;

        if result.rows_affected() != 1 {
            bail!("Account {} does not exist", account.username);
        }
        Ok(())
    }

    async fn append_purchase(&mut self, record: PurchaseRecord) -> Result<PurchaseRecord> {
        sqlx::query(
            r#"
            INSERT INTO purchases (id, buyer_id, item_name, price_cents, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.buyer.to_string())
        .bind(&record.item)
        .bind(record.price)
        .bind(record.created_at.to_rfc3339())
        .execute(&mut *self.tx)
        .await
        .context("Failed to append purchase")?;
        Ok(record)
    }

    async fn append_transfer(&mut self, record: TransferRecord) -> Result<TransferRecord> {
        sqlx::query(
            r#"
            INSERT INTO transfers (id, sender_id, receiver_id, amount_cents, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.sender.to_string())
        .bind(record.receiver.to_string())
        .bind(record.amount)
        .bind(record.created_at.to_rfc3339())
        .execute(&mut *self.tx)
        .await
        .context("Failed to append transfer")?;
        Ok(record)
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await.context("Failed to commit transaction")
    }

    async fn abort(self) -> Result<()> {
        self.tx
            .rollback()
            .await
            .context("Failed to roll back transaction")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn temp_store() -> Result<(SqliteStore, TempDir)> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("store.db");
        let store = SqliteStore::init(&format!("sqlite:{}?mode=rwc", path.display())).await?;
        Ok((store, temp_dir))
    }

    #[tokio::test]
    async fn test_account_roundtrip() -> Result<()> {
        let (store, _temp) = temp_store().await?;
        let account = Account::new("alice", 10000);
        store.create_account(&account).await?;

        let by_name = store.get_account("alice").await?.unwrap();
        let by_id = store.get_account_by_id(account.id).await?.unwrap();
        assert_eq!(by_name.id, account.id);
        assert_eq!(by_id.balance, 10000);
        assert!(store.get_account("ghost").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() -> Result<()> {
        let (store, _temp) = temp_store().await?;
        store.create_account(&Account::new("alice", 0)).await?;

        let err = store
            .create_account(&Account::new("alice", 0))
            .await
            .unwrap_err();
        assert!(err.is::<DuplicateAccount>());
        Ok(())
    }

    #[tokio::test]
    async fn test_put_item_replaces_price() -> Result<()> {
        let (store, _temp) = temp_store().await?;
        store.put_item(&CatalogItem::new("cup", 2000)).await?;
        store.put_item(&CatalogItem::new("cup", 2500)).await?;

        let items = store.list_items().await?;
        assert_eq!(items, vec![CatalogItem::new("cup", 2500)]);
        Ok(())
    }

    #[tokio::test]
    async fn test_dropped_scope_rolls_back() -> Result<()> {
        let (store, _temp) = temp_store().await?;
        store.create_account(&Account::new("alice", 10000)).await?;

        {
            let mut scope = store.begin().await?;
            let mut alice = scope.lock_account("alice").await?.unwrap();
            alice.balance = 1;
            scope.save_account(&alice).await?;
        }

        let alice = store.get_account("alice").await?.unwrap();
        assert_eq!(alice.balance, 10000);
        Ok(())
    }

    #[tokio::test]
    async fn test_commit_makes_writes_visible() -> Result<()> {
        let (store, _temp) = temp_store().await?;
        let account = Account::new("alice", 10000);
        store.create_account(&account).await?;
        store.put_item(&CatalogItem::new("cup", 2000)).await?;

        let mut scope = store.begin().await?;
        let mut alice = scope.lock_account("alice").await?.unwrap();
        let cup = scope.get_item("cup").await?.unwrap();
        alice.balance -= cup.price;
        scope.save_account(&alice).await?;
        scope
            .append_purchase(PurchaseRecord::new(alice.id, &cup))
            .await?;
        scope.commit().await?;

        assert_eq!(store.get_account("alice").await?.unwrap().balance, 8000);
        assert_eq!(store.list_purchases(account.id).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_append_after_save_rolls_back_purchase() -> Result<()> {
        let (store, _temp) = temp_store().await?;
        let account = Account::new("alice", 10000);
        store.create_account(&account).await?;

        let mut scope = store.begin().await?;
        let mut alice = scope.lock_account("alice").await?.unwrap();
        alice.balance -= 2000;
        scope.save_account(&alice).await?;
        // not in the catalog, so the foreign key rejects the insert
        let unlisted = CatalogItem::new("umbrella", 2000);
        assert!(
            scope
                .append_purchase(PurchaseRecord::new(alice.id, &unlisted))
                .await
                .is_err()
        );
        scope.abort().await?;

        assert_eq!(store.get_account("alice").await?.unwrap().balance, 10000);
        assert!(store.list_purchases(account.id).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_append_after_both_saves_rolls_back_transfer() -> Result<()> {
        let (store, _temp) = temp_store().await?;
        let alice = Account::new("alice", 10000);
        let bob = Account::new("bob", 5000);
        store.create_account(&alice).await?;
        store.create_account(&bob).await?;

        let mut scope = store.begin().await?;
        let mut from = scope.lock_account("alice").await?.unwrap();
        let mut to = scope.lock_account("bob").await?.unwrap();
        from.balance -= 3000;
        to.balance += 3000;
        scope.save_account(&from).await?;
        scope.save_account(&to).await?;
        // amount_cents > 0 is enforced by the schema
        assert!(
            scope
                .append_transfer(TransferRecord::new(from.id, to.id, 0))
                .await
                .is_err()
        );
        scope.abort().await?;

        assert_eq!(store.get_account("alice").await?.unwrap().balance, 10000);
        assert_eq!(store.get_account("bob").await?.unwrap().balance, 5000);
        assert!(store.list_transfers(alice.id).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_negative_balance_never_saved() -> Result<()> {
        let (store, _temp) = temp_store().await?;
        store.create_account(&Account::new("alice", 100)).await?;

        let mut scope = store.begin().await?;
        let mut alice = scope.lock_account("alice").await?.unwrap();
        alice.balance = -1;
        assert!(scope.save_account(&alice).await.is_err());
        scope.abort().await?;

        assert_eq!(store.get_account("alice").await?.unwrap().balance, 100);
        Ok(())
    }
}
