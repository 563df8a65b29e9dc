use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;

use crate::application::ShopService;
use crate::domain::{Account, AccountId, PurchaseRecord, TransferRecord, format_cents};
use crate::storage::LedgerStore;

/// One account's full history, as exported to JSON
#[derive(Debug, Clone, Serialize)]
pub struct AccountHistory {
    pub exported_at: DateTime<Utc>,
    pub account: Account,
    pub purchases: Vec<PurchaseRecord>,
    pub transfers: Vec<TransferRecord>,
}

/// Exporter for writing an account's ledger records to CSV or JSON
pub struct Exporter<'a, S> {
    service: &'a ShopService<S>,
}

impl<'a, S: LedgerStore> Exporter<'a, S> {
    pub fn new(service: &'a ShopService<S>) -> Self {
        Self { service }
    }

    /// Export an account's purchases to CSV format
    pub async fn export_purchases_csv<W: Write>(&self, username: &str, writer: W) -> Result<usize> {
        let purchases = self.service.purchases(username).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["id", "created_at", "item", "price"])?;

        for purchase in &purchases {
            csv_writer.write_record([
                purchase.id.to_string(),
                purchase.created_at.to_rfc3339(),
                purchase.item.clone(),
                format_cents(purchase.price),
            ])?;
        }

        csv_writer.flush()?;
        Ok(purchases.len())
    }

    /// Export an account's transfers to CSV format, with counterparties by name
    pub async fn export_transfers_csv<W: Write>(&self, username: &str, writer: W) -> Result<usize> {
        let transfers = self.service.transfers(username).await?;
        let names = self.service.get_account_names(&transfers).await?;
        let name_of = |id: AccountId| {
            names
                .get(&id)
                .cloned()
                .unwrap_or_else(|| id.to_string())
        };
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["id", "created_at", "sender", "receiver", "amount"])?;

        for transfer in &transfers {
            csv_writer.write_record([
                transfer.id.to_string(),
                transfer.created_at.to_rfc3339(),
                name_of(transfer.sender),
                name_of(transfer.receiver),
                format_cents(transfer.amount),
            ])?;
        }

        csv_writer.flush()?;
        Ok(transfers.len())
    }

    /// Export an account and all of its records as pretty-printed JSON
    pub async fn export_history_json<W: Write>(&self, username: &str, writer: W) -> Result<()> {
        let history = AccountHistory {
            exported_at: Utc::now(),
            account: self.service.get_account(username).await?,
            purchases: self.service.purchases(username).await?,
            transfers: self.service.transfers(username).await?,
        };
        serde_json::to_writer_pretty(writer, &history)?;
        Ok(())
    }
}
