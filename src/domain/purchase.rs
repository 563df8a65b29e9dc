use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, CatalogItem, Cents};

pub type PurchaseId = Uuid;

/// A committed purchase of a catalog item. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    pub id: PurchaseId,
    pub buyer: AccountId,
    pub item: String,
    /// Price paid at purchase time, so later catalog changes don't rewrite history
    pub price: Cents,
    pub created_at: DateTime<Utc>,
}

impl PurchaseRecord {
    pub fn new(buyer: AccountId, item: &CatalogItem) -> Self {
        Self {
            id: Uuid::new_v4(),
            buyer,
            item: item.name.clone(),
            price: item.price,
            created_at: Utc::now(),
        }
    }
}
