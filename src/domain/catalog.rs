use serde::{Deserialize, Serialize};

use super::Cents;

/// Something an account can buy. Read-only from the ledger's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    /// Unique item name, e.g. "cup"
    pub name: String,
    /// Price in cents
    pub price: Cents,
}

impl CatalogItem {
    pub fn new(name: impl Into<String>, price: Cents) -> Self {
        Self {
            name: name.into(),
            price,
        }
    }
}
