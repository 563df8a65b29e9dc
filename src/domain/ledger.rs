use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{AccountId, Cents, PurchaseRecord, TransferRecord};

/// How many of one catalog item an account owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEntry {
    pub item: String,
    pub quantity: u64,
}

/// Total coins moved between an account and one counterparty, in one direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinFlow {
    pub counterparty: AccountId,
    pub amount: Cents,
}

/// Coins received and sent by one account, grouped by counterparty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinHistory {
    pub received: Vec<CoinFlow>,
    pub sent: Vec<CoinFlow>,
}

/// Group purchases by item name. Entries come back sorted by item.
pub fn inventory(purchases: &[PurchaseRecord]) -> Vec<InventoryEntry> {
    let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
    for purchase in purchases {
        *counts.entry(purchase.item.as_str()).or_insert(0) += 1;
    }

    counts
        .into_iter()
        .map(|(item, quantity)| InventoryEntry {
            item: item.to_string(),
            quantity,
        })
        .collect()
}

/// Sum transfers touching `account` per counterparty.
/// A self-transfer shows up on both sides.
pub fn coin_history(account: AccountId, transfers: &[TransferRecord]) -> CoinHistory {
    let mut received: BTreeMap<AccountId, Cents> = BTreeMap::new();
    let mut sent: BTreeMap<AccountId, Cents> = BTreeMap::new();

    for transfer in transfers {
        if transfer.receiver == account {
            *received.entry(transfer.sender).or_insert(0) += transfer.amount;
        }
        if transfer.sender == account {
            *sent.entry(transfer.receiver).or_insert(0) += transfer.amount;
        }
    }

    let flatten = |map: BTreeMap<AccountId, Cents>| {
        map.into_iter()
            .map(|(counterparty, amount)| CoinFlow {
                counterparty,
                amount,
            })
            .collect()
    };

    CoinHistory {
        received: flatten(received),
        sent: flatten(sent),
    }
}

/// Net effect of transfers on an account: incoming minus outgoing.
pub fn net_transfer_flow(account: AccountId, transfers: &[TransferRecord]) -> Cents {
    transfers.iter().fold(0, |mut net, transfer| {
        if transfer.receiver == account {
            net += transfer.amount;
        }
        if transfer.sender == account {
            net -= transfer.amount;
        }
        net
    })
}

/// Total spent on purchases.
pub fn total_spent(purchases: &[PurchaseRecord]) -> Cents {
    purchases.iter().map(|p| p.price).sum()
}
