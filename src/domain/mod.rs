mod account;
mod catalog;
mod ledger;
mod money;
mod purchase;
mod transfer;

pub use account::*;
pub use catalog::*;
pub use ledger::*;
pub use money::*;
pub use purchase::*;
pub use transfer::*;
