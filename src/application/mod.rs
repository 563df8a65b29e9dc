// Application layer: the ledger engine and the service facade over it.

mod engine;
mod error;
mod service;

pub use engine::*;
pub use error::*;
pub use service::*;
