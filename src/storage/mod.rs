// src/storage/mod.rs
pub mod ledger;

pub use ledger::{JsonlLedger, MemoryLedger, OrderLedger};
