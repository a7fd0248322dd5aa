// src/strategies/mod.rs
pub mod ladder;

pub use ladder::{next_trigger, StopLossLadder};
