// src/lib.rs
//! Opens leveraged positions on request and follows each one with a
//! ratcheting stop-loss until it is closed.
pub mod config;
pub mod connectors;
pub mod core;
pub mod error;
pub mod storage;
pub mod strategies;
pub mod types;
pub mod utils;
