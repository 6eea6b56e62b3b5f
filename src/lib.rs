//! Watches a node's mempool for transactions sent to one contract and can
//! re-send any of them at double the gas price.

pub mod config;
pub mod console;
pub mod contracts;
pub mod decoder;
pub mod error;
pub mod filter;
pub mod mempool;
pub mod node;
pub mod relay;
pub mod session;
pub mod store;
pub mod types;

#[cfg(test)]
mod testing;
