//! Batch auction over a concentrated liquidity pool.
//!
//! Limit orders in both directions are escrowed over a window and cleared
//! together at one uniform price. Matched flow settles peer to peer; only
//! the net surplus between the sides touches the pool, in a single swap.
//! Orders that miss their limit at the clearing price are refunded in
//! full.

pub mod auction;
pub mod errors;
pub mod order;

#[cfg(test)]
mod unit_test;

pub use auction::{AuctionHouse, ClearingConfig, Fill, PoolTrade, Refund, Settlement};
pub use errors::{AuctionError, Result};
pub use order::Order;
