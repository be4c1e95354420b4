//! Order records held by the auction house.

use amm_core::OwnerId;
use serde::{Deserialize, Serialize};

/// One escrowed limit order awaiting batch execution.
///
/// A bid sells token0 for token1; an ask sells token1 for token0. The
/// limit is expressed as the minimum acceptable output: the order is
/// filled only when the batch's uniform clearing price turns its full
/// input into at least `min_amount_out`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Dense identifier within the auction house.
    pub id: u64,
    /// The account that placed (and escrowed) the order.
    pub owner: OwnerId,
    /// Escrowed input amount.
    pub amount_in: u64,
    /// Minimum output the owner will accept at the clearing price.
    pub min_amount_out: u64,
    /// True when selling token0 for token1.
    pub is_bid: bool,
    /// Placement time in milliseconds.
    pub placed_at_ms: u64,
}
