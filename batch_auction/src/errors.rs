//! Error definitions for the batch auction.

use amm_core::ErrorCode;
use thiserror::Error;

/// Failure modes of the auction house.
///
/// A failed call leaves the order table and escrow balances untouched.
/// Note that order-level arithmetic trouble during batch execution is not
/// an error: a validity evaluation that overflows marks that order invalid
/// instead of aborting the batch.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuctionError {
    /// The referenced order does not exist in the current batch.
    #[error("order not found")]
    OrderNotFound,

    /// The caller does not own the order.
    #[error("unauthorized access attempted")]
    Unauthorized,

    /// The batch window has elapsed; no further orders are accepted until
    /// the batch is executed.
    #[error("auction window has expired")]
    AuctionExpired,

    /// The batch window is still open; execution must wait for it to
    /// elapse.
    #[error("auction window is still active")]
    AuctionNotActive,

    /// The escrowed balance cannot absorb this order.
    #[error("order size exceeds escrow capacity")]
    BidTooHigh,

    /// An order amount must be non-zero.
    #[error("amount must be non-zero")]
    ZeroAmount,

    /// The pool handed to `execute_batch` is not the pool this auction
    /// clears against.
    #[error("pool does not match this auction")]
    WrongPool,

    /// A pool-engine failure surfaced outside per-order validity
    /// evaluation.
    #[error("pool error: {0}")]
    Pool(#[from] ErrorCode),
}

impl AuctionError {
    /// Stable numeric code for programmatic handling.
    pub fn code(&self) -> u32 {
        match self {
            AuctionError::OrderNotFound => 101,
            AuctionError::Unauthorized => 102,
            AuctionError::AuctionExpired => 103,
            AuctionError::AuctionNotActive => 104,
            AuctionError::BidTooHigh => 105,
            AuctionError::ZeroAmount => 106,
            AuctionError::WrongPool => 107,
            AuctionError::Pool(inner) => 200 + inner.code(),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, AuctionError>;
