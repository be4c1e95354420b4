//! Error definitions for the pool engine.
//!
//! Every fallible operation in this crate reports one of these kinds. Each
//! variant carries a stable numeric code so clients can match on failures
//! programmatically regardless of how the message text evolves.

use thiserror::Error;

/// Failure modes of the pool engine.
///
/// Validation and state errors surface at the API boundary as atomic failure
/// of the whole operation: no tokens move and no tick, position or fee state
/// is written. Arithmetic errors from the inner math propagate unchanged.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// The fee rate is zero or exceeds the parts-per-million scale, or the
    /// tick spacing is zero.
    #[error("invalid fee rate or tick spacing")]
    InvalidFee,

    /// A sqrt price is outside `[MIN_SQRT_RATIO, MAX_SQRT_RATIO]`.
    #[error("sqrt price is out of range")]
    InvalidSqrtPrice,

    /// The lower tick of a range is not strictly below the upper tick.
    #[error("the provided tick range is invalid")]
    InvalidTickRange,

    /// A position boundary is not a multiple of the pool's tick spacing.
    #[error("tick is not aligned to the tick spacing")]
    TickNotAligned,

    /// A tick index is outside `[MIN_TICK, MAX_TICK]`.
    #[error("tick is out of range")]
    TickOutOfRange,

    /// A sqrt price passed to tick conversion is outside the representable
    /// price domain.
    #[error("price is out of range")]
    PriceOutOfRange,

    /// An operation was given a zero amount where a positive one is required.
    #[error("amount must be non-zero")]
    ZeroAmount,

    /// The swap price limit is on the wrong side of the current price, or
    /// outside the price domain.
    #[error("invalid price limit for swap direction")]
    InvalidPriceLimit,

    /// The position handle references a different pool.
    #[error("position handle does not belong to this pool")]
    NftWrongPool,

    /// The position does not exist, or is not in the required lifecycle
    /// state (e.g. burn of a position that still has liquidity or owed
    /// tokens).
    #[error("invalid position")]
    InvalidPosition,

    /// The caller does not own the position it is operating on.
    #[error("unauthorized access attempted")]
    Unauthorized,

    /// A 256-bit arithmetic result does not fit its destination width.
    #[error("arithmetic overflow")]
    Overflow,

    /// A division with a zero denominator.
    #[error("division by zero")]
    DivByZero,

    /// A signed liquidity delta would drive a liquidity value below zero.
    #[error("liquidity would become negative")]
    NegativeLiquidity,

    /// Not enough liquidity to satisfy the operation: swaps against an
    /// empty pool, or burns exceeding the recorded gross liquidity.
    #[error("insufficient liquidity available")]
    InsufficientLiquidity,

    /// The supplied payment does not cover the amounts a mint requires, or
    /// an amount-denominated mint produced less than the caller's minimum.
    #[error("insufficient payment for requested liquidity")]
    InsufficientPayment,

    /// A tick that was expected to be initialized is missing.
    #[error("tick not found")]
    TickNotFound,

    /// A computed transfer would underflow the pool reserves.
    #[error("invalid amount for pool reserves")]
    InvalidAmount,
}

impl ErrorCode {
    /// Stable numeric code for programmatic handling across versions.
    pub fn code(&self) -> u32 {
        match self {
            ErrorCode::InvalidFee => 1,
            ErrorCode::InvalidSqrtPrice => 2,
            ErrorCode::InvalidTickRange => 3,
            ErrorCode::TickNotAligned => 4,
            ErrorCode::TickOutOfRange => 5,
            ErrorCode::PriceOutOfRange => 6,
            ErrorCode::ZeroAmount => 7,
            ErrorCode::InvalidPriceLimit => 8,
            ErrorCode::NftWrongPool => 9,
            ErrorCode::InvalidPosition => 10,
            ErrorCode::Unauthorized => 11,
            ErrorCode::Overflow => 12,
            ErrorCode::DivByZero => 13,
            ErrorCode::NegativeLiquidity => 14,
            ErrorCode::InsufficientLiquidity => 15,
            ErrorCode::InsufficientPayment => 16,
            ErrorCode::TickNotFound => 17,
            ErrorCode::InvalidAmount => 18,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, ErrorCode>;
