//! Fixed-point and liquidity math.
//!
//! This module implements the arithmetic core of the engine: 256-bit
//! mul-div with 512-bit intermediates, conversions between liquidity and
//! token amounts over a sqrt-price interval, the next-sqrt-price solvers,
//! and the swap-step function that advances a swap across one tick
//! interval.
//!
//! Conventions: sqrt prices are Q64.96 (`sqrt_price * 2^96`) held in
//! `U256`; fee growth is Q128.128; fees are parts per million. Every
//! rounding decision is pessimistic for the trader so the pool can never
//! pay out more than it takes in.

use crate::constants::{FEE_RATE_DENOMINATOR, Q96};
use crate::errors::{ErrorCode, Result};
use primitive_types::{U256, U512};

/// Narrows a 512-bit value back to 256 bits, failing on overflow.
fn u512_to_u256(x: U512) -> Result<U256> {
    if x.bits() > 256 {
        return Err(ErrorCode::Overflow);
    }
    let mut limbs = [0u64; 4];
    limbs.copy_from_slice(&x.0[..4]);
    Ok(U256(limbs))
}

/// Computes `floor(a * b / denominator)` with a 512-bit intermediate.
///
/// Fails with [`ErrorCode::DivByZero`] when `denominator` is zero and
/// [`ErrorCode::Overflow`] when the quotient does not fit in 256 bits.
pub fn mul_div(a: U256, b: U256, denominator: U256) -> Result<U256> {
    if denominator.is_zero() {
        return Err(ErrorCode::DivByZero);
    }
    let product = a.full_mul(b);
    u512_to_u256(product / U512::from(denominator))
}

/// Computes `ceil(a * b / denominator)` with a 512-bit intermediate.
pub fn mul_div_rounding_up(a: U256, b: U256, denominator: U256) -> Result<U256> {
    if denominator.is_zero() {
        return Err(ErrorCode::DivByZero);
    }
    let product = a.full_mul(b);
    let denominator = U512::from(denominator);
    let quotient = product / denominator;
    let quotient = if (product % denominator).is_zero() {
        quotient
    } else {
        quotient + U512::from(1u8)
    };
    u512_to_u256(quotient)
}

/// Computes `ceil(numerator / denominator)` on 256-bit values.
pub fn div_rounding_up(numerator: U256, denominator: U256) -> Result<U256> {
    if denominator.is_zero() {
        return Err(ErrorCode::DivByZero);
    }
    let quotient = numerator / denominator;
    if (numerator % denominator).is_zero() {
        Ok(quotient)
    } else {
        quotient.checked_add(U256::one()).ok_or(ErrorCode::Overflow)
    }
}

/// Mathematical floor division of a signed tick by a positive divisor.
///
/// `floor_div(-1000, 60)` is `-17`, not the `-16` that truncating division
/// would produce. The tick bitmap compression depends on this.
pub fn floor_div(a: i32, b: i32) -> i32 {
    debug_assert!(b > 0);
    a.div_euclid(b)
}

/// Applies a signed liquidity delta to an unsigned liquidity value.
///
/// Fails with [`ErrorCode::Overflow`] on addition overflow and
/// [`ErrorCode::InsufficientLiquidity`] when the subtraction would
/// underflow.
pub fn add_liquidity_delta(liquidity: u128, delta: i128) -> Result<u128> {
    if delta >= 0 {
        liquidity
            .checked_add(delta as u128)
            .ok_or(ErrorCode::Overflow)
    } else {
        liquidity
            .checked_sub(delta.unsigned_abs())
            .ok_or(ErrorCode::InsufficientLiquidity)
    }
}

/// Amount of token0 spanned by `liquidity` between two sqrt prices.
///
/// Evaluates `L * (sqrt_b - sqrt_a) / (sqrt_a * sqrt_b)` after sorting the
/// bounds, rounding up when `round_up` is set (deposits) and down
/// otherwise (withdrawals).
pub fn get_amount_0_delta(
    sqrt_ratio_a: U256,
    sqrt_ratio_b: U256,
    liquidity: u128,
    round_up: bool,
) -> Result<U256> {
    let (sqrt_ratio_lower, sqrt_ratio_upper) = if sqrt_ratio_a <= sqrt_ratio_b {
        (sqrt_ratio_a, sqrt_ratio_b)
    } else {
        (sqrt_ratio_b, sqrt_ratio_a)
    };
    if sqrt_ratio_lower.is_zero() {
        return Err(ErrorCode::InvalidSqrtPrice);
    }

    let numerator_1 = U256::from(liquidity) << 96usize;
    let numerator_2 = sqrt_ratio_upper - sqrt_ratio_lower;

    if round_up {
        let quotient = mul_div_rounding_up(numerator_1, numerator_2, sqrt_ratio_upper)?;
        div_rounding_up(quotient, sqrt_ratio_lower)
    } else {
        Ok(mul_div(numerator_1, numerator_2, sqrt_ratio_upper)? / sqrt_ratio_lower)
    }
}

/// Amount of token1 spanned by `liquidity` between two sqrt prices.
///
/// Evaluates `L * (sqrt_b - sqrt_a) / 2^96` with the same rounding rule as
/// [`get_amount_0_delta`].
pub fn get_amount_1_delta(
    sqrt_ratio_a: U256,
    sqrt_ratio_b: U256,
    liquidity: u128,
    round_up: bool,
) -> Result<U256> {
    let (sqrt_ratio_lower, sqrt_ratio_upper) = if sqrt_ratio_a <= sqrt_ratio_b {
        (sqrt_ratio_a, sqrt_ratio_b)
    } else {
        (sqrt_ratio_b, sqrt_ratio_a)
    };
    let diff = sqrt_ratio_upper - sqrt_ratio_lower;

    if round_up {
        mul_div_rounding_up(U256::from(liquidity), diff, Q96)
    } else {
        mul_div(U256::from(liquidity), diff, Q96)
    }
}

/// Next sqrt price after moving `amount` of token0 in or out of the range.
///
/// `sqrt_p' = L * 2^96 * sqrt_p / (L * 2^96 ± amount * sqrt_p)`, rounded up
/// so the computed price movement never favors the trader.
fn next_sqrt_price_from_amount_0_rounding_up(
    sqrt_price: U256,
    liquidity: u128,
    amount: U256,
    add: bool,
) -> Result<U256> {
    if amount.is_zero() {
        return Ok(sqrt_price);
    }
    let numerator_1 = U512::from(U256::from(liquidity) << 96usize);
    let product = amount.full_mul(sqrt_price);

    let denominator = if add {
        numerator_1 + product
    } else {
        if product >= numerator_1 {
            // Removing this much token0 would push the price past the
            // representable domain.
            return Err(ErrorCode::InsufficientLiquidity);
        }
        numerator_1 - product
    };

    let numerator = numerator_1 * U512::from(sqrt_price);
    let quotient = numerator / denominator;
    let quotient = if (numerator % denominator).is_zero() {
        quotient
    } else {
        quotient + U512::from(1u8)
    };
    u512_to_u256(quotient)
}

/// Next sqrt price after moving `amount` of token1 in or out of the range.
///
/// `sqrt_p' = sqrt_p ± amount * 2^96 / L`; the quotient rounds down when
/// adding and up when removing, again against the trader.
fn next_sqrt_price_from_amount_1_rounding_down(
    sqrt_price: U256,
    liquidity: u128,
    amount: U256,
    add: bool,
) -> Result<U256> {
    let liquidity = U256::from(liquidity);
    if add {
        let quotient = mul_div(amount, Q96, liquidity)?;
        sqrt_price.checked_add(quotient).ok_or(ErrorCode::Overflow)
    } else {
        let quotient = mul_div_rounding_up(amount, Q96, liquidity)?;
        if sqrt_price <= quotient {
            return Err(ErrorCode::InsufficientLiquidity);
        }
        Ok(sqrt_price - quotient)
    }
}

/// Sqrt price reached after consuming `amount_in` of the input token.
pub fn get_next_sqrt_price_from_input(
    sqrt_price: U256,
    liquidity: u128,
    amount_in: U256,
    zero_for_one: bool,
) -> Result<U256> {
    if liquidity == 0 {
        return Err(ErrorCode::InsufficientLiquidity);
    }
    if sqrt_price.is_zero() {
        return Err(ErrorCode::InvalidSqrtPrice);
    }
    if zero_for_one {
        next_sqrt_price_from_amount_0_rounding_up(sqrt_price, liquidity, amount_in, true)
    } else {
        next_sqrt_price_from_amount_1_rounding_down(sqrt_price, liquidity, amount_in, true)
    }
}

/// Sqrt price reached after producing `amount_out` of the output token.
pub fn get_next_sqrt_price_from_output(
    sqrt_price: U256,
    liquidity: u128,
    amount_out: U256,
    zero_for_one: bool,
) -> Result<U256> {
    if liquidity == 0 {
        return Err(ErrorCode::InsufficientLiquidity);
    }
    if sqrt_price.is_zero() {
        return Err(ErrorCode::InvalidSqrtPrice);
    }
    if zero_for_one {
        next_sqrt_price_from_amount_1_rounding_down(sqrt_price, liquidity, amount_out, false)
    } else {
        next_sqrt_price_from_amount_0_rounding_up(sqrt_price, liquidity, amount_out, false)
    }
}

/// Result of advancing a swap across (part of) one tick interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapStep {
    /// Price after the step.
    pub sqrt_price_next: U256,
    /// Input consumed by the step, excluding the fee.
    pub amount_in: U256,
    /// Output produced by the step.
    pub amount_out: U256,
    /// Fee charged on the step's input.
    pub fee_amount: U256,
}

/// Advances the price from `sqrt_price_current` toward `sqrt_price_target`,
/// bounded by the remaining amount.
///
/// `amount_remaining >= 0` means exact-in: the value is input including the
/// fee. Negative means exact-out: its magnitude is the output still owed to
/// the trader. If the returned price equals the target the step filled the
/// whole interval; otherwise the swap terminates strictly inside it.
///
/// Rounding: input rounds up, output rounds down, fee rounds up.
pub fn compute_swap_step(
    sqrt_price_current: U256,
    sqrt_price_target: U256,
    liquidity: u128,
    amount_remaining: i128,
    fee_rate: u32,
) -> Result<SwapStep> {
    let zero_for_one = sqrt_price_current >= sqrt_price_target;
    let exact_in = amount_remaining >= 0;
    let fee_complement = U256::from(FEE_RATE_DENOMINATOR - fee_rate);
    let remaining_abs = U256::from(amount_remaining.unsigned_abs());

    let mut amount_in = U256::zero();
    let mut amount_out = U256::zero();

    let sqrt_price_next = if exact_in {
        let amount_remaining_less_fee =
            mul_div(remaining_abs, fee_complement, U256::from(FEE_RATE_DENOMINATOR))?;
        amount_in = if zero_for_one {
            get_amount_0_delta(sqrt_price_target, sqrt_price_current, liquidity, true)?
        } else {
            get_amount_1_delta(sqrt_price_current, sqrt_price_target, liquidity, true)?
        };
        if amount_remaining_less_fee >= amount_in {
            sqrt_price_target
        } else {
            get_next_sqrt_price_from_input(
                sqrt_price_current,
                liquidity,
                amount_remaining_less_fee,
                zero_for_one,
            )?
        }
    } else {
        amount_out = if zero_for_one {
            get_amount_1_delta(sqrt_price_target, sqrt_price_current, liquidity, false)?
        } else {
            get_amount_0_delta(sqrt_price_current, sqrt_price_target, liquidity, false)?
        };
        if remaining_abs >= amount_out {
            sqrt_price_target
        } else {
            get_next_sqrt_price_from_output(
                sqrt_price_current,
                liquidity,
                remaining_abs,
                zero_for_one,
            )?
        }
    };

    let reached_target = sqrt_price_next == sqrt_price_target;

    if zero_for_one {
        if !(reached_target && exact_in) {
            amount_in =
                get_amount_0_delta(sqrt_price_next, sqrt_price_current, liquidity, true)?;
        }
        if !(reached_target && !exact_in) {
            amount_out =
                get_amount_1_delta(sqrt_price_next, sqrt_price_current, liquidity, false)?;
        }
    } else {
        if !(reached_target && exact_in) {
            amount_in =
                get_amount_1_delta(sqrt_price_current, sqrt_price_next, liquidity, true)?;
        }
        if !(reached_target && !exact_in) {
            amount_out =
                get_amount_0_delta(sqrt_price_current, sqrt_price_next, liquidity, false)?;
        }
    }

    // Exact-out never hands out more than was asked for.
    if !exact_in && amount_out > remaining_abs {
        amount_out = remaining_abs;
    }

    let fee_amount = if exact_in && !reached_target {
        // The step stopped inside the interval, so the whole remainder is
        // consumed and whatever is not principal is fee.
        remaining_abs
            .checked_sub(amount_in)
            .ok_or(ErrorCode::Overflow)?
    } else {
        mul_div_rounding_up(amount_in, U256::from(fee_rate), fee_complement)?
    };

    Ok(SwapStep {
        sqrt_price_next,
        amount_in,
        amount_out,
        fee_amount,
    })
}

/// Liquidity obtainable from `amount_0` over a sqrt-price interval.
///
/// `L = amount_0 * (sqrt_a * sqrt_b / 2^96) / (sqrt_b - sqrt_a)`, rounded
/// down so the derived liquidity never demands more than the offered
/// amount.
pub fn liquidity_for_amount_0(
    sqrt_ratio_a: U256,
    sqrt_ratio_b: U256,
    amount_0: u64,
) -> Result<u128> {
    let (lower, upper) = if sqrt_ratio_a <= sqrt_ratio_b {
        (sqrt_ratio_a, sqrt_ratio_b)
    } else {
        (sqrt_ratio_b, sqrt_ratio_a)
    };
    if lower == upper {
        return Err(ErrorCode::InvalidTickRange);
    }
    let intermediate = mul_div(lower, upper, Q96)?;
    let liquidity = mul_div(U256::from(amount_0), intermediate, upper - lower)?;
    if liquidity.bits() > 128 {
        return Err(ErrorCode::Overflow);
    }
    Ok(liquidity.low_u128())
}

/// Liquidity obtainable from `amount_1` over a sqrt-price interval.
///
/// `L = amount_1 * 2^96 / (sqrt_b - sqrt_a)`, rounded down.
pub fn liquidity_for_amount_1(
    sqrt_ratio_a: U256,
    sqrt_ratio_b: U256,
    amount_1: u64,
) -> Result<u128> {
    let (lower, upper) = if sqrt_ratio_a <= sqrt_ratio_b {
        (sqrt_ratio_a, sqrt_ratio_b)
    } else {
        (sqrt_ratio_b, sqrt_ratio_a)
    };
    if lower == upper {
        return Err(ErrorCode::InvalidTickRange);
    }
    let liquidity = mul_div(U256::from(amount_1), Q96, upper - lower)?;
    if liquidity.bits() > 128 {
        return Err(ErrorCode::Overflow);
    }
    Ok(liquidity.low_u128())
}

/// Maximum liquidity fundable by both token amounts at the current price.
///
/// Below the range only token0 matters, above it only token1; inside it the
/// binding side wins.
pub fn liquidity_for_amounts(
    sqrt_ratio_current: U256,
    sqrt_ratio_a: U256,
    sqrt_ratio_b: U256,
    amount_0: u64,
    amount_1: u64,
) -> Result<u128> {
    let (lower, upper) = if sqrt_ratio_a <= sqrt_ratio_b {
        (sqrt_ratio_a, sqrt_ratio_b)
    } else {
        (sqrt_ratio_b, sqrt_ratio_a)
    };

    if sqrt_ratio_current <= lower {
        liquidity_for_amount_0(lower, upper, amount_0)
    } else if sqrt_ratio_current < upper {
        let liquidity_0 = liquidity_for_amount_0(sqrt_ratio_current, upper, amount_0)?;
        let liquidity_1 = liquidity_for_amount_1(lower, sqrt_ratio_current, amount_1)?;
        Ok(liquidity_0.min(liquidity_1))
    } else {
        liquidity_for_amount_1(lower, upper, amount_1)
    }
}
