//! Position management API.
//!
//! This layer is what the external position envelope (an NFT on the host
//! chain) talks to. The envelope carries a [`PositionHandle`] holding the
//! pool id and the dense position id; the pool keeps the authoritative
//! copy of liquidity and owed counters, so the handle is routing only,
//! and every call verifies it against the pool before touching state.
//!
//! Unlike the core [`Pool`] methods, mints here are denominated in token
//! amounts: the desired amounts are converted to the largest liquidity
//! both sides can fund at the current price, and the caller's minimums
//! protect against price movement between quoting and execution.

use crate::constants::Q128;
use crate::errors::{ErrorCode, Result};
use crate::math;
use crate::pool_state::Pool;
use crate::position::{OwnerId, PositionData, PositionId};
use crate::tick_math;
use primitive_types::U256;
use serde::{Deserialize, Serialize};

/// Capability object referencing one position in one pool.
///
/// This is the data contract of the external NFT: the pool rejects a
/// handle minted for another pool with [`ErrorCode::NftWrongPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionHandle {
    /// Pool the position belongs to.
    pub pool_id: u64,
    /// Dense position id within that pool.
    pub position_id: PositionId,
}

/// Parameters of an amount-denominated mint.
#[derive(Debug, Clone, Copy)]
pub struct MintParams {
    /// Lower tick boundary.
    pub tick_lower: i32,
    /// Upper tick boundary.
    pub tick_upper: i32,
    /// Token0 the caller is willing to deposit.
    pub amount_0_desired: u64,
    /// Token1 the caller is willing to deposit.
    pub amount_1_desired: u64,
    /// Minimum token0 that must end up deposited.
    pub amount_0_min: u64,
    /// Minimum token1 that must end up deposited.
    pub amount_1_min: u64,
}

/// Result of an amount-denominated mint.
#[derive(Debug, Clone, Copy)]
pub struct MintReceipt {
    /// Handle for the new position.
    pub handle: PositionHandle,
    /// Token0 actually deposited.
    pub used_0: u64,
    /// Token1 actually deposited.
    pub used_1: u64,
    /// Liquidity the deposit bought.
    pub liquidity: u128,
}

fn checked_position<'a>(pool: &'a Pool, handle: &PositionHandle) -> Result<&'a PositionData> {
    if handle.pool_id != pool.pool_id() {
        return Err(ErrorCode::NftWrongPool);
    }
    pool.position_data(handle.position_id)
        .ok_or(ErrorCode::InvalidPosition)
}

fn checked_owned_position<'a>(
    pool: &'a Pool,
    handle: &PositionHandle,
    owner: OwnerId,
) -> Result<&'a PositionData> {
    let position = checked_position(pool, handle)?;
    if position.owner != owner {
        return Err(ErrorCode::Unauthorized);
    }
    Ok(position)
}

/// Liquidity fundable by the desired amounts over a range at the pool's
/// current price.
fn liquidity_from_amounts(
    pool: &Pool,
    tick_lower: i32,
    tick_upper: i32,
    amount_0: u64,
    amount_1: u64,
) -> Result<u128> {
    let sqrt_ratio_lower = tick_math::sqrt_ratio_at_tick(tick_lower)?;
    let sqrt_ratio_upper = tick_math::sqrt_ratio_at_tick(tick_upper)?;
    math::liquidity_for_amounts(
        pool.slot0().sqrt_price_x96,
        sqrt_ratio_lower,
        sqrt_ratio_upper,
        amount_0,
        amount_1,
    )
}

/// Opens a position funded by token amounts.
///
/// The `recipient` of the external NFT does not participate in engine
/// accounting; ownership is enforced through the handle and the recorded
/// owner.
pub fn mint(pool: &mut Pool, owner: OwnerId, params: MintParams) -> Result<MintReceipt> {
    let liquidity = liquidity_from_amounts(
        pool,
        params.tick_lower,
        params.tick_upper,
        params.amount_0_desired,
        params.amount_1_desired,
    )?;
    if liquidity == 0 {
        return Err(ErrorCode::InsufficientLiquidity);
    }

    let outcome = pool.mint(
        owner,
        params.tick_lower,
        params.tick_upper,
        liquidity,
        params.amount_0_desired,
        params.amount_1_desired,
    )?;
    if outcome.used_0 < params.amount_0_min || outcome.used_1 < params.amount_1_min {
        return Err(ErrorCode::InsufficientPayment);
    }

    tracing::debug!(
        pool_id = pool.pool_id(),
        position_id = outcome.position_id,
        owner,
        liquidity,
        "position opened"
    );
    Ok(MintReceipt {
        handle: PositionHandle {
            pool_id: pool.pool_id(),
            position_id: outcome.position_id,
        },
        used_0: outcome.used_0,
        used_1: outcome.used_1,
        liquidity,
    })
}

/// Adds amount-denominated liquidity to an existing position.
pub fn increase_liquidity(
    pool: &mut Pool,
    handle: &PositionHandle,
    owner: OwnerId,
    amount_0_desired: u64,
    amount_1_desired: u64,
    amount_0_min: u64,
    amount_1_min: u64,
) -> Result<(u64, u64, u128)> {
    let position = *checked_owned_position(pool, handle, owner)?;
    let liquidity = liquidity_from_amounts(
        pool,
        position.tick_lower,
        position.tick_upper,
        amount_0_desired,
        amount_1_desired,
    )?;
    if liquidity == 0 {
        return Err(ErrorCode::InsufficientLiquidity);
    }

    let (used_0, used_1) = pool.increase_liquidity(
        handle.position_id,
        liquidity,
        amount_0_desired,
        amount_1_desired,
    )?;
    if used_0 < amount_0_min || used_1 < amount_1_min {
        return Err(ErrorCode::InsufficientPayment);
    }
    Ok((used_0, used_1, liquidity))
}

/// Removes liquidity from a position. The freed amounts accrue to the
/// owed counters; collection is a separate call.
pub fn decrease_liquidity(
    pool: &mut Pool,
    handle: &PositionHandle,
    owner: OwnerId,
    liquidity_delta: u128,
) -> Result<(u64, u64)> {
    checked_owned_position(pool, handle, owner)?;
    pool.burn(handle.position_id, liquidity_delta)
}

/// Collects up to `max_0`/`max_1` owed tokens (0 means all).
pub fn collect(
    pool: &mut Pool,
    handle: &PositionHandle,
    owner: OwnerId,
    max_0: u64,
    max_1: u64,
) -> Result<(u64, u64)> {
    checked_owned_position(pool, handle, owner)?;
    pool.collect(handle.position_id, max_0, max_1)
}

/// Destroys a closable position (zero liquidity, nothing owed).
pub fn burn_position(pool: &mut Pool, handle: &PositionHandle, owner: OwnerId) -> Result<()> {
    checked_owned_position(pool, handle, owner)?;
    pool.burn_position(handle.position_id)
}

/// Fees the position could collect right now, as of current fee growth,
/// without touching state.
pub fn pending_fees(pool: &Pool, handle: &PositionHandle) -> Result<(u128, u128)> {
    let position = *checked_position(pool, handle)?;
    let slot0 = pool.slot0();
    let (inside_0, inside_1) = pool.ticks().fee_growth_inside(
        position.tick_lower,
        position.tick_upper,
        slot0.tick,
        slot0.fee_growth_global_0_x128,
        slot0.fee_growth_global_1_x128,
    );

    let delta_0 = inside_0
        .overflowing_sub(position.fee_growth_inside_0_last_x128)
        .0;
    let delta_1 = inside_1
        .overflowing_sub(position.fee_growth_inside_1_last_x128)
        .0;
    let earned_0 = math::mul_div(delta_0, U256::from(position.liquidity), Q128)?;
    let earned_1 = math::mul_div(delta_1, U256::from(position.liquidity), Q128)?;
    if earned_0.bits() > 128 || earned_1.bits() > 128 {
        return Err(ErrorCode::Overflow);
    }

    Ok((
        position
            .tokens_owed_0
            .checked_add(earned_0.low_u128())
            .ok_or(ErrorCode::Overflow)?,
        position
            .tokens_owed_1
            .checked_add(earned_1.low_u128())
            .ok_or(ErrorCode::Overflow)?,
    ))
}
