//! Per-position state and the position map.
//!
//! A position is a claim on liquidity between two ticks. The map is keyed
//! by a dense position id assigned at mint; the id is what the external
//! NFT envelope carries, so two mints by the same owner over the same
//! range are distinct positions. Each record snapshots the fee growth
//! inside its range at the last touch; the delta since that snapshot,
//! multiplied by the position's liquidity, is credited to the owed
//! counters on every update.

use crate::constants::Q128;
use crate::errors::{ErrorCode, Result};
use crate::math;
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifier of the account owning a position or an order.
pub type OwnerId = u64;

/// Dense identifier of a position within one pool.
pub type PositionId = u64;

/// State of one liquidity position.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionData {
    /// Owner of the position.
    pub owner: OwnerId,
    /// Lower tick boundary (inclusive).
    pub tick_lower: i32,
    /// Upper tick boundary (exclusive for activity).
    pub tick_upper: i32,
    /// Liquidity currently provided by the position.
    pub liquidity: u128,
    /// Fee growth inside the range for token0 at the last touch.
    pub fee_growth_inside_0_last_x128: U256,
    /// Fee growth inside the range for token1 at the last touch.
    pub fee_growth_inside_1_last_x128: U256,
    /// Uncollected token0 owed to the owner.
    pub tokens_owed_0: u128,
    /// Uncollected token1 owed to the owner.
    pub tokens_owed_1: u128,
}

impl PositionData {
    /// Whether the position may be destroyed: no liquidity and nothing
    /// owed.
    pub fn is_closable(&self) -> bool {
        self.liquidity == 0 && self.tokens_owed_0 == 0 && self.tokens_owed_1 == 0
    }

    /// Returns the position after applying a signed liquidity delta and
    /// settling fees against fresh inside-growth values.
    ///
    /// The inside-growth subtraction wraps so accrual stays correct across
    /// accumulator rollover.
    fn updated(
        &self,
        liquidity_delta: i128,
        fee_growth_inside_0_x128: U256,
        fee_growth_inside_1_x128: U256,
    ) -> Result<PositionData> {
        let delta_0 = fee_growth_inside_0_x128
            .overflowing_sub(self.fee_growth_inside_0_last_x128)
            .0;
        let delta_1 = fee_growth_inside_1_x128
            .overflowing_sub(self.fee_growth_inside_1_last_x128)
            .0;

        let owed_0 = owed_from_growth(delta_0, self.liquidity)?;
        let owed_1 = owed_from_growth(delta_1, self.liquidity)?;

        let liquidity = if liquidity_delta >= 0 {
            self.liquidity
                .checked_add(liquidity_delta as u128)
                .ok_or(ErrorCode::Overflow)?
        } else {
            self.liquidity
                .checked_sub(liquidity_delta.unsigned_abs())
                .ok_or(ErrorCode::NegativeLiquidity)?
        };

        Ok(PositionData {
            liquidity,
            fee_growth_inside_0_last_x128: fee_growth_inside_0_x128,
            fee_growth_inside_1_last_x128: fee_growth_inside_1_x128,
            tokens_owed_0: self
                .tokens_owed_0
                .checked_add(owed_0)
                .ok_or(ErrorCode::Overflow)?,
            tokens_owed_1: self
                .tokens_owed_1
                .checked_add(owed_1)
                .ok_or(ErrorCode::Overflow)?,
            ..*self
        })
    }
}

/// `growth_delta * liquidity / 2^128`, the token amount earned per side.
fn owed_from_growth(growth_delta: U256, liquidity: u128) -> Result<u128> {
    let owed = math::mul_div(growth_delta, U256::from(liquidity), Q128)?;
    if owed.bits() > 128 {
        return Err(ErrorCode::Overflow);
    }
    Ok(owed.low_u128())
}

/// Map of positions keyed by dense id.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionMap {
    positions: BTreeMap<PositionId, PositionData>,
    next_id: PositionId,
}

impl PositionMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a position.
    pub fn get(&self, id: PositionId) -> Option<&PositionData> {
        self.positions.get(&id)
    }

    /// Number of live positions.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether no position exists.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Iterates positions in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&PositionId, &PositionData)> {
        self.positions.iter()
    }

    /// Creates an empty position record and returns its id.
    pub fn create(&mut self, owner: OwnerId, tick_lower: i32, tick_upper: i32) -> PositionId {
        let id = self.next_id;
        self.next_id += 1;
        self.positions.insert(
            id,
            PositionData {
                owner,
                tick_lower,
                tick_upper,
                ..PositionData::default()
            },
        );
        id
    }

    /// Validates an update and returns the new record; nothing is written.
    pub fn staged_update(
        &self,
        id: PositionId,
        liquidity_delta: i128,
        fee_growth_inside_0_x128: U256,
        fee_growth_inside_1_x128: U256,
    ) -> Result<PositionData> {
        self.positions
            .get(&id)
            .ok_or(ErrorCode::InvalidPosition)?
            .updated(
                liquidity_delta,
                fee_growth_inside_0_x128,
                fee_growth_inside_1_x128,
            )
    }

    /// Writes back a staged position record.
    pub fn commit(&mut self, id: PositionId, data: PositionData) {
        self.positions.insert(id, data);
    }

    /// Takes up to `max_0`/`max_1` from the owed counters (0 means all)
    /// and returns the amounts taken.
    pub fn collect(
        &mut self,
        id: PositionId,
        max_0: u64,
        max_1: u64,
    ) -> Result<(u64, u64)> {
        let position = self
            .positions
            .get_mut(&id)
            .ok_or(ErrorCode::InvalidPosition)?;

        let cap_0 = if max_0 == 0 { u64::MAX as u128 } else { max_0 as u128 };
        let cap_1 = if max_1 == 0 { u64::MAX as u128 } else { max_1 as u128 };

        let taken_0 = position.tokens_owed_0.min(cap_0);
        let taken_1 = position.tokens_owed_1.min(cap_1);
        position.tokens_owed_0 -= taken_0;
        position.tokens_owed_1 -= taken_1;

        Ok((taken_0 as u64, taken_1 as u64))
    }

    /// Destroys a position. Fails with [`ErrorCode::InvalidPosition`]
    /// unless the position exists and is closable.
    pub fn remove(&mut self, id: PositionId) -> Result<()> {
        let position = self.positions.get(&id).ok_or(ErrorCode::InvalidPosition)?;
        if !position.is_closable() {
            return Err(ErrorCode::InvalidPosition);
        }
        self.positions.remove(&id);
        Ok(())
    }
}
