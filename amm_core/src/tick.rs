//! Per-tick state and the tick map.
//!
//! Every position boundary references a tick. The tick records the gross
//! liquidity touching it (for lifecycle tracking), the signed net
//! liquidity that activates when the price crosses it from below, and the
//! fee growth accumulated on the far side of the tick. The map is sparse:
//! a tick exists exactly while some position references it, which is also
//! exactly while its bitmap bit is set.

use crate::errors::{ErrorCode, Result};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// State of one initialized tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickInfo {
    /// Sum of `|delta_liquidity|` of all position boundaries at this tick.
    pub liquidity_gross: u128,
    /// Net liquidity applied when the price crosses this tick upward.
    pub liquidity_net: i128,
    /// Fee growth of token0 accrued while the current tick was on the far
    /// side of this one. Only meaningful relative to a snapshot.
    pub fee_growth_outside_0_x128: U256,
    /// Fee growth of token1 on the far side.
    pub fee_growth_outside_1_x128: U256,
    /// Set exactly while `liquidity_gross > 0`.
    pub initialized: bool,
}

impl TickInfo {
    /// Returns the tick state after adding `liquidity_delta` from a mint,
    /// plus whether the tick flipped from empty to initialized.
    ///
    /// `upper` marks the boundary side: an upper boundary subtracts from
    /// the net liquidity, a lower one adds. A tick that initializes at or
    /// below the current tick seeds its outside growth from the global
    /// accumulators so later inside-range deltas stay consistent.
    fn with_mint(
        &self,
        liquidity_delta: u128,
        upper: bool,
        current_tick: i32,
        tick: i32,
        fee_growth_global_0_x128: U256,
        fee_growth_global_1_x128: U256,
    ) -> Result<(TickInfo, bool)> {
        let liquidity_gross = self
            .liquidity_gross
            .checked_add(liquidity_delta)
            .ok_or(ErrorCode::Overflow)?;

        let signed_delta =
            i128::try_from(liquidity_delta).map_err(|_| ErrorCode::Overflow)?;
        let liquidity_net = if upper {
            self.liquidity_net.checked_sub(signed_delta)
        } else {
            self.liquidity_net.checked_add(signed_delta)
        }
        .ok_or(ErrorCode::Overflow)?;

        let flipped = self.liquidity_gross == 0;
        let mut info = TickInfo {
            liquidity_gross,
            liquidity_net,
            ..*self
        };
        if flipped {
            info.initialized = true;
            if current_tick >= tick {
                info.fee_growth_outside_0_x128 = fee_growth_global_0_x128;
                info.fee_growth_outside_1_x128 = fee_growth_global_1_x128;
            }
        }
        Ok((info, flipped))
    }

    /// Returns the tick state after removing `liquidity_delta` for a burn,
    /// plus whether the tick flipped back to empty.
    fn with_burn(&self, liquidity_delta: u128, upper: bool) -> Result<(TickInfo, bool)> {
        let liquidity_gross = self
            .liquidity_gross
            .checked_sub(liquidity_delta)
            .ok_or(ErrorCode::InsufficientLiquidity)?;

        let signed_delta =
            i128::try_from(liquidity_delta).map_err(|_| ErrorCode::Overflow)?;
        let liquidity_net = if upper {
            self.liquidity_net.checked_add(signed_delta)
        } else {
            self.liquidity_net.checked_sub(signed_delta)
        }
        .ok_or(ErrorCode::Overflow)?;

        let flipped = liquidity_gross == 0;
        let mut info = TickInfo {
            liquidity_gross,
            liquidity_net,
            ..*self
        };
        if flipped {
            info.initialized = false;
        }
        Ok((info, flipped))
    }
}

/// Sparse, ordered map of initialized ticks.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickMap {
    ticks: BTreeMap<i32, TickInfo>,
}

impl TickMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a tick.
    pub fn get(&self, tick: i32) -> Option<&TickInfo> {
        self.ticks.get(&tick)
    }

    /// Number of initialized ticks.
    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    /// Whether no tick is initialized.
    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    /// Iterates initialized ticks in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (&i32, &TickInfo)> {
        self.ticks.iter()
    }

    /// Validates a mint-side update of both boundary ticks and returns the
    /// new states; nothing is written.
    ///
    /// Splitting validation from [`commit`](Self::commit) keeps a
    /// multi-tick operation atomic: the pool stages every change, and only
    /// a fully-validated set is written back.
    #[allow(clippy::too_many_arguments)]
    pub fn staged_mint(
        &self,
        tick: i32,
        liquidity_delta: u128,
        upper: bool,
        current_tick: i32,
        fee_growth_global_0_x128: U256,
        fee_growth_global_1_x128: U256,
    ) -> Result<(TickInfo, bool)> {
        self.ticks.get(&tick).copied().unwrap_or_default().with_mint(
            liquidity_delta,
            upper,
            current_tick,
            tick,
            fee_growth_global_0_x128,
            fee_growth_global_1_x128,
        )
    }

    /// Validates a burn-side update of one boundary tick; nothing is
    /// written. Fails with [`ErrorCode::TickNotFound`] when the tick does
    /// not exist.
    pub fn staged_burn(
        &self,
        tick: i32,
        liquidity_delta: u128,
        upper: bool,
    ) -> Result<(TickInfo, bool)> {
        self.ticks
            .get(&tick)
            .ok_or(ErrorCode::TickNotFound)?
            .with_burn(liquidity_delta, upper)
    }

    /// Writes back a staged tick state. Ticks whose gross liquidity
    /// reached zero are removed from the map.
    pub fn commit(&mut self, tick: i32, info: TickInfo) {
        if info.liquidity_gross == 0 {
            self.ticks.remove(&tick);
        } else {
            self.ticks.insert(tick, info);
        }
    }

    /// Flips the outside fee-growth accumulators of `tick` as the price
    /// crosses it, returning the signed net liquidity to apply to the
    /// pool's active liquidity (added when crossing upward, subtracted
    /// when crossing downward).
    ///
    /// The subtraction wraps intentionally: `global - outside` stays a
    /// correct delta across 2^256 rollover.
    pub fn cross(
        &mut self,
        tick: i32,
        fee_growth_global_0_x128: U256,
        fee_growth_global_1_x128: U256,
    ) -> i128 {
        match self.ticks.get_mut(&tick) {
            Some(info) => {
                info.fee_growth_outside_0_x128 = fee_growth_global_0_x128
                    .overflowing_sub(info.fee_growth_outside_0_x128)
                    .0;
                info.fee_growth_outside_1_x128 = fee_growth_global_1_x128
                    .overflowing_sub(info.fee_growth_outside_1_x128)
                    .0;
                info.liquidity_net
            }
            // An uninitialized tick carries no liquidity change.
            None => 0,
        }
    }

    /// Fee growth accumulated while the current tick was inside
    /// `[tick_lower, tick_upper)`, per token, as wrapping Q128.128 deltas.
    pub fn fee_growth_inside(
        &self,
        tick_lower: i32,
        tick_upper: i32,
        current_tick: i32,
        fee_growth_global_0_x128: U256,
        fee_growth_global_1_x128: U256,
    ) -> (U256, U256) {
        let lower = self.ticks.get(&tick_lower).copied().unwrap_or_default();
        let upper = self.ticks.get(&tick_upper).copied().unwrap_or_default();
        fee_growth_inside_at(
            &lower,
            &upper,
            tick_lower,
            tick_upper,
            current_tick,
            fee_growth_global_0_x128,
            fee_growth_global_1_x128,
        )
    }
}

/// [`TickMap::fee_growth_inside`] evaluated on explicit tick states.
///
/// The pool stages boundary-tick updates before committing them and needs
/// the inside growth those staged states imply.
pub fn fee_growth_inside_at(
    lower: &TickInfo,
    upper: &TickInfo,
    tick_lower: i32,
    tick_upper: i32,
    current_tick: i32,
    fee_growth_global_0_x128: U256,
    fee_growth_global_1_x128: U256,
) -> (U256, U256) {
    let (below_0, below_1) = if current_tick >= tick_lower {
        (lower.fee_growth_outside_0_x128, lower.fee_growth_outside_1_x128)
    } else {
        (
            fee_growth_global_0_x128
                .overflowing_sub(lower.fee_growth_outside_0_x128)
                .0,
            fee_growth_global_1_x128
                .overflowing_sub(lower.fee_growth_outside_1_x128)
                .0,
        )
    };

    let (above_0, above_1) = if current_tick < tick_upper {
        (upper.fee_growth_outside_0_x128, upper.fee_growth_outside_1_x128)
    } else {
        (
            fee_growth_global_0_x128
                .overflowing_sub(upper.fee_growth_outside_0_x128)
                .0,
            fee_growth_global_1_x128
                .overflowing_sub(upper.fee_growth_outside_1_x128)
                .0,
        )
    };

    (
        fee_growth_global_0_x128
            .overflowing_sub(below_0)
            .0
            .overflowing_sub(above_0)
            .0,
        fee_growth_global_1_x128
            .overflowing_sub(below_1)
            .0
            .overflowing_sub(above_1)
            .0,
    )
}
