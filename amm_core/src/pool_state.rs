//! The pool state machine.
//!
//! A [`Pool`] owns everything one trading pair needs: the slot0 price
//! state, the sparse tick map, the tick bitmap, the position map and the
//! two token reserves. Mint, burn, collect and swap are the only writers,
//! and each either completes fully or leaves the pool untouched: state
//! changes are staged against copies and committed only after every
//! fallible computation has succeeded.
//!
//! Swaps walk the piecewise-constant liquidity curve: the bitmap yields
//! the next initialized tick in the direction of the trade, a swap step
//! advances the price toward that tick (or the caller's limit), fees
//! accrue to the global accumulator of the input token, and crossing an
//! initialized tick applies its net liquidity and flips its outside fee
//! growth.

use crate::constants::{
    FEE_RATE_DENOMINATOR, MAX_SQRT_RATIO, MAX_TICK, MIN_SQRT_RATIO, MIN_TICK, Q128,
};
use crate::errors::{ErrorCode, Result};
use crate::math;
use crate::position::{OwnerId, PositionData, PositionId, PositionMap};
use crate::tick::{self, TickMap};
use crate::tick_bitmap::TickBitmap;
use crate::tick_math;
use primitive_types::U256;
use serde::{Deserialize, Serialize};

/// Snapshot of the pool's current price state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot0 {
    /// Current sqrt price, Q64.96.
    pub sqrt_price_x96: U256,
    /// Greatest tick whose sqrt price is at most `sqrt_price_x96`.
    pub tick: i32,
    /// Liquidity active at the current tick.
    pub liquidity: u128,
    /// Accumulated token0 fees per unit of liquidity, Q128.128, wrapping.
    pub fee_growth_global_0_x128: U256,
    /// Accumulated token1 fees per unit of liquidity, Q128.128, wrapping.
    pub fee_growth_global_1_x128: U256,
    /// Swap fee in parts per million.
    pub fee_rate: u32,
    /// Spacing between initializable ticks.
    pub tick_spacing: u32,
}

/// Result of a liquidity-denominated mint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MintOutcome {
    /// Id of the freshly created position.
    pub position_id: PositionId,
    /// Token0 taken from the payment.
    pub used_0: u64,
    /// Token1 taken from the payment.
    pub used_1: u64,
}

/// Result of a simulated swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapQuote {
    /// Signed token0 delta from the pool's perspective.
    pub amount_0: i128,
    /// Signed token1 delta from the pool's perspective.
    pub amount_1: i128,
    /// Sqrt price after the simulated swap.
    pub sqrt_price_after_x96: U256,
    /// Tick after the simulated swap.
    pub tick_after: i32,
}

/// One pool of a token pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    pool_id: u64,
    fee_rate: u32,
    tick_spacing: u32,
    /// Share of each swap fee diverted to the protocol, in parts per
    /// million. Held at zero by this engine; the accounting seam stays.
    protocol_fee_rate: u32,
    sqrt_price_x96: U256,
    current_tick: i32,
    liquidity: u128,
    fee_growth_global_0_x128: U256,
    fee_growth_global_1_x128: U256,
    protocol_fees_0: u64,
    protocol_fees_1: u64,
    reserve_0: u128,
    reserve_1: u128,
    ticks: TickMap,
    tick_bitmap: TickBitmap,
    positions: PositionMap,
}

/// Transient state of an in-flight swap.
struct SwapState {
    amount_remaining: i128,
    amount_calculated: i128,
    sqrt_price_x96: U256,
    tick: i32,
    liquidity: u128,
    /// Global fee growth of the input token, updated as the swap runs.
    fee_growth_global_input_x128: U256,
    protocol_fee: u64,
}

impl Pool {
    /// Creates a pool.
    ///
    /// `fee_rate` is parts per million and must lie in `(0, 1_000_000)`;
    /// `tick_spacing` must be positive; `sqrt_price_x96` must lie in the
    /// representable price domain. The initial tick is derived from the
    /// price.
    pub fn new(
        pool_id: u64,
        fee_rate: u32,
        tick_spacing: u32,
        sqrt_price_x96: U256,
    ) -> Result<Self> {
        if fee_rate == 0 || fee_rate >= FEE_RATE_DENOMINATOR {
            return Err(ErrorCode::InvalidFee);
        }
        // A spacing beyond the tick domain would overflow the bitmap's
        // word-edge arithmetic.
        if tick_spacing == 0 || tick_spacing > MAX_TICK as u32 {
            return Err(ErrorCode::InvalidFee);
        }
        if sqrt_price_x96 < MIN_SQRT_RATIO || sqrt_price_x96 > MAX_SQRT_RATIO {
            return Err(ErrorCode::InvalidSqrtPrice);
        }
        let current_tick = tick_math::tick_at_sqrt_ratio(sqrt_price_x96)?;

        tracing::debug!(pool_id, fee_rate, tick_spacing, %sqrt_price_x96, "pool created");

        Ok(Pool {
            pool_id,
            fee_rate,
            tick_spacing,
            protocol_fee_rate: 0,
            sqrt_price_x96,
            current_tick,
            liquidity: 0,
            fee_growth_global_0_x128: U256::zero(),
            fee_growth_global_1_x128: U256::zero(),
            protocol_fees_0: 0,
            protocol_fees_1: 0,
            reserve_0: 0,
            reserve_1: 0,
            ticks: TickMap::new(),
            tick_bitmap: TickBitmap::new(),
            positions: PositionMap::new(),
        })
    }

    /// Pool identifier, matched against position handles.
    pub fn pool_id(&self) -> u64 {
        self.pool_id
    }

    /// Swap fee in parts per million.
    pub fn fee_rate(&self) -> u32 {
        self.fee_rate
    }

    /// Spacing between initializable ticks.
    pub fn tick_spacing(&self) -> u32 {
        self.tick_spacing
    }

    /// Current price state.
    pub fn slot0(&self) -> Slot0 {
        Slot0 {
            sqrt_price_x96: self.sqrt_price_x96,
            tick: self.current_tick,
            liquidity: self.liquidity,
            fee_growth_global_0_x128: self.fee_growth_global_0_x128,
            fee_growth_global_1_x128: self.fee_growth_global_1_x128,
            fee_rate: self.fee_rate,
            tick_spacing: self.tick_spacing,
        }
    }

    /// Current token reserves `(reserve_0, reserve_1)`.
    pub fn reserves(&self) -> (u128, u128) {
        (self.reserve_0, self.reserve_1)
    }

    /// Looks up a position record.
    pub fn position_data(&self, id: PositionId) -> Option<&PositionData> {
        self.positions.get(id)
    }

    /// Iterates all live positions in id order.
    pub fn positions(&self) -> impl Iterator<Item = (&PositionId, &PositionData)> {
        self.positions.iter()
    }

    /// Read access to the tick map.
    pub fn ticks(&self) -> &TickMap {
        &self.ticks
    }

    /// Whether `tick` carries an initialized bitmap bit.
    pub fn is_tick_initialized(&self, tick: i32) -> bool {
        self.tick_bitmap.is_initialized(tick, self.tick_spacing)
    }

    fn check_tick_range(&self, tick_lower: i32, tick_upper: i32) -> Result<()> {
        if tick_lower >= tick_upper {
            return Err(ErrorCode::InvalidTickRange);
        }
        if tick_lower < MIN_TICK || tick_upper > MAX_TICK {
            return Err(ErrorCode::TickOutOfRange);
        }
        let spacing = self.tick_spacing as i32;
        if tick_lower.rem_euclid(spacing) != 0 || tick_upper.rem_euclid(spacing) != 0 {
            return Err(ErrorCode::TickNotAligned);
        }
        Ok(())
    }

    /// Token amounts spanned by `liquidity` over a range at the current
    /// price. Deposits round up, withdrawals round down.
    fn amounts_for_liquidity(
        &self,
        tick_lower: i32,
        tick_upper: i32,
        liquidity: u128,
        round_up: bool,
    ) -> Result<(u64, u64)> {
        let sqrt_ratio_lower = tick_math::sqrt_ratio_at_tick(tick_lower)?;
        let sqrt_ratio_upper = tick_math::sqrt_ratio_at_tick(tick_upper)?;

        let (amount_0, amount_1) = if self.current_tick < tick_lower {
            // The range sits entirely above the current price: it is all
            // token0.
            (
                math::get_amount_0_delta(sqrt_ratio_lower, sqrt_ratio_upper, liquidity, round_up)?,
                U256::zero(),
            )
        } else if self.current_tick >= tick_upper {
            (
                U256::zero(),
                math::get_amount_1_delta(sqrt_ratio_lower, sqrt_ratio_upper, liquidity, round_up)?,
            )
        } else {
            (
                math::get_amount_0_delta(
                    self.sqrt_price_x96,
                    sqrt_ratio_upper,
                    liquidity,
                    round_up,
                )?,
                math::get_amount_1_delta(
                    sqrt_ratio_lower,
                    self.sqrt_price_x96,
                    liquidity,
                    round_up,
                )?,
            )
        };

        if amount_0.bits() > 64 || amount_1.bits() > 64 {
            return Err(ErrorCode::Overflow);
        }
        Ok((amount_0.low_u64(), amount_1.low_u64()))
    }

    /// Mints a fresh position with `liquidity_delta` liquidity.
    ///
    /// The caller pays `payment_0`/`payment_1`; the pool takes the
    /// round-up amounts the range requires and fails with
    /// [`ErrorCode::InsufficientPayment`] when the payment does not cover
    /// them. Unused payment stays with the caller.
    pub fn mint(
        &mut self,
        owner: OwnerId,
        tick_lower: i32,
        tick_upper: i32,
        liquidity_delta: u128,
        payment_0: u64,
        payment_1: u64,
    ) -> Result<MintOutcome> {
        if liquidity_delta == 0 {
            return Err(ErrorCode::ZeroAmount);
        }
        self.check_tick_range(tick_lower, tick_upper)?;

        let (amount_0, amount_1) =
            self.amounts_for_liquidity(tick_lower, tick_upper, liquidity_delta, true)?;
        if payment_0 < amount_0 || payment_1 < amount_1 {
            return Err(ErrorCode::InsufficientPayment);
        }

        let position_id =
            self.apply_liquidity_increase(None, owner, tick_lower, tick_upper, liquidity_delta)?;
        self.reserve_0 += amount_0 as u128;
        self.reserve_1 += amount_1 as u128;

        tracing::debug!(
            pool_id = self.pool_id,
            position_id,
            tick_lower,
            tick_upper,
            liquidity_delta,
            amount_0,
            amount_1,
            "minted position"
        );
        Ok(MintOutcome {
            position_id,
            used_0: amount_0,
            used_1: amount_1,
        })
    }

    /// Adds liquidity to an existing position. Returns the amounts taken.
    pub fn increase_liquidity(
        &mut self,
        position_id: PositionId,
        liquidity_delta: u128,
        payment_0: u64,
        payment_1: u64,
    ) -> Result<(u64, u64)> {
        if liquidity_delta == 0 {
            return Err(ErrorCode::ZeroAmount);
        }
        let position = *self
            .positions
            .get(position_id)
            .ok_or(ErrorCode::InvalidPosition)?;

        let (amount_0, amount_1) = self.amounts_for_liquidity(
            position.tick_lower,
            position.tick_upper,
            liquidity_delta,
            true,
        )?;
        if payment_0 < amount_0 || payment_1 < amount_1 {
            return Err(ErrorCode::InsufficientPayment);
        }

        self.apply_liquidity_increase(
            Some(position_id),
            position.owner,
            position.tick_lower,
            position.tick_upper,
            liquidity_delta,
        )?;
        self.reserve_0 += amount_0 as u128;
        self.reserve_1 += amount_1 as u128;
        Ok((amount_0, amount_1))
    }

    /// Stages and commits the tick, position and active-liquidity changes
    /// of a mint or increase. Returns the position id.
    fn apply_liquidity_increase(
        &mut self,
        existing: Option<PositionId>,
        owner: OwnerId,
        tick_lower: i32,
        tick_upper: i32,
        liquidity_delta: u128,
    ) -> Result<PositionId> {
        let (lower_info, lower_flipped) = self.ticks.staged_mint(
            tick_lower,
            liquidity_delta,
            false,
            self.current_tick,
            self.fee_growth_global_0_x128,
            self.fee_growth_global_1_x128,
        )?;
        let (upper_info, upper_flipped) = self.ticks.staged_mint(
            tick_upper,
            liquidity_delta,
            true,
            self.current_tick,
            self.fee_growth_global_0_x128,
            self.fee_growth_global_1_x128,
        )?;

        let in_range = self.current_tick >= tick_lower && self.current_tick < tick_upper;
        let new_active_liquidity = if in_range {
            self.liquidity
                .checked_add(liquidity_delta)
                .ok_or(ErrorCode::Overflow)?
        } else {
            self.liquidity
        };

        let (inside_0, inside_1) = tick::fee_growth_inside_at(
            &lower_info,
            &upper_info,
            tick_lower,
            tick_upper,
            self.current_tick,
            self.fee_growth_global_0_x128,
            self.fee_growth_global_1_x128,
        );

        let signed_delta =
            i128::try_from(liquidity_delta).map_err(|_| ErrorCode::Overflow)?;
        let (position_id, staged_position) = match existing {
            Some(id) => (
                id,
                self.positions
                    .staged_update(id, signed_delta, inside_0, inside_1)?,
            ),
            None => {
                let id = self.positions.create(owner, tick_lower, tick_upper);
                let staged = self
                    .positions
                    .staged_update(id, signed_delta, inside_0, inside_1)?;
                (id, staged)
            }
        };

        // Everything validated; commit.
        self.ticks.commit(tick_lower, lower_info);
        self.ticks.commit(tick_upper, upper_info);
        if lower_flipped {
            self.tick_bitmap.flip_tick(tick_lower, self.tick_spacing)?;
        }
        if upper_flipped {
            self.tick_bitmap.flip_tick(tick_upper, self.tick_spacing)?;
        }
        self.positions.commit(position_id, staged_position);
        self.liquidity = new_active_liquidity;
        Ok(position_id)
    }

    /// Removes `liquidity_delta` from a position.
    ///
    /// The freed amounts are **owed**, not transferred: they accumulate on
    /// the position's owed counters and leave the pool only through
    /// [`collect`](Self::collect). Returns the owed deltas.
    pub fn burn(
        &mut self,
        position_id: PositionId,
        liquidity_delta: u128,
    ) -> Result<(u64, u64)> {
        if liquidity_delta == 0 {
            return Err(ErrorCode::ZeroAmount);
        }
        let position = *self
            .positions
            .get(position_id)
            .ok_or(ErrorCode::InvalidPosition)?;
        let (tick_lower, tick_upper) = (position.tick_lower, position.tick_upper);

        let (lower_info, lower_flipped) =
            self.ticks.staged_burn(tick_lower, liquidity_delta, false)?;
        let (upper_info, upper_flipped) =
            self.ticks.staged_burn(tick_upper, liquidity_delta, true)?;

        let (inside_0, inside_1) = tick::fee_growth_inside_at(
            &lower_info,
            &upper_info,
            tick_lower,
            tick_upper,
            self.current_tick,
            self.fee_growth_global_0_x128,
            self.fee_growth_global_1_x128,
        );

        let signed_delta =
            i128::try_from(liquidity_delta).map_err(|_| ErrorCode::Overflow)?;
        let mut staged_position =
            self.positions
                .staged_update(position_id, -signed_delta, inside_0, inside_1)?;

        // Withdrawal amounts round down: the pool keeps the rounding dust.
        let (amount_0, amount_1) =
            self.amounts_for_liquidity(tick_lower, tick_upper, liquidity_delta, false)?;
        staged_position.tokens_owed_0 = staged_position
            .tokens_owed_0
            .checked_add(amount_0 as u128)
            .ok_or(ErrorCode::Overflow)?;
        staged_position.tokens_owed_1 = staged_position
            .tokens_owed_1
            .checked_add(amount_1 as u128)
            .ok_or(ErrorCode::Overflow)?;

        let in_range = self.current_tick >= tick_lower && self.current_tick < tick_upper;
        let new_active_liquidity = if in_range {
            self.liquidity
                .checked_sub(liquidity_delta)
                .ok_or(ErrorCode::InsufficientLiquidity)?
        } else {
            self.liquidity
        };

        self.ticks.commit(tick_lower, lower_info);
        self.ticks.commit(tick_upper, upper_info);
        if lower_flipped {
            self.tick_bitmap.flip_tick(tick_lower, self.tick_spacing)?;
        }
        if upper_flipped {
            self.tick_bitmap.flip_tick(tick_upper, self.tick_spacing)?;
        }
        self.positions.commit(position_id, staged_position);
        self.liquidity = new_active_liquidity;

        tracing::debug!(
            pool_id = self.pool_id,
            position_id,
            liquidity_delta,
            amount_0,
            amount_1,
            "burned liquidity"
        );
        Ok((amount_0, amount_1))
    }

    /// Pays out up to `max_0`/`max_1` of the position's owed tokens
    /// (0 means all) from the reserves.
    pub fn collect(
        &mut self,
        position_id: PositionId,
        max_0: u64,
        max_1: u64,
    ) -> Result<(u64, u64)> {
        let position = self
            .positions
            .get(position_id)
            .ok_or(ErrorCode::InvalidPosition)?;

        let cap_0 = if max_0 == 0 { u64::MAX as u128 } else { max_0 as u128 };
        let cap_1 = if max_1 == 0 { u64::MAX as u128 } else { max_1 as u128 };
        let take_0 = position.tokens_owed_0.min(cap_0);
        let take_1 = position.tokens_owed_1.min(cap_1);
        if self.reserve_0 < take_0 || self.reserve_1 < take_1 {
            return Err(ErrorCode::InvalidAmount);
        }

        let (taken_0, taken_1) = self.positions.collect(position_id, max_0, max_1)?;
        self.reserve_0 -= taken_0 as u128;
        self.reserve_1 -= taken_1 as u128;
        Ok((taken_0, taken_1))
    }

    /// Destroys a position that has no liquidity and nothing owed.
    pub fn burn_position(&mut self, position_id: PositionId) -> Result<()> {
        self.positions.remove(position_id)
    }

    /// Executes a swap.
    ///
    /// Positive `amount_specified` is exact-in (input including fee);
    /// negative is exact-out. The returned pair is the signed token deltas
    /// from the pool's perspective: positive amounts flow into the pool,
    /// negative amounts flow out to the trader.
    pub fn swap(
        &mut self,
        zero_for_one: bool,
        amount_specified: i128,
        sqrt_price_limit_x96: U256,
    ) -> Result<(i128, i128)> {
        // The loop crosses ticks as it goes, so it runs against a staged
        // copy of the tick map; a failure anywhere leaves the pool as it
        // was.
        let mut staged_ticks = self.ticks.clone();
        let (amount_0, amount_1, state) = self.swap_inner(
            &mut staged_ticks,
            zero_for_one,
            amount_specified,
            sqrt_price_limit_x96,
        )?;
        let (reserve_0, reserve_1) = self.staged_reserves(amount_0, amount_1)?;

        // Everything validated; commit slot0, ticks, fees and reserves.
        self.ticks = staged_ticks;
        self.sqrt_price_x96 = state.sqrt_price_x96;
        self.current_tick = state.tick;
        self.liquidity = state.liquidity;
        if zero_for_one {
            self.fee_growth_global_0_x128 = state.fee_growth_global_input_x128;
            self.protocol_fees_0 += state.protocol_fee;
        } else {
            self.fee_growth_global_1_x128 = state.fee_growth_global_input_x128;
            self.protocol_fees_1 += state.protocol_fee;
        }
        self.reserve_0 = reserve_0;
        self.reserve_1 = reserve_1;

        tracing::debug!(
            pool_id = self.pool_id,
            zero_for_one,
            amount_specified,
            amount_0,
            amount_1,
            tick = self.current_tick,
            "swap executed"
        );
        Ok((amount_0, amount_1))
    }

    /// Runs the swap loop against a copy of the pool and reports the
    /// outcome without committing anything.
    pub fn quote_swap(
        &self,
        zero_for_one: bool,
        amount_specified: i128,
        sqrt_price_limit_x96: U256,
    ) -> Result<SwapQuote> {
        let mut staged_ticks = self.ticks.clone();
        let (amount_0, amount_1, state) = self.swap_inner(
            &mut staged_ticks,
            zero_for_one,
            amount_specified,
            sqrt_price_limit_x96,
        )?;
        Ok(SwapQuote {
            amount_0,
            amount_1,
            sqrt_price_after_x96: state.sqrt_price_x96,
            tick_after: state.tick,
        })
    }

    /// The swap loop. Tick crossings land on `ticks` (a staged copy); the
    /// caller commits or discards it together with the returned state.
    fn swap_inner(
        &self,
        ticks: &mut TickMap,
        zero_for_one: bool,
        amount_specified: i128,
        sqrt_price_limit_x96: U256,
    ) -> Result<(i128, i128, SwapState)> {
        if amount_specified == 0 {
            return Err(ErrorCode::ZeroAmount);
        }
        if zero_for_one {
            if sqrt_price_limit_x96 >= self.sqrt_price_x96
                || sqrt_price_limit_x96 <= MIN_SQRT_RATIO
            {
                return Err(ErrorCode::InvalidPriceLimit);
            }
        } else if sqrt_price_limit_x96 <= self.sqrt_price_x96
            || sqrt_price_limit_x96 >= MAX_SQRT_RATIO
        {
            return Err(ErrorCode::InvalidPriceLimit);
        }
        if self.liquidity == 0 {
            return Err(ErrorCode::InsufficientLiquidity);
        }

        let exact_in = amount_specified > 0;
        let mut state = SwapState {
            amount_remaining: amount_specified,
            amount_calculated: 0,
            sqrt_price_x96: self.sqrt_price_x96,
            tick: self.current_tick,
            liquidity: self.liquidity,
            fee_growth_global_input_x128: if zero_for_one {
                self.fee_growth_global_0_x128
            } else {
                self.fee_growth_global_1_x128
            },
            protocol_fee: 0,
        };

        while state.amount_remaining != 0 && state.sqrt_price_x96 != sqrt_price_limit_x96 {
            let sqrt_price_start = state.sqrt_price_x96;

            let (tick_next, initialized) = self
                .tick_bitmap
                .next_initialized_tick_within_one_word(
                    state.tick,
                    self.tick_spacing,
                    zero_for_one,
                );
            // The bitmap is unaware of the tick domain; clamp word-edge
            // results.
            let tick_next = tick_next.clamp(MIN_TICK, MAX_TICK);
            let sqrt_price_next = tick_math::sqrt_ratio_at_tick(tick_next)?;

            let target = if zero_for_one {
                sqrt_price_next.max(sqrt_price_limit_x96)
            } else {
                sqrt_price_next.min(sqrt_price_limit_x96)
            };

            let step = math::compute_swap_step(
                state.sqrt_price_x96,
                target,
                state.liquidity,
                state.amount_remaining,
                self.fee_rate,
            )?;
            state.sqrt_price_x96 = step.sqrt_price_next;

            let step_in = u256_to_i128(step.amount_in)?;
            let step_out = u256_to_i128(step.amount_out)?;
            let mut step_fee = u256_to_i128(step.fee_amount)?;

            if exact_in {
                state.amount_remaining = state
                    .amount_remaining
                    .checked_sub(step_in.checked_add(step_fee).ok_or(ErrorCode::Overflow)?)
                    .ok_or(ErrorCode::Overflow)?;
                state.amount_calculated = state
                    .amount_calculated
                    .checked_sub(step_out)
                    .ok_or(ErrorCode::Overflow)?;
            } else {
                state.amount_remaining = state
                    .amount_remaining
                    .checked_add(step_out)
                    .ok_or(ErrorCode::Overflow)?;
                state.amount_calculated = state
                    .amount_calculated
                    .checked_add(step_in.checked_add(step_fee).ok_or(ErrorCode::Overflow)?)
                    .ok_or(ErrorCode::Overflow)?;
            }

            if self.protocol_fee_rate > 0 {
                let delta = (step_fee as u128 * self.protocol_fee_rate as u128
                    / FEE_RATE_DENOMINATOR as u128) as i128;
                step_fee -= delta;
                state.protocol_fee += delta as u64;
            }

            // Fees only accrue where liquidity exists to receive them;
            // crossing a gap between ranges accrues nothing.
            if state.liquidity > 0 && step_fee > 0 {
                let growth = math::mul_div(
                    U256::from(step_fee as u128),
                    Q128,
                    U256::from(state.liquidity),
                )?;
                state.fee_growth_global_input_x128 =
                    state.fee_growth_global_input_x128.overflowing_add(growth).0;
            }

            if state.sqrt_price_x96 == sqrt_price_next {
                // Reached the candidate tick.
                if initialized {
                    let (global_0, global_1) = if zero_for_one {
                        (
                            state.fee_growth_global_input_x128,
                            self.fee_growth_global_1_x128,
                        )
                    } else {
                        (
                            self.fee_growth_global_0_x128,
                            state.fee_growth_global_input_x128,
                        )
                    };
                    let mut liquidity_net = ticks.cross(tick_next, global_0, global_1);
                    if zero_for_one {
                        liquidity_net = -liquidity_net;
                    }
                    state.liquidity =
                        math::add_liquidity_delta(state.liquidity, liquidity_net)?;
                }
                state.tick = if zero_for_one { tick_next - 1 } else { tick_next };
            } else if state.sqrt_price_x96 != sqrt_price_start {
                state.tick = tick_math::tick_at_sqrt_ratio(state.sqrt_price_x96)?;
            }
        }

        let (amount_0, amount_1) = if zero_for_one == exact_in {
            (
                amount_specified - state.amount_remaining,
                state.amount_calculated,
            )
        } else {
            (
                state.amount_calculated,
                amount_specified - state.amount_remaining,
            )
        };
        Ok((amount_0, amount_1, state))
    }

    /// Reserve values after applying signed swap deltas; nothing is
    /// written.
    fn staged_reserves(&self, amount_0: i128, amount_1: i128) -> Result<(u128, u128)> {
        let reserve_0 = if amount_0 >= 0 {
            self.reserve_0
                .checked_add(amount_0 as u128)
                .ok_or(ErrorCode::Overflow)?
        } else {
            self.reserve_0
                .checked_sub(amount_0.unsigned_abs())
                .ok_or(ErrorCode::InvalidAmount)?
        };
        let reserve_1 = if amount_1 >= 0 {
            self.reserve_1
                .checked_add(amount_1 as u128)
                .ok_or(ErrorCode::Overflow)?
        } else {
            self.reserve_1
                .checked_sub(amount_1.unsigned_abs())
                .ok_or(ErrorCode::InvalidAmount)?
        };
        Ok((reserve_0, reserve_1))
    }
}

fn u256_to_i128(value: U256) -> Result<i128> {
    if value.bits() > 127 {
        return Err(ErrorCode::Overflow);
    }
    Ok(value.low_u128() as i128)
}
