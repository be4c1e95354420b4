//! Uniform-price batch clearing.
//!
//! Orders collected over a window are cleared together at a single price.
//! Discovery starts from the pool's spot price and iterates: classify
//! every order against the candidate price, aggregate the valid flow on
//! each side, and push the net surplus through a simulated pool swap; the
//! realized marginal price becomes the next candidate. After a bounded
//! number of rounds the surplus is swapped for real, exactly once, and
//! everything else settles pro rata against the escrowed balances, so the
//! pool sees only the imbalance between the two sides, never the matched
//! flow.
//!
//! The clearing price is carried at full Q64.96 precision throughout;
//! coarser representations misclassify borderline orders for
//! low-decimals tokens.

use crate::errors::{AuctionError, Result};
use crate::order::Order;
use amm_core::constants::{MAX_SQRT_RATIO, MIN_SQRT_RATIO, Q96};
use amm_core::{math, OwnerId, Pool};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::BTreeSet;

/// Tuning parameters of the price-discovery loop.
///
/// The fixed iteration cap is pragmatic rather than guaranteed to
/// converge for adversarial books; when the cap is hit the last candidate
/// price settles the batch, and the documented rounding invariants still
/// hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearingConfig {
    /// Maximum price-discovery rounds per batch.
    pub max_price_rounds: u32,
    /// Absolute convergence tolerance on the Q64.96 clearing price.
    pub price_tolerance_x96: U256,
}

impl Default for ClearingConfig {
    fn default() -> Self {
        ClearingConfig {
            max_price_rounds: 4,
            // 2^64 in x96 units: about 2.3e-10 in price terms.
            price_tolerance_x96: U256([0, 1, 0, 0]),
        }
    }
}

/// Payout of one filled order, denominated in its output token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fill {
    /// The filled order.
    pub order_id: u64,
    /// Recipient of the payout.
    pub owner: OwnerId,
    /// True when the order sold token0.
    pub is_bid: bool,
    /// Amount paid out in the opposite token.
    pub amount_out: u128,
}

/// Refund of an order that missed its limit at the clearing price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refund {
    /// The refunded order.
    pub order_id: u64,
    /// Recipient of the refund.
    pub owner: OwnerId,
    /// True when the order sold token0.
    pub is_bid: bool,
    /// The escrowed input returned untouched.
    pub amount_in: u64,
}

/// The single pool swap a batch performed, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolTrade {
    /// Swap direction: true when surplus token0 was sold to the pool.
    pub zero_for_one: bool,
    /// Input the pool consumed, including its fee.
    pub amount_in: u128,
    /// Output the pool returned.
    pub amount_out: u128,
}

/// Ledger of one executed batch. The host moves coins according to this;
/// the auction house has already adjusted its escrow balances to match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    /// The batch that was executed.
    pub batch_id: u64,
    /// Final uniform clearing price, Q64.96 token1-per-token0.
    pub clearing_price_x96: U256,
    /// Pro-rata payouts to orders that made their limit.
    pub fills: Vec<Fill>,
    /// Refunds to orders that did not.
    pub refunds: Vec<Refund>,
    /// The net-surplus swap routed through the pool.
    pub pool_trade: Option<PoolTrade>,
}

/// Escrowed orders and clearing state for one pool's token pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuctionHouse {
    pool_id: u64,
    batch_id: u64,
    batch_duration_ms: u64,
    last_batch_start_ms: u64,
    orders: BTreeMap<u64, Order>,
    order_count: u64,
    escrow_0: u128,
    escrow_1: u128,
    config: ClearingConfig,
}

impl AuctionHouse {
    /// Creates an auction house clearing against `pool_id`, with the
    /// default discovery parameters.
    pub fn new(pool_id: u64, batch_duration_ms: u64, now_ms: u64) -> Self {
        Self::with_config(pool_id, batch_duration_ms, now_ms, ClearingConfig::default())
    }

    /// Creates an auction house with explicit discovery parameters.
    pub fn with_config(
        pool_id: u64,
        batch_duration_ms: u64,
        now_ms: u64,
        config: ClearingConfig,
    ) -> Self {
        AuctionHouse {
            pool_id,
            batch_id: 0,
            batch_duration_ms,
            last_batch_start_ms: now_ms,
            orders: BTreeMap::new(),
            order_count: 0,
            escrow_0: 0,
            escrow_1: 0,
            config,
        }
    }

    /// Identifier of the current batch.
    pub fn batch_id(&self) -> u64 {
        self.batch_id
    }

    /// Whether new orders are currently accepted.
    pub fn window_open(&self, now_ms: u64) -> bool {
        now_ms < self.last_batch_start_ms.saturating_add(self.batch_duration_ms)
    }

    /// Escrowed balances `(token0, token1)`.
    pub fn escrow_balances(&self) -> (u128, u128) {
        (self.escrow_0, self.escrow_1)
    }

    /// Looks up a live order.
    pub fn order(&self, id: u64) -> Option<&Order> {
        self.orders.get(&id)
    }

    /// Number of live orders in the current batch.
    pub fn open_orders(&self) -> usize {
        self.orders.len()
    }

    /// Escrows `amount_in` and records the order. Fails once the batch
    /// window has elapsed.
    pub fn place_order(
        &mut self,
        owner: OwnerId,
        is_bid: bool,
        amount_in: u64,
        min_amount_out: u64,
        now_ms: u64,
    ) -> Result<u64> {
        if amount_in == 0 {
            return Err(AuctionError::ZeroAmount);
        }
        if !self.window_open(now_ms) {
            return Err(AuctionError::AuctionExpired);
        }

        let escrow = if is_bid {
            &mut self.escrow_0
        } else {
            &mut self.escrow_1
        };
        let raised = escrow
            .checked_add(amount_in as u128)
            .ok_or(AuctionError::BidTooHigh)?;

        let id = self.order_count;
        self.order_count += 1;
        *escrow = raised;
        self.orders.insert(
            id,
            Order {
                id,
                owner,
                amount_in,
                min_amount_out,
                is_bid,
                placed_at_ms: now_ms,
            },
        );
        Ok(id)
    }

    /// Removes an order and releases its escrow back to the owner.
    /// Returns the refund amount.
    pub fn cancel_order(&mut self, owner: OwnerId, order_id: u64) -> Result<u64> {
        let order = self
            .orders
            .get(&order_id)
            .ok_or(AuctionError::OrderNotFound)?;
        if order.owner != owner {
            return Err(AuctionError::Unauthorized);
        }

        let order = self.orders.remove(&order_id).ok_or(AuctionError::OrderNotFound)?;
        if order.is_bid {
            self.escrow_0 -= order.amount_in as u128;
        } else {
            self.escrow_1 -= order.amount_in as u128;
        }
        Ok(order.amount_in)
    }

    /// Clears the batch against `pool` at a single uniform price.
    ///
    /// Requires the batch window to have elapsed. Returns the settlement
    /// ledger; the order table is cleared and the next window starts at
    /// `now_ms`.
    pub fn execute_batch(&mut self, pool: &mut Pool, now_ms: u64) -> Result<Settlement> {
        if pool.pool_id() != self.pool_id {
            return Err(AuctionError::WrongPool);
        }
        if self.window_open(now_ms) {
            return Err(AuctionError::AuctionNotActive);
        }

        let mut price_x96 = price_x96_from_sqrt(pool.slot0().sqrt_price_x96)?;

        // Price discovery: re-classify, net out, simulate, repeat.
        for _ in 0..self.config.max_price_rounds {
            let book = BookView::classify(&self.orders, price_x96);
            if book.valid_0_in == 0 && book.valid_1_in == 0 {
                break;
            }
            let Some((zero_for_one, surplus)) = book.net_surplus(price_x96) else {
                break;
            };
            if surplus == 0 {
                break;
            }

            let limit = if zero_for_one {
                MIN_SQRT_RATIO + U256::one()
            } else {
                MAX_SQRT_RATIO - U256::one()
            };
            let quote =
                match pool.quote_swap(zero_for_one, clamp_to_i128(surplus), limit) {
                    Ok(quote) => quote,
                    // An unswappable surplus (e.g. an empty pool) pins the
                    // price where it is.
                    Err(_) => break,
                };
            let realized = price_x96_from_sqrt(quote.sqrt_price_after_x96)?;
            let converged = abs_diff(realized, price_x96) < self.config.price_tolerance_x96;
            price_x96 = realized;
            if converged {
                break;
            }
        }

        // Final classification and the one committed swap.
        let book = BookView::classify(&self.orders, price_x96);
        let surplus = book.net_surplus(price_x96);

        let mut pool_trade = None;
        let (mut swapped_in, mut swapped_out) = (0u128, 0u128);
        let mut surplus_side_zero_for_one = true;
        if let Some((zero_for_one, amount)) = surplus {
            surplus_side_zero_for_one = zero_for_one;
            if amount > 0 {
                let limit = if zero_for_one {
                    MIN_SQRT_RATIO + U256::one()
                } else {
                    MAX_SQRT_RATIO - U256::one()
                };
                match pool.swap(zero_for_one, clamp_to_i128(amount), limit) {
                    Ok((amount_0, amount_1)) => {
                        let (consumed, produced) = if zero_for_one {
                            (amount_0 as u128, amount_1.unsigned_abs())
                        } else {
                            (amount_1 as u128, amount_0.unsigned_abs())
                        };
                        swapped_in = consumed;
                        swapped_out = produced;
                        pool_trade = Some(PoolTrade {
                            zero_for_one,
                            amount_in: consumed,
                            amount_out: produced,
                        });
                    }
                    Err(error) => {
                        // The leftover surplus stays escrowed as reserved
                        // dust; the batch still settles.
                        tracing::warn!(
                            batch_id = self.batch_id,
                            ?error,
                            "surplus swap failed; settling without pool trade"
                        );
                    }
                }
            }
        }

        // Amounts available to each side after the swap.
        let overflow = AuctionError::Pool(amm_core::ErrorCode::Overflow);
        let (bid_pool_1, ask_pool_0) = if surplus_side_zero_for_one {
            (
                book.valid_1_in
                    .checked_add(swapped_out)
                    .ok_or(overflow)?,
                book.valid_0_in.checked_sub(swapped_in).ok_or(overflow)?,
            )
        } else {
            (
                book.valid_1_in.checked_sub(swapped_in).ok_or(overflow)?,
                book.valid_0_in
                    .checked_add(swapped_out)
                    .ok_or(overflow)?,
            )
        };

        // Pro-rata settlement; floor division leaves at most N-1 units of
        // dust per side in escrow.
        let mut fills = Vec::new();
        let mut refunds = Vec::new();
        let mut escrow_0 = self.escrow_0;
        let mut escrow_1 = self.escrow_1;
        if surplus_side_zero_for_one {
            escrow_0 = escrow_0.checked_sub(swapped_in).ok_or(overflow)?;
            escrow_1 = escrow_1.checked_add(swapped_out).ok_or(overflow)?;
        } else {
            escrow_1 = escrow_1.checked_sub(swapped_in).ok_or(overflow)?;
            escrow_0 = escrow_0.checked_add(swapped_out).ok_or(overflow)?;
        }

        for (&id, order) in &self.orders {
            if !book.valid.contains(&id) {
                refunds.push(Refund {
                    order_id: id,
                    owner: order.owner,
                    is_bid: order.is_bid,
                    amount_in: order.amount_in,
                });
                if order.is_bid {
                    escrow_0 = escrow_0
                        .checked_sub(order.amount_in as u128)
                        .ok_or(overflow)?;
                } else {
                    escrow_1 = escrow_1
                        .checked_sub(order.amount_in as u128)
                        .ok_or(overflow)?;
                }
                continue;
            }

            let amount_out = if order.is_bid {
                pro_rata(order.amount_in, bid_pool_1, book.valid_0_in).ok_or(overflow)?
            } else {
                pro_rata(order.amount_in, ask_pool_0, book.valid_1_in).ok_or(overflow)?
            };
            if order.is_bid {
                escrow_1 = escrow_1.checked_sub(amount_out).ok_or(overflow)?;
            } else {
                escrow_0 = escrow_0.checked_sub(amount_out).ok_or(overflow)?;
            }
            fills.push(Fill {
                order_id: id,
                owner: order.owner,
                is_bid: order.is_bid,
                amount_out,
            });
        }

        // Commit: clear the book, roll the window.
        let settlement = Settlement {
            batch_id: self.batch_id,
            clearing_price_x96: price_x96,
            fills,
            refunds,
            pool_trade,
        };
        self.orders.clear();
        self.escrow_0 = escrow_0;
        self.escrow_1 = escrow_1;
        self.batch_id += 1;
        self.last_batch_start_ms = now_ms;

        tracing::info!(
            batch_id = settlement.batch_id,
            fills = settlement.fills.len(),
            refunds = settlement.refunds.len(),
            %price_x96,
            "batch executed"
        );
        Ok(settlement)
    }
}

/// The order book classified against one candidate price.
struct BookView {
    valid: BTreeSet<u64>,
    valid_0_in: u128,
    valid_1_in: u128,
}

impl BookView {
    /// Classifies every order at `price_x96`. An order whose validity
    /// evaluation overflows is treated as invalid rather than failing the
    /// batch.
    fn classify(orders: &BTreeMap<u64, Order>, price_x96: U256) -> Self {
        let mut view = BookView {
            valid: BTreeSet::new(),
            valid_0_in: 0,
            valid_1_in: 0,
        };
        for (&id, order) in orders {
            if order_achieves_limit(order, price_x96) {
                view.valid.insert(id);
                if order.is_bid {
                    view.valid_0_in += order.amount_in as u128;
                } else {
                    view.valid_1_in += order.amount_in as u128;
                }
            }
        }
        view
    }

    /// Net imbalance between the sides at `price_x96`: `(zero_for_one,
    /// surplus)` in input-token units. `None` when the aggregate
    /// conversion itself is unrepresentable.
    fn net_surplus(&self, price_x96: U256) -> Option<(bool, u128)> {
        let value_0_in_1 =
            math::mul_div(U256::from(self.valid_0_in), price_x96, Q96).ok()?;

        if value_0_in_1 > U256::from(self.valid_1_in) {
            // More token0 offered than token1 demanded: the excess token0
            // goes through the pool.
            let matched_0 =
                math::mul_div(U256::from(self.valid_1_in), Q96, price_x96).ok()?;
            let surplus = U256::from(self.valid_0_in).saturating_sub(matched_0);
            Some((true, low_u128_saturating(surplus)))
        } else {
            let surplus = U256::from(self.valid_1_in) - value_0_in_1;
            Some((false, low_u128_saturating(surplus)))
        }
    }
}

/// Whether the order's full input meets its minimum output at the
/// candidate price. Any arithmetic failure marks the order invalid.
fn order_achieves_limit(order: &Order, price_x96: U256) -> bool {
    let amount_out = if order.is_bid {
        math::mul_div(U256::from(order.amount_in), price_x96, Q96)
    } else {
        math::mul_div(U256::from(order.amount_in), Q96, price_x96)
    };
    match amount_out {
        Ok(out) => out >= U256::from(order.min_amount_out),
        Err(_) => false,
    }
}

/// Spot price `sqrt^2 / 2^96` in Q64.96, full precision.
fn price_x96_from_sqrt(sqrt_price_x96: U256) -> Result<U256> {
    Ok(math::mul_div(sqrt_price_x96, sqrt_price_x96, Q96)?)
}

/// `amount_in * pool / side_total`, floored.
fn pro_rata(amount_in: u64, pool: u128, side_total: u128) -> Option<u128> {
    let share = math::mul_div(
        U256::from(amount_in),
        U256::from(pool),
        U256::from(side_total),
    )
    .ok()?;
    if share.bits() > 128 {
        return None;
    }
    Some(share.low_u128())
}

fn abs_diff(a: U256, b: U256) -> U256 {
    if a > b {
        a - b
    } else {
        b - a
    }
}

fn clamp_to_i128(amount: u128) -> i128 {
    amount.min(i128::MAX as u128) as i128
}

fn low_u128_saturating(value: U256) -> u128 {
    if value.bits() > 128 {
        u128::MAX
    } else {
        value.low_u128()
    }
}
