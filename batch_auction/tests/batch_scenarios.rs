//! Clearing scenarios: balanced books that never touch the pool,
//! imbalanced books routing their surplus through it, limit misses,
//! graceful handling of unswappable surplus, and the dust bound.

use amm_core::constants::{MIN_SQRT_RATIO, Q96};
use amm_core::Pool;
use batch_auction::AuctionHouse;

const WINDOW_MS: u64 = 1_000;
const FEE: u32 = 3000;
const SPACING: u32 = 60;

fn pool_with_liquidity() -> Pool {
    let mut pool = Pool::new(1, FEE, SPACING, Q96).unwrap();
    pool.mint(99, -600, 600, 1_000_000_000_000, u64::MAX, u64::MAX)
        .unwrap();
    pool
}

// ========== balanced book ==========

#[test]
fn balanced_book_clears_without_touching_the_pool() {
    let mut pool = pool_with_liquidity();
    let mut house = AuctionHouse::new(1, WINDOW_MS, 0);

    house.place_order(1, true, 100, 0, 10).unwrap();
    house.place_order(2, true, 100, 0, 10).unwrap();
    house.place_order(3, false, 100, 0, 10).unwrap();
    house.place_order(4, false, 100, 0, 10).unwrap();

    let slot0_before = pool.slot0();
    let settlement = house.execute_batch(&mut pool, WINDOW_MS).unwrap();

    // Perfectly matched flow: zero surplus, no pool trade.
    assert!(settlement.pool_trade.is_none());
    assert_eq!(pool.slot0(), slot0_before);
    assert_eq!(settlement.clearing_price_x96, Q96);

    // Everyone filled in full, pro rata.
    assert!(settlement.refunds.is_empty());
    assert_eq!(settlement.fills.len(), 4);
    for fill in &settlement.fills {
        assert_eq!(fill.amount_out, 100);
    }

    // Escrow fully drained: no dust on a balanced book.
    assert_eq!(house.escrow_balances(), (0, 0));
    assert_eq!(house.batch_id(), 1);
}

// ========== imbalanced book ==========

#[test]
fn surplus_is_routed_through_the_pool() {
    let mut pool = pool_with_liquidity();
    let mut house = AuctionHouse::new(1, WINDOW_MS, 0);

    // Bids outweigh asks by 1500 token0.
    house.place_order(1, true, 1_000, 0, 10).unwrap();
    house.place_order(2, true, 1_000, 0, 10).unwrap();
    house.place_order(3, false, 500, 0, 10).unwrap();

    let price_before = pool.slot0().sqrt_price_x96;
    let settlement = house.execute_batch(&mut pool, WINDOW_MS).unwrap();

    // The surplus was sold to the pool, pushing the price down.
    let trade = settlement.pool_trade.expect("surplus must trade");
    assert!(trade.zero_for_one);
    assert!(trade.amount_in > 0);
    assert!(trade.amount_out > 0);
    assert!(pool.slot0().sqrt_price_x96 < price_before);

    assert!(settlement.refunds.is_empty());
    assert_eq!(settlement.fills.len(), 3);

    // Bids split the ask-side token1 plus the pool output; the lone ask
    // takes the remaining matched token0.
    let bid_total: u128 = settlement
        .fills
        .iter()
        .filter(|f| f.is_bid)
        .map(|f| f.amount_out)
        .sum();
    assert_eq!(bid_total, 500 + trade.amount_out - (500 + trade.amount_out) % 2);

    let ask_fill = settlement.fills.iter().find(|f| !f.is_bid).unwrap();
    assert_eq!(ask_fill.amount_out as u128 + trade.amount_in, 2_000);

    // Only rounding dust remains: fewer units than orders per side.
    let (dust_0, dust_1) = house.escrow_balances();
    assert!(dust_0 < 3);
    assert!(dust_1 < 3);
}

#[test]
fn one_sided_book_swaps_everything() {
    let mut pool = pool_with_liquidity();
    let mut house = AuctionHouse::new(1, WINDOW_MS, 0);

    house.place_order(1, false, 10_000, 0, 10).unwrap();

    let settlement = house.execute_batch(&mut pool, WINDOW_MS).unwrap();
    let trade = settlement.pool_trade.expect("surplus must trade");
    assert!(!trade.zero_for_one);
    assert_eq!(trade.amount_in, 10_000);

    // The single ask receives exactly the pool output.
    assert_eq!(settlement.fills.len(), 1);
    assert_eq!(settlement.fills[0].amount_out, trade.amount_out);
    assert_eq!(house.escrow_balances(), (0, 0));
}

// ========== limit misses ==========

#[test]
fn orders_missing_their_limit_are_refunded() {
    let mut pool = pool_with_liquidity();
    let mut house = AuctionHouse::new(1, WINDOW_MS, 0);

    // At a clearing price near 1.0 this ask demands the impossible.
    house.place_order(1, true, 1_000, 0, 10).unwrap();
    let greedy = house.place_order(2, false, 1_000, 1_000_000, 10).unwrap();

    let settlement = house.execute_batch(&mut pool, WINDOW_MS).unwrap();

    assert_eq!(settlement.refunds.len(), 1);
    assert_eq!(settlement.refunds[0].order_id, greedy);
    assert_eq!(settlement.refunds[0].amount_in, 1_000);

    // The bid still clears against the pool.
    let bid_fill = settlement.fills.iter().find(|f| f.is_bid).unwrap();
    assert!(bid_fill.amount_out > 0);

    // Refunded escrow is out of the house: the ask side drains to zero
    // and only dust may remain on the bid side.
    let (dust_0, dust_1) = house.escrow_balances();
    assert!(dust_0 < 2);
    assert_eq!(dust_1, 0);
}

#[test]
fn marginal_limits_use_full_precision_price() {
    let mut pool = pool_with_liquidity();
    let mut house = AuctionHouse::new(1, WINDOW_MS, 0);

    // A bid asking for exactly its input back is valid at price 1.0.
    house.place_order(1, true, 1_000, 1_000, 10).unwrap();
    house.place_order(2, false, 1_000, 0, 10).unwrap();

    let settlement = house.execute_batch(&mut pool, WINDOW_MS).unwrap();
    assert!(settlement.refunds.is_empty());
    assert_eq!(settlement.fills.len(), 2);
}

// ========== degenerate pools ==========

#[test]
fn unswappable_surplus_settles_as_reserved_dust() {
    // A pool with no liquidity at all: the surplus swap must fail and the
    // batch must still settle.
    let mut pool = Pool::new(1, FEE, SPACING, Q96).unwrap();
    let mut house = AuctionHouse::new(1, WINDOW_MS, 0);

    house.place_order(1, true, 5_000, 0, 10).unwrap();

    let settlement = house.execute_batch(&mut pool, WINDOW_MS).unwrap();
    assert!(settlement.pool_trade.is_none());
    assert!(settlement.refunds.is_empty());

    // The lone bid's fill is empty (nothing was on the other side) and
    // its input stays escrowed as reserved dust.
    assert_eq!(settlement.fills.len(), 1);
    assert_eq!(settlement.fills[0].amount_out, 0);
    assert_eq!(house.escrow_balances(), (5_000, 0));

    // The next batch starts cleanly.
    assert_eq!(house.batch_id(), 1);
    house.place_order(2, false, 100, 0, WINDOW_MS + 1).unwrap();
}

#[test]
fn extreme_price_marks_unconvertible_orders_invalid() {
    // At the bottom of the price domain the Q64.96 price floors to zero
    // and ask conversion divides by zero; those orders must be refunded,
    // not abort the batch.
    let mut pool = Pool::new(1, FEE, SPACING, MIN_SQRT_RATIO).unwrap();
    let mut house = AuctionHouse::new(1, WINDOW_MS, 0);

    house.place_order(1, false, 1_000, 0, 10).unwrap();

    let settlement = house.execute_batch(&mut pool, WINDOW_MS).unwrap();
    assert_eq!(settlement.refunds.len(), 1);
    assert!(settlement.fills.is_empty());
    assert_eq!(house.escrow_balances(), (0, 0));
}

// ========== repeated batches ==========

#[test]
fn consecutive_batches_are_independent() {
    let mut pool = pool_with_liquidity();
    let mut house = AuctionHouse::new(1, WINDOW_MS, 0);

    house.place_order(1, true, 100, 0, 10).unwrap();
    house.place_order(2, false, 100, 0, 10).unwrap();
    house.execute_batch(&mut pool, WINDOW_MS).unwrap();

    // Order ids keep growing across batches; the book starts empty.
    assert_eq!(house.open_orders(), 0);
    let id = house
        .place_order(3, true, 50, 0, WINDOW_MS + 10)
        .unwrap();
    assert_eq!(id, 2);

    let settlement = house
        .execute_batch(&mut pool, 2 * WINDOW_MS + 10)
        .unwrap();
    assert_eq!(settlement.batch_id, 1);
    assert_eq!(settlement.fills.len(), 1);
}
