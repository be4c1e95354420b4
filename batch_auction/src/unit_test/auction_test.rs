// Tests for order placement, cancellation, escrow bookkeeping and the
// batch window state machine. Full clearing scenarios live under tests/.

use crate::auction::AuctionHouse;
use crate::errors::AuctionError;
use amm_core::constants::Q96;
use amm_core::Pool;

const WINDOW_MS: u64 = 1_000;

fn house() -> AuctionHouse {
    AuctionHouse::new(1, WINDOW_MS, 0)
}

fn pool() -> Pool {
    Pool::new(1, 3000, 60, Q96).unwrap()
}

// ========== placement ==========

#[test]
fn place_assigns_dense_ids_and_escrows() {
    let mut house = house();
    let a = house.place_order(1, true, 100, 0, 10).unwrap();
    let b = house.place_order(2, false, 250, 0, 20).unwrap();
    assert_eq!(a, 0);
    assert_eq!(b, 1);
    assert_eq!(house.escrow_balances(), (100, 250));
    assert_eq!(house.open_orders(), 2);

    let order = house.order(a).unwrap();
    assert!(order.is_bid);
    assert_eq!(order.amount_in, 100);
    assert_eq!(order.placed_at_ms, 10);
}

#[test]
fn place_rejects_zero_amount() {
    let mut house = house();
    assert_eq!(
        house.place_order(1, true, 0, 0, 10),
        Err(AuctionError::ZeroAmount)
    );
}

#[test]
fn place_rejects_after_window_elapsed() {
    let mut house = house();
    assert_eq!(
        house.place_order(1, true, 100, 0, WINDOW_MS),
        Err(AuctionError::AuctionExpired)
    );
    assert!(house.window_open(WINDOW_MS - 1));
    assert!(!house.window_open(WINDOW_MS));
}

// ========== cancellation ==========

#[test]
fn cancel_refunds_escrow() {
    let mut house = house();
    let id = house.place_order(1, false, 400, 0, 10).unwrap();
    let refund = house.cancel_order(1, id).unwrap();
    assert_eq!(refund, 400);
    assert_eq!(house.escrow_balances(), (0, 0));
    assert!(house.order(id).is_none());
}

#[test]
fn cancel_enforces_ownership_and_existence() {
    let mut house = house();
    let id = house.place_order(1, true, 100, 0, 10).unwrap();
    assert_eq!(house.cancel_order(2, id), Err(AuctionError::Unauthorized));
    assert_eq!(house.cancel_order(1, 999), Err(AuctionError::OrderNotFound));
    // The failed attempts changed nothing.
    assert_eq!(house.escrow_balances(), (100, 0));
}

// ========== batch window ==========

#[test]
fn execute_requires_elapsed_window() {
    let mut house = house();
    let mut pool = pool();
    assert_eq!(
        house.execute_batch(&mut pool, WINDOW_MS - 1),
        Err(AuctionError::AuctionNotActive)
    );
}

#[test]
fn execute_rejects_foreign_pool() {
    let mut house = house();
    let mut other = Pool::new(9, 3000, 60, Q96).unwrap();
    assert_eq!(
        house.execute_batch(&mut other, WINDOW_MS),
        Err(AuctionError::WrongPool)
    );
}

// ========== escrow conservation ==========

proptest::proptest! {
    #[test]
    fn escrow_always_matches_live_orders(
        actions in proptest::collection::vec(
            (proptest::bool::ANY, 1u64..1_000_000, proptest::bool::ANY),
            1..40,
        )
    ) {
        let mut house = house();
        let mut live = Vec::new();

        for (is_bid, amount, cancel_one) in actions {
            let id = house.place_order(1, is_bid, amount, 0, 10).unwrap();
            live.push(id);
            if cancel_one && !live.is_empty() {
                let victim = live.swap_remove(live.len() / 2);
                house.cancel_order(1, victim).unwrap();
            }

            // The escrowed balance on each side equals the sum of the
            // live orders' inputs on that side.
            let (escrow_0, escrow_1) = house.escrow_balances();
            let sum_0: u128 = live
                .iter()
                .filter_map(|id| house.order(*id))
                .filter(|o| o.is_bid)
                .map(|o| o.amount_in as u128)
                .sum();
            let sum_1: u128 = live
                .iter()
                .filter_map(|id| house.order(*id))
                .filter(|o| !o.is_bid)
                .map(|o| o.amount_in as u128)
                .sum();
            proptest::prop_assert_eq!(escrow_0, sum_0);
            proptest::prop_assert_eq!(escrow_1, sum_1);
        }
    }
}

#[test]
fn empty_batch_rolls_the_window() {
    let mut house = house();
    let mut pool = pool();

    let settlement = house.execute_batch(&mut pool, WINDOW_MS).unwrap();
    assert_eq!(settlement.batch_id, 0);
    assert!(settlement.fills.is_empty());
    assert!(settlement.refunds.is_empty());
    assert!(settlement.pool_trade.is_none());

    assert_eq!(house.batch_id(), 1);
    // The window restarted at execution time.
    assert!(house.window_open(WINDOW_MS + 1));
    house.place_order(1, true, 10, 0, WINDOW_MS + 1).unwrap();
}
