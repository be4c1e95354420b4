// Tests for the position map: fee accrual against inside-growth
// snapshots, liquidity lifecycle, collection semantics and the closable
// precondition for removal.

use crate::constants::Q128;
use crate::errors::ErrorCode;
use crate::position::PositionMap;
use primitive_types::U256;

fn one_token_per_liquidity() -> U256 {
    // A growth delta of exactly one token unit per unit of liquidity.
    Q128
}

// ========== creation and updates ==========

#[test]
fn create_assigns_dense_ids() {
    let mut map = PositionMap::new();
    let a = map.create(7, -60, 60);
    let b = map.create(7, -60, 60);
    assert_eq!(a, 0);
    assert_eq!(b, 1);
    // Same owner, same range: still distinct positions.
    assert_eq!(map.len(), 2);
}

#[test]
fn update_applies_liquidity_delta() {
    let mut map = PositionMap::new();
    let id = map.create(1, -60, 60);
    let staged = map
        .staged_update(id, 1000, U256::zero(), U256::zero())
        .unwrap();
    map.commit(id, staged);
    assert_eq!(map.get(id).unwrap().liquidity, 1000);

    let staged = map
        .staged_update(id, -400, U256::zero(), U256::zero())
        .unwrap();
    map.commit(id, staged);
    assert_eq!(map.get(id).unwrap().liquidity, 600);
}

#[test]
fn update_below_zero_liquidity_fails() {
    let mut map = PositionMap::new();
    let id = map.create(1, -60, 60);
    let staged = map
        .staged_update(id, 100, U256::zero(), U256::zero())
        .unwrap();
    map.commit(id, staged);

    assert_eq!(
        map.staged_update(id, -101, U256::zero(), U256::zero()),
        Err(ErrorCode::NegativeLiquidity)
    );
    assert_eq!(
        map.staged_update(999, 1, U256::zero(), U256::zero()),
        Err(ErrorCode::InvalidPosition)
    );
}

// ========== fee accrual ==========

#[test]
fn fees_accrue_from_inside_growth_delta() {
    let mut map = PositionMap::new();
    let id = map.create(1, -60, 60);
    let staged = map
        .staged_update(id, 500, U256::zero(), U256::zero())
        .unwrap();
    map.commit(id, staged);

    // Growth of one token per liquidity unit on side 0.
    let staged = map
        .staged_update(id, 0, one_token_per_liquidity(), U256::zero())
        .unwrap();
    map.commit(id, staged);

    let position = map.get(id).unwrap();
    assert_eq!(position.tokens_owed_0, 500);
    assert_eq!(position.tokens_owed_1, 0);
    assert_eq!(
        position.fee_growth_inside_0_last_x128,
        one_token_per_liquidity()
    );

    // Re-touching with the same snapshot accrues nothing more.
    let staged = map
        .staged_update(id, 0, one_token_per_liquidity(), U256::zero())
        .unwrap();
    map.commit(id, staged);
    assert_eq!(map.get(id).unwrap().tokens_owed_0, 500);
}

#[test]
fn accrual_wraps_across_growth_rollover() {
    let mut map = PositionMap::new();
    let id = map.create(1, -60, 60);
    let mut seeded = map
        .staged_update(id, 1000, U256::zero(), U256::zero())
        .unwrap();
    // Snapshot just below the rollover point.
    seeded.fee_growth_inside_0_last_x128 = U256::MAX - Q128 + U256::one() + U256::one();
    map.commit(id, seeded);

    // Growth wrapped past zero; the wrapping delta is still 2 * Q128...
    // one Q128 step before the wrap and one after, i.e. two tokens per
    // liquidity unit.
    let staged = map
        .staged_update(id, 0, Q128 + U256::one(), U256::zero())
        .unwrap();
    assert_eq!(staged.tokens_owed_0, 2000);
}

// ========== collection ==========

#[test]
fn collect_zero_means_all() {
    let mut map = PositionMap::new();
    let id = map.create(1, -60, 60);
    let mut staged = map
        .staged_update(id, 0, U256::zero(), U256::zero())
        .unwrap();
    staged.tokens_owed_0 = 700;
    staged.tokens_owed_1 = 40;
    map.commit(id, staged);

    let (taken_0, taken_1) = map.collect(id, 0, 0).unwrap();
    assert_eq!((taken_0, taken_1), (700, 40));
    let position = map.get(id).unwrap();
    assert_eq!(position.tokens_owed_0, 0);
    assert_eq!(position.tokens_owed_1, 0);
}

#[test]
fn collect_is_capped_by_max() {
    let mut map = PositionMap::new();
    let id = map.create(1, -60, 60);
    let mut staged = map
        .staged_update(id, 0, U256::zero(), U256::zero())
        .unwrap();
    staged.tokens_owed_0 = 700;
    map.commit(id, staged);

    let (taken_0, _) = map.collect(id, 300, 0).unwrap();
    assert_eq!(taken_0, 300);
    assert_eq!(map.get(id).unwrap().tokens_owed_0, 400);

    // Asking for more than owed takes only what exists.
    let (taken_0, _) = map.collect(id, 1_000_000, 0).unwrap();
    assert_eq!(taken_0, 400);
}

// ========== removal ==========

#[test]
fn remove_requires_closable_state() {
    let mut map = PositionMap::new();
    let id = map.create(1, -60, 60);
    let staged = map
        .staged_update(id, 100, U256::zero(), U256::zero())
        .unwrap();
    map.commit(id, staged);

    // Live liquidity blocks removal.
    assert_eq!(map.remove(id), Err(ErrorCode::InvalidPosition));

    let staged = map
        .staged_update(id, -100, U256::zero(), U256::zero())
        .unwrap();
    map.commit(id, staged);
    map.remove(id).unwrap();
    assert!(map.get(id).is_none());
}
