// Tests for the tick bitmap: flips, alignment, and the one-word
// next-initialized-tick search in both directions. Negative-tick
// compression is the historically bug-prone path and gets explicit
// coverage.

use crate::errors::ErrorCode;
use crate::tick_bitmap::TickBitmap;

// ========== flips and membership ==========

#[test]
fn flip_sets_and_clears() {
    let mut bitmap = TickBitmap::new();
    assert!(!bitmap.is_initialized(60, 60));

    bitmap.flip_tick(60, 60).unwrap();
    assert!(bitmap.is_initialized(60, 60));
    // Neighbors untouched.
    assert!(!bitmap.is_initialized(0, 60));
    assert!(!bitmap.is_initialized(120, 60));

    bitmap.flip_tick(60, 60).unwrap();
    assert!(!bitmap.is_initialized(60, 60));
}

#[test]
fn flip_rejects_unaligned_tick() {
    let mut bitmap = TickBitmap::new();
    assert_eq!(bitmap.flip_tick(61, 60), Err(ErrorCode::TickNotAligned));
    assert_eq!(bitmap.flip_tick(-61, 60), Err(ErrorCode::TickNotAligned));
}

#[test]
fn negative_ticks_compress_with_floor_semantics() {
    let mut bitmap = TickBitmap::new();
    // -60 compresses to -1, which lives in word -1, bit 255.
    bitmap.flip_tick(-60, 60).unwrap();
    assert!(bitmap.is_initialized(-60, 60));
    assert!(!bitmap.is_initialized(60, 60));
    assert!(!bitmap.is_initialized(-120, 60));

    // -15360 compresses to -256: first bit of word -1.
    bitmap.flip_tick(-15360, 60).unwrap();
    assert!(bitmap.is_initialized(-15360, 60));
}

// ========== downward search (lte) ==========

#[test]
fn lte_search_finds_tick_at_current_position() {
    let mut bitmap = TickBitmap::new();
    bitmap.flip_tick(0, 60).unwrap();
    let (next, found) = bitmap.next_initialized_tick_within_one_word(0, 60, true);
    assert!(found);
    assert_eq!(next, 0);
}

#[test]
fn lte_search_finds_lower_tick_in_same_word() {
    let mut bitmap = TickBitmap::new();
    bitmap.flip_tick(-60, 60).unwrap();
    bitmap.flip_tick(-180, 60).unwrap();

    let (next, found) = bitmap.next_initialized_tick_within_one_word(-60, 60, true);
    assert!(found);
    assert_eq!(next, -60);

    let (next, found) = bitmap.next_initialized_tick_within_one_word(-61, 60, true);
    assert!(found);
    assert_eq!(next, -180);
}

#[test]
fn lte_search_returns_word_boundary_when_empty() {
    let bitmap = TickBitmap::new();
    // Tick 0 sits at word 0, bit 0: the word edge is tick 0 itself.
    let (next, found) = bitmap.next_initialized_tick_within_one_word(0, 60, true);
    assert!(!found);
    assert_eq!(next, 0);

    // Tick -60 (compressed -1) sits at bit 255 of word -1; the edge is
    // compressed -256, i.e. tick -15360.
    let (next, found) = bitmap.next_initialized_tick_within_one_word(-60, 60, true);
    assert!(!found);
    assert_eq!(next, -15360);
}

// ========== upward search ==========

#[test]
fn gt_search_skips_current_tick() {
    let mut bitmap = TickBitmap::new();
    bitmap.flip_tick(0, 60).unwrap();
    bitmap.flip_tick(120, 60).unwrap();

    // The search is strictly greater-than: tick 0 itself is behind.
    let (next, found) = bitmap.next_initialized_tick_within_one_word(0, 60, false);
    assert!(found);
    assert_eq!(next, 120);
}

#[test]
fn gt_search_from_below_finds_first_candidate() {
    let mut bitmap = TickBitmap::new();
    bitmap.flip_tick(60, 60).unwrap();
    let (next, found) = bitmap.next_initialized_tick_within_one_word(-60, 60, false);
    assert!(found);
    assert_eq!(next, 60);
}

#[test]
fn gt_search_returns_word_boundary_when_empty() {
    let bitmap = TickBitmap::new();
    // From tick 0 the remaining word spans compressed 1..=255.
    let (next, found) = bitmap.next_initialized_tick_within_one_word(0, 60, false);
    assert!(!found);
    assert_eq!(next, 255 * 60);
}

#[test]
fn searches_stay_within_one_word() {
    let mut bitmap = TickBitmap::new();
    // Initialized tick in the next word must not be visible.
    bitmap.flip_tick(256 * 60, 60).unwrap();
    let (next, found) = bitmap.next_initialized_tick_within_one_word(0, 60, false);
    assert!(!found);
    assert_eq!(next, 255 * 60);

    // But a search starting inside that word sees it.
    let (next, found) = bitmap.next_initialized_tick_within_one_word(255 * 60, 60, false);
    assert!(found);
    assert_eq!(next, 256 * 60);
}

#[test]
fn spacing_one_uses_raw_ticks() {
    let mut bitmap = TickBitmap::new();
    bitmap.flip_tick(-257, 1).unwrap();
    bitmap.flip_tick(-255, 1).unwrap();

    // -256 is bit 0 of word -1; -257 lives in the previous word and must
    // stay invisible, so the search stops at the word edge.
    let (next, found) = bitmap.next_initialized_tick_within_one_word(-256, 1, true);
    assert!(!found);
    assert_eq!(next, -256);

    let (next, found) = bitmap.next_initialized_tick_within_one_word(-256, 1, false);
    assert!(found);
    assert_eq!(next, -255);
}
