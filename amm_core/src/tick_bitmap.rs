//! Compressed index of initialized ticks.
//!
//! Each pool tracks which ticks carry liquidity in a sparse map of 256-bit
//! words. A tick is first compressed by the pool's tick spacing, then split
//! into a signed 16-bit word index and a bit position within the word.
//! The swap loop asks for the next initialized tick in its direction and
//! never scans more than one word per iteration; when a word holds no
//! candidate the boundary tick of that word is returned so the caller
//! skips the whole word in a single step.
//!
//! Compression uses mathematical floor division. Truncating division would
//! fold the compressed ticks around zero and corrupt lookups for negative
//! ticks.

use crate::errors::{ErrorCode, Result};
use crate::math;
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Sparse map from word index to a 256-bit occupancy word.
///
/// Bit `b` of word `w` corresponds to compressed tick `w * 256 + b`, i.e.
/// real tick `(w * 256 + b) * tick_spacing`.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickBitmap {
    words: HashMap<i16, U256>,
}

/// Splits a compressed tick into its word index and bit position.
fn position(compressed: i32) -> (i16, u8) {
    ((compressed >> 8) as i16, (compressed & 0xff) as u8)
}

impl TickBitmap {
    /// Creates an empty bitmap.
    pub fn new() -> Self {
        Self::default()
    }

    fn word(&self, word_pos: i16) -> U256 {
        self.words.get(&word_pos).copied().unwrap_or_default()
    }

    /// Toggles the initialized state of `tick`.
    ///
    /// Fails with [`ErrorCode::TickNotAligned`] when `tick` is not a
    /// multiple of `tick_spacing`. Fully-cleared words are dropped from the
    /// map.
    pub fn flip_tick(&mut self, tick: i32, tick_spacing: u32) -> Result<()> {
        let spacing = tick_spacing as i32;
        if tick.rem_euclid(spacing) != 0 {
            return Err(ErrorCode::TickNotAligned);
        }
        let (word_pos, bit_pos) = position(math::floor_div(tick, spacing));
        let word = self.words.entry(word_pos).or_default();
        *word = *word ^ (U256::one() << (bit_pos as usize));
        let cleared = word.is_zero();
        if cleared {
            self.words.remove(&word_pos);
        }
        Ok(())
    }

    /// Whether `tick` is marked initialized.
    pub fn is_initialized(&self, tick: i32, tick_spacing: u32) -> bool {
        let spacing = tick_spacing as i32;
        if tick.rem_euclid(spacing) != 0 {
            return false;
        }
        let (word_pos, bit_pos) = position(math::floor_div(tick, spacing));
        !(self.word(word_pos) & (U256::one() << (bit_pos as usize))).is_zero()
    }

    /// Next initialized tick within the word containing `tick`.
    ///
    /// With `lte` set the search runs downward and may return `tick`
    /// itself; otherwise it runs strictly upward. Returns
    /// `(next_tick, true)` when an initialized tick was found, and the
    /// word-boundary tick with `false` when the word is empty in the
    /// search direction, so a swap loop advances across one full word per
    /// call.
    pub fn next_initialized_tick_within_one_word(
        &self,
        tick: i32,
        tick_spacing: u32,
        lte: bool,
    ) -> (i32, bool) {
        let spacing = tick_spacing as i32;
        let compressed = math::floor_div(tick, spacing);

        if lte {
            let (word_pos, bit_pos) = position(compressed);
            // All bits at or below bit_pos.
            let mask = ((U256::one() << (bit_pos as usize)) - U256::one())
                | (U256::one() << (bit_pos as usize));
            let masked = self.word(word_pos) & mask;

            if masked.is_zero() {
                ((compressed - bit_pos as i32) * spacing, false)
            } else {
                let msb = 255 - masked.leading_zeros() as i32;
                ((compressed - (bit_pos as i32 - msb)) * spacing, true)
            }
        } else {
            // Start from the next compressed tick; the current one is
            // already behind the swap.
            let next = compressed + 1;
            let (word_pos, bit_pos) = position(next);
            // All bits at or above bit_pos.
            let mask = !((U256::one() << (bit_pos as usize)) - U256::one());
            let masked = self.word(word_pos) & mask;

            if masked.is_zero() {
                ((next + (255 - bit_pos as i32)) * spacing, false)
            } else {
                let lsb = masked.trailing_zeros() as i32;
                ((next + (lsb - bit_pos as i32)) * spacing, true)
            }
        }
    }
}
