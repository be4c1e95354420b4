//! Bijection between tick indices and Q64.96 sqrt prices.
//!
//! A tick `t` represents the sqrt price `sqrt(1.0001)^t`. The forward
//! direction multiplies pre-tabulated Q128.128 factors
//! `sqrt(1.0001)^(-2^k)` for each set bit of `|t|` and inverts for
//! positive ticks; the reverse direction recovers the base-2 logarithm
//! from the most significant bit and fourteen squaring steps, then scales
//! by `log2(sqrt(1.0001))`. Both directions reproduce the reference
//! constants bit for bit, which keeps independently-built pools
//! interoperable.

use crate::constants::{MAX_SQRT_RATIO, MAX_TICK, MIN_SQRT_RATIO, MIN_TICK};
use crate::errors::{ErrorCode, Result};
use primitive_types::U256;

/// Q128.128 factors `sqrt(1.0001)^(-2^k)` for k in 0..20.
const SQRT_RATIO_FACTORS: [U256; 20] = [
    U256([12262481743371124737, 18445821805675392311, 0, 0]),
    U256([6459403834229662010, 18444899583751176498, 0, 0]),
    U256([17226890335427755468, 18443055278223354162, 0, 0]),
    U256([2032852871939366096, 18439367220385604838, 0, 0]),
    U256([14545316742740207172, 18431993317065449817, 0, 0]),
    U256([5129152022828963008, 18417254355718160513, 0, 0]),
    U256([4894419605888772193, 18387811781193591352, 0, 0]),
    U256([1280255884321894483, 18329067761203520168, 0, 0]),
    U256([15924666964335305636, 18212142134806087854, 0, 0]),
    U256([8010504389359918676, 17980523815641551639, 0, 0]),
    U256([10668036004952895731, 17526086738831147013, 0, 0]),
    U256([4878133418470705625, 16651378430235024244, 0, 0]),
    U256([9537173718739605541, 15030750278693429944, 0, 0]),
    U256([9972618978014552549, 12247334978882834399, 0, 0]),
    U256([10428997489610666743, 8131365268884726200, 0, 0]),
    U256([9305304367709015974, 3584323654723342297, 0, 0]),
    U256([14301143598189091785, 696457651847595233, 0, 0]),
    U256([7393154844743099908, 26294789957452057, 0, 0]),
    U256([2209338891292245656, 37481735321082, 0, 0]),
    U256([10518117631919034274, 76158723, 0, 0]),
];

/// 1.0 in Q128.128.
const ONE_X128: U256 = U256([0, 0, 1, 0]);

/// `log2(sqrt(1.0001))` in Q128.128: 255738958999603826347141.
const LOG_2_SQRT_10001: U256 = U256([11745905768312294533, 13863, 0, 0]);

/// Correction subtracted for the low tick candidate:
/// 3402992956809132418596140100660247210.
const TICK_LOW_CORRECTION: U256 = U256([6552757943157144234, 184476617836266586, 0, 0]);

/// Correction added for the high tick candidate:
/// 291339464771989622907027621153398088495.
const TICK_HIGH_CORRECTION: U256 =
    U256([4998474450511881007, 15793544031827761793, 0, 0]);

/// Returns the sqrt price of `tick` as a Q64.96 value.
///
/// Fails with [`ErrorCode::TickOutOfRange`] outside
/// `[MIN_TICK, MAX_TICK]`.
pub fn sqrt_ratio_at_tick(tick: i32) -> Result<U256> {
    if !(MIN_TICK..=MAX_TICK).contains(&tick) {
        return Err(ErrorCode::TickOutOfRange);
    }
    let abs_tick = tick.unsigned_abs();

    let mut ratio = if abs_tick & 1 != 0 {
        SQRT_RATIO_FACTORS[0]
    } else {
        ONE_X128
    };
    for (k, factor) in SQRT_RATIO_FACTORS.iter().enumerate().skip(1) {
        if abs_tick & (1u32 << k) != 0 {
            ratio = mul_shift_128(ratio, *factor);
        }
    }

    if tick > 0 {
        ratio = U256::MAX / ratio;
    }

    // Q128.128 -> Q64.96: divide by 2^32 rounding up, so converting the
    // result back through `tick_at_sqrt_ratio` is always consistent.
    let shifted = ratio >> 32usize;
    if (ratio & U256::from(u32::MAX)).is_zero() {
        Ok(shifted)
    } else {
        Ok(shifted + U256::one())
    }
}

/// `(a * b) >> 128` where both factors are below 2^128.
fn mul_shift_128(a: U256, b: U256) -> U256 {
    let product = a.full_mul(b) >> 128usize;
    let mut limbs = [0u64; 4];
    limbs.copy_from_slice(&product.0[..4]);
    U256(limbs)
}

/// Arithmetic (sign-extending) right shift on a two's-complement `U256`.
fn asr(value: U256, shift: usize) -> U256 {
    let logical = value >> shift;
    if value.bit(255) {
        logical | !(U256::MAX >> shift)
    } else {
        logical
    }
}

/// Returns the greatest tick whose sqrt price is at most `sqrt_price_x96`.
///
/// Fails with [`ErrorCode::PriceOutOfRange`] outside
/// `[MIN_SQRT_RATIO, MAX_SQRT_RATIO]`.
pub fn tick_at_sqrt_ratio(sqrt_price_x96: U256) -> Result<i32> {
    if sqrt_price_x96 < MIN_SQRT_RATIO || sqrt_price_x96 > MAX_SQRT_RATIO {
        return Err(ErrorCode::PriceOutOfRange);
    }

    let ratio = sqrt_price_x96 << 32usize;
    let msb = (ratio.bits() - 1) as u32;

    let mut r = if msb >= 128 {
        ratio >> ((msb - 127) as usize)
    } else {
        ratio << ((127 - msb) as usize)
    };

    // log2(ratio) in signed Q192.64, carried in two's complement.
    let mut log_2 = if msb >= 128 {
        U256::from(msb - 128) << 64usize
    } else {
        U256::zero().overflowing_sub(U256::from(128 - msb) << 64usize).0
    };

    for i in 0..14usize {
        // r stays in [2^127, 2^129) here, so the square fits 512 bits and
        // the shifted result fits 256.
        let squared = r.full_mul(r) >> 127usize;
        let mut limbs = [0u64; 4];
        limbs.copy_from_slice(&squared.0[..4]);
        r = U256(limbs);

        let bit = r >> 128usize;
        log_2 = log_2 | (bit << (63 - i));
        r = r >> (bit.low_u64() as usize);
    }

    let log_sqrt_10001 = log_2.overflowing_mul(LOG_2_SQRT_10001).0;

    let tick_low = asr(
        log_sqrt_10001.overflowing_sub(TICK_LOW_CORRECTION).0,
        128,
    )
    .low_u32() as i32;
    let tick_high = asr(
        log_sqrt_10001.overflowing_add(TICK_HIGH_CORRECTION).0,
        128,
    )
    .low_u32() as i32;

    if tick_low == tick_high {
        Ok(tick_low)
    } else if sqrt_ratio_at_tick(tick_high)? <= sqrt_price_x96 {
        Ok(tick_high)
    } else {
        Ok(tick_low)
    }
}
