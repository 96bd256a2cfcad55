//! Probability models for single binary decisions.
//!
//! Probabilities are kept as the chance of a zero bit in 13 bit fixed point, which is what the
//! codec multiplies the interval length by.
use crate::{
    error::{Error, Result},
    traits::BitModel,
};

/// number of fractional bits in a bit probability
pub const BM_LENGTH_SHIFT: u32 = 13;

/// bit counts are halved once they go above this value
pub const BM_MAX_COUNT: u32 = 1 << BM_LENGTH_SHIFT;

pub const MIN_PROBABILITY: f64 = 0.0001;
pub const MAX_PROBABILITY: f64 = 0.9999;

const MAX_UPDATE_CYCLE: u32 = 64;

/// bit model with a fixed probability, set once before coding
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StaticBitModel {
    bit_0_prob: u32,
}

impl Default for StaticBitModel {
    /// default value is balanced between zeros or ones
    fn default() -> Self {
        StaticBitModel {
            bit_0_prob: 1 << (BM_LENGTH_SHIFT - 1),
        }
    }
}

impl StaticBitModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// sets the probability of the bit being zero, which must be within [0.0001, 0.9999]
    pub fn set_probability_0(&mut self, p0: f64) -> Result<()> {
        if !(MIN_PROBABILITY..=MAX_PROBABILITY).contains(&p0) {
            return Err(Error::Configuration("invalid bit probability"));
        }

        // the lower end of the legal range truncates to zero, which would leave no room in the
        // interval for a zero bit
        let scaled = (p0 * f64::from(1u32 << BM_LENGTH_SHIFT)) as u32;
        self.bit_0_prob = scaled.clamp(1, BM_MAX_COUNT - 1);

        Ok(())
    }
}

impl BitModel for StaticBitModel {
    #[inline(always)]
    fn bit_0_probability(&self) -> u32 {
        self.bit_0_prob
    }
}

/// bit model that re-estimates the probability of zero from the bits it has seen.
///
/// The estimate is only refreshed every `update_cycle` bits. The cycle starts short so the model
/// learns quickly, and grows by 25% per refresh up to 64 bits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdaptiveBitModel {
    update_cycle: u32,
    bits_until_update: u32,
    bit_0_prob: u32,
    bit_0_count: u32,
    bit_count: u32,
}

impl Default for AdaptiveBitModel {
    fn default() -> Self {
        AdaptiveBitModel {
            update_cycle: 4,
            bits_until_update: 4,
            bit_0_prob: 1 << (BM_LENGTH_SHIFT - 1),
            bit_0_count: 1,
            bit_count: 2,
        }
    }
}

impl AdaptiveBitModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// returns the model to equiprobable bits. Must be called before the model is reused for
    /// another stream, on both the encoding and decoding side.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// recomputes the probability from the counts gathered so far
    pub fn update(&mut self) {
        self.bit_count += self.update_cycle;

        if self.bit_count > BM_MAX_COUNT {
            // halve rounding up, but never let the zero count catch up with the total since that
            // would be a probability of 1
            self.bit_count = (self.bit_count + 1) >> 1;
            self.bit_0_count = (self.bit_0_count + 1) >> 1;
            if self.bit_0_count == self.bit_count {
                self.bit_count += 1;
            }
        }

        let scale = 0x8000_0000u32 / self.bit_count;
        self.bit_0_prob = (self.bit_0_count * scale) >> (31 - BM_LENGTH_SHIFT);

        self.update_cycle = ((5 * self.update_cycle) >> 2).min(MAX_UPDATE_CYCLE);
        self.bits_until_update = self.update_cycle;
    }
}

impl BitModel for AdaptiveBitModel {
    #[inline(always)]
    fn bit_0_probability(&self) -> u32 {
        self.bit_0_prob
    }

    #[inline(always)]
    fn record(&mut self, bit: bool) {
        if !bit {
            self.bit_0_count += 1;
        }

        self.bits_until_update -= 1;
        if self.bits_until_update == 0 {
            self.update();
        }
    }
}

#[test]
fn static_probability_bounds() {
    let mut model = StaticBitModel::new();

    for p in [0.0, 1.0, -0.5, 0.99995, 0.00009, f64::NAN] {
        assert!(model.set_probability_0(p).is_err(), "{p} accepted");
        assert_eq!(model, StaticBitModel::default());
    }

    model.set_probability_0(0.0001).unwrap();
    assert_eq!(model.bit_0_probability(), 1);

    model.set_probability_0(0.9999).unwrap();
    assert_eq!(model.bit_0_probability(), 8191);

    model.set_probability_0(0.25).unwrap();
    assert_eq!(model.bit_0_probability(), 2048);
}

#[test]
fn adaptive_first_update() {
    let mut model = AdaptiveBitModel::new();

    // four zeros trigger the first update: counts become 5 of 6
    for _ in 0..4 {
        model.record(false);
    }

    assert_eq!(model.bit_count, 6);
    assert_eq!(model.bit_0_count, 5);
    assert_eq!(model.bit_0_prob, (5 * (0x8000_0000u32 / 6)) >> 18);
    assert_eq!(model.update_cycle, 5);
    assert_eq!(model.bits_until_update, 5);
}

#[test]
fn adaptive_counts_stay_bounded() {
    let mut model = AdaptiveBitModel::new();

    for i in 0..200_000 {
        model.record(i % 1000 == 0);

        // counts are only reconciled when an update has just run
        if model.bits_until_update == model.update_cycle {
            assert!(model.bit_count <= BM_MAX_COUNT);
            assert!(model.bit_0_count < model.bit_count);
        }
        assert!(model.bit_0_prob >= 1 && model.bit_0_prob < BM_MAX_COUNT);
    }

    // almost all zeros, so the estimate should sit near the top of the range
    assert!(model.bit_0_prob > BM_MAX_COUNT - 64);
    assert_eq!(model.update_cycle, MAX_UPDATE_CYCLE);

    model.reset();
    assert_eq!(model, AdaptiveBitModel::default());
}

#[test]
fn adaptive_never_reaches_certainty() {
    let mut model = AdaptiveBitModel::new();

    for _ in 0..1_000_000 {
        model.record(false);
    }

    assert!(model.bit_0_prob < BM_MAX_COUNT);
}
