//! Probability models for symbols drawn from an alphabet of 2 to 2048 symbols.
//!
//! Both models expose a [`Distribution`]: the cumulative distribution in 15 bit fixed point, and
//! for alphabets above 16 symbols a decoder table that maps the top bits of the scaled decoder
//! value to the first symbol that could contain it. The decoder only has to bisect the few
//! symbols between two neighbouring table entries instead of the whole alphabet.
use log::debug;

use crate::{
    bit_model::{MAX_PROBABILITY, MIN_PROBABILITY},
    error::{Error, Result},
    traits::DataModel,
};

/// number of fractional bits in the cumulative distribution
pub const DM_LENGTH_SHIFT: u32 = 15;

/// symbol counts are halved once their total goes above this value
pub const DM_MAX_COUNT: u32 = 1 << DM_LENGTH_SHIFT;

pub const MIN_SYMBOLS: u32 = 2;
pub const MAX_SYMBOLS: u32 = 1 << 11;

/// alphabets up to this size are decoded by plain bisection
const MAX_SYMBOLS_WITHOUT_TABLE: u32 = 16;

/// cumulative distribution of a model plus the table used to speed up decoding
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Distribution {
    cumulative: Vec<u32>,

    /// entry t is the last symbol whose cumulative value is at or below t << table_shift.
    ///
    /// The scaled decoder value stays below (2^15 + 64) for any stream we produced, which puts
    /// its bucket at most at 2^table_bits, and decoding also reads the entry after the bucket. So
    /// the table needs 2^table_bits + 2 entries.
    decoder_table: Vec<u32>,
    table_shift: u32,
}

impl Distribution {
    fn new(symbols: u32) -> Self {
        let mut decoder_table = Vec::new();
        let mut table_shift = 0;

        if symbols > MAX_SYMBOLS_WITHOUT_TABLE {
            let mut table_bits = 3;
            while symbols > (1 << (table_bits + 2)) {
                table_bits += 1;
            }

            decoder_table = vec![0; (1 << table_bits) + 2];
            table_shift = DM_LENGTH_SHIFT - table_bits;
        }

        Distribution {
            cumulative: vec![0; symbols as usize],
            decoder_table,
            table_shift,
        }
    }

    pub fn symbols(&self) -> u32 {
        self.cumulative.len() as u32
    }

    pub fn last_symbol(&self) -> u32 {
        self.symbols() - 1
    }

    /// start of every symbol's interval, scaled by 2^15
    pub fn cumulative(&self) -> &[u32] {
        &self.cumulative
    }

    pub fn has_decoder_table(&self) -> bool {
        !self.decoder_table.is_empty()
    }

    /// fills the decoder table from the current cumulative distribution
    fn rebuild_decoder_table(&mut self) {
        if self.decoder_table.is_empty() {
            return;
        }

        let table_size = self.decoder_table.len() - 2;
        let mut s = 0;

        for (k, &c) in self.cumulative.iter().enumerate() {
            let w = (c >> self.table_shift) as usize;
            while s < w {
                s += 1;
                self.decoder_table[s] = k as u32 - 1;
            }
        }

        self.decoder_table[0] = 0;
        let last = self.last_symbol();
        while s <= table_size {
            s += 1;
            self.decoder_table[s] = last;
        }
    }

    /// finds the symbol whose interval contains the scaled decoder value `dv`, using the decoder
    /// table when there is one.
    #[inline(always)]
    pub fn find_symbol(&self, dv: u32) -> u32 {
        if self.decoder_table.is_empty() {
            return self.bisect(dv);
        }

        // only a corrupt stream can land past the last bucket
        let t = ((dv >> self.table_shift) as usize).min(self.decoder_table.len() - 2);

        let mut s = self.decoder_table[t];
        let mut n = self.decoder_table[t + 1] + 1;

        while n > s + 1 {
            let m = (s + n) >> 1;
            if self.cumulative[m as usize] > dv {
                n = m;
            } else {
                s = m;
            }
        }

        s
    }

    /// finds the symbol whose interval contains `dv` by bisecting the whole distribution
    pub fn bisect(&self, dv: u32) -> u32 {
        // cumulative[0] is always zero, so the partition point is at least one
        self.cumulative.partition_point(|&c| c <= dv) as u32 - 1
    }
}

fn check_alphabet(number_of_symbols: u32) -> Result<()> {
    if !(MIN_SYMBOLS..=MAX_SYMBOLS).contains(&number_of_symbols) {
        return Err(Error::Configuration("invalid number of data symbols"));
    }
    Ok(())
}

/// data model with a fixed distribution, set once before coding
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaticDataModel {
    distribution: Distribution,
}

impl StaticDataModel {
    /// creates a model over `number_of_symbols` symbols. With no probabilities the symbols are
    /// equiprobable.
    pub fn new(number_of_symbols: u32, probability: Option<&[f64]>) -> Result<Self> {
        check_alphabet(number_of_symbols)?;

        let mut model = StaticDataModel {
            distribution: Distribution::new(number_of_symbols),
        };
        model.set_distribution(number_of_symbols, probability)?;

        Ok(model)
    }

    /// replaces the distribution. Every probability must be within [0.0001, 0.9999] and they
    /// must add up to 1 within 0.0001. Nothing changes if the arguments are rejected.
    pub fn set_distribution(
        &mut self,
        number_of_symbols: u32,
        probability: Option<&[f64]>,
    ) -> Result<()> {
        check_alphabet(number_of_symbols)?;

        let uniform = 1.0 / f64::from(number_of_symbols);
        let probabilities: Vec<f64> = match probability {
            Some(p) if p.len() != number_of_symbols as usize => {
                return Err(Error::Configuration(
                    "probability count does not match number of symbols",
                ));
            }
            Some(p) => p.to_vec(),
            None => vec![uniform; number_of_symbols as usize],
        };

        if probabilities
            .iter()
            .any(|p| !(MIN_PROBABILITY..=MAX_PROBABILITY).contains(p))
        {
            return Err(Error::Configuration("invalid symbol probability"));
        }

        let total: f64 = probabilities.iter().sum();
        if !(0.9999..=1.0001).contains(&total) {
            return Err(Error::Configuration("invalid probabilities"));
        }

        if self.distribution.symbols() != number_of_symbols {
            self.distribution = Distribution::new(number_of_symbols);
        }

        // scaling by the actual total keeps the last symbol's interval non-empty when the
        // probabilities add up to slightly more than one
        let scale = f64::from(DM_MAX_COUNT) / total;
        let mut sum = 0.0;
        for (c, p) in self.distribution.cumulative.iter_mut().zip(&probabilities) {
            *c = (sum * scale) as u32;
            sum += p;
        }

        self.distribution.rebuild_decoder_table();

        Ok(())
    }

    pub fn symbols(&self) -> u32 {
        self.distribution.symbols()
    }
}

impl DataModel for StaticDataModel {
    #[inline(always)]
    fn distribution(&self) -> &Distribution {
        &self.distribution
    }
}

/// data model that re-estimates the distribution from the symbols it has seen.
///
/// Like the adaptive bit model the estimate is refreshed periodically, with a cycle that grows by
/// 25% per refresh up to `(symbols + 6) * 8` symbols. The decoder table is only rebuilt on the
/// decoding side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdaptiveDataModel {
    distribution: Distribution,
    symbol_count: Vec<u32>,
    total_count: u32,
    update_cycle: u32,
    symbols_until_update: u32,
}

impl AdaptiveDataModel {
    pub fn new(number_of_symbols: u32) -> Result<Self> {
        check_alphabet(number_of_symbols)?;

        let mut model = AdaptiveDataModel {
            distribution: Distribution::new(number_of_symbols),
            symbol_count: vec![1; number_of_symbols as usize],
            total_count: 0,
            update_cycle: 0,
            symbols_until_update: 0,
        };
        model.reset();

        Ok(model)
    }

    /// changes the alphabet size. The model is reallocated and reset only if the size actually
    /// changes.
    pub fn set_alphabet(&mut self, number_of_symbols: u32) -> Result<()> {
        check_alphabet(number_of_symbols)?;

        if self.symbols() != number_of_symbols {
            debug!(
                "adaptive data model resized from {} to {} symbols",
                self.symbols(),
                number_of_symbols
            );

            self.distribution = Distribution::new(number_of_symbols);
            self.symbol_count = vec![1; number_of_symbols as usize];
            self.reset();
        }

        Ok(())
    }

    pub fn symbols(&self) -> u32 {
        self.distribution.symbols()
    }

    /// returns the model to equiprobable symbols. Must be called before the model is reused for
    /// another stream, on both the encoding and decoding side.
    pub fn reset(&mut self) {
        let symbols = self.symbols();

        self.total_count = 0;
        self.update_cycle = symbols;
        self.symbol_count.fill(1);
        self.update(false);

        self.update_cycle = (symbols + 6) >> 1;
        self.symbols_until_update = self.update_cycle;
    }

    /// recomputes the distribution from the symbol counts
    pub fn update(&mut self, from_encoder: bool) {
        self.total_count += self.update_cycle;

        if self.total_count > DM_MAX_COUNT {
            self.total_count = 0;
            for count in self.symbol_count.iter_mut() {
                *count = (*count + 1) >> 1;
                self.total_count += *count;
            }
        }

        let scale = 0x8000_0000u32 / self.total_count;
        let mut sum = 0u32;
        for (c, &count) in self
            .distribution
            .cumulative
            .iter_mut()
            .zip(&self.symbol_count)
        {
            *c = (scale * sum) >> (31 - DM_LENGTH_SHIFT);
            sum += count;
        }

        if !from_encoder {
            self.distribution.rebuild_decoder_table();
        }

        let max_cycle = (self.symbols() + 6) << 3;
        self.update_cycle = ((5 * self.update_cycle) >> 2).min(max_cycle);
        self.symbols_until_update = self.update_cycle;
    }
}

impl DataModel for AdaptiveDataModel {
    #[inline(always)]
    fn distribution(&self) -> &Distribution {
        &self.distribution
    }

    #[inline(always)]
    fn record(&mut self, symbol: u32, from_encoder: bool) {
        self.symbol_count[symbol as usize] += 1;

        self.symbols_until_update -= 1;
        if self.symbols_until_update == 0 {
            self.update(from_encoder);
        }
    }
}

#[cfg(test)]
fn check_table_against_bisection(distribution: &Distribution) {
    for dv in 0..DM_MAX_COUNT {
        assert_eq!(
            distribution.find_symbol(dv),
            distribution.bisect(dv),
            "symbols {} dv {}",
            distribution.symbols(),
            dv
        );
    }
}

#[test]
fn alphabet_bounds() {
    assert!(AdaptiveDataModel::new(1).is_err());
    assert!(AdaptiveDataModel::new(2049).is_err());
    assert!(StaticDataModel::new(0, None).is_err());
    assert!(StaticDataModel::new(2049, None).is_err());

    let mut model = AdaptiveDataModel::new(300).unwrap();
    let before = model.clone();
    assert!(model.set_alphabet(1).is_err());
    assert!(model.set_alphabet(2049).is_err());
    assert_eq!(model, before);

    let mut model = StaticDataModel::new(20, None).unwrap();
    let before = model.clone();
    assert!(model.set_distribution(1, None).is_err());
    assert!(model.set_distribution(3, Some(&[0.5, 0.5][..])).is_err());
    assert!(model.set_distribution(2, Some(&[0.99995, 0.00005][..])).is_err());
    assert!(model.set_distribution(3, Some(&[0.5, 0.3, 0.3][..])).is_err());
    assert!(model.set_distribution(3, Some(&[0.5, 0.2, 0.2][..])).is_err());
    assert_eq!(model, before);
}

#[test]
fn table_sizes() {
    for (symbols, entries, shift) in [
        (2, 0, 0),
        (16, 0, 0),
        (17, 10, 12),
        (32, 10, 12),
        (33, 18, 11),
        (256, 66, 9),
        (257, 130, 8),
        (2048, 514, 6),
    ] {
        let model = AdaptiveDataModel::new(symbols).unwrap();
        assert_eq!(model.distribution.decoder_table.len(), entries, "{symbols}");
        assert_eq!(model.distribution.table_shift, shift, "{symbols}");
    }
}

#[test]
fn static_distribution_values() {
    let model = StaticDataModel::new(4, Some(&[0.5, 0.25, 0.125, 0.125][..])).unwrap();
    assert_eq!(model.distribution().cumulative(), &[0, 16384, 24576, 28672]);

    let uniform = StaticDataModel::new(4, None).unwrap();
    assert_eq!(uniform.distribution().cumulative(), &[0, 8192, 16384, 24576]);
}

#[test]
fn static_table_matches_bisection() {
    use rand::{Rng, SeedableRng};

    let mut rng = rand::rngs::StdRng::seed_from_u64(0x5eed);

    for symbols in (17..=2048).step_by(97).chain([17, 64, 65, 1024, 2047, 2048]) {
        let weights: Vec<f64> = (0..symbols).map(|_| 1.0 + rng.gen::<f64>()).collect();
        let total: f64 = weights.iter().sum();
        let probabilities: Vec<f64> = weights.iter().map(|w| w / total).collect();

        let model = StaticDataModel::new(symbols, Some(&probabilities)).unwrap();
        check_table_against_bisection(model.distribution());
    }

    // one dominant symbol squeezes all the others into a few buckets
    let mut probabilities = vec![0.0001; 100];
    probabilities[37] = 1.0 - 0.0001 * 99.0;
    let model = StaticDataModel::new(100, Some(&probabilities)).unwrap();
    check_table_against_bisection(model.distribution());
}

#[test]
fn adaptive_table_matches_bisection() {
    use rand::{Rng, SeedableRng};

    let mut rng = rand::rngs::StdRng::seed_from_u64(42);

    for symbols in [17, 31, 100, 255, 600, 2048] {
        let mut model = AdaptiveDataModel::new(symbols).unwrap();
        check_table_against_bisection(model.distribution());

        // skew towards low symbols so the counts get halved a few times
        for _ in 0..200_000 {
            let s = rng.gen_range(0..symbols).min(rng.gen_range(0..symbols));
            model.record(s, false);
        }

        check_table_against_bisection(model.distribution());
    }
}

#[test]
fn adaptive_distribution_is_monotonic() {
    let mut model = AdaptiveDataModel::new(40).unwrap();

    for i in 0..500_000u32 {
        model.record(if i % 7 == 0 { i % 40 } else { 3 }, true);

        let cumulative = model.distribution().cumulative();
        assert_eq!(cumulative[0], 0);
        assert!(cumulative.windows(2).all(|w| w[0] < w[1]));
        assert!(*cumulative.last().unwrap() < DM_MAX_COUNT);
    }

    model.reset();
    assert_eq!(model, AdaptiveDataModel::new(40).unwrap());
}
