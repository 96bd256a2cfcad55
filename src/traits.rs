use crate::data_model::Distribution;

/// probability source for a single binary decision
pub trait BitModel {
    /// probability of the next bit being zero, scaled by 2^13
    fn bit_0_probability(&self) -> u32;

    /// called by the codec after every bit coded with this model
    fn record(&mut self, _bit: bool) {}
}

/// probability source for a symbol from an alphabet of 2..=2048 symbols
pub trait DataModel {
    /// cumulative distribution (and decoder table) currently in effect
    fn distribution(&self) -> &Distribution;

    /// called by the codec after every symbol coded with this model. `from_encoder` is
    /// false on the decoding side, which is the only side that needs the decoder table.
    fn record(&mut self, _symbol: u32, _from_encoder: bool) {}
}
