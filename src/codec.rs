//! Multiplication based binary arithmetic codec with 32 bit registers.
//!
//! The encoder keeps the interval `[base, base + length)` and writes out the top byte of `base`
//! whenever `length` drops below 2^24. Narrowing the interval can make `base` wrap around, in
//! which case the carry is added back into the bytes already written. The decoder mirrors this
//! with `value`, the offset of the code stream within the current interval.
//!
//! The same codec handles raw bits, fixed width integers and symbols from any [`BitModel`] or
//! [`DataModel`]. Decoding has to use the same sequence of calls, and models in the same state,
//! as the encoding did. There is nothing in the stream to detect a mismatch.
use byteorder::{BigEndian, ByteOrder};
use log::{debug, trace};

use crate::{
    bit_model::BM_LENGTH_SHIFT,
    data_model::DM_LENGTH_SHIFT,
    error::{Error, Result},
    traits::{BitModel, DataModel},
};

/// the interval is renormalized whenever its length drops below this
pub const AC_MIN_LENGTH: u32 = 0x0100_0000;

/// length of the interval at the start of a stream
pub const AC_MAX_LENGTH: u32 = 0xFFFF_FFFF;

pub const MIN_BUFFER_SIZE: usize = 16;
pub const MAX_BUFFER_SIZE: usize = 0x0100_0000;

/// largest width accepted by put_bits/get_bits
pub const MAX_RAW_BITS: u32 = 20;

/// extra bytes allocated past the declared size of an owned buffer, so that an oversized stream
/// is reported when the encoder stops rather than in the middle of a renormalization
const BUFFER_SLACK: usize = 16;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    Idle,
    Encoding,
    Decoding,
}

enum CodeBuffer<'a> {
    Owned(Vec<u8>),
    User(&'a mut [u8]),
}

impl CodeBuffer<'_> {
    #[inline(always)]
    fn as_slice(&self) -> &[u8] {
        match self {
            CodeBuffer::Owned(v) => v,
            CodeBuffer::User(b) => b,
        }
    }

    #[inline(always)]
    fn as_mut_slice(&mut self) -> &mut [u8] {
        match self {
            CodeBuffer::Owned(v) => v,
            CodeBuffer::User(b) => b,
        }
    }
}

/// Arithmetic encoder and decoder bound to a code buffer.
///
/// The buffer is either allocated by the codec or borrowed from the caller for `'a`. A codec
/// runs one session at a time: `start_encoder`..`stop_encoder` or `start_decoder`..`stop_decoder`.
pub struct ArithmeticCodec<'a> {
    code_buffer: CodeBuffer<'a>,
    buffer_size: usize,
    position: usize,
    base: u32,
    value: u32,
    length: u32,
    mode: Mode,
}

impl std::fmt::Debug for ArithmeticCodec<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ArithmeticCodec {{ mode: {:?}, position: {}, base: {:x}, value: {:x}, length: {:x} }}",
            self.mode, self.position, self.base, self.value, self.length
        )
    }
}

impl Default for ArithmeticCodec<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> ArithmeticCodec<'a> {
    /// creates a codec with no buffer. `set_buffer` must be called before starting a session.
    pub fn new() -> Self {
        ArithmeticCodec {
            code_buffer: CodeBuffer::Owned(Vec::new()),
            buffer_size: 0,
            position: 0,
            base: 0,
            value: 0,
            length: 0,
            mode: Mode::Idle,
        }
    }

    /// creates a codec with its own buffer of `max_code_bytes` bytes
    pub fn with_capacity(max_code_bytes: usize) -> Result<Self> {
        let mut codec = Self::new();
        codec.set_buffer(max_code_bytes, None)?;
        Ok(codec)
    }

    /// creates a codec that codes into (or from) the caller's buffer
    pub fn with_user_buffer(user_buffer: &'a mut [u8]) -> Result<Self> {
        let mut codec = Self::new();
        codec.set_buffer(user_buffer.len(), Some(user_buffer))?;
        Ok(codec)
    }

    /// Sets the buffer for the next session. `max_code_bytes` must be within [16, 2^24].
    ///
    /// A caller buffer is used as is and never reallocated. Without one, the codec's own buffer
    /// is only reallocated when a larger size is requested.
    pub fn set_buffer(
        &mut self,
        max_code_bytes: usize,
        user_buffer: Option<&'a mut [u8]>,
    ) -> Result<()> {
        if !(MIN_BUFFER_SIZE..=MAX_BUFFER_SIZE).contains(&max_code_bytes) {
            return Err(Error::Configuration("invalid codec buffer size"));
        }
        if self.mode != Mode::Idle {
            return Err(Error::State("cannot set buffer while encoding or decoding"));
        }

        if let Some(buffer) = user_buffer {
            if buffer.len() < max_code_bytes {
                return Err(Error::Configuration("user buffer smaller than codec buffer size"));
            }

            self.buffer_size = max_code_bytes;
            self.code_buffer = CodeBuffer::User(buffer);
            return Ok(());
        }

        if matches!(self.code_buffer, CodeBuffer::Owned(_)) && max_code_bytes <= self.buffer_size
        {
            return Ok(());
        }

        trace!("allocating {} byte code buffer", max_code_bytes);

        self.buffer_size = max_code_bytes;
        self.code_buffer = CodeBuffer::Owned(vec![0; max_code_bytes + BUFFER_SLACK]);

        Ok(())
    }

    /// declared size of the code buffer, zero if none was set
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// the whole code buffer. After `stop_encoder` the stream is in the first `code_bytes` bytes.
    pub fn buffer(&self) -> &[u8] {
        self.code_buffer.as_slice()
    }

    /// the whole code buffer, for filling in a stream before `start_decoder`
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        self.code_buffer.as_mut_slice()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn start_encoder(&mut self) -> Result<()> {
        if self.mode != Mode::Idle {
            return Err(Error::State("cannot start encoder"));
        }
        if self.buffer_size == 0 {
            return Err(Error::State("no code buffer set"));
        }

        debug!("encoder started on {} byte buffer", self.buffer_size);

        self.mode = Mode::Encoding;
        self.base = 0;
        self.length = AC_MAX_LENGTH;
        self.position = 0;

        Ok(())
    }

    /// starts decoding the stream at the beginning of the code buffer
    pub fn start_decoder(&mut self) -> Result<()> {
        if self.mode != Mode::Idle {
            return Err(Error::State("cannot start decoder"));
        }
        if self.buffer_size == 0 {
            return Err(Error::State("no code buffer set"));
        }

        debug!("decoder started on {} byte buffer", self.buffer_size);

        self.mode = Mode::Decoding;
        self.length = AC_MAX_LENGTH;
        self.value = BigEndian::read_u32(&self.code_buffer.as_slice()[..4]);
        self.position = 4;

        Ok(())
    }

    /// Flushes the encoder and returns the number of bytes in the stream.
    ///
    /// The final interval is narrowed to a sub-range that contains every value starting with the
    /// flushed bytes, so the decoder can read anything past the end of the stream.
    pub fn stop_encoder(&mut self) -> Result<usize> {
        if self.mode != Mode::Encoding {
            return Err(Error::State("invalid to stop encoder"));
        }
        self.mode = Mode::Idle;

        if self.length > 2 * AC_MIN_LENGTH {
            self.advance_base(AC_MIN_LENGTH)?;
            self.length = AC_MIN_LENGTH >> 1;
        } else {
            self.advance_base(AC_MIN_LENGTH >> 1)?;
            self.length = AC_MIN_LENGTH >> 9;
        }

        self.renorm_enc_interval()?;

        let code_bytes = self.position;
        if code_bytes > self.buffer_size {
            return Err(Error::Overflow("code buffer overflow"));
        }

        debug!("encoder stopped with {} code bytes", code_bytes);

        Ok(code_bytes)
    }

    pub fn stop_decoder(&mut self) -> Result<()> {
        if self.mode != Mode::Decoding {
            return Err(Error::State("invalid to stop decoder"));
        }
        self.mode = Mode::Idle;

        Ok(())
    }

    /// writes a single bit with a fixed probability of 0.5
    pub fn put_bit(&mut self, bit: bool) -> Result<()> {
        self.expect_mode(Mode::Encoding)?;

        self.length >>= 1;
        if bit {
            self.advance_base(self.length)?;
        }

        if self.length < AC_MIN_LENGTH {
            self.renorm_enc_interval()?;
        }

        Ok(())
    }

    /// reads a single bit with a fixed probability of 0.5
    pub fn get_bit(&mut self) -> Result<bool> {
        self.expect_mode(Mode::Decoding)?;

        self.length >>= 1;
        let bit = self.value >= self.length;
        if bit {
            self.value -= self.length;
        }

        if self.length < AC_MIN_LENGTH {
            self.renorm_dec_interval();
        }

        Ok(bit)
    }

    /// writes the lower `bits` bits of `data` (1 to 20 bits) with all values equiprobable
    pub fn put_bits(&mut self, data: u32, bits: u32) -> Result<()> {
        self.expect_mode(Mode::Encoding)?;
        check_raw_bits(bits)?;
        if data >= (1 << bits) {
            return Err(Error::Configuration("invalid data"));
        }

        self.length >>= bits;
        self.advance_base(data * self.length)?;

        if self.length < AC_MIN_LENGTH {
            self.renorm_enc_interval()?;
        }

        Ok(())
    }

    /// reads a value written by put_bits with the same width
    pub fn get_bits(&mut self, bits: u32) -> Result<u32> {
        self.expect_mode(Mode::Decoding)?;
        check_raw_bits(bits)?;

        self.length >>= bits;
        let s = self.value / self.length;
        self.value -= self.length * s;

        if self.length < AC_MIN_LENGTH {
            self.renorm_dec_interval();
        }

        Ok(s)
    }

    /// writes a bit using the probability from `model`, then lets the model learn from it
    #[inline(always)]
    pub fn encode_bit<M: BitModel>(&mut self, bit: bool, model: &mut M) -> Result<()> {
        self.expect_mode(Mode::Encoding)?;

        // lower part of the interval corresponds to zero
        let x = model.bit_0_probability() * (self.length >> BM_LENGTH_SHIFT);

        if !bit {
            self.length = x;
        } else {
            self.advance_base(x)?;
            self.length -= x;
        }

        if self.length < AC_MIN_LENGTH {
            self.renorm_enc_interval()?;
        }

        model.record(bit);

        Ok(())
    }

    /// reads a bit using the probability from `model`, then lets the model learn from it
    #[inline(always)]
    pub fn decode_bit<M: BitModel>(&mut self, model: &mut M) -> Result<bool> {
        self.expect_mode(Mode::Decoding)?;

        let x = model.bit_0_probability() * (self.length >> BM_LENGTH_SHIFT);

        let bit = self.value >= x;
        if !bit {
            self.length = x;
        } else {
            self.value -= x;
            self.length -= x;
        }

        if self.length < AC_MIN_LENGTH {
            self.renorm_dec_interval();
        }

        model.record(bit);

        Ok(bit)
    }

    /// writes `data` using the distribution from `model`, then lets the model learn from it
    #[inline(always)]
    pub fn encode_symbol<M: DataModel>(&mut self, data: u32, model: &mut M) -> Result<()> {
        self.expect_mode(Mode::Encoding)?;

        let distribution = model.distribution();
        if data >= distribution.symbols() {
            return Err(Error::Configuration("symbol outside model alphabet"));
        }

        let cumulative = distribution.cumulative();
        let data_index = data as usize;

        if data == distribution.last_symbol() {
            // the last symbol takes whatever is left of the interval, no product needed
            let x = cumulative[data_index] * (self.length >> DM_LENGTH_SHIFT);
            self.advance_base(x)?;
            self.length -= x;
        } else {
            self.length >>= DM_LENGTH_SHIFT;
            let x = cumulative[data_index] * self.length;
            self.advance_base(x)?;
            self.length = cumulative[data_index + 1] * self.length - x;
        }

        if self.length < AC_MIN_LENGTH {
            self.renorm_enc_interval()?;
        }

        model.record(data, true);

        Ok(())
    }

    /// reads a symbol using the distribution from `model`, then lets the model learn from it
    #[inline(always)]
    pub fn decode_symbol<M: DataModel>(&mut self, model: &mut M) -> Result<u32> {
        self.expect_mode(Mode::Decoding)?;

        let distribution = model.distribution();
        let cumulative = distribution.cumulative();

        let symbol;
        let x;
        let mut y = self.length;
        self.length >>= DM_LENGTH_SHIFT;

        if distribution.has_decoder_table() {
            let dv = self.value / self.length;
            symbol = distribution.find_symbol(dv);

            x = cumulative[symbol as usize] * self.length;
            if symbol != distribution.last_symbol() {
                y = cumulative[symbol as usize + 1] * self.length;
            }
        } else {
            // small alphabet, bisect with multiplications instead of dividing
            let mut s = 0;
            let mut lower = 0;
            let mut n = distribution.symbols();
            let mut m = n >> 1;

            loop {
                let z = self.length * cumulative[m as usize];
                if z > self.value {
                    n = m;
                    y = z;
                } else {
                    s = m;
                    lower = z;
                }

                m = (s + n) >> 1;
                if m == s {
                    break;
                }
            }

            symbol = s;
            x = lower;
        }

        self.value -= x;
        self.length = y - x;

        if self.length < AC_MIN_LENGTH {
            self.renorm_dec_interval();
        }

        model.record(symbol, false);

        Ok(symbol)
    }

    #[inline(always)]
    fn expect_mode(&self, mode: Mode) -> Result<()> {
        if self.mode != mode {
            return Err(match mode {
                Mode::Decoding => Error::State("decoder not started"),
                _ => Error::State("encoder not started"),
            });
        }
        Ok(())
    }

    /// adds `x` to base, carrying into the bytes already written if base wraps around
    #[inline(always)]
    fn advance_base(&mut self, x: u32) -> Result<()> {
        let (base, carry) = self.base.overflowing_add(x);
        self.base = base;

        if carry {
            self.propagate_carry()?;
        }
        Ok(())
    }

    /// adds one to the bytes written so far: trailing 0xFF bytes become zero and the byte before
    /// them is incremented
    fn propagate_carry(&mut self) -> Result<()> {
        let written = &mut self.code_buffer.as_mut_slice()[..self.position];

        let Some(p) = written.iter().rposition(|&b| b != 0xFF) else {
            return Err(Error::Overflow("carry propagated past start of code buffer"));
        };

        written[p] += 1;
        written[p + 1..].fill(0);

        Ok(())
    }

    /// writes out settled bytes until the interval length is back to full precision
    #[inline(always)]
    fn renorm_enc_interval(&mut self) -> Result<()> {
        let buffer = self.code_buffer.as_mut_slice();

        loop {
            let Some(byte) = buffer.get_mut(self.position) else {
                return Err(Error::Overflow("code buffer overflow"));
            };

            *byte = (self.base >> 24) as u8;
            self.position += 1;
            self.base <<= 8;
            self.length <<= 8;

            if self.length >= AC_MIN_LENGTH {
                return Ok(());
            }
        }
    }

    /// reads in bytes until the interval length is back to full precision. Past the end of the
    /// buffer zeros are read, which the final interval chosen by stop_encoder allows.
    #[inline(always)]
    fn renorm_dec_interval(&mut self) {
        let buffer = self.code_buffer.as_slice();

        loop {
            let byte = buffer.get(self.position).copied().unwrap_or(0);
            self.position += 1;
            self.value = (self.value << 8) | u32::from(byte);
            self.length <<= 8;

            if self.length >= AC_MIN_LENGTH {
                return;
            }
        }
    }
}

fn check_raw_bits(bits: u32) -> Result<()> {
    if !(1..=MAX_RAW_BITS).contains(&bits) {
        return Err(Error::Configuration("invalid number of bits"));
    }
    Ok(())
}

#[cfg(test)]
fn encoder_with_written(bytes: &[u8]) -> ArithmeticCodec<'static> {
    let mut codec = ArithmeticCodec::with_capacity(64).unwrap();
    codec.start_encoder().unwrap();
    codec.buffer_mut()[..bytes.len()].copy_from_slice(bytes);
    codec.position = bytes.len();
    codec
}

#[test]
fn carry_zeroes_run_and_increments_preceding_byte() {
    let mut codec = encoder_with_written(&[0x12, 0x34, 0xFF, 0xFF, 0xFF]);

    codec.propagate_carry().unwrap();

    assert_eq!(&codec.buffer()[..5], &[0x12, 0x35, 0x00, 0x00, 0x00]);
}

#[test]
fn carry_without_run_increments_last_byte() {
    let mut codec = encoder_with_written(&[0x00, 0x7F]);

    codec.propagate_carry().unwrap();

    assert_eq!(&codec.buffer()[..2], &[0x00, 0x80]);
}

#[test]
fn carry_through_whole_buffer_is_overflow() {
    let mut codec = encoder_with_written(&[0xFF; 16]);

    let err = codec.propagate_carry().unwrap_err();
    assert!(matches!(err, Error::Overflow(_)));

    // nothing written is touched when the carry has nowhere to go
    assert_eq!(&codec.buffer()[..16], &[0xFF; 16]);

    let mut empty = encoder_with_written(&[]);
    assert!(matches!(empty.propagate_carry(), Err(Error::Overflow(_))));
}

#[test]
fn carry_through_encoding() {
    // base starts just below the wrap point, so the next bit that lands in the upper half
    // carries into the bytes already written
    let mut codec = encoder_with_written(&[0x01, 0xFF, 0xFF]);
    codec.base = 0xFFFF_FF00;
    codec.length = 0x0200_0000;

    codec.put_bit(true).unwrap();

    assert_eq!(&codec.buffer()[..3], &[0x02, 0x00, 0x00]);
    assert_eq!(codec.base, 0x00FF_FF00);
}

#[test]
fn renorm_stops_at_end_of_user_buffer() {
    let mut buffer = [0u8; 16];
    let mut codec = ArithmeticCodec::with_user_buffer(&mut buffer).unwrap();
    codec.start_encoder().unwrap();

    let mut result = Ok(());
    for _ in 0..200 {
        result = codec.put_bits(0x5A5A5, 20);
        if result.is_err() {
            break;
        }
    }

    assert!(matches!(result, Err(Error::Overflow(_))));
    assert!(codec.position <= 16);
}

#[test]
fn oversized_stream_in_owned_buffer_fails_on_stop() {
    let mut codec = ArithmeticCodec::with_capacity(16).unwrap();
    codec.start_encoder().unwrap();

    // 16 bytes of raw bits plus the flush does not fit the declared size, but stays within the
    // slack of the owned buffer
    for _ in 0..8 {
        codec.put_bits(0xABCD, 16).unwrap();
    }

    assert!(matches!(codec.stop_encoder(), Err(Error::Overflow(_))));
    assert_eq!(codec.mode(), Mode::Idle);
}
