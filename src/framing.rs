//! Framing for storing a code stream: the number of code bytes as a base-128 varint (low group
//! first, high bit set on every byte but the last), followed by the code bytes themselves.
use std::io::{Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt};

use crate::{
    codec::{ArithmeticCodec, Mode},
    error::{Error, Result},
};

/// a length of up to 2^35 - 1 fits in five groups, far more than any code buffer
const MAX_PREFIX_BYTES: usize = 5;

/// writes the length prefix and returns the number of bytes it took
pub fn write_code_length(writer: &mut impl Write, code_bytes: usize) -> Result<usize> {
    let mut remaining = code_bytes;
    let mut header_bytes = 0;

    loop {
        let mut byte = (remaining & 0x7F) as u8;
        remaining >>= 7;
        if remaining > 0 {
            byte |= 0x80;
        }

        writer.write_u8(byte)?;
        header_bytes += 1;

        if remaining == 0 {
            return Ok(header_bytes);
        }
    }
}

/// reads a length prefix written by write_code_length
pub fn read_code_length(reader: &mut impl Read) -> Result<usize> {
    let mut code_bytes = 0usize;

    for group in 0..MAX_PREFIX_BYTES {
        let byte = reader.read_u8()?;
        code_bytes |= usize::from(byte & 0x7F) << (7 * group);

        if byte & 0x80 == 0 {
            return Ok(code_bytes);
        }
    }

    Err(Error::Overflow("code length prefix too long"))
}

impl ArithmeticCodec<'_> {
    /// Stops the encoder and writes the framed stream. Returns the total number of bytes written,
    /// prefix included.
    pub fn write_to(&mut self, writer: &mut impl Write) -> Result<usize> {
        let code_bytes = self.stop_encoder()?;
        let header_bytes = write_code_length(writer, code_bytes)?;

        writer.write_all(&self.buffer()[..code_bytes])?;

        Ok(header_bytes + code_bytes)
    }

    /// reads a framed stream into the code buffer and starts the decoder on it
    pub fn read_from(&mut self, reader: &mut impl Read) -> Result<()> {
        if self.mode() != Mode::Idle {
            return Err(Error::State("cannot start decoder"));
        }
        if self.buffer_size() == 0 {
            return Err(Error::State("no code buffer set"));
        }

        let code_bytes = read_code_length(reader)?;
        if code_bytes > self.buffer_size() {
            return Err(Error::Overflow("code buffer overflow"));
        }

        reader.read_exact(&mut self.buffer_mut()[..code_bytes])?;

        self.start_decoder()
    }
}

#[test]
fn length_prefix_layout() {
    for (length, expected) in [
        (0usize, &[0x00u8][..]),
        (1, &[0x01][..]),
        (127, &[0x7F][..]),
        (128, &[0x80, 0x01][..]),
        (300, &[0xAC, 0x02][..]),
        (0x0100_0000, &[0x80, 0x80, 0x80, 0x08][..]),
    ] {
        let mut output = Vec::new();
        let header_bytes = write_code_length(&mut output, length).unwrap();

        assert_eq!(output, expected);
        assert_eq!(header_bytes, expected.len());
        assert_eq!(read_code_length(&mut &output[..]).unwrap(), length);
    }
}

#[test]
fn length_prefix_errors() {
    let endless = [0x80u8; 8];
    assert!(matches!(
        read_code_length(&mut &endless[..]),
        Err(Error::Overflow(_))
    ));

    let truncated = [0x80u8, 0x80];
    assert!(matches!(
        read_code_length(&mut &truncated[..]),
        Err(Error::Io(_))
    ));
}

#[test]
fn framed_length_larger_than_buffer() {
    let mut framed = Vec::new();
    let _ = write_code_length(&mut framed, 100).unwrap();
    framed.extend_from_slice(&[0; 100]);

    let mut codec = ArithmeticCodec::with_capacity(64).unwrap();
    assert!(matches!(
        codec.read_from(&mut &framed[..]),
        Err(Error::Overflow(_))
    ));
    assert_eq!(codec.mode(), Mode::Idle);
}
