//! # Adaptive LZW decoder and encoder
//!
//! This crate provides an `Encoder` and a `Decoder` for an LZW variant whose code words grow
//! from 9 to 16 bits as the dictionary fills. What happens once the dictionary is full at 16
//! bits is decided by a [`Mode`] that is chosen by the encoder and stored in the first two bits
//! of the stream, so the decoder always replays the exact same decisions.
//!
//! The stream layout is:
//!
//!  * 2 bits: the mode, `0` for [`Mode::NoReset`], `1` for [`Mode::Reset`], `2` for
//!    [`Mode::Monitor`].
//!  * Code words, each as wide as the code width at the time it was written.
//!  * The end code `END_CODE == 256`, followed by zero padding up to the next byte.
//!
//! Examplary use of the encoder:
//!
//! ```
//! use adaptive_lzw::{BitOrder, Mode, encode::Encoder};
//! let data = b"TOBEORNOTTOBEORTOBEORNOT";
//! let mut compressed = vec![];
//!
//! let mut enc = Encoder::new(BitOrder::Msb, Mode::Reset);
//! let result = enc.into_stream(&mut compressed).encode_all(&data[..]);
//! result.status.unwrap();
//! ```
//!
//! And of the decoder, which learns the mode from the stream:
//!
//! ```
//! use adaptive_lzw::{BitOrder, Mode, encode::Encoder, decode::Decoder};
//! # let data = b"TOBEORNOTTOBEORTOBEORNOT";
//! # let mut compressed = vec![];
//! # Encoder::new(BitOrder::Msb, Mode::Monitor).into_stream(&mut compressed).encode_all(&data[..]).status.unwrap();
//! let mut decompressed = vec![];
//! let mut dec = Decoder::new(BitOrder::Msb);
//! dec.into_stream(&mut decompressed).decode_all(&compressed[..]).status.unwrap();
//! assert_eq!(decompressed, data);
//! assert_eq!(dec.mode(), Some(Mode::Monitor));
//! ```
use core::fmt;

/// Number of single byte symbols, each pre-registered with a code equal to its value.
pub const ALPHABET: usize = 256;
/// The code marking the end of the stream. It never stands for data.
pub const END_CODE: Code = 256;
/// The code width of a fresh dictionary.
pub const MIN_WIDTH: u8 = 9;
/// The largest code width. A dictionary that is full at this width triggers the reset policy.
pub const MAX_WIDTH: u8 = 16;

/// The first code assigned to a multi-byte string.
pub(crate) const FIRST_FREE: usize = ALPHABET + 1;
/// Number of bits of the mode header.
pub(crate) const MODE_BITS: u8 = 2;

/// Alias for a LZW code point
pub type Code = u16;

pub mod decode;
mod engine;
pub mod encode;

pub use crate::engine::CodebookState;

/// The order of bits in bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BitOrder {
    /// The most significant bit is processed first.
    Msb,
    /// The least significant bit is processed first.
    Lsb,
}

/// What to do when the dictionary is full at the maximum code width.
///
/// The mode is fixed for a whole stream and recorded in its header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    /// Keep the full dictionary for the rest of the stream.
    #[default]
    NoReset,
    /// Clear the dictionary every time it fills up.
    Reset,
    /// Clear the dictionary once the compression ratio has degraded by more than 10% compared
    /// to the ratio observed when it first filled up.
    Monitor,
}

/// The result of a coding operation on a pair of buffer.
#[must_use = "Contains a status with potential error information"]
pub struct StreamResult {
    /// The number of bytes consumed from the input buffer.
    pub consumed_in: usize,
    /// The number of bytes written into the output buffer.
    pub consumed_out: usize,
    /// The status after returning from the write call.
    pub status: Result<LzwStatus, LzwError>,
}

/// The result of coding a whole reader into a writer.
#[must_use = "Contains a status with potential error information"]
pub struct AllResult {
    /// The total number of bytes consumed from the reader.
    pub bytes_read: usize,
    /// The total number of bytes written into the writer.
    pub bytes_written: usize,
    /// The possible error that occurred.
    ///
    /// Note that when writing into streams it is not in general possible to recover from an
    /// error.
    pub status: std::io::Result<()>,
}

/// The status after successful coding of an LZW stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LzwStatus {
    /// The data was coded, more data can be supplied.
    Ok,
    /// No more data is needed but some output buffer is required.
    ///
    /// Returned when neither input nor output was consumed although both buffers were offered.
    NoProgress,
    /// The end code was written or read and the stream is complete.
    Done,
}

/// The error kind after unsuccessful coding of an LZW stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LzwError {
    /// A code word that is neither registered nor the entry about to be registered.
    #[error("corrupt stream: code word has no dictionary entry")]
    CorruptStream,
    /// The stream header names a mode this codec does not know.
    #[error("configuration mismatch: unknown mode {0} in stream header")]
    ConfigurationMismatch(u8),
}

impl Mode {
    /// The value stored in the stream header.
    pub fn header(self) -> u8 {
        match self {
            Mode::NoReset => 0,
            Mode::Reset => 1,
            Mode::Monitor => 2,
        }
    }

    /// Interpret a stream header value.
    pub fn from_header(value: u8) -> Result<Self, LzwError> {
        match value {
            0 => Ok(Mode::NoReset),
            1 => Ok(Mode::Reset),
            2 => Ok(Mode::Monitor),
            other => Err(LzwError::ConfigurationMismatch(other)),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::NoReset => "no-reset",
            Mode::Reset => "reset",
            Mode::Monitor => "monitor",
        })
    }
}

impl LzwError {
    pub(crate) fn into_io(self) -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::InvalidData, self)
    }
}

#[cfg(test)]
mod tests {
    use super::{LzwError, Mode};

    #[test]
    fn mode_header_values() {
        for mode in [Mode::NoReset, Mode::Reset, Mode::Monitor] {
            assert_eq!(Mode::from_header(mode.header()), Ok(mode));
        }
        assert_eq!(Mode::from_header(3), Err(LzwError::ConfigurationMismatch(3)));
    }
}
