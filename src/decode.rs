//! A module for all decoding needs.
use crate::engine::{Codebook, CodebookState, Growth};
use crate::{
    AllResult, BitOrder, Code, LzwError, LzwStatus, Mode, StreamResult, ALPHABET, END_CODE,
    MAX_WIDTH, MODE_BITS,
};

use std::io::{self, BufRead, Write};

/// The size of the intermediate buffer of the stream adapters.
const STREAM_BUFFER: usize = 1 << 16;

/// The state for decoding data with an adaptive LZW algorithm.
///
/// The mode is not configured but read from the stream header, see [`mode`].
///
/// [`mode`]: #method.mode
pub struct Decoder {
    state: Box<dyn Stateful + Send + 'static>,
}

/// A decoding stream sink.
///
/// See [`Decoder::into_stream`] on how to create this type.
///
/// [`Decoder::into_stream`]: struct.Decoder.html#method.into_stream
pub struct IntoStream<'d, W> {
    decoder: &'d mut Decoder,
    writer: W,
}

/// An async decoding sink.
///
/// See [`Decoder::into_async`] on how to create this type.
#[cfg(feature = "async")]
pub struct IntoAsync<'d, W> {
    decoder: &'d mut Decoder,
    writer: W,
}

trait Stateful {
    fn advance(&mut self, inp: &[u8], out: &mut [u8]) -> StreamResult;
    fn has_ended(&self) -> bool;
    fn mode(&self) -> Option<Mode>;
    fn codebook_state(&self) -> CodebookState;
}

#[derive(Clone, Copy)]
struct Link {
    prev: Code,
    byte: u8,
    first: u8,
}

struct DecodeState<R: CodeReader> {
    /// If the mode header has been read.
    has_header: bool,

    /// The code width and reset policy, configured from the header.
    codebook: Codebook,

    /// The table of decoded codes.
    table: Table,

    /// The buffer of decoded data.
    buffer: Buffer,

    /// The previous code, whose extension is registered with the next code.
    last: Option<Code>,

    /// The dictionary was cleared after `last`. Its extension is not registered.
    just_cleared: bool,

    has_ended: bool,

    bits: R,
}

struct Buffer {
    bytes: Box<[u8]>,
    read_mark: usize,
    write_mark: usize,
}

struct Table {
    inner: Vec<Link>,
    depths: Vec<u16>,
}

trait CodeReader {
    fn new() -> Self;
    /// Take `width` bits, refilling from `inp` if there are not enough buffered.
    fn next_bits(&mut self, inp: &mut &[u8], width: u8) -> Option<Code>;
}

struct MsbReader {
    bit_buffer: u64,
    bits: u8,
}

struct LsbReader {
    bit_buffer: u64,
    bits: u8,
}

impl Decoder {
    /// Create a new decoder with the specified bit order.
    pub fn new(order: BitOrder) -> Self {
        type Boxed = Box<dyn Stateful + Send + 'static>;
        let state = match order {
            BitOrder::Lsb => Box::new(DecodeState::<LsbReader>::new()) as Boxed,
            BitOrder::Msb => Box::new(DecodeState::<MsbReader>::new()) as Boxed,
        };

        Decoder { state }
    }

    /// Decode some bytes from `inp` and write result to `out`.
    ///
    /// This will consume a prefix of the input buffer and write decoded output into a prefix of
    /// the output buffer. See the respective fields of the return value for the count of consumed
    /// and written bytes. For the next call You should have adjusted the inputs accordingly.
    ///
    /// The call will try to decode and write as many bytes of output as available. It will be
    /// much more optimized (and avoid intermediate buffering) if it is allowed to write a large
    /// contiguous chunk at once.
    pub fn decode_bytes(&mut self, inp: &[u8], out: &mut [u8]) -> StreamResult {
        self.state.advance(inp, out)
    }

    /// Construct a decoder into a writer.
    pub fn into_stream<W: Write>(&mut self, writer: W) -> IntoStream<'_, W> {
        IntoStream {
            decoder: self,
            writer,
        }
    }

    /// Construct a decoder into an async writer.
    #[cfg(feature = "async")]
    pub fn into_async<W: futures::io::AsyncWrite>(&mut self, writer: W) -> IntoAsync<'_, W> {
        IntoAsync {
            decoder: self,
            writer,
        }
    }

    /// Check if the decoding has finished.
    ///
    /// No more output is produced beyond the end code that marked the finish of the stream.
    pub fn has_ended(&self) -> bool {
        self.state.has_ended()
    }

    /// The mode recorded in the stream header, once it has been read.
    pub fn mode(&self) -> Option<Mode> {
        self.state.mode()
    }

    /// The current code width, dictionary size and number of dictionary resets.
    pub fn codebook_state(&self) -> CodebookState {
        self.state.codebook_state()
    }
}

impl<W: Write> IntoStream<'_, W> {
    /// Decode data from a reader until the end code.
    ///
    /// Running out of input before the end code is an `UnexpectedEof` error.
    pub fn decode_all(self, mut read: impl BufRead) -> AllResult {
        let IntoStream { decoder, mut writer } = self;
        enum Progress {
            Ok,
            Done,
        }

        let mut bytes_read = 0;
        let mut bytes_written = 0;

        let read_bytes = &mut bytes_read;
        let write_bytes = &mut bytes_written;

        let mut outbuf = vec![0; STREAM_BUFFER];
        let once = move || {
            let data = read.fill_buf()?;

            let result = decoder.decode_bytes(data, &mut outbuf[..]);
            *read_bytes += result.consumed_in;
            *write_bytes += result.consumed_out;
            read.consume(result.consumed_in);

            let done = result.status.map_err(|err| err.into_io())?;

            if let LzwStatus::NoProgress = done {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "No more data but no end marker detected",
                ));
            }

            writer.write_all(&outbuf[..result.consumed_out])?;

            if let LzwStatus::Done = done {
                return Ok(Progress::Done);
            }

            Ok(Progress::Ok)
        };

        let status = core::iter::repeat_with(once)
            // scan+fuse can be replaced with map_while
            .scan((), |(), result| match result {
                Ok(Progress::Ok) => Some(Ok(())),
                Err(err) => Some(Err(err)),
                Ok(Progress::Done) => None,
            })
            .fuse()
            .collect();

        AllResult {
            bytes_read,
            bytes_written,
            status,
        }
    }
}

#[cfg(feature = "async")]
impl<W: futures::io::AsyncWrite + Unpin> IntoAsync<'_, W> {
    /// Decode data from an async reader until the end code.
    pub async fn decode_all(self, mut read: impl futures::io::AsyncBufRead + Unpin) -> AllResult {
        use futures::io::{AsyncBufReadExt, AsyncWriteExt};
        let IntoAsync { decoder, mut writer } = self;

        let mut bytes_read = 0;
        let mut bytes_written = 0;
        let mut outbuf = vec![0; STREAM_BUFFER];

        let status = loop {
            let data = match read.fill_buf().await {
                Ok(data) => data,
                Err(err) => break Err(err),
            };

            let result = decoder.decode_bytes(data, &mut outbuf[..]);
            bytes_read += result.consumed_in;
            bytes_written += result.consumed_out;
            read.consume_unpin(result.consumed_in);

            let done = match result.status {
                Ok(LzwStatus::NoProgress) => {
                    break Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "No more data but no end marker detected",
                    ))
                }
                Ok(done) => done,
                Err(err) => break Err(err.into_io()),
            };

            if let Err(err) = writer.write_all(&outbuf[..result.consumed_out]).await {
                break Err(err);
            }

            if let LzwStatus::Done = done {
                break writer.flush().await;
            }
        };

        AllResult {
            bytes_read,
            bytes_written,
            status,
        }
    }
}

impl<R: CodeReader> DecodeState<R> {
    fn new() -> Self {
        DecodeState {
            has_header: false,
            codebook: Codebook::new(Mode::default()),
            table: Table::new(),
            buffer: Buffer::new(),
            last: None,
            just_cleared: false,
            has_ended: false,
            bits: R::new(),
        }
    }

    fn decode(&mut self, inp: &mut &[u8], out: &mut &mut [u8]) -> Result<LzwStatus, LzwError> {
        loop {
            if !self.buffer.drain_into(out) {
                return Ok(LzwStatus::Ok);
            }

            if self.has_ended {
                return Ok(LzwStatus::Done);
            }

            if !self.has_header {
                let header = match self.bits.next_bits(inp, MODE_BITS) {
                    Some(header) => header,
                    None => return Ok(LzwStatus::NoProgress),
                };
                let mode = Mode::from_header(header as u8)?;
                self.codebook = Codebook::new(mode);
                self.has_header = true;
                continue;
            }

            let code = match self.bits.next_bits(inp, self.codebook.width()) {
                Some(code) => code,
                None => return Ok(LzwStatus::NoProgress),
            };

            if code == END_CODE {
                self.has_ended = true;
                continue;
            }

            self.decode_code(code)?;
        }
    }

    /// Register the entry due with `code`, queue its string and account for it.
    fn decode_code(&mut self, code: Code) -> Result<(), LzwError> {
        let index = usize::from(code);
        match self.last {
            None => {
                if index >= ALPHABET {
                    return Err(LzwError::CorruptStream);
                }
            }
            Some(prev) => {
                let next_code = self.table.len();
                let registers = !self.just_cleared && next_code < self.codebook.capacity();
                let first = if index < next_code {
                    self.table.first(code)
                } else if index == next_code && registers {
                    // Not yet registered here: the encoder used the entry in the same step that
                    // created it, which only happens for the previous string plus its own first
                    // character.
                    self.table.first(prev)
                } else {
                    return Err(LzwError::CorruptStream);
                };

                if registers {
                    self.table.derive(prev, first);
                }
            }
        }

        self.buffer.reconstruct(&self.table, code);
        self.last = Some(code);
        self.just_cleared = false;

        // The string is buffered, so the table may be cleared before it is written out.
        let depth = self.table.depth(code);
        if let Growth::Clear = self.codebook.after_code(depth, self.table.len()) {
            self.table.reset();
            self.just_cleared = true;
        }

        Ok(())
    }
}

impl<R: CodeReader> Stateful for DecodeState<R> {
    fn advance(&mut self, mut inp: &[u8], mut out: &mut [u8]) -> StreamResult {
        let o_in = inp.len();
        let o_out = out.len();

        let mut status = self.decode(&mut inp, &mut out);

        if o_in > inp.len() || o_out > out.len() {
            if let Ok(LzwStatus::NoProgress) = status {
                status = Ok(LzwStatus::Ok);
            }
        }

        StreamResult {
            consumed_in: o_in - inp.len(),
            consumed_out: o_out - out.len(),
            status,
        }
    }

    fn has_ended(&self) -> bool {
        self.has_ended
    }

    fn mode(&self) -> Option<Mode> {
        if self.has_header {
            Some(self.codebook.mode())
        } else {
            None
        }
    }

    fn codebook_state(&self) -> CodebookState {
        self.codebook.state(self.table.len())
    }
}

impl CodeReader for MsbReader {
    fn new() -> Self {
        MsbReader {
            bit_buffer: 0,
            bits: 0,
        }
    }

    fn next_bits(&mut self, inp: &mut &[u8], width: u8) -> Option<Code> {
        if self.bits < width {
            let wish_count = usize::from((64 - self.bits) / 8);
            let count = wish_count.min(inp.len());
            let mut buffer = [0u8; 8];
            buffer[..count].copy_from_slice(&inp[..count]);
            *inp = &inp[count..];
            self.bit_buffer |= u64::from_be_bytes(buffer) >> self.bits;
            self.bits += (count * 8) as u8;
        }

        if self.bits < width {
            return None;
        }

        let mask = (1 << width) - 1;
        let rotbuf = self.bit_buffer.rotate_left(width.into());
        self.bit_buffer = rotbuf & !mask;
        self.bits -= width;
        Some((rotbuf & mask) as Code)
    }
}

impl CodeReader for LsbReader {
    fn new() -> Self {
        LsbReader {
            bit_buffer: 0,
            bits: 0,
        }
    }

    fn next_bits(&mut self, inp: &mut &[u8], width: u8) -> Option<Code> {
        if self.bits < width {
            let wish_count = usize::from((64 - self.bits) / 8);
            let count = wish_count.min(inp.len());
            let mut buffer = [0u8; 8];
            buffer[..count].copy_from_slice(&inp[..count]);
            *inp = &inp[count..];
            self.bit_buffer |= u64::from_le_bytes(buffer) << self.bits;
            self.bits += (count * 8) as u8;
        }

        if self.bits < width {
            return None;
        }

        let mask = (1 << width) - 1;
        let code = self.bit_buffer & mask;
        self.bit_buffer >>= width;
        self.bits -= width;
        Some(code as Code)
    }
}

impl Buffer {
    fn new() -> Self {
        Buffer {
            bytes: vec![0; 1 << MAX_WIDTH].into_boxed_slice(),
            read_mark: 0,
            write_mark: 0,
        }
    }

    /// Replace the buffered data with the string of `code`.
    fn reconstruct(&mut self, table: &Table, code: Code) {
        let depth = table.depth(code);
        let mut code_iter = code;
        for ch in self.bytes[..depth].iter_mut().rev() {
            let entry = table.inner[usize::from(code_iter)];
            *ch = entry.byte;
            code_iter = entry.prev;
        }
        self.read_mark = 0;
        self.write_mark = depth;
    }

    /// Write as much buffered data as fits, returning if the buffer is now empty.
    fn drain_into(&mut self, out: &mut &mut [u8]) -> bool {
        let remain = &self.bytes[self.read_mark..self.write_mark];
        let count = remain.len().min(out.len());
        let (into, tail) = core::mem::take(out).split_at_mut(count);
        into.copy_from_slice(&remain[..count]);
        *out = tail;
        self.read_mark += count;
        self.read_mark == self.write_mark
    }
}

impl Table {
    fn new() -> Self {
        let mut table = Table {
            inner: Vec::with_capacity(1 << MAX_WIDTH),
            depths: Vec::with_capacity(1 << MAX_WIDTH),
        };
        table.reset();
        table
    }

    /// Keep only the single characters.
    fn reset(&mut self) {
        self.inner.clear();
        self.depths.clear();
        for i in 0..ALPHABET {
            self.inner.push(Link::base(i as u8));
            self.depths.push(1);
        }
        // End code, never looked up.
        self.inner.push(Link::base(0));
        self.depths.push(0);
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn first(&self, code: Code) -> u8 {
        self.inner[usize::from(code)].first
    }

    fn depth(&self, code: Code) -> usize {
        usize::from(self.depths[usize::from(code)])
    }

    fn derive(&mut self, prev: Code, byte: u8) {
        let from = self.inner[usize::from(prev)];
        let depth = self.depths[usize::from(prev)] + 1;
        self.inner.push(Link {
            prev,
            byte,
            first: from.first,
        });
        self.depths.push(depth);
    }
}

impl Link {
    fn base(byte: u8) -> Self {
        Link {
            prev: 0,
            byte,
            first: byte,
        }
    }
}
