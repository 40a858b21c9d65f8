//! A module for all encoding needs.
use crate::engine::{Codebook, CodebookState, Growth};
use crate::{
    AllResult, BitOrder, Code, LzwStatus, Mode, StreamResult, ALPHABET, END_CODE, FIRST_FREE,
    MAX_WIDTH, MODE_BITS,
};

use std::io::{BufRead, Write};

/// The size of the intermediate buffer of the stream adapters.
const STREAM_BUFFER: usize = 1 << 16;

/// The state for encoding data with an adaptive LZW algorithm.
///
/// The same structure can be utilized with streams as well as your own buffers and driver logic.
/// It may even be possible to mix them if you are sufficiently careful not to lose any written
/// data in the process.
pub struct Encoder {
    state: Box<dyn Stateful + Send + 'static>,
}

/// A encoding stream sink.
///
/// See [`Encoder::into_stream`] on how to create this type and more information.
///
/// [`Encoder::into_stream`]: struct.Encoder.html#method.into_stream
pub struct IntoStream<'d, W> {
    encoder: &'d mut Encoder,
    writer: W,
}

/// An async encoding sink.
///
/// See [`Encoder::into_async`] on how to create this type.
#[cfg(feature = "async")]
pub struct IntoAsync<'d, W> {
    encoder: &'d mut Encoder,
    writer: W,
}

trait Stateful {
    fn advance(&mut self, inp: &[u8], out: &mut [u8]) -> StreamResult;
    fn mark_ended(&mut self) -> bool;
    fn codebook_state(&self) -> CodebookState;
}

struct EncodeState<B: Buffer> {
    /// The code width and reset policy.
    codebook: Codebook,
    /// The current encoding symbol tree.
    tree: Tree,
    /// If all input has been supplied.
    has_ended: bool,
    /// If we have pushed the end code.
    is_finished: bool,
    /// The code corresponding to the currently read characters.
    current_code: Option<Code>,
    /// The number of characters behind `current_code`.
    current_len: usize,
    /// The bit buffer for encoding.
    buffer: B,
}

struct MsbBuffer {
    /// The buffer bits.
    buffer: u64,
    /// The number of valid buffer bits.
    bits_in_buffer: u8,
}

struct LsbBuffer {
    /// The buffer bits.
    buffer: u64,
    /// The number of valid buffer bits.
    bits_in_buffer: u8,
}

trait Buffer {
    fn new() -> Self;
    /// Insert the lowest `width` bits of `value` into the buffer.
    fn buffer_bits(&mut self, value: Code, width: u8);
    /// Push bytes if the buffer space is getting small.
    fn push_out(&mut self, out: &mut &mut [u8]) -> bool;
    /// Flush all full bytes, returning if at least one more byte remains.
    fn flush_out(&mut self, out: &mut &mut [u8]) -> bool;
    /// Pad the buffer to a full byte.
    fn buffer_pad(&mut self);
}

/// One tree node for at most each code.
/// To avoid using too much memory we keep nodes with few successors in optimized form. This form
/// doesn't offer lookup by indexing but instead does a linear search.
#[derive(Default)]
struct Tree {
    simples: Vec<Simple>,
    complex: Vec<Full>,
    keys: Vec<FullKey>,
}

#[derive(Clone, Copy, Default)]
enum FullKey {
    #[default]
    NoSuccessor,
    Simple(u16),
    Full(u16),
}

const SHORT: usize = 16;

#[derive(Clone, Copy, Default)]
struct Simple {
    codes: [Code; SHORT],
    chars: [u8; SHORT],
    count: u8,
}

/// Successors by character. The end code marks a missing successor, it is never assigned to a
/// string.
#[derive(Clone, Copy)]
struct Full {
    char_continuation: [Code; 256],
}

impl Encoder {
    /// Create a new encoder with the specified bit order and reset mode.
    ///
    /// The mode is written into the stream header right away.
    pub fn new(order: BitOrder, mode: Mode) -> Self {
        type Boxed = Box<dyn Stateful + Send + 'static>;
        let state = match order {
            BitOrder::Lsb => Box::new(EncodeState::<LsbBuffer>::new(mode)) as Boxed,
            BitOrder::Msb => Box::new(EncodeState::<MsbBuffer>::new(mode)) as Boxed,
        };

        Encoder { state }
    }

    /// Encode some bytes from `inp` into `out`.
    ///
    /// See [`into_stream`] for high-level functions and [`finish`] for marking the input data as
    /// complete.
    ///
    /// [`into_stream`]: #method.into_stream
    /// [`finish`]: #method.finish
    pub fn encode_bytes(&mut self, inp: &[u8], out: &mut [u8]) -> StreamResult {
        self.state.advance(inp, out)
    }

    /// Construct an encoder into a writer.
    pub fn into_stream<W: Write>(&mut self, writer: W) -> IntoStream<'_, W> {
        IntoStream {
            encoder: self,
            writer,
        }
    }

    /// Construct an encoder into an async writer.
    #[cfg(feature = "async")]
    pub fn into_async<W: futures::io::AsyncWrite>(&mut self, writer: W) -> IntoAsync<'_, W> {
        IntoAsync {
            encoder: self,
            writer,
        }
    }

    /// Mark the encoding as finished.
    ///
    /// In following calls to `encode_bytes` the encoder will emit the last pending code, the end
    /// code and the padding after encoding all of `inp`. It's not recommended, but also not
    /// unsound, to use different byte slices in different calls from this point forward. Input
    /// offered after the end code has been written is not consumed.
    pub fn finish(&mut self) {
        self.state.mark_ended();
    }

    /// The current code width, dictionary size and number of dictionary resets.
    pub fn codebook_state(&self) -> CodebookState {
        self.state.codebook_state()
    }
}

impl<W: Write> IntoStream<'_, W> {
    /// Encode data from a reader.
    ///
    /// This will drain the supplied reader. It will not encode an end marker after all data has
    /// been processed.
    pub fn encode(&mut self, read: impl BufRead) -> AllResult {
        self.encode_part(read, false)
    }

    /// Encode data from a reader and an end marker.
    pub fn encode_all(mut self, read: impl BufRead) -> AllResult {
        self.encode_part(read, true)
    }

    fn encode_part(&mut self, mut read: impl BufRead, finish: bool) -> AllResult {
        let IntoStream { encoder, writer } = self;
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

            if data.is_empty() {
                if finish {
                    encoder.finish();
                } else {
                    return Ok(Progress::Done);
                }
            }

            let result = encoder.encode_bytes(data, &mut outbuf[..]);
            *read_bytes += result.consumed_in;
            *write_bytes += result.consumed_out;
            read.consume(result.consumed_in);

            let done = result.status.map_err(|err| err.into_io())?;
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
    /// Encode data from an async reader, without an end marker.
    pub async fn encode(&mut self, read: impl futures::io::AsyncBufRead + Unpin) -> AllResult {
        self.encode_part(read, false).await
    }

    /// Encode data from an async reader and an end marker.
    pub async fn encode_all(mut self, read: impl futures::io::AsyncBufRead + Unpin) -> AllResult {
        self.encode_part(read, true).await
    }

    async fn encode_part(
        &mut self,
        mut read: impl futures::io::AsyncBufRead + Unpin,
        finish: bool,
    ) -> AllResult {
        use futures::io::{AsyncBufReadExt, AsyncWriteExt};
        let IntoAsync { encoder, writer } = self;

        let mut bytes_read = 0;
        let mut bytes_written = 0;
        let mut outbuf = vec![0; STREAM_BUFFER];

        let status = loop {
            let data = match read.fill_buf().await {
                Ok(data) => data,
                Err(err) => break Err(err),
            };

            if data.is_empty() {
                if finish {
                    encoder.finish();
                } else {
                    break Ok(());
                }
            }

            let result = encoder.encode_bytes(data, &mut outbuf[..]);
            bytes_read += result.consumed_in;
            bytes_written += result.consumed_out;
            read.consume_unpin(result.consumed_in);

            let done = match result.status {
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

impl<B: Buffer> EncodeState<B> {
    fn new(mode: Mode) -> Self {
        let mut tree = Tree::default();
        tree.init();
        let mut state = EncodeState {
            codebook: Codebook::new(mode),
            tree,
            has_ended: false,
            is_finished: false,
            current_code: None,
            current_len: 0,
            buffer: B::new(),
        };
        state.buffer.buffer_bits(Code::from(mode.header()), MODE_BITS);
        state
    }
}

impl<B: Buffer> Stateful for EncodeState<B> {
    fn advance(&mut self, mut inp: &[u8], mut out: &mut [u8]) -> StreamResult {
        let c_in = inp.len();
        let c_out = out.len();

        loop {
            if self.buffer.push_out(&mut out) {
                break;
            }

            if self.is_finished {
                break;
            }

            if inp.is_empty() {
                if self.has_ended {
                    self.finish_codes();
                }

                break;
            }

            let mut bytes = inp.iter();
            while let Some(&byte) = bytes.next() {
                let current = match self.current_code {
                    Some(code) => code,
                    None => {
                        self.current_code = Some(Code::from(byte));
                        self.current_len = 1;
                        continue;
                    }
                };

                match self.tree.at_key(current, byte) {
                    Some(code) => {
                        self.current_code = Some(code);
                        self.current_len += 1;
                    }
                    None => {
                        self.emit(current, Some(byte));
                        self.current_code = Some(Code::from(byte));
                        self.current_len = 1;
                        break;
                    }
                }
            }

            inp = bytes.as_slice();
        }

        let mut status = Ok(LzwStatus::Ok);
        if self.is_finished && !self.buffer.flush_out(&mut out) {
            status = Ok(LzwStatus::Done);
        }

        StreamResult {
            consumed_in: c_in - inp.len(),
            consumed_out: c_out - out.len(),
            status,
        }
    }

    fn mark_ended(&mut self) -> bool {
        core::mem::replace(&mut self.has_ended, true)
    }

    fn codebook_state(&self) -> CodebookState {
        self.codebook.state(self.tree.next_code())
    }
}

impl<B: Buffer> EncodeState<B> {
    /// Write the code of the longest match and learn its extension by `next`, if any.
    fn emit(&mut self, code: Code, next: Option<u8>) {
        self.buffer.buffer_bits(code, self.codebook.width());

        // The decoder makes the same decision after reading this code, before reading the next
        // one. That also holds for the last code before the end code.
        match self.codebook.after_code(self.current_len, self.tree.next_code()) {
            Growth::Room => {
                if let Some(byte) = next {
                    self.tree.append(code, byte);
                }
            }
            Growth::Saturated => {}
            Growth::Clear => self.tree.reset(),
        }
    }

    fn finish_codes(&mut self) {
        if let Some(code) = self.current_code.take() {
            self.emit(code, None);
        }

        self.buffer.buffer_bits(END_CODE, self.codebook.width());
        self.buffer.buffer_pad();
        self.is_finished = true;
    }
}

impl Buffer for MsbBuffer {
    fn new() -> Self {
        MsbBuffer {
            buffer: 0,
            bits_in_buffer: 0,
        }
    }

    fn buffer_bits(&mut self, value: Code, width: u8) {
        let shift = 64 - self.bits_in_buffer - width;
        self.buffer |= u64::from(value) << shift;
        self.bits_in_buffer += width;
    }

    fn push_out(&mut self, out: &mut &mut [u8]) -> bool {
        if self.bits_in_buffer + 2 * MAX_WIDTH < 64 {
            return false;
        }

        self.flush_out(out)
    }

    fn flush_out(&mut self, out: &mut &mut [u8]) -> bool {
        let want = usize::from(self.bits_in_buffer / 8);
        let count = want.min((*out).len());
        let (bytes, tail) = core::mem::take(out).split_at_mut(count);
        *out = tail;

        for b in bytes {
            *b = ((self.buffer & 0xff00_0000_0000_0000) >> 56) as u8;
            self.buffer <<= 8;
            self.bits_in_buffer -= 8;
        }

        count < want
    }

    fn buffer_pad(&mut self) {
        let to_byte = self.bits_in_buffer.wrapping_neg() & 0x7;
        self.bits_in_buffer += to_byte;
    }
}

impl Buffer for LsbBuffer {
    fn new() -> Self {
        LsbBuffer {
            buffer: 0,
            bits_in_buffer: 0,
        }
    }

    fn buffer_bits(&mut self, value: Code, width: u8) {
        self.buffer |= u64::from(value) << self.bits_in_buffer;
        self.bits_in_buffer += width;
    }

    fn push_out(&mut self, out: &mut &mut [u8]) -> bool {
        if self.bits_in_buffer + 2 * MAX_WIDTH < 64 {
            return false;
        }

        self.flush_out(out)
    }

    fn flush_out(&mut self, out: &mut &mut [u8]) -> bool {
        let want = usize::from(self.bits_in_buffer / 8);
        let count = want.min((*out).len());
        let (bytes, tail) = core::mem::take(out).split_at_mut(count);
        *out = tail;

        for b in bytes {
            *b = (self.buffer & 0x0000_0000_0000_00ff) as u8;
            self.buffer >>= 8;
            self.bits_in_buffer -= 8;
        }

        count < want
    }

    fn buffer_pad(&mut self) {
        let to_byte = self.bits_in_buffer.wrapping_neg() & 0x7;
        self.bits_in_buffer += to_byte;
    }
}

impl Tree {
    fn init(&mut self) {
        self.keys.reserve(1 << MAX_WIDTH);
        self.reset();
    }

    /// Forget all strings but the single characters.
    fn reset(&mut self) {
        self.simples.clear();
        self.complex.clear();
        self.keys.clear();
        // Every character plus the slot of the end code.
        self.keys.resize(FIRST_FREE, FullKey::NoSuccessor);
    }

    /// The code the next appended string receives.
    fn next_code(&self) -> usize {
        self.keys.len()
    }

    fn at_key(&self, code: Code, ch: u8) -> Option<Code> {
        match self.keys[usize::from(code)] {
            FullKey::NoSuccessor => None,
            FullKey::Simple(idx) => {
                let nexts = &self.simples[usize::from(idx)];
                let successors = nexts
                    .codes
                    .iter()
                    .zip(nexts.chars.iter())
                    .take(usize::from(nexts.count));
                for (&scode, &sch) in successors {
                    if sch == ch {
                        return Some(scode);
                    }
                }

                None
            }
            FullKey::Full(idx) => {
                let full = &self.complex[usize::from(idx)];
                let precode = full.char_continuation[usize::from(ch)];
                if precode != END_CODE {
                    Some(precode)
                } else {
                    None
                }
            }
        }
    }

    /// Register the string of `code` extended by `ch` under the next free code.
    fn append(&mut self, code: Code, ch: u8) -> Code {
        let next = self.keys.len() as Code;
        debug_assert!(self.at_key(code, ch).is_none());
        match self.keys[usize::from(code)] {
            FullKey::NoSuccessor => {
                let new_key = FullKey::Simple(self.simples.len() as u16);
                let mut simple = Simple::default();
                simple.codes[0] = next;
                simple.chars[0] = ch;
                simple.count = 1;
                self.simples.push(simple);
                self.keys[usize::from(code)] = new_key;
            }
            FullKey::Simple(idx) if usize::from(self.simples[usize::from(idx)].count) < SHORT => {
                let nexts = &mut self.simples[usize::from(idx)];
                let nidx = usize::from(nexts.count);
                nexts.chars[nidx] = ch;
                nexts.codes[nidx] = next;
                nexts.count += 1;
            }
            FullKey::Simple(idx) => {
                let new_key = FullKey::Full(self.complex.len() as u16);
                let simples = &self.simples[usize::from(idx)];
                let mut full = Full {
                    char_continuation: [END_CODE; ALPHABET],
                };
                for (&pch, &pcont) in simples.chars.iter().zip(simples.codes.iter()) {
                    full.char_continuation[usize::from(pch)] = pcont;
                }
                full.char_continuation[usize::from(ch)] = next;
                self.complex.push(full);
                self.keys[usize::from(code)] = new_key;
            }
            FullKey::Full(idx) => {
                let full = &mut self.complex[usize::from(idx)];
                full.char_continuation[usize::from(ch)] = next;
            }
        }
        self.keys.push(FullKey::NoSuccessor);
        next
    }
}
