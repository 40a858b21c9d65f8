//! Compresses the input from stdin and writes the result to stdout.
//!
//! The first argument selects the dictionary mode: `n`, `r` or `m`.

use std::io::{self, BufWriter, Write};

use adaptive_lzw::{encode::Encoder, BitOrder, Mode};

fn main() -> io::Result<()> {
    let mode = match std::env::args().nth(1).as_deref() {
        Some("r") => Mode::Reset,
        Some("m") => Mode::Monitor,
        _ => Mode::NoReset,
    };

    let mut encoder = Encoder::new(BitOrder::Msb, mode);
    let stdin = io::stdin().lock();
    let mut stdout = BufWriter::new(io::stdout().lock());
    encoder.into_stream(&mut stdout).encode_all(stdin).status?;
    stdout.flush()
}
