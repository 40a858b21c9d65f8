//! Decompresses the input from stdin and writes the result to stdout.

use std::io::{self, BufWriter, Write};

use adaptive_lzw::{decode::Decoder, BitOrder};

fn main() -> io::Result<()> {
    let mut decoder = Decoder::new(BitOrder::Msb);
    let stdin = io::stdin().lock();
    let mut stdout = BufWriter::new(io::stdout().lock());
    decoder.into_stream(&mut stdout).decode_all(stdin).status?;
    stdout.flush()
}
