#![no_main]
use adaptive_lzw::{decode, encode, BitOrder, Mode};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let (&selector, data) = match data.split_first() {
        Some(split) => split,
        None => return,
    };
    let mode = match selector % 3 {
        0 => Mode::NoReset,
        1 => Mode::Reset,
        _ => Mode::Monitor,
    };
    let order = if selector & 0x80 == 0 {
        BitOrder::Msb
    } else {
        BitOrder::Lsb
    };

    let mut encoder = encode::Encoder::new(order, mode);
    let mut buffer = Vec::with_capacity(2 * data.len() + 40);
    let _ = encoder.into_stream(&mut buffer).encode_all(data);

    let mut decoder = decode::Decoder::new(order);
    let mut compare = vec![];
    let result = decoder.into_stream(&mut compare).decode_all(buffer.as_slice());
    assert!(result.status.is_ok(), "{:?}", result.status);
    assert_eq!(data, &*compare);
});
