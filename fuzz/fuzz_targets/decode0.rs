#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|raw_data: &[u8]| {
    for order in [adaptive_lzw::BitOrder::Msb, adaptive_lzw::BitOrder::Lsb] {
        let mut decoder = adaptive_lzw::decode::Decoder::new(order);
        let _ = decoder.into_stream(std::io::sink()).decode_all(raw_data);
    }
});
