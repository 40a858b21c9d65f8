//! Width growth and dictionary resets, observed through the public codebook state.
use adaptive_lzw::{
    decode::Decoder, encode::Encoder, BitOrder, CodebookState, LzwStatus, Mode, END_CODE,
    MAX_WIDTH, MIN_WIDTH,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

const FULL: u32 = 1 << MAX_WIDTH;

fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = vec![0; len];
    rng.fill(&mut data[..]);
    data
}

/// Text from a small vocabulary, compresses well.
fn word_salad(len: usize, seed: u64) -> Vec<u8> {
    const WORDS: [&str; 16] = [
        "lorem ", "ipsum ", "dolor ", "sit ", "amet ", "consectetur ", "adipiscing ", "elit ",
        "sed ", "do ", "eiusmod ", "tempor ", "incididunt ", "ut ", "labore ", "magna ",
    ];
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = Vec::with_capacity(len + 16);
    while data.len() < len {
        data.extend_from_slice(WORDS[rng.gen_range(0..WORDS.len())].as_bytes());
    }
    data.truncate(len);
    data
}

/// Encode one byte at a time, reporting the state before and after each byte.
fn encode_observed(
    data: &[u8],
    mode: Mode,
    mut observe: impl FnMut(CodebookState, CodebookState),
) -> Vec<u8> {
    let mut encoder = Encoder::new(BitOrder::Msb, mode);
    let mut output = vec![];
    let mut outbuf = [0u8; 64];

    for byte in data.chunks(1) {
        let before = encoder.codebook_state();
        let mut inp = byte;
        while !inp.is_empty() {
            let result = encoder.encode_bytes(inp, &mut outbuf);
            result.status.unwrap();
            inp = &inp[result.consumed_in..];
            output.extend_from_slice(&outbuf[..result.consumed_out]);
        }
        observe(before, encoder.codebook_state());
    }

    encoder.finish();
    loop {
        let result = encoder.encode_bytes(&[], &mut outbuf);
        output.extend_from_slice(&outbuf[..result.consumed_out]);
        if result.status.unwrap() == LzwStatus::Done {
            break;
        }
    }
    output
}

fn decode(data: &[u8]) -> Vec<u8> {
    let mut decoder = Decoder::new(BitOrder::Msb);
    let mut decoded = vec![];
    decoder
        .into_stream(&mut decoded)
        .decode_all(data)
        .status
        .unwrap();
    decoded
}

/// Read `width` bits at `*pos`, most significant first.
fn read_msb(data: &[u8], pos: &mut usize, width: u8) -> u16 {
    let mut value = 0;
    for _ in 0..width {
        let bit = (data[*pos / 8] >> (7 - *pos % 8)) & 1;
        value = value << 1 | u16::from(bit);
        *pos += 1;
    }
    value
}

#[test]
fn literal_codes_and_end_width() {
    let data: Vec<u8> = (0..=255).collect();
    for mode in [Mode::NoReset, Mode::Reset, Mode::Monitor] {
        let compressed = encode_observed(&data, mode, |_, _| {});
        let mut pos = 0;
        assert_eq!(read_msb(&compressed, &mut pos, 2), u16::from(mode.header()));
        for byte in 0..=255 {
            assert_eq!(read_msb(&compressed, &mut pos, MIN_WIDTH), byte);
        }
        // The last code fills the 9 bit codes, so the end code is already 10 bits wide.
        assert_eq!(read_msb(&compressed, &mut pos, MIN_WIDTH + 1), END_CODE);
        assert_eq!(compressed.len(), (pos + 7) / 8);
        assert_eq!(decode(&compressed), data);
    }
}

#[test]
fn no_reset_never_shrinks() {
    let data = random_bytes(300_000, 1);
    let mut saturated = false;
    let compressed = encode_observed(&data, Mode::NoReset, |before, after| {
        assert!(after.next_code >= before.next_code);
        assert!(after.code_width >= before.code_width);
        assert!(after.code_width <= MAX_WIDTH);
        assert_eq!(after.resets, 0);
        if before.next_code == FULL {
            assert_eq!(after, before);
            saturated = true;
        }
    });
    assert!(saturated);
    assert_eq!(decode(&compressed), data);
}

#[test]
fn reset_clears_at_fullness() {
    let data = random_bytes(400_000, 2);
    let mut resets = 0;
    let compressed = encode_observed(&data, Mode::Reset, |before, after| {
        assert!((MIN_WIDTH..=MAX_WIDTH).contains(&after.code_width));
        if after.resets != before.resets {
            assert_eq!(after.resets, before.resets + 1);
            assert_eq!((before.code_width, before.next_code), (MAX_WIDTH, FULL));
            assert_eq!((after.code_width, after.next_code), (MIN_WIDTH, 257));
            resets += 1;
        } else {
            // Monotonic within one dictionary generation.
            assert!(after.code_width >= before.code_width);
            assert!(after.next_code >= before.next_code);
            if before.next_code == FULL {
                // No code was written for this byte, otherwise it had cleared.
                assert_eq!(after, before);
            }
        }
    });
    assert!(resets >= 2, "{}", resets);
    assert_eq!(decode(&compressed), data);
}

#[test]
fn monitor_resets_only_after_degradation() {
    let repetitive = word_salad(3 << 20, 7);
    let noise = random_bytes(2 << 20, 8);

    let mut encoder = Encoder::new(BitOrder::Msb, Mode::Monitor);
    let mut compressed = vec![];

    encoder
        .into_stream(&mut compressed)
        .encode(&repetitive[..])
        .status
        .unwrap();
    let state = encoder.codebook_state();
    assert_eq!(state.resets, 0);
    assert_eq!((state.code_width, state.next_code), (MAX_WIDTH, FULL));

    encoder
        .into_stream(&mut compressed)
        .encode_all(&noise[..])
        .status
        .unwrap();
    assert!(encoder.codebook_state().resets >= 1);

    let mut data = repetitive;
    data.extend_from_slice(&noise);
    assert_eq!(decode(&compressed), data);
}

#[test]
fn decoder_reports_mode_and_resets() {
    let data = random_bytes(200_000, 3);
    let compressed = encode_observed(&data, Mode::Reset, |_, _| {});

    let mut decoder = Decoder::new(BitOrder::Msb);
    assert_eq!(decoder.mode(), None);
    let mut decoded = vec![];
    decoder
        .into_stream(&mut decoded)
        .decode_all(&compressed[..])
        .status
        .unwrap();
    assert_eq!(decoder.mode(), Some(Mode::Reset));
    assert!(decoder.codebook_state().resets >= 1);
    assert_eq!(decoded, data);
}
