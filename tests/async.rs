use adaptive_lzw::{decode::Decoder, encode::Encoder, BitOrder, Mode};
use tokio::io::BufReader;
use tokio_util::compat::{TokioAsyncReadCompatExt, TokioAsyncWriteCompatExt};

fn sample() -> Vec<u8> {
    b"TOBEORNOTTOBEORTOBEORNOT"
        .iter()
        .cycle()
        .take(100_000)
        .copied()
        .collect()
}

#[tokio::test]
async fn roundtrip_slices() {
    let data = sample();
    for mode in [Mode::NoReset, Mode::Reset, Mode::Monitor] {
        let mut compressed = vec![];
        let result = Encoder::new(BitOrder::Msb, mode)
            .into_async(&mut compressed)
            .encode_all(&data[..])
            .await;
        result.status.unwrap();
        assert_eq!(result.bytes_read, data.len());

        let mut sync = vec![];
        Encoder::new(BitOrder::Msb, mode)
            .into_stream(&mut sync)
            .encode_all(&data[..])
            .status
            .unwrap();
        assert_eq!(compressed, sync);

        let mut decoded = vec![];
        let mut decoder = Decoder::new(BitOrder::Msb);
        decoder
            .into_async(&mut decoded)
            .decode_all(&compressed[..])
            .await
            .status
            .unwrap();
        assert_eq!(decoder.mode(), Some(mode));
        assert_eq!(decoded, data);
    }
}

#[tokio::test]
async fn roundtrip_through_pipe() {
    let data = sample();
    let (client, server) = tokio::io::duplex(1 << 10);

    let writer = async {
        let mut encoder = Encoder::new(BitOrder::Lsb, Mode::Reset);
        encoder
            .into_async(client.compat_write())
            .encode_all(&data[..])
            .await
            .status
    };

    let reader = async {
        let mut decoder = Decoder::new(BitOrder::Lsb);
        let mut decoded = vec![];
        let status = decoder
            .into_async(&mut decoded)
            .decode_all(BufReader::new(server).compat())
            .await
            .status;
        status.map(|()| decoded)
    };

    let (written, decoded) = tokio::join!(writer, reader);
    written.unwrap();
    assert_eq!(decoded.unwrap(), data);
}

#[tokio::test]
async fn truncated_stream() {
    let mut compressed = vec![];
    Encoder::new(BitOrder::Msb, Mode::Monitor)
        .into_async(&mut compressed)
        .encode_all(&sample()[..])
        .await
        .status
        .unwrap();
    compressed.truncate(compressed.len() / 2);

    let mut decoded = vec![];
    let err = Decoder::new(BitOrder::Msb)
        .into_async(&mut decoded)
        .decode_all(&compressed[..])
        .await
        .status
        .unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
}
