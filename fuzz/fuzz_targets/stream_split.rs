#![no_main]

use std::convert::Infallible;

use arbitrary::{Arbitrary, Unstructured};
use bytes::Bytes;
use futures::stream;
use libfuzzer_sys::fuzz_target;
use tds_decoder::{DecoderOptions, StreamError, StreamingDecoder, TextDecoder};

const LABELS: [&str; 6] = ["utf-8", "utf-16le", "utf-16be", "shift_jis", "gb18030", "windows-1252"];

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    label_id: u8,
    fatal: bool,
    ignore_bom: bool,
    splits: Vec<u16>,
    bytes: Vec<u8>,
}

// Fuzz target: chunked streaming decode vs. one-shot decode.
//
// Splits arbitrary input at arbitrary offsets, pushes the pieces through a
// StreamingDecoder, and checks the concatenated output (or the error) is
// exactly what a single TextDecoder::decode call produces.
fuzz_target!(|data: &[u8]| {
    let mut u = Unstructured::new(data);
    let Ok(input) = FuzzInput::arbitrary(&mut u) else {
        return;
    };

    let label = LABELS[usize::from(input.label_id) % LABELS.len()];
    let options = DecoderOptions::default()
        .with_fatal(input.fatal)
        .with_ignore_bom(input.ignore_bom);

    let expected = TextDecoder::new(label, options)
        .expect("label from the fixed list")
        .decode(&input.bytes);

    let mut offsets: Vec<usize> = input
        .splits
        .iter()
        .take(64)
        .map(|&s| usize::from(s) % (input.bytes.len() + 1))
        .collect();
    offsets.sort_unstable();

    let mut chunks = Vec::with_capacity(offsets.len() + 1);
    let mut start = 0;
    for offset in offsets {
        chunks.push(Bytes::copy_from_slice(&input.bytes[start..offset]));
        start = offset;
    }
    chunks.push(Bytes::copy_from_slice(&input.bytes[start..]));

    let decoder = StreamingDecoder::new(label, options).expect("label from the fixed list");
    let (mut writable, mut readable) = decoder.into_split();

    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime");
    let (written, read) = rt.block_on(async {
        let source = stream::iter(chunks.into_iter().map(Ok::<_, Infallible>));
        let consume = async {
            let mut text = String::new();
            while let Some(item) = readable.next().await {
                let chunk = item?;
                assert!(!chunk.is_empty(), "empty chunk emitted");
                text.push_str(&chunk);
            }
            Ok::<_, StreamError>(text)
        };
        tokio::join!(writable.pipe_from(source), consume)
    });

    match expected {
        Ok(text) => {
            assert!(written.is_ok(), "producer failed: {written:?}");
            assert_eq!(read.expect("consumer result"), text);
        }
        Err(e) => {
            assert_eq!(written.expect_err("producer should fail").failure(), Some(&e));
            assert_eq!(read.expect_err("consumer should fail").failure(), Some(&e));
        }
    }
});
