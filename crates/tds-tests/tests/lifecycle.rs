//! Resource-release guarantees of `StreamingDecoder`.
//!
//! Each test builds the decoder over a `TrackedEngine`, ends the stream one
//! particular way, and checks the ledger: exactly one engine handle opened,
//! exactly one released, none left open.
//!
//! ```text
//! ┌──────────────────────┬──────────────────────────────────────────┐
//! │ Termination          │ Released by                              │
//! ├──────────────────────┼──────────────────────────────────────────┤
//! │ normal close         │ flush (final decode)                     │
//! │ consumer cancel      │ teardown                                 │
//! │ producer abort       │ teardown                                 │
//! │ decode error         │ teardown (transform) / engine (flush)    │
//! │ end dropped early    │ teardown via Drop                        │
//! └──────────────────────┴──────────────────────────────────────────┘
//! ```

use std::io;
use std::sync::Arc;

use bytes::Bytes;
use insta::assert_snapshot;
use tds_decoder::{DecodeError, DecoderOptions, PipeError, Reason, TerminationReason};
use tds_tests::fixtures::{self, UTF8_STRESS};
use tds_tests::{
    RecordedEvent, fixed_chunks, init_test_tracing, pipe_through, record, tracked_decoder,
    utf8_chunks,
};

fn fatal() -> DecoderOptions {
    DecoderOptions::default().with_fatal(true)
}

#[tokio::test]
async fn normal_completion_releases_once() {
    init_test_tracing();
    let (decoder, ledger) = tracked_decoder("utf-8", DecoderOptions::default());
    let run = pipe_through(decoder, utf8_chunks(&["fo", "o", "", "bar"])).await;

    run.written.as_ref().unwrap();
    assert_eq!(run.text(), "foobar");
    ledger.assert_released_once();
}

#[tokio::test]
async fn cancel_immediately_after_construction_releases_once() {
    let (mut decoder, ledger) = tracked_decoder("utf-8", DecoderOptions::default());
    decoder.readable().cancel(None);

    ledger.assert_released_once();
    assert!(matches!(
        decoder.writable().termination(),
        Some(TerminationReason::ConsumerCancel(None))
    ));
}

#[tokio::test]
async fn cancel_mid_stream_releases_once() {
    let (decoder, ledger) = tracked_decoder("utf-8", DecoderOptions::default());
    let (mut writable, mut readable) = decoder.into_split();

    // Leave half a character pending inside the engine.
    writable.write(Bytes::from_static(b"caf\xC3")).await.unwrap();
    assert_eq!(readable.next().await.unwrap().unwrap(), "caf");
    assert_eq!(ledger.open_handles(), 1);

    let reason: Reason = Arc::new(io::Error::other("consumer went away"));
    readable.cancel(Some(reason));
    ledger.assert_released_once();

    let err = writable.write(Bytes::from_static(b"\xA9")).await.unwrap_err();
    assert!(matches!(err, PipeError::Canceled(Some(_))));
    assert!(writable.close().await.is_err());
    ledger.assert_released_once();
}

#[tokio::test]
async fn abort_releases_once_and_preserves_reason() {
    let (decoder, ledger) = tracked_decoder("utf-8", DecoderOptions::default());
    let (mut writable, mut readable) = decoder.into_split();

    writable.write(Bytes::from_static(b"\xF0\x9F")).await.unwrap();
    let reason: Reason = Arc::new(io::Error::other("upstream reset"));
    writable.abort(Some(Arc::clone(&reason)));
    ledger.assert_released_once();

    match readable.next().await {
        Some(Err(PipeError::Aborted(Some(got)))) => {
            assert!(Arc::ptr_eq(&got, &reason));
            assert_eq!(got.to_string(), "upstream reset");
        }
        other => panic!("expected abort, got {other:?}"),
    }
    assert!(readable.next().await.is_none());
}

#[tokio::test]
async fn dropping_the_writer_releases_once() {
    let (decoder, ledger) = tracked_decoder("utf-8", DecoderOptions::default());
    let (writable, readable) = decoder.into_split();
    drop(writable);

    ledger.assert_released_once();
    let events = record(readable).await;
    assert_eq!(events, [RecordedEvent::Abort("pipe aborted by producer".into())]);
}

#[tokio::test]
async fn dropping_the_reader_releases_once() {
    let (decoder, ledger) = tracked_decoder("utf-8", DecoderOptions::default());
    let (mut writable, readable) = decoder.into_split();
    drop(readable);

    ledger.assert_released_once();
    assert!(writable.write(Bytes::from_static(b"x")).await.is_err());
}

#[tokio::test]
async fn dropping_the_whole_decoder_releases_once() {
    let (decoder, ledger) = tracked_decoder("utf-16", DecoderOptions::default());
    assert_eq!(ledger.open_handles(), 1);
    drop(decoder);
    ledger.assert_released_once();
}

#[tokio::test]
async fn fatal_error_in_stream_fails_consumer_and_releases_once() {
    init_test_tracing();
    let (decoder, ledger) = tracked_decoder("utf-8", fatal());
    let bytes = fixtures::read(UTF8_STRESS);
    let run = pipe_through(decoder, fixed_chunks(&bytes, 64)).await;

    let err = run.written.as_ref().unwrap_err();
    assert_eq!(err.failure(), Some(&DecodeError::InvalidData));
    match run.last_event() {
        Some(RecordedEvent::Abort(message)) => {
            assert_snapshot!(message, @"The encoded data is not valid.");
        }
        other => panic!("expected abort event, got {other:?}"),
    }
    // Valid text ahead of the first malformed line still came through.
    assert!(run.text().starts_with("UTF-8 decoder stress test"));
    ledger.assert_released_once();
}

#[tokio::test]
async fn fatal_error_in_flush_releases_once() {
    let (decoder, ledger) = tracked_decoder("utf-8", fatal());
    let run = pipe_through(decoder, vec![Bytes::from_static(b"ok\xE2\x82")]).await;

    assert!(matches!(
        run.written,
        Err(PipeError::Failed(DecodeError::InvalidData))
    ));
    assert_eq!(
        run.events,
        [
            RecordedEvent::Chunk("ok".into()),
            RecordedEvent::Abort("The encoded data is not valid.".into()),
        ]
    );
    ledger.assert_released_once();
}

#[tokio::test]
async fn decode_error_keeps_earlier_text_on_both_paths() {
    // Malformed byte in a streamed chunk vs. an incomplete tail found by the
    // final decode: the consumer sees the same events either way.
    let in_transform = vec![Bytes::from_static(b"ok"), Bytes::from_static(b"\xFF")];
    let in_flush = vec![Bytes::from_static(b"ok\xE2\x82")];

    for chunks in [in_transform, in_flush] {
        let (decoder, ledger) = tracked_decoder("utf-8", fatal());
        let run = pipe_through(decoder, chunks).await;
        assert_eq!(
            run.events,
            [
                RecordedEvent::Chunk("ok".into()),
                RecordedEvent::Abort("The encoded data is not valid.".into()),
            ]
        );
        ledger.assert_released_once();
    }
}

#[tokio::test]
async fn odd_utf16_tail_keeps_decoded_text() {
    let (decoder, ledger) = tracked_decoder("utf-16be", fatal());
    let run = pipe_through(decoder, vec![Bytes::from_static(b"\x00h\x00")]).await;

    assert_eq!(
        run.written.as_ref().unwrap_err().failure(),
        Some(&DecodeError::InvalidData)
    );
    assert_eq!(
        run.events,
        [
            RecordedEvent::Chunk("h".into()),
            RecordedEvent::Abort("The encoded data is not valid.".into()),
        ]
    );
    ledger.assert_released_once();
}

#[tokio::test]
async fn non_fatal_mode_never_fails_on_stress_input() {
    let (decoder, ledger) = tracked_decoder("utf-8", DecoderOptions::default());
    let bytes = fixtures::read(UTF8_STRESS);
    let run = pipe_through(decoder, fixed_chunks(&bytes, 3)).await;

    run.written.as_ref().unwrap();
    assert_eq!(run.text(), String::from_utf8_lossy(&bytes));
    ledger.assert_released_once();
}

#[tokio::test]
async fn ends_on_separate_tasks() {
    let (decoder, ledger) = tracked_decoder("utf-8", DecoderOptions::default());
    let (mut writable, readable) = decoder.into_split();

    let consumer = tokio::spawn(record(readable));
    let producer = tokio::spawn(async move {
        for part in ["Съешь ", "же ", "ещё"] {
            writable.write(Bytes::from_static(part.as_bytes())).await?;
        }
        writable.close().await
    });

    producer.await.unwrap().unwrap();
    let events = consumer.await.unwrap();
    let text: String = events
        .iter()
        .filter_map(|e| match e {
            RecordedEvent::Chunk(c) => Some(c.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(text, "Съешь же ещё");
    assert_eq!(events.last(), Some(&RecordedEvent::Close));
    ledger.assert_released_once();
}
