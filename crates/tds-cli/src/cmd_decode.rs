/// Implementation of `tds decode`.
///
/// Streams the input through a [`StreamingDecoder`] and writes the decoded
/// text as UTF-8. The producer (file reader) and the consumer (output
/// writer) run concurrently, so at most `--high-water-mark` decoded chunks
/// are held in memory at once.
///
/// ```text
///   file/stdin ──ReaderStream(chunk_size)──▶ writable ─▶ readable ──▶ stdout/file
/// ```
///
/// A decode error (only possible with `--fatal`) or an output error ends
/// the stream early. Either way the decoder is released by the pipe's
/// teardown path before this function returns.
use std::path::Path;
use std::pin::Pin;

use anyhow::{Context, Result};
use tds_decoder::{DecoderOptions, PipeConfig, StreamingDecoder, TextDecoder};
use tokio::fs::File;
use tokio::io::{self, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::DecodeArgs;

type Input = Pin<Box<dyn AsyncRead + Send>>;
type Output = Pin<Box<dyn AsyncWrite + Send>>;

/// Run the `tds decode` command.
///
/// # Errors
///
/// Returns an error if the label is unknown, the input cannot be read, the
/// output cannot be written, or `--fatal` is set and the input is malformed.
pub async fn run(args: &DecodeArgs) -> Result<()> {
    let options = DecoderOptions::default()
        .with_fatal(args.fatal)
        .with_ignore_bom(args.ignore_bom);
    let input = open_input(&args.file).await?;
    let mut output = open_output(args.output.as_deref()).await?;

    if args.whole {
        decode_whole(args, options, input, &mut output).await?;
    } else {
        decode_streaming(args, options, input, &mut output).await?;
    }

    output.flush().await.context("cannot flush output")?;
    Ok(())
}

async fn decode_streaming(
    args: &DecodeArgs,
    options: DecoderOptions,
    input: Input,
    output: &mut Output,
) -> Result<()> {
    let config = PipeConfig::with_high_water_mark(args.high_water_mark);
    let decoder = StreamingDecoder::with_config(&args.encoding, options, config)
        .with_context(|| format!("cannot decode as {:?}", args.encoding))?;
    debug!(?decoder, chunk_size = args.chunk_size, "streaming decode");

    let (mut writable, mut readable) = decoder.into_split();
    let chunks = ReaderStream::with_capacity(input, args.chunk_size.max(1));

    let produce = writable.pipe_from(chunks);
    // Moving the reader in means it is dropped, and the pipe canceled, as
    // soon as this future finishes early on an output error.
    let consume = async move {
        let mut chunks = 0usize;
        let mut bytes = 0usize;
        while let Some(text) = readable.next().await {
            let text = text?;
            output
                .write_all(text.as_bytes())
                .await
                .context("cannot write output")?;
            chunks += 1;
            bytes += text.len();
        }
        debug!(chunks, bytes, "decoded text written");
        Ok::<_, anyhow::Error>(())
    };

    let (produced, consumed) = tokio::join!(produce, consume);
    consumed.with_context(|| format!("failed to decode {}", args.file.display()))?;
    produced.with_context(|| format!("failed to read {}", args.file.display()))?;
    Ok(())
}

async fn decode_whole(
    args: &DecodeArgs,
    options: DecoderOptions,
    mut input: Input,
    output: &mut Output,
) -> Result<()> {
    let mut decoder = TextDecoder::new(&args.encoding, options)
        .with_context(|| format!("cannot decode as {:?}", args.encoding))?;

    let mut bytes = Vec::new();
    input
        .read_to_end(&mut bytes)
        .await
        .with_context(|| format!("cannot read {}", args.file.display()))?;

    let text = decoder
        .decode(&bytes)
        .with_context(|| format!("failed to decode {}", args.file.display()))?;
    debug!(bytes = bytes.len(), chars = text.len(), "whole-buffer decode");

    output
        .write_all(text.as_bytes())
        .await
        .context("cannot write output")
}

async fn open_input(path: &Path) -> Result<Input> {
    if path.as_os_str() == "-" {
        return Ok(Box::pin(io::stdin()));
    }
    let file = File::open(path)
        .await
        .with_context(|| format!("cannot open {}", path.display()))?;
    Ok(Box::pin(file))
}

async fn open_output(path: Option<&Path>) -> Result<Output> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .await
                .with_context(|| format!("cannot create {}", path.display()))?;
            Ok(Box::pin(file))
        }
        None => Ok(Box::pin(io::stdout())),
    }
}
