/// Implementation of `tds resolve`.
///
/// Creates a decoder for the label and prints the configuration it
/// reflects, which is what `StreamingDecoder::encoding()` and friends
/// would report.
///
/// ```text
/// $ tds resolve utf-16
/// label:      utf-16
/// encoding:   utf-16le
/// fatal:      false
/// ignoreBOM:  false
/// ```
use anyhow::{Context, Result};
use serde::Serialize;
use tds_decoder::{DecoderEngine, DecoderOptions, TextDecoder};

use crate::ResolveArgs;

#[derive(Serialize)]
struct Resolution<'a> {
    label: &'a str,
    encoding: &'a str,
    fatal: bool,
    #[serde(rename = "ignoreBOM")]
    ignore_bom: bool,
}

/// Run the `tds resolve` command.
///
/// # Errors
///
/// Returns an error if the label is not a supported encoding.
pub fn run(args: &ResolveArgs) -> Result<()> {
    let options = DecoderOptions::default()
        .with_fatal(args.fatal)
        .with_ignore_bom(args.ignore_bom);
    let decoder = TextDecoder::new(&args.label, options)
        .with_context(|| format!("cannot resolve label {:?}", args.label))?;

    let resolution = Resolution {
        label: &args.label,
        encoding: decoder.encoding(),
        fatal: decoder.fatal(),
        ignore_bom: decoder.ignore_bom(),
    };

    if args.json {
        let json =
            serde_json::to_string_pretty(&resolution).context("cannot serialise resolution")?;
        println!("{json}");
    } else {
        println!("label:      {}", resolution.label);
        println!("encoding:   {}", resolution.encoding);
        println!("fatal:      {}", resolution.fatal);
        println!("ignoreBOM:  {}", resolution.ignore_bom);
    }

    Ok(())
}
