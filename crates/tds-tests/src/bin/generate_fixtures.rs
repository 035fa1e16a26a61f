//! Regenerate the derived fixtures in `tests/fixtures/`.
//!
//! `unicode-sample.html` is hand-written; this writes the UTF-16LE copy of
//! it and the UTF-8 stress file. Run from anywhere:
//!
//! ```bash
//! cargo run -p tds-tests --bin generate_fixtures
//! ```

use std::fs;

use tds_tests::fixtures::{
    UNICODE_SAMPLE, UNICODE_SAMPLE_UTF16LE, UTF8_STRESS, fixture_dir, read, utf8_stress,
    utf16le_with_bom,
};

fn main() -> std::io::Result<()> {
    let dir = fixture_dir();
    fs::create_dir_all(&dir)?;

    let sample = String::from_utf8(read(UNICODE_SAMPLE))
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    fs::write(dir.join(UNICODE_SAMPLE_UTF16LE), utf16le_with_bom(&sample))?;
    fs::write(dir.join(UTF8_STRESS), utf8_stress())?;

    println!("wrote fixtures to {}", dir.display());
    Ok(())
}
