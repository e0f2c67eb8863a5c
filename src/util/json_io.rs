
use anyhow::Context;
use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Returns true if the filename asks for transparent gzip handling
fn is_gzip(filename: &Path) -> bool {
    filename.extension().is_some_and(|ext| ext == "gz")
}

/// Serializes a value to pretty JSON, gzip-compressed when the filename ends in `.gz`.
/// # Arguments
/// * `data` - the value to serialize
/// * `out_filename` - destination path
/// # Errors
/// * if creating or writing the file fails
/// * if JSON serialization fails
pub fn save_json<T: serde::Serialize>(data: &T, out_filename: &Path) -> anyhow::Result<()> {
    let handle = File::create(out_filename)
        .with_context(|| format!("Error while creating {out_filename:?}:"))?;
    let sink: Box<dyn Write> = if is_gzip(out_filename) {
        Box::new(GzEncoder::new(handle, Compression::best()))
    } else {
        Box::new(handle)
    };

    let mut writer = BufWriter::new(sink);
    serde_json::to_writer_pretty(&mut writer, data)
        .with_context(|| format!("Error while serializing {out_filename:?}:"))?;
    writer.flush()
        .with_context(|| format!("Error while flushing output to {out_filename:?}:"))?;
    Ok(())
}

/// Deserializes a value from a JSON file, transparently decompressing `.gz` inputs.
/// # Arguments
/// * `filename` - the file path to open and parse
/// # Errors
/// * if the file does not open properly
/// * if deserialization fails
pub fn load_json<T: serde::de::DeserializeOwned>(filename: &Path) -> anyhow::Result<T> {
    let handle = File::open(filename)
        .with_context(|| format!("Error while opening {filename:?}:"))?;
    let source: Box<dyn std::io::Read> = if is_gzip(filename) {
        Box::new(MultiGzDecoder::new(handle))
    } else {
        Box::new(handle)
    };

    let result: T = serde_json::from_reader(BufReader::new(source))
        .with_context(|| format!("Error while deserializing {filename:?}:"))?;
    Ok(result)
}
