//! I/O helpers for delimited files.
//!
//! Every file the crate reads or writes goes through here:
//!
//! - **Delimiters**: `.tsv` means tab, anything else comma, unless overridden.
//! - **Encoding**: input decoding and output transcoding via `encoding_rs`,
//!   defaulting to UTF-8.
//! - **Quoting**: transformed output quotes every field when the input's first
//!   data line starts with a quote, otherwise only where necessary.
//! - **Default paths**: outputs land next to the input as
//!   `<stem>_transformed.<ext>`, `<stem>_input_issues.tsv` and
//!   `<stem>_output_issues.tsv`.

use std::{
    fs::File,
    io::{self, BufRead, BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';
/// Upper bound on rows held in the streaming output buffer.
pub const MAX_BUFFERED_ROWS: usize = 1_000_000;

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

/// Output delimiter from the output path's extension, falling back to the input's.
pub fn resolve_output_delimiter(path: &Path, fallback: u8) -> u8 {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        Some(ext) if ext.eq_ignore_ascii_case("csv") => DEFAULT_CSV_DELIMITER,
        _ => fallback,
    }
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(false);
    builder.from_reader(reader)
}

pub fn open_csv_reader_from_path(path: &Path, delimiter: u8) -> Result<csv::Reader<BufReader<File>>> {
    let file = File::open(path).with_context(|| format!("Opening input file {path:?}"))?;
    Ok(open_csv_reader(BufReader::new(file), delimiter))
}

pub fn open_csv_writer(
    path: &Path,
    delimiter: u8,
    encoding: &'static Encoding,
    quote_style: QuoteStyle,
) -> Result<csv::Writer<Box<dyn Write>>> {
    let base: Box<dyn Write> = Box::new(BufWriter::new(
        File::create(path).with_context(|| format!("Creating output file {path:?}"))?,
    ));

    let writer: Box<dyn Write> = if encoding == UTF_8 {
        base
    } else {
        Box::new(TranscodingWriter::new(base, encoding))
    };

    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(delimiter)
        .quote_style(quote_style)
        .double_quote(true);
    Ok(builder.from_writer(writer))
}

/// True when the first data line (the line after the header) starts with a
/// double quote.
pub fn detect_quoted_input(path: &Path) -> Result<bool> {
    let file = File::open(path).with_context(|| format!("Opening input file {path:?}"))?;
    let mut lines = BufReader::new(file).split(b'\n');
    let _header = lines.next().transpose()?;
    let first_data = lines
        .next()
        .transpose()
        .with_context(|| format!("Reading first data line of {path:?}"))?;
    Ok(first_data.is_some_and(|line| line.first() == Some(&b'"')))
}

pub fn quote_style_for(quoted_input: bool) -> QuoteStyle {
    if quoted_input {
        QuoteStyle::Always
    } else {
        QuoteStyle::Necessary
    }
}

fn sibling_path(input: &Path, suffix: &str, extension: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    input.with_file_name(format!("{stem}_{suffix}.{extension}"))
}

pub fn default_output_path(input: &Path) -> PathBuf {
    let extension = input
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "csv".to_string());
    sibling_path(input, "transformed", &extension)
}

pub fn default_input_issues_path(input: &Path) -> PathBuf {
    sibling_path(input, "input_issues", "tsv")
}

pub fn default_output_issues_path(input: &Path) -> PathBuf {
    sibling_path(input, "output_issues", "tsv")
}

/// Rows to buffer before flushing, from the file size and an assumed row width.
pub fn estimate_buffer_rows(file_size: u64, row_width: u64) -> usize {
    let estimate = file_size / row_width.max(1);
    usize::try_from(estimate)
        .unwrap_or(MAX_BUFFERED_ROWS)
        .clamp(1, MAX_BUFFERED_ROWS)
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

pub fn reader_headers<R>(
    reader: &mut csv::Reader<R>,
    encoding: &'static Encoding,
) -> Result<Vec<String>>
where
    R: Read,
{
    let headers = reader.byte_headers()?.clone();
    decode_record(&headers, encoding)
}

/// Re-encodes the UTF-8 produced by the CSV writer into a target encoding.
/// A multi-byte character split across writes is held back until complete.
struct TranscodingWriter<W: Write> {
    inner: W,
    encoding: &'static Encoding,
    pending: Vec<u8>,
}

impl<W: Write> TranscodingWriter<W> {
    fn new(inner: W, encoding: &'static Encoding) -> Self {
        Self {
            inner,
            encoding,
            pending: Vec::new(),
        }
    }

    fn encode_pending(&mut self) -> io::Result<()> {
        let complete = match std::str::from_utf8(&self.pending) {
            Ok(text) => text.len(),
            Err(err) if err.error_len().is_none() => err.valid_up_to(),
            Err(err) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Invalid UTF-8 in output stream: {err}"),
                ));
            }
        };
        if complete == 0 {
            return Ok(());
        }
        {
            let text = std::str::from_utf8(&self.pending[..complete])
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
            let (encoded, _, had_errors) = self.encoding.encode(text);
            if had_errors {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "Output contains characters not representable in {}",
                        self.encoding.name()
                    ),
                ));
            }
            self.inner.write_all(&encoded)?;
        }
        self.pending.drain(..complete);
        Ok(())
    }
}

impl<W: Write> Write for TranscodingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        self.encode_pending()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.encode_pending()?;
        if !self.pending.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Incomplete UTF-8 sequence at end of output stream",
            ));
        }
        self.inner.flush()
    }
}
