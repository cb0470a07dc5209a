use std::io::Cursor;
use std::path::Path;

use polars::prelude::*;

use crate::config::{PipelineConfig, TextEncoding};
use crate::error::{OutbreakError, Result};

/// How to read a delimited surveillance export.
#[derive(Debug, Clone)]
pub struct SourceOptions {
    pub encoding: TextEncoding,
    pub separator: u8,
    /// Allow-list of columns to keep, in output order.
    pub columns: Vec<String>,
}

impl From<&PipelineConfig> for SourceOptions {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            encoding: config.encoding,
            separator: config.separator_byte(),
            columns: config.relevant_columns.clone(),
        }
    }
}

/// Read the raw source bytes. A path that does not resolve is `SourceNotFound`.
pub fn read_source(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => OutbreakError::SourceNotFound(path.to_path_buf()),
        _ => OutbreakError::Io(e),
    })
}

/// Load a surveillance CSV with all allow-listed columns as strings.
pub fn load_surveillance(path: &Path, options: &SourceOptions) -> Result<DataFrame> {
    log::info!("Loading surveillance data from {}", path.display());
    let bytes = read_source(path)?;
    parse_surveillance(&bytes, options)
}

/// Parse an in-memory surveillance export.
///
/// Header names are trimmed, every column is read as String, and only the
/// allow-listed columns are returned. Row order is preserved.
pub fn parse_surveillance(bytes: &[u8], options: &SourceOptions) -> Result<DataFrame> {
    let text = decode_text(bytes, options.encoding)?;
    let separator = options.separator;

    let mut df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0)) // all columns as String
        .map_parse_options(|parse| parse.with_separator(separator))
        .into_reader_with_file_handle(Cursor::new(text.into_bytes()))
        .finish()?;

    let trimmed: Vec<String> = df
        .get_column_names_str()
        .iter()
        .map(|c| c.trim().to_string())
        .collect();
    df.set_column_names(trimmed)?;

    require_columns(&df, &options.columns)?;

    let df = df.select(options.columns.iter().map(|c| c.as_str()))?;
    log::info!("Loaded {} rows, {} columns", df.height(), df.width());
    Ok(df)
}

pub(crate) fn require_columns<S: AsRef<str>>(df: &DataFrame, required: &[S]) -> Result<()> {
    let schema = df.schema();
    for name in required {
        if !schema.contains(name.as_ref()) {
            return Err(OutbreakError::SchemaMismatch(name.as_ref().to_string()));
        }
    }
    Ok(())
}

fn decode_text(bytes: &[u8], encoding: TextEncoding) -> Result<String> {
    match encoding {
        TextEncoding::Utf8 => String::from_utf8(bytes.to_vec())
            .map_err(|e| OutbreakError::DataIntegrity(format!("source is not valid UTF-8: {e}"))),
        // Latin-1 bytes map one-to-one onto the first 256 code points.
        TextEncoding::Latin1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
    }
}
