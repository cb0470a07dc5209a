use polars::prelude::*;

use crate::error::{OutbreakError, Result};
use crate::loader::require_columns;
use crate::schema::raw;

const WHITESPACE: &str = " \t\r\n";
const MIN_WEEK: f64 = 1.0;
const MAX_WEEK: f64 = 53.0;

/// Clean a raw surveillance table.
///
/// In order: canonical column names, drop rows missing department/week/year
/// or carrying a fractional year/week or a week outside 1..=53, upper-case
/// and trim the region hierarchy, coerce age to a non-negative integer (rows
/// with non-numeric or non-finite age are dropped). Year and week become
/// `Int32`, age `Int64`. No values are fabricated for dropped rows.
pub fn clean(df: DataFrame) -> Result<DataFrame> {
    let mut df = df;
    normalize_column_names(&mut df)?;
    require_columns(&df, &raw::REQUIRED)?;
    require_columns(&df, &raw::REGION)?;
    require_columns(&df, &[raw::EDAD])?;

    let before = df.height();
    let year = as_float(&df, raw::ANO);
    let week = as_float(&df, raw::SEMANA);
    let age = as_float(&df, raw::EDAD);

    let keys_present = raw::REQUIRED
        .iter()
        .map(|c| col(*c).is_not_null())
        .reduce(|a, b| a.and(b))
        .unwrap_or(lit(true));

    let region = raw::REGION.map(|c| {
        col(c)
            .cast(DataType::String)
            .str()
            .to_uppercase()
            .str()
            .strip_chars(lit(WHITESPACE))
    });

    let cleaned = df
        .lazy()
        .with_columns([year.alias(raw::ANO), week.alias(raw::SEMANA)])
        .filter(
            keys_present
                .and(is_integral(raw::ANO))
                .and(is_integral(raw::SEMANA))
                .and(col(raw::SEMANA).gt_eq(lit(MIN_WEEK)))
                .and(col(raw::SEMANA).lt_eq(lit(MAX_WEEK))),
        )
        .with_columns([
            col(raw::ANO).cast(DataType::Int32),
            col(raw::SEMANA).cast(DataType::Int32),
        ])
        .with_columns(region)
        // NaN, infinities and out-of-range values become null here
        .with_column(age.cast(DataType::Int64).alias(raw::EDAD))
        .filter(col(raw::EDAD).is_not_null().and(col(raw::EDAD).gt_eq(lit(0i64))))
        .collect()?;

    log::info!(
        "Cleaning kept {} of {} rows",
        cleaned.height(),
        before
    );

    if cleaned.height() == 0 {
        return Err(OutbreakError::DataIntegrity(format!(
            "no rows survive cleaning ({before} rows in, 0 out)"
        )));
    }
    Ok(cleaned)
}

/// Lower-case and trim every column name.
pub fn normalize_column_names(df: &mut DataFrame) -> Result<()> {
    let normalized: Vec<String> = df
        .get_column_names_str()
        .iter()
        .map(|c| c.trim().to_lowercase())
        .collect();
    df.set_column_names(normalized)?;
    Ok(())
}

/// Numeric view of a column; text is trimmed first and unparseable text becomes null.
fn as_float(df: &DataFrame, name: &str) -> Expr {
    let base = match df.schema().get(name) {
        Some(DataType::String) => col(name).str().strip_chars(lit(WHITESPACE)),
        _ => col(name),
    };
    base.cast(DataType::Float64)
}

/// True where the numeric column holds a whole number.
fn is_integral(name: &str) -> Expr {
    col(name)
        .cast(DataType::Int64)
        .cast(DataType::Float64)
        .eq(col(name))
}
