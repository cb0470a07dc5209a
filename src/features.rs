use polars::prelude::*;

use crate::error::Result;
use crate::loader::require_columns;
use crate::schema::{derived, raw, weekly};

/// Sort rows by (year, week, department) and derive the lag features.
///
/// `casos_lag1` is the previous row's `casos` within the same department
/// (0 for a department's first row). `casos_diff` is the first difference of
/// `casos` over the whole sorted table, so rows where the department changes
/// carry a delta against the previous department's row. First row gets 0.
pub fn build_features(df: DataFrame) -> Result<DataFrame> {
    require_columns(&df, &weekly::KEY)?;
    require_columns(&df, &[derived::CASOS])?;

    let previous = col(derived::CASOS).shift(lit(1));
    let df = df
        .lazy()
        .sort(
            weekly::KEY,
            SortMultipleOptions::default().with_maintain_order(true),
        )
        .with_columns([
            previous
                .clone()
                .over([col(raw::DEPARTAMENTO)])
                .fill_null(lit(0i32))
                .cast(DataType::Int32)
                .alias(derived::CASOS_LAG1),
            (col(derived::CASOS) - previous)
                .fill_null(lit(0i32))
                .cast(DataType::Int32)
                .alias(derived::CASOS_DIFF),
        ])
        .collect()?;

    log::info!("Built lag features for {} rows", df.height());
    Ok(df)
}
