use polars::prelude::*;

use crate::error::{OutbreakError, Result};
use crate::loader::require_columns;
use crate::schema::{derived, raw, weekly};

/// Confirmed-case total for one (year, week, department).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeeklySeriesPoint {
    pub year: i32,
    pub week: i32,
    pub department: String,
    pub cases: i64,
}

/// Add the `casos` flag: 1 when the diagnosis type equals `confirmed_code`, else 0.
pub fn flag_confirmed_cases(df: DataFrame, confirmed_code: &str) -> Result<DataFrame> {
    require_columns(&df, &[raw::TIPO_DX])?;
    let df = df
        .lazy()
        .with_column(
            when(col(raw::TIPO_DX).eq(lit(confirmed_code)))
                .then(lit(1i32))
                .otherwise(lit(0i32))
                .alias(derived::CASOS),
        )
        .collect()?;
    Ok(df)
}

/// Sum `casos` per (year, week, department).
///
/// Returns a side table sorted by the key with one row per distinct key;
/// the row-level table is left untouched.
pub fn weekly_cases(df: &DataFrame) -> Result<DataFrame> {
    require_columns(df, &weekly::KEY)?;
    require_columns(df, &[derived::CASOS])?;

    let keys: Vec<Expr> = weekly::KEY.iter().map(|c| col(*c)).collect();
    let totals = df
        .clone()
        .lazy()
        .group_by(keys)
        .agg([col(derived::CASOS).sum().cast(DataType::Int64)])
        .sort(weekly::KEY, SortMultipleOptions::default())
        .collect()?;

    log::debug!("Aggregated {} rows into {} weekly points", df.height(), totals.height());
    Ok(totals)
}

/// Typed view of a [`weekly_cases`] table, in table order.
pub fn weekly_points(totals: &DataFrame) -> Result<Vec<WeeklySeriesPoint>> {
    let years = totals.column(raw::ANO)?.i32()?;
    let weeks = totals.column(raw::SEMANA)?.i32()?;
    let departments = totals.column(raw::DEPARTAMENTO)?.str()?;
    let cases = totals.column(derived::CASOS)?.i64()?;

    let mut points = Vec::with_capacity(totals.height());
    for i in 0..totals.height() {
        let (Some(year), Some(week), Some(department)) =
            (years.get(i), weeks.get(i), departments.get(i))
        else {
            return Err(OutbreakError::DataIntegrity(format!(
                "null aggregation key at weekly row {i}"
            )));
        };
        points.push(WeeklySeriesPoint {
            year,
            week,
            department: department.to_string(),
            cases: cases.get(i).unwrap_or(0),
        });
    }
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> DataFrame {
        df!(
            "departamento" => &["LIMA", "LIMA", "ICA", "LIMA", "ICA"],
            "ano" => &[2020i32, 2020, 2020, 2020, 2019],
            "semana" => &[2i32, 2, 2, 1, 52],
            "tipo_dx" => &[Some("C"), Some("P"), Some("C"), None, Some("C")]
        )
        .unwrap()
    }

    #[test]
    fn flags_only_confirmed_diagnoses() {
        let flagged = flag_confirmed_cases(rows(), "C").unwrap();
        let casos: Vec<Option<i32>> = flagged
            .column(derived::CASOS)
            .unwrap()
            .i32()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(casos, vec![Some(1), Some(0), Some(1), Some(0), Some(1)]);
    }

    #[test]
    fn one_point_per_key_sorted_chronologically() {
        let flagged = flag_confirmed_cases(rows(), "C").unwrap();
        let totals = weekly_cases(&flagged).unwrap();
        let points = weekly_points(&totals).unwrap();
        assert_eq!(
            points,
            vec![
                WeeklySeriesPoint { year: 2019, week: 52, department: "ICA".into(), cases: 1 },
                WeeklySeriesPoint { year: 2020, week: 1, department: "LIMA".into(), cases: 0 },
                WeeklySeriesPoint { year: 2020, week: 2, department: "ICA".into(), cases: 1 },
                WeeklySeriesPoint { year: 2020, week: 2, department: "LIMA".into(), cases: 1 },
            ]
        );
        // projection only: row table keeps its height
        assert_eq!(flagged.height(), 5);
    }
}
