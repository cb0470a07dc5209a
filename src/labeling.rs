use std::collections::BTreeMap;

use polars::prelude::*;

use crate::aggregation::{weekly_cases, weekly_points, WeeklySeriesPoint};
use crate::error::Result;
use crate::schema::{derived, raw, weekly};

const ROW_INDEX: &str = "__row_index";

/// Trend-deviation rule: a week is an outbreak when its cases exceed
/// `factor` times the trailing mean of the last `window` weeks (inclusive).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutbreakRule {
    pub window: usize,
    pub factor: f64,
}

impl Default for OutbreakRule {
    fn default() -> Self {
        Self {
            window: 4,
            factor: 1.2,
        }
    }
}

impl OutbreakRule {
    /// Labels for one department's chronologically ordered weekly cases.
    pub fn labels(&self, cases: &[i64]) -> Vec<bool> {
        trailing_means(cases, self.window)
            .into_iter()
            .zip(cases)
            .map(|(mean, &c)| c as f64 > mean * self.factor)
            .collect()
    }
}

/// Outbreak label for one weekly key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutbreakLabel {
    pub year: i32,
    pub week: i32,
    pub department: String,
    pub outbreak: bool,
}

/// Mean of the current value and up to `window - 1` preceding values.
///
/// The first point's mean is the point itself (minimum window of one).
/// `window` of zero is treated as one.
pub fn trailing_means(values: &[i64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    let mut means = Vec::with_capacity(values.len());
    let mut sum: i64 = 0;
    for (i, &v) in values.iter().enumerate() {
        sum += v;
        if i >= window {
            sum -= values[i - window];
        }
        let count = (i + 1).min(window);
        means.push(sum as f64 / count as f64);
    }
    means
}

/// Label every weekly point, each department's history folded independently.
///
/// Output is ordered by (year, week, department).
pub fn label_weeks(points: &[WeeklySeriesPoint], rule: &OutbreakRule) -> Vec<OutbreakLabel> {
    let mut by_department: BTreeMap<&str, Vec<&WeeklySeriesPoint>> = BTreeMap::new();
    for point in points {
        by_department
            .entry(point.department.as_str())
            .or_default()
            .push(point);
    }

    let mut labels = Vec::with_capacity(points.len());
    for (department, mut series) in by_department {
        series.sort_by_key(|p| (p.year, p.week));
        let cases: Vec<i64> = series.iter().map(|p| p.cases).collect();
        for (point, outbreak) in series.iter().zip(rule.labels(&cases)) {
            labels.push(OutbreakLabel {
                year: point.year,
                week: point.week,
                department: department.to_string(),
                outbreak,
            });
        }
    }
    labels.sort_by(|a, b| {
        (a.year, a.week, a.department.as_str()).cmp(&(b.year, b.week, b.department.as_str()))
    });
    labels
}

fn labels_frame(labels: &[OutbreakLabel]) -> Result<DataFrame> {
    let years: Vec<i32> = labels.iter().map(|l| l.year).collect();
    let weeks: Vec<i32> = labels.iter().map(|l| l.week).collect();
    let departments: Vec<&str> = labels.iter().map(|l| l.department.as_str()).collect();
    let outbreaks: Vec<i32> = labels.iter().map(|l| i32::from(l.outbreak)).collect();

    let df = DataFrame::new(vec![
        Column::new(raw::ANO.into(), &years),
        Column::new(raw::SEMANA.into(), &weeks),
        Column::new(raw::DEPARTAMENTO.into(), &departments),
        Column::new(derived::BROTE.into(), &outbreaks),
    ])?;
    Ok(df)
}

/// Left-join the labels onto every row sharing the weekly key.
///
/// Row order is preserved; rows without a matching key get label 0.
pub fn attach_labels(df: DataFrame, labels: &[OutbreakLabel]) -> Result<DataFrame> {
    let df = if df.schema().contains(derived::BROTE) {
        df.drop(derived::BROTE)?
    } else {
        df
    };
    let keys: Vec<Expr> = weekly::KEY.iter().map(|c| col(*c)).collect();

    let joined = df
        .lazy()
        .with_row_index(ROW_INDEX, None)
        .join(
            labels_frame(labels)?.lazy(),
            keys.clone(),
            keys,
            JoinArgs::new(JoinType::Left),
        )
        .with_column(
            col(derived::BROTE)
                .fill_null(lit(0i32))
                .cast(DataType::Int32),
        )
        .sort([ROW_INDEX], SortMultipleOptions::default())
        .collect()?;

    Ok(joined.drop(ROW_INDEX)?)
}

/// Compute the `brote` target for a table that already carries `casos`.
pub fn label_outbreaks(df: DataFrame, rule: &OutbreakRule) -> Result<DataFrame> {
    let totals = weekly_cases(&df)?;
    let points = weekly_points(&totals)?;
    let labels = label_weeks(&points, rule);
    let outbreaks = labels.iter().filter(|l| l.outbreak).count();
    log::info!(
        "Labelled {} department-weeks, {} outbreaks",
        labels.len(),
        outbreaks
    );
    attach_labels(df, &labels)
}
