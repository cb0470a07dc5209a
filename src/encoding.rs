use std::collections::{BTreeMap, BTreeSet};

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{OutbreakError, Result};

/// Text used for missing categorical values before encoding.
pub const MISSING: &str = "nan";

/// Closed bijection between the values of one categorical field and `0..k`.
///
/// Codes follow lexical order of the values seen at fit time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryMapping {
    field: String,
    classes: Vec<String>,
}

impl CategoryMapping {
    pub fn fit<'a, I>(field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let classes: BTreeSet<&str> = values.into_iter().collect();
        Self {
            field: field.to_string(),
            classes: classes.into_iter().map(str::to_string).collect(),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    /// Known values, ordered by code.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn encode(&self, value: &str) -> Result<i32> {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(value))
            .map(|i| i as i32)
            .map_err(|_| OutbreakError::UnseenCategory {
                field: self.field.clone(),
                value: value.to_string(),
            })
    }

    pub fn decode(&self, code: i32) -> Option<&str> {
        usize::try_from(code)
            .ok()
            .and_then(|i| self.classes.get(i))
            .map(String::as_str)
    }

    /// Encode a column; nulls are encoded as [`MISSING`].
    fn encode_column(&self, column: &Column) -> Result<Column> {
        let values = column.cast(&DataType::String)?;
        let codes = values
            .str()?
            .into_iter()
            .map(|v| self.encode(v.unwrap_or(MISSING)))
            .collect::<Result<Vec<i32>>>()?;
        Ok(Column::new(self.field.as_str().into(), codes))
    }
}

/// Fitted mappings keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryEncoders {
    mappings: BTreeMap<String, CategoryMapping>,
}

/// Result of fitting encoders on a table.
#[derive(Debug)]
pub struct EncodedTable {
    pub frame: DataFrame,
    pub encoders: CategoryEncoders,
    /// Configured fields absent from the table (`UnknownCategoryField`).
    pub skipped: Vec<OutbreakError>,
}

impl CategoryEncoders {
    pub fn get(&self, field: &str) -> Option<&CategoryMapping> {
        self.mappings.get(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.mappings.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn insert(&mut self, mapping: CategoryMapping) {
        self.mappings.insert(mapping.field.clone(), mapping);
    }

    /// Fit one mapping per configured field and replace the columns with codes.
    ///
    /// Fields missing from the table are logged, reported in `skipped`, and
    /// left out; the remaining fields are still encoded.
    pub fn fit_transform<S: AsRef<str>>(df: DataFrame, fields: &[S]) -> Result<EncodedTable> {
        let mut frame = df;
        let mut encoders = CategoryEncoders::default();
        let mut skipped = Vec::new();

        for field in fields {
            let field = field.as_ref();
            if !frame.schema().contains(field) {
                log::warn!("Categorical column '{field}' not found in table, skipping");
                skipped.push(OutbreakError::UnknownCategoryField(field.to_string()));
                continue;
            }

            let values = frame.column(field)?.cast(&DataType::String)?;
            let mapping = CategoryMapping::fit(
                field,
                values.str()?.into_iter().map(|v| v.unwrap_or(MISSING)),
            );
            let encoded = mapping.encode_column(&values)?;
            frame.with_column(encoded)?;
            log::debug!("Encoded '{field}' with {} classes", mapping.len());
            encoders.insert(mapping);
        }

        Ok(EncodedTable {
            frame,
            encoders,
            skipped,
        })
    }

    /// Encode a table with the fitted mappings. Values outside a mapping's
    /// domain fail with `UnseenCategory`; the domain never grows.
    pub fn transform(&self, df: DataFrame) -> Result<DataFrame> {
        let mut frame = df;
        for mapping in self.mappings.values() {
            let encoded = match frame.column(mapping.field()) {
                Ok(column) => mapping.encode_column(column)?,
                Err(_) => {
                    log::warn!(
                        "Categorical column '{}' not found in table, skipping",
                        mapping.field()
                    );
                    continue;
                }
            };
            frame.with_column(encoded)?;
        }
        Ok(frame)
    }
}
