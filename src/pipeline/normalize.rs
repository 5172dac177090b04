use std::collections::BTreeMap;
use std::fmt;
use std::ops::Add;

use serde::Serialize;
use thiserror::Error;

use crate::analytics::{
    BatchGetResponse, Report, DIMENSION_DATE, DIMENSION_PAGE_PATH, METRIC_PAGEVIEWS,
};

#[derive(Debug, Error, PartialEq)]
pub enum NormalizeError {
    #[error("metric {name} has unparseable value {value:?}")]
    Metric { name: String, value: String },
    #[error("report has rows but no {0} metric column")]
    MissingMetric(&'static str),
}

/// A metric cell, typed by the separator heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Integer(i128),
    Decimal(f64),
}

impl MetricValue {
    /// Any `,` or `.` makes the value a decimal, otherwise an integer.
    ///
    /// Grouping commas are dropped before the decimal parse, so `"1,234"`
    /// comes back as `Decimal(1234.0)` rather than an integer. Integers too
    /// wide for `i128` degrade to a decimal instead of failing.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.contains(',') || raw.contains('.') {
            return raw.replace(',', "").parse::<f64>().ok().map(MetricValue::Decimal);
        }
        match raw.parse::<i128>() {
            Ok(n) => Some(MetricValue::Integer(n)),
            Err(_) if is_integer_literal(raw) => raw.parse::<f64>().ok().map(MetricValue::Decimal),
            Err(_) => None,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            MetricValue::Integer(n) => n as f64,
            MetricValue::Decimal(x) => x,
        }
    }
}

fn is_integer_literal(raw: &str) -> bool {
    let digits = raw.strip_prefix(['-', '+']).unwrap_or(raw);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

impl Default for MetricValue {
    fn default() -> Self {
        MetricValue::Integer(0)
    }
}

impl Add for MetricValue {
    type Output = MetricValue;

    fn add(self, rhs: MetricValue) -> MetricValue {
        match (self, rhs) {
            (MetricValue::Integer(a), MetricValue::Integer(b)) => match a.checked_add(b) {
                Some(sum) => MetricValue::Integer(sum),
                None => MetricValue::Decimal(a as f64 + b as f64),
            },
            (a, b) => MetricValue::Decimal(a.as_f64() + b.as_f64()),
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Integer(n) => write!(f, "{}", n),
            MetricValue::Decimal(x) => write!(f, "{}", x),
        }
    }
}

/// One report row keyed by header name, before any renaming.
#[derive(Debug, Clone, Default)]
pub struct FlatRow {
    pub dimensions: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, MetricValue>,
}

/// `pageviews` is `None` when the row carries no value for the column.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRow {
    pub date: Option<String>,
    pub path: Option<String>,
    pub pageviews: Option<MetricValue>,
}

fn has_metric(report: &Report, name: &str) -> bool {
    report
        .column_header
        .metric_header
        .metric_header_entries
        .iter()
        .any(|h| h.name == name)
}

/// One row per report row, keyed by header name.
fn flatten_report(report: &Report, out: &mut Vec<FlatRow>) -> Result<(), NormalizeError> {
    let dimension_headers = &report.column_header.dimensions;
    let metric_headers = &report.column_header.metric_header.metric_header_entries;

    for row in &report.data.rows {
        let mut flat = FlatRow::default();
        for (header, value) in dimension_headers.iter().zip(&row.dimensions) {
            flat.dimensions.insert(header.clone(), value.clone());
        }
        // later date ranges overwrite earlier ones
        for range in &row.metrics {
            for (header, raw) in metric_headers.iter().zip(&range.values) {
                let value = MetricValue::parse(raw).ok_or_else(|| NormalizeError::Metric {
                    name: header.name.clone(),
                    value: raw.clone(),
                })?;
                flat.metrics.insert(header.name.clone(), value);
            }
        }
        out.push(flat);
    }
    Ok(())
}

impl From<FlatRow> for NormalizedRow {
    fn from(mut flat: FlatRow) -> Self {
        Self {
            date: flat.dimensions.remove(DIMENSION_DATE),
            path: flat.dimensions.remove(DIMENSION_PAGE_PATH),
            pageviews: flat.metrics.remove(METRIC_PAGEVIEWS),
        }
    }
}

/// Flatten the response and map its columns onto `date`, `path`, `Pageviews`.
///
/// A report with rows must declare the pageviews column; individual rows
/// may still lack a value for it.
pub fn normalize(response: &BatchGetResponse) -> Result<Vec<NormalizedRow>, NormalizeError> {
    let mut flat = Vec::new();
    for report in &response.reports {
        if !report.data.rows.is_empty() && !has_metric(report, METRIC_PAGEVIEWS) {
            return Err(NormalizeError::MissingMetric(METRIC_PAGEVIEWS));
        }
        flatten_report(report, &mut flat)?;
    }
    Ok(flat.into_iter().map(NormalizedRow::from).collect())
}
