pub mod aggregate;
pub mod extract;
pub mod normalize;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::analytics::{fetch_report, ReportError, ReportQuery, ReportSource};
use aggregate::AggregateRow;
use extract::ExtractStats;
use normalize::NormalizeError;

pub const COLUMNS: [&str; 4] = ["keyword", "type", "avg_position", "Pageviews"];

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RunStats {
    pub raw_rows: usize,
    pub extract: ExtractStats,
    pub untyped: usize,
    pub groups: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportTable {
    pub columns: Vec<&'static str>,
    pub rows: Vec<AggregateRow>,
    pub stats: RunStats,
}

impl ReportTable {
    /// Nothing survived filtering (or nothing came back at all).
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Four passes: fetch → normalize → extract → aggregate.
pub async fn run(
    source: &dyn ReportSource,
    query: &ReportQuery,
) -> Result<ReportTable, PipelineError> {
    let response = fetch_report(source, query).await?;
    let normalized = normalize::normalize(&response)?;
    let raw_rows = normalized.len();

    let (parsed, extract) = extract::extract_rows(normalized);
    let (rows, untyped) = aggregate::aggregate(&parsed);

    let stats = RunStats {
        raw_rows,
        extract,
        untyped,
        groups: rows.len(),
    };
    info!(
        "View {} since {}: {} raw rows, {} kept, {} groups",
        query.view_id, query.start, raw_rows, extract.kept, stats.groups
    );

    Ok(ReportTable {
        columns: COLUMNS.to_vec(),
        rows,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::tests::CannedSource;
    use crate::analytics::BatchGetResponse;
    use crate::dates::StartDate;
    use normalize::MetricValue;

    fn query() -> ReportQuery {
        ReportQuery::new("252616533", StartDate::DaysAgo(7))
    }

    #[tokio::test]
    async fn two_rows_end_to_end() {
        let source = CannedSource::fixture("two_rows");
        let table = run(&source, &query()).await.unwrap();

        assert_eq!(table.columns, COLUMNS.to_vec());
        assert_eq!(table.rows.len(), 1);
        let row = &table.rows[0];
        assert_eq!(row.keyword, "red shoes");
        assert_eq!(row.kind, "grid");
        assert_eq!(row.avg_position, 4.0);
        assert_eq!(row.pageviews, MetricValue::Integer(30));
    }

    #[tokio::test]
    async fn fixture_report() {
        let source = CannedSource::fixture("pageviews");
        let table = run(&source, &query()).await.unwrap();

        assert_eq!(table.stats.raw_rows, 8);
        assert_eq!(table.stats.extract.missing_page, 1);
        assert_eq!(table.stats.extract.missing_keyword, 1);
        assert_eq!(table.stats.untyped, 1);
        // the row without surface_inter_position must not leak into any group
        assert!(table.rows.iter().all(|r| r.keyword != "orphan"));

        let keywords: Vec<(&str, &str)> = table
            .rows
            .iter()
            .map(|r| (r.keyword.as_str(), r.kind.as_str()))
            .collect();
        assert_eq!(
            keywords,
            vec![
                ("best seller items", "grid"),
                ("red shoes", "carousel"),
                ("red shoes", "grid"),
            ]
        );

        let best = &table.rows[0];
        assert_eq!(best.avg_position, 29.0);
        assert_eq!(best.pageviews, MetricValue::Decimal(1234.0));

        let grid = &table.rows[2];
        assert_eq!(grid.avg_position, 4.0);
        assert_eq!(grid.pageviews, MetricValue::Integer(30));
    }

    #[tokio::test]
    async fn empty_result_is_not_an_error() {
        let source = CannedSource::new(vec![Ok(BatchGetResponse::default())]);
        let table = run(&source, &query()).await.unwrap();
        assert!(table.is_empty());
        assert_eq!(table.stats.raw_rows, 0);
    }

    #[tokio::test]
    async fn upstream_failure_is_distinguishable() {
        let source = CannedSource::new(vec![Err(ReportError::Unavailable(
            "connection refused".into(),
        ))]);
        let err = run(&source, &query()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Report(ReportError::Unavailable(_))));
    }
}
