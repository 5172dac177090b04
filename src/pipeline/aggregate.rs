use std::collections::BTreeMap;

use serde::Serialize;

use super::extract::ParsedRow;
use super::normalize::MetricValue;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateRow {
    pub keyword: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub avg_position: f64,
    #[serde(rename = "Pageviews")]
    pub pageviews: MetricValue,
}

#[derive(Default)]
struct Group {
    sort_total: i128,
    count: u64,
    pageviews: MetricValue,
}

/// Round half to even at two decimals.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round_ties_even() / 100.0
}

/// Group by `(keyword, type)`: mean `sort` as `avg_position`, summed pageviews.
///
/// Rows without a `type` belong to no group; their count is returned
/// alongside the groups. Rows without a pageviews value still count toward
/// `avg_position` but add nothing to the sum. Output is ordered by
/// `(keyword, type)`.
pub fn aggregate(rows: &[ParsedRow]) -> (Vec<AggregateRow>, usize) {
    let mut groups: BTreeMap<(&str, &str), Group> = BTreeMap::new();
    let mut untyped = 0;

    for row in rows {
        let Some(kind) = row.kind.as_deref() else {
            untyped += 1;
            continue;
        };
        let group = groups.entry((row.keyword.as_str(), kind)).or_default();
        group.sort_total += i128::from(row.sort);
        group.count += 1;
        if let Some(views) = row.pageviews {
            group.pageviews = group.pageviews + views;
        }
    }

    let out = groups
        .into_iter()
        .map(|((keyword, kind), g)| AggregateRow {
            keyword: keyword.to_string(),
            kind: kind.to_string(),
            avg_position: round2(g.sort_total as f64 / g.count as f64),
            pageviews: g.pageviews,
        })
        .collect();
    (out, untyped)
}
