use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use super::normalize::{MetricValue, NormalizedRow};

/// Items per results page; `sort` flattens (page, rank) with it.
pub const PAGE_SIZE: i64 = 24;

static LOCALE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"locale=([a-z]*)").unwrap());
static KEYWORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"surface_detail=([a-zA-Z+ -]*)").unwrap());
static PAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"surface_inter_position=(\d*)").unwrap());
static RANK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"surface_intra_position=(\d*)").unwrap());
static TYPE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"&surface_type=(\w*)").unwrap());

/// Raw surface tokens found in a page path. A token is `None` when its
/// `key=` marker is absent; a present marker may still capture `""`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SurfaceTokens {
    pub locale: Option<String>,
    pub keyword: Option<String>,
    pub page: Option<String>,
    pub rank: Option<String>,
    pub kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedRow {
    pub date: Option<String>,
    pub path: String,
    pub pageviews: Option<MetricValue>,
    pub locale: Option<String>,
    pub keyword: String,
    pub page: i64,
    pub rank: i64,
    pub kind: Option<String>,
    pub sort: i64,
}

/// Why rows fell out of the extraction step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExtractStats {
    pub input: usize,
    pub missing_path: usize,
    pub missing_page: usize,
    pub missing_keyword: usize,
    pub missing_rank: usize,
    pub invalid_position: usize,
    pub kept: usize,
}

impl ExtractStats {
    pub fn dropped(&self) -> usize {
        self.input - self.kept
    }
}

fn capture(re: &Regex, path: &str) -> Option<String> {
    re.captures(path)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn extract_tokens(path: &str) -> SurfaceTokens {
    SurfaceTokens {
        locale: capture(&LOCALE_RE, path),
        keyword: capture(&KEYWORD_RE, path).map(|k| normalize_keyword(&k)),
        page: capture(&PAGE_RE, path),
        rank: capture(&RANK_RE, path),
        kind: capture(&TYPE_RE, path),
    }
}

/// Lowercase, `-` and `+` to spaces, trimmed.
pub fn normalize_keyword(raw: &str) -> String {
    raw.to_lowercase()
        .replace(['-', '+'], " ")
        .trim()
        .to_string()
}

/// Flattened rank across pages: `(page - 1) * PAGE_SIZE + rank`.
pub fn global_position(page: i64, rank: i64) -> Option<i64> {
    page.checked_sub(1)?
        .checked_mul(PAGE_SIZE)?
        .checked_add(rank)
}

/// Parse surface tokens out of every row's path, dropping incomplete rows.
pub fn extract_rows(rows: Vec<NormalizedRow>) -> (Vec<ParsedRow>, ExtractStats) {
    let mut stats = ExtractStats {
        input: rows.len(),
        ..Default::default()
    };
    let mut parsed = Vec::with_capacity(rows.len());

    for row in rows {
        let Some(path) = row.path else {
            stats.missing_path += 1;
            continue;
        };
        let tokens = extract_tokens(&path);

        let Some(page_raw) = tokens.page else {
            stats.missing_page += 1;
            continue;
        };
        let Some(keyword) = tokens.keyword else {
            stats.missing_keyword += 1;
            continue;
        };
        let Some(rank_raw) = tokens.rank else {
            stats.missing_rank += 1;
            continue;
        };

        let position = page_raw.parse::<i64>().ok().zip(rank_raw.parse::<i64>().ok());
        let Some(((page, rank), sort)) =
            position.and_then(|(p, r)| global_position(p, r).map(|s| ((p, r), s)))
        else {
            debug!(
                "Dropping {}: page {:?} / rank {:?} not integers",
                path, page_raw, rank_raw
            );
            stats.invalid_position += 1;
            continue;
        };

        parsed.push(ParsedRow {
            date: row.date,
            path,
            pageviews: row.pageviews,
            locale: tokens.locale,
            keyword,
            page,
            rank,
            kind: tokens.kind,
            sort,
        });
    }

    stats.kept = parsed.len();
    if stats.dropped() > 0 {
        debug!(
            "Extraction dropped {} of {} rows ({:?})",
            stats.dropped(),
            stats.input,
            stats
        );
    }
    (parsed, stats)
}
