mod analytics;
mod dates;
mod pipeline;
mod settings;
mod web;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use analytics::{AnalyticsClient, ReportQuery};
use dates::StartDate;
use settings::Settings;

#[derive(Parser)]
#[command(name = "surface_report", about = "Keyword/type pageview report for surface placements")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the dashboard (default)
    Serve {
        /// Bind address (overrides SURFACE_SERVER__ADDR)
        #[arg(long)]
        addr: Option<String>,
    },
    /// Run the report once and print it
    Report {
        /// View id (default: configured default view)
        #[arg(short, long)]
        view: Option<String>,
        /// Start date: today, yesterday, NdaysAgo or YYYY-MM-DD
        #[arg(short, long)]
        since: Option<String>,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
        /// Print all rows as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// List configured views and time windows
    Views,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load()?;

    let result = match cli.command.unwrap_or(Commands::Serve { addr: None }) {
        Commands::Serve { addr } => {
            let credentials = settings.auth.pair()?;
            let client = AnalyticsClient::new(&settings.analytics)
                .context("Failed to initialise reporting client")?;
            let addr = addr.unwrap_or_else(|| settings.server.addr.clone());

            let state = web::AppState::new(settings, Arc::new(client), credentials);
            let app = web::create_router(state);

            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("Failed to bind {}", addr))?;
            info!("Dashboard listening on http://{}", addr);
            axum::serve(listener, app).await?;
            return Ok(());
        }
        Commands::Report {
            view,
            since,
            limit,
            json,
        } => {
            let view = view.unwrap_or_else(|| settings.default_view.clone());
            let since = since.unwrap_or_else(|| settings.default_window.clone());
            let start: StartDate = since.parse()?;

            let client = AnalyticsClient::new(&settings.analytics)
                .context("Failed to initialise reporting client")?;
            let query = ReportQuery::new(view.clone(), start)
                .with_page_size(settings.analytics.page_size);

            let pb = indicatif::ProgressBar::new_spinner();
            pb.set_message(format!("Fetching view {} since {}", view, start));
            pb.enable_steady_tick(Duration::from_millis(120));
            let table = pipeline::run(&client, &query).await;
            pb.finish_and_clear();
            let table = table?;

            if json {
                println!("{}", serde_json::to_string_pretty(&table.rows)?);
                return Ok(());
            }
            if table.is_empty() {
                println!("No rows left after filtering ({} raw rows).", table.stats.raw_rows);
                return Ok(());
            }

            let label = settings
                .view(&view)
                .map(|v| v.label.as_str())
                .unwrap_or("unlisted view");
            let today = chrono::Local::now().date_naive();
            println!(
                "{} ({}) | {} .. {}\n",
                label,
                view,
                start.resolve(today),
                today
            );
            print_table(&table, limit);
            Ok(())
        }
        Commands::Views => {
            println!("Views:");
            for v in &settings.views {
                let mark = if v.value == settings.default_view { "*" } else { " " };
                println!(" {} {:<12} {}", mark, v.value, v.label);
            }
            println!("\nTime windows:");
            for w in &settings.windows {
                let mark = if w.value == settings.default_window { "*" } else { " " };
                println!(" {} {:<12} {}", mark, w.value, w.label);
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn print_table(table: &pipeline::ReportTable, limit: usize) {
    println!(
        "{:>3} | {:<32} | {:<12} | {:>12} | {:>10}",
        "#", "Keyword", "Type", "Avg position", "Pageviews"
    );
    println!("{}", "-".repeat(82));

    for (i, r) in table.rows.iter().take(limit).enumerate() {
        println!(
            "{:>3} | {:<32} | {:<12} | {:>12.2} | {:>10}",
            i + 1,
            truncate(&r.keyword, 32),
            truncate(&r.kind, 12),
            r.avg_position,
            r.pageviews.to_string()
        );
    }

    let s = &table.stats;
    println!(
        "\n{} groups ({} shown) | {} report rows, {} dropped, {} without type",
        table.rows.len(),
        table.rows.len().min(limit),
        s.raw_rows,
        s.extract.dropped(),
        s.untyped
    );
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_keeps_width() {
        assert_eq!(truncate("grid", 12), "grid");
        assert_eq!(truncate("a very long keyword indeed", 10), "a very ...");
        assert_eq!(truncate("a very long keyword indeed", 10).chars().count(), 10);
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }

    #[test]
    fn cli_parses_report_flags() {
        let cli = Cli::try_parse_from([
            "surface_report",
            "report",
            "--view",
            "277875383",
            "--since",
            "30daysAgo",
            "-n",
            "10",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Report {
                view, since, limit, json,
            }) => {
                assert_eq!(view.as_deref(), Some("277875383"));
                assert_eq!(since.as_deref(), Some("30daysAgo"));
                assert_eq!(limit, 10);
                assert!(!json);
            }
            _ => panic!("expected report command"),
        }
    }

    #[test]
    fn no_subcommand_means_serve() {
        let cli = Cli::try_parse_from(["surface_report"]).unwrap();
        assert!(cli.command.is_none());
    }
}
