use clap::Parser;

use mirror_proxy::config::ObservabilityConfig;
use mirror_proxy::crawler::{CrawlOptions, Crawler};
use mirror_proxy::observability::logging;

#[derive(Parser)]
#[command(name = "cache-warmer")]
#[command(about = "Warm a running mirror's cache by crawling it", long_about = None)]
struct Cli {
    /// Base URL of the running mirror
    #[arg(short, long, env = "WARMER_URL", default_value = "http://localhost:8000")]
    url: String,

    /// Path to start crawling from
    #[arg(default_value = "/")]
    start: String,

    /// Maximum in-flight requests
    #[arg(short, long, default_value_t = 64)]
    concurrency: usize,

    /// Maximum number of requests for the whole crawl
    #[arg(short, long, default_value_t = 100)]
    max_fetches: usize,

    /// Never request paths starting with this prefix (repeatable)
    #[arg(long = "skip-prefix", default_value = "/proxy")]
    skip_prefixes: Vec<String>,

    /// Extensions warmed with HEAD instead of GET
    #[arg(long = "asset-ext", value_delimiter = ',', default_value = ".png,.jpg,.js")]
    asset_extensions: Vec<String>,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init(&ObservabilityConfig {
        log_level: cli.log_level.clone(),
        ..ObservabilityConfig::default()
    });

    let options = CrawlOptions {
        concurrency: cli.concurrency,
        max_fetches: cli.max_fetches,
        skip_prefixes: cli.skip_prefixes,
        asset_extensions: cli.asset_extensions,
        request_timeout: std::time::Duration::from_secs(cli.timeout_secs),
    };

    let crawler = Crawler::new(&cli.url, options)?;
    let report = crawler.crawl(&cli.start).await?;

    println!(
        "visited {} | fetched {} | failed {}",
        report.visited, report.fetched, report.failed
    );
    if report.failed > 0 {
        eprintln!("Warning: {} requests failed", report.failed);
    }
    Ok(())
}
