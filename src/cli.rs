use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Crawl(CrawlArgs),
}

#[derive(Debug, Args)]
pub struct CrawlArgs {
    /// Root sitemap index URL (must be http/https).
    #[arg(
        long,
        default_value = "https://play.google.com/sitemaps/sitemaps-index-0.xml"
    )]
    pub sitemap_url: String,

    /// Output directory for per-app JSON records.
    #[arg(long, default_value = "apps_metadata")]
    pub out: String,

    /// Maximum apps to retrieve across all workers.
    #[arg(long, default_value_t = 1040)]
    pub max_items: usize,

    /// Number of partition workers; each requests max-items / workers URLs.
    #[arg(long, default_value_t = 13)]
    pub workers: usize,
}
