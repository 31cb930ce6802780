mod browser;
mod config;
mod extract;
mod feed;
mod fsutil;
mod ident;
mod images;
mod model;
mod pipeline;
mod registry;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use config::Config;
use registry::Registry;

#[derive(Parser)]
#[command(name = "storefeed", about = "Storefront catalog crawler and marketplace XML feed builder")]
struct Cli {
    /// TOML config file (built-in defaults when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl the catalog, merge into the registry and publish the feed
    Run,
    /// Rebuild the feed from the saved registry without crawling
    Feed,
    /// Show registry statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    let result = match cli.command {
        Commands::Run => {
            info!("Starting catalog run for {}", config.site.catalog_url);
            pipeline::run(&config).await.map(|s| {
                println!(
                    "Extracted {} products ({} skipped) and {} collections.",
                    s.extracted, s.skipped, s.collections
                );
                match s.saved {
                    Some(n) => println!("Registry: {} products ({} saved).", s.registry, n),
                    None => println!("Registry: {} products (progress NOT saved).", s.registry),
                }
                print_feed(&s);
            })
        }
        Commands::Feed => pipeline::rebuild_feed(&config).await.map(|s| {
            println!("Registry: {} products.", s.registry);
            print_feed(&s);
        }),
        Commands::Stats => {
            let reg = Registry::new(config.output.progress_path());
            let s = registry::stats(&reg.load());
            println!("Registry:        {}", reg.path().display());
            println!("Products:        {}", s.products);
            println!("In collections:  {}", s.with_collection);
            println!("Collections:     {}", s.collections);
            println!("Described:       {}", s.with_description);
            println!("Zero price:      {}", s.zero_price);
            Ok(())
        }
    };

    if let Err(e) = &result {
        error!("Run failed: {:#}", e);
    }

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn print_feed(s: &pipeline::RunSummary) {
    println!(
        "Feed: {} offers, {} collections, {} override images, {}.",
        s.offers,
        s.feed_collections,
        s.overrides,
        if s.published { "published" } else { "NOT published, previous feed kept" }
    );
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
