//! city-prefs CLI
//!
//! Drives the fetch controller from a terminal against a running backend.
//!
//! ```text
//! city-prefs browse --filter lon --pages 3
//! city-prefs prefs
//! city-prefs toggle 2643743
//! city-prefs city 2643743
//! ```

use anyhow::{Context, Result};
use city_prefs::sink::{NoRepaint, TracingErrorSink};
use city_prefs::{ApiConfig, CityId, ErrorSink, FetchController, HttpTransport, PagedClient};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "city-prefs", about = "Browse cities and manage favorites")]
struct Cli {
    /// Backend base URL (overrides config / environment)
    #[arg(long, env = "CITY_PREFS_BASE_URL")]
    base_url: Option<String>,

    /// YAML config file
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List cities matching a filter
    Browse {
        #[arg(short, long, default_value = "")]
        filter: String,
        /// Pages to load (first page + scrolls)
        #[arg(short, long, default_value_t = 1)]
        pages: usize,
    },
    /// Show favorite cities
    Prefs,
    /// Flip favorites for the given ids
    Toggle { ids: Vec<CityId> },
    /// Look up a single city
    City { id: CityId },
}

/// Prints notifications the way a snackbar would show them.
struct ConsoleSink;

impl ErrorSink for ConsoleSink {
    fn report(&self, message: String) {
        eprintln!("{} {}", "error:".red().bold(), message);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "city_prefs=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ApiConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ApiConfig::from_env().context("Invalid CITY_PREFS_* environment")?,
    };
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }
    config.validate()?;
    tracing::debug!(base_url = %config.base_url, "using backend");

    let transport = Arc::new(HttpTransport::new(&config)?);
    let client = Arc::new(PagedClient::new(transport, config)?);
    // Piped stderr gets notifications as log lines rather than colored text.
    let errors: Arc<dyn ErrorSink> = if std::io::stderr().is_terminal() {
        Arc::new(ConsoleSink)
    } else {
        Arc::new(TracingErrorSink)
    };
    let controller = FetchController::new(client, errors, Arc::new(NoRepaint));

    match cli.command {
        Command::Browse { filter, pages } => browse(&controller, &filter, pages).await?,
        Command::Prefs => prefs(&controller).await?,
        Command::Toggle { ids } => toggle(&controller, &ids).await?,
        Command::City { id } => {
            let city = controller.names().resolve(id).await?;
            println!("{}  {}, {}, {}", city.id, city.name.bold(), city.region, city.country);
        }
    }

    controller.shutdown();
    Ok(())
}

async fn browse(controller: &FetchController, filter: &str, pages: usize) -> Result<()> {
    controller.mount().await?;
    if !filter.trim().is_empty() {
        controller.on_filter_input(filter);
        wait_for_filter(controller).await;
    }
    for _ in 1..pages {
        match controller.on_scroll_near_bottom() {
            Some(handle) => handle.await?,
            None => break,
        }
    }

    let state = controller.snapshot();
    for city in &state.items {
        let marker = if state.is_selected(city.id) {
            "★".yellow()
        } else {
            " ".normal()
        };
        println!(
            "{} {:>9}  {} {}",
            marker,
            city.id,
            city.name.bold(),
            format!("({}, {})", city.region, city.country).dimmed()
        );
    }
    let footer = if state.last_page {
        format!("{} cities, end of list", state.items.len())
    } else {
        format!("{} cities, more available", state.items.len())
    };
    println!("{}", footer.dimmed());
    Ok(())
}

async fn prefs(controller: &FetchController) -> Result<()> {
    controller.mount().await?;
    let state = controller.snapshot();
    let chips = controller.selected_cities();
    for city in &chips {
        println!("★ {} {}", city.name.bold(), city.country.dimmed());
    }
    let unnamed = state.selected_ids.len().saturating_sub(chips.len());
    if unnamed > 0 {
        println!("{}", format!("{} favorites could not be named", unnamed).dimmed());
    }
    Ok(())
}

async fn toggle(controller: &FetchController, ids: &[CityId]) -> Result<()> {
    controller.mount().await?;
    let handles: Vec<_> = ids.iter().filter_map(|id| controller.on_toggle(*id)).collect();
    for handle in handles {
        handle.await?;
    }
    let state = controller.snapshot();
    for id in ids {
        let status = if state.is_selected(*id) {
            "favorite".green()
        } else {
            "not favorite".normal()
        };
        println!("{:>9}  {}", id, status);
    }
    Ok(())
}

/// Wait out the debounce window and the fetch it triggers.
async fn wait_for_filter(controller: &FetchController) {
    let window = controller.debounce_window();
    tokio::time::sleep(window + Duration::from_millis(20)).await;
    while controller.snapshot().loading {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
