//! # EPG Grab
//!
//! Fetches Electronic Program Guide data for sets of broadcast channels from
//! per-site grabbers and assembles the results into XMLTV guide files.
//!
//! ## Features
//!
//! - Builds a work queue of (channel, day) items from `*.channels.xml` files,
//!   deduplicated and enriched with logos from the channel catalog
//! - Grabs each site's queue sequentially with a per-item timeout; a failing
//!   item is logged and skipped
//! - Runs several sites concurrently under a configurable ceiling, once or on
//!   a cron schedule
//! - Writes one XMLTV document per output-template group, with optional gzip
//!   copies
//!
//! ## Usage
//!
//! ```sh
//! epg_grab load
//! epg_grab grab --site example.com --gzip
//! ```
//!
//! ## Architecture
//!
//! 1. **Queue**: channel files → deduplicated (channel, date) items per site
//! 2. **Grab**: each item through the site's [`scrapers::SiteGrabber`]
//! 3. **Save**: group, sort, dedup and serialize to XMLTV
//! 4. **Schedule**: fan the above out across sites, optionally on cron

use clap::Parser;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod channels;
mod cli;
mod config;
mod error;
mod grab;
mod models;
mod outputs;
mod progress;
mod queue;
mod scheduler;
mod scrapers;
#[cfg(test)]
mod test_support;
mod utils;

use api::{API_BASE_URL, ChannelCatalog};
use cli::{Cli, Command};
use config::{GrabSettings, SiteConfig};
use error::EpgError;
use progress::{LogObserver, ProgressObserver};
use queue::build_queue;
use scheduler::{Job, RunContext, Scheduler};
use scrapers::GrabberRegistry;
use utils::format_elapsed;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = Instant::now();
    info!("epg_grab starting up");

    let cli = Cli::parse();
    debug!(?cli, "Parsed CLI arguments");
    let base_dir = PathBuf::from(&cli.base_dir);

    match &cli.command {
        Command::Load => load(&base_dir).await?,
        Command::Grab(args) => {
            let settings = GrabSettings::from_args(args, &base_dir, cli.curr_date.as_deref())?;
            grab_sites(&settings).await?;
        }
    }

    info!(
        elapsed = %format_elapsed(start_time.elapsed()),
        "epg_grab finished"
    );
    Ok(())
}

fn http_client() -> Result<reqwest::Client, EpgError> {
    Ok(reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// `load`: download the reference data into `<base>/tmp/data`.
#[instrument(level = "info", skip_all, fields(base_dir = %base_dir.display()))]
async fn load(base_dir: &Path) -> Result<(), Box<dyn Error>> {
    let client = http_client()?;
    let data_dir = base_dir.join("tmp").join("data");
    let report = api::load_reference_data(&client, API_BASE_URL, &data_dir).await?;

    if report.failed.is_empty() {
        info!(files = report.downloaded.len(), "Reference data loaded");
    } else {
        warn!(
            downloaded = report.downloaded.len(),
            failed = report.failed.len(),
            "Reference data partially loaded"
        );
    }
    Ok(())
}

/// `grab`: build one job per site, then run them once or on the cron schedule.
#[instrument(level = "info", skip_all, fields(sites = settings.sites.len()))]
async fn grab_sites(settings: &GrabSettings) -> Result<(), Box<dyn Error>> {
    settings.log();

    let observer: Arc<dyn ProgressObserver> = Arc::new(LogObserver);
    let client = http_client()?;
    let registry = GrabberRegistry::new();

    let catalog = ChannelCatalog::load(&settings.catalog_path()).await;
    info!(channels = catalog.len(), "Loaded channel catalog");

    let mut jobs = Vec::with_capacity(settings.sites.len());
    for (site, output) in settings.sites.iter().zip(&settings.outputs) {
        let config =
            Arc::new(SiteConfig::load_or_default(&settings.site_config_path(site), site).await?);

        let queue = build_queue(
            &settings.channels_glob(site),
            Arc::clone(&config),
            &catalog,
            settings.lang.as_deref(),
            settings.reference_date,
            observer.as_ref(),
        )
        .await;

        let grabber = match registry.resolve(&config, &client) {
            Ok(grabber) => Some(grabber),
            Err(EpgError::UnknownSite(_)) => {
                warn!(%site, "No grabber registered or configured for site");
                None
            }
            Err(e) => return Err(e.into()),
        };

        jobs.push(Job {
            site: site.clone(),
            config,
            queue,
            output: output.clone(),
            grabber,
        });
    }

    let ctx = RunContext {
        reference_date: settings.reference_date,
        gzip: settings.gzip,
        timeout: settings.timeout,
        concurrency: settings.concurrency,
        observer,
    };
    let scheduler = Arc::new(Scheduler::new(jobs, ctx));

    match &settings.cron {
        Some(expr) => {
            let handle = Arc::clone(&scheduler).schedule(expr)?;
            handle.await?;
        }
        None => scheduler.run_once().await?,
    }
    Ok(())
}
