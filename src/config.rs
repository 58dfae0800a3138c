//! Run settings and per-site configuration.
//!
//! Two layers of configuration feed the pipeline:
//!
//! - [`GrabSettings`]: immutable settings for one process, folded once from the
//!   CLI and environment and then passed by reference into every component.
//! - [`SiteConfig`]: per-site YAML loaded from `sites/<site>/<site>.config.yaml`,
//!   carrying the day count, pacing, timeout, and the optional scrape recipe.
//!
//! # Example site config
//!
//! ```yaml
//! site: example.com
//! days: 2
//! delay: 500
//! timeout: 15000
//! scrape:
//!   url: "https://example.com/guide/{site_id}/{date}"
//!   selectors:
//!     item: ".schedule li"
//!     title: ".title"
//!     start: "time.start"
//!     stop: "time.end"
//!     time_attribute: datetime
//! ```

use crate::cli::GrabArgs;
use crate::error::{EpgError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_CONCURRENCY: usize = 3;
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

fn default_days() -> u32 {
    1
}

fn default_date_format() -> String {
    "%Y-%m-%d".to_string()
}

fn default_time_format() -> String {
    "%Y-%m-%dT%H:%M:%S%z".to_string()
}

/// Configuration for a single site, loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Site name; must match the `site` attribute of its channels.
    pub site: String,
    /// Number of UTC days to grab, starting at the reference date.
    #[serde(default = "default_days")]
    pub days: u32,
    /// Pause between consecutive grab calls, in milliseconds.
    #[serde(default)]
    pub delay: u64,
    /// Per-item timeout in milliseconds; falls back to the run default.
    #[serde(default)]
    pub timeout: Option<u64>,
    /// Recipe for the generic HTML grabber. Sites with a code-registered
    /// grabber leave this out.
    #[serde(default)]
    pub scrape: Option<ScrapeConfig>,
}

/// How the generic HTML grabber fetches and reads a site's schedule page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeConfig {
    /// URL template; `{site_id}`, `{xmltv_id}`, `{lang}` and `{date}` are substituted.
    pub url: String,
    /// chrono format used for `{date}` in the URL.
    #[serde(default = "default_date_format")]
    pub date_format: String,
    /// chrono format for start/stop values; must carry an offset.
    #[serde(default = "default_time_format")]
    pub time_format: String,
    pub selectors: ScrapeSelectors,
}

/// CSS selectors, evaluated relative to each programme element.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeSelectors {
    pub item: String,
    pub title: String,
    pub start: String,
    #[serde(default)]
    pub stop: Option<String>,
    #[serde(default)]
    pub sub_title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    /// Selector for an `<img>` whose `src` becomes the programme icon.
    #[serde(default)]
    pub icon: Option<String>,
    /// Read start/stop from this attribute instead of the element text.
    #[serde(default)]
    pub time_attribute: Option<String>,
}

impl SiteConfig {
    /// Minimal config for a site with a code-registered grabber.
    pub fn named(site: impl Into<String>) -> Self {
        Self {
            site: site.into(),
            days: default_days(),
            delay: 0,
            timeout: None,
            scrape: None,
        }
    }

    /// Load and validate a site config file.
    ///
    /// A `days` value of zero is treated as one, matching the behaviour of
    /// leaving it unset.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| EpgError::file(path, e))?;
        let mut config: SiteConfig =
            serde_yaml::from_str(&raw).map_err(|e| EpgError::SiteConfig {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        if config.site.trim().is_empty() {
            return Err(EpgError::SiteConfig {
                path: path.to_path_buf(),
                reason: "`site` must not be empty".to_string(),
            });
        }
        if config.days == 0 {
            config.days = default_days();
        }
        info!(site = %config.site, days = config.days, delay_ms = config.delay, "Loaded site config");
        debug!(?config, "Site config");
        Ok(config)
    }

    /// Load the site config at `path`, or fall back to [`SiteConfig::named`]
    /// when the file does not exist. A file that exists but is invalid is
    /// still an error.
    pub async fn load_or_default(path: &Path, site: &str) -> Result<Self> {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            Self::load(path).await
        } else {
            warn!(%site, path = %path.display(), "No site config found; using defaults");
            Ok(Self::named(site))
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay)
    }

    pub fn timeout_or(&self, default: Duration) -> Duration {
        self.timeout.map(Duration::from_millis).unwrap_or(default)
    }
}

/// Immutable settings for one `grab` invocation.
#[derive(Debug, Clone)]
pub struct GrabSettings {
    pub base_dir: PathBuf,
    /// UTC day that anchors the date range and the XMLTV `date` attribute.
    pub reference_date: NaiveDate,
    pub sites: Vec<String>,
    /// Output path templates, one per site, in site order.
    pub outputs: Vec<String>,
    pub lang: Option<String>,
    pub cron: Option<String>,
    pub concurrency: usize,
    pub gzip: bool,
    /// Default per-item grab timeout.
    pub timeout: Duration,
}

impl GrabSettings {
    /// Fold CLI arguments and environment into settings.
    ///
    /// Sites without an explicit output template get the default
    /// `<base>/guides/{lang}/<site>.xml`.
    pub fn from_args(args: &GrabArgs, base_dir: &Path, curr_date: Option<&str>) -> Result<Self> {
        let reference_date = match curr_date {
            Some(raw) => parse_reference_date(raw)?,
            None => Utc::now().date_naive(),
        };

        let sites: Vec<String> = split_list(&args.site);
        let explicit: Vec<String> = args.output.as_deref().map(split_list).unwrap_or_default();
        let outputs = sites
            .iter()
            .enumerate()
            .map(|(i, site)| {
                explicit.get(i).cloned().unwrap_or_else(|| {
                    base_dir
                        .join("guides")
                        .join("{lang}")
                        .join(format!("{site}.xml"))
                        .to_string_lossy()
                        .into_owned()
                })
            })
            .collect();

        Ok(Self {
            base_dir: base_dir.to_path_buf(),
            reference_date,
            sites,
            outputs,
            lang: args.lang.clone(),
            cron: args.cron.clone(),
            concurrency: args.concurrency.max(1),
            gzip: args.gzip,
            timeout: Duration::from_millis(args.timeout),
        })
    }

    pub fn site_config_path(&self, site: &str) -> PathBuf {
        self.base_dir
            .join("sites")
            .join(site)
            .join(format!("{site}.config.yaml"))
    }

    pub fn channels_glob(&self, site: &str) -> PathBuf {
        self.base_dir
            .join("sites")
            .join(site)
            .join(format!("{site}*.channels.xml"))
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.base_dir.join("tmp").join("data").join("channels.json")
    }

    /// Log every setting at startup.
    pub fn log(&self) {
        info!(
            base_dir = %self.base_dir.display(),
            reference_date = %self.reference_date,
            sites = ?self.sites,
            outputs = ?self.outputs,
            lang = ?self.lang,
            cron = ?self.cron,
            concurrency = self.concurrency,
            gzip = self.gzip,
            timeout = ?self.timeout,
            "Settings"
        );
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a `CURR_DATE` override into the UTC day it falls on.
pub fn parse_reference_date(raw: &str) -> Result<NaiveDate> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc).date_naive());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| EpgError::InvalidDate(raw.to_string()))
}
