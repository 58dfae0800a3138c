//! Site grabbers: the per-source side of the pipeline.
//!
//! Every source exposes the same contract, [`SiteGrabber::grab`]: given a
//! channel and a UTC day, return that day's programmes or an error. Grabbers
//! may paginate or retry internally; the orchestrator only sees the result.
//!
//! # Registration
//!
//! [`GrabberRegistry`] maps site names to grabber instances. A site is resolved
//! in this order:
//!
//! 1. A grabber registered in code with [`GrabberRegistry::register`]
//! 2. The generic [`html::HtmlGrabber`], when the site config has a `scrape` recipe
//!
//! A site with neither fails its job with [`EpgError::UnknownSite`].

pub mod html;

use crate::config::SiteConfig;
use crate::error::{EpgError, Result};
use crate::models::{ChannelRef, ProgramResult};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A source of programme data for one site.
#[async_trait]
pub trait SiteGrabber: Send + Sync {
    /// Fetch the programmes of `channel` airing on `date` (UTC).
    async fn grab(&self, channel: &ChannelRef, date: NaiveDate) -> Result<ProgramResult>;
}

/// Lookup of grabbers keyed by site name.
#[derive(Clone, Default)]
pub struct GrabberRegistry {
    grabbers: HashMap<String, Arc<dyn SiteGrabber>>,
}

impl fmt::Debug for GrabberRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sites: Vec<_> = self.grabbers.keys().collect();
        sites.sort();
        f.debug_struct("GrabberRegistry")
            .field("sites", &sites)
            .finish()
    }
}

impl GrabberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, site: impl Into<String>, grabber: Arc<dyn SiteGrabber>) {
        self.grabbers.insert(site.into(), grabber);
    }

    pub fn get(&self, site: &str) -> Option<Arc<dyn SiteGrabber>> {
        self.grabbers.get(site).cloned()
    }

    /// Find the grabber for a site, building an HTML grabber from its config
    /// when nothing is registered.
    pub fn resolve(
        &self,
        config: &SiteConfig,
        client: &reqwest::Client,
    ) -> Result<Arc<dyn SiteGrabber>> {
        if let Some(grabber) = self.get(&config.site) {
            debug!(site = %config.site, "Using registered grabber");
            return Ok(grabber);
        }
        match &config.scrape {
            Some(scrape) => {
                debug!(site = %config.site, "Using HTML grabber from site config");
                let grabber = html::HtmlGrabber::new(client.clone(), scrape.clone())?;
                Ok(Arc::new(grabber))
            }
            None => Err(EpgError::UnknownSite(config.site.clone())),
        }
    }
}
