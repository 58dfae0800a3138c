//! Data models for channels, queue items, and grabbed programs.
//!
//! This module defines the core data structures that flow through the pipeline:
//! - [`ChannelRef`]: A channel as declared in a site's channel definition file
//! - [`QueueItem`]: One unit of work, a single channel on a single UTC day
//! - [`ProgramEntry`]: A programme returned by a site grabber
//! - [`ProgramResult`]: Everything one grabber call produced
//! - [`GrabOutput`]: The accumulated result of draining one site's queue

use crate::config::SiteConfig;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A broadcast channel as listed in a channel definition file.
///
/// Uniquely identified by `(site, xmltv_id, lang)`. After parsing, the only
/// mutation is the catalog filling in [`ChannelRef::logo`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRef {
    /// The site (grabber) this channel is fetched from, e.g. `"example.com"`.
    pub site: String,
    /// The site's own identifier for the channel, used to build requests.
    pub site_id: String,
    /// Canonical channel id shared across sites, e.g. `"BBCOne.uk"`.
    pub xmltv_id: String,
    /// Language of the guide data for this channel (ISO 639-1/2 code).
    pub lang: String,
    /// Display name from the definition file.
    pub name: Option<String>,
    /// Logo URL, supplied by the channel catalog when known.
    pub logo: Option<String>,
}

impl ChannelRef {
    /// Value of a channel field by its output-template variable name.
    ///
    /// Returns `None` for unknown variables and for optional fields that are
    /// not set.
    pub fn template_value(&self, variable: &str) -> Option<&str> {
        match variable {
            "site" => Some(&self.site),
            "site_id" => Some(&self.site_id),
            "xmltv_id" => Some(&self.xmltv_id),
            "lang" => Some(&self.lang),
            "name" => self.name.as_deref(),
            "logo" => self.logo.as_deref(),
            _ => None,
        }
    }

    /// Field names in declaration order; grouping keys are built in this order.
    pub const TEMPLATE_FIELDS: [&'static str; 6] =
        ["site", "site_id", "xmltv_id", "lang", "name", "logo"];
}

/// One channel on one UTC calendar day, to be grabbed at most once per run.
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub channel: ChannelRef,
    pub date: NaiveDate,
    pub config: Arc<SiteConfig>,
}

impl QueueItem {
    /// Identity key `site:lang:xmltv_id:date` used for queue deduplication.
    pub fn key(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.channel.site,
            self.channel.lang,
            self.channel.xmltv_id,
            self.date.format("%Y-%m-%d")
        )
    }
}

/// A text value tagged with its language, as XMLTV carries titles and descriptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedText {
    pub value: String,
    pub lang: String,
}

impl LocalizedText {
    pub fn new(value: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            lang: lang.into(),
        }
    }
}

/// A single programme produced by a site grabber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramEntry {
    /// The `xmltv_id` of the channel this programme airs on.
    pub channel_id: String,
    /// Language of the programme data; matched against the channel's language.
    pub lang: String,
    pub start: DateTime<Utc>,
    pub stop: DateTime<Utc>,
    pub titles: Vec<LocalizedText>,
    #[serde(default)]
    pub sub_titles: Vec<LocalizedText>,
    #[serde(default)]
    pub descriptions: Vec<LocalizedText>,
    #[serde(default)]
    pub categories: Vec<LocalizedText>,
    pub icon: Option<String>,
}

impl ProgramEntry {
    /// Create an entry with a single title in the channel's language.
    pub fn new(
        channel: &ChannelRef,
        title: impl Into<String>,
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
    ) -> Self {
        Self {
            channel_id: channel.xmltv_id.clone(),
            lang: channel.lang.clone(),
            start,
            stop,
            titles: vec![LocalizedText::new(title, channel.lang.clone())],
            sub_titles: Vec::new(),
            descriptions: Vec::new(),
            categories: Vec::new(),
            icon: None,
        }
    }
}

/// Result of one `grab(channel, date)` call.
#[derive(Debug, Clone, Default)]
pub struct ProgramResult {
    pub date: Option<NaiveDate>,
    pub programs: Vec<ProgramEntry>,
}

/// Channels and programs accumulated by draining one site's queue.
///
/// `channels` holds one entry per queue item, including items whose grab
/// failed, so failed channels still show up in the output.
#[derive(Debug, Clone, Default)]
pub struct GrabOutput {
    pub channels: Vec<ChannelRef>,
    pub programs: Vec<ProgramEntry>,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;

    pub fn channel(site: &str, lang: &str, xmltv_id: &str) -> ChannelRef {
        ChannelRef {
            site: site.to_string(),
            site_id: format!("{}-{}", xmltv_id.to_lowercase(), lang),
            xmltv_id: xmltv_id.to_string(),
            lang: lang.to_string(),
            name: Some(format!("{} ({})", xmltv_id, lang)),
            logo: None,
        }
    }

    pub fn program(channel: &ChannelRef, title: &str, start_hour: u32) -> ProgramEntry {
        let start = Utc
            .with_ymd_and_hms(2024, 3, 1, start_hour, 0, 0)
            .single()
            .expect("valid fixture time");
        ProgramEntry::new(channel, title, start, start + chrono::Duration::hours(1))
    }
}
