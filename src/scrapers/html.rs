//! Generic HTML schedule scraper driven by a site's `scrape` recipe.
//!
//! The grabber fetches one page per channel per day and walks it with CSS
//! selectors, the same way a hand-written scraper would:
//!
//! 1. Build the request URL from the recipe's template
//! 2. Select every programme element with `selectors.item`
//! 3. Read title, times and optional metadata relative to each element
//!
//! # Missing stop times
//!
//! Schedules often list only start times. When a programme has no stop
//! value, the next programme's start is used; a trailing programme with no
//! stop is dropped.

use super::SiteGrabber;
use crate::config::ScrapeConfig;
use crate::error::{EpgError, Result};
use crate::models::{ChannelRef, LocalizedText, ProgramEntry, ProgramResult};
use async_trait::async_trait;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, NaiveDate, Utc};
use scraper::{ElementRef, Html, Selector};
use std::fmt::Write;
use tracing::{debug, info, instrument, warn};
use url::Url;

#[derive(Debug)]
struct Selectors {
    item: Selector,
    title: Selector,
    start: Selector,
    stop: Option<Selector>,
    sub_title: Option<Selector>,
    description: Option<Selector>,
    category: Option<Selector>,
    icon: Option<Selector>,
}

fn compile(selector: &str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|e| EpgError::Scrape(format!("invalid selector '{selector}': {e}")))
}

fn compile_opt(selector: Option<&String>) -> Result<Option<Selector>> {
    selector.map(|s| compile(s)).transpose()
}

/// Render `date` with a strftime format, failing instead of panicking on
/// unknown or time-only specifiers.
fn format_date(date: NaiveDate, format: &str) -> Result<String> {
    let mut out = String::new();
    write!(out, "{}", date.format(format))
        .map_err(|_| EpgError::Scrape(format!("invalid date_format '{format}'")))?;
    Ok(out)
}

fn check_time_format(format: &str) -> Result<()> {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(EpgError::Scrape(format!("invalid time_format '{format}'")));
    }
    Ok(())
}

/// A [`SiteGrabber`] configured entirely from YAML.
#[derive(Debug)]
pub struct HtmlGrabber {
    client: reqwest::Client,
    recipe: ScrapeConfig,
    selectors: Selectors,
}

/// A programme as read from the page, before stop times are settled.
struct RawProgram {
    start: DateTime<Utc>,
    stop: Option<DateTime<Utc>>,
    title: String,
    sub_title: Option<String>,
    description: Option<String>,
    category: Option<String>,
    icon: Option<String>,
}

impl HtmlGrabber {
    /// Compile the recipe's selectors and check its date and time formats.
    pub fn new(client: reqwest::Client, recipe: ScrapeConfig) -> Result<Self> {
        format_date(NaiveDate::default(), &recipe.date_format)?;
        check_time_format(&recipe.time_format)?;

        let s = &recipe.selectors;
        let selectors = Selectors {
            item: compile(&s.item)?,
            title: compile(&s.title)?,
            start: compile(&s.start)?,
            stop: compile_opt(s.stop.as_ref())?,
            sub_title: compile_opt(s.sub_title.as_ref())?,
            description: compile_opt(s.description.as_ref())?,
            category: compile_opt(s.category.as_ref())?,
            icon: compile_opt(s.icon.as_ref())?,
        };
        Ok(Self {
            client,
            recipe,
            selectors,
        })
    }

    /// Substitute the channel and date into the recipe's URL template.
    pub fn request_url(&self, channel: &ChannelRef, date: NaiveDate) -> Result<Url> {
        let raw = self
            .recipe
            .url
            .replace("{site_id}", &urlencoding::encode(&channel.site_id))
            .replace("{xmltv_id}", &urlencoding::encode(&channel.xmltv_id))
            .replace("{lang}", &urlencoding::encode(&channel.lang))
            .replace("{date}", &format_date(date, &self.recipe.date_format)?);
        Url::parse(&raw).map_err(|e| EpgError::Scrape(format!("invalid url '{raw}': {e}")))
    }

    /// Extract programmes for `channel` from a schedule page.
    pub fn parse_programs(
        &self,
        html: &str,
        channel: &ChannelRef,
        base: &Url,
    ) -> Vec<ProgramEntry> {
        let document = Html::parse_document(html);
        let mut raw = Vec::new();

        for element in document.select(&self.selectors.item) {
            let Some(title) = text_of(&element, &self.selectors.title) else {
                debug!("Skipping programme without title");
                continue;
            };
            let Some(start) = self.time_of(&element, &self.selectors.start) else {
                warn!(%title, "Skipping programme with unreadable start time");
                continue;
            };
            let stop = self
                .selectors
                .stop
                .as_ref()
                .and_then(|sel| self.time_of(&element, sel));
            let icon = self.selectors.icon.as_ref().and_then(|sel| {
                element
                    .select(sel)
                    .next()
                    .and_then(|img| img.value().attr("src"))
                    .and_then(|src| base.join(src).ok())
                    .map(|u| u.to_string())
            });

            raw.push(RawProgram {
                start,
                stop,
                title,
                sub_title: opt_text(&element, self.selectors.sub_title.as_ref()),
                description: opt_text(&element, self.selectors.description.as_ref()),
                category: opt_text(&element, self.selectors.category.as_ref()),
                icon,
            });
        }

        settle_stops(raw)
            .into_iter()
            .map(|(p, stop)| {
                let lang = channel.lang.clone();
                let mut entry = ProgramEntry::new(channel, p.title, p.start, stop);
                entry.sub_titles = p
                    .sub_title
                    .map(|v| vec![LocalizedText::new(v, lang.clone())])
                    .unwrap_or_default();
                entry.descriptions = p
                    .description
                    .map(|v| vec![LocalizedText::new(v, lang.clone())])
                    .unwrap_or_default();
                entry.categories = p
                    .category
                    .map(|v| vec![LocalizedText::new(v, lang.clone())])
                    .unwrap_or_default();
                entry.icon = p.icon;
                entry
            })
            .collect()
    }

    fn time_of(&self, element: &ElementRef<'_>, selector: &Selector) -> Option<DateTime<Utc>> {
        let node = element.select(selector).next()?;
        let value = match &self.recipe.selectors.time_attribute {
            Some(attr) => node.value().attr(attr)?.trim().to_string(),
            None => collect_text(&node),
        };
        DateTime::parse_from_str(&value, &self.recipe.time_format)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

fn collect_text(element: &ElementRef<'_>) -> String {
    let text: String = element.text().collect();
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn text_of(element: &ElementRef<'_>, selector: &Selector) -> Option<String> {
    element
        .select(selector)
        .next()
        .map(|node| collect_text(&node))
        .filter(|t| !t.is_empty())
}

fn opt_text(element: &ElementRef<'_>, selector: Option<&Selector>) -> Option<String> {
    selector.and_then(|sel| text_of(element, sel))
}

fn settle_stops(raw: Vec<RawProgram>) -> Vec<(RawProgram, DateTime<Utc>)> {
    let next_starts: Vec<Option<DateTime<Utc>>> = raw
        .iter()
        .skip(1)
        .map(|p| Some(p.start))
        .chain(std::iter::once(None))
        .collect();

    raw.into_iter()
        .zip(next_starts)
        .filter_map(|(p, next)| {
            let stop = p.stop.or(next)?;
            (stop > p.start).then_some((p, stop))
        })
        .collect()
}

#[async_trait]
impl SiteGrabber for HtmlGrabber {
    #[instrument(level = "debug", skip_all, fields(site = %channel.site, xmltv_id = %channel.xmltv_id, %date))]
    async fn grab(&self, channel: &ChannelRef, date: NaiveDate) -> Result<ProgramResult> {
        let url = self.request_url(channel, date)?;
        let body = self
            .client
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let programs = self.parse_programs(&body, channel, &url);
        info!(count = programs.len(), bytes = body.len(), "Parsed schedule page");
        Ok(ProgramResult {
            date: Some(date),
            programs,
        })
    }
}
