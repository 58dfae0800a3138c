//! Queue construction from channel definition files.
//!
//! A [`Queue`] holds one [`QueueItem`] per channel per UTC day. Items are
//! deduplicated by their identity key (`site:lang:xmltv_id:date`), so a channel
//! listed in two files is grabbed once per day.
//!
//! Failures are contained: an unresolvable glob yields an empty queue and a
//! file that fails to parse is skipped, both with a log line.

use crate::api::ChannelCatalog;
use crate::channels::{list_files, load_channels};
use crate::config::SiteConfig;
use crate::models::QueueItem;
use crate::progress::{ProgressEvent, ProgressObserver};
use chrono::{Days, NaiveDate};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, instrument};

/// Ordered, deduplicated list of queue items.
#[derive(Debug, Clone, Default)]
pub struct Queue {
    items: Vec<QueueItem>,
    keys: HashSet<String>,
}

impl Queue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item unless one with the same key is already queued.
    ///
    /// Returns `true` when the item was added.
    pub fn push(&mut self, item: QueueItem) -> bool {
        if !self.keys.insert(item.key()) {
            return false;
        }
        self.items.push(item);
        true
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, QueueItem> {
        self.items.iter()
    }

    pub fn keys(&self) -> &HashSet<String> {
        &self.keys
    }
}

impl<'a> IntoIterator for &'a Queue {
    type Item = &'a QueueItem;
    type IntoIter = std::slice::Iter<'a, QueueItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// The `count` UTC days starting at `start`.
pub fn date_range(start: NaiveDate, count: u32) -> Vec<NaiveDate> {
    (0..count)
        .filter_map(|i| start.checked_add_days(Days::new(u64::from(i))))
        .collect()
}

/// Build a site's queue from the channel files matching `channels_glob`.
///
/// # Arguments
///
/// * `channels_glob` - Path whose file name may contain wildcards
/// * `config` - The site's configuration; `days` sets the date range
/// * `catalog` - Reference catalog used to fill in channel logos
/// * `lang` - Optional language filter
/// * `reference_date` - First UTC day to grab
/// * `observer` - Receives file and summary events
#[instrument(level = "info", skip_all, fields(site = %config.site, glob = %channels_glob.display()))]
pub async fn build_queue(
    channels_glob: &Path,
    config: Arc<SiteConfig>,
    catalog: &ChannelCatalog,
    lang: Option<&str>,
    reference_date: NaiveDate,
    observer: &dyn ProgressObserver,
) -> Queue {
    info!("Creating queue");
    let mut queue = Queue::new();

    let files = match list_files(channels_glob).await {
        Ok(files) => files,
        Err(e) => {
            error!(error = %e, "Failed to list channel files");
            Vec::new()
        }
    };

    let dates = date_range(reference_date, config.days);

    for path in files {
        let channels = match load_channels(&path).await {
            Ok(channels) => channels,
            Err(e) => {
                observer.on_event(&ProgressEvent::QueueFileFailed {
                    site: config.site.clone(),
                    path: path.clone(),
                    error: e.to_string(),
                });
                continue;
            }
        };
        observer.on_event(&ProgressEvent::QueueFileLoaded {
            site: config.site.clone(),
            path: path.clone(),
        });

        for mut channel in channels {
            if channel.site.is_empty() || channel.xmltv_id.is_empty() {
                continue;
            }
            if lang.is_some_and(|l| l != channel.lang) {
                continue;
            }
            if let Some(found) = catalog.find(&channel.xmltv_id) {
                if found.logo.is_some() {
                    channel.logo = found.logo.clone();
                }
            }

            for date in &dates {
                queue.push(QueueItem {
                    channel: channel.clone(),
                    date: *date,
                    config: Arc::clone(&config),
                });
            }
        }
    }

    observer.on_event(&ProgressEvent::QueueCreated {
        site: config.site.clone(),
        items: queue.len(),
    });
    queue
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::CatalogChannel;
    use crate::progress::recording::RecordingObserver;
    use std::path::PathBuf;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        tokio::fs::write(&path, body).await.unwrap();
        path
    }

    fn config(days: u32) -> Arc<SiteConfig> {
        let mut config = SiteConfig::named("x.tv");
        config.days = days;
        Arc::new(config)
    }

    #[test]
    fn test_date_range_crosses_month_end() {
        assert_eq!(
            date_range(ymd(2024, 2, 28), 3),
            vec![ymd(2024, 2, 28), ymd(2024, 2, 29), ymd(2024, 3, 1)]
        );
        assert!(date_range(ymd(2024, 1, 1), 0).is_empty());
    }

    #[test]
    fn test_queue_push_dedup_keeps_first() {
        let mut queue = Queue::new();
        let mut ch = crate::models::fixtures::channel("x.tv", "en", "ABC");
        let first = QueueItem {
            channel: ch.clone(),
            date: ymd(2024, 3, 1),
            config: config(1),
        };
        ch.name = Some("Other name".to_string());
        let dup = QueueItem {
            channel: ch,
            date: ymd(2024, 3, 1),
            config: config(1),
        };
        assert!(queue.push(first));
        assert!(!queue.push(dup));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.iter().next().unwrap().channel.name.as_deref(), Some("ABC (en)"));
    }

    #[tokio::test]
    async fn test_duplicate_channel_across_files_queued_once() {
        let dir = tempfile::tempdir().unwrap();
        let body = r#"<channels><channel site="x.tv" lang="en" xmltv_id="ABC" site_id="1">A</channel></channels>"#;
        write(dir.path(), "x.tv_1.channels.xml", body).await;
        write(dir.path(), "x.tv_2.channels.xml", body).await;

        let observer = RecordingObserver::default();
        let queue = build_queue(
            &dir.path().join("x.tv*.channels.xml"),
            config(1),
            &ChannelCatalog::default(),
            None,
            ymd(2024, 3, 1),
            &observer,
        )
        .await;

        assert_eq!(queue.len(), 1);
        assert!(queue.keys().contains("x.tv:en:ABC:2024-03-01"));
        assert_eq!(
            observer.events().last(),
            Some(&ProgressEvent::QueueCreated {
                site: "x.tv".to_string(),
                items: 1
            })
        );
    }

    #[tokio::test]
    async fn test_build_queue_filters_expands_and_enriches() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "x.tv.channels.xml",
            r#"<channels>
                <channel site="x.tv" lang="en" xmltv_id="ABC" site_id="1">ABC</channel>
                <channel site="x.tv" lang="fr" xmltv_id="TF1" site_id="2">TF1</channel>
                <channel site="" lang="en" xmltv_id="NOSITE" site_id="3">No site</channel>
                <channel site="x.tv" lang="en" xmltv_id="" site_id="4">No id</channel>
            </channels>"#,
        )
        .await;
        write(dir.path(), "x.tv_broken.channels.xml", "<channels><channel>").await;

        let catalog = ChannelCatalog::from_channels([CatalogChannel {
            id: "ABC".to_string(),
            name: None,
            logo: Some("https://logo/abc.png".to_string()),
        }]);
        let observer = RecordingObserver::default();
        let queue = build_queue(
            &dir.path().join("x.tv*.channels.xml"),
            config(2),
            &catalog,
            Some("en"),
            ymd(2024, 3, 31),
            &observer,
        )
        .await;

        let keys: Vec<String> = queue.iter().map(QueueItem::key).collect();
        assert_eq!(keys, vec!["x.tv:en:ABC:2024-03-31", "x.tv:en:ABC:2024-04-01"]);
        assert!(queue
            .iter()
            .all(|item| item.channel.logo.as_deref() == Some("https://logo/abc.png")));

        let failed = observer
            .events()
            .into_iter()
            .filter(|e| matches!(e, ProgressEvent::QueueFileFailed { .. }))
            .count();
        assert_eq!(failed, 1);
    }

    #[tokio::test]
    async fn test_build_queue_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "x.tv.channels.xml",
            r#"<channels>
                <channel site="x.tv" lang="en" xmltv_id="ABC" site_id="1">ABC</channel>
                <channel site="x.tv" lang="en" xmltv_id="ABC" site_id="1">ABC again</channel>
                <channel site="x.tv" lang="de" xmltv_id="ABC" site_id="1">ABC German</channel>
            </channels>"#,
        )
        .await;

        let glob = dir.path().join("x.tv*.channels.xml");
        let catalog = ChannelCatalog::default();
        let observer = RecordingObserver::default();
        let first = build_queue(&glob, config(3), &catalog, None, ymd(2024, 3, 1), &observer).await;
        let second = build_queue(&glob, config(3), &catalog, None, ymd(2024, 3, 1), &observer).await;

        assert_eq!(first.len(), 6);
        assert_eq!(first.len(), second.len());
        assert_eq!(first.keys(), second.keys());
    }

    #[tokio::test]
    async fn test_build_queue_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let observer = RecordingObserver::default();
        let queue = build_queue(
            &dir.path().join("nowhere").join("*.channels.xml"),
            config(1),
            &ChannelCatalog::default(),
            None,
            ymd(2024, 3, 1),
            &observer,
        )
        .await;
        assert!(queue.is_empty());
    }
}
