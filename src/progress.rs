//! Progress events emitted while building queues, grabbing, and saving.
//!
//! Components report what they are doing through a [`ProgressObserver`]
//! instead of mutating shared task state. The default [`LogObserver`] turns
//! every event into a `tracing` line; tests plug in a recording observer.

use crate::utils::truncate_for_log;
use chrono::NaiveDate;
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// A channel definition file was parsed.
    QueueFileLoaded { site: String, path: PathBuf },
    /// A channel definition file could not be parsed and was skipped.
    QueueFileFailed {
        site: String,
        path: PathBuf,
        error: String,
    },
    /// A site's queue is complete.
    QueueCreated { site: String, items: usize },
    /// One queue item was processed; `error` is set when the grab failed.
    ItemGrabbed {
        index: usize,
        total: usize,
        site: String,
        lang: String,
        xmltv_id: String,
        date: NaiveDate,
        programs: usize,
        error: Option<String>,
    },
    /// A guide file is about to be written.
    Saving { path: PathBuf },
}

impl ProgressEvent {
    /// The one-line progress message for an event.
    pub fn message(&self) -> String {
        match self {
            ProgressEvent::QueueFileLoaded { path, .. } => {
                format!("loaded \"{}\"", path.display())
            }
            ProgressEvent::QueueFileFailed { path, error, .. } => {
                format!("skipped \"{}\": {}", path.display(), error)
            }
            ProgressEvent::QueueCreated { items, .. } => format!("added {items} items"),
            ProgressEvent::ItemGrabbed {
                index,
                total,
                site,
                lang,
                xmltv_id,
                date,
                programs,
                ..
            } => format!(
                "[{}/{}] {} ({}) - {} - {} ({} programs)",
                index,
                total,
                site,
                lang,
                xmltv_id,
                date.format("%b %-d, %Y"),
                programs
            ),
            ProgressEvent::Saving { path } => format!("saving to \"{}\"...", path.display()),
        }
    }
}

/// Receives progress events. Implementations must be cheap and non-blocking.
pub trait ProgressObserver: Send + Sync {
    fn on_event(&self, event: &ProgressEvent);
}

const MAX_ERROR_LEN: usize = 500;

/// Writes every event to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl ProgressObserver for LogObserver {
    fn on_event(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::QueueFileFailed { site, .. } => {
                error!(%site, "{}", event.message());
            }
            ProgressEvent::ItemGrabbed {
                site,
                error: Some(err),
                ..
            } => {
                info!(%site, "{}", event.message());
                error!(%site, "    ERR: {}", truncate_for_log(err, MAX_ERROR_LEN));
            }
            ProgressEvent::QueueFileLoaded { site, .. }
            | ProgressEvent::QueueCreated { site, .. }
            | ProgressEvent::ItemGrabbed { site, .. } => {
                info!(%site, "{}", event.message());
            }
            ProgressEvent::Saving { .. } => info!("{}", event.message()),
        }
    }
}

#[cfg(test)]
pub(crate) mod recording {
    use super::*;
    use std::sync::Mutex;

    /// Observer that keeps every event for later assertions.
    #[derive(Debug, Default)]
    pub struct RecordingObserver {
        events: Mutex<Vec<ProgressEvent>>,
    }

    impl RecordingObserver {
        pub fn events(&self) -> Vec<ProgressEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    impl ProgressObserver for RecordingObserver {
        fn on_event(&self, event: &ProgressEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_grabbed_message() {
        let event = ProgressEvent::ItemGrabbed {
            index: 2,
            total: 10,
            site: "example.com".to_string(),
            lang: "en".to_string(),
            xmltv_id: "ABC.us".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            programs: 24,
            error: None,
        };
        assert_eq!(
            event.message(),
            "[2/10] example.com (en) - ABC.us - Mar 1, 2024 (24 programs)"
        );
    }

    #[test]
    fn test_queue_created_message() {
        let event = ProgressEvent::QueueCreated {
            site: "example.com".to_string(),
            items: 7,
        };
        assert_eq!(event.message(), "added 7 items");
    }
}
