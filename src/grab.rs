//! Draining a site's queue against its grabber.
//!
//! Items are processed strictly one at a time, in queue order. Parallelism
//! only exists between sites (see [`crate::scheduler`]).
//!
//! Each call is bounded by a timeout. A failed or timed-out item is logged
//! and skipped without retry; its channel is still returned so the channel
//! appears in the guide with no programmes.

use crate::error::EpgError;
use crate::models::GrabOutput;
use crate::progress::{ProgressEvent, ProgressObserver};
use crate::queue::Queue;
use crate::scrapers::SiteGrabber;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument};

/// Grab every item of `queue` sequentially.
///
/// # Arguments
///
/// * `queue` - Items to grab, in order
/// * `grabber` - The site's grabber
/// * `default_timeout` - Per-item timeout when the site config sets none
/// * `observer` - Receives one [`ProgressEvent::ItemGrabbed`] per item
///
/// # Returns
///
/// One channel per queue item and the concatenated programmes of every
/// successful item. Programmes are not deduplicated here.
#[instrument(level = "info", skip_all, fields(items = queue.len()))]
pub async fn grab(
    queue: &Queue,
    grabber: &dyn SiteGrabber,
    default_timeout: Duration,
    observer: &dyn ProgressObserver,
) -> GrabOutput {
    let t0 = Instant::now();
    let total = queue.len();
    let mut output = GrabOutput::default();
    let mut failed = 0usize;

    for (i, item) in queue.iter().enumerate() {
        if i > 0 && !item.config.delay().is_zero() {
            tokio::time::sleep(item.config.delay()).await;
        }

        let timeout = item.config.timeout_or(default_timeout);
        let result = match tokio::time::timeout(timeout, grabber.grab(&item.channel, item.date)).await
        {
            Ok(result) => result,
            Err(_) => Err(EpgError::Timeout(timeout)),
        };

        let (programs, error) = match result {
            Ok(result) => {
                if let Some(date) = result.date.filter(|d| *d != item.date) {
                    debug!(key = %item.key(), %date, "Grabber reported a different date");
                }
                (result.programs, None)
            }
            Err(e) => {
                failed += 1;
                (Vec::new(), Some(e.to_string()))
            }
        };

        observer.on_event(&ProgressEvent::ItemGrabbed {
            index: i + 1,
            total,
            site: item.channel.site.clone(),
            lang: item.channel.lang.clone(),
            xmltv_id: item.channel.xmltv_id.clone(),
            date: item.date,
            programs: programs.len(),
            error,
        });
        debug!(key = %item.key(), programs = programs.len(), "Item done");

        output.channels.push(item.channel.clone());
        output.programs.extend(programs);
    }

    info!(
        items = total,
        failed,
        programs = output.programs.len(),
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "Grab complete"
    );
    output
}
