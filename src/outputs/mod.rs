//! Output assembly: grouping grabbed data into XMLTV guide files.
//!
//! # Submodules
//!
//! - [`template`]: Output path templates and grouping keys
//! - [`xmltv`]: Serializes one group to an XMLTV document
//! - [`gzip`]: Compression for the optional `.gz` copies
//!
//! # Output Structure
//!
//! With the default template `guides/{lang}/<site>.xml` and `--gzip`:
//!
//! ```text
//! guides/
//! ├── en/
//! │   ├── example.com.xml
//! │   └── example.com.xml.gz
//! └── fr/
//!     ├── example.com.xml
//!     └── example.com.xml.gz
//! ```
//!
//! # Ordering
//!
//! Within a group, channels are sorted by `xmltv_id` and deduplicated on it;
//! programmes are sorted by `(channel_id, start)` and deduplicated on that
//! pair. The first occurrence wins in both cases. The output path is resolved
//! from the first channel after sorting, so it does not depend on grab order.

pub mod gzip;
pub mod template;
pub mod xmltv;

use crate::error::{EpgError, Result};
use crate::models::{ChannelRef, ProgramEntry};
use crate::progress::{ProgressEvent, ProgressObserver};
use chrono::NaiveDate;
use itertools::Itertools;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use template::{group_key, template_format, template_variables};
use tracing::{info, instrument};

/// A programme paired with the group channel it belongs to.
#[derive(Debug, Clone, Copy)]
pub struct GuideProgram<'a> {
    pub entry: &'a ProgramEntry,
    pub channel: &'a ChannelRef,
}

/// Channels sharing one grouping key, and their programmes.
#[derive(Debug)]
pub struct OutputGroup<'a> {
    pub key: String,
    pub channels: Vec<&'a ChannelRef>,
    pub programs: Vec<GuideProgram<'a>>,
}

/// Options for [`save`].
#[derive(Debug, Clone, Copy)]
pub struct SaveOptions {
    /// Reference date written to the `<tv date>` attribute.
    pub date: NaiveDate,
    pub gzip: bool,
}

/// Partition channels by the template's grouping key and attach programmes.
///
/// A programme joins a group when its `(channel_id, lang)` matches a channel
/// of that group. Groups are returned ordered by key.
pub fn build_groups<'a>(
    template: &str,
    channels: &'a [ChannelRef],
    programs: &'a [ProgramEntry],
) -> Vec<OutputGroup<'a>> {
    let variables = template_variables(template);

    let mut grouped: BTreeMap<String, Vec<&'a ChannelRef>> = BTreeMap::new();
    for channel in channels {
        grouped
            .entry(group_key(channel, &variables))
            .or_default()
            .push(channel);
    }

    grouped
        .into_iter()
        .map(|(key, members)| {
            let mut index: HashMap<(&str, &str), &'a ChannelRef> = HashMap::new();
            for &channel in &members {
                index
                    .entry((channel.xmltv_id.as_str(), channel.lang.as_str()))
                    .or_insert(channel);
            }

            let programs = programs
                .iter()
                .filter_map(|entry| {
                    index
                        .get(&(entry.channel_id.as_str(), entry.lang.as_str()))
                        .map(|&channel| GuideProgram { entry, channel })
                })
                .sorted_by(|a, b| {
                    (a.entry.channel_id.as_str(), a.entry.start)
                        .cmp(&(b.entry.channel_id.as_str(), b.entry.start))
                })
                .unique_by(|p| (p.entry.channel_id.as_str(), p.entry.start))
                .collect();

            let channels = members
                .into_iter()
                .sorted_by(|a, b| a.xmltv_id.cmp(&b.xmltv_id))
                .unique_by(|c| c.xmltv_id.as_str())
                .collect();

            OutputGroup {
                key,
                channels,
                programs,
            }
        })
        .collect()
}

/// Write one guide file per group; returns every path written.
///
/// # Arguments
///
/// * `template` - Output path template, e.g. `guides/{lang}/{site}.xml`
/// * `channels` - Channels from the grab, duplicates allowed
/// * `programs` - Programmes from the grab, duplicates allowed
/// * `options` - Reference date and gzip toggle
/// * `observer` - Receives a [`ProgressEvent::Saving`] per file
///
/// # Errors
///
/// Serialization and write failures abort the save; files already written
/// stay on disk.
#[instrument(level = "info", skip_all, fields(%template, channels = channels.len(), programs = programs.len()))]
pub async fn save(
    template: &str,
    channels: &[ChannelRef],
    programs: &[ProgramEntry],
    options: SaveOptions,
    observer: &dyn ProgressObserver,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();

    for group in build_groups(template, channels, programs) {
        let Some(first) = group.channels.first() else {
            continue;
        };
        let path = PathBuf::from(template_format(template, first));
        let xml = xmltv::generate(&group, options.date)?;

        observer.on_event(&ProgressEvent::Saving { path: path.clone() });
        write_file(&path, &xml).await?;
        info!(
            path = %path.display(),
            channels = group.channels.len(),
            programs = group.programs.len(),
            bytes = xml.len(),
            "Wrote guide"
        );
        written.push(path.clone());

        if options.gzip {
            let mut gz_path = path.into_os_string();
            gz_path.push(".gz");
            let gz_path = PathBuf::from(gz_path);
            let compressed = gzip::compress(&xml)?;
            observer.on_event(&ProgressEvent::Saving {
                path: gz_path.clone(),
            });
            write_file(&gz_path, &compressed).await?;
            written.push(gz_path);
        }
    }

    Ok(written)
}

/// Write `data` to `path`, creating parent directories first.
pub async fn write_file(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| EpgError::file(parent, e))?;
    }
    tokio::fs::write(path, data)
        .await
        .map_err(|e| EpgError::file(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::{channel, program};
    use crate::progress::recording::RecordingObserver;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn options(gzip: bool) -> SaveOptions {
        SaveOptions {
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            gzip,
        }
    }

    #[test]
    fn test_every_channel_lands_in_exactly_one_group() {
        let channels = vec![
            channel("s1", "en", "A"),
            channel("s1", "fr", "B"),
            channel("s2", "en", "C"),
            channel("s1", "en", "D"),
        ];
        let groups = build_groups("guides/{lang}/{site}.xml", &channels, &[]);

        assert_eq!(groups.len(), 3);
        let total: usize = groups.iter().map(|g| g.channels.len()).sum();
        assert_eq!(total, channels.len());
        for ch in &channels {
            let hits = groups
                .iter()
                .filter(|g| g.channels.iter().any(|c| c.xmltv_id == ch.xmltv_id))
                .count();
            assert_eq!(hits, 1, "{} should be in one group", ch.xmltv_id);
        }
    }

    #[test]
    fn test_template_without_variables_yields_single_group() {
        let channels = vec![channel("s1", "en", "A"), channel("s2", "fr", "B")];
        let groups = build_groups("guide.xml", &channels, &[]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].channels.len(), 2);
    }

    #[test]
    fn test_programs_paired_by_channel_and_language() {
        let en = channel("s1", "en", "A");
        let fr = channel("s1", "fr", "A");
        let channels = vec![en.clone()];
        let programs = vec![program(&en, "English", 1), program(&fr, "French", 2)];

        let groups = build_groups("out.xml", &channels, &programs);
        assert_eq!(groups[0].programs.len(), 1);
        assert_eq!(groups[0].programs[0].entry.titles[0].value, "English");
        assert_eq!(groups[0].programs[0].channel.lang, "en");
    }

    #[test]
    fn test_sort_and_dedup_laws() {
        let b = channel("s1", "en", "B");
        let a = channel("s1", "en", "A");
        let channels = vec![b.clone(), a.clone(), b.clone(), a.clone()];
        let programs = vec![
            program(&b, "B late", 9),
            program(&a, "A first copy", 3),
            program(&b, "B early", 1),
            program(&a, "A second copy", 3),
            program(&a, "A early", 1),
        ];

        let groups = build_groups("out.xml", &channels, &programs);
        let group = &groups[0];

        let ids: Vec<&str> = group.channels.iter().map(|c| c.xmltv_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B"]);

        let keys: Vec<(&str, u32)> = group
            .programs
            .iter()
            .map(|p| {
                (
                    p.entry.channel_id.as_str(),
                    chrono::Timelike::hour(&p.entry.start),
                )
            })
            .collect();
        assert_eq!(keys, vec![("A", 1), ("A", 3), ("B", 1), ("B", 9)]);
        assert!(keys.windows(2).all(|w| w[0] < w[1]));

        let kept = group
            .programs
            .iter()
            .find(|p| p.entry.channel_id == "A" && chrono::Timelike::hour(&p.entry.start) == 3)
            .unwrap();
        assert_eq!(kept.entry.titles[0].value, "A first copy");
    }

    #[tokio::test]
    async fn test_save_splits_by_language() {
        let dir = tempfile::tempdir().unwrap();
        let template = format!("{}/guides/{{lang}}/{{site}}.xml", dir.path().display());
        let en = channel("s1", "en", "EN1");
        let fr = channel("s1", "fr", "FR1");
        let programs = vec![program(&en, "Hello", 8), program(&fr, "Bonjour", 8)];
        let observer = RecordingObserver::default();

        let written = save(
            &template,
            &[en.clone(), fr.clone()],
            &programs,
            options(false),
            &observer,
        )
        .await
        .unwrap();

        let en_path = dir.path().join("guides/en/s1.xml");
        let fr_path = dir.path().join("guides/fr/s1.xml");
        assert_eq!(written, vec![en_path.clone(), fr_path.clone()]);

        let en_xml = tokio::fs::read_to_string(&en_path).await.unwrap();
        assert!(en_xml.contains("Hello"));
        assert!(!en_xml.contains("Bonjour"));
        let fr_xml = tokio::fs::read_to_string(&fr_path).await.unwrap();
        assert!(fr_xml.contains("Bonjour"));
        assert_eq!(observer.events().len(), 2);
    }

    #[tokio::test]
    async fn test_save_writes_gzip_sibling() {
        let dir = tempfile::tempdir().unwrap();
        let template = format!("{}/{{site}}.xml", dir.path().display());
        let ch = channel("s1", "en", "A");
        let programs = vec![program(&ch, "Show", 10)];

        let written = save(
            &template,
            std::slice::from_ref(&ch),
            &programs,
            options(true),
            &RecordingObserver::default(),
        )
        .await
        .unwrap();
        assert_eq!(written.len(), 2);

        let xml = tokio::fs::read(dir.path().join("s1.xml")).await.unwrap();
        let gz = tokio::fs::read(dir.path().join("s1.xml.gz")).await.unwrap();
        let mut decoded = Vec::new();
        GzDecoder::new(gz.as_slice()).read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, xml);
    }

    #[tokio::test]
    async fn test_save_nothing_for_no_channels() {
        let dir = tempfile::tempdir().unwrap();
        let template = format!("{}/{{site}}.xml", dir.path().display());
        let written = save(&template, &[], &[], options(true), &RecordingObserver::default())
            .await
            .unwrap();
        assert!(written.is_empty());
    }
}
