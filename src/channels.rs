//! Channel definition files and glob resolution.
//!
//! Each site keeps one or more `<site>*.channels.xml` files listing the channels
//! to grab:
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <channels>
//!   <channel site="example.com" lang="en" xmltv_id="ABC.us" site_id="abc">ABC</channel>
//! </channels>
//! ```
//!
//! Records missing `site` or `xmltv_id` are kept here as empty strings and
//! filtered out by the queue builder.

use crate::error::{EpgError, Result};
use crate::models::ChannelRef;
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

#[derive(Debug, Deserialize)]
struct ChannelsDocument {
    #[serde(rename = "channel", default)]
    channels: Vec<ChannelRecord>,
}

#[derive(Debug, Deserialize)]
struct ChannelRecord {
    #[serde(rename = "@site", default)]
    site: String,
    #[serde(rename = "@site_id", default)]
    site_id: String,
    #[serde(rename = "@xmltv_id", default)]
    xmltv_id: String,
    #[serde(rename = "@lang", default)]
    lang: String,
    #[serde(rename = "@logo", default)]
    logo: Option<String>,
    #[serde(rename = "$text", default)]
    name: Option<String>,
}

impl From<ChannelRecord> for ChannelRef {
    fn from(record: ChannelRecord) -> Self {
        ChannelRef {
            site: record.site.trim().to_string(),
            site_id: record.site_id.trim().to_string(),
            xmltv_id: record.xmltv_id.trim().to_string(),
            lang: record.lang.trim().to_string(),
            name: record
                .name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            logo: record.logo.filter(|l| !l.trim().is_empty()),
        }
    }
}

/// Parse the contents of a channel definition file.
pub fn parse_channels(xml: &str) -> std::result::Result<Vec<ChannelRef>, String> {
    let doc: ChannelsDocument = quick_xml::de::from_str(xml).map_err(|e| e.to_string())?;
    Ok(doc.channels.into_iter().map(ChannelRef::from).collect())
}

/// Read and parse one channel definition file.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn load_channels(path: &Path) -> Result<Vec<ChannelRef>> {
    let xml = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| EpgError::file(path, e))?;
    let channels = parse_channels(&xml).map_err(|reason| EpgError::ChannelsParse {
        path: path.to_path_buf(),
        reason,
    })?;
    debug!(count = channels.len(), "Parsed channels");
    Ok(channels)
}

/// Resolve a path whose file-name component may contain `*` or `?`.
///
/// Wildcards in directory components are not supported. Matches are returned
/// sorted so queue order is stable between runs.
pub async fn list_files(pattern: &Path) -> Result<Vec<PathBuf>> {
    let file_pattern = pattern
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| EpgError::Glob(pattern.display().to_string()))?;
    let dir = match pattern.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let matcher = glob_to_regex(file_pattern)?;

    let mut entries = tokio::fs::read_dir(&dir)
        .await
        .map_err(|e| EpgError::file(&dir, e))?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if matcher.is_match(name) && entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|_| EpgError::Glob(pattern.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<channels>
  <channel site="example.com" lang="en" xmltv_id="ABC.us" site_id="abc">ABC East</channel>
  <channel site="example.com" lang="fr" xmltv_id="" site_id="tf1">TF1</channel>
  <channel site="example.com" lang="en" xmltv_id="CBS.us" site_id="cbs" logo="https://logo/cbs.png"/>
</channels>"#;

    #[test]
    fn test_parse_channels() {
        let channels = parse_channels(SAMPLE).unwrap();
        assert_eq!(channels.len(), 3);

        assert_eq!(channels[0].site, "example.com");
        assert_eq!(channels[0].xmltv_id, "ABC.us");
        assert_eq!(channels[0].site_id, "abc");
        assert_eq!(channels[0].name.as_deref(), Some("ABC East"));

        assert_eq!(channels[1].xmltv_id, "");
        assert_eq!(channels[2].name, None);
        assert_eq!(channels[2].logo.as_deref(), Some("https://logo/cbs.png"));
    }

    #[test]
    fn test_parse_channels_empty_document() {
        assert!(parse_channels("<channels></channels>").unwrap().is_empty());
    }

    #[test]
    fn test_parse_channels_rejects_garbage() {
        assert!(parse_channels("<channels><channel site=\"x\"></channels>").is_err());
    }

    #[test]
    fn test_glob_to_regex() {
        let re = glob_to_regex("example.com*.channels.xml").unwrap();
        assert!(re.is_match("example.com.channels.xml"));
        assert!(re.is_match("example.com_us.channels.xml"));
        assert!(!re.is_match("exampleXcom.channels.xml"));
        assert!(!re.is_match("example.com.config.yaml"));
    }

    #[tokio::test]
    async fn test_list_files_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "site_b.channels.xml",
            "site_a.channels.xml",
            "site.config.yaml",
            "other.channels.xml",
        ] {
            tokio::fs::write(dir.path().join(name), "<channels/>")
                .await
                .unwrap();
        }

        let files = list_files(&dir.path().join("site*.channels.xml"))
            .await
            .unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["site_a.channels.xml", "site_b.channels.xml"]);
    }

    #[tokio::test]
    async fn test_list_files_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let result = list_files(&dir.path().join("missing").join("*.xml")).await;
        assert!(matches!(result, Err(EpgError::File { .. })));
    }
}
