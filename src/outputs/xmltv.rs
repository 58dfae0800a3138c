//! XMLTV serialization of one output group.
//!
//! # Document shape
//!
//! ```text
//! <?xml version="1.0" encoding="UTF-8"?>
//! <tv date="20240301">
//!   <channel id="ABC.us">
//!     <display-name>ABC</display-name>
//!     <icon src="https://..."/>
//!     <url>https://example.com</url>
//!   </channel>
//!   <programme start="20240301050000 +0000" stop="20240301060000 +0000" channel="ABC.us">
//!     <title lang="en">Morning News</title>
//!   </programme>
//! </tv>
//! ```
//!
//! Times are written in UTC. Text and attribute values are escaped by
//! `quick-xml`.

use super::OutputGroup;
use crate::error::{EpgError, Result};
use crate::models::LocalizedText;
use chrono::{DateTime, NaiveDate, Utc};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::fmt::Display;

const TIME_FORMAT: &str = "%Y%m%d%H%M%S %z";

fn xml_err(e: impl Display) -> EpgError {
    EpgError::Xml(e.to_string())
}

fn format_time(t: &DateTime<Utc>) -> String {
    t.format(TIME_FORMAT).to_string()
}

/// Serialize a group's channels and programmes, stamped with `date`.
pub fn generate(group: &OutputGroup<'_>, date: NaiveDate) -> Result<Vec<u8>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    let date = date.format("%Y%m%d").to_string();

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(xml_err)?;
    writer
        .write_event(Event::Start(
            BytesStart::new("tv").with_attributes([("date", date.as_str())]),
        ))
        .map_err(xml_err)?;

    for channel in &group.channels {
        writer
            .write_event(Event::Start(
                BytesStart::new("channel").with_attributes([("id", channel.xmltv_id.as_str())]),
            ))
            .map_err(xml_err)?;
        let display_name = channel.name.as_deref().unwrap_or(&channel.xmltv_id);
        text_element(&mut writer, "display-name", None, display_name)?;
        if let Some(logo) = &channel.logo {
            empty_element(&mut writer, "icon", "src", logo)?;
        }
        text_element(&mut writer, "url", None, &format!("https://{}", channel.site))?;
        end(&mut writer, "channel")?;
    }

    for program in &group.programs {
        let entry = program.entry;
        let start = format_time(&entry.start);
        let stop = format_time(&entry.stop);
        writer
            .write_event(Event::Start(BytesStart::new("programme").with_attributes([
                ("start", start.as_str()),
                ("stop", stop.as_str()),
                ("channel", program.channel.xmltv_id.as_str()),
            ])))
            .map_err(xml_err)?;
        localized(&mut writer, "title", &entry.titles)?;
        localized(&mut writer, "sub-title", &entry.sub_titles)?;
        localized(&mut writer, "desc", &entry.descriptions)?;
        localized(&mut writer, "category", &entry.categories)?;
        if let Some(icon) = &entry.icon {
            empty_element(&mut writer, "icon", "src", icon)?;
        }
        end(&mut writer, "programme")?;
    }

    end(&mut writer, "tv")?;
    let mut bytes = writer.into_inner();
    bytes.push(b'\n');
    Ok(bytes)
}

fn text_element(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    lang: Option<&str>,
    text: &str,
) -> Result<()> {
    let mut start = BytesStart::new(name);
    if let Some(lang) = lang.filter(|l| !l.is_empty()) {
        start.push_attribute(("lang", lang));
    }
    writer.write_event(Event::Start(start)).map_err(xml_err)?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .map_err(xml_err)?;
    end(writer, name)
}

fn localized(writer: &mut Writer<Vec<u8>>, name: &str, values: &[LocalizedText]) -> Result<()> {
    for v in values {
        text_element(writer, name, Some(&v.lang), &v.value)?;
    }
    Ok(())
}

fn empty_element(writer: &mut Writer<Vec<u8>>, name: &str, attr: &str, value: &str) -> Result<()> {
    writer
        .write_event(Event::Empty(
            BytesStart::new(name).with_attributes([(attr, value)]),
        ))
        .map_err(xml_err)
}

fn end(writer: &mut Writer<Vec<u8>>, name: &str) -> Result<()> {
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(xml_err)
}
