//! Output path templates such as `guides/{lang}/{site}.xml`.

use crate::models::ChannelRef;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static VARIABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("variable pattern is valid"));

/// Distinct `{name}` placeholders in the template, in order of appearance.
pub fn template_variables(template: &str) -> Vec<String> {
    let mut vars: Vec<String> = Vec::new();
    for cap in VARIABLE.captures_iter(template) {
        let name = &cap[1];
        if !vars.iter().any(|v| v == name) {
            vars.push(name.to_string());
        }
    }
    vars
}

/// Substitute placeholders with the channel's values. Placeholders the
/// channel has no value for are left as they are.
pub fn template_format(template: &str, channel: &ChannelRef) -> String {
    VARIABLE
        .replace_all(template, |cap: &Captures<'_>| {
            channel
                .template_value(&cap[1])
                .map(str::to_string)
                .unwrap_or_else(|| cap[0].to_string())
        })
        .into_owned()
}

/// Grouping key: the channel's values for the template's variables, taken in
/// channel field order and joined with a unit separator.
///
/// A template without channel variables gives every channel the empty key.
pub fn group_key(channel: &ChannelRef, variables: &[String]) -> String {
    ChannelRef::TEMPLATE_FIELDS
        .iter()
        .filter(|field| variables.iter().any(|v| v == *field))
        .map(|field| channel.template_value(field).unwrap_or_default())
        .collect::<Vec<_>>()
        .join("\u{1f}")
}
