//! Affiliation source classification
//!
//! A person counts as institution-managed when any affiliation summary in
//! their profile was written by a trusted API client. Lookups are lenient:
//! a missing section, group or field is simply not a match.

use crate::extractors::activities;
use serde_json::Value;
use std::collections::HashSet;

/// Affiliation sections, in scan order
pub const AFFILIATION_SECTIONS: [&str; 7] = [
    "employments",
    "educations",
    "qualifications",
    "invited-positions",
    "distinctions",
    "memberships",
    "services",
];

/// Trusted ids from the system client id and an optional manager id
pub fn trusted_ids(system_client_id: &str, manager_client_id: Option<&str>) -> HashSet<String> {
    [Some(system_client_id), manager_client_id]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

/// Client id that wrote one affiliation summary
///
/// The summary's only object member carrying `source` holds the item (its
/// key varies by section, e.g. `employment-summary`).
pub fn summary_source_client(summary: &Value) -> Option<&str> {
    summary
        .as_object()?
        .values()
        .find(|v| v.get("source").is_some())?
        .get("source")?
        .get("source-client-id")?
        .get("path")?
        .as_str()
}

fn section_summaries<'a>(section: &'a Value) -> impl Iterator<Item = &'a Value> + 'a {
    section
        .get("affiliation-group")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|group| group.get("summaries").and_then(Value::as_array))
        .flatten()
}

/// True on the first summary written by a trusted client
pub fn is_managed(profile: &Value, trusted: &HashSet<String>) -> bool {
    if trusted.is_empty() {
        return false;
    }
    let Some(activities) = activities(profile) else {
        return false;
    };

    AFFILIATION_SECTIONS
        .iter()
        .filter_map(|name| activities.get(*name))
        .flat_map(section_summaries)
        .filter_map(summary_source_client)
        .any(|client| trusted.contains(client))
}
