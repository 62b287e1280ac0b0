//! Profile flatteners
//!
//! Turn one profile document into zero or more cache rows. Each activity
//! section is decoded into small serde node types; absent or null sections
//! yield no rows, while a section of the wrong shape is a
//! [`SyncError::Transform`] that fails the whole rebuild.
//!
//! # Extractors
//! 1. **publications** - `activities.works` groups of work summaries
//! 2. **grants** - `activities.fundings` groups of funding summaries
//! 3. **profiles** - `person.name`

pub mod grants;
pub mod profiles;
pub mod publications;

use crate::error::{SyncError, SyncResult};
use orcache_common::db::PartialDate;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

/// Canonical key of the activities subtree
pub const ACTIVITIES_KEY: &str = "activities";

/// Key used by older API versions
pub const LEGACY_ACTIVITIES_KEY: &str = "activities-summary";

/// Activities subtree under either key; `None` when absent or null
pub fn activities(profile: &Value) -> Option<&Value> {
    [ACTIVITIES_KEY, LEGACY_ACTIVITIES_KEY]
        .iter()
        .find_map(|key| profile.get(*key))
        .filter(|v| !v.is_null())
}

/// Decode `activities.<section>`; absent means empty
pub(crate) fn decode_section<T>(person: &str, profile: &Value, section: &str) -> SyncResult<T>
where
    T: DeserializeOwned + Default,
{
    let Some(activities) = activities(profile) else {
        return Ok(T::default());
    };

    if !activities.is_object() {
        return Err(SyncError::transform(person, "activities is not an object"));
    }

    match activities.get(section) {
        None | Some(Value::Null) => Ok(T::default()),
        Some(node) => T::deserialize(node)
            .map_err(|e| SyncError::transform(person, format!("{}: {}", section, e))),
    }
}

/// `{"value": ...}` wrapper used throughout the documents
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ValueNode {
    pub value: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct TitleNode {
    pub title: Option<ValueNode>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct DateNode {
    pub year: Option<ValueNode>,
    pub month: Option<ValueNode>,
    pub day: Option<ValueNode>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SourceNode {
    #[serde(rename = "source-name")]
    pub source_name: Option<ValueNode>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ExternalIdsNode {
    #[serde(rename = "external-id")]
    pub external_id: Option<Vec<ExternalIdNode>>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ExternalIdNode {
    #[serde(rename = "external-id-type")]
    pub id_type: Option<String>,
    #[serde(rename = "external-id-value")]
    pub id_value: Option<String>,
}

pub(crate) fn text(node: Option<ValueNode>) -> Option<String> {
    node.and_then(|n| n.value)
}

pub(crate) fn title_text(node: Option<TitleNode>) -> Option<String> {
    node.and_then(|n| text(n.title))
}

pub(crate) fn source_name(node: Option<SourceNode>) -> Option<String> {
    node.and_then(|n| text(n.source_name))
}

pub(crate) fn external_ids(node: Option<ExternalIdsNode>) -> Vec<ExternalIdNode> {
    node.and_then(|n| n.external_id).unwrap_or_default()
}

pub(crate) fn partial_date(node: Option<DateNode>) -> PartialDate {
    node.map(|n| PartialDate {
        year: text(n.year),
        month: text(n.month),
        day: text(n.day),
    })
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Default, Deserialize)]
    struct Probe {
        group: Option<Vec<Value>>,
    }

    #[test]
    fn test_activities_prefers_canonical_key() {
        let doc = json!({"activities": {"a": 1}, "activities-summary": {"b": 2}});
        assert_eq!(activities(&doc).unwrap(), &json!({"a": 1}));

        let legacy = json!({"activities-summary": {"b": 2}});
        assert_eq!(activities(&legacy).unwrap(), &json!({"b": 2}));

        assert!(activities(&json!({"activities": null})).is_none());
        assert!(activities(&json!({})).is_none());
    }

    #[test]
    fn test_decode_section_absent_is_empty() {
        let doc = json!({"activities": {"works": null}});
        let probe: Probe = decode_section("p1", &doc, "works").unwrap();
        assert!(probe.group.is_none());

        let probe: Probe = decode_section("p1", &json!({}), "works").unwrap();
        assert!(probe.group.is_none());
    }

    #[test]
    fn test_decode_section_wrong_shape_is_transform_error() {
        let doc = json!({"activities": {"works": {"group": "oops"}}});
        let err = decode_section::<Probe>("p1", &doc, "works").unwrap_err();
        assert!(matches!(err, SyncError::Transform { ref person, .. } if person == "p1"));

        let doc = json!({"activities": [1, 2]});
        assert!(decode_section::<Probe>("p1", &doc, "works").is_err());
    }

    #[test]
    fn test_partial_date_from_nodes() {
        let node: DateNode =
            serde_json::from_value(json!({"year": {"value": "2020"}, "month": null})).unwrap();
        assert_eq!(
            partial_date(Some(node)),
            PartialDate {
                year: Some("2020".into()),
                month: None,
                day: None
            }
        );
        assert_eq!(partial_date(None), PartialDate::default());
    }
}
