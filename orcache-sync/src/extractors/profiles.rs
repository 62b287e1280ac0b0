//! Name summary from `person.name`

use super::{text, ValueNode};
use crate::error::{SyncError, SyncResult};
use orcache_common::db::ProfileSummary;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Default, Deserialize)]
struct PersonNode {
    name: Option<NameNode>,
}

#[derive(Debug, Default, Deserialize)]
struct NameNode {
    #[serde(rename = "given-names")]
    given_names: Option<ValueNode>,
    #[serde(rename = "family-name")]
    family_name: Option<ValueNode>,
    #[serde(rename = "credit-name")]
    credit_name: Option<ValueNode>,
}

/// Summary for `person`; a private or missing name yields empty fields
pub fn extract(person: &str, profile: &Value) -> SyncResult<ProfileSummary> {
    let node = match profile.get("person") {
        None | Some(Value::Null) => PersonNode::default(),
        Some(v) => PersonNode::deserialize(v).map_err(|e| SyncError::transform(person, e))?,
    };
    let name = node.name.unwrap_or_default();

    Ok(ProfileSummary {
        person: person.to_string(),
        given_names: text(name.given_names),
        family_name: text(name.family_name),
        credit_name: text(name.credit_name),
    })
}
