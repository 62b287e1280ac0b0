//! Publication rows from `activities.works`

use super::{
    decode_section, external_ids, partial_date, source_name, text, title_text, DateNode,
    ExternalIdNode, ExternalIdsNode, SourceNode, TitleNode, ValueNode,
};
use crate::error::SyncResult;
use orcache_common::db::{ExternalIds, PublicationRecord};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Default, Deserialize)]
struct WorksSection {
    group: Option<Vec<WorkGroup>>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkGroup {
    #[serde(rename = "work-summary")]
    work_summary: Option<Vec<WorkSummary>>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkSummary {
    #[serde(rename = "put-code")]
    put_code: Option<i64>,
    title: Option<TitleNode>,
    #[serde(rename = "type")]
    work_type: Option<String>,
    #[serde(rename = "journal-title")]
    journal_title: Option<ValueNode>,
    #[serde(rename = "publication-date")]
    publication_date: Option<DateNode>,
    #[serde(rename = "external-ids")]
    external_ids: Option<ExternalIdsNode>,
    source: Option<SourceNode>,
    url: Option<ValueNode>,
    visibility: Option<String>,
}

/// First DOI and first ISSN win; everything else becomes `type:value`
pub(crate) fn split_external_ids(ids: &[ExternalIdNode]) -> ExternalIds {
    let mut out = ExternalIds::default();

    for id in ids {
        let id_type = id.id_type.as_deref().unwrap_or("").to_lowercase();
        let Some(value) = id.id_value.as_deref().filter(|v| !v.is_empty()) else {
            continue;
        };

        match id_type.as_str() {
            "doi" if out.doi.is_none() => out.doi = Some(value.to_string()),
            "issn" if out.issn.is_none() => out.issn = Some(value.to_string()),
            _ => out.other.push(format!("{}:{}", id_type, value)),
        }
    }

    out
}

/// One row per work summary in the profile
pub fn extract(institution: &str, person: &str, profile: &Value) -> SyncResult<Vec<PublicationRecord>> {
    let section: WorksSection = decode_section(person, profile, "works")?;

    let rows = section
        .group
        .unwrap_or_default()
        .into_iter()
        .flat_map(|group| group.work_summary.unwrap_or_default())
        .map(|work| PublicationRecord {
            institution: institution.to_string(),
            person: person.to_string(),
            put_code: work.put_code,
            title: title_text(work.title),
            work_type: work.work_type,
            external_ids: split_external_ids(&external_ids(work.external_ids)),
            journal: text(work.journal_title),
            pub_date: partial_date(work.publication_date),
            source: source_name(work.source),
            visibility: work.visibility,
            url: text(work.url),
        })
        .collect();

    Ok(rows)
}
