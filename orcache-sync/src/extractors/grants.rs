//! Grant rows from `activities.fundings`

use super::{
    decode_section, external_ids, partial_date, source_name, text, title_text, DateNode,
    ExternalIdNode, ExternalIdsNode, SourceNode, TitleNode, ValueNode,
};
use crate::error::SyncResult;
use orcache_common::db::{Address, GrantRecord};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Default, Deserialize)]
struct FundingsSection {
    group: Option<Vec<FundingGroup>>,
}

#[derive(Debug, Default, Deserialize)]
struct FundingGroup {
    #[serde(rename = "funding-summary")]
    funding_summary: Option<Vec<FundingSummary>>,
}

#[derive(Debug, Default, Deserialize)]
struct FundingSummary {
    title: Option<TitleNode>,
    #[serde(rename = "type")]
    grant_type: Option<String>,
    organization: Option<OrganizationNode>,
    #[serde(rename = "start-date")]
    start_date: Option<DateNode>,
    #[serde(rename = "end-date")]
    end_date: Option<DateNode>,
    #[serde(rename = "external-ids")]
    external_ids: Option<ExternalIdsNode>,
    amount: Option<AmountNode>,
    source: Option<SourceNode>,
    url: Option<ValueNode>,
    visibility: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OrganizationNode {
    name: Option<String>,
    address: Option<AddressNode>,
}

#[derive(Debug, Default, Deserialize)]
struct AddressNode {
    city: Option<String>,
    country: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AmountNode {
    #[serde(rename = "currency-code")]
    currency_code: Option<String>,
    value: Option<String>,
}

/// Value of the first external id whose type mentions "grant"
pub(crate) fn grant_number(ids: &[ExternalIdNode]) -> Option<String> {
    ids.iter()
        .find(|id| {
            id.id_type
                .as_deref()
                .map(|t| t.to_lowercase().contains("grant"))
                .unwrap_or(false)
        })
        .and_then(|id| id.id_value.clone())
}

/// One row per funding summary in the profile
pub fn extract(institution: &str, person: &str, profile: &Value) -> SyncResult<Vec<GrantRecord>> {
    let section: FundingsSection = decode_section(person, profile, "fundings")?;

    let rows = section
        .group
        .unwrap_or_default()
        .into_iter()
        .flat_map(|group| group.funding_summary.unwrap_or_default())
        .map(|summary| {
            let org = summary.organization.unwrap_or_default();
            let address = org.address.unwrap_or_default();
            let amount = summary.amount.unwrap_or_default();

            GrantRecord {
                institution: institution.to_string(),
                person: person.to_string(),
                title: title_text(summary.title),
                grant_type: summary.grant_type,
                org_name: org.name,
                address: Address {
                    city: address.city,
                    country: address.country,
                },
                start_date: partial_date(summary.start_date),
                end_date: partial_date(summary.end_date),
                grant_number: grant_number(&external_ids(summary.external_ids)),
                currency: amount.currency_code,
                amount: amount.value,
                source: source_name(summary.source),
                visibility: summary.visibility,
                url: text(summary.url),
            }
        })
        .collect();

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eid(t: Option<&str>, v: &str) -> ExternalIdNode {
        ExternalIdNode {
            id_type: t.map(String::from),
            id_value: Some(v.into()),
        }
    }

    #[test]
    fn test_grant_number_matches_type_substring() {
        assert_eq!(
            grant_number(&[eid(Some("proposal-id"), "P-1"), eid(Some("Grant_Number"), "G-42")]),
            Some("G-42".to_string())
        );
        assert_eq!(grant_number(&[eid(None, "X"), eid(Some("uri"), "Y")]), None);
        assert_eq!(grant_number(&[]), None);
    }

    #[test]
    fn test_extract_grant_fields() {
        let profile = json!({
            "activities": {
                "fundings": {
                    "group": [{"funding-summary": [{
                        "title": {"title": {"value": "Caching at Scale"}},
                        "type": "grant",
                        "organization": {
                            "name": "Science Foundation",
                            "address": {"city": "Dublin", "country": "IE"}
                        },
                        "start-date": {"year": {"value": "2020"}},
                        "end-date": {"year": {"value": "2023"}, "month": {"value": "12"}},
                        "external-ids": {"external-id": [
                            {"external-id-type": "grant_number", "external-id-value": "SF-99"}
                        ]},
                        "amount": {"currency-code": "EUR", "value": "250000"},
                        "source": {"source-name": {"value": "Funder"}},
                        "visibility": "public"
                    }]}]
                }
            }
        });

        let rows = extract("05a", "0000-0002", &profile).unwrap();
        assert_eq!(rows.len(), 1);

        let g = &rows[0];
        assert_eq!(g.title.as_deref(), Some("Caching at Scale"));
        assert_eq!(g.org_name.as_deref(), Some("Science Foundation"));
        assert_eq!(g.address.city.as_deref(), Some("Dublin"));
        assert_eq!(g.start_date.year.as_deref(), Some("2020"));
        assert_eq!(g.end_date.month.as_deref(), Some("12"));
        assert_eq!(g.grant_number.as_deref(), Some("SF-99"));
        assert_eq!(g.currency.as_deref(), Some("EUR"));
        assert_eq!(g.amount.as_deref(), Some("250000"));
        assert_eq!(g.source.as_deref(), Some("Funder"));
        assert_eq!(g.url, None);
    }

    #[test]
    fn test_extract_without_fundings() {
        let profile = json!({"activities": {"works": {"group": []}}});
        assert!(extract("05a", "p", &profile).unwrap().is_empty());
    }
}
