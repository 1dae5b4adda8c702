//! Type-level search returning `searchset` Bundles.

use std::collections::HashMap;

use super::render::render;
use crate::auth::{Access, Requester};
use crate::config::AppConfig;
use crate::db::{RecordQuery, Store};
use crate::error::{FhirError, FhirResult};
use crate::models::Bundle;
use crate::serializer::{patient_reference_id, ResourceType};
use crate::validation::enrollment::normalize_phone;

pub const DEFAULT_COUNT: i64 = 20;
pub const MAX_COUNT: i64 = 100;

/// Page window requested with `_count` and `_offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub count: i64,
    pub offset: i64,
}

impl Page {
    pub fn from_params(params: &HashMap<String, String>) -> FhirResult<Self> {
        let parse = |name: &str, default: i64| -> FhirResult<i64> {
            match params.get(name) {
                Some(raw) => raw
                    .parse::<i64>()
                    .map_err(|_| FhirError::bad_request(format!("Invalid {} '{}'", name, raw))),
                None => Ok(default),
            }
        };
        Ok(Self {
            count: parse("_count", DEFAULT_COUNT)?.clamp(1, MAX_COUNT),
            offset: parse("_offset", 0)?.max(0),
        })
    }

    /// The following window, if any records remain past this one.
    pub fn next(self, total: i64) -> Option<Self> {
        let offset = self.offset.saturating_add(self.count);
        (offset < total).then_some(Self { offset, ..self })
    }

    pub fn previous(self) -> Option<Self> {
        (self.offset > 0).then(|| Self {
            offset: self.offset.saturating_sub(self.count).max(0),
            ..self
        })
    }
}

fn id_list(raw: &str) -> FhirResult<Vec<i64>> {
    raw.split(',')
        .map(|id| {
            id.trim()
                .parse::<i64>()
                .map_err(|_| FhirError::bad_request(format!("Invalid _id '{}'", id)))
        })
        .collect()
}

/// Store query for `params`, already restricted to what the requester may
/// see. `None` means nothing can match.
async fn build_query(
    store: &dyn Store,
    requester: &Requester,
    resource_type: ResourceType,
    params: &HashMap<String, String>,
) -> FhirResult<Option<RecordQuery>> {
    let mut query = RecordQuery::new(resource_type.record_kind());
    if let Some(ids) = params.get("_id") {
        query = query.with_ids(id_list(ids)?);
    }

    if resource_type == ResourceType::Patient {
        query = query.with_jurisdictions(requester.jurisdiction_ids());
        if let Some(family) = params.get("family") {
            query = query.with_field_containing("last_name", family.as_str());
        }
        if let Some(given) = params.get("given") {
            query = query.with_field_containing("first_name", given.as_str());
        }
        if let Some(telecom) = params.get("telecom") {
            let phone = normalize_phone(telecom).unwrap_or_else(|| telecom.clone());
            query = query.with_any_field(&["primary_telephone", "secondary_telephone"], phone);
        }
        if let Some(email) = params.get("email") {
            query = query.with_field("email", email.as_str());
        }
        if let Some(active) = params.get("active") {
            match active.as_str() {
                "true" | "false" => query = query.with_field("monitoring", active.as_str()),
                other => {
                    return Err(FhirError::bad_request(format!(
                        "Invalid active '{}'; expected true or false",
                        other
                    )))
                }
            }
        }
        return Ok(Some(query));
    }

    let mut patients = requester.accessible_patient_ids(store).await?;
    if let Some(reference) = params.get("subject").or_else(|| params.get("patient")) {
        let wanted = patient_reference_id(reference)
            .or_else(|| reference.parse().ok())
            .ok_or_else(|| {
                FhirError::bad_request(format!("Invalid patient reference '{}'", reference))
            })?;
        patients.retain(|id| *id == wanted);
    }
    if patients.is_empty() {
        return Ok(None);
    }
    Ok(Some(query.with_patients(patients)))
}

/// Rebuilds the request URL with a different page window. Other parameters
/// are carried over verbatim from the raw query string.
fn page_url(base: &str, raw_query: Option<&str>, page: Page) -> String {
    let mut parts: Vec<&str> = raw_query
        .unwrap_or_default()
        .split('&')
        .filter(|part| {
            let key = part.split('=').next().unwrap_or_default();
            !part.is_empty() && key != "_count" && key != "_offset"
        })
        .collect();
    let window = format!("_count={}&_offset={}", page.count, page.offset);
    parts.push(window.as_str());
    format!("{}?{}", base, parts.join("&"))
}

pub async fn search(
    store: &dyn Store,
    config: &AppConfig,
    requester: &Requester,
    resource_type: ResourceType,
    params: &HashMap<String, String>,
    raw_query: Option<&str>,
) -> FhirResult<Bundle> {
    requester.require(resource_type, Access::Read)?;
    let page = Page::from_params(params)?;

    let (records, total) = match build_query(store, requester, resource_type, params).await? {
        Some(query) => {
            let total = store.count(&query).await?;
            let records = store.query(&query.page(page.count, page.offset)).await?;
            (records, total)
        }
        None => (Vec::new(), 0),
    };

    let base = format!("{}/{}", config.fhir_base(), resource_type);
    let mut bundle =
        Bundle::searchset(total.max(0) as u64).with_link("self", page_url(&base, raw_query, page));
    if let Some(next) = page.next(total) {
        bundle = bundle.with_link("next", page_url(&base, raw_query, next));
    }
    if let Some(previous) = page.previous() {
        bundle = bundle.with_link("previous", page_url(&base, raw_query, previous));
    }

    for record in records {
        let url = config.resource_url(resource_type.as_str(), record.id);
        bundle.push_match(url, render(requester, resource_type, record)?);
    }

    tracing::debug!(
        "✓ Search completed: {} results (count: {}, offset: {})",
        total,
        page.count,
        page.offset
    );
    Ok(bundle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_page_defaults_and_limits() {
        assert_eq!(
            Page::from_params(&params(&[])).unwrap(),
            Page { count: 20, offset: 0 }
        );
        assert_eq!(
            Page::from_params(&params(&[("_count", "500"), ("_offset", "-3")])).unwrap(),
            Page { count: 100, offset: 0 }
        );
        assert!(Page::from_params(&params(&[("_count", "ten")])).is_err());
    }

    #[test]
    fn test_page_links_at_extreme_offsets() {
        let page = Page::from_params(&params(&[("_offset", &i64::MAX.to_string())])).unwrap();
        assert_eq!(page.next(5), None);
        assert_eq!(page.previous().unwrap().offset, i64::MAX - 20);

        let page = Page { count: 100, offset: i64::MAX - 10 };
        assert_eq!(page.next(i64::MAX), None);

        let page = Page { count: 20, offset: 0 };
        assert_eq!(page.next(21), Some(Page { count: 20, offset: 20 }));
        assert_eq!(page.next(20), None);
        assert_eq!(page.previous(), None);
        assert_eq!(Page { count: 20, offset: 5 }.previous(), Some(page));
    }

    #[test]
    fn test_page_url_replaces_window() {
        let url = page_url(
            "http://x/fhir/r4/Patient",
            Some("family=Smith&_count=2&_offset=0"),
            Page { count: 2, offset: 2 },
        );
        assert_eq!(url, "http://x/fhir/r4/Patient?family=Smith&_count=2&_offset=2");

        let url = page_url("http://x/fhir/r4/Patient", None, Page { count: 20, offset: 0 });
        assert_eq!(url, "http://x/fhir/r4/Patient?_count=20&_offset=0");
    }

    #[test]
    fn test_id_list() {
        assert_eq!(id_list("1, 2,3").unwrap(), vec![1, 2, 3]);
        assert!(id_list("1,x").is_err());
    }
}
