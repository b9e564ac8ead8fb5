//! Local entity analysis: business name, address and phone (NAP) consistency.

use crate::analysis::rules::number_at;
use crate::analysis::ActionRule;
use crate::error::UnitFailure;
use crate::models::{ActionTemplate, Priority, Snapshot, UnitResult};
use crate::services::{Place, PlacesClient};
use crate::state::StateView;
use crate::units::{AnalysisUnit, Stopwatch};
use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use tracing::warn;

pub const ID: &str = "entities";

const CONSISTENT_THRESHOLD: f64 = 90.0;

fn phone_pattern() -> &'static Regex {
    static PHONE: OnceLock<Regex> = OnceLock::new();
    PHONE.get_or_init(|| {
        Regex::new(r"(?:\+\d{1,3}[\s.-]?)?\(?\d{3}\)?[\s.-]?\d{3}[\s.-]?\d{4}")
            .expect("static phone pattern")
    })
}

/// Last ten digits, enough to compare numbers written in different styles.
fn phone_key(raw: &str) -> String {
    let digits: Vec<char> = raw.chars().filter(char::is_ascii_digit).collect();
    digits[digits.len().saturating_sub(10)..].iter().collect()
}

/// NAP details declared in JSON-LD.
#[derive(Debug, Default, PartialEq)]
struct DeclaredEntity {
    name: Option<String>,
    phone: Option<String>,
    street: Option<String>,
    locality: Option<String>,
    postal_code: Option<String>,
}

fn declared_entity(snapshot: &Snapshot) -> Option<DeclaredEntity> {
    let block = snapshot
        .structured_data
        .iter()
        .flat_map(|b| match b.get("@graph").and_then(Value::as_array) {
            Some(graph) => graph.iter().collect::<Vec<_>>(),
            None => vec![b],
        })
        .find(|b| b.get("address").is_some())?;

    let text = |v: &Value, key: &str| v.get(key).and_then(Value::as_str).map(str::to_string);
    let address = block.get("address").unwrap_or(&Value::Null);
    Some(DeclaredEntity {
        name: text(block, "name"),
        phone: text(block, "telephone"),
        street: text(address, "streetAddress"),
        locality: text(address, "addressLocality"),
        postal_code: text(address, "postalCode"),
    })
}

fn business_name(snapshot: &Snapshot, declared: Option<&DeclaredEntity>) -> Option<String> {
    declared.and_then(|d| d.name.clone()).or_else(|| {
        snapshot
            .title
            .as_deref()
            .and_then(|t| t.split(['|', '-']).next())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// Phone numbers on the page, first occurrence of each number only.
fn page_phones(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    phone_pattern()
        .find_iter(text)
        .map(|m| m.as_str().trim().to_string())
        .filter(|p| seen.insert(phone_key(p)))
        .collect()
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Weighted share of NAP checks that agree; `None` when nothing can be compared.
fn consistency(
    page_text: &str,
    phones: &[String],
    declared: Option<&DeclaredEntity>,
    listing: Option<&Place>,
) -> (Option<f64>, Vec<String>) {
    let mut checks: Vec<(bool, f64, String)> = Vec::new();

    if let Some(d) = declared {
        if let Some(name) = &d.name {
            checks.push((contains_ci(page_text, name), 1.0, "schema name not shown on page".into()));
        }
        if let Some(phone) = &d.phone {
            let key = phone_key(phone);
            checks.push((
                phones.iter().any(|p| phone_key(p) == key),
                1.5,
                "schema telephone differs from page".into(),
            ));
        }
        if let Some(street) = &d.street {
            checks.push((contains_ci(page_text, street), 1.5, "schema address not shown on page".into()));
        }
    }

    if let Some(place) = listing {
        if let Some(name) = declared.and_then(|d| d.name.as_deref()) {
            checks.push((
                contains_ci(&place.name, name) || contains_ci(name, &place.name),
                1.0,
                "listing name differs".into(),
            ));
        }
        if let (Some(address), Some(street)) =
            (&place.address, declared.and_then(|d| d.street.as_deref()))
        {
            checks.push((contains_ci(address, street), 1.5, "listing address differs".into()));
        }
        if let (Some(phone), Some(first)) = (&place.phone, phones.first()) {
            checks.push((phone_key(phone) == phone_key(first), 1.5, "listing phone differs".into()));
        }
    }

    if checks.is_empty() {
        return (None, Vec::new());
    }
    let total: f64 = checks.iter().map(|(_, w, _)| w).sum();
    let passed: f64 = checks.iter().filter(|(ok, _, _)| *ok).map(|(_, w, _)| w).sum();
    let mismatches = checks
        .into_iter()
        .filter(|(ok, _, _)| !ok)
        .map(|(_, _, why)| why)
        .collect();
    (Some((passed / total * 100.0).round()), mismatches)
}

pub struct EntityUnit {
    places: Option<Arc<dyn PlacesClient>>,
}

impl EntityUnit {
    pub fn new(places: Option<Arc<dyn PlacesClient>>) -> Self {
        Self { places }
    }
}

#[async_trait]
impl AnalysisUnit for EntityUnit {
    fn id(&self) -> &str {
        ID
    }

    fn validate(&self, state: &StateView) -> bool {
        state.snapshot().is_some()
    }

    async fn analyze(&self, state: &StateView) -> UnitResult {
        let watch = Stopwatch::start(0.0);
        let snapshot = state
            .snapshot()
            .ok_or_else(|| UnitFailure::execution("no snapshot available"))?;

        let declared = declared_entity(snapshot);
        let name = business_name(snapshot, declared.as_ref());
        let phones = page_phones(&snapshot.text);

        let mut listing: Option<Place> = None;
        let places_status = match (&self.places, &name) {
            (None, _) => "disabled",
            (Some(_), None) => "no_query",
            (Some(client), Some(name)) => {
                let query = match declared.as_ref().and_then(|d| d.locality.as_deref()) {
                    Some(locality) => format!("{} {}", name, locality),
                    None => name.clone(),
                };
                match client.lookup(&query, state.input()).await {
                    Ok(found) => {
                        listing = found.into_iter().next();
                        "used"
                    }
                    Err(e) => {
                        warn!(unit = ID, error = %e, "collaborator_degraded");
                        "unavailable"
                    }
                }
            }
        };

        let (consistency_score, mismatches) =
            consistency(&snapshot.text, &phones, declared.as_ref(), listing.as_ref());

        watch.finish(json!({
            "business_name": name,
            "phones": phones,
            "has_local_business_schema": declared.is_some(),
            "declared_address": declared.as_ref().map(|d| json!({
                "street": d.street,
                "locality": d.locality,
                "postal_code": d.postal_code,
            })),
            "listing": listing,
            "places": places_status,
            "consistency_score": consistency_score,
            "mismatches": mismatches,
        }))
    }

    fn rules(&self) -> Vec<ActionRule> {
        vec![
            ActionRule::when(
                "nap_consistency",
                |p| number_at(p, "/consistency_score").is_some_and(|s| s < CONSISTENT_THRESHOLD),
                |p| {
                    ActionTemplate::new("geo", "Make NAP details consistent", Priority::High, 4, 3)
                        .describe(format!(
                            "Business name, address or phone disagree across sources (consistency {:.0}/100).",
                            number_at(p, "/consistency_score").unwrap_or(0.0)
                        ))
                },
            ),
            ActionRule::when(
                "missing_local_schema",
                |p| p["has_local_business_schema"] == json!(false),
                |_| {
                    ActionTemplate::new("geo", "Add LocalBusiness structured data", Priority::Medium, 3, 2)
                        .describe("Declare name, address and telephone in schema.org LocalBusiness markup.")
                },
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RunInput;
    use crate::units::testing::{sample_snapshot, FakePlaces};

    fn view(snapshot: Snapshot) -> StateView {
        StateView::for_input(RunInput::new("https://bakery.example/", "en-US")).with_snapshot(snapshot)
    }

    #[test]
    fn test_phone_key_normalizes_styles() {
        assert_eq!(phone_key("+1-503-555-0142"), "5035550142");
        assert_eq!(phone_key("(503) 555-0142"), "5035550142");
        assert_eq!(phone_key("12"), "12");
    }

    #[test]
    fn test_page_phones_drop_repeats() {
        let text = "Call (503) 555-0142, orders 503.555.0177 or +1 503-555-0142.";
        assert_eq!(page_phones(text), vec!["(503) 555-0142", "503.555.0177"]);
    }

    #[test]
    fn test_declared_entity_from_json_ld() {
        let declared = declared_entity(&sample_snapshot("https://bakery.example/")).unwrap();
        assert_eq!(declared.name.as_deref(), Some("Rosewood Bakery"));
        assert_eq!(declared.street.as_deref(), Some("418 SE Hawthorne Blvd"));
        assert_eq!(declared.postal_code.as_deref(), Some("97214"));
    }

    #[tokio::test]
    async fn test_consistent_fixture_without_places() {
        let unit = EntityUnit::new(None);
        let payload = unit
            .analyze(&view(sample_snapshot("https://bakery.example/")))
            .await
            .unwrap()
            .payload;
        assert_eq!(payload["business_name"], "Rosewood Bakery");
        assert_eq!(payload["phones"], json!(["(503) 555-0142"]));
        assert_eq!(payload["consistency_score"], 100.0);
        assert_eq!(payload["places"], "disabled");
        assert!(unit.rules().iter().all(|r| r.apply(&payload).is_empty()));
    }

    #[tokio::test]
    async fn test_conflicting_listing_lowers_consistency() {
        let listing = Place {
            name: "Rosewood Bakery".to_string(),
            address: Some("77 NW 23rd Ave, Portland, OR 97210".to_string()),
            phone: Some("(503) 555-0199".to_string()),
            rating: Some(4.6),
            review_count: Some(210),
        };
        let unit = EntityUnit::new(Some(Arc::new(FakePlaces(Some(vec![listing])))));
        let payload = unit
            .analyze(&view(sample_snapshot("https://bakery.example/")))
            .await
            .unwrap()
            .payload;
        assert_eq!(payload["places"], "used");
        // names agree, listing address and phone do not: 5 of 8 weighted points
        assert_eq!(payload["consistency_score"], 63.0);
        assert_eq!(payload["mismatches"].as_array().unwrap().len(), 2);

        let items: Vec<_> = unit.rules().iter().flat_map(|r| r.apply(&payload)).collect();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].priority, Priority::High);
    }

    #[tokio::test]
    async fn test_places_outage_degrades() {
        let unit = EntityUnit::new(Some(Arc::new(FakePlaces(None))));
        let output = unit
            .analyze(&view(sample_snapshot("https://bakery.example/")))
            .await
            .unwrap();
        assert_eq!(output.payload["places"], "unavailable");
        assert_eq!(output.payload["listing"], Value::Null);
    }

    #[tokio::test]
    async fn test_page_without_schema() {
        let mut snapshot = sample_snapshot("https://bakery.example/");
        snapshot.structured_data.clear();
        let unit = EntityUnit::new(None);
        let payload = unit.analyze(&view(snapshot)).await.unwrap().payload;
        assert_eq!(payload["business_name"], "Rosewood Bakery & Café");
        assert_eq!(payload["consistency_score"], Value::Null);
        let items: Vec<_> = unit.rules().iter().flat_map(|r| r.apply(&payload)).collect();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Add LocalBusiness structured data");
    }
}
