use serde::{Deserialize, Serialize};

/// One zone-scoped places search.
#[derive(Debug, Clone)]
pub struct PlacesQuery {
    /// Literal `"{category}, {city}, {region}, {country-name}"`. This exact
    /// form geocodes reliably; quoted variants do not.
    pub query: String,
    /// Country code hint, passed as the provider's region parameter.
    pub region: String,
    pub language: String,
    pub limit: u32,
    /// Zone center, biasing results to the search partition.
    pub latitude: f64,
    pub longitude: f64,
    pub radius_km: f64,
}

/// Envelope for a synchronous places search. The provider returns one result
/// group per submitted query; we submit one query at a time.
#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub data: Vec<Vec<RawBusiness>>,
}

/// A single business record as returned by the listing provider.
///
/// The provider exposes 60+ fields per place and the exact set drifts across
/// provider versions, so only the fields the pipeline reads are typed; the
/// remainder is captured verbatim in `extra` and carried through to the
/// business audit record without loss.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawBusiness {
    pub place_id: String,
    pub name: String,
    #[serde(default)]
    pub site: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub full_address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default, rename = "type")]
    pub category: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub reviews: Option<i64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Alternate keys providers have used for the website field.
const WEBSITE_KEYS: &[&str] = &["website", "site", "url", "domain", "web", "homepage"];

impl RawBusiness {
    /// The candidate website URL: first non-empty of the known website keys,
    /// starting with the typed `site` field. No content heuristics are
    /// applied here; deciding whether the URL is legitimate is the
    /// disposition engine's job.
    pub fn candidate_website(&self) -> Option<String> {
        if let Some(site) = &self.site {
            if !site.trim().is_empty() {
                return Some(site.trim().to_string());
            }
        }
        for key in WEBSITE_KEYS {
            if let Some(serde_json::Value::String(v)) = self.extra.get(*key) {
                if !v.trim().is_empty() {
                    return Some(v.trim().to_string());
                }
            }
        }
        None
    }

    /// The full payload as observed on the wire, for the audit trail.
    pub fn raw_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> RawBusiness {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn typed_site_wins() {
        let b = parse(
            r#"{"place_id":"p1","name":"Mollaei Law","site":"https://mollaeilaw.com/","url":"https://other.com"}"#,
        );
        assert_eq!(b.candidate_website().unwrap(), "https://mollaeilaw.com/");
    }

    #[test]
    fn falls_through_alternate_keys() {
        let b = parse(r#"{"place_id":"p2","name":"Wander CPA","homepage":"https://wandercpa.com"}"#);
        assert_eq!(b.candidate_website().unwrap(), "https://wandercpa.com");
    }

    #[test]
    fn empty_strings_do_not_count() {
        let b = parse(r#"{"place_id":"p3","name":"Proby's Tax","site":"","website":"  "}"#);
        assert_eq!(b.candidate_website(), None);
    }

    #[test]
    fn unknown_fields_survive_round_trip() {
        let b = parse(
            r#"{"place_id":"p4","name":"A","photos_count":12,"working_hours":{"Monday":"9-5"}}"#,
        );
        assert_eq!(b.extra.get("photos_count").unwrap(), 12);
        let raw = b.raw_json();
        assert_eq!(raw["working_hours"]["Monday"], "9-5");
        assert_eq!(raw["place_id"], "p4");
    }
}
