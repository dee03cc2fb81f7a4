//! Geo planning: partition a (country, region, city, category) campaign
//! into ranked search zones.
//!
//! Two modes. Adaptive asks the LLM for named districts with rough centers
//! and expected density; uniform falls back to a population-scaled grid
//! over the city's bounding box. Both are deterministic given their inputs.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const KM_PER_DEG_LAT: f64 = 110.574;
const KM_PER_DEG_LNG_EQUATOR: f64 = 111.320;

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("cannot resolve coordinates for {city}, {region} {country}")]
    UnresolvedGeography {
        country: String,
        region: String,
        city: String,
    },
}

/// Campaign geography as submitted. Center/population overrides let callers
/// plan cities outside the built-in gazetteer.
#[derive(Debug, Clone)]
pub struct CampaignSpec {
    pub country: String,
    pub region: String,
    pub city: String,
    pub category: String,
    pub center: Option<(f64, f64)>,
    pub population: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedZone {
    pub zone_id: String,
    pub name: String,
    pub center_lat: f64,
    pub center_lng: f64,
    pub radius_km: f64,
    pub priority: i32,
}

// --- Gazetteer ---

/// (city, region, lat, lng, population). Enough coverage for the supported
/// launch metros; anything else comes in via explicit overrides.
const CITY_GAZETTEER: &[(&str, &str, f64, f64, u64)] = &[
    ("los angeles", "CA", 34.0522, -118.2437, 3_900_000),
    ("san francisco", "CA", 37.7749, -122.4194, 870_000),
    ("san diego", "CA", 32.7157, -117.1611, 1_380_000),
    ("sacramento", "CA", 38.5816, -121.4944, 520_000),
    ("new york", "NY", 40.7128, -74.0060, 8_300_000),
    ("buffalo", "NY", 42.8864, -78.8784, 276_000),
    ("chicago", "IL", 41.8781, -87.6298, 2_700_000),
    ("houston", "TX", 29.7604, -95.3698, 2_300_000),
    ("dallas", "TX", 32.7767, -96.7970, 1_300_000),
    ("austin", "TX", 30.2672, -97.7431, 960_000),
    ("san antonio", "TX", 29.4241, -98.4936, 1_450_000),
    ("phoenix", "AZ", 33.4484, -112.0740, 1_600_000),
    ("philadelphia", "PA", 39.9526, -75.1652, 1_600_000),
    ("seattle", "WA", 47.6062, -122.3321, 740_000),
    ("denver", "CO", 39.7392, -104.9903, 715_000),
    ("miami", "FL", 25.7617, -80.1918, 440_000),
    ("tampa", "FL", 27.9506, -82.4572, 385_000),
    ("orlando", "FL", 28.5384, -81.3789, 310_000),
    ("atlanta", "GA", 33.7490, -84.3880, 500_000),
    ("boston", "MA", 42.3601, -71.0589, 675_000),
    ("minneapolis", "MN", 44.9778, -93.2650, 430_000),
    ("portland", "OR", 45.5152, -122.6784, 650_000),
    ("nashville", "TN", 36.1627, -86.7816, 690_000),
    ("charlotte", "NC", 35.2271, -80.8431, 880_000),
    ("las vegas", "NV", 36.1699, -115.1398, 650_000),
    ("toronto", "ON", 43.6532, -79.3832, 2_930_000),
    ("vancouver", "BC", 49.2827, -123.1207, 675_000),
    ("london", "LDN", 51.5074, -0.1278, 8_900_000),
];

const COUNTRY_NAMES: &[(&str, &str)] = &[
    ("US", "United States"),
    ("CA", "Canada"),
    ("GB", "United Kingdom"),
    ("AU", "Australia"),
    ("NZ", "New Zealand"),
    ("IE", "Ireland"),
];

/// Full country name for the listing-provider query string.
pub fn country_name(iso2: &str) -> &str {
    let upper = iso2.to_uppercase();
    COUNTRY_NAMES
        .iter()
        .find(|(code, _)| *code == upper)
        .map(|(_, name)| *name)
        .unwrap_or("United States")
}

/// Resolve city center and population from overrides or the gazetteer.
pub fn resolve_city(spec: &CampaignSpec) -> Result<((f64, f64), u64), PlannerError> {
    if let Some(center) = spec.center {
        return Ok((center, spec.population.unwrap_or(250_000)));
    }

    let city = spec.city.to_lowercase();
    let region = spec.region.to_uppercase();
    CITY_GAZETTEER
        .iter()
        .find(|(c, r, _, _, _)| *c == city && *r == region)
        .map(|(_, _, lat, lng, pop)| ((*lat, *lng), spec.population.unwrap_or(*pop)))
        .ok_or_else(|| PlannerError::UnresolvedGeography {
            country: spec.country.clone(),
            region: spec.region.clone(),
            city: spec.city.clone(),
        })
}

// --- Uniform grid ---

/// Population-scaled grid dimensions.
pub fn grid_dimensions(population: u64) -> (usize, usize) {
    if population >= 1_000_000 {
        (5, 5)
    } else if population >= 500_000 {
        (4, 4)
    } else if population >= 250_000 {
        (3, 3)
    } else if population >= 100_000 {
        (2, 2)
    } else {
        (1, 1)
    }
}

/// Half-width of the city bounding box, in km. Scales with the same
/// population bands as the grid so cell sizes stay comparable across tiers.
fn city_extent_km(population: u64) -> f64 {
    if population >= 1_000_000 {
        24.0
    } else if population >= 500_000 {
        18.0
    } else if population >= 250_000 {
        14.0
    } else if population >= 100_000 {
        10.0
    } else {
        7.0
    }
}

/// Uniform fallback: equal-area cells over the bounding box, each zone's
/// radius covering its cell diagonal with 10% overlap. Uniform priority.
pub fn plan_uniform(city: &str, center: (f64, f64), population: u64) -> Vec<PlannedZone> {
    let (rows, cols) = grid_dimensions(population);
    let extent = city_extent_km(population);
    let (center_lat, center_lng) = center;

    let cell_h_km = (extent * 2.0) / rows as f64;
    let cell_w_km = (extent * 2.0) / cols as f64;
    let radius_km = ((cell_h_km.powi(2) + cell_w_km.powi(2)).sqrt() / 2.0) * 1.1;

    let km_per_deg_lng = KM_PER_DEG_LNG_EQUATOR * center_lat.to_radians().cos();

    let mut zones = Vec::with_capacity(rows * cols);
    for row in 0..rows {
        for col in 0..cols {
            // Cell centers, measured from the box's north-west corner.
            let offset_south_km = cell_h_km * (row as f64 + 0.5) - extent;
            let offset_east_km = cell_w_km * (col as f64 + 0.5) - extent;

            zones.push(PlannedZone {
                zone_id: format!("grid-{}-{}", row + 1, col + 1),
                name: format!("{} grid {},{}", city, row + 1, col + 1),
                center_lat: center_lat - offset_south_km / KM_PER_DEG_LAT,
                center_lng: center_lng + offset_east_km / km_per_deg_lng,
                radius_km,
                priority: 5,
            });
        }
    }
    zones
}

// --- Adaptive districts ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Density {
    High,
    Medium,
    Low,
}

pub fn priority_for_density(density: Density) -> i32 {
    match density {
        Density::High => 9,
        Density::Medium => 6,
        Density::Low => 3,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct District {
    /// District or sub-city name, e.g. "Santa Monica", "Downtown".
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Rough coverage radius in km.
    pub radius_km: f64,
    /// Expected density of the campaign's business category here.
    pub expected_density: Density,
}

/// The adaptive planner's full LLM response. Persisted verbatim on the
/// campaign record for reproducibility.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DistrictPlan {
    pub districts: Vec<District>,
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for c in name.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    slug.trim_end_matches('-').to_string()
}

/// Turn a district plan into zones: density maps to priority 9/6/3, slugs
/// are deduplicated, ordering is priority-desc then zone-id so the same
/// plan always yields the same list.
pub fn plan_adaptive(plan: &DistrictPlan) -> Vec<PlannedZone> {
    let mut used = std::collections::HashSet::new();
    let mut zones: Vec<PlannedZone> = plan
        .districts
        .iter()
        .map(|d| {
            let mut slug = slugify(&d.name);
            if slug.is_empty() {
                slug = "district".to_string();
            }
            let mut candidate = slug.clone();
            let mut n = 2;
            while !used.insert(candidate.clone()) {
                candidate = format!("{slug}-{n}");
                n += 1;
            }
            PlannedZone {
                zone_id: candidate,
                name: d.name.clone(),
                center_lat: d.latitude,
                center_lng: d.longitude,
                radius_km: d.radius_km,
                priority: priority_for_density(d.expected_density),
            }
        })
        .collect();

    zones.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.zone_id.cmp(&b.zone_id)));
    zones
}

pub const DISTRICT_SYSTEM_PROMPT: &str = r#"You are planning geographic search zones for scraping local business listings.

Given a city and a business category, list the districts and sub-cities a local would name when asked where businesses of that category cluster. For each district give:
- its common name
- approximate center coordinates
- a radius in km that covers it (typically 2-8)
- expected density of that category there: high, medium, or low

Cover the whole metro area including satellite suburbs, 8-20 districts total. Do not invent districts; only use real, named areas."#;

/// User prompt for the adaptive district request.
pub fn district_user_prompt(city: &str, region: &str, country: &str, category: &str) -> String {
    format!("City: {city}, {region}, {country}\nBusiness category: {category}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(city: &str, region: &str) -> CampaignSpec {
        CampaignSpec {
            country: "US".to_string(),
            region: region.to_string(),
            city: city.to_string(),
            category: "plumbers".to_string(),
            center: None,
            population: None,
        }
    }

    #[test]
    fn grid_dimensions_follow_population_bands() {
        assert_eq!(grid_dimensions(3_900_000), (5, 5));
        assert_eq!(grid_dimensions(600_000), (4, 4));
        assert_eq!(grid_dimensions(300_000), (3, 3));
        assert_eq!(grid_dimensions(150_000), (2, 2));
        assert_eq!(grid_dimensions(40_000), (1, 1));
        // Band boundaries are inclusive
        assert_eq!(grid_dimensions(1_000_000), (5, 5));
        assert_eq!(grid_dimensions(500_000), (4, 4));
        assert_eq!(grid_dimensions(250_000), (3, 3));
        assert_eq!(grid_dimensions(100_000), (2, 2));
    }

    #[test]
    fn uniform_plan_for_la_is_5x5() {
        let ((lat, lng), pop) = resolve_city(&spec("Los Angeles", "ca")).unwrap();
        let zones = plan_uniform("Los Angeles", (lat, lng), pop);
        assert_eq!(zones.len(), 25);
        // All radii equal, uniform priority
        assert!(zones.iter().all(|z| (z.radius_km - zones[0].radius_km).abs() < 1e-9));
        assert!(zones.iter().all(|z| z.priority == 5));
        // Zone ids unique
        let ids: std::collections::HashSet<_> = zones.iter().map(|z| z.zone_id.clone()).collect();
        assert_eq!(ids.len(), 25);
        // Grid is centered: mean of centers ~ city center
        let mean_lat: f64 = zones.iter().map(|z| z.center_lat).sum::<f64>() / 25.0;
        let mean_lng: f64 = zones.iter().map(|z| z.center_lng).sum::<f64>() / 25.0;
        assert!((mean_lat - lat).abs() < 1e-6);
        assert!((mean_lng - lng).abs() < 1e-6);
    }

    #[test]
    fn zone_radius_covers_cell_diagonal_with_overlap() {
        let zones = plan_uniform("Los Angeles", (34.0522, -118.2437), 3_900_000);
        // 48km box, 5x5 → 9.6km cells; diagonal/2 * 1.1 ≈ 7.47km
        let expected = ((9.6f64.powi(2) * 2.0).sqrt() / 2.0) * 1.1;
        assert!((zones[0].radius_km - expected).abs() < 1e-9);
    }

    #[test]
    fn unresolved_city_is_a_planner_error() {
        let err = resolve_city(&spec("Nowhereville", "ZZ")).unwrap_err();
        assert!(matches!(err, PlannerError::UnresolvedGeography { .. }));
    }

    #[test]
    fn explicit_center_override_skips_gazetteer() {
        let mut s = spec("Nowhereville", "ZZ");
        s.center = Some((40.0, -100.0));
        s.population = Some(120_000);
        let ((lat, lng), pop) = resolve_city(&s).unwrap();
        assert_eq!((lat, lng), (40.0, -100.0));
        assert_eq!(pop, 120_000);
        assert_eq!(plan_uniform("Nowhereville", (lat, lng), pop).len(), 4);
    }

    #[test]
    fn adaptive_plan_maps_density_to_priority_and_sorts() {
        let plan = DistrictPlan {
            districts: vec![
                District {
                    name: "Van Nuys".to_string(),
                    latitude: 34.19,
                    longitude: -118.45,
                    radius_km: 5.0,
                    expected_density: Density::Low,
                },
                District {
                    name: "Downtown".to_string(),
                    latitude: 34.04,
                    longitude: -118.25,
                    radius_km: 4.0,
                    expected_density: Density::High,
                },
                District {
                    name: "Santa Monica".to_string(),
                    latitude: 34.02,
                    longitude: -118.49,
                    radius_km: 4.0,
                    expected_density: Density::Medium,
                },
            ],
        };
        let zones = plan_adaptive(&plan);
        assert_eq!(zones[0].zone_id, "downtown");
        assert_eq!(zones[0].priority, 9);
        assert_eq!(zones[1].zone_id, "santa-monica");
        assert_eq!(zones[1].priority, 6);
        assert_eq!(zones[2].zone_id, "van-nuys");
        assert_eq!(zones[2].priority, 3);
    }

    #[test]
    fn duplicate_district_names_get_distinct_slugs() {
        let d = |name: &str| District {
            name: name.to_string(),
            latitude: 34.0,
            longitude: -118.0,
            radius_km: 3.0,
            expected_density: Density::High,
        };
        let zones = plan_adaptive(&DistrictPlan {
            districts: vec![d("Downtown"), d("Downtown")],
        });
        assert_eq!(zones.len(), 2);
        assert_ne!(zones[0].zone_id, zones[1].zone_id);
    }

    #[test]
    fn country_names_resolve() {
        assert_eq!(country_name("us"), "United States");
        assert_eq!(country_name("GB"), "United Kingdom");
    }
}
