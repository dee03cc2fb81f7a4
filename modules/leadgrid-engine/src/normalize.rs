//! Pure normalization from provider records to the business schema. The
//! full provider payload rides along untouched; whether the candidate URL
//! is legitimate is decided later by the disposition engine, never here.

use listing_client::RawBusiness;
use leadgrid_store::NewBusiness;

pub fn normalize(raw: &RawBusiness) -> NewBusiness {
    NewBusiness {
        external_listing_id: raw.place_id.clone(),
        name: raw.name.clone(),
        category: raw.category.clone(),
        address: raw.full_address.clone(),
        city: raw.city.clone(),
        region: raw.state.clone(),
        country: raw.country_code.clone(),
        phone: raw.phone.clone(),
        latitude: raw.latitude,
        longitude: raw.longitude,
        rating: raw.rating,
        review_count: raw.reviews.map(|r| r as i32),
        website_url: raw.candidate_website(),
        raw_payload: raw.raw_json(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(json: &str) -> RawBusiness {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn flattens_core_fields() {
        let b = raw(
            r#"{
                "place_id": "ChIJabc123",
                "name": "Mollaei Law",
                "site": "https://mollaeilaw.com/",
                "phone": "+1 310-555-0199",
                "full_address": "11845 W Olympic Blvd, Los Angeles, CA 90064",
                "city": "Los Angeles",
                "state": "CA",
                "country_code": "US",
                "type": "law firm",
                "latitude": 34.03,
                "longitude": -118.44,
                "rating": 4.9,
                "reviews": 312
            }"#,
        );
        let n = normalize(&b);
        assert_eq!(n.external_listing_id, "ChIJabc123");
        assert_eq!(n.website_url.as_deref(), Some("https://mollaeilaw.com/"));
        assert_eq!(n.region.as_deref(), Some("CA"));
        assert_eq!(n.review_count, Some(312));
    }

    #[test]
    fn keeps_aggregator_urls_verbatim() {
        // Content heuristics are the disposition engine's job; a yelp URL
        // must survive normalization untouched.
        let b = raw(
            r#"{"place_id":"p1","name":"Wander CPA","site":"https://www.yelp.com/biz/wander-cpa-los-angeles"}"#,
        );
        let n = normalize(&b);
        assert_eq!(
            n.website_url.as_deref(),
            Some("https://www.yelp.com/biz/wander-cpa-los-angeles")
        );
    }

    #[test]
    fn raw_payload_carries_unknown_fields() {
        let b = raw(
            r#"{"place_id":"p2","name":"A","photos_count":9,"reviews_sample":[{"text":"great"}]}"#,
        );
        let n = normalize(&b);
        assert_eq!(n.raw_payload["photos_count"], 9);
        assert_eq!(n.raw_payload["reviews_sample"][0]["text"], "great");
    }

    #[test]
    fn missing_website_is_none() {
        let b = raw(r#"{"place_id":"p3","name":"Proby's Tax & Accounting"}"#);
        assert!(normalize(&b).website_url.is_none());
    }
}
