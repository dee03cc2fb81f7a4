//! URL normalization for the loop-prevention seen-set.
//!
//! Two candidate URLs that differ only by scheme, host case, a `www.`
//! prefix, a trailing slash, or tracking query noise are the same site for
//! disposition purposes. Query parameters are dropped unless they look
//! identifier-bearing (`id`, `p`, `page_id`), since some small-business
//! sites key their whole page off one of those.

use url::Url;

const IDENTIFIER_PARAMS: &[&str] = &["id", "p", "page_id"];

/// Normalize a URL to its comparison form: lowercase host without `www.`,
/// no scheme, path without trailing slash, identifier-bearing query only,
/// no fragment. Inputs that fail to parse fall back to trimmed lowercase.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let parsed = match Url::parse(&with_scheme) {
        Ok(u) => u,
        Err(_) => return trimmed.to_lowercase(),
    };

    let host = match parsed.host_str() {
        Some(h) => h.to_lowercase(),
        None => return trimmed.to_lowercase(),
    };
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();

    let path = parsed.path().trim_end_matches('/');

    let kept_query: Vec<String> = parsed
        .query_pairs()
        .filter(|(k, _)| IDENTIFIER_PARAMS.contains(&k.to_lowercase().as_str()))
        .map(|(k, v)| format!("{}={}", k.to_lowercase(), v))
        .collect();

    let mut out = format!("{host}{path}");
    if !kept_query.is_empty() {
        out.push('?');
        out.push_str(&kept_query.join("&"));
    }
    out
}

/// Whether two raw URLs normalize to the same site.
pub fn same_url(a: &str, b: &str) -> bool {
    normalize_url(a) == normalize_url(b)
}
