//! Cheap gatekeeping checks on a candidate URL before any expensive fetch.
//!
//! Static checks (scheme, suffix, blocklist) are pure; network probes (DNS,
//! TCP, HEAD) are bounded. `prescreen` never raises; every failure mode is
//! an outcome.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

const CONNECT_BUDGET: Duration = Duration::from_secs(2);
const HTTP_BUDGET: Duration = Duration::from_secs(10);

const BLOCKED_SUFFIXES: &[&str] = &[
    ".pdf", ".doc", ".docx", ".xls", ".xlsx", ".zip", ".jpg", ".png", ".mp4",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PrescreenFailure {
    InvalidScheme,
    BadSuffix,
    BlockedHost,
    DnsFailure,
    TransportFailure,
    HttpFailure,
}

impl PrescreenFailure {
    /// Failures that prove the URL was never a plausible business site
    /// (drive the missing path: clear URL, go to discovery). Network-shaped
    /// failures instead mark the site technically invalid with the URL kept.
    pub fn is_disqualifying(self) -> bool {
        matches!(
            self,
            PrescreenFailure::InvalidScheme
                | PrescreenFailure::BadSuffix
                | PrescreenFailure::BlockedHost
        )
    }
}

impl std::fmt::Display for PrescreenFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PrescreenFailure::InvalidScheme => "invalid-scheme",
            PrescreenFailure::BadSuffix => "bad-suffix",
            PrescreenFailure::BlockedHost => "blocked-host",
            PrescreenFailure::DnsFailure => "dns-failure",
            PrescreenFailure::TransportFailure => "transport-failure",
            PrescreenFailure::HttpFailure => "http-failure",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrescreenOutcome {
    Pass,
    Fail(PrescreenFailure),
}

/// Whether `host` is or sits under one of the blocked domains.
pub fn host_is_blocked(host: &str, blocked_hosts: &[String]) -> bool {
    let host = host.to_lowercase();
    blocked_hosts.iter().any(|blocked| {
        let blocked = blocked.to_lowercase();
        host == blocked || host.ends_with(&format!(".{blocked}"))
    })
}

/// The pure portion of the prescreen: scheme, suffix, blocklist.
pub fn check_static(raw_url: &str, blocked_hosts: &[String]) -> Result<Url, PrescreenFailure> {
    let trimmed = raw_url.trim();

    // Bare domains from provider data get a scheme; explicit non-http
    // schemes (mailto:, tel:, javascript:) are rejected outright.
    let with_scheme = if trimmed.contains(':') {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let parsed = Url::parse(&with_scheme).map_err(|_| PrescreenFailure::InvalidScheme)?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(PrescreenFailure::InvalidScheme);
    }

    let path = parsed.path().to_lowercase();
    if BLOCKED_SUFFIXES.iter().any(|s| path.ends_with(s)) {
        return Err(PrescreenFailure::BadSuffix);
    }

    let host = parsed.host_str().ok_or(PrescreenFailure::InvalidScheme)?;
    if host_is_blocked(host, blocked_hosts) {
        return Err(PrescreenFailure::BlockedHost);
    }

    Ok(parsed)
}

/// Full prescreen: static checks, then DNS + TCP within 2s, then a HEAD
/// (GET fallback) within 10s.
pub async fn prescreen(
    raw_url: &str,
    blocked_hosts: &[String],
    http: &reqwest::Client,
) -> PrescreenOutcome {
    let parsed = match check_static(raw_url, blocked_hosts) {
        Ok(url) => url,
        Err(failure) => return PrescreenOutcome::Fail(failure),
    };

    let host = parsed.host_str().unwrap_or_default().to_string();
    let port = parsed.port_or_known_default().unwrap_or(443);

    let addrs = match tokio::time::timeout(
        CONNECT_BUDGET,
        tokio::net::lookup_host((host.as_str(), port)),
    )
    .await
    {
        Ok(Ok(addrs)) => addrs.collect::<Vec<_>>(),
        _ => return PrescreenOutcome::Fail(PrescreenFailure::DnsFailure),
    };
    let Some(addr) = addrs.first().copied() else {
        return PrescreenOutcome::Fail(PrescreenFailure::DnsFailure);
    };

    match tokio::time::timeout(CONNECT_BUDGET, tokio::net::TcpStream::connect(addr)).await {
        Ok(Ok(_)) => {}
        _ => return PrescreenOutcome::Fail(PrescreenFailure::TransportFailure),
    }

    let url = parsed.to_string();
    let head = tokio::time::timeout(HTTP_BUDGET, http.head(&url).send()).await;

    let response = match head {
        Ok(Ok(resp)) if matches!(resp.status().as_u16(), 405 | 501) => {
            // Some small-business servers reject HEAD outright; retry as GET.
            match tokio::time::timeout(HTTP_BUDGET, http.get(&url).send()).await {
                Ok(Ok(resp)) => resp,
                _ => return PrescreenOutcome::Fail(PrescreenFailure::TransportFailure),
            }
        }
        Ok(Ok(resp)) => resp,
        _ => return PrescreenOutcome::Fail(PrescreenFailure::TransportFailure),
    };

    if response.status().is_client_error() || response.status().is_server_error() {
        return PrescreenOutcome::Fail(PrescreenFailure::HttpFailure);
    }

    PrescreenOutcome::Pass
}
