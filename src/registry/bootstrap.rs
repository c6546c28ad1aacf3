//! Registry URL handling and bootstrap multi-address selection.

use std::net::{Ipv4Addr, Ipv6Addr};

use url::{Host, Url};

use crate::error::{MeshgateError, Result};
use crate::registry::schema::RegistryInfo;

pub const API_VERSION: &str = "v1";

const ENDPOINT_SUFFIXES: &[&str] = &[
    "registry/info",
    "services_full",
    "services/semantic_search",
    "services/search",
    "services",
];

fn config_err(message: String) -> MeshgateError {
    MeshgateError::Config(message)
}

/// Parses a registry URL. Without a scheme, local hosts get `http` and remote ones `https`.
pub fn parse_registry_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(config_err("registry URL is empty".to_string()));
    }
    let has_scheme = trimmed.contains("://");
    let candidate = if has_scheme {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };
    let mut url = Url::parse(&candidate)
        .map_err(|e| config_err(format!("invalid registry URL {trimmed}: {e}")))?;
    let local = match url.host() {
        Some(host) => is_local_host(host),
        None => return Err(config_err(format!("registry URL has no host: {trimmed}"))),
    };
    if !has_scheme && !local && url.set_scheme("https").is_err() {
        return Err(config_err(format!("cannot use https for registry URL {trimmed}")));
    }
    Ok(url)
}

fn is_local_host(host: Host<&str>) -> bool {
    match host {
        Host::Ipv4(ip) => ip.is_loopback() || ip.is_unspecified(),
        Host::Ipv6(ip) => {
            ip.is_loopback()
                || ip.is_unspecified()
                || ip.to_ipv4_mapped().is_some_and(|v4| v4.is_loopback())
        }
        Host::Domain(name) => {
            let name = name.trim_end_matches('.').to_ascii_lowercase();
            name == "localhost" || name.ends_with(".localhost")
        }
    }
}

pub fn is_local_registry_url(url: &str) -> bool {
    parse_registry_url(url)
        .ok()
        .and_then(|parsed| parsed.host().map(is_local_host))
        .unwrap_or(false)
}

fn is_version_segment(segment: &str) -> bool {
    segment
        .strip_prefix('v')
        .is_some_and(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
}

/// Canonical `{scheme}://{host}/v1` base from a bare host, a versioned base,
/// or a full endpoint URL.
pub fn normalize_api_base(raw: &str) -> Result<String> {
    let mut url = parse_registry_url(raw)?;
    let mut segments: Vec<String> = url
        .path_segments()
        .map(|parts| parts.filter(|p| !p.is_empty()).map(str::to_string).collect())
        .unwrap_or_default();

    match segments.iter().position(|s| is_version_segment(s)) {
        Some(index) => segments.truncate(index + 1),
        None => {
            for suffix in ENDPOINT_SUFFIXES {
                let parts: Vec<&str> = suffix.split('/').collect();
                let Some(start) = segments.len().checked_sub(parts.len()) else {
                    continue;
                };
                if segments[start..].iter().zip(&parts).all(|(seg, part)| seg == part) {
                    segments.truncate(start);
                    break;
                }
            }
            segments.push(API_VERSION.to_string());
        }
    }

    url.set_query(None);
    url.set_fragment(None);
    url.set_path(&format!("/{}", segments.join("/")));
    Ok(url.as_str().trim_end_matches('/').to_string())
}

/// Loopback-style multi-address (`/ip4/127.*`, `/ip6/::1`, `/dns*/localhost`, unspecified).
pub fn is_loopback_multiaddr(addr: &str) -> bool {
    let mut parts = addr.trim().trim_start_matches('/').split('/');
    let (Some(proto), Some(host)) = (parts.next(), parts.next()) else {
        return false;
    };
    match proto {
        "ip4" => host
            .parse::<Ipv4Addr>()
            .is_ok_and(|ip| ip.is_loopback() || ip.is_unspecified()),
        "ip6" => host
            .parse::<Ipv6Addr>()
            .is_ok_and(|ip| ip.is_loopback() || ip.is_unspecified()),
        "dns" | "dns4" | "dns6" | "dnsaddr" => is_local_host(Host::Domain(host)),
        _ => false,
    }
}

/// `bootstraps`, then legacy `bootstrap`, then `multiaddrs`, deduplicated.
pub fn bootstrap_candidates(info: &RegistryInfo) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let ordered = info
        .bootstraps
        .iter()
        .flatten()
        .chain(info.bootstrap.iter())
        .chain(info.multiaddrs.iter().flatten());
    for candidate in ordered {
        let candidate = candidate.trim();
        if !candidate.is_empty() && !out.iter().any(|c| c == candidate) {
            out.push(candidate.to_string());
        }
    }
    out
}

/// Picks a bootstrap by the locality of the registry URL, not of the candidates.
pub fn select_bootstrap(candidates: &[String], registry_is_local: bool) -> Option<&str> {
    if !registry_is_local {
        if let Some(routable) = candidates.iter().find(|c| !is_loopback_multiaddr(c)) {
            return Some(routable.as_str());
        }
    }
    candidates
        .iter()
        .find(|c| is_loopback_multiaddr(c))
        .or_else(|| candidates.first())
        .map(String::as_str)
}
