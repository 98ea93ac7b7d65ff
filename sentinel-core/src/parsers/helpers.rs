//! Shared extraction helpers for tool parsers

use once_cell::sync::Lazy;
use regex::Regex;

use crate::state::{PortState, Protocol};

static IPV4_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\.){3}(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\b")
        .expect("valid ipv4 regex")
});

/// Extract every IPv4 address appearing in a chunk of text, in order of
/// first appearance, deduplicated.
pub fn extract_ipv4(text: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    IPV4_RE
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .filter(|ip| seen.insert(ip.clone()))
        .collect()
}

/// Whether a string is a literal IPv4 or IPv6 address.
pub fn is_ip(candidate: &str) -> bool {
    candidate.parse::<std::net::IpAddr>().is_ok()
}

/// A parsed `<port>/<proto> <state> [service]` line from a scanner table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortTriple {
    pub port: u16,
    pub protocol: Protocol,
    pub state: PortState,
    pub service: Option<String>,
}

/// Parse one scanner table line like `22/tcp open ssh` or `80/tcp open`.
///
/// Returns None for lines that are not port rows (headers, banners, noise).
pub fn parse_port_triple(line: &str) -> Option<PortTriple> {
    let mut parts = line.split_whitespace();
    let port_proto = parts.next()?;
    let (port_str, proto_str) = port_proto.split_once('/')?;

    let port: u16 = port_str.parse().ok()?;
    if port == 0 {
        return None;
    }
    let protocol = Protocol::from_str(proto_str)?;

    let state = PortState::from_str(parts.next()?);
    let service = parts
        .next()
        .filter(|s| *s != "unknown")
        .map(normalize_service_name);

    Some(PortTriple {
        port,
        protocol,
        state,
        service,
    })
}

/// Canonicalize a URL the way the id strategy expects: lowercase, trailing
/// slash removed.
pub fn canonicalize_url(url: &str) -> String {
    url.to_lowercase().trim_end_matches('/').to_string()
}

/// Normalize a service name into canonical-id-safe form: lowercase, with
/// anything outside `[a-z0-9._-]` mapped to an underscore (nmap prints
/// names like `ssl/http`).
pub fn normalize_service_name(name: &str) -> String {
    name.trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '?')
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Split a service banner into lowercase tokens, dropping punctuation-only
/// fragments. Used for product/version sniffing.
pub fn tokenize_banner(banner: &str) -> Vec<String> {
    banner
        .split(|c: char| c.is_whitespace() || c == ',' || c == ';')
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric() && c != '.' && c != '/'))
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Extract the host portion and implied service from an http(s) URL.
///
/// Returns (host, port, scheme). Non-URL targets return None.
pub fn split_http_target(url: &str) -> Option<(String, u16, String)> {
    let (scheme, rest) = url.split_once("://")?;
    let scheme = scheme.to_lowercase();
    let default_port = match scheme.as_str() {
        "http" => 80,
        "https" => 443,
        _ => return None,
    };

    let authority = rest.split(['/', '?', '#']).next()?;
    match authority.rsplit_once(':') {
        Some((host, port_str)) => {
            let port = port_str.parse().ok()?;
            Some((host.to_string(), port, scheme))
        }
        None => Some((authority.to_string(), default_port, scheme)),
    }
}
