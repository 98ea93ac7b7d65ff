//! Canonical entity id generation
//!
//! Every parser routes id construction through these functions; ids are a
//! pure function of the entity's kind and its natural key, so re-parsing
//! the same observation always yields the same id. Ids never contain
//! timestamps, random values, or parser identity. Credential secrets are
//! never part of an id.

use md5::{Digest, Md5};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::state::EntityKind;

/// Host id from an IP address (IPv4 or IPv6).
///
/// `192.168.1.10` → `host_192_168_1_10`, `::1` → `host___1`
pub fn host_id(ip: &str) -> String {
    let normalized = ip.replace(['.', ':'], "_");
    format!("host_{normalized}")
}

/// Port id from host IP, port number and protocol.
///
/// `192.168.1.10:80/tcp` → `host_192_168_1_10_port_80_tcp`
pub fn port_id(ip: &str, port: u16, protocol: &str) -> String {
    format!("{}_port_{}_{}", host_id(ip), port, protocol.to_lowercase())
}

/// Service id from a port id and service name.
///
/// Name is lowercased with spaces mapped to underscores.
pub fn service_id(port_id: &str, service_name: &str) -> String {
    let normalized = service_name.to_lowercase().replace(' ', "_");
    format!("{port_id}_service_{normalized}")
}

/// Vulnerability id from a service id and a CVE id or vulnerability type.
///
/// `CVE-2024-1234` → `..._vuln_cve_2024_1234`
pub fn vuln_id(service_id: &str, cve_or_type: &str) -> String {
    let normalized = cve_or_type.to_lowercase().replace('-', "_");
    format!("{service_id}_vuln_{normalized}")
}

/// Web resource id from a service id and URL.
///
/// The URL is lowercased, stripped of any trailing slash, and hashed to a
/// fixed 8-hex-char suffix so long or special-character paths stay valid.
pub fn web_resource_id(service_id: &str, url: &str) -> String {
    let normalized = url.to_lowercase();
    let normalized = normalized.trim_end_matches('/');
    format!("{service_id}_web_hash_{}", short_md5(normalized))
}

/// DNS id from a domain name.
pub fn dns_id(domain: &str) -> String {
    let normalized = domain.to_lowercase().replace('.', "_");
    format!("dns_{normalized}")
}

/// Certificate id from a SHA-256 fingerprint.
///
/// `AB:CD:EF:...` → `cert_abcdef...`
pub fn cert_id(fingerprint: &str) -> String {
    let normalized = fingerprint.to_lowercase().replace(':', "");
    format!("cert_{normalized}")
}

/// Credential id from a username and service id.
///
/// The secret is never hashed into the id.
pub fn credential_id(username: &str, service_id: &str) -> String {
    format!("cred_{}_{}", username.to_lowercase(), service_id)
}

/// File id from a host id and absolute path.
pub fn file_id(host_id: &str, file_path: &str) -> String {
    format!("file_{host_id}_hash_{}", short_md5(file_path))
}

fn short_md5(input: &str) -> String {
    let digest = Md5::digest(input.as_bytes());
    let hex = format!("{digest:x}");
    hex[..8].to_string()
}

// Per-kind id format patterns. Host segments allow hex for IPv6.
static HOST_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^host_[0-9a-f_]+$").expect("valid host id regex")
});
static PORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^host_[0-9a-f_]+_port_\d+_(tcp|udp)$").expect("valid port id regex")
});
static SERVICE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^host_[0-9a-f_]+_port_\d+_(tcp|udp)_service_[a-z0-9_.-]+$")
        .expect("valid service id regex")
});
static VULN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^host_[0-9a-f_]+_port_\d+_(tcp|udp)_service_[a-z0-9_.-]+_vuln_[a-z0-9_.]+$")
        .expect("valid vuln id regex")
});
static WEB_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^host_[0-9a-f_]+_port_\d+_(tcp|udp)_service_[a-z0-9_.-]+_web_hash_[a-f0-9]{8}$")
        .expect("valid web resource id regex")
});
static DNS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^dns_[a-z0-9_-]+$").expect("valid dns id regex"));
static CERT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^cert_[a-f0-9]+$").expect("valid cert id regex"));
static CRED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^cred_[a-z0-9_.-]+_host_[0-9a-f_]+_port_\d+_(tcp|udp)_service_[a-z0-9_.-]+$")
        .expect("valid credential id regex")
});
static FILE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^file_host_[0-9a-f_]+_hash_[a-f0-9]{8}$").expect("valid file id regex")
});

/// Check an id against the format for its kind.
pub fn is_valid(kind: EntityKind, id: &str) -> bool {
    let re: &Regex = match kind {
        EntityKind::Host => &HOST_RE,
        EntityKind::Port => &PORT_RE,
        EntityKind::Service => &SERVICE_RE,
        EntityKind::Vulnerability => &VULN_RE,
        EntityKind::WebResource => &WEB_RE,
        EntityKind::Dns => &DNS_RE,
        EntityKind::Certificate => &CERT_RE,
        EntityKind::Credential => &CRED_RE,
        EntityKind::File => &FILE_RE,
    };
    re.is_match(id)
}

/// Validate an id against its kind, failing with `InvalidId` on mismatch.
///
/// Called by the knowledge store at insert time.
pub fn validate(kind: EntityKind, id: &str) -> crate::Result<()> {
    if is_valid(kind, id) {
        Ok(())
    } else {
        Err(crate::Error::InvalidId {
            kind: kind.as_str().to_string(),
            id: id.to_string(),
        })
    }
}
