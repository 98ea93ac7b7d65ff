//! Typed user intent

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Closed set of user intents. The LLM selects exactly one of these; tool
/// choice, arguments, risk level, and privilege requirements come from the
/// registry, never from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    // Scanning
    HostDiscovery,
    PortScan,
    ServiceDetection,
    OsDetection,
    VulnScan,
    SslScan,
    // Web enumeration
    WebDirEnum,
    WebVulnScan,
    // Recon
    Ping,
    DnsLookup,
    WhoisLookup,
    SubdomainEnum,
    // Brute force
    BruteForceSsh,
    BruteForceHttp,
    // Exploit
    SqlInjection,
    // No command
    InfoQuery,
    Unknown,
}

impl IntentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentKind::HostDiscovery => "host_discovery",
            IntentKind::PortScan => "port_scan",
            IntentKind::ServiceDetection => "service_detection",
            IntentKind::OsDetection => "os_detection",
            IntentKind::VulnScan => "vuln_scan",
            IntentKind::SslScan => "ssl_scan",
            IntentKind::WebDirEnum => "web_dir_enum",
            IntentKind::WebVulnScan => "web_vuln_scan",
            IntentKind::Ping => "ping",
            IntentKind::DnsLookup => "dns_lookup",
            IntentKind::WhoisLookup => "whois_lookup",
            IntentKind::SubdomainEnum => "subdomain_enum",
            IntentKind::BruteForceSsh => "brute_force_ssh",
            IntentKind::BruteForceHttp => "brute_force_http",
            IntentKind::SqlInjection => "sql_injection",
            IntentKind::InfoQuery => "info_query",
            IntentKind::Unknown => "unknown",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "host_discovery" => IntentKind::HostDiscovery,
            "port_scan" => IntentKind::PortScan,
            "service_detection" => IntentKind::ServiceDetection,
            "os_detection" => IntentKind::OsDetection,
            "vuln_scan" => IntentKind::VulnScan,
            "ssl_scan" => IntentKind::SslScan,
            "web_dir_enum" => IntentKind::WebDirEnum,
            "web_vuln_scan" => IntentKind::WebVulnScan,
            "ping" => IntentKind::Ping,
            "dns_lookup" => IntentKind::DnsLookup,
            "whois_lookup" => IntentKind::WhoisLookup,
            "subdomain_enum" => IntentKind::SubdomainEnum,
            "brute_force_ssh" => IntentKind::BruteForceSsh,
            "brute_force_http" => IntentKind::BruteForceHttp,
            "sql_injection" => IntentKind::SqlInjection,
            "info_query" => IntentKind::InfoQuery,
            "unknown" => IntentKind::Unknown,
            _ => return None,
        })
    }

    /// All kinds, for the resolver prompt vocabulary.
    pub fn all() -> &'static [IntentKind] {
        &[
            IntentKind::HostDiscovery,
            IntentKind::PortScan,
            IntentKind::ServiceDetection,
            IntentKind::OsDetection,
            IntentKind::VulnScan,
            IntentKind::SslScan,
            IntentKind::WebDirEnum,
            IntentKind::WebVulnScan,
            IntentKind::Ping,
            IntentKind::DnsLookup,
            IntentKind::WhoisLookup,
            IntentKind::SubdomainEnum,
            IntentKind::BruteForceSsh,
            IntentKind::BruteForceHttp,
            IntentKind::SqlInjection,
            IntentKind::InfoQuery,
            IntentKind::Unknown,
        ]
    }

    /// Intents that never produce a command.
    pub fn is_actionable(&self) -> bool {
        !matches!(self, IntentKind::InfoQuery | IntentKind::Unknown)
    }
}

/// The resolver's output: what the user wants, nothing about how to do it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    pub kind: IntentKind,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub rationale: String,
}

impl Intent {
    pub fn new(kind: IntentKind) -> Self {
        Self {
            kind,
            target: None,
            params: BTreeMap::new(),
            rationale: String::new(),
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}
