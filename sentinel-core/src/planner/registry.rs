//! Static tool registry
//!
//! The single source of truth for tool knowledge. The LLM never produces
//! tool names, arguments, risk levels, or privilege requirements; they all
//! live here, keyed by intent. Registry construction fails if any entry
//! names a binary outside the closed allowlist or carries an unsafe
//! argument template.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::planner::{IntentKind, RiskLevel, Tactic};
use crate::{Error, Result};

/// Closed set of binaries that may ever appear in a ToolDef.
pub const ALLOWED_BINARIES: &[&str] = &[
    "ping", "nmap", "gobuster", "nikto", "dirb", "hydra", "sqlmap", "whois", "dig", "nslookup",
    "curl", "wget",
];

/// Shell metacharacters forbidden in any argument or template.
pub const DANGEROUS_CHARS: &[char] = &[
    ';', '|', '&', '$', '`', '(', ')', '{', '}', '<', '>', '\n', '\r', '\0',
];

const VALUE_PLACEHOLDER: &str = "{value}";

/// Static description of one tool invocation shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    /// Stable id used for parser binding and execution history
    pub tool_id: String,
    /// Binary name from the allowlist
    pub binary: String,
    /// Immutable base argv
    pub base_args: Vec<String>,
    /// Parameter templates, each with a single `{value}` placeholder
    pub arg_templates: BTreeMap<String, String>,
    pub risk: RiskLevel,
    pub requires_root: bool,
    /// Tactic classification consulted by the policy gate
    pub tactic: Option<Tactic>,
    /// Tools that would modify the target are gated behind
    /// `allow_persistent_changes`
    pub creates_persistent_change: bool,
    /// Flag the target is attached with (`-u`, `-h`); appended as the last
    /// positional argument when absent
    pub target_flag: Option<String>,
    /// Scheme prefix glued onto the target (hydra's `ssh://`)
    pub target_prefix: Option<String>,
    pub description: String,
}

impl ToolDef {
    fn new(tool_id: &str, binary: &str, base_args: &[&str]) -> Self {
        Self {
            tool_id: tool_id.to_string(),
            binary: binary.to_string(),
            base_args: base_args.iter().map(|s| (*s).to_string()).collect(),
            arg_templates: BTreeMap::new(),
            risk: RiskLevel::Low,
            requires_root: false,
            tactic: None,
            creates_persistent_change: false,
            target_flag: None,
            target_prefix: None,
            description: String::new(),
        }
    }

    fn template(mut self, key: &str, template: &str) -> Self {
        self.arg_templates
            .insert(key.to_string(), template.to_string());
        self
    }

    fn risk(mut self, risk: RiskLevel) -> Self {
        self.risk = risk;
        self
    }

    fn requires_root(mut self) -> Self {
        self.requires_root = true;
        self
    }

    fn tactic(mut self, tactic: Tactic) -> Self {
        self.tactic = Some(tactic);
        self
    }

    fn target_flag(mut self, flag: &str) -> Self {
        self.target_flag = Some(flag.to_string());
        self
    }

    fn target_prefix(mut self, prefix: &str) -> Self {
        self.target_prefix = Some(prefix.to_string());
        self
    }

    fn describe(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }
}

/// Deterministic IntentKind → ToolDef mapping.
pub struct ToolRegistry {
    tools: BTreeMap<IntentKind, ToolDef>,
}

impl ToolRegistry {
    /// Build the registry with the built-in tool set, verifying every entry.
    pub fn new() -> Result<Self> {
        let defs = [
            (
                IntentKind::Ping,
                ToolDef::new("ping", "ping", &[])
                    .template("count", "-c {value}")
                    .tactic(Tactic::PingSweep)
                    .describe("ICMP reachability check"),
            ),
            (
                IntentKind::HostDiscovery,
                ToolDef::new("nmap_host_sweep", "nmap", &["-sn"])
                    .tactic(Tactic::PingSweep)
                    .describe("Discover live hosts with a ping sweep"),
            ),
            (
                IntentKind::PortScan,
                ToolDef::new("nmap_port_scan", "nmap", &["-sS", "-sV"])
                    .template("ports", "-p {value}")
                    .risk(RiskLevel::Medium)
                    .requires_root()
                    .tactic(Tactic::PortScan)
                    .describe("TCP SYN port scan with service detection"),
            ),
            (
                IntentKind::ServiceDetection,
                ToolDef::new(
                    "nmap_service_detection",
                    "nmap",
                    &["-sV", "--version-intensity", "5"],
                )
                .template("ports", "-p {value}")
                .risk(RiskLevel::Medium)
                .tactic(Tactic::ServiceDetection)
                .describe("Service version detection"),
            ),
            (
                IntentKind::OsDetection,
                ToolDef::new("nmap_os_detection", "nmap", &["-O", "-sV"])
                    .risk(RiskLevel::Medium)
                    .requires_root()
                    .tactic(Tactic::OsFingerprint)
                    .describe("Operating system fingerprinting"),
            ),
            (
                IntentKind::VulnScan,
                ToolDef::new("nmap_vuln_scan", "nmap", &["--script", "vuln"])
                    .template("ports", "-p {value}")
                    .risk(RiskLevel::High)
                    .requires_root()
                    .tactic(Tactic::VulnScan)
                    .describe("NSE vulnerability scripts"),
            ),
            (
                IntentKind::SslScan,
                ToolDef::new(
                    "nmap_ssl_scan",
                    "nmap",
                    &["--script", "ssl-cert,ssl-enum-ciphers", "-p", "443"],
                )
                .risk(RiskLevel::Medium)
                .tactic(Tactic::SslTlsAnalysis)
                .describe("TLS certificate and cipher analysis"),
            ),
            (
                IntentKind::WebDirEnum,
                ToolDef::new(
                    "gobuster_dir",
                    "gobuster",
                    &["dir", "-w", "/usr/share/wordlists/dirb/common.txt"],
                )
                .template("wordlist", "-w {value}")
                .template("extensions", "-x {value}")
                .risk(RiskLevel::Medium)
                .tactic(Tactic::DirectoryBruteForce)
                .target_flag("-u")
                .describe("Web directory and file enumeration"),
            ),
            (
                IntentKind::WebVulnScan,
                ToolDef::new("nikto_scan", "nikto", &[])
                    .template("port", "-p {value}")
                    .risk(RiskLevel::Medium)
                    .tactic(Tactic::VulnScan)
                    .target_flag("-h")
                    .describe("Web server vulnerability scan"),
            ),
            (
                IntentKind::DnsLookup,
                ToolDef::new("dns_lookup", "nslookup", &[])
                    .tactic(Tactic::DnsEnumeration)
                    .describe("DNS query"),
            ),
            (
                IntentKind::WhoisLookup,
                ToolDef::new("whois_lookup", "whois", &[]).describe("Domain registration lookup"),
            ),
            (
                IntentKind::SubdomainEnum,
                ToolDef::new(
                    "gobuster_dns",
                    "gobuster",
                    &["dns", "-w", "/usr/share/wordlists/subdomains-top1million-5000.txt"],
                )
                .template("wordlist", "-w {value}")
                .risk(RiskLevel::Medium)
                .tactic(Tactic::SubdomainEnumeration)
                .target_flag("-d")
                .describe("Subdomain enumeration"),
            ),
            (
                IntentKind::BruteForceSsh,
                ToolDef::new("hydra_ssh", "hydra", &["-t", "4"])
                    .template("username", "-l {value}")
                    .template("userlist", "-L {value}")
                    .template("password", "-p {value}")
                    .template("passlist", "-P {value}")
                    .risk(RiskLevel::High)
                    .tactic(Tactic::CredentialBruteForce)
                    .target_prefix("ssh://")
                    .describe("SSH credential brute force"),
            ),
            (
                IntentKind::BruteForceHttp,
                ToolDef::new("hydra_http", "hydra", &["-t", "4"])
                    .template("username", "-l {value}")
                    .template("passlist", "-P {value}")
                    .risk(RiskLevel::High)
                    .tactic(Tactic::CredentialBruteForce)
                    .target_prefix("http-get://")
                    .describe("HTTP credential brute force"),
            ),
            (
                IntentKind::SqlInjection,
                ToolDef::new("sqlmap_scan", "sqlmap", &["--batch", "--level", "3"])
                    .template("data", "--data {value}")
                    .risk(RiskLevel::High)
                    .tactic(Tactic::ExploitWeakness)
                    .target_flag("-u")
                    .describe("SQL injection testing"),
            ),
        ];

        let mut tools = BTreeMap::new();
        for (intent, def) in defs {
            validate_tool_def(&def)?;
            tools.insert(intent, def);
        }
        Ok(Self { tools })
    }

    /// Tool definition for an intent; None for intents without a command
    /// (info_query, unknown).
    pub fn get(&self, intent: IntentKind) -> Option<&ToolDef> {
        self.tools.get(&intent)
    }

    /// All intents with a registered tool.
    pub fn supported_intents(&self) -> Vec<IntentKind> {
        self.tools.keys().copied().collect()
    }

    /// Intents served by a given binary.
    pub fn intents_for_binary(&self, binary: &str) -> Vec<IntentKind> {
        self.tools
            .iter()
            .filter(|(_, def)| def.binary == binary)
            .map(|(intent, _)| *intent)
            .collect()
    }
}

fn validate_tool_def(def: &ToolDef) -> Result<()> {
    if !ALLOWED_BINARIES.contains(&def.binary.as_str()) {
        return Err(Error::Config(format!(
            "tool {} uses non-allowlisted binary: {}",
            def.tool_id, def.binary
        )));
    }

    for arg in &def.base_args {
        if arg.contains(DANGEROUS_CHARS) {
            return Err(Error::Config(format!(
                "tool {} base arg contains shell metacharacters: {arg}",
                def.tool_id
            )));
        }
    }

    for (key, template) in &def.arg_templates {
        if template.matches(VALUE_PLACEHOLDER).count() != 1 {
            return Err(Error::Config(format!(
                "tool {} template '{key}' must contain exactly one {VALUE_PLACEHOLDER}",
                def.tool_id
            )));
        }
        let without_placeholder = template.replace(VALUE_PLACEHOLDER, "");
        if without_placeholder.contains(DANGEROUS_CHARS) {
            return Err(Error::Config(format!(
                "tool {} template '{key}' contains shell metacharacters",
                def.tool_id
            )));
        }
    }

    Ok(())
}
