//! Execution policy: safe by default

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Command risk classification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

/// Tactic-level classification of intents, the unit the policy reasons
/// about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tactic {
    // Reconnaissance
    PingSweep,
    PortScan,
    ServiceDetection,
    OsFingerprint,
    DnsEnumeration,
    SubdomainEnumeration,
    // Web enumeration
    DirectoryBruteForce,
    TechnologyDetection,
    ParameterFuzzing,
    // Vulnerability assessment
    VulnScan,
    SslTlsAnalysis,
    // Exploitation
    ExploitWeakness,
    CredentialBruteForce,
    PasswordSpray,
}

impl Tactic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tactic::PingSweep => "ping_sweep",
            Tactic::PortScan => "port_scan",
            Tactic::ServiceDetection => "service_detection",
            Tactic::OsFingerprint => "os_fingerprint",
            Tactic::DnsEnumeration => "dns_enumeration",
            Tactic::SubdomainEnumeration => "subdomain_enumeration",
            Tactic::DirectoryBruteForce => "directory_brute_force",
            Tactic::TechnologyDetection => "technology_detection",
            Tactic::ParameterFuzzing => "parameter_fuzzing",
            Tactic::VulnScan => "vuln_scan",
            Tactic::SslTlsAnalysis => "ssl_tls_analysis",
            Tactic::ExploitWeakness => "exploit_weakness",
            Tactic::CredentialBruteForce => "credential_brute_force",
            Tactic::PasswordSpray => "password_spray",
        }
    }
}

/// Decision returned for an intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    AllowAuto,
    AllowWithConfirmation(String),
    Deny(String),
}

/// Execution policy for the planner and recommendation engine.
///
/// v1 locked rules: `allow_persistent_changes` is false and cannot be
/// enabled; exploit and credential brute-force tactics always require
/// confirmation. The constructor enforces both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPolicy {
    allow_persistent_changes: bool,
    confirm_before_tactics: BTreeSet<Tactic>,
    blocked_tactics: BTreeSet<Tactic>,
    /// Risk above this level requires confirmation even for allowed tactics
    per_tactic_risk_cap: RiskLevel,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            allow_persistent_changes: false,
            confirm_before_tactics: BTreeSet::from([
                Tactic::ExploitWeakness,
                Tactic::CredentialBruteForce,
            ]),
            blocked_tactics: BTreeSet::new(),
            per_tactic_risk_cap: RiskLevel::High,
        }
    }
}

impl ExecutionPolicy {
    /// Build a policy, enforcing the v1 locked rules.
    pub fn new(
        allow_persistent_changes: bool,
        confirm_before_tactics: BTreeSet<Tactic>,
        blocked_tactics: BTreeSet<Tactic>,
        per_tactic_risk_cap: RiskLevel,
    ) -> Result<Self> {
        let policy = Self {
            allow_persistent_changes,
            confirm_before_tactics,
            blocked_tactics,
            per_tactic_risk_cap,
        };
        policy.validate_locked_rules()?;
        Ok(policy)
    }

    /// v1 locked rules: persistent changes stay off, and the two high-risk
    /// tactics stay in the confirmation set.
    pub fn validate_locked_rules(&self) -> Result<()> {
        if self.allow_persistent_changes {
            return Err(Error::Config(
                "policy violation: allow_persistent_changes must be false".to_string(),
            ));
        }
        for required in [Tactic::ExploitWeakness, Tactic::CredentialBruteForce] {
            if !self.confirm_before_tactics.contains(&required) {
                return Err(Error::Config(format!(
                    "policy violation: confirm_before_tactics missing {}",
                    required.as_str()
                )));
            }
        }
        Ok(())
    }

    pub fn allow_persistent_changes(&self) -> bool {
        self.allow_persistent_changes
    }

    /// Block a tactic outright.
    pub fn block_tactic(&mut self, tactic: Tactic) {
        self.blocked_tactics.insert(tactic);
    }

    pub fn requires_confirmation(&self, tactic: Tactic) -> bool {
        self.confirm_before_tactics.contains(&tactic)
    }

    /// Tactics fully blocked under the current policy.
    pub fn blocked_tactics(&self) -> BTreeSet<Tactic> {
        let mut blocked = self.blocked_tactics.clone();
        if !self.allow_persistent_changes {
            blocked.insert(Tactic::PasswordSpray);
        }
        blocked
    }

    /// Decide what to do with an intent classified as `tactic`, carrying the
    /// registry's risk level and persistent-change flag for its tool.
    pub fn decide(
        &self,
        tactic: Tactic,
        risk: RiskLevel,
        creates_persistent_change: bool,
    ) -> PolicyDecision {
        if self.blocked_tactics().contains(&tactic) {
            return PolicyDecision::Deny(format!(
                "tactic {} is blocked by policy",
                tactic.as_str()
            ));
        }
        if creates_persistent_change && !self.allow_persistent_changes {
            return PolicyDecision::Deny(format!(
                "tactic {} would make persistent changes, which are disabled",
                tactic.as_str()
            ));
        }
        if self.requires_confirmation(tactic) {
            return PolicyDecision::AllowWithConfirmation(format!(
                "tactic {} requires explicit approval",
                tactic.as_str()
            ));
        }
        if risk > self.per_tactic_risk_cap {
            return PolicyDecision::AllowWithConfirmation(format!(
                "risk {risk:?} exceeds the automatic cap"
            ));
        }
        PolicyDecision::AllowAuto
    }
}
