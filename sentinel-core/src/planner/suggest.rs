//! Recommendation engine
//!
//! Proposes the next tactical step from what the knowledge store already
//! holds. Deterministic: no LLM involvement. Whether a step already ran is
//! decided from the execution history, never from entity counts, so a
//! failed parse keeps its step eligible for a re-run.

use serde::{Deserialize, Serialize};

use crate::planner::{
    ExecutionPolicy, Intent, IntentKind, PolicyDecision, RiskLevel, ToolRegistry,
};
use crate::state::{EntityKind, HostData, KnowledgeStore, PortData, ServiceData};
use crate::Result;

/// One proposed next step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub intent: Intent,
    pub title: String,
    pub rationale: String,
    /// 1 = lowest, 10 = highest
    pub priority: u8,
    pub risk: RiskLevel,
    pub needs_confirmation: bool,
}

/// Store-driven next-step proposals.
pub struct SuggestionEngine<'a> {
    registry: &'a ToolRegistry,
    policy: &'a ExecutionPolicy,
}

impl<'a> SuggestionEngine<'a> {
    pub fn new(registry: &'a ToolRegistry, policy: &'a ExecutionPolicy) -> Self {
        Self { registry, policy }
    }

    /// Produce suggestions sorted by descending priority.
    pub fn suggest(&self, store: &KnowledgeStore) -> Result<Vec<Suggestion>> {
        let mut suggestions = Vec::new();

        self.suggest_port_scans(store, &mut suggestions)?;
        self.suggest_from_services(store, &mut suggestions)?;
        self.suggest_whois(store, &mut suggestions)?;

        suggestions.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(suggestions)
    }

    /// Alive hosts without a parsed port scan yet.
    fn suggest_port_scans(
        &self,
        store: &KnowledgeStore,
        out: &mut Vec<Suggestion>,
    ) -> Result<()> {
        for host in store.entities_by_kind(EntityKind::Host)? {
            let Ok(data) = host.payload::<HostData>() else {
                continue;
            };
            if !data.is_alive {
                continue;
            }
            if store.has_successful_parse("nmap_port_scan", &data.ip_address)? {
                continue;
            }
            self.push(
                out,
                Intent::new(IntentKind::PortScan).with_target(&data.ip_address),
                format!("Scan open ports on {}", data.ip_address),
                "Host is alive but its ports have not been mapped".to_string(),
                8,
            );
        }
        Ok(())
    }

    /// Known services: web services get directory enumeration, ssh gets a
    /// (confirmation-gated) brute-force proposal.
    fn suggest_from_services(
        &self,
        store: &KnowledgeStore,
        out: &mut Vec<Suggestion>,
    ) -> Result<()> {
        for service in store.entities_by_kind(EntityKind::Service)? {
            let Ok(data) = service.payload::<ServiceData>() else {
                continue;
            };
            let Some(port) = store.entity(&data.port_id)? else {
                continue;
            };
            let Ok(port_data) = port.payload::<PortData>() else {
                continue;
            };
            let Some(host) = store.entity(&port_data.host_id)? else {
                continue;
            };
            let Ok(host_data) = host.payload::<HostData>() else {
                continue;
            };
            let ip = &host_data.ip_address;

            match data.name.as_str() {
                "http" | "https" => {
                    let scheme = if data.name == "https" || port_data.port == 443 {
                        "https"
                    } else {
                        "http"
                    };
                    let url = if matches!(port_data.port, 80 | 443) {
                        format!("{scheme}://{ip}")
                    } else {
                        format!("{scheme}://{ip}:{}", port_data.port)
                    };
                    if !store.has_successful_parse("gobuster_dir", &url)? {
                        self.push(
                            out,
                            Intent::new(IntentKind::WebDirEnum).with_target(&url),
                            format!("Enumerate directories on {url}"),
                            format!("Port {}/tcp serves {}", port_data.port, data.name),
                            7,
                        );
                    }
                }
                "ssh" => {
                    if !store.has_tool_executed("hydra_ssh", ip)? {
                        self.push(
                            out,
                            Intent::new(IntentKind::BruteForceSsh).with_target(ip),
                            format!("Try SSH credentials on {ip}"),
                            format!("SSH service exposed on port {}", port_data.port),
                            4,
                        );
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Observed domains without registration data.
    fn suggest_whois(&self, store: &KnowledgeStore, out: &mut Vec<Suggestion>) -> Result<()> {
        for dns in store.entities_by_kind(EntityKind::Dns)? {
            let Some(domain) = dns.data.get("domain").and_then(|v| v.as_str()) else {
                continue;
            };
            if store.has_tool_executed("whois_lookup", domain)? {
                continue;
            }
            self.push(
                out,
                Intent::new(IntentKind::WhoisLookup).with_target(domain),
                format!("Look up registration data for {domain}"),
                "Domain observed without whois history".to_string(),
                5,
            );
        }
        Ok(())
    }

    /// Apply the policy before a suggestion is even surfaced: denied tactics
    /// are dropped, confirmation-gated ones are flagged.
    fn push(
        &self,
        out: &mut Vec<Suggestion>,
        intent: Intent,
        title: String,
        rationale: String,
        priority: u8,
    ) {
        let Some(def) = self.registry.get(intent.kind) else {
            return;
        };
        let needs_confirmation = match def.tactic {
            Some(tactic) => {
                match self
                    .policy
                    .decide(tactic, def.risk, def.creates_persistent_change)
                {
                    PolicyDecision::Deny(_) => return,
                    PolicyDecision::AllowWithConfirmation(_) => true,
                    PolicyDecision::AllowAuto => false,
                }
            }
            None => false,
        };

        out.push(Suggestion {
            title,
            rationale,
            priority,
            risk: def.risk,
            needs_confirmation,
            intent,
        });
    }
}
