//! Nmap output parsers (host sweep and port scan)

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ids;
use crate::state::{PortState, Relationship, RelationshipKind};

use super::{
    helpers, make_host, make_port, make_service, ParseContext, ParseError, ParseResult, Parser,
};

static LATENCY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(([\d.]+)s latency\)").expect("valid latency regex"));

const SCAN_REPORT: &str = "Nmap scan report for";

fn looks_like_nmap(output: &str) -> bool {
    output.contains("Starting Nmap") || output.contains(SCAN_REPORT)
}

/// Pull the IP out of a scan report line, which is either
/// `Nmap scan report for 192.168.1.10` or
/// `Nmap scan report for router.lan (192.168.1.1)`.
fn report_ip(line: &str) -> Option<String> {
    helpers::extract_ipv4(line).into_iter().last()
}

/// Parses `nmap -sn` host discovery output into alive Host entities.
pub struct NmapHostSweepParser;

impl Parser for NmapHostSweepParser {
    fn parse(&self, output: &str, _ctx: &ParseContext) -> Result<ParseResult, ParseError> {
        if !looks_like_nmap(output) {
            return Err(ParseError::new("output does not look like nmap"));
        }

        let mut result = ParseResult::default();
        let mut current_ip: Option<String> = None;

        for line in output.lines() {
            let line = line.trim();

            if line.starts_with(SCAN_REPORT) {
                current_ip = report_ip(line);
            } else if line.starts_with("Host is up") {
                if let Some(ip) = current_ip.take() {
                    let latency_ms = LATENCY_RE
                        .captures(line)
                        .and_then(|caps| caps[1].parse::<f64>().ok())
                        .map(|secs| secs * 1000.0);
                    result
                        .entities
                        .push(make_host(&ip, "nmap_host_sweep", 1.0, latency_ms)?);
                }
            }
        }

        Ok(result)
    }
}

/// Parses `nmap -sT`/`-sS` port scan output into Host, Port, and Service
/// entities with their `has_port`/`has_service` relationships.
pub struct NmapPortScanParser;

impl Parser for NmapPortScanParser {
    fn parse(&self, output: &str, ctx: &ParseContext) -> Result<ParseResult, ParseError> {
        if !looks_like_nmap(output) {
            return Err(ParseError::new("output does not look like nmap"));
        }

        let mut result = ParseResult::default();
        let mut current_ip: Option<String> = None;
        let mut host_emitted = false;

        for line in output.lines() {
            let line = line.trim();

            if line.starts_with(SCAN_REPORT) {
                current_ip = report_ip(line);
                host_emitted = false;
                continue;
            }

            let Some(ip) = current_ip.as_deref() else {
                continue;
            };
            let Some(triple) = helpers::parse_port_triple(line) else {
                continue;
            };
            if triple.state != PortState::Open {
                continue;
            }

            if !host_emitted {
                result
                    .entities
                    .push(make_host(ip, &ctx.tool_id, 1.0, None)?);
                host_emitted = true;
            }

            let port_entity =
                make_port(ip, triple.port, triple.protocol, triple.state, &ctx.tool_id)?;
            let port_id = port_entity.id.clone();
            result.entities.push(port_entity);
            result.relationships.push(Relationship::new(
                ids::host_id(ip),
                port_id.clone(),
                RelationshipKind::HasPort,
            ));

            if let Some(service) = &triple.service {
                let service_entity =
                    make_service(&port_id, service, None, None, &ctx.tool_id)?;
                let service_id = service_entity.id.clone();
                result.entities.push(service_entity);
                result.relationships.push(Relationship::new(
                    port_id,
                    service_id,
                    RelationshipKind::HasService,
                ));
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::state::{EntityKind, HostData};

    const SWEEP_OUTPUT: &str = "\
Starting Nmap 7.94 ( https://nmap.org ) at 2026-08-02 10:00 UTC
Nmap scan report for 192.168.1.1
Host is up (0.00050s latency).
Nmap scan report for desktop.lan (192.168.1.42)
Host is up (0.0012s latency).
Nmap scan report for 192.168.1.99
Nmap done: 256 IP addresses (2 hosts up) scanned in 2.51 seconds
";

    const PORT_SCAN_OUTPUT: &str = "\
Starting Nmap 7.94 ( https://nmap.org ) at 2026-08-02 10:05 UTC
Nmap scan report for 192.168.1.10
Host is up (0.00042s latency).
Not shown: 997 closed tcp ports (conn-refused)
PORT     STATE SERVICE
22/tcp   open  ssh
80/tcp   open  http
3306/tcp open  mysql

Nmap done: 1 IP address (1 host up) scanned in 0.08 seconds
";

    #[test]
    fn test_host_sweep_finds_alive_hosts() {
        let ctx = ParseContext::new("nmap_host_sweep", "192.168.1.0/24");
        let result = NmapHostSweepParser
            .parse(SWEEP_OUTPUT, &ctx)
            .expect("should parse");

        assert_eq!(result.entities.len(), 2);
        assert_eq!(result.entities[0].id, "host_192_168_1_1");
        assert_eq!(result.entities[1].id, "host_192_168_1_42");

        let data: HostData = result.entities[0].payload().expect("should deserialize");
        assert!(data.is_alive);
        assert!(data.response_time_ms.expect("should have latency") < 1.0);
    }

    #[test]
    fn test_host_sweep_skips_down_hosts() {
        let ctx = ParseContext::new("nmap_host_sweep", "192.168.1.0/24");
        let result = NmapHostSweepParser
            .parse(SWEEP_OUTPUT, &ctx)
            .expect("should parse");
        assert!(!result.entities.iter().any(|e| e.id == "host_192_168_1_99"));
    }

    #[test]
    fn test_host_sweep_rejects_non_nmap_output() {
        let ctx = ParseContext::new("nmap_host_sweep", "192.168.1.0/24");
        let err = NmapHostSweepParser
            .parse("command not found: nmap", &ctx)
            .unwrap_err();
        assert!(err.to_string().contains("does not look like nmap"));
    }

    #[test]
    fn test_port_scan_builds_graph() {
        let ctx = ParseContext::new("nmap_port_scan", "192.168.1.10");
        let result = NmapPortScanParser
            .parse(PORT_SCAN_OUTPUT, &ctx)
            .expect("should parse");

        // 1 host + 3 ports + 3 services
        assert_eq!(result.entities.len(), 7);
        assert!(result
            .entities
            .iter()
            .any(|e| e.id == "host_192_168_1_10_port_22_tcp"));
        assert!(result
            .entities
            .iter()
            .any(|e| e.id == "host_192_168_1_10_port_80_tcp_service_http"));

        // Every port relates to the host, every service to its port
        let has_port_rels: Vec<_> = result
            .relationships
            .iter()
            .filter(|r| r.kind == RelationshipKind::HasPort)
            .collect();
        assert_eq!(has_port_rels.len(), 3);
        assert!(has_port_rels
            .iter()
            .all(|r| r.parent_id == "host_192_168_1_10"));

        let has_service_rels: Vec<_> = result
            .relationships
            .iter()
            .filter(|r| r.kind == RelationshipKind::HasService)
            .collect();
        assert_eq!(has_service_rels.len(), 3);
    }

    #[test]
    fn test_port_scan_single_host_entity() {
        let ctx = ParseContext::new("nmap_port_scan", "192.168.1.10");
        let result = NmapPortScanParser
            .parse(PORT_SCAN_OUTPUT, &ctx)
            .expect("should parse");
        let hosts = result
            .entities
            .iter()
            .filter(|e| e.kind == EntityKind::Host)
            .count();
        assert_eq!(hosts, 1);
    }

    #[test]
    fn test_port_scan_no_open_ports_is_empty() {
        let ctx = ParseContext::new("nmap_port_scan", "192.168.1.11");
        let output = "\
Starting Nmap 7.94 ( https://nmap.org ) at 2026-08-02 10:06 UTC
Nmap scan report for 192.168.1.11
Host is up (0.00039s latency).
All 1000 scanned ports on 192.168.1.11 are in ignored states.
Nmap done: 1 IP address (1 host up) scanned in 1.21 seconds
";
        let result = NmapPortScanParser.parse(output, &ctx).expect("should parse");
        assert!(result.is_empty());
    }

    #[test]
    fn test_port_scan_rejects_malformed_output() {
        let ctx = ParseContext::new("nmap_port_scan", "192.168.1.10");
        let err = NmapPortScanParser
            .parse("segmentation fault (core dumped)", &ctx)
            .unwrap_err();
        assert!(err.to_string().contains("does not look like nmap"));
    }
}
