//! DNS lookup parser (nslookup / dig)

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ids;
use crate::state::{DnsRecordData, Entity, EntityKind, Relationship, RelationshipKind};

use super::{helpers, make_host, ParseContext, ParseError, ParseResult, Parser};

static DIG_ANSWER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<domain>[A-Za-z0-9.-]+)\.\s+\d+\s+IN\s+(?P<rtype>A|AAAA|CNAME|MX|NS|TXT)\s+(?P<value>\S+)")
        .expect("valid dig answer regex")
});

/// Parses nslookup/dig output into a DnsRecord plus the Host entities its
/// answers resolve to, linked with `resolves_to`.
pub struct DnsLookupParser;

impl Parser for DnsLookupParser {
    fn parse(&self, output: &str, ctx: &ParseContext) -> Result<ParseResult, ParseError> {
        let mut domain = ctx.target.trim_end_matches('.').to_lowercase();
        let mut record_type = "A".to_string();
        let mut addresses: Vec<String> = Vec::new();

        let mut in_answer = false;
        for line in output.lines() {
            let line = line.trim();

            // nslookup: addresses before the answer section belong to the
            // resolver itself, not the queried name
            if line.starts_with("Non-authoritative answer")
                || line.starts_with("Name:")
                || DIG_ANSWER_RE.is_match(line)
            {
                in_answer = true;
            }

            if let Some(rest) = line.strip_prefix("Name:") {
                let name = rest.trim().trim_end_matches('.');
                if !name.is_empty() {
                    domain = name.to_lowercase();
                }
                continue;
            }

            if let Some(caps) = DIG_ANSWER_RE.captures(line) {
                domain = caps["domain"].to_lowercase();
                record_type = caps["rtype"].to_string();
                let value = caps["value"].trim_end_matches('.');
                if helpers::is_ip(value) {
                    addresses.push(value.to_string());
                }
                continue;
            }

            if in_answer {
                if let Some(rest) = line.strip_prefix("Address:") {
                    let addr = rest.trim().split('#').next().unwrap_or("").trim();
                    if helpers::is_ip(addr) {
                        addresses.push(addr.to_string());
                    }
                }
            }
        }

        addresses.dedup();
        if addresses.is_empty() {
            return Ok(ParseResult::default());
        }
        if domain.is_empty() || helpers::is_ip(&domain) {
            return Err(ParseError::new(format!(
                "no domain name to attach DNS answers to (target: {})",
                ctx.target
            )));
        }

        let mut result = ParseResult::default();
        let dns_entity_id = ids::dns_id(&domain);

        let data = DnsRecordData {
            domain: domain.clone(),
            record_type,
            value: addresses[0].clone(),
            resolves_to: Some(ids::host_id(&addresses[0])),
            discovered_by: ctx.tool_id.clone(),
            ..Default::default()
        };
        let dns_entity = Entity::new(dns_entity_id.clone(), EntityKind::Dns, &data, 1.0)
            .map_err(|e| ParseError::new(e.to_string()))?;
        result.entities.push(dns_entity);

        for address in &addresses {
            let host = make_host(address, &ctx.tool_id, 0.9, None)?;
            result.relationships.push(Relationship::new(
                dns_entity_id.clone(),
                host.id.clone(),
                RelationshipKind::ResolvesTo,
            ));
            result.entities.push(host);
        }

        Ok(result)
    }
}
