//! Gobuster directory enumeration parser

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ids;
use crate::state::{
    Entity, EntityKind, PortState, Protocol, Relationship, RelationshipKind, ResourceKind,
    WebResourceData,
};

use super::{
    helpers, make_host, make_port, make_service, ParseContext, ParseError, ParseResult, Parser,
};

static STATUS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(Status:\s*(\d{3})\)").expect("valid status regex"));
static SIZE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[Size:\s*(\d+)\]").expect("valid size regex"));

/// Parses `gobuster dir` output into WebResource entities anchored under the
/// target's host/port/service chain.
///
/// Accepts both the modern table format (`/admin  (Status: 301) [Size: 312]`)
/// and the legacy `Found: /admin (Status: 200)` lines.
pub struct GobusterDirParser;

struct Anchor {
    ip: String,
    port: u16,
    scheme: String,
    base_url: String,
}

impl GobusterDirParser {
    fn anchor(ctx: &ParseContext) -> Result<Anchor, ParseError> {
        let (host, port, scheme) = helpers::split_http_target(&ctx.target)
            .ok_or_else(|| ParseError::new(format!("target is not a URL: {}", ctx.target)))?;
        if !helpers::is_ip(&host) {
            return Err(ParseError::new(format!(
                "cannot anchor web resources: target host is not an IP address: {host}"
            )));
        }
        let base_url = format!("{scheme}://{host}:{port}");
        Ok(Anchor {
            ip: host,
            port,
            scheme,
            base_url,
        })
    }

    fn path_from_line(line: &str) -> Option<&str> {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("Found:") {
            let path = rest.trim().split_whitespace().next()?;
            return path.starts_with('/').then_some(path);
        }
        if line.starts_with('/') && STATUS_RE.is_match(line) {
            return line.split_whitespace().next();
        }
        None
    }
}

impl Parser for GobusterDirParser {
    fn parse(&self, output: &str, ctx: &ParseContext) -> Result<ParseResult, ParseError> {
        let mut found: Vec<(String, Option<u16>, Option<u64>)> = Vec::new();

        for line in output.lines() {
            let Some(path) = Self::path_from_line(line) else {
                continue;
            };
            let status = STATUS_RE
                .captures(line)
                .and_then(|caps| caps[1].parse::<u16>().ok());
            let size = SIZE_RE
                .captures(line)
                .and_then(|caps| caps[1].parse::<u64>().ok());
            found.push((path.to_string(), status, size));
        }

        if found.is_empty() {
            return Ok(ParseResult::default());
        }

        // Anchor chain: host -> port -> service carries the web resources
        let anchor = Self::anchor(ctx)?;
        let mut result = ParseResult::default();

        let host_entity = make_host(&anchor.ip, &ctx.tool_id, 0.9, None)?;
        let host_id = host_entity.id.clone();
        result.entities.push(host_entity);

        let port_entity = make_port(
            &anchor.ip,
            anchor.port,
            Protocol::Tcp,
            PortState::Open,
            &ctx.tool_id,
        )?;
        let port_id = port_entity.id.clone();
        result.entities.push(port_entity);
        result.relationships.push(Relationship::new(
            host_id,
            port_id.clone(),
            RelationshipKind::HasPort,
        ));

        let service_entity = make_service(&port_id, &anchor.scheme, None, None, &ctx.tool_id)?;
        let service_id = service_entity.id.clone();
        result.entities.push(service_entity);
        result.relationships.push(Relationship::new(
            port_id,
            service_id.clone(),
            RelationshipKind::HasService,
        ));

        for (path, status_code, size) in found {
            let url = helpers::canonicalize_url(&format!("{}{}", anchor.base_url, path));
            let resource_kind = classify_path(&path);
            let data = WebResourceData {
                service_id: service_id.clone(),
                url: url.clone(),
                resource_kind,
                status_code,
                size,
                discovered_by: ctx.tool_id.clone(),
                ..Default::default()
            };
            let entity = Entity::new(
                ids::web_resource_id(&service_id, &url),
                EntityKind::WebResource,
                &data,
                1.0,
            )
            .map_err(|e| ParseError::new(e.to_string()))?;
            result.relationships.push(Relationship::new(
                service_id.clone(),
                entity.id.clone(),
                RelationshipKind::HasWebResource,
            ));
            result.entities.push(entity);
        }

        Ok(result)
    }
}

fn classify_path(path: &str) -> ResourceKind {
    let last = path.trim_end_matches('/').rsplit('/').next().unwrap_or("");
    if path.ends_with('/') || !last.contains('.') {
        ResourceKind::Directory
    } else {
        ResourceKind::File
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::state::EntityKind;

    const GOBUSTER_OUTPUT: &str = "\
===============================================================
Gobuster v3.6
by OJ Reeves (@TheColonial) & Christian Mehlmauer (@firefart)
===============================================================
[+] Url:                     http://192.168.1.10
[+] Method:                  GET
[+] Threads:                 10
[+] Wordlist:                /usr/share/wordlists/dirb/common.txt
===============================================================
/admin                (Status: 301) [Size: 312]
/index.html           (Status: 200) [Size: 10701]
/uploads              (Status: 403) [Size: 277]
===============================================================
";

    #[test]
    fn test_parses_resources_with_anchor_chain() {
        let ctx = ParseContext::new("gobuster_dir", "http://192.168.1.10");
        let result = GobusterDirParser
            .parse(GOBUSTER_OUTPUT, &ctx)
            .expect("should parse");

        // host + port + service + 3 web resources
        assert_eq!(result.entities.len(), 6);
        let web: Vec<_> = result
            .entities
            .iter()
            .filter(|e| e.kind == EntityKind::WebResource)
            .collect();
        assert_eq!(web.len(), 3);

        // Resource ids hang off the http service
        assert!(web[0]
            .id
            .starts_with("host_192_168_1_10_port_80_tcp_service_http_web_hash_"));

        let has_web: Vec<_> = result
            .relationships
            .iter()
            .filter(|r| r.kind == RelationshipKind::HasWebResource)
            .collect();
        assert_eq!(has_web.len(), 3);
    }

    #[test]
    fn test_status_and_size_extracted() {
        let ctx = ParseContext::new("gobuster_dir", "http://192.168.1.10");
        let result = GobusterDirParser
            .parse(GOBUSTER_OUTPUT, &ctx)
            .expect("should parse");

        let admin = result
            .entities
            .iter()
            .find(|e| e.data["url"].as_str() == Some("http://192.168.1.10:80/admin"))
            .expect("should find /admin");
        let data: WebResourceData = admin.payload().expect("should deserialize");
        assert_eq!(data.status_code, Some(301));
        assert_eq!(data.size, Some(312));
        assert_eq!(data.resource_kind, ResourceKind::Directory);
    }

    #[test]
    fn test_legacy_found_lines() {
        let ctx = ParseContext::new("gobuster_dir", "http://192.168.1.10");
        let output = "Found: /backup (Status: 200)\nFound: /logo.png (Status: 200)\n";
        let result = GobusterDirParser.parse(output, &ctx).expect("should parse");

        let web: Vec<_> = result
            .entities
            .iter()
            .filter(|e| e.kind == EntityKind::WebResource)
            .collect();
        assert_eq!(web.len(), 2);
        let png: WebResourceData = web
            .iter()
            .find(|e| e.data["url"].as_str().unwrap_or("").ends_with("logo.png"))
            .expect("should find png")
            .payload()
            .expect("should deserialize");
        assert_eq!(png.resource_kind, ResourceKind::File);
    }

    #[test]
    fn test_no_hits_is_empty() {
        let ctx = ParseContext::new("gobuster_dir", "http://192.168.1.10");
        let result = GobusterDirParser
            .parse("===============\nGobuster v3.6\n", &ctx)
            .expect("should parse");
        assert!(result.is_empty());
    }

    #[test]
    fn test_hits_without_ip_target_fail() {
        let ctx = ParseContext::new("gobuster_dir", "http://intranet.local");
        let err = GobusterDirParser
            .parse("/admin                (Status: 301) [Size: 312]\n", &ctx)
            .unwrap_err();
        assert!(err.to_string().contains("not an IP address"));
    }

    #[test]
    fn test_same_url_same_id_across_runs() {
        let ctx = ParseContext::new("gobuster_dir", "http://192.168.1.10");
        let a = GobusterDirParser
            .parse(GOBUSTER_OUTPUT, &ctx)
            .expect("should parse");
        let b = GobusterDirParser
            .parse(GOBUSTER_OUTPUT, &ctx)
            .expect("should parse");
        let ids_a: Vec<_> = a.entities.iter().map(|e| &e.id).collect();
        let ids_b: Vec<_> = b.entities.iter().map(|e| &e.id).collect();
        assert_eq!(ids_a, ids_b);
    }
}
