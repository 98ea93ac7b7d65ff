//! Parser framework: tool output → typed entities
//!
//! Every registered tool binds to a parser. Parser failures never cross the
//! coordinator boundary: [`run_parser`] translates them into a
//! `ParseStatus::ParseFailed` outcome with zero entities, leaving the
//! knowledge store untouched while the raw output is retained on disk.

pub mod dns;
pub mod generic;
pub mod gobuster;
pub mod helpers;
pub mod nmap;
pub mod ping;

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

use crate::ids;
use crate::state::{
    Entity, EntityBatch, EntityKind, HostData, ParseStatus, PortData, PortState, Protocol,
    Relationship, ServiceData,
};

pub use dns::DnsLookupParser;
pub use generic::GenericTextParser;
pub use gobuster::GobusterDirParser;
pub use nmap::{NmapHostSweepParser, NmapPortScanParser};
pub use ping::PingParser;

/// Raised inside a parser when the output cannot be interpreted.
///
/// Never escapes the framework; [`run_parser`] converts it into a
/// `ParseFailed` outcome.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ParseError(pub String);

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Context handed to a parser alongside the raw output.
#[derive(Debug, Clone, Default)]
pub struct ParseContext {
    pub tool_id: String,
    pub target: String,
    pub argv: Vec<String>,
    /// Upstream host id, when a prior step already anchored the target
    pub host_id: Option<String>,
    /// Upstream service id, for parsers attaching below a known service
    pub service_id: Option<String>,
}

impl ParseContext {
    pub fn new(tool_id: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            tool_id: tool_id.into(),
            target: target.into(),
            ..Default::default()
        }
    }
}

/// What a parser produced.
#[derive(Debug, Default)]
pub struct ParseResult {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    pub metadata: BTreeMap<String, String>,
}

impl ParseResult {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Contract implemented by every tool parser.
pub trait Parser: Send + Sync {
    fn parse(&self, output: &str, ctx: &ParseContext) -> Result<ParseResult, ParseError>;
}

/// Outcome of running a parser through the partial-success boundary.
#[derive(Debug)]
pub struct ParseOutcome {
    pub status: ParseStatus,
    pub batch: EntityBatch,
    pub error: Option<String>,
}

/// Run a parser and translate every failure mode into a recorded outcome.
///
/// - parser error (or panic) → `ParseFailed`, zero entities
/// - no entities produced → `EmptyOutput`
/// - otherwise → `Parsed` with the batch to upsert
pub fn run_parser(parser: &dyn Parser, output: &str, ctx: &ParseContext) -> ParseOutcome {
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        parser.parse(output, ctx)
    }));

    match result {
        Ok(Ok(parsed)) if parsed.is_empty() => ParseOutcome {
            status: ParseStatus::EmptyOutput,
            batch: EntityBatch::default(),
            error: None,
        },
        Ok(Ok(parsed)) => ParseOutcome {
            status: ParseStatus::Parsed,
            batch: EntityBatch {
                entities: parsed.entities,
                relationships: parsed.relationships,
            },
            error: None,
        },
        Ok(Err(err)) => ParseOutcome {
            status: ParseStatus::ParseFailed,
            batch: EntityBatch::default(),
            error: Some(format!("Parser error: {err}")),
        },
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "parser panicked".to_string());
            ParseOutcome {
                status: ParseStatus::ParseFailed,
                batch: EntityBatch::default(),
                error: Some(format!("Parser panic: {message}")),
            }
        }
    }
}

/// Registry binding tool ids to their parsers.
pub struct ParserRegistry {
    parsers: HashMap<String, Box<dyn Parser>>,
    fallback: Box<dyn Parser>,
}

impl ParserRegistry {
    /// Empty registry with the generic text parser as fallback.
    pub fn new() -> Self {
        Self {
            parsers: HashMap::new(),
            fallback: Box::new(GenericTextParser),
        }
    }

    /// Registry with all built-in tool parsers bound.
    pub fn with_default_parsers() -> Self {
        let mut registry = Self::new();
        registry.register("ping", Box::new(PingParser));
        registry.register("nmap_host_sweep", Box::new(NmapHostSweepParser));
        registry.register("nmap_port_scan", Box::new(NmapPortScanParser));
        registry.register("nmap_service_detection", Box::new(NmapPortScanParser));
        registry.register("gobuster_dir", Box::new(GobusterDirParser));
        registry.register("dns_lookup", Box::new(DnsLookupParser));
        registry
    }

    pub fn register(&mut self, tool_id: impl Into<String>, parser: Box<dyn Parser>) {
        self.parsers.insert(tool_id.into(), parser);
    }

    /// Look up a tool's parser, falling back to the generic text parser
    /// (which yields no entities) for placeholder tools.
    pub fn get(&self, tool_id: &str) -> &dyn Parser {
        self.parsers
            .get(tool_id)
            .map(Box::as_ref)
            .unwrap_or(self.fallback.as_ref())
    }

    pub fn is_registered(&self, tool_id: &str) -> bool {
        self.parsers.contains_key(tool_id)
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_default_parsers()
    }
}

// ---------------------------------------------------------------------------
// Entity construction helpers used by the parsers. All ids go through the
// id generator; parsers never format ids themselves.
// ---------------------------------------------------------------------------

/// Host entity with canonical id.
pub fn make_host(
    ip: &str,
    discovered_by: &str,
    confidence: f64,
    response_time_ms: Option<f64>,
) -> Result<Entity, ParseError> {
    let data = HostData {
        ip_address: ip.to_string(),
        is_alive: true,
        response_time_ms,
        discovered_by: discovered_by.to_string(),
        ..Default::default()
    };
    Entity::new(ids::host_id(ip), EntityKind::Host, &data, confidence)
        .map_err(|e| ParseError::new(e.to_string()))
}

/// Port entity with canonical id.
pub fn make_port(
    ip: &str,
    port: u16,
    protocol: Protocol,
    state: PortState,
    discovered_by: &str,
) -> Result<Entity, ParseError> {
    let data = PortData {
        host_id: ids::host_id(ip),
        port,
        protocol,
        state,
        discovered_by: discovered_by.to_string(),
        ..Default::default()
    };
    Entity::new(
        ids::port_id(ip, port, protocol.as_str()),
        EntityKind::Port,
        &data,
        1.0,
    )
    .map_err(|e| ParseError::new(e.to_string()))
}

/// Service entity with canonical id derived from its port.
pub fn make_service(
    port_id: &str,
    name: &str,
    version: Option<String>,
    banner: Option<String>,
    discovered_by: &str,
) -> Result<Entity, ParseError> {
    let normalized = helpers::normalize_service_name(name);
    let data = ServiceData {
        port_id: port_id.to_string(),
        name: normalized.clone(),
        version,
        banner,
        discovered_by: discovered_by.to_string(),
        ..Default::default()
    };
    Entity::new(
        ids::service_id(port_id, &normalized),
        EntityKind::Service,
        &data,
        1.0,
    )
    .map_err(|e| ParseError::new(e.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    struct FailingParser;
    impl Parser for FailingParser {
        fn parse(&self, _output: &str, _ctx: &ParseContext) -> Result<ParseResult, ParseError> {
            Err(ParseError::new("deliberately broken"))
        }
    }

    struct PanickingParser;
    impl Parser for PanickingParser {
        fn parse(&self, _output: &str, _ctx: &ParseContext) -> Result<ParseResult, ParseError> {
            panic!("index out of range");
        }
    }

    #[test]
    fn test_run_parser_translates_error_to_parse_failed() {
        let ctx = ParseContext::new("broken_tool", "10.0.0.1");
        let outcome = run_parser(&FailingParser, "some output", &ctx);
        assert_eq!(outcome.status, ParseStatus::ParseFailed);
        assert!(outcome.batch.is_empty());
        assert!(outcome.error.expect("should carry error").contains("broken"));
    }

    #[test]
    fn test_run_parser_catches_panics() {
        let ctx = ParseContext::new("panicky_tool", "10.0.0.1");
        let outcome = run_parser(&PanickingParser, "some output", &ctx);
        assert_eq!(outcome.status, ParseStatus::ParseFailed);
        assert!(outcome.batch.is_empty());
        assert!(outcome
            .error
            .expect("should carry error")
            .contains("index out of range"));
    }

    #[test]
    fn test_run_parser_empty_result_is_empty_output() {
        let ctx = ParseContext::new("whois_lookup", "example.com");
        let outcome = run_parser(&GenericTextParser, "Registrar: EXAMPLE-REG", &ctx);
        assert_eq!(outcome.status, ParseStatus::EmptyOutput);
        assert!(outcome.batch.is_empty());
        assert!(outcome.error.is_none());
    }

    #[test]
    fn test_registry_falls_back_to_generic() {
        let registry = ParserRegistry::with_default_parsers();
        assert!(registry.is_registered("ping"));
        assert!(registry.is_registered("nmap_port_scan"));
        assert!(!registry.is_registered("whois_lookup"));

        // Unregistered tools still parse (to no entities)
        let ctx = ParseContext::new("whois_lookup", "example.com");
        let outcome = run_parser(registry.get("whois_lookup"), "anything", &ctx);
        assert_eq!(outcome.status, ParseStatus::EmptyOutput);
    }

    #[test]
    fn test_two_parsers_agree_on_host_id() {
        // The same observation through different helpers yields one id
        let a = make_host("192.168.1.7", "ping", 0.95, Some(0.4)).expect("should build");
        let b = make_host("192.168.1.7", "nmap_host_sweep", 1.0, None).expect("should build");
        assert_eq!(a.id, b.id);
    }
}
