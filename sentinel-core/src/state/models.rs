//! Knowledge model types

use std::collections::BTreeSet;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Entity discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Host,
    Port,
    Service,
    Vulnerability,
    WebResource,
    Dns,
    Certificate,
    Credential,
    File,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Host => "host",
            EntityKind::Port => "port",
            EntityKind::Service => "service",
            EntityKind::Vulnerability => "vulnerability",
            EntityKind::WebResource => "web_resource",
            EntityKind::Dns => "dns",
            EntityKind::Certificate => "certificate",
            EntityKind::Credential => "credential",
            EntityKind::File => "file",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "host" => Some(EntityKind::Host),
            "port" => Some(EntityKind::Port),
            "service" => Some(EntityKind::Service),
            "vulnerability" => Some(EntityKind::Vulnerability),
            "web_resource" => Some(EntityKind::WebResource),
            "dns" => Some(EntityKind::Dns),
            "certificate" => Some(EntityKind::Certificate),
            "credential" => Some(EntityKind::Credential),
            "file" => Some(EntityKind::File),
            _ => None,
        }
    }
}

/// Relationship discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    HasPort,
    HasService,
    HasVulnerability,
    HasWebResource,
    ResolvesTo,
}

impl RelationshipKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipKind::HasPort => "has_port",
            RelationshipKind::HasService => "has_service",
            RelationshipKind::HasVulnerability => "has_vulnerability",
            RelationshipKind::HasWebResource => "has_web_resource",
            RelationshipKind::ResolvesTo => "resolves_to",
        }
    }
}

/// Entity lifecycle status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityStatus {
    #[default]
    Discovered,
    Verified,
    Exploited,
    Failed,
    Unreachable,
}

/// Vulnerability severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

/// Port protocol
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "tcp" => Some(Protocol::Tcp),
            "udp" => Some(Protocol::Udp),
            _ => None,
        }
    }
}

/// Port state as reported by a scanner
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortState {
    Open,
    Closed,
    Filtered,
    #[default]
    Unknown,
}

impl PortState {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "open" => PortState::Open,
            "closed" => PortState::Closed,
            "filtered" => PortState::Filtered,
            _ => PortState::Unknown,
        }
    }
}

/// Web resource classification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    #[default]
    Directory,
    File,
    Endpoint,
    Parameter,
}

/// Credential material kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialKind {
    #[default]
    Password,
    Hash,
    Key,
}

// ---------------------------------------------------------------------------
// Typed entity payloads (serialized into the entities.data column)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostData {
    pub ip_address: String,
    #[serde(default)]
    pub hostnames: BTreeSet<String>,
    #[serde(default)]
    pub os_family: Option<String>,
    #[serde(default)]
    pub os_version: Option<String>,
    #[serde(default)]
    pub is_alive: bool,
    #[serde(default)]
    pub last_seen: Option<String>,
    #[serde(default)]
    pub response_time_ms: Option<f64>,
    #[serde(default)]
    pub discovered_by: String,
    #[serde(default)]
    pub status: EntityStatus,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortData {
    pub host_id: String,
    pub port: u16,
    pub protocol: Protocol,
    pub state: PortState,
    #[serde(default)]
    pub discovered_by: String,
    #[serde(default)]
    pub status: EntityStatus,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceData {
    pub port_id: String,
    pub name: String,
    #[serde(default)]
    pub product: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub banner: Option<String>,
    #[serde(default)]
    pub cpe: Option<String>,
    #[serde(default)]
    pub discovered_by: String,
    #[serde(default)]
    pub status: EntityStatus,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VulnerabilityData {
    pub service_id: String,
    /// CVE id or synthetic identifier
    pub vuln_id: String,
    pub severity: Severity,
    #[serde(default)]
    pub cvss: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub exploitable: bool,
    #[serde(default)]
    pub exploit_available: bool,
    #[serde(default)]
    pub exploit_verified: bool,
    #[serde(default)]
    pub discovered_by: String,
    #[serde(default)]
    pub status: EntityStatus,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebResourceData {
    pub service_id: String,
    pub url: String,
    pub resource_kind: ResourceKind,
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub technologies: BTreeSet<String>,
    #[serde(default)]
    pub discovered_by: String,
    #[serde(default)]
    pub status: EntityStatus,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DnsRecordData {
    pub domain: String,
    pub record_type: String,
    pub value: String,
    #[serde(default)]
    pub resolves_to: Option<String>,
    #[serde(default)]
    pub discovered_by: String,
    #[serde(default)]
    pub status: EntityStatus,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CertificateData {
    pub host_id: String,
    pub common_name: String,
    #[serde(default)]
    pub sans: BTreeSet<String>,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub not_before: Option<String>,
    #[serde(default)]
    pub not_after: Option<String>,
    #[serde(default)]
    pub self_signed: bool,
    #[serde(default)]
    pub expired: bool,
    #[serde(default)]
    pub discovered_by: String,
    #[serde(default)]
    pub status: EntityStatus,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

/// Credential material. The secret arrives already encrypted from the
/// credential-loading collaborator; it is excluded from id generation and
/// from Debug output.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct CredentialData {
    pub username: String,
    #[serde(default)]
    pub secret: Option<String>,
    pub kind: CredentialKind,
    pub service_id: String,
    #[serde(default)]
    pub valid: bool,
    #[serde(default)]
    pub discovered_by: String,
    #[serde(default)]
    pub status: EntityStatus,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl std::fmt::Debug for CredentialData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialData")
            .field("username", &self.username)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("kind", &self.kind)
            .field("service_id", &self.service_id)
            .field("valid", &self.valid)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileData {
    pub host_id: String,
    pub path: String,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub discovered_by: String,
    #[serde(default)]
    pub status: EntityStatus,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

// ---------------------------------------------------------------------------
// Entity envelope
// ---------------------------------------------------------------------------

/// A knowledge entity as stored: canonical id, kind discriminator, and a
/// JSON payload holding the kind-specific fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub kind: EntityKind,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub confidence: f64,
    pub data: serde_json::Value,
}

impl Entity {
    /// Build an entity envelope around a serializable payload.
    pub fn new(
        id: impl Into<String>,
        kind: EntityKind,
        data: impl Serialize,
        confidence: f64,
    ) -> crate::Result<Self> {
        let now = Utc::now();
        Ok(Self {
            id: id.into(),
            kind,
            created_at: now,
            updated_at: now,
            confidence: confidence.clamp(0.0, 1.0),
            data: serde_json::to_value(data)?,
        })
    }

    /// Deserialize the payload into its typed form.
    pub fn payload<T: for<'de> Deserialize<'de>>(&self) -> crate::Result<T> {
        Ok(serde_json::from_value(self.data.clone())?)
    }
}

/// A relationship row declared alongside an entity batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub parent_id: String,
    pub child_id: String,
    pub kind: RelationshipKind,
}

impl Relationship {
    pub fn new(
        parent_id: impl Into<String>,
        child_id: impl Into<String>,
        kind: RelationshipKind,
    ) -> Self {
        Self {
            parent_id: parent_id.into(),
            child_id: child_id.into(),
            kind,
        }
    }
}

/// Entities plus relationships committed in one transaction.
#[derive(Debug, Clone, Default)]
pub struct EntityBatch {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
}

impl EntityBatch {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Execution history
// ---------------------------------------------------------------------------

/// Outcome of the tool process itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Failed,
    Partial,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Partial => "partial",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "success" => Some(ExecutionStatus::Success),
            "failed" => Some(ExecutionStatus::Failed),
            "partial" => Some(ExecutionStatus::Partial),
            _ => None,
        }
    }
}

/// Outcome of parsing the tool's output. These are outcomes recorded on the
/// execution row, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStatus {
    Parsed,
    ParseFailed,
    EmptyOutput,
}

impl ParseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseStatus::Parsed => "parsed",
            ParseStatus::ParseFailed => "parse_failed",
            ParseStatus::EmptyOutput => "empty_output",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "parsed" => Some(ParseStatus::Parsed),
            "parse_failed" => Some(ParseStatus::ParseFailed),
            "empty_output" => Some(ParseStatus::EmptyOutput),
            _ => None,
        }
    }
}

/// Immutable audit row describing one tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub execution_id: String,
    pub tool_id: String,
    pub stage_id: Option<i64>,
    pub target: String,
    pub execution_status: ExecutionStatus,
    pub parse_status: ParseStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub entities_created: u64,
    /// Raw stdout path, always retained even on parse failure
    pub raw_stdout_path: Option<String>,
    pub raw_stderr_path: Option<String>,
    pub error_message: Option<String>,
}

impl ExecutionRecord {
    pub fn new(tool_id: impl Into<String>, target: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            execution_id: uuid::Uuid::new_v4().to_string(),
            tool_id: tool_id.into(),
            stage_id: None,
            target: target.into(),
            execution_status: ExecutionStatus::Success,
            parse_status: ParseStatus::EmptyOutput,
            started_at: now,
            completed_at: now,
            entities_created: 0,
            raw_stdout_path: None,
            raw_stderr_path: None,
            error_message: None,
        }
    }

    /// Execution duration
    pub fn duration(&self) -> chrono::Duration {
        self.completed_at - self.started_at
    }
}

/// Format a timestamp the way all tables store it: fixed-width RFC 3339
/// UTC with microseconds, so string comparison matches time order.
pub fn format_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a timestamp written by [`format_ts`].
pub fn parse_ts(s: &str) -> crate::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| crate::Error::Config(format!("Invalid timestamp '{s}': {e}")))
}
