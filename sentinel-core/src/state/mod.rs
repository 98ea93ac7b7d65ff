//! Knowledge store: entities, relationships, and execution history

pub mod migrations;
pub mod models;
pub mod schema;
pub mod store;

pub use migrations::run_migrations;
pub use models::{
    CertificateData, CredentialData, CredentialKind, DnsRecordData, Entity, EntityBatch,
    EntityKind, EntityStatus, ExecutionRecord, ExecutionStatus, FileData, HostData, ParseStatus,
    PortData, PortState, Protocol, Relationship, RelationshipKind, ResourceKind, ServiceData,
    Severity, VulnerabilityData, WebResourceData,
};
pub use store::{KnowledgeStore, StoreStats};
