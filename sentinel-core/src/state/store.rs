//! Embedded knowledge store
//!
//! Single-writer SQLite persistence for entities, relationships, and the
//! execution history. Knowledge writes are atomic per batch; history writes
//! always commit, independent of parse outcome.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::ids;
use crate::state::models::{format_ts, parse_ts};
use crate::state::{
    run_migrations, Entity, EntityBatch, EntityKind, ExecutionRecord, ExecutionStatus, ParseStatus,
    RelationshipKind,
};
use crate::{Error, Result};

/// Set-valued payload fields that merge by union
const SET_KEYS: &[&str] = &["tags", "hostnames", "sans", "technologies"];

/// Store statistics
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub entities_by_kind: BTreeMap<String, u64>,
    pub total_executions: u64,
}

impl StoreStats {
    pub fn total_entities(&self) -> u64 {
        self.entities_by_kind.values().sum()
    }
}

/// Embedded knowledge store backed by a single SQLite connection.
pub struct KnowledgeStore {
    conn: Connection,
    db_path: Option<PathBuf>,
    config: StoreConfig,
    inserts_since_prune: u64,
    last_prune: Instant,
}

impl KnowledgeStore {
    /// Open (or create) the store at the configured path.
    pub fn open(config: StoreConfig) -> Result<Self> {
        if let Some(parent) = config.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&config.db_path)?;
        run_migrations(&conn)?;
        Ok(Self {
            conn,
            db_path: Some(config.db_path.clone()),
            config,
            inserts_since_prune: 0,
            last_prune: Instant::now(),
        })
    }

    /// Open an in-memory store (tests and dry runs). Checkpointing is
    /// unavailable without a backing file.
    pub fn open_in_memory(config: StoreConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(Self {
            conn,
            db_path: None,
            config,
            inserts_since_prune: 0,
            last_prune: Instant::now(),
        })
    }

    // -- knowledge writes ---------------------------------------------------

    /// Atomically upsert a batch of entities and relationships.
    ///
    /// Within the transaction each entity is inserted if absent or merged if
    /// present: higher confidence wins scalar fields, newer `updated_at` wins
    /// the mutable status, set-valued fields are unioned. Relationships are
    /// inserted with `INSERT OR IGNORE` after both endpoints are verified to
    /// exist. Any failure rolls back the whole batch.
    ///
    /// Transient database errors are retried once, then surfaced.
    pub fn upsert_entities(&mut self, batch: &EntityBatch) -> Result<u64> {
        match self.upsert_once(batch) {
            Err(Error::Database(e)) => {
                warn!("upsert failed, retrying once: {}", e);
                self.upsert_once(batch)
            }
            other => other,
        }
        .inspect(|n| {
            self.inserts_since_prune += n;
            let _ = self.maybe_prune();
        })
    }

    fn upsert_once(&mut self, batch: &EntityBatch) -> Result<u64> {
        let tx = self.conn.transaction()?;
        let mut written = 0u64;

        for entity in &batch.entities {
            ids::validate(entity.kind, &entity.id)?;

            let existing = tx
                .query_row(
                    "SELECT id, kind, created_at, updated_at, confidence, data
                     FROM entities WHERE id = ?1",
                    [&entity.id],
                    entity_from_row,
                )
                .optional()?;

            let merged = match existing {
                Some(current) => merge_entities(&current, entity)?,
                None => entity.clone(),
            };

            tx.execute(
                "INSERT OR REPLACE INTO entities (id, kind, created_at, updated_at, confidence, data)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    merged.id,
                    merged.kind.as_str(),
                    format_ts(merged.created_at),
                    format_ts(merged.updated_at),
                    merged.confidence,
                    serde_json::to_string(&merged.data)?,
                ],
            )?;
            written += 1;
        }

        for rel in &batch.relationships {
            for endpoint in [&rel.parent_id, &rel.child_id] {
                let exists: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM entities WHERE id = ?1)",
                    [endpoint],
                    |row| row.get(0),
                )?;
                if !exists {
                    // Transaction dropped here, rolling back the batch
                    return Err(Error::ConstraintViolation(format!(
                        "relationship endpoint does not exist: {endpoint}"
                    )));
                }
            }
            tx.execute(
                "INSERT OR IGNORE INTO entity_relationships (parent_id, child_id, kind, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    rel.parent_id,
                    rel.child_id,
                    rel.kind.as_str(),
                    format_ts(Utc::now()),
                ],
            )?;
        }

        tx.commit()?;
        Ok(written)
    }

    // -- execution history --------------------------------------------------

    /// Record one tool invocation. Always commits, independent of the parse
    /// outcome; this is the audit trail the planner consults.
    pub fn record_execution(&mut self, record: &ExecutionRecord) -> Result<()> {
        match self.record_once(record) {
            Err(Error::Database(e)) => {
                warn!("record_execution failed, retrying once: {}", e);
                self.record_once(record)
            }
            other => other,
        }
    }

    fn record_once(&self, record: &ExecutionRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO tool_executions
             (execution_id, tool_id, stage_id, target, execution_status, parse_status,
              raw_stdout_path, raw_stderr_path, started_at, completed_at,
              entities_created, error_message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                record.execution_id,
                record.tool_id,
                record.stage_id,
                record.target,
                record.execution_status.as_str(),
                record.parse_status.as_str(),
                record.raw_stdout_path,
                record.raw_stderr_path,
                format_ts(record.started_at),
                format_ts(record.completed_at),
                record.entities_created as i64,
                record.error_message,
            ],
        )?;
        Ok(())
    }

    // -- pruning ------------------------------------------------------------

    /// Delete entities not updated within `ttl`; relationships cascade.
    pub fn prune(&mut self, ttl: Duration) -> Result<u64> {
        let cutoff = format_ts(Utc::now() - ttl);
        let deleted = self
            .conn
            .execute("DELETE FROM entities WHERE updated_at < ?1", [&cutoff])?;
        if deleted > 0 {
            debug!("pruned {} stale entities", deleted);
        }
        self.inserts_since_prune = 0;
        self.last_prune = Instant::now();
        Ok(deleted as u64)
    }

    /// Prune when either the insert counter or the wall-clock interval says
    /// so. Called automatically after each upsert.
    pub fn maybe_prune(&mut self) -> Result<u64> {
        let by_inserts = self.inserts_since_prune >= self.config.prune_every_inserts;
        let by_time = self.last_prune.elapsed().as_secs() >= self.config.prune_every_secs;
        if by_inserts || by_time {
            self.prune(Duration::seconds(self.config.entity_ttl_secs as i64))
        } else {
            Ok(0)
        }
    }

    // -- checkpoint / restore -----------------------------------------------

    /// Write a byte-identical copy of the backing store to `path`.
    pub fn checkpoint(&self, path: impl AsRef<Path>) -> Result<()> {
        let db_path = self.backing_path()?;
        // Fold the WAL into the main file so the copy is self-contained
        self.conn
            .execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        std::fs::copy(db_path, path.as_ref())?;
        Ok(())
    }

    /// Replace the backing store with a checkpoint file and reopen.
    pub fn restore(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let db_path = self.backing_path()?.to_path_buf();
        // Close the current connection before overwriting the file
        let placeholder = Connection::open_in_memory()?;
        let old = std::mem::replace(&mut self.conn, placeholder);
        drop(old);

        // Stale WAL/SHM files would shadow the restored content
        for suffix in ["-wal", "-shm"] {
            let mut side = db_path.as_os_str().to_owned();
            side.push(suffix);
            let _ = std::fs::remove_file(PathBuf::from(side));
        }

        std::fs::copy(path.as_ref(), &db_path)?;
        let conn = Connection::open(&db_path)?;
        run_migrations(&conn)?;
        self.conn = conn;
        Ok(())
    }

    fn backing_path(&self) -> Result<&Path> {
        self.db_path
            .as_deref()
            .ok_or_else(|| Error::Config("checkpoint requires a file-backed store".to_string()))
    }

    // -- entity queries -----------------------------------------------------

    /// Fetch a single entity by id.
    pub fn entity(&self, id: &str) -> Result<Option<Entity>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, kind, created_at, updated_at, confidence, data
                 FROM entities WHERE id = ?1",
                [id],
                entity_from_row,
            )
            .optional()?)
    }

    /// All entities of a kind.
    pub fn entities_by_kind(&self, kind: EntityKind) -> Result<Vec<Entity>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, kind, created_at, updated_at, confidence, data
             FROM entities WHERE kind = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map([kind.as_str()], entity_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Child entities of a parent via a relationship kind.
    pub fn children(&self, parent_id: &str, kind: RelationshipKind) -> Result<Vec<Entity>> {
        let mut stmt = self.conn.prepare(
            "SELECT e.id, e.kind, e.created_at, e.updated_at, e.confidence, e.data
             FROM entities e
             JOIN entity_relationships r ON r.child_id = e.id
             WHERE r.parent_id = ?1 AND r.kind = ?2
             ORDER BY e.id",
        )?;
        let rows = stmt.query_map(params![parent_id, kind.as_str()], entity_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    // -- history queries ----------------------------------------------------

    /// Whether a tool ran against a target with a success or partial outcome.
    pub fn has_tool_executed(&self, tool_id: &str, target: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM tool_executions
                 WHERE tool_id = ?1 AND target = ?2
                   AND execution_status IN ('success', 'partial')
                 LIMIT 1",
                params![tool_id, target],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Most recent execution of a tool against a target.
    pub fn last_execution(&self, tool_id: &str, target: &str) -> Result<Option<ExecutionRecord>> {
        Ok(self
            .conn
            .query_row(
                "SELECT execution_id, tool_id, stage_id, target, execution_status, parse_status,
                        raw_stdout_path, raw_stderr_path, started_at, completed_at,
                        entities_created, error_message
                 FROM tool_executions
                 WHERE tool_id = ?1 AND target = ?2
                 ORDER BY completed_at DESC LIMIT 1",
                params![tool_id, target],
                record_from_row,
            )
            .optional()?)
    }

    /// Whether the most recent run of a tool both succeeded and parsed.
    ///
    /// The planner consults this, never entity counts, to decide whether a
    /// step already ran.
    pub fn has_successful_parse(&self, tool_id: &str, target: &str) -> Result<bool> {
        Ok(self
            .last_execution(tool_id, target)?
            .map(|record| {
                record.execution_status == ExecutionStatus::Success
                    && record.parse_status == ParseStatus::Parsed
            })
            .unwrap_or(false))
    }

    /// All executions, newest first, optionally filtered by tool.
    pub fn executions(&self, tool_id: Option<&str>) -> Result<Vec<ExecutionRecord>> {
        let base = "SELECT execution_id, tool_id, stage_id, target, execution_status, parse_status,
                           raw_stdout_path, raw_stderr_path, started_at, completed_at,
                           entities_created, error_message
                    FROM tool_executions";
        let records = match tool_id {
            Some(tool) => {
                let mut stmt = self
                    .conn
                    .prepare(&format!("{base} WHERE tool_id = ?1 ORDER BY started_at DESC"))?;
                let rows = stmt.query_map([tool], record_from_row)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = self.conn.prepare(&format!("{base} ORDER BY started_at DESC"))?;
                let rows = stmt.query_map([], record_from_row)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
        };
        Ok(records)
    }

    /// Entity counts by kind and total execution count.
    pub fn stats(&self) -> Result<StoreStats> {
        let mut stats = StoreStats::default();

        let mut stmt = self
            .conn
            .prepare("SELECT kind, COUNT(*) FROM entities GROUP BY kind")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
        })?;
        for row in rows {
            let (kind, count) = row?;
            stats.entities_by_kind.insert(kind, count);
        }

        stats.total_executions =
            self.conn
                .query_row("SELECT COUNT(*) FROM tool_executions", [], |row| row.get(0))?;

        Ok(stats)
    }
}

fn entity_from_row(row: &Row<'_>) -> rusqlite::Result<Entity> {
    let kind_str: String = row.get(1)?;
    let created_str: String = row.get(2)?;
    let updated_str: String = row.get(3)?;
    let data_str: String = row.get(5)?;

    Ok(Entity {
        id: row.get(0)?,
        kind: EntityKind::from_str(&kind_str).unwrap_or(EntityKind::Host),
        created_at: parse_ts(&created_str).unwrap_or_else(|_| Utc::now()),
        updated_at: parse_ts(&updated_str).unwrap_or_else(|_| Utc::now()),
        confidence: row.get(4)?,
        data: serde_json::from_str(&data_str).unwrap_or(Value::Null),
    })
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<ExecutionRecord> {
    let exec_status: String = row.get(4)?;
    let parse_status: String = row.get(5)?;
    let started_str: String = row.get(8)?;
    let completed_str: String = row.get(9)?;
    let entities_created: i64 = row.get(10)?;

    Ok(ExecutionRecord {
        execution_id: row.get(0)?,
        tool_id: row.get(1)?,
        stage_id: row.get(2)?,
        target: row.get(3)?,
        execution_status: ExecutionStatus::from_str(&exec_status)
            .unwrap_or(ExecutionStatus::Failed),
        parse_status: ParseStatus::from_str(&parse_status).unwrap_or(ParseStatus::ParseFailed),
        raw_stdout_path: row.get(6)?,
        raw_stderr_path: row.get(7)?,
        started_at: parse_ts(&started_str).unwrap_or_else(|_| Utc::now()),
        completed_at: parse_ts(&completed_str).unwrap_or_else(|_| Utc::now()),
        entities_created: entities_created.max(0) as u64,
        error_message: row.get(11)?,
    })
}

/// Merge an incoming entity into the stored one.
///
/// Rule 1: higher confidence wins scalar fields. Rule 2: newer `updated_at`
/// wins the mutable status. Rule 3: set-valued fields are unioned.
fn merge_entities(current: &Entity, incoming: &Entity) -> Result<Entity> {
    let incoming_wins = incoming.confidence > current.confidence
        || (incoming.confidence == current.confidence
            && incoming.updated_at >= current.updated_at);

    let (winner, loser) = if incoming_wins {
        (incoming, current)
    } else {
        (current, incoming)
    };

    let mut data = match loser.data.as_object() {
        Some(map) => map.clone(),
        None => serde_json::Map::new(),
    };
    if let Some(winner_map) = winner.data.as_object() {
        for (key, value) in winner_map {
            data.insert(key.clone(), value.clone());
        }
    }

    for key in SET_KEYS {
        let merged = union_string_arrays(
            current.data.get(*key),
            incoming.data.get(*key),
        );
        if let Some(values) = merged {
            data.insert((*key).to_string(), values);
        }
    }

    // Mutable status follows the most recent observation
    let newer = if incoming.updated_at >= current.updated_at {
        incoming
    } else {
        current
    };
    if let Some(status) = newer.data.get("status") {
        data.insert("status".to_string(), status.clone());
    }

    Ok(Entity {
        id: current.id.clone(),
        kind: current.kind,
        created_at: current.created_at.min(incoming.created_at),
        updated_at: current.updated_at.max(incoming.updated_at),
        confidence: current.confidence.max(incoming.confidence),
        data: Value::Object(data),
    })
}

fn union_string_arrays(a: Option<&Value>, b: Option<&Value>) -> Option<Value> {
    let mut set: std::collections::BTreeSet<String> = std::collections::BTreeSet::new();
    let mut seen_any = false;
    for value in [a, b].into_iter().flatten() {
        if let Some(items) = value.as_array() {
            seen_any = true;
            for item in items {
                if let Some(s) = item.as_str() {
                    set.insert(s.to_string());
                }
            }
        }
    }
    seen_any.then(|| Value::Array(set.into_iter().map(Value::String).collect()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::state::{HostData, PortData, PortState, Protocol, Relationship};
    use tempfile::TempDir;

    fn memory_store() -> KnowledgeStore {
        KnowledgeStore::open_in_memory(StoreConfig::default()).expect("should open store")
    }

    fn host_entity(ip: &str, confidence: f64) -> Entity {
        let data = HostData {
            ip_address: ip.to_string(),
            is_alive: true,
            discovered_by: "test".to_string(),
            ..Default::default()
        };
        Entity::new(ids::host_id(ip), EntityKind::Host, &data, confidence)
            .expect("should build host entity")
    }

    fn port_entity(ip: &str, port: u16) -> Entity {
        let data = PortData {
            host_id: ids::host_id(ip),
            port,
            protocol: Protocol::Tcp,
            state: PortState::Open,
            discovered_by: "test".to_string(),
            ..Default::default()
        };
        Entity::new(
            ids::port_id(ip, port, "tcp"),
            EntityKind::Port,
            &data,
            1.0,
        )
        .expect("should build port entity")
    }

    #[test]
    fn test_insert_and_query_round_trip() {
        let mut store = memory_store();
        let batch = EntityBatch {
            entities: vec![host_entity("192.168.1.1", 0.95)],
            relationships: vec![],
        };
        assert_eq!(store.upsert_entities(&batch).expect("should upsert"), 1);

        let entity = store
            .entity("host_192_168_1_1")
            .expect("should query")
            .expect("should exist");
        assert_eq!(entity.kind, EntityKind::Host);
        assert_eq!(entity.confidence, 0.95);
        let data: HostData = entity.payload().expect("should deserialize");
        assert_eq!(data.ip_address, "192.168.1.1");
    }

    #[test]
    fn test_upsert_merges_same_id() {
        let mut store = memory_store();

        let mut first = host_entity("10.0.0.1", 0.5);
        first.data["tags"] = serde_json::json!(["icmp"]);
        store
            .upsert_entities(&EntityBatch {
                entities: vec![first],
                relationships: vec![],
            })
            .expect("should upsert");

        let mut second = host_entity("10.0.0.1", 0.9);
        second.data["tags"] = serde_json::json!(["syn-scan"]);
        second.data["os_family"] = serde_json::json!("Linux");
        store
            .upsert_entities(&EntityBatch {
                entities: vec![second],
                relationships: vec![],
            })
            .expect("should upsert");

        let all = store
            .entities_by_kind(EntityKind::Host)
            .expect("should query");
        assert_eq!(all.len(), 1, "same id should merge, not duplicate");

        let merged = &all[0];
        assert_eq!(merged.confidence, 0.9);
        assert_eq!(merged.data["os_family"], "Linux");
        let tags: Vec<String> =
            serde_json::from_value(merged.data["tags"].clone()).expect("should read tags");
        assert_eq!(tags, vec!["icmp".to_string(), "syn-scan".to_string()]);
    }

    #[test]
    fn test_lower_confidence_does_not_overwrite_scalars() {
        let mut store = memory_store();

        let mut strong = host_entity("10.0.0.2", 0.9);
        strong.data["os_family"] = serde_json::json!("Linux");
        store
            .upsert_entities(&EntityBatch {
                entities: vec![strong],
                relationships: vec![],
            })
            .expect("should upsert");

        let mut weak = host_entity("10.0.0.2", 0.3);
        weak.data["os_family"] = serde_json::json!("Windows");
        store
            .upsert_entities(&EntityBatch {
                entities: vec![weak],
                relationships: vec![],
            })
            .expect("should upsert");

        let entity = store
            .entity(&ids::host_id("10.0.0.2"))
            .expect("should query")
            .expect("should exist");
        assert_eq!(entity.data["os_family"], "Linux");
        assert_eq!(entity.confidence, 0.9);
    }

    #[test]
    fn test_updated_at_is_monotonic_across_merges() {
        let mut store = memory_store();
        let first = host_entity("10.0.0.3", 0.8);
        let created = first.created_at;
        store
            .upsert_entities(&EntityBatch {
                entities: vec![first],
                relationships: vec![],
            })
            .expect("should upsert");

        let mut second = host_entity("10.0.0.3", 0.8);
        second.updated_at = second.updated_at + Duration::seconds(10);
        store
            .upsert_entities(&EntityBatch {
                entities: vec![second],
                relationships: vec![],
            })
            .expect("should upsert");

        let entity = store
            .entity(&ids::host_id("10.0.0.3"))
            .expect("should query")
            .expect("should exist");
        assert!(entity.updated_at >= entity.created_at);
        assert!(entity.updated_at > created);
    }

    #[test]
    fn test_relationships_and_children() {
        let mut store = memory_store();
        let batch = EntityBatch {
            entities: vec![
                host_entity("192.168.1.10", 1.0),
                port_entity("192.168.1.10", 22),
                port_entity("192.168.1.10", 80),
            ],
            relationships: vec![
                Relationship::new(
                    ids::host_id("192.168.1.10"),
                    ids::port_id("192.168.1.10", 22, "tcp"),
                    RelationshipKind::HasPort,
                ),
                Relationship::new(
                    ids::host_id("192.168.1.10"),
                    ids::port_id("192.168.1.10", 80, "tcp"),
                    RelationshipKind::HasPort,
                ),
            ],
        };
        store.upsert_entities(&batch).expect("should upsert");

        let ports = store
            .children(&ids::host_id("192.168.1.10"), RelationshipKind::HasPort)
            .expect("should query children");
        assert_eq!(ports.len(), 2);
        assert!(ports
            .iter()
            .any(|p| p.id == "host_192_168_1_10_port_22_tcp"));
    }

    #[test]
    fn test_orphan_relationship_rolls_back_batch() {
        let mut store = memory_store();
        let batch = EntityBatch {
            entities: vec![host_entity("10.1.1.1", 1.0)],
            relationships: vec![Relationship::new(
                ids::host_id("10.1.1.1"),
                "host_10_1_1_1_port_22_tcp",
                RelationshipKind::HasPort,
            )],
        };

        let err = store.upsert_entities(&batch).unwrap_err();
        assert!(matches!(err, Error::ConstraintViolation(_)));

        // The whole batch must have rolled back, including the valid host
        assert!(store
            .entity(&ids::host_id("10.1.1.1"))
            .expect("should query")
            .is_none());
    }

    #[test]
    fn test_invalid_id_rejected_at_insert() {
        let mut store = memory_store();
        let bogus = Entity::new(
            "host-not-canonical",
            EntityKind::Host,
            serde_json::json!({}),
            1.0,
        )
        .expect("should build");

        let err = store
            .upsert_entities(&EntityBatch {
                entities: vec![bogus],
                relationships: vec![],
            })
            .unwrap_err();
        assert!(matches!(err, Error::InvalidId { .. }));
    }

    #[test]
    fn test_prune_deletes_stale_and_cascades() {
        let mut store = memory_store();

        let mut stale = host_entity("10.2.2.2", 1.0);
        stale.created_at = Utc::now() - Duration::hours(3);
        stale.updated_at = Utc::now() - Duration::hours(2);
        let mut stale_port = port_entity("10.2.2.2", 22);
        stale_port.created_at = stale.created_at;
        stale_port.updated_at = stale.updated_at;
        let fresh = host_entity("10.2.2.3", 1.0);

        store
            .upsert_entities(&EntityBatch {
                entities: vec![stale, stale_port, fresh],
                relationships: vec![Relationship::new(
                    ids::host_id("10.2.2.2"),
                    ids::port_id("10.2.2.2", 22, "tcp"),
                    RelationshipKind::HasPort,
                )],
            })
            .expect("should upsert");

        let deleted = store.prune(Duration::hours(1)).expect("should prune");
        assert_eq!(deleted, 2);

        assert!(store
            .entity(&ids::host_id("10.2.2.2"))
            .expect("should query")
            .is_none());
        assert!(store
            .entity(&ids::host_id("10.2.2.3"))
            .expect("should query")
            .is_some());

        // Relationship rows cascade with the pruned parent
        let rel_count: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM entity_relationships", [], |row| {
                row.get(0)
            })
            .expect("should count");
        assert_eq!(rel_count, 0);
    }

    #[test]
    fn test_execution_history_queries() {
        let mut store = memory_store();

        let mut record = ExecutionRecord::new("nmap_port_scan", "192.168.1.10");
        record.execution_status = ExecutionStatus::Success;
        record.parse_status = ParseStatus::Parsed;
        record.entities_created = 3;
        store.record_execution(&record).expect("should record");

        assert!(store
            .has_tool_executed("nmap_port_scan", "192.168.1.10")
            .expect("should query"));
        assert!(!store
            .has_tool_executed("nmap_port_scan", "192.168.1.11")
            .expect("should query"));
        assert!(store
            .has_successful_parse("nmap_port_scan", "192.168.1.10")
            .expect("should query"));

        let last = store
            .last_execution("nmap_port_scan", "192.168.1.10")
            .expect("should query")
            .expect("should exist");
        assert_eq!(last.entities_created, 3);
    }

    #[test]
    fn test_parse_failed_execution_not_a_successful_parse() {
        let mut store = memory_store();

        let mut record = ExecutionRecord::new("nmap_port_scan", "192.168.1.20");
        record.execution_status = ExecutionStatus::Partial;
        record.parse_status = ParseStatus::ParseFailed;
        record.entities_created = 0;
        record.raw_stdout_path = Some("/tmp/sentinel/abc/stdout.log".to_string());
        store.record_execution(&record).expect("should record");

        // Executed (partial counts), but never a successful parse
        assert!(store
            .has_tool_executed("nmap_port_scan", "192.168.1.20")
            .expect("should query"));
        assert!(!store
            .has_successful_parse("nmap_port_scan", "192.168.1.20")
            .expect("should query"));

        let last = store
            .last_execution("nmap_port_scan", "192.168.1.20")
            .expect("should query")
            .expect("should exist");
        assert_eq!(last.entities_created, 0);
        assert!(last.raw_stdout_path.is_some());
    }

    #[test]
    fn test_checkpoint_restore_round_trip() {
        let temp = TempDir::new().expect("should create temp dir");
        let config = StoreConfig {
            db_path: temp.path().join("state.db"),
            ..Default::default()
        };
        let mut store = KnowledgeStore::open(config).expect("should open");

        store
            .upsert_entities(&EntityBatch {
                entities: vec![host_entity("192.168.1.50", 1.0)],
                relationships: vec![],
            })
            .expect("should upsert");

        let checkpoint = temp.path().join("checkpoint.db");
        store.checkpoint(&checkpoint).expect("should checkpoint");

        // Mutate after checkpoint
        store
            .upsert_entities(&EntityBatch {
                entities: vec![host_entity("192.168.1.51", 1.0)],
                relationships: vec![],
            })
            .expect("should upsert");
        assert_eq!(store.stats().expect("should stat").total_entities(), 2);

        store.restore(&checkpoint).expect("should restore");
        let stats = store.stats().expect("should stat");
        assert_eq!(stats.total_entities(), 1);
        assert!(store
            .entity(&ids::host_id("192.168.1.50"))
            .expect("should query")
            .is_some());
        assert!(store
            .entity(&ids::host_id("192.168.1.51"))
            .expect("should query")
            .is_none());
    }

    #[test]
    fn test_checkpoint_requires_file_backing() {
        let store = memory_store();
        let err = store.checkpoint("/tmp/nope.db").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_stats() {
        let mut store = memory_store();
        store
            .upsert_entities(&EntityBatch {
                entities: vec![
                    host_entity("10.9.9.1", 1.0),
                    host_entity("10.9.9.2", 1.0),
                    port_entity("10.9.9.1", 80),
                ],
                relationships: vec![],
            })
            .expect("should upsert");

        let stats = store.stats().expect("should stat");
        assert_eq!(stats.entities_by_kind.get("host"), Some(&2));
        assert_eq!(stats.entities_by_kind.get("port"), Some(&1));
        assert_eq!(stats.total_entities(), 3);
    }
}
