//! Database schema definitions

/// SQL to create all tables
pub const SCHEMA: &str = r#"
-- Knowledge entities (hybrid schema: JSON payload + indexed metadata)
CREATE TABLE IF NOT EXISTS entities (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    confidence REAL NOT NULL DEFAULT 1.0,
    data TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_entities_kind ON entities(kind);
CREATE INDEX IF NOT EXISTS idx_entities_updated_at ON entities(updated_at);
CREATE INDEX IF NOT EXISTS idx_entities_confidence ON entities(confidence);

-- Relationships (parent/child rows, cascade-deleted with the parent)
CREATE TABLE IF NOT EXISTS entity_relationships (
    parent_id TEXT NOT NULL,
    child_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (parent_id, child_id, kind),
    FOREIGN KEY (parent_id) REFERENCES entities(id) ON DELETE CASCADE,
    FOREIGN KEY (child_id) REFERENCES entities(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_rel_parent ON entity_relationships(parent_id, kind);
CREATE INDEX IF NOT EXISTS idx_rel_child ON entity_relationships(child_id, kind);

-- Execution history (audit rows, never merged with knowledge)
CREATE TABLE IF NOT EXISTS tool_executions (
    execution_id TEXT PRIMARY KEY,
    tool_id TEXT NOT NULL,
    stage_id INTEGER,
    target TEXT NOT NULL,
    execution_status TEXT NOT NULL,
    parse_status TEXT NOT NULL,
    raw_stdout_path TEXT,
    raw_stderr_path TEXT,
    started_at TEXT NOT NULL,
    completed_at TEXT NOT NULL,
    entities_created INTEGER NOT NULL DEFAULT 0,
    error_message TEXT
);

CREATE INDEX IF NOT EXISTS idx_exec_tool_id ON tool_executions(tool_id);
CREATE INDEX IF NOT EXISTS idx_exec_status ON tool_executions(execution_status);
CREATE INDEX IF NOT EXISTS idx_exec_started_at ON tool_executions(started_at);
"#;
