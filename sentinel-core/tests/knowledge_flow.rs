//! Parser → store → history integration properties

use sentinel_core::config::StoreConfig;
use sentinel_core::ids;
use sentinel_core::parsers::{
    run_parser, NmapHostSweepParser, NmapPortScanParser, ParseContext, PingParser,
};
use sentinel_core::state::{
    EntityKind, ExecutionRecord, ExecutionStatus, HostData, KnowledgeStore, ParseStatus,
    RelationshipKind,
};
use tempfile::TempDir;

const PING_OUTPUT: &str = "\
PING 192.168.1.7 (192.168.1.7) 56(84) bytes of data.
64 bytes from 192.168.1.7: icmp_seq=1 ttl=64 time=0.311 ms
";

const SWEEP_OUTPUT: &str = "\
Starting Nmap 7.94 ( https://nmap.org ) at 2026-08-02 10:00 UTC
Nmap scan report for 192.168.1.7
Host is up (0.00031s latency).
Nmap done: 1 IP address (1 host up) scanned in 2.05 seconds
";

const PORT_SCAN_OUTPUT: &str = "\
Starting Nmap 7.94 ( https://nmap.org ) at 2026-08-02 10:10 UTC
Nmap scan report for 192.168.1.7
Host is up (0.00044s latency).
PORT   STATE SERVICE
22/tcp open  ssh
80/tcp open  http
Nmap done: 1 IP address (1 host up) scanned in 0.91 seconds
";

fn memory_store() -> KnowledgeStore {
    KnowledgeStore::open_in_memory(StoreConfig::default()).expect("should open store")
}

#[test]
fn test_two_parsers_one_observation_one_entity() {
    let mut store = memory_store();

    // Ping sees the host first
    let ping_outcome = run_parser(
        &PingParser,
        PING_OUTPUT,
        &ParseContext::new("ping", "192.168.1.7"),
    );
    assert_eq!(ping_outcome.status, ParseStatus::Parsed);
    store
        .upsert_entities(&ping_outcome.batch)
        .expect("should upsert ping batch");

    // The sweep sees the same host later
    let sweep_outcome = run_parser(
        &NmapHostSweepParser,
        SWEEP_OUTPUT,
        &ParseContext::new("nmap_host_sweep", "192.168.1.0/24"),
    );
    assert_eq!(sweep_outcome.status, ParseStatus::Parsed);
    store
        .upsert_entities(&sweep_outcome.batch)
        .expect("should upsert sweep batch");

    // Same natural key, same id, one merged entity
    let hosts = store
        .entities_by_kind(EntityKind::Host)
        .expect("should query");
    assert_eq!(hosts.len(), 1);
    assert_eq!(hosts[0].id, "host_192_168_1_7");
    // Sweep confidence (1.0) wins over ping (0.95)
    assert_eq!(hosts[0].confidence, 1.0);
}

#[test]
fn test_port_scan_graph_lands_in_store() {
    let mut store = memory_store();
    let outcome = run_parser(
        &NmapPortScanParser,
        PORT_SCAN_OUTPUT,
        &ParseContext::new("nmap_port_scan", "192.168.1.7"),
    );
    assert_eq!(outcome.status, ParseStatus::Parsed);
    let written = store
        .upsert_entities(&outcome.batch)
        .expect("should upsert");
    assert_eq!(written, 5, "1 host + 2 ports + 2 services");

    let ports = store
        .children(&ids::host_id("192.168.1.7"), RelationshipKind::HasPort)
        .expect("should query");
    assert_eq!(ports.len(), 2);
    assert!(ports
        .iter()
        .any(|p| p.id == "host_192_168_1_7_port_22_tcp"));

    let services = store
        .children(
            "host_192_168_1_7_port_80_tcp",
            RelationshipKind::HasService,
        )
        .expect("should query");
    assert_eq!(services.len(), 1);
    assert_eq!(
        services[0].id,
        "host_192_168_1_7_port_80_tcp_service_http"
    );
}

#[test]
fn test_parse_failure_leaves_store_untouched_but_audited() {
    let mut store = memory_store();

    let outcome = run_parser(
        &NmapPortScanParser,
        "core dumped\n",
        &ParseContext::new("nmap_port_scan", "192.168.1.9"),
    );
    assert_eq!(outcome.status, ParseStatus::ParseFailed);
    assert!(outcome.batch.is_empty());

    // The coordinator would record exactly this
    let mut record = ExecutionRecord::new("nmap_port_scan", "192.168.1.9");
    record.execution_status = ExecutionStatus::Partial;
    record.parse_status = outcome.status;
    record.error_message = outcome.error;
    record.raw_stdout_path = Some("/tmp/sentinel/x/stdout.log".to_string());
    store.record_execution(&record).expect("should record");

    assert_eq!(store.stats().expect("stats").total_entities(), 0);
    assert!(store
        .has_tool_executed("nmap_port_scan", "192.168.1.9")
        .expect("query"));
    assert!(!store
        .has_successful_parse("nmap_port_scan", "192.168.1.9")
        .expect("query"));
}

#[test]
fn test_store_round_trip_preserves_payload() {
    let mut store = memory_store();
    let outcome = run_parser(
        &PingParser,
        PING_OUTPUT,
        &ParseContext::new("ping", "192.168.1.7"),
    );
    store.upsert_entities(&outcome.batch).expect("should upsert");

    let entity = store
        .entity("host_192_168_1_7")
        .expect("should query")
        .expect("should exist");
    let data: HostData = entity.payload().expect("should deserialize");
    assert_eq!(data.ip_address, "192.168.1.7");
    assert!(data.is_alive);
    assert_eq!(data.discovered_by, "ping");
    assert!(data.response_time_ms.expect("time") > 0.0);
}

#[test]
fn test_checkpoint_restore_is_byte_identical() {
    let temp = TempDir::new().expect("should create temp dir");
    let config = StoreConfig {
        db_path: temp.path().join("state.db"),
        ..Default::default()
    };
    let mut store = KnowledgeStore::open(config).expect("should open");

    let outcome = run_parser(
        &NmapPortScanParser,
        PORT_SCAN_OUTPUT,
        &ParseContext::new("nmap_port_scan", "192.168.1.7"),
    );
    store.upsert_entities(&outcome.batch).expect("should upsert");

    let first = temp.path().join("first.db");
    store.checkpoint(&first).expect("should checkpoint");

    store.restore(&first).expect("should restore");
    let second = temp.path().join("second.db");
    store.checkpoint(&second).expect("should checkpoint again");

    let bytes_a = std::fs::read(&first).expect("should read first");
    let bytes_b = std::fs::read(&second).expect("should read second");
    assert_eq!(bytes_a, bytes_b, "restore must reproduce the checkpoint");

    // And the knowledge survives
    assert_eq!(store.stats().expect("stats").total_entities(), 5);
}

#[test]
fn test_batch_rollback_keeps_store_consistent() {
    let mut store = memory_store();

    // A batch with a dangling relationship child
    let outcome = run_parser(
        &PingParser,
        PING_OUTPUT,
        &ParseContext::new("ping", "192.168.1.7"),
    );
    let mut batch = outcome.batch;
    batch.relationships.push(sentinel_core::state::Relationship::new(
        "host_192_168_1_7",
        "host_192_168_1_7_port_9999_tcp",
        RelationshipKind::HasPort,
    ));

    let err = store.upsert_entities(&batch).unwrap_err();
    assert!(matches!(
        err,
        sentinel_core::Error::ConstraintViolation(_)
    ));
    assert_eq!(
        store.stats().expect("stats").total_entities(),
        0,
        "no partial knowledge"
    );
}

#[test]
fn test_prune_is_bounded_by_updated_at() {
    let mut store = memory_store();
    let outcome = run_parser(
        &PingParser,
        PING_OUTPUT,
        &ParseContext::new("ping", "192.168.1.7"),
    );
    store.upsert_entities(&outcome.batch).expect("should upsert");

    // Fresh entities survive a TTL prune
    let deleted = store
        .prune(chrono::Duration::hours(1))
        .expect("should prune");
    assert_eq!(deleted, 0);
    assert_eq!(store.stats().expect("stats").total_entities(), 1);

    // A negative TTL moves the cutoff past now and removes everything
    let deleted = store
        .prune(chrono::Duration::seconds(-1))
        .expect("should prune");
    assert_eq!(deleted, 1);
}
