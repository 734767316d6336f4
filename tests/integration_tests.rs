//! Integration tests for smb-walker
//!
//! Note: tests requiring a live SMB peer are out of reach here; these
//! exercise the descriptor-to-graph pipeline, the rule engine, export,
//! and checkpoint round-trips against local data only.

use smb_walker::checkpoint::{self, CheckpointManager};
use smb_walker::graph::{kinds, Edge, GraphContext, GraphStore, Node, RightsSet};
use smb_walker::progress::ScanStats;
use smb_walker::rules::{parse_rule_strings, FileFact, RuleContext, RuleProgram, ShareFact};
use smb_walker::smb::access_mask::SHARE_RIGHTS;
use smb_walker::smb::descriptor::{SecurityDescriptor, SE_DACL_PRESENT, SE_SELF_RELATIVE};
use smb_walker::walker::collector::rights_from_descriptor;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

/// Self-relative descriptor: one ACCESS_ALLOWED ACE for S-1-1-0 with
/// the given mask.
fn descriptor_bytes(mask: u32) -> Vec<u8> {
    let sid = [
        0x01u8, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00,
    ];

    let mut ace = vec![0x00, 0x00];
    ace.extend_from_slice(&((8 + sid.len()) as u16).to_le_bytes());
    ace.extend_from_slice(&mask.to_le_bytes());
    ace.extend_from_slice(&sid);

    let mut acl = vec![0x02, 0x00];
    acl.extend_from_slice(&((8 + ace.len()) as u16).to_le_bytes());
    acl.extend_from_slice(&1u16.to_le_bytes());
    acl.extend_from_slice(&[0x00, 0x00]);
    acl.extend_from_slice(&ace);

    let mut sd = vec![0x01, 0x00];
    sd.extend_from_slice(&(SE_DACL_PRESENT | SE_SELF_RELATIVE).to_le_bytes());
    sd.extend_from_slice(&[0u8; 12]);
    sd.extend_from_slice(&20u32.to_le_bytes());
    sd.extend_from_slice(&acl);
    sd
}

fn program(lines: &[&str]) -> RuleProgram {
    let (rules, errors) = parse_rule_strings(lines);
    assert!(errors.is_empty(), "rule parse errors: {:?}", errors);
    RuleProgram::new(rules)
}

#[test]
fn test_descriptor_to_share_edges_pipeline() {
    // A share advertising full-control-equivalent flags for Everyone
    // yields exactly the thirteen share-level rights edges.
    let sd = SecurityDescriptor::parse(&descriptor_bytes(0x001F01FF)).unwrap();
    let rights = rights_from_descriptor(&sd, SHARE_RIGHTS);

    let store = GraphStore::new("NetworkShareBase").unwrap();
    let mut ctx = GraphContext::new(&store);
    ctx.set_host(Node::new("h", &[kinds::NODE_NETWORK_SHARE_HOST]).with_property("name", "h"));
    ctx.set_share(
        Node::new("\\\\h\\public\\", &[kinds::NODE_NETWORK_SHARE_SMB])
            .with_property("displayName", "public"),
    );
    ctx.set_share_rights(rights);
    ctx.flush_path();

    let (_, edges) = store.snapshot();
    let rights_edges: Vec<&Edge> = edges
        .iter()
        .filter(|e| e.start.value == "S-1-1-0")
        .collect();
    assert_eq!(rights_edges.len(), 13);

    let expected = [
        "CanDelete",
        "CanReadControl",
        "CanWriteDacl",
        "CanWriteOwner",
        "CanDsCreateChild",
        "CanDsDeleteChild",
        "CanDsListContents",
        "CanDsWriteExtendedProperties",
        "CanDsReadProperty",
        "CanDsWriteProperty",
        "CanDsDeleteTree",
        "CanDsListObject",
        "CanDsControlAccess",
    ];
    for kind in expected {
        assert!(
            rights_edges.iter().any(|e| e.kind == kind),
            "missing edge kind {}",
            kind
        );
        assert!(rights_edges
            .iter()
            .all(|e| e.end.value == "\\\\h\\public\\"));
    }
}

#[test]
fn test_admin_share_rules_scenario() {
    let prog = program(&[
        "DEFAULT: ALLOW",
        "DENY EXPLORATION IF SHARE.NAME IN ['c$','print$','admin$','ipc$']",
        "ALLOW EXPLORATION",
    ]);

    let admin = RuleContext {
        share: Some(ShareFact::new("ADMIN$", "")),
        ..Default::default()
    };
    assert!(!prog.can_explore(&admin));

    let data = RuleContext {
        share: Some(ShareFact::new("DATA", "")),
        ..Default::default()
    };
    assert!(prog.can_explore(&data));
}

#[test]
fn test_size_and_depth_rules_scenario() {
    let prog = program(&[
        "DEFAULT: DENY",
        "ALLOW EXPLORATION IF SHARE.NAME = 'public'",
        "ALLOW PROCESSING IF FILE.SIZE < 1000000",
        "DENY EXPLORATION IF DEPTH > 2",
    ]);

    // Share 'public', 500 KB file at depth 1
    let ctx = RuleContext {
        share: Some(ShareFact::new("public", "")),
        file: Some(FileFact::new("doc.txt", "doc.txt", 500_000)),
        depth: 1,
        ..Default::default()
    };
    assert!(prog.can_explore(&ctx));
    assert!(prog.can_process(&ctx));

    // Depth 3 with a 2 MB file and no matching share fact
    let ctx = RuleContext {
        file: Some(FileFact::new("big.bin", "big.bin", 2_000_000)),
        depth: 3,
        ..Default::default()
    };
    assert!(!prog.can_explore(&ctx));
    assert!(!prog.can_process(&ctx));
}

#[test]
fn test_export_artifact_roundtrip() {
    let store = GraphStore::new("NetworkShareBase").unwrap();
    let mut ctx = GraphContext::new(&store);
    ctx.set_host(Node::new("srv", &[kinds::NODE_NETWORK_SHARE_HOST]).with_property("name", "srv"));
    ctx.set_share(
        Node::new("\\\\srv\\data\\", &[kinds::NODE_NETWORK_SHARE_SMB])
            .with_property("displayName", "data"),
    );
    let mut rights = RightsSet::new();
    rights.insert("S-1-5-11".into(), vec![kinds::EDGE_CAN_GENERIC_READ]);
    ctx.set_share_rights(rights);
    ctx.flush_path();

    let dir = tempdir().unwrap();
    let out = dir.path().join("graph.json");
    store.export(&out, true, None).unwrap();

    // Round-tripping the artifact preserves the node multiset and the
    // edge sequence
    let text = std::fs::read_to_string(&out).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&text).unwrap();

    let nodes: Vec<Node> =
        serde_json::from_value(doc["graph"]["nodes"].clone()).unwrap();
    let edges: Vec<Edge> =
        serde_json::from_value(doc["graph"]["edges"].clone()).unwrap();

    let (snap_nodes, snap_edges) = store.snapshot();
    assert_eq!(nodes, snap_nodes);
    assert_eq!(edges, snap_edges);
    assert_eq!(nodes.len() as u64, store.node_count());
    assert_eq!(edges.len() as u64, store.edge_count());
}

#[test]
fn test_zip_export_scenario() {
    let store = GraphStore::new("NetworkShareBase").unwrap();
    store.add_node(&Node::new("a", &[kinds::NODE_FILE]));
    store.add_node(&Node::new("b", &[kinds::NODE_DIRECTORY]));

    let dir = tempdir().unwrap();
    let out = dir.path().join("out.zip");

    let read_zip = |path: &std::path::Path| -> (String, String) {
        let file = std::fs::File::open(path).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        assert_eq!(archive.len(), 1);
        let mut entry = archive.by_index(0).unwrap();
        let name = entry.name().to_string();
        let mut text = String::new();
        entry.read_to_string(&mut text).unwrap();
        (name, text)
    };

    store.export(&out, true, None).unwrap();
    let (name1, text1) = read_zip(&out);
    assert_eq!(name1, "out.json");

    let doc: serde_json::Value = serde_json::from_str(&text1).unwrap();
    assert_eq!(doc["graph"]["nodes"].as_array().unwrap().len(), 2);
    assert_eq!(doc["metadata"]["source_kind"], "NetworkShareBase");

    // Repeated export: same entry name, same node-array length
    store.export(&out, true, None).unwrap();
    let (name2, text2) = read_zip(&out);
    assert_eq!(name2, "out.json");
    let doc2: serde_json::Value = serde_json::from_str(&text2).unwrap();
    assert_eq!(
        doc2["graph"]["nodes"].as_array().unwrap().len(),
        doc["graph"]["nodes"].as_array().unwrap().len()
    );
}

#[test]
fn test_checkpoint_resume_cycle() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("scan.json");

    // First run processes two of five targets and checkpoints
    {
        let store = Arc::new(GraphStore::new("NetworkShareBase").unwrap());
        store.add_node(&Node::new("host-a", &[kinds::NODE_NETWORK_SHARE_HOST]));
        store.add_edge(&Edge::new("host-a", "\\\\host-a\\s\\", kinds::EDGE_HAS_NETWORK_SHARE));

        let stats = Arc::new(ScanStats::default());
        stats.record_success();
        stats.record_success();

        let mgr = Arc::new(CheckpointManager::new(
            Some(path.clone()),
            Duration::from_secs(300),
        ));
        mgr.mark_processed("10.0.0.1");
        mgr.mark_processed("10.0.0.2");
        CheckpointManager::start(&mgr, Arc::clone(&store), Arc::clone(&stats), 5);
        mgr.stop(); // final save on shutdown
    }

    // Second run restores and skips exactly the processed targets
    let cp = checkpoint::load(&path).unwrap();
    assert_eq!(cp.version, "1.0.0");
    assert_eq!(cp.total_targets, 5);
    assert_eq!(cp.statistics.success, 2);

    let store = Arc::new(GraphStore::new("NetworkShareBase").unwrap());
    let mgr = CheckpointManager::new(Some(path), Duration::from_secs(300));
    mgr.restore_into(&cp, &store);

    assert!(mgr.is_processed("10.0.0.1"));
    assert!(mgr.is_processed("10.0.0.2"));
    assert!(!mgr.is_processed("10.0.0.3"));
    assert_eq!(store.node_count(), 1);
    assert_eq!(store.edge_count(), 1);
}

#[test]
fn test_emitted_edges_meet_popcount_floor() {
    // For every allowed ACE, popcount(mask & known_flags) edges reach
    // the graph.
    let masks = [0x0000_0001u32, 0x0003_0000, 0x8000_0000];
    let known: u32 = SHARE_RIGHTS.iter().fold(0, |acc, (_, f)| acc | f);
    let expected: u32 = masks.iter().map(|m| (m & known).count_ones()).sum();

    let store = GraphStore::new("NetworkShareBase").unwrap();
    let mut ctx = GraphContext::new(&store);
    ctx.set_host(Node::new("h", &[kinds::NODE_NETWORK_SHARE_HOST]));
    ctx.set_share(Node::new("\\\\h\\s\\", &[kinds::NODE_NETWORK_SHARE_SMB]));

    let mut rights = RightsSet::new();
    for mask in masks {
        let sd = SecurityDescriptor::parse(&descriptor_bytes(mask)).unwrap();
        for (sid, kinds) in rights_from_descriptor(&sd, SHARE_RIGHTS) {
            rights.entry(sid).or_default().extend(kinds);
        }
    }
    ctx.set_share_rights(rights);
    ctx.flush_path();

    // Total edges = rights edges + HostsNetworkShare + HasNetworkShare
    assert_eq!(store.edge_count(), expected as u64 + 2);
}

#[test]
fn test_legacy_checkpoint_inputs_accepted() {
    // Legacy form: node "kind" as a string, edge endpoints as strings
    // or {id}/{name} objects
    let legacy = serde_json::json!({
        "version": "1.0.0",
        "timestamp": "2024-06-01T12:00:00Z",
        "processed_targets": {"10.0.0.1": true},
        "total_targets": 2,
        "nodes": [
            {"id": "n1", "kind": "Directory"},
            {"id": "n2", "kinds": ["File"], "properties": {"fileSize": 10}}
        ],
        "edges": [
            {"start": "n1", "end": "n2", "kind": "Contains"},
            {"start": {"id": "S-1-1-0"}, "end": {"name": "N2", "match_by": "name"}, "kind": "CanNTFSGenericRead"}
        ],
        "statistics": {}
    });

    let dir = tempdir().unwrap();
    let path = dir.path().join("legacy.json");
    std::fs::write(&path, serde_json::to_vec(&legacy).unwrap()).unwrap();

    let cp = checkpoint::load(&path).unwrap();
    assert_eq!(cp.nodes[0].kinds, vec!["Directory"]);
    assert_eq!(cp.edges[0].start.value, "n1");
    assert_eq!(cp.edges[1].start.value, "S-1-1-0");
    assert_eq!(cp.edges[1].end.value, "N2");
    assert_eq!(cp.edges[1].end.match_by.as_deref(), Some("name"));
}
