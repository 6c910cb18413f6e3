//! Parse → build → index pipeline: idempotent replay, project isolation,
//! tombstoning, and the docs pass wired over a seeded code graph.

use std::path::PathBuf;

use lattice_core::model::{ids, EdgeType, NodeLabel};
use lattice_core::FxHashSet;
use lattice_graph::builder::{BuildContext, GraphBuilder};
use lattice_graph::{cycles, DocLinkTargets, DocsBuilder, MemoryIndex};
use lattice_parse::markdown::parse_doc;
use lattice_parse::ParserAdapter;

fn parse(rel: &str, source: &str) -> lattice_parse::ParsedFile {
    ParserAdapter::new().parse_file(
        &PathBuf::from(format!("/ws/{rel}")),
        rel,
        source.as_bytes(),
    )
}

fn known(paths: &[&str]) -> FxHashSet<String> {
    paths.iter().map(|s| s.to_string()).collect()
}

fn seeded_index() -> MemoryIndex {
    let ctx = BuildContext::new("proj", "tx-1", 1_000);
    let files = known(&["src/engine.ts", "src/util.ts"]);
    let builder = GraphBuilder::new(&ctx, &files);

    let mut index = MemoryIndex::new();
    for (rel, source) in [
        (
            "src/engine.ts",
            "import { fmt } from \"./util\";\n\nexport function compute(a: number): number {\n  return a;\n}\n",
        ),
        (
            "src/util.ts",
            "export function fmt(x: number): string {\n  return String(x);\n}\n",
        ),
    ] {
        let output = builder.build(&parse(rel, source));
        for node in output.nodes {
            index.add_node(node);
        }
        for edge in output.edges {
            index.add_edge(edge);
        }
    }
    index
}

#[test]
fn replayed_build_changes_nothing_in_the_index() {
    let mut index = seeded_index();
    let before = index.stats();

    // Replay the same build output.
    let ctx = BuildContext::new("proj", "tx-1", 1_000);
    let files = known(&["src/engine.ts", "src/util.ts"]);
    let output = GraphBuilder::new(&ctx, &files).build(&parse(
        "src/engine.ts",
        "import { fmt } from \"./util\";\n\nexport function compute(a: number): number {\n  return a;\n}\n",
    ));
    for node in output.nodes {
        index.add_node(node);
    }
    for edge in output.edges {
        index.add_edge(edge);
    }

    assert_eq!(index.stats(), before, "replay must be a no-op");
}

#[test]
fn import_resolution_produces_references_edges() {
    let index = seeded_index();
    let engine = ids::file_id("proj", "src/engine.ts");
    let util = ids::file_id("proj", "src/util.ts");

    let import_targets: Vec<&str> = index
        .outgoing(&engine)
        .iter()
        .filter(|e| e.rel == EdgeType::Imports)
        .map(|e| e.to.as_str())
        .collect();
    assert_eq!(import_targets.len(), 1);

    let references: Vec<&str> = index
        .outgoing(import_targets[0])
        .iter()
        .filter(|e| e.rel == EdgeType::References)
        .map(|e| e.to.as_str())
        .collect();
    assert_eq!(references, vec![util.as_str()]);
}

#[test]
fn tombstoning_spares_the_current_tx() {
    let mut index = seeded_index();

    // Second build only re-sees engine.ts.
    let ctx = BuildContext::new("proj", "tx-2", 2_000);
    let files = known(&["src/engine.ts"]);
    let output = GraphBuilder::new(&ctx, &files).build(&parse(
        "src/engine.ts",
        "export function compute(a: number): number {\n  return a;\n}\n",
    ));
    let mut fresh = MemoryIndex::new();
    for node in output.nodes {
        fresh.add_node(node);
    }
    index.absorb(&fresh);

    let stale = index.mark_stale_for_project("proj", "tx-2", 2_000);
    assert!(stale.contains(&ids::file_id("proj", "src/util.ts")));
    assert!(!stale.contains(&ids::file_id("proj", "src/engine.ts")));

    let util = index.get(&ids::file_id("proj", "src/util.ts")).unwrap();
    assert_eq!(util.valid_to(), Some(2_000));
    let engine = index.get(&ids::file_id("proj", "src/engine.ts")).unwrap();
    assert!(engine.is_live());
}

#[test]
fn foreign_projects_never_tombstone() {
    let mut index = seeded_index();
    let stale = index.mark_stale_for_project("someone-else", "tx-9", 9_000);
    assert!(stale.is_empty());
    assert!(index
        .get(&ids::file_id("proj", "src/util.ts"))
        .unwrap()
        .is_live());
}

#[test]
fn docs_pass_links_into_the_code_graph() {
    let mut index = seeded_index();
    let doc = parse_doc(
        "/ws/README.md",
        "README.md",
        b"# Demo\n\n## Compute\n\nThe `compute` function lives in `src/engine.ts`.\n",
    );

    let ctx = BuildContext::new("proj", "tx-docs", 3_000);
    let targets = DocLinkTargets::from_index(&index);
    let output = DocsBuilder::new(&ctx, &targets).build(&doc);
    let mut fresh = MemoryIndex::new();
    for node in output.nodes {
        fresh.add_node(node);
    }
    for edge in output.edges {
        fresh.add_edge(edge);
    }
    index.absorb(&fresh);

    let section = ids::section_id("proj", "README.md", 1);
    let described: Vec<&str> = index
        .outgoing(&section)
        .iter()
        .filter(|e| e.rel == EdgeType::DocDescribes)
        .map(|e| e.to.as_str())
        .collect();
    assert!(described.contains(&"proj:file:src/engine.ts"));
    assert!(described
        .iter()
        .any(|id| id.starts_with("proj:function:src/engine.ts:compute")));
}

#[test]
fn no_cycles_in_an_acyclic_workspace() {
    let index = seeded_index();
    assert!(cycles::find_import_cycles(&index, "proj").is_empty());
}

#[test]
fn snapshot_counts_match_stats() {
    let index = seeded_index();
    let stats = index.stats();
    let snapshot = index.snapshot();
    assert_eq!(
        snapshot["stats"]["nodeCount"].as_u64().unwrap() as usize,
        stats.node_count
    );
    assert_eq!(
        snapshot["stats"]["edgeCount"].as_u64().unwrap() as usize,
        stats.edge_count
    );
}
