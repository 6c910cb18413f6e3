//! Retrieval scenarios over a realistic little graph: fusion ordering,
//! mode behavior, project isolation, and PPR ranking shape.

use std::sync::{Arc, RwLock};

use serde_json::{json, Map};

use lattice_core::model::{EdgeRecord, EdgeType, NodeLabel, NodeRecord};
use lattice_graph::MemoryIndex;
use lattice_query::{
    rrf, Bm25Mode, HybridRetriever, PprRanker, PprRequest, RetrievalMode, RetrieveRequest,
};
use lattice_store::Bm25Provisioner;

fn node(id: &str, label: NodeLabel, name: &str, project: &str) -> NodeRecord {
    let mut props = Map::new();
    props.insert("name".into(), json!(name));
    props.insert("projectId".into(), json!(project));
    props.insert("validFrom".into(), json!(1));
    NodeRecord::new(id, label, props)
}

/// Two files; `parser.ts` holds the parse functions and tests point at it.
fn workspace_index() -> MemoryIndex {
    let mut index = MemoryIndex::new();

    let mut file_props = Map::new();
    file_props.insert("relativePath".into(), json!("src/parser.ts"));
    file_props.insert("projectId".into(), json!("app"));
    file_props.insert("validFrom".into(), json!(1));
    index.add_node(NodeRecord::new(
        "app:file:src/parser.ts",
        NodeLabel::File,
        file_props,
    ));

    for (id, name) in [
        ("app:function:src/parser.ts:parseTokens:0", "parseTokens"),
        ("app:function:src/parser.ts:parseTree:0", "parseTree"),
        ("app:class:src/parser.ts:Parser:0", "Parser"),
    ] {
        let label = if id.contains(":class:") {
            NodeLabel::Class
        } else {
            NodeLabel::Function
        };
        index.add_node(node(id, label, name, "app"));
        index.add_edge(EdgeRecord::new(
            EdgeType::Contains,
            "app:file:src/parser.ts",
            id,
        ));
    }

    index.add_node(node(
        "app:suite:src/parser.test.ts:parser:0",
        NodeLabel::TestSuite,
        "parser",
        "app",
    ));
    index.add_edge(EdgeRecord::new(
        EdgeType::Tests,
        "app:suite:src/parser.test.ts:parser:0",
        "app:file:src/parser.ts",
    ));

    // A decoy in another project with the same names.
    index.add_node(node(
        "other:function:src/parser.ts:parseTokens:0",
        NodeLabel::Function,
        "parseTokens",
        "other",
    ));

    index
}

fn retriever() -> HybridRetriever {
    HybridRetriever::new(
        None,
        None,
        None,
        Arc::new(RwLock::new(workspace_index())),
        vec!["functions".to_string(), "classes".to_string(), "files".to_string()],
        Arc::new(Bm25Provisioner::new()),
    )
}

#[tokio::test]
async fn hybrid_retrieval_ranks_direct_matches_first() {
    let retriever = retriever();
    let response = retriever
        .retrieve(&RetrieveRequest::hybrid("parseTokens", "app"))
        .await;

    assert_eq!(response.bm25_mode, Bm25Mode::LexicalFallback);
    assert!(!response.results.is_empty());
    assert_eq!(
        response.results[0].id,
        "app:function:src/parser.ts:parseTokens:0"
    );
    assert_eq!(response.results[0].name.as_deref(), Some("parseTokens"));
    // Graph expansion pulls the containing file into the candidate set.
    assert!(response
        .results
        .iter()
        .any(|r| r.id == "app:file:src/parser.ts"));
}

#[tokio::test]
async fn project_isolation_holds_across_all_modes() {
    let retriever = retriever();
    for mode in [
        RetrievalMode::Vector,
        RetrievalMode::Bm25,
        RetrievalMode::Graph,
        RetrievalMode::Hybrid,
    ] {
        let response = retriever
            .retrieve(&RetrieveRequest {
                mode,
                ..RetrieveRequest::hybrid("parseTokens", "app")
            })
            .await;
        for result in &response.results {
            assert!(
                result.id.starts_with("app:"),
                "{mode:?} leaked {}",
                result.id
            );
        }
    }
}

#[tokio::test]
async fn graph_mode_surfaces_neighbors_of_seeds() {
    let retriever = retriever();
    let response = retriever
        .retrieve(&RetrieveRequest {
            mode: RetrievalMode::Graph,
            ..RetrieveRequest::hybrid("Parser", "app")
        })
        .await;
    // Seeds come from the lexical scan; expansion returns their
    // neighborhood, which includes the containing file.
    assert!(response
        .results
        .iter()
        .any(|r| r.id == "app:file:src/parser.ts"));
}

#[tokio::test]
async fn results_report_the_lists_that_surfaced_them() {
    let retriever = retriever();
    let response = retriever
        .retrieve(&RetrieveRequest::hybrid("parseTree", "app"))
        .await;
    let direct = response
        .results
        .iter()
        .find(|r| r.id == "app:function:src/parser.ts:parseTree:0")
        .expect("direct hit present");
    assert!(direct.sources.contains(&"vector".to_string()));
    assert!(direct.sources.contains(&"bm25".to_string()));
}

#[test]
fn rrf_scenario_from_rotated_lists() {
    // Three rankers disagree completely; fusion must settle on A, B, C.
    let lists = vec![
        vec!["A".to_string(), "B".to_string(), "C".to_string()],
        vec!["B".to_string(), "C".to_string(), "A".to_string()],
        vec!["C".to_string(), "A".to_string(), "B".to_string()],
    ];
    let fused = rrf::fuse(&lists, 60.0);
    let order: Vec<&str> = fused.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(order, vec!["A", "B", "C"]);
}

#[tokio::test]
async fn ppr_prefers_the_seed_neighborhood() {
    let index = Arc::new(RwLock::new(workspace_index()));
    let ranker = PprRanker::new(None, Arc::clone(&index));

    let scores = ranker
        .rank(&PprRequest::new(
            vec!["app:file:src/parser.ts".to_string()],
            "app",
        ))
        .await;

    assert_eq!(scores[0].id, "app:file:src/parser.ts");
    let ids: Vec<&str> = scores.iter().map(|s| s.id.as_str()).collect();
    assert!(ids.contains(&"app:function:src/parser.ts:parseTokens:0"));
    assert!(
        !ids.contains(&"other:function:src/parser.ts:parseTokens:0"),
        "foreign project must not rank"
    );
    for score in &scores {
        assert!(score.score > 0.0);
    }
}

#[tokio::test]
async fn ppr_respects_max_results() {
    let index = Arc::new(RwLock::new(workspace_index()));
    let ranker = PprRanker::new(None, Arc::clone(&index));
    let mut request = PprRequest::new(vec!["app:file:src/parser.ts".to_string()], "app");
    request.max_results = 2;
    let scores = ranker.rank(&request).await;
    assert!(scores.len() <= 2);
}
