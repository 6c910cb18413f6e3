//! Community recomputation: connected components over resolved import
//! edges. Runs on full builds only; ids derive from the smallest member
//! path so an unchanged component keeps its community across rebuilds.

use petgraph::unionfind::UnionFind;
use serde_json::{json, Map};

use lattice_core::model::{EdgeRecord, EdgeType, NodeLabel, NodeRecord};
use lattice_core::FxHashMap;

use crate::builder::{upsert_edge, upsert_node, BuildContext, BuildOutput};
use crate::index::MemoryIndex;

/// Components below this size are noise, not communities.
const MIN_COMMUNITY_SIZE: usize = 2;

/// Compute communities of the project's live FILE nodes and emit their
/// COMMUNITY subgraph (node + `CONTAINS`/`BELONGS_TO` edges per member).
pub fn compute_communities(
    index: &MemoryIndex,
    project_id: &str,
    context: &BuildContext,
) -> BuildOutput {
    // Collect live files and their import-reference links.
    let mut file_ids: Vec<&str> = Vec::new();
    let mut positions: FxHashMap<&str, usize> = FxHashMap::default();
    for file in index.nodes_of(NodeLabel::File) {
        if file.project_id() != Some(project_id) || !file.is_live() {
            continue;
        }
        positions.insert(file.id.as_str(), file_ids.len());
        file_ids.push(file.id.as_str());
    }
    if file_ids.is_empty() {
        return BuildOutput::default();
    }

    let mut union = UnionFind::<usize>::new(file_ids.len());
    for &file_id in &file_ids {
        for import_edge in index.outgoing(file_id) {
            if import_edge.rel != EdgeType::Imports {
                continue;
            }
            for reference in index.outgoing(&import_edge.to) {
                if reference.rel != EdgeType::References {
                    continue;
                }
                if let (Some(&a), Some(&b)) = (
                    positions.get(file_id),
                    positions.get(reference.to.as_str()),
                ) {
                    union.union(a, b);
                }
            }
        }
    }

    // Group members per component root.
    let mut components: FxHashMap<usize, Vec<&str>> = FxHashMap::default();
    for (i, &file_id) in file_ids.iter().enumerate() {
        components.entry(union.find(i)).or_default().push(file_id);
    }

    let mut out = BuildOutput::default();
    let mut groups: Vec<Vec<&str>> = components
        .into_values()
        .filter(|members| members.len() >= MIN_COMMUNITY_SIZE)
        .collect();
    for members in &mut groups {
        members.sort();
    }
    groups.sort();

    for members in groups {
        let rel_of = |id: &str| -> String {
            index
                .get(id)
                .and_then(|n| n.str_prop("relativePath").map(String::from))
                .unwrap_or_else(|| id.to_string())
        };
        let anchor = rel_of(members[0]);
        let community_id = format!("{project_id}:community:{anchor}");

        let loc: u64 = members
            .iter()
            .filter_map(|id| index.get(id))
            .filter_map(|n| n.properties.get("loc").and_then(|v| v.as_u64()))
            .sum();

        let mut props = Map::new();
        props.insert("label".into(), json!(anchor));
        props.insert(
            "summary".into(),
            json!(format!("{} files connected through imports", members.len())),
        );
        props.insert("memberCount".into(), json!(members.len()));
        props.insert("size".into(), json!(loc));
        context.stamp(&mut props);
        out.node_statements
            .push(upsert_node(NodeLabel::Community, &community_id, &props));
        out.nodes
            .push(NodeRecord::new(&community_id, NodeLabel::Community, props));

        for member in members {
            let contains = EdgeRecord::new(EdgeType::Contains, &community_id, member);
            out.edge_statements.push(upsert_edge(
                NodeLabel::Community,
                NodeLabel::File,
                &contains,
            ));
            out.edges.push(contains);

            let belongs = EdgeRecord::new(EdgeType::BelongsTo, member, &community_id);
            out.edge_statements.push(upsert_edge(
                NodeLabel::File,
                NodeLabel::Community,
                &belongs,
            ));
            out.edges.push(belongs);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_core::model::ids;

    fn add_file(index: &mut MemoryIndex, rel: &str, loc: u64) {
        let mut props = Map::new();
        props.insert("relativePath".into(), json!(rel));
        props.insert("projectId".into(), json!("p"));
        props.insert("validFrom".into(), json!(1));
        props.insert("loc".into(), json!(loc));
        index.add_node(NodeRecord::new(
            ids::file_id("p", rel),
            NodeLabel::File,
            props,
        ));
    }

    fn link(index: &mut MemoryIndex, from_rel: &str, to_rel: &str) {
        let import = ids::import_id("p", from_rel, 0);
        index.add_node(NodeRecord::new(&import, NodeLabel::Import, Map::new()));
        index.add_edge(EdgeRecord::new(
            EdgeType::Imports,
            ids::file_id("p", from_rel),
            &import,
        ));
        index.add_edge(EdgeRecord::new(
            EdgeType::References,
            &import,
            ids::file_id("p", to_rel),
        ));
    }

    #[test]
    fn linked_files_form_one_community() {
        let mut index = MemoryIndex::new();
        add_file(&mut index, "src/a.ts", 10);
        add_file(&mut index, "src/b.ts", 20);
        add_file(&mut index, "src/alone.ts", 5);
        link(&mut index, "src/a.ts", "src/b.ts");

        let context = BuildContext::new("p", "tx", 1);
        let out = compute_communities(&index, "p", &context);

        let communities: Vec<_> = out
            .nodes
            .iter()
            .filter(|n| n.label == NodeLabel::Community)
            .collect();
        assert_eq!(communities.len(), 1, "singletons are not communities");
        let community = communities[0];
        assert_eq!(community.id, "p:community:src/a.ts");
        assert_eq!(community.properties["memberCount"], json!(2));
        assert_eq!(community.properties["size"], json!(30));

        let belongs = out
            .edges
            .iter()
            .filter(|e| e.rel == EdgeType::BelongsTo)
            .count();
        assert_eq!(belongs, 2);
    }

    #[test]
    fn community_ids_are_stable_across_recomputation() {
        let mut index = MemoryIndex::new();
        add_file(&mut index, "src/a.ts", 1);
        add_file(&mut index, "src/b.ts", 1);
        link(&mut index, "src/a.ts", "src/b.ts");

        let context = BuildContext::new("p", "tx", 1);
        let first = compute_communities(&index, "p", &context);
        let second = compute_communities(&index, "p", &context);
        assert_eq!(
            first.nodes.iter().map(|n| &n.id).collect::<Vec<_>>(),
            second.nodes.iter().map(|n| &n.id).collect::<Vec<_>>(),
        );
    }
}
