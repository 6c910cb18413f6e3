//! Docs builder: `ParsedDoc → [Statement]`.
//!
//! Emits the DOCUMENT node, its SECTION chain (`SECTION_OF` +
//! `NEXT_SECTION` in order), and `DOC_DESCRIBES` edges for backtick
//! references that resolve to FILE paths or FUNCTION/CLASS names.

use serde_json::{json, Map, Value};

use lattice_core::model::{ids, EdgeRecord, EdgeType, NodeLabel, NodeRecord};
use lattice_core::{FxHashMap, FxHashSet};
use lattice_parse::{ParsedDoc, ParsedSection};

use crate::builder::{upsert_edge, upsert_node, BuildContext, BuildOutput};
use crate::index::MemoryIndex;

/// SECTION.content is truncated to this many characters before upsert.
pub const SECTION_CONTENT_MAX: usize = 4000;

/// Resolution targets for `DOC_DESCRIBES`: known file paths and symbol
/// names, snapshotted from the in-memory index after the code pass.
#[derive(Debug, Default)]
pub struct DocLinkTargets {
    /// relativePath → FILE node id.
    files: FxHashMap<String, String>,
    /// symbol name → node ids (FUNCTION and CLASS).
    symbols: FxHashMap<String, Vec<(String, NodeLabel)>>,
}

impl DocLinkTargets {
    pub fn from_index(index: &MemoryIndex) -> Self {
        let mut targets = Self::default();
        for file in index.nodes_of(NodeLabel::File) {
            if let Some(rel) = file.str_prop("relativePath") {
                targets.files.insert(rel.to_string(), file.id.clone());
            }
        }
        for label in [NodeLabel::Function, NodeLabel::Class] {
            for node in index.nodes_of(label) {
                if let Some(name) = node.str_prop("name") {
                    targets
                        .symbols
                        .entry(name.to_string())
                        .or_default()
                        .push((node.id.clone(), label));
                }
            }
        }
        targets
    }

    /// Exact relativePath match, or suffix match on a `/` boundary
    /// (`engine.ts` matches `src/engine.ts`).
    fn resolve_file(&self, reference: &str) -> Option<&String> {
        if let Some(id) = self.files.get(reference) {
            return Some(id);
        }
        self.files
            .iter()
            .find(|(rel, _)| rel.ends_with(&format!("/{reference}")))
            .map(|(_, id)| id)
    }

    fn resolve_symbols(&self, name: &str) -> &[(String, NodeLabel)] {
        self.symbols.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Maps one `ParsedDoc` to its subgraph.
pub struct DocsBuilder<'a> {
    context: &'a BuildContext,
    targets: &'a DocLinkTargets,
}

impl<'a> DocsBuilder<'a> {
    pub fn new(context: &'a BuildContext, targets: &'a DocLinkTargets) -> Self {
        Self { context, targets }
    }

    pub fn build(&self, doc: &ParsedDoc) -> BuildOutput {
        let ctx = self.context;
        let project = ctx.project_id.as_str();
        let rel = doc.relative_path.as_str();
        let document_id = ids::doc_id(project, rel);

        let mut out = BuildOutput::default();

        let mut doc_props = Map::new();
        doc_props.insert("relativePath".into(), json!(rel));
        doc_props.insert("filePath".into(), json!(doc.file_path));
        doc_props.insert("title".into(), json!(doc.title));
        doc_props.insert("kind".into(), json!(doc.kind.as_str()));
        doc_props.insert("wordCount".into(), json!(doc.word_count));
        doc_props.insert("hash".into(), json!(doc.hash));
        ctx.stamp(&mut doc_props);
        push_node(&mut out, NodeLabel::Document, &document_id, doc_props);

        let mut previous_section: Option<String> = None;
        for section in &doc.sections {
            let section_id = ids::section_id(project, rel, section.index);
            let mut props = Map::new();
            props.insert("heading".into(), json!(section.heading));
            props.insert("level".into(), json!(section.level));
            props.insert("content".into(), json!(truncate(&section.content)));
            props.insert("wordCount".into(), json!(section.word_count));
            props.insert("startLine".into(), json!(section.start_line));
            props.insert("sectionIndex".into(), json!(section.index));
            props.insert("docId".into(), json!(document_id));
            props.insert("relativePath".into(), json!(rel));
            ctx.stamp(&mut props);
            push_node(&mut out, NodeLabel::Section, &section_id, props);

            push_edge(
                &mut out,
                NodeLabel::Section,
                NodeLabel::Document,
                EdgeRecord::new(EdgeType::SectionOf, &section_id, &document_id),
            );
            if let Some(prev) = previous_section.replace(section_id.clone()) {
                push_edge(
                    &mut out,
                    NodeLabel::Section,
                    NodeLabel::Section,
                    EdgeRecord::new(EdgeType::NextSection, prev, &section_id),
                );
            }

            self.describe_edges(&mut out, &section_id, section);
        }

        out
    }

    /// `DOC_DESCRIBES` with `{strength, matchedName}` for every backtick
    /// reference that resolves. Exact matches carry strength 1.0.
    fn describe_edges(&self, out: &mut BuildOutput, section_id: &str, section: &ParsedSection) {
        let mut linked: FxHashSet<String> = FxHashSet::default();
        for raw in &section.backtick_refs {
            // `compute()` and `compute` name the same symbol.
            let reference = raw.trim_end_matches("()");

            if let Some(file_id) = self.targets.resolve_file(reference) {
                if linked.insert(file_id.clone()) {
                    push_edge(
                        out,
                        NodeLabel::Section,
                        NodeLabel::File,
                        EdgeRecord::new(EdgeType::DocDescribes, section_id, file_id)
                            .with_properties(describe_props(reference)),
                    );
                }
                continue;
            }

            for (symbol_id, label) in self.targets.resolve_symbols(reference) {
                if linked.insert(symbol_id.clone()) {
                    push_edge(
                        out,
                        NodeLabel::Section,
                        *label,
                        EdgeRecord::new(EdgeType::DocDescribes, section_id, symbol_id)
                            .with_properties(describe_props(reference)),
                    );
                }
            }
        }
    }
}

fn describe_props(matched_name: &str) -> Map<String, Value> {
    let mut props = Map::new();
    props.insert("strength".into(), json!(1.0));
    props.insert("matchedName".into(), json!(matched_name));
    props
}

fn truncate(content: &str) -> String {
    if content.chars().count() <= SECTION_CONTENT_MAX {
        return content.to_string();
    }
    content.chars().take(SECTION_CONTENT_MAX).collect()
}

fn push_node(out: &mut BuildOutput, label: NodeLabel, id: &str, props: Map<String, Value>) {
    out.node_statements.push(upsert_node(label, id, &props));
    out.nodes.push(NodeRecord::new(id, label, props));
}

fn push_edge(out: &mut BuildOutput, from: NodeLabel, to: NodeLabel, edge: EdgeRecord) {
    out.edge_statements.push(upsert_edge(from, to, &edge));
    out.edges.push(edge);
}
