//! Graph builder: `ParsedFile → [Statement]`.
//!
//! Pure with respect to its inputs: the same parsed record under the same
//! build context yields the same statements, and every statement is an
//! upsert keyed by `(label, id)` that is safe to execute twice. Node
//! upserts always precede the edges that reference them.

use std::path::Path;

use serde_json::{json, Map, Value};

use lattice_core::model::{ids, EdgeRecord, EdgeType, NodeLabel, NodeRecord};
use lattice_core::statement::{sanitize_params, Statement};
use lattice_core::FxHashSet;
use lattice_parse::ParsedFile;

/// Provenance shared by every statement of one build transaction.
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub project_id: String,
    pub tx_id: String,
    /// All writes of a build share this `validFrom` timestamp.
    pub valid_from: i64,
    /// Optional file summaries keyed by relative path. Empty when no
    /// summarizer backend is configured.
    pub summaries: lattice_core::FxHashMap<String, String>,
}

impl BuildContext {
    pub fn new(project_id: impl Into<String>, tx_id: impl Into<String>, valid_from: i64) -> Self {
        Self {
            project_id: project_id.into(),
            tx_id: tx_id.into(),
            valid_from,
            summaries: Default::default(),
        }
    }

    pub fn with_summaries(
        mut self,
        summaries: lattice_core::FxHashMap<String, String>,
    ) -> Self {
        self.summaries = summaries;
        self
    }

    /// The provenance fields stamped onto every node.
    pub(crate) fn stamp(&self, props: &mut Map<String, Value>) {
        props.insert("projectId".into(), json!(self.project_id));
        props.insert("validFrom".into(), json!(self.valid_from));
        props.insert("validTo".into(), Value::Null);
        props.insert("createdAt".into(), json!(self.valid_from));
        props.insert("txId".into(), json!(self.tx_id));
    }
}

/// Everything one build step produces: store statements plus the node/edge
/// records mirrored into the in-memory index. Node and edge statements are
/// kept apart so the executed batch can upsert every node before any edge
/// that references it — including edges across files.
#[derive(Debug, Default)]
pub struct BuildOutput {
    pub node_statements: Vec<Statement>,
    pub edge_statements: Vec<Statement>,
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
}

impl BuildOutput {
    pub fn merge(&mut self, other: BuildOutput) {
        self.node_statements.extend(other.node_statements);
        self.edge_statements.extend(other.edge_statements);
        self.nodes.extend(other.nodes);
        self.edges.extend(other.edges);
    }

    pub fn statement_count(&self) -> usize {
        self.node_statements.len() + self.edge_statements.len()
    }

    /// Execution order: all node upserts, then all edges.
    pub fn statements(&self) -> Vec<Statement> {
        self.node_statements
            .iter()
            .chain(self.edge_statements.iter())
            .cloned()
            .collect()
    }
}

/// Build an upsert statement for one node. The SET clause enumerates the
/// property keys in sorted order so output is deterministic.
pub fn upsert_node(label: NodeLabel, id: &str, props: &Map<String, Value>) -> Statement {
    let mut keys: Vec<&String> = props.keys().collect();
    keys.sort();
    let assignments: Vec<String> = keys.iter().map(|k| format!("n.{k} = ${k}")).collect();
    let query = format!(
        "MERGE (n:{label} {{id: $id}}) SET {}",
        assignments.join(", ")
    );
    let mut params = sanitize_params(props);
    params.insert("id".into(), json!(id));
    Statement::new(query, params)
}

/// Upsert that only sets properties when the node is first created
/// (FEATURE seeding: never overwrite status on re-runs).
pub fn upsert_node_on_create(label: NodeLabel, id: &str, props: &Map<String, Value>) -> Statement {
    let mut keys: Vec<&String> = props.keys().collect();
    keys.sort();
    let assignments: Vec<String> = keys.iter().map(|k| format!("n.{k} = ${k}")).collect();
    let query = format!(
        "MERGE (n:{label} {{id: $id}}) ON CREATE SET {}",
        assignments.join(", ")
    );
    let mut params = sanitize_params(props);
    params.insert("id".into(), json!(id));
    Statement::new(query, params)
}

/// Build a MERGE statement for one edge.
pub fn upsert_edge(
    from_label: NodeLabel,
    to_label: NodeLabel,
    edge: &EdgeRecord,
) -> Statement {
    let mut params = sanitize_params(&edge.properties);
    let set_clause = if params.is_empty() {
        String::new()
    } else {
        let mut keys: Vec<String> = params.keys().cloned().collect();
        keys.sort();
        let assignments: Vec<String> = keys.iter().map(|k| format!("r.{k} = ${k}")).collect();
        format!(" SET {}", assignments.join(", "))
    };
    let query = format!(
        "MATCH (a:{from_label} {{id: $fromId}}), (b:{to_label} {{id: $toId}}) MERGE (a)-[r:{}]->(b){set_clause}",
        edge.rel
    );
    params.insert("fromId".into(), json!(edge.from));
    params.insert("toId".into(), json!(edge.to));
    Statement::new(query, params)
}

/// Maps one `ParsedFile` to its subgraph. The builder deduplicates within
/// a single parsed file via a seen-id set; global deduplication is the
/// store's responsibility.
pub struct GraphBuilder<'a> {
    context: &'a BuildContext,
    /// Relative paths known to the current build, for import resolution.
    known_files: &'a FxHashSet<String>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(context: &'a BuildContext, known_files: &'a FxHashSet<String>) -> Self {
        Self {
            context,
            known_files,
        }
    }

    pub fn build(&self, parsed: &ParsedFile) -> BuildOutput {
        let ctx = self.context;
        let project = ctx.project_id.as_str();
        let rel = parsed.relative_path.as_str();
        let file_id = ids::file_id(project, rel);

        let mut out = BuildOutput::default();
        let mut seen: FxHashSet<String> = FxHashSet::default();

        // ── FILE ──
        let mut file_props = Map::new();
        file_props.insert("path".into(), json!(parsed.file_path));
        file_props.insert("relativePath".into(), json!(rel));
        file_props.insert("language".into(), json!(parsed.language.as_str()));
        file_props.insert("loc".into(), json!(parsed.loc));
        file_props.insert("hash".into(), json!(parsed.hash));
        file_props.insert(
            "summary".into(),
            json!(ctx.summaries.get(rel).map(String::as_str).unwrap_or("")),
        );
        ctx.stamp(&mut file_props);
        self.push_node(&mut out, &mut seen, NodeLabel::File, &file_id, file_props);

        // ── FOLDER ancestors up to the workspace root ──
        self.build_folders(&mut out, &mut seen, rel, &file_id);

        // Ordinals are per name so same-named siblings disambiguate without
        // unrelated additions shifting every id in the file.
        let mut name_ordinals: lattice_core::FxHashMap<String, usize> = Default::default();
        let mut next_ordinal = |scope: &str, name: &str| -> usize {
            let counter = name_ordinals.entry(format!("{scope}:{name}")).or_insert(0);
            let ordinal = *counter;
            *counter += 1;
            ordinal
        };

        // ── FUNCTION ──
        for function in &parsed.functions {
            let ordinal = next_ordinal("fn", &function.name);
            let id = ids::function_id(project, rel, &function.name, ordinal);
            let mut props = Map::new();
            props.insert("name".into(), json!(function.name));
            props.insert("kind".into(), json!(function.kind));
            props.insert("startLine".into(), json!(function.start_line));
            props.insert("endLine".into(), json!(function.end_line));
            props.insert("loc".into(), json!(function.loc));
            props.insert("parameters".into(), json!(function.parameters));
            props.insert("summary".into(), json!(""));
            props.insert("isExported".into(), json!(function.is_exported));
            props.insert("filePath".into(), json!(rel));
            ctx.stamp(&mut props);
            self.push_node(&mut out, &mut seen, NodeLabel::Function, &id, props);
            self.push_edge(
                &mut out,
                NodeLabel::File,
                NodeLabel::Function,
                EdgeRecord::new(EdgeType::Contains, &file_id, &id),
            );
        }

        // ── CLASS (+ EXTENDS / IMPLEMENTS) ──
        for class in &parsed.classes {
            let ordinal = next_ordinal("class", &class.name);
            let id = ids::class_id(project, rel, &class.name, ordinal);
            let mut props = Map::new();
            props.insert("name".into(), json!(class.name));
            props.insert("kind".into(), json!(class.kind));
            props.insert("startLine".into(), json!(class.start_line));
            props.insert("endLine".into(), json!(class.end_line));
            props.insert("loc".into(), json!(class.loc));
            props.insert("summary".into(), json!(""));
            props.insert("isExported".into(), json!(class.is_exported));
            props.insert("filePath".into(), json!(rel));
            ctx.stamp(&mut props);
            self.push_node(&mut out, &mut seen, NodeLabel::Class, &id, props);
            self.push_edge(
                &mut out,
                NodeLabel::File,
                NodeLabel::Class,
                EdgeRecord::new(EdgeType::Contains, &file_id, &id),
            );

            if let Some(parent) = &class.extends {
                let parent_id = self.class_stub(&mut out, &mut seen, parent);
                self.push_edge(
                    &mut out,
                    NodeLabel::Class,
                    NodeLabel::Class,
                    EdgeRecord::new(EdgeType::Extends, &id, &parent_id),
                );
            }
            for interface in &class.implements {
                let parent_id = self.class_stub(&mut out, &mut seen, interface);
                self.push_edge(
                    &mut out,
                    NodeLabel::Class,
                    NodeLabel::Class,
                    EdgeRecord::new(EdgeType::Implements, &id, &parent_id),
                );
            }
        }

        // ── VARIABLE ──
        for variable in &parsed.variables {
            let ordinal = next_ordinal("var", &variable.name);
            let id = ids::variable_id(project, rel, &variable.name, ordinal);
            let mut props = Map::new();
            props.insert("name".into(), json!(variable.name));
            props.insert("kind".into(), json!(variable.kind));
            props.insert("startLine".into(), json!(variable.start_line));
            props.insert("isExported".into(), json!(variable.is_exported));
            props.insert("filePath".into(), json!(rel));
            ctx.stamp(&mut props);
            self.push_node(&mut out, &mut seen, NodeLabel::Variable, &id, props);
            self.push_edge(
                &mut out,
                NodeLabel::File,
                NodeLabel::Variable,
                EdgeRecord::new(EdgeType::Contains, &file_id, &id),
            );
        }

        // ── IMPORT (+ REFERENCES for resolved relative imports) ──
        for (ordinal, import) in parsed.imports.iter().enumerate() {
            let id = ids::import_id(project, rel, ordinal);
            let mut props = Map::new();
            props.insert("source".into(), json!(import.source));
            props.insert("specifiers".into(), json!(import.specifiers));
            props.insert("startLine".into(), json!(import.start_line));
            props.insert("summary".into(), json!(""));
            ctx.stamp(&mut props);
            self.push_node(&mut out, &mut seen, NodeLabel::Import, &id, props);
            self.push_edge(
                &mut out,
                NodeLabel::File,
                NodeLabel::Import,
                EdgeRecord::new(EdgeType::Imports, &file_id, &id),
            );

            if let Some(target_rel) = resolve_relative_import(rel, &import.source, self.known_files)
            {
                let target_id = ids::file_id(project, &target_rel);
                self.push_edge(
                    &mut out,
                    NodeLabel::Import,
                    NodeLabel::File,
                    EdgeRecord::new(EdgeType::References, &id, &target_id),
                );
            }
        }

        // ── EXPORT ──
        for export in &parsed.exports {
            let id = ids::export_id(project, rel, &export.name);
            let mut props = Map::new();
            props.insert("name".into(), json!(export.name));
            props.insert("isDefault".into(), json!(export.is_default));
            props.insert("startLine".into(), json!(export.start_line));
            ctx.stamp(&mut props);
            self.push_node(&mut out, &mut seen, NodeLabel::Export, &id, props);
            self.push_edge(
                &mut out,
                NodeLabel::File,
                NodeLabel::Export,
                EdgeRecord::new(EdgeType::Exports, &file_id, &id),
            );
        }

        // ── TEST_SUITE ──
        for suite in &parsed.test_suites {
            let ordinal = next_ordinal("suite", &suite.name);
            let id = ids::test_suite_id(project, rel, &suite.name, ordinal);
            let mut props = Map::new();
            props.insert("name".into(), json!(suite.name));
            props.insert("type".into(), json!(suite.suite_type));
            props.insert("category".into(), json!(suite.category));
            props.insert("startLine".into(), json!(suite.start_line));
            props.insert("endLine".into(), json!(suite.end_line));
            props.insert("filePath".into(), json!(rel));
            ctx.stamp(&mut props);
            self.push_node(&mut out, &mut seen, NodeLabel::TestSuite, &id, props);
            self.push_edge(
                &mut out,
                NodeLabel::File,
                NodeLabel::TestSuite,
                EdgeRecord::new(EdgeType::Contains, &file_id, &id),
            );
        }

        out
    }

    /// FOLDER chain from the file's parent up to the workspace root, with
    /// FOLDER-CONTAINS edges downward and the leaf containing the file.
    fn build_folders(
        &self,
        out: &mut BuildOutput,
        seen: &mut FxHashSet<String>,
        relative_path: &str,
        file_id: &str,
    ) {
        let project = self.context.project_id.as_str();
        let mut ancestors: Vec<&str> = Vec::new();
        let mut current = relative_path;
        while let Some(pos) = current.rfind('/') {
            current = &current[..pos];
            ancestors.push(current);
        }

        // Root-most first so parent upserts precede child edges.
        let chain: Vec<&str> = ancestors.iter().rev().copied().collect();
        for window in chain.windows(2) {
            let (parent, child) = (window[0], window[1]);
            self.folder_node(out, seen, parent);
            self.folder_node(out, seen, child);
            self.push_edge(
                out,
                NodeLabel::Folder,
                NodeLabel::Folder,
                EdgeRecord::new(
                    EdgeType::Contains,
                    ids::folder_id(project, parent),
                    ids::folder_id(project, child),
                ),
            );
        }

        if let Some(direct_parent) = ancestors.first() {
            self.folder_node(out, seen, direct_parent);
            self.push_edge(
                out,
                NodeLabel::Folder,
                NodeLabel::File,
                EdgeRecord::new(
                    EdgeType::Contains,
                    ids::folder_id(project, direct_parent),
                    file_id,
                ),
            );
        }
    }

    fn folder_node(&self, out: &mut BuildOutput, seen: &mut FxHashSet<String>, rel: &str) {
        let id = ids::folder_id(self.context.project_id.as_str(), rel);
        if seen.contains(&id) {
            return;
        }
        let name = rel.rsplit('/').next().unwrap_or(rel);
        let mut props = Map::new();
        props.insert("path".into(), json!(rel));
        props.insert("name".into(), json!(name));
        self.context.stamp(&mut props);
        self.push_node(out, seen, NodeLabel::Folder, &id, props);
    }

    /// Parent CLASS stub for EXTENDS/IMPLEMENTS: id synthesized from the
    /// stripped generic name; only created-if-absent so a later real
    /// definition wins.
    fn class_stub(
        &self,
        out: &mut BuildOutput,
        seen: &mut FxHashSet<String>,
        raw_name: &str,
    ) -> String {
        let id = ids::class_ref_id(self.context.project_id.as_str(), raw_name);
        if seen.insert(id.clone()) {
            let stripped = raw_name.split('<').next().unwrap_or(raw_name).trim();
            let mut props = Map::new();
            props.insert("name".into(), json!(stripped));
            props.insert("kind".into(), json!("class"));
            self.context.stamp(&mut props);
            out.node_statements
                .push(upsert_node_on_create(NodeLabel::Class, &id, &props));
            out.nodes.push(NodeRecord::new(&id, NodeLabel::Class, props));
        }
        id
    }

    fn push_node(
        &self,
        out: &mut BuildOutput,
        seen: &mut FxHashSet<String>,
        label: NodeLabel,
        id: &str,
        props: Map<String, Value>,
    ) {
        if !seen.insert(id.to_string()) {
            return;
        }
        out.node_statements.push(upsert_node(label, id, &props));
        out.nodes.push(NodeRecord::new(id, label, props));
    }

    fn push_edge(
        &self,
        out: &mut BuildOutput,
        from_label: NodeLabel,
        to_label: NodeLabel,
        edge: EdgeRecord,
    ) {
        out.edge_statements.push(upsert_edge(from_label, to_label, &edge));
        out.edges.push(edge);
    }
}

/// Resolve a relative import (`./x`, `../y`) against the set of known
/// relative paths. Tried in order: `base.ts`, `base.tsx`, `base/index.ts`,
/// `base/index.tsx` — plus the literal path when it already carries an
/// extension.
pub fn resolve_relative_import(
    importer_relative_path: &str,
    source: &str,
    known_files: &FxHashSet<String>,
) -> Option<String> {
    if !source.starts_with('.') {
        return None;
    }
    let importer_dir = Path::new(importer_relative_path)
        .parent()
        .unwrap_or_else(|| Path::new(""));
    let joined = importer_dir.join(source);
    let base = normalize_path(&joined)?;

    if known_files.contains(&base) {
        return Some(base);
    }
    for candidate in [
        format!("{base}.ts"),
        format!("{base}.tsx"),
        format!("{base}/index.ts"),
        format!("{base}/index.tsx"),
    ] {
        if known_files.contains(&candidate) {
            return Some(candidate);
        }
    }
    None
}

/// Lexically normalize `a/b/../c` to `a/c` without touching the filesystem.
fn normalize_path(path: &Path) -> Option<String> {
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in path.components() {
        match component {
            std::path::Component::Normal(p) => parts.push(p),
            std::path::Component::ParentDir => {
                parts.pop()?;
            }
            std::path::Component::CurDir => {}
            _ => return None,
        }
    }
    Some(
        parts
            .iter()
            .map(|p| p.to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
    )
}
