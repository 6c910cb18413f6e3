//! Tree-sitter backends for the TypeScript/JavaScript/Python family.
//!
//! Walks named nodes directly (no queries): declarations at the top level,
//! method definitions one level into class bodies, `describe`/`it`/`test`
//! call expressions for suites. Returns `None` when the grammar rejects
//! the input so the adapter can fall back to the coarse extractor.

use tree_sitter::{Node, Parser};

use super::{test_category, Symbols};
use crate::types::{
    Language, ParsedClass, ParsedExport, ParsedFunction, ParsedImport, ParsedTestSuite,
    ParsedVariable,
};

fn grammar_for(language: Language) -> Option<tree_sitter::Language> {
    match language {
        Language::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
        Language::Tsx => Some(tree_sitter_typescript::LANGUAGE_TSX.into()),
        Language::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
        Language::Python => Some(tree_sitter_python::LANGUAGE.into()),
        _ => None,
    }
}

/// Extract symbols with the AST backend. `None` = backend unavailable or
/// parse failure; the caller falls through to the coarse extractor.
pub fn extract(source: &str, language: Language, relative_path: &str) -> Option<Symbols> {
    let grammar = grammar_for(language)?;
    let mut parser = Parser::new();
    parser.set_language(&grammar).ok()?;
    let tree = parser.parse(source, None)?;

    let mut symbols = Symbols::default();
    let root = tree.root_node();
    match language {
        Language::Python => walk_python(root, source, &mut symbols),
        _ => walk_js_like(root, source, relative_path, &mut symbols),
    }
    Some(symbols)
}

fn text<'a>(node: Node<'_>, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or_default()
}

fn name_of(node: Node<'_>, source: &str) -> Option<String> {
    node.child_by_field_name("name")
        .map(|n| text(n, source).to_string())
}

fn line_span(node: Node<'_>) -> (usize, usize) {
    (
        node.start_position().row + 1,
        node.end_position().row + 1,
    )
}

// ─── TypeScript / JavaScript ────────────────────────────────────────────

fn walk_js_like(root: Node<'_>, source: &str, relative_path: &str, symbols: &mut Symbols) {
    let mut cursor = root.walk();
    for child in root.named_children(&mut cursor) {
        visit_js_top(child, source, relative_path, false, symbols);
    }
}

fn visit_js_top(
    node: Node<'_>,
    source: &str,
    relative_path: &str,
    exported: bool,
    symbols: &mut Symbols,
) {
    match node.kind() {
        "function_declaration" | "generator_function_declaration" => {
            push_function(node, source, "function", exported, symbols);
        }
        "class_declaration" | "abstract_class_declaration" => {
            push_class(node, source, "class", exported, symbols);
        }
        "interface_declaration" => {
            push_class(node, source, "interface", exported, symbols);
        }
        "import_statement" => push_import(node, source, symbols),
        "export_statement" => push_export(node, source, relative_path, symbols),
        "lexical_declaration" | "variable_declaration" => {
            push_variables(node, source, exported, symbols);
        }
        "expression_statement" => {
            if let Some(call) = node.named_child(0).filter(|n| n.kind() == "call_expression") {
                push_test_suite(call, source, relative_path, symbols);
            }
        }
        _ => {}
    }
}

fn push_function(
    node: Node<'_>,
    source: &str,
    kind: &str,
    exported: bool,
    symbols: &mut Symbols,
) {
    let Some(name) = name_of(node, source) else {
        return;
    };
    let (start_line, end_line) = line_span(node);
    symbols.functions.push(ParsedFunction {
        name,
        kind: kind.to_string(),
        start_line,
        end_line,
        loc: end_line - start_line + 1,
        parameters: parameter_list(node, source),
        is_exported: exported,
    });
}

fn parameter_list(node: Node<'_>, source: &str) -> Vec<String> {
    let Some(params) = node.child_by_field_name("parameters") else {
        return Vec::new();
    };
    let mut cursor = params.walk();
    params
        .named_children(&mut cursor)
        .filter(|n| n.kind() != "comment")
        .map(|n| text(n, source).trim().to_string())
        .collect()
}

fn push_class(node: Node<'_>, source: &str, kind: &str, exported: bool, symbols: &mut Symbols) {
    let Some(name) = name_of(node, source) else {
        return;
    };
    let (start_line, end_line) = line_span(node);

    let mut extends = None;
    let mut implements = Vec::new();
    collect_heritage(node, source, &mut extends, &mut implements);

    symbols.classes.push(ParsedClass {
        name: name.clone(),
        kind: kind.to_string(),
        start_line,
        end_line,
        loc: end_line - start_line + 1,
        is_exported: exported,
        extends,
        implements,
    });

    // Methods become functions of kind `method`.
    if let Some(body) = node.child_by_field_name("body") {
        let mut cursor = body.walk();
        for member in body.named_children(&mut cursor) {
            if member.kind() == "method_definition" {
                push_function(member, source, "method", exported, symbols);
            }
        }
    }
}

fn collect_heritage(
    node: Node<'_>,
    source: &str,
    extends: &mut Option<String>,
    implements: &mut Vec<String>,
) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            // `class X extends Y implements Z` — the heritage wrapper node
            // in the JS grammar holds the expression directly.
            "class_heritage" => {
                let mut inner = child.walk();
                let mut found_clause = false;
                for clause in child.named_children(&mut inner) {
                    match clause.kind() {
                        "extends_clause" => {
                            found_clause = true;
                            if let Some(target) = clause.named_child(0) {
                                *extends = Some(text(target, source).to_string());
                            }
                        }
                        "implements_clause" => {
                            found_clause = true;
                            let mut c = clause.walk();
                            for t in clause.named_children(&mut c) {
                                implements.push(text(t, source).to_string());
                            }
                        }
                        _ => {}
                    }
                }
                if !found_clause {
                    if let Some(target) = child.named_child(0) {
                        *extends = Some(text(target, source).to_string());
                    }
                }
            }
            // `interface X extends A, B` — first parent maps to EXTENDS,
            // the rest to IMPLEMENTS.
            "extends_type_clause" => {
                let mut c = child.walk();
                for (i, t) in child.named_children(&mut c).enumerate() {
                    if i == 0 {
                        *extends = Some(text(t, source).to_string());
                    } else {
                        implements.push(text(t, source).to_string());
                    }
                }
            }
            _ => {}
        }
    }
}

fn push_import(node: Node<'_>, source: &str, symbols: &mut Symbols) {
    let Some(source_node) = node.child_by_field_name("source") else {
        return;
    };
    let module = text(source_node, source).trim_matches(['"', '\'', '`']).to_string();

    let mut specifiers = Vec::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() == "import_clause" {
            collect_identifiers(child, source, &mut specifiers);
        }
    }

    symbols.imports.push(ParsedImport {
        source: module,
        specifiers,
        start_line: node.start_position().row + 1,
    });
}

fn collect_identifiers(node: Node<'_>, source: &str, out: &mut Vec<String>) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "identifier" {
            out.push(text(child, source).to_string());
        } else if child.named_child_count() > 0 {
            collect_identifiers(child, source, out);
        }
    }
}

fn push_export(node: Node<'_>, source: &str, relative_path: &str, symbols: &mut Symbols) {
    let start_line = node.start_position().row + 1;
    let is_default = {
        let mut cursor = node.walk();
        let is_default = node.children(&mut cursor).any(|c| c.kind() == "default");
        is_default
    };

    if let Some(declaration) = node.child_by_field_name("declaration") {
        // `export [default] <declaration>` — index the declaration as
        // exported and record the export by its name.
        visit_js_top(declaration, source, relative_path, true, symbols);
        let name = name_of(declaration, source)
            .or_else(|| first_declarator_name(declaration, source))
            .unwrap_or_else(|| "default".to_string());
        symbols.exports.push(ParsedExport {
            name,
            is_default,
            start_line,
        });
        return;
    }

    if let Some(value) = node.child_by_field_name("value") {
        // `export default <expression>`
        let _ = value;
        symbols.exports.push(ParsedExport {
            name: "default".to_string(),
            is_default: true,
            start_line,
        });
        return;
    }

    // `export { a, b as c }` — the alias is the exported name.
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() == "export_clause" {
            let mut c = child.walk();
            for spec in child.named_children(&mut c) {
                let exported = spec
                    .child_by_field_name("alias")
                    .map(|n| text(n, source).to_string())
                    .or_else(|| name_of(spec, source));
                if let Some(name) = exported {
                    symbols.exports.push(ParsedExport {
                        name,
                        is_default: false,
                        start_line,
                    });
                }
            }
        }
    }
}

fn first_declarator_name(node: Node<'_>, source: &str) -> Option<String> {
    let mut cursor = node.walk();
    let result = node
        .named_children(&mut cursor)
        .find(|n| n.kind() == "variable_declarator")
        .and_then(|d| name_of(d, source));
    result
}

fn push_variables(node: Node<'_>, source: &str, exported: bool, symbols: &mut Symbols) {
    let keyword = text(node, source)
        .split_whitespace()
        .next()
        .unwrap_or("const")
        .to_string();
    let mut cursor = node.walk();
    for declarator in node.named_children(&mut cursor) {
        if declarator.kind() != "variable_declarator" {
            continue;
        }
        let Some(name) = name_of(declarator, source) else {
            continue;
        };
        let start_line = declarator.start_position().row + 1;

        // `const f = (..) => ..` counts as a function, not a variable.
        if let Some(value) = declarator.child_by_field_name("value") {
            if matches!(value.kind(), "arrow_function" | "function_expression" | "function") {
                let (s, e) = line_span(declarator);
                symbols.functions.push(ParsedFunction {
                    name,
                    kind: "arrow".to_string(),
                    start_line: s,
                    end_line: e,
                    loc: e - s + 1,
                    parameters: parameter_list(value, source),
                    is_exported: exported,
                });
                continue;
            }
        }

        symbols.variables.push(ParsedVariable {
            name,
            kind: keyword.clone(),
            start_line,
            is_exported: exported,
        });
    }
}

fn push_test_suite(call: Node<'_>, source: &str, relative_path: &str, symbols: &mut Symbols) {
    let Some(function) = call.child_by_field_name("function") else {
        return;
    };
    let callee = text(function, source);
    if !matches!(callee, "describe" | "it" | "test") {
        return;
    }
    let name = call
        .child_by_field_name("arguments")
        .and_then(|args| args.named_child(0))
        .map(|arg| text(arg, source).trim_matches(['"', '\'', '`']).to_string())
        .unwrap_or_else(|| callee.to_string());
    let (start_line, end_line) = line_span(call);
    symbols.test_suites.push(ParsedTestSuite {
        name,
        suite_type: callee.to_string(),
        category: test_category(relative_path).to_string(),
        start_line,
        end_line,
    });
}

// ─── Python ─────────────────────────────────────────────────────────────

fn walk_python(root: Node<'_>, source: &str, symbols: &mut Symbols) {
    let mut cursor = root.walk();
    for child in root.named_children(&mut cursor) {
        match child.kind() {
            "function_definition" => push_python_function(child, source, symbols),
            "class_definition" => push_python_class(child, source, symbols),
            "import_statement" | "import_from_statement" => {
                push_python_import(child, source, symbols);
            }
            "decorated_definition" => {
                if let Some(def) = child.child_by_field_name("definition") {
                    match def.kind() {
                        "function_definition" => push_python_function(def, source, symbols),
                        "class_definition" => push_python_class(def, source, symbols),
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }
}

fn push_python_function(node: Node<'_>, source: &str, symbols: &mut Symbols) {
    let Some(name) = name_of(node, source) else {
        return;
    };
    let (start_line, end_line) = line_span(node);
    symbols.functions.push(ParsedFunction {
        name,
        kind: "function".to_string(),
        start_line,
        end_line,
        loc: end_line - start_line + 1,
        parameters: parameter_list(node, source),
        is_exported: true,
    });
}

fn push_python_class(node: Node<'_>, source: &str, symbols: &mut Symbols) {
    let Some(name) = name_of(node, source) else {
        return;
    };
    let (start_line, end_line) = line_span(node);

    let mut bases = Vec::new();
    if let Some(superclasses) = node.child_by_field_name("superclasses") {
        let mut cursor = superclasses.walk();
        for base in superclasses.named_children(&mut cursor) {
            bases.push(text(base, source).to_string());
        }
    }
    let extends = if bases.is_empty() {
        None
    } else {
        Some(bases.remove(0))
    };

    symbols.classes.push(ParsedClass {
        name,
        kind: "class".to_string(),
        start_line,
        end_line,
        loc: end_line - start_line + 1,
        is_exported: true,
        extends,
        implements: bases,
    });

    if let Some(body) = node.child_by_field_name("body") {
        let mut cursor = body.walk();
        for member in body.named_children(&mut cursor) {
            if member.kind() == "function_definition" {
                let Some(name) = name_of(member, source) else {
                    continue;
                };
                let (s, e) = line_span(member);
                symbols.functions.push(ParsedFunction {
                    name,
                    kind: "method".to_string(),
                    start_line: s,
                    end_line: e,
                    loc: e - s + 1,
                    parameters: parameter_list(member, source),
                    is_exported: true,
                });
            }
        }
    }
}

fn push_python_import(node: Node<'_>, source: &str, symbols: &mut Symbols) {
    let start_line = node.start_position().row + 1;
    if node.kind() == "import_from_statement" {
        let module = node
            .child_by_field_name("module_name")
            .map(|n| text(n, source).to_string())
            .unwrap_or_default();
        let mut specifiers = Vec::new();
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if child.kind() == "dotted_name" && text(child, source) != module {
                specifiers.push(text(child, source).to_string());
            }
        }
        symbols.imports.push(ParsedImport {
            source: module,
            specifiers,
            start_line,
        });
    } else {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if matches!(child.kind(), "dotted_name" | "aliased_import") {
                symbols.imports.push(ParsedImport {
                    source: text(child, source)
                        .split_whitespace()
                        .next()
                        .unwrap_or_default()
                        .to_string(),
                    specifiers: Vec::new(),
                    start_line,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_typescript_symbols() {
        let source = r#"
import { helper } from "./util";
import React from "react";

export function compute(a: number, b: number): number {
  return a + b;
}

export default class Engine extends Base implements Runnable {
  start(): void {}
}

const internal = 42;
export const handler = (req: Request) => req;
"#;
        let symbols = extract(source, Language::TypeScript, "src/a.ts").unwrap();

        assert_eq!(symbols.imports.len(), 2);
        assert_eq!(symbols.imports[0].source, "./util");
        assert_eq!(symbols.imports[0].specifiers, vec!["helper".to_string()]);

        let names: Vec<_> = symbols.functions.iter().map(|f| f.name.as_str()).collect();
        assert!(names.contains(&"compute"));
        assert!(names.contains(&"handler"));
        assert!(names.contains(&"start"));

        let compute = symbols.functions.iter().find(|f| f.name == "compute").unwrap();
        assert!(compute.is_exported);
        assert_eq!(compute.parameters.len(), 2);

        assert_eq!(symbols.classes.len(), 1);
        let engine = &symbols.classes[0];
        assert_eq!(engine.extends.as_deref(), Some("Base"));
        assert_eq!(engine.implements, vec!["Runnable".to_string()]);

        assert!(symbols.exports.iter().any(|e| e.is_default));
        assert_eq!(symbols.variables.len(), 1);
        assert_eq!(symbols.variables[0].name, "internal");
    }

    #[test]
    fn extracts_test_suites() {
        let source = r#"
describe("engine", () => {
  it("computes", () => {});
});
"#;
        let symbols = extract(source, Language::JavaScript, "src/engine.test.js").unwrap();
        assert_eq!(symbols.test_suites.len(), 1);
        assert_eq!(symbols.test_suites[0].name, "engine");
        assert_eq!(symbols.test_suites[0].category, "unit");
    }

    #[test]
    fn extracts_python_symbols() {
        let source = r#"
import os
from collections import OrderedDict

class Repo(Base):
    def save(self, item):
        pass

def run(argv):
    return 0
"#;
        let symbols = extract(source, Language::Python, "tools/run.py").unwrap();
        assert_eq!(symbols.imports.len(), 2);
        assert_eq!(symbols.classes.len(), 1);
        assert_eq!(symbols.classes[0].extends.as_deref(), Some("Base"));
        let names: Vec<_> = symbols.functions.iter().map(|f| f.name.as_str()).collect();
        assert!(names.contains(&"run"));
        assert!(names.contains(&"save"));
    }
}
