//! Coarse line-based symbol extractor.
//!
//! Used for languages without a bundled grammar (go, rust, java) and as the
//! fallback whenever an AST backend fails. Deliberately shallow: named
//! top-level declarations, imports, and a brace-matched end line. The
//! output shape is identical to the AST backends'.

use std::sync::OnceLock;

use regex::Regex;

use super::{test_category, Symbols};
use crate::types::{
    Language, ParsedClass, ParsedExport, ParsedFunction, ParsedImport, ParsedTestSuite,
};

struct Patterns {
    ts_function: Regex,
    ts_class: Regex,
    ts_import: Regex,
    ts_suite: Regex,
    go_function: Regex,
    go_type: Regex,
    go_import: Regex,
    rust_function: Regex,
    rust_type: Regex,
    rust_import: Regex,
    java_class: Regex,
    java_import: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        ts_function: Regex::new(
            r"^\s*(export\s+)?(?:default\s+)?(?:async\s+)?function\s+(\w+)\s*\(([^)]*)",
        )
        .expect("static regex"),
        ts_class: Regex::new(
            r"^\s*(export\s+)?(?:default\s+)?(?:abstract\s+)?(class|interface)\s+(\w+)",
        )
        .expect("static regex"),
        ts_import: Regex::new(r#"^\s*import\s+(?:(.+?)\s+from\s+)?["']([^"']+)["']"#)
            .expect("static regex"),
        ts_suite: Regex::new(r#"^\s*(describe|it|test)\s*\(\s*["'`]([^"'`]+)["'`]"#)
            .expect("static regex"),
        go_function: Regex::new(r"^func\s+(?:\([^)]*\)\s*)?(\w+)\s*\(([^)]*)")
            .expect("static regex"),
        go_type: Regex::new(r"^type\s+(\w+)\s+(struct|interface)\b").expect("static regex"),
        go_import: Regex::new(r#"^\s*(?:import\s+)?(?:\w+\s+)?"([^"]+)"\s*$"#)
            .expect("static regex"),
        rust_function: Regex::new(r"^\s*(pub(?:\([^)]*\))?\s+)?(?:async\s+)?fn\s+(\w+)")
            .expect("static regex"),
        rust_type: Regex::new(r"^\s*(pub(?:\([^)]*\))?\s+)?(struct|enum|trait)\s+(\w+)")
            .expect("static regex"),
        rust_import: Regex::new(r"^\s*(?:pub\s+)?use\s+([\w:]+)").expect("static regex"),
        java_class: Regex::new(
            r"^\s*(?:public\s+|private\s+|protected\s+)?(?:abstract\s+|final\s+)?(class|interface)\s+(\w+)(?:\s+extends\s+([\w.<>]+))?(?:\s+implements\s+([\w.,\s<>]+))?",
        )
        .expect("static regex"),
        java_import: Regex::new(r"^\s*import\s+(?:static\s+)?([\w.]+(?:\.\*)?);")
            .expect("static regex"),
    })
}

/// Extract symbols with the coarse backend. Never fails.
pub fn extract(source: &str, language: Language, relative_path: &str) -> Symbols {
    let mut symbols = Symbols::default();
    let lines: Vec<&str> = source.lines().collect();
    let p = patterns();

    for (i, raw) in lines.iter().enumerate() {
        let line_no = i + 1;
        match language {
            Language::Go => {
                if let Some(caps) = p.go_function.captures(raw) {
                    let name = caps[1].to_string();
                    let end = brace_matched_end(&lines, i);
                    let exported = name.chars().next().is_some_and(char::is_uppercase);
                    symbols.functions.push(function(
                        name.clone(),
                        line_no,
                        end,
                        split_params(&caps[2]),
                        exported,
                    ));
                    if exported {
                        symbols.exports.push(export(name, line_no));
                    }
                } else if let Some(caps) = p.go_type.captures(raw) {
                    let kind = if &caps[2] == "interface" { "interface" } else { "class" };
                    let name = caps[1].to_string();
                    let exported = name.chars().next().is_some_and(char::is_uppercase);
                    symbols.classes.push(class(
                        name,
                        kind,
                        line_no,
                        brace_matched_end(&lines, i),
                        exported,
                    ));
                } else if let Some(caps) = p.go_import.captures(raw) {
                    symbols.imports.push(import(caps[1].to_string(), line_no));
                }
            }
            Language::Rust => {
                if let Some(caps) = p.rust_function.captures(raw) {
                    let exported = caps.get(1).is_some();
                    let name = caps[2].to_string();
                    symbols.functions.push(function(
                        name.clone(),
                        line_no,
                        brace_matched_end(&lines, i),
                        Vec::new(),
                        exported,
                    ));
                    if exported {
                        symbols.exports.push(export(name, line_no));
                    }
                } else if let Some(caps) = p.rust_type.captures(raw) {
                    let kind = if &caps[2] == "trait" { "interface" } else { "class" };
                    symbols.classes.push(class(
                        caps[3].to_string(),
                        kind,
                        line_no,
                        brace_matched_end(&lines, i),
                        caps.get(1).is_some(),
                    ));
                } else if let Some(caps) = p.rust_import.captures(raw) {
                    symbols.imports.push(import(caps[1].to_string(), line_no));
                }
            }
            Language::Java => {
                if let Some(caps) = p.java_class.captures(raw) {
                    let kind = if &caps[1] == "interface" { "interface" } else { "class" };
                    let mut parsed = class(
                        caps[2].to_string(),
                        kind,
                        line_no,
                        brace_matched_end(&lines, i),
                        raw.contains("public"),
                    );
                    parsed.extends = caps.get(3).map(|m| m.as_str().to_string());
                    parsed.implements = caps
                        .get(4)
                        .map(|m| {
                            m.as_str()
                                .split(',')
                                .map(|s| s.trim().to_string())
                                .filter(|s| !s.is_empty())
                                .collect()
                        })
                        .unwrap_or_default();
                    symbols.classes.push(parsed);
                } else if let Some(caps) = p.java_import.captures(raw) {
                    symbols.imports.push(import(caps[1].to_string(), line_no));
                }
            }
            // The TS/JS family lands here only when the AST backend failed.
            _ => {
                if let Some(caps) = p.ts_function.captures(raw) {
                    let exported = caps.get(1).is_some();
                    let name = caps[2].to_string();
                    symbols.functions.push(function(
                        name.clone(),
                        line_no,
                        brace_matched_end(&lines, i),
                        split_params(&caps[3]),
                        exported,
                    ));
                    if exported {
                        symbols.exports.push(export(name, line_no));
                    }
                } else if let Some(caps) = p.ts_class.captures(raw) {
                    let kind = if &caps[2] == "interface" { "interface" } else { "class" };
                    symbols.classes.push(class(
                        caps[3].to_string(),
                        kind,
                        line_no,
                        brace_matched_end(&lines, i),
                        caps.get(1).is_some(),
                    ));
                } else if let Some(caps) = p.ts_import.captures(raw) {
                    let specifiers = caps
                        .get(1)
                        .map(|m| {
                            m.as_str()
                                .trim_matches(['{', '}', ' '])
                                .split(',')
                                .map(|s| s.trim().to_string())
                                .filter(|s| !s.is_empty())
                                .collect()
                        })
                        .unwrap_or_default();
                    symbols.imports.push(ParsedImport {
                        source: caps[2].to_string(),
                        specifiers,
                        start_line: line_no,
                    });
                } else if let Some(caps) = p.ts_suite.captures(raw) {
                    symbols.test_suites.push(ParsedTestSuite {
                        name: caps[2].to_string(),
                        suite_type: caps[1].to_string(),
                        category: test_category(relative_path).to_string(),
                        start_line: line_no,
                        end_line: brace_matched_end(&lines, i),
                    });
                }
            }
        }
    }

    symbols
}

fn function(
    name: String,
    start_line: usize,
    end_line: usize,
    parameters: Vec<String>,
    is_exported: bool,
) -> ParsedFunction {
    ParsedFunction {
        name,
        kind: "function".to_string(),
        start_line,
        end_line,
        loc: end_line.saturating_sub(start_line) + 1,
        parameters,
        is_exported,
    }
}

fn class(
    name: String,
    kind: &str,
    start_line: usize,
    end_line: usize,
    is_exported: bool,
) -> ParsedClass {
    ParsedClass {
        name,
        kind: kind.to_string(),
        start_line,
        end_line,
        loc: end_line.saturating_sub(start_line) + 1,
        is_exported,
        extends: None,
        implements: Vec::new(),
    }
}

fn import(source: String, start_line: usize) -> ParsedImport {
    ParsedImport {
        source,
        specifiers: Vec::new(),
        start_line,
    }
}

fn export(name: String, start_line: usize) -> ParsedExport {
    ParsedExport {
        name,
        is_default: false,
        start_line,
    }
}

fn split_params(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Scan forward from `start` matching braces; the declaration ends where
/// the depth returns to zero. Single-line declarations end on their line.
fn brace_matched_end(lines: &[&str], start: usize) -> usize {
    let mut depth: i32 = 0;
    let mut opened = false;
    for (i, line) in lines.iter().enumerate().skip(start) {
        for ch in line.chars() {
            match ch {
                '{' => {
                    depth += 1;
                    opened = true;
                }
                '}' => depth -= 1,
                _ => {}
            }
        }
        if opened && depth <= 0 {
            return i + 1;
        }
        // Don't run past an unbraced declaration.
        if !opened && i > start {
            return start + 1;
        }
    }
    lines.len().max(start + 1)
}
