//! Canonical parse records. Every backend produces exactly these shapes.

use serde::{Deserialize, Serialize};

/// Languages the discovery step admits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    TypeScript,
    Tsx,
    JavaScript,
    Python,
    Go,
    Rust,
    Java,
}

impl Language {
    pub fn from_extension(ext: Option<&str>) -> Option<Self> {
        Some(match ext? {
            "ts" => Self::TypeScript,
            "tsx" => Self::Tsx,
            "js" | "jsx" | "mjs" | "cjs" => Self::JavaScript,
            "py" => Self::Python,
            "go" => Self::Go,
            "rs" => Self::Rust,
            "java" => Self::Java,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TypeScript => "typescript",
            Self::Tsx => "tsx",
            Self::JavaScript => "javascript",
            Self::Python => "python",
            Self::Go => "go",
            Self::Rust => "rust",
            Self::Java => "java",
        }
    }

    /// Extensions accepted by the orchestrator's discovery walk.
    pub const SUPPORTED_EXTENSIONS: &'static [&'static str] = &[
        "ts", "tsx", "js", "jsx", "mjs", "cjs", "py", "go", "rs", "java",
    ];
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedFunction {
    pub name: String,
    /// `function`, `method`, or `arrow`.
    pub kind: String,
    pub start_line: usize,
    pub end_line: usize,
    pub loc: usize,
    pub parameters: Vec<String>,
    pub is_exported: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedClass {
    pub name: String,
    /// `class` or `interface`.
    pub kind: String,
    pub start_line: usize,
    pub end_line: usize,
    pub loc: usize,
    pub is_exported: bool,
    pub extends: Option<String>,
    pub implements: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedImport {
    /// Module specifier as written (`./util`, `react`).
    pub source: String,
    pub specifiers: Vec<String>,
    pub start_line: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedExport {
    pub name: String,
    pub is_default: bool,
    pub start_line: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedVariable {
    pub name: String,
    /// `const` or `let`.
    pub kind: String,
    pub start_line: usize,
    pub is_exported: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedTestSuite {
    pub name: String,
    /// `describe`, `test`, or `it`.
    pub suite_type: String,
    /// `unit`, `integration`, or `e2e` — inferred from the path.
    pub category: String,
    pub start_line: usize,
    pub end_line: usize,
}

/// Canonical record for one parsed source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedFile {
    pub file_path: String,
    pub relative_path: String,
    pub language: Language,
    pub loc: usize,
    pub hash: String,
    pub functions: Vec<ParsedFunction>,
    pub classes: Vec<ParsedClass>,
    pub imports: Vec<ParsedImport>,
    pub exports: Vec<ParsedExport>,
    pub variables: Vec<ParsedVariable>,
    pub test_suites: Vec<ParsedTestSuite>,
    /// Non-fatal trouble encountered while parsing (unreadable bytes,
    /// backend fallback, ...). Never empty symbols without a note here.
    pub warnings: Vec<String>,
}

impl ParsedFile {
    /// Empty record used for unreadable inputs.
    pub fn empty(
        file_path: impl Into<String>,
        relative_path: impl Into<String>,
        language: Language,
        hash: String,
        warning: String,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            relative_path: relative_path.into(),
            language,
            loc: 0,
            hash,
            functions: Vec::new(),
            classes: Vec::new(),
            imports: Vec::new(),
            exports: Vec::new(),
            variables: Vec::new(),
            test_suites: Vec::new(),
            warnings: vec![warning],
        }
    }

    pub fn symbol_count(&self) -> usize {
        self.functions.len() + self.classes.len() + self.imports.len()
    }
}

/// Document kinds recognized by the docs engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocKind {
    Readme,
    Adr,
    Changelog,
    Guide,
    Architecture,
    Other,
}

impl DocKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Readme => "readme",
            Self::Adr => "adr",
            Self::Changelog => "changelog",
            Self::Guide => "guide",
            Self::Architecture => "architecture",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedSection {
    pub index: usize,
    pub heading: String,
    pub level: usize,
    pub content: String,
    pub start_line: usize,
    pub word_count: usize,
    /// Inline `code` references — candidate symbol/file names.
    pub backtick_refs: Vec<String>,
    /// Fenced code block languages in this section.
    pub code_fences: Vec<String>,
    /// Link destinations.
    pub links: Vec<String>,
}

/// Canonical record for one parsed markdown document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedDoc {
    pub file_path: String,
    pub relative_path: String,
    pub title: String,
    pub kind: DocKind,
    pub sections: Vec<ParsedSection>,
    pub hash: String,
    pub word_count: usize,
}
