//! The parser adapter: `(path, bytes)` in, canonical records out.
//!
//! Backend selection is per extension. An AST failure is not fatal — the
//! coarse extractor runs instead and the record carries a warning. Truly
//! unreadable bytes produce an empty record with a warning, never an error.

use std::path::Path;

use tracing::debug;

use crate::backend::{self, Symbols};
use crate::content_hash;
use crate::markdown;
use crate::types::{Language, ParsedDoc, ParsedFile};

/// Stateless adapter; parsers are built per call (tree-sitter parsers are
/// not shareable across threads).
#[derive(Debug, Default, Clone)]
pub struct ParserAdapter;

impl ParserAdapter {
    pub fn new() -> Self {
        Self
    }

    /// Parse one source file into a `ParsedFile`.
    pub fn parse_file(&self, absolute_path: &Path, relative_path: &str, bytes: &[u8]) -> ParsedFile {
        let hash = content_hash(bytes);
        let language = Language::from_extension(
            absolute_path.extension().and_then(|e| e.to_str()),
        )
        .unwrap_or(Language::JavaScript);
        let file_path = absolute_path.to_string_lossy().to_string();

        let Ok(source) = std::str::from_utf8(bytes) else {
            return ParsedFile::empty(
                file_path,
                relative_path,
                language,
                hash,
                format!("unreadable bytes in {relative_path}; indexed without symbols"),
            );
        };

        let mut warnings = Vec::new();
        let symbols = match backend::treesitter::extract(source, language, relative_path) {
            Some(symbols) => symbols,
            None => {
                if matches!(
                    language,
                    Language::TypeScript | Language::Tsx | Language::JavaScript | Language::Python
                ) {
                    debug!(path = relative_path, "ast backend unavailable, using coarse extractor");
                    warnings.push(format!(
                        "ast backend unavailable for {relative_path}; coarse extraction used"
                    ));
                }
                backend::coarse::extract(source, language, relative_path)
            }
        };

        let Symbols {
            functions,
            classes,
            imports,
            exports,
            variables,
            test_suites,
        } = symbols;

        ParsedFile {
            file_path,
            relative_path: relative_path.to_string(),
            language,
            loc: source.lines().count(),
            hash,
            functions,
            classes,
            imports,
            exports,
            variables,
            test_suites,
            warnings,
        }
    }

    /// Parse one markdown file into a `ParsedDoc`.
    pub fn parse_doc(&self, absolute_path: &Path, relative_path: &str, bytes: &[u8]) -> ParsedDoc {
        markdown::parse_doc(&absolute_path.to_string_lossy(), relative_path, bytes)
    }
}
