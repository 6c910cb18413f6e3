//! Markdown document parser: headings become sections, inline code spans
//! become symbol-reference candidates, fences and links are kept for the
//! docs graph.

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag};

use crate::content_hash;
use crate::types::{DocKind, ParsedDoc, ParsedSection};

/// Classify a markdown file by its relative path.
pub fn doc_kind(relative_path: &str) -> DocKind {
    let lower = relative_path.to_ascii_lowercase();
    let file_name = lower.rsplit('/').next().unwrap_or(&lower);
    if file_name.starts_with("readme") {
        DocKind::Readme
    } else if file_name.starts_with("changelog") {
        DocKind::Changelog
    } else if file_name.starts_with("architecture") {
        DocKind::Architecture
    } else if lower.contains("/adr") || lower.contains("adr/") || lower.contains("decisions/") {
        DocKind::Adr
    } else if lower.contains("guide") || lower.contains("docs/") {
        DocKind::Guide
    } else {
        DocKind::Other
    }
}

fn heading_level(level: HeadingLevel) -> usize {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

struct HeadingSpan {
    level: usize,
    title: String,
    start_offset: usize,
    end_offset: usize,
}

/// Parse markdown bytes into a `ParsedDoc`.
///
/// Unreadable bytes yield a doc with zero sections and the hash of the raw
/// input, mirroring the source-file failure contract.
pub fn parse_doc(file_path: &str, relative_path: &str, bytes: &[u8]) -> ParsedDoc {
    let hash = content_hash(bytes);
    let kind = doc_kind(relative_path);

    let Ok(text) = std::str::from_utf8(bytes) else {
        return ParsedDoc {
            file_path: file_path.to_string(),
            relative_path: relative_path.to_string(),
            title: default_title(relative_path),
            kind,
            sections: Vec::new(),
            hash,
            word_count: 0,
        };
    };

    // Byte offset of each line start, for offset → line translation.
    let mut line_starts = vec![0usize];
    for (i, b) in text.bytes().enumerate() {
        if b == b'\n' {
            line_starts.push(i + 1);
        }
    }
    let line_of = |offset: usize| -> usize {
        match line_starts.binary_search(&offset) {
            Ok(i) => i + 1,
            Err(i) => i,
        }
    };

    // First pass: locate headings.
    let mut headings: Vec<HeadingSpan> = Vec::new();
    let mut in_heading: Option<(usize, usize, String)> = None;
    for (event, range) in Parser::new_ext(text, Options::empty()).into_offset_iter() {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                in_heading = Some((heading_level(level), range.start, String::new()));
            }
            Event::Text(t) | Event::Code(t) => {
                if let Some((_, _, title)) = in_heading.as_mut() {
                    title.push_str(&t);
                }
            }
            Event::End(pulldown_cmark::TagEnd::Heading(_)) => {
                if let Some((level, start, title)) = in_heading.take() {
                    headings.push(HeadingSpan {
                        level,
                        title: title.trim().to_string(),
                        start_offset: start,
                        end_offset: range.end,
                    });
                }
            }
            _ => {}
        }
    }

    let title = headings
        .iter()
        .find(|h| h.level == 1)
        .map(|h| h.title.clone())
        .unwrap_or_else(|| default_title(relative_path));

    // Section boundaries: from each heading to the next.
    let mut sections: Vec<ParsedSection> = headings
        .iter()
        .enumerate()
        .map(|(index, heading)| {
            let body_start = heading.end_offset.min(text.len());
            let body_end = headings
                .get(index + 1)
                .map(|next| next.start_offset)
                .unwrap_or(text.len());
            let content = text[body_start..body_end].trim().to_string();
            let word_count = content.split_whitespace().count();
            ParsedSection {
                index,
                heading: heading.title.clone(),
                level: heading.level,
                content,
                start_line: line_of(heading.start_offset),
                word_count,
                backtick_refs: Vec::new(),
                code_fences: Vec::new(),
                links: Vec::new(),
            }
        })
        .collect();

    // Second pass: bucket inline code, fences, and links per section.
    let section_start = |idx: usize| headings[idx].start_offset;
    let section_for = |offset: usize| -> Option<usize> {
        if headings.is_empty() || offset < section_start(0) {
            return None;
        }
        let mut found = 0;
        for (i, h) in headings.iter().enumerate() {
            if h.start_offset <= offset {
                found = i;
            } else {
                break;
            }
        }
        Some(found)
    };

    for (event, range) in Parser::new_ext(text, Options::empty()).into_offset_iter() {
        let Some(idx) = section_for(range.start) else {
            continue;
        };
        match event {
            Event::Code(code) => {
                let code = code.trim().to_string();
                if !code.is_empty() && !sections[idx].backtick_refs.contains(&code) {
                    sections[idx].backtick_refs.push(code);
                }
            }
            Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(lang))) => {
                sections[idx].code_fences.push(lang.trim().to_string());
            }
            Event::Start(Tag::Link { dest_url, .. }) => {
                sections[idx].links.push(dest_url.to_string());
            }
            _ => {}
        }
    }

    let word_count = sections.iter().map(|s| s.word_count).sum();

    ParsedDoc {
        file_path: file_path.to_string(),
        relative_path: relative_path.to_string(),
        title,
        kind,
        sections,
        hash,
        word_count,
    }
}

fn default_title(relative_path: &str) -> String {
    relative_path
        .rsplit('/')
        .next()
        .unwrap_or(relative_path)
        .trim_end_matches(".md")
        .to_string()
}
