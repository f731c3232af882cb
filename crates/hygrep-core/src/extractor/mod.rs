//! Block Extractor: turns a parsed file's [`StructuralElement`]s into the
//! [`Block`]s that get embedded and indexed (spec.md §4.2).
//!
//! Leading doc comments/docstrings are already folded into each
//! [`StructuralElement`]'s `line_start`/`content` by the per-language
//! analyzer that produced it (see `parser::languages::rust` for the
//! clearest example) -- this module doesn't re-derive that. Its own job
//! is purely post-processing: truncate oversized content, hash it,
//! order blocks deterministically, and fall back to a whole-file block
//! when parsing didn't produce anything usable.

use sha2::{Digest, Sha256};
use std::path::Path;

use crate::error::HygrepResult;
use crate::parser::{self, StructuralElement};
use crate::types::{Block, BlockKind, Language, ELISION_MARKER, MAX_BLOCK_CHARS};

/// Extract [`Block`]s from a file's source text.
///
/// `file` is the path stored on each block, relative to the corpus
/// root. On parse failure, or for a language with no registered
/// analyzer, a single whole-file `other` block is emitted instead
/// (spec.md §4.2 edge case) rather than propagating the parse error --
/// callers that want to know about parse failures should inspect the
/// returned blocks (a single `Other` block spanning the whole file is
/// the tell) or call [`parser::parse_file`] directly.
pub fn extract_blocks(file: &Path, source: &str, language: Language) -> Vec<Block> {
    match parser::parse_file(file, source.as_bytes(), language) {
        Ok(elements) if !elements.is_empty() => {
            let mut blocks: Vec<Block> = elements
                .into_iter()
                .map(|el| block_from_element(file, el))
                .collect();
            order_blocks(&mut blocks);
            blocks
        }
        _ => vec![whole_file_block(file, source)],
    }
}

/// Try to parse and extract, surfacing the parse error instead of
/// silently falling back. Used by callers (e.g. `status`/`build -v`)
/// that want to report per-file parse failures.
pub fn extract_blocks_strict(
    file: &Path,
    source: &str,
    language: Language,
) -> HygrepResult<Vec<Block>> {
    let elements = parser::parse_file(file, source.as_bytes(), language)?;
    if elements.is_empty() {
        return Ok(vec![whole_file_block(file, source)]);
    }
    let mut blocks: Vec<Block> = elements
        .into_iter()
        .map(|el| block_from_element(file, el))
        .collect();
    order_blocks(&mut blocks);
    Ok(blocks)
}

fn block_from_element(file: &Path, el: StructuralElement) -> Block {
    let content = truncate_content(el.content);
    let content_sha = hash_content(&content);
    Block {
        file: file.to_path_buf(),
        kind: el.kind,
        name: el.name,
        start_line: el.line_start,
        end_line: el.line_end,
        content,
        content_sha,
        embedding: Vec::new(),
    }
}

fn whole_file_block(file: &Path, source: &str) -> Block {
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let line_count = source.lines().count().max(1) as u32;
    let content = truncate_content(source.to_string());
    let content_sha = hash_content(&content);
    Block {
        file: file.to_path_buf(),
        kind: BlockKind::Other,
        name,
        start_line: 1,
        end_line: line_count,
        content,
        content_sha,
        embedding: Vec::new(),
    }
}

/// Truncate to [`MAX_BLOCK_CHARS`] characters, appending
/// [`ELISION_MARKER`] if truncation occurred. Operates on char
/// boundaries, not bytes, so multi-byte UTF-8 content is never split.
fn truncate_content(content: String) -> String {
    if content.chars().count() <= MAX_BLOCK_CHARS {
        return content;
    }
    let mut truncated: String = content.chars().take(MAX_BLOCK_CHARS).collect();
    truncated.push_str(ELISION_MARKER);
    truncated
}

fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Deterministic ordering within a file: by `start_line` ascending,
/// ties broken by `end_line` descending (outer/containing blocks, like
/// an `impl` wrapping its methods, sort before their nested children).
fn order_blocks(blocks: &mut [Block]) {
    blocks.sort_by(|a, b| {
        a.start_line
            .cmp(&b.start_line)
            .then(b.end_line.cmp(&a.end_line))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markdown_extracts_heading_sections() {
        let blocks = extract_blocks(Path::new("README.md"), "# hello\n\nworld\n", Language::Markdown);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind, BlockKind::Module);
        assert_eq!(blocks[0].name, "hello");
    }

    #[test]
    fn test_whole_file_fallback_for_unrecognised_language() {
        let blocks = extract_blocks(Path::new("data.bin"), "\u{fffd}garbage\n", Language::Unknown);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind, BlockKind::Other);
        assert_eq!(blocks[0].name, "data.bin");
    }

    #[test]
    fn test_css_file_uses_dedicated_analyzer() {
        let blocks = extract_blocks(
            Path::new("styles.css"),
            ".button {\n  color: red;\n}\n",
            Language::Css,
        );
        assert!(!blocks.is_empty());
        assert_ne!(blocks[0].name, "styles.css");
    }

    #[test]
    fn test_whole_file_fallback_for_unparseable_code() {
        let blocks = extract_blocks(Path::new("broken.py"), "def (((", Language::Python);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind, BlockKind::Other);
    }

    #[test]
    fn test_truncate_content_under_limit_unchanged() {
        let short = "fn main() {}".to_string();
        assert_eq!(truncate_content(short.clone()), short);
    }

    #[test]
    fn test_truncate_content_over_limit_elided() {
        let long = "x".repeat(MAX_BLOCK_CHARS + 500);
        let truncated = truncate_content(long);
        assert!(truncated.ends_with(ELISION_MARKER));
        assert_eq!(
            truncated.chars().count(),
            MAX_BLOCK_CHARS + ELISION_MARKER.chars().count()
        );
    }

    #[test]
    fn test_content_hash_stable() {
        assert_eq!(hash_content("abc"), hash_content("abc"));
        assert_ne!(hash_content("abc"), hash_content("abd"));
    }

    #[test]
    fn test_order_blocks_start_line_then_end_line_desc() {
        let mk = |s: u32, e: u32| Block {
            file: "f.rs".into(),
            kind: BlockKind::Function,
            name: String::new(),
            start_line: s,
            end_line: e,
            content: String::new(),
            content_sha: String::new(),
            embedding: Vec::new(),
        };
        let mut blocks = vec![mk(5, 6), mk(1, 10), mk(1, 20)];
        order_blocks(&mut blocks);
        assert_eq!(
            blocks.iter().map(|b| (b.start_line, b.end_line)).collect::<Vec<_>>(),
            vec![(1, 20), (1, 10), (5, 6)]
        );
    }

    #[test]
    fn test_extract_blocks_python_function() {
        let source = "def greet(name):\n    \"\"\"Say hi.\"\"\"\n    return f\"hi {name}\"\n";
        let blocks = extract_blocks(Path::new("greet.py"), source, Language::Python);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind, BlockKind::Function);
        assert_eq!(blocks[0].name, "greet");
    }
}
