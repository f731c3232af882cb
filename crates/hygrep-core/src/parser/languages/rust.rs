//! Rust structural extractor.
//!
//! Extracts functions, structs, enums, traits, impls, type aliases, and
//! modules from Rust source files using tree-sitter.
//!
//! ## Rust AST node types (tree-sitter-rust)
//!
//! - `function_item` -> Function (or Method, when nested in an impl/trait body)
//! - `struct_item` -> Struct
//! - `enum_item` -> Enum
//! - `trait_item` -> Trait
//! - `impl_item` -> Impl
//! - `const_item` / `static_item` -> skipped (not a recognised block kind)
//! - `type_item` -> Type
//! - `mod_item` -> Module

use std::path::Path;

use crate::parser::{LanguageAnalyzer, StructuralElement};
use crate::types::{BlockKind, Visibility};

/// Analyzer for Rust source files.
pub struct RustAnalyzer;

impl LanguageAnalyzer for RustAnalyzer {
    fn language_id(&self) -> &str {
        "rust"
    }

    fn tree_sitter_language(&self) -> tree_sitter::Language {
        tree_sitter_rust::LANGUAGE.into()
    }

    fn extract_structure(
        &self,
        tree: &tree_sitter::Tree,
        source: &[u8],
        file_path: &Path,
    ) -> Vec<StructuralElement> {
        let mut elements = Vec::new();
        let module_name = file_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("mod");

        let root = tree.root_node();
        self.walk_node(root, source, module_name, &[], &mut elements, false);
        elements
    }
}

impl RustAnalyzer {
    /// Recursively walk the AST and extract structural elements.
    ///
    /// `nested` tracks whether we're inside an `impl`/`trait` body, which
    /// makes function items methods rather than top-level functions.
    fn walk_node(
        &self,
        node: tree_sitter::Node<'_>,
        source: &[u8],
        module_name: &str,
        scope_path: &[String],
        elements: &mut Vec<StructuralElement>,
        nested: bool,
    ) {
        let mut cursor = node.walk();

        for child in node.children(&mut cursor) {
            match child.kind() {
                "function_item" => {
                    let kind = if nested {
                        BlockKind::Method
                    } else {
                        BlockKind::Function
                    };
                    if let Some(elem) =
                        self.extract_named(child, source, module_name, scope_path, kind)
                    {
                        elements.push(elem);
                    }
                }
                "struct_item" => {
                    if let Some(elem) = self.extract_named(
                        child,
                        source,
                        module_name,
                        scope_path,
                        BlockKind::Struct,
                    ) {
                        elements.push(elem);
                    }
                }
                "enum_item" => {
                    if let Some(elem) =
                        self.extract_named(child, source, module_name, scope_path, BlockKind::Enum)
                    {
                        elements.push(elem);
                    }
                }
                "trait_item" => {
                    if let Some(elem) = self.extract_named(
                        child,
                        source,
                        module_name,
                        scope_path,
                        BlockKind::Trait,
                    ) {
                        let mut inner_scope = scope_path.to_vec();
                        inner_scope.push(elem.name.clone());
                        if let Some(body) = child.child_by_field_name("body") {
                            self.walk_node(body, source, module_name, &inner_scope, elements, true);
                        }
                        elements.push(elem);
                    }
                }
                "impl_item" => {
                    if let Some(elem) = self.extract_impl(child, source, module_name, scope_path) {
                        let mut inner_scope = scope_path.to_vec();
                        inner_scope.push(elem.name.clone());
                        if let Some(body) = child.child_by_field_name("body") {
                            self.walk_node(body, source, module_name, &inner_scope, elements, true);
                        }
                        elements.push(elem);
                    }
                }
                "type_item" => {
                    if let Some(elem) =
                        self.extract_named(child, source, module_name, scope_path, BlockKind::Type)
                    {
                        elements.push(elem);
                    }
                }
                "mod_item" => {
                    self.handle_mod_item(child, source, module_name, scope_path, elements);
                }
                "const_item" | "static_item" | "attribute_item" => {
                    // Not a recognised block kind; skipped.
                }
                _ => {
                    if child.child_count() > 0 && child.kind() != "string_literal" {
                        self.walk_node(child, source, module_name, scope_path, elements, nested);
                    }
                }
            }
        }
    }

    /// Extract a named declaration (function, struct, enum, trait signature, type alias).
    fn extract_named(
        &self,
        node: tree_sitter::Node<'_>,
        source: &[u8],
        module_name: &str,
        scope_path: &[String],
        kind: BlockKind,
    ) -> Option<StructuralElement> {
        let name_node = node.child_by_field_name("name")?;
        let name = node_text(name_node, source).to_string();

        let symbol_path = build_symbol_path(module_name, scope_path, &name);
        let visibility = extract_rust_visibility(node, source);
        let (doc_comment, doc_start) = extract_rust_doc_comment(node, source);
        let references = extract_use_references(node, source);

        let line_start = doc_start.unwrap_or(node.start_position().row as u32 + 1);

        Some(StructuralElement {
            symbol_path,
            name,
            kind,
            visibility,
            line_start,
            line_end: node.end_position().row as u32 + 1,
            content: span_text(node, source, line_start),
            doc_comment,
            references,
        })
    }

    /// Extract an `impl` block.
    fn extract_impl(
        &self,
        node: tree_sitter::Node<'_>,
        source: &[u8],
        module_name: &str,
        scope_path: &[String],
    ) -> Option<StructuralElement> {
        let type_node = node.child_by_field_name("type")?;
        let type_name = node_text(type_node, source).to_string();

        let name = if let Some(trait_node) = node.child_by_field_name("trait") {
            let trait_name = node_text(trait_node, source);
            format!("impl {trait_name} for {type_name}")
        } else {
            format!("impl {type_name}")
        };

        let symbol_path = build_symbol_path(module_name, scope_path, &name);

        Some(StructuralElement {
            symbol_path,
            name,
            kind: BlockKind::Impl,
            visibility: Visibility::Public,
            line_start: node.start_position().row as u32 + 1,
            line_end: node.end_position().row as u32 + 1,
            content: node_text(node, source).to_string(),
            doc_comment: None,
            references: Vec::new(),
        })
    }

    /// Handle a `mod` item -- might be inline (`mod x { ... }`) or external (`mod x;`).
    fn handle_mod_item(
        &self,
        node: tree_sitter::Node<'_>,
        source: &[u8],
        module_name: &str,
        scope_path: &[String],
        elements: &mut Vec<StructuralElement>,
    ) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = node_text(name_node, source).to_string();

        let symbol_path = build_symbol_path(module_name, scope_path, &name);
        let (doc_comment, doc_start) = extract_rust_doc_comment(node, source);
        let line_start = doc_start.unwrap_or(node.start_position().row as u32 + 1);
        elements.push(StructuralElement {
            symbol_path,
            name: name.clone(),
            kind: BlockKind::Module,
            visibility: extract_rust_visibility(node, source),
            line_start,
            line_end: node.end_position().row as u32 + 1,
            content: span_text(node, source, line_start),
            doc_comment,
            references: Vec::new(),
        });

        if let Some(body) = node.child_by_field_name("body") {
            let mut inner_scope = scope_path.to_vec();
            inner_scope.push(name);
            self.walk_node(body, source, module_name, &inner_scope, elements, false);
        }
    }
}

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

/// Get the text content of a tree-sitter node.
fn node_text<'a>(node: tree_sitter::Node<'_>, source: &'a [u8]) -> &'a str {
    let start = node.start_byte();
    let end = node.end_byte();
    std::str::from_utf8(&source[start..end]).unwrap_or("")
}

/// Reconstruct the source span from `line_start` through the node's end line,
/// so that a leading doc comment folded into `line_start` is included.
fn span_text(node: tree_sitter::Node<'_>, source: &[u8], line_start: u32) -> String {
    let node_start_line = node.start_position().row as u32 + 1;
    if line_start == node_start_line {
        return node_text(node, source).to_string();
    }
    let full = std::str::from_utf8(source).unwrap_or("");
    let lines: Vec<&str> = full.lines().collect();
    let end_line = node.end_position().row as u32 + 1;
    let start_idx = (line_start.saturating_sub(1)) as usize;
    let end_idx = (end_line as usize).min(lines.len());
    if start_idx >= end_idx {
        return node_text(node, source).to_string();
    }
    lines[start_idx..end_idx].join("\n")
}

/// Build a fully-qualified symbol path.
fn build_symbol_path(module_name: &str, scope_path: &[String], name: &str) -> String {
    let mut parts = vec![module_name.to_string()];
    parts.extend_from_slice(scope_path);
    parts.push(name.to_string());
    parts.join("::")
}

/// Extract Rust visibility from the node's `visibility_modifier` child.
fn extract_rust_visibility(node: tree_sitter::Node<'_>, source: &[u8]) -> Visibility {
    let mut cursor = node.walk();

    for child in node.children(&mut cursor) {
        if child.kind() == "visibility_modifier" {
            let text = node_text(child, source);
            return match text {
                "pub" => Visibility::Public,
                "pub(crate)" => Visibility::Crate,
                "pub(super)" => Visibility::Protected,
                _ if text.starts_with("pub(") => Visibility::Crate,
                _ => Visibility::Private,
            };
        }
    }

    Visibility::Private
}

/// Extract doc comments (`///` and `//!`) preceding a node, returning the
/// joined comment text plus the 1-indexed line at which the comment block
/// starts (so callers can extend the block's span to include it).
fn extract_rust_doc_comment(node: tree_sitter::Node<'_>, source: &[u8]) -> (Option<String>, Option<u32>) {
    let mut doc_lines = Vec::new();
    let mut first_line = None;
    let mut current = node.prev_sibling();

    while let Some(sibling) = current {
        let text = node_text(sibling, source).trim();

        if text.starts_with("///") {
            let line = text.strip_prefix("///").unwrap_or("").trim();
            doc_lines.push(line.to_string());
            first_line = Some(sibling.start_position().row as u32 + 1);
            current = sibling.prev_sibling();
        } else if text.starts_with("//!") {
            let line = text.strip_prefix("//!").unwrap_or("").trim();
            doc_lines.push(line.to_string());
            first_line = Some(sibling.start_position().row as u32 + 1);
            current = sibling.prev_sibling();
        } else if sibling.kind() == "attribute_item" {
            current = sibling.prev_sibling();
        } else {
            break;
        }
    }

    if doc_lines.is_empty() {
        return (None, None);
    }

    doc_lines.reverse();
    (Some(doc_lines.join("\n")), first_line)
}

/// Quick reference extraction from use declarations within a node.
fn extract_use_references(_node: tree_sitter::Node<'_>, _source: &[u8]) -> Vec<String> {
    Vec::new()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_file;
    use crate::types::Language;
    use std::path::Path;

    fn parse_rust(source: &str) -> Vec<StructuralElement> {
        parse_file(Path::new("test.rs"), source.as_bytes(), Language::Rust)
            .expect("parse should succeed")
    }

    #[test]
    fn test_simple_function() {
        let src = r#"
fn hello(name: &str) -> String {
    format!("Hello, {}!", name)
}
"#;
        let elements = parse_rust(src);
        let func = elements.iter().find(|e| e.name == "hello").expect("hello");
        assert_eq!(func.kind, BlockKind::Function);
        assert_eq!(func.visibility, Visibility::Private);
    }

    #[test]
    fn test_pub_function() {
        let src = r#"
pub fn public_api(x: i32) -> i32 {
    x * 2
}
"#;
        let elements = parse_rust(src);
        let func = elements
            .iter()
            .find(|e| e.name == "public_api")
            .expect("public_api");
        assert_eq!(func.visibility, Visibility::Public);
    }

    #[test]
    fn test_struct() {
        let src = r#"
/// A configuration object.
pub struct Config {
    pub name: String,
    port: u16,
}
"#;
        let elements = parse_rust(src);
        let s = elements.iter().find(|e| e.name == "Config").expect("Config");
        assert_eq!(s.kind, BlockKind::Struct);
        assert_eq!(s.visibility, Visibility::Public);
        assert_eq!(s.doc_comment.as_deref(), Some("A configuration object."));
        // Leading doc comment folded into the block's span.
        assert!(s.content.contains("A configuration object."));
    }

    #[test]
    fn test_enum() {
        let src = r#"
pub enum Color {
    Red,
    Green,
    Blue,
}
"#;
        let elements = parse_rust(src);
        let e = elements.iter().find(|e| e.name == "Color").expect("Color");
        assert_eq!(e.kind, BlockKind::Enum);
    }

    #[test]
    fn test_trait() {
        let src = r#"
pub trait Drawable {
    fn draw(&self);
    fn area(&self) -> f64;
}
"#;
        let elements = parse_rust(src);
        let t = elements.iter().find(|e| e.name == "Drawable").expect("Drawable");
        assert_eq!(t.kind, BlockKind::Trait);

        let draw = elements.iter().find(|e| e.name == "draw").expect("draw");
        assert_eq!(draw.kind, BlockKind::Method);
    }

    #[test]
    fn test_impl_block_methods() {
        let src = r#"
impl Config {
    pub fn new() -> Self {
        Config { name: String::new(), port: 8080 }
    }

    fn validate(&self) -> bool {
        true
    }
}
"#;
        let elements = parse_rust(src);

        let imp = elements.iter().find(|e| e.name == "impl Config").expect("impl Config");
        assert_eq!(imp.kind, BlockKind::Impl);

        let new_fn = elements.iter().find(|e| e.name == "new").expect("new");
        assert_eq!(new_fn.kind, BlockKind::Method);
        assert_eq!(new_fn.visibility, Visibility::Public);

        let validate_fn = elements.iter().find(|e| e.name == "validate").expect("validate");
        assert_eq!(validate_fn.kind, BlockKind::Method);
    }

    #[test]
    fn test_trait_impl() {
        let src = r#"
impl Display for Config {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
"#;
        let elements = parse_rust(src);
        let imp = elements
            .iter()
            .find(|e| e.name.contains("Display") && e.name.contains("Config"))
            .expect("impl Display for Config");
        assert_eq!(imp.kind, BlockKind::Impl);
    }

    #[test]
    fn test_type_alias() {
        let src = r#"
pub type Result<T> = std::result::Result<T, Error>;
"#;
        let elements = parse_rust(src);
        let t = elements.iter().find(|e| e.name == "Result").expect("Result");
        assert_eq!(t.kind, BlockKind::Type);
    }

    #[test]
    fn test_module() {
        let src = r#"
mod tests {
    fn helper() {}
}
"#;
        let elements = parse_rust(src);
        let m = elements.iter().find(|e| e.name == "tests").expect("tests");
        assert_eq!(m.kind, BlockKind::Module);

        let h = elements.iter().find(|e| e.name == "helper").expect("helper");
        assert_eq!(h.kind, BlockKind::Function);
        assert!(h.symbol_path.contains("tests::helper"));
    }

    #[test]
    fn test_multiline_doc_comment() {
        let src = r#"
/// Perform the computation.
///
/// This function does amazing things.
/// It takes a value and doubles it.
pub fn compute(x: i32) -> i32 {
    x * 2
}
"#;
        let elements = parse_rust(src);
        let func = elements.iter().find(|e| e.name == "compute").expect("compute");
        let doc = func.doc_comment.as_ref().expect("doc");
        assert!(doc.contains("Perform the computation"));
        assert!(doc.contains("doubles it"));
    }

    #[test]
    fn test_empty_file() {
        assert!(parse_rust("").is_empty());
    }

    #[test]
    fn test_symbol_path_uses_double_colon() {
        let src = r#"
impl Config {
    pub fn new() -> Self {
        Config {}
    }
}
"#;
        let elements = parse_rust(src);
        let new_fn = elements.iter().find(|e| e.name == "new").expect("new");
        assert!(new_fn.symbol_path.contains("::"));
    }
}
