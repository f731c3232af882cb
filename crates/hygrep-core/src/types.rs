//! Core domain types shared across all hygrep-core subsystems.
//!
//! These types form the API contract between modules. Changing them
//! requires updating all consumers, so they should be stable and minimal.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Embedding dimensionality. Fixed by the bundled model
/// (`snowflake-arctic-embed-s`); not configurable at runtime.
pub const DIMENSIONS: usize = 384;

/// Maximum characters retained verbatim in a [`Block`]'s `content`.
/// Longer spans are truncated and suffixed with [`ELISION_MARKER`].
pub const MAX_BLOCK_CHARS: usize = 8_000;

/// Appended to `content` when a block is truncated at [`MAX_BLOCK_CHARS`].
pub const ELISION_MARKER: &str = "\n// ... [truncated]\n";

// ---------------------------------------------------------------------------
// Language
// ---------------------------------------------------------------------------

/// Supported programming languages and document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Python (.py)
    Python,
    /// TypeScript (.ts, .tsx)
    TypeScript,
    /// JavaScript (.js, .jsx)
    JavaScript,
    /// Rust (.rs)
    Rust,
    /// Go (.go)
    Go,
    /// Java (.java)
    Java,
    /// C (.c, .h)
    C,
    /// C++ (.cpp, .cc, .cxx, .hpp, .hxx)
    Cpp,
    /// C# (.cs)
    CSharp,
    /// CSS / SCSS (.css, .scss)
    Css,
    /// Ruby (.rb)
    Ruby,
    /// PHP (.php)
    Php,
    /// Swift (.swift)
    Swift,
    /// Kotlin (.kt, .kts)
    Kotlin,
    /// HTML (.html, .htm)
    Html,
    /// Shell / Bash (.sh, .bash, .zsh)
    Shell,
    /// Markdown (.md, .mdx)
    Markdown,
    /// TOML configuration (.toml)
    Toml,
    /// YAML configuration (.yml, .yaml)
    Yaml,
    /// JSON data (.json, .jsonc)
    Json,
    /// Unknown / unsupported
    Unknown,
}

impl Language {
    /// Detect language from file extension.
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            "py" => Self::Python,
            "ts" | "tsx" => Self::TypeScript,
            "js" | "jsx" | "mjs" | "cjs" => Self::JavaScript,
            "rs" => Self::Rust,
            "go" => Self::Go,
            "java" => Self::Java,
            "c" | "h" => Self::C,
            "cpp" | "cc" | "cxx" | "hpp" | "hxx" | "hh" => Self::Cpp,
            "cs" => Self::CSharp,
            "css" | "scss" => Self::Css,
            "rb" => Self::Ruby,
            "php" => Self::Php,
            "swift" => Self::Swift,
            "kt" | "kts" => Self::Kotlin,
            "html" | "htm" => Self::Html,
            "sh" | "bash" | "zsh" => Self::Shell,
            "md" | "mdx" => Self::Markdown,
            "toml" => Self::Toml,
            "yml" | "yaml" => Self::Yaml,
            "json" | "jsonc" => Self::Json,
            _ => Self::Unknown,
        }
    }

    /// Returns the language identifier string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::TypeScript => "typescript",
            Self::JavaScript => "javascript",
            Self::Rust => "rust",
            Self::Go => "go",
            Self::Java => "java",
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::CSharp => "csharp",
            Self::Css => "css",
            Self::Ruby => "ruby",
            Self::Php => "php",
            Self::Swift => "swift",
            Self::Kotlin => "kotlin",
            Self::Html => "html",
            Self::Shell => "shell",
            Self::Markdown => "markdown",
            Self::Toml => "toml",
            Self::Yaml => "yaml",
            Self::Json => "json",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Block kind
// ---------------------------------------------------------------------------

/// The kind of declaration a block represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    /// Top-level function definition.
    Function,
    /// Function nested inside a class, struct, trait, or impl body.
    Method,
    /// Class definition.
    Class,
    /// Struct definition.
    Struct,
    /// Interface definition.
    Interface,
    /// Trait or protocol definition.
    Trait,
    /// Enum definition.
    Enum,
    /// Implementation block (Rust `impl`, etc.).
    Impl,
    /// Type alias or type definition.
    Type,
    /// Module or namespace declaration.
    Module,
    /// Anything that doesn't fit another kind, including whole-file
    /// fallback blocks for unrecognised or unparseable files.
    Other,
}

impl BlockKind {
    /// Convert to the wire/JSON string used throughout the index and CLI output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::Class => "class",
            Self::Struct => "struct",
            Self::Interface => "interface",
            Self::Trait => "trait",
            Self::Enum => "enum",
            Self::Impl => "impl",
            Self::Type => "type",
            Self::Module => "module",
            Self::Other => "other",
        }
    }

    /// Parse from the wire string, falling back to `Other` for anything unrecognised.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "function" => Self::Function,
            "method" => Self::Method,
            "class" => Self::Class,
            "struct" => Self::Struct,
            "interface" => Self::Interface,
            "trait" => Self::Trait,
            "enum" => Self::Enum,
            "impl" => Self::Impl,
            "type" => Self::Type,
            "module" => Self::Module,
            _ => Self::Other,
        }
    }
}

/// Visibility of a code symbol.
///
/// Not part of the on-disk block schema; retained as extraction-time
/// metadata that language analyzers already compute and future filters
/// may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Accessible from outside the module/crate.
    Public,
    /// Accessible only within the current crate/package.
    Crate,
    /// Accessible from parent class or subclasses.
    Protected,
    /// Accessible only within the defining scope.
    Private,
}

impl Visibility {
    /// Convert to a stable string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Crate => "crate",
            Self::Protected => "protected",
            Self::Private => "private",
        }
    }

    /// Parse from a stable string.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "public" => Self::Public,
            "crate" => Self::Crate,
            "protected" => Self::Protected,
            _ => Self::Private,
        }
    }
}

// ---------------------------------------------------------------------------
// Block — the atomic retrieval unit
// ---------------------------------------------------------------------------

/// The atomic unit of retrieval: a named, kinded, line-ranged span of source
/// text together with its embedding.
#[derive(Debug, Clone)]
pub struct Block {
    /// Path relative to the corpus root.
    pub file: PathBuf,
    /// What kind of declaration this block represents.
    pub kind: BlockKind,
    /// Identifier extracted from the declaration; empty for anonymous blocks.
    pub name: String,
    /// Starting line number (1-indexed, inclusive).
    pub start_line: u32,
    /// Ending line number (1-indexed, inclusive); always `>= start_line`.
    pub end_line: u32,
    /// Verbatim source text of the block, truncated to `MAX_BLOCK_CHARS`
    /// with an appended elision marker if truncated.
    pub content: String,
    /// SHA-256 hex digest of `content`, used for reuse-across-builds detection.
    pub content_sha: String,
    /// 384-dim L2-normalised embedding; empty until the embedding stage runs.
    pub embedding: Vec<f32>,
}

impl Block {
    /// Build the on-disk metadata record for this block (embedding omitted;
    /// it lives in the parallel vectors matrix instead).
    pub fn to_record(&self) -> BlockRecord {
        BlockRecord {
            file: self.file.clone(),
            kind: self.kind,
            name: self.name.clone(),
            start_line: self.start_line,
            end_line: self.end_line,
            content_sha: self.content_sha.clone(),
        }
    }
}

/// The on-disk representation of a [`Block`], as stored in `blocks.json`.
/// Does not carry `content` or `embedding` — only enough to identify and
/// re-render the block plus its content hash for staleness checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockRecord {
    /// Path relative to the corpus root.
    pub file: PathBuf,
    /// What kind of declaration this block represents.
    pub kind: BlockKind,
    /// Identifier extracted from the declaration.
    pub name: String,
    /// Starting line number (1-indexed, inclusive).
    pub start_line: u32,
    /// Ending line number (1-indexed, inclusive).
    pub end_line: u32,
    /// SHA-256 hex digest of the block's content at extraction time.
    pub content_sha: String,
}

// ---------------------------------------------------------------------------
// Manifest / index metadata
// ---------------------------------------------------------------------------

/// Per-file bookkeeping stored in the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    /// SHA-256 hex digest of the file's full content at index time.
    pub sha256: String,
    /// File size in bytes.
    pub size: u64,
    /// Modification time, seconds since the Unix epoch.
    pub mtime: f64,
    /// Indices into the parallel `vectors`/`blocks` arrays owned by this file.
    pub block_ids: Vec<usize>,
}

/// The index's header: model/version identity plus per-file state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Embedder version string; governs whole-index rebuild on mismatch.
    pub model_version: String,
    /// Embedding dimensionality (384).
    pub dimensions: u32,
    /// ISO-8601 build timestamp.
    pub created_at: String,
    /// Absolute path to the corpus root at build time.
    pub root_path: String,
    /// Per-file state, keyed by path relative to `root_path`.
    pub files: HashMap<String, FileRecord>,
}

// ---------------------------------------------------------------------------
// Search / query result types
// ---------------------------------------------------------------------------

/// A single ranked hit returned by the Reranker, matching the external
/// JSON result schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Path relative to the corpus root.
    pub file: PathBuf,
    /// Starting line number (1-indexed, inclusive).
    pub start_line: u32,
    /// Ending line number (1-indexed, inclusive).
    pub end_line: u32,
    /// Block kind.
    pub kind: BlockKind,
    /// Block name.
    pub name: String,
    /// Cosine similarity score, rounded to 4 decimal places.
    pub score: f64,
    /// Block content; omitted when compact output is requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}
