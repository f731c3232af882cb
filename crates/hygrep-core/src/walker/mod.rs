//! File discovery: walks the corpus root, applying `.gitignore`,
//! `.hhgignore`, and binary-extension filtering (spec.md §4.6).
//!
//! Grounded on the `ignore`-crate walking pattern used for workspace
//! discovery elsewhere in the retrieval corpus (nearest-wins ignore
//! file layering via `WalkBuilder::standard_filters` plus a
//! project-specific override list), adapted to also exclude the
//! index's own `.hhg/` directory and to support `.hhgignore` as an
//! additional ignore-file name alongside the standard ones.

use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

use crate::config::ScanningConfig;
use crate::error::{HygrepError, HygrepResult};

/// Binary/media extensions never walked or scanned, regardless of
/// ignore files.
const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "svg", "pdf", "zip", "tar", "gz", "bz2",
    "xz", "7z", "rar", "exe", "dll", "so", "dylib", "a", "o", "class", "jar", "wasm", "woff",
    "woff2", "ttf", "otf", "eot", "mp3", "mp4", "avi", "mov", "mkv", "wav", "flac", "db",
    "sqlite", "sqlite3", "lock",
];

/// A file discovered by the walker, with its path relative to the
/// corpus root already computed.
#[derive(Debug, Clone)]
pub struct WalkEntry {
    /// Absolute path on disk.
    pub abs_path: PathBuf,
    /// Path relative to the corpus root; stored on every [`crate::types::Block`].
    pub rel_path: PathBuf,
}

/// Walk `root`, honouring `.gitignore`/`.ignore`/`.hhgignore` files
/// (nearest directory wins, per `ignore`'s standard precedence), the
/// extra `exclude_patterns` from config, the binary-extension
/// denylist, and always excluding `.hhg/` itself. Symlinks outside
/// `root` are never followed; symlinks inside it are followed only
/// when `scanning.follow_symlinks` is set.
///
/// Returns entries sorted by relative path for deterministic output.
pub fn walk(root: &Path, scanning: &ScanningConfig) -> HygrepResult<Vec<WalkEntry>> {
    if !root.exists() {
        return Err(HygrepError::Path {
            path: root.to_path_buf(),
            reason: "does not exist".into(),
        });
    }
    if !root.is_dir() {
        return Err(HygrepError::Path {
            path: root.to_path_buf(),
            reason: "is not a directory".into(),
        });
    }

    let root = root
        .canonicalize()
        .map_err(|e| HygrepError::Path {
            path: root.to_path_buf(),
            reason: format!("failed to canonicalize: {e}"),
        })?;

    let mut overrides = ignore::overrides::OverrideBuilder::new(&root);
    overrides.add("!/.hhg/")?;
    for pattern in &scanning.exclude_patterns {
        let negated = format!("!{pattern}");
        overrides.add(&negated)?;
    }
    let overrides = overrides
        .build()
        .map_err(|e| HygrepError::Internal(format!("invalid exclude pattern: {e}")))?;

    let mut builder = WalkBuilder::new(&root);
    builder
        .standard_filters(true)
        .add_custom_ignore_filename(".hhgignore")
        .follow_links(scanning.follow_symlinks)
        .overrides(overrides);

    if scanning.num_threads > 0 {
        builder.threads(scanning.num_threads);
    }

    let mut entries = Vec::new();
    for result in builder.build() {
        let dent = match result {
            Ok(d) => d,
            Err(err) => {
                tracing::debug!(error = %err, "walk entry error, skipping");
                continue;
            }
        };

        if !dent.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }

        let abs_path = dent.into_path();

        if is_binary_extension(&abs_path) {
            continue;
        }

        let rel_path = match abs_path.strip_prefix(&root) {
            Ok(p) => p.to_path_buf(),
            Err(_) => continue,
        };

        entries.push(WalkEntry { abs_path, rel_path });
    }

    entries.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(entries)
}

fn is_binary_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| BINARY_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl From<ignore::Error> for HygrepError {
    fn from(e: ignore::Error) -> Self {
        HygrepError::Internal(format!("ignore error: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scanning_defaults() -> ScanningConfig {
        crate::config::Config::defaults(Path::new("/tmp")).scanning
    }

    #[test]
    fn test_walk_missing_root_errors() {
        let result = walk(Path::new("/nonexistent/path/xyz"), &scanning_defaults());
        assert!(matches!(result, Err(HygrepError::Path { .. })));
    }

    #[test]
    fn test_walk_finds_files_sorted_and_skips_hhg_and_binaries() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();

        fs::write(root.join("b.py"), "print(1)\n").unwrap();
        fs::write(root.join("a.rs"), "fn main() {}\n").unwrap();
        fs::write(root.join("image.png"), [0u8; 4]).unwrap();

        fs::create_dir_all(root.join(".hhg")).unwrap();
        fs::write(root.join(".hhg").join("manifest.json"), "{}").unwrap();

        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join(".git").join("config"), "").unwrap();

        let entries = walk(root, &scanning_defaults()).unwrap();
        let rel: Vec<_> = entries
            .iter()
            .map(|e| e.rel_path.to_string_lossy().into_owned())
            .collect();

        assert_eq!(rel, vec!["a.rs", "b.py"]);
    }

    #[test]
    fn test_walk_honours_gitignore() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();

        fs::write(root.join(".gitignore"), "ignored.py\n").unwrap();
        fs::write(root.join("ignored.py"), "x = 1\n").unwrap();
        fs::write(root.join("kept.py"), "y = 2\n").unwrap();

        let entries = walk(root, &scanning_defaults()).unwrap();
        let rel: Vec<_> = entries
            .iter()
            .map(|e| e.rel_path.to_string_lossy().into_owned())
            .collect();

        assert_eq!(rel, vec!["kept.py"]);
    }

    #[test]
    fn test_walk_honours_hhgignore() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();

        fs::write(root.join(".hhgignore"), "vendor/\n").unwrap();
        fs::create_dir_all(root.join("vendor")).unwrap();
        fs::write(root.join("vendor").join("lib.py"), "x = 1\n").unwrap();
        fs::write(root.join("main.py"), "y = 2\n").unwrap();

        let entries = walk(root, &scanning_defaults()).unwrap();
        let rel: Vec<_> = entries
            .iter()
            .map(|e| e.rel_path.to_string_lossy().into_owned())
            .collect();

        assert_eq!(rel, vec!["main.py"]);
    }
}
