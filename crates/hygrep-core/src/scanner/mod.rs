//! Scanner: the lexical recall phase (spec.md §4.1).
//!
//! Walks the tree (via [`crate::walker`]), then runs a compiled
//! case-insensitive regex over every candidate file in parallel,
//! producing an ordered `path -> content` map of files that matched.
//! This is deliberately a cheap, high-recall filter -- precision comes
//! later, from the reranker's cosine scoring over extracted blocks.

use rayon::prelude::*;
use regex::{Regex, RegexBuilder};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::ScanningConfig;
use crate::error::{HygrepError, HygrepResult};
use crate::walker;

/// Regex metacharacters that, if present in the raw query, suppress
/// the space-to-alternation query transform.
const REGEX_METACHARS: &[char] = &['*', '(', ')', '[', ']', '\\', '|', '+', '?', '^', '$'];

/// Result of a recall scan: the matched files plus bookkeeping for the
/// unreadable-file warning threshold.
#[derive(Debug, Default)]
pub struct ScanResult {
    /// Matched files, in sorted-by-path order.
    pub files: BTreeMap<PathBuf, String>,
    /// Files skipped because they couldn't be read.
    pub unreadable_count: usize,
    /// Files whose content was truncated at the per-file byte cap.
    pub truncated: Vec<PathBuf>,
}

/// Rewrite a raw query per spec.md §4.1: if it contains no regex
/// metacharacter and contains a space, spaces become alternation
/// (`login auth` -> `login|auth`). Otherwise the query is returned
/// unchanged.
pub fn transform_query(raw: &str) -> String {
    let has_metachar = raw.chars().any(|c| REGEX_METACHARS.contains(&c));
    if has_metachar || !raw.contains(' ') {
        return raw.to_string();
    }
    raw.split_whitespace()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("|")
}

/// Compile the (possibly transformed) query into a case-insensitive regex.
pub fn compile_pattern(raw: &str) -> HygrepResult<Regex> {
    let pattern = transform_query(raw);
    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| HygrepError::Argument(format!("invalid query pattern: {e}")))
}

/// Scan `root` for files matching `pattern`, subject to an optional
/// extension allowlist and exclude globs layered on top of
/// `scanning`'s ignore-file rules.
pub fn scan(
    root: &Path,
    pattern: &Regex,
    scanning: &ScanningConfig,
    extensions: Option<&[String]>,
) -> HygrepResult<ScanResult> {
    let entries = walker::walk(root, scanning)?;

    let filtered: Vec<_> = entries
        .into_iter()
        .filter(|e| match extensions {
            None => true,
            Some(exts) => e
                .abs_path
                .extension()
                .and_then(|x| x.to_str())
                .map(|ext| exts.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)))
                .unwrap_or(false),
        })
        .collect();

    let max_bytes = scanning.max_scan_bytes as usize;

    let partials: Vec<ScanOutcome> = if scanning.num_threads == 1 {
        filtered
            .iter()
            .map(|e| scan_one(e, pattern, max_bytes))
            .collect()
    } else {
        filtered
            .par_iter()
            .map(|e| scan_one(e, pattern, max_bytes))
            .collect()
    };

    let mut result = ScanResult::default();
    for outcome in partials {
        match outcome {
            ScanOutcome::Matched {
                rel_path,
                content,
                truncated,
            } => {
                if truncated {
                    result.truncated.push(rel_path.clone());
                }
                result.files.insert(rel_path, content);
            }
            ScanOutcome::NoMatch => {}
            ScanOutcome::Unreadable => result.unreadable_count += 1,
        }
    }

    if result.unreadable_count > scanning.unreadable_warn_threshold {
        tracing::warn!(
            count = result.unreadable_count,
            threshold = scanning.unreadable_warn_threshold,
            "many files were unreadable during scan"
        );
    }

    Ok(result)
}

enum ScanOutcome {
    Matched {
        rel_path: PathBuf,
        content: String,
        truncated: bool,
    },
    NoMatch,
    Unreadable,
}

fn scan_one(entry: &walker::WalkEntry, pattern: &Regex, max_bytes: usize) -> ScanOutcome {
    let bytes = match std::fs::read(&entry.abs_path) {
        Ok(b) => b,
        Err(_) => return ScanOutcome::Unreadable,
    };

    let truncated = bytes.len() > max_bytes;
    let capped = if truncated { &bytes[..max_bytes] } else { &bytes[..] };

    let content = match std::str::from_utf8(capped) {
        Ok(s) => s.to_string(),
        Err(_) => return ScanOutcome::Unreadable,
    };

    if pattern.is_match(&content) {
        ScanOutcome::Matched {
            rel_path: entry.rel_path.clone(),
            content,
            truncated,
        }
    } else {
        ScanOutcome::NoMatch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_transform_query_spaces_to_alternation() {
        assert_eq!(transform_query("login auth"), "login|auth");
    }

    #[test]
    fn test_transform_query_unchanged_with_metachar() {
        assert_eq!(transform_query("login auth|x"), "login auth|x");
        assert_eq!(transform_query("fn(.*)"), "fn(.*)");
    }

    #[test]
    fn test_transform_query_unchanged_without_space() {
        assert_eq!(transform_query("login"), "login");
    }

    #[test]
    fn test_scan_finds_matching_files_sorted() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::write(root.join("b.py"), "def hash_password(): pass\n").unwrap();
        fs::write(root.join("a.py"), "def hash_password(): pass\n").unwrap();
        fs::write(root.join("c.py"), "def other(): pass\n").unwrap();

        let scanning = crate::config::Config::defaults(root).scanning;
        let pattern = compile_pattern("hash_password").unwrap();
        let result = scan(root, &pattern, &scanning, None).unwrap();

        let keys: Vec<_> = result.files.keys().map(|p| p.to_string_lossy().into_owned()).collect();
        assert_eq!(keys, vec!["a.py", "b.py"]);
    }

    #[test]
    fn test_scan_respects_extension_filter() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::write(root.join("a.py"), "needle\n").unwrap();
        fs::write(root.join("a.rs"), "needle\n").unwrap();

        let scanning = crate::config::Config::defaults(root).scanning;
        let pattern = compile_pattern("needle").unwrap();
        let exts = vec!["rs".to_string()];
        let result = scan(root, &pattern, &scanning, Some(&exts)).unwrap();

        assert_eq!(result.files.len(), 1);
        assert!(result.files.contains_key(Path::new("a.rs")));
    }

    #[test]
    fn test_scan_empty_tree_returns_empty_map() {
        let tmp = tempfile::tempdir().unwrap();
        let scanning = crate::config::Config::defaults(tmp.path()).scanning;
        let pattern = compile_pattern("anything").unwrap();
        let result = scan(tmp.path(), &pattern, &scanning, None).unwrap();
        assert!(result.files.is_empty());
    }
}
