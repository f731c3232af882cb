//! Terminal and JSON rendering of search results.
//!
//! `hygrep-core` never formats anything for a terminal -- it returns
//! plain [`SearchResult`] values and leaves presentation, including
//! color, to this crate (spec.md §6, §7).

use anyhow::Result;
use hygrep_core::types::SearchResult;

const RESET: &str = "\x1b[0m";
const DIM: &str = "\x1b[2m";
const CYAN: &str = "\x1b[36m";
const YELLOW: &str = "\x1b[33m";

pub fn print_json(results: &[SearchResult]) -> Result<()> {
    let json = serde_json::to_string_pretty(results)?;
    println!("{json}");
    Ok(())
}

pub fn print_files_only(results: &[SearchResult]) {
    let mut seen = std::collections::BTreeSet::new();
    for result in results {
        let path = result.file.to_string_lossy().into_owned();
        if seen.insert(path.clone()) {
            println!("{path}");
        }
    }
}

pub fn print_plain(results: &[SearchResult], use_color: bool) {
    for result in results {
        let file = result.file.display();
        let kind = result.kind.as_str();
        let name = &result.name;
        let score = result.score;

        if use_color {
            println!(
                "{CYAN}{file}{RESET}:{YELLOW}{}{RESET}-{} {DIM}[{kind}]{RESET} {name} {DIM}({score:.4}){RESET}",
                result.start_line, result.end_line
            );
        } else {
            println!(
                "{file}:{}-{} [{kind}] {name} ({score:.4})",
                result.start_line, result.end_line
            );
        }

        if let Some(content) = &result.content {
            for line in content.lines() {
                println!("  {line}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hygrep_core::types::BlockKind;
    use std::path::PathBuf;

    fn sample() -> SearchResult {
        SearchResult {
            file: PathBuf::from("a.py"),
            start_line: 1,
            end_line: 3,
            kind: BlockKind::Function,
            name: "hash_password".to_string(),
            score: 0.8123,
            content: Some("def hash_password():\n    pass\n".to_string()),
        }
    }

    #[test]
    fn test_print_files_only_dedupes() {
        let results = vec![sample(), sample()];
        print_files_only(&results);
    }

    #[test]
    fn test_print_json_is_valid() {
        let results = vec![sample()];
        let json = serde_json::to_string(&results).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(parsed.is_array());
    }
}
