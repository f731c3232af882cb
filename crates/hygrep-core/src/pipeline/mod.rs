//! Engine: the top-level orchestrator wiring every subsystem together
//! (spec.md §1-5). This is the primary public entry point of
//! hygrep-core.
//!
//! ```text
//! build:  Walker -> Extractor -> Embedder -> Index
//! query:  Scanner -> (indexed: Index, ephemeral: Extractor -> Embedder) -> Reranker
//! ```

use std::path::Path;

use crate::config::Config;
use crate::embedder::Embedder;
use crate::error::HygrepResult;
use crate::index::{BuildReport, CorpusIndex};
use crate::reranker::{QueryFilters, Reranker};
use crate::scanner;
use crate::types::SearchResult;

/// Options controlling a single query, assembled by the CLI from flags.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub top_k: usize,
    pub filters: QueryFilters,
    pub compact: bool,
    /// Force the ephemeral path even when a usable index exists.
    pub fast: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            top_k: 10,
            filters: QueryFilters::default(),
            compact: false,
            fast: false,
        }
    }
}

/// The hygrep engine: owns a config and lazily-loaded embedder, and
/// exposes `build`/`query`/`status`/`clean` over a single corpus root.
pub struct Engine {
    config: Config,
}

impl Engine {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn for_root(root: &Path) -> HygrepResult<Self> {
        let config = Config::load(root)?;
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn embedder(&self) -> HygrepResult<Embedder> {
        Embedder::new(&self.config.embedding)
    }

    /// Build (or incrementally rebuild) the persistent index for this
    /// engine's corpus root.
    pub fn build(&self, force: bool) -> HygrepResult<BuildReport> {
        if force {
            CorpusIndex::clean(&self.config)?;
        }
        let embedder = self.embedder()?;
        CorpusIndex::build(&self.config.root_path, &self.config, &embedder)
    }

    /// Run a query. Prefers the persisted index when one exists and
    /// `options.fast` wasn't requested; otherwise scans and embeds
    /// ephemerally without touching the on-disk index.
    pub fn query(&self, raw_query: &str, options: &QueryOptions) -> HygrepResult<Vec<SearchResult>> {
        let embedder = self.embedder()?;
        let mut reranker = Reranker::new(&self.config.query);

        let use_index = !options.fast && CorpusIndex::exists(&self.config);

        if use_index {
            match CorpusIndex::load(&self.config, &embedder) {
                Ok(index) => {
                    return reranker.query_index(
                        &embedder,
                        &index,
                        raw_query,
                        options.top_k,
                        &options.filters,
                        options.compact,
                    );
                }
                Err(err) => {
                    tracing::warn!(error = %err, "index incompatible or unreadable, falling back to ephemeral query");
                }
            }
        }

        let pattern = scanner::compile_pattern(raw_query)?;
        let extensions = options.filters.extensions.clone();
        let scan_result = scanner::scan(
            &self.config.root_path,
            &pattern,
            &self.config.scanning,
            extensions.as_deref(),
        )?;

        reranker.query_ephemeral(
            &embedder,
            &scan_result,
            raw_query,
            options.top_k,
            &options.filters,
            options.compact,
        )
    }

    /// Index status: whether it exists, its file/block counts, and any
    /// stale files detected by content-hash comparison.
    pub fn status(&self) -> HygrepResult<IndexStatus> {
        if !CorpusIndex::exists(&self.config) {
            return Ok(IndexStatus {
                exists: false,
                model_version: None,
                file_count: 0,
                block_count: 0,
                stale_files: Vec::new(),
            });
        }
        let embedder = self.embedder()?;
        let index = CorpusIndex::load(&self.config, &embedder)?;
        let stale = index.stale_files(&self.config.root_path);
        Ok(IndexStatus {
            exists: true,
            model_version: Some(index.manifest.model_version.clone()),
            file_count: index.manifest.files.len(),
            block_count: index.blocks.len(),
            stale_files: stale,
        })
    }

    /// List every file currently tracked by the index, sorted.
    pub fn list_indexed_files(&self) -> HygrepResult<Vec<String>> {
        if !CorpusIndex::exists(&self.config) {
            return Ok(Vec::new());
        }
        let embedder = self.embedder()?;
        let index = CorpusIndex::load(&self.config, &embedder)?;
        let mut files: Vec<String> = index.manifest.files.keys().cloned().collect();
        files.sort();
        Ok(files)
    }

    /// Remove the persisted index.
    pub fn clean(&self) -> HygrepResult<()> {
        CorpusIndex::clean(&self.config)
    }
}

/// Summary returned by [`Engine::status`].
#[derive(Debug, Clone)]
pub struct IndexStatus {
    pub exists: bool,
    pub model_version: Option<String>,
    pub file_count: usize,
    pub block_count: usize,
    pub stale_files: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_on_fresh_root_reports_no_index() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = Engine::for_root(tmp.path()).unwrap();
        let status = engine.status().unwrap();
        assert!(!status.exists);
        assert_eq!(status.file_count, 0);
    }

    #[test]
    fn test_list_indexed_files_empty_without_index() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = Engine::for_root(tmp.path()).unwrap();
        assert!(engine.list_indexed_files().unwrap().is_empty());
    }

    #[test]
    fn test_clean_on_missing_index_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = Engine::for_root(tmp.path()).unwrap();
        assert!(engine.clean().is_ok());
    }

    #[test]
    fn test_query_options_default() {
        let opts = QueryOptions::default();
        assert_eq!(opts.top_k, 10);
        assert!(!opts.compact);
        assert!(!opts.fast);
    }
}
