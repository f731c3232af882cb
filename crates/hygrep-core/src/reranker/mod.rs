//! Reranker / Query Engine: given a query and a candidate set, return
//! the top-k blocks by cosine similarity (spec.md §4.5).
//!
//! Candidates come from one of two modes: *indexed* (every block in a
//! loaded [`CorpusIndex`]) or *ephemeral* (blocks freshly extracted and
//! embedded from the Scanner's `path -> content` map, never persisted).
//! Both modes funnel into the same scoring and top-k selection path.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::config::QueryConfig;
use crate::embedder::Embedder;
use crate::error::HygrepResult;
use crate::index::CorpusIndex;
use crate::types::{BlockKind, SearchResult};
use crate::vector;

/// A process-local, capacity-bounded cache of query embeddings.
///
/// Eviction is intentionally coarse (spec.md §4.5 step 1): on overflow,
/// drop the oldest half rather than maintaining exact per-entry
/// recency, which keeps the bookkeeping cost to an occasional bulk
/// trim instead of a per-lookup list move.
pub struct QueryCache {
    capacity: usize,
    entries: Vec<(String, Vec<f32>)>,
}

impl QueryCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Vec::new(),
        }
    }

    pub fn get(&self, query: &str) -> Option<Vec<f32>> {
        self.entries
            .iter()
            .find(|(k, _)| k == query)
            .map(|(_, v)| v.clone())
    }

    pub fn insert(&mut self, query: String, embedding: Vec<f32>) {
        if self.entries.iter().any(|(k, _)| k == &query) {
            return;
        }
        if self.entries.len() >= self.capacity {
            let half = self.entries.len() / 2;
            self.entries.drain(0..half);
        }
        self.entries.push((query, embedding));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Filters applied to the candidate set before scoring.
#[derive(Debug, Clone, Default)]
pub struct QueryFilters {
    /// Glob patterns; a candidate matching any is excluded.
    pub exclude_globs: Vec<String>,
    /// If set, only these extensions (without the dot) are kept.
    pub extensions: Option<Vec<String>>,
    /// If set, only these block kinds are kept.
    pub kinds: Option<Vec<BlockKind>>,
}

impl QueryFilters {
    fn build_exclude_set(&self) -> HygrepResult<Option<GlobSet>> {
        if self.exclude_globs.is_empty() {
            return Ok(None);
        }
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.exclude_globs {
            let glob = Glob::new(pattern).map_err(|e| {
                crate::error::HygrepError::Argument(format!("invalid exclude glob {pattern:?}: {e}"))
            })?;
            builder.add(glob);
        }
        let set = builder
            .build()
            .map_err(|e| crate::error::HygrepError::Argument(format!("invalid glob set: {e}")))?;
        Ok(Some(set))
    }

    fn passes(&self, exclude_set: &Option<GlobSet>, file: &Path, kind: BlockKind) -> bool {
        if let Some(set) = exclude_set {
            if set.is_match(file) {
                return false;
            }
        }
        if let Some(exts) = &self.extensions {
            let ext = file.extension().and_then(|e| e.to_str()).unwrap_or("");
            if !exts.iter().any(|e| e.eq_ignore_ascii_case(ext)) {
                return false;
            }
        }
        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&kind) {
                return false;
            }
        }
        true
    }
}

/// A candidate block ready for scoring: enough metadata to shape a
/// [`SearchResult`], its embedding, and (for non-compact output) its
/// full content.
struct Candidate<'a> {
    file: &'a Path,
    kind: BlockKind,
    name: &'a str,
    start_line: u32,
    end_line: u32,
    embedding: &'a [f32],
    content: Option<&'a str>,
}

/// Owns the query-embedding cache across repeated queries in the same
/// process.
pub struct Reranker {
    cache: QueryCache,
    max_candidates: usize,
}

impl Reranker {
    pub fn new(config: &QueryConfig) -> Self {
        Self {
            cache: QueryCache::new(config.cache_capacity),
            max_candidates: config.max_candidates.max(1),
        }
    }

    fn embed_query(&mut self, embedder: &Embedder, query: &str) -> HygrepResult<Vec<f32>> {
        if let Some(cached) = self.cache.get(query) {
            return Ok(cached);
        }
        let embedding = embedder.embed_query(query)?;
        self.cache.insert(query.to_string(), embedding.clone());
        Ok(embedding)
    }

    /// Indexed-mode query: score up to `max_candidates` blocks from
    /// `index`.
    pub fn query_index(
        &mut self,
        embedder: &Embedder,
        index: &CorpusIndex,
        query: &str,
        top_k: usize,
        filters: &QueryFilters,
        compact: bool,
    ) -> HygrepResult<Vec<SearchResult>> {
        let query_vec = self.embed_query(embedder, query)?;
        let exclude_set = filters.build_exclude_set()?;

        let candidates: Vec<Candidate<'_>> = index
            .blocks
            .iter()
            .enumerate()
            .take(self.max_candidates)
            .filter(|(_, rec)| filters.passes(&exclude_set, &rec.file, rec.kind))
            .map(|(i, rec)| {
                let (_, embedding) = index.block_and_vector(i).expect("index in bounds");
                Candidate {
                    file: &rec.file,
                    kind: rec.kind,
                    name: &rec.name,
                    start_line: rec.start_line,
                    end_line: rec.end_line,
                    embedding,
                    content: None,
                }
            })
            .collect();

        Ok(rank(&candidates, &query_vec, top_k, compact))
    }

    /// Ephemeral-mode query: score up to `max_candidates` freshly
    /// extracted, never-persisted blocks built from the Scanner's match
    /// set.
    pub fn query_ephemeral(
        &mut self,
        embedder: &Embedder,
        scan_result: &crate::scanner::ScanResult,
        query: &str,
        top_k: usize,
        filters: &QueryFilters,
        compact: bool,
    ) -> HygrepResult<Vec<SearchResult>> {
        let query_vec = self.embed_query(embedder, query)?;
        let exclude_set = filters.build_exclude_set()?;

        // Cap candidate assembly at `max_candidates` blocks before any
        // embedding happens -- this is the cost the input is meant to
        // bound (spec.md §4.5), so the cap applies ahead of filtering,
        // not after it.
        let mut all_blocks = Vec::new();
        'assembly: for (path, content) in &scan_result.files {
            let language = crate::types::Language::from_extension(
                path.extension().and_then(|e| e.to_str()).unwrap_or(""),
            );
            let blocks = crate::extractor::extract_blocks(path, content, language);
            for block in blocks {
                if all_blocks.len() >= self.max_candidates {
                    break 'assembly;
                }
                all_blocks.push(block);
            }
        }
        all_blocks.retain(|block| filters.passes(&exclude_set, &block.file, block.kind));

        if all_blocks.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<&str> = all_blocks.iter().map(|b| b.content.as_str()).collect();
        let embeddings = embedder.embed_batch(&texts)?;

        let candidates: Vec<Candidate<'_>> = all_blocks
            .iter()
            .zip(embeddings.iter())
            .map(|(b, emb)| Candidate {
                file: &b.file,
                kind: b.kind,
                name: &b.name,
                start_line: b.start_line,
                end_line: b.end_line,
                embedding: emb.as_slice(),
                content: Some(b.content.as_str()),
            })
            .collect();

        Ok(rank(&candidates, &query_vec, top_k, compact))
    }
}

/// A scored candidate, ordered so a [`BinaryHeap`] can be used as a
/// bounded min-heap of the current top-k (spec.md §4.5 step 5: ties
/// broken by lower `start_line`, then lexicographic `file`).
struct Scored<'a> {
    score: f32,
    start_line: u32,
    file: &'a Path,
    index: usize,
}

impl PartialEq for Scored<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for Scored<'_> {}

impl PartialOrd for Scored<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scored<'_> {
    /// Ordering used for the min-heap: *lowest priority first*, i.e.
    /// the element popped by `BinaryHeap`'s max-extraction is the one
    /// we'd want to evict -- lowest score, or (on a tie) the later
    /// start_line / lexicographically-greater file.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .partial_cmp(&self.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.start_line.cmp(&other.start_line))
            .then_with(|| self.file.cmp(other.file))
    }
}

fn rank(
    candidates: &[Candidate<'_>],
    query_vec: &[f32],
    top_k: usize,
    compact: bool,
) -> Vec<SearchResult> {
    if candidates.is_empty() || top_k == 0 {
        return Vec::new();
    }

    let dims = query_vec.len();
    let mut heap: BinaryHeap<Scored<'_>> = BinaryHeap::with_capacity(top_k + 1);

    for (i, candidate) in candidates.iter().enumerate() {
        if candidate.embedding.len() != dims {
            continue;
        }
        let score = vector::dot(candidate.embedding, query_vec);
        let entry = Scored {
            score,
            start_line: candidate.start_line,
            file: candidate.file,
            index: i,
        };

        if heap.len() < top_k {
            heap.push(entry);
        } else if let Some(worst) = heap.peek() {
            // `Scored`'s Ord treats "highest priority to evict" as
            // greatest; replace only if the new entry outranks it.
            if entry.cmp(worst) == Ordering::Less {
                heap.pop();
                heap.push(entry);
            }
        }
    }

    let mut scored: Vec<Scored<'_>> = heap.into_vec();
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.start_line.cmp(&b.start_line))
            .then_with(|| a.file.cmp(b.file))
    });

    scored
        .into_iter()
        .map(|s| {
            let candidate = &candidates[s.index];
            SearchResult {
                file: candidate.file.to_path_buf(),
                start_line: candidate.start_line,
                end_line: candidate.end_line,
                kind: candidate.kind,
                name: candidate.name.to_string(),
                score: round4(s.score),
                content: if compact {
                    None
                } else {
                    candidate.content.map(str::to_string)
                },
            }
        })
        .collect()
}

fn round4(score: f32) -> f64 {
    (score as f64 * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_cache_hit_and_miss() {
        let mut cache = QueryCache::new(4);
        assert!(cache.get("hello").is_none());
        cache.insert("hello".into(), vec![1.0, 0.0]);
        assert_eq!(cache.get("hello"), Some(vec![1.0, 0.0]));
    }

    #[test]
    fn test_query_cache_evicts_oldest_half_on_overflow() {
        let mut cache = QueryCache::new(4);
        for i in 0..4 {
            cache.insert(format!("q{i}"), vec![i as f32]);
        }
        assert_eq!(cache.len(), 4);
        cache.insert("q4".into(), vec![4.0]);
        assert_eq!(cache.len(), 3);
        assert!(cache.get("q0").is_none());
        assert!(cache.get("q1").is_none());
        assert!(cache.get("q2").is_some());
        assert!(cache.get("q4").is_some());
    }

    #[test]
    fn test_round4() {
        assert_eq!(round4(0.123_456), 0.1235);
        assert_eq!(round4(1.0), 1.0);
    }

    #[test]
    fn test_rank_orders_by_score_desc() {
        let file_a = Path::new("a.py");
        let file_b = Path::new("b.py");
        let candidates = vec![
            Candidate {
                file: file_a,
                kind: BlockKind::Function,
                name: "low",
                start_line: 1,
                end_line: 2,
                embedding: &[0.0, 1.0],
                content: None,
            },
            Candidate {
                file: file_b,
                kind: BlockKind::Function,
                name: "high",
                start_line: 1,
                end_line: 2,
                embedding: &[1.0, 0.0],
                content: None,
            },
        ];
        let results = rank(&candidates, &[1.0, 0.0], 2, true);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].name, "high");
        assert_eq!(results[0].score, 1.0);
        assert_eq!(results[1].name, "low");
    }

    #[test]
    fn test_rank_ties_broken_by_start_line_then_file() {
        let file_a = Path::new("a.py");
        let file_b = Path::new("b.py");
        let candidates = vec![
            Candidate {
                file: file_b,
                kind: BlockKind::Function,
                name: "b_first_line",
                start_line: 1,
                end_line: 2,
                embedding: &[1.0, 0.0],
                content: None,
            },
            Candidate {
                file: file_a,
                kind: BlockKind::Function,
                name: "a_later_line",
                start_line: 5,
                end_line: 6,
                embedding: &[1.0, 0.0],
                content: None,
            },
        ];
        let results = rank(&candidates, &[1.0, 0.0], 2, true);
        assert_eq!(results[0].name, "b_first_line");
        assert_eq!(results[1].name, "a_later_line");
    }

    #[test]
    fn test_rank_empty_candidates() {
        let results = rank(&[], &[1.0, 0.0], 5, true);
        assert!(results.is_empty());
    }

    #[test]
    fn test_reranker_new_carries_max_candidates_from_config() {
        let config = QueryConfig {
            max_candidates: 7,
            ..QueryConfig::default()
        };
        let reranker = Reranker::new(&config);
        assert_eq!(reranker.max_candidates, 7);
    }

    #[test]
    fn test_reranker_new_floors_zero_max_candidates_to_one() {
        let config = QueryConfig {
            max_candidates: 0,
            ..QueryConfig::default()
        };
        let reranker = Reranker::new(&config);
        assert_eq!(reranker.max_candidates, 1);
    }

    #[test]
    fn test_query_filters_extension() {
        let filters = QueryFilters {
            exclude_globs: vec![],
            extensions: Some(vec!["py".to_string()]),
            kinds: None,
        };
        let exclude_set = filters.build_exclude_set().unwrap();
        assert!(filters.passes(&exclude_set, Path::new("a.py"), BlockKind::Function));
        assert!(!filters.passes(&exclude_set, Path::new("a.rs"), BlockKind::Function));
    }

    #[test]
    fn test_query_filters_exclude_glob() {
        let filters = QueryFilters {
            exclude_globs: vec!["**/vendor/**".to_string()],
            extensions: None,
            kinds: None,
        };
        let exclude_set = filters.build_exclude_set().unwrap();
        assert!(!filters.passes(&exclude_set, Path::new("vendor/lib.py"), BlockKind::Function));
        assert!(filters.passes(&exclude_set, Path::new("src/lib.py"), BlockKind::Function));
    }
}
