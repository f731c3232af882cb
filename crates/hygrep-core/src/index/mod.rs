//! Persistent corpus index: `(manifest, vectors, blocks)` under
//! `<root>/.hhg/` (spec.md §4.4).
//!
//! The three files are written in a fixed order on commit --
//! `vectors.f32` then `blocks.json` then `manifest.json` -- so that the
//! manifest's rename is the single commit point: any reader that sees
//! a new manifest is guaranteed to see matching vectors and blocks
//! already in place. An advisory lock file arbitrates concurrent
//! builds.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::embedder::Embedder;
use crate::error::{HygrepError, HygrepResult};
use crate::extractor;
use crate::types::{Block, BlockRecord, FileRecord, Language, Manifest};
use crate::walker;

const MANIFEST_FILE: &str = "manifest.json";
const VECTORS_FILE: &str = "vectors.f32";
const BLOCKS_FILE: &str = "blocks.json";
const LOCK_FILE: &str = "lock";

/// A loaded, queryable corpus index.
pub struct CorpusIndex {
    pub manifest: Manifest,
    /// Row-major `(N, dimensions)` embedding matrix.
    pub vectors: Vec<f32>,
    /// Parallel metadata, one entry per row of `vectors`.
    pub blocks: Vec<BlockRecord>,
    pub dimensions: usize,
}

/// Held for the duration of a build; released (file removed) on drop.
struct BuildLock {
    path: PathBuf,
}

impl BuildLock {
    fn acquire(index_dir: &Path) -> HygrepResult<Self> {
        std::fs::create_dir_all(index_dir)?;
        let path = index_dir.join(LOCK_FILE);
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(_) => Ok(Self { path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(HygrepError::IndexBusy(path))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

impl CorpusIndex {
    /// Build (or incrementally rebuild) the index for `root`, writing it
    /// atomically to `<root>/.hhg/`.
    ///
    /// Files whose content hash matches the previous manifest's, under
    /// the same embedder version, reuse their existing block rows
    /// without re-embedding (spec.md §4.4 step 3). Any other change --
    /// new file, edited file, or an embedder version bump -- causes
    /// that file's blocks to be re-extracted and re-embedded. An
    /// embedder-version bump invalidates every file's reuse eligibility
    /// (migration = full re-embed).
    pub fn build(
        root: &Path,
        config: &crate::config::Config,
        embedder: &Embedder,
    ) -> HygrepResult<BuildReport> {
        let index_dir = config.index_dir();
        let _lock = BuildLock::acquire(&index_dir)?;

        let previous = load_manifest(&index_dir).ok();
        let previous_blocks = previous
            .as_ref()
            .map(|_| load_blocks(&index_dir).unwrap_or_default())
            .unwrap_or_default();
        let previous_vectors = previous
            .as_ref()
            .map(|m| load_vectors(&index_dir, m.dimensions as usize).unwrap_or_default())
            .unwrap_or_default();

        let model_unchanged = previous
            .as_ref()
            .map(|m| m.model_version == embedder.model_version())
            .unwrap_or(false);

        let entries = walker::walk(root, &config.scanning)?;

        let mut new_files: HashMap<String, FileRecord> = HashMap::new();
        let mut new_blocks: Vec<BlockRecord> = Vec::new();
        let mut new_vectors: Vec<f32> = Vec::new();
        let mut to_embed: Vec<(usize, Block)> = Vec::new();
        let mut reused = 0usize;
        let mut parse_errors = 0usize;

        for entry in &entries {
            let bytes = match std::fs::read(&entry.abs_path) {
                Ok(b) => b,
                Err(_) => continue,
            };
            let size = bytes.len() as u64;
            let mtime = std::fs::metadata(&entry.abs_path)
                .and_then(|m| m.modified())
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0);
            let sha256 = hash_bytes(&bytes);
            let rel_key = entry.rel_path.to_string_lossy().replace('\\', "/");

            let reused_record = if model_unchanged {
                previous
                    .as_ref()
                    .and_then(|m| m.files.get(&rel_key))
                    .filter(|rec| rec.sha256 == sha256)
            } else {
                None
            };

            if let Some(prev_record) = reused_record {
                let mut block_ids = Vec::with_capacity(prev_record.block_ids.len());
                for &old_id in &prev_record.block_ids {
                    if let Some(rec) = previous_blocks.get(old_id) {
                        let new_id = new_blocks.len();
                        new_blocks.push(rec.clone());
                        new_vectors.extend_from_slice(row(
                            &previous_vectors,
                            config.embedding.dimensions,
                            old_id,
                        ));
                        block_ids.push(new_id);
                    }
                }
                new_files.insert(
                    rel_key,
                    FileRecord {
                        sha256,
                        size,
                        mtime,
                        block_ids,
                    },
                );
                reused += 1;
                continue;
            }

            let content = match std::str::from_utf8(&bytes) {
                Ok(s) => s.to_string(),
                Err(_) => continue,
            };
            let language = Language::from_extension(
                entry
                    .abs_path
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or(""),
            );

            let blocks = match extractor::extract_blocks_strict(&entry.rel_path, &content, language)
            {
                Ok(b) => b,
                Err(_) => {
                    parse_errors += 1;
                    extractor::extract_blocks(&entry.rel_path, &content, language)
                }
            };

            let mut block_ids = Vec::with_capacity(blocks.len());
            for block in blocks {
                let placeholder_id = new_blocks.len() + to_embed.len();
                block_ids.push(placeholder_id);
                to_embed.push((placeholder_id, block));
            }

            new_files.insert(
                rel_key,
                FileRecord {
                    sha256,
                    size,
                    mtime,
                    block_ids,
                },
            );
        }

        let queued = to_embed.len();

        // Reserve slots for queued blocks so row indices line up, then
        // embed and fill them in.
        let base = new_blocks.len();
        new_blocks.resize(
            base + queued,
            BlockRecord {
                file: PathBuf::new(),
                kind: crate::types::BlockKind::Other,
                name: String::new(),
                start_line: 0,
                end_line: 0,
                content_sha: String::new(),
            },
        );
        new_vectors.resize(new_vectors.len() + queued * config.embedding.dimensions, 0.0);

        let texts: Vec<&str> = to_embed.iter().map(|(_, b)| b.content.as_str()).collect();
        let embeddings = embedder.embed_batch(&texts)?;

        for ((placeholder_id, block), embedding) in to_embed.into_iter().zip(embeddings) {
            new_blocks[placeholder_id] = block.to_record();
            let offset = placeholder_id * config.embedding.dimensions;
            new_vectors[offset..offset + config.embedding.dimensions].copy_from_slice(&embedding);
        }

        let manifest = Manifest {
            model_version: embedder.model_version().to_string(),
            dimensions: config.embedding.dimensions as u32,
            created_at: iso8601_now(),
            root_path: root.to_string_lossy().into_owned(),
            files: new_files,
        };

        write_atomic(&index_dir, &manifest, &new_blocks, &new_vectors)?;

        Ok(BuildReport {
            files_total: entries.len(),
            files_reused: reused,
            blocks_total: new_blocks.len(),
            blocks_embedded: queued,
            parse_errors,
        })
    }

    /// Load an existing index from `<root>/.hhg/`. Fails with
    /// [`HygrepError::IndexIncompatible`] if the manifest's
    /// `model_version`/`dimensions` don't match `embedder`, or if any
    /// file is missing/corrupt.
    pub fn load(config: &crate::config::Config, embedder: &Embedder) -> HygrepResult<Self> {
        let index_dir = config.index_dir();
        let manifest = load_manifest(&index_dir)?;

        if manifest.model_version != embedder.model_version() {
            return Err(HygrepError::IndexIncompatible(format!(
                "index built with model_version {:?}, current is {:?}",
                manifest.model_version,
                embedder.model_version()
            )));
        }
        if manifest.dimensions as usize != embedder.dimensions() {
            return Err(HygrepError::IndexIncompatible(format!(
                "index has {} dimensions, embedder has {}",
                manifest.dimensions,
                embedder.dimensions()
            )));
        }

        let dimensions = manifest.dimensions as usize;
        let vectors = load_vectors(&index_dir, dimensions)?;
        let blocks = load_blocks(&index_dir)?;

        let expected_rows = blocks.len();
        if dimensions > 0 && vectors.len() != expected_rows * dimensions {
            return Err(HygrepError::IndexIncompatible(format!(
                "vectors.f32 has {} floats, expected {} ({} rows x {} dims)",
                vectors.len(),
                expected_rows * dimensions,
                expected_rows,
                dimensions
            )));
        }

        Ok(Self {
            manifest,
            vectors,
            blocks,
            dimensions,
        })
    }

    /// Whether an index directory exists for this config's root.
    pub fn exists(config: &crate::config::Config) -> bool {
        config.index_dir().join(MANIFEST_FILE).exists()
    }

    /// Remove the index directory entirely.
    pub fn clean(config: &crate::config::Config) -> HygrepResult<()> {
        let dir = config.index_dir();
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }

    /// Paths whose on-disk content hash no longer matches the manifest.
    /// A stale index is still queryable; these rows are just less
    /// accurate until the next build.
    pub fn stale_files(&self, root: &Path) -> Vec<String> {
        let mut stale = Vec::new();
        for (rel_path, record) in &self.manifest.files {
            let abs = root.join(rel_path);
            let current = std::fs::read(&abs).ok().map(|b| hash_bytes(&b));
            if current.as_deref() != Some(record.sha256.as_str()) {
                stale.push(rel_path.clone());
            }
        }
        stale.sort();
        stale
    }

    fn row(&self, block_index: usize) -> &[f32] {
        row(&self.vectors, self.dimensions, block_index)
    }

    /// Access block metadata and its embedding row together.
    pub fn block_and_vector(&self, i: usize) -> Option<(&BlockRecord, &[f32])> {
        self.blocks.get(i).map(|b| (b, self.row(i)))
    }
}

fn row(vectors: &[f32], dims: usize, index: usize) -> &[f32] {
    if dims == 0 {
        return &[];
    }
    &vectors[index * dims..(index + 1) * dims]
}

/// Summary statistics from a [`CorpusIndex::build`] call.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub files_total: usize,
    pub files_reused: usize,
    pub blocks_total: usize,
    pub blocks_embedded: usize,
    pub parse_errors: usize,
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn iso8601_now() -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    rfc3339_utc(now.as_secs())
}

/// Minimal RFC3339 (UTC, whole seconds) formatter, to avoid pulling in
/// a dedicated time crate for a single manifest timestamp field.
fn rfc3339_utc(epoch_secs: u64) -> String {
    let days = epoch_secs / 86_400;
    let secs_of_day = epoch_secs % 86_400;
    let (h, m, s) = (secs_of_day / 3600, (secs_of_day % 3600) / 60, secs_of_day % 60);

    let mut year: i64 = 1970;
    let mut remaining = days as i64;
    loop {
        let year_len = if is_leap(year) { 366 } else { 365 };
        if remaining < year_len {
            break;
        }
        remaining -= year_len;
        year += 1;
    }
    let month_lengths = month_lengths(is_leap(year));
    let mut month = 0usize;
    while remaining >= month_lengths[month] {
        remaining -= month_lengths[month];
        month += 1;
    }
    let day = remaining + 1;

    format!("{year:04}-{:02}-{day:02}T{h:02}:{m:02}:{s:02}Z", month + 1)
}

fn is_leap(year: i64) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn month_lengths(leap: bool) -> [i64; 12] {
    [31, if leap { 29 } else { 28 }, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]
}

fn write_atomic(
    index_dir: &Path,
    manifest: &Manifest,
    blocks: &[BlockRecord],
    vectors: &[f32],
) -> HygrepResult<()> {
    std::fs::create_dir_all(index_dir)?;

    let vectors_tmp = index_dir.join(format!("{VECTORS_FILE}.tmp"));
    let blocks_tmp = index_dir.join(format!("{BLOCKS_FILE}.tmp"));
    let manifest_tmp = index_dir.join(format!("{MANIFEST_FILE}.tmp"));

    {
        let mut f = File::create(&vectors_tmp)?;
        f.write_all(floats_as_le_bytes(vectors).as_slice())?;
        f.sync_all()?;
    }
    {
        let mut f = File::create(&blocks_tmp)?;
        serde_json::to_writer(&mut f, blocks)?;
        f.sync_all()?;
    }
    {
        let mut f = File::create(&manifest_tmp)?;
        serde_json::to_writer_pretty(&mut f, manifest)?;
        f.sync_all()?;
    }

    std::fs::rename(&vectors_tmp, index_dir.join(VECTORS_FILE))?;
    std::fs::rename(&blocks_tmp, index_dir.join(BLOCKS_FILE))?;
    std::fs::rename(&manifest_tmp, index_dir.join(MANIFEST_FILE))?;

    Ok(())
}

/// Serialise an `f32` slice as raw little-endian bytes, explicitly
/// (rather than via a transmute) so the vectors file's byte layout
/// doesn't depend on host endianness.
fn floats_as_le_bytes(v: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(v.len() * 4);
    for f in v {
        out.extend_from_slice(&f.to_le_bytes());
    }
    out
}

fn load_manifest(index_dir: &Path) -> HygrepResult<Manifest> {
    let path = index_dir.join(MANIFEST_FILE);
    let content = std::fs::read_to_string(&path)?;
    let manifest: Manifest = serde_json::from_str(&content)?;
    Ok(manifest)
}

fn load_blocks(index_dir: &Path) -> HygrepResult<Vec<BlockRecord>> {
    let path = index_dir.join(BLOCKS_FILE);
    let content = std::fs::read_to_string(&path)?;
    let blocks: Vec<BlockRecord> = serde_json::from_str(&content)?;
    Ok(blocks)
}

fn load_vectors(index_dir: &Path, _dimensions: usize) -> HygrepResult<Vec<f32>> {
    let path = index_dir.join(VECTORS_FILE);
    let bytes = std::fs::read(&path)?;
    if bytes.len() % 4 != 0 {
        return Err(HygrepError::IndexIncompatible(
            "vectors.f32 length is not a multiple of 4 bytes".into(),
        ));
    }
    let mut vectors = vec![0.0f32; bytes.len() / 4];
    for (i, chunk) in bytes.chunks_exact(4).enumerate() {
        vectors[i] = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    Ok(vectors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_build_lock_rejects_concurrent_acquire() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join(".hhg");
        let _first = BuildLock::acquire(&dir).unwrap();
        let second = BuildLock::acquire(&dir);
        assert!(matches!(second, Err(HygrepError::IndexBusy(_))));
    }

    #[test]
    fn test_build_lock_released_on_drop() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join(".hhg");
        {
            let _lock = BuildLock::acquire(&dir).unwrap();
        }
        let second = BuildLock::acquire(&dir);
        assert!(second.is_ok());
    }

    #[test]
    fn test_write_atomic_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let index_dir = tmp.path().join(".hhg");

        let mut files = HashMap::new();
        files.insert(
            "a.py".to_string(),
            FileRecord {
                sha256: "abc".into(),
                size: 10,
                mtime: 0.0,
                block_ids: vec![0],
            },
        );
        let manifest = Manifest {
            model_version: "v1".into(),
            dimensions: 4,
            created_at: "2026-01-01T00:00:00Z".into(),
            root_path: "/tmp/x".into(),
            files,
        };
        let blocks = vec![BlockRecord {
            file: PathBuf::from("a.py"),
            kind: crate::types::BlockKind::Function,
            name: "f".into(),
            start_line: 1,
            end_line: 2,
            content_sha: "xyz".into(),
        }];
        let vectors = vec![1.0f32, 0.0, 0.0, 0.0];

        write_atomic(&index_dir, &manifest, &blocks, &vectors).unwrap();

        let loaded_manifest = load_manifest(&index_dir).unwrap();
        let loaded_blocks = load_blocks(&index_dir).unwrap();
        let loaded_vectors = load_vectors(&index_dir, 4).unwrap();

        assert_eq!(loaded_manifest.model_version, "v1");
        assert_eq!(loaded_blocks.len(), 1);
        assert_eq!(loaded_vectors, vectors);
    }

    #[test]
    fn test_exists_false_for_fresh_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::defaults(tmp.path());
        assert!(!CorpusIndex::exists(&config));
    }

    #[test]
    fn test_rfc3339_utc_epoch() {
        assert_eq!(rfc3339_utc(0), "1970-01-01T00:00:00Z");
    }
}
