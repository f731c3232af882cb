//! Resolves and fetches the embedder's ONNX model + tokenizer.
//!
//! Kept out of `hygrep-core` (spec.md §1 scopes model acquisition out
//! of the core pipeline): the core only ever receives two resolved
//! filesystem paths and never reaches the network itself.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

/// Everything needed to locate and fetch one embedder artifact set.
pub struct ModelSpec {
    pub name: &'static str,
    pub model_url: &'static str,
    pub tokenizer_url: &'static str,
    pub dimensions: usize,
    pub max_length: usize,
}

/// The default bundled model, matching `hygrep_core::embedder::MODEL_VERSION`.
pub const DEFAULT_MODEL: ModelSpec = ModelSpec {
    name: "snowflake-arctic-embed-s",
    model_url: "https://huggingface.co/Snowflake/snowflake-arctic-embed-s/resolve/main/onnx/model.onnx",
    tokenizer_url: "https://huggingface.co/Snowflake/snowflake-arctic-embed-s/resolve/main/tokenizer.json",
    dimensions: 384,
    max_length: 512,
};

/// Local cache directory for `spec`'s artifacts: `$HYGREP_MODEL_DIR`
/// if set, else the platform data dir.
pub fn cache_dir(spec: &ModelSpec) -> PathBuf {
    if let Ok(dir) = std::env::var("HYGREP_MODEL_DIR") {
        return PathBuf::from(dir);
    }
    let default = hygrep_core::embedder::default_model_dir();
    default.parent().map(|p| p.join(spec.name)).unwrap_or(default)
}

/// Whether both artifacts are already present in the cache.
pub fn is_installed(spec: &ModelSpec) -> bool {
    let dir = cache_dir(spec);
    dir.join("model.onnx").exists() && dir.join("tokenizer.json").exists()
}

/// Download `spec`'s artifacts into the cache if not already present.
/// Returns the resolved `(model_path, tokenizer_path)`.
pub fn ensure_model(spec: &ModelSpec) -> Result<(PathBuf, PathBuf)> {
    let dir = cache_dir(spec);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create model cache dir {}", dir.display()))?;

    let model_path = dir.join("model.onnx");
    let tokenizer_path = dir.join("tokenizer.json");

    if !model_path.exists() {
        download_file(spec.model_url, &model_path)
            .with_context(|| format!("failed to download model from {}", spec.model_url))?;
    }
    if !tokenizer_path.exists() {
        download_file(spec.tokenizer_url, &tokenizer_path)
            .with_context(|| format!("failed to download tokenizer from {}", spec.tokenizer_url))?;
    }

    Ok((model_path, tokenizer_path))
}

fn download_file(url: &str, dest: &Path) -> Result<()> {
    let response = reqwest::blocking::get(url).with_context(|| format!("GET {url}"))?;
    if !response.status().is_success() {
        bail!("GET {url} returned {}", response.status());
    }

    let total = response.content_length().unwrap_or(0);
    let progress = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
    ) {
        progress.set_style(style);
    }
    progress.set_message(dest.file_name().unwrap_or_default().to_string_lossy().into_owned());

    let tmp_path = dest.with_extension("part");
    let bytes = response
        .bytes()
        .with_context(|| format!("reading response body from {url}"))?;

    let mut file = std::fs::File::create(&tmp_path)?;
    file.write_all(&bytes)?;
    progress.inc(bytes.len() as u64);
    progress.finish_and_clear();

    std::fs::rename(&tmp_path, dest)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_model_dimensions() {
        assert_eq!(DEFAULT_MODEL.dimensions, 384);
        assert_eq!(DEFAULT_MODEL.max_length, 512);
    }

    #[test]
    fn test_is_installed_false_for_empty_dir() {
        let tmp = tempfile::tempdir().unwrap();
        std::env::set_var("HYGREP_MODEL_DIR", tmp.path());
        assert!(!is_installed(&DEFAULT_MODEL));
        std::env::remove_var("HYGREP_MODEL_DIR");
    }
}
