//! ONNX-based local embedding inference.
//!
//! Maps text to 384-dim L2-normalised vectors using a bundled ONNX
//! session and tokenizer. The core never downloads or locates the model
//! itself (spec.md §1) -- it is handed two resolved filesystem paths
//! (model, tokenizer) via [`crate::config::EmbeddingConfig`] and fails
//! with [`HygrepError::ModelMissing`] if either is absent. Acquiring
//! those files is the CLI crate's job.
//!
//! ## Model
//!
//! Default: `Snowflake/snowflake-arctic-embed-s`, 384 dimensions, a
//! BERT-style encoder whose usual pooling is a mean over
//! `last_hidden_state` weighted by the attention mask. That is the
//! pooling strategy implemented here (spec.md §9 Open Question 2);
//! models that already emit a pooled `[batch, hidden]` output are
//! supported as a fallback branch.

use ort::session::Session;

use crate::config::EmbeddingConfig;
use crate::error::{HygrepError, HygrepResult};

/// Embedding dimensionality, re-exported for convenience.
pub const DIMENSIONS: usize = crate::types::DIMENSIONS;

/// Maximum input length in tokens. Longer inputs are truncated with
/// special tokens preserved.
pub const MAX_LENGTH: usize = 512;

/// Default batch size for inference.
pub const BATCH_SIZE: usize = 64;

/// Opaque embedder version string baked into the binary. A manifest
/// whose `model_version` doesn't match this triggers a full rebuild.
pub const MODEL_VERSION: &str = "snowflake-arctic-embed-s-v1";

/// Prefix applied to queries (not documents) before tokenisation, per
/// the model's recommended asymmetric-retrieval usage.
pub const QUERY_PREFIX: &str = "Represent this sentence for searching relevant passages: ";

/// Lower/upper bound on an emitted embedding's L2 norm. Violating this
/// fails the call rather than silently shipping an un-normalised vector.
const NORM_BOUNDS: (f32, f32) = (0.99, 1.01);

/// Default local cache directory for the bundled model's artifacts,
/// used as the config default before `HYGREP_MODEL_DIR` or an explicit
/// config override is applied.
pub fn default_model_dir() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("hygrep")
        .join("models")
        .join("snowflake-arctic-embed-s")
}

/// Embedding engine wrapping an ONNX Runtime session and tokenizer.
pub struct Embedder {
    config: EmbeddingConfig,
    /// `Session::run` requires `&mut self`; shared behind a mutex so the
    /// embedder can be used from multiple threads without producing
    /// interleaved batches on the non-thread-safe session (spec.md §5).
    session: parking_lot::Mutex<Session>,
    tokenizer: tokenizers::Tokenizer,
}

impl Embedder {
    /// Load the ONNX session and tokenizer from `config`'s resolved
    /// paths. Fails with [`HygrepError::ModelMissing`] if either file is
    /// absent -- fatal for `build`, fatal for `query` unless a
    /// previously-built index has usable cached vectors.
    pub fn new(config: &EmbeddingConfig) -> HygrepResult<Self> {
        if !config.model_path.exists() {
            return Err(HygrepError::ModelMissing(format!(
                "embedding model not found at {}; run `hygrep model install`",
                config.model_path.display()
            )));
        }
        if !config.tokenizer_path.exists() {
            return Err(HygrepError::ModelMissing(format!(
                "tokenizer not found at {}; run `hygrep model install`",
                config.tokenizer_path.display()
            )));
        }

        let session = Session::builder()
            .map_err(|e| HygrepError::Internal(format!("ONNX session builder error: {e}")))?
            .commit_from_file(&config.model_path)
            .map_err(|e| {
                HygrepError::ModelMissing(format!(
                    "failed to load {}: {e}",
                    config.model_path.display()
                ))
            })?;

        let tokenizer = tokenizers::Tokenizer::from_file(&config.tokenizer_path).map_err(|e| {
            HygrepError::ModelMissing(format!(
                "failed to load tokenizer {}: {e}",
                config.tokenizer_path.display()
            ))
        })?;

        tracing::info!(
            model = %config.model_path.display(),
            dims = config.dimensions,
            "loaded embedding model"
        );

        Ok(Self {
            config: config.clone(),
            session: parking_lot::Mutex::new(session),
            tokenizer,
        })
    }

    /// Embedding dimensionality.
    pub fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    /// The embedder version string, for manifest compatibility checks.
    pub fn model_version(&self) -> &str {
        &self.config.model_version
    }

    /// Embed a batch of document texts (no query prefix applied).
    ///
    /// Returns a `(texts.len(), DIMENSIONS)` row-major matrix. An empty
    /// input returns an empty matrix without invoking the session
    /// (spec.md §4.3).
    pub fn embed_batch(&self, texts: &[&str]) -> HygrepResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut session = self.session.lock();

        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.batch_size.max(1)) {
            let embeddings = self.run_inference(&mut session, batch)?;
            out.extend(embeddings);
        }
        Ok(out)
    }

    /// Embed a single document text.
    pub fn embed_one(&self, text: &str) -> HygrepResult<Vec<f32>> {
        let mut results = self.embed_batch(&[text])?;
        results
            .pop()
            .ok_or_else(|| HygrepError::Internal("embed_batch returned no rows".into()))
    }

    /// Embed a single query string, applying [`QUERY_PREFIX`] before
    /// tokenisation. Queries are never batched with documents: this is
    /// always a single-element inference call.
    pub fn embed_query(&self, query: &str) -> HygrepResult<Vec<f32>> {
        let prefixed = format!("{QUERY_PREFIX}{query}");
        self.embed_one(&prefixed)
    }

    fn run_inference(&self, session: &mut Session, texts: &[&str]) -> HygrepResult<Vec<Vec<f32>>> {
        let batch_size = texts.len();
        let max_len = self.config.max_seq_length.min(MAX_LENGTH);

        let (input_ids, attention_mask, token_type_ids) = self.tokenize_batch(texts, max_len)?;
        let shape = vec![batch_size as i64, max_len as i64];

        let ids_value = ort::value::Tensor::from_array((shape.clone(), input_ids))
            .map_err(|e| HygrepError::Inference(format!("tensor error: {e}")))?;
        let mask_value = ort::value::Tensor::from_array((shape.clone(), attention_mask.clone()))
            .map_err(|e| HygrepError::Inference(format!("tensor error: {e}")))?;

        use std::borrow::Cow;
        let mut inputs: Vec<(Cow<'_, str>, ort::session::SessionInputValue<'_>)> = vec![
            (
                Cow::Borrowed("input_ids"),
                ort::session::SessionInputValue::from(ids_value),
            ),
            (
                Cow::Borrowed("attention_mask"),
                ort::session::SessionInputValue::from(mask_value),
            ),
        ];

        let expects_token_type = session
            .inputs()
            .iter()
            .any(|i| i.name() == "token_type_ids");
        if expects_token_type {
            let type_value = ort::value::Tensor::from_array((shape, token_type_ids))
                .map_err(|e| HygrepError::Inference(format!("tensor error: {e}")))?;
            inputs.push((
                Cow::Borrowed("token_type_ids"),
                ort::session::SessionInputValue::from(type_value),
            ));
        }

        let output_name = session
            .outputs()
            .first()
            .map(|o| o.name().to_string())
            .ok_or_else(|| HygrepError::Inference("model has no outputs".into()))?;

        let outputs = session
            .run(inputs)
            .map_err(|e| HygrepError::Inference(format!("ONNX inference error: {e}")))?;

        let output_value = outputs
            .get(&output_name)
            .ok_or_else(|| HygrepError::Inference("no output tensor found".into()))?;

        let (output_shape, output_data) = output_value
            .try_extract_tensor::<f32>()
            .map_err(|e| HygrepError::Inference(format!("output extraction error: {e}")))?;

        let dims: Vec<usize> = output_shape.iter().map(|&d| d as usize).collect();
        let mut embeddings = Vec::with_capacity(batch_size);

        if dims.len() == 3 {
            // [batch, seq_len, hidden_dim] -> mean pool, weighted by attention mask.
            let seq_len = dims[1];
            let hidden_dim = dims[2];

            for b in 0..batch_size {
                let mut pooled = vec![0.0f32; hidden_dim];
                let mut mask_sum = 0.0f32;

                for s in 0..seq_len {
                    let mask_val = attention_mask[b * max_len + s] as f32;
                    mask_sum += mask_val;
                    let offset = b * seq_len * hidden_dim + s * hidden_dim;
                    for d in 0..hidden_dim {
                        pooled[d] += output_data[offset + d] * mask_val;
                    }
                }

                if mask_sum > 0.0 {
                    for d in &mut pooled {
                        *d /= mask_sum;
                    }
                }

                embeddings.push(self.normalize_checked(pooled)?);
            }
        } else if dims.len() == 2 {
            // [batch, hidden_dim] -> already pooled.
            let hidden_dim = dims[1];
            for b in 0..batch_size {
                let offset = b * hidden_dim;
                let raw = output_data[offset..offset + hidden_dim].to_vec();
                embeddings.push(self.normalize_checked(raw)?);
            }
        } else {
            return Err(HygrepError::Inference(format!(
                "unexpected output tensor shape: {dims:?}"
            )));
        }

        Ok(embeddings)
    }

    /// L2-normalise and assert the resulting norm is within
    /// [`NORM_BOUNDS`]. Never returns an un-normalised vector.
    fn normalize_checked(&self, mut v: Vec<f32>) -> HygrepResult<Vec<f32>> {
        crate::vector::l2_normalize(&mut v);
        let norm = crate::vector::l2_norm(&v);
        if norm < NORM_BOUNDS.0 || norm > NORM_BOUNDS.1 {
            return Err(HygrepError::Inference(format!(
                "embedding norm {norm} outside [{}, {}]",
                NORM_BOUNDS.0, NORM_BOUNDS.1
            )));
        }
        Ok(v)
    }

    fn tokenize_batch(
        &self,
        texts: &[&str],
        max_len: usize,
    ) -> HygrepResult<(Vec<i64>, Vec<i64>, Vec<i64>)> {
        let mut all_input_ids = Vec::with_capacity(texts.len() * max_len);
        let mut all_attention_mask = Vec::with_capacity(texts.len() * max_len);
        let mut all_token_type_ids = Vec::with_capacity(texts.len() * max_len);

        for text in texts {
            let encoding = self
                .tokenizer
                .encode(*text, true)
                .map_err(|e| HygrepError::Tokeniser(format!("{e}")))?;

            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            let type_ids = encoding.get_type_ids();

            let actual_len = ids.len().min(max_len);

            for i in 0..actual_len {
                all_input_ids.push(ids[i] as i64);
                all_attention_mask.push(mask[i] as i64);
                all_token_type_ids.push(type_ids[i] as i64);
            }
            for _ in actual_len..max_len {
                all_input_ids.push(0);
                all_attention_mask.push(0);
                all_token_type_ids.push(0);
            }
        }

        Ok((all_input_ids, all_attention_mask, all_token_type_ids))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_fails_on_missing_model() {
        let config = EmbeddingConfig {
            model_path: "/nonexistent/model.onnx".into(),
            tokenizer_path: "/nonexistent/tokenizer.json".into(),
            dimensions: 384,
            batch_size: 64,
            max_seq_length: 512,
            model_version: MODEL_VERSION.to_string(),
        };
        let result = Embedder::new(&config);
        assert!(matches!(result, Err(HygrepError::ModelMissing(_))));
    }

    #[test]
    fn test_query_prefix_constant() {
        assert_eq!(
            QUERY_PREFIX,
            "Represent this sentence for searching relevant passages: "
        );
    }

    #[test]
    fn test_constants() {
        assert_eq!(DIMENSIONS, 384);
        assert_eq!(MAX_LENGTH, 512);
        assert_eq!(BATCH_SIZE, 64);
    }
}
