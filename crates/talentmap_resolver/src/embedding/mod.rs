//! Text embedding capability behind a trait.
//!
//! The resolver's semantic stage only needs one operation: turn a batch
//! of strings into fixed-dimension vectors. Any reasonable encoder
//! works; the default is a deterministic feature-hashing encoder that
//! needs no model files and no network. A real sentence-transformer
//! backend is available behind the `onnx-embeddings` feature.

pub mod index;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding backend failure: {0}")]
    Backend(String),
    #[error("embedding cache I/O failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("embedding cache is corrupt: {0}")]
    CorruptCache(String),
}

/// A batch text encoder producing unit-norm vectors of a fixed dimension.
pub trait TextEmbedder: Send + Sync {
    /// Stable identifier baked into cache file names. Changing the
    /// encoder must change this string.
    fn model_id(&self) -> &str;

    fn dim(&self) -> usize;

    /// Embed a batch. Returns one vector per input, each of `dim()` length.
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

const HASH_DIM: usize = 256;
const WORD_WEIGHT: f32 = 2.0;
const TRIGRAM_WEIGHT: f32 = 1.0;

/// Deterministic feature-hashing encoder.
///
/// Features are lowercase word tokens plus padded character trigrams;
/// each feature is blake3-hashed into a signed bucket. Word tokens are
/// weighted above trigrams so "work email" and "WorkEmails" land close
/// while sharing little exact text. Output vectors are L2-normalized.
#[derive(Debug, Default, Clone)]
pub struct HashEmbedder;

impl HashEmbedder {
    pub fn new() -> Self {
        Self
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; HASH_DIM];
        let lowered = text.to_lowercase();

        for word in lowered.split(|c: char| !c.is_ascii_alphanumeric()) {
            if word.is_empty() {
                continue;
            }
            accumulate(&mut vector, word, WORD_WEIGHT);

            let padded: Vec<char> = format!("^{}$", word).chars().collect();
            for tri in padded.windows(3) {
                let feature: String = tri.iter().collect();
                accumulate(&mut vector, &feature, TRIGRAM_WEIGHT);
            }
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

fn accumulate(vector: &mut [f32], feature: &str, weight: f32) {
    let digest = blake3::hash(feature.as_bytes());
    let bytes = digest.as_bytes();
    let raw = u64::from_le_bytes(bytes[..8].try_into().expect("digest is 32 bytes"));
    let bucket = (raw % vector.len() as u64) as usize;
    let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
    vector[bucket] += sign * weight;
}

impl TextEmbedder for HashEmbedder {
    fn model_id(&self) -> &str {
        "hash256-v1"
    }

    fn dim(&self) -> usize {
        HASH_DIM
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Sentence-transformer backend over fastembed. Heavier but markedly
/// better on free-text column descriptions.
#[cfg(feature = "onnx-embeddings")]
pub mod onnx {
    use super::{EmbedError, TextEmbedder};
    use std::sync::Mutex;

    pub struct OnnxEmbedder {
        inner: Mutex<fastembed::TextEmbedding>,
        dim: usize,
    }

    impl OnnxEmbedder {
        pub fn new() -> Result<Self, EmbedError> {
            let model = fastembed::TextEmbedding::try_new(
                fastembed::InitOptions::new(fastembed::EmbeddingModel::AllMiniLML6V2)
                    .with_show_download_progress(false),
            )
            .map_err(|e| EmbedError::Backend(e.to_string()))?;
            Ok(Self {
                inner: Mutex::new(model),
                dim: 384,
            })
        }
    }

    impl TextEmbedder for OnnxEmbedder {
        fn model_id(&self) -> &str {
            "all-minilm-l6-v2"
        }

        fn dim(&self) -> usize {
            self.dim
        }

        fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            let mut model = self
                .inner
                .lock()
                .map_err(|_| EmbedError::Backend("embedder lock poisoned".into()))?;
            let owned: Vec<String> = texts.to_vec();
            model
                .embed(owned, None)
                .map_err(|e| EmbedError::Backend(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn embedding_is_deterministic() {
        let embedder = HashEmbedder::new();
        let a = embedder.embed(&["Work Email".to_string()]).unwrap();
        let b = embedder.embed(&["Work Email".to_string()]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn vectors_are_unit_norm() {
        let embedder = HashEmbedder::new();
        let vectors = embedder
            .embed(&["Employee ID".to_string(), "Hire Date".to_string()])
            .unwrap();
        for v in vectors {
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5, "norm was {norm}");
        }
    }

    #[test]
    fn related_names_score_above_unrelated() {
        let embedder = HashEmbedder::new();
        let vectors = embedder
            .embed(&[
                "WorkEmails work email address".to_string(),
                "Email Addresses work and personal email".to_string(),
                "Headcount number of openings".to_string(),
            ])
            .unwrap();
        let related = cosine(&vectors[0], &vectors[1]);
        let unrelated = cosine(&vectors[0], &vectors[2]);
        assert!(
            related > unrelated,
            "related={related} unrelated={unrelated}"
        );
    }

    #[test]
    fn empty_text_embeds_to_zero_vector() {
        let embedder = HashEmbedder::new();
        let v = embedder.embed(&["".to_string()]).unwrap();
        assert!(v[0].iter().all(|x| *x == 0.0));
    }
}
