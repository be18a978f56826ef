//! Deterministic local pseudo-embeddings
//!
//! Used as the placeholder when a paid provider is rate limited or out of
//! quota, and as the `local` provider. The vector is a pure function of the
//! text: the SHA-256 of the content seeds a stream of hash blocks that is
//! folded into `dimension` floats and normalized to unit length.

use async_trait::async_trait;
use sha2::Digest;
use sha2::Sha256;

use super::provider::EmbeddingProvider;
use super::provider::ProviderOutput;
use super::text_preprocessing::estimate_tokens;
use crate::errors::ProviderError;

/// Model label written for rows embedded by the `local` provider
pub const LOCAL_MODEL: &str = "local-pseudo";

/// Build a unit-length vector of `dimension` floats derived from `text`
#[must_use]
pub fn pseudo_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let seed = Sha256::digest(text.as_bytes());
    let mut vector = Vec::with_capacity(dimension);
    let mut block: u64 = 0;

    while vector.len() < dimension {
        let mut hasher = Sha256::new();
        hasher.update(seed);
        hasher.update(block.to_le_bytes());
        let digest = hasher.finalize();

        for chunk in digest.chunks_exact(4) {
            if vector.len() == dimension {
                break;
            }
            let raw = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            let value = (f64::from(raw) / f64::from(u32::MAX)).mul_add(2.0, -1.0);
            vector.push(value as f32);
        }
        block += 1;
    }

    normalize(&mut vector);
    vector
}

fn normalize(vector: &mut [f32]) {
    let norm = vector
        .iter()
        .map(|v| f64::from(*v) * f64::from(*v))
        .sum::<f64>()
        .sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v = (f64::from(*v) / norm) as f32;
        }
    }
}

/// Provider that never leaves the process
pub struct LocalProvider {
    dimension: usize,
}

impl LocalProvider {
    #[must_use]
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    fn model(&self) -> &str {
        LOCAL_MODEL
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn max_batch_size(&self) -> usize {
        usize::MAX
    }

    async fn embed(&self, texts: &[String]) -> Result<ProviderOutput, ProviderError> {
        Ok(ProviderOutput {
            vectors: texts
                .iter()
                .map(|t| pseudo_embedding(t, self.dimension))
                .collect(),
            tokens_used: texts.iter().map(|t| estimate_tokens(t)).sum(),
        })
    }
}
