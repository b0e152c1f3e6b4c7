use anyhow::{Result, bail};
use async_trait::async_trait;

use super::Embedder;

pub(crate) const DIMENSION: usize = 256;

/// Deterministic bag-of-words embedder: texts sharing words land close together
pub(crate) struct KeywordEmbedder;

impl KeywordEmbedder {
    pub(crate) fn vector(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; DIMENSION];
        vector[0] = 0.05;

        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 2)
        {
            let hash = word
                .to_lowercase()
                .bytes()
                .fold(0xcbf2_9ce4_8422_2325_u64, |h, b| {
                    (h ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
                });
            vector[1 + (hash % (DIMENSION as u64 - 1)) as usize] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        vector.iter().map(|v| v / norm).collect()
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }
}

/// Embedder whose backend is always down
pub(crate) struct BrokenEmbedder;

#[async_trait]
impl Embedder for BrokenEmbedder {
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("connection refused")
    }
}
