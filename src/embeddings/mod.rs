// Embeddings module
// Content chunking and the embedding provider abstraction

pub mod chunking;

#[cfg(test)]
pub(crate) mod fake;

use anyhow::Result;
use async_trait::async_trait;

pub use chunking::{
    ChunkingConfig, CourseChunk, chunk_course, chunk_lesson, chunk_text, context_prefix,
    split_sentences,
};

/// Produces dense vectors for text; implemented by the Ollama client
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, returning one vector per input in order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text
    #[inline]
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Embedding provider returned no vector"))
    }
}
