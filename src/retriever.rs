//! Top-k semantic lookup over an [`IndexHandle`].

use std::sync::Arc;

use tracing::debug;

use crate::chunker::Chunk;
use crate::db::search::SearchResult;
use crate::embedder::Embedder;
use crate::index::{IndexHandle, Result};

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }

    /// The `top_k` chunks closest to `query`, best first.
    pub async fn retrieve(
        &self,
        handle: &IndexHandle,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<Chunk>> {
        Ok(self
            .retrieve_with_scores(handle, query, top_k)
            .await?
            .into_iter()
            .map(|(chunk, _)| chunk)
            .collect())
    }

    /// Like [`retrieve`](Self::retrieve), paired with similarity in `[0, 1]`.
    ///
    /// A `top_k` of zero is treated as one.
    pub async fn retrieve_with_scores(
        &self,
        handle: &IndexHandle,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<(Chunk, f64)>> {
        let top_k = top_k.max(1);
        let query_vector = self.embedder.embed(query).await?;
        let mut results = handle.search(query_vector, top_k).await?;
        results.truncate(top_k);

        debug!("Retrieved {} chunks for query", results.len());
        Ok(results.into_iter().map(into_scored_chunk).collect())
    }
}

fn into_scored_chunk(result: SearchResult) -> (Chunk, f64) {
    (
        Chunk {
            text: result.content,
            metadata: result.metadata,
            position: result.position,
        },
        result.similarity,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::hashing::HashingEmbedder;
    use crate::index::Index;
    use crate::parser::Document;

    fn chunk(file_name: &str, text: &str) -> Chunk {
        Chunk {
            text: text.to_string(),
            metadata: Document::new(file_name, String::new()).metadata,
            position: 0,
        }
    }

    async fn setup() -> (Retriever, IndexHandle) {
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(128));
        let handle = Index::new(embedder.clone(), ":memory:")
            .build(vec![
                chunk("geo.pdf", "The capital of France is Paris."),
                chunk("people.csv", "name | age\nAlice | 30"),
                chunk("rust.pdf", "Rust guarantees memory safety without a garbage collector."),
                chunk("cooking.pdf", "Simmer the sauce for twenty minutes."),
            ])
            .await
            .unwrap();
        (Retriever::new(embedder), handle)
    }

    #[tokio::test]
    async fn test_exact_text_ranks_first() {
        let (retriever, handle) = setup().await;
        let scored = retriever
            .retrieve_with_scores(&handle, "Simmer the sauce for twenty minutes.", 4)
            .await
            .unwrap();

        assert_eq!(scored[0].0.text, "Simmer the sauce for twenty minutes.");
        assert_eq!(scored[0].0.file_name(), "cooking.pdf");
        for pair in scored.windows(2) {
            assert!(pair[0].1 >= pair[1].1);
        }
    }

    #[tokio::test]
    async fn test_truncates_to_top_k() {
        let (retriever, handle) = setup().await;
        let chunks = retriever
            .retrieve(&handle, "capital of France", 2)
            .await
            .unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].file_name(), "geo.pdf");
    }

    #[tokio::test]
    async fn test_top_k_larger_than_index() {
        let (retriever, handle) = setup().await;
        let chunks = retriever.retrieve(&handle, "Alice", 10).await.unwrap();
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].file_name(), "people.csv");
    }

    #[tokio::test]
    async fn test_zero_top_k_returns_one() {
        let (retriever, handle) = setup().await;
        let chunks = retriever.retrieve(&handle, "memory safety", 0).await.unwrap();
        assert_eq!(chunks.len(), 1);
    }
}
