//! Vector Index - 인메모리 벡터 인덱스
//!
//! 청크와 임베딩 벡터를 함께 저장하고 코사인 유사도로 top-k 검색합니다.
//! 빌드 후에는 읽기 전용이며, 갱신/삭제 연산은 제공하지 않습니다.

use std::sync::Arc;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

use super::document::{Chunk, UNKNOWN_FILE_NAME};

/// 기본 검색 결과 수
pub const DEFAULT_TOP_K: usize = 2;

/// 화면 표시용 스니펫 길이 (문자 수)
pub const SNIPPET_CHARS: usize = 500;

// ============================================================================
// Types
// ============================================================================

/// 인덱스 엔트리
#[derive(Debug, Clone)]
struct IndexEntry {
    chunk: Arc<Chunk>,
    embedding: Vec<f32>,
}

/// 검색 결과 (출처 청크 + 유사도)
#[derive(Debug, Clone)]
pub struct SourceNode {
    pub chunk: Arc<Chunk>,
    /// 코사인 유사도 (-1.0 ~ 1.0)
    pub score: f32,
}

impl SourceNode {
    /// 청크 전체 텍스트
    pub fn text(&self) -> &str {
        &self.chunk.text
    }

    /// 원본 파일 이름 (없으면 "N/A")
    pub fn file_name(&self) -> &str {
        let name = self.chunk.file_name();
        if name.is_empty() {
            UNKNOWN_FILE_NAME
        } else {
            name
        }
    }

    /// 표시용 스니펫: 앞 `max_chars`자 + "..."
    pub fn snippet(&self, max_chars: usize) -> String {
        let head: String = self.chunk.text.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}

// ============================================================================
// VectorIndex
// ============================================================================

/// 인메모리 벡터 인덱스
#[derive(Debug)]
pub struct VectorIndex {
    entries: Vec<IndexEntry>,
    embedder_name: String,
    dimension: usize,
}

impl VectorIndex {
    /// 청크를 배치로 임베딩하여 인덱스 생성
    ///
    /// 하나라도 실패하면 `IndexBuild` 에러를 반환하고 부분 인덱스는 버립니다.
    pub async fn build(
        chunks: Vec<Chunk>,
        embedder: &dyn EmbeddingProvider,
        batch_size: usize,
    ) -> Result<Self> {
        let dimension = embedder.dimension();
        let batch_size = batch_size.max(1);
        let total = chunks.len();
        let mut entries = Vec::with_capacity(total);

        for (batch_no, batch) in chunks.chunks(batch_size).enumerate() {
            tracing::debug!(
                "Embedding batch {} ({}/{} chunks)",
                batch_no + 1,
                (batch_no * batch_size + batch.len()).min(total),
                total
            );

            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embeddings = embedder
                .embed_batch(&texts)
                .await
                .map_err(|e| RagError::IndexBuild(Box::new(e)))?;

            if embeddings.len() != batch.len() {
                return Err(RagError::IndexBuild(Box::new(RagError::embedding(
                    embedder.name(),
                    format!(
                        "expected {} embeddings, provider returned {}",
                        batch.len(),
                        embeddings.len()
                    ),
                ))));
            }

            for (chunk, embedding) in batch.iter().zip(embeddings) {
                if embedding.len() != dimension {
                    return Err(RagError::IndexBuild(Box::new(RagError::Configuration(
                        format!(
                            "embedding dimension mismatch for chunk {}: expected {}, got {}",
                            chunk.id,
                            dimension,
                            embedding.len()
                        ),
                    ))));
                }
                entries.push(IndexEntry {
                    chunk: Arc::new(chunk.clone()),
                    embedding,
                });
            }
        }

        tracing::info!(
            "Vector index built: {} chunks, dimension {} ({})",
            entries.len(),
            dimension,
            embedder.name()
        );

        Ok(Self {
            entries,
            embedder_name: embedder.name().to_string(),
            dimension,
        })
    }

    /// top-k 유사 청크 검색
    ///
    /// 유사도 내림차순, 동점은 삽입 순서 유지. 빈 인덱스는 빈 결과를 반환합니다.
    pub fn retrieve(&self, query_embedding: &[f32], k: usize) -> Vec<SourceNode> {
        let mut scored: Vec<SourceNode> = self
            .entries
            .iter()
            .map(|entry| SourceNode {
                chunk: Arc::clone(&entry.chunk),
                score: cosine_similarity(query_embedding, &entry.embedding),
            })
            .collect();

        // sort_by는 안정 정렬
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        scored
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// 인덱스를 만든 임베딩 프로바이더 이름
    pub fn embedder_name(&self) -> &str {
        &self.embedder_name
    }

    /// 삽입 순서대로 청크 순회
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|e| e.chunk.as_ref())
    }
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 길이가 다르거나 영벡터이면 0.0을 반환합니다.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;

    use super::*;
    use crate::knowledge::{Chunker, Document, DocumentMetadata, SentenceSplitter};

    /// 텍스트별로 고정 벡터를 돌려주는 테스트 임베더
    struct TableEmbedder {
        table: HashMap<String, Vec<f32>>,
        dimension: usize,
        fail_on: Option<String>,
    }

    #[async_trait]
    impl EmbeddingProvider for TableEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if self.fail_on.as_deref() == Some(text) {
                return Err(RagError::embedding("table", "rate limited"));
            }
            Ok(self
                .table
                .get(text)
                .cloned()
                .unwrap_or_else(|| vec![0.0; self.dimension]))
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn name(&self) -> &str {
            "table"
        }
    }

    fn chunks_for(texts: &[&str]) -> Vec<Chunk> {
        let docs: Vec<Document> = texts
            .iter()
            .enumerate()
            .map(|(i, t)| {
                Document::new(
                    *t,
                    DocumentMetadata {
                        file_name: Some(format!("doc{}.md", i)),
                        file_path: Some(format!("data/doc{}.md", i)),
                        ..Default::default()
                    },
                )
            })
            .collect();
        SentenceSplitter::with_defaults().split_documents(&docs)
    }

    fn embedder(pairs: &[(&str, Vec<f32>)]) -> TableEmbedder {
        TableEmbedder {
            table: pairs
                .iter()
                .map(|(t, v)| (t.to_string(), v.clone()))
                .collect(),
            dimension: 3,
            fail_on: None,
        }
    }

    #[test]
    fn test_cosine_similarity_same() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_orthogonal_and_opposite() {
        let a = vec![1.0, 0.0, 0.0];
        assert!(cosine_similarity(&a, &[0.0, 1.0, 0.0]).abs() < 0.0001);
        assert!((cosine_similarity(&a, &[-1.0, 0.0, 0.0]) + 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_degenerate() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[tokio::test]
    async fn test_retrieve_sorted_descending() {
        let texts = ["alpha", "beta", "gamma"];
        let emb = embedder(&[
            ("alpha", vec![1.0, 0.0, 0.0]),
            ("beta", vec![0.7, 0.7, 0.0]),
            ("gamma", vec![0.0, 0.0, 1.0]),
        ]);
        let index = VectorIndex::build(chunks_for(&texts), &emb, 2).await.unwrap();
        assert_eq!(index.len(), 3);
        assert_eq!(index.dimension(), 3);
        assert_eq!(index.embedder_name(), "table");

        let results = index.retrieve(&[1.0, 0.1, 0.0], 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].text(), "alpha");
        assert_eq!(results[1].text(), "beta");
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn test_retrieve_all_when_k_exceeds_size() {
        let texts = ["alpha", "beta", "gamma"];
        let emb = embedder(&[
            ("alpha", vec![1.0, 0.0, 0.0]),
            ("beta", vec![0.0, 1.0, 0.0]),
            ("gamma", vec![0.5, 0.5, 0.0]),
        ]);
        let index = VectorIndex::build(chunks_for(&texts), &emb, 10).await.unwrap();
        let results = index.retrieve(&[0.0, 1.0, 0.0], 10);
        assert_eq!(results.len(), 3);
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn test_ties_keep_insertion_order() {
        let texts = ["first", "second", "third"];
        let same = vec![0.0, 1.0, 0.0];
        let emb = embedder(&[
            ("first", same.clone()),
            ("second", same.clone()),
            ("third", same.clone()),
        ]);
        let index = VectorIndex::build(chunks_for(&texts), &emb, 1).await.unwrap();
        let results = index.retrieve(&same, 3);
        let order: Vec<&str> = results.iter().map(|r| r.text()).collect();
        assert_eq!(order, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_empty_index_returns_empty() {
        let emb = embedder(&[]);
        let index = VectorIndex::build(Vec::new(), &emb, 10).await.unwrap();
        assert!(index.is_empty());
        assert!(index.retrieve(&[1.0, 0.0, 0.0], 5).is_empty());
    }

    #[tokio::test]
    async fn test_build_failure_is_index_build_error() {
        let mut emb = embedder(&[("alpha", vec![1.0, 0.0, 0.0])]);
        emb.fail_on = Some("beta".into());
        let result = VectorIndex::build(chunks_for(&["alpha", "beta"]), &emb, 1).await;
        match result {
            Err(RagError::IndexBuild(inner)) => {
                assert!(matches!(*inner, RagError::Embedding { .. }))
            }
            other => panic!("unexpected result: {:?}", other.map(|i| i.len())),
        }
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let emb = embedder(&[("alpha", vec![1.0, 0.0])]);
        let result = VectorIndex::build(chunks_for(&["alpha"]), &emb, 1).await;
        assert!(matches!(result, Err(RagError::IndexBuild(_))));
    }

    #[tokio::test]
    async fn test_source_node_snippet_and_file_name() {
        let long = "word ".repeat(200);
        let emb = embedder(&[]);
        let index = VectorIndex::build(chunks_for(&[long.as_str()]), &emb, 1)
            .await
            .unwrap();
        let node = &index.retrieve(&[1.0, 0.0, 0.0], 1)[0];
        let snippet = node.snippet(SNIPPET_CHARS);
        assert_eq!(snippet.chars().count(), SNIPPET_CHARS + 3);
        assert!(snippet.ends_with("..."));
        assert_eq!(node.file_name(), "doc0.md");
        assert_eq!(node.text(), long);
    }
}
