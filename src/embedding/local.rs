//! 로컬 임베딩 - fastembed ONNX 런타임으로 BGE small 모델 실행
//!
//! 모델(`BAAI/bge-small-en-v1.5`, 384차원)은 첫 임베딩 때 한 번 로드되며,
//! 캐시에 없으면 내려받습니다 (`FASTEMBED_CACHE_DIR`, 기본 `.fastembed_cache`).
//! 추론은 CPU 바운드이므로 `spawn_blocking`에서 실행합니다.

use std::sync::Arc;

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tokio::sync::OnceCell;
use tokio::task::spawn_blocking;

use super::EmbeddingProvider;
use crate::error::{RagError, Result};

/// 로컬 임베딩 차원
pub const LOCAL_EMBEDDING_DIMENSION: usize = 384;

/// 로컬 모델 식별자
pub const LOCAL_EMBEDDING_MODEL: &str = "BAAI/bge-small-en-v1.5";

/// BGE 검색용 질의 접두어 (문서 쪽은 접두어 없음)
const QUERY_INSTRUCTION: &str = "Represent this sentence for searching relevant passages: ";

const PROVIDER: &str = "local";

/// 프로세스 내 로컬 임베딩 모델
///
/// 복제본은 같은 로드된 모델을 공유합니다.
#[derive(Clone, Default)]
pub struct LocalEmbedding {
    model: Arc<OnceCell<Arc<TextEmbedding>>>,
}

impl std::fmt::Debug for LocalEmbedding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalEmbedding")
            .field("model", &LOCAL_EMBEDDING_MODEL)
            .field("loaded", &self.model.initialized())
            .finish()
    }
}

impl LocalEmbedding {
    pub fn new() -> Self {
        Self::default()
    }

    /// 모델 로드 (최초 1회)
    async fn model(&self) -> Result<Arc<TextEmbedding>> {
        let model = self
            .model
            .get_or_try_init(|| async {
                tracing::info!("Loading local embedding model {}...", LOCAL_EMBEDDING_MODEL);
                let loaded = spawn_blocking(|| {
                    TextEmbedding::try_new(
                        InitOptions::new(EmbeddingModel::BGESmallENV15)
                            .with_show_download_progress(false),
                    )
                })
                .await
                .map_err(|e| RagError::embedding(PROVIDER, format!("model load task failed: {}", e)))?
                .map_err(|e| {
                    RagError::embedding(
                        PROVIDER,
                        format!("failed to load {}: {}", LOCAL_EMBEDDING_MODEL, e),
                    )
                })?;
                tracing::info!("Local embedding model loaded");
                Ok::<_, RagError>(Arc::new(loaded))
            })
            .await?;
        Ok(Arc::clone(model))
    }

    /// 텍스트 묶음 임베딩 (빈 텍스트는 영벡터, 모델에 보내지 않음)
    async fn embed_texts(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let mut results = vec![vec![0.0f32; LOCAL_EMBEDDING_DIMENSION]; texts.len()];
        let (positions, inputs): (Vec<usize>, Vec<String>) = texts
            .into_iter()
            .enumerate()
            .filter(|(_, t)| !t.trim().is_empty())
            .unzip();
        if inputs.is_empty() {
            return Ok(results);
        }

        let model = self.model().await?;
        let embeddings = spawn_blocking(move || model.embed(inputs, None))
            .await
            .map_err(|e| RagError::embedding(PROVIDER, format!("embedding task failed: {}", e)))?
            .map_err(|e| RagError::embedding(PROVIDER, e.to_string()))?;

        if embeddings.len() != positions.len() {
            return Err(RagError::embedding(
                PROVIDER,
                format!(
                    "expected {} embeddings, got {}",
                    positions.len(),
                    embeddings.len()
                ),
            ));
        }
        for (position, embedding) in positions.into_iter().zip(embeddings) {
            results[position] = embedding;
        }
        Ok(results)
    }

    async fn embed_one(&self, text: String) -> Result<Vec<f32>> {
        self.embed_texts(vec![text])
            .await?
            .pop()
            .ok_or_else(|| RagError::embedding(PROVIDER, "empty embedding response"))
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_one(text.to_string()).await
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        if query.trim().is_empty() {
            return self.embed_one(String::new()).await;
        }
        self.embed_one(format!("{}{}", QUERY_INSTRUCTION, query)).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embed_texts(texts.to_vec()).await
    }

    fn dimension(&self) -> usize {
        LOCAL_EMBEDDING_DIMENSION
    }

    fn name(&self) -> &str {
        "local/BAAI/bge-small-en-v1.5"
    }
}

// ============================================================================
// Tests
// ============================================================================
