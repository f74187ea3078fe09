//! 임베딩 모듈 - 텍스트 벡터화
//!
//! 두 가지 프로바이더를 같은 트레이트 뒤에 둡니다.
//! - [`LocalEmbedding`]: 프로세스 내 BGE small 모델 (API 호출/rate limit 없음)
//! - [`GeminiEmbedding`]: Gemini 임베딩 API
//!
//! 인덱스 빌드와 질의에는 반드시 같은 프로바이더를 사용해야 합니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = create_embedder(&RagConfig::from_env())?;
//! let embedding = embedder.embed("Hello, world!").await?;
//! ```

mod gemini;
mod local;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{EmbeddingBackend, RagConfig};
use crate::error::Result;

pub use gemini::{GeminiEmbedding, GEMINI_EMBEDDING_DIMENSION};
pub(crate) use gemini::{describe_api_error, GEMINI_API_BASE, REQUEST_TIMEOUT};
pub use local::{LocalEmbedding, LOCAL_EMBEDDING_DIMENSION, LOCAL_EMBEDDING_MODEL};

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 고정 차원 벡터로 변환하는 인터페이스입니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 문서 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 질의 텍스트 임베딩 (기본 구현: `embed`와 동일)
    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        self.embed(query).await
    }

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름 (임베딩 공간 식별에 사용)
    fn name(&self) -> &str;
}

// ============================================================================
// Factory Function
// ============================================================================

/// 설정의 백엔드에 맞는 임베딩 프로바이더 생성
pub fn create_embedder(config: &RagConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedder: Arc<dyn EmbeddingProvider> = match config.embedding {
        EmbeddingBackend::Local => Arc::new(LocalEmbedding::new()),
        EmbeddingBackend::Gemini => {
            let api_key = config.require_api_key()?;
            Arc::new(GeminiEmbedding::new(
                api_key.to_string(),
                config.embedding_model.clone(),
            )?)
        }
    };

    tracing::info!(
        "Embedding model configured: {} (dimension: {})",
        embedder.name(),
        embedder.dimension()
    );
    Ok(embedder)
}

// ============================================================================
// Tests
// ============================================================================
