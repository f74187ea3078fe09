//! 설정 모듈
//!
//! 파이프라인 전체 설정과 API 키 로드를 담당합니다.
//! 기본값은 레퍼런스 구성(청크 2048자, 오버랩 20자, 로컬 임베딩)을 따릅니다.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::collector::CollectorConfig;
use crate::error::{RagError, Result};
use crate::knowledge::{ChunkConfig, DEFAULT_TOP_K};

/// API 키 환경변수 (우선순위 순)
pub const API_KEY_ENV_VARS: [&str; 2] = ["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"];

/// 기본 생성 모델
pub const DEFAULT_GENERATION_MODEL: &str = "gemini-2.5-flash";

/// 기본 원격 임베딩 모델
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";

/// 기본 임베딩 배치 크기
pub const DEFAULT_EMBED_BATCH_SIZE: usize = 10;

// ============================================================================
// Embedding Backend
// ============================================================================

/// 임베딩 백엔드 선택
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// 프로세스 내 BGE small 모델 (fastembed, API 호출/rate limit 없음)
    #[default]
    Local,
    /// Gemini 임베딩 API
    Gemini,
}

impl fmt::Display for EmbeddingBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmbeddingBackend::Local => write!(f, "local"),
            EmbeddingBackend::Gemini => write!(f, "gemini"),
        }
    }
}

// ============================================================================
// RagConfig
// ============================================================================

/// RAG 파이프라인 설정
#[derive(Clone, Serialize, Deserialize)]
pub struct RagConfig {
    /// 문서 디렉토리
    pub data_dir: PathBuf,
    /// 파일 수집 설정
    pub reader: CollectorConfig,
    /// 청킹 설정
    pub chunk: ChunkConfig,
    /// 임베딩 백엔드
    pub embedding: EmbeddingBackend,
    /// 원격 임베딩 모델 이름
    pub embedding_model: String,
    /// 생성 모델 이름
    pub generation_model: String,
    /// 검색할 청크 수
    pub top_k: usize,
    /// 인덱스 빌드 시 임베딩 배치 크기
    pub embed_batch_size: usize,
    /// 스트리밍 응답 여부
    pub streaming: bool,
    /// API 키 (직렬화하지 않음)
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            reader: CollectorConfig::default(),
            chunk: ChunkConfig::default(),
            embedding: EmbeddingBackend::default(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            generation_model: DEFAULT_GENERATION_MODEL.to_string(),
            top_k: DEFAULT_TOP_K,
            embed_batch_size: DEFAULT_EMBED_BATCH_SIZE,
            streaming: true,
            api_key: None,
        }
    }
}

// API 키가 로그에 노출되지 않도록 직접 구현
impl fmt::Debug for RagConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RagConfig")
            .field("data_dir", &self.data_dir)
            .field("reader", &self.reader)
            .field("chunk", &self.chunk)
            .field("embedding", &self.embedding)
            .field("embedding_model", &self.embedding_model)
            .field("generation_model", &self.generation_model)
            .field("top_k", &self.top_k)
            .field("embed_batch_size", &self.embed_batch_size)
            .field("streaming", &self.streaming)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl RagConfig {
    /// 기본 설정 + 환경변수의 API 키
    pub fn from_env() -> Self {
        Self {
            api_key: load_api_key(),
            ..Self::default()
        }
    }

    /// API 키 반환 (없으면 설정 에러)
    pub fn require_api_key(&self) -> Result<&str> {
        match self.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(RagError::Configuration(format!(
                "API key not found. Set {} (or {}) before starting the assistant.\n\
                 Get your API key at: https://aistudio.google.com/app/apikey",
                API_KEY_ENV_VARS[0], API_KEY_ENV_VARS[1]
            ))),
        }
    }

    /// 설정값 검증
    pub fn validate(&self) -> Result<()> {
        self.chunk.validate()?;
        if self.top_k == 0 {
            return Err(RagError::Configuration("top_k must be at least 1".into()));
        }
        if self.embed_batch_size == 0 {
            return Err(RagError::Configuration(
                "embed_batch_size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// API Key Management
// ============================================================================

/// 환경변수에서 API 키 로드
///
/// 우선순위:
/// 1. `GEMINI_API_KEY`
/// 2. `GOOGLE_AI_API_KEY`
pub fn load_api_key() -> Option<String> {
    for var in API_KEY_ENV_VARS {
        if let Ok(key) = std::env::var(var) {
            if !key.trim().is_empty() {
                tracing::debug!("Using API key from {}", var);
                return Some(key);
            }
        }
    }
    None
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RagConfig::default();
        assert_eq!(config.chunk.max_chunk_size, 2048);
        assert_eq!(config.chunk.overlap, 20);
        assert_eq!(config.embedding, EmbeddingBackend::Local);
        assert_eq!(config.top_k, DEFAULT_TOP_K);
        assert!(config.streaming);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_require_api_key() {
        let mut config = RagConfig::default();
        let err = config.require_api_key().unwrap_err();
        assert!(matches!(err, RagError::Configuration(_)));
        assert!(err.to_string().contains("GEMINI_API_KEY"));

        config.api_key = Some("   ".into());
        assert!(config.require_api_key().is_err());

        config.api_key = Some("secret".into());
        assert_eq!(config.require_api_key().unwrap(), "secret");
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = RagConfig {
            api_key: Some("super-secret".into()),
            ..RagConfig::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_validate_rejects_zero_top_k() {
        let config = RagConfig {
            top_k: 0,
            ..RagConfig::default()
        };
        assert!(matches!(config.validate(), Err(RagError::Configuration(_))));
    }

    #[test]
    fn test_serialize_skips_api_key() {
        let config = RagConfig {
            api_key: Some("super-secret".into()),
            ..RagConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("super-secret"));
        assert!(json.contains("\"embedding\":\"local\""));
    }
}
