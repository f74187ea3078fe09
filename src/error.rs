//! 에러 모듈 - 파이프라인 단계별 에러 분류
//!
//! 셋업 단계 에러(문서 로드, 설정, 임베딩, 인덱스 빌드)는 프로세스 수명 동안
//! 엔진을 사용 불가 상태로 만들고, 질의 단계 에러(인증, 생성)는 해당 질의에만
//! 영향을 줍니다.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// 라이브러리 공용 Result 타입
pub type Result<T> = std::result::Result<T, RagError>;

// ============================================================================
// Setup Stage
// ============================================================================

/// 셋업 파이프라인 단계
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStage {
    /// API 키 확인
    Credentials,
    /// 문서 로드
    LoadDocuments,
    /// 문서 청킹
    ChunkDocuments,
    /// 임베딩/생성 모델 구성
    ConfigureModels,
    /// 벡터 인덱스 빌드
    BuildIndex,
    /// 쿼리 엔진 구성
    BuildQueryEngine,
}

impl SetupStage {
    /// 로그에 표시되는 단계 번호
    pub fn step(&self) -> &'static str {
        match self {
            SetupStage::Credentials => "0",
            SetupStage::LoadDocuments => "1",
            SetupStage::ChunkDocuments => "1.5",
            SetupStage::ConfigureModels => "2",
            SetupStage::BuildIndex => "3",
            SetupStage::BuildQueryEngine => "4",
        }
    }
}

impl fmt::Display for SetupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SetupStage::Credentials => "credential check",
            SetupStage::LoadDocuments => "document loading",
            SetupStage::ChunkDocuments => "document chunking",
            SetupStage::ConfigureModels => "model configuration",
            SetupStage::BuildIndex => "index build",
            SetupStage::BuildQueryEngine => "query engine setup",
        };
        write!(f, "STEP {} ({})", self.step(), label)
    }
}

// ============================================================================
// RagError
// ============================================================================

/// RAG 파이프라인 에러
#[derive(Debug, Error)]
pub enum RagError {
    /// 코퍼스 디렉토리가 없거나 읽을 수 있는 파일이 없음
    #[error("data source error ({}): {message}", path.display())]
    DataSource { path: PathBuf, message: String },

    /// API 키 누락, 임베딩 공간 불일치 등 설정 오류
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("embedding error ({provider}): {message}")]
    Embedding { provider: String, message: String },

    /// 인덱스 빌드 실패 (부분 인덱스는 남기지 않음)
    #[error("index build failed: {0}")]
    IndexBuild(#[source] Box<RagError>),

    #[error("authentication error ({provider}): {message}")]
    Authentication { provider: String, message: String },

    #[error("generation error ({provider}): {message}")]
    Generation { provider: String, message: String },

    /// 셋업 단계 실패 래퍼
    #[error("setup failed at {stage}: {source}")]
    Setup {
        stage: SetupStage,
        #[source]
        source: Box<RagError>,
    },

    /// 셋업이 완료되지 않았거나 실패한 엔진에 질의
    #[error("engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("another query is already in progress")]
    QueryInFlight,
}

impl RagError {
    pub fn data_source(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        RagError::DataSource {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn embedding(provider: impl Into<String>, message: impl fmt::Display) -> Self {
        RagError::Embedding {
            provider: provider.into(),
            message: message.to_string(),
        }
    }

    pub fn generation(provider: impl Into<String>, message: impl fmt::Display) -> Self {
        RagError::Generation {
            provider: provider.into(),
            message: message.to_string(),
        }
    }

    pub fn authentication(provider: impl Into<String>, message: impl fmt::Display) -> Self {
        RagError::Authentication {
            provider: provider.into(),
            message: message.to_string(),
        }
    }

    /// 셋업 단계 정보로 감싸기
    pub fn at_stage(self, stage: SetupStage) -> Self {
        match self {
            // 이미 감싸진 에러는 원래 단계를 유지
            err @ RagError::Setup { .. } => err,
            other => RagError::Setup {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// 셋업 실패 단계 (셋업 에러인 경우)
    pub fn stage(&self) -> Option<SetupStage> {
        match self {
            RagError::Setup { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// 질의 단위로 복구 가능한 에러인지 여부
    ///
    /// 복구 가능한 에러 후에도 엔진은 Ready 상태로 돌아갑니다.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RagError::Embedding { .. }
                | RagError::Authentication { .. }
                | RagError::Generation { .. }
                | RagError::QueryInFlight
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
