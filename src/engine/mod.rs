//! 쿼리 엔진 모듈 - RAG 파이프라인 오케스트레이션
//!
//! 셋업: 자격 증명 확인 → 문서 로드 → 청킹 → 모델 구성 → 인덱스 빌드 → 엔진 구성.
//! 질의: 질의 임베딩 → top-k 검색 → 그라운딩 프롬프트 구성 → 답변 생성.
//!
//! 셋업 실패는 프로세스 수명 동안 복구되지 않고, 질의 실패는 해당 질의에만 영향을 줍니다.

mod cell;
mod prompt;

use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::RagConfig;
use crate::embedding::{create_embedder, EmbeddingProvider};
use crate::error::{RagError, Result, SetupStage};
use crate::generation::{create_generator, Answer, GenerationProvider};
use crate::knowledge::{default_chunker, SourceNode, VectorIndex};
use crate::loader::DirectoryReader;

pub use cell::{get_or_build_engine, global, EngineCell};
pub use prompt::build_prompt;

// ============================================================================
// State
// ============================================================================

/// 엔진 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// 셋업 전
    Uninitialized,
    /// 질의 대기
    Ready,
    /// 질의 처리 중
    Querying,
    /// 셋업 실패 (프로세스 종료 전까지 유지)
    Failed(SetupStage),
}

// ============================================================================
// Response
// ============================================================================

/// 질의 응답 (답변 + 유사도 순 출처)
#[derive(Debug)]
pub struct Response {
    pub answer: Answer,
    pub sources: Vec<SourceNode>,
}

impl Response {
    /// 가장 유사한 출처
    pub fn top_source(&self) -> Option<&SourceNode> {
        self.sources.first()
    }
}

// ============================================================================
// Providers
// ============================================================================

/// 파이프라인이 사용하는 모델 묶음
#[derive(Clone)]
pub struct Providers {
    /// 인덱스 빌드용 임베딩
    pub document_embedder: Arc<dyn EmbeddingProvider>,
    /// 질의용 임베딩 (인덱스와 같은 임베딩 공간이어야 함)
    pub query_embedder: Arc<dyn EmbeddingProvider>,
    pub generator: Arc<dyn GenerationProvider>,
}

impl Providers {
    /// 빌드와 질의에 같은 임베딩 프로바이더 사용
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationProvider>,
    ) -> Self {
        Self {
            document_embedder: Arc::clone(&embedder),
            query_embedder: embedder,
            generator,
        }
    }

    /// 설정으로 프로바이더 생성
    pub fn from_config(config: &RagConfig) -> Result<Self> {
        Ok(Self::new(create_embedder(config)?, create_generator(config)?))
    }

    /// 문서/질의 임베딩이 같은 임베딩 공간인지 확인 (인덱스 빌드 전)
    pub fn validate(&self) -> Result<()> {
        check_embedding_space(
            self.query_embedder.as_ref(),
            self.document_embedder.name(),
            self.document_embedder.dimension(),
        )
    }
}

/// 질의 임베딩의 이름/차원이 기대하는 임베딩 공간과 같은지 확인
fn check_embedding_space(
    query_embedder: &dyn EmbeddingProvider,
    name: &str,
    dimension: usize,
) -> Result<()> {
    if query_embedder.name() != name || query_embedder.dimension() != dimension {
        return Err(RagError::Configuration(format!(
            "query embedder {} ({} dims) does not match the index embedding space {} ({} dims)",
            query_embedder.name(),
            query_embedder.dimension(),
            name,
            dimension
        )));
    }
    Ok(())
}

// ============================================================================
// QueryEngine
// ============================================================================

/// 질의 옵션
#[derive(Debug, Clone, Copy)]
pub struct QueryOptions {
    pub top_k: usize,
    pub streaming: bool,
}

impl From<&RagConfig> for QueryOptions {
    fn from(config: &RagConfig) -> Self {
        Self {
            top_k: config.top_k,
            streaming: config.streaming,
        }
    }
}

/// RAG 쿼리 엔진
///
/// 인덱스는 빌드 후 읽기 전용이므로 상태 플래그만 잠금으로 보호합니다.
pub struct QueryEngine {
    index: VectorIndex,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn GenerationProvider>,
    options: QueryOptions,
    state: Mutex<EngineState>,
}

impl QueryEngine {
    /// 인덱스와 모델로 엔진 생성
    ///
    /// 질의 임베딩이 인덱스와 다른 임베딩 공간이면 `Configuration` 에러입니다.
    pub fn new(
        index: VectorIndex,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationProvider>,
        options: QueryOptions,
    ) -> Result<Self> {
        check_embedding_space(embedder.as_ref(), index.embedder_name(), index.dimension())?;

        Ok(Self {
            index,
            embedder,
            generator,
            options,
            state: Mutex::new(EngineState::Ready),
        })
    }

    pub fn state(&self) -> EngineState {
        *self.lock_state()
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// 질의 실행
    ///
    /// 빈 입력은 아무것도 실행하지 않고 `Ok(None)`입니다.
    /// 실패해도 엔진은 `Ready`로 돌아갑니다.
    pub async fn query(&self, text: &str) -> Result<Option<Response>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        let _guard = self.begin_query()?;
        tracing::info!("Query: {:?}", text);

        match self.run_query(text).await {
            Ok(response) => {
                tracing::info!(
                    "Answered with {} source(s) (top: {})",
                    response.sources.len(),
                    response
                        .top_source()
                        .map(|s| s.file_name())
                        .unwrap_or("none")
                );
                Ok(Some(response))
            }
            Err(err) => {
                tracing::error!("Query failed: {}", err);
                Err(err)
            }
        }
    }

    async fn run_query(&self, text: &str) -> Result<Response> {
        let query_embedding = self.embedder.embed_query(text).await?;
        let sources = self.index.retrieve(&query_embedding, self.options.top_k);
        tracing::debug!("Retrieved {} chunks", sources.len());

        let prompt = build_prompt(text, &sources);
        let answer = self
            .generator
            .complete(&prompt, self.options.streaming)
            .await?;

        Ok(Response { answer, sources })
    }

    /// Ready → Querying 전이 (가드가 drop되면 Ready로 복귀)
    fn begin_query(&self) -> Result<QueryGuard<'_>> {
        let mut state = self.lock_state();
        match *state {
            EngineState::Ready => {
                *state = EngineState::Querying;
                Ok(QueryGuard { engine: self })
            }
            EngineState::Querying => Err(RagError::QueryInFlight),
            other => Err(RagError::EngineUnavailable(format!(
                "engine is not ready ({:?})",
                other
            ))),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("chunks", &self.index.len())
            .field("embedder", &self.embedder.name())
            .field("generator", &self.generator.name())
            .field("options", &self.options)
            .field("state", &self.state())
            .finish()
    }
}

struct QueryGuard<'a> {
    engine: &'a QueryEngine,
}

impl Drop for QueryGuard<'_> {
    fn drop(&mut self) {
        *self.engine.lock_state() = EngineState::Ready;
    }
}

// ============================================================================
// Setup
// ============================================================================

/// 설정으로 엔진 셋업 (Gemini 생성 + 설정된 임베딩 백엔드)
pub async fn setup(config: &RagConfig) -> Result<QueryEngine> {
    setup_with(config, Providers::from_config).await
}

/// 프로바이더 구성 함수를 지정하여 엔진 셋업
///
/// 각 단계의 실패는 단계 정보와 함께 `RagError::Setup`으로 반환됩니다.
pub async fn setup_with<F>(config: &RagConfig, configure: F) -> Result<QueryEngine>
where
    F: FnOnce(&RagConfig) -> Result<Providers>,
{
    tracing::info!("Starting RAG setup process...");
    let result = run_setup(config, configure).await;
    match &result {
        Ok(engine) => tracing::info!(
            "Ready to answer questions ({} chunks indexed)",
            engine.index().len()
        ),
        Err(err) => tracing::error!("An error occurred during RAG setup: {}", err),
    }
    result
}

async fn run_setup<F>(config: &RagConfig, configure: F) -> Result<QueryEngine>
where
    F: FnOnce(&RagConfig) -> Result<Providers>,
{
    let stage = SetupStage::Credentials;
    tracing::info!("{}: Checking API key.", stage);
    config.require_api_key().map_err(|e| e.at_stage(stage))?;

    let stage = SetupStage::LoadDocuments;
    tracing::info!("{}: Loading documents from {:?}.", stage, config.data_dir);
    let documents = DirectoryReader::new(config.reader.clone())
        .load_data(&config.data_dir)
        .await
        .map_err(|e| e.at_stage(stage))?;
    tracing::info!("Loaded {} documents successfully.", documents.len());

    let stage = SetupStage::ChunkDocuments;
    tracing::info!(
        "{}: Splitting documents (chunk size {}, overlap {}).",
        stage,
        config.chunk.max_chunk_size,
        config.chunk.overlap
    );
    let splitter = default_chunker(config.chunk).map_err(|e| e.at_stage(stage))?;
    let chunks = splitter.split_documents(&documents);
    drop(documents);
    tracing::info!("Documents split into {} chunks.", chunks.len());

    let stage = SetupStage::ConfigureModels;
    tracing::info!("{}: Configuring models.", stage);
    config.validate().map_err(|e| e.at_stage(stage))?;
    let providers = configure(config).map_err(|e| e.at_stage(stage))?;
    providers.validate().map_err(|e| e.at_stage(stage))?;
    tracing::info!(
        "LLM configured ({}) and embedding model configured ({}).",
        providers.generator.name(),
        providers.document_embedder.name()
    );

    let stage = SetupStage::BuildIndex;
    tracing::info!("{}: Building vector index (embedding {} chunks).", stage, chunks.len());
    let index = VectorIndex::build(
        chunks,
        providers.document_embedder.as_ref(),
        config.embed_batch_size,
    )
    .await
    .map_err(|e| e.at_stage(stage))?;

    let stage = SetupStage::BuildQueryEngine;
    tracing::info!("{}: Creating query engine.", stage);
    QueryEngine::new(
        index,
        providers.query_embedder,
        providers.generator,
        QueryOptions::from(config),
    )
    .map_err(|e| e.at_stage(stage))
}

// ============================================================================
// Tests
// ============================================================================
