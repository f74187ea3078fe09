//! resume-rag - 문서 기반 RAG 질의응답 어시스턴트
//!
//! 문서 폴더를 로드해 청킹/임베딩/인덱싱한 뒤, 질의에 대해
//! 관련 청크를 검색하고 Gemini로 근거 있는 답변을 생성합니다.

pub mod cli;
pub mod collector;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod generation;
pub mod knowledge;
pub mod loader;

// Re-exports
pub use config::{EmbeddingBackend, RagConfig};
pub use embedding::{create_embedder, EmbeddingProvider, GeminiEmbedding, LocalEmbedding};
pub use engine::{
    get_or_build_engine, setup, setup_with, EngineCell, EngineState, Providers, QueryEngine,
    Response,
};
pub use error::{RagError, Result, SetupStage};
pub use generation::{create_generator, Answer, AnswerStream, GeminiGeneration, GenerationProvider};
pub use knowledge::{
    ChunkConfig, Chunk, Chunker, Document, DocumentMetadata, SentenceSplitter, SourceNode,
    VectorIndex,
};
pub use loader::DirectoryReader;
