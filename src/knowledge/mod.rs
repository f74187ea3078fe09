//! Knowledge 모듈 - 문서/청크 모델, 청킹, 벡터 인덱스
//!
//! - Document / Chunk: 로더와 청커가 만드는 데이터 모델
//! - Chunker: 문장 경계 우선 텍스트 분할 (오버랩 포함)
//! - VectorIndex: 인메모리 코사인 유사도 top-k 검색

mod chunker;
mod document;
mod index;

// Re-exports
pub use chunker::{default_chunker, ChunkConfig, Chunker, SentenceSplitter, TextSpan};
pub use document::{Chunk, Document, DocumentMetadata, UNKNOWN_FILE_NAME};
pub use index::{cosine_similarity, SourceNode, VectorIndex, DEFAULT_TOP_K, SNIPPET_CHARS};
