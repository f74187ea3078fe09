//! Text Chunking Module
//!
//! 문장 경계를 우선하는 텍스트 분할을 제공합니다.
//! 청크 크기와 오버랩은 모두 문자(char) 단위이며, 각 청크는 원본 문서의
//! 연속 구간을 그대로 잘라낸 것입니다.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::document::{Chunk, Document};
use crate::error::{RagError, Result};

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// 최대 청크 크기 (문자 수)
    pub max_chunk_size: usize,
    /// 인접 청크 간 오버랩 (문자 수)
    pub overlap: usize,
}

impl Default for ChunkConfig {
    /// 원격 임베딩 호출 수를 줄이기 위한 큰 청크 (2048 / 20)
    fn default() -> Self {
        Self {
            max_chunk_size: 2048,
            overlap: 20,
        }
    }
}

impl ChunkConfig {
    pub fn new(max_chunk_size: usize, overlap: usize) -> Self {
        Self {
            max_chunk_size,
            overlap,
        }
    }

    /// 설정 검증 (오버랩은 최대 크기보다 작아야 함)
    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_size == 0 {
            return Err(RagError::Configuration(
                "max_chunk_size must be greater than 0".into(),
            ));
        }
        if self.overlap >= self.max_chunk_size {
            return Err(RagError::Configuration(format!(
                "chunk overlap ({}) must be smaller than max_chunk_size ({})",
                self.overlap, self.max_chunk_size
            )));
        }
        Ok(())
    }

    /// 하드 분할 시 조각 크기 (조각 + 오버랩이 항상 한 청크에 들어가도록)
    fn piece_size(&self) -> usize {
        self.max_chunk_size.saturating_sub(self.overlap).max(1)
    }
}

// ============================================================================
// Span
// ============================================================================

/// 텍스트 내 구간 (문자 오프셋, end 미포함)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSpan {
    pub start_char: usize,
    pub end_char: usize,
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 구간으로 분할
    fn split_text(&self, text: &str) -> Vec<TextSpan>;

    /// 청커 이름
    fn name(&self) -> &'static str;

    /// 문서 목록을 청크로 분할
    ///
    /// 모든 문서는 최소 하나의 청크를 만들며, 문서 메타데이터가 청크로 전파됩니다.
    fn split_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        let mut chunks = Vec::new();

        for doc in documents {
            let offsets = char_offsets(&doc.text);
            for (index, span) in self.split_text(&doc.text).into_iter().enumerate() {
                let text = &doc.text[offsets[span.start_char]..offsets[span.end_char]];
                chunks.push(Chunk {
                    id: format!("{}-{}", doc.id, index),
                    doc_id: doc.id.clone(),
                    index,
                    text: text.to_string(),
                    metadata: Arc::clone(&doc.metadata),
                    start_char: span.start_char,
                    end_char: span.end_char,
                });
            }
        }

        chunks
    }
}

// ============================================================================
// SentenceSplitter
// ============================================================================

/// 문장 경계 우선 청커
///
/// 1. 문장 종결 부호(. ! ?) 뒤 공백과 줄바꿈에서 문장 단위로 나눔
/// 2. 너무 긴 문장은 문자 단위로 하드 분할
/// 3. 최대 크기까지 문장을 채우고, 다음 청크는 이전 끝에서 오버랩만큼 앞에서 시작
pub struct SentenceSplitter {
    config: ChunkConfig,
}

impl SentenceSplitter {
    /// 설정으로 생성 (설정 검증 포함)
    pub fn new(config: ChunkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn with_defaults() -> Self {
        Self {
            config: ChunkConfig::default(),
        }
    }

    /// 문장 단위 구간 (텍스트 전체를 빈틈없이 덮음)
    fn sentence_units(&self, text: &str, offsets: &[usize]) -> Vec<TextSpan> {
        let total = offsets.len() - 1;
        let mut units = Vec::new();
        let mut last = 0;

        for m in sentence_boundary().find_iter(text) {
            let end = byte_to_char(offsets, m.end());
            if end > last {
                units.push(TextSpan {
                    start_char: last,
                    end_char: end,
                });
                last = end;
            }
        }
        if last < total {
            units.push(TextSpan {
                start_char: last,
                end_char: total,
            });
        }

        // 긴 문장 하드 분할
        let piece = self.config.piece_size();
        units
            .into_iter()
            .flat_map(|unit| {
                (unit.start_char..unit.end_char)
                    .step_by(piece)
                    .map(move |start| TextSpan {
                        start_char: start,
                        end_char: (start + piece).min(unit.end_char),
                    })
            })
            .collect()
    }
}

impl Chunker for SentenceSplitter {
    fn split_text(&self, text: &str) -> Vec<TextSpan> {
        let offsets = char_offsets(text);
        let total = offsets.len() - 1;

        // 짧은 문서는 오버랩 없이 단일 청크
        if total <= self.config.max_chunk_size {
            return vec![TextSpan {
                start_char: 0,
                end_char: total,
            }];
        }

        let units = self.sentence_units(text, &offsets);
        let max = self.config.max_chunk_size;
        let mut spans = Vec::new();
        let mut start = 0;
        let mut i = 0;

        while i < units.len() {
            // 첫 단위는 piece_size 이하이므로 오버랩 포함해도 항상 들어감
            let mut end = units[i].end_char;
            i += 1;
            while i < units.len() && units[i].end_char - start <= max {
                end = units[i].end_char;
                i += 1;
            }

            spans.push(TextSpan {
                start_char: start,
                end_char: end,
            });

            if i < units.len() {
                start = end.saturating_sub(self.config.overlap).max(start);
            }
        }

        spans
    }

    fn name(&self) -> &'static str {
        "SentenceSplitter"
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 문장 경계 정규식
fn sentence_boundary() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"[.!?]+["'”’)\]]*\s+|\n\s*"#).expect("Invalid sentence boundary regex")
    })
}

/// 문자 인덱스 -> 바이트 오프셋 테이블 (마지막 원소는 text.len())
fn char_offsets(text: &str) -> Vec<usize> {
    text.char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect()
}

/// 바이트 오프셋(문자 경계) -> 문자 인덱스
#[inline]
fn byte_to_char(offsets: &[usize], byte: usize) -> usize {
    offsets.partition_point(|&b| b < byte)
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 설정으로 기본 청커 생성
pub fn default_chunker(config: ChunkConfig) -> Result<Box<dyn Chunker>> {
    Ok(Box::new(SentenceSplitter::new(config)?))
}

// ============================================================================
// Tests
// ============================================================================
