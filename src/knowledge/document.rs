//! Document / Chunk 데이터 모델

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// 파일 이름이 없을 때 표시하는 값
pub const UNKNOWN_FILE_NAME: &str = "N/A";

// ============================================================================
// Document
// ============================================================================

/// 문서 메타데이터 (청크로 전파됨)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub file_name: Option<String>,
    pub file_path: Option<String>,
    pub file_type: Option<String>,
    pub file_size: Option<u64>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// 로더가 생성하는 원본 문서 (파일당 하나)
#[derive(Debug, Clone)]
pub struct Document {
    /// 파일 경로 기반 안정 ID
    pub id: String,
    pub text: String,
    pub metadata: Arc<DocumentMetadata>,
}

impl Document {
    /// 메타데이터와 함께 생성
    ///
    /// ID는 파일 경로(없으면 텍스트)의 SHA-256 앞 16자리입니다.
    pub fn new(text: impl Into<String>, metadata: DocumentMetadata) -> Self {
        let text = text.into();
        let key = metadata
            .file_path
            .as_deref()
            .or(metadata.file_name.as_deref())
            .unwrap_or(&text);
        Self {
            id: stable_id(key),
            text,
            metadata: Arc::new(metadata),
        }
    }

    /// 파일 정보 없이 텍스트만으로 생성
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::new(text, DocumentMetadata::default())
    }

    pub fn file_name(&self) -> &str {
        self.metadata.file_name.as_deref().unwrap_or(UNKNOWN_FILE_NAME)
    }

    /// 문자 수 (바이트 수가 아님)
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

fn stable_id(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    digest
        .iter()
        .take(8)
        .map(|b| format!("{:02x}", b))
        .collect()
}

// ============================================================================
// Chunk
// ============================================================================

/// 검색/임베딩 단위 청크 (노드)
#[derive(Debug, Clone)]
pub struct Chunk {
    /// `{doc_id}-{index}`
    pub id: String,
    pub doc_id: String,
    /// 문서 내 청크 순서 (0-based)
    pub index: usize,
    /// 원본 문서 텍스트의 연속 구간
    pub text: String,
    pub metadata: Arc<DocumentMetadata>,
    /// 시작 문자 오프셋 (포함)
    pub start_char: usize,
    /// 끝 문자 오프셋 (미포함)
    pub end_char: usize,
}

impl Chunk {
    pub fn file_name(&self) -> &str {
        self.metadata.file_name.as_deref().unwrap_or(UNKNOWN_FILE_NAME)
    }

    pub fn char_len(&self) -> usize {
        self.end_char - self.start_char
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_id_is_stable() {
        let meta = DocumentMetadata {
            file_name: Some("resume.md".into()),
            file_path: Some("data/resume.md".into()),
            ..Default::default()
        };
        let a = Document::new("first", meta.clone());
        let b = Document::new("second", meta);
        assert_eq!(a.id, b.id);
        assert_eq!(a.id.len(), 16);
    }

    #[test]
    fn test_file_name_fallback() {
        let doc = Document::from_text("plain text");
        assert_eq!(doc.file_name(), UNKNOWN_FILE_NAME);
    }

    #[test]
    fn test_char_len_counts_chars() {
        let doc = Document::from_text("안녕하세요");
        assert_eq!(doc.char_len(), 5);
        assert_eq!(doc.text.len(), 15);
    }
}
