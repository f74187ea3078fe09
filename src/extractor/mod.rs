//! 콘텐츠 추출 모듈
//!
//! 파일 형식별로 텍스트 콘텐츠를 추출합니다.
//! - 텍스트 파일: UTF-8로 직접 읽기
//! - PDF 파일: pdf-extract로 텍스트 추출 (페이지 결합)

pub mod pdf;

use std::path::Path;

use anyhow::{Context, Result};

use crate::collector::FileType;

/// 콘텐츠 추출기
#[derive(Debug, Default, Clone, Copy)]
pub struct ContentExtractor;

impl ContentExtractor {
    pub fn new() -> Self {
        Self
    }

    /// 파일에서 텍스트 추출
    pub async fn extract(&self, path: &Path, file_type: FileType) -> Result<String> {
        match file_type {
            FileType::Text => self.extract_text(path).await,
            FileType::Pdf => self.extract_pdf(path).await,
        }
    }

    /// 텍스트 파일에서 추출 (UTF-8이 아니면 에러)
    async fn extract_text(&self, path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read text file: {:?}", path))?;

        let text = String::from_utf8(bytes)
            .map_err(|_| anyhow::anyhow!("Not a valid UTF-8 text file: {:?}", path))?;

        // BOM 제거
        Ok(text.trim_start_matches('\u{feff}').to_string())
    }

    /// PDF 파일에서 추출
    async fn extract_pdf(&self, path: &Path) -> Result<String> {
        // PDF 추출은 CPU 바운드이므로 spawn_blocking 사용
        let path = path.to_path_buf();
        let pages = tokio::task::spawn_blocking(move || pdf::extract_pages(&path))
            .await
            .context("PDF extraction task failed")??;

        Ok(pdf::join_pages(&pages))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_extract_text_strips_bom() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resume.md");
        std::fs::write(&path, "\u{feff}# Resume").unwrap();

        let text = ContentExtractor::new()
            .extract(&path, FileType::Text)
            .await
            .unwrap();
        assert_eq!(text, "# Resume");
    }

    #[tokio::test]
    async fn test_extract_text_rejects_binary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.dat");
        std::fs::write(&path, [0xffu8, 0xfe, 0x00, 0x80]).unwrap();

        let result = ContentExtractor::new().extract(&path, FileType::Text).await;
        assert!(result.is_err());
    }
}
