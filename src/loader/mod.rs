//! 문서 로더 모듈
//!
//! 코퍼스 디렉토리를 읽어 파일당 하나의 [`Document`]를 만듭니다.
//! 파일 수집은 [`FileCollector`], 텍스트 추출은 [`ContentExtractor`]가 담당합니다.

use std::path::Path;

use chrono::{DateTime, Utc};

use crate::collector::{CollectedFile, CollectorConfig, FileCollector};
use crate::error::{RagError, Result};
use crate::extractor::ContentExtractor;
use crate::knowledge::{Document, DocumentMetadata};

// ============================================================================
// DirectoryReader
// ============================================================================

/// 디렉토리 문서 로더
pub struct DirectoryReader {
    collector: FileCollector,
    extractor: ContentExtractor,
}

impl DirectoryReader {
    pub fn new(config: CollectorConfig) -> Self {
        Self {
            collector: FileCollector::new(config),
            extractor: ContentExtractor::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(CollectorConfig::default())
    }

    /// 디렉토리의 모든 읽을 수 있는 파일을 문서로 로드
    ///
    /// 개별 파일의 읽기 실패는 경고 후 건너뜁니다. 디렉토리가 없거나
    /// 읽을 수 있는 문서가 하나도 없으면 `DataSource` 에러입니다.
    pub async fn load_data(&self, dir: &Path) -> Result<Vec<Document>> {
        let files = self
            .collector
            .collect_directory(dir)
            .map_err(|e| RagError::data_source(dir, format!("{:#}", e)))?;

        if files.is_empty() {
            return Err(RagError::data_source(dir, "no readable files found"));
        }

        let mut documents = Vec::with_capacity(files.len());
        let mut skipped = 0usize;

        for file in &files {
            match self.load_file(file).await {
                Ok(Some(doc)) => documents.push(doc),
                Ok(None) => {
                    tracing::warn!("Skipping empty file: {:?}", file.path);
                    skipped += 1;
                }
                Err(e) => {
                    tracing::warn!("Skipping unreadable file: {:#}", e);
                    skipped += 1;
                }
            }
        }

        if documents.is_empty() {
            return Err(RagError::data_source(
                dir,
                format!("none of the {} files contained readable text", files.len()),
            ));
        }

        tracing::info!(
            "Loaded {} documents from {:?} ({} skipped)",
            documents.len(),
            dir,
            skipped
        );
        Ok(documents)
    }

    /// 파일 하나를 문서로 변환 (빈 파일은 None)
    async fn load_file(&self, file: &CollectedFile) -> anyhow::Result<Option<Document>> {
        let text = self.extractor.extract(&file.path, file.file_type).await?;
        if text.trim().is_empty() {
            return Ok(None);
        }

        let metadata = DocumentMetadata {
            file_name: file.file_name(),
            file_path: Some(file.path.display().to_string()),
            file_type: Some(file.file_type.mime_type(&file.path).to_string()),
            file_size: Some(file.size),
            last_modified: file.modified_at.map(DateTime::<Utc>::from),
        };

        Ok(Some(Document::new(text, metadata)))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_directory_with_metadata() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("resume.md"), "# Jane Doe\n\nRust engineer.").unwrap();
        std::fs::create_dir(dir.path().join("projects")).unwrap();
        std::fs::write(
            dir.path().join("projects").join("rag.txt"),
            "Built a retrieval pipeline.",
        )
        .unwrap();

        let docs = DirectoryReader::with_defaults()
            .load_data(dir.path())
            .await
            .unwrap();
        assert_eq!(docs.len(), 2);

        let names: Vec<&str> = docs.iter().map(|d| d.file_name()).collect();
        assert!(names.contains(&"resume.md"));
        assert!(names.contains(&"rag.txt"));

        let resume = docs.iter().find(|d| d.file_name() == "resume.md").unwrap();
        assert_eq!(resume.text, "# Jane Doe\n\nRust engineer.");
        assert_eq!(resume.metadata.file_type.as_deref(), Some("text/markdown"));
        assert_eq!(resume.metadata.file_size, Some(26));
        assert!(resume.metadata.last_modified.is_some());
    }

    #[tokio::test]
    async fn test_missing_directory_is_data_source_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = DirectoryReader::with_defaults()
            .load_data(&dir.path().join("missing"))
            .await;
        assert!(matches!(result, Err(RagError::DataSource { .. })));
    }

    #[tokio::test]
    async fn test_empty_directory_is_data_source_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = DirectoryReader::with_defaults()
            .load_data(dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::DataSource { .. }));
        assert!(err.to_string().contains("no readable files"));
    }

    #[tokio::test]
    async fn test_unreadable_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("blank.md"), "   \n").unwrap();
        std::fs::write(dir.path().join("latin1.txt"), [0xe9u8, 0x74, 0xe9]).unwrap();
        std::fs::write(dir.path().join("good.md"), "Skills: Rust, Python.").unwrap();

        let docs = DirectoryReader::with_defaults()
            .load_data(dir.path())
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].file_name(), "good.md");
    }

    #[tokio::test]
    async fn test_only_unreadable_files_is_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("blank.md"), "").unwrap();

        let result = DirectoryReader::with_defaults().load_data(dir.path()).await;
        assert!(matches!(result, Err(RagError::DataSource { .. })));
    }
}
