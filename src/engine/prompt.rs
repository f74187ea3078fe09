//! 그라운딩 프롬프트 구성

use crate::knowledge::SourceNode;

/// 검색된 청크와 질의로 QA 프롬프트 구성
///
/// 각 청크는 `file_name:` 헤더와 함께 컨텍스트 블록에 들어갑니다.
pub fn build_prompt(query: &str, sources: &[SourceNode]) -> String {
    let context = sources
        .iter()
        .map(|s| format!("file_name: {}\n\n{}", s.file_name(), s.text().trim()))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Context information is below.\n\
         ---------------------\n\
         {}\n\
         ---------------------\n\
         Given the context information and not prior knowledge, answer the query.\n\
         Query: {}\n\
         Answer: ",
        context, query
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::knowledge::{Chunker, Document, DocumentMetadata, SentenceSplitter};

    fn node(name: Option<&str>, text: &str, score: f32) -> SourceNode {
        let doc = Document::new(
            text,
            DocumentMetadata {
                file_name: name.map(str::to_string),
                ..Default::default()
            },
        );
        let chunk = SentenceSplitter::with_defaults()
            .split_documents(&[doc])
            .remove(0);
        SourceNode {
            chunk: Arc::new(chunk),
            score,
        }
    }

    #[test]
    fn test_prompt_contains_context_and_query() {
        let sources = vec![
            node(Some("resume.md"), "Core skills: Rust.\n", 0.9),
            node(None, "Hobbies: hiking.", 0.2),
        ];
        let prompt = build_prompt("What are your core skills?", &sources);

        assert!(prompt.starts_with("Context information is below."));
        assert!(prompt.contains("file_name: resume.md\n\nCore skills: Rust.\n\nfile_name: N/A"));
        assert!(prompt.ends_with("Query: What are your core skills?\nAnswer: "));
        let first = prompt.find("resume.md").unwrap();
        let second = prompt.find("Hobbies").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_prompt_without_sources() {
        let prompt = build_prompt("anything", &[]);
        assert!(prompt.contains("---------------------\n\n---------------------"));
        assert!(prompt.contains("Query: anything"));
    }
}
