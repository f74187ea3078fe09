//! CLI 모듈
//!
//! resume-rag CLI 명령어 정의 및 구현
//!
//! 엔진 셋업과 질의는 라이브러리에 맡기고, 여기서는 입력을 받아 결과를 출력만 합니다.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::{load_api_key, EmbeddingBackend, RagConfig};
use crate::engine::{get_or_build_engine, QueryEngine};
use crate::error::RagError;
use crate::generation::Answer;
use crate::knowledge::{default_chunker, ChunkConfig, SNIPPET_CHARS};
use crate::loader::DirectoryReader;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "resume-rag")]
#[command(version, about = "이력서 문서 기반 RAG 질의응답 어시스턴트", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 질문 하나에 답변
    Ask {
        /// 질문
        question: String,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// 대화형 질의 (빈 줄은 무시, exit/quit로 종료)
    Chat {
        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// 문서 로드 + 청킹 결과 확인 (API 키 불필요)
    Inspect {
        #[command(flatten)]
        pipeline: PipelineArgs,
    },
}

/// 파이프라인 공통 옵션
#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
    /// 문서 디렉토리
    #[arg(short, long, env = "RAG_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// 임베딩 백엔드
    #[arg(short, long, env = "RAG_EMBEDDING", value_enum, default_value_t = EmbeddingBackend::Local)]
    pub embedding: EmbeddingBackend,

    /// 검색할 청크 수
    #[arg(short = 'k', long, env = "RAG_TOP_K", default_value_t = crate::knowledge::DEFAULT_TOP_K)]
    pub top_k: usize,

    /// 최대 청크 크기 (문자 수)
    #[arg(long, default_value_t = ChunkConfig::default().max_chunk_size)]
    pub chunk_size: usize,

    /// 청크 오버랩 (문자 수)
    #[arg(long, default_value_t = ChunkConfig::default().overlap)]
    pub chunk_overlap: usize,

    /// 생성 모델
    #[arg(long, default_value = crate::config::DEFAULT_GENERATION_MODEL)]
    pub model: String,

    /// 스트리밍 대신 전체 답변을 한 번에 출력
    #[arg(long)]
    pub no_stream: bool,
}

impl PipelineArgs {
    /// 기본 설정 + 환경변수 API 키 + CLI 옵션
    pub fn to_config(&self) -> RagConfig {
        RagConfig {
            data_dir: self.data_dir.clone(),
            chunk: ChunkConfig::new(self.chunk_size, self.chunk_overlap),
            embedding: self.embedding,
            generation_model: self.model.clone(),
            top_k: self.top_k,
            streaming: !self.no_stream,
            api_key: load_api_key(),
            ..RagConfig::default()
        }
    }
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Ask { question, pipeline } => cmd_ask(&question, &pipeline).await,
        Commands::Chat { pipeline } => cmd_chat(&pipeline).await,
        Commands::Inspect { pipeline } => cmd_inspect(&pipeline).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 엔진 준비 (실패 시 한 번만 보고)
async fn prepare_engine(pipeline: &PipelineArgs) -> Result<std::sync::Arc<QueryEngine>> {
    let config = pipeline.to_config();
    eprintln!("[*] 문서 로드 및 인덱싱 중: {}", config.data_dir.display());

    match get_or_build_engine(&config).await {
        Ok(engine) => {
            eprintln!(
                "[OK] 준비 완료: {} 청크 인덱싱됨 ({})\n",
                engine.index().len(),
                engine.index().embedder_name()
            );
            Ok(engine)
        }
        Err(err) => {
            eprintln!("[!] 어시스턴트를 초기화할 수 없습니다.");
            eprintln!("    데이터 폴더와 API 키를 확인하세요.");
            Err(err).context("RAG 엔진 초기화 실패")
        }
    }
}

/// 단일 질문 명령어 (ask)
async fn cmd_ask(question: &str, pipeline: &PipelineArgs) -> Result<()> {
    let engine = prepare_engine(pipeline).await?;
    answer_question(&engine, question).await?;
    Ok(())
}

/// 대화형 명령어 (chat)
///
/// 질의 실패는 출력만 하고 다음 질문을 계속 받습니다.
async fn cmd_chat(pipeline: &PipelineArgs) -> Result<()> {
    let engine = prepare_engine(pipeline).await?;
    println!("질문을 입력하세요 (예: What are your core Python skills?). 종료: exit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let Some(line) = lines.next_line().await.context("입력 읽기 실패")? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            break;
        }

        if let Err(err) = answer_question(&engine, line).await {
            eprintln!("[!] 답변을 가져오지 못했습니다: {}", err);
        }
        println!();
    }

    Ok(())
}

/// 질의 실행 후 답변과 출처 출력
async fn answer_question(engine: &QueryEngine, question: &str) -> Result<(), RagError> {
    let Some(response) = engine.query(question).await? else {
        return Ok(());
    };

    println!("[OK] 답변:");
    match response.answer {
        Answer::Full(text) => println!("{}", text.trim_end()),
        Answer::Streaming(mut stream) => {
            let mut stdout = std::io::stdout();
            while let Some(piece) = stream.next().await {
                let piece = piece?;
                print!("{}", piece);
                stdout.flush().ok();
            }
            println!();
        }
    }

    if let Some(source) = response.sources.first() {
        println!();
        println!("[*] 참고한 출처 (유사도 {:.4}):", source.score);
        println!("{}", source.snippet(SNIPPET_CHARS));
        println!("    파일: {}", source.file_name());
    }

    Ok(())
}

/// 검사 명령어 (inspect)
///
/// 문서를 로드하고 청킹한 결과를 파일별로 출력합니다.
async fn cmd_inspect(pipeline: &PipelineArgs) -> Result<()> {
    let config = pipeline.to_config();

    let documents = DirectoryReader::new(config.reader.clone())
        .load_data(&config.data_dir)
        .await
        .context("문서 로드 실패")?;
    let chunker = default_chunker(config.chunk).context("청킹 설정 오류")?;

    println!(
        "[OK] {} 문서 ({}, 최대 {}자 / 오버랩 {}자):\n",
        documents.len(),
        chunker.name(),
        config.chunk.max_chunk_size,
        config.chunk.overlap
    );

    let mut total_chunks = 0;
    for doc in &documents {
        let chunks = chunker.split_documents(std::slice::from_ref(doc));
        let longest = chunks.iter().map(|c| c.char_len()).max().unwrap_or(0);
        total_chunks += chunks.len();

        println!("  {}", doc.file_name());
        println!(
            "        {} | {} chars | {} chunks (longest {})",
            doc.metadata.file_type.as_deref().unwrap_or("-"),
            doc.char_len(),
            chunks.len(),
            longest
        );
        if let Some(first) = chunks.first() {
            println!("        {}", truncate_text(&first.text, 80));
        }
        println!();
    }

    println!("[OK] 총 {} 청크", total_chunks);
    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 텍스트 자르기 (UTF-8 안전, 한 줄로)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("hello world", 5), "hello...");
        assert_eq!(truncate_text("hello\nworld", 20), "hello world");
    }

    #[test]
    fn test_truncate_unicode() {
        let korean = "안녕하세요 세계";
        assert_eq!(truncate_text(korean, 5), "안녕하세요...");
    }

    #[test]
    fn test_parse_ask_with_defaults() {
        let cli = Cli::try_parse_from(["resume-rag", "ask", "What are your core skills?"]).unwrap();
        let Commands::Ask { question, pipeline } = cli.command else {
            panic!("expected ask");
        };
        assert_eq!(question, "What are your core skills?");

        let config = pipeline.to_config();
        assert_eq!(config.chunk, ChunkConfig::default());
        assert!(config.streaming);
        assert_eq!(config.generation_model, crate::config::DEFAULT_GENERATION_MODEL);
    }

    #[test]
    fn test_parse_pipeline_flags() {
        let cli = Cli::try_parse_from([
            "resume-rag",
            "chat",
            "--data-dir",
            "corpus",
            "--embedding",
            "gemini",
            "-k",
            "4",
            "--chunk-size",
            "512",
            "--chunk-overlap",
            "32",
            "--no-stream",
        ])
        .unwrap();
        let Commands::Chat { pipeline } = cli.command else {
            panic!("expected chat");
        };

        let config = pipeline.to_config();
        assert_eq!(config.data_dir, PathBuf::from("corpus"));
        assert_eq!(config.embedding, EmbeddingBackend::Gemini);
        assert_eq!(config.top_k, 4);
        assert_eq!(config.chunk, ChunkConfig::new(512, 32));
        assert!(!config.streaming);
    }

    #[tokio::test]
    async fn test_inspect_without_api_key() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("resume.md"), "Core skills: Rust.").unwrap();
        let cli = Cli::try_parse_from([
            "resume-rag",
            "inspect",
            "--data-dir",
            dir.path().to_str().unwrap(),
        ])
        .unwrap();
        assert!(run(cli).await.is_ok());
    }
}
