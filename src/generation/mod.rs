//! 생성 모듈 - LLM 답변 생성
//!
//! 프롬프트를 받아 답변을 한 번에 또는 스트리밍으로 돌려주는
//! [`GenerationProvider`] 트레이트와 Gemini 구현체를 제공합니다.
//!
//! 스트리밍 답변은 [`AnswerStream`]으로 표현됩니다. 순서가 보장되고 유한하며,
//! 소비자가 `next()`로 끝까지 당기거나 `cancel()`로 중단합니다.

mod gemini;

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::RagConfig;
use crate::error::Result;

pub use gemini::GeminiGeneration;

/// 스트림 채널 버퍼 크기
const STREAM_BUFFER: usize = 32;

// ============================================================================
// AnswerStream
// ============================================================================

/// 스트리밍 답변 - 텍스트 조각의 순서 있는 유한 시퀀스
///
/// 생산자 태스크가 채널로 조각을 보내고, 에러가 나면 `Err` 하나를 보낸 뒤 종료합니다.
/// 스트림을 drop하면 생산자 태스크도 중단됩니다.
pub struct AnswerStream {
    rx: mpsc::Receiver<Result<String>>,
    producer: Option<JoinHandle<()>>,
}

impl AnswerStream {
    /// 생산자 태스크를 띄워 스트림 생성
    pub fn spawn<F, Fut>(produce: F) -> Self
    where
        F: FnOnce(mpsc::Sender<Result<String>>) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let producer = tokio::spawn(produce(tx));
        Self {
            rx,
            producer: Some(producer),
        }
    }

    /// 미리 준비된 조각들로 스트림 생성
    pub fn from_chunks<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = Result<String>>,
    {
        let items: Vec<Result<String>> = chunks.into_iter().collect();
        let (tx, rx) = mpsc::channel(items.len().max(1));
        for item in items {
            // 용량이 충분하므로 실패하지 않음
            let _ = tx.try_send(item);
        }
        Self { rx, producer: None }
    }

    /// 다음 조각 (생성이 끝나면 None)
    pub async fn next(&mut self) -> Option<Result<String>> {
        self.rx.recv().await
    }

    /// 생성 중단 (이후 `next()`는 남은 버퍼를 비운 뒤 None)
    pub fn cancel(&mut self) {
        if let Some(producer) = self.producer.take() {
            producer.abort();
        }
        self.rx.close();
    }

    /// 끝까지 소비하여 전체 텍스트 반환 (첫 에러에서 중단)
    pub async fn collect_text(mut self) -> Result<String> {
        let mut text = String::new();
        while let Some(piece) = self.next().await {
            text.push_str(&piece?);
        }
        Ok(text)
    }
}

impl Stream for AnswerStream {
    type Item = Result<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for AnswerStream {
    fn drop(&mut self) {
        if let Some(producer) = self.producer.take() {
            producer.abort();
        }
    }
}

impl std::fmt::Debug for AnswerStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnswerStream")
            .field("running", &self.producer.is_some())
            .finish()
    }
}

// ============================================================================
// Answer
// ============================================================================

/// 생성 결과 (전체 또는 스트리밍)
#[derive(Debug)]
pub enum Answer {
    Full(String),
    Streaming(AnswerStream),
}

impl Answer {
    /// 전체 텍스트로 변환 (스트리밍이면 끝까지 소비)
    pub async fn into_text(self) -> Result<String> {
        match self {
            Answer::Full(text) => Ok(text),
            Answer::Streaming(stream) => stream.collect_text().await,
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, Answer::Streaming(_))
    }
}

// ============================================================================
// GenerationProvider Trait
// ============================================================================

/// 생성 프로바이더 트레이트
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// 전체 답변 생성
    async fn complete_text(&self, prompt: &str) -> Result<String>;

    /// 스트리밍 답변 생성
    async fn complete_stream(&self, prompt: &str) -> Result<AnswerStream>;

    /// `stream` 플래그에 따라 전체 또는 스트리밍 답변
    async fn complete(&self, prompt: &str, stream: bool) -> Result<Answer> {
        if stream {
            Ok(Answer::Streaming(self.complete_stream(prompt).await?))
        } else {
            Ok(Answer::Full(self.complete_text(prompt).await?))
        }
    }

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Factory Function
// ============================================================================

/// 설정으로 생성 프로바이더 생성 (API 키 필요)
pub fn create_generator(config: &RagConfig) -> Result<Arc<dyn GenerationProvider>> {
    let api_key = config.require_api_key()?;
    let generator = GeminiGeneration::new(api_key.to_string(), config.generation_model.clone())?;
    tracing::info!("LLM configured: {}", generator.name());
    Ok(Arc::new(generator))
}

// ============================================================================
// Tests
// ============================================================================
