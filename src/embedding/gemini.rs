//! Gemini 임베딩 API 프로바이더
//!
//! `embedContent` / `batchEmbedContents` 엔드포인트를 사용합니다.
//! 문서는 `RETRIEVAL_DOCUMENT`, 질의는 `RETRIEVAL_QUERY` 태스크 타입으로 임베딩합니다.
//! 요청 간격은 rate limiter로 조절하며, 실패 시 자동 재시도는 하지 않습니다.
//!
//! source: https://ai.google.dev/gemini-api/docs/embeddings

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::EmbeddingProvider;
use crate::error::{RagError, Result};

/// Gemini API 기본 URL
pub(crate) const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// text-embedding-004 출력 차원
pub const GEMINI_EMBEDDING_DIMENSION: usize = 768;

/// batchEmbedContents 한 번에 보낼 수 있는 최대 요청 수
const MAX_BATCH_REQUESTS: usize = 100;

/// Rate Limiter 설정 (Gemini 무료 티어: 60 RPM)
const RATE_LIMIT_RPM: u32 = 60;
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);
/// 호출 간 최소 딜레이 (1000ms = 60 RPM 준수)
const MIN_DELAY_MS: u64 = 1000;

/// HTTP 요청 타임아웃
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

// ============================================================================
// Rate Limiter
// ============================================================================

/// Rate Limiter with minimum delay between requests
#[derive(Debug)]
struct RateLimiter {
    requests: Vec<Instant>,
    max_requests: u32,
    window: Duration,
    min_delay: Duration,
    last_request: Option<Instant>,
}

impl RateLimiter {
    fn new(max_requests: u32, window: Duration, min_delay: Duration) -> Self {
        Self {
            requests: Vec::new(),
            max_requests,
            window,
            min_delay,
            last_request: None,
        }
    }

    /// 요청 가능할 때까지 대기 후 요청 기록
    async fn acquire(&mut self) {
        // 1. 최소 딜레이 적용 (버스트 방지)
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                let wait_time = self.min_delay - elapsed;
                tracing::debug!("Min delay: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        let now = Instant::now();

        // 2. 윈도우 밖의 오래된 요청 제거
        self.requests.retain(|&t| now.duration_since(t) < self.window);

        // 3. Rate limit 초과 시 대기
        if self.requests.len() >= self.max_requests as usize {
            if let Some(&oldest) = self.requests.first() {
                let wait_time = self.window.saturating_sub(now.duration_since(oldest));
                if !wait_time.is_zero() {
                    tracing::debug!("Rate limit reached, waiting {:?}", wait_time);
                    tokio::time::sleep(wait_time).await;
                }
                let now = Instant::now();
                self.requests.retain(|&t| now.duration_since(t) < self.window);
            }
        }

        // 4. 현재 요청 기록
        let now = Instant::now();
        self.requests.push(now);
        self.last_request = Some(now);
    }
}

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    content: EmbedContent,
    #[serde(rename = "taskType")]
    task_type: &'static str,
}

#[derive(Debug, Serialize)]
struct EmbedContent {
    parts: Vec<EmbedPart>,
}

#[derive(Debug, Serialize)]
struct EmbedPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedRequest>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

/// Gemini API 에러 응답
#[derive(Debug, Deserialize)]
pub(crate) struct GeminiError {
    pub error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GeminiErrorDetail {
    pub message: String,
    #[serde(default)]
    pub status: String,
}

/// 에러 본문에서 사람이 읽을 메시지 추출
pub(crate) fn describe_api_error(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<GeminiError>(body) {
        Ok(err) if !err.error.status.is_empty() => {
            format!("{} {}: {}", status.as_u16(), err.error.status, err.error.message)
        }
        Ok(err) => format!("{}: {}", status.as_u16(), err.error.message),
        Err(_) => format!("{}: {}", status.as_u16(), body.trim()),
    }
}

/// 임베딩 태스크 타입
#[derive(Debug, Clone, Copy)]
enum TaskType {
    Document,
    Query,
}

impl TaskType {
    fn as_str(&self) -> &'static str {
        match self {
            TaskType::Document => "RETRIEVAL_DOCUMENT",
            TaskType::Query => "RETRIEVAL_QUERY",
        }
    }
}

// ============================================================================
// GeminiEmbedding
// ============================================================================

/// Google Gemini 임베딩 구현체
#[derive(Debug)]
pub struct GeminiEmbedding {
    api_key: String,
    client: reqwest::Client,
    model: String,
    name: String,
    base_url: String,
    dimension: usize,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl GeminiEmbedding {
    /// 새 Gemini 임베딩 인스턴스 생성
    ///
    /// # Arguments
    /// * `api_key` - Google AI API 키
    /// * `model` - 임베딩 모델 이름 (예: `text-embedding-004`)
    pub fn new(api_key: String, model: String) -> Result<Self> {
        let model = model.trim_start_matches("models/").to_string();
        let name = format!("gemini/{}", model);

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RagError::embedding(&name, format!("failed to create HTTP client: {}", e)))?;

        let rate_limiter = Arc::new(Mutex::new(RateLimiter::new(
            RATE_LIMIT_RPM,
            RATE_LIMIT_WINDOW,
            Duration::from_millis(MIN_DELAY_MS),
        )));

        Ok(Self {
            api_key,
            client,
            model,
            name,
            base_url: GEMINI_API_BASE.to_string(),
            dimension: GEMINI_EMBEDDING_DIMENSION,
            rate_limiter,
        })
    }

    /// API 기본 URL 변경 (프록시/테스트용)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn request_for(&self, text: &str, task: TaskType) -> EmbedRequest {
        EmbedRequest {
            model: format!("models/{}", self.model),
            content: EmbedContent {
                parts: vec![EmbedPart {
                    text: text.to_string(),
                }],
            },
            task_type: task.as_str(),
        }
    }

    /// POST 후 성공 본문 반환 (실패는 Embedding 에러)
    async fn post<T: Serialize + ?Sized>(&self, method: &str, body: &T) -> Result<String> {
        self.rate_limiter.lock().await.acquire().await;

        let url = format!("{}/models/{}:{}", self.base_url, self.model, method);

        // API 키는 URL이 아닌 헤더로 전송
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| RagError::embedding(&self.name, format!("request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RagError::embedding(&self.name, format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(RagError::embedding(
                &self.name,
                describe_api_error(status, &text),
            ));
        }
        Ok(text)
    }

    async fn embed_one(&self, text: &str, task: TaskType) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        let body = self.post("embedContent", &self.request_for(text, task)).await?;
        let parsed: EmbedResponse = serde_json::from_str(&body).map_err(|e| {
            RagError::embedding(&self.name, format!("malformed embedding response: {}", e))
        })?;
        Ok(parsed.embedding.values)
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_one(text, TaskType::Document).await
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        self.embed_one(query, TaskType::Query).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        // 빈 텍스트는 단건 경로와 같이 영벡터 (요청에 포함하지 않음)
        let mut results = vec![vec![0.0; self.dimension]; texts.len()];
        let pending: Vec<usize> = (0..texts.len())
            .filter(|&i| !texts[i].trim().is_empty())
            .collect();

        for group in pending.chunks(MAX_BATCH_REQUESTS) {
            let request = BatchEmbedRequest {
                requests: group
                    .iter()
                    .map(|&i| self.request_for(&texts[i], TaskType::Document))
                    .collect(),
            };

            let body = self.post("batchEmbedContents", &request).await?;
            let parsed: BatchEmbedResponse = serde_json::from_str(&body).map_err(|e| {
                RagError::embedding(&self.name, format!("malformed batch response: {}", e))
            })?;

            if parsed.embeddings.len() != group.len() {
                return Err(RagError::embedding(
                    &self.name,
                    format!(
                        "batch returned {} embeddings for {} texts",
                        parsed.embeddings.len(),
                        group.len()
                    ),
                ));
            }
            for (&i, embedding) in group.iter().zip(parsed.embeddings) {
                results[i] = embedding.values;
            }
        }

        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn embedder() -> GeminiEmbedding {
        GeminiEmbedding::new("fake_key".into(), "models/text-embedding-004".into()).unwrap()
    }

    #[test]
    fn test_model_prefix_is_normalized() {
        let e = embedder();
        assert_eq!(e.model, "text-embedding-004");
        assert_eq!(e.name(), "gemini/text-embedding-004");
        assert_eq!(e.dimension(), GEMINI_EMBEDDING_DIMENSION);
    }

    #[test]
    fn test_request_serialization() {
        let request = embedder().request_for("What are your core skills?", TaskType::Query);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "models/text-embedding-004");
        assert_eq!(json["taskType"], "RETRIEVAL_QUERY");
        assert_eq!(json["content"]["parts"][0]["text"], "What are your core skills?");
    }

    #[test]
    fn test_parse_batch_response() {
        let body = r#"{"embeddings":[{"values":[0.1,0.2]},{"values":[0.3,0.4]}]}"#;
        let parsed: BatchEmbedResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.embeddings.len(), 2);
        assert_eq!(parsed.embeddings[1].values, vec![0.3, 0.4]);
    }

    #[test]
    fn test_describe_api_error() {
        let body = r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#;
        let msg = describe_api_error(reqwest::StatusCode::TOO_MANY_REQUESTS, body);
        assert_eq!(msg, "429 RESOURCE_EXHAUSTED: Quota exceeded");

        let msg = describe_api_error(reqwest::StatusCode::BAD_GATEWAY, "upstream down\n");
        assert_eq!(msg, "502: upstream down");
    }

    #[tokio::test]
    async fn test_blank_text_skips_request() {
        // 존재하지 않는 주소지만 빈 텍스트는 요청을 보내지 않음
        let e = embedder().with_base_url("http://127.0.0.1:9");
        let v = e.embed("   ").await.unwrap();
        assert_eq!(v.len(), GEMINI_EMBEDDING_DIMENSION);
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn test_blank_batch_items_skip_request() {
        let e = embedder().with_base_url("http://127.0.0.1:9");
        let texts = vec!["".to_string(), " \n ".to_string()];
        let vectors = e.embed_batch(&texts).await.unwrap();
        assert_eq!(vectors.len(), 2);
        assert!(vectors
            .iter()
            .all(|v| v.len() == GEMINI_EMBEDDING_DIMENSION && v.iter().all(|x| *x == 0.0)));

        // 빈 텍스트가 섞여 있어도 나머지는 요청됨
        let mixed = vec!["".to_string(), "core skills".to_string()];
        assert!(matches!(
            e.embed_batch(&mixed).await,
            Err(RagError::Embedding { .. })
        ));
    }

    #[tokio::test]
    async fn test_network_failure_is_embedding_error() {
        let e = embedder().with_base_url("http://127.0.0.1:9");
        match e.embed("hello").await {
            Err(RagError::Embedding { provider, .. }) => {
                assert_eq!(provider, "gemini/text-embedding-004")
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rate_limiter_enforces_min_delay() {
        let mut limiter = RateLimiter::new(60, RATE_LIMIT_WINDOW, Duration::from_millis(1000));
        limiter.acquire().await;
        limiter.acquire().await;
        assert_eq!(limiter.requests.len(), 2);
        let gap = limiter.requests[1].duration_since(limiter.requests[0]);
        assert!(gap >= Duration::from_millis(1000));
    }
}
