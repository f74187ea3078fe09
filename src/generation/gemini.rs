//! Gemini 생성 프로바이더
//!
//! `generateContent`(전체)와 `streamGenerateContent?alt=sse`(스트리밍)를 사용합니다.
//! 인증 실패(401/403, `API_KEY_INVALID`)는 `Authentication`, 그 외 모든 실패는
//! `Generation` 에러이며 둘 다 질의 단위로 복구 가능합니다.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::{AnswerStream, GenerationProvider};
use crate::embedding::{describe_api_error, GEMINI_API_BASE, REQUEST_TIMEOUT};
use crate::error::{RagError, Result};

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateResponse {
    /// 첫 후보의 텍스트 파트 결합 (후보가 없으면 None)
    fn text(self) -> Option<String> {
        let candidate = self.candidates.into_iter().next()?;
        let text = candidate
            .content
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<String>()
            })
            .unwrap_or_default();

        if text.is_empty() && candidate.finish_reason.as_deref() == Some("SAFETY") {
            return None;
        }
        Some(text)
    }
}

// ============================================================================
// Error Classification
// ============================================================================

/// HTTP 실패 응답을 에러로 분류
fn classify_failure(provider: &str, status: StatusCode, body: &str) -> RagError {
    let message = describe_api_error(status, body);
    if status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || body.contains("API_KEY_INVALID")
    {
        RagError::authentication(provider, message)
    } else {
        RagError::generation(provider, message)
    }
}

/// 전송 실패를 에러로 분류
fn transport_failure(provider: &str, err: reqwest::Error) -> RagError {
    if err.is_timeout() {
        RagError::generation(provider, format!("request timed out: {}", err))
    } else {
        RagError::generation(provider, format!("request failed: {}", err))
    }
}

// ============================================================================
// SSE Decoder
// ============================================================================

/// Server-Sent Events 디코더
///
/// 바이트 조각을 받아 완성된 `data:` 줄의 페이로드를 돌려줍니다.
/// 줄 단위로 UTF-8 디코딩하므로 멀티바이트 문자가 조각 경계에 걸려도 안전합니다.
#[derive(Debug, Default)]
struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(payload) = Self::payload(&line) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// 스트림 종료 시 남은 줄 처리
    fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        Self::payload(&rest)
    }

    fn payload(line: &[u8]) -> Option<String> {
        let line = String::from_utf8_lossy(line);
        let data = line.trim().strip_prefix("data:")?.trim();
        if data.is_empty() || data == "[DONE]" {
            None
        } else {
            Some(data.to_string())
        }
    }
}

// ============================================================================
// GeminiGeneration
// ============================================================================

/// Google Gemini 생성 구현체
#[derive(Debug, Clone)]
pub struct GeminiGeneration {
    api_key: String,
    client: reqwest::Client,
    model: String,
    name: String,
    base_url: String,
}

impl GeminiGeneration {
    /// # Arguments
    /// * `api_key` - Google AI API 키
    /// * `model` - 생성 모델 이름 (예: `gemini-2.5-flash`)
    pub fn new(api_key: String, model: String) -> Result<Self> {
        let model = model.trim_start_matches("models/").to_string();
        let name = format!("gemini/{}", model);

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RagError::generation(&name, format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            client,
            model,
            name,
            base_url: GEMINI_API_BASE.to_string(),
        })
    }

    /// API 기본 URL 변경 (프록시/테스트용)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn request(prompt: &str) -> GenerateRequest<'_> {
        GenerateRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
        }
    }

    /// 요청 전송 후 성공 응답 반환 (실패는 분류된 에러)
    async fn send(&self, url: &str, prompt: &str) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&Self::request(prompt))
            .send()
            .await
            .map_err(|e| transport_failure(&self.name, e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(&self.name, status, &body))
    }
}

#[async_trait]
impl GenerationProvider for GeminiGeneration {
    async fn complete_text(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let response = self.send(&url, prompt).await?;

        let body = response
            .text()
            .await
            .map_err(|e| transport_failure(&self.name, e))?;
        let parsed: GenerateResponse = serde_json::from_str(&body).map_err(|e| {
            RagError::generation(&self.name, format!("malformed response: {}", e))
        })?;

        parsed
            .text()
            .ok_or_else(|| RagError::generation(&self.name, "response contained no candidates"))
    }

    async fn complete_stream(&self, prompt: &str) -> Result<AnswerStream> {
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        );
        let response = self.send(&url, prompt).await?;
        let provider = self.name.clone();

        Ok(AnswerStream::spawn(move |tx| {
            pump_sse(provider, response, tx)
        }))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// SSE 응답 본문을 읽어 텍스트 조각을 채널로 전달
async fn pump_sse(
    provider: String,
    response: reqwest::Response,
    tx: mpsc::Sender<Result<String>>,
) {
    let mut bytes = response.bytes_stream();
    let mut decoder = SseDecoder::default();

    while let Some(chunk) = bytes.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                let _ = tx.send(Err(transport_failure(&provider, e))).await;
                return;
            }
        };

        for payload in decoder.push(&chunk) {
            if !forward(&provider, &payload, &tx).await {
                return;
            }
        }
    }

    if let Some(payload) = decoder.finish() {
        forward(&provider, &payload, &tx).await;
    }
    tracing::debug!("Generation stream finished ({})", provider);
}

/// 페이로드 하나를 파싱해 전달 (계속 진행할지 여부 반환)
async fn forward(provider: &str, payload: &str, tx: &mpsc::Sender<Result<String>>) -> bool {
    let parsed: GenerateResponse = match serde_json::from_str(payload) {
        Ok(parsed) => parsed,
        Err(e) => {
            let _ = tx
                .send(Err(RagError::generation(
                    provider,
                    format!("malformed stream event: {}", e),
                )))
                .await;
            return false;
        }
    };

    match parsed.text() {
        Some(text) if text.is_empty() => true,
        Some(text) => tx.send(Ok(text)).await.is_ok(),
        None => true,
    }
}

// ============================================================================
// Tests
// ============================================================================
