//! 프로세스 전역 엔진 셀
//!
//! 엔진은 처음 필요할 때 한 번만 빌드되고 프로세스 종료까지 재사용됩니다.
//! 셋업이 실패하면 그 실패가 저장되어 이후 호출에서도 재시도 없이 반환됩니다.
//! 별도 정리 작업은 없으며 프로세스 종료 시 함께 해제됩니다.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::OnceCell;

use super::{setup, EngineState, QueryEngine, Response};
use crate::config::RagConfig;
use crate::error::{RagError, Result, SetupStage};

/// 저장된 셋업 실패
#[derive(Debug, Clone)]
struct SetupFailure {
    stage: Option<SetupStage>,
    message: String,
}

impl fmt::Display for SetupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// 지연 초기화되는 엔진 싱글턴
pub struct EngineCell {
    cell: OnceCell<std::result::Result<Arc<QueryEngine>, SetupFailure>>,
}

impl Default for EngineCell {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineCell {
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::const_new(),
        }
    }

    /// 엔진 반환 (처음 호출 시 `build` 실행)
    ///
    /// 셋업 실패는 첫 호출에서 원래 에러로, 이후에는 `EngineUnavailable`로 보고됩니다.
    pub async fn get_or_build<F, Fut>(&self, build: F) -> Result<Arc<QueryEngine>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<QueryEngine>>,
    {
        let mut first_error: Option<RagError> = None;
        let slot = &mut first_error;

        let stored = self
            .cell
            .get_or_init(|| async move {
                match build().await {
                    Ok(engine) => Ok(Arc::new(engine)),
                    Err(err) => {
                        let failure = SetupFailure {
                            stage: err.stage(),
                            message: err.to_string(),
                        };
                        *slot = Some(err);
                        Err(failure)
                    }
                }
            })
            .await;

        if let Some(err) = first_error {
            return Err(err);
        }
        match stored {
            Ok(engine) => Ok(Arc::clone(engine)),
            Err(failure) => Err(RagError::EngineUnavailable(failure.to_string())),
        }
    }

    /// 빌드된 엔진 (셋업 전이거나 실패했으면 None)
    pub fn get(&self) -> Option<Arc<QueryEngine>> {
        match self.cell.get() {
            Some(Ok(engine)) => Some(Arc::clone(engine)),
            _ => None,
        }
    }

    pub fn state(&self) -> EngineState {
        match self.cell.get() {
            None => EngineState::Uninitialized,
            Some(Ok(engine)) => engine.state(),
            Some(Err(failure)) => {
                EngineState::Failed(failure.stage.unwrap_or(SetupStage::BuildQueryEngine))
            }
        }
    }

    /// 준비된 엔진에 질의 (준비되지 않았으면 `EngineUnavailable`)
    pub async fn query(&self, text: &str) -> Result<Option<Response>> {
        match self.cell.get() {
            Some(Ok(engine)) => engine.query(text).await,
            Some(Err(failure)) => Err(RagError::EngineUnavailable(failure.to_string())),
            None => Err(RagError::EngineUnavailable(
                "setup has not completed".to_string(),
            )),
        }
    }
}

/// 프로세스 전역 셀
pub fn global() -> &'static EngineCell {
    static ENGINE: EngineCell = EngineCell::new();
    &ENGINE
}

/// 전역 엔진 반환 (처음 호출 시 `config`로 셋업)
///
/// 같은 프로세스에서는 항상 같은 엔진을 돌려주며, 이후 호출의 `config`는 무시됩니다.
pub async fn get_or_build_engine(config: &RagConfig) -> Result<Arc<QueryEngine>> {
    global().get_or_build(|| setup(config)).await
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::embedding::testing::KeywordEmbedding;
    use crate::engine::setup_with;
    use crate::engine::testing::ScriptedGenerator;
    use crate::engine::Providers;

    fn corpus() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("resume.md"),
            "Core skills: Rust and Python. Built retrieval systems.",
        )
        .unwrap();
        dir
    }

    fn config(dir: &std::path::Path) -> RagConfig {
        RagConfig {
            data_dir: dir.to_path_buf(),
            api_key: Some("test-key".into()),
            streaming: false,
            ..RagConfig::default()
        }
    }

    #[tokio::test]
    async fn test_builds_once_and_reuses() {
        let dir = corpus();
        let cfg = config(dir.path());
        let cell = EngineCell::new();
        let builds = AtomicUsize::new(0);
        assert_eq!(cell.state(), EngineState::Uninitialized);

        let build = || {
            builds.fetch_add(1, Ordering::SeqCst);
            setup_with(&cfg, |_| {
                Ok(Providers::new(
                    Arc::new(KeywordEmbedding::default()),
                    Arc::new(ScriptedGenerator::default()),
                ))
            })
        };

        let first = cell.get_or_build(build).await.unwrap();
        let second = cell.get_or_build(build).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(cell.state(), EngineState::Ready);
        assert!(cell.get().is_some());

        let response = cell.query("core skills").await.unwrap().unwrap();
        assert_eq!(response.sources[0].file_name(), "resume.md");
    }

    #[tokio::test]
    async fn test_failed_setup_is_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(&dir.path().join("missing"));
        let generator = Arc::new(ScriptedGenerator::default());
        let cell = EngineCell::new();

        let shared = Arc::clone(&generator);
        let first = cell
            .get_or_build(|| {
                setup_with(&cfg, move |_| {
                    Ok(Providers::new(Arc::new(KeywordEmbedding::default()), shared))
                })
            })
            .await
            .unwrap_err();
        assert_eq!(first.stage(), Some(SetupStage::LoadDocuments));
        assert_eq!(cell.state(), EngineState::Failed(SetupStage::LoadDocuments));

        // 두 번째 호출은 빌드를 다시 시도하지 않음
        let retries = AtomicUsize::new(0);
        let second = cell
            .get_or_build(|| {
                retries.fetch_add(1, Ordering::SeqCst);
                async { Err(RagError::Configuration("retried".into())) }
            })
            .await
            .unwrap_err();
        assert_eq!(retries.load(Ordering::SeqCst), 0);
        assert!(matches!(second, RagError::EngineUnavailable(_)));
        assert!(second.to_string().contains("STEP 1"));

        // 사용 불가 엔진은 생성 모델을 호출하지 않음
        assert!(matches!(
            cell.query("What are your core skills?").await,
            Err(RagError::EngineUnavailable(_))
        ));
        assert_eq!(generator.calls(), 0);
        assert!(cell.get().is_none());
    }

    #[tokio::test]
    async fn test_query_before_setup_is_unavailable() {
        let cell = EngineCell::new();
        assert!(matches!(
            cell.query("hello").await,
            Err(RagError::EngineUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_global_cell_is_shared() {
        assert!(std::ptr::eq(global(), global()));
    }
}
