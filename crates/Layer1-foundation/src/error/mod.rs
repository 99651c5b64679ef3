//! Error types for RelayCode
//!
//! 모든 에러를 중앙에서 관리

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// RelayCode 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // 설정 관련
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    // ========================================================================
    // 실행 관련
    // ========================================================================
    /// The task process could not be started at all.
    #[error("Failed to spawn task process: {message}")]
    Spawn {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// The task process ran but produced no usable task identifier, or
    /// exited with a nonzero status.
    #[error("Task launch failed with code {code:?}: {message}")]
    Launch { code: Option<i32>, message: String },

    /// The deadline elapsed before a terminal status was observed.
    #[error("Task timed out after {minutes} minutes")]
    Timeout { minutes: u64 },

    /// The task reached a terminal failed status.
    #[error("Task failed: {context}")]
    TaskFailed { context: String },

    /// The isolated process errored or the sandbox could not run it.
    #[error("Container execution failed: {0}")]
    Container(String),

    // ========================================================================
    // 일반
    // ========================================================================
    #[error("Not found: {0}")]
    NotFound(String),

    // ========================================================================
    // 외부 에러 변환
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ========================================================================
    // 기타
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Spawn 에러 생성 헬퍼
    pub fn spawn(message: impl Into<String>, source: std::io::Error) -> Self {
        Error::Spawn {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Launch 에러 생성 헬퍼
    pub fn launch(code: Option<i32>, message: impl Into<String>) -> Self {
        Error::Launch {
            code,
            message: message.into(),
        }
    }

    /// Timeout 에러 생성 헬퍼 (whole minutes)
    pub fn timeout(timeout: std::time::Duration) -> Self {
        Error::Timeout {
            minutes: (timeout.as_secs_f64() / 60.0).round() as u64,
        }
    }

    /// 재시도 가능한 에러인지 확인
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Timeout { .. } | Error::Io(_))
    }

    /// 타임아웃 에러인지 확인
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}
