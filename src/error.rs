use thiserror::Error;

use crate::sandbox::SandboxError;

#[derive(Debug, Error)]
pub enum GradeError {
    #[error("unsupported language for concurrency instrumentation: {0}")]
    UnsupportedLanguage(String),

    #[error("invalid test case: {0}")]
    InvalidTestCase(String),

    #[error("execution sandbox unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("unexpected sandbox response: {0}")]
    Sandbox(String),

    #[error("submission {0} is still being processed")]
    StillProcessing(String),
}

impl From<SandboxError> for GradeError {
    fn from(err: SandboxError) -> Self {
        match err {
            SandboxError::Unavailable(msg) => GradeError::ServiceUnavailable(msg),
            SandboxError::Protocol(msg) => GradeError::Sandbox(msg),
        }
    }
}
