mod judge0;
mod poll;

pub use judge0::Judge0Client;
pub use poll::{submit_and_wait_with_retry, submit_with_retry, wait_for_completion};

use std::future::Future;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::verdict::Verdict;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SandboxError {
    /// Connection refused, timed out or the service reported itself down
    #[error("sandbox unreachable: {0}")]
    Unavailable(String),
    #[error("sandbox protocol error: {0}")]
    Protocol(String),
}

/// Everything the execution sandbox needs to compile and run one test case
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SubmissionRequest {
    pub source_code: String,
    pub language_id: u32,
    pub stdin: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compiler_options: Option<String>,
    /// Seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_time_limit: Option<f64>,
    /// Kilobytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_processes_and_or_threads: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_per_process_and_thread_time_limit: Option<bool>,
}

/// A submission as reported back by the sandbox
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct SubmissionResult {
    #[serde(default)]
    pub token: Option<String>,
    pub status_id: u32,
    #[serde(default)]
    pub stdout: Option<String>,
    #[serde(default)]
    pub stderr: Option<String>,
    #[serde(default)]
    pub expected_output: Option<String>,
    #[serde(default)]
    pub compile_output: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    /// Seconds; the sandbox sends this as a decimal string
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub time: Option<f64>,
    /// Kilobytes
    #[serde(default)]
    pub memory: Option<u64>,
}

impl SubmissionResult {
    pub fn verdict(&self) -> Result<Verdict, SandboxError> {
        Verdict::from_id(self.status_id)
            .filter(|v| v.id() <= 14)
            .ok_or_else(|| SandboxError::Protocol(format!("unknown status id {}", self.status_id)))
    }
}

fn lenient_seconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// The external code execution service.
///
/// Grading only prepares input for and interprets output of this seam; it
/// never executes candidate code itself.
pub trait ExecutionSandbox: Send + Sync {
    /// Queues a submission and returns its token
    fn submit(
        &self,
        request: &SubmissionRequest,
    ) -> impl Future<Output = Result<String, SandboxError>> + Send;

    /// Submits and blocks until the sandbox reports a final status
    fn submit_and_wait(
        &self,
        request: &SubmissionRequest,
    ) -> impl Future<Output = Result<SubmissionResult, SandboxError>> + Send;

    /// Current state of a submission
    fn fetch(&self, token: &str) -> impl Future<Output = Result<SubmissionResult, SandboxError>> + Send;
}
