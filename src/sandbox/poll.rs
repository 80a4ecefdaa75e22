use std::future::Future;

use crate::config::PollConfig;
use crate::error::GradeError;

use super::{ExecutionSandbox, SandboxError, SubmissionRequest, SubmissionResult};

/// Polls `token` until the sandbox reports a final status.
///
/// Queued/processing answers and unreachable-sandbox failures are retried
/// with backoff; once `max_attempts` is spent the last reason is reported.
pub async fn wait_for_completion<S: ExecutionSandbox>(
    sandbox: &S,
    token: &str,
    poll: &PollConfig,
) -> Result<SubmissionResult, GradeError> {
    let attempts = poll.max_attempts.max(1);
    let mut last_unavailable = None;

    for attempt in 0..attempts {
        match sandbox.fetch(token).await {
            Ok(result) => {
                let verdict = result.verdict()?;
                if !verdict.is_pending() {
                    return Ok(result);
                }
                log::debug!(
                    "Submission {token} is {} (attempt {})",
                    verdict.description(),
                    attempt + 1
                );
                last_unavailable = None;
            }
            Err(SandboxError::Unavailable(msg)) => {
                log::warn!("Sandbox unreachable while polling {token}: {msg}");
                last_unavailable = Some(msg);
            }
            Err(e) => return Err(e.into()),
        }

        if attempt + 1 < attempts {
            tokio::time::sleep(poll.delay(attempt)).await;
        }
    }

    Err(match last_unavailable {
        Some(msg) => GradeError::ServiceUnavailable(msg),
        None => GradeError::StillProcessing(token.to_string()),
    })
}

/// Submits, retrying while the sandbox is unreachable
pub async fn submit_with_retry<S: ExecutionSandbox>(
    sandbox: &S,
    request: &SubmissionRequest,
    poll: &PollConfig,
) -> Result<String, GradeError> {
    retry_unavailable(poll, move || sandbox.submit(request)).await
}

/// Synchronous submission, retrying while the sandbox is unreachable
pub async fn submit_and_wait_with_retry<S: ExecutionSandbox>(
    sandbox: &S,
    request: &SubmissionRequest,
    poll: &PollConfig,
) -> Result<SubmissionResult, GradeError> {
    retry_unavailable(poll, move || sandbox.submit_and_wait(request)).await
}

async fn retry_unavailable<T, F, Fut>(poll: &PollConfig, mut call: F) -> Result<T, GradeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SandboxError>>,
{
    let attempts = poll.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(SandboxError::Unavailable(msg)) if attempt + 1 < attempts => {
                log::warn!("Sandbox unreachable, retrying (attempt {}): {msg}", attempt + 1);
                tokio::time::sleep(poll.delay(attempt)).await;
                attempt += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}
