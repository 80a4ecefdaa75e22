use serde::{Deserialize, Serialize};

use crate::case::ConcurrencyTestCase;
use crate::config::{Config, LanguageConfig, PollConfig, WaitMode};
use crate::create_timestamp;
use crate::error::GradeError;
use crate::instrument::{InstrumentOptions, Language, TimingMode, instrument};
use crate::interpret::{SandboxOutcome, interpret};
use crate::prepare::prepare_submission;
use crate::protocol;
use crate::sandbox::{
    ExecutionSandbox, SubmissionRequest, SubmissionResult, submit_and_wait_with_retry,
    submit_with_retry, wait_for_completion,
};
use crate::timeline::ThreadTimeline;
use crate::verdict::Verdict;

/// A candidate program and the concurrency test case to grade it against
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GradeRequest {
    pub source_code: String,
    /// Language name as listed in the configuration
    pub language: String,
    pub test_case: ConcurrencyTestCase,
}

/// Final result of one graded test case
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct GradeReport {
    pub token: Option<String>,
    pub verdict: Verdict,
    pub passed: bool,
    /// Program output with markers removed
    pub stdout: String,
    pub stderr: Option<String>,
    pub compile_output: Option<String>,
    /// Sandbox diagnostic, e.g. the signal or exit code behind a runtime error
    pub message: Option<String>,
    /// Seconds
    pub time: Option<f64>,
    /// Kilobytes
    pub memory: Option<u64>,
    pub threads_used: u64,
    pub sufficient_threads: bool,
    pub timeline: ThreadTimeline,
    /// Rendered `timeline`, for display
    pub thread_times: String,
    pub graded_at: String,
}

#[derive(Debug)]
pub enum ReportState {
    Pending(Verdict),
    Finished(GradeReport),
}

/// Runs the grading pipeline against an execution sandbox.
///
/// Holds no per-request state, so one instance serves every request.
pub struct Grader<S> {
    sandbox: S,
    languages: Vec<LanguageConfig>,
    timing: TimingMode,
    wait_mode: WaitMode,
    poll: PollConfig,
}

impl<S: ExecutionSandbox> Grader<S> {
    pub fn new(sandbox: S, config: &Config) -> Self {
        Self {
            sandbox,
            languages: config.languages.clone(),
            timing: config.instrumentation.timing,
            wait_mode: config.sandbox.wait_mode,
            poll: config.sandbox.poll.clone(),
        }
    }

    pub fn sandbox(&self) -> &S {
        &self.sandbox
    }

    /// Looks up the sandbox id and generator for a configured language
    pub fn resolve_language(&self, name: &str) -> Result<(u32, Language), GradeError> {
        self.languages
            .iter()
            .find(|l| l.name == name)
            .and_then(|l| Some((l.sandbox_id, l.instrumentation?)))
            .ok_or_else(|| GradeError::UnsupportedLanguage(name.to_string()))
    }

    /// Validates and instruments a request. Never contacts the sandbox.
    pub fn prepare(&self, request: &GradeRequest) -> Result<SubmissionRequest, GradeError> {
        let case = &request.test_case;
        case.validate()?;
        let (language_id, language) = self.resolve_language(&request.language)?;

        let program = instrument(
            &request.source_code,
            language,
            &InstrumentOptions {
                min_threads: case.min_threads,
                max_threads: case.max_threads,
                timing: self.timing,
            },
        );
        if !program.baseline_injected() {
            log::warn!(
                "No entry point found in {} submission, baseline marker skipped",
                request.language
            );
        }

        Ok(prepare_submission(&program, language_id, case))
    }

    /// Queues a request with the sandbox and returns its token
    pub async fn submit(&self, request: &GradeRequest) -> Result<String, GradeError> {
        let submission = self.prepare(request)?;
        let token = submit_with_retry(&self.sandbox, &submission, &self.poll).await?;
        log::info!("Submitted {} program as {token}", request.language);
        Ok(token)
    }

    /// Submits, waits for the sandbox and interprets the run
    pub async fn grade(&self, request: &GradeRequest) -> Result<GradeReport, GradeError> {
        let submission = self.prepare(request)?;

        let result = match self.wait_mode {
            WaitMode::Poll => {
                let token = submit_with_retry(&self.sandbox, &submission, &self.poll).await?;
                log::info!("Submitted {} program as {token}", request.language);
                wait_for_completion(&self.sandbox, &token, &self.poll).await?
            }
            WaitMode::Synchronous => {
                let result =
                    submit_and_wait_with_retry(&self.sandbox, &submission, &self.poll).await?;
                match result.token.clone() {
                    Some(token) if result.verdict()?.is_pending() => {
                        log::debug!("Synchronous submission {token} returned early, polling");
                        wait_for_completion(&self.sandbox, &token, &self.poll).await?
                    }
                    _ => result,
                }
            }
        };

        let case = &request.test_case;
        build_report(result, &case.expected_stdout, Some(case.max_threads), true)
    }

    /// Fetches a submission once.
    ///
    /// Runs are only interpreted when their stdout opens with the baseline
    /// marker; anything else is reported as the sandbox saw it.
    pub async fn report(
        &self,
        token: &str,
        thread_ceiling: Option<u32>,
    ) -> Result<ReportState, GradeError> {
        let mut result = self.sandbox.fetch(token).await?;
        let verdict = result.verdict()?;
        if verdict.is_pending() {
            return Ok(ReportState::Pending(verdict));
        }

        if result.token.is_none() {
            result.token = Some(token.to_string());
        }
        let expected = result.expected_output.clone().unwrap_or_default();
        let instrumented = result
            .stdout
            .as_deref()
            .is_some_and(protocol::starts_with_baseline);

        build_report(result, &expected, thread_ceiling, instrumented).map(ReportState::Finished)
    }
}

fn build_report(
    result: SubmissionResult,
    expected_stdout: &str,
    thread_ceiling: Option<u32>,
    instrumented: bool,
) -> Result<GradeReport, GradeError> {
    let baseline = result.verdict()?;
    let raw_stdout = result.stdout.unwrap_or_default();

    let mut report = GradeReport {
        token: result.token,
        verdict: baseline,
        passed: !baseline.is_failure(),
        stdout: String::new(),
        stderr: result.stderr,
        compile_output: result.compile_output,
        message: result.message,
        time: result.time,
        memory: result.memory,
        threads_used: 0,
        sufficient_threads: false,
        timeline: ThreadTimeline::default(),
        thread_times: String::new(),
        graded_at: create_timestamp(),
    };

    if !instrumented {
        report.stdout = raw_stdout;
        return Ok(report);
    }

    let interpretation = interpret(&SandboxOutcome {
        stdout: &raw_stdout,
        stderr: report.stderr.as_deref().unwrap_or_default(),
        baseline,
        expected_stdout,
        thread_ceiling,
    });

    let timeline = interpretation.timeline.normalized();
    report.verdict = interpretation.verdict;
    report.passed = !interpretation.verdict.is_failure();
    report.stdout = interpretation.stdout;
    report.threads_used = interpretation.threads_used;
    report.sufficient_threads = interpretation.sufficient_threads;
    report.thread_times = timeline.to_string();
    report.timeline = timeline;

    if let Some(token) = &report.token {
        log::info!(
            "Graded {token}: {} ({} threads)",
            report.verdict.description(),
            report.threads_used
        );
        if !report.timeline.is_empty() {
            log::debug!("Thread times of {token}: {}", report.thread_times);
        }
    }

    Ok(report)
}
