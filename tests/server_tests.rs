use std::collections::VecDeque;
use std::sync::Mutex;

use actix_web::{App, test, web};
use assert_json_diff::assert_json_include;
use serde_json::json;

use cgrader::config::Config;
use cgrader::grading::{GradeRequest, Grader};
use cgrader::protocol::Marker;
use cgrader::sandbox::{ExecutionSandbox, SandboxError, SubmissionRequest, SubmissionResult};
use cgrader::web_server::configure;

// Mock sandbox answering from a script and recording what it was sent
#[derive(Default)]
struct MockSandbox {
    answers: Mutex<VecDeque<Result<SubmissionResult, SandboxError>>>,
    submitted: Mutex<Vec<SubmissionRequest>>,
}

impl MockSandbox {
    fn scripted(answers: Vec<Result<SubmissionResult, SandboxError>>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            submitted: Mutex::default(),
        }
    }

    fn next(&self) -> Result<SubmissionResult, SandboxError> {
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(SandboxError::Protocol("script exhausted".to_string())))
    }
}

impl ExecutionSandbox for MockSandbox {
    async fn submit(&self, request: &SubmissionRequest) -> Result<String, SandboxError> {
        self.submitted.lock().unwrap().push(request.clone());
        Ok("abc".to_string())
    }

    async fn submit_and_wait(
        &self,
        request: &SubmissionRequest,
    ) -> Result<SubmissionResult, SandboxError> {
        self.submitted.lock().unwrap().push(request.clone());
        self.next()
    }

    async fn fetch(&self, _token: &str) -> Result<SubmissionResult, SandboxError> {
        self.next()
    }
}

// Helper function to create test config
fn create_test_config() -> Config {
    serde_json::from_value(json!({
        "server": {},
        "sandbox": {
            "url": "http://127.0.0.1:2358",
            "poll": {
                "max_attempts": 3,
                "initial_delay_ms": 1,
                "max_delay_ms": 1
            }
        },
        "instrumentation": { "timing": "start_end" },
        "languages": [
            { "name": "C (Clang 7.0.1)", "sandbox_id": 75, "instrumentation": "c" },
            { "name": "Python (3.8.1)", "sandbox_id": 71 }
        ]
    }))
    .unwrap()
}

// Stdout of an instrumented run creating `created` threads, each timed
fn instrumented_stdout(created: u64, min_threads: u64, output: &str) -> String {
    let mut stdout = Marker::BASELINE.to_string();
    for n in 1..=created {
        let markers = [
            Marker::Count {
                created: n,
                sufficient: n >= min_threads,
            },
            Marker::ThreadStart {
                thread_id: n,
                micros: 1000 + n * 10,
            },
        ];
        for marker in markers {
            stdout.push_str(&marker.to_string());
        }
    }
    stdout.push_str(output);
    for n in 1..=created {
        let end = Marker::ThreadEnd {
            thread_id: n,
            micros: 2000 + n,
        };
        stdout.push_str(&end.to_string());
    }
    stdout
}

fn finished(
    status_id: u32,
    stdout: String,
    stderr: Option<&str>,
) -> Result<SubmissionResult, SandboxError> {
    Ok(SubmissionResult {
        token: Some("abc".to_string()),
        status_id,
        stdout: Some(stdout),
        stderr: stderr.map(str::to_string),
        expected_output: Some("6\n".to_string()),
        time: Some(0.004),
        memory: Some(3200),
        ..Default::default()
    })
}

fn submission(language: &str, wait: bool) -> serde_json::Value {
    json!({
        "source_code": "#include <stdio.h>\nint main(void) {\n    printf(\"6\\n\");\n}\n",
        "language": language,
        "test_case": {
            "min_threads": 2,
            "max_threads": 4,
            "stdin": "1 2 3\n",
            "expected_stdout": "6\n"
        },
        "wait": wait
    })
}

macro_rules! init_app {
    ($sandbox:expr) => {{
        let grader = web::Data::new(Grader::new($sandbox, &create_test_config()));
        let app = test::init_service(
            App::new()
                .app_data(grader.clone())
                .configure(configure::<MockSandbox>),
        )
        .await;
        (app, grader)
    }};
}

#[actix_web::test]
async fn test_post_submission_waits_for_report() {
    let (app, _grader) = init_app!(MockSandbox::scripted(vec![
        Ok(SubmissionResult {
            status_id: 2,
            ..Default::default()
        }),
        finished(4, instrumented_stdout(3, 2, "6\n"), None),
    ]));

    let req = test::TestRequest::post()
        .uri("/submissions")
        .set_json(submission("C (Clang 7.0.1)", true))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let response_body: serde_json::Value = test::read_body_json(resp).await;
    assert_json_include!(
        actual: response_body.clone(),
        expected: json!({
            "token": "abc",
            "verdict": { "id": 3, "description": "Accepted" },
            "stdout": "6\n",
            "time": 0.004,
            "memory": 3200,
            "threads_used": 3,
            "sufficient_threads": true,
            "timeline": [
                { "kind": "interval", "thread_id": 1, "start_us": 0, "end_us": 991 },
                { "kind": "interval", "thread_id": 2, "start_us": 10, "end_us": 992 },
                { "kind": "interval", "thread_id": 3, "start_us": 20, "end_us": 993 }
            ],
            "thread_times": "1:0-991|2:10-992|3:20-993"
        })
    );
    assert!(response_body["graded_at"].is_string());
}

#[actix_web::test]
async fn test_post_submission_returns_token() {
    let (app, grader) = init_app!(MockSandbox::default());

    let req = test::TestRequest::post()
        .uri("/submissions")
        .set_json(submission("C (Clang 7.0.1)", false))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let response_body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(response_body, json!({ "token": "abc" }));

    let submitted = grader.sandbox().submitted.lock().unwrap();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].language_id, 75);
    assert_eq!(submitted[0].stdin, "1 2 3\n");
    assert_eq!(submitted[0].expected_output.as_deref(), Some("6\n"));
}

#[std::prelude::v1::test]
fn test_submitted_source_is_instrumented() {
    let sandbox = MockSandbox::default();
    let grader = Grader::new(sandbox, &create_test_config());
    let request: GradeRequest = serde_json::from_value(json!({
        "source_code": "int main(void) {\n    return 0;\n}\n",
        "language": "C (Clang 7.0.1)",
        "test_case": { "min_threads": 1, "max_threads": 2, "expected_stdout": "" }
    }))
    .unwrap();

    let submission = grader.prepare(&request).unwrap();
    assert_eq!(submission.language_id, 75);
    assert_eq!(submission.max_processes_and_or_threads, Some(2));
    assert_eq!(
        submission.compiler_options.as_deref(),
        Some("-pthread -fsanitize=thread")
    );
    assert!(submission.source_code.contains("int createThread("));
    assert!(
        submission
            .source_code
            .ends_with("int main(void) {\n    aasp_report_baseline();\n    return 0;\n}\n")
    );
}

#[actix_web::test]
async fn test_unsupported_language_is_rejected() {
    let (app, grader) = init_app!(MockSandbox::default());

    for language in ["Python (3.8.1)", "Brainfuck"] {
        let req = test::TestRequest::post()
            .uri("/submissions")
            .set_json(submission(language, true))
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);

        let response_body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(response_body["reason"], "ERR_INVALID_ARGUMENT");
        assert_eq!(response_body["code"], 1);
    }

    // nothing uninstrumented may reach the sandbox
    assert!(grader.sandbox().submitted.lock().unwrap().is_empty());
}

#[actix_web::test]
async fn test_malformed_body_is_rejected() {
    let (app, _grader) = init_app!(MockSandbox::default());

    let req = test::TestRequest::post()
        .uri("/submissions")
        .set_json(json!({ "source_code": "int main() {}" }))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let response_body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(response_body["reason"], "ERR_INVALID_ARGUMENT");
}

#[actix_web::test]
async fn test_get_submission_states() {
    let (app, _grader) = init_app!(MockSandbox::scripted(vec![
        Ok(SubmissionResult {
            status_id: 1,
            ..Default::default()
        }),
        finished(
            4,
            instrumented_stdout(3, 2, "6\n"),
            Some("WARNING: ThreadSanitizer: data race (pid=7)"),
        ),
    ]));

    let req = test::TestRequest::get().uri("/submissions/abc").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 202);
    let response_body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(
        response_body,
        json!({ "token": "abc", "status": { "id": 1, "description": "In Queue" } })
    );

    let req = test::TestRequest::get()
        .uri("/submissions/abc?max_threads=4")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let response_body: serde_json::Value = test::read_body_json(resp).await;
    assert_json_include!(
        actual: response_body,
        expected: json!({
            "verdict": { "id": 16, "description": "Data Race Detected" },
            "stdout": "6\n",
            "threads_used": 3
        })
    );
}

#[actix_web::test]
async fn test_sandbox_failures_map_to_status_codes() {
    let (app, _grader) = init_app!(MockSandbox::scripted(vec![
        Err(SandboxError::Unavailable("connection refused".to_string())),
        Err(SandboxError::Protocol("unexpected reply".to_string())),
    ]));

    let req = test::TestRequest::get().uri("/submissions/abc").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 503);
    let response_body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(response_body["reason"], "ERR_EXTERNAL");

    let req = test::TestRequest::get().uri("/submissions/abc").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 502);
}

#[actix_web::test]
async fn test_poll_budget_exhaustion_times_out() {
    let processing = || {
        Ok(SubmissionResult {
            status_id: 2,
            ..Default::default()
        })
    };
    let (app, _grader) = init_app!(MockSandbox::scripted(vec![
        processing(),
        processing(),
        processing(),
    ]));

    let req = test::TestRequest::post()
        .uri("/submissions")
        .set_json(submission("C (Clang 7.0.1)", true))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 504);
    let response_body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(response_body["reason"], "ERR_TIMEOUT");
    assert_eq!(response_body["code"], 7);
}
