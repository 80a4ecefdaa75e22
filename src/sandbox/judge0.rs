use std::time::Duration;

use anyhow::Context;
use base64::{Engine as _, engine::general_purpose};
use reqwest::{RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::SandboxConfig;

use super::{ExecutionSandbox, SandboxError, SubmissionRequest, SubmissionResult};

const RESULT_FIELDS: &str =
    "token,status_id,stdout,stderr,expected_output,compile_output,message,time,memory";

/// Text fields that come back base64 encoded when they are not valid UTF-8
const ENCODED_FIELDS: [&str; 5] = [
    "stdout",
    "stderr",
    "expected_output",
    "compile_output",
    "message",
];

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

/// Client for a Judge0 compatible execution service
#[derive(Debug, Clone)]
pub struct Judge0Client {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl Judge0Client {
    pub fn new(config: &SandboxConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .context("Failed to create sandbox HTTP client")?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        })
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, SandboxError> {
        let builder = match &self.auth_token {
            Some(token) => builder.header("X-Auth-Token", token),
            None => builder,
        };

        let response = builder.send().await.map_err(classify)?;
        let status = response.status();

        if matches!(
            status,
            StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
        ) {
            return Err(SandboxError::Unavailable(format!("HTTP {status}")));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SandboxError::Protocol(format!("HTTP {status}: {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| SandboxError::Protocol(format!("Failed to parse response: {e}")))
    }

    async fn fetch_raw(&self, token: &str, base64_encoded: bool) -> Result<Value, SandboxError> {
        let url = format!("{}/submissions/{token}", self.base_url);
        let encoded = if base64_encoded { "true" } else { "false" };
        let builder = self
            .client
            .get(url)
            .query(&[("base64_encoded", encoded), ("fields", RESULT_FIELDS)]);

        self.send(builder).await
    }
}

impl ExecutionSandbox for Judge0Client {
    async fn submit(&self, request: &SubmissionRequest) -> Result<String, SandboxError> {
        let url = format!("{}/submissions/", self.base_url);
        let builder = self
            .client
            .post(url)
            .query(&[("base64_encoded", "false"), ("wait", "false")])
            .json(request);

        let response: TokenResponse = self.send(builder).await?;
        Ok(response.token)
    }

    async fn submit_and_wait(
        &self,
        request: &SubmissionRequest,
    ) -> Result<SubmissionResult, SandboxError> {
        let url = format!("{}/submissions/", self.base_url);
        let builder = self
            .client
            .post(url)
            .query(&[
                ("base64_encoded", "false"),
                ("wait", "true"),
                ("fields", RESULT_FIELDS),
            ])
            .json(request);

        let value: Value = self.send(builder).await?;
        if value.get("error").is_some() {
            let token = value
                .get("token")
                .and_then(Value::as_str)
                .ok_or_else(|| SandboxError::Protocol("error response without token".to_string()))?;
            return self.fetch(token).await;
        }

        into_result(value)
    }

    async fn fetch(&self, token: &str) -> Result<SubmissionResult, SandboxError> {
        let value = self.fetch_raw(token, false).await?;
        if value.get("error").is_none() {
            return into_result(value);
        }

        log::debug!("Submission {token} output is not plain text, fetching base64 encoded");
        let mut value = self.fetch_raw(token, true).await?;
        decode_fields(&mut value)?;
        into_result(value)
    }
}

fn classify(err: reqwest::Error) -> SandboxError {
    if err.is_connect() || err.is_timeout() {
        SandboxError::Unavailable(err.to_string())
    } else {
        SandboxError::Protocol(err.to_string())
    }
}

fn into_result(value: Value) -> Result<SubmissionResult, SandboxError> {
    serde_json::from_value(value)
        .map_err(|e| SandboxError::Protocol(format!("Malformed submission: {e}")))
}

fn decode_fields(value: &mut Value) -> Result<(), SandboxError> {
    for field in ENCODED_FIELDS {
        let Some(encoded) = value.get(field).and_then(Value::as_str) else {
            continue;
        };

        // the sandbox wraps encoded text every 60 characters
        let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = general_purpose::STANDARD
            .decode(compact)
            .map_err(|e| SandboxError::Protocol(format!("Invalid base64 in {field}: {e}")))?;

        value[field] = Value::String(String::from_utf8_lossy(&bytes).into_owned());
    }
    Ok(())
}
