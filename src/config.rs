use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::instrument::{Language, TimingMode};

#[derive(Parser)]
#[command(name = "cgrader", version = "0.1", about, long_about = None)]
pub struct CliArgs {
    /// Path to the configuration file
    #[arg(long = "config", short = 'c')]
    pub config_path: String,

    /// Number of HTTP worker threads
    #[arg(long = "workers", short = 'w')]
    pub workers: Option<usize>,
}

impl CliArgs {
    /// Load the configuration from the specified file
    pub fn to_config(&self) -> anyhow::Result<Config> {
        let file = std::fs::File::open(&self.config_path)
            .with_context(|| format!("Failed to open config file {}", self.config_path))?;
        let reader = std::io::BufReader::new(file);
        serde_json::from_reader(reader)
            .with_context(|| format!("Failed to parse config file {}", self.config_path))
    }
}

#[derive(Deserialize, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub instrumentation: InstrumentationConfig,
    pub languages: Vec<LanguageConfig>,
}

#[derive(Deserialize, Debug)]
pub struct ServerConfig {
    pub bind_address: Option<String>,
    pub bind_port: Option<u16>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct SandboxConfig {
    pub url: String,
    pub auth_token: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub wait_mode: WaitMode,
    #[serde(default)]
    pub poll: PollConfig,
}

fn default_request_timeout() -> u64 {
    10_000
}

/// How a caller waits for the sandbox to finish a submission
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum WaitMode {
    /// Submit, then poll the status endpoint with backoff
    #[default]
    Poll,
    /// Let the sandbox hold the submit request open until completion
    Synchronous,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PollConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            initial_delay_ms: 200,
            max_delay_ms: 2_000,
            backoff_factor: 2.0,
        }
    }
}

impl PollConfig {
    /// Delay before retry number `attempt` (0-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self.backoff_factor.max(1.0).powi(attempt.min(32) as i32);
        let millis = (self.initial_delay_ms as f64 * factor).min(self.max_delay_ms as f64);
        Duration::from_millis(millis as u64)
    }
}

#[derive(Deserialize, Debug, Clone, Copy, Default)]
pub struct InstrumentationConfig {
    #[serde(default)]
    pub timing: TimingMode,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct LanguageConfig {
    pub name: String,
    /// The sandbox's own language id
    pub sandbox_id: u32,
    /// Set only for languages the instrumenter can handle
    pub instrumentation: Option<Language>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MicroSecond(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Second(pub f64);

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ByteSize(pub u64);

impl From<MicroSecond> for Second {
    fn from(value: MicroSecond) -> Self {
        Second(value.0 as f64 / 1_000_000.0)
    }
}

impl From<Second> for MicroSecond {
    fn from(value: Second) -> Self {
        MicroSecond((value.0 * 1_000_000.0).round() as u64)
    }
}

impl ByteSize {
    pub fn kilobytes(self) -> u64 {
        self.0 / 1024
    }
}
