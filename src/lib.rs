pub mod case;
pub mod config;
pub mod error;
pub mod grading;
pub mod instrument;
pub mod interpret;
pub mod prepare;
pub mod protocol;
pub mod routes;
pub mod sandbox;
pub mod timeline;
pub mod verdict;
pub mod web_server;

pub fn create_timestamp() -> String {
    use chrono::{SecondsFormat, Utc};
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
