mod submissions;

pub use submissions::*;

use actix_web::error::{InternalError, JsonPayloadError, QueryPayloadError};
use actix_web::{HttpRequest, HttpResponse};
use serde::Serialize;

use crate::error::GradeError;

#[derive(Serialize)]
struct ErrorResponse {
    reason: &'static str,
    code: u32,
    message: String,
}

fn invalid_argument(message: String) -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorResponse {
        reason: "ERR_INVALID_ARGUMENT",
        code: 1,
        message,
    })
}

pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = invalid_argument(err.to_string());
    InternalError::from_response(err, response).into()
}

pub fn query_error_handler(err: QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = invalid_argument(err.to_string());
    InternalError::from_response(err, response).into()
}

/// Maps a grading failure onto its HTTP response
fn error_response(err: GradeError) -> HttpResponse {
    let message = err.to_string();
    match err {
        GradeError::UnsupportedLanguage(_) | GradeError::InvalidTestCase(_) => {
            log::info!("Rejected submission: {message}");
            invalid_argument(message)
        }
        GradeError::ServiceUnavailable(_) => {
            log::error!("{message}");
            HttpResponse::ServiceUnavailable().json(ErrorResponse {
                reason: "ERR_EXTERNAL",
                code: 5,
                message,
            })
        }
        GradeError::Sandbox(_) => {
            log::error!("{message}");
            HttpResponse::BadGateway().json(ErrorResponse {
                reason: "ERR_EXTERNAL",
                code: 5,
                message,
            })
        }
        GradeError::StillProcessing(_) => {
            log::warn!("{message}");
            HttpResponse::GatewayTimeout().json(ErrorResponse {
                reason: "ERR_TIMEOUT",
                code: 7,
                message,
            })
        }
    }
}
