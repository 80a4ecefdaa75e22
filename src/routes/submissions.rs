use actix_web::{HttpResponse, Responder, web};
use serde::{Deserialize, Serialize};

use super::error_response;
use crate::grading::{GradeRequest, Grader, ReportState};
use crate::sandbox::ExecutionSandbox;
use crate::verdict::Verdict;

#[derive(Deserialize, Debug)]
pub struct SubmissionBody {
    #[serde(flatten)]
    pub request: GradeRequest,
    /// Hold the request open until the run is graded
    #[serde(default)]
    pub wait: bool,
}

#[derive(Deserialize, Debug)]
pub struct ReportQuery {
    /// Live thread ceiling of the test case
    pub max_threads: Option<u32>,
}

#[derive(Serialize, Debug)]
struct Submitted {
    token: String,
}

#[derive(Serialize, Debug)]
struct Pending {
    token: String,
    status: Verdict,
}

/// `POST /submissions`
pub async fn post_submission_handler<S: ExecutionSandbox + 'static>(
    grader: web::Data<Grader<S>>,
    body: web::Json<SubmissionBody>,
) -> impl Responder {
    let SubmissionBody { request, wait } = body.into_inner();

    if wait {
        match grader.grade(&request).await {
            Ok(report) => HttpResponse::Ok().json(report),
            Err(e) => error_response(e),
        }
    } else {
        match grader.submit(&request).await {
            Ok(token) => HttpResponse::Ok().json(Submitted { token }),
            Err(e) => error_response(e),
        }
    }
}

/// `GET /submissions/{token}`
pub async fn get_submission_handler<S: ExecutionSandbox + 'static>(
    grader: web::Data<Grader<S>>,
    path: web::Path<(String,)>,
    query: web::Query<ReportQuery>,
) -> impl Responder {
    let token = path.into_inner().0;

    match grader.report(&token, query.max_threads).await {
        Ok(ReportState::Finished(report)) => HttpResponse::Ok().json(report),
        Ok(ReportState::Pending(status)) => {
            log::debug!("Submission {token} is still {}", status.description());
            HttpResponse::Accepted().json(Pending { token, status })
        }
        Err(e) => error_response(e),
    }
}
