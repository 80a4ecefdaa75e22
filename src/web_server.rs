use actix_web::{App, HttpServer, dev::Server, middleware, web};

use crate::config::ServerConfig;
use crate::grading::Grader;
use crate::routes::{
    get_submission_handler, json_error_handler, post_submission_handler, query_error_handler,
};
use crate::sandbox::ExecutionSandbox;

/// Registers the submission routes for a grader backed by `S`
pub fn configure<S: ExecutionSandbox + 'static>(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .app_data(web::QueryConfig::default().error_handler(query_error_handler))
        .service(web::resource("/submissions").route(web::post().to(post_submission_handler::<S>)))
        .service(
            web::resource("/submissions/{token}")
                .route(web::get().to(get_submission_handler::<S>)),
        );
}

pub fn build_server<S: ExecutionSandbox + 'static>(
    server_config: ServerConfig,
    grader: Grader<S>,
    workers: Option<usize>,
) -> std::io::Result<Server> {
    let grader = web::Data::new(grader);

    let mut server = HttpServer::new(move || {
        App::new()
            .app_data(grader.clone())
            .wrap(middleware::Logger::default())
            .configure(configure::<S>)
    });

    if let Some(workers) = workers {
        server = server.workers(workers);
    }

    let server = server
        .bind((
            server_config
                .bind_address
                .unwrap_or("127.0.0.1".to_string()),
            server_config.bind_port.unwrap_or(12345),
        ))?
        .run();

    Ok(server)
}
