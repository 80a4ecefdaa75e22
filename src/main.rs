use anyhow::Context;
use clap::Parser;

use cgrader::config::CliArgs;
use cgrader::grading::Grader;
use cgrader::sandbox::Judge0Client;
use cgrader::web_server::build_server;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = CliArgs::parse();
    if cli.workers == Some(0) {
        anyhow::bail!("The number of worker threads must not be 0");
    }

    let config = cli.to_config()?;
    let sandbox = Judge0Client::new(&config.sandbox)?;
    log::info!(
        "Grading with sandbox at {} ({} languages configured)",
        config.sandbox.url,
        config.languages.len()
    );

    let grader = Grader::new(sandbox, &config);
    let server =
        build_server(config.server, grader, cli.workers).context("Failed to build server")?;

    let server_handle = server.handle();
    let server_task = actix_web::rt::spawn(server);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("Ctrl-c received, shutting down...");
        }
        res_server = server_task => {
            log::error!("Server terminated unexpectedly: {:?}", res_server);
        }
    }

    server_handle.stop(true).await;

    log::info!("Shutdown complete");
    Ok(())
}
