// src/main.rs

use axum::serve;
use clap::Parser;
use grok_imagine_gateway::{AppError, cli::Cli, run};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!(signal = "Ctrl+C", "Received signal. Initiating graceful shutdown...") },
        () = terminate => { info!(signal = "Terminate", "Received signal. Initiating graceful shutdown...") },
    }
}

fn init_tracing(cli: &Cli) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone()));
    if cli.json_logs {
        let json_layer = fmt::layer().json().with_current_span(true);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(json_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let (app, config) = run(cli.config).await.map_err(|e| {
        eprintln!("Application setup error: {e:?}");
        e
    })?;

    let addr = (config.server.host.as_str(), config.server.port);
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        error!(
            server.host = %config.server.host,
            server.port = config.server.port,
            error = ?e,
            "Failed to bind to address. Exiting."
        );
        AppError::from(e)
    })?;
    info!(
        server.host = %config.server.host,
        server.port = config.server.port,
        "Server listening"
    );

    serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| {
            error!(error = ?e, "Server run loop encountered an error. Exiting.");
            AppError::from(e)
        })?;

    info!("Server shut down gracefully.");
    Ok(())
}
