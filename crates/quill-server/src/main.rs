//! quill-server - REST API server binary.

use std::net::SocketAddr;

use quill_core::QuillConfig;
use quill_server::{create_server, AppState};
use tokio::signal;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn init_tracing() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::from_default_env()
        .add_directive(Level::INFO.into())
        .add_directive("quill_server=debug".parse()?);

    // QUILL_LOG_FORMAT=json switches to structured output
    let json = std::env::var("QUILL_LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing()?;

    // QUILL_CONFIG names a config file; QUILL_* variables override it
    let config = match std::env::var("QUILL_CONFIG") {
        Ok(path) => {
            info!(path = %path, "Loading configuration file");
            QuillConfig::from_file(&path)?.apply_env(|key| std::env::var(key).ok())?
        }
        Err(_) => QuillConfig::from_env()?,
    };

    let host = std::env::var("QUILL_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("QUILL_PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()?;

    if config.api_key.is_none() {
        warn!("QUILL_API_KEY is not set, the API is read-only");
    }

    let state = AppState::open(config)?;
    info!(
        database = %state.config.database_path.display(),
        site = %state.config.site.name,
        "Site opened"
    );
    let app = create_server(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Starting quill-server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Serve with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_signal().await;
            info!("Shutdown signal received");
        })
        .await?;

    info!("Server stopped cleanly");
    Ok(())
}
