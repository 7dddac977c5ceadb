use anyhow::{Context, Result};
use std::sync::Arc;

use smartflo_dialer::{
    client::TokenManagedClient,
    config::Config,
    http_client::RequestExecutor,
    routes,
    store::SqliteRepository,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (for log level)
    let config = Config::load()?;
    config.validate()?;

    // Initialize logging with a configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("🚀 Smartflo Dialer starting...");
    tracing::info!(
        "Server configured: {}:{}",
        config.server_host,
        config.server_port
    );

    let repository = Arc::new(
        SqliteRepository::open(&config.database_file).with_context(|| {
            format!("Failed to open database {}", config.database_file.display())
        })?,
    );
    tracing::info!("✅ Database ready: {}", config.database_file.display());

    let http_client = RequestExecutor::build_client(
        config.http_max_connections,
        config.http_connect_timeout,
        config.http_request_timeout,
    )?;
    tracing::info!("✅ HTTP client initialized with connection pooling");

    let dialer = match config.smartflo_identity.clone() {
        Some(identity) => {
            let dialer = Arc::new(TokenManagedClient::new(
                http_client,
                &config.client_settings(),
                identity,
            ));
            verify_login(&dialer).await;
            Some(dialer)
        }
        None => {
            tracing::warn!(
                "SMARTFLO_EMAIL / SMARTFLO_PASSWORD not set; dialer routes will answer with a configuration error"
            );
            None
        }
    };

    if config.default_caller_id.is_none() {
        tracing::warn!("SMARTFLO_DEFAULT_CALLER_ID not set; click-to-call is unavailable");
    }

    let app_state = routes::AppState {
        config: Arc::new(config.clone()),
        repository,
        dialer,
    };

    // Build the application with routes and middleware
    let app = routes::build_router(app_state);

    // Bind to configured host and port
    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    print_startup_banner(&config);

    // Start server with graceful shutdown
    tracing::info!("🚀 Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("👋 Server shutdown complete");

    Ok(())
}

/// Log in once at startup so credential problems surface early
async fn verify_login(dialer: &TokenManagedClient) {
    match dialer.coordinator().ensure_valid().await {
        Ok(credential) => {
            tracing::info!(
                "✅ Smartflo authentication successful (credential valid until {})",
                credential.expires_at().to_rfc3339()
            );
        }
        Err(e) => {
            tracing::error!("❌ Smartflo authentication failed: {}", e);
            tracing::warn!("Server will start; calls will retry the login on demand");
        }
    }
}

/// Print startup banner
fn print_startup_banner(config: &Config) {
    let banner = r#"
╔═══════════════════════════════════════════════════════════╗
║                                                           ║
║                  📞 Smartflo Dialer                       ║
║                                                           ║
║  CRM click-to-call backend for the Smartflo API           ║
║                                                           ║
╚═══════════════════════════════════════════════════════════╝
"#;

    println!("{}", banner);
    println!("  Version:     {}", env!("CARGO_PKG_VERSION"));
    println!(
        "  Server:      http://{}:{}",
        config.server_host, config.server_port
    );
    println!("  Smartflo:    {}", config.smartflo_base_url);
    println!(
        "  Dialer:      {}",
        if config.smartflo_identity.is_some() {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!("  Log Level:   {}", config.log_level);
    println!();
}

/// Handle graceful shutdown signal
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown...");
        },
    }
}
