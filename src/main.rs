mod config;
mod registry;
mod routes;
mod routing;
mod session;
mod state;
mod ws;

use tokio::net::TcpListener;

use config::{generate_config_template, Config};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Initialize tracing/logging
    if config.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "courier_server=info".parse().unwrap()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "courier_server=info".parse().unwrap()),
            )
            .init();
    }

    tracing::info!("Courier server v{} starting", env!("CARGO_PKG_VERSION"));

    // Build application state: presence registry + recovery tracker
    let app_state = state::AppState::new(config.recovery_window_secs);

    // Background sweep for expired recovery entries
    session::spawn_recovery_sweep(
        app_state.recovery.clone(),
        config.recovery_sweep_interval_secs,
    );

    // Build router
    let app = routes::build_router(app_state);

    // Bind and serve
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
