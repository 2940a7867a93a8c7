use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Courier presence and private-message routing server
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(
    name = "courier-server",
    version,
    about = "Presence tracking and private message routing over WebSocket"
)]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "COURIER_PORT", default_value = "4000")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "COURIER_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./courier.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "COURIER_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Reconnection recovery window in seconds; 0 disables recovery
    #[arg(long, env = "COURIER_RECOVERY_WINDOW_SECS", default_value = "120")]
    pub recovery_window_secs: u64,

    /// Interval in seconds between sweeps of expired recovery entries
    #[arg(long, env = "COURIER_RECOVERY_SWEEP_INTERVAL_SECS", default_value = "60")]
    pub recovery_sweep_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 4000,
            bind_address: "0.0.0.0".to_string(),
            config: "./courier.toml".to_string(),
            json_logs: false,
            generate_config: false,
            recovery_window_secs: 120,
            recovery_sweep_interval_secs: 60,
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (COURIER_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Config::parse();
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("COURIER_"))
            .merge(Serialized::defaults(cli))
            .extract()
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Courier Server Configuration
# Place this file at ./courier.toml or specify with --config <path>
# All settings can be overridden via environment variables (COURIER_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 4000)
# port = 4000

# Bind address (default: 0.0.0.0 — all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Reconnection recovery window in seconds (default: 120)
# A connection that drops and reconnects within this window, presenting its
# prior socket id, resumes that id and is flagged as recovered.
# Set to 0 to disable recovery entirely.
# recovery_window_secs = 120

# Interval in seconds between sweeps of expired recovery entries (default: 60)
# recovery_sweep_interval_secs = 60
"#
    .to_string()
}
