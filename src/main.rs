//! Airgate server binary
//!
//! Loads configuration, opens the state and mail databases, and serves the
//! ActiveSync endpoint until killed.

use std::path::PathBuf;
use std::sync::Arc;

use airgate::application::dispatcher::AppContext;
use airgate::common::config::ServerConfig;
use airgate::common::logging::{init_logging, LogLevel, LoggerConfig};
use airgate::common::types::Principal;
use airgate::data::change_hub::ChangeHub;
use airgate::data::mail_store::SqliteMailStore;
use airgate::data::state_store::StateStore;
use airgate::presentation::http_server::{self, StaticAuthenticator};

fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("airgate.toml"));
    let config = match ServerConfig::load_or_default(&config_path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}", err);
            std::process::exit(1);
        }
    };

    let logger_config = LoggerConfig {
        level: LogLevel::parse(&config.log_level).unwrap_or(LogLevel::Info),
        log_to_file: config.log_to_file,
        ..LoggerConfig::default()
    };
    let _guard = match init_logging(logger_config) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Failed to initialize logging: {}", err);
            std::process::exit(1);
        }
    };

    if let Err(err) = serve(config) {
        tracing::error!(%err, "server exited");
        std::process::exit(1);
    }
}

fn serve(config: ServerConfig) -> airgate::common::Result<()> {
    let state_store = Arc::new(StateStore::open(&config.state_db_path)?);
    let mail_store = Arc::new(SqliteMailStore::open(&config.mail_db_path)?);
    let change_hub = Arc::new(ChangeHub::new());

    let mut authenticator = StaticAuthenticator::new();
    for user in &config.users {
        authenticator.add_user(Principal::new(user.id, user.email.clone()), &user.password);
    }
    if config.users.is_empty() {
        tracing::warn!("no users configured; every request will fail authentication");
    }

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| airgate::common::Error::Other(format!("Failed to start runtime: {}", e)))?;

    let ctx = AppContext::new(config, state_store, mail_store, change_hub);
    http_server::run(ctx, Arc::new(authenticator), runtime.handle().clone())
}
