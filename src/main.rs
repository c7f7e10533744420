use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;

use questline_agents::{Bounded, HttpAgents};
use questline_engine::controller::AgentSet;
use questline_engine::{ConnectionRegistry, SessionStore, TurnController};
use questline_server::ServerConfig;
use questline_store::Database;
use questline_telemetry::{init_telemetry, TelemetryConfig};

#[tokio::main]
async fn main() {
    let _telemetry = init_telemetry(TelemetryConfig::default());

    tracing::info!("starting questline server");

    // Database path
    let data_dir = home_dir().join(".questline").join("database");
    std::fs::create_dir_all(&data_dir).expect("failed to create database directory");
    let db_path = data_dir.join("questline.db");
    let db = Database::open(&db_path).expect("failed to open database");

    // Collaborator agent service, every call bounded by a hard deadline.
    let agent_url = env_or("QUESTLINE_AGENT_URL", "http://127.0.0.1:8700");
    let agent_key = std::env::var("QUESTLINE_AGENT_KEY")
        .ok()
        .map(SecretString::from);
    let agent_timeout = Duration::from_secs(
        env_or("QUESTLINE_AGENT_TIMEOUT_SECS", "60")
            .parse()
            .expect("QUESTLINE_AGENT_TIMEOUT_SECS must be an integer"),
    );
    let agents_backend = Arc::new(Bounded::new(
        HttpAgents::new(agent_url, agent_key),
        agent_timeout,
    ));
    let agents = AgentSet {
        generator: agents_backend.clone(),
        scorer: agents_backend.clone(),
        transformer: agents_backend.clone(),
        chronicler: agents_backend,
    };

    // Explicitly constructed services, wired once here.
    let sessions = Arc::new(SessionStore::new());
    let registry = Arc::new(ConnectionRegistry::new());
    let controller = Arc::new(TurnController::new(
        sessions,
        Arc::clone(&registry),
        agents,
        db.clone(),
    ));

    let config = ServerConfig {
        port: env_or("QUESTLINE_PORT", "8900")
            .parse()
            .expect("QUESTLINE_PORT must be an integer"),
        auth_secret: env_or("QUESTLINE_AUTH_SECRET", "questline-dev-secret"),
        ..Default::default()
    };

    let handle = questline_server::start(config, controller, registry, db)
        .await
        .expect("failed to start server");
    tracing::info!(port = handle.port, "questline server ready");

    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for ctrl+c");
    tracing::info!("shutting down");
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}
