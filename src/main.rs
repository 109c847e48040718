use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tvgame::{app, config::ServerConfig, game::QuestionRepo, lobby::Lobby, ws::AppState};

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tvgame=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config.with_questions_arg(std::env::args().nth(1)),
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let Some(questions_file) = config.questions_file.as_ref() else {
        tracing::error!("{}", tvgame::config::ConfigError::MissingQuestions);
        std::process::exit(1);
    };

    let repo = match QuestionRepo::from_path(questions_file) {
        Ok(repo) => repo,
        Err(e) => {
            tracing::error!("Failed to load {}: {}", questions_file.display(), e);
            std::process::exit(1);
        }
    };

    let lobby = Arc::new(Lobby::new(Arc::new(repo)));
    let state = Arc::new(AppState::new(lobby, config.conn.clone()));
    let app = app(state, &config.static_dir);

    tracing::info!("Listening on http://{}", config.addr);

    let listener = match tokio::net::TcpListener::bind(config.addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", config.addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
