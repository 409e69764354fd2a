use carquiz::config;
use carquiz::game::Registry;
use carquiz::server::build_app;
use tracing_subscriber::EnvFilter;

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_dir = config::config_dir();
    if let Err(e) = config::init(&config_dir) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }

    let game_config = match config::load_game_config(&config_dir) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };
    let quizzes = config::load_quizzes(&config_dir);
    tracing::info!("Loaded {} stored quizzes", quizzes.len());

    let port: u16 = match std::env::var("PORT") {
        Ok(p) => match p.parse() {
            Ok(port) => port,
            Err(_) => {
                tracing::error!("Invalid PORT: {}", p);
                std::process::exit(1);
            }
        },
        Err(_) => 3030,
    };

    let registry = Registry::new(game_config, quizzes);
    let app = build_app(registry.clone());

    let listener = match tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind port {}: {}", port, e);
            std::process::exit(1);
        }
    };

    tracing::info!("CarQuiz server running on port {}", port);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("Server error: {}", e);
    }

    // Rooms are never persisted: shutting down ends every game.
    registry.clear();
    tracing::info!("Server stopped");
}
