use lexdraft::{setup_tracing, AppState, Configuration, Db, OpenAI};
use std::{sync::Arc, time::Duration};

#[tokio::main]
async fn main() -> Result<(), hyper::Error> {
    // Loads the .env file located in the environment's current directory or its parents in sequence.
    // .env used only for development, so we discard error in all other cases.
    dotenv::dotenv().ok();

    // Tries to load tracing config from environment (RUST_LOG) or uses the default filter.
    setup_tracing();

    // Parse configuration from the environment.
    tracing::debug!("Initializing configuration");
    let cfg = Configuration::new();

    // Initialize db and run migrations.
    tracing::debug!("Initializing db pool");
    let db = Db::new(&cfg.db_dsn).await.expect("Failed to setup db");

    // One OpenAI client serves both chat completions and embeddings.
    let open_ai = Arc::new(OpenAI::new(
        &cfg.open_ai_key,
        &cfg.open_ai_model,
        &cfg.embedding_model,
    ));
    let state = AppState::with_backends(cfg.clone(), db, open_ai.clone(), open_ai);

    // Forget users whose quotas have refilled so the limiter maps stay small.
    state.limits.spawn_cleanup(Duration::from_secs(60));

    // Spin up our server.
    tracing::info!("Starting server on {}...", cfg.listen_address);
    lexdraft::run(state).await
}
