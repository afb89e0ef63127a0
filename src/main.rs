// src/main.rs

use std::sync::Arc;
use std::time::Duration;

use classroom_quiz::config::{CLOCK_CALIBRATION_SAMPLES, Config};
use classroom_quiz::engine::clock::OffsetClock;
use classroom_quiz::routes;
use classroom_quiz::state::AppState;
use classroom_quiz::store::{DocumentStore, MemoryStore, SqliteStore};
use classroom_quiz::sync::spawn_supervisor;
use dotenvy::dotenv;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenv().ok();

    // Load configuration from environment
    let config = Config::from_env();

    let file_appender = tracing_appender::rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    // Initialize Tracing (Logging)
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    // Pick the store: SQLite when configured, otherwise process memory
    let store: Arc<dyn DocumentStore> = match &config.database_url {
        Some(url) => {
            let mut retry_count = 0;
            let store = loop {
                match SqliteStore::connect(url).await {
                    Ok(store) => break store,
                    Err(e) => {
                        retry_count += 1;
                        if retry_count > 5 {
                            panic!("Failed to open database after 5 retries: {}", e);
                        }
                        tracing::warn!("Database not ready, retrying in 2s... (Attempt {})", retry_count);
                        tokio::time::sleep(Duration::from_secs(2)).await;
                    }
                }
            };
            tracing::info!("SQLite store ready, migrations applied.");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; quizzes live in memory and are lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    // Align the clock with the store before anything reads it
    let clock = Arc::new(OffsetClock::system());
    let offset = clock
        .calibrate_many(store.as_ref(), CLOCK_CALIBRATION_SAMPLES)
        .await;
    tracing::info!("Clock offset to store: {}ms", offset);
    spawn_clock_sync(
        clock.clone(),
        store.clone(),
        Duration::from_secs(config.clock_sync_interval_secs),
    );

    let state = AppState::new(config.clone(), store, clock).expect("Failed to hash admin password");

    // Background tasks: scheduled starts and the running-quiz supervisor
    match state.quizzes.load_schedule().await {
        Ok(count) => tracing::info!("Loaded {} scheduled quizzes", count),
        Err(e) => tracing::error!("Failed to load scheduled quizzes: {}", e),
    }
    let _scheduler = state
        .quizzes
        .spawn_scheduler(Duration::from_millis(config.scheduler_tick_ms));
    let _supervisor = spawn_supervisor(state.sync_loop(), Duration::from_secs(2));

    // Create the Axum application router
    let app = routes::create_router(state);

    // Bind to the listening address
    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await.unwrap();

    // Start the server
    axum::serve(listener, app).await.unwrap();
}

/// Re-measures the clock offset periodically so drift is smoothed out.
fn spawn_clock_sync(clock: Arc<OffsetClock>, store: Arc<dyn DocumentStore>, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick completes immediately; startup already calibrated.
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(e) = clock.calibrate(store.as_ref()).await {
                tracing::warn!("Clock calibration failed: {}", e);
            }
        }
    });
}
