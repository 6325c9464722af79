use std::time::Duration;

use fernplayer::{app, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "fernplayer=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let app_state = AppState::init().await?;

    // Hourly sweep of expired session rows. Storage hygiene only; expiry
    // is enforced at resolution time either way.
    let store = app_state.store.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60 * 60));
        loop {
            interval.tick().await;
            match store
                .delete_expired_sessions(time::OffsetDateTime::now_utc())
                .await
            {
                Ok(0) => {}
                Ok(count) => tracing::debug!(count, "swept expired sessions"),
                Err(e) => tracing::warn!(error = %e, "expired session sweep failed"),
            }
        }
    });

    let app = app::build_app(app_state);
    app::serve(app).await
}
