use mock_backend::{build_router, AppState, Scenario};
use truescan_common::{bind_listener, env_or, init_tracing, shutdown_signal};

#[tokio::main]
async fn main() {
    let _guards = init_tracing("mock-backend");

    let port = env_or("PORT", 8090u16);
    let scenario = Scenario::from_env();
    tracing::info!(port, ?scenario, "starting mock backend");

    let app = build_router(AppState::new(scenario));
    let listener = match bind_listener(port).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(error = %err, port, "failed to bind");
            std::process::exit(1);
        }
    };

    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %err, "server error");
        std::process::exit(1);
    }
}
