use axum::Router;
use axum::http::HeaderValue;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;

use ledger_bridge::app_state::AppState;
use ledger_bridge::orchestrator::Orchestrator;
use ledger_bridge::release_status::ReleaseStatusChecker;
use ledger_bridge::routes;
use ledger_bridge::utils::datetime::duration_until_next_utc_midnight;
use ledger_bridge::worker::Worker;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::init();

    let state = Arc::new(AppState::new().await.expect("failed to initialize application state"));

    if let Err(e) = state.job_store.reset_stale().await {
        log::error!("failed to reset stale job claims at boot: {e}");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker = Worker::new(state.job_store.clone(), state.erp_client.clone())
        .with_telegram(state.telegram_client.clone());
    let worker_rx = shutdown_rx.clone();
    let worker_handle = tokio::spawn(async move { worker.run(worker_rx).await });

    let nightly_handle = tokio::spawn(run_nightly_pipeline(state.clone(), shutdown_rx));

    let cors = build_cors_layer(&state.env_vars.cors_allowed_origins);

    let app = Router::new().merge(routes::create_routes(state.clone())).layer(cors);

    let port = std::env::var("PORT").unwrap_or_else(|_| "3002".to_string());
    let addr = format!("0.0.0.0:{port}");

    let listener = tokio::net::TcpListener::bind(&addr).await.expect("failed to bind listener");
    log::info!("server running on {addr}");

    let grace = state.config.worker_shutdown_grace;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            log::info!("shutdown signal received, draining worker (grace {grace:?})");
            let _ = shutdown_tx.send(true);
        })
        .await
        .expect("server error");

    let _ = tokio::time::timeout(grace, worker_handle).await;
    nightly_handle.abort();
}

fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> =
        allowed_origins.iter().filter_map(|o| o.parse::<HeaderValue>().ok()).collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
}

/// Runs the nightly Orchestrator pipeline (§4.5) once per UTC day, sleeping
/// until the next midnight between runs. Exits as soon as shutdown fires so
/// it never starts a new day's run mid-drain.
async fn run_nightly_pipeline(state: Arc<AppState>, mut shutdown: watch::Receiver<bool>) {
    loop {
        let sleep_for = duration_until_next_utc_midnight(chrono::Utc::now());
        tokio::select! {
            _ = tokio::time::sleep(sleep_for) => {}
            _ = shutdown.changed() => return,
        }
        if *shutdown.borrow() {
            return;
        }

        let release_status =
            ReleaseStatusChecker::new(state.marketplace_client.clone(), Arc::new(state.cache.clone()));
        let orchestrator = Orchestrator::new(
            &state.db_pool,
            &state.job_store,
            &state.erp_client,
            &state.marketplace_client,
            &release_status,
            state.config.fee_validation_tolerance.clone(),
            state.config.settlement_lookback_days,
        );

        match orchestrator.run(chrono::Utc::now().date_naive()).await {
            Ok(report) if report.all_ok() => log::info!("nightly pipeline completed, all_ok=true"),
            Ok(_) => {
                log::warn!("nightly pipeline completed with failures");
                let message = format!(
                    "nightly reconciliation pipeline finished with failures on {}",
                    chrono::Utc::now().date_naive()
                );
                if let Err(e) = state.telegram_client.send_message(&message).await {
                    log::warn!("failed to send pipeline-failure notification: {e}");
                }
            }
            Err(e) => {
                log::error!("nightly pipeline failed to run: {e}");
                let message = format!("nightly reconciliation pipeline crashed: {e}");
                if let Err(send_err) = state.telegram_client.send_message(&message).await {
                    log::warn!("failed to send pipeline-crash notification: {send_err}");
                }
            }
        }
    }
}
