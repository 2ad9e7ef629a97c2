//! web-purchases simulator
//!
//! Drives one Paddle purchase end to end through the orchestrator.
//! The backend is the real billing API when `PURCHASE_API_KEY` is set and an
//! in-memory script otherwise; the overlay is always scripted.
//!
//! Environment:
//! - `PURCHASE_SIM_SCENARIO`: `success` (default), `declined` or `cancelled`
//! - `PURCHASE_SIM_APP_USER_ID`: app user id (default `sim_user`)
//! - `PURCHASE_POLL_INTERVAL_MS`, `PURCHASE_POLL_MAX_ATTEMPTS`: polling
//! - `PURCHASE_API_URL`, `PURCHASE_API_KEY`, `PURCHASE_API_TIMEOUT_SECS`: HTTP backend

mod scenario;

use std::sync::Arc;

use purchase_core::config::env_or;
use purchase_core::{
    BackendGateway, PollingConfig, PurchaseOperationHelper, PurchaseSuccess, Result,
};
use purchase_http::HttpBackendGateway;
use purchase_paddle::{
    PaddlePurchase, PaddlePurchaseOrchestrator, PaddleStartParams, TracingHooks,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::scenario::Scenario;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let scenario: Scenario = std::env::var("PURCHASE_SIM_SCENARIO")
        .ok()
        .map(|value| value.parse())
        .transpose()
        .map_err(anyhow::Error::msg)?
        .unwrap_or_default();
    let app_user_id = env_or("PURCHASE_SIM_APP_USER_ID", "sim_user".to_string())?;
    let polling = PollingConfig::from_env()?;

    let backend: Arc<dyn BackendGateway> = if std::env::var("PURCHASE_API_KEY").is_ok() {
        tracing::info!("✓ Using HTTP billing backend");
        Arc::new(HttpBackendGateway::from_env()?)
    } else {
        tracing::info!(scenario = scenario.as_str(), "Using scripted backend");
        Arc::new(scenario.backend())
    };

    tracing::info!(
        interval_ms = u64::try_from(polling.interval.as_millis()).unwrap_or(u64::MAX),
        max_attempts = polling.max_attempts,
        "Polling configured"
    );

    let orchestrator = PaddlePurchaseOrchestrator::new(
        PurchaseOperationHelper::new(backend, polling),
        Arc::new(scenario.widget()),
    );

    match run(&orchestrator, &app_user_id).await {
        Ok(success) => {
            tracing::info!(
                operation_session_id = %success.operation_session_id,
                product_id = %success.product_identifier,
                transaction_id = %success.store_transaction_identifier,
                purchase_date = %success.purchase_date,
                redeem_url = success.redeem_url().unwrap_or("-"),
                "✓ Purchase completed"
            );
        }
        Err(err) => {
            tracing::warn!(
                code = err.code().as_u8(),
                error = %err,
                underlying = err.underlying_error_message().unwrap_or("-"),
                "⚠ {}",
                err.user_message()
            );
        }
    }

    Ok(())
}

/// Start a checkout and run the purchase to its outcome
async fn run(orchestrator: &PaddlePurchaseOrchestrator, app_user_id: &str) -> Result<PurchaseSuccess> {
    let started = orchestrator
        .start_checkout(PaddleStartParams::new(app_user_id, "monthly", "default"))
        .await?;
    tracing::info!(
        operation_session_id = %started.operation_session_id,
        transaction_id = %started.transaction_id,
        "Checkout started"
    );

    let purchase = PaddlePurchase::new(&started, app_user_id);
    orchestrator.purchase(purchase, &TracingHooks).await
}
