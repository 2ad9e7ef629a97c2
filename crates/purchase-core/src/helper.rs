//! Purchase Operation Helper
//!
//! Drives one purchase attempt's operation session from creation to a
//! terminal status.
//!
//! ```text
//! [no session] ──start_purchase──▶ Started ──poll: started/in_progress──▶ InProgress ⟲
//!                                     │                                      │
//!                                     ├─ poll: succeeded ─▶ Succeeded ─┐     │
//!                                     ├─ poll: failed ────▶ Failed ────┼─▶ [no session]
//!                                     └─ attempts exhausted ─▶ Timeout ┘
//! ```
//!
//! The helper holds at most one active session. Every `start_purchase` (and
//! `cancel`) advances a generation counter; a poll loop that belongs to an
//! older generation wakes up and stands down without touching the newer
//! session.

use std::sync::Arc;

use tokio::sync::watch;

use crate::config::PollingConfig;
use crate::error::{
    BackendError, BackendResult, FailureReason, PurchaseFlowError, PurchaseFlowErrorCode, Result,
};
use crate::gateway::{
    BackendGateway, CheckoutCalculateTaxRequest, CheckoutCalculateTaxResponse,
    CheckoutCompleteRequest, CheckoutCompleteResponse, CheckoutStartRequest,
    CheckoutStartResponse, PatchSessionRequest, PatchSessionResponse,
};
use crate::mapper::map_checkout_failure;
use crate::operation::{OperationSessionId, OperationSessionStatus, PurchaseSuccess};

#[derive(Clone, Debug, Default)]
struct SessionState {
    active: Option<OperationSessionId>,
    generation: u64,
}

/// Owns the active operation session of a purchase flow
pub struct PurchaseOperationHelper {
    backend: Arc<dyn BackendGateway>,
    config: PollingConfig,
    // Receivers are only notified when the generation advances.
    state: watch::Sender<SessionState>,
}

impl PurchaseOperationHelper {
    pub fn new(backend: Arc<dyn BackendGateway>, config: PollingConfig) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            backend,
            config,
            state,
        }
    }

    /// Create with default polling configuration
    pub fn with_defaults(backend: Arc<dyn BackendGateway>) -> Self {
        Self::new(backend, PollingConfig::default())
    }

    pub const fn config(&self) -> &PollingConfig {
        &self.config
    }

    /// Currently active operation session, if any
    pub fn active_session(&self) -> Option<OperationSessionId> {
        self.state.borrow().active.clone()
    }

    /// Start a purchase, replacing any session this helper was tracking
    ///
    /// Backend failures are returned unmapped; callers decide how to present
    /// them.
    pub async fn start_purchase(
        &self,
        request: CheckoutStartRequest,
    ) -> BackendResult<CheckoutStartResponse> {
        let (generation, previous) = self.advance_generation();
        if let Some(previous) = previous {
            tracing::debug!(
                operation_session_id = %previous,
                "Replacing in-flight purchase operation"
            );
        }

        tracing::debug!(
            gateway = self.backend.name(),
            product_id = %request.product_id,
            trace_id = %request.trace_id,
            "Starting purchase operation"
        );

        let response = self.backend.create_session(&request).await?;

        let mut activated = false;
        self.state.send_if_modified(|state| {
            if state.generation == generation {
                state.active = Some(response.operation_session_id.clone());
                activated = true;
            }
            false
        });

        if activated {
            tracing::info!(
                operation_session_id = %response.operation_session_id,
                generation,
                "Purchase operation started"
            );
        } else {
            tracing::warn!(
                operation_session_id = %response.operation_session_id,
                "Purchase operation superseded before it became active"
            );
        }

        Ok(response)
    }

    /// Poll the active session until it succeeds, fails, or runs out of attempts
    pub async fn poll_until_completion(&self) -> Result<PurchaseSuccess> {
        let mut updates = self.state.subscribe();
        let (active, generation) = {
            let state = updates.borrow_and_update();
            (state.active.clone(), state.generation)
        };
        let Some(session_id) = active else {
            return Err(PurchaseFlowError::no_purchase_in_progress());
        };

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            if attempt > self.config.max_attempts {
                self.clear_session(generation);
                tracing::warn!(
                    operation_session_id = %session_id,
                    max_attempts = self.config.max_attempts,
                    "Purchase operation did not finish in time"
                );
                return Err(PurchaseFlowError::unknown(
                    "Max attempts reached trying to get successful purchase status",
                )
                .with_reason(FailureReason::MaxAttemptsReached));
            }

            let response = self
                .backend
                .get_session_status(&session_id)
                .await
                .map_err(|err| {
                    tracing::warn!(
                        operation_session_id = %session_id,
                        attempt,
                        retryable = err.is_retryable(),
                        error = %err,
                        "Failed to get checkout status"
                    );
                    let underlying = err
                        .backend_message()
                        .map_or_else(|| err.to_string(), ToOwned::to_owned);
                    PurchaseFlowError::new(
                        PurchaseFlowErrorCode::NetworkError,
                        format!("Failed to get checkout status: {err}"),
                    )
                    .with_underlying_message(underlying)
                    .with_backend_code(err.backend_code())
                })?;

            if self.current_generation() != generation {
                return Err(superseded(&session_id));
            }

            let operation = response.operation;
            tracing::debug!(
                operation_session_id = %session_id,
                attempt,
                status = operation.status.as_str(),
                terminal = operation.status.is_terminal(),
                is_expired = operation.is_expired,
                "Polled purchase operation"
            );

            match operation.status {
                OperationSessionStatus::Started | OperationSessionStatus::InProgress => {
                    if !self.wait_for_next_attempt(&mut updates).await {
                        return Err(superseded(&session_id));
                    }
                }
                OperationSessionStatus::Succeeded => {
                    self.clear_session(generation);
                    let success = PurchaseSuccess::from_operation(session_id, operation)?;
                    tracing::info!(
                        operation_session_id = %success.operation_session_id,
                        product_id = %success.product_identifier,
                        attempts = attempt,
                        "Purchase operation succeeded"
                    );
                    return Ok(success);
                }
                OperationSessionStatus::Failed => {
                    self.clear_session(generation);
                    let error = map_checkout_failure(operation.error.as_ref());
                    tracing::warn!(
                        operation_session_id = %session_id,
                        code = ?error.code(),
                        error = %error,
                        "Purchase operation failed"
                    );
                    return Err(error);
                }
            }
        }
    }

    /// Attach late-arriving identity or metadata to the active session
    pub async fn patch_operation_session(
        &self,
        request: PatchSessionRequest,
    ) -> Result<PatchSessionResponse> {
        let session_id = self
            .active_session()
            .ok_or_else(PurchaseFlowError::no_purchase_in_progress)?;

        self.backend
            .patch_session(&session_id, &request)
            .await
            .map_err(|err| {
                PurchaseFlowError::from_backend_error(
                    &err,
                    PurchaseFlowErrorCode::ErrorSettingUpPurchase,
                )
            })
    }

    /// Confirm the customer's payment details on the active session
    pub async fn complete_checkout(
        &self,
        email: Option<String>,
    ) -> Result<CheckoutCompleteResponse> {
        let session_id = self
            .active_session()
            .ok_or_else(PurchaseFlowError::no_purchase_in_progress)?;

        let response = self
            .backend
            .complete_checkout(&session_id, &CheckoutCompleteRequest { email })
            .await
            .map_err(|err| setup_error(&session_id, "complete checkout", &err))?;

        tracing::debug!(operation_session_id = %session_id, "Checkout completed");
        Ok(response)
    }

    /// Compute taxes on the active session for the customer's location
    pub async fn calculate_tax(
        &self,
        country_code: Option<String>,
        postal_code: Option<String>,
    ) -> Result<CheckoutCalculateTaxResponse> {
        let session_id = self
            .active_session()
            .ok_or_else(PurchaseFlowError::no_purchase_in_progress)?;
        let request = CheckoutCalculateTaxRequest {
            country_code,
            postal_code,
        };

        let response = self
            .backend
            .calculate_tax(&session_id, &request)
            .await
            .map_err(|err| setup_error(&session_id, "calculate tax", &err))?;

        tracing::debug!(
            operation_session_id = %session_id,
            currency = %response.currency,
            tax_amount_in_micros = response.tax_amount_in_micros,
            failed_reason = ?response.failed_reason,
            "Checkout taxes calculated"
        );
        Ok(response)
    }

    /// Drop the active session and stop any poll loop waiting on it
    pub fn cancel(&self) -> Option<OperationSessionId> {
        let (_, cancelled) = self.advance_generation();
        if let Some(id) = &cancelled {
            tracing::info!(operation_session_id = %id, "Purchase operation cancelled");
        }
        cancelled
    }

    fn current_generation(&self) -> u64 {
        self.state.borrow().generation
    }

    /// Clear the active session and wake every poll loop
    fn advance_generation(&self) -> (u64, Option<OperationSessionId>) {
        let mut generation = 0;
        let mut previous = None;
        self.state.send_if_modified(|state| {
            previous = state.active.take();
            state.generation += 1;
            generation = state.generation;
            true
        });
        (generation, previous)
    }

    /// Clear the session on a terminal outcome, unless a newer one replaced it
    fn clear_session(&self, generation: u64) {
        self.state.send_if_modified(|state| {
            if state.generation == generation {
                state.active = None;
            }
            false
        });
    }

    /// Sleep one interval; `false` if the generation advanced meanwhile
    async fn wait_for_next_attempt(&self, updates: &mut watch::Receiver<SessionState>) -> bool {
        tokio::select! {
            () = tokio::time::sleep(self.config.interval) => {
                !updates.has_changed().unwrap_or(true)
            }
            _ = updates.changed() => false,
        }
    }
}

fn setup_error(
    session_id: &OperationSessionId,
    action: &str,
    err: &BackendError,
) -> PurchaseFlowError {
    tracing::warn!(operation_session_id = %session_id, error = %err, "Failed to {action}");
    PurchaseFlowError::from_backend_error(err, PurchaseFlowErrorCode::ErrorSettingUpPurchase)
}

fn superseded(session_id: &OperationSessionId) -> PurchaseFlowError {
    tracing::debug!(
        operation_session_id = %session_id,
        "Poll loop superseded by a newer purchase operation"
    );
    PurchaseFlowError::unknown("Purchase operation was superseded by a newer purchase")
        .with_reason(FailureReason::Superseded)
}
