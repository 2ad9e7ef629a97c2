//! Paddle Purchase Orchestrator
//!
//! Composes the purchase operation helper with the overlay checkout lifecycle:
//! start the operation, open the overlay, react to its events, and settle on
//! the backend's verdict once the overlay reports completion.

use std::collections::HashMap;
use std::sync::Arc;

use purchase_core::{
    CheckoutStartRequest, FailureReason, OperationSessionId, PaddleBillingParams,
    PatchSessionRequest, PurchaseFlowError, PurchaseFlowErrorCode, PurchaseOperationHelper,
    PurchaseOption, PurchaseSuccess, Result,
};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::hooks::PurchaseUiHooks;
use crate::widget::{
    event_channel, CheckoutEvent, CheckoutOpenOptions, CheckoutWidget, PaddleEnvironment,
};

/// Metadata key the Paddle customer id is attached under
pub const PADDLE_CUSTOMER_ID_KEY: &str = "paddle_customer_id";

/// Parameters for starting a Paddle checkout
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaddleStartParams {
    pub app_user_id: String,
    pub product_id: String,
    pub offering_identifier: String,
    pub purchase_option: Option<PurchaseOption>,
    pub customer_email: Option<String>,
    pub metadata: Option<HashMap<String, String>>,
}

impl PaddleStartParams {
    pub fn new(
        app_user_id: impl Into<String>,
        product_id: impl Into<String>,
        offering_identifier: impl Into<String>,
    ) -> Self {
        Self {
            app_user_id: app_user_id.into(),
            product_id: product_id.into(),
            offering_identifier: offering_identifier.into(),
            purchase_option: None,
            customer_email: None,
            metadata: None,
        }
    }

    #[must_use]
    pub fn with_customer_email(mut self, email: impl Into<String>) -> Self {
        self.customer_email = Some(email.into());
        self
    }

    #[must_use]
    pub fn with_purchase_option(mut self, option: PurchaseOption) -> Self {
        self.purchase_option = Some(option);
        self
    }
}

/// A started Paddle checkout, ready to be opened
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaddleCheckoutStart {
    pub operation_session_id: OperationSessionId,
    pub transaction_id: String,
    pub next_action: Option<String>,
}

/// Context of one on-screen purchase
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaddlePurchase {
    pub operation_session_id: OperationSessionId,
    pub transaction_id: String,
    pub app_user_id: String,

    /// Email the session was created with, if any
    pub customer_email: Option<String>,
    pub locale: Option<String>,
}

impl PaddlePurchase {
    pub fn new(start: &PaddleCheckoutStart, app_user_id: impl Into<String>) -> Self {
        Self {
            operation_session_id: start.operation_session_id.clone(),
            transaction_id: start.transaction_id.clone(),
            app_user_id: app_user_id.into(),
            customer_email: None,
            locale: None,
        }
    }

    #[must_use]
    pub fn with_customer_email(mut self, email: impl Into<String>) -> Self {
        self.customer_email = Some(email.into());
        self
    }

    #[must_use]
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }
}

/// Tracks whether the overlay is still on screen so it is closed exactly once
struct CheckoutSurface<'a> {
    widget: &'a dyn CheckoutWidget,
    open: bool,
}

impl<'a> CheckoutSurface<'a> {
    const fn opened(widget: &'a dyn CheckoutWidget) -> Self {
        Self { widget, open: true }
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.widget.close();
        }
    }

    fn closed_elsewhere(&mut self) {
        self.open = false;
    }
}

/// Customer identity already attached to the session
struct KnownIdentity {
    email: Option<String>,
    customer_id: Option<String>,
}

/// Paddle overlay purchase flow
pub struct PaddlePurchaseOrchestrator {
    helper: PurchaseOperationHelper,
    widget: Arc<dyn CheckoutWidget>,
}

impl PaddlePurchaseOrchestrator {
    pub fn new(helper: PurchaseOperationHelper, widget: Arc<dyn CheckoutWidget>) -> Self {
        Self { helper, widget }
    }

    pub const fn helper(&self) -> &PurchaseOperationHelper {
        &self.helper
    }

    /// Start the operation on the backend and get the widget ready
    pub async fn start_checkout(&self, params: PaddleStartParams) -> Result<PaddleCheckoutStart> {
        let mut request = CheckoutStartRequest::new(
            params.app_user_id,
            params.product_id,
            params.offering_identifier,
        );
        request.purchase_option = params.purchase_option;
        request.email = params.customer_email;
        request.metadata = params.metadata;

        let response = self.helper.start_purchase(request).await.map_err(|err| {
            tracing::warn!(error = %err, "Failed to start Paddle checkout");
            PurchaseFlowError::from_backend_error(
                &err,
                PurchaseFlowErrorCode::ErrorSettingUpPurchase,
            )
        })?;

        let Some(paddle) = response.gateway_params.paddle_billing_params else {
            self.helper.cancel();
            return Err(PurchaseFlowError::unknown(
                "Checkout start response is missing Paddle billing parameters",
            ));
        };

        if let Err(err) = self.initialize_widget(&paddle).await {
            self.helper.cancel();
            return Err(err);
        }

        Ok(PaddleCheckoutStart {
            operation_session_id: response.operation_session_id,
            transaction_id: paddle.paddle_transaction_id,
            next_action: response.next_action,
        })
    }

    /// Run the overlay checkout until the purchase settles
    pub async fn purchase(
        &self,
        purchase: PaddlePurchase,
        hooks: &dyn PurchaseUiHooks,
    ) -> Result<PurchaseSuccess> {
        self.ensure_current(&purchase)?;
        if !self.widget.is_initialized() {
            return Err(PurchaseFlowError::unknown("Paddle not initialized.")
                .with_reason(FailureReason::CheckoutWidget));
        }

        let options = CheckoutOpenOptions::for_transaction(
            purchase.transaction_id.clone(),
            purchase.locale.as_deref(),
            purchase.customer_email.as_deref(),
        );
        let (sender, mut events) = event_channel();

        self.widget.open(&options, sender).await.map_err(|err| {
            PurchaseFlowError::unknown(format!("Failed to open Paddle checkout: {err}"))
                .with_reason(FailureReason::CheckoutWidget)
        })?;
        tracing::debug!(
            operation_session_id = %purchase.operation_session_id,
            transaction_id = %purchase.transaction_id,
            "Paddle checkout opened"
        );

        let mut surface = CheckoutSurface::opened(self.widget.as_ref());
        let outcome = self
            .drive(&purchase, hooks, &mut surface, &mut events)
            .await;

        if let Err(err) = &outcome {
            surface.close();
            tracing::warn!(
                operation_session_id = %purchase.operation_session_id,
                code = ?err.code(),
                error = %err,
                "Paddle purchase failed"
            );
        }
        outcome
    }

    async fn initialize_widget(&self, paddle: &PaddleBillingParams) -> Result<()> {
        if self.widget.is_initialized() {
            tracing::debug!("Paddle already initialized, reusing widget");
            return Ok(());
        }

        let environment = PaddleEnvironment::from_sandbox(paddle.is_sandbox);
        self.widget
            .initialize(&paddle.client_side_token, environment)
            .await
            .map_err(|err| {
                PurchaseFlowError::unknown(format!("Error initializing Paddle: {err}"))
                    .with_reason(FailureReason::CheckoutWidget)
            })?;

        tracing::debug!(environment = environment.as_str(), "Paddle initialized");
        Ok(())
    }

    fn ensure_current(&self, purchase: &PaddlePurchase) -> Result<()> {
        match self.helper.active_session() {
            None => Err(PurchaseFlowError::no_purchase_in_progress()),
            Some(active) if active != purchase.operation_session_id => {
                Err(stale_purchase(purchase, &active))
            }
            Some(_) => Ok(()),
        }
    }

    async fn drive(
        &self,
        purchase: &PaddlePurchase,
        hooks: &dyn PurchaseUiHooks,
        surface: &mut CheckoutSurface<'_>,
        events: &mut UnboundedReceiver<CheckoutEvent>,
    ) -> Result<PurchaseSuccess> {
        let mut known = KnownIdentity {
            email: purchase.customer_email.clone(),
            customer_id: None,
        };

        while let Some(event) = events.recv().await {
            match event {
                CheckoutEvent::Loaded => hooks.on_checkout_loaded().map_err(handler_error)?,
                CheckoutEvent::CustomerIdentified { email, customer_id } => {
                    self.attach_customer(purchase, &mut known, email, customer_id)
                        .await?;
                }
                CheckoutEvent::Completed => {
                    // A newer checkout may have started while the overlay was up
                    self.ensure_current(purchase)?;

                    // Hide Paddle's own success page; the host shows the outcome
                    surface.close();
                    let success = self.settle(surface, events).await?;
                    if success.operation_session_id != purchase.operation_session_id {
                        return Err(stale_purchase(purchase, &success.operation_session_id));
                    }
                    return Ok(success);
                }
                CheckoutEvent::Closed {
                    user_initiated: true,
                } => {
                    let was_open = surface.open;
                    surface.closed_elsewhere();
                    // The session is cancelled before the host callback runs
                    self.helper.cancel();
                    if was_open {
                        hooks.unmount_purchase_ui().map_err(handler_error)?;
                    }
                    return Err(PurchaseFlowError::new(
                        PurchaseFlowErrorCode::UserCancelledError,
                        "Purchase was cancelled by the user",
                    ));
                }
                CheckoutEvent::Closed {
                    user_initiated: false,
                } => {
                    surface.closed_elsewhere();
                    tracing::debug!("Paddle checkout closed programmatically");
                }
                CheckoutEvent::Other(name) => {
                    tracing::debug!(event = %name, "Ignoring Paddle checkout event");
                }
            }
        }

        Err(PurchaseFlowError::unknown(
            "Paddle checkout event stream ended before the purchase completed",
        ))
    }

    /// Poll to completion, draining overlay events until the outcome arrives.
    ///
    /// The overlay is already closed here, so close events never unmount the
    /// host UI: some widgets report their own `close()` as user initiated.
    async fn settle(
        &self,
        surface: &mut CheckoutSurface<'_>,
        events: &mut UnboundedReceiver<CheckoutEvent>,
    ) -> Result<PurchaseSuccess> {
        let poll = self.helper.poll_until_completion();
        tokio::pin!(poll);
        let mut listening = true;

        loop {
            tokio::select! {
                outcome = &mut poll => return outcome,
                event = events.recv(), if listening => match event {
                    None => listening = false,
                    Some(CheckoutEvent::Closed { user_initiated }) => {
                        surface.closed_elsewhere();
                        tracing::debug!(user_initiated, "Paddle checkout closed while settling");
                    }
                    Some(event) => {
                        tracing::debug!(?event, "Ignoring Paddle checkout event while settling");
                    }
                },
            }
        }
    }

    async fn attach_customer(
        &self,
        purchase: &PaddlePurchase,
        known: &mut KnownIdentity,
        email: Option<String>,
        customer_id: Option<String>,
    ) -> Result<()> {
        let email = email.filter(|e| !e.trim().is_empty() && known.email.as_ref() != Some(e));
        let customer_id =
            customer_id.filter(|id| !id.is_empty() && known.customer_id.as_ref() != Some(id));
        if email.is_none() && customer_id.is_none() {
            return Ok(());
        }

        self.ensure_current(purchase)?;
        let request = PatchSessionRequest {
            app_user_id: purchase.app_user_id.clone(),
            email: email.clone(),
            metadata: customer_id
                .as_ref()
                .map(|id| HashMap::from([(PADDLE_CUSTOMER_ID_KEY.to_string(), id.clone())])),
        };

        self.helper
            .patch_operation_session(request)
            .await
            .map_err(|err| {
                let mut failure =
                    PurchaseFlowError::unknown(format!("Failed to update checkout session: {err}"))
                        .with_backend_code(err.underlying_backend_error_code())
                        .with_reason(FailureReason::SessionUpdateFailed);
                if let Some(message) = err.underlying_error_message() {
                    failure = failure.with_underlying_message(message);
                }
                failure
            })?;

        tracing::debug!(
            operation_session_id = %purchase.operation_session_id,
            email_updated = email.is_some(),
            customer_id_updated = customer_id.is_some(),
            "Attached customer identity to purchase"
        );
        if email.is_some() {
            known.email = email;
        }
        if customer_id.is_some() {
            known.customer_id = customer_id;
        }
        Ok(())
    }
}

fn stale_purchase(purchase: &PaddlePurchase, active: &OperationSessionId) -> PurchaseFlowError {
    tracing::warn!(
        operation_session_id = %purchase.operation_session_id,
        active_session_id = %active,
        "Stale purchase context"
    );
    PurchaseFlowError::new(
        PurchaseFlowErrorCode::ErrorSettingUpPurchase,
        "Purchase is no longer the active purchase",
    )
    .with_reason(FailureReason::StaleSession)
}

fn handler_error(err: anyhow::Error) -> PurchaseFlowError {
    PurchaseFlowError::unknown(format!("Paddle event handler error: {err}"))
        .with_reason(FailureReason::EventHandler)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use purchase_core::{
        BackendError, CheckoutStartResponse, CheckoutStatusError, CheckoutStatusResponse,
        PollingConfig, ScriptedBackend,
    };

    use super::*;
    use crate::scripted::ScriptedCheckoutWidget;

    #[derive(Default)]
    struct RecordingHooks {
        loaded: AtomicUsize,
        unmounted: AtomicUsize,
        fail_on_load: bool,
        fail_on_unmount: bool,
    }

    impl PurchaseUiHooks for RecordingHooks {
        fn on_checkout_loaded(&self) -> anyhow::Result<()> {
            self.loaded.fetch_add(1, Ordering::SeqCst);
            if self.fail_on_load {
                anyhow::bail!("paywall already gone");
            }
            Ok(())
        }

        fn unmount_purchase_ui(&self) -> anyhow::Result<()> {
            self.unmounted.fetch_add(1, Ordering::SeqCst);
            if self.fail_on_unmount {
                anyhow::bail!("paywall unmount failed");
            }
            Ok(())
        }
    }

    impl RecordingHooks {
        fn loaded(&self) -> usize {
            self.loaded.load(Ordering::SeqCst)
        }

        fn unmounted(&self) -> usize {
            self.unmounted.load(Ordering::SeqCst)
        }
    }

    fn paddle_start(id: &str) -> CheckoutStartResponse {
        let mut response = CheckoutStartResponse::new(id);
        response.next_action = Some("collect_payment_info".into());
        response.gateway_params.paddle_billing_params = Some(PaddleBillingParams {
            client_side_token: "test_token".into(),
            is_sandbox: true,
            paddle_transaction_id: format!("txn_{id}"),
        });
        response
    }

    fn orchestrator(
        backend: &Arc<ScriptedBackend>,
        widget: &Arc<ScriptedCheckoutWidget>,
    ) -> PaddlePurchaseOrchestrator {
        let helper = PurchaseOperationHelper::new(backend.clone(), PollingConfig::default());
        PaddlePurchaseOrchestrator::new(helper, widget.clone())
    }

    fn params() -> PaddleStartParams {
        PaddleStartParams::new("user1", "prod1", "off1")
    }

    async fn start(orchestrator: &PaddlePurchaseOrchestrator) -> PaddlePurchase {
        let started = orchestrator.start_checkout(params()).await.unwrap();
        PaddlePurchase::new(&started, "user1")
    }

    #[tokio::test]
    async fn test_start_checkout_initializes_widget_once() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .with_start(paddle_start("s1"))
                .with_start(paddle_start("s2")),
        );
        let widget = Arc::new(ScriptedCheckoutWidget::new());
        let orchestrator = orchestrator(&backend, &widget);

        let first = orchestrator.start_checkout(params()).await.unwrap();
        let second = orchestrator.start_checkout(params()).await.unwrap();

        assert_eq!(first.transaction_id, "txn_s1");
        assert_eq!(first.next_action.as_deref(), Some("collect_payment_info"));
        assert_eq!(second.operation_session_id.as_str(), "s2");
        assert_eq!(
            widget.initialize_calls(),
            vec![("test_token".to_string(), PaddleEnvironment::Sandbox)]
        );
    }

    #[tokio::test]
    async fn test_start_checkout_maps_backend_errors() {
        let backend = Arc::new(ScriptedBackend::new().with_start_error(BackendError::Request {
            endpoint: "postCheckoutStart".into(),
            status: 400,
            code: Some(7772),
            message: Some("already subscribed".into()),
        }));
        let widget = Arc::new(ScriptedCheckoutWidget::new());
        let orchestrator = orchestrator(&backend, &widget);

        let error = orchestrator.start_checkout(params()).await.unwrap_err();
        assert_eq!(error.code(), PurchaseFlowErrorCode::AlreadyPurchasedError);
        assert_eq!(error.underlying_backend_error_code(), Some(7772));
        assert!(widget.initialize_calls().is_empty());
    }

    #[tokio::test]
    async fn test_start_checkout_requires_paddle_params() {
        let backend = Arc::new(ScriptedBackend::new().with_start(CheckoutStartResponse::new("s1")));
        let widget = Arc::new(ScriptedCheckoutWidget::new());
        let orchestrator = orchestrator(&backend, &widget);

        let error = orchestrator.start_checkout(params()).await.unwrap_err();
        assert_eq!(error.code(), PurchaseFlowErrorCode::UnknownError);
        assert_eq!(orchestrator.helper().active_session(), None);
    }

    #[tokio::test]
    async fn test_start_checkout_initialization_failure() {
        let backend = Arc::new(ScriptedBackend::new().with_start(paddle_start("s1")));
        let widget = Arc::new(ScriptedCheckoutWidget::new().with_initialize_error("bad token"));
        let orchestrator = orchestrator(&backend, &widget);

        let error = orchestrator.start_checkout(params()).await.unwrap_err();
        assert_eq!(error.code(), PurchaseFlowErrorCode::UnknownError);
        assert!(error.message().starts_with("Error initializing Paddle:"));
        assert!(error.message().contains("bad token"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_checkout_resolves_with_backend_result() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .with_start(paddle_start("s1"))
                .with_status(CheckoutStatusResponse::in_progress())
                .with_status(CheckoutStatusResponse::succeeded("prod1", "tx1", "2025-01-15T04:21:11Z")),
        );
        let widget = Arc::new(
            ScriptedCheckoutWidget::new().with_events([CheckoutEvent::Loaded, CheckoutEvent::Completed]),
        );
        let hooks = RecordingHooks::default();
        let orchestrator = orchestrator(&backend, &widget);

        let purchase = start(&orchestrator).await.with_locale("fr");
        let success = orchestrator.purchase(purchase, &hooks).await.unwrap();

        assert_eq!(success.operation_session_id.as_str(), "s1");
        assert_eq!(success.store_transaction_identifier, "tx1");
        assert_eq!(hooks.loaded(), 1);
        assert_eq!(hooks.unmounted(), 0);
        assert_eq!(widget.close_calls(), 1);

        let opened = widget.open_calls();
        assert_eq!(opened[0].transaction_id, "txn_s1");
        assert_eq!(opened[0].settings.locale, "fr");
    }

    #[tokio::test]
    async fn test_user_close_cancels_purchase() {
        let backend = Arc::new(ScriptedBackend::new().with_start(paddle_start("s1")));
        let widget = Arc::new(ScriptedCheckoutWidget::new().with_events([
            CheckoutEvent::Loaded,
            CheckoutEvent::Closed {
                user_initiated: true,
            },
        ]));
        let hooks = RecordingHooks::default();
        let orchestrator = orchestrator(&backend, &widget);

        let purchase = start(&orchestrator).await;
        let error = orchestrator.purchase(purchase, &hooks).await.unwrap_err();

        assert_eq!(error.code(), PurchaseFlowErrorCode::UserCancelledError);
        assert_eq!(hooks.unmounted(), 1);
        assert_eq!(widget.close_calls(), 0);
        assert_eq!(orchestrator.helper().active_session(), None);
        assert!(backend.status_calls().is_empty());
    }

    #[tokio::test]
    async fn test_user_close_cancels_even_when_unmount_fails() {
        let backend = Arc::new(ScriptedBackend::new().with_start(paddle_start("s1")));
        let widget = Arc::new(ScriptedCheckoutWidget::new().with_events([CheckoutEvent::Closed {
            user_initiated: true,
        }]));
        let hooks = RecordingHooks {
            fail_on_unmount: true,
            ..RecordingHooks::default()
        };
        let orchestrator = orchestrator(&backend, &widget);

        let purchase = start(&orchestrator).await;
        let error = orchestrator.purchase(purchase, &hooks).await.unwrap_err();

        assert_eq!(error.reason(), Some(&FailureReason::EventHandler));
        assert_eq!(hooks.unmounted(), 1);
        assert_eq!(orchestrator.helper().active_session(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_after_completion_does_not_unmount() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .with_start(paddle_start("s1"))
                .with_status(CheckoutStatusResponse::in_progress())
                .with_status(CheckoutStatusResponse::succeeded("prod1", "tx1", "2025-01-15")),
        );
        let widget = Arc::new(ScriptedCheckoutWidget::new().with_events([
            CheckoutEvent::Completed,
            CheckoutEvent::Closed {
                user_initiated: true,
            },
        ]));
        let hooks = RecordingHooks::default();
        let orchestrator = orchestrator(&backend, &widget);

        let purchase = start(&orchestrator).await;
        let success = orchestrator.purchase(purchase, &hooks).await.unwrap();

        assert_eq!(success.product_identifier, "prod1");
        assert_eq!(hooks.unmounted(), 0);
        assert_eq!(widget.close_calls(), 1);
    }

    #[tokio::test]
    async fn test_checkout_started_mid_purchase_is_not_settled() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .with_start(paddle_start("s1"))
                .with_start(paddle_start("s2"))
                .with_status(CheckoutStatusResponse::succeeded("prod2", "tx2", "2025-01-15")),
        );
        let widget = Arc::new(ScriptedCheckoutWidget::new());
        let hooks = RecordingHooks::default();
        let orchestrator = orchestrator(&backend, &widget);

        let purchase = start(&orchestrator).await;
        let interleave = async {
            while widget.open_calls().is_empty() {
                tokio::task::yield_now().await;
            }
            orchestrator.start_checkout(params()).await.unwrap();
            assert!(widget.emit(CheckoutEvent::Completed));
        };
        let (outcome, ()) = tokio::join!(orchestrator.purchase(purchase, &hooks), interleave);

        let error = outcome.unwrap_err();
        assert_eq!(error.code(), PurchaseFlowErrorCode::ErrorSettingUpPurchase);
        assert_eq!(error.reason(), Some(&FailureReason::StaleSession));
        assert!(backend.status_calls().is_empty());
        assert_eq!(orchestrator.helper().active_session(), Some("s2".into()));
        assert_eq!(widget.close_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_charge_after_completion() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .with_start(paddle_start("s1"))
                .with_status(CheckoutStatusResponse::failed(Some(CheckoutStatusError {
                    code: 3,
                    message: "card declined".into(),
                }))),
        );
        let widget = Arc::new(ScriptedCheckoutWidget::new().with_events([CheckoutEvent::Completed]));
        let hooks = RecordingHooks::default();
        let orchestrator = orchestrator(&backend, &widget);

        let purchase = start(&orchestrator).await;
        let error = orchestrator.purchase(purchase, &hooks).await.unwrap_err();

        assert_eq!(error.code(), PurchaseFlowErrorCode::ErrorChargingPayment);
        assert_eq!(error.underlying_error_message(), Some("card declined"));
        assert_eq!(widget.close_calls(), 1);
        assert_eq!(hooks.unmounted(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_customer_identity_is_patched_once() {
        let identified = CheckoutEvent::CustomerIdentified {
            email: Some("late@x.com".into()),
            customer_id: Some("ctm_01".into()),
        };
        let backend = Arc::new(
            ScriptedBackend::new()
                .with_start(paddle_start("s1"))
                .with_status(CheckoutStatusResponse::succeeded("prod1", "tx1", "2025-01-15")),
        );
        let widget = Arc::new(ScriptedCheckoutWidget::new().with_events([
            identified.clone(),
            identified,
            CheckoutEvent::Completed,
        ]));
        let orchestrator = orchestrator(&backend, &widget);

        let purchase = start(&orchestrator).await;
        orchestrator
            .purchase(purchase, &RecordingHooks::default())
            .await
            .unwrap();

        let patches = backend.patch_calls();
        assert_eq!(patches.len(), 1);
        let (session_id, request) = &patches[0];
        assert_eq!(session_id.as_str(), "s1");
        assert_eq!(request.app_user_id, "user1");
        assert_eq!(request.email.as_deref(), Some("late@x.com"));
        assert_eq!(
            request.metadata.as_ref().unwrap()[PADDLE_CUSTOMER_ID_KEY],
            "ctm_01"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_known_email_is_not_patched() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .with_start(paddle_start("s1"))
                .with_status(CheckoutStatusResponse::succeeded("prod1", "tx1", "2025-01-15")),
        );
        let widget = Arc::new(ScriptedCheckoutWidget::new().with_events([
            CheckoutEvent::CustomerIdentified {
                email: Some("e@x.com".into()),
                customer_id: None,
            },
            CheckoutEvent::Completed,
        ]));
        let orchestrator = orchestrator(&backend, &widget);

        let purchase = start(&orchestrator).await.with_customer_email("e@x.com");
        orchestrator
            .purchase(purchase, &RecordingHooks::default())
            .await
            .unwrap();

        assert!(backend.patch_calls().is_empty());
        assert_eq!(
            widget.open_calls()[0].customer.as_ref().map(|c| c.email.as_str()),
            Some("e@x.com")
        );
    }

    #[tokio::test]
    async fn test_patch_failure_closes_widget() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .with_start(paddle_start("s1"))
                .with_patch_error(BackendError::Server {
                    endpoint: "patchCheckout".into(),
                    status: 500,
                }),
        );
        let widget = Arc::new(ScriptedCheckoutWidget::new().with_events([
            CheckoutEvent::CustomerIdentified {
                email: Some("late@x.com".into()),
                customer_id: None,
            },
        ]));
        let orchestrator = orchestrator(&backend, &widget);

        let purchase = start(&orchestrator).await;
        let error = orchestrator
            .purchase(purchase, &RecordingHooks::default())
            .await
            .unwrap_err();

        assert_eq!(error.code(), PurchaseFlowErrorCode::UnknownError);
        assert_eq!(error.reason(), Some(&FailureReason::SessionUpdateFailed));
        assert_eq!(widget.close_calls(), 1);
    }

    #[tokio::test]
    async fn test_hook_failure_is_handler_error() {
        let backend = Arc::new(ScriptedBackend::new().with_start(paddle_start("s1")));
        let widget = Arc::new(ScriptedCheckoutWidget::new().with_events([CheckoutEvent::Loaded]));
        let hooks = RecordingHooks {
            fail_on_load: true,
            ..RecordingHooks::default()
        };
        let orchestrator = orchestrator(&backend, &widget);

        let purchase = start(&orchestrator).await;
        let error = orchestrator.purchase(purchase, &hooks).await.unwrap_err();

        assert_eq!(
            error.message(),
            "Paddle event handler error: paywall already gone"
        );
        assert_eq!(error.reason(), Some(&FailureReason::EventHandler));
        assert_eq!(widget.close_calls(), 1);
    }

    #[tokio::test]
    async fn test_stale_purchase_context_is_rejected() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .with_start(paddle_start("s1"))
                .with_start(paddle_start("s2")),
        );
        let widget = Arc::new(ScriptedCheckoutWidget::new());
        let orchestrator = orchestrator(&backend, &widget);

        let stale = start(&orchestrator).await;
        orchestrator.start_checkout(params()).await.unwrap();

        let error = orchestrator
            .purchase(stale, &RecordingHooks::default())
            .await
            .unwrap_err();
        assert_eq!(error.code(), PurchaseFlowErrorCode::ErrorSettingUpPurchase);
        assert_eq!(error.reason(), Some(&FailureReason::StaleSession));
        assert!(widget.open_calls().is_empty());
    }

    #[tokio::test]
    async fn test_purchase_without_session() {
        let backend = Arc::new(ScriptedBackend::new());
        let widget = Arc::new(ScriptedCheckoutWidget::new().initialized());
        let orchestrator = orchestrator(&backend, &widget);

        let purchase = PaddlePurchase::new(
            &PaddleCheckoutStart {
                operation_session_id: "s1".into(),
                transaction_id: "txn_s1".into(),
                next_action: None,
            },
            "user1",
        );
        let error = orchestrator
            .purchase(purchase, &RecordingHooks::default())
            .await
            .unwrap_err();
        assert_eq!(error.reason(), Some(&FailureReason::NoPurchaseInProgress));
    }

    #[tokio::test]
    async fn test_open_failure() {
        let backend = Arc::new(ScriptedBackend::new().with_start(paddle_start("s1")));
        let widget = Arc::new(ScriptedCheckoutWidget::new().with_open_error("overlay blocked"));
        let orchestrator = orchestrator(&backend, &widget);

        let purchase = start(&orchestrator).await;
        let error = orchestrator
            .purchase(purchase, &RecordingHooks::default())
            .await
            .unwrap_err();
        assert!(error.message().starts_with("Failed to open Paddle checkout:"));
        assert_eq!(error.reason(), Some(&FailureReason::CheckoutWidget));
    }

    #[tokio::test]
    async fn test_event_stream_ending_rejects() {
        let backend = Arc::new(ScriptedBackend::new().with_start(paddle_start("s1")));
        let widget = Arc::new(
            ScriptedCheckoutWidget::new()
                .with_events([CheckoutEvent::Other("checkout.items.updated".into())])
                .ending_stream(),
        );
        let orchestrator = orchestrator(&backend, &widget);

        let purchase = start(&orchestrator).await;
        let error = orchestrator
            .purchase(purchase, &RecordingHooks::default())
            .await
            .unwrap_err();
        assert_eq!(error.code(), PurchaseFlowErrorCode::UnknownError);
        assert_eq!(widget.close_calls(), 1);
    }

    #[tokio::test]
    async fn test_not_initialized_widget_is_rejected() {
        let backend = Arc::new(ScriptedBackend::new().with_start(CheckoutStartResponse::new("s1")));
        let widget = Arc::new(ScriptedCheckoutWidget::new());
        let orchestrator = orchestrator(&backend, &widget);

        let started = orchestrator
            .helper()
            .start_purchase(CheckoutStartRequest::new("user1", "prod1", "off1"))
            .await
            .unwrap();
        let purchase = PaddlePurchase::new(
            &PaddleCheckoutStart {
                operation_session_id: started.operation_session_id,
                transaction_id: "txn_s1".into(),
                next_action: None,
            },
            "user1",
        );

        let error = orchestrator
            .purchase(purchase, &RecordingHooks::default())
            .await
            .unwrap_err();
        assert_eq!(error.message(), "Paddle not initialized.");
    }
}
