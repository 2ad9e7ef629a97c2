//! Scripted Backend Gateway
//!
//! For tests and simulation. Replays queued responses and records every call.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{BackendError, BackendErrorCode, BackendResult};
use crate::gateway::{
    BackendGateway, CheckoutCalculateTaxRequest, CheckoutCalculateTaxResponse,
    CheckoutCompleteRequest, CheckoutCompleteResponse, CheckoutStartRequest,
    CheckoutStartResponse, PatchSessionRequest, PatchSessionResponse, StripeBillingParams,
};
use crate::operation::{CheckoutStatusResponse, OperationSessionId};

#[derive(Default)]
struct Script {
    starts: VecDeque<BackendResult<CheckoutStartResponse>>,
    statuses: VecDeque<BackendResult<CheckoutStatusResponse>>,
    patch_failure: Option<BackendError>,
    complete: Option<BackendResult<StripeBillingParams>>,
    taxes: VecDeque<BackendResult<CheckoutCalculateTaxResponse>>,
    create_calls: Vec<CheckoutStartRequest>,
    status_calls: Vec<OperationSessionId>,
    patch_calls: Vec<(OperationSessionId, PatchSessionRequest)>,
    complete_calls: Vec<(OperationSessionId, CheckoutCompleteRequest)>,
    tax_calls: Vec<(OperationSessionId, CheckoutCalculateTaxRequest)>,
}

/// In-memory gateway driven by a queue of canned responses
///
/// Status responses are consumed in order; the last one repeats forever, so a
/// single `in_progress` entry models a session that never finishes.
#[derive(Default)]
pub struct ScriptedBackend {
    script: Mutex<Script>,
    latency: Duration,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay applied to every status poll
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    #[must_use]
    pub fn with_start(self, response: CheckoutStartResponse) -> Self {
        self.script().starts.push_back(Ok(response));
        self
    }

    #[must_use]
    pub fn with_start_error(self, error: BackendError) -> Self {
        self.script().starts.push_back(Err(error));
        self
    }

    #[must_use]
    pub fn with_status(self, response: CheckoutStatusResponse) -> Self {
        self.push_status(response);
        self
    }

    #[must_use]
    pub fn with_status_error(self, error: BackendError) -> Self {
        self.script().statuses.push_back(Err(error));
        self
    }

    #[must_use]
    pub fn with_patch_error(self, error: BackendError) -> Self {
        self.script().patch_failure = Some(error);
        self
    }

    /// Stripe parameters returned by every completion
    #[must_use]
    pub fn with_complete(self, data: StripeBillingParams) -> Self {
        self.script().complete = Some(Ok(data));
        self
    }

    #[must_use]
    pub fn with_complete_error(self, error: BackendError) -> Self {
        self.script().complete = Some(Err(error));
        self
    }

    #[must_use]
    pub fn with_tax(self, response: CheckoutCalculateTaxResponse) -> Self {
        self.script().taxes.push_back(Ok(response));
        self
    }

    #[must_use]
    pub fn with_tax_error(self, error: BackendError) -> Self {
        self.script().taxes.push_back(Err(error));
        self
    }

    /// Queue another status response on a shared backend
    pub fn push_status(&self, response: CheckoutStatusResponse) {
        self.script().statuses.push_back(Ok(response));
    }

    pub fn create_calls(&self) -> Vec<CheckoutStartRequest> {
        self.script().create_calls.clone()
    }

    pub fn status_calls(&self) -> Vec<OperationSessionId> {
        self.script().status_calls.clone()
    }

    pub fn patch_calls(&self) -> Vec<(OperationSessionId, PatchSessionRequest)> {
        self.script().patch_calls.clone()
    }

    pub fn complete_calls(&self) -> Vec<(OperationSessionId, CheckoutCompleteRequest)> {
        self.script().complete_calls.clone()
    }

    pub fn tax_calls(&self) -> Vec<(OperationSessionId, CheckoutCalculateTaxRequest)> {
        self.script().tax_calls.clone()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl BackendGateway for ScriptedBackend {
    async fn create_session(
        &self,
        request: &CheckoutStartRequest,
    ) -> BackendResult<CheckoutStartResponse> {
        let mut script = self.script();
        script.create_calls.push(request.clone());

        script.starts.pop_front().unwrap_or_else(|| {
            let id = format!("opsession_{}", uuid::Uuid::new_v4().simple());
            Ok(CheckoutStartResponse::new(id))
        })
    }

    async fn get_session_status(
        &self,
        operation_session_id: &OperationSessionId,
    ) -> BackendResult<CheckoutStatusResponse> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let mut script = self.script();
        script.status_calls.push(operation_session_id.clone());

        let next = if script.statuses.len() > 1 {
            script.statuses.pop_front()
        } else {
            script.statuses.front().cloned()
        };

        next.unwrap_or_else(|| {
            Err(BackendError::Request {
                endpoint: "getCheckoutStatus".into(),
                status: 404,
                code: Some(BackendErrorCode::InvalidOperationSession.code()),
                message: Some(format!("Unknown operation session {operation_session_id}")),
            })
        })
    }

    async fn patch_session(
        &self,
        operation_session_id: &OperationSessionId,
        request: &PatchSessionRequest,
    ) -> BackendResult<PatchSessionResponse> {
        let mut script = self.script();
        script
            .patch_calls
            .push((operation_session_id.clone(), request.clone()));

        match &script.patch_failure {
            Some(error) => Err(error.clone()),
            None => Ok(PatchSessionResponse {
                operation_session_id: operation_session_id.clone(),
            }),
        }
    }

    async fn complete_checkout(
        &self,
        operation_session_id: &OperationSessionId,
        request: &CheckoutCompleteRequest,
    ) -> BackendResult<CheckoutCompleteResponse> {
        let mut script = self.script();
        script
            .complete_calls
            .push((operation_session_id.clone(), request.clone()));

        let data = script.complete.clone().unwrap_or_else(|| Ok(StripeBillingParams::default()))?;
        Ok(CheckoutCompleteResponse {
            operation_session_id: operation_session_id.clone(),
            data,
        })
    }

    async fn calculate_tax(
        &self,
        operation_session_id: &OperationSessionId,
        request: &CheckoutCalculateTaxRequest,
    ) -> BackendResult<CheckoutCalculateTaxResponse> {
        let mut script = self.script();
        script
            .tax_calls
            .push((operation_session_id.clone(), request.clone()));

        script.taxes.pop_front().unwrap_or_else(|| {
            Err(BackendError::Request {
                endpoint: "postCheckoutCalculateTax".into(),
                status: 404,
                code: Some(BackendErrorCode::InvalidOperationSession.code()),
                message: Some(format!("Unknown operation session {operation_session_id}")),
            })
        })
    }

    fn name(&self) -> &str {
        "ScriptedBackend"
    }
}
