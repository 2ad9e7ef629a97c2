//! HTTP Backend Gateway
//!
//! Implementation of `BackendGateway` over the billing REST API.

use std::time::Duration;

use async_trait::async_trait;
use purchase_core::{
    BackendError, BackendGateway, BackendResult, CheckoutCalculateTaxRequest,
    CheckoutCalculateTaxResponse, CheckoutCompleteRequest, CheckoutCompleteResponse,
    CheckoutStartRequest, CheckoutStartResponse, CheckoutStatusResponse, OperationSessionId,
    PatchSessionRequest, PatchSessionResponse,
};
use reqwest::{Client, RequestBuilder, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::config::{HttpGatewayConfig, HttpGatewayError};

const CHECKOUT_PATH: [&str; 3] = ["billing", "v1", "checkout"];

/// Error body of a rejected request
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<i64>,

    #[serde(default)]
    message: Option<String>,
}

/// Backend gateway talking JSON over HTTP
pub struct HttpBackendGateway {
    client: Client,
    base_url: Url,
    api_key: String,
}

impl HttpBackendGateway {
    pub fn new(config: HttpGatewayConfig) -> Result<Self, HttpGatewayError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| HttpGatewayError::InvalidBaseUrl {
            url: config.base_url.clone(),
            reason: e.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(HttpGatewayError::InvalidBaseUrl {
                url: config.base_url,
                reason: "cannot be a base URL".into(),
            });
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key,
        })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self, HttpGatewayError> {
        Self::new(HttpGatewayConfig::from_env()?)
    }

    /// Build `{base}/billing/v1/checkout/{tail...}` with each segment escaped
    fn checkout_url(&self, tail: &[&str]) -> BackendResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| BackendError::Network(format!("Invalid base URL {}", self.base_url)))?
            .pop_if_empty()
            .extend(CHECKOUT_PATH)
            .extend(tail);
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        request: RequestBuilder,
    ) -> BackendResult<T> {
        let response = request
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        tracing::debug!(endpoint, status, "Backend responded");

        if let Some(error) = classify_error(status, endpoint, &body) {
            return Err(error);
        }
        serde_json::from_str(&body).map_err(|e| BackendError::Decode(format!("{endpoint}: {e}")))
    }
}

/// Classify a non-success response; `None` for success statuses
pub fn classify_error(status: u16, endpoint: &str, body: &str) -> Option<BackendError> {
    if status >= 500 {
        return Some(BackendError::Server {
            endpoint: endpoint.to_string(),
            status,
        });
    }
    if status >= 400 {
        let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
        return Some(BackendError::Request {
            endpoint: endpoint.to_string(),
            status,
            code: parsed.code,
            message: parsed.message,
        });
    }
    None
}

#[async_trait]
impl BackendGateway for HttpBackendGateway {
    async fn create_session(
        &self,
        request: &CheckoutStartRequest,
    ) -> BackendResult<CheckoutStartResponse> {
        let url = self.checkout_url(&["start"])?;
        self.send("postCheckoutStart", self.client.post(url).json(request))
            .await
    }

    async fn get_session_status(
        &self,
        operation_session_id: &OperationSessionId,
    ) -> BackendResult<CheckoutStatusResponse> {
        let url = self.checkout_url(&[operation_session_id.as_str()])?;
        self.send("getCheckoutStatus", self.client.get(url)).await
    }

    async fn patch_session(
        &self,
        operation_session_id: &OperationSessionId,
        request: &PatchSessionRequest,
    ) -> BackendResult<PatchSessionResponse> {
        let url = self.checkout_url(&[operation_session_id.as_str()])?;
        self.send("patchCheckout", self.client.patch(url).json(request))
            .await
    }

    async fn complete_checkout(
        &self,
        operation_session_id: &OperationSessionId,
        request: &CheckoutCompleteRequest,
    ) -> BackendResult<CheckoutCompleteResponse> {
        let url = self.checkout_url(&[operation_session_id.as_str(), "complete"])?;
        self.send("postCheckoutComplete", self.client.post(url).json(request))
            .await
    }

    async fn calculate_tax(
        &self,
        operation_session_id: &OperationSessionId,
        request: &CheckoutCalculateTaxRequest,
    ) -> BackendResult<CheckoutCalculateTaxResponse> {
        let url = self.checkout_url(&[operation_session_id.as_str(), "calculate_tax"])?;
        self.send("postCheckoutCalculateTax", self.client.post(url).json(request))
            .await
    }

    fn name(&self) -> &str {
        "HttpBackendGateway"
    }
}
