//! Backend Gateway
//!
//! The async RPC contract the purchase helper consumes. Implement this for
//! each transport: HTTP (`purchase-http`), in-memory ([`crate::mock`]), ...

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BackendResult;
use crate::operation::{CheckoutStatusResponse, OperationSessionId};

/// Concrete purchasable option of a product (a price or plan variant)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOption {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_id: Option<String>,
}

/// Request to create an operation session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutStartRequest {
    pub app_user_id: String,
    pub product_id: String,

    /// Identifier of the offering the product was presented in
    pub offering_identifier: String,

    /// Omitted to let the backend choose the default option
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchase_option: Option<PurchaseOption>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,

    /// Correlates every request of one purchase attempt in backend logs
    pub trace_id: Uuid,
}

impl CheckoutStartRequest {
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
            email: None,
            metadata: None,
            trace_id: Uuid::new_v4(),
        }
    }

    #[must_use]
    pub fn with_purchase_option(mut self, option: PurchaseOption) -> Self {
        self.purchase_option = Some(option);
        self
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Stripe Elements parameters returned on session creation
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StripeBillingParams {
    #[serde(default)]
    pub stripe_account_id: Option<String>,

    #[serde(default)]
    pub publishable_api_key: Option<String>,

    #[serde(default)]
    pub client_secret: Option<String>,
}

/// Paddle overlay parameters returned on session creation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaddleBillingParams {
    pub client_side_token: String,

    #[serde(default)]
    pub is_sandbox: bool,

    /// Paddle transaction the overlay checkout opens
    pub paddle_transaction_id: String,
}

/// Gateway-specific parameters the UI layer needs to render checkout
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stripe_billing_params: Option<StripeBillingParams>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paddle_billing_params: Option<PaddleBillingParams>,
}

/// Response of session creation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutStartResponse {
    pub operation_session_id: OperationSessionId,

    /// What the UI should do next (e.g. "collect_payment_info")
    #[serde(default)]
    pub next_action: Option<String>,

    #[serde(flatten)]
    pub gateway_params: GatewayParams,
}

impl CheckoutStartResponse {
    pub fn new(operation_session_id: impl Into<String>) -> Self {
        Self {
            operation_session_id: OperationSessionId::new(operation_session_id),
            next_action: None,
            gateway_params: GatewayParams::default(),
        }
    }
}

/// Late-arriving identity or metadata for an existing session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchSessionRequest {
    pub app_user_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}

/// Response of a session patch
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchSessionResponse {
    pub operation_session_id: OperationSessionId,
}

/// Request to confirm the customer's payment details on a session
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutCompleteRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Response of checkout completion, carrying what Stripe Elements needs to confirm
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutCompleteResponse {
    pub operation_session_id: OperationSessionId,

    #[serde(default)]
    pub data: StripeBillingParams,
}

/// Customer location to compute taxes for
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutCalculateTaxRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
}

/// One line of the tax breakdown
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxBreakdownItem {
    pub tax_amount_in_micros: i64,
    pub display_name: String,
}

/// Why the backend could not compute taxes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxCalculationFailure {
    TaxCollectionDisabled,
    InvalidTaxLocation,
    RateLimitExceeded,
    MissingRequiredPermission,
    InvalidOriginAddress,
    TaxesNotActive,
    UnexpectedGatewayError,
    #[serde(other)]
    Unknown,
}

impl TaxCalculationFailure {
    /// Whether asking the customer for a different address can help
    pub const fn is_location_problem(self) -> bool {
        matches!(self, Self::InvalidTaxLocation)
    }
}

/// Taxed totals of a session, in micros of `currency`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutCalculateTaxResponse {
    pub operation_session_id: OperationSessionId,
    pub currency: String,
    pub total_amount_in_micros: i64,
    pub tax_amount_in_micros: i64,
    pub total_excluding_tax_in_micros: i64,

    #[serde(default)]
    pub tax_inclusive: bool,

    #[serde(default)]
    pub tax_breakdown: Vec<TaxBreakdownItem>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_reason: Option<TaxCalculationFailure>,
}

impl CheckoutCalculateTaxResponse {
    /// Untaxed totals for `amount_in_micros`
    pub fn untaxed(
        operation_session_id: impl Into<String>,
        currency: impl Into<String>,
        amount_in_micros: i64,
    ) -> Self {
        Self {
            operation_session_id: OperationSessionId::new(operation_session_id),
            currency: currency.into(),
            total_amount_in_micros: amount_in_micros,
            tax_amount_in_micros: 0,
            total_excluding_tax_in_micros: amount_in_micros,
            tax_inclusive: false,
            tax_breakdown: Vec::new(),
            failed_reason: None,
        }
    }
}

/// Backend gateway trait (Strategy pattern)
///
/// The helper only talks to the backend through this interface. Transport
/// timeouts are the implementation's concern.
#[async_trait]
pub trait BackendGateway: Send + Sync {
    /// Create an operation session (POST semantics, not retried by the helper)
    async fn create_session(
        &self,
        request: &CheckoutStartRequest,
    ) -> BackendResult<CheckoutStartResponse>;

    /// Read a session's status (GET semantics, safe to repeat)
    async fn get_session_status(
        &self,
        operation_session_id: &OperationSessionId,
    ) -> BackendResult<CheckoutStatusResponse>;

    /// Attach identity or metadata to a session (PATCH semantics)
    async fn patch_session(
        &self,
        operation_session_id: &OperationSessionId,
        request: &PatchSessionRequest,
    ) -> BackendResult<PatchSessionResponse>;

    /// Confirm payment details on a session (POST semantics, not retried)
    async fn complete_checkout(
        &self,
        operation_session_id: &OperationSessionId,
        request: &CheckoutCompleteRequest,
    ) -> BackendResult<CheckoutCompleteResponse>;

    /// Compute taxes for the customer's location
    async fn calculate_tax(
        &self,
        operation_session_id: &OperationSessionId,
        request: &CheckoutCalculateTaxRequest,
    ) -> BackendResult<CheckoutCalculateTaxResponse>;

    /// Gateway name, for logs
    fn name(&self) -> &str;
}
