//! Operation Sessions
//!
//! Wire shapes of a server-side purchase operation and the success payload
//! the helper resolves with.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FailureReason, PurchaseFlowError, Result};

/// Opaque operation session handle assigned by the backend
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationSessionId(String);

impl OperationSessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OperationSessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for OperationSessionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Server-authoritative session status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationSessionStatus {
    Started,
    InProgress,
    Succeeded,
    Failed,
}

impl OperationSessionStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::InProgress => "in_progress",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

/// Error attached to a `failed` operation
///
/// `code` stays numeric so codes added on the backend still decode.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutStatusError {
    pub code: i64,
    pub message: String,
}

/// Post-purchase redemption data
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionInfo {
    #[serde(default, alias = "redeemUrl")]
    pub redeem_url: Option<String>,
}

/// Status snapshot of one operation session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationStatus {
    pub status: OperationSessionStatus,

    #[serde(default, alias = "isExpired")]
    pub is_expired: bool,

    #[serde(default)]
    pub error: Option<CheckoutStatusError>,

    #[serde(default)]
    pub store_transaction_identifier: Option<String>,

    #[serde(default)]
    pub product_identifier: Option<String>,

    /// ISO-8601 timestamp, kept raw so a malformed value doesn't fail decoding
    #[serde(default)]
    pub purchase_date: Option<String>,

    #[serde(default, alias = "redemptionInfo")]
    pub redemption_info: Option<RedemptionInfo>,
}

impl OperationStatus {
    fn with_status(status: OperationSessionStatus) -> Self {
        Self {
            status,
            is_expired: false,
            error: None,
            store_transaction_identifier: None,
            product_identifier: None,
            purchase_date: None,
            redemption_info: None,
        }
    }
}

/// Response of the get-session-status call
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutStatusResponse {
    pub operation: OperationStatus,
}

impl CheckoutStatusResponse {
    pub fn started() -> Self {
        Self {
            operation: OperationStatus::with_status(OperationSessionStatus::Started),
        }
    }

    pub fn in_progress() -> Self {
        Self {
            operation: OperationStatus::with_status(OperationSessionStatus::InProgress),
        }
    }

    pub fn succeeded(
        product_identifier: impl Into<String>,
        store_transaction_identifier: impl Into<String>,
        purchase_date: impl Into<String>,
    ) -> Self {
        let mut operation = OperationStatus::with_status(OperationSessionStatus::Succeeded);
        operation.product_identifier = Some(product_identifier.into());
        operation.store_transaction_identifier = Some(store_transaction_identifier.into());
        operation.purchase_date = Some(purchase_date.into());
        Self { operation }
    }

    pub fn failed(error: Option<CheckoutStatusError>) -> Self {
        let mut operation = OperationStatus::with_status(OperationSessionStatus::Failed);
        operation.error = error;
        Self { operation }
    }

    #[must_use]
    pub fn with_redeem_url(mut self, redeem_url: impl Into<String>) -> Self {
        self.operation.redemption_info = Some(RedemptionInfo {
            redeem_url: Some(redeem_url.into()),
        });
        self
    }
}

/// Resolved value of a successful purchase operation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseSuccess {
    pub operation_session_id: OperationSessionId,
    pub store_transaction_identifier: String,
    pub product_identifier: String,
    pub purchase_date: DateTime<Utc>,
    pub redemption_info: Option<RedemptionInfo>,
}

impl PurchaseSuccess {
    /// Build from a `succeeded` status
    ///
    /// Transaction and product identifiers are mandatory; the purchase date
    /// falls back to now when missing or unparsable.
    pub fn from_operation(
        operation_session_id: OperationSessionId,
        operation: OperationStatus,
    ) -> Result<Self> {
        let store_transaction_identifier = non_empty(operation.store_transaction_identifier);
        let product_identifier = non_empty(operation.product_identifier);

        let (Some(store_transaction_identifier), Some(product_identifier)) =
            (store_transaction_identifier, product_identifier)
        else {
            return Err(
                PurchaseFlowError::unknown("Missing required fields in operation response.")
                    .with_reason(FailureReason::MissingRequiredFields),
            );
        };

        let purchase_date = match operation.purchase_date.as_deref().map(parse_purchase_date) {
            Some(Some(date)) => date,
            Some(None) => {
                tracing::warn!(
                    operation_session_id = %operation_session_id,
                    raw = ?operation.purchase_date,
                    "Unparsable purchase date, using current time"
                );
                Utc::now()
            }
            None => Utc::now(),
        };

        Ok(Self {
            operation_session_id,
            store_transaction_identifier,
            product_identifier,
            purchase_date,
            redemption_info: operation.redemption_info,
        })
    }

    pub fn redeem_url(&self) -> Option<&str> {
        self.redemption_info
            .as_ref()
            .and_then(|info| info.redeem_url.as_deref())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Parse RFC 3339 first, then zone-less timestamps and bare dates as UTC
fn parse_purchase_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
        return Some(date.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
