//! Error Types
//!
//! Two layers: [`BackendError`] is what a gateway returns, unmapped;
//! [`PurchaseFlowError`] is the client-facing taxonomy callers switch over.

use thiserror::Error;

/// Result type alias for purchase flow operations
pub type Result<T> = std::result::Result<T, PurchaseFlowError>;

/// Result type alias for raw gateway calls
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Raw failure from a backend gateway call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Transport failure (connection refused, timeout, TLS, ...)
    #[error("Network error: {0}")]
    Network(String),

    /// Backend answered with a 5xx status
    #[error("Server responded with status code: {status} in request: {endpoint}")]
    Server { endpoint: String, status: u16 },

    /// Backend rejected the request with a 4xx status
    #[error("Request {endpoint} failed with status code: {status}")]
    Request {
        endpoint: String,
        status: u16,
        code: Option<i64>,
        message: Option<String>,
    },

    /// Response body did not match the expected shape
    #[error("Unexpected backend response: {0}")]
    Decode(String),
}

impl BackendError {
    /// Backend error code carried in a 4xx body, if any
    pub const fn backend_code(&self) -> Option<i64> {
        match self {
            Self::Request { code, .. } => *code,
            _ => None,
        }
    }

    /// Human-readable backend message carried in a 4xx body, if any
    pub fn backend_message(&self) -> Option<&str> {
        match self {
            Self::Request { message, .. } => message.as_deref(),
            _ => None,
        }
    }

    /// Check if this error is a transport failure
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// Check if this error is retryable
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Server { .. })
    }
}

/// Backend error codes relevant to the purchase flow
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackendErrorCode {
    InvalidEmail,
    InternalServerError,
    EmptyAppUserId,
    InvalidApiKey,
    BadRequest,
    AlreadySubscribed,
    PaymentGatewayGenericError,
    OfferNotFound,
    NoMxRecordsFound,
    InvalidOperationSession,
    PurchaseCannotBeCompleted,
    EmailIsRequired,
}

impl BackendErrorCode {
    const ALL: [Self; 12] = [
        Self::InvalidEmail,
        Self::InternalServerError,
        Self::EmptyAppUserId,
        Self::InvalidApiKey,
        Self::BadRequest,
        Self::AlreadySubscribed,
        Self::PaymentGatewayGenericError,
        Self::OfferNotFound,
        Self::NoMxRecordsFound,
        Self::InvalidOperationSession,
        Self::PurchaseCannotBeCompleted,
        Self::EmailIsRequired,
    ];

    /// Numeric code as sent by the backend
    pub const fn code(self) -> i64 {
        match self {
            Self::InvalidEmail => 7012,
            Self::InternalServerError => 7110,
            Self::EmptyAppUserId => 7220,
            Self::InvalidApiKey => 7225,
            Self::BadRequest => 7226,
            Self::AlreadySubscribed => 7772,
            Self::PaymentGatewayGenericError => 7773,
            Self::OfferNotFound => 7814,
            Self::NoMxRecordsFound => 7834,
            Self::InvalidOperationSession => 7877,
            Self::PurchaseCannotBeCompleted => 7878,
            Self::EmailIsRequired => 7879,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|known| known.code() == code)
    }
}

/// Client-facing purchase flow error codes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PurchaseFlowErrorCode {
    ErrorSettingUpPurchase,
    ErrorChargingPayment,
    UnknownError,
    NetworkError,
    MissingEmailError,
    AlreadyPurchasedError,
    UserCancelledError,
}

impl PurchaseFlowErrorCode {
    /// Stable numeric value for hosts that surface codes to users
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::ErrorSettingUpPurchase => 0,
            Self::ErrorChargingPayment => 1,
            Self::UnknownError => 2,
            Self::NetworkError => 3,
            Self::MissingEmailError => 4,
            Self::AlreadyPurchasedError => 5,
            Self::UserCancelledError => 6,
        }
    }
}

/// Structured sub-code for failures that share a client code
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailureReason {
    /// Polled or patched without an active operation session
    NoPurchaseInProgress,
    /// The caller's session id is no longer the helper's active one
    StaleSession,
    /// `failed` status without an error object
    MissingErrorDetails,
    /// `succeeded` status without transaction or product identifier
    MissingRequiredFields,
    /// Session never reached a terminal status within the attempt budget
    MaxAttemptsReached,
    /// Backend sent a status error code this client does not know
    UnrecognizedErrorCode(i64),
    /// A newer purchase start or a cancel replaced this poll loop's session
    Superseded,
    /// Attaching late customer identity to the session failed
    SessionUpdateFailed,
    /// The checkout widget failed to initialize or open
    CheckoutWidget,
    /// A checkout event handler failed
    EventHandler,
}

/// Client-facing purchase flow error
///
/// Immutable once built; the `with_*` methods are only used while constructing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct PurchaseFlowError {
    code: PurchaseFlowErrorCode,
    message: String,
    underlying_error_message: Option<String>,
    underlying_backend_error_code: Option<i64>,
    reason: Option<FailureReason>,
}

impl PurchaseFlowError {
    pub fn new(code: PurchaseFlowErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            underlying_error_message: None,
            underlying_backend_error_code: None,
            reason: None,
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(PurchaseFlowErrorCode::UnknownError, message)
    }

    pub fn no_purchase_in_progress() -> Self {
        Self::new(
            PurchaseFlowErrorCode::ErrorSettingUpPurchase,
            "No purchase in progress",
        )
        .with_reason(FailureReason::NoPurchaseInProgress)
    }

    /// Map a raw gateway failure, falling back to `default` for codes with no
    /// dedicated client error
    pub fn from_backend_error(error: &BackendError, default: PurchaseFlowErrorCode) -> Self {
        let code = match error.backend_code().and_then(BackendErrorCode::from_code) {
            Some(BackendErrorCode::AlreadySubscribed) => {
                PurchaseFlowErrorCode::AlreadyPurchasedError
            }
            Some(
                BackendErrorCode::InvalidEmail
                | BackendErrorCode::NoMxRecordsFound
                | BackendErrorCode::EmailIsRequired,
            ) => PurchaseFlowErrorCode::MissingEmailError,
            _ if error.is_network() => PurchaseFlowErrorCode::NetworkError,
            _ => default,
        };

        let underlying = error
            .backend_message()
            .map_or_else(|| error.to_string(), ToOwned::to_owned);

        Self::new(code, error.to_string())
            .with_underlying_message(underlying)
            .with_backend_code(error.backend_code())
    }

    #[must_use]
    pub fn with_underlying_message(mut self, message: impl Into<String>) -> Self {
        self.underlying_error_message = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_backend_code(mut self, code: Option<i64>) -> Self {
        self.underlying_backend_error_code = code;
        self
    }

    #[must_use]
    pub fn with_reason(mut self, reason: FailureReason) -> Self {
        self.reason = Some(reason);
        self
    }

    pub const fn code(&self) -> PurchaseFlowErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn underlying_error_message(&self) -> Option<&str> {
        self.underlying_error_message.as_deref()
    }

    pub const fn underlying_backend_error_code(&self) -> Option<i64> {
        self.underlying_backend_error_code
    }

    pub const fn reason(&self) -> Option<&FailureReason> {
        self.reason.as_ref()
    }

    /// Check if retrying the purchase may succeed without user action
    pub const fn is_retryable(&self) -> bool {
        matches!(self.code, PurchaseFlowErrorCode::NetworkError)
    }

    /// Get user-friendly message
    pub const fn user_message(&self) -> &'static str {
        match self.code {
            PurchaseFlowErrorCode::ErrorSettingUpPurchase => {
                "We couldn't set up your purchase. Please try again."
            }
            PurchaseFlowErrorCode::ErrorChargingPayment => {
                "Your payment could not be charged. Please check your payment details."
            }
            PurchaseFlowErrorCode::NetworkError => {
                "Network error. Please check your connection and try again."
            }
            PurchaseFlowErrorCode::MissingEmailError => "Please provide a valid email address.",
            PurchaseFlowErrorCode::AlreadyPurchasedError => "You have already purchased this product.",
            PurchaseFlowErrorCode::UserCancelledError => "Purchase was cancelled.",
            PurchaseFlowErrorCode::UnknownError => "An unexpected error occurred.",
        }
    }
}

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Required environment variable not set
    #[error("{0} not set")]
    Missing(&'static str),

    /// Environment variable present but unparsable
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    /// Value parsed but out of range
    #[error("Configuration error: {0}")]
    OutOfRange(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_error(code: Option<i64>) -> BackendError {
        BackendError::Request {
            endpoint: "postCheckoutStart".into(),
            status: 400,
            code,
            message: Some("backend says no".into()),
        }
    }

    #[test]
    fn test_backend_code_lookup() {
        assert_eq!(
            BackendErrorCode::from_code(7772),
            Some(BackendErrorCode::AlreadySubscribed)
        );
        assert_eq!(BackendErrorCode::from_code(1234), None);
    }

    #[test]
    fn test_already_subscribed_maps_to_already_purchased() {
        let error = PurchaseFlowError::from_backend_error(
            &request_error(Some(7772)),
            PurchaseFlowErrorCode::ErrorSettingUpPurchase,
        );
        assert_eq!(error.code(), PurchaseFlowErrorCode::AlreadyPurchasedError);
        assert_eq!(error.underlying_backend_error_code(), Some(7772));
        assert_eq!(error.underlying_error_message(), Some("backend says no"));
    }

    #[test]
    fn test_email_codes_map_to_missing_email() {
        for code in [7012, 7834, 7879] {
            let error = PurchaseFlowError::from_backend_error(
                &request_error(Some(code)),
                PurchaseFlowErrorCode::ErrorSettingUpPurchase,
            );
            assert_eq!(error.code(), PurchaseFlowErrorCode::MissingEmailError);
        }
    }

    #[test]
    fn test_unmapped_codes_use_default() {
        let error = PurchaseFlowError::from_backend_error(
            &request_error(Some(7877)),
            PurchaseFlowErrorCode::ErrorSettingUpPurchase,
        );
        assert_eq!(error.code(), PurchaseFlowErrorCode::ErrorSettingUpPurchase);

        let error = PurchaseFlowError::from_backend_error(
            &BackendError::Server { endpoint: "getCheckoutStatus".into(), status: 503 },
            PurchaseFlowErrorCode::UnknownError,
        );
        assert_eq!(error.code(), PurchaseFlowErrorCode::UnknownError);
        assert_eq!(error.underlying_backend_error_code(), None);
    }

    #[test]
    fn test_network_errors_map_to_network() {
        let error = PurchaseFlowError::from_backend_error(
            &BackendError::Network("connection reset".into()),
            PurchaseFlowErrorCode::ErrorSettingUpPurchase,
        );
        assert_eq!(error.code(), PurchaseFlowErrorCode::NetworkError);
        assert!(error.is_retryable());
    }

    #[test]
    fn test_no_purchase_in_progress() {
        let error = PurchaseFlowError::no_purchase_in_progress();
        assert_eq!(error.code(), PurchaseFlowErrorCode::ErrorSettingUpPurchase);
        assert_eq!(error.to_string(), "No purchase in progress");
        assert_eq!(error.reason(), Some(&FailureReason::NoPurchaseInProgress));
    }
}
