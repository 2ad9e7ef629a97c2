//! Checkout Failure Mapping
//!
//! Pure mapping from the error attached to a `failed` operation to the
//! client-facing [`PurchaseFlowError`]. Codes this client doesn't know collapse
//! to `UnknownError`.

use crate::error::{FailureReason, PurchaseFlowError, PurchaseFlowErrorCode};
use crate::operation::CheckoutStatusError;

/// Known error codes of a failed operation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CheckoutStatusErrorCode {
    SetupIntentCreationFailed,
    PaymentMethodCreationFailed,
    PaymentChargeFailed,
    SetupIntentCompletionFailed,
    AlreadyPurchased,
}

impl CheckoutStatusErrorCode {
    pub const fn code(self) -> i64 {
        match self {
            Self::SetupIntentCreationFailed => 1,
            Self::PaymentMethodCreationFailed => 2,
            Self::PaymentChargeFailed => 3,
            Self::SetupIntentCompletionFailed => 4,
            Self::AlreadyPurchased => 5,
        }
    }

    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::SetupIntentCreationFailed),
            2 => Some(Self::PaymentMethodCreationFailed),
            3 => Some(Self::PaymentChargeFailed),
            4 => Some(Self::SetupIntentCompletionFailed),
            5 => Some(Self::AlreadyPurchased),
            _ => None,
        }
    }

    pub const fn flow_error_code(self) -> PurchaseFlowErrorCode {
        match self {
            Self::SetupIntentCreationFailed
            | Self::PaymentMethodCreationFailed
            | Self::SetupIntentCompletionFailed => PurchaseFlowErrorCode::ErrorSettingUpPurchase,
            Self::PaymentChargeFailed => PurchaseFlowErrorCode::ErrorChargingPayment,
            Self::AlreadyPurchased => PurchaseFlowErrorCode::AlreadyPurchasedError,
        }
    }

    pub const fn message(self) -> &'static str {
        match self {
            Self::SetupIntentCreationFailed => "Setup intent creation failed",
            Self::PaymentMethodCreationFailed => "Payment method creation failed",
            Self::PaymentChargeFailed => "Payment charge failed",
            Self::SetupIntentCompletionFailed => "Setup intent completion failed",
            Self::AlreadyPurchased => "Purchase was already completed",
        }
    }
}

/// Map the error of a `failed` operation to a purchase flow error
pub fn map_checkout_failure(error: Option<&CheckoutStatusError>) -> PurchaseFlowError {
    let Some(error) = error else {
        return PurchaseFlowError::unknown("Got an error status but error field is empty.")
            .with_reason(FailureReason::MissingErrorDetails);
    };

    let mapped = match CheckoutStatusErrorCode::from_code(error.code) {
        Some(known) => PurchaseFlowError::new(known.flow_error_code(), known.message()),
        None => PurchaseFlowError::unknown("Unknown error code received")
            .with_reason(FailureReason::UnrecognizedErrorCode(error.code)),
    };

    mapped
        .with_underlying_message(error.message.clone())
        .with_backend_code(Some(error.code))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_error(code: i64, message: &str) -> CheckoutStatusError {
        CheckoutStatusError {
            code,
            message: message.into(),
        }
    }

    #[test]
    fn test_known_codes_map_exactly() {
        let expected = [
            (1, PurchaseFlowErrorCode::ErrorSettingUpPurchase, "Setup intent creation failed"),
            (2, PurchaseFlowErrorCode::ErrorSettingUpPurchase, "Payment method creation failed"),
            (3, PurchaseFlowErrorCode::ErrorChargingPayment, "Payment charge failed"),
            (4, PurchaseFlowErrorCode::ErrorSettingUpPurchase, "Setup intent completion failed"),
            (5, PurchaseFlowErrorCode::AlreadyPurchasedError, "Purchase was already completed"),
        ];

        for (code, flow_code, message) in expected {
            let error = map_checkout_failure(Some(&status_error(code, "backend detail")));
            assert_eq!(error.code(), flow_code, "code {code}");
            assert_eq!(error.message(), message);
            assert_eq!(error.underlying_backend_error_code(), Some(code));
            assert_eq!(error.reason(), None);
        }
    }

    #[test]
    fn test_charge_failure_keeps_backend_message() {
        let error = map_checkout_failure(Some(&status_error(3, "card declined")));
        assert_eq!(error.code(), PurchaseFlowErrorCode::ErrorChargingPayment);
        assert_eq!(error.message(), "Payment charge failed");
        assert_eq!(error.underlying_error_message(), Some("card declined"));
    }

    #[test]
    fn test_unrecognized_code_is_unknown_error() {
        let error = map_checkout_failure(Some(&status_error(4242, "brand new failure")));
        assert_eq!(error.code(), PurchaseFlowErrorCode::UnknownError);
        assert_eq!(error.message(), "Unknown error code received");
        assert_eq!(error.reason(), Some(&FailureReason::UnrecognizedErrorCode(4242)));
    }

    #[test]
    fn test_missing_error_object() {
        let error = map_checkout_failure(None);
        assert_eq!(error.code(), PurchaseFlowErrorCode::UnknownError);
        assert_eq!(error.message(), "Got an error status but error field is empty.");
        assert_eq!(error.reason(), Some(&FailureReason::MissingErrorDetails));
    }

    #[test]
    fn test_code_round_trip_is_stable() {
        for code in 1..=5 {
            let known = CheckoutStatusErrorCode::from_code(code).unwrap();
            assert_eq!(known.code(), code);
        }
        assert_eq!(CheckoutStatusErrorCode::from_code(0), None);
    }
}
