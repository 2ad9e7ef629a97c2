//! Simulated purchase scenarios

use std::str::FromStr;

use purchase_core::{
    CheckoutStartResponse, CheckoutStatusError, CheckoutStatusResponse, PaddleBillingParams,
    ScriptedBackend,
};
use purchase_paddle::{CheckoutEvent, ScriptedCheckoutWidget};

/// How the simulated customer and backend behave
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Scenario {
    /// Customer pays, backend confirms after a few polls
    #[default]
    Success,
    /// Customer pays, the charge is declined
    Declined,
    /// Customer closes the overlay before paying
    Cancelled,
}

impl FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "success" => Ok(Self::Success),
            "declined" => Ok(Self::Declined),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            other => Err(format!("unknown scenario: {other}")),
        }
    }
}

impl Scenario {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Declined => "declined",
            Self::Cancelled => "cancelled",
        }
    }

    /// In-memory backend answering the way this scenario needs
    pub fn backend(self) -> ScriptedBackend {
        let mut start = CheckoutStartResponse::new("opsession_sim");
        start.next_action = Some("collect_payment_info".into());
        start.gateway_params.paddle_billing_params = Some(PaddleBillingParams {
            client_side_token: "test_sim_token".into(),
            is_sandbox: true,
            paddle_transaction_id: "txn_sim".into(),
        });

        let backend = ScriptedBackend::new()
            .with_start(start)
            .with_status(CheckoutStatusResponse::started())
            .with_status(CheckoutStatusResponse::in_progress());

        match self {
            Self::Success => backend.with_status(
                CheckoutStatusResponse::succeeded(
                    "monthly",
                    "txn_sim",
                    chrono::Utc::now().to_rfc3339(),
                )
                .with_redeem_url("https://example.com/redeem/sim"),
            ),
            Self::Declined => backend.with_status(CheckoutStatusResponse::failed(Some(
                CheckoutStatusError {
                    code: 3,
                    message: "card declined".into(),
                },
            ))),
            Self::Cancelled => backend,
        }
    }

    /// Overlay replaying this scenario's customer behaviour
    pub fn widget(self) -> ScriptedCheckoutWidget {
        let widget = ScriptedCheckoutWidget::new().with_events([
            CheckoutEvent::Loaded,
            CheckoutEvent::CustomerIdentified {
                email: Some("customer@example.com".into()),
                customer_id: Some("ctm_sim".into()),
            },
        ]);

        match self {
            Self::Success | Self::Declined => widget.with_events([CheckoutEvent::Completed]),
            Self::Cancelled => widget.with_events([CheckoutEvent::Closed {
                user_initiated: true,
            }]),
        }
    }
}
