//! Checkout Widget
//!
//! The contract between the orchestrator and the third-party overlay checkout.
//! A widget reports everything that happens inside the overlay as
//! [`CheckoutEvent`]s on the sender it is handed when opened.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// Paddle environment the widget talks to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaddleEnvironment {
    Sandbox,
    Production,
}

impl PaddleEnvironment {
    pub const fn from_sandbox(is_sandbox: bool) -> Self {
        if is_sandbox {
            Self::Sandbox
        } else {
            Self::Production
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sandbox => "sandbox",
            Self::Production => "production",
        }
    }
}

/// Something that happened inside the checkout overlay
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckoutEvent {
    /// Checkout finished rendering
    Loaded,

    /// The customer entered or confirmed their identity
    CustomerIdentified {
        email: Option<String>,
        customer_id: Option<String>,
    },

    /// Payment went through on the gateway side
    Completed,

    /// Overlay closed; `user_initiated` is false for programmatic closes
    Closed { user_initiated: bool },

    /// Any event the orchestrator does not act on
    Other(String),
}

/// Sending half of a checkout's event stream
#[derive(Clone, Debug)]
pub struct CheckoutEventSender(mpsc::UnboundedSender<CheckoutEvent>);

impl CheckoutEventSender {
    /// Deliver an event; `false` once the purchase stopped listening
    pub fn emit(&self, event: CheckoutEvent) -> bool {
        self.0.send(event).is_ok()
    }
}

pub(crate) fn event_channel() -> (CheckoutEventSender, mpsc::UnboundedReceiver<CheckoutEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (CheckoutEventSender(tx), rx)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    Overlay,
    Inline,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Variant {
    OnePage,
    MultiPage,
}

/// Overlay presentation settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSettings {
    pub display_mode: DisplayMode,
    pub theme: Theme,
    pub variant: Variant,
    pub locale: String,
    pub allow_logout: bool,
    pub show_add_discounts: bool,
    pub show_add_tax_id: bool,
    pub allow_discount_removal: bool,
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            display_mode: DisplayMode::Overlay,
            theme: Theme::Light,
            variant: Variant::OnePage,
            locale: DEFAULT_LOCALE.to_string(),
            allow_logout: false,
            show_add_discounts: false,
            show_add_tax_id: false,
            allow_discount_removal: false,
        }
    }
}

pub const DEFAULT_LOCALE: &str = "en";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutCustomer {
    pub email: String,
}

/// Everything the widget needs to open a checkout
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutOpenOptions {
    pub transaction_id: String,
    pub settings: CheckoutSettings,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<CheckoutCustomer>,
}

impl CheckoutOpenOptions {
    pub fn for_transaction(
        transaction_id: impl Into<String>,
        locale: Option<&str>,
        customer_email: Option<&str>,
    ) -> Self {
        let mut settings = CheckoutSettings::default();
        if let Some(locale) = locale.filter(|l| !l.is_empty()) {
            settings.locale = locale.to_string();
        }

        Self {
            transaction_id: transaction_id.into(),
            settings,
            customer: customer_email
                .filter(|email| !email.is_empty())
                .map(|email| CheckoutCustomer {
                    email: email.to_string(),
                }),
        }
    }
}

/// Checkout widget errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckoutWidgetError {
    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("Widget not initialized")]
    NotInitialized,

    #[error("Could not open checkout: {0}")]
    Open(String),
}

/// Third-party overlay checkout
///
/// A close requested through [`CheckoutWidget::close`] must be reported as
/// `Closed { user_initiated: false }`.
#[async_trait]
pub trait CheckoutWidget: Send + Sync {
    /// Initialize with a client-side token; called once per widget
    async fn initialize(
        &self,
        token: &str,
        environment: PaddleEnvironment,
    ) -> Result<(), CheckoutWidgetError>;

    fn is_initialized(&self) -> bool;

    /// Open the overlay and start reporting events on `events`
    async fn open(
        &self,
        options: &CheckoutOpenOptions,
        events: CheckoutEventSender,
    ) -> Result<(), CheckoutWidgetError>;

    fn close(&self);
}
