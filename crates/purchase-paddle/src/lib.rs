//! # purchase-paddle
//!
//! Paddle overlay checkout on top of `purchase-core`.
//!
//! ## Flow
//!
//! ```text
//! start_checkout ─▶ helper.start_purchase ─▶ widget.initialize (once)
//!
//! purchase ─▶ widget.open ─▶ events ──┬─ Loaded ─────────────▶ hooks.on_checkout_loaded
//!                                     ├─ CustomerIdentified ─▶ helper.patch_operation_session
//!                                     ├─ Closed (by user) ───▶ hooks.unmount_purchase_ui, cancelled
//!                                     └─ Completed ──────────▶ widget.close, helper.poll_until_completion
//! ```
//!
//! The overlay is always closed before a failed purchase settles.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use purchase_paddle::{PaddlePurchase, PaddlePurchaseOrchestrator, PaddleStartParams};
//!
//! let orchestrator = PaddlePurchaseOrchestrator::new(helper, Arc::new(widget));
//!
//! let started = orchestrator
//!     .start_checkout(PaddleStartParams::new("user_1", "monthly", "default"))
//!     .await?;
//! let purchase = PaddlePurchase::new(&started, "user_1");
//! let result = orchestrator.purchase(purchase, &hooks).await?;
//! ```

mod hooks;
mod orchestrator;
mod scripted;
mod widget;

pub use hooks::{PurchaseUiHooks, TracingHooks};
pub use orchestrator::{
    PADDLE_CUSTOMER_ID_KEY, PaddleCheckoutStart, PaddlePurchase, PaddlePurchaseOrchestrator,
    PaddleStartParams,
};
pub use scripted::ScriptedCheckoutWidget;
pub use widget::{
    CheckoutCustomer, CheckoutEvent, CheckoutEventSender, CheckoutOpenOptions, CheckoutSettings,
    CheckoutWidget, CheckoutWidgetError, DEFAULT_LOCALE, DisplayMode, PaddleEnvironment, Theme,
    Variant,
};
