//! # purchase-core
//!
//! Purchase operation state machine and polling protocol for web checkouts.
//!
//! ## Flow
//!
//! ```text
//! ┌──────────┐ start_purchase ┌──────────────┐  create_session  ┌───────────┐
//! │  Caller  │───────────────▶│   Purchase   │─────────────────▶│  Backend  │
//! │ (UI/orch)│                │  Operation   │                  │  Gateway  │
//! │          │ poll_until_    │   Helper     │ get_session_     │ (trait)   │
//! │          │ completion ───▶│              │ status (×N) ────▶│           │
//! └──────────┘                └──────────────┘                  └───────────┘
//!       ▲                            │
//!       └──── PurchaseSuccess / PurchaseFlowError (via error mapper)
//! ```
//!
//! The `BackendGateway` trait keeps the helper independent of the transport;
//! `purchase-http` ships a reqwest implementation and [`mock::ScriptedBackend`]
//! an in-memory one.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use purchase_core::{CheckoutStartRequest, PollingConfig, PurchaseOperationHelper};
//!
//! let helper = PurchaseOperationHelper::new(Arc::new(gateway), PollingConfig::default());
//!
//! let started = helper
//!     .start_purchase(CheckoutStartRequest::new("user_1", "monthly", "default"))
//!     .await?;
//!
//! // Hand started.gateway_params to the checkout UI, then:
//! let purchase = helper.poll_until_completion().await?;
//! ```

pub mod config;
pub mod error;
pub mod gateway;
pub mod helper;
pub mod mapper;
pub mod mock;
pub mod operation;

pub use config::PollingConfig;
pub use error::{
    BackendError, BackendErrorCode, BackendResult, ConfigError, FailureReason, PurchaseFlowError,
    PurchaseFlowErrorCode, Result,
};
pub use gateway::{
    BackendGateway, CheckoutCalculateTaxRequest, CheckoutCalculateTaxResponse,
    CheckoutCompleteRequest, CheckoutCompleteResponse, CheckoutStartRequest,
    CheckoutStartResponse, GatewayParams, PaddleBillingParams, PatchSessionRequest,
    PatchSessionResponse, PurchaseOption, StripeBillingParams, TaxBreakdownItem,
    TaxCalculationFailure,
};
pub use helper::PurchaseOperationHelper;
pub use mock::ScriptedBackend;
pub use mapper::{CheckoutStatusErrorCode, map_checkout_failure};
pub use operation::{
    CheckoutStatusError, CheckoutStatusResponse, OperationSessionId, OperationSessionStatus,
    OperationStatus, PurchaseSuccess, RedemptionInfo,
};
