//! # purchase-http
//!
//! reqwest implementation of `purchase_core::BackendGateway`.
//!
//! | Operation | Request |
//! |---|---|
//! | create session | `POST {base}/billing/v1/checkout/start` |
//! | session status | `GET {base}/billing/v1/checkout/{id}` |
//! | patch session | `PATCH {base}/billing/v1/checkout/{id}` |
//! | complete checkout | `POST {base}/billing/v1/checkout/{id}/complete` |
//! | calculate tax | `POST {base}/billing/v1/checkout/{id}/calculate_tax` |
//!
//! ```rust,ignore
//! use purchase_http::HttpBackendGateway;
//!
//! let gateway = HttpBackendGateway::from_env()?;
//! let helper = PurchaseOperationHelper::with_defaults(Arc::new(gateway));
//! ```

mod config;
mod gateway;

pub use config::{HttpGatewayConfig, HttpGatewayError};
pub use gateway::{HttpBackendGateway, classify_error};
