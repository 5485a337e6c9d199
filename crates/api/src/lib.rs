// API crate clippy configuration
#![allow(clippy::needless_borrows_for_generic_args)] // Sometimes needed for clarity
#![allow(clippy::inconsistent_digit_grouping)] // Epoch timestamps don't use grouping
// Test code patterns:
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Orgsync API Library
//!
//! HTTP surface for the organization/billing sync service:
//! - Signed webhook intake for the billing and identity providers
//! - Admin-token read endpoints over organization subscriptions
//! - Environment configuration and error responses

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::{Config, ConfigError, LogFormat};
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
