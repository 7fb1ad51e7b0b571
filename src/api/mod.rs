//! Payments API client
//!
//! Typed wrappers around the platform's REST endpoints. Each submodule adds
//! the operations for one area to [`ApiClient`]:
//! - `auth` - registration and sign-in
//! - `beneficiaries` - saved recipients
//! - `rates` - exchange-rate lookup
//! - `payments` - collection accounts and payment verification
//! - `profile` - profile and tier upgrades

pub mod client;
pub mod auth;
pub mod beneficiaries;
pub mod rates;
pub mod payments;
pub mod profile;

pub use client::ApiClient;
pub use payments::VerificationApi;
