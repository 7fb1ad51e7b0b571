// Payportal - client for an international payments platform

pub mod config;
pub mod types;
pub mod models;
pub mod api;
pub mod session;
pub mod payment;
pub mod cli;
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use api::{ApiClient, VerificationApi};
pub use payment::{PaymentContext, PaymentIntent, PollOutcome, VerificationPoller};
pub use types::{AppError, AppResult};
