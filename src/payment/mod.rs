//! Pay-in flow
//!
//! A collection account yields a [`PaymentIntent`]; the intent is held in a
//! [`PaymentContext`] for the lifetime of the flow, and a
//! [`VerificationPoller`] checks with the backend until the funds arrive.

pub mod context;
pub mod intent;
pub mod poller;

pub use context::{PaymentContext, PaymentState};
pub use intent::PaymentIntent;
pub use poller::{OnVerified, PollEvent, PollHandle, PollOutcome, PollStep, PollerConfig, VerificationPoller};
