// Shared state for one pay-in flow

use std::sync::{Arc, Mutex, MutexGuard};

use super::PaymentIntent;
use crate::models::VerificationState;

/// Snapshot of the flow's state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentState {
    /// Pending intent; taken out once verification succeeds
    pub intent: Option<PaymentIntent>,
    /// Most recent poll outcome, overwritten each attempt
    pub verification: Option<VerificationState>,
    /// Verification requests issued for the current intent
    pub attempts: u32,
}

impl PaymentState {
    pub fn is_verified(&self) -> bool {
        self.verification.as_ref().is_some_and(|v| v.success)
    }
}

/// Handle to the state of a pay-in flow.
///
/// Created at flow entry and passed to whatever needs it; cloning shares the
/// same state. Only the verification poller writes to it while polling.
#[derive(Debug, Clone, Default)]
pub struct PaymentContext {
    inner: Arc<Mutex<PaymentState>>,
}

impl PaymentContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a flow for `intent`, discarding anything from a previous one
    pub fn begin(intent: PaymentIntent) -> Self {
        let context = Self::new();
        context.reset_to(intent);
        context
    }

    pub fn reset_to(&self, intent: PaymentIntent) {
        *self.lock() = PaymentState {
            intent: Some(intent),
            verification: None,
            attempts: 0,
        };
    }

    pub fn intent(&self) -> Option<PaymentIntent> {
        self.lock().intent.clone()
    }

    pub fn attempts(&self) -> u32 {
        self.lock().attempts
    }

    pub fn snapshot(&self) -> PaymentState {
        self.lock().clone()
    }

    pub(crate) fn record_attempt(&self, attempt: u32, state: Option<VerificationState>) {
        let mut guard = self.lock();
        guard.attempts = attempt;
        if let Some(state) = state {
            guard.verification = Some(state);
        }
    }

    /// Record a successful verification and discard the pending intent
    pub(crate) fn settle(&self, state: VerificationState) -> Option<PaymentIntent> {
        let mut guard = self.lock();
        guard.verification = Some(state);
        guard.intent.take()
    }

    /// Flow exit: drop everything
    pub fn clear(&self) {
        *self.lock() = PaymentState::default();
    }

    fn lock(&self) -> MutexGuard<'_, PaymentState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
