//! Payment Verification Poller
//!
//! Asks the backend whether the funds for a reference have arrived, once per
//! interval, until they have or the attempt budget runs out.
//!
//! ```text
//!  spawn() ─► tick ─► received ─────────────────────────► Verified
//!              │
//!              ├─► pending / request error ─► attempts < max ─► sleep ─► tick
//!              │                            └► attempts = max ─► Exhausted
//!              └─► no session token (no request issued) ─► Unauthenticated
//!
//!  cancel() / drop(handle) at any point ─────────────────► Cancelled
//! ```
//!
//! The attempt counter counts requests actually issued: the first request is
//! attempt 1 and the budget is spent after `max_attempts` requests. Attempts
//! are serialized: `tick` takes `&mut self` and the next one is only
//! scheduled after the previous response has been handled.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{PaymentContext, PaymentIntent};
use crate::api::VerificationApi;
use crate::config::VerificationConfig;
use crate::models::VerificationState;
use crate::session::TokenSource;
use crate::types::{AppError, AppResult};

/// Called once with the settled intent when verification succeeds
pub type OnVerified = Box<dyn FnOnce(&PaymentIntent, &VerificationState) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 10,
        }
    }
}

impl From<&VerificationConfig> for PollerConfig {
    fn from(config: &VerificationConfig) -> Self {
        Self {
            interval: config.interval(),
            max_attempts: config.max_attempts,
        }
    }
}

/// Progress notifications for whoever is showing the flow to the user
#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    /// The backend has not seen the funds yet
    Pending { attempt: u32, message: String },
    /// The request itself failed; counts against the budget
    Failed { attempt: u32, message: String },
    /// Funds received. Sent at most once.
    Verified { attempt: u32, state: VerificationState },
    /// Budget spent without confirmation
    Exhausted { attempts: u32 },
    /// No session token; nothing was sent
    Unauthenticated { message: String },
}

/// How a verification run ended
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Verified {
        state: VerificationState,
        attempts: u32,
    },
    /// Soft stop: the payment may still arrive later
    Exhausted {
        attempts: u32,
        last: Option<VerificationState>,
    },
    Unauthenticated,
    Cancelled {
        attempts: u32,
    },
}

impl PollOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            PollOutcome::Verified { attempts, .. }
            | PollOutcome::Exhausted { attempts, .. }
            | PollOutcome::Cancelled { attempts } => *attempts,
            PollOutcome::Unauthenticated => 0,
        }
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, PollOutcome::Verified { .. })
    }
}

/// Result of a single tick
#[derive(Debug, Clone, PartialEq)]
pub enum PollStep {
    Retry { next_attempt: u32, delay: Duration },
    Done(PollOutcome),
}

pub struct VerificationPoller {
    api: Arc<dyn VerificationApi>,
    tokens: Arc<dyn TokenSource>,
    context: PaymentContext,
    intent: PaymentIntent,
    config: PollerConfig,
    attempts: u32,
    outcome: Option<PollOutcome>,
    events: Option<mpsc::UnboundedSender<PollEvent>>,
    on_verified: Option<OnVerified>,
}

impl VerificationPoller {
    /// Build a poller for the intent currently held by `context`
    pub fn new(
        api: Arc<dyn VerificationApi>,
        tokens: Arc<dyn TokenSource>,
        context: PaymentContext,
        config: PollerConfig,
    ) -> AppResult<Self> {
        let intent = context
            .intent()
            .ok_or_else(|| AppError::InvalidInput("no pending payment to verify".to_string()))?;
        if config.max_attempts == 0 {
            return Err(AppError::InvalidInput("max_attempts must be at least 1".to_string()));
        }

        Ok(Self {
            api,
            tokens,
            context,
            intent,
            config,
            attempts: 0,
            outcome: None,
            events: None,
            on_verified: None,
        })
    }

    /// Register the success consumer
    pub fn on_verified<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&PaymentIntent, &VerificationState) + Send + Sync + 'static,
    {
        self.on_verified = Some(Box::new(f));
        self
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn outcome(&self) -> Option<&PollOutcome> {
        self.outcome.as_ref()
    }

    fn emit(&self, event: PollEvent) {
        if let Some(tx) = &self.events {
            // Receiver gone means nobody is watching; the run still completes.
            let _ = tx.send(event);
        }
    }

    fn finish(&mut self, outcome: PollOutcome) -> PollStep {
        self.outcome = Some(outcome.clone());
        PollStep::Done(outcome)
    }

    /// Perform at most one verification attempt.
    ///
    /// Once the run has reached a terminal state this returns that state again
    /// without contacting the backend.
    pub async fn tick(&mut self) -> PollStep {
        if let Some(outcome) = &self.outcome {
            debug!(reference = %self.intent.reference(), "Verification already finished, ignoring tick");
            return PollStep::Done(outcome.clone());
        }

        let token = match self.tokens.bearer_token().await {
            Ok(Some(token)) => token,
            Ok(None) => {
                warn!(reference = %self.intent.reference(), "No session token, verification not attempted");
                self.emit(PollEvent::Unauthenticated {
                    message: AppError::MissingAuth.user_message(),
                });
                return self.finish(PollOutcome::Unauthenticated);
            }
            Err(e) => {
                error!(reference = %self.intent.reference(), error = %e, "Could not read session token");
                self.emit(PollEvent::Unauthenticated { message: e.user_message() });
                return self.finish(PollOutcome::Unauthenticated);
            }
        };

        self.attempts += 1;
        let attempt = self.attempts;
        debug!(
            reference = %self.intent.reference(),
            attempt,
            max_attempts = self.config.max_attempts,
            "Verifying payment"
        );

        let result = self
            .api
            .verify_payment(self.intent.reference(), self.intent.amount(), &token)
            .await;

        match result {
            Ok(state) if state.success => {
                info!(reference = %self.intent.reference(), attempt, "Payment verified");
                self.context.record_attempt(attempt, None);
                let intent = self
                    .context
                    .settle(state.clone())
                    .unwrap_or_else(|| self.intent.clone());
                if let Some(notify) = self.on_verified.take() {
                    notify(&intent, &state);
                }
                self.emit(PollEvent::Verified { attempt, state: state.clone() });
                return self.finish(PollOutcome::Verified { state, attempts: attempt });
            }
            Ok(state) => {
                debug!(reference = %self.intent.reference(), attempt, message = %state.message, "Payment not yet received");
                self.context.record_attempt(attempt, Some(state.clone()));
                self.emit(PollEvent::Pending { attempt, message: state.message });
            }
            Err(e) => {
                warn!(reference = %self.intent.reference(), attempt, error = %e, "Verification request failed");
                self.context.record_attempt(attempt, None);
                self.emit(PollEvent::Failed { attempt, message: e.user_message() });
            }
        }

        if attempt >= self.config.max_attempts {
            info!(
                reference = %self.intent.reference(),
                attempts = attempt,
                "Verification attempts exhausted, payment still pending"
            );
            self.emit(PollEvent::Exhausted { attempts: attempt });
            let last = self.context.snapshot().verification;
            return self.finish(PollOutcome::Exhausted { attempts: attempt, last });
        }

        PollStep::Retry {
            next_attempt: attempt + 1,
            delay: self.config.interval,
        }
    }

    fn cancelled(&mut self) -> PollOutcome {
        info!(reference = %self.intent.reference(), attempts = self.attempts, "Verification torn down");
        let outcome = PollOutcome::Cancelled { attempts: self.attempts };
        self.outcome = Some(outcome.clone());
        outcome
    }

    /// Drive ticks with the fixed delay until a terminal state or until
    /// `cancel` flips to `true` (or its sender is dropped).
    pub async fn run(mut self, mut cancel: watch::Receiver<bool>) -> PollOutcome {
        info!(
            reference = %self.intent.reference(),
            amount = %self.intent.amount(),
            currency = %self.intent.source_currency(),
            interval_secs = self.config.interval.as_secs(),
            max_attempts = self.config.max_attempts,
            "Starting payment verification"
        );

        loop {
            let torn_down = *cancel.borrow();
            if torn_down {
                return self.cancelled();
            }

            let step = tokio::select! {
                step = self.tick() => Some(step),
                _ = cancel.changed() => None,
            };

            let delay = match step {
                None => return self.cancelled(),
                Some(PollStep::Done(outcome)) => return outcome,
                Some(PollStep::Retry { delay, .. }) => delay,
            };

            let woke = tokio::select! {
                _ = tokio::time::sleep(delay) => true,
                _ = cancel.changed() => false,
            };
            if !woke {
                return self.cancelled();
            }
        }
    }

    /// Run on the tokio runtime. The returned handle owns the scheduled
    /// attempts: cancelling or dropping it stops them.
    pub fn spawn(mut self) -> PollHandle {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.events = Some(event_tx);
        let context = self.context.clone();

        let task = tokio::spawn(self.run(cancel_rx));

        PollHandle {
            cancel: cancel_tx,
            events: event_rx,
            task: Some(task),
            context,
        }
    }
}

/// Owner of a running verification
pub struct PollHandle {
    cancel: watch::Sender<bool>,
    events: mpsc::UnboundedReceiver<PollEvent>,
    task: Option<JoinHandle<PollOutcome>>,
    context: PaymentContext,
}

impl PollHandle {
    /// Next progress event; `None` once the run has ended and all events
    /// have been read
    pub async fn next_event(&mut self) -> Option<PollEvent> {
        self.events.recv().await
    }

    pub fn context(&self) -> &PaymentContext {
        &self.context
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }

    /// Wait for the run to end on its own
    pub async fn wait(mut self) -> PollOutcome {
        self.join().await
    }

    /// Teardown: stop any scheduled attempt and return how far the run got
    pub async fn cancel(mut self) -> PollOutcome {
        let _ = self.cancel.send(true);
        self.join().await
    }

    async fn join(&mut self) -> PollOutcome {
        let attempts = self.context.attempts();
        match self.task.take() {
            Some(task) => match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(error = %e, "Verification task did not complete");
                    PollOutcome::Cancelled { attempts }
                }
            },
            None => PollOutcome::Cancelled { attempts },
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            let _ = self.cancel.send(true);
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::StaticToken;
    use crate::types::ApiErrorBody;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::time::Instant;

    #[derive(Clone, Copy)]
    enum Reply {
        Pending,
        Verified,
        ServerError,
    }

    /// Backend double that replays a script, then keeps answering `fallback`
    struct ScriptedApi {
        script: Mutex<VecDeque<Reply>>,
        fallback: Reply,
        calls: Mutex<Vec<Instant>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        latency: Duration,
    }

    impl ScriptedApi {
        fn new(script: Vec<Reply>, fallback: Reply) -> Arc<Self> {
            Self::with_latency(script, fallback, Duration::from_millis(200))
        }

        fn with_latency(script: Vec<Reply>, fallback: Reply, latency: Duration) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                fallback,
                calls: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                latency,
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl VerificationApi for ScriptedApi {
        async fn verify_payment(
            &self,
            reference: &str,
            amount: Decimal,
            token: &str,
        ) -> AppResult<VerificationState> {
            assert_eq!(reference, "REF123");
            assert_eq!(amount, dec!(100));
            assert_eq!(token, "tok");

            let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);
            self.calls.lock().unwrap().push(Instant::now());

            // simulated network latency
            tokio::time::sleep(self.latency).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let reply = self.script.lock().unwrap().pop_front().unwrap_or(self.fallback);
            match reply {
                Reply::Pending => Ok(VerificationState::pending("payment not yet received")),
                Reply::Verified => Ok(VerificationState::verified("verified")),
                Reply::ServerError => Err(AppError::Server(ApiErrorBody {
                    message: "upstream timeout".into(),
                    code: None,
                })),
            }
        }
    }

    /// Session that signs out after handing out the token `reads` times
    struct ExpiringToken {
        reads: AtomicUsize,
    }

    #[async_trait]
    impl TokenSource for ExpiringToken {
        async fn bearer_token(&self) -> AppResult<Option<String>> {
            let granted = self
                .reads
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            Ok(granted.then(|| "tok".to_string()))
        }
    }

    fn context() -> PaymentContext {
        PaymentContext::begin(PaymentIntent::new("REF123", dec!(100), "USD").unwrap())
    }

    fn poller(api: Arc<ScriptedApi>, token: StaticToken) -> VerificationPoller {
        VerificationPoller::new(api, Arc::new(token), context(), PollerConfig::default()).unwrap()
    }

    async fn drain(handle: &mut PollHandle) -> Vec<PollEvent> {
        let mut events = Vec::new();
        while let Some(event) = handle.next_event().await {
            events.push(event);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_settled_verifies_on_first_attempt() {
        let api = ScriptedApi::new(vec![], Reply::Verified);
        let mut handle = poller(api.clone(), StaticToken::new("tok")).spawn();

        let events = drain(&mut handle).await;
        let outcome = handle.wait().await;

        assert_eq!(
            outcome,
            PollOutcome::Verified { state: VerificationState::verified("verified"), attempts: 1 }
        );
        assert_eq!(api.call_count(), 1);
        assert_eq!(events.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_settles_stops_after_budget() {
        let api = ScriptedApi::new(vec![], Reply::Pending);
        let context = context();
        let poller = VerificationPoller::new(
            api.clone(),
            Arc::new(StaticToken::new("tok")),
            context.clone(),
            PollerConfig::default(),
        )
        .unwrap();
        let mut handle = poller.spawn();

        let events = drain(&mut handle).await;
        let outcome = handle.wait().await;

        assert_eq!(
            outcome,
            PollOutcome::Exhausted {
                attempts: 10,
                last: Some(VerificationState::pending("payment not yet received")),
            }
        );
        assert_eq!(api.call_count(), 10);
        assert_eq!(events.last(), Some(&PollEvent::Exhausted { attempts: 10 }));

        // 200ms of latency plus the fixed 5s delay between request starts
        let times = api.call_times();
        for pair in times.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap >= Duration::from_millis(5_200) && gap < Duration::from_millis(5_300), "gap was {gap:?}");
        }

        // soft stop: the intent is still there for a later manual check
        assert!(context.intent().is_some());
        assert_eq!(context.attempts(), 10);

        // nothing else fires afterwards
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(api.call_count(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_token_fails_without_request() {
        let api = ScriptedApi::new(vec![], Reply::Verified);
        let mut handle = poller(api.clone(), StaticToken::none()).spawn();

        let events = drain(&mut handle).await;
        let outcome = handle.wait().await;

        assert_eq!(outcome, PollOutcome::Unauthenticated);
        assert_eq!(api.call_count(), 0);
        assert!(matches!(events.as_slice(), [PollEvent::Unauthenticated { .. }]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_is_idempotent() {
        let api = ScriptedApi::new(vec![], Reply::Verified);
        let mut poller = poller(api.clone(), StaticToken::new("tok"));

        let first = poller.tick().await;
        assert!(matches!(first, PollStep::Done(PollOutcome::Verified { attempts: 1, .. })));

        let second = poller.tick().await;
        let third = poller.tick().await;
        assert_eq!(first, second);
        assert_eq!(second, third);
        assert_eq!(api.call_count(), 1);
        assert_eq!(poller.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_cancels_scheduled_attempt() {
        let api = ScriptedApi::new(vec![], Reply::Pending);
        let mut handle = poller(api.clone(), StaticToken::new("tok")).spawn();

        let first = handle.next_event().await;
        assert!(matches!(first, Some(PollEvent::Pending { attempt: 1, .. })));

        let outcome = handle.cancel().await;
        assert_eq!(outcome, PollOutcome::Cancelled { attempts: 1 });

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(api.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_interrupts_request_in_flight() {
        let api = ScriptedApi::with_latency(vec![], Reply::Verified, Duration::from_secs(30));
        let notified = Arc::new(AtomicUsize::new(0));
        let seen = notified.clone();
        let mut handle = poller(api.clone(), StaticToken::new("tok"))
            .on_verified(move |_, _| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .spawn();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(api.call_count(), 1);
        assert!(handle.events.try_recv().is_err());

        let outcome = handle.cancel().await;
        assert_eq!(outcome, PollOutcome::Cancelled { attempts: 1 });

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(api.call_count(), 1);
        assert_eq!(notified.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_ending_mid_run_stops_polling() {
        let api = ScriptedApi::new(vec![], Reply::Pending);
        let context = context();
        let poller = VerificationPoller::new(
            api.clone(),
            Arc::new(ExpiringToken { reads: AtomicUsize::new(3) }),
            context.clone(),
            PollerConfig::default(),
        )
        .unwrap();

        let mut handle = poller.spawn();
        let events = drain(&mut handle).await;
        let outcome = handle.wait().await;

        assert_eq!(outcome, PollOutcome::Unauthenticated);
        assert_eq!(api.call_count(), 3);
        assert_eq!(context.attempts(), 3);
        assert_eq!(events.len(), 4);
        assert!(matches!(&events[2], PollEvent::Pending { attempt: 3, .. }));
        assert!(matches!(events.last(), Some(PollEvent::Unauthenticated { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_stops_polling() {
        let api = ScriptedApi::new(vec![], Reply::Pending);
        let mut handle = poller(api.clone(), StaticToken::new("tok")).spawn();
        assert!(handle.next_event().await.is_some());

        drop(handle);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(api.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_consumer_notified_once_on_fourth_attempt() {
        let api = ScriptedApi::new(
            vec![Reply::Pending, Reply::Pending, Reply::Pending, Reply::Verified],
            Reply::Verified,
        );
        let notified = Arc::new(AtomicUsize::new(0));
        let seen = notified.clone();
        let context = context();

        let poller = VerificationPoller::new(
            api.clone(),
            Arc::new(StaticToken::new("tok")),
            context.clone(),
            PollerConfig::default(),
        )
        .unwrap()
        .on_verified(move |intent, state| {
            assert_eq!(intent.reference(), "REF123");
            assert_eq!(intent.source_currency(), "USD");
            assert_eq!(state.message, "verified");
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let mut handle = poller.spawn();
        let events = drain(&mut handle).await;
        let outcome = handle.wait().await;

        assert_eq!(notified.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.attempts(), 4);
        assert!(outcome.is_verified());
        assert_eq!(api.call_count(), 4);

        let verified: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, PollEvent::Verified { .. }))
            .collect();
        assert_eq!(verified.len(), 1);

        let state = context.snapshot();
        assert!(state.is_verified());
        assert!(state.intent.is_none());
        assert_eq!(state.attempts, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_errors_share_the_budget() {
        let api = ScriptedApi::new(vec![Reply::ServerError, Reply::ServerError], Reply::Pending);
        let config = PollerConfig { interval: Duration::from_secs(5), max_attempts: 3 };
        let poller = VerificationPoller::new(api.clone(), Arc::new(StaticToken::new("tok")), context(), config).unwrap();

        let mut handle = poller.spawn();
        let events = drain(&mut handle).await;
        let outcome = handle.wait().await;

        assert_eq!(outcome.attempts(), 3);
        assert!(matches!(outcome, PollOutcome::Exhausted { .. }));
        assert!(matches!(&events[0], PollEvent::Failed { attempt: 1, message } if !message.contains("upstream")));
        assert!(matches!(&events[1], PollEvent::Failed { attempt: 2, .. }));
        assert!(matches!(&events[2], PollEvent::Pending { attempt: 3, .. }));

        let times = api.call_times();
        assert!(times[1] - times[0] >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_never_overlap() {
        let api = ScriptedApi::new(vec![], Reply::Pending);
        let handle = poller(api.clone(), StaticToken::new("tok")).spawn();
        handle.wait().await;

        assert_eq!(api.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_requires_pending_intent() {
        let api = ScriptedApi::new(vec![], Reply::Verified);
        let result = VerificationPoller::new(
            api,
            Arc::new(StaticToken::new("tok")),
            PaymentContext::new(),
            PollerConfig::default(),
        );
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }
}
