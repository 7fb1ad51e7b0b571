// Collection accounts and payment verification

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{debug, info};
use validator::Validate;

use super::ApiClient;
use crate::models::{CollectionAccount, CollectionRequest, VerificationState};
use crate::types::{AppError, AppResult};

/// The single question the verification poller asks of the backend
#[async_trait]
pub trait VerificationApi: Send + Sync {
    async fn verify_payment(
        &self,
        reference: &str,
        amount: Decimal,
        token: &str,
    ) -> AppResult<VerificationState>;
}

impl ApiClient {
    /// Request a temporary account the payer transfers funds into.
    ///
    /// Each call carries a fresh idempotency key so a retried submit does not
    /// open a second account.
    pub async fn create_collection_account(
        &self,
        request: &CollectionRequest,
        token: &str,
    ) -> AppResult<CollectionAccount> {
        request.validate()?;
        let idempotency_key = uuid::Uuid::new_v4().to_string();

        let account: CollectionAccount = self
            .post(
                "payments/collection-account",
                request,
                Some(token),
                &[("Idempotency-Key", idempotency_key)],
            )
            .await?;

        if account.reference.trim().is_empty() {
            return Err(AppError::Decode("collection account has an empty reference".to_string()));
        }

        info!(
            reference = %account.reference,
            amount = %account.amount,
            currency = %account.currency,
            "Collection account created"
        );
        Ok(account)
    }
}

#[async_trait]
impl VerificationApi for ApiClient {
    async fn verify_payment(
        &self,
        reference: &str,
        amount: Decimal,
        token: &str,
    ) -> AppResult<VerificationState> {
        let state: VerificationState = self
            .get(
                "payments/verify",
                &[("reference", reference.to_string()), ("amount", amount.normalize().to_string())],
                Some(token),
            )
            .await?;
        debug!(reference = %reference, success = state.success, "Verification response");
        Ok(state)
    }
}
