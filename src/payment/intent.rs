// Pending payment awaiting verification

use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::{normalize_currency, CollectionAccount};
use crate::types::{AppError, AppResult};

/// What the payer was asked to transfer, keyed by the collection reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentIntent {
    reference: String,
    amount: Decimal,
    source_currency: String,
}

impl PaymentIntent {
    pub fn new(
        reference: impl Into<String>,
        amount: Decimal,
        source_currency: impl Into<String>,
    ) -> AppResult<Self> {
        let reference = reference.into().trim().to_string();

        if reference.is_empty() {
            return Err(AppError::InvalidInput("payment reference must not be empty".to_string()));
        }
        if amount <= Decimal::ZERO {
            return Err(AppError::InvalidInput(format!("amount must be positive, got {}", amount)));
        }
        let source_currency = normalize_currency(&source_currency.into())?;

        Ok(Self { reference, amount, source_currency })
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn source_currency(&self) -> &str {
        &self.source_currency
    }
}

impl TryFrom<&CollectionAccount> for PaymentIntent {
    type Error = AppError;

    fn try_from(account: &CollectionAccount) -> AppResult<Self> {
        PaymentIntent::new(account.reference.clone(), account.amount, account.currency.clone())
    }
}

impl std::fmt::Display for PaymentIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} (ref {})", self.amount, self.source_currency, self.reference)
    }
}
