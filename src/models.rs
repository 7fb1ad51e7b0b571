// Request and response contracts for the payments API

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::types::{AppError, AppResult};

// =============================================================================
// Onboarding
// =============================================================================

#[derive(Debug, Clone, Serialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, message = "first name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, message = "last name is required"))]
    pub last_name: String,
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 8, message = "must be at least 8 characters"))]
    pub password: String,
    #[validate(custom(function = "validate_country_code"))]
    pub country: String,
}

#[derive(Debug, Clone, Serialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthToken {
    pub token: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Beneficiaries
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Beneficiary {
    pub id: String,
    pub name: String,
    pub bank_name: String,
    pub account_number: String,
    pub currency: String,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Validate)]
pub struct NewBeneficiary {
    #[validate(length(min = 1, message = "beneficiary name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "bank name is required"))]
    pub bank_name: String,
    #[validate(length(min = 6, max = 34, message = "must be 6 to 34 characters"))]
    pub account_number: String,
    #[validate(custom(function = "validate_currency_code"))]
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

// =============================================================================
// Exchange rates
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub from: String,
    pub to: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub rate: Decimal,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub fee: Option<Decimal>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ExchangeRate {
    /// Amount the recipient receives for `amount` in the source currency.
    pub fn convert(&self, amount: Decimal) -> Decimal {
        (amount * self.rate).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    }
}

// =============================================================================
// Collection accounts and verification
// =============================================================================

#[derive(Debug, Clone, Serialize, Validate)]
pub struct CollectionRequest {
    #[validate(custom(function = "validate_positive_amount"))]
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    #[validate(custom(function = "validate_currency_code"))]
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beneficiary_id: Option<String>,
}

impl CollectionRequest {
    /// Build a request, normalizing the currency code the same way payment
    /// intents and rate lookups do
    pub fn new(amount: Decimal, currency: &str, beneficiary_id: Option<String>) -> AppResult<Self> {
        let request = Self {
            amount,
            currency: normalize_currency(currency)?,
            beneficiary_id,
        };
        request.validate()?;
        Ok(request)
    }
}

/// Temporary bank account the payer transfers funds into
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionAccount {
    pub reference: String,
    pub account_number: String,
    pub account_name: String,
    pub bank_name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub currency: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Outcome of one verification poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationState {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

impl VerificationState {
    pub fn verified(message: impl Into<String>) -> Self {
        Self { success: true, message: message.into() }
    }

    pub fn pending(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into() }
    }
}

// =============================================================================
// Profile and tiers
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Basic,
    Standard,
    Premium,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Basic => write!(f, "basic"),
            Tier::Standard => write!(f, "standard"),
            Tier::Premium => write!(f, "premium"),
        }
    }
}

impl std::str::FromStr for Tier {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "basic" => Ok(Tier::Basic),
            "standard" => Ok(Tier::Standard),
            "premium" => Ok(Tier::Premium),
            other => Err(AppError::InvalidInput(format!("unknown tier '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub tier: Tier,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub daily_limit: Option<Decimal>,
    #[serde(default)]
    pub verified: bool,
}

impl Profile {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Serialize, Validate)]
pub struct TierUpgradeRequest {
    pub tier: Tier,
    #[validate(length(min = 1, message = "document type is required"))]
    pub document_type: String,
    #[validate(length(min = 4, message = "document number looks too short"))]
    pub document_number: String,
}

impl TierUpgradeRequest {
    /// Upgrades must move to a strictly higher tier.
    pub fn check_against(&self, current: Tier) -> AppResult<()> {
        if self.tier <= current {
            return Err(AppError::InvalidInput(format!(
                "already on tier '{}', cannot upgrade to '{}'",
                current, self.tier
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierUpgradeResponse {
    pub status: String,
    #[serde(default)]
    pub message: String,
}

// =============================================================================
// Field validators
// =============================================================================

/// Trim and uppercase a currency code, rejecting anything but three letters
pub(crate) fn normalize_currency(code: &str) -> AppResult<String> {
    let normalized = code.trim().to_ascii_uppercase();
    if is_currency_code(&normalized) {
        Ok(normalized)
    } else {
        Err(AppError::InvalidInput(format!("'{}' is not a 3-letter currency code", code)))
    }
}

fn is_currency_code(code: &str) -> bool {
    code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase())
}

fn validate_currency_code(code: &str) -> Result<(), ValidationError> {
    if is_currency_code(code) {
        Ok(())
    } else {
        let mut err = ValidationError::new("currency");
        err.message = Some("must be a 3-letter ISO currency code".into());
        Err(err)
    }
}

fn validate_positive_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if *amount > Decimal::ZERO {
        Ok(())
    } else {
        let mut err = ValidationError::new("amount");
        err.message = Some("must be positive".into());
        Err(err)
    }
}

fn validate_country_code(code: &str) -> Result<(), ValidationError> {
    if code.len() == 2 && code.chars().all(|c| c.is_ascii_uppercase()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("country");
        err.message = Some("must be a 2-letter ISO country code".into());
        Err(err)
    }
}
