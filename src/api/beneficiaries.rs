// Beneficiary management

use tracing::info;
use validator::Validate;

use super::ApiClient;
use crate::models::{Beneficiary, NewBeneficiary};
use crate::types::{AppError, AppResult};

impl ApiClient {
    pub async fn list_beneficiaries(&self, token: &str) -> AppResult<Vec<Beneficiary>> {
        self.get("beneficiaries", &[], Some(token)).await
    }

    pub async fn add_beneficiary(&self, beneficiary: &NewBeneficiary, token: &str) -> AppResult<Beneficiary> {
        beneficiary.validate()?;
        let created: Beneficiary = self.post("beneficiaries", beneficiary, Some(token), &[]).await?;
        info!(id = %created.id, currency = %created.currency, "Beneficiary added");
        Ok(created)
    }

    pub async fn remove_beneficiary(&self, id: &str, token: &str) -> AppResult<()> {
        if id.trim().is_empty() || id == "." || id == ".." {
            return Err(AppError::InvalidInput(format!("invalid beneficiary id '{}'", id)));
        }
        self.delete(&["beneficiaries", id], Some(token)).await?;
        info!(id = %id, "Beneficiary removed");
        Ok(())
    }
}
