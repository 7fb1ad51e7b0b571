// Profile and tier upgrades

use tracing::info;
use validator::Validate;

use super::ApiClient;
use crate::models::{Profile, TierUpgradeRequest, TierUpgradeResponse};
use crate::types::AppResult;

impl ApiClient {
    pub async fn profile(&self, token: &str) -> AppResult<Profile> {
        self.get("profile", &[], Some(token)).await
    }

    /// Submit a tier upgrade. The current tier is fetched first so a
    /// downgrade or same-tier request never reaches the backend.
    pub async fn request_tier_upgrade(
        &self,
        request: &TierUpgradeRequest,
        token: &str,
    ) -> AppResult<TierUpgradeResponse> {
        request.validate()?;
        let current = self.profile(token).await?;
        request.check_against(current.tier)?;

        let response: TierUpgradeResponse = self
            .post("profile/tier-upgrade", request, Some(token), &[])
            .await?;
        info!(from = %current.tier, to = %request.tier, status = %response.status, "Tier upgrade submitted");
        Ok(response)
    }
}
