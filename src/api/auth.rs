// Onboarding and sign-in

use tracing::info;
use validator::Validate;

use super::ApiClient;
use crate::models::{AuthToken, LoginRequest, RegisterRequest};
use crate::types::AppResult;

impl ApiClient {
    /// Create a new customer account and return its session token
    pub async fn register(&self, request: &RegisterRequest) -> AppResult<AuthToken> {
        request.validate()?;
        let token: AuthToken = self.post("auth/register", request, None, &[]).await?;
        info!(email = %request.email, "Account registered");
        Ok(token)
    }

    pub async fn login(&self, request: &LoginRequest) -> AppResult<AuthToken> {
        request.validate()?;
        let token: AuthToken = self.post("auth/login", request, None, &[]).await?;
        info!(email = %request.email, "Signed in");
        Ok(token)
    }
}
