// Exchange-rate lookup

use tracing::debug;

use super::ApiClient;
use crate::models::{normalize_currency, ExchangeRate};
use crate::types::{AppError, AppResult};

impl ApiClient {
    /// Current rate for converting `from` into `to`. Public endpoint, no token.
    pub async fn exchange_rate(&self, from: &str, to: &str) -> AppResult<ExchangeRate> {
        let from = normalize_currency(from)?;
        let to = normalize_currency(to)?;

        let rate: ExchangeRate = self
            .get("rates", &[("from", from.clone()), ("to", to.clone())], None)
            .await?;

        if rate.from != from || rate.to != to {
            return Err(AppError::Decode(format!(
                "asked for {}/{} but received {}/{}",
                from, to, rate.from, rate.to
            )));
        }

        debug!(from = %from, to = %to, rate = %rate.rate, "Exchange rate fetched");
        Ok(rate)
    }
}
