//! Release-Status Checker (§2, consulted by §4.4 step 2): batched lookup of
//! "is this payment released yet?" from the marketplace, with a cache
//! fallback so a transient marketplace outage doesn't stall settlement.

use std::sync::Arc;

use thiserror::Error;

use crate::marketplace_client::{MarketplaceClient, MarketplaceClientError, MoneyReleaseStatus};
use crate::utils::cache::{Cache, CacheKey, CacheTier};

#[derive(Debug, Error)]
pub enum ReleaseStatusError {
    #[error(transparent)]
    Marketplace(#[from] MarketplaceClientError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseStatus {
    Pending,
    Released,
    Unknown,
}

pub struct ReleaseStatusChecker {
    marketplace: Arc<MarketplaceClient>,
    cache: Arc<Cache>,
}

impl ReleaseStatusChecker {
    pub fn new(marketplace: Arc<MarketplaceClient>, cache: Arc<Cache>) -> Self {
        Self { marketplace, cache }
    }

    /// Looks up the release status for a payment id, consulting the cache
    /// first (release status settles quickly and rarely flips back).
    pub async fn status_for(&self, seller_slug: &str, payment_id: &str) -> ReleaseStatus {
        let cache_key = CacheKey::new("release-status").with(seller_slug).with(payment_id).build();

        let result = self
            .cache
            .cached(CacheTier::ShortTerm, cache_key, async {
                match self.marketplace.get_payment(seller_slug, payment_id).await {
                    Ok(payment) => Ok::<_, MarketplaceClientError>(match payment.money_release_status {
                        Some(MoneyReleaseStatus::Released) => ReleaseStatus::Released,
                        Some(MoneyReleaseStatus::Pending) => ReleaseStatus::Pending,
                        // Marketplace didn't report a release status at all;
                        // don't infer one from money_release_date, which is
                        // populated long before funds actually clear (§4.4).
                        None => ReleaseStatus::Unknown,
                    }),
                    Err(e) => Err(e),
                }
            })
            .await;

        result.unwrap_or(ReleaseStatus::Unknown)
    }
}
