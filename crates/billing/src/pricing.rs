//! Price comparison for plan changes

use std::sync::Arc;

use crate::error::{BillingError, BillingResult};
use crate::gateway::ProviderGateway;

/// Direction of a plan change, decided purely on unit amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceChange {
    Upgrade,
    Downgrade,
    Lateral,
}

/// Resolves two price ids and classifies the move between them.
#[derive(Clone)]
pub struct PriceComparator {
    gateway: Arc<dyn ProviderGateway>,
}

impl PriceComparator {
    pub fn new(gateway: Arc<dyn ProviderGateway>) -> Self {
        Self { gateway }
    }

    /// Compare the new price against the current one. Strictly greater
    /// amounts are upgrades; equal amounts are lateral and handled like
    /// downgrades (there is no proration benefit to applying them now).
    pub async fn classify(
        &self,
        current_price_id: &str,
        new_price_id: &str,
    ) -> BillingResult<PriceChange> {
        let current = self.gateway.get_price(current_price_id).await?;
        let new = self.gateway.get_price(new_price_id).await?;

        let current_amount = current
            .unit_amount
            .ok_or_else(|| BillingError::PriceNotFound(current.id.clone()))?;
        let new_amount = new
            .unit_amount
            .ok_or_else(|| BillingError::PriceNotFound(new.id.clone()))?;

        tracing::debug!(
            current_price_id,
            new_price_id,
            current_amount,
            new_amount,
            "Classifying price change"
        );

        Ok(match new_amount.cmp(&current_amount) {
            std::cmp::Ordering::Greater => PriceChange::Upgrade,
            std::cmp::Ordering::Less => PriceChange::Downgrade,
            std::cmp::Ordering::Equal => PriceChange::Lateral,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockGateway;
    use crate::types::Price;

    fn comparator(mock: MockGateway) -> PriceComparator {
        PriceComparator::new(Arc::new(mock))
    }

    fn price(id: &str, amount: Option<i64>) -> Price {
        Price {
            id: id.to_string(),
            unit_amount: amount,
            currency: "brl".to_string(),
        }
    }

    #[tokio::test]
    async fn higher_amount_is_an_upgrade() {
        let mock = MockGateway::new();
        mock.add_price(price("price_basic", Some(1000)));
        mock.add_price(price("price_pro", Some(2500)));

        let change = comparator(mock)
            .classify("price_basic", "price_pro")
            .await
            .unwrap();
        assert_eq!(change, PriceChange::Upgrade);
    }

    #[tokio::test]
    async fn lower_amount_is_a_downgrade() {
        let mock = MockGateway::new();
        mock.add_price(price("price_pro", Some(2500)));
        mock.add_price(price("price_basic", Some(1000)));

        let change = comparator(mock)
            .classify("price_pro", "price_basic")
            .await
            .unwrap();
        assert_eq!(change, PriceChange::Downgrade);
    }

    #[tokio::test]
    async fn equal_amount_is_lateral() {
        let mock = MockGateway::new();
        mock.add_price(price("price_a", Some(1500)));
        mock.add_price(price("price_b", Some(1500)));

        let change = comparator(mock)
            .classify("price_a", "price_b")
            .await
            .unwrap();
        assert_eq!(change, PriceChange::Lateral);
    }

    #[tokio::test]
    async fn unknown_price_is_not_found() {
        let mock = MockGateway::new();
        mock.add_price(price("price_basic", Some(1000)));

        let err = comparator(mock)
            .classify("price_basic", "price_missing")
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::PriceNotFound(id) if id == "price_missing"));
    }

    #[tokio::test]
    async fn price_without_amount_is_not_found() {
        let mock = MockGateway::new();
        mock.add_price(price("price_metered", None));
        mock.add_price(price("price_basic", Some(1000)));

        let err = comparator(mock)
            .classify("price_metered", "price_basic")
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::PriceNotFound(id) if id == "price_metered"));
    }
}
