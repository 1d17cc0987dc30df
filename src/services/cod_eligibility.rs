use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::cache::keys::checkout::CodEligibilityKey;
use crate::cache::RedisCache;
use crate::database::repository::CartStore;
use crate::error::{AppError, AppResult, DomainError};
use crate::types::{cart_fingerprint, CartLine, CodEligibility, CustomerId};

const ELIGIBILITY_TTL: Duration = Duration::from_secs(300);

/// Pure decision over a cart snapshot
pub fn check(lines: &[CartLine]) -> CodEligibility {
    let disqualifying_items: Vec<String> = lines
        .iter()
        .filter(|l| !l.cod_allowed)
        .map(|l| l.name.clone())
        .collect();

    CodEligibility {
        eligible: disqualifying_items.is_empty(),
        disqualifying_items,
        cart_fingerprint: cart_fingerprint(lines),
    }
}

pub struct CodEligibilityService {
    carts: Arc<dyn CartStore>,
    cache: Option<RedisCache>,
}

impl CodEligibilityService {
    pub fn new(carts: Arc<dyn CartStore>, cache: Option<RedisCache>) -> Self {
        Self { carts, cache }
    }

    /// Decide for the customer's current cart. Cached per cart fingerprint,
    /// so any cart change produces a fresh decision.
    pub async fn check_for_customer(&self, customer_id: CustomerId) -> AppResult<CodEligibility> {
        let lines = self.carts.lines(customer_id).await?;
        if lines.is_empty() {
            return Err(AppError::domain(DomainError::EmptyCart));
        }

        let key = CodEligibilityKey::new(customer_id, cart_fingerprint(&lines));
        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get_or_warn::<CodEligibility>(&key).await {
                debug!(customer_id = %customer_id, "COD eligibility served from cache");
                return Ok(cached);
            }
        }

        let decision = check(&lines);
        info!(
            customer_id = %customer_id,
            eligible = decision.eligible,
            disqualifying = decision.disqualifying_items.len(),
            "COD eligibility evaluated"
        );

        if let Some(cache) = &self.cache {
            cache.set_or_warn(&key, &decision, Some(ELIGIBILITY_TTL)).await;
        }
        Ok(decision)
    }

    /// Business rejection when the snapshot is not COD-eligible
    pub fn ensure_eligible(lines: &[CartLine]) -> AppResult<CodEligibility> {
        let decision = check(lines);
        if decision.eligible {
            Ok(decision)
        } else {
            Err(AppError::domain(DomainError::CodNotEligible {
                disqualifying_items: decision.disqualifying_items,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::{MemoryProduct, MemoryStore};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn line(name: &str, cod_allowed: bool) -> CartLine {
        CartLine {
            product_id: Uuid::new_v4(),
            name: name.to_string(),
            category_id: Uuid::new_v4(),
            quantity: 1,
            unit_price: Decimal::from(100),
            cod_allowed,
        }
    }

    #[test]
    fn all_allowed_items_are_eligible() {
        let decision = check(&[line("Atta 5kg", true), line("Sugar 1kg", true)]);
        assert!(decision.eligible);
        assert!(decision.disqualifying_items.is_empty());
    }

    #[test]
    fn disqualifying_items_are_listed() {
        let decision = check(&[line("Atta 5kg", true), line("Gold Coin", false)]);
        assert!(!decision.eligible);
        assert_eq!(decision.disqualifying_items, vec!["Gold Coin".to_string()]);

        let err = CodEligibilityService::ensure_eligible(&[line("Gold Coin", false)]).unwrap_err();
        assert_eq!(err.error_code(), crate::error::ErrorCode::CodNotEligible);
    }

    #[tokio::test]
    async fn category_block_is_reflected_for_customer() {
        let store = MemoryStore::new();
        let customer = Uuid::new_v4();
        let category = Uuid::new_v4();
        let product = store
            .add_product(MemoryProduct {
                id: Uuid::new_v4(),
                name: "Gift Card".to_string(),
                category_id: category,
                price: Decimal::from(500),
                stock: 100,
                cod_allowed: true,
            })
            .await;
        store.set_cart_quantity(customer, product, 1).await;
        store.block_cod_for_category(category).await;

        let service = CodEligibilityService::new(Arc::new(store), None);
        let decision = service.check_for_customer(customer).await.unwrap();
        assert!(!decision.eligible);
        assert_eq!(decision.disqualifying_items, vec!["Gift Card".to_string()]);
    }
}
