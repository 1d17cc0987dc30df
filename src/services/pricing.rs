//! Server-side price computation from live cart lines

use rust_decimal::Decimal;

use crate::config::CheckoutConfig;
use crate::types::{cart_subtotal, CartLine, PriceBreakdown};

#[derive(Debug, Clone)]
pub struct PricingService {
    free_delivery_threshold: Decimal,
    delivery_fee: Decimal,
}

impl PricingService {
    pub fn new(config: &CheckoutConfig) -> Self {
        Self {
            free_delivery_threshold: config.free_delivery_threshold,
            delivery_fee: config.delivery_fee,
        }
    }

    pub fn delivery_fee_for(&self, subtotal: Decimal) -> Decimal {
        if subtotal > self.free_delivery_threshold {
            Decimal::ZERO
        } else {
            self.delivery_fee
        }
    }

    /// `total = subtotal - discount + delivery_fee`; the discount never exceeds the subtotal
    pub fn breakdown(&self, lines: &[CartLine], discount: Decimal) -> PriceBreakdown {
        let subtotal = cart_subtotal(lines);
        let discount = discount.max(Decimal::ZERO).min(subtotal);
        let delivery_fee = self.delivery_fee_for(subtotal);

        PriceBreakdown {
            subtotal,
            discount,
            delivery_fee,
            total: subtotal - discount + delivery_fee,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn lines(price: Decimal) -> Vec<CartLine> {
        vec![CartLine {
            product_id: Uuid::new_v4(),
            name: "Item".to_string(),
            category_id: Uuid::new_v4(),
            quantity: 1,
            unit_price: price,
            cod_allowed: true,
        }]
    }

    #[test]
    fn free_delivery_above_threshold() {
        let pricing = PricingService::new(&CheckoutConfig::default());
        let breakdown = pricing.breakdown(&lines(dec!(600)), dec!(100));

        assert_eq!(breakdown.delivery_fee, Decimal::ZERO);
        assert_eq!(breakdown.total, dec!(500));
    }

    #[test]
    fn flat_fee_at_or_below_threshold() {
        let pricing = PricingService::new(&CheckoutConfig::default());

        assert_eq!(pricing.breakdown(&lines(dec!(499)), Decimal::ZERO).total, dec!(539));
        assert_eq!(pricing.breakdown(&lines(dec!(400)), Decimal::ZERO).delivery_fee, dec!(40));
    }

    #[test]
    fn discount_is_clamped_to_subtotal() {
        let pricing = PricingService::new(&CheckoutConfig::default());
        let breakdown = pricing.breakdown(&lines(dec!(100)), dec!(250));

        assert_eq!(breakdown.discount, dec!(100));
        assert_eq!(breakdown.total, dec!(40));
    }
}
