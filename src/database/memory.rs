//! In-memory stores used with `SKIP_EXTERNALS=true` and in tests.
//!
//! All tables sit behind one lock so `finalize` is a single critical section,
//! mirroring the row lock the Postgres implementation takes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::repository::{
    AddressStore, CartStore, Coupon, CouponStore, FinalizeOutcome, NewOrder, Order, OrderStore,
};
use crate::types::{
    cart_fingerprint, Address, CartLine, CategoryId, CustomerId, OrderStatus, ProductId,
};

/// Catalogue entry
#[derive(Debug, Clone)]
pub struct MemoryProduct {
    pub id: ProductId,
    pub name: String,
    pub category_id: CategoryId,
    pub price: Decimal,
    pub stock: i32,
    pub cod_allowed: bool,
}

#[derive(Debug, Clone)]
struct Redemption {
    coupon_id: Uuid,
    customer_id: CustomerId,
}

#[derive(Default)]
struct MemoryState {
    addresses: Vec<Address>,
    products: HashMap<ProductId, MemoryProduct>,
    cod_blocked_categories: HashSet<CategoryId>,
    carts: HashMap<CustomerId, Vec<(ProductId, i32)>>,
    coupons: HashMap<String, Coupon>,
    redemptions: Vec<Redemption>,
    orders: HashMap<String, Order>,
    order_items: HashMap<String, Vec<CartLine>>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_address(&self, address: Address) {
        self.state.write().await.addresses.push(address);
    }

    pub async fn remove_address(&self, address_id: Uuid) {
        self.state
            .write()
            .await
            .addresses
            .retain(|a| a.id != address_id);
    }

    pub async fn add_product(&self, product: MemoryProduct) -> ProductId {
        let id = product.id;
        self.state.write().await.products.insert(id, product);
        id
    }

    pub async fn set_price(&self, product_id: ProductId, price: Decimal) {
        if let Some(product) = self.state.write().await.products.get_mut(&product_id) {
            product.price = price;
        }
    }

    pub async fn block_cod_for_category(&self, category_id: CategoryId) {
        self.state
            .write()
            .await
            .cod_blocked_categories
            .insert(category_id);
    }

    /// Set a cart line; quantity 0 removes it
    pub async fn set_cart_quantity(&self, customer_id: CustomerId, product_id: ProductId, qty: i32) {
        let mut state = self.state.write().await;
        let cart = state.carts.entry(customer_id).or_default();
        cart.retain(|(pid, _)| *pid != product_id);
        if qty > 0 {
            cart.push((product_id, qty));
        }
    }

    pub async fn add_coupon(&self, coupon: Coupon) {
        self.state
            .write()
            .await
            .coupons
            .insert(coupon.code.to_uppercase(), coupon);
    }

    pub async fn stock(&self, product_id: ProductId) -> Option<i32> {
        self.state
            .read()
            .await
            .products
            .get(&product_id)
            .map(|p| p.stock)
    }

    pub async fn redemption_count(&self, code: &str) -> usize {
        let state = self.state.read().await;
        match state.coupons.get(&code.to_uppercase()) {
            Some(coupon) => state
                .redemptions
                .iter()
                .filter(|r| r.coupon_id == coupon.id)
                .count(),
            None => 0,
        }
    }

    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Overwrite the intent expiry of an order
    pub async fn expire_intent(&self, order_number: &str, at: DateTime<Utc>) {
        if let Some(order) = self.state.write().await.orders.get_mut(order_number) {
            order.intent_expires_at = Some(at);
        }
    }
}

fn priced_lines(state: &MemoryState, customer_id: CustomerId) -> Vec<CartLine> {
    state
        .carts
        .get(&customer_id)
        .map(|cart| {
            cart.iter()
                .filter_map(|(pid, qty)| {
                    state.products.get(pid).map(|p| CartLine {
                        product_id: p.id,
                        name: p.name.clone(),
                        category_id: p.category_id,
                        quantity: *qty,
                        unit_price: p.price,
                        cod_allowed: p.cod_allowed
                            && !state.cod_blocked_categories.contains(&p.category_id),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl AddressStore for MemoryStore {
    async fn list_for_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<Address>, DatabaseError> {
        Ok(self
            .state
            .read()
            .await
            .addresses
            .iter()
            .filter(|a| a.customer_id == customer_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CartStore for MemoryStore {
    async fn lines(&self, customer_id: CustomerId) -> Result<Vec<CartLine>, DatabaseError> {
        Ok(priced_lines(&*self.state.read().await, customer_id))
    }
}

#[async_trait]
impl CouponStore for MemoryStore {
    async fn find_by_code(&self, code: &str) -> Result<Option<Coupon>, DatabaseError> {
        Ok(self
            .state
            .read()
            .await
            .coupons
            .get(&code.to_uppercase())
            .cloned())
    }

    async fn total_redemptions(&self, coupon_id: Uuid) -> Result<i64, DatabaseError> {
        Ok(self
            .state
            .read()
            .await
            .redemptions
            .iter()
            .filter(|r| r.coupon_id == coupon_id)
            .count() as i64)
    }

    async fn customer_redemptions(
        &self,
        coupon_id: Uuid,
        customer_id: CustomerId,
    ) -> Result<i64, DatabaseError> {
        Ok(self
            .state
            .read()
            .await
            .redemptions
            .iter()
            .filter(|r| r.coupon_id == coupon_id && r.customer_id == customer_id)
            .count() as i64)
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert(&self, new_order: NewOrder) -> Result<Order, DatabaseError> {
        let mut state = self.state.write().await;
        if state.orders.contains_key(&new_order.order_number) {
            return Err(DatabaseError::new(DatabaseErrorKind::UniqueViolation {
                constraint: "orders_order_number_key".to_string(),
            }));
        }

        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4(),
            order_number: new_order.order_number.clone(),
            customer_id: new_order.customer_id,
            address_id: new_order.address_id,
            status: OrderStatus::Pending.to_db_status().to_string(),
            payment_method: new_order.payment_method.as_str().to_string(),
            payment_reference: None,
            payment_id: None,
            session_key: new_order.session_key,
            subtotal: new_order.pricing.subtotal,
            discount: new_order.pricing.discount,
            delivery_fee: new_order.pricing.delivery_fee,
            total: new_order.pricing.total,
            coupon_code: new_order.coupon_code,
            cart_fingerprint: cart_fingerprint(&new_order.items),
            intent_expires_at: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        };

        state
            .order_items
            .insert(order.order_number.clone(), new_order.items);
        state.orders.insert(order.order_number.clone(), order.clone());
        Ok(order)
    }

    async fn find_by_number(&self, order_number: &str) -> Result<Option<Order>, DatabaseError> {
        Ok(self.state.read().await.orders.get(order_number).cloned())
    }

    async fn find_by_gateway_order_id(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<Order>, DatabaseError> {
        Ok(self
            .state
            .read()
            .await
            .orders
            .values()
            .find(|o| o.payment_reference.as_deref() == Some(gateway_order_id))
            .cloned())
    }

    async fn find_pending_for_session(
        &self,
        customer_id: CustomerId,
        session_key: &str,
    ) -> Result<Option<Order>, DatabaseError> {
        Ok(self
            .state
            .read()
            .await
            .orders
            .values()
            .filter(|o| {
                o.customer_id == customer_id
                    && o.session_key.as_deref() == Some(session_key)
                    && o.status() == OrderStatus::Pending
                    && o.payment_method == "online"
            })
            .max_by_key(|o| o.created_at)
            .cloned())
    }

    async fn attach_intent(
        &self,
        order_number: &str,
        gateway_order_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Order, DatabaseError> {
        let mut state = self.state.write().await;
        let order = state
            .orders
            .get_mut(order_number)
            .ok_or_else(|| DatabaseError::not_found("order", order_number))?;
        order.payment_reference = Some(gateway_order_id.to_string());
        order.intent_expires_at = Some(expires_at);
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn finalize(
        &self,
        order_number: &str,
        payment_id: Option<&str>,
    ) -> Result<FinalizeOutcome, DatabaseError> {
        let mut state = self.state.write().await;
        let Some(current) = state.orders.get(order_number).cloned() else {
            return Ok(FinalizeOutcome::NotFound);
        };

        match current.status() {
            OrderStatus::Confirmed => {
                return Ok(if current.payment_id.as_deref() == payment_id {
                    FinalizeOutcome::AlreadyConfirmed(current)
                } else {
                    FinalizeOutcome::PaymentIdConflict(current)
                });
            }
            OrderStatus::Failed
                if payment_id.is_none() || current.payment_reference.is_none() =>
            {
                return Ok(FinalizeOutcome::NotPending(current));
            }
            OrderStatus::Failed | OrderStatus::Pending => {}
        }

        let items = state
            .order_items
            .get(order_number)
            .cloned()
            .unwrap_or_default();
        for item in &items {
            if let Some(product) = state.products.get_mut(&item.product_id) {
                product.stock -= item.quantity;
            }
        }

        if let Some(code) = current.coupon_code.as_ref() {
            if let Some(coupon_id) = state.coupons.get(&code.to_uppercase()).map(|c| c.id) {
                state.redemptions.push(Redemption {
                    coupon_id,
                    customer_id: current.customer_id,
                });
            }
        }

        let ordered: HashSet<ProductId> = items.iter().map(|i| i.product_id).collect();
        if let Some(cart) = state.carts.get_mut(&current.customer_id) {
            cart.retain(|(pid, _)| !ordered.contains(pid));
        }

        let order = state
            .orders
            .get_mut(order_number)
            .ok_or_else(|| DatabaseError::not_found("order", order_number))?;
        order.status = OrderStatus::Confirmed.to_db_status().to_string();
        order.payment_id = payment_id.map(str::to_string);
        order.updated_at = Utc::now();
        Ok(FinalizeOutcome::Confirmed(order.clone()))
    }

    async fn mark_failed(
        &self,
        order_number: &str,
        reason: &str,
    ) -> Result<Option<Order>, DatabaseError> {
        let mut state = self.state.write().await;
        match state.orders.get_mut(order_number) {
            Some(order) if order.status() == OrderStatus::Pending => {
                order.status = OrderStatus::Failed.to_db_status().to_string();
                order.last_error = Some(reason.to_string());
                order.updated_at = Utc::now();
                Ok(Some(order.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn record_rejection(
        &self,
        order_number: &str,
        reason: &str,
    ) -> Result<(), DatabaseError> {
        if let Some(order) = self.state.write().await.orders.get_mut(order_number) {
            order.last_error = Some(reason.to_string());
            order.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn confirmed_order_count(&self, customer_id: CustomerId) -> Result<i64, DatabaseError> {
        Ok(self
            .state
            .read()
            .await
            .orders
            .values()
            .filter(|o| o.customer_id == customer_id && o.status() == OrderStatus::Confirmed)
            .count() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PaymentMethod, PriceBreakdown};

    async fn seeded() -> (MemoryStore, CustomerId, ProductId) {
        let store = MemoryStore::new();
        let customer = Uuid::new_v4();
        let product = store
            .add_product(MemoryProduct {
                id: Uuid::new_v4(),
                name: "Basmati Rice 5kg".to_string(),
                category_id: Uuid::new_v4(),
                price: Decimal::from(300),
                stock: 10,
                cod_allowed: true,
            })
            .await;
        store.set_cart_quantity(customer, product, 2).await;
        (store, customer, product)
    }

    async fn insert_pending(store: &MemoryStore, customer: CustomerId) -> Order {
        let items = store.lines(customer).await.unwrap();
        store
            .insert(NewOrder {
                order_number: "ORD-20260101-AAAAAA".to_string(),
                customer_id: customer,
                address_id: Uuid::new_v4(),
                payment_method: PaymentMethod::Online,
                session_key: Some("session-1".to_string()),
                pricing: PriceBreakdown {
                    subtotal: Decimal::from(600),
                    discount: Decimal::ZERO,
                    delivery_fee: Decimal::ZERO,
                    total: Decimal::from(600),
                },
                coupon_code: None,
                items,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn cart_lines_are_priced_live() {
        let (store, customer, product) = seeded().await;
        store.set_price(product, Decimal::from(250)).await;

        let lines = store.lines(customer).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].unit_price, Decimal::from(250));
    }

    #[tokio::test]
    async fn blocked_category_disables_cod() {
        let (store, customer, _) = seeded().await;
        let category = store.lines(customer).await.unwrap()[0].category_id;
        store.block_cod_for_category(category).await;

        assert!(!store.lines(customer).await.unwrap()[0].cod_allowed);
    }

    #[tokio::test]
    async fn finalize_applies_side_effects_once() {
        let (store, customer, product) = seeded().await;
        let order = insert_pending(&store, customer).await;

        let first = store
            .finalize(&order.order_number, Some("pay_1"))
            .await
            .unwrap();
        assert!(matches!(first, FinalizeOutcome::Confirmed(_)));
        assert_eq!(store.stock(product).await, Some(8));
        assert!(store.lines(customer).await.unwrap().is_empty());

        let second = store
            .finalize(&order.order_number, Some("pay_1"))
            .await
            .unwrap();
        assert!(matches!(second, FinalizeOutcome::AlreadyConfirmed(_)));
        assert_eq!(store.stock(product).await, Some(8));

        let conflict = store
            .finalize(&order.order_number, Some("pay_2"))
            .await
            .unwrap();
        assert!(matches!(conflict, FinalizeOutcome::PaymentIdConflict(_)));
    }

    #[tokio::test]
    async fn failed_order_needs_a_gateway_payment_to_finalize() {
        let (store, customer, product) = seeded().await;
        let order = insert_pending(&store, customer).await;

        assert!(store
            .mark_failed(&order.order_number, "payment.failed")
            .await
            .unwrap()
            .is_some());
        assert!(store
            .mark_failed(&order.order_number, "again")
            .await
            .unwrap()
            .is_none());

        // No gateway order attached yet
        let outcome = store
            .finalize(&order.order_number, Some("pay_1"))
            .await
            .unwrap();
        assert!(matches!(outcome, FinalizeOutcome::NotPending(_)));
        assert_eq!(store.stock(product).await, Some(10));

        store
            .attach_intent(&order.order_number, "order_gw_1", Utc::now())
            .await
            .unwrap();
        let outcome = store.finalize(&order.order_number, None).await.unwrap();
        assert!(matches!(outcome, FinalizeOutcome::NotPending(_)));

        let outcome = store
            .finalize(&order.order_number, Some("pay_1"))
            .await
            .unwrap();
        assert!(matches!(outcome, FinalizeOutcome::Confirmed(_)));
        assert_eq!(store.stock(product).await, Some(8));
    }

    #[tokio::test]
    async fn finalize_keeps_lines_added_after_ordering() {
        let (store, customer, product) = seeded().await;
        let order = insert_pending(&store, customer).await;
        let later = store
            .add_product(MemoryProduct {
                id: Uuid::new_v4(),
                name: "Toor Dal 1kg".to_string(),
                category_id: Uuid::new_v4(),
                price: Decimal::from(180),
                stock: 5,
                cod_allowed: true,
            })
            .await;
        store.set_cart_quantity(customer, later, 1).await;

        store
            .finalize(&order.order_number, Some("pay_1"))
            .await
            .unwrap();

        let remaining = store.lines(customer).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].product_id, later);
        assert_eq!(store.stock(later).await, Some(5));
        assert_eq!(store.stock(product).await, Some(8));
    }

    #[tokio::test]
    async fn order_records_cart_fingerprint() {
        let (store, customer, _) = seeded().await;
        let lines = store.lines(customer).await.unwrap();
        let order = insert_pending(&store, customer).await;
        assert_eq!(order.cart_fingerprint, cart_fingerprint(&lines));
    }

    #[tokio::test]
    async fn pending_lookup_is_scoped_to_session() {
        let (store, customer, _) = seeded().await;
        insert_pending(&store, customer).await;

        assert!(store
            .find_pending_for_session(customer, "session-1")
            .await
            .unwrap()
            .is_some());
        assert!(store
            .find_pending_for_session(customer, "other")
            .await
            .unwrap()
            .is_none());
    }
}
