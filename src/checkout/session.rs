//! Recoverable checkout session state and URL mirroring

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use crate::checkout::step::CheckoutStep;
use crate::types::{AddressId, AppliedCoupon, PaymentMethod};

pub const SESSION_KEY: &str = "checkout.session_key";
pub const SELECTED_ADDRESS_KEY: &str = "checkout.selected_address_id";
pub const SELECTED_PAYMENT_METHOD_KEY: &str = "checkout.selected_payment_method";
pub const APPLIED_COUPON_KEY: &str = "checkout.applied_coupon";

const ALL_KEYS: [&str; 4] = [
    SESSION_KEY,
    SELECTED_ADDRESS_KEY,
    SELECTED_PAYMENT_METHOD_KEY,
    APPLIED_COUPON_KEY,
];

/// Key/value storage that survives a reload
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn set(&self, key: &str, value: String);
    async fn remove(&self, key: &str);
}

#[derive(Default)]
pub struct MemorySessionStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, key: &str) -> Option<String> {
        self.entries.read().await.get(key).cloned()
    }

    async fn set(&self, key: &str, value: String) {
        self.entries.write().await.insert(key.to_string(), value);
    }

    async fn remove(&self, key: &str) {
        self.entries.write().await.remove(key);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Lets Order Intake recognise a retry from the same checkout
    pub session_key: String,
    pub selected_address_id: Option<AddressId>,
    pub selected_payment_method: Option<PaymentMethod>,
    pub applied_coupon: Option<AppliedCoupon>,
    pub current_step: CheckoutStep,
}

impl CheckoutSession {
    pub fn new() -> Self {
        Self {
            session_key: Uuid::new_v4().to_string(),
            selected_address_id: None,
            selected_payment_method: None,
            applied_coupon: None,
            current_step: CheckoutStep::Address,
        }
    }

    /// Rebuild from storage. Unreadable entries are dropped rather than
    /// failing the restore. `current_step` comes from the URL, not storage.
    pub async fn load(store: &dyn SessionStore) -> Option<Self> {
        let session_key = store.get(SESSION_KEY).await?;

        let selected_address_id = store
            .get(SELECTED_ADDRESS_KEY)
            .await
            .and_then(|raw| parse_entry(SELECTED_ADDRESS_KEY, raw.parse::<Uuid>().ok()));
        let selected_payment_method = store
            .get(SELECTED_PAYMENT_METHOD_KEY)
            .await
            .and_then(|raw| {
                parse_entry(SELECTED_PAYMENT_METHOD_KEY, raw.parse::<PaymentMethod>().ok())
            });
        let applied_coupon = store
            .get(APPLIED_COUPON_KEY)
            .await
            .and_then(|raw| parse_entry(APPLIED_COUPON_KEY, serde_json::from_str(&raw).ok()));

        Some(Self {
            session_key,
            selected_address_id,
            selected_payment_method,
            applied_coupon,
            current_step: CheckoutStep::Address,
        })
    }

    pub async fn persist(&self, store: &dyn SessionStore) {
        store.set(SESSION_KEY, self.session_key.clone()).await;

        match self.selected_address_id {
            Some(id) => store.set(SELECTED_ADDRESS_KEY, id.to_string()).await,
            None => store.remove(SELECTED_ADDRESS_KEY).await,
        }
        match self.selected_payment_method {
            Some(method) => {
                store
                    .set(SELECTED_PAYMENT_METHOD_KEY, method.as_str().to_string())
                    .await
            }
            None => store.remove(SELECTED_PAYMENT_METHOD_KEY).await,
        }
        match self
            .applied_coupon
            .as_ref()
            .and_then(|c| serde_json::to_string(c).ok())
        {
            Some(coupon) => store.set(APPLIED_COUPON_KEY, coupon).await,
            None => store.remove(APPLIED_COUPON_KEY).await,
        }
    }

    pub async fn clear(store: &dyn SessionStore) {
        for key in ALL_KEYS {
            store.remove(key).await;
        }
    }
}

impl Default for CheckoutSession {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_entry<T>(key: &str, parsed: Option<T>) -> Option<T> {
    if parsed.is_none() {
        warn!(key = key, "discarding unreadable checkout session entry");
    }
    parsed
}

/// Where the current step is mirrored for back/forward and reload
#[async_trait]
pub trait StepNavigator: Send + Sync {
    /// Step named in the current location, if any
    async fn current_step(&self) -> Option<CheckoutStep>;
    async fn show_step(&self, step: CheckoutStep);
    async fn navigate_to_confirmation(&self, order_number: &str);
}

/// Navigator over a `?step=` query parameter with an in-memory history
pub struct UrlNavigator {
    base_path: String,
    history: RwLock<Vec<String>>,
}

impl UrlNavigator {
    pub fn new(base_path: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            history: RwLock::new(Vec::new()),
        }
    }

    /// Start at an existing location, as after a reload
    pub fn at(base_path: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            history: RwLock::new(vec![location.into()]),
        }
    }

    pub async fn location(&self) -> Option<String> {
        self.history.read().await.last().cloned()
    }

    pub async fn history(&self) -> Vec<String> {
        self.history.read().await.clone()
    }

    fn step_url(&self, step: CheckoutStep) -> String {
        format!("{}?step={}", self.base_path, step)
    }
}

fn step_from_location(location: &str) -> Option<CheckoutStep> {
    let (_, query) = location.split_once('?')?;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, _)| *name == "step")
        .and_then(|(_, value)| value.parse().ok())
}

#[async_trait]
impl StepNavigator for UrlNavigator {
    async fn current_step(&self) -> Option<CheckoutStep> {
        let location = self.location().await?;
        step_from_location(&location)
    }

    async fn show_step(&self, step: CheckoutStep) {
        let url = self.step_url(step);
        let mut history = self.history.write().await;
        if history.last() != Some(&url) {
            history.push(url);
        }
    }

    async fn navigate_to_confirmation(&self, order_number: &str) {
        self.history
            .write()
            .await
            .push(format!("/orders/{}/confirmation", order_number));
    }
}
