//! Payment Gateway Bridge
//!
//! Loads the hosted checkout SDK at most once and relays the customer's
//! interaction with the gateway window as a [`GatewayOutcome`].

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{info, warn};

use crate::payments::utils::hmac_sha256_hex;
use crate::types::{GatewayCheckoutOptions, GatewayPayload};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayOutcome {
    Success(GatewayPayload),
    /// The customer closed the gateway window
    Cancelled,
    SdkLoadFailed { reason: String },
}

#[async_trait]
pub trait PaymentGatewayBridge: Send + Sync {
    async fn open(&self, options: &GatewayCheckoutOptions) -> GatewayOutcome;
}

/// Host capability for the gateway's browser SDK
#[async_trait]
pub trait SdkLoader: Send + Sync {
    async fn inject(&self, script_url: &str) -> Result<(), String>;

    /// `Ok(None)` when the customer dismissed the window
    async fn present(
        &self,
        options: &GatewayCheckoutOptions,
    ) -> Result<Option<GatewayPayload>, String>;
}

pub struct HostedCheckoutBridge {
    loader: Arc<dyn SdkLoader>,
    script_url: String,
    loaded: OnceCell<()>,
}

impl HostedCheckoutBridge {
    pub fn new(loader: Arc<dyn SdkLoader>, script_url: impl Into<String>) -> Self {
        Self {
            loader,
            script_url: script_url.into(),
            loaded: OnceCell::new(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.initialized()
    }
}

#[async_trait]
impl PaymentGatewayBridge for HostedCheckoutBridge {
    async fn open(&self, options: &GatewayCheckoutOptions) -> GatewayOutcome {
        // A failed load leaves the cell empty so the next open retries
        let load = self
            .loaded
            .get_or_try_init(|| async {
                info!(script_url = %self.script_url, "loading gateway checkout SDK");
                self.loader.inject(&self.script_url).await
            })
            .await;
        if let Err(reason) = load {
            warn!(reason = %reason, "gateway SDK failed to load");
            return GatewayOutcome::SdkLoadFailed { reason };
        }

        match self.loader.present(options).await {
            Ok(Some(payload)) => GatewayOutcome::Success(payload),
            Ok(None) => {
                info!(order_number = %options.order_number, "gateway window dismissed");
                GatewayOutcome::Cancelled
            }
            Err(reason) => GatewayOutcome::SdkLoadFailed { reason },
        }
    }
}

/// Scripted customer behaviour for driving the flow without a browser
#[derive(Debug, Clone)]
pub enum ScriptedAction {
    /// Pay and sign the payload the way the gateway does with `key_secret`
    Pay {
        payment_id: String,
        key_secret: String,
    },
    Dismiss,
    FailLoad { reason: String },
}

#[derive(Default)]
pub struct ScriptedBridge {
    actions: Mutex<VecDeque<ScriptedAction>>,
    opened: Mutex<Vec<GatewayCheckoutOptions>>,
}

impl ScriptedBridge {
    pub fn new(actions: impl IntoIterator<Item = ScriptedAction>) -> Self {
        Self {
            actions: Mutex::new(actions.into_iter().collect()),
            opened: Mutex::new(Vec::new()),
        }
    }

    pub async fn push(&self, action: ScriptedAction) {
        self.actions.lock().await.push_back(action);
    }

    /// Options of every window opened so far
    pub async fn opened(&self) -> Vec<GatewayCheckoutOptions> {
        self.opened.lock().await.clone()
    }
}

#[async_trait]
impl PaymentGatewayBridge for ScriptedBridge {
    async fn open(&self, options: &GatewayCheckoutOptions) -> GatewayOutcome {
        self.opened.lock().await.push(options.clone());

        match self.actions.lock().await.pop_front() {
            Some(ScriptedAction::Pay {
                payment_id,
                key_secret,
            }) => {
                let signed = format!("{}|{}", options.gateway_order_id, payment_id);
                match hmac_sha256_hex(&key_secret, signed.as_bytes()) {
                    Some(signature) => GatewayOutcome::Success(GatewayPayload {
                        gateway_order_id: options.gateway_order_id.clone(),
                        payment_id,
                        signature,
                    }),
                    None => GatewayOutcome::SdkLoadFailed {
                        reason: "could not sign scripted payment".to_string(),
                    },
                }
            }
            Some(ScriptedAction::FailLoad { reason }) => GatewayOutcome::SdkLoadFailed { reason },
            Some(ScriptedAction::Dismiss) | None => GatewayOutcome::Cancelled,
        }
    }
}
