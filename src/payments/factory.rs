use crate::config::GatewayConfig;
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::PaymentGateway;
use crate::payments::providers::{RazorpayConfig, RazorpayGateway};
use std::sync::Arc;
use tracing::{info, warn};

/// Builds the configured gateway, if any
pub struct GatewayFactory;

impl GatewayFactory {
    pub fn from_config(config: &GatewayConfig) -> PaymentResult<Arc<dyn PaymentGateway>> {
        let razorpay = RazorpayConfig::from_gateway_config(config)?;
        if razorpay.webhook_secret.is_none() {
            warn!("GATEWAY_WEBHOOK_SECRET not set; gateway webhooks will be rejected");
        }
        let gateway = RazorpayGateway::new(razorpay)?;
        info!(gateway = gateway.name(), "payment gateway configured");
        Ok(Arc::new(gateway))
    }

    /// `None` when online payments are not set up; callers surface
    /// `GATEWAY_NOT_CONFIGURED` instead of failing at boot
    pub fn optional(config: &GatewayConfig) -> PaymentResult<Option<Arc<dyn PaymentGateway>>> {
        match Self::from_config(config) {
            Ok(gateway) => Ok(Some(gateway)),
            Err(PaymentError::NotConfigured) => {
                warn!("payment gateway keys not set; online payment disabled");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
