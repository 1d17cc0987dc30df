//! Payment gateway integration: hosted-checkout order creation, signature
//! checks and webhook parsing.

pub mod error;
pub mod factory;
pub mod provider;
pub mod providers;
pub mod types;
pub mod utils;

pub use error::{PaymentError, PaymentResult};
pub use factory::GatewayFactory;
pub use provider::PaymentGateway;
