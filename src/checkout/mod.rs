//! Client half of the checkout protocol
//!
//! UI-independent: the step machine, session persistence, the gateway window
//! and the submit flow talk to the server only through [`CheckoutApi`].

pub mod bridge;
pub mod client;
pub mod controller;
pub mod error;
pub mod flow;
pub mod session;
pub mod step;

pub use bridge::{GatewayOutcome, HostedCheckoutBridge, PaymentGatewayBridge, ScriptedBridge};
pub use client::{ApiError, CheckoutApi, HttpCheckoutApi};
pub use controller::StepController;
pub use error::{ChargeStatus, CheckoutError};
pub use flow::{CheckoutFlow, SubmitOutcome};
pub use session::{CheckoutSession, MemorySessionStore, SessionStore, StepNavigator, UrlNavigator};
pub use step::CheckoutStep;
