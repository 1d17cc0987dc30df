//! Services module for checkout business logic

pub mod cod_eligibility;
pub mod coupon;
pub mod notification;
pub mod order_intake;
pub mod payment_verification;
pub mod pricing;
pub mod webhook_processor;

pub use cod_eligibility::CodEligibilityService;
pub use coupon::CouponService;
pub use notification::{LoggingNotifier, NotificationType, OrderNotifier};
pub use order_intake::OrderIntakeService;
pub use payment_verification::PaymentVerificationService;
pub use pricing::PricingService;
pub use webhook_processor::{WebhookOutcome, WebhookProcessor, WebhookProcessorError};
