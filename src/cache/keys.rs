//! Type-safe cache key builders

use std::fmt;

pub const VERSION: &str = "v1";

pub mod checkout {
    use super::*;
    use crate::types::CustomerId;

    pub const NAMESPACE: &str = "checkout";

    /// COD decision for one exact cart; a changed cart yields a new key
    #[derive(Debug, Clone)]
    pub struct CodEligibilityKey {
        pub customer_id: CustomerId,
        pub cart_fingerprint: String,
    }

    impl CodEligibilityKey {
        pub fn new(customer_id: CustomerId, cart_fingerprint: impl Into<String>) -> Self {
            Self {
                customer_id,
                cart_fingerprint: cart_fingerprint.into(),
            }
        }
    }

    impl fmt::Display for CodEligibilityKey {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(
                f,
                "{}:{}:cod:{}:{}",
                VERSION, NAMESPACE, self.customer_id, self.cart_fingerprint
            )
        }
    }
}

pub mod webhook {
    use super::*;

    pub const NAMESPACE: &str = "webhook";

    /// Marks a gateway webhook delivery as already processed
    #[derive(Debug, Clone)]
    pub struct ProcessedEventKey {
        pub event_id: String,
    }

    impl ProcessedEventKey {
        pub fn new(event_id: impl Into<String>) -> Self {
            Self {
                event_id: event_id.into(),
            }
        }
    }

    impl fmt::Display for ProcessedEventKey {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}:{}:processed:{}", VERSION, NAMESPACE, self.event_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_cod_eligibility_key() {
        let customer = Uuid::nil();
        let key = checkout::CodEligibilityKey::new(customer, "abc123");
        assert_eq!(
            key.to_string(),
            "v1:checkout:cod:00000000-0000-0000-0000-000000000000:abc123"
        );
    }

    #[test]
    fn test_processed_event_key() {
        let key = webhook::ProcessedEventKey::new("evt_123");
        assert_eq!(key.to_string(), "v1:webhook:processed:evt_123");
    }
}
