use crate::payments::error::{PaymentError, PaymentResult};
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use sha2::Sha256;
use std::time::Duration;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// JSON client for gateway REST calls. Retries network failures, 429 and
/// 5xx with exponential backoff; other statuses fail immediately.
#[derive(Clone)]
pub struct PaymentHttpClient {
    gateway: &'static str,
    client: Client,
    max_retries: u32,
}

enum Attempt<T> {
    Done(PaymentResult<T>),
    Retry(PaymentError),
}

impl PaymentHttpClient {
    pub fn new(gateway: &'static str, timeout: Duration, max_retries: u32) -> PaymentResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PaymentError::NetworkError {
                message: format!("failed to initialize HTTP client: {}", e),
            })?;

        Ok(Self {
            gateway,
            client,
            max_retries,
        })
    }

    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        url: &str,
        authorization: &str,
        body: Option<&JsonValue>,
    ) -> PaymentResult<T> {
        let mut attempt = 0;
        loop {
            match self.send_once(method.clone(), url, authorization, body).await {
                Attempt::Done(result) => return result,
                Attempt::Retry(err) if attempt < self.max_retries => {
                    warn!(
                        gateway = self.gateway,
                        attempt = attempt + 1,
                        error = %err,
                        "gateway call failed, retrying"
                    );
                    tokio::time::sleep(backoff(attempt)).await;
                    attempt += 1;
                }
                Attempt::Retry(err) => return Err(err),
            }
        }
    }

    async fn send_once<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        url: &str,
        authorization: &str,
        body: Option<&JsonValue>,
    ) -> Attempt<T> {
        let mut request = self
            .client
            .request(method, url)
            .header(reqwest::header::AUTHORIZATION, authorization);
        if let Some(payload) = body {
            request = request.json(payload);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                return Attempt::Retry(PaymentError::NetworkError {
                    message: format!("{} request failed: {}", self.gateway, e),
                })
            }
        };

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if status.is_success() {
            return Attempt::Done(serde_json::from_str::<T>(&text).map_err(|e| {
                PaymentError::ProviderError {
                    gateway: self.gateway.to_string(),
                    message: format!("invalid JSON response: {}", e),
                    provider_code: None,
                    retryable: false,
                }
            }));
        }

        if status.as_u16() == 429 {
            return Attempt::Retry(PaymentError::RateLimitError {
                message: format!("{} rate limit exceeded", self.gateway),
                retry_after_seconds: None,
            });
        }

        let err = PaymentError::ProviderError {
            gateway: self.gateway.to_string(),
            message: format!("HTTP {}: {}", status, text),
            provider_code: Some(status.as_u16().to_string()),
            retryable: status.is_server_error(),
        };
        if status.is_server_error() {
            Attempt::Retry(err)
        } else {
            Attempt::Done(Err(err))
        }
    }
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(500u64 << attempt.min(5))
}

/// `Authorization` header value for HTTP basic auth
pub fn basic_auth_header(username: &str, password: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", username, password));
    format!("Basic {}", encoded)
}

pub fn hmac_sha256_hex(secret: &str, payload: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(payload);
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a hex HMAC-SHA256 signature
pub fn verify_hmac_sha256_hex(payload: &[u8], secret: &str, signature: &str) -> bool {
    match hmac_sha256_hex(secret, payload) {
        Some(computed) => secure_eq(
            computed.as_bytes(),
            signature.trim().to_lowercase().as_bytes(),
        ),
        None => false,
    }
}

pub fn secure_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0_u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secure_eq_behaves_correctly() {
        assert!(secure_eq(b"abc", b"abc"));
        assert!(!secure_eq(b"abc", b"abd"));
        assert!(!secure_eq(b"abc", b"ab"));
    }

    #[test]
    fn webhook_hmac_verification_detects_invalid_signature() {
        let payload = br#"{"event":"payment.captured"}"#;
        let valid = verify_hmac_sha256_hex(payload, "secret", "not-a-valid-signature");
        assert!(!valid);
    }

    #[test]
    fn hmac_round_trips_with_known_vector() {
        // RFC 4231 test case 2
        let signature = hmac_sha256_hex("Jefe", b"what do ya want for nothing?").unwrap();
        assert_eq!(
            signature,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
        assert!(verify_hmac_sha256_hex(
            b"what do ya want for nothing?",
            "Jefe",
            &signature.to_uppercase()
        ));
    }

    #[test]
    fn basic_auth_header_is_base64_encoded() {
        assert_eq!(
            basic_auth_header("rzp_test_key", "secret"),
            "Basic cnpwX3Rlc3Rfa2V5OnNlY3JldA=="
        );
    }
}
