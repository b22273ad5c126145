use crate::{config::PaystackConfig, errors::ServiceError};
use hmac::{Hmac, Mac};
use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use std::time::Duration;
use tracing::{instrument, warn};

type HmacSha512 = Hmac<Sha512>;

/// The gateway transaction status string that marks a successful charge.
pub const GATEWAY_SUCCESS_STATUS: &str = "success";
/// The webhook event carrying a successful charge.
pub const CHARGE_SUCCESS_EVENT: &str = "charge.success";

/// Errors from the gateway adapter. `Unreachable` is the recoverable
/// "try again" class and is kept distinct from a gateway-level rejection,
/// which is in turn distinct from "payment declined" (a *successful* verify
/// call reporting an unsuccessful transaction — see the reconciliation
/// engine).
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("payment gateway is not configured")]
    NotConfigured,
    #[error("payment gateway unreachable: {0}")]
    Unreachable(String),
    #[error("payment gateway rejected the request: {0}")]
    Rejected(String),
    #[error("unexpected gateway response: {0}")]
    InvalidResponse(String),
}

impl From<GatewayError> for ServiceError {
    fn from(err: GatewayError) -> Self {
        ServiceError::GatewayUnavailable(err.to_string())
    }
}

/// Stateless client for the hosted-payment gateway REST API.
#[derive(Clone)]
pub struct PaystackClient {
    http: reqwest::Client,
    base_url: String,
    secret_key: Option<String>,
}

/// Metadata attached to a payment session and echoed back by the gateway on
/// verify and webhook. Reconciliation requires the echo to match exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSessionMetadata {
    pub order_id: i64,
    pub user_id: i64,
}

/// Request to open a hosted payment session.
#[derive(Debug, Serialize)]
pub struct InitializeRequest {
    pub email: String,
    /// Amount in minor units (kobo)
    pub amount: i64,
    /// Order payment reference; doubles as the gateway idempotency key
    pub reference: String,
    pub callback_url: String,
    pub metadata: PaymentSessionMetadata,
}

/// Gateway's view of a transaction, as returned by verify.
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionRecord {
    pub status: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GatewayEnvelope<T> {
    status: bool,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    authorization_url: String,
}

impl PaystackClient {
    pub fn new(config: &PaystackConfig) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client init failed: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
        })
    }

    fn secret(&self) -> Result<&str, GatewayError> {
        self.secret_key.as_deref().ok_or(GatewayError::NotConfigured)
    }

    /// Opens a hosted payment session and returns the authorization URL the
    /// customer must be redirected to.
    #[instrument(skip(self, request), fields(reference = %request.reference))]
    pub async fn initialize(&self, request: &InitializeRequest) -> Result<String, GatewayError> {
        let secret = self.secret()?;

        let response = self
            .http
            .post(format!("{}/transaction/initialize", self.base_url))
            .bearer_auth(secret)
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        if response.status().is_server_error() {
            return Err(GatewayError::Unreachable(format!(
                "gateway returned {}",
                response.status()
            )));
        }

        let envelope: GatewayEnvelope<InitializeData> = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        if !envelope.status {
            let message = envelope
                .message
                .unwrap_or_else(|| "payment initialization failed".to_string());
            warn!("Gateway refused to initialize transaction: {}", message);
            return Err(GatewayError::Rejected(message));
        }

        envelope
            .data
            .map(|d| d.authorization_url)
            .ok_or_else(|| GatewayError::InvalidResponse("missing authorization_url".to_string()))
    }

    /// Synchronous transaction lookup by reference.
    #[instrument(skip(self))]
    pub async fn verify(&self, reference: &str) -> Result<TransactionRecord, GatewayError> {
        let secret = self.secret()?;

        let response = self
            .http
            .get(format!("{}/transaction/verify/{}", self.base_url, reference))
            .bearer_auth(secret)
            .send()
            .await
            .map_err(transport_error)?;

        if response.status().is_server_error() {
            return Err(GatewayError::Unreachable(format!(
                "gateway returned {}",
                response.status()
            )));
        }

        let envelope: GatewayEnvelope<TransactionRecord> = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        if !envelope.status {
            let message = envelope
                .message
                .unwrap_or_else(|| "payment verification failed".to_string());
            return Err(GatewayError::Rejected(message));
        }

        envelope
            .data
            .ok_or_else(|| GatewayError::InvalidResponse("missing transaction data".to_string()))
    }

    /// Checks the HMAC-SHA512 signature the gateway puts on webhook bodies.
    pub fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> bool {
        match &self.secret_key {
            Some(secret) => verify_webhook_signature(secret, body, signature),
            None => false,
        }
    }
}

fn transport_error(err: reqwest::Error) -> GatewayError {
    GatewayError::Unreachable(err.to_string())
}

/// Converts a major-unit decimal amount into the gateway's minor units
/// (kobo). Truncates sub-kobo fractions; returns `None` on overflow.
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    (amount * Decimal::from(100)).trunc().to_i64()
}

/// Constant-time comparison of the hex-encoded HMAC-SHA512 of `body` against
/// the header-supplied signature.
pub fn verify_webhook_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(mut mac) = HmacSha512::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let expected = hex::encode(mac.finalize().into_bytes());
    constant_time_eq(&expected, signature)
}

/// Computes the signature a gateway would attach to `body`. Used by tests and
/// tooling to forge valid webhook deliveries.
pub fn sign_webhook_body(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha512::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn minor_units_conversion_is_exact_for_two_decimal_places() {
        assert_eq!(to_minor_units(dec!(2000.00)), Some(200_000));
        assert_eq!(to_minor_units(dec!(0.01)), Some(1));
        assert_eq!(to_minor_units(dec!(1500.50)), Some(150_050));
    }

    #[test]
    fn minor_units_conversion_truncates_sub_kobo_fractions() {
        assert_eq!(to_minor_units(dec!(10.999)), Some(1099));
    }

    #[test]
    fn webhook_signature_round_trip() {
        let secret = "sk_test_secret";
        let body = br#"{"event":"charge.success"}"#;
        let signature = sign_webhook_body(secret, body);
        assert!(verify_webhook_signature(secret, body, &signature));
    }

    #[test]
    fn webhook_signature_rejects_wrong_secret() {
        let body = br#"{"event":"charge.success"}"#;
        let signature = sign_webhook_body("sk_test_secret", body);
        assert!(!verify_webhook_signature("sk_other_secret", body, &signature));
    }

    #[test]
    fn webhook_signature_rejects_tampered_body() {
        let secret = "sk_test_secret";
        let signature = sign_webhook_body(secret, br#"{"amount":200000}"#);
        assert!(!verify_webhook_signature(secret, br#"{"amount":1}"#, &signature));
    }

    #[test]
    fn constant_time_eq_requires_equal_lengths() {
        assert!(!constant_time_eq("abc", "abcd"));
        assert!(constant_time_eq("abcd", "abcd"));
        assert!(!constant_time_eq("abcd", "abce"));
    }

    #[test]
    fn envelope_parses_initialize_response() {
        let json = r#"{
            "status": true,
            "message": "Authorization URL created",
            "data": { "authorization_url": "https://checkout.example/abc123" }
        }"#;
        let envelope: GatewayEnvelope<InitializeData> =
            serde_json::from_str(json).expect("parse envelope");
        assert!(envelope.status);
        assert_eq!(
            envelope.data.unwrap().authorization_url,
            "https://checkout.example/abc123"
        );
    }

    #[test]
    fn envelope_parses_verify_response() {
        let json = r#"{
            "status": true,
            "data": {
                "status": "success",
                "amount": 200000,
                "metadata": { "order_id": 12, "user_id": 7 }
            }
        }"#;
        let envelope: GatewayEnvelope<TransactionRecord> =
            serde_json::from_str(json).expect("parse envelope");
        let record = envelope.data.unwrap();
        assert_eq!(record.status, GATEWAY_SUCCESS_STATUS);
        assert_eq!(record.amount, 200_000);
        assert_eq!(record.metadata["order_id"], 12);
    }
}
