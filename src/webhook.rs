//! Webhook signature validation.
//!
//! The chat transport adapter (out of scope) forwards inbound webhook
//! calls here before admitting them to the pipeline: when a shared secret
//! is configured, the HMAC-SHA256 of the raw body under that secret must
//! equal the value following the `sha256=` prefix in the
//! `X-Hub-Signature-256` header; the method must be `POST` and the
//! content type `application/json`. When no secret is configured,
//! validation is disabled and every method/content-type combination is
//! accepted.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PREFIX: &str = "sha256=";

/// The minimal request surface webhook validation needs; the transport
/// adapter supplies these fields however it parses its own request type.
#[derive(Debug, Clone, Copy)]
pub struct WebhookRequest<'a> {
    pub method: &'a str,
    pub content_type: &'a str,
    pub signature_header: Option<&'a str>,
    pub body: &'a [u8],
}

/// Validate an inbound webhook call against an optional shared secret.
///
/// Returns `true` when `secret` is `None` (validation disabled) or when
/// every documented check passes; `false` otherwise. Never panics on a
/// malformed signature header — a decode failure is just a rejection.
pub fn validate(request: &WebhookRequest, secret: Option<&str>) -> bool {
    let Some(secret) = secret else {
        return true;
    };

    if !request.method.eq_ignore_ascii_case("POST") {
        return false;
    }
    if !request.content_type.eq_ignore_ascii_case("application/json") {
        return false;
    }

    let Some(header) = request.signature_header else {
        return false;
    };
    let Some(hex_signature) = header.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let Some(signature_bytes) = decode_hex(hex_signature) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(request.body);
    mac.verify_slice(&signature_bytes).is_ok()
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Compute the `X-Hub-Signature-256` header value for `body` under
/// `secret`. Exposed for tests and for any caller that needs to sign its
/// own outbound webhook test fixtures.
pub fn sign(body: &[u8], secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts a key of any length");
    mac.update(body);
    format!("{SIGNATURE_PREFIX}{}", encode_hex(&mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_signature_over_the_exact_body_is_accepted() {
        let body = br#"{"query":"hi"}"#;
        let secret = "shared-secret";
        let signature = sign(body, secret);
        let request = WebhookRequest { method: "POST", content_type: "application/json", signature_header: Some(&signature), body };
        assert!(validate(&request, Some(secret)));
    }

    #[test]
    fn tampered_body_is_rejected() {
        let secret = "shared-secret";
        let signature = sign(b"original", secret);
        let request = WebhookRequest { method: "POST", content_type: "application/json", signature_header: Some(&signature), body: b"tampered" };
        assert!(!validate(&request, Some(secret)));
    }

    #[test]
    fn wrong_method_is_rejected_even_with_a_valid_signature() {
        let secret = "shared-secret";
        let body = b"payload";
        let signature = sign(body, secret);
        let request = WebhookRequest { method: "GET", content_type: "application/json", signature_header: Some(&signature), body };
        assert!(!validate(&request, Some(secret)));
    }

    #[test]
    fn wrong_content_type_is_rejected() {
        let secret = "shared-secret";
        let body = b"payload";
        let signature = sign(body, secret);
        let request = WebhookRequest { method: "POST", content_type: "text/plain", signature_header: Some(&signature), body };
        assert!(!validate(&request, Some(secret)));
    }

    #[test]
    fn no_configured_secret_disables_validation_entirely() {
        let request = WebhookRequest { method: "GET", content_type: "text/plain", signature_header: None, body: b"anything" };
        assert!(validate(&request, None));
    }

    #[test]
    fn missing_signature_header_is_rejected_when_a_secret_is_configured() {
        let request = WebhookRequest { method: "POST", content_type: "application/json", signature_header: None, body: b"payload" };
        assert!(!validate(&request, Some("secret")));
    }
}
