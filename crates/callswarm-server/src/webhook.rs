//! Webhook payload authenticity.
//!
//! When a shared secret is configured, inbound `/call-status` requests
//! must carry it in the `x-callswarm-signature` header. Verification is
//! constant-time over the full secret length.

use axum::http::HeaderMap;

/// Header carrying the shared secret.
pub const SIGNATURE_HEADER: &str = "x-callswarm-signature";

/// Check the signature header against the configured secret.
///
/// Returns true when no secret is configured (authenticity disabled) or
/// when the header matches. Comparison does not short-circuit on the
/// first mismatching byte.
pub fn verify_signature(headers: &HeaderMap, secret: Option<&str>) -> bool {
    let Some(secret) = secret else {
        return true;
    };
    let presented = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    constant_time_eq(presented.as_bytes(), secret.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(value: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(v) = value {
            let _ = headers.insert(SIGNATURE_HEADER, HeaderValue::from_str(v).unwrap());
        }
        headers
    }

    #[test]
    fn no_secret_accepts_everything() {
        assert!(verify_signature(&headers_with(None), None));
        assert!(verify_signature(&headers_with(Some("anything")), None));
    }

    #[test]
    fn matching_secret_accepts() {
        assert!(verify_signature(
            &headers_with(Some("s3cret")),
            Some("s3cret")
        ));
    }

    #[test]
    fn wrong_or_missing_header_rejects() {
        assert!(!verify_signature(
            &headers_with(Some("wrong")),
            Some("s3cret")
        ));
        assert!(!verify_signature(&headers_with(None), Some("s3cret")));
    }

    #[test]
    fn length_mismatch_rejects() {
        assert!(!verify_signature(
            &headers_with(Some("s3cret-longer")),
            Some("s3cret")
        ));
    }
}
