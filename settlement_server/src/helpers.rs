use std::{net::IpAddr, str::FromStr};

use actix_web::HttpRequest;
use hmac::{Hmac, Mac};
use log::{debug, trace};
use regex::Regex;
use settlement_engine::events::{AuditEvent, EventProducers};
use sha2::Sha256;

/// Get the remote IP address from the request. It uses 3 sources to determine the IP address, in
/// decreasing order of preference:
/// 1. The `X-Forwarded-For` header, iif `use_x_forwarded_for` is set to true in the configuration.
/// 2. The `Forwarded` header, iif `use_forwarded` is set to true in the configuration.
/// 3. The peer address from the connection info.
pub fn get_remote_ip(req: &HttpRequest, use_x_forwarded_for: bool, use_forwarded: bool) -> Option<IpAddr> {
    let mut result = None;
    if use_x_forwarded_for {
        trace!("Checking X-Forwarded-For header");
        result =
            req.headers().get("X-Forwarded-For").and_then(|v| v.to_str().ok()).and_then(|s| IpAddr::from_str(s).ok());
        if let Some(ip) = result {
            debug!("Using X-Forwarded-For header for remote address: {ip}");
        }
    }
    if use_forwarded && result.is_none() {
        trace!("Checking Forwarded header");
        let re = Regex::new(r#"for=(?P<ip>[^;]+)"#).unwrap();
        result = req
            .headers()
            .get("Forwarded")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| re.captures(v))
            .and_then(|caps| caps.name("ip"))
            .map(|m| m.as_str())
            .and_then(|s| IpAddr::from_str(s).ok());
        if let Some(ip) = result {
            debug!("Using Forwarded header for remote address: {ip}");
        }
    }
    result.or_else(|| {
        let peer_addr = req.connection_info().peer_addr().map(|a| a.to_string());
        trace!("Using Peer address for remote address: {:?}", peer_addr);
        peer_addr.and_then(|s| IpAddr::from_str(&s).ok())
    })
}

/// Hands an audit event to every subscribed audit hook. Delivery problems are logged inside the
/// producer, so a dead audit sink never turns a completed financial transition into an error.
pub async fn publish_audit(producers: &EventProducers, event: AuditEvent) {
    for emitter in &producers.audit_producer {
        emitter.publish_event(event.clone()).await;
    }
}

/// The base64-encoded HMAC-SHA256 signature of `data` under `secret`. This is what the storefront
/// puts in the `x-msl-hmac-sha256` header when calling a webhook.
pub fn calculate_hmac(secret: &str, data: &[u8]) -> String {
    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(data);
    base64::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hmac_signature_matches_reference_vector() {
        // Generated with python's hmac module against the same key and body
        let sig = calculate_hmac("storefront-shared-secret", br#"{"order_id":"msl-1001"}"#);
        assert_eq!(sig, "wDDD/1R+ucn0goUa++mWasiYAYrb/qjVQOB+P8Uf3aA=");
    }

    #[test]
    fn hmac_signature_is_keyed() {
        let body = br#"{"order_id":"msl-1001"}"#;
        assert_ne!(calculate_hmac("storefront-shared-secret", body), calculate_hmac("another-secret", body));
        assert_ne!(
            calculate_hmac("storefront-shared-secret", body),
            calculate_hmac("storefront-shared-secret", br#"{"order_id":"msl-1002"}"#)
        );
    }
}
