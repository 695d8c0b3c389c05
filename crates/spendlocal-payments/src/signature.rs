//! Stripe-Signature verification
//!
//! Header format `t=<unix seconds>,v1=<hex hmac-sha256>`, signed over
//! `"<t>.<raw body>"` with the endpoint secret. The signed timestamp is
//! bounded against the injected clock before `stripe::Webhook` checks the
//! MAC and decodes the event.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use stripe::{Event, Webhook, WebhookError};

use crate::error::{PaymentError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Replay window, in seconds; `stripe::Webhook` enforces the same bound
pub const TOLERANCE_SECS: u64 = 300;

/// The `t=` value of the header; the last one wins, as in `stripe::Webhook`
fn signed_timestamp(header: &str) -> Result<i64> {
    header
        .split(',')
        .rev()
        .find_map(|part| part.strip_prefix("t="))
        .ok_or_else(|| PaymentError::WebhookSignature("missing timestamp".into()))?
        .parse()
        .map_err(|_| PaymentError::WebhookSignature("malformed timestamp".into()))
}

/// Verify `header` against the raw request body and decode the event.
///
/// `now` is the current unix time. A bad timestamp, secret or MAC is
/// `WebhookSignature`; a correctly signed body that is not a Stripe event
/// is `WebhookParse`.
pub fn verify_event(payload: &[u8], header: &str, secret: &str, now: i64) -> Result<Event> {
    let timestamp = signed_timestamp(header)?;
    if now.abs_diff(timestamp) > TOLERANCE_SECS {
        return Err(PaymentError::WebhookSignature(format!(
            "timestamp {timestamp} outside tolerance"
        )));
    }

    let payload = std::str::from_utf8(payload)
        .map_err(|_| PaymentError::WebhookSignature("payload is not UTF-8".into()))?;

    Webhook::construct_event_with_timestamp(payload, header, secret, now).map_err(|e| match e {
        WebhookError::BadParse(e) => PaymentError::WebhookParse(e.to_string()),
        other => PaymentError::WebhookSignature(other.to_string()),
    })
}

/// Build a header value the way Stripe signs a delivery
pub fn signature_header(payload: &[u8], secret: &str, timestamp: i64) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| PaymentError::Config(format!("invalid webhook secret: {e}")))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes())))
}
