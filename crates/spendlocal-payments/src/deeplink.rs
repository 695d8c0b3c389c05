//! Venmo Deep-Link Rail
//!
//! Builds the `venmo://paycharge` app URI and its web fallback, then hands
//! them to an [`AppLauncher`]. Launching never confirms payment; the
//! subscription stays pending until it is reconciled.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{PaymentError, Result};

/// Characters left intact by `encodeURIComponent`
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// App URI plus web fallback for one payment
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeepLink {
    pub app_uri: String,
    pub web_uri: String,
}

impl DeepLink {
    /// Build both URIs for `amount` paid to `handle` (leading `@` optional)
    pub fn build(amount: Decimal, description: &str, handle: &str) -> Result<Self> {
        if amount <= Decimal::ZERO {
            return Err(PaymentError::Dispatch(format!(
                "payment amount must be positive, got {amount}"
            )));
        }
        let recipient = handle.trim().trim_start_matches('@');
        if recipient.is_empty() {
            return Err(PaymentError::Config("payee handle is empty".into()));
        }

        let mut fixed = amount.round_dp(2);
        fixed.rescale(2);
        let note = utf8_percent_encode(description, COMPONENT);
        let recipient_enc = utf8_percent_encode(recipient, COMPONENT);

        Ok(Self {
            app_uri: format!(
                "venmo://paycharge?txn=pay&recipients={recipient_enc}&amount={fixed}&note={note}"
            ),
            web_uri: format!("https://venmo.com/{recipient_enc}?txn=pay&amount={fixed}&note={note}"),
        })
    }
}

/// Something able to open a URI on the payer's side
#[async_trait]
pub trait AppLauncher: Send + Sync {
    /// `Ok(true)` when the URI was taken by a handler
    async fn open(&self, uri: &str) -> Result<bool>;
}

/// Launcher for HTTP callers.
///
/// The server cannot see whether the payer's device has the Venmo app, so it
/// hands over the `venmo://` URI and always reports `Dispatched`. The client
/// owns the fallback: it navigates to `webUri` from the same response when
/// the app does not open. `FallbackUsed` and `Failed` only come from
/// launchers that can observe the device.
#[derive(Clone, Copy, Debug, Default)]
pub struct ClientHandoff;

#[async_trait]
impl AppLauncher for ClientHandoff {
    async fn open(&self, uri: &str) -> Result<bool> {
        Ok(uri.starts_with("venmo://"))
    }
}

/// Result of a deep-link dispatch
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum DispatchOutcome {
    /// The native app URI was accepted
    Dispatched { link: DeepLink },

    /// The app was unavailable; the web URL was used instead
    FallbackUsed { link: DeepLink },

    /// Neither URI could be opened
    Failed { link: DeepLink, reason: String },
}

impl DispatchOutcome {
    pub fn link(&self) -> &DeepLink {
        match self {
            DispatchOutcome::Dispatched { link }
            | DispatchOutcome::FallbackUsed { link }
            | DispatchOutcome::Failed { link, .. } => link,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, DispatchOutcome::Failed { .. })
    }
}

/// Deep-link payment initiator
pub struct DeepLinkInitiator {
    launcher: Arc<dyn AppLauncher>,
    handle: String,
    timeout: Duration,
}

impl DeepLinkInitiator {
    pub fn new(launcher: Arc<dyn AppLauncher>, handle: impl Into<String>, timeout: Duration) -> Self {
        Self {
            launcher,
            handle: handle.into(),
            timeout,
        }
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    /// Try the app URI, then the web URI. Each attempt is bounded by the timeout.
    pub async fn dispatch(&self, amount: Decimal, description: &str) -> Result<DispatchOutcome> {
        let link = DeepLink::build(amount, description, &self.handle)?;

        match self.try_open(&link.app_uri).await {
            Ok(()) => {
                debug!(uri = %link.app_uri, "Venmo app link dispatched");
                return Ok(DispatchOutcome::Dispatched { link });
            }
            Err(reason) => debug!(%reason, "Venmo app unavailable, trying web fallback"),
        }

        match self.try_open(&link.web_uri).await {
            Ok(()) => Ok(DispatchOutcome::FallbackUsed { link }),
            Err(reason) => {
                warn!(%reason, "Venmo web fallback failed");
                Ok(DispatchOutcome::Failed { link, reason })
            }
        }
    }

    async fn try_open(&self, uri: &str) -> std::result::Result<(), String> {
        match tokio::time::timeout(self.timeout, self.launcher.open(uri)).await {
            Ok(Ok(true)) => Ok(()),
            Ok(Ok(false)) => Err("no handler accepted the link".into()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("launcher timed out after {}s", self.timeout.as_secs())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    /// Accepts only URIs with the given prefix
    struct PrefixLauncher(&'static str);

    #[async_trait]
    impl AppLauncher for PrefixLauncher {
        async fn open(&self, uri: &str) -> Result<bool> {
            Ok(uri.starts_with(self.0))
        }
    }

    struct HangingLauncher;

    #[async_trait]
    impl AppLauncher for HangingLauncher {
        async fn open(&self, _uri: &str) -> Result<bool> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(true)
        }
    }

    fn initiator(launcher: impl AppLauncher + 'static) -> DeepLinkInitiator {
        DeepLinkInitiator::new(Arc::new(launcher), "@SpendLocal", Duration::from_millis(50))
    }

    #[test]
    fn test_build_encodes_note_and_fixes_amount() {
        let link = DeepLink::build(
            dec!(5635),
            "Standard Ad Space - North Andover (annual) with design",
            "@SpendLocal",
        )
        .unwrap();
        assert_eq!(
            link.app_uri,
            "venmo://paycharge?txn=pay&recipients=SpendLocal&amount=5635.00\
             &note=Standard%20Ad%20Space%20-%20North%20Andover%20(annual)%20with%20design"
        );
        assert!(link.web_uri.starts_with("https://venmo.com/SpendLocal?txn=pay&amount=5635.00&note="));
    }

    #[test]
    fn test_build_rounds_to_cents() {
        let link = DeepLink::build(dec!(949.99905), "x", "SpendLocal").unwrap();
        assert!(link.app_uri.contains("amount=950.00"));
    }

    #[test]
    fn test_build_rejects_non_positive_amount() {
        assert!(DeepLink::build(Decimal::ZERO, "x", "@SpendLocal").is_err());
        assert!(DeepLink::build(dec!(10), "x", "@").is_err());
    }

    #[tokio::test]
    async fn test_client_handoff_leaves_fallback_to_client() {
        let outcome = initiator(ClientHandoff).dispatch(dec!(1000), "Premium").await.unwrap();
        let DispatchOutcome::Dispatched { link } = outcome else {
            panic!("expected Dispatched, got {outcome:?}");
        };
        assert!(link.app_uri.starts_with("venmo://"));
        assert!(link.web_uri.starts_with("https://venmo.com/SpendLocal"));

        assert!(ClientHandoff.open(&link.app_uri).await.unwrap());
        assert!(!ClientHandoff.open(&link.web_uri).await.unwrap());
    }

    #[tokio::test]
    async fn test_dispatch_falls_back_to_web() {
        let outcome = initiator(PrefixLauncher("https://"))
            .dispatch(dec!(350), "Mini")
            .await
            .unwrap();
        assert!(matches!(outcome, DispatchOutcome::FallbackUsed { .. }));
    }

    #[tokio::test]
    async fn test_dispatch_reports_failure() {
        let outcome = initiator(PrefixLauncher("ftp://"))
            .dispatch(dec!(350), "Mini")
            .await
            .unwrap();
        assert!(outcome.is_failed());
    }

    #[tokio::test]
    async fn test_dispatch_never_hangs() {
        let outcome = initiator(HangingLauncher).dispatch(dec!(550), "Standard").await.unwrap();
        match outcome {
            DispatchOutcome::Failed { reason, .. } => assert!(reason.contains("timed out")),
            other => panic!("expected Failed, got {other:?}"),
        }
    }
}
