//! Stripe Webhook Handling
//!
//! Verifies the delivery against the raw body, ignores everything except
//! `checkout.session.completed`, recovers the subscription from the session
//! metadata and hands it to the [`SubscriptionActivator`].

use std::sync::Arc;

use rust_decimal::Decimal;
use spendlocal_core::{Clock, PaymentMethod, Term};
use stripe::{CheckoutSession, EventObject, EventType};
use tracing::{debug, info, warn};

use crate::activation::{ActivationOutcome, PaymentConfirmation, SubscriptionActivator};
use crate::checkout::metadata_keys;
use crate::error::{PaymentError, Result};
use crate::signature::verify_event;

/// What a delivery resulted in
#[derive(Clone, Debug, PartialEq)]
pub enum WebhookOutcome {
    /// Subscription activated and invoice written
    Activated {
        event_id: String,
        subscription_id: String,
        invoice_number: String,
    },

    /// Already applied earlier; acknowledged without changes
    Replayed {
        event_id: String,
        subscription_id: String,
    },

    /// Event type we do not act on
    Ignored { event_type: String },
}

/// Webhook handler
pub struct WebhookHandler {
    secret: String,
    activator: Arc<SubscriptionActivator>,
    clock: Arc<dyn Clock>,
}

impl WebhookHandler {
    pub fn new(
        secret: impl Into<String>,
        activator: Arc<SubscriptionActivator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            secret: secret.into(),
            activator,
            clock,
        }
    }

    /// Process one delivery. `payload` must be the unmodified request body.
    pub async fn handle(&self, payload: &[u8], signature: &str) -> Result<WebhookOutcome> {
        let event = verify_event(payload, signature, &self.secret, self.clock.now().timestamp())?;
        let event_id = event.id.to_string();
        info!(%event_id, event_type = %event.type_, "Processing Stripe webhook");

        let session = match (event.type_, event.data.object) {
            (EventType::CheckoutSessionCompleted, EventObject::CheckoutSession(session)) => session,
            (EventType::CheckoutSessionCompleted, _) => {
                return Err(PaymentError::WebhookParse(
                    "checkout.session.completed without a checkout session".into(),
                ));
            }
            (other, _) => {
                debug!(event_type = %other, "Unhandled webhook event");
                return Ok(WebhookOutcome::Ignored {
                    event_type: other.to_string(),
                });
            }
        };

        let confirmation = correlate(&session).inspect_err(|e| {
            warn!(%event_id, session_id = %session.id, error = %e, "Cannot correlate checkout session");
        })?;

        Ok(match self.activator.confirm(&confirmation).await? {
            ActivationOutcome::Activated { subscription, invoice } => WebhookOutcome::Activated {
                event_id,
                subscription_id: subscription.id,
                invoice_number: invoice.invoice_number,
            },
            ActivationOutcome::Replayed { subscription, .. } => WebhookOutcome::Replayed {
                event_id,
                subscription_id: subscription.id,
            },
        })
    }
}

/// Recover the pending subscription from session metadata
fn correlate(session: &CheckoutSession) -> Result<PaymentConfirmation> {
    let field = |key: &str| {
        session
            .metadata
            .as_ref()
            .and_then(|metadata| metadata.get(key))
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    };

    let subscription_id = field(metadata_keys::SUBSCRIPTION_ID)
        .ok_or_else(|| PaymentError::Correlation("metadata has no subscriptionId".into()))?;
    let owner_id = field(metadata_keys::USER_ID)
        .or_else(|| field(metadata_keys::OWNER_ID))
        .ok_or_else(|| PaymentError::Correlation("metadata has no userId".into()))?;
    let term: Term = field(metadata_keys::TERM)
        .ok_or_else(|| PaymentError::Correlation("metadata has no term".into()))?
        .parse()
        .map_err(|e| PaymentError::Correlation(format!("{e}")))?;
    let cents = session
        .amount_total
        .ok_or_else(|| PaymentError::WebhookParse("checkout session has no amount_total".into()))?;

    Ok(PaymentConfirmation {
        subscription_id: subscription_id.to_string(),
        owner_id: owner_id.to_string(),
        term: Some(term),
        amount: Decimal::new(cents, 2),
        payment_method: PaymentMethod::Card,
        payment_reference: session.id.to_string(),
    })
}
