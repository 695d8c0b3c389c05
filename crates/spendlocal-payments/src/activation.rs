//! Subscription activation
//!
//! Applies a confirmed payment: compute the end date, flip the subscription
//! from pending to active, and record exactly one invoice for the payment
//! reference. Shared by the card-rail webhook and manual confirmation of
//! deep-link payments. Safe to run any number of times for one payment.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Serialize;
use spendlocal_core::store::bounded;
use spendlocal_core::{
    Activation, Clock, Insert, Invoice, InvoiceStore, PaymentMethod, Subscription,
    SubscriptionStore, Term,
};
use tracing::{info, warn};

use crate::error::{PaymentError, Result};

/// A payment the provider (or an operator) has confirmed
#[derive(Clone, Debug, PartialEq)]
pub struct PaymentConfirmation {
    pub subscription_id: String,
    pub owner_id: String,
    /// Term echoed by the provider; `None` uses the stored term
    pub term: Option<Term>,
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    /// Checkout session id or external payment reference
    pub payment_reference: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum ActivationOutcome {
    /// The invoice for this payment was written by this call
    Activated {
        subscription: Subscription,
        invoice: Invoice,
    },

    /// The payment had already been applied; nothing changed
    Replayed {
        subscription: Subscription,
        invoice: Invoice,
    },
}

impl ActivationOutcome {
    pub fn subscription(&self) -> &Subscription {
        match self {
            ActivationOutcome::Activated { subscription, .. }
            | ActivationOutcome::Replayed { subscription, .. } => subscription,
        }
    }

    pub fn invoice(&self) -> &Invoice {
        match self {
            ActivationOutcome::Activated { invoice, .. }
            | ActivationOutcome::Replayed { invoice, .. } => invoice,
        }
    }
}

pub struct SubscriptionActivator {
    subscriptions: Arc<dyn SubscriptionStore>,
    invoices: Arc<dyn InvoiceStore>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl SubscriptionActivator {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        invoices: Arc<dyn InvoiceStore>,
        clock: Arc<dyn Clock>,
        timeout: Duration,
    ) -> Self {
        Self {
            subscriptions,
            invoices,
            clock,
            timeout,
        }
    }

    /// Apply `confirmation`. Unknown subscriptions, owner or term mismatches
    /// are correlation failures and leave every record untouched, as does a
    /// non-positive amount (`InvalidAmount`).
    pub async fn confirm(&self, confirmation: &PaymentConfirmation) -> Result<ActivationOutcome> {
        let id = confirmation.subscription_id.as_str();
        let existing = bounded(self.timeout, self.subscriptions.get(id))
            .await?
            .ok_or_else(|| PaymentError::Correlation(format!("unknown subscription {id}")))?;

        if existing.owner_id != confirmation.owner_id {
            return Err(PaymentError::Correlation(format!(
                "subscription {id} does not belong to {}",
                confirmation.owner_id
            )));
        }
        let term = match confirmation.term {
            Some(term) if term != existing.term => {
                return Err(PaymentError::Correlation(format!(
                    "term {term} does not match subscription {id} ({})",
                    existing.term
                )));
            }
            Some(term) => term,
            None => existing.term,
        };
        if confirmation.amount <= Decimal::ZERO {
            return Err(PaymentError::InvalidAmount(format!(
                "non-positive payment amount {} for {id}",
                confirmation.amount
            )));
        }

        let now = self.clock.now();
        let end_date = term.end_date_from(now)?;

        let subscription = match bounded(self.timeout, self.subscriptions.activate(id, now, end_date)).await? {
            Activation::Activated(subscription) => {
                info!(
                    subscription_id = id,
                    end_date = %end_date,
                    "Subscription activated"
                );
                subscription
            }
            Activation::AlreadyActive(subscription) => subscription,
            Activation::Inactive(subscription) => {
                warn!(
                    subscription_id = id,
                    status = subscription.status.as_str(),
                    "Payment confirmed for an inactive subscription"
                );
                return Err(PaymentError::InvalidTransition(format!(
                    "subscription {id} is {}",
                    subscription.status.as_str()
                )));
            }
        };

        let invoice = Invoice::paid(
            &subscription.id,
            &subscription.owner_id,
            confirmation.amount.round_dp(2),
            confirmation.payment_method,
            &confirmation.payment_reference,
            now,
        );

        match bounded(self.timeout, self.invoices.insert_if_absent(&invoice)).await? {
            Insert::Inserted(invoice) => {
                info!(
                    subscription_id = id,
                    invoice_number = %invoice.invoice_number,
                    amount = %invoice.amount,
                    payment_method = invoice.payment_method.as_str(),
                    "Invoice recorded"
                );
                Ok(ActivationOutcome::Activated {
                    subscription,
                    invoice,
                })
            }
            Insert::Existing(invoice) => {
                info!(
                    subscription_id = id,
                    payment_reference = %confirmation.payment_reference,
                    "Payment already applied"
                );
                Ok(ActivationOutcome::Replayed {
                    subscription,
                    invoice,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use spendlocal_core::{
        FixedClock, MemoryStore, NewSubscription, PlanType, SubscriptionStatus,
    };

    struct Fixture {
        store: Arc<MemoryStore>,
        clock: Arc<FixedClock>,
        activator: SubscriptionActivator,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2025, 1, 10, 8, 0, 0).unwrap()));
        let pending = Subscription::pending(
            "sub_1",
            NewSubscription {
                owner_id: "user_1".into(),
                plan_type: PlanType::Standard,
                term: Term::Annual,
                town: "Westford".into(),
                price: dec!(5635),
                design_service_included: true,
            },
            clock.now(),
        );
        store.create(&pending).await.unwrap();

        let activator = SubscriptionActivator::new(
            store.clone(),
            store.clone(),
            clock.clone(),
            Duration::from_secs(1),
        );
        Fixture { store, clock, activator }
    }

    fn confirmation(reference: &str) -> PaymentConfirmation {
        PaymentConfirmation {
            subscription_id: "sub_1".into(),
            owner_id: "user_1".into(),
            term: Some(Term::Annual),
            amount: dec!(5635),
            payment_method: PaymentMethod::Card,
            payment_reference: reference.into(),
        }
    }

    #[tokio::test]
    async fn test_annual_activation_is_twelve_calendar_months() {
        let f = fixture().await;
        f.clock.set(Utc.with_ymd_and_hms(2024, 2, 29, 15, 0, 0).unwrap());
        let outcome = f.activator.confirm(&confirmation("cs_1")).await.unwrap();

        let sub = outcome.subscription();
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.start_date, Utc.with_ymd_and_hms(2024, 2, 29, 15, 0, 0).unwrap());
        assert_eq!(sub.end_date, Some(Utc.with_ymd_and_hms(2025, 2, 28, 15, 0, 0).unwrap()));
    }

    #[tokio::test]
    async fn test_replay_does_not_extend_or_duplicate() {
        let f = fixture().await;
        let first = f.activator.confirm(&confirmation("cs_1")).await.unwrap();
        assert!(matches!(first, ActivationOutcome::Activated { .. }));

        f.clock.advance(chrono::Duration::days(3));
        let second = f.activator.confirm(&confirmation("cs_1")).await.unwrap();
        assert!(matches!(second, ActivationOutcome::Replayed { .. }));
        assert_eq!(second.subscription().end_date, first.subscription().end_date);
        assert_eq!(second.invoice(), first.invoice());
        assert_eq!(f.store.invoice_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_deliveries_write_one_invoice() {
        let f = Arc::new(fixture().await);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let f = f.clone();
                tokio::spawn(async move { f.activator.confirm(&confirmation("cs_1")).await })
            })
            .collect();

        let mut activated = 0;
        for handle in handles {
            if let ActivationOutcome::Activated { .. } = handle.await.unwrap().unwrap() {
                activated += 1;
            }
        }
        assert_eq!(activated, 1);
        assert_eq!(f.store.invoice_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_subscription_is_correlation_failure() {
        let f = fixture().await;
        let mut c = confirmation("cs_x");
        c.subscription_id = "sub_missing".into();
        let err = f.activator.confirm(&c).await.unwrap_err();
        assert!(matches!(err, PaymentError::Correlation(_)));
        assert_eq!(f.store.invoice_count(), 0);
    }

    #[tokio::test]
    async fn test_zero_charge_is_invalid_amount() {
        let f = fixture().await;
        let mut c = confirmation("cs_zero");
        c.amount = Decimal::ZERO;
        let err = f.activator.confirm(&c).await.unwrap_err();
        assert!(matches!(err, PaymentError::InvalidAmount(_)));
        assert!(!err.is_retryable());

        let sub = f.store.get("sub_1").await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Pending);
        assert_eq!(f.store.invoice_count(), 0);
    }

    #[tokio::test]
    async fn test_owner_mismatch_mutates_nothing() {
        let f = fixture().await;
        let mut c = confirmation("cs_1");
        c.owner_id = "someone_else".into();
        assert!(matches!(
            f.activator.confirm(&c).await,
            Err(PaymentError::Correlation(_))
        ));
        let sub = f.store.get("sub_1").await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Pending);
        assert_eq!(f.store.invoice_count(), 0);
    }

    #[tokio::test]
    async fn test_manual_confirmation_uses_stored_term() {
        let f = fixture().await;
        let c = PaymentConfirmation {
            term: None,
            payment_method: PaymentMethod::Venmo,
            payment_reference: "venmo-3141".into(),
            ..confirmation("unused")
        };
        let outcome = f.activator.confirm(&c).await.unwrap();
        assert_eq!(outcome.invoice().payment_method, PaymentMethod::Venmo);
        assert_eq!(outcome.invoice().id, "pay_venmo-3141");
        assert!(outcome.subscription().end_date.is_some());
    }
}
