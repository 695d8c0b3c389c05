//! Purchase Flow
//!
//! price -> pending reservation -> payment hand-off. The pending record is
//! written before any payment is offered, so an out-of-band payment always
//! has something to activate. A successful purchase only ever reports
//! `awaitingConfirmation`; activation happens on payment confirmation.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use spendlocal_core::store::bounded;
use spendlocal_core::{
    Clock, NewSubscription, Owner, PlanType, PriceQuote, Subscription, SubscriptionStore, Term,
    quote_for,
};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::checkout::{CheckoutGateway, CheckoutRequest, CheckoutSession};
use crate::deeplink::{DeepLinkInitiator, DispatchOutcome};
use crate::error::{PaymentError, PurchaseError};

/// Payment rail chosen by the buyer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentRail {
    #[default]
    Venmo,
    Card,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    #[serde(rename = "adType")]
    pub plan_type: PlanType,
    pub term: Term,
    pub town: String,
    #[serde(default)]
    pub include_design: bool,
    #[serde(default)]
    pub rail: PaymentRail,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PurchaseStatus {
    AwaitingConfirmation,
}

/// What the buyer's client should do next
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "rail", rename_all = "camelCase")]
pub enum PaymentHandoff {
    Venmo { dispatch: DispatchOutcome },
    Card { session: CheckoutSession },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOutcome {
    pub subscription_id: String,
    pub status: PurchaseStatus,
    pub quote: PriceQuote,
    pub description: String,
    pub handoff: PaymentHandoff,
}

/// `"<Plan> Ad Space - <town> (<term>)[ with design]"`
pub fn payment_description(plan_type: PlanType, town: &str, term: Term, include_design: bool) -> String {
    let design = if include_design { " with design" } else { "" };
    format!("{} Ad Space - {town} ({term}){design}", plan_type.display_name())
}

pub struct PurchaseFlow {
    subscriptions: Arc<dyn SubscriptionStore>,
    deep_link: DeepLinkInitiator,
    checkout: Option<Arc<dyn CheckoutGateway>>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl PurchaseFlow {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        deep_link: DeepLinkInitiator,
        checkout: Option<Arc<dyn CheckoutGateway>>,
        clock: Arc<dyn Clock>,
        timeout: Duration,
    ) -> Self {
        Self {
            subscriptions,
            deep_link,
            checkout,
            clock,
            timeout,
        }
    }

    pub fn card_enabled(&self) -> bool {
        self.checkout.is_some()
    }

    pub async fn purchase(
        &self,
        owner: &dyn Owner,
        request: &PurchaseRequest,
    ) -> Result<PurchaseOutcome, PurchaseError> {
        let town = request.town.trim();
        if town.is_empty() {
            return Err(PurchaseError::Validation("town is required".into()));
        }
        let checkout = match request.rail {
            PaymentRail::Card => Some(self.checkout.clone().ok_or_else(|| {
                PurchaseError::Validation("card payments are not available".into())
            })?),
            PaymentRail::Venmo => None,
        };
        let quote = quote_for(request.plan_type, request.term, request.include_design)
            .map_err(|e| PurchaseError::Validation(e.user_message()))?
            .rounded();

        let subscription = Subscription::pending(
            Uuid::new_v4().to_string(),
            NewSubscription {
                owner_id: owner.owner_id().to_string(),
                plan_type: request.plan_type,
                term: request.term,
                town: town.to_string(),
                price: quote.total,
                design_service_included: request.include_design,
            },
            self.clock.now(),
        );

        bounded(self.timeout, self.subscriptions.create(&subscription))
            .await
            .map_err(|e| {
                error!(owner_id = owner.owner_id(), error = %e, "Could not reserve subscription");
                PurchaseError::Reservation(e)
            })?;
        info!(
            subscription_id = %subscription.id,
            owner = owner.display_name(),
            plan = request.plan_type.as_str(),
            term = request.term.as_str(),
            total = %quote.total,
            "Pending subscription reserved"
        );

        let description =
            payment_description(request.plan_type, town, request.term, request.include_design);
        let dispatch_failed = |source: PaymentError| {
            warn!(subscription_id = %subscription.id, error = %source, "Payment hand-off failed, reservation kept");
            PurchaseError::PaymentDispatch {
                subscription_id: subscription.id.clone(),
                source,
            }
        };

        let handoff = match checkout {
            None => {
                let dispatch = self
                    .deep_link
                    .dispatch(quote.total, &description)
                    .await
                    .map_err(dispatch_failed)?;
                if let DispatchOutcome::Failed { reason, .. } = &dispatch {
                    return Err(dispatch_failed(PaymentError::Dispatch(reason.clone())));
                }
                PaymentHandoff::Venmo { dispatch }
            }
            Some(gateway) => {
                let checkout_request = CheckoutRequest {
                    subscription_id: subscription.id.clone(),
                    owner_id: subscription.owner_id.clone(),
                    plan_type: subscription.plan_type,
                    term: subscription.term,
                    include_design: subscription.design_service_included,
                    town: subscription.town.clone(),
                    amount: quote.total,
                };
                let session = tokio::time::timeout(self.timeout, gateway.create_session(&checkout_request))
                    .await
                    .unwrap_or(Err(PaymentError::Timeout(self.timeout.as_secs())))
                    .map_err(dispatch_failed)?;
                PaymentHandoff::Card { session }
            }
        };

        Ok(PurchaseOutcome {
            subscription_id: subscription.id.clone(),
            status: PurchaseStatus::AwaitingConfirmation,
            quote,
            description,
            handoff,
        })
    }
}
