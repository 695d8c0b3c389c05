//! Stripe Checkout Integration
//!
//! Card rail: a one-off `payment`-mode hosted checkout session per
//! subscription. The session metadata is the only link back to the pending
//! subscription, so its keys are shared with the webhook side.

use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use spendlocal_core::{PlanType, Term};
use stripe::{
    CheckoutSession as StripeCheckoutSession, CheckoutSessionMode, Client, CreateCheckoutSession,
    CreateCheckoutSessionLineItems, CreateCheckoutSessionLineItemsPriceData,
    CreateCheckoutSessionLineItemsPriceDataProductData, CreateCheckoutSessionPaymentMethodTypes,
    Currency,
};
use tracing::info;

use crate::error::{PaymentError, Result};

/// Metadata keys echoed back on `checkout.session.completed`
pub mod metadata_keys {
    pub const SUBSCRIPTION_ID: &str = "subscriptionId";
    pub const USER_ID: &str = "userId";
    /// Accepted on read for sessions created by other clients
    pub const OWNER_ID: &str = "ownerId";
    pub const AD_TYPE: &str = "adType";
    pub const TERM: &str = "term";
    pub const INCLUDE_DESIGN: &str = "includeDesign";
    pub const TOWN: &str = "town";
}

/// Request to create a checkout session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub subscription_id: String,

    #[serde(rename = "userId", alias = "ownerId")]
    pub owner_id: String,

    #[serde(rename = "adType")]
    pub plan_type: PlanType,

    pub term: Term,

    pub include_design: bool,

    pub town: String,

    /// Total to charge in dollars
    pub amount: Decimal,
}

impl CheckoutRequest {
    pub fn product_name(&self) -> String {
        format!("{} Ad Space - {}", self.plan_type.display_name(), self.town)
    }

    pub fn product_description(&self) -> String {
        let design = if self.include_design { " with design services" } else { "" };
        format!("{} subscription{design}", self.term)
    }

    /// Charge in integer cents, `round(amount * 100)`
    pub fn unit_amount(&self) -> Result<i64> {
        if self.amount <= Decimal::ZERO {
            return Err(PaymentError::InvalidAmount(format!(
                "checkout amount must be positive, got {}",
                self.amount
            )));
        }
        (self.amount * Decimal::ONE_HUNDRED)
            .round()
            .to_i64()
            .ok_or_else(|| PaymentError::InvalidAmount(format!("amount {} out of range", self.amount)))
    }

    pub fn metadata(&self) -> HashMap<String, String> {
        use metadata_keys::{AD_TYPE, INCLUDE_DESIGN, SUBSCRIPTION_ID, TERM, TOWN, USER_ID};
        HashMap::from([
            (SUBSCRIPTION_ID.to_string(), self.subscription_id.clone()),
            (USER_ID.to_string(), self.owner_id.clone()),
            (AD_TYPE.to_string(), self.plan_type.as_str().to_string()),
            (TERM.to_string(), self.term.as_str().to_string()),
            (INCLUDE_DESIGN.to_string(), self.include_design.to_string()),
            (TOWN.to_string(), self.town.clone()),
        ])
    }
}

/// Created hosted session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSession {
    /// Stripe session ID
    #[serde(rename = "sessionId")]
    pub id: String,

    /// URL to redirect the browser to
    pub url: String,
}

/// Creates hosted checkout sessions
#[async_trait]
pub trait CheckoutGateway: Send + Sync {
    async fn create_session(&self, request: &CheckoutRequest) -> Result<CheckoutSession>;
}

/// Stripe client wrapper
pub struct StripeCheckout {
    client: Client,
    origin: String,
}

impl StripeCheckout {
    /// Create a new Stripe checkout gateway returning to `origin`
    pub fn new(secret_key: &str, origin: impl Into<String>) -> Self {
        Self {
            client: Client::new(secret_key),
            origin: origin.into().trim_end_matches('/').to_string(),
        }
    }

    /// Create from `STRIPE_SECRET_KEY`
    pub fn from_env(origin: impl Into<String>) -> Result<Self> {
        let secret_key = std::env::var("STRIPE_SECRET_KEY")
            .map_err(|_| PaymentError::Config("STRIPE_SECRET_KEY not set".into()))?;
        Ok(Self::new(&secret_key, origin))
    }
}

/// Return URL after a completed checkout; Stripe fills in the session id
pub fn success_url(origin: &str) -> String {
    format!(
        "{}/dashboard?success=true&session_id={{CHECKOUT_SESSION_ID}}",
        origin.trim_end_matches('/')
    )
}

pub fn cancel_url(origin: &str) -> String {
    format!("{}/dashboard?canceled=true", origin.trim_end_matches('/'))
}

#[async_trait]
impl CheckoutGateway for StripeCheckout {
    async fn create_session(&self, request: &CheckoutRequest) -> Result<CheckoutSession> {
        let unit_amount = request.unit_amount()?;
        let success_url = success_url(&self.origin);
        let cancel_url = cancel_url(&self.origin);

        let mut params = CreateCheckoutSession::new();
        params.success_url = Some(&success_url);
        params.cancel_url = Some(&cancel_url);
        params.mode = Some(CheckoutSessionMode::Payment);
        params.payment_method_types = Some(vec![CreateCheckoutSessionPaymentMethodTypes::Card]);
        params.metadata = Some(request.metadata());
        params.line_items = Some(vec![CreateCheckoutSessionLineItems {
            quantity: Some(1),
            price_data: Some(CreateCheckoutSessionLineItemsPriceData {
                currency: Currency::USD,
                unit_amount: Some(unit_amount),
                product_data: Some(CreateCheckoutSessionLineItemsPriceDataProductData {
                    name: request.product_name(),
                    description: Some(request.product_description()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }]);

        let session = StripeCheckoutSession::create(&self.client, params)
            .await
            .map_err(|e| PaymentError::Stripe(e.to_string()))?;

        let url = session
            .url
            .ok_or_else(|| PaymentError::Stripe("No checkout URL returned".into()))?;

        info!(
            session_id = %session.id,
            subscription_id = %request.subscription_id,
            unit_amount,
            "Created checkout session"
        );

        Ok(CheckoutSession {
            id: session.id.to_string(),
            url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request(amount: Decimal, include_design: bool) -> CheckoutRequest {
        CheckoutRequest {
            subscription_id: "sub_42".into(),
            owner_id: "user_7".into(),
            plan_type: PlanType::Standard,
            term: Term::Annual,
            include_design,
            town: "Lowell".into(),
            amount,
        }
    }

    #[test]
    fn test_line_item_text() {
        let req = request(dec!(5635), true);
        assert_eq!(req.product_name(), "Standard Ad Space - Lowell");
        assert_eq!(req.product_description(), "annual subscription with design services");
        assert_eq!(request(dec!(5610), false).product_description(), "annual subscription");
    }

    #[test]
    fn test_unit_amount_is_rounded_cents() {
        assert_eq!(request(dec!(5635), true).unit_amount().unwrap(), 563_500);
        assert_eq!(request(dec!(949.99905), false).unit_amount().unwrap(), 95_000);
        assert_eq!(request(dec!(19.994), false).unit_amount().unwrap(), 1_999);
    }

    #[test]
    fn test_non_positive_amount_is_not_retried() {
        for amount in [Decimal::ZERO, dec!(-12.50)] {
            let err = request(amount, false).unit_amount().unwrap_err();
            assert!(matches!(err, PaymentError::InvalidAmount(_)));
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn test_metadata_carries_correlation_keys() {
        let metadata = request(dec!(5635), true).metadata();
        assert_eq!(metadata["subscriptionId"], "sub_42");
        assert_eq!(metadata["userId"], "user_7");
        assert_eq!(metadata["adType"], "standard");
        assert_eq!(metadata["term"], "annual");
        assert_eq!(metadata["includeDesign"], "true");
        assert_eq!(metadata["town"], "Lowell");
    }

    #[test]
    fn test_request_accepts_wire_body() {
        let body = r#"{
            "subscriptionId": "sub_1",
            "userId": "user_1",
            "adType": "premium",
            "term": "3months",
            "includeDesign": false,
            "town": "Chelmsford",
            "amount": 2850
        }"#;
        let req: CheckoutRequest = serde_json::from_str(body).unwrap();
        assert_eq!(req.plan_type, PlanType::Premium);
        assert_eq!(req.term, Term::ThreeMonths);
        assert_eq!(req.amount, dec!(2850));
    }

    #[test]
    fn test_redirect_urls() {
        let origin = "https://spendlocal.example/";
        assert_eq!(
            success_url(origin),
            "https://spendlocal.example/dashboard?success=true&session_id={CHECKOUT_SESSION_ID}"
        );
        assert_eq!(cancel_url(origin), "https://spendlocal.example/dashboard?canceled=true");
    }
}
