//! # spendlocal-payments
//!
//! Payment rails, webhook completion and the purchase flow for SpendLocal
//! ad subscriptions.
//!
//! ## Payment rails
//!
//! ### 1. Venmo deep link
//!
//! **Flow:** reserve → hand the buyer a `venmo://` link (web fallback) →
//! operator confirms the payment by reference
//!
//! ```text
//! ┌─────────────┐     ┌─────────────────┐     ┌──────────────────┐
//! │  Purchase   │────▶│   Venmo app /   │     │ Admin confirm    │
//! │  (pending)  │     │   venmo.com     │     │ (activate + inv) │
//! └─────────────┘     └─────────────────┘     └──────────────────┘
//! ```
//!
//! ### 2. Stripe Checkout (Hosted)
//!
//! **Flow:** reserve → redirect to Stripe's hosted page → webhook
//!
//! ```text
//! ┌─────────────┐     ┌─────────────────┐     ┌──────────────────┐
//! │  Purchase   │────▶│  Stripe Hosted  │────▶│ Webhook          │
//! │  (pending)  │     │  Checkout Page  │     │ (activate + inv) │
//! └─────────────┘     └─────────────────┘     └──────────────────┘
//! ```
//!
//! Both rails end in [`SubscriptionActivator::confirm`], which is
//! idempotent per payment reference.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use spendlocal_payments::{PaymentRail, PurchaseFlow, PurchaseRequest};
//!
//! let outcome = flow.purchase(&owner, &PurchaseRequest {
//!     plan_type: PlanType::Standard,
//!     term: Term::Annual,
//!     town: "Andover".into(),
//!     include_design: true,
//!     rail: PaymentRail::Card,
//! }).await?;
//!
//! // Redirect the buyer according to outcome.handoff
//! ```

mod activation;
mod checkout;
mod deeplink;
mod error;
mod purchase;
mod signature;
mod webhook;

pub use activation::{ActivationOutcome, PaymentConfirmation, SubscriptionActivator};
pub use checkout::{
    CheckoutGateway, CheckoutRequest, CheckoutSession, StripeCheckout, cancel_url, metadata_keys,
    success_url,
};
pub use deeplink::{AppLauncher, ClientHandoff, DeepLink, DeepLinkInitiator, DispatchOutcome};
pub use error::{PaymentError, PurchaseError, Result};
pub use purchase::{
    PaymentHandoff, PaymentRail, PurchaseFlow, PurchaseOutcome, PurchaseRequest, PurchaseStatus,
    payment_description,
};
pub use signature::{TOLERANCE_SECS, signature_header, verify_event};
pub use webhook::{WebhookHandler, WebhookOutcome};
