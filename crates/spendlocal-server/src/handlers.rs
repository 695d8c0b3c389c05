//! HTTP Handlers

use axum::body::Bytes;
use axum::extract::{FromRequest, Path, Query, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::{Form, Json};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use spendlocal_core::store::bounded;
use spendlocal_core::{
    ContactForm, DESIGN_FEE, InboundEmail, Invoice, PaymentMethod, PlanType, PriceQuote,
    Subscription, SubscriptionStatus, Term, quote_for,
};
use spendlocal_payments::{
    ActivationOutcome, CheckoutRequest, CheckoutSession, PaymentConfirmation, PaymentError,
    PurchaseOutcome, PurchaseRequest, WebhookOutcome,
};
use tracing::{info, warn};

use crate::contact::RelayReceipt;
use crate::error::{ApiError, api_error, from_core, from_payment, from_purchase, from_webhook};
use crate::identity::{AdminAccess, AuthenticatedOwner};
use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub stripe_configured: bool,
    pub webhook_configured: bool,
    pub identity_configured: bool,
    pub storage: &'static str,
    pub mailer: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanInfo {
    pub ad_type: PlanType,
    pub name: &'static str,
    pub base_price: Decimal,
    pub dimensions: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TermInfo {
    pub term: Term,
    pub months: u32,
    pub discount_rate: Decimal,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalogue {
    pub plans: Vec<PlanInfo>,
    pub terms: Vec<TermInfo>,
    pub design_fee: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteParams {
    pub ad_type: PlanType,
    pub term: Term,
    #[serde(default)]
    pub include_design: bool,
}

#[derive(Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

/// Operator confirmation of an out-of-band Venmo payment
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualConfirmation {
    pub amount: Decimal,
    pub payment_reference: String,
}

const MAX_REFERENCE_LEN: usize = 128;

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        stripe_configured: state.checkout.is_some(),
        webhook_configured: state.webhook.is_some(),
        identity_configured: state.identity.is_some(),
        storage: state.storage,
        mailer: state.contact.mailer_kind(),
    })
}

pub async fn pricing_plans() -> Json<Catalogue> {
    let plans = PlanType::ALL
        .iter()
        .map(|plan| PlanInfo {
            ad_type: *plan,
            name: plan.display_name(),
            base_price: plan.base_price(),
            dimensions: plan.dimensions(),
        })
        .collect();
    let terms = Term::ALL
        .iter()
        .map(|term| TermInfo {
            term: *term,
            months: term.months(),
            discount_rate: term.discount_rate(),
        })
        .collect();

    Json(Catalogue {
        plans,
        terms,
        design_fee: DESIGN_FEE,
    })
}

pub async fn price_quote(Query(params): Query<QuoteParams>) -> Result<Json<PriceQuote>, ApiError> {
    quote_for(params.ad_type, params.term, params.include_design)
        .map(|quote| Json(quote.rounded()))
        .map_err(|e| from_core(&e))
}

/// Reserve an ad space and hand back the payment instructions
pub async fn create_purchase(
    AuthenticatedOwner(owner): AuthenticatedOwner,
    State(state): State<AppState>,
    Json(request): Json<PurchaseRequest>,
) -> Result<Json<PurchaseOutcome>, ApiError> {
    state
        .purchase
        .purchase(&owner, &request)
        .await
        .map(Json)
        .map_err(|e| from_purchase(&e))
}

pub async fn list_subscriptions(
    AuthenticatedOwner(owner): AuthenticatedOwner,
    State(state): State<AppState>,
) -> Result<Json<Vec<Subscription>>, ApiError> {
    let timeout = state.config.external_timeout;
    let mut subscriptions = bounded(timeout, state.subscriptions.list_by_owner(&owner.owner_id))
        .await
        .map_err(|e| from_core(&e))?;
    subscriptions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(Json(subscriptions))
}

pub async fn list_invoices(
    AuthenticatedOwner(owner): AuthenticatedOwner,
    State(state): State<AppState>,
) -> Result<Json<Vec<Invoice>>, ApiError> {
    let timeout = state.config.external_timeout;
    let mut invoices = bounded(timeout, state.invoices.list_by_owner(&owner.owner_id))
        .await
        .map_err(|e| from_core(&e))?;
    invoices.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(Json(invoices))
}

/// Create a hosted checkout session for an existing pending subscription
pub async fn create_checkout(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<CheckoutSession>, ApiError> {
    let Some(gateway) = state.checkout.as_ref() else {
        return Err(api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Card payments are not configured.",
            "NOT_CONFIGURED",
        ));
    };

    let timeout = state.config.external_timeout;
    let subscription = bounded(timeout, state.subscriptions.get(&request.subscription_id))
        .await
        .map_err(|e| from_core(&e))?
        .filter(|s| s.owner_id == request.owner_id)
        .ok_or_else(|| {
            api_error(StatusCode::NOT_FOUND, "Subscription not found.", "NOT_FOUND")
        })?;

    if subscription.status != SubscriptionStatus::Pending {
        return Err(api_error(
            StatusCode::CONFLICT,
            format!("Subscription is already {}.", subscription.status.as_str()),
            "INVALID_TRANSITION",
        ));
    }
    if request.amount.round_dp(2) != subscription.price.round_dp(2) {
        warn!(
            subscription_id = %subscription.id,
            requested = %request.amount,
            reserved = %subscription.price,
            "Checkout amount does not match reservation"
        );
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Amount does not match the reserved price.",
            "VALIDATION_ERROR",
        ));
    }

    let session = tokio::time::timeout(timeout, gateway.create_session(&request))
        .await
        .map_err(|_| {
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Payment provider did not respond.",
                "CHECKOUT_FAILED",
            )
        })?
        .map_err(|e| match e {
            PaymentError::InvalidAmount(_) => from_payment(&e),
            e => {
                warn!(error = %e, subscription_id = %subscription.id, "Checkout session failed");
                api_error(StatusCode::INTERNAL_SERVER_ERROR, e.user_message(), "CHECKOUT_FAILED")
            }
        })?;

    Ok(Json(session))
}

/// Stripe webhook; the body must reach the verifier unmodified
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let Some(handler) = state.webhook.as_ref() else {
        return Err(api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Webhook secret is not configured.",
            "NOT_CONFIGURED",
        ));
    };
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            api_error(StatusCode::BAD_REQUEST, "Missing Stripe-Signature header.", "INVALID_SIGNATURE")
        })?;

    match handler.handle(&body, signature).await {
        Ok(WebhookOutcome::Activated {
            event_id,
            subscription_id,
            invoice_number,
        }) => {
            info!(%event_id, %subscription_id, %invoice_number, "Webhook activated subscription");
        }
        Ok(WebhookOutcome::Replayed {
            event_id,
            subscription_id,
        }) => {
            info!(%event_id, %subscription_id, "Webhook replay acknowledged");
        }
        Ok(WebhookOutcome::Ignored { .. }) => {}
        Err(e) => return Err(from_webhook(&e)),
    }

    Ok(Json(WebhookAck { received: true }))
}

/// Contact form; browsers post `application/x-www-form-urlencoded`, scripts post JSON
pub async fn submit_contact(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<RelayReceipt>, ApiError> {
    let is_form = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));

    let form = if is_form {
        Form::<ContactForm>::from_request(request, &state)
            .await
            .map(|Form(form)| form)
            .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.body_text(), "VALIDATION_ERROR"))?
    } else {
        Json::<ContactForm>::from_request(request, &state)
            .await
            .map(|Json(form)| form)
            .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.body_text(), "VALIDATION_ERROR"))?
    };

    state
        .contact
        .submit(form)
        .await
        .map(Json)
        .map_err(|e| from_core(&e))
}

pub async fn inbound_email(
    State(state): State<AppState>,
    Json(email): Json<InboundEmail>,
) -> Result<Json<RelayReceipt>, ApiError> {
    state
        .contact
        .forward_inbound(email)
        .await
        .map(Json)
        .map_err(|e| from_core(&e))
}

/// Payment references key invoice documents, so they must be a plain token
fn is_reference_token(reference: &str) -> bool {
    reference.len() <= MAX_REFERENCE_LEN
        && reference
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Activate a subscription paid through the Venmo deep link
pub async fn confirm_payment(
    _admin: AdminAccess,
    State(state): State<AppState>,
    Path(subscription_id): Path<String>,
    Json(body): Json<ManualConfirmation>,
) -> Result<Json<ActivationOutcome>, ApiError> {
    let reference = body.payment_reference.trim();
    if reference.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "paymentReference is required",
            "VALIDATION_ERROR",
        ));
    }
    if !is_reference_token(reference) {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "paymentReference may only contain letters, digits, '-' and '_'",
            "VALIDATION_ERROR",
        ));
    }

    let timeout = state.config.external_timeout;
    let subscription = bounded(timeout, state.subscriptions.get(&subscription_id))
        .await
        .map_err(|e| from_core(&e))?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Subscription not found.", "NOT_FOUND"))?;

    let confirmation = PaymentConfirmation {
        subscription_id: subscription.id,
        owner_id: subscription.owner_id,
        term: Some(subscription.term),
        amount: body.amount,
        payment_method: PaymentMethod::Venmo,
        payment_reference: reference.to_string(),
    };

    let outcome = state
        .activator
        .confirm(&confirmation)
        .await
        .map_err(|e| from_payment(&e))?;
    info!(
        subscription_id = %outcome.subscription().id,
        invoice_number = %outcome.invoice().invoice_number,
        "Manual payment confirmation applied"
    );
    Ok(Json(outcome))
}
