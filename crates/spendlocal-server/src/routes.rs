//! Router

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::{
    confirm_payment, create_checkout, create_purchase, health_check, inbound_email, list_invoices,
    list_subscriptions, price_quote, pricing_plans, stripe_webhook, submit_contact,
};
use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health & catalogue
        .route("/health", get(health_check))
        .route("/api/pricing/plans", get(pricing_plans))
        .route("/api/pricing/quote", get(price_quote))
        // Buyer API
        .route("/api/purchases", post(create_purchase))
        .route("/api/subscriptions", get(list_subscriptions))
        .route("/api/invoices", get(list_invoices))
        // Payments
        .route("/api/checkout", post(create_checkout))
        .route("/webhook/stripe", post(stripe_webhook))
        // Relay
        .route("/api/contact", post(submit_contact))
        .route("/api/inbound-email", post(inbound_email))
        // Operator
        .route("/api/admin/subscriptions/{id}/confirm", post(confirm_payment))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
