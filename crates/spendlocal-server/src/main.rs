//! SpendLocal HTTP Server
//!
//! Axum-based server for ad-space purchases, Stripe/Venmo payment
//! completion and the contact relay.

mod config;
mod contact;
mod error;
mod handlers;
mod identity;
mod mailer;
mod routes;
mod state;

use std::sync::Arc;

use spendlocal_core::{
    Clock, ContactStore, FirestoreConfig, FirestoreStore, InvoiceStore, MemoryStore,
    SubscriptionStore, SystemClock,
};
use spendlocal_payments::{CheckoutGateway, StripeCheckout};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ServerConfig;
use crate::contact::RetryPolicy;
use crate::mailer::{HttpMailer, LogMailer, Mailer};
use crate::state::{AppState, Services};

struct Stores {
    subscriptions: Arc<dyn SubscriptionStore>,
    invoices: Arc<dyn InvoiceStore>,
    contacts: Arc<dyn ContactStore>,
    kind: &'static str,
}

impl Stores {
    fn shared<S>(store: Arc<S>, kind: &'static str) -> Self
    where
        S: SubscriptionStore + InvoiceStore + ContactStore + 'static,
    {
        Self {
            subscriptions: store.clone(),
            invoices: store.clone(),
            contacts: store,
            kind,
        }
    }
}

/// Firestore when `FIRESTORE_PROJECT_ID` is set, otherwise in-memory
fn stores(config: &ServerConfig) -> anyhow::Result<Stores> {
    if let Some(firestore) = FirestoreConfig::from_env(config.external_timeout) {
        let project = firestore.project_id.clone();
        let store = Arc::new(FirestoreStore::new(firestore)?);
        tracing::info!("✓ Firestore storage (project {})", project);
        return Ok(Stores::shared(store, "firestore"));
    }

    tracing::warn!("⚠ Firestore not configured - using in-memory storage");
    tracing::warn!("  Set FIRESTORE_PROJECT_ID (and FIRESTORE_TOKEN) in .env");
    Ok(Stores::shared(Arc::new(MemoryStore::new()), "memory"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();
    let config = ServerConfig::from_env();

    let stores = stores(&config)?;

    // Card rail
    let checkout: Option<Arc<dyn CheckoutGateway>> =
        match StripeCheckout::from_env(config.public_origin.clone()) {
            Ok(stripe) => {
                tracing::info!("✓ Stripe configured");
                Some(Arc::new(stripe))
            }
            Err(_) => {
                tracing::warn!("⚠ Stripe not configured - card payments disabled");
                tracing::warn!("  Set STRIPE_SECRET_KEY in .env");
                None
            }
        };
    if config.stripe_webhook_secret.is_none() {
        tracing::warn!("⚠ STRIPE_WEBHOOK_SECRET not set - webhook deliveries will be rejected");
    }

    // Mail
    let mailer: Arc<dyn Mailer> = match HttpMailer::from_env(config.external_timeout) {
        Some(mailer) => {
            tracing::info!("✓ Mail API configured");
            Arc::new(mailer?)
        }
        None => {
            tracing::warn!("⚠ Mail API not configured - relayed mail is only logged");
            Arc::new(LogMailer::default())
        }
    };

    if config.identity_jwt_secret.is_none() {
        tracing::warn!("⚠ IDENTITY_JWT_SECRET not set - buyer endpoints unavailable");
    }
    if config.admin_token.is_none() {
        tracing::warn!("⚠ ADMIN_TOKEN not set - manual payment confirmation unavailable");
    }
    tracing::info!("Venmo payments go to {}", config.venmo_handle);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let addr = config.bind_addr.clone();
    let state = AppState::new(
        config,
        Services {
            subscriptions: stores.subscriptions,
            invoices: stores.invoices,
            contacts: stores.contacts,
            checkout,
            mailer,
            clock,
            mail_retry: RetryPolicy::default(),
            storage: stores.kind,
        },
    );
    let app = routes::app(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 spendlocal server running on http://{}", addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                 - Health check");
    tracing::info!("  GET  /api/pricing/plans      - Plan catalogue");
    tracing::info!("  GET  /api/pricing/quote      - Price quote");
    tracing::info!("  POST /api/purchases          - Reserve and pay");
    tracing::info!("  GET  /api/subscriptions      - Buyer subscriptions");
    tracing::info!("  GET  /api/invoices           - Buyer invoices");
    tracing::info!("  POST /api/checkout           - Create Stripe checkout");
    tracing::info!("  POST /webhook/stripe         - Stripe webhook");
    tracing::info!("  POST /api/contact            - Contact form relay");
    tracing::info!("  POST /api/inbound-email      - Inbound mail relay");
    tracing::info!("  POST /api/admin/subscriptions/{{id}}/confirm - Confirm Venmo payment");
    tracing::info!("");

    axum::serve(listener, app).await?;

    Ok(())
}
