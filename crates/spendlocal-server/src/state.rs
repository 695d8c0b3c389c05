//! Application State

use std::sync::Arc;

use spendlocal_core::{Clock, ContactStore, InvoiceStore, SubscriptionStore};
use spendlocal_payments::{
    CheckoutGateway, ClientHandoff, DeepLinkInitiator, PurchaseFlow, SubscriptionActivator,
    WebhookHandler,
};

use crate::config::ServerConfig;
use crate::contact::{ContactRelay, RetryPolicy};
use crate::identity::IdentityVerifier;
use crate::mailer::Mailer;

/// Backends chosen at startup
pub struct Services {
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub invoices: Arc<dyn InvoiceStore>,
    pub contacts: Arc<dyn ContactStore>,
    /// Stripe gateway; `None` disables the card rail
    pub checkout: Option<Arc<dyn CheckoutGateway>>,
    pub mailer: Arc<dyn Mailer>,
    pub clock: Arc<dyn Clock>,
    pub mail_retry: RetryPolicy,
    /// Storage backend name for health reporting
    pub storage: &'static str,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub invoices: Arc<dyn InvoiceStore>,
    pub purchase: Arc<PurchaseFlow>,
    pub checkout: Option<Arc<dyn CheckoutGateway>>,

    /// `None` until `STRIPE_WEBHOOK_SECRET` is set
    pub webhook: Option<Arc<WebhookHandler>>,

    pub activator: Arc<SubscriptionActivator>,
    pub contact: Arc<ContactRelay>,

    /// `None` until `IDENTITY_JWT_SECRET` is set
    pub identity: Option<Arc<IdentityVerifier>>,

    pub storage: &'static str,
}

impl AppState {
    pub fn new(config: ServerConfig, services: Services) -> Self {
        let timeout = config.external_timeout;

        let activator = Arc::new(SubscriptionActivator::new(
            services.subscriptions.clone(),
            services.invoices.clone(),
            services.clock.clone(),
            timeout,
        ));
        let webhook = config.stripe_webhook_secret.as_deref().map(|secret| {
            Arc::new(WebhookHandler::new(
                secret,
                activator.clone(),
                services.clock.clone(),
            ))
        });

        let deep_link = DeepLinkInitiator::new(Arc::new(ClientHandoff), &config.venmo_handle, timeout);
        let purchase = Arc::new(PurchaseFlow::new(
            services.subscriptions.clone(),
            deep_link,
            services.checkout.clone(),
            services.clock.clone(),
            timeout,
        ));

        let contact = Arc::new(
            ContactRelay::new(
                services.contacts,
                services.mailer,
                services.clock,
                &config.operator_email,
                timeout,
            )
            .with_retry(services.mail_retry),
        );

        let identity = config
            .identity_jwt_secret
            .as_deref()
            .map(|secret| Arc::new(IdentityVerifier::new(secret)));

        Self {
            config: Arc::new(config),
            subscriptions: services.subscriptions,
            invoices: services.invoices,
            purchase,
            checkout: services.checkout,
            webhook,
            activator,
            contact,
            identity,
            storage: services.storage,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use spendlocal_core::{FixedClock, MemoryStore};
    use spendlocal_payments::{CheckoutRequest, CheckoutSession};

    use crate::contact::tests::{FlakyMailer, fast_retry};

    pub(crate) const JWT_SECRET: &str = "identity-secret";
    pub(crate) const ADMIN_TOKEN: &str = "admin-token";
    pub(crate) const WEBHOOK_SECRET: &str = "whsec_test";

    pub(crate) struct FakeGateway;

    #[async_trait]
    impl CheckoutGateway for FakeGateway {
        async fn create_session(
            &self,
            request: &CheckoutRequest,
        ) -> spendlocal_payments::Result<CheckoutSession> {
            Ok(CheckoutSession {
                id: format!("cs_test_{}", request.subscription_id),
                url: "https://checkout.stripe.test/pay".into(),
            })
        }
    }

    pub(crate) struct Harness {
        pub state: AppState,
        pub store: Arc<MemoryStore>,
        pub mailer: Arc<FlakyMailer>,
        pub clock: Arc<FixedClock>,
    }

    /// Fully configured state over in-memory backends
    pub(crate) fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(FlakyMailer::default());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        ));
        let config = ServerConfig {
            stripe_webhook_secret: Some(WEBHOOK_SECRET.into()),
            identity_jwt_secret: Some(JWT_SECRET.into()),
            admin_token: Some(ADMIN_TOKEN.into()),
            operator_email: "ops@spendlocal.test".into(),
            ..ServerConfig::default()
        };
        let state = AppState::new(
            config,
            Services {
                subscriptions: store.clone(),
                invoices: store.clone(),
                contacts: store.clone(),
                checkout: Some(Arc::new(FakeGateway)),
                mailer: mailer.clone(),
                clock: clock.clone(),
                mail_retry: fast_retry(),
                storage: "memory",
            },
        );
        Harness {
            state,
            store,
            mailer,
            clock,
        }
    }

    #[test]
    fn test_optional_integrations_follow_config() {
        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(
            ServerConfig::default(),
            Services {
                subscriptions: store.clone(),
                invoices: store.clone(),
                contacts: store,
                checkout: None,
                mailer: Arc::new(FlakyMailer::default()),
                clock: Arc::new(FixedClock::new(Utc::now())),
                mail_retry: fast_retry(),
                storage: "memory",
            },
        );
        assert!(state.webhook.is_none());
        assert!(state.identity.is_none());
        assert!(!state.purchase.card_enabled());

        let configured = harness().state;
        assert!(configured.webhook.is_some());
        assert!(configured.identity.is_some());
        assert!(configured.purchase.card_enabled());
    }
}
