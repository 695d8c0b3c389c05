//! # spendlocal-core
//!
//! Domain model, pricing engine and record stores for SpendLocal ad-space
//! subscriptions.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                      spendlocal-core                       │
//! │  ┌─────────────┐  ┌─────────────┐  ┌────────────────────┐  │
//! │  │   Pricing   │  │    Model    │  │   Record Stores    │  │
//! │  │   Engine    │──│ Subscription│──│ Memory / Firestore │  │
//! │  └─────────────┘  │   Invoice   │  └────────────────────┘  │
//! │                   └─────────────┘                          │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! The store traits let the purchase flow and webhook handler run against
//! Firestore in production and an in-memory map in tests without change.

pub mod clock;
pub mod error;
pub mod identity;
pub mod model;
pub mod pricing;
pub mod store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{CoreError, Result};
pub use identity::{Owner, OwnerIdentity};
pub use model::{
    Activation, ContactForm, ContactRecord, InboundAttachment, InboundEmail, InboundEmailRecord,
    Invoice, InvoiceStatus, NewSubscription, PaymentMethod, PlanType, Subscription,
    SubscriptionStatus, Term,
};
pub use pricing::{DESIGN_FEE, PriceQuote, compute_price, quote_for};
pub use store::{
    ContactStore, FirestoreConfig, FirestoreStore, Insert, InvoiceStore, MemoryStore,
    SubscriptionStore,
};
