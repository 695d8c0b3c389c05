//! Record Stores
//!
//! Persistence traits for subscriptions, invoices and relayed contact
//! messages. Implementations: [`MemoryStore`] for development and tests,
//! [`FirestoreStore`] for the hosted document database.
//!
//! Write races on a single document are settled by the store itself:
//! `activate` is a conditional `pending -> active` transition and
//! `insert_if_absent` refuses a second invoice for the same payment.

mod firestore;
mod memory;

pub use firestore::{FirestoreConfig, FirestoreStore};
pub use memory::MemoryStore;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{CoreError, Result};
use crate::model::{Activation, ContactRecord, InboundEmailRecord, Invoice, Subscription};

pub const SUBSCRIPTIONS: &str = "subscriptions";
pub const INVOICES: &str = "invoices";
pub const CONTACT_FORMS: &str = "contact_forms";
pub const INBOUND_EMAILS: &str = "inbound_emails";

/// Result of a create-if-absent write
#[derive(Clone, Debug, PartialEq)]
pub enum Insert<T> {
    Inserted(T),
    /// A document with the same key already existed and was left untouched
    Existing(T),
}

impl<T> Insert<T> {
    pub fn into_inner(self) -> T {
        match self {
            Insert::Inserted(v) | Insert::Existing(v) => v,
        }
    }

    pub fn was_inserted(&self) -> bool {
        matches!(self, Insert::Inserted(_))
    }
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Persist a new subscription under `subscription.id`
    async fn create(&self, subscription: &Subscription) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<Subscription>>;

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Subscription>>;

    /// Atomically move a pending subscription to active.
    ///
    /// Returns `CoreError::NotFound` when `id` does not exist.
    async fn activate(
        &self,
        id: &str,
        activated_at: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> Result<Activation>;
}

#[async_trait]
pub trait InvoiceStore: Send + Sync {
    /// Create `invoice` unless one exists for the same payment reference
    async fn insert_if_absent(&self, invoice: &Invoice) -> Result<Insert<Invoice>>;

    async fn get_by_reference(&self, payment_reference: &str) -> Result<Option<Invoice>>;

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Invoice>>;

    async fn list_by_subscription(&self, subscription_id: &str) -> Result<Vec<Invoice>>;
}

#[async_trait]
pub trait ContactStore: Send + Sync {
    async fn insert_contact(&self, record: &ContactRecord) -> Result<()>;

    /// Flag a contact record as relayed to the operator
    async fn mark_contact_relayed(&self, id: &str, sent_at: DateTime<Utc>) -> Result<()>;

    async fn insert_inbound_email(&self, record: &InboundEmailRecord) -> Result<()>;

    async fn mark_inbound_email_processed(&self, id: &str, at: DateTime<Utc>) -> Result<()>;
}

/// Run a store call with an upper bound on its duration
pub async fn bounded<T, F>(limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(CoreError::Timeout(limit.as_secs())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, CoreError>(1)
        };
        let result = bounded(Duration::from_millis(10), slow).await;
        assert!(matches!(result, Err(CoreError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_bounded_passes_through() {
        let result = bounded(Duration::from_secs(1), async { Ok::<_, CoreError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
