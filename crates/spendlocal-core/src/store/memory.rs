//! In-memory record store (for development and tests)

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{ContactStore, Insert, InvoiceStore, SubscriptionStore};
use crate::error::{CoreError, Result};
use crate::model::{
    Activation, ContactRecord, InboundEmailRecord, Invoice, Subscription, SubscriptionStatus,
};

/// All collections behind process-local locks
#[derive(Default)]
pub struct MemoryStore {
    subscriptions: RwLock<HashMap<String, Subscription>>,
    invoices: RwLock<HashMap<String, Invoice>>,
    contacts: RwLock<HashMap<String, ContactRecord>>,
    inbound_emails: RwLock<HashMap<String, InboundEmailRecord>>,
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| CoreError::Storage("memory store lock poisoned".into()))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| CoreError::Storage("memory store lock poisoned".into()))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn invoice_count(&self) -> usize {
        self.invoices.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn contact(&self, id: &str) -> Option<ContactRecord> {
        self.contacts.read().ok()?.get(id).cloned()
    }

    pub fn inbound_email(&self, id: &str) -> Option<InboundEmailRecord> {
        self.inbound_emails.read().ok()?.get(id).cloned()
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn create(&self, subscription: &Subscription) -> Result<()> {
        let mut subscriptions = write(&self.subscriptions)?;
        if subscriptions.contains_key(&subscription.id) {
            return Err(CoreError::Conflict(format!(
                "subscription {} already exists",
                subscription.id
            )));
        }
        subscriptions.insert(subscription.id.clone(), subscription.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Subscription>> {
        Ok(read(&self.subscriptions)?.get(id).cloned())
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Subscription>> {
        let mut result: Vec<_> = read(&self.subscriptions)?
            .values()
            .filter(|s| s.owner_id == owner_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }

    async fn activate(
        &self,
        id: &str,
        activated_at: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> Result<Activation> {
        let mut subscriptions = write(&self.subscriptions)?;
        let subscription = subscriptions
            .get_mut(id)
            .ok_or_else(|| CoreError::NotFound(format!("subscription {id}")))?;

        Ok(match subscription.status {
            SubscriptionStatus::Pending => {
                subscription.activate(activated_at, end_date);
                Activation::Activated(subscription.clone())
            }
            SubscriptionStatus::Active => Activation::AlreadyActive(subscription.clone()),
            SubscriptionStatus::Cancelled | SubscriptionStatus::Expired => {
                Activation::Inactive(subscription.clone())
            }
        })
    }
}

#[async_trait]
impl InvoiceStore for MemoryStore {
    async fn insert_if_absent(&self, invoice: &Invoice) -> Result<Insert<Invoice>> {
        let mut invoices = write(&self.invoices)?;
        if let Some(existing) = invoices.get(&invoice.id) {
            return Ok(Insert::Existing(existing.clone()));
        }
        invoices.insert(invoice.id.clone(), invoice.clone());
        Ok(Insert::Inserted(invoice.clone()))
    }

    async fn get_by_reference(&self, payment_reference: &str) -> Result<Option<Invoice>> {
        Ok(read(&self.invoices)?
            .get(&Invoice::key_for(payment_reference))
            .cloned())
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Invoice>> {
        let mut result: Vec<_> = read(&self.invoices)?
            .values()
            .filter(|i| i.owner_id == owner_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }

    async fn list_by_subscription(&self, subscription_id: &str) -> Result<Vec<Invoice>> {
        Ok(read(&self.invoices)?
            .values()
            .filter(|i| i.subscription_id == subscription_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ContactStore for MemoryStore {
    async fn insert_contact(&self, record: &ContactRecord) -> Result<()> {
        write(&self.contacts)?.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn mark_contact_relayed(&self, id: &str, sent_at: DateTime<Utc>) -> Result<()> {
        let mut contacts = write(&self.contacts)?;
        let record = contacts
            .get_mut(id)
            .ok_or_else(|| CoreError::NotFound(format!("contact form {id}")))?;
        record.processed = true;
        record.email_sent = true;
        record.email_sent_at = Some(sent_at);
        Ok(())
    }

    async fn insert_inbound_email(&self, record: &InboundEmailRecord) -> Result<()> {
        write(&self.inbound_emails)?.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn mark_inbound_email_processed(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        let mut emails = write(&self.inbound_emails)?;
        let record = emails
            .get_mut(id)
            .ok_or_else(|| CoreError::NotFound(format!("inbound email {id}")))?;
        record.processed = true;
        record.updated_at = at;
        Ok(())
    }
}
