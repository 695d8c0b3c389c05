//! Contact relay
//!
//! Contact-form submissions and inbound mail are persisted first, then
//! relayed to the operator mailbox. A failed relay never loses the record;
//! it stays `processed = false` for follow-up.

use std::sync::Arc;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use chrono::{DateTime, Utc};
use serde::Serialize;
use spendlocal_core::store::bounded;
use spendlocal_core::{
    Clock, ContactForm, ContactRecord, ContactStore, InboundEmail, InboundEmailRecord, Result,
};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::mailer::{MailError, Mailer, OutgoingEmail};

/// Delivery attempts for one relayed message
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub attempts: usize,
    /// Delay before the first retry; doubles on each further retry
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayReceipt {
    pub id: String,
    /// Whether the operator e-mail went out
    pub relayed: bool,
}

pub struct ContactRelay {
    store: Arc<dyn ContactStore>,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
    operator_email: String,
    timeout: Duration,
    retry: RetryPolicy,
}

impl ContactRelay {
    pub fn new(
        store: Arc<dyn ContactStore>,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
        operator_email: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            mailer,
            clock,
            operator_email: operator_email.into(),
            timeout,
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn mailer_kind(&self) -> &'static str {
        self.mailer.kind()
    }

    /// Persist a contact form, then e-mail it to the operator
    pub async fn submit(&self, mut form: ContactForm) -> Result<RelayReceipt> {
        form.website = form.website.filter(|w| !w.trim().is_empty());
        form.validate()?;

        let now = self.clock.now();
        let record = ContactRecord::unprocessed(Uuid::new_v4().to_string(), form, now);
        bounded(self.timeout, self.store.insert_contact(&record)).await?;
        info!(contact_id = %record.id, town = %record.form.town_name, "Contact form stored");

        let email = OutgoingEmail {
            from: self.mailer.sender().to_string(),
            to: vec![self.operator_email.clone()],
            subject: format!("New Ad Space Inquiry - {}", record.form.town_name),
            html: contact_html(&record.form, now),
            reply_to: Some(record.form.email.clone()),
        };

        if let Err(e) = self.deliver(&email).await {
            error!(contact_id = %record.id, error = %e, "Contact relay failed, record left unprocessed");
            return Ok(RelayReceipt {
                id: record.id,
                relayed: false,
            });
        }

        let sent_at = self.clock.now();
        if let Err(e) = bounded(self.timeout, self.store.mark_contact_relayed(&record.id, sent_at)).await {
            warn!(contact_id = %record.id, error = %e, "Could not mark contact form processed");
        }
        Ok(RelayReceipt {
            id: record.id,
            relayed: true,
        })
    }

    /// Persist an inbound e-mail, then forward it to the operator
    pub async fn forward_inbound(&self, email: InboundEmail) -> Result<RelayReceipt> {
        let now = self.clock.now();
        let record = InboundEmailRecord::unprocessed(Uuid::new_v4().to_string(), &email, now);
        bounded(self.timeout, self.store.insert_inbound_email(&record)).await?;
        info!(inbound_id = %record.id, from = %email.from, "Inbound e-mail stored");

        let forward = OutgoingEmail {
            from: self.mailer.sender().to_string(),
            to: vec![self.operator_email.clone()],
            subject: format!("[SPENDLOCAL] {}", email.subject),
            html: inbound_html(&email, now),
            reply_to: Some(email.from.clone()),
        };

        if let Err(e) = self.deliver(&forward).await {
            error!(inbound_id = %record.id, error = %e, "Inbound forward failed");
            return Ok(RelayReceipt {
                id: record.id,
                relayed: false,
            });
        }

        if let Err(e) =
            bounded(self.timeout, self.store.mark_inbound_email_processed(&record.id, self.clock.now())).await
        {
            warn!(inbound_id = %record.id, error = %e, "Could not mark inbound e-mail processed");
        }
        Ok(RelayReceipt {
            id: record.id,
            relayed: true,
        })
    }

    async fn deliver(&self, email: &OutgoingEmail) -> std::result::Result<(), MailError> {
        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.retry.base_delay)
            .with_factor(2.0)
            .with_max_times(self.retry.attempts.saturating_sub(1));

        (|| self.send_once(email))
            .retry(backoff)
            .when(MailError::is_retryable)
            .notify(|e, delay| {
                warn!(subject = %email.subject, error = %e, ?delay, "Mail send failed, retrying");
            })
            .await
    }

    async fn send_once(&self, email: &OutgoingEmail) -> std::result::Result<(), MailError> {
        tokio::time::timeout(self.timeout, self.mailer.send(email))
            .await
            .unwrap_or(Err(MailError::Timeout(self.timeout.as_secs())))
    }
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn contact_html(form: &ContactForm, submitted: DateTime<Utc>) -> String {
    let website = form
        .website
        .as_deref()
        .map(|w| format!("<li>Website: {}</li>", escape_html(w)))
        .unwrap_or_default();

    format!(
        "<h2>New Ad Space Inquiry</h2>\
         <p><strong>Business Name:</strong> {business}</p>\
         <p><strong>Industry:</strong> {industry}</p>\
         <p><strong>Contact Information:</strong></p>\
         <ul><li>Phone: {phone}</li><li>Email: {email}</li>{website}</ul>\
         <p><strong>Town:</strong> {town}</p>\
         <p><strong>Submission Time:</strong> {time}</p>",
        business = escape_html(&form.business_name),
        industry = escape_html(&form.industry),
        phone = escape_html(&form.phone_number),
        email = escape_html(&form.email),
        town = escape_html(&form.town_name),
        time = submitted.format("%Y-%m-%d %H:%M UTC"),
    )
}

fn inbound_html(email: &InboundEmail, received: DateTime<Utc>) -> String {
    let attachments = if email.attachments.is_empty() {
        String::new()
    } else {
        let names: Vec<String> = email
            .attachments
            .iter()
            .map(|a| escape_html(&a.filename))
            .collect();
        format!("<p><strong>Attachments:</strong> {}</p>", names.join(", "))
    };
    let body = match (&email.html, &email.text) {
        (Some(html), _) => html.clone(),
        (None, Some(text)) => format!("<pre>{}</pre>", escape_html(text)),
        (None, None) => String::new(),
    };

    format!(
        "<div style=\"font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;\">\
         <h2 style=\"color: #2563eb;\">New SPENDLOCAL Email</h2>\
         <div style=\"background: #f3f4f6; padding: 15px; border-radius: 8px; margin: 15px 0;\">\
         <p><strong>From:</strong> {from}</p>\
         <p><strong>Subject:</strong> {subject}</p>\
         <p><strong>Received:</strong> {received}</p>\
         {attachments}\
         </div>\
         <hr style=\"border: 1px solid #e5e7eb; margin: 20px 0;\">\
         <div style=\"background: white; padding: 15px; border-radius: 8px; border: 1px solid #e5e7eb;\">{body}</div>\
         </div>",
        from = escape_html(&email.from),
        subject = escape_html(&email.subject),
        received = received.format("%Y-%m-%d %H:%M UTC"),
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use spendlocal_core::{FixedClock, InboundAttachment, MemoryStore};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails the first `failures` sends, then records messages
    #[derive(Default)]
    pub(crate) struct FlakyMailer {
        pub failures: AtomicUsize,
        pub calls: AtomicUsize,
        pub sent: Mutex<Vec<OutgoingEmail>>,
    }

    impl FlakyMailer {
        pub fn failing(failures: usize) -> Self {
            Self {
                failures: AtomicUsize::new(failures),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl Mailer for FlakyMailer {
        async fn send(&self, email: &OutgoingEmail) -> std::result::Result<(), MailError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(MailError::Rejected {
                    status: StatusCode::SERVICE_UNAVAILABLE,
                    body: "try later".into(),
                });
            }
            self.sent.lock().unwrap().push(email.clone());
            Ok(())
        }

        fn sender(&self) -> &str {
            "SpendLocal <noreply@spendlocal.test>"
        }

        fn kind(&self) -> &'static str {
            "test"
        }
    }

    pub(crate) fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_millis(1),
        }
    }

    fn relay(store: Arc<MemoryStore>, mailer: Arc<FlakyMailer>) -> ContactRelay {
        ContactRelay::new(
            store,
            mailer,
            Arc::new(FixedClock::new(Utc::now())),
            "ops@spendlocal.test",
            Duration::from_secs(1),
        )
        .with_retry(fast_retry())
    }

    fn form() -> ContactForm {
        ContactForm {
            business_name: "Merrimack <Hardware>".into(),
            industry: "Retail".into(),
            phone_number: "978-555-0142".into(),
            email: "owner@hardware.test".into(),
            website: Some(String::new()),
            town_name: "Tewksbury".into(),
        }
    }

    #[tokio::test]
    async fn test_submit_persists_then_relays() {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(FlakyMailer::default());
        let receipt = relay(store.clone(), mailer.clone()).submit(form()).await.unwrap();
        assert!(receipt.relayed);

        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent[0].subject, "New Ad Space Inquiry - Tewksbury");
        assert_eq!(sent[0].to, vec!["ops@spendlocal.test".to_string()]);
        assert!(sent[0].html.contains("Merrimack &lt;Hardware&gt;"));
        assert!(!sent[0].html.contains("Website"));

        let record = store.contact(&receipt.id).unwrap();
        assert!(record.processed);
        assert!(record.email_sent);
        assert!(record.email_sent_at.is_some());
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(FlakyMailer::failing(2));
        let receipt = relay(store, mailer.clone()).submit(form()).await.unwrap();
        assert!(receipt.relayed);
        assert_eq!(mailer.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_mail_outage_keeps_unprocessed_record() {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(FlakyMailer::failing(10));
        let receipt = relay(store.clone(), mailer.clone()).submit(form()).await.unwrap();

        assert!(!receipt.relayed);
        assert_eq!(mailer.calls.load(Ordering::SeqCst), 3);
        let record = store.contact(&receipt.id).unwrap();
        assert!(!record.processed);
        assert!(!record.email_sent);
    }

    #[tokio::test]
    async fn test_invalid_form_is_not_stored() {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(FlakyMailer::default());
        let bad = ContactForm {
            email: "nope".into(),
            ..form()
        };
        assert!(relay(store, mailer.clone()).submit(bad).await.is_err());
        assert_eq!(mailer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_inbound_forward() {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(FlakyMailer::default());
        let email = InboundEmail {
            from: "advertiser@shop.test".into(),
            subject: "Question about mini ads".into(),
            text: Some("Do you have space in <June>?".into()),
            html: None,
            attachments: vec![InboundAttachment {
                filename: "logo.png".into(),
                content_type: Some("image/png".into()),
            }],
        };
        let receipt = relay(store.clone(), mailer.clone())
            .forward_inbound(email)
            .await
            .unwrap();
        assert!(receipt.relayed);

        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent[0].subject, "[SPENDLOCAL] Question about mini ads");
        assert!(sent[0].html.contains("<pre>Do you have space in &lt;June&gt;?</pre>"));
        assert!(sent[0].html.contains("logo.png"));

        let record = store.inbound_email(&receipt.id).unwrap();
        assert!(record.processed);
        assert!(record.has_attachments);
    }
}
