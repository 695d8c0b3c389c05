//! Domain Model
//!
//! Subscription and invoice records plus the enumerations shared by the
//! purchase side and the webhook side. Field names follow the persisted
//! document shape (`profile_id`, `type`, `design_service`, ...).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Months, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Ad space tier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanType {
    Premium,
    Standard,
    Mini,
}

impl PlanType {
    pub const ALL: [PlanType; 3] = [PlanType::Premium, PlanType::Standard, PlanType::Mini];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanType::Premium => "premium",
            PlanType::Standard => "standard",
            PlanType::Mini => "mini",
        }
    }

    /// Capitalized name used in payment descriptions
    pub fn display_name(&self) -> &'static str {
        match self {
            PlanType::Premium => "Premium",
            PlanType::Standard => "Standard",
            PlanType::Mini => "Mini",
        }
    }

    /// Monthly catalogue price
    pub fn base_price(&self) -> Decimal {
        match self {
            PlanType::Premium => dec!(1000),
            PlanType::Standard => dec!(550),
            PlanType::Mini => dec!(350),
        }
    }

    /// Printed ad dimensions
    pub fn dimensions(&self) -> &'static str {
        match self {
            PlanType::Premium => "5.7\" x 3.7\"",
            PlanType::Standard => "2.7\" x 3.7\"",
            PlanType::Mini => "2.7\" x 1.7\"",
        }
    }
}

impl FromStr for PlanType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "premium" => Ok(PlanType::Premium),
            "standard" => Ok(PlanType::Standard),
            "mini" => Ok(PlanType::Mini),
            other => Err(CoreError::Validation(format!("unknown ad type '{other}'"))),
        }
    }
}

impl fmt::Display for PlanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Billing term. Drives both the price discount and the subscription length.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Term {
    #[serde(rename = "monthly")]
    Monthly,
    #[serde(rename = "3months")]
    ThreeMonths,
    #[serde(rename = "6months")]
    SixMonths,
    #[serde(rename = "annual")]
    Annual,
}

impl Term {
    pub const ALL: [Term; 4] = [Term::Monthly, Term::ThreeMonths, Term::SixMonths, Term::Annual];

    pub fn as_str(&self) -> &'static str {
        match self {
            Term::Monthly => "monthly",
            Term::ThreeMonths => "3months",
            Term::SixMonths => "6months",
            Term::Annual => "annual",
        }
    }

    pub fn months(&self) -> u32 {
        match self {
            Term::Monthly => 1,
            Term::ThreeMonths => 3,
            Term::SixMonths => 6,
            Term::Annual => 12,
        }
    }

    pub fn discount_rate(&self) -> Decimal {
        match self {
            Term::Monthly => Decimal::ZERO,
            Term::ThreeMonths => dec!(0.05),
            Term::SixMonths => dec!(0.10),
            Term::Annual => dec!(0.15),
        }
    }

    /// Calendar-month end date for a subscription activated at `from`
    pub fn end_date_from(&self, from: DateTime<Utc>) -> Result<DateTime<Utc>> {
        from.checked_add_months(Months::new(self.months()))
            .ok_or_else(|| CoreError::Validation(format!("end date out of range for {from}")))
    }
}

impl FromStr for Term {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "monthly" => Ok(Term::Monthly),
            "3months" => Ok(Term::ThreeMonths),
            "6months" => Ok(Term::SixMonths),
            "annual" => Ok(Term::Annual),
            other => Err(CoreError::Validation(format!("unknown term '{other}'"))),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Pending,
    Active,
    Cancelled,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Pending => "pending",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Expired => "expired",
        }
    }
}

impl FromStr for SubscriptionStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(SubscriptionStatus::Pending),
            "active" => Ok(SubscriptionStatus::Active),
            "cancelled" => Ok(SubscriptionStatus::Cancelled),
            "expired" => Ok(SubscriptionStatus::Expired),
            other => Err(CoreError::Decode(format!("unknown subscription status '{other}'"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Paid,
    Pending,
    Failed,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Failed => "failed",
        }
    }
}

impl FromStr for InvoiceStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "paid" => Ok(InvoiceStatus::Paid),
            "pending" => Ok(InvoiceStatus::Pending),
            "failed" => Ok(InvoiceStatus::Failed),
            other => Err(CoreError::Decode(format!("unknown invoice status '{other}'"))),
        }
    }
}

/// How a confirmed payment reached us
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Card,
    Venmo,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::Venmo => "venmo",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "card" => Ok(PaymentMethod::Card),
            "venmo" => Ok(PaymentMethod::Venmo),
            other => Err(CoreError::Decode(format!("unknown payment method '{other}'"))),
        }
    }
}

/// Input for a new pending subscription
#[derive(Clone, Debug)]
pub struct NewSubscription {
    pub owner_id: String,
    pub plan_type: PlanType,
    pub term: Term,
    pub town: String,
    pub price: Decimal,
    pub design_service_included: bool,
}

/// A purchased, time-bounded ad slot reservation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,

    #[serde(rename = "profile_id")]
    pub owner_id: String,

    #[serde(rename = "type")]
    pub plan_type: PlanType,

    pub term: Term,

    pub town: String,

    /// Quoted total, 2-dp, fixed at creation
    pub price: Decimal,

    #[serde(rename = "design_service")]
    pub design_service_included: bool,

    pub status: SubscriptionStatus,

    pub auto_renew: bool,

    pub start_date: DateTime<Utc>,

    pub end_date: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Build the pending record written before any money moves
    pub fn pending(id: impl Into<String>, new: NewSubscription, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            owner_id: new.owner_id,
            plan_type: new.plan_type,
            auto_renew: new.term == Term::Monthly,
            term: new.term,
            town: new.town,
            price: new.price.round_dp(2),
            design_service_included: new.design_service_included,
            status: SubscriptionStatus::Pending,
            start_date: now,
            end_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `active`. Only status and date fields change.
    pub fn activate(&mut self, activated_at: DateTime<Utc>, end_date: DateTime<Utc>) {
        self.status = SubscriptionStatus::Active;
        self.start_date = activated_at;
        self.end_date = Some(end_date);
        self.updated_at = activated_at;
    }
}

/// Outcome of a conditional `pending -> active` transition
#[derive(Clone, Debug, PartialEq)]
pub enum Activation {
    /// The subscription was pending and is now active
    Activated(Subscription),

    /// Already active; nothing was written
    AlreadyActive(Subscription),

    /// Cancelled or expired; nothing was written
    Inactive(Subscription),
}

impl Activation {
    pub fn subscription(&self) -> &Subscription {
        match self {
            Activation::Activated(s) | Activation::AlreadyActive(s) | Activation::Inactive(s) => s,
        }
    }
}

/// Unique, time-derived invoice number
pub fn generate_invoice_number(now: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string().to_uppercase();
    format!("INV-{}-{}", now.timestamp_millis(), &suffix[..4])
}

/// Billing record for a confirmed payment
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    /// Document id, derived from the payment reference
    pub id: String,

    pub subscription_id: String,

    #[serde(rename = "profile_id")]
    pub owner_id: String,

    /// Provider-confirmed charge amount
    pub amount: Decimal,

    pub status: InvoiceStatus,

    pub payment_method: PaymentMethod,

    /// Checkout session id or external payment reference
    pub payment_reference: String,

    pub invoice_number: String,

    pub payment_date: Option<DateTime<Utc>>,

    pub due_date: DateTime<Utc>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// Document id for the invoice of a given payment reference
    pub fn key_for(payment_reference: &str) -> String {
        format!("pay_{payment_reference}")
    }

    /// A paid invoice issued at `now`
    pub fn paid(
        subscription_id: impl Into<String>,
        owner_id: impl Into<String>,
        amount: Decimal,
        payment_method: PaymentMethod,
        payment_reference: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let payment_reference = payment_reference.into();
        Self {
            id: Self::key_for(&payment_reference),
            subscription_id: subscription_id.into(),
            owner_id: owner_id.into(),
            amount,
            status: InvoiceStatus::Paid,
            payment_method,
            payment_reference,
            invoice_number: generate_invoice_number(now),
            payment_date: Some(now),
            due_date: now,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Reservation request from the public contact form
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactForm {
    pub business_name: String,
    pub industry: String,
    pub phone_number: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    pub town_name: String,
}

impl ContactForm {
    /// Required fields must be non-blank
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("businessName", &self.business_name),
            ("industry", &self.industry),
            ("phoneNumber", &self.phone_number),
            ("email", &self.email),
            ("townName", &self.town_name),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(CoreError::Validation(format!("{name} is required")));
            }
        }
        if !self.email.contains('@') {
            return Err(CoreError::Validation("email is not a valid address".into()));
        }
        Ok(())
    }
}

/// Persisted contact form with relay bookkeeping
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactRecord {
    pub id: String,
    #[serde(flatten)]
    pub form: ContactForm,
    pub processed: bool,
    pub email_sent: bool,
    pub email_sent_at: Option<DateTime<Utc>>,
    #[serde(rename = "created_at")]
    pub created_at: DateTime<Utc>,
}

impl ContactRecord {
    pub fn unprocessed(id: impl Into<String>, form: ContactForm, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            form,
            processed: false,
            email_sent: false,
            email_sent_at: None,
            created_at: now,
        }
    }
}

/// Attachment descriptor of an inbound e-mail
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InboundAttachment {
    pub filename: String,
    #[serde(default, rename = "contentType", skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// E-mail delivered to the business inbox by the mail provider
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InboundEmail {
    pub from: String,
    pub subject: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub attachments: Vec<InboundAttachment>,
}

/// Persisted inbound e-mail
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InboundEmailRecord {
    pub id: String,
    pub from_email: String,
    pub subject: String,
    pub text_content: Option<String>,
    pub html_content: Option<String>,
    pub has_attachments: bool,
    pub processed: bool,
    pub received_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InboundEmailRecord {
    pub fn unprocessed(id: impl Into<String>, email: &InboundEmail, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            from_email: email.from.clone(),
            subject: email.subject.clone(),
            text_content: email.text.clone(),
            html_content: email.html.clone(),
            has_attachments: !email.attachments.is_empty(),
            processed: false,
            received_at: now,
            created_at: now,
            updated_at: now,
        }
    }
}
